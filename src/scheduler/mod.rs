//! Scheduler (§4.5): a single-threaded cooperative periodic task runner.
//!
//! Used by the SW→Broker poll loop. Each task reports when it wants to run
//! next and, once run, returns zero or more successor tasks — a periodic
//! task simply returns a fresh copy of itself scheduled for `now + period`,
//! which is how the scheduler stays alive without an external re-arm.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// A unit of scheduled work. `run` consumes `self` and returns whatever
/// should be scheduled next, which is empty for one-shot tasks.
pub trait Task: Send {
    fn next_run(&self) -> Instant;
    fn name(&self) -> &str;
    fn run(self: Box<Self>) -> Vec<Box<dyn Task>>;
}

/// Wraps a closure so it runs every `period`, forever, the way
/// `TPeriodicTask` does upstream.
pub struct PeriodicTask<F: FnMut() + Send + 'static> {
    name: String,
    period: Duration,
    next_run: Instant,
    func: F,
}

impl<F: FnMut() + Send + 'static> PeriodicTask<F> {
    pub fn new(name: impl Into<String>, period: Duration, func: F) -> Self {
        PeriodicTask {
            name: name.into(),
            period,
            next_run: Instant::now() + period,
            func,
        }
    }
}

impl<F: FnMut() + Send + 'static> Task for PeriodicTask<F> {
    fn next_run(&self) -> Instant {
        self.next_run
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn run(mut self: Box<Self>) -> Vec<Box<dyn Task>> {
        (self.func)();
        self.next_run = Instant::now() + self.period;
        vec![self]
    }
}

struct State {
    tasks: Vec<Box<dyn Task>>,
    enabled: bool,
}

/// Owns the task list and condition variable; `start` spawns the run-loop
/// thread and returns a handle that stops it on drop or explicit `stop`.
pub struct Scheduler {
    state: Arc<(Mutex<State>, Condvar)>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            state: Arc::new((
                Mutex::new(State {
                    tasks: Vec::new(),
                    enabled: true,
                }),
                Condvar::new(),
            )),
            thread: None,
        }
    }

    pub fn add_task(&self, task: Box<dyn Task>) {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        state.tasks.push(task);
        cvar.notify_all();
    }

    pub fn start(&mut self) {
        let state = Arc::clone(&self.state);
        self.thread = Some(std::thread::spawn(move || Self::run_loop(state)));
    }

    fn run_loop(state: Arc<(Mutex<State>, Condvar)>) {
        let (lock, cvar) = &*state;
        loop {
            let mut guard = lock.lock().unwrap();
            if !guard.enabled {
                return;
            }
            if guard.tasks.is_empty() {
                guard = cvar.wait(guard).unwrap();
                if !guard.enabled {
                    return;
                }
                continue;
            }
            guard.tasks.sort_by_key(|t| t.next_run());
            let earliest = guard.tasks[0].next_run();
            let now = Instant::now();
            if earliest <= now {
                let task = guard.tasks.remove(0);
                drop(guard);
                let name = task.name().to_string();
                let successors = task.run();
                let mut guard = lock.lock().unwrap();
                if !guard.enabled {
                    return;
                }
                if successors.is_empty() {
                    debug!(task = %name, "scheduler task completed with no successor");
                }
                guard.tasks.extend(successors);
                continue;
            }
            let timeout = earliest.saturating_duration_since(now);
            let (new_guard, timeout_result) = cvar.wait_timeout(guard, timeout).unwrap();
            guard = new_guard;
            if !guard.enabled {
                return;
            }
            if timeout_result.timed_out() {
                continue;
            }
        }
    }

    pub fn stop(&mut self) {
        {
            let (lock, cvar) = &*self.state;
            let mut guard = lock.lock().unwrap();
            guard.enabled = false;
            cvar.notify_all();
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("scheduler thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
