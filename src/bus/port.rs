//! Bus Port (§4.2): owns the raw CAN socket, fans inbound frames out to
//! registered handlers, and serializes outbound writes behind a loopback
//! confirmation.
//!
//! The original driver distinguishes a send's loopback echo from ordinary
//! traffic via the kernel's `MSG_CONFIRM` ancillary flag on a raw
//! `recvmsg`. The `socketcan` crate's safe API does not expose that flag,
//! so this port instead compares each inbound frame against the one
//! currently awaiting confirmation (identifier and data, while the write
//! mutex is held) — equivalent in effect for a single in-flight write,
//! which is all the write mutex ever allows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use socketcan::{CanFrame, EmbeddedFrame, ExtendedId, Frame as SocketCanFrameExt, Socket, SocketOptions};
use tracing::{debug, error, trace, warn};

use crate::bus::handler::FrameHandler;
use crate::error::{GatewayError, Result};
use crate::frame::header::Header;
use crate::frame::Frame;

const LISTENER_POLL: Duration = Duration::from_secs(1);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub trait Bus: Send + Sync {
    fn add_handler(&self, handler: Arc<dyn FrameHandler>);
    fn remove_handler(&self, handler: &Arc<dyn FrameHandler>);
    fn send(&self, frame: Frame) -> Result<()>;
}

struct PendingWrite {
    identifier: u32,
    data: Vec<u8>,
    confirmed: bool,
}

struct Shared {
    handlers: Mutex<Vec<Arc<dyn FrameHandler>>>,
    write_mutex: Mutex<()>,
    pending: Mutex<Option<PendingWrite>>,
    confirm_cv: Condvar,
    running: AtomicBool,
}

/// A raw CAN socket shared between the listener thread and `send` callers.
pub struct BusPort {
    shared: Arc<Shared>,
    socket: socketcan::CanSocket,
    listener: Option<std::thread::JoinHandle<()>>,
}

impl BusPort {
    pub fn open(interface: &str) -> Result<Self> {
        let socket = socketcan::CanSocket::open(interface)
            .map_err(|e| GatewayError::Fatal(format!("opening CAN interface {interface}: {e}")))?;
        socket
            .set_loopback(true)
            .map_err(|e| GatewayError::Fatal(format!("enabling loopback: {e}")))?;
        socket
            .set_recv_own_msgs(true)
            .map_err(|e| GatewayError::Fatal(format!("enabling own-message receipt: {e}")))?;
        socket
            .set_read_timeout(LISTENER_POLL)
            .map_err(|e| GatewayError::Fatal(format!("setting read timeout: {e}")))?;

        let shared = Arc::new(Shared {
            handlers: Mutex::new(Vec::new()),
            write_mutex: Mutex::new(()),
            pending: Mutex::new(None),
            confirm_cv: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let listener_socket = socket
            .try_clone()
            .map_err(|e| GatewayError::Fatal(format!("cloning CAN socket for listener: {e}")))?;
        let listener_shared = Arc::clone(&shared);
        let listener = std::thread::spawn(move || Self::listen(listener_socket, listener_shared));

        Ok(BusPort {
            shared,
            socket,
            listener: Some(listener),
        })
    }

    fn listen(socket: socketcan::CanSocket, shared: Arc<Shared>) {
        while shared.running.load(Ordering::SeqCst) {
            let frame = match socket.read_frame() {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) => {
                    error!("CAN read failed, terminating: {e}");
                    std::process::exit(1);
                }
            };

            let CanFrame::Data(data_frame) = frame else {
                continue;
            };
            let id = match data_frame.id() {
                socketcan::Id::Extended(eid) => eid.as_raw(),
                socketcan::Id::Standard(sid) => sid.as_raw() as u32,
            };
            let data = data_frame.data().to_vec();

            if Self::claim_as_confirmation(&shared, id, &data) {
                continue;
            }

            let header = match Header::decode(id) {
                Ok(h) => h,
                Err(e) => {
                    debug!("dropping frame with malformed header: {e}");
                    continue;
                }
            };
            let frame = Frame { header, data };
            trace!("recv {frame}");

            let handlers = shared.handlers.lock().unwrap();
            for handler in handlers.iter() {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.handle(&frame)))
                    .unwrap_or_else(|_| {
                        warn!("frame handler panicked, treating as unclaimed");
                        false
                    })
                {
                    break;
                }
            }
        }
    }

    fn claim_as_confirmation(shared: &Arc<Shared>, id: u32, data: &[u8]) -> bool {
        let mut pending = shared.pending.lock().unwrap();
        if let Some(p) = pending.as_mut() {
            if p.identifier == id && p.data == data {
                p.confirmed = true;
                shared.confirm_cv.notify_all();
                return true;
            }
        }
        false
    }
}

impl Bus for BusPort {
    fn add_handler(&self, handler: Arc<dyn FrameHandler>) {
        self.shared.handlers.lock().unwrap().push(handler);
    }

    fn remove_handler(&self, handler: &Arc<dyn FrameHandler>) {
        self.shared.handlers.lock().unwrap().retain(|h| !Arc::ptr_eq(h, handler));
    }

    fn send(&self, frame: Frame) -> Result<()> {
        let _write_guard = self.shared.write_mutex.lock().unwrap();
        trace!("send {frame}");

        let identifier = frame.identifier();
        let can_id = ExtendedId::new(identifier).ok_or_else(|| GatewayError::driver("identifier exceeds 29 bits"))?;
        let can_frame = CanFrame::from(
            socketcan::CanDataFrame::new(can_id, &frame.data)
                .ok_or_else(|| GatewayError::frame("data length exceeds 8 bytes"))?,
        );

        {
            let mut pending = self.shared.pending.lock().unwrap();
            *pending = Some(PendingWrite {
                identifier,
                data: frame.data.clone(),
                confirmed: false,
            });
        }

        self.socket
            .write_frame(&can_frame)
            .map_err(|e| GatewayError::CanIo(format!("writing frame: {e}")))?;

        let pending = self.shared.pending.lock().unwrap();
        let (guard, timeout_result) = self
            .shared
            .confirm_cv
            .wait_timeout_while(pending, WRITE_TIMEOUT, |p| !p.as_ref().map(|p| p.confirmed).unwrap_or(false))
            .unwrap();
        drop(guard);

        if timeout_result.timed_out() {
            return Err(GatewayError::CanIo("write confirmation timed out after 5s".into()));
        }
        Ok(())
    }
}

impl Drop for BusPort {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingHandler {
        claimed: StdMutex<Vec<Frame>>,
        claim: bool,
    }

    impl FrameHandler for RecordingHandler {
        fn handle(&self, frame: &Frame) -> bool {
            self.claimed.lock().unwrap().push(frame.clone());
            self.claim
        }
    }

    #[test]
    fn claim_as_confirmation_matches_pending_write() {
        let shared = Arc::new(Shared {
            handlers: Mutex::new(Vec::new()),
            write_mutex: Mutex::new(()),
            pending: Mutex::new(Some(PendingWrite {
                identifier: 42,
                data: vec![1, 2, 3],
                confirmed: false,
            })),
            confirm_cv: Condvar::new(),
            running: AtomicBool::new(true),
        });

        assert!(BusPort::claim_as_confirmation(&shared, 42, &[1, 2, 3]));
        assert!(shared.pending.lock().unwrap().as_ref().unwrap().confirmed);
        assert!(!BusPort::claim_as_confirmation(&shared, 99, &[0]));
    }

    #[test]
    fn add_and_remove_handler() {
        let shared = Shared {
            handlers: Mutex::new(Vec::new()),
            write_mutex: Mutex::new(()),
            pending: Mutex::new(None),
            confirm_cv: Condvar::new(),
            running: AtomicBool::new(true),
        };
        let handler: Arc<dyn FrameHandler> = Arc::new(RecordingHandler {
            claimed: StdMutex::new(Vec::new()),
            claim: false,
        });
        shared.handlers.lock().unwrap().push(Arc::clone(&handler));
        assert_eq!(shared.handlers.lock().unwrap().len(), 1);
        shared.handlers.lock().unwrap().retain(|h| !Arc::ptr_eq(h, &handler));
        assert_eq!(shared.handlers.lock().unwrap().len(), 0);
    }
}
