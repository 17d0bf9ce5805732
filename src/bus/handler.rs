//! The single-method handler interface frames are dispatched to (§4.2).

use crate::frame::Frame;

/// Implemented by each gateway that wants a chance to claim inbound frames.
/// `handle` returns `true` to claim the frame (stopping dispatch to later
/// handlers) or `false` to let it fall through.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, frame: &Frame) -> bool;
}
