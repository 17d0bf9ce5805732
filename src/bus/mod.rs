//! Bus Port (§4.2): the shared CAN socket abstraction and its handler
//! registration protocol.

pub mod handler;
pub mod port;

pub use handler::FrameHandler;
pub use port::{Bus, BusPort};
