//! Frame Codec (§4.1): the 29-bit identifier plus 0-8 data bytes, and the
//! parameter-payload shapes carried inside the data region.

pub mod header;
pub mod ids;
pub mod mapping_point;
pub mod payload;

pub use header::{Header, MessageType};
pub use mapping_point::MappingPoint;
pub use payload::{raw_info, IndexedParameter, UnindexedParameter};

use crate::error::{GatewayError, Result};

/// A fully-formed CAN frame: the extended identifier plus its data bytes.
/// The extended-frame flag is implicit — every frame this gateway emits or
/// accepts is extended, so the flag is applied at the bus-socket boundary
/// rather than carried in this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(header: Header, data: Vec<u8>) -> Result<Self> {
        if data.len() > payload::MAX_DATA_LEN {
            return Err(GatewayError::frame(format!(
                "data length {} exceeds 8 bytes",
                data.len()
            )));
        }
        Ok(Frame { header, data })
    }

    /// Builds the RESPONSE frame for an inbound REQUEST: same header fields
    /// except `message_type`, with the given payload bytes (§4.6).
    pub fn response_to(request: &Frame, data: Vec<u8>) -> Result<Self> {
        Frame::new(request.header.as_response(), data)
    }

    pub fn identifier(&self) -> u32 {
        self.header.encode()
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] data={:02X?}", self.header, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::header::MessageType;

    #[test]
    fn response_swaps_message_type_only() {
        let req = Frame::new(Header::new(11, 0x0B, 10, MessageType::Request), vec![]).unwrap();
        let resp = Frame::response_to(&req, vec![1, 0]).unwrap();
        assert_eq!(resp.header.message_type, MessageType::Response);
        assert_eq!(resp.header.program_id, req.header.program_id);
        assert_eq!(resp.data, vec![1, 0]);
    }

    #[test]
    fn rejects_oversized_data() {
        let data = vec![0u8; 9];
        assert!(Frame::new(Header::new(0, 0, 0, MessageType::Request), data).is_err());
    }
}
