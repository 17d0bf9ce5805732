//! 29-bit extended CAN identifier: pack/unpack of the five header fields.
//!
//! Layout (LSB first): `program_type` (8), `program_id` (8), `function_id`
//! (8), `message_format` (3), `message_type` (2), 3 unused bits. Packing
//! never relies on the in-memory layout of a bit-field struct — every field
//! is shifted and masked explicitly.

use crate::error::{GatewayError, Result};

/// Only the "short" message format is implemented anywhere in this gateway.
pub const MESSAGE_FORMAT_SHORT: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
    Error,
}

impl MessageType {
    fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(MessageType::Request),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::Error),
            other => Err(GatewayError::frame(format!(
                "unknown message_type bits {other:#04b}"
            ))),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            MessageType::Request => 0,
            MessageType::Response => 2,
            MessageType::Error => 3,
        }
    }
}

/// The five fields packed into a CAN extended identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub program_type: u8,
    pub program_id: u8,
    pub function_id: u8,
    pub message_format: u8,
    pub message_type: MessageType,
}

impl Header {
    pub fn new(program_type: u8, program_id: u8, function_id: u8, message_type: MessageType) -> Self {
        Header {
            program_type,
            program_id,
            function_id,
            message_format: MESSAGE_FORMAT_SHORT,
            message_type,
        }
    }

    /// Builds the 29-bit value to place in an extended CAN identifier.
    pub fn encode(self) -> u32 {
        let mut id: u32 = 0;
        id |= self.program_type as u32;
        id |= (self.program_id as u32) << 8;
        id |= (self.function_id as u32) << 16;
        id |= ((self.message_format & 0x07) as u32) << 24;
        id |= ((self.message_type.to_bits() & 0x03) as u32) << 27;
        id
    }

    /// Extracts the five fields from a 29-bit (or wider) identifier.
    pub fn decode(id: u32) -> Result<Self> {
        let program_type = (id & 0xFF) as u8;
        let program_id = ((id >> 8) & 0xFF) as u8;
        let function_id = ((id >> 16) & 0xFF) as u8;
        let message_format = ((id >> 24) & 0x07) as u8;
        let message_type = MessageType::from_bits(((id >> 27) & 0x03) as u8)?;

        if message_format != MESSAGE_FORMAT_SHORT {
            return Err(GatewayError::frame(format!(
                "unsupported message_format {message_format}"
            )));
        }

        Ok(Header {
            program_type,
            program_id,
            function_id,
            message_format,
            message_type,
        })
    }

    /// Returns a copy of this header with `message_type` switched to
    /// `Response`, as every request handler does before sending its reply.
    pub fn as_response(self) -> Self {
        Header {
            message_type: MessageType::Response,
            ..self
        }
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pt={} pid={} fn={} fmt={} mt={:?}",
            self.program_type, self.program_id, self.function_id, self.message_format, self.message_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let h = Header::new(11, 0x0B, 10, MessageType::Request);
        let decoded = Header::decode(h.encode()).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn scenario_a_fields_round_trip() {
        let h = Header::new(11, 0x0B, 10, MessageType::Request);
        assert_eq!(h.program_id, 0x0B);
        assert_eq!(h.function_id, 10);
        let resp = h.as_response();
        assert_eq!(resp.message_type, MessageType::Response);
        assert_eq!(resp.program_type, h.program_type);
    }

    #[test]
    fn rejects_long_message_format() {
        let mut id = Header::new(11, 1, 1, MessageType::Request).encode();
        id |= 1 << 24; // message_format = 1, unsupported
        assert!(Header::decode(id).is_err());
    }
}
