//! Codec for the out-of-band `RPC_Error` correlation payload.
//!
//! Wire layout (3 bytes): `[error_code, packed, id]` where
//! `packed = (original_subsystem & 0x0F) | (original_type << 4)`. The
//! original `(type, subsystem, id)` reconstructs the command being refused.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{CommandCode, FrameType, Subsystem, ZnpError};

/// A decoded `RPC_Error` frame: the vendor error code plus the command it
/// retroactively refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcErrorInfo {
    pub error_code: u8,
    pub original_type: FrameType,
    pub original_command: CommandCode,
}

impl RpcErrorInfo {
    /// Decode a 3-byte `RPC_Error` payload.
    ///
    /// A malformed payload (wrong length, unrecognized subsystem/type
    /// nibble) is reported as a `DecodeError`; callers treat that as an
    /// unclaimed frame rather than a claimed-but-failed one.
    pub fn decode(payload: &[u8]) -> Result<Self, ZnpError> {
        if payload.len() != 3 {
            return Err(ZnpError::DecodeError(format!(
                "RPC_Error payload must be 3 bytes, got {}",
                payload.len()
            )));
        }
        let error_code = payload[0];
        let packed = payload[1];
        let id = payload[2];

        let subsystem = Subsystem::from_u8(packed & 0x0F)
            .ok_or_else(|| ZnpError::DecodeError(format!("unknown subsystem nibble in 0x{packed:02x}")))?;
        let original_type = FrameType::from_type_nibble((packed >> 4) & 0x0F)
            .ok_or_else(|| ZnpError::DecodeError(format!("unknown type nibble in 0x{packed:02x}")))?;

        Ok(Self {
            error_code,
            original_type,
            original_command: CommandCode::new(subsystem, id),
        })
    }

    /// Encode back to the 3-byte wire representation (used by tests that
    /// synthesize RPC_Error frames, and available to a raw layer that wants
    /// to build one).
    pub fn encode(&self) -> Bytes {
        let packed = (self.original_command.subsystem.to_u8() & 0x0F)
            | (self.original_type.type_nibble() << 4);
        let mut buf = BytesMut::with_capacity(3);
        buf.put_u8(self.error_code);
        buf.put_u8(packed);
        buf.put_u8(self.original_command.id);
        buf.freeze()
    }
}
