//! The "status byte then optional body" convention pervasive in ZNP SRSPs.

use bytes::Bytes;

use crate::ZnpError;

/// Strip and check the leading status byte of a SRSP payload.
///
/// Fails with `ProtocolError` if the payload is empty, `ZnpStatus(code)` if
/// the status byte is nonzero, otherwise returns the remaining bytes.
pub fn check_status(payload: &Bytes) -> Result<Bytes, ZnpError> {
    if payload.is_empty() {
        return Err(ZnpError::ProtocolError("empty response".into()));
    }
    let status = payload[0];
    if status != 0x00 {
        return Err(ZnpError::ZnpStatus(status));
    }
    Ok(payload.slice(1..))
}

/// As `check_status`, but also fails if there is a body beyond the status
/// byte (the common case for SRSPs that carry no data).
pub fn check_only_status(payload: &Bytes) -> Result<(), ZnpError> {
    let tail = check_status(payload)?;
    if !tail.is_empty() {
        return Err(ZnpError::ProtocolError(format!(
            "expected status-only response, got {} trailing bytes",
            tail.len()
        )));
    }
    Ok(())
}
