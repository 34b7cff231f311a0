//! The error taxonomy every ZNP API operation resolves its future with.

/// Every failure a pending request, waiter, or facade call can produce.
///
/// Every operation propagates to exactly one completion slot; the
/// dispatcher never swallows a request/waiter failure (it only swallows
/// *event* decode failures, which are logged and treated as a pass-through
/// rather than surfaced here — see `znp_api`'s event router).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ZnpError {
    /// A waiter's timer fired before a matching frame arrived.
    #[error("timed out waiting for response")]
    Timeout,

    /// Non-success status byte in a SRSP body.
    #[error("device returned non-success status 0x{0:02x}")]
    ZnpStatus(u8),

    /// The device rejected a SREQ via an out-of-band RPC_Error frame.
    #[error("device rejected request (RPC error code 0x{0:02x})")]
    RpcError(u8),

    /// Response too short, wrong command echoed, prefix mismatch, or a
    /// decoded follow-up frame disagreeing with the request that armed it.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Payload did not match the expected shape for its frame kind.
    #[error("failed to decode payload: {0}")]
    DecodeError(String),

    /// The device entered a state outside the caller's allowed corridor.
    #[error("device entered a disallowed state")]
    InvalidState,

    /// Surfaced unchanged from the raw transport.
    #[error("transport error: {0}")]
    TransportError(String),
}
