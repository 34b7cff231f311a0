//! The raw framing layer's interface, consumed but not implemented here.
//!
//! The byte-level SOF/length/FCS framing over a serial port is out of
//! scope (spec.md §1). The mediator only needs a way to transmit a frame
//! and a channel on which frames are delivered; both are plain Rust types
//! so any concrete transport (serial port, mock, recorded fixture) can
//! plug in.

use async_trait::async_trait;
use znp_proto::{Frame, ZnpError};

/// Outbound half of the raw framing layer.
///
/// `send_frame` must not fail for protocol reasons (spec.md §6) — only
/// transport-level failures (a severed serial link, a write error) should
/// surface as `Err`, and they propagate unchanged as `ZnpError::TransportError`.
#[async_trait]
pub trait RawTransport: Send + Sync {
    async fn send_frame(&self, frame: Frame) -> Result<(), ZnpError>;
}
