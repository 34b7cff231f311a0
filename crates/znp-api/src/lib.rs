//! Request/response correlation and event dispatch core for the ZNP
//! protocol: turns a stream of decoded frames plus a way to send them into
//! a set of async operations a caller can await (spec.md §1).
//!
//! This crate knows nothing about serial ports, SOF/length/FCS framing, or
//! byte-level checksums — see [`transport::RawTransport`] for the boundary.

mod dispatcher;
mod events;
mod facade;
mod handler;
mod transport;

pub use dispatcher::Mediator;
pub use events::{
    EndDeviceAnnounce, EventBus, EventHub, EventPayload, EventSubscription, IncomingMsg,
    PermitJoinIndication, ResetInfo, TrustCenterDevice,
};
pub use facade::{DataConfirm, DeviceInfo, ResetType, ZnpClient};
pub use transport::RawTransport;

pub use znp_proto::{
    check_only_status, check_status, commands, CommandCode, DeviceState, Frame, FrameType,
    IeeeAddr, RpcErrorInfo, ShortAddr, Subsystem, ZnpError,
};
