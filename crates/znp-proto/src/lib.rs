//! Wire-level data model for the ZNP protocol.
//!
//! This crate is pure data and pure functions: frame/command-code shapes,
//! the `RPC_Error` correlation codec, the status-byte convention, and the
//! error taxonomy every higher-level operation resolves with. It does no
//! I/O and knows nothing about dispatch, timers, or transports — those
//! live in `znp-api`.

mod command;
pub mod commands;
mod domain;
mod error;
mod rpc_error;
mod status;

pub use command::{CommandCode, Frame, FrameType, Subsystem};
pub use domain::{DeviceState, IeeeAddr, ShortAddr};
pub use error::ZnpError;
pub use rpc_error::RpcErrorInfo;
pub use status::{check_only_status, check_status};
