//! Named command codes for the subset of MT commands the facade and event
//! router need. Ids follow the published TI Z-Stack Monitor & Test API
//! tables (e.g. `SYS_RESET_IND` = 0x80, `AF_INCOMING_MSG` = 0x81).

use crate::command::{CommandCode, Subsystem};

pub const SYS_RESET_REQ: CommandCode = CommandCode::new(Subsystem::Sys, 0x00);
pub const SYS_PING: CommandCode = CommandCode::new(Subsystem::Sys, 0x01);
pub const SYS_NV_READ: CommandCode = CommandCode::new(Subsystem::Sys, 0x08);
pub const SYS_NV_WRITE: CommandCode = CommandCode::new(Subsystem::Sys, 0x09);
pub const SYS_RESET_IND: CommandCode = CommandCode::new(Subsystem::Sys, 0x80);

pub const AF_DATA_REQUEST: CommandCode = CommandCode::new(Subsystem::Af, 0x01);
pub const AF_DATA_CONFIRM: CommandCode = CommandCode::new(Subsystem::Af, 0x80);
pub const AF_INCOMING_MSG: CommandCode = CommandCode::new(Subsystem::Af, 0x81);

pub const ZDO_BIND_REQ: CommandCode = CommandCode::new(Subsystem::Zdo, 0x21);
pub const ZDO_UNBIND_REQ: CommandCode = CommandCode::new(Subsystem::Zdo, 0x22);
pub const ZDO_MGMT_LEAVE_REQ: CommandCode = CommandCode::new(Subsystem::Zdo, 0x34);
pub const ZDO_MGMT_PERMIT_JOIN_REQ: CommandCode = CommandCode::new(Subsystem::Zdo, 0x36);
pub const ZDO_STATE_CHANGE_IND: CommandCode = CommandCode::new(Subsystem::Zdo, 0xC0);
pub const ZDO_END_DEVICE_ANNCE_IND: CommandCode = CommandCode::new(Subsystem::Zdo, 0xC1);
pub const ZDO_TC_DEV_IND: CommandCode = CommandCode::new(Subsystem::Zdo, 0xCA);
pub const ZDO_PERMIT_JOIN_IND: CommandCode = CommandCode::new(Subsystem::Zdo, 0xCB);

pub const SAPI_GET_DEVICE_INFO: CommandCode = CommandCode::new(Subsystem::Sapi, 0x06);
