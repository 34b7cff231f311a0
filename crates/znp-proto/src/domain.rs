//! Small Zigbee addressing/state value types shared by the facade and the
//! event payload shapes.

use serde::{Deserialize, Serialize};

/// 16-bit Zigbee network address of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortAddr(pub u16);

/// 64-bit IEEE (MAC) address of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IeeeAddr(pub u64);

/// ZNP device state, as reported by `SAPI.ZB_GET_DEVICE_INFO` and
/// `ZDO_STATE_CHANGE_IND`.
///
/// The startup corridor this spec's state-wait helper enforces is
/// `Hold -> Init -> (NwkDiscovery | NwkJoining | NwkRejoining) -> Started`.
/// `Started` collapses the vendor's distinct "running" states
/// (end-device, router, coordinator) since the helper only cares whether
/// the device has finished joining, not what role it ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Hold,
    InitNoStack,
    Init,
    NwkDiscovery,
    NwkJoining,
    NwkRejoining,
    EndDeviceUnauthenticated,
    Started,
    Orphan,
}

impl DeviceState {
    /// Decode the single status byte ZNP uses for device state.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(DeviceState::Hold),
            0x01 => Some(DeviceState::InitNoStack),
            0x02 => Some(DeviceState::Init),
            0x03 => Some(DeviceState::NwkDiscovery),
            0x04 => Some(DeviceState::NwkJoining),
            0x05 => Some(DeviceState::EndDeviceUnauthenticated),
            0x06 => Some(DeviceState::Started),
            0x07 => Some(DeviceState::Started), // router
            0x08 => Some(DeviceState::Started), // coordinator
            0x09 => Some(DeviceState::NwkRejoining),
            0x0A => Some(DeviceState::Orphan),
            _ => None,
        }
    }
}
