//! `ZnpClient`: the command-oriented facade built on top of the mediator's
//! request/response and event-subscription primitives (spec.md §4.8).

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use znp_proto::{
    check_only_status, check_status, commands, CommandCode, DeviceState, Frame, FrameType,
    IeeeAddr, ShortAddr, ZnpError,
};

use crate::dispatcher::Mediator;

/// `SYS.RESET_REQ`'s reset-type byte: whether the device resets itself
/// immediately or waits for the serial bootloader to take over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    Hard,
    Soft,
}

impl ResetType {
    fn to_byte(self) -> u8 {
        match self {
            ResetType::Hard => 0x00,
            ResetType::Soft => 0x01,
        }
    }
}

/// Device identity and network role, as reported by `SAPI.ZB_GET_DEVICE_INFO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ieee_addr: IeeeAddr,
    pub short_addr: ShortAddr,
    pub device_type: u8,
    pub state: DeviceState,
}

/// Outcome of an `AF.DATA_REQUEST` composite (spec.md §4.6): the SRSP
/// acknowledges acceptance into the outgoing queue, the AREQ confirms
/// (or fails) over-the-air delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConfirm {
    pub endpoint: u8,
    pub trans_id: u8,
}

/// Wraps a [`Mediator`] with named, typed operations.
///
/// Cloning is cheap — everything is held behind `Arc`.
#[derive(Clone)]
pub struct ZnpClient {
    mediator: Arc<Mediator>,
    waiter_timeout: Duration,
    af_confirm_timeout: Duration,
}

impl ZnpClient {
    pub fn new(mediator: Arc<Mediator>, waiter_timeout: Duration, af_confirm_timeout: Duration) -> Self {
        Self {
            mediator,
            waiter_timeout,
            af_confirm_timeout,
        }
    }

    /// `SYS.RESET_REQ` is fire-and-forget on the wire and has no SRSP.
    /// Returns once the transmit succeeds; the device's own confirmation is
    /// the unsolicited `SYS.RESET_IND` AREQ, which a caller observes by
    /// subscribing to `mediator.events.sys_reset` separately.
    pub async fn reset(&self, reset_type: ResetType) -> Result<(), ZnpError> {
        let frame = Frame::new(FrameType::Areq, commands::SYS_RESET_REQ, vec![reset_type.to_byte()]);
        self.mediator.send_areq(frame).await
    }

    pub async fn ping(&self) -> Result<u16, ZnpError> {
        let frame = Frame::new(FrameType::Sreq, commands::SYS_PING, Bytes::new());
        let reply = self
            .mediator
            .send_sreq(frame, one(commands::SYS_PING))
            .await?;
        if reply.len() != 2 {
            return Err(ZnpError::DecodeError(format!(
                "SYS_PING reply expects 2 bytes, got {}",
                reply.len()
            )));
        }
        Ok(u16::from_le_bytes([reply[0], reply[1]]))
    }

    pub async fn nv_read(&self, item_id: u16, offset: u8) -> Result<Bytes, ZnpError> {
        let mut payload = BytesMut::with_capacity(3);
        payload.extend_from_slice(&item_id.to_le_bytes());
        payload.extend_from_slice(&[offset]);
        let frame = Frame::new(FrameType::Sreq, commands::SYS_NV_READ, payload.freeze());
        let reply = self
            .mediator
            .send_sreq(frame, one(commands::SYS_NV_READ))
            .await?;
        check_status(&reply)
    }

    pub async fn nv_write(&self, item_id: u16, offset: u8, data: &[u8]) -> Result<(), ZnpError> {
        let mut payload = BytesMut::with_capacity(4 + data.len());
        payload.extend_from_slice(&item_id.to_le_bytes());
        payload.extend_from_slice(&[offset, data.len() as u8]);
        payload.extend_from_slice(data);
        let frame = Frame::new(FrameType::Sreq, commands::SYS_NV_WRITE, payload.freeze());
        let reply = self
            .mediator
            .send_sreq(frame, one(commands::SYS_NV_WRITE))
            .await?;
        check_only_status(&reply)
    }

    pub async fn permit_join(&self, dest: ShortAddr, duration_secs: u8) -> Result<(), ZnpError> {
        let mut payload = BytesMut::with_capacity(4);
        payload.extend_from_slice(&dest.0.to_le_bytes());
        payload.extend_from_slice(&[duration_secs, 0x00]);
        let frame = Frame::new(FrameType::Sreq, commands::ZDO_MGMT_PERMIT_JOIN_REQ, payload.freeze());
        let reply = self
            .mediator
            .send_sreq(frame, one(commands::ZDO_MGMT_PERMIT_JOIN_REQ))
            .await?;
        check_only_status(&reply)
    }

    pub async fn bind(
        &self,
        src: IeeeAddr,
        src_endpoint: u8,
        dst: IeeeAddr,
        dst_endpoint: u8,
        cluster_id: u16,
    ) -> Result<(), ZnpError> {
        let payload = encode_bind(src, src_endpoint, dst, dst_endpoint, cluster_id);
        let frame = Frame::new(FrameType::Sreq, commands::ZDO_BIND_REQ, payload);
        let reply = self.mediator.send_sreq(frame, one(commands::ZDO_BIND_REQ)).await?;
        check_only_status(&reply)
    }

    pub async fn unbind(
        &self,
        src: IeeeAddr,
        src_endpoint: u8,
        dst: IeeeAddr,
        dst_endpoint: u8,
        cluster_id: u16,
    ) -> Result<(), ZnpError> {
        let payload = encode_bind(src, src_endpoint, dst, dst_endpoint, cluster_id);
        let frame = Frame::new(FrameType::Sreq, commands::ZDO_UNBIND_REQ, payload);
        let reply = self
            .mediator
            .send_sreq(frame, one(commands::ZDO_UNBIND_REQ))
            .await?;
        check_only_status(&reply)
    }

    pub async fn mgmt_leave(
        &self,
        dest: ShortAddr,
        target: IeeeAddr,
        remove_children: bool,
        rejoin: bool,
    ) -> Result<(), ZnpError> {
        let mut payload = BytesMut::with_capacity(11);
        payload.extend_from_slice(&dest.0.to_le_bytes());
        payload.extend_from_slice(&target.0.to_le_bytes());
        let flags = (remove_children as u8) << 6 | (rejoin as u8) << 7;
        payload.extend_from_slice(&[flags]);
        let frame = Frame::new(FrameType::Sreq, commands::ZDO_MGMT_LEAVE_REQ, payload.freeze());
        let reply = self
            .mediator
            .send_sreq(frame, one(commands::ZDO_MGMT_LEAVE_REQ))
            .await?;
        check_only_status(&reply)
    }

    pub async fn get_device_info(&self) -> Result<DeviceInfo, ZnpError> {
        let frame = Frame::new(FrameType::Sreq, commands::SAPI_GET_DEVICE_INFO, Bytes::new());
        let reply = self
            .mediator
            .send_sreq(frame, one(commands::SAPI_GET_DEVICE_INFO))
            .await?;
        let body = check_status(&reply)?;
        if body.len() != 12 {
            return Err(ZnpError::DecodeError(format!(
                "SAPI_GET_DEVICE_INFO body expects 12 bytes, got {}",
                body.len()
            )));
        }
        let ieee_addr = IeeeAddr(u64::from_le_bytes(body[0..8].try_into().unwrap()));
        let short_addr = ShortAddr(u16::from_le_bytes([body[8], body[9]]));
        let device_type = body[10];
        let state = DeviceState::from_byte(body[11])
            .ok_or_else(|| ZnpError::DecodeError(format!("unknown device state 0x{:02x}", body[11])))?;
        Ok(DeviceInfo {
            ieee_addr,
            short_addr,
            device_type,
            state,
        })
    }

    /// Sends an `AF.DATA_REQUEST`, verifies the SRSP accepted it, then waits
    /// for the matching `AF.DATA_CONFIRM` and validates it against the
    /// request (spec.md §4.6). The SRSP status is checked before the AREQ
    /// waiter is ever installed, so a rejected request fails immediately
    /// instead of stalling for `af_confirm_timeout` waiting for a confirm
    /// that a rejected request will never produce.
    pub async fn af_data_request(
        &self,
        dest: ShortAddr,
        dest_endpoint: u8,
        src_endpoint: u8,
        cluster_id: u16,
        trans_id: u8,
        options: u8,
        radius: u8,
        data: &[u8],
    ) -> Result<DataConfirm, ZnpError> {
        let mut payload = BytesMut::with_capacity(9 + data.len());
        payload.extend_from_slice(&dest.0.to_le_bytes());
        payload.extend_from_slice(&[dest_endpoint, src_endpoint]);
        payload.extend_from_slice(&cluster_id.to_le_bytes());
        payload.extend_from_slice(&[trans_id, options, radius, data.len() as u8]);
        payload.extend_from_slice(data);
        let frame = Frame::new(FrameType::Sreq, commands::AF_DATA_REQUEST, payload.freeze());

        let srsp = self
            .mediator
            .send_sreq(frame, one(commands::AF_DATA_REQUEST))
            .await?;
        check_only_status(&srsp)?;

        let confirm = self
            .mediator
            .wait_for(
                FrameType::Areq,
                commands::AF_DATA_CONFIRM,
                None,
                self.af_confirm_timeout,
            )
            .await?;
        let confirm_body = check_status(&confirm)?;
        if confirm_body.len() != 2 {
            return Err(ZnpError::DecodeError(format!(
                "AF_DATA_CONFIRM body expects 2 bytes, got {}",
                confirm_body.len()
            )));
        }
        let confirmed_endpoint = confirm_body[0];
        let confirmed_trans_id = confirm_body[1];
        if confirmed_endpoint != src_endpoint || confirmed_trans_id != trans_id {
            return Err(ZnpError::ProtocolError(format!(
                "AF_DATA_CONFIRM (endpoint={confirmed_endpoint}, trans_id={confirmed_trans_id}) \
                 does not match request (endpoint={src_endpoint}, trans_id={trans_id})"
            )));
        }
        Ok(DataConfirm {
            endpoint: confirmed_endpoint,
            trans_id: confirmed_trans_id,
        })
    }

    /// Waits until the device's reported state reaches `end_states`,
    /// enforcing the "never leave the allowed corridor" liveness property
    /// along the way (spec.md §4.5).
    ///
    /// Subscribes before probing the current state via `get_device_info`,
    /// so an event published between the probe and the subscribe can never
    /// be missed. If the device is already in an end state this returns
    /// immediately; if it's already outside `allowed_states`, or a
    /// delivered state-change event ever is, this fails with
    /// `InvalidState` rather than waiting further.
    pub async fn wait_for_state(
        &self,
        end_states: &[DeviceState],
        allowed_states: &[DeviceState],
        timeout: Duration,
    ) -> Result<DeviceState, ZnpError> {
        let mut subscription = self.mediator.events.zdo_state_change.subscribe();

        let current = self.get_device_info().await?.state;
        if end_states.contains(&current) {
            return Ok(current);
        }
        if !allowed_states.contains(&current) {
            return Err(ZnpError::InvalidState);
        }

        let wait = async {
            loop {
                match subscription.recv().await {
                    Some(state) if end_states.contains(&state) => return Ok(state),
                    Some(state) if !allowed_states.contains(&state) => {
                        return Err(ZnpError::InvalidState)
                    }
                    Some(_) => continue,
                    None => {
                        return Err(ZnpError::ProtocolError(
                            "state-change event bus closed".into(),
                        ))
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ZnpError::Timeout)?
    }

    /// A live feed of device state-change notifications, independent of
    /// `wait_for_state`'s corridor logic — useful for callers that want to
    /// observe transitions rather than block for a target.
    pub fn state_events(&self) -> crate::events::EventSubscription<DeviceState> {
        self.mediator.events.zdo_state_change.subscribe()
    }
}

fn one(command: CommandCode) -> std::collections::HashSet<CommandCode> {
    std::iter::once(command).collect()
}

fn encode_bind(
    src: IeeeAddr,
    src_endpoint: u8,
    dst: IeeeAddr,
    dst_endpoint: u8,
    cluster_id: u16,
) -> Bytes {
    let mut payload = BytesMut::with_capacity(21);
    payload.extend_from_slice(&src.0.to_le_bytes());
    payload.extend_from_slice(&[src_endpoint]);
    payload.extend_from_slice(&cluster_id.to_le_bytes());
    payload.extend_from_slice(&[0x03]); // addr mode: 64-bit extended
    payload.extend_from_slice(&dst.0.to_le_bytes());
    payload.extend_from_slice(&[dst_endpoint]);
    payload.freeze()
}
