//! Event router: permanent handlers that decode AREQ payloads and fan them
//! out to subscriber lists (spec.md §4.4).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use znp_proto::{commands, CommandCode, DeviceState, Frame, FrameType, IeeeAddr, ShortAddr, ZnpError};

use crate::handler::{Handler, HandlerAction};

/// Decodes one event kind's AREQ payload into its typed shape.
///
/// `ALLOW_PARTIAL` mirrors the table in spec.md §6: when set, `decode`
/// should only consume the documented prefix and ignore trailing bytes
/// (`INCOMING_MSG` carries data beyond its documented structure); when
/// clear, trailing bytes must be treated as a decode failure.
pub trait EventPayload: Clone + Send + 'static {
    const ALLOW_PARTIAL: bool;
    fn decode(payload: &[u8]) -> Result<Self, ZnpError>;
}

/// `SYS.RESET_IND`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetInfo {
    pub reason: u8,
    pub transport_rev: u8,
    pub product_id: u8,
    pub major_rel: u8,
    pub minor_rel: u8,
    pub maint_rel: u8,
}

impl EventPayload for ResetInfo {
    const ALLOW_PARTIAL: bool = false;

    fn decode(payload: &[u8]) -> Result<Self, ZnpError> {
        if payload.len() != 6 {
            return Err(ZnpError::DecodeError(format!(
                "ResetInfo expects 6 bytes, got {}",
                payload.len()
            )));
        }
        Ok(Self {
            reason: payload[0],
            transport_rev: payload[1],
            product_id: payload[2],
            major_rel: payload[3],
            minor_rel: payload[4],
            maint_rel: payload[5],
        })
    }
}

impl EventPayload for DeviceState {
    const ALLOW_PARTIAL: bool = false;

    fn decode(payload: &[u8]) -> Result<Self, ZnpError> {
        if payload.len() != 1 {
            return Err(ZnpError::DecodeError(format!(
                "DeviceState expects 1 byte, got {}",
                payload.len()
            )));
        }
        DeviceState::from_byte(payload[0])
            .ok_or_else(|| ZnpError::DecodeError(format!("unknown device state 0x{:02x}", payload[0])))
    }
}

/// `ZDO.END_DEVICE_ANNCE_IND`: `(ShortAddr, ShortAddr, IEEEAddr, capabilities)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndDeviceAnnounce {
    pub src_addr: ShortAddr,
    pub nwk_addr: ShortAddr,
    pub ieee_addr: IeeeAddr,
    pub capabilities: u8,
}

impl EventPayload for EndDeviceAnnounce {
    const ALLOW_PARTIAL: bool = false;

    fn decode(payload: &[u8]) -> Result<Self, ZnpError> {
        if payload.len() != 13 {
            return Err(ZnpError::DecodeError(format!(
                "EndDeviceAnnounce expects 13 bytes, got {}",
                payload.len()
            )));
        }
        Ok(Self {
            src_addr: ShortAddr(u16::from_le_bytes([payload[0], payload[1]])),
            nwk_addr: ShortAddr(u16::from_le_bytes([payload[2], payload[3]])),
            ieee_addr: IeeeAddr(u64::from_le_bytes(payload[4..12].try_into().unwrap())),
            capabilities: payload[12],
        })
    }
}

/// `ZDO.TC_DEV_IND`: `(ShortAddr, IEEEAddr, ShortAddr)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustCenterDevice {
    pub nwk_addr: ShortAddr,
    pub ieee_addr: IeeeAddr,
    pub parent_addr: ShortAddr,
}

impl EventPayload for TrustCenterDevice {
    const ALLOW_PARTIAL: bool = false;

    fn decode(payload: &[u8]) -> Result<Self, ZnpError> {
        if payload.len() != 12 {
            return Err(ZnpError::DecodeError(format!(
                "TrustCenterDevice expects 12 bytes, got {}",
                payload.len()
            )));
        }
        Ok(Self {
            nwk_addr: ShortAddr(u16::from_le_bytes([payload[0], payload[1]])),
            ieee_addr: IeeeAddr(u64::from_le_bytes(payload[2..10].try_into().unwrap())),
            parent_addr: ShortAddr(u16::from_le_bytes([payload[10], payload[11]])),
        })
    }
}

/// `ZDO.PERMIT_JOIN_IND`: a single status/duration byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitJoinIndication(pub u8);

impl EventPayload for PermitJoinIndication {
    const ALLOW_PARTIAL: bool = false;

    fn decode(payload: &[u8]) -> Result<Self, ZnpError> {
        if payload.len() != 1 {
            return Err(ZnpError::DecodeError(format!(
                "PermitJoinIndication expects 1 byte, got {}",
                payload.len()
            )));
        }
        Ok(Self(payload[0]))
    }
}

/// `AF.INCOMING_MSG`. Carries trailing bytes beyond this documented prefix
/// (group list length, cluster-specific tail) — `ALLOW_PARTIAL` is set, so
/// `decode` only consumes the fixed header plus the declared `data` and
/// ignores anything after it rather than failing on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMsg {
    pub group_id: ShortAddr,
    pub cluster_id: u16,
    pub src_addr: ShortAddr,
    pub src_endpoint: u8,
    pub dst_endpoint: u8,
    pub was_broadcast: bool,
    pub link_quality: u8,
    pub security_use: bool,
    pub timestamp: u32,
    pub trans_seq_number: u8,
    pub data: bytes::Bytes,
}

impl EventPayload for IncomingMsg {
    const ALLOW_PARTIAL: bool = true;

    fn decode(payload: &[u8]) -> Result<Self, ZnpError> {
        const HEADER_LEN: usize = 17;
        if payload.len() < HEADER_LEN {
            return Err(ZnpError::DecodeError(format!(
                "IncomingMsg header needs {HEADER_LEN} bytes, got {}",
                payload.len()
            )));
        }
        let data_len = payload[16] as usize;
        if payload.len() < HEADER_LEN + data_len {
            return Err(ZnpError::DecodeError(format!(
                "IncomingMsg declares {data_len} data bytes but only {} remain",
                payload.len() - HEADER_LEN
            )));
        }
        Ok(Self {
            group_id: ShortAddr(u16::from_le_bytes([payload[0], payload[1]])),
            cluster_id: u16::from_le_bytes([payload[2], payload[3]]),
            src_addr: ShortAddr(u16::from_le_bytes([payload[4], payload[5]])),
            src_endpoint: payload[6],
            dst_endpoint: payload[7],
            was_broadcast: payload[8] != 0,
            link_quality: payload[9],
            security_use: payload[10] != 0,
            timestamp: u32::from_le_bytes(payload[11..15].try_into().unwrap()),
            trans_seq_number: payload[15],
            // trailing bytes past `data` (if any) are ignored, per ALLOW_PARTIAL
            data: bytes::Bytes::copy_from_slice(&payload[HEADER_LEN..HEADER_LEN + data_len]),
        })
    }
}

type SubscriptionId = u64;

struct BusInner<T> {
    subscribers: Mutex<Vec<(SubscriptionId, mpsc::UnboundedSender<T>)>>,
    next_id: AtomicU64,
}

/// One subscriber list for a single event kind.
///
/// Subscribing returns a handle that unsubscribes itself on `Drop` — the
/// concrete mechanism behind "the subscription disconnects itself on
/// completion" (spec.md §4.5, §9).
pub struct EventBus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<T: Clone> EventBus<T> {
    pub fn subscribe(&self) -> EventSubscription<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().unwrap().push((id, tx));
        EventSubscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver to every subscriber, in registration order (spec.md §8
    /// invariant 5). A subscriber whose receiver has been dropped is
    /// pruned rather than treated as an error.
    fn dispatch(&self, event: &T) {
        let mut subs = self.inner.subscribers.lock().unwrap();
        subs.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

/// A live subscription to one event kind. Await `recv()` for the next
/// delivered event; dropping (or calling `unsubscribe`) removes this
/// subscriber from the bus.
pub struct EventSubscription<T> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<T>,
    bus: Weak<BusInner<T>>,
}

impl<T> EventSubscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Explicit self-disconnect, equivalent to dropping this handle.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for EventSubscription<T> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers.lock().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}

/// The permanent dispatcher handler for one event kind (spec.md §4.4).
///
/// Installed once at `Mediator::new` time, ahead of any per-request
/// handler, and never self-removes.
pub(crate) struct EventRouterHandler<T: EventPayload> {
    command: CommandCode,
    bus: Arc<BusInner<T>>,
}

impl<T: EventPayload> EventRouterHandler<T> {
    pub fn new(command: CommandCode, bus: &EventBus<T>) -> Self {
        Self {
            command,
            bus: bus.inner.clone(),
        }
    }
}

impl<T: EventPayload> Handler for EventRouterHandler<T> {
    fn on_frame(&mut self, frame: &Frame) -> HandlerAction {
        if frame.frame_type != FrameType::Areq || frame.command != self.command {
            return (false, false);
        }
        match T::decode(&frame.payload) {
            Ok(event) => {
                let mut subs = self.bus.subscribers.lock().unwrap();
                subs.retain(|(_, tx)| tx.send(event.clone()).is_ok());
                (true, false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode event payload, leaving frame unclaimed");
                (false, false)
            }
        }
    }
}

/// Every subscribable event bus, plus the router handlers that feed them.
///
/// Built once in `Mediator::new` so the router handlers can be installed
/// ahead of any per-request handler (spec.md §4.4); the buses themselves
/// are held onto for `subscribe_*` calls made afterward.
pub struct EventHub {
    pub sys_reset: Arc<EventBus<ResetInfo>>,
    pub zdo_state_change: Arc<EventBus<DeviceState>>,
    pub zdo_end_device_announce: Arc<EventBus<EndDeviceAnnounce>>,
    pub zdo_trust_center_device: Arc<EventBus<TrustCenterDevice>>,
    pub zdo_permit_join: Arc<EventBus<PermitJoinIndication>>,
    pub af_incoming_msg: Arc<EventBus<IncomingMsg>>,
}

impl EventHub {
    /// Builds the hub and the six permanent router handlers that must be
    /// installed into the dispatcher's handler list before it starts
    /// processing frames.
    pub(crate) fn new() -> (Self, Vec<Box<dyn Handler + Send>>) {
        let sys_reset: Arc<EventBus<ResetInfo>> = Arc::default();
        let zdo_state_change: Arc<EventBus<DeviceState>> = Arc::default();
        let zdo_end_device_announce: Arc<EventBus<EndDeviceAnnounce>> = Arc::default();
        let zdo_trust_center_device: Arc<EventBus<TrustCenterDevice>> = Arc::default();
        let zdo_permit_join: Arc<EventBus<PermitJoinIndication>> = Arc::default();
        let af_incoming_msg: Arc<EventBus<IncomingMsg>> = Arc::default();

        let routers: Vec<Box<dyn Handler + Send>> = vec![
            Box::new(EventRouterHandler::new(commands::SYS_RESET_IND, &sys_reset)),
            Box::new(EventRouterHandler::new(
                commands::ZDO_STATE_CHANGE_IND,
                &zdo_state_change,
            )),
            Box::new(EventRouterHandler::new(
                commands::ZDO_END_DEVICE_ANNCE_IND,
                &zdo_end_device_announce,
            )),
            Box::new(EventRouterHandler::new(
                commands::ZDO_TC_DEV_IND,
                &zdo_trust_center_device,
            )),
            Box::new(EventRouterHandler::new(
                commands::ZDO_PERMIT_JOIN_IND,
                &zdo_permit_join,
            )),
            Box::new(EventRouterHandler::new(
                commands::AF_INCOMING_MSG,
                &af_incoming_msg,
            )),
        ];

        (
            Self {
                sys_reset,
                zdo_state_change,
                zdo_end_device_announce,
                zdo_trust_center_device,
                zdo_permit_join,
                af_incoming_msg,
            },
            routers,
        )
    }
}
