//! End-to-end tests against an in-memory fake transport, covering the
//! request/response correlation, timed-waiter, and event-routing
//! invariants.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use znp_api::{commands, Frame, FrameType, Mediator, RawTransport, ZnpClient, ZnpError};

/// Captures every frame written to the wire so tests can assert on what
/// was sent, and hands back a channel the test drives to simulate
/// inbound traffic from the device.
struct FakeTransport {
    sent: Mutex<Vec<Frame>>,
}

impl FakeTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn last_sent(&self) -> Frame {
        self.sent.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl RawTransport for FakeTransport {
    async fn send_frame(&self, frame: Frame) -> Result<(), ZnpError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }
}

/// Wires a fake transport to a mediator plus a handle for injecting
/// inbound frames, as if the raw framing layer had just decoded them.
fn harness() -> (Arc<FakeTransport>, Arc<Mediator>, mpsc::Sender<Frame>) {
    let transport = FakeTransport::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let mediator = Mediator::new(transport.clone(), inbound_rx);
    (transport, mediator, inbound_tx)
}

fn client(mediator: Arc<Mediator>) -> ZnpClient {
    ZnpClient::new(mediator, Duration::from_millis(500), Duration::from_millis(500))
}

#[tokio::test]
async fn ping_round_trips_through_srsp() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        inbound
            .send(Frame::new(FrameType::Srsp, commands::SYS_PING, &[0x34, 0x12][..]))
            .await
            .unwrap();
    });

    let capabilities = client.ping().await.unwrap();
    assert_eq!(capabilities, 0x1234);
    responder.await.unwrap();
}

#[tokio::test]
async fn rpc_error_correlates_to_the_refused_sreq() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        // error 0x02, refusing a SREQ to SYS.PING (subsystem 0x01, id 0x01)
        inbound
            .send(Frame::new(
                FrameType::Srsp,
                znp_api::CommandCode::rpc_error(),
                &[0x02, 0x01, 0x01][..],
            ))
            .await
            .unwrap();
    });

    let err = client.ping().await.unwrap_err();
    assert_eq!(err, ZnpError::RpcError(0x02));
    responder.await.unwrap();
}

#[tokio::test]
async fn unrelated_rpc_error_does_not_resolve_a_different_pending_request() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    // An RPC_Error refusing some other command (AF.DATA_REQUEST) must be
    // passed through rather than claimed by our outstanding SYS.PING.
    let bogus_refusal = Frame::new(
        FrameType::Srsp,
        znp_api::CommandCode::rpc_error(),
        &[0x02, 0x04, 0x01][..],
    );
    let real_reply = Frame::new(FrameType::Srsp, commands::SYS_PING, &[0x00, 0x00][..]);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        inbound.send(bogus_refusal).await.unwrap();
        inbound.send(real_reply).await.unwrap();
    });

    let capabilities = client.ping().await.unwrap();
    assert_eq!(capabilities, 0);
    responder.await.unwrap();
}

#[tokio::test]
async fn reset_returns_once_the_areq_is_transmitted_with_no_internal_wait() {
    let (transport, mediator, _inbound) = harness();
    let client = client(mediator);

    client.reset(znp_api::ResetType::Soft).await.unwrap();

    let sent = transport.last_sent();
    assert_eq!(sent.frame_type, FrameType::Areq);
    assert_eq!(sent.command, commands::SYS_RESET_REQ);
    assert_eq!(sent.payload.as_ref(), &[0x01][..]);
}

#[tokio::test]
async fn sys_reset_ind_reaches_a_subscriber_independent_of_reset() {
    let (_transport, mediator, inbound) = harness();
    let mut sys_reset = mediator.events.sys_reset.subscribe();

    inbound
        .send(Frame::new(
            FrameType::Areq,
            commands::SYS_RESET_IND,
            &[0x02, 0x00, 0x01, 0x02, 0x07, 0x01][..],
        ))
        .await
        .unwrap();

    let info = sys_reset.recv().await.unwrap();
    assert_eq!(info.reason, 0x02);
}

#[tokio::test]
async fn mgmt_leave_correlates_its_rpc_error_refusal() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        // error 0x02, refusing a SREQ to ZDO.MGMT_LEAVE_REQ (subsystem 0x05, id 0x34)
        inbound
            .send(Frame::new(
                FrameType::Srsp,
                znp_api::CommandCode::rpc_error(),
                &[0x02, 0x05, 0x34][..],
            ))
            .await
            .unwrap();
    });

    let err = client
        .mgmt_leave(znp_api::ShortAddr(0xABCD), znp_api::IeeeAddr(0x1), false, false)
        .await
        .unwrap_err();
    assert_eq!(err, ZnpError::RpcError(0x02));
    responder.await.unwrap();
}

#[tokio::test]
async fn nv_write_resolves_void_on_success_status() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        inbound
            .send(Frame::new(FrameType::Srsp, commands::SYS_NV_WRITE, &[0x00][..]))
            .await
            .unwrap();
    });

    client.nv_write(0x0001, 0, &[0xAA]).await.unwrap();
    responder.await.unwrap();
}

#[tokio::test]
async fn nv_write_fails_with_znp_status_on_nonzero_status() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        inbound
            .send(Frame::new(FrameType::Srsp, commands::SYS_NV_WRITE, &[0x0A][..]))
            .await
            .unwrap();
    });

    let err = client.nv_write(0x0001, 0, &[0xAA]).await.unwrap_err();
    assert_eq!(err, ZnpError::ZnpStatus(10));
    responder.await.unwrap();
}

#[tokio::test]
async fn waiter_times_out_when_nothing_arrives() {
    let (_transport, mediator, _inbound) = harness();
    let err = mediator
        .wait_for(
            FrameType::Areq,
            commands::ZDO_STATE_CHANGE_IND,
            None,
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
    assert_eq!(err, ZnpError::Timeout);
}

#[tokio::test]
async fn waiter_with_prefix_resolves_on_a_matching_frame_and_strips_the_prefix() {
    let (_transport, mediator, inbound) = harness();

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        // ZDO.BIND_RSP prefixed by DstAddr=0x1234 (little-endian), followed
        // by the status byte the prefix doesn't cover.
        inbound
            .send(Frame::new(
                FrameType::Areq,
                commands::ZDO_BIND_REQ,
                &[0x34, 0x12, 0x00][..],
            ))
            .await
            .unwrap();
    });

    let result = mediator
        .wait_for(
            FrameType::Areq,
            commands::ZDO_BIND_REQ,
            Some(bytes::Bytes::from_static(&[0x34, 0x12])),
            Duration::from_millis(200),
        )
        .await
        .unwrap();
    assert_eq!(result.as_ref(), &[0x00]);
    responder.await.unwrap();
}

#[tokio::test]
async fn af_data_request_validates_endpoint_and_trans_id_on_confirm() {
    let (transport, mediator, inbound) = harness();
    let client = client(mediator);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        inbound
            .send(Frame::new(FrameType::Srsp, commands::AF_DATA_REQUEST, &[0x00][..]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        // status=0, endpoint=1, trans_id=7, matching the request below
        inbound
            .send(Frame::new(FrameType::Areq, commands::AF_DATA_CONFIRM, &[0x00, 0x01, 0x07][..]))
            .await
            .unwrap();
    });

    let confirm = client
        .af_data_request(znp_api::ShortAddr(0x1234), 2, 1, 0x0006, 7, 0x00, 0x0F, &[0xAA])
        .await
        .unwrap();
    assert_eq!(confirm.endpoint, 1);
    assert_eq!(confirm.trans_id, 7);
    responder.await.unwrap();

    let sent = transport.last_sent();
    assert_eq!(sent.command, commands::AF_DATA_REQUEST);
}

#[tokio::test]
async fn af_data_request_rejects_mismatched_confirm() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        inbound
            .send(Frame::new(FrameType::Srsp, commands::AF_DATA_REQUEST, &[0x00][..]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        // trans_id 9 does not match the request's trans_id 7
        inbound
            .send(Frame::new(FrameType::Areq, commands::AF_DATA_CONFIRM, &[0x00, 0x01, 0x09][..]))
            .await
            .unwrap();
    });

    let err = client
        .af_data_request(znp_api::ShortAddr(0x1234), 2, 1, 0x0006, 7, 0x00, 0x0F, &[0xAA])
        .await
        .unwrap_err();
    assert!(matches!(err, ZnpError::ProtocolError(_)));
    responder.await.unwrap();
}

#[tokio::test]
async fn af_data_request_fails_immediately_on_rejected_srsp_without_waiting_for_a_confirm() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        // status=0x0A: the device refused the request outright.
        inbound
            .send(Frame::new(FrameType::Srsp, commands::AF_DATA_REQUEST, &[0x0A][..]))
            .await
            .unwrap();
        // No AF_DATA_CONFIRM ever follows; if the composite waited for one
        // anyway it would only resolve after af_confirm_timeout (500ms).
    });

    let started = std::time::Instant::now();
    let err = client
        .af_data_request(znp_api::ShortAddr(0x1234), 2, 1, 0x0006, 7, 0x00, 0x0F, &[0xAA])
        .await
        .unwrap_err();
    assert_eq!(err, ZnpError::ZnpStatus(0x0A));
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "rejected SRSP should fail well before af_confirm_timeout"
    );
    responder.await.unwrap();
}

#[tokio::test]
async fn zdo_state_change_event_reaches_subscribers_in_order() {
    let (_transport, mediator, inbound) = harness();

    let mut first = mediator.events.zdo_state_change.subscribe();
    let mut second = mediator.events.zdo_state_change.subscribe();

    inbound
        .send(Frame::new(FrameType::Areq, commands::ZDO_STATE_CHANGE_IND, &[0x06][..]))
        .await
        .unwrap();

    assert_eq!(first.recv().await, Some(znp_api::DeviceState::Started));
    assert_eq!(second.recv().await, Some(znp_api::DeviceState::Started));
}

#[tokio::test]
async fn dropped_subscription_stops_receiving_further_events() {
    let (_transport, mediator, inbound) = harness();

    let mut kept = mediator.events.zdo_state_change.subscribe();
    {
        let _dropped = mediator.events.zdo_state_change.subscribe();
    }

    inbound
        .send(Frame::new(FrameType::Areq, commands::ZDO_STATE_CHANGE_IND, &[0x06][..]))
        .await
        .unwrap();

    assert_eq!(kept.recv().await, Some(znp_api::DeviceState::Started));
}

/// Injects a `SAPI.ZB_GET_DEVICE_INFO` SRSP reporting `state` after a short
/// delay, the way a responder task answers `get_device_info`'s probe.
fn spawn_device_info_responder(inbound: mpsc::Sender<Frame>, state: znp_api::DeviceState) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut body = vec![0x00]; // status
        body.extend_from_slice(&0x0011223344556677u64.to_le_bytes()); // ieee
        body.extend_from_slice(&0x5678u16.to_le_bytes()); // short addr
        body.push(0x02); // device type
        body.push(state_to_byte(state));
        inbound
            .send(Frame::new(FrameType::Srsp, commands::SAPI_GET_DEVICE_INFO, body))
            .await
            .unwrap();
    });
}

fn state_to_byte(state: znp_api::DeviceState) -> u8 {
    use znp_api::DeviceState::*;
    match state {
        Hold => 0x00,
        InitNoStack => 0x01,
        Init => 0x02,
        NwkDiscovery => 0x03,
        NwkJoining => 0x04,
        EndDeviceUnauthenticated => 0x05,
        Started => 0x06,
        NwkRejoining => 0x09,
        Orphan => 0x0A,
    }
}

const STARTUP_CORRIDOR: &[znp_api::DeviceState] = &[
    znp_api::DeviceState::Hold,
    znp_api::DeviceState::Init,
    znp_api::DeviceState::NwkJoining,
    znp_api::DeviceState::Started,
];

#[tokio::test]
async fn wait_for_state_returns_immediately_if_device_info_already_reports_target() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    spawn_device_info_responder(inbound, znp_api::DeviceState::Started);

    let state = client
        .wait_for_state(
            &[znp_api::DeviceState::Started],
            STARTUP_CORRIDOR,
            Duration::from_millis(200),
        )
        .await
        .unwrap();
    assert_eq!(state, znp_api::DeviceState::Started);
}

#[tokio::test]
async fn wait_for_state_fails_fast_if_current_state_is_outside_the_allowed_corridor() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    spawn_device_info_responder(inbound, znp_api::DeviceState::Orphan);

    let err = client
        .wait_for_state(
            &[znp_api::DeviceState::Started],
            STARTUP_CORRIDOR,
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
    assert_eq!(err, ZnpError::InvalidState);
}

#[tokio::test]
async fn wait_for_state_resolves_after_traversing_the_startup_corridor() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    spawn_device_info_responder(inbound.clone(), znp_api::DeviceState::Hold);

    let waiting = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .wait_for_state(
                    &[znp_api::DeviceState::Started],
                    STARTUP_CORRIDOR,
                    Duration::from_millis(500),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    for state in [
        znp_api::DeviceState::Init,
        znp_api::DeviceState::NwkJoining,
        znp_api::DeviceState::Started,
    ] {
        inbound
            .send(Frame::new(
                FrameType::Areq,
                commands::ZDO_STATE_CHANGE_IND,
                vec![state_to_byte(state)],
            ))
            .await
            .unwrap();
    }

    assert_eq!(waiting.await.unwrap().unwrap(), znp_api::DeviceState::Started);
}

#[tokio::test]
async fn wait_for_state_fails_when_a_delivered_state_leaves_the_allowed_corridor() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    spawn_device_info_responder(inbound.clone(), znp_api::DeviceState::Hold);

    let waiting = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .wait_for_state(
                    &[znp_api::DeviceState::Started],
                    STARTUP_CORRIDOR,
                    Duration::from_millis(500),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    for state in [znp_api::DeviceState::Init, znp_api::DeviceState::NwkJoining] {
        inbound
            .send(Frame::new(
                FrameType::Areq,
                commands::ZDO_STATE_CHANGE_IND,
                vec![state_to_byte(state)],
            ))
            .await
            .unwrap();
    }
    // ORPHAN in place of STARTED: outside the allowed corridor.
    inbound
        .send(Frame::new(
            FrameType::Areq,
            commands::ZDO_STATE_CHANGE_IND,
            vec![state_to_byte(znp_api::DeviceState::Orphan)],
        ))
        .await
        .unwrap();

    assert_eq!(waiting.await.unwrap().unwrap_err(), ZnpError::InvalidState);
}

#[tokio::test]
async fn concurrent_sreqs_of_different_kinds_do_not_cross_respond() {
    let (_transport, mediator, inbound) = harness();
    let client = client(mediator);

    let ping = {
        let client = client.clone();
        tokio::spawn(async move { client.ping().await })
    };
    let nv_read = {
        let client = client.clone();
        tokio::spawn(async move { client.nv_read(0x0001, 0).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    inbound
        .send(Frame::new(FrameType::Srsp, commands::SYS_NV_READ, &[0x00, 0xAA][..]))
        .await
        .unwrap();
    inbound
        .send(Frame::new(FrameType::Srsp, commands::SYS_PING, &[0x01, 0x00][..]))
        .await
        .unwrap();

    let (ping_result, nv_result) = tokio::join!(ping, nv_read);
    assert_eq!(ping_result.unwrap().unwrap(), 1);
    assert_eq!(nv_result.unwrap().unwrap().as_ref(), &[0xAA]);
}
