//! ZNP Probe - exercise the correlation engine against a loopback stub
//!
//! Usage: cargo run --example znp_probe -- [OPTIONS]
//!
//! Options:
//!   -t, --timeout <MS>   Waiter timeout in milliseconds [default: 2000]
//!
//! There is no real serial transport in this crate (that boundary is
//! intentionally out of scope), so this probe wires the mediator to a
//! loopback stub that answers `SYS.PING` itself, purely to demonstrate the
//! request/response plumbing end to end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use znp_api::{commands, Frame, FrameType, Mediator, RawTransport, ZnpClient, ZnpError};

struct LoopbackStub {
    inbound: mpsc::Sender<Frame>,
}

#[async_trait]
impl RawTransport for LoopbackStub {
    async fn send_frame(&self, frame: Frame) -> Result<(), ZnpError> {
        if frame.frame_type == FrameType::Sreq && frame.command == commands::SYS_PING {
            let reply = Frame::new(FrameType::Srsp, commands::SYS_PING, &[0x2F, 0x00][..]);
            let tx = self.inbound.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = tx.send(reply).await;
            });
        }
        Ok(())
    }
}

fn parse_timeout_ms() -> u64 {
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        if (args[i] == "-t" || args[i] == "--timeout") && i + 1 < args.len() {
            return args[i + 1].parse().unwrap_or(2000);
        }
        i += 1;
    }
    2000
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let timeout_ms = parse_timeout_ms();
    println!("znp-probe: timeout={timeout_ms}ms");

    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let transport: Arc<dyn RawTransport> = Arc::new(LoopbackStub { inbound: inbound_tx });
    let mediator = Mediator::new(transport, inbound_rx);
    let client = ZnpClient::new(
        mediator,
        Duration::from_millis(timeout_ms),
        Duration::from_millis(timeout_ms),
    );

    let start = Instant::now();
    match client.ping().await {
        Ok(capabilities) => println!(
            "SYS.PING ok, capabilities=0x{capabilities:04x}, elapsed={:?}",
            start.elapsed()
        ),
        Err(e) => println!("SYS.PING failed: {e}"),
    }

    Ok(())
}
