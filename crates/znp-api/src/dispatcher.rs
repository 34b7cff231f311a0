//! The frame dispatcher: one actor task owning the ordered handler list,
//! fed by a single channel carrying both inbound frames and new handler
//! installs (spec.md §4.1, §6).

use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use znp_proto::{CommandCode, Frame, FrameType, ZnpError};

use crate::events::EventHub;
use crate::handler::{Handler, PendingRequestHandler, WaiterHandler, WaiterSlot};
use crate::transport::RawTransport;

/// The one channel the actor task reads from. Collapsing "a handler was
/// installed" and "a frame arrived" into a single stream is what makes
/// installation-before-response ordering guaranteed rather than hoped for:
/// a handler queued ahead of a frame is guaranteed to be in the list before
/// that frame is processed, because both travel the same FIFO channel.
enum ActorMsg {
    Frame(Frame),
    Install(u64, Box<dyn Handler + Send>),
    /// Removes a handler that was installed but will never be matched —
    /// used when writing its triggering frame to the wire failed, so a
    /// stale handler doesn't linger and steal an unrelated later reply
    /// sharing the same command code.
    Withdraw(u64),
}

/// Ties the handler list, the raw transport, and the event buses together.
///
/// Constructed once per connection; cheap to clone via `Arc` and share
/// across the facade and any number of callers.
pub struct Mediator {
    tx: mpsc::UnboundedSender<ActorMsg>,
    raw: Arc<dyn RawTransport>,
    next_handler_id: AtomicU64,
    pub events: EventHub,
}

impl Mediator {
    /// Spawns the actor task and the frame-forwarding task, and returns a
    /// handle ready to accept requests. `inbound` is fed by the raw framing
    /// layer as frames are decoded off the wire.
    pub fn new(raw: Arc<dyn RawTransport>, inbound: mpsc::Receiver<Frame>) -> Arc<Self> {
        let (events, initial_handlers) = EventHub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let initial_handlers = initial_handlers.into_iter().map(|h| (0, h)).collect();

        tokio::spawn(run_actor(initial_handlers, rx));
        tokio::spawn(forward_inbound(inbound, tx.clone()));

        Arc::new(Self {
            tx,
            raw,
            next_handler_id: AtomicU64::new(1),
            events,
        })
    }

    /// Installs a handler and returns its id, so the caller can `withdraw`
    /// it if the frame that would complete it never makes it to the wire.
    fn install(&self, handler: Box<dyn Handler + Send>) -> u64 {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        // An unbounded sender never blocks; failure only means the actor
        // task has shut down, which we treat as "nothing left to install
        // for".
        let _ = self.tx.send(ActorMsg::Install(id, handler));
        id
    }

    fn withdraw(&self, id: u64) {
        let _ = self.tx.send(ActorMsg::Withdraw(id));
    }

    /// Sends a SREQ and awaits its SRSP (or a correlated `RPC_Error`),
    /// per spec.md §4.2. The handler is installed before the frame is
    /// written to the wire, so a response that arrives before `send_frame`
    /// even returns is never missed.
    pub async fn send_sreq(
        &self,
        frame: Frame,
        accepted_responses: HashSet<CommandCode>,
    ) -> Result<Bytes, ZnpError> {
        let (completion_tx, completion_rx) = oneshot::channel();
        let id = self.install(Box::new(PendingRequestHandler::new(
            accepted_responses,
            completion_tx,
        )));

        if let Err(e) = self.raw.send_frame(frame).await {
            self.withdraw(id);
            return Err(e);
        }

        completion_rx
            .await
            .map_err(|_| ZnpError::ProtocolError("dispatcher shut down before SRSP arrived".into()))?
    }

    /// Writes an AREQ to the wire with no correlation bookkeeping. Used for
    /// the handful of fire-and-forget commands that have no SRSP at all.
    pub async fn send_areq(&self, frame: Frame) -> Result<(), ZnpError> {
        self.raw.send_frame(frame).await
    }

    /// Waits for a matching frame for up to `timeout`, per spec.md §4.3.
    /// `prefix`, when set, both filters matches and is stripped from the
    /// returned payload.
    pub async fn wait_for(
        &self,
        frame_type: FrameType,
        command: CommandCode,
        prefix: Option<Bytes>,
        timeout: Duration,
    ) -> Result<Bytes, ZnpError> {
        let (completion_tx, completion_rx) = oneshot::channel();
        let slot = WaiterSlot::new(completion_tx);
        self.install(Box::new(WaiterHandler::new(
            frame_type,
            command,
            prefix,
            slot.clone(),
        )));

        spawn_timeout_timer(slot, timeout);

        completion_rx
            .await
            .map_err(|_| ZnpError::ProtocolError("dispatcher shut down before waiter resolved".into()))?
    }
}

fn spawn_timeout_timer(slot: Arc<WaiterSlot>, timeout: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if slot.claim_for_timeout() {
            slot.complete_timeout();
        }
    });
}

async fn forward_inbound(mut inbound: mpsc::Receiver<Frame>, tx: mpsc::UnboundedSender<ActorMsg>) {
    while let Some(frame) = inbound.recv().await {
        if tx.send(ActorMsg::Frame(frame)).is_err() {
            break;
        }
    }
}

type HandlerList = Vec<(u64, Box<dyn Handler + Send>)>;

async fn run_actor(mut handlers: HandlerList, mut rx: mpsc::UnboundedReceiver<ActorMsg>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            ActorMsg::Install(id, handler) => handlers.push((id, handler)),
            ActorMsg::Withdraw(id) => handlers.retain(|(hid, _)| *hid != id),
            ActorMsg::Frame(frame) => dispatch_frame(&mut handlers, &frame),
        }
    }
}

/// Walks the handler list in order, removing handlers that ask to be
/// removed and stopping at the first handler that claims the frame
/// (spec.md §4.1). A handler that panics is logged and treated as if it
/// had declined the frame, rather than taking down the actor task. A frame
/// no handler claims is logged at debug level and discarded.
fn dispatch_frame(handlers: &mut HandlerList, frame: &Frame) {
    let mut i = 0;
    while i < handlers.len() {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handlers[i].1.on_frame(frame)
        }));

        match outcome {
            Ok((stop, remove)) => {
                if remove {
                    handlers.remove(i);
                } else {
                    i += 1;
                }
                if stop {
                    return;
                }
            }
            Err(payload) => {
                tracing::error!(
                    panic = %describe_panic(&payload),
                    "handler panicked while processing frame; treating as unclaimed"
                );
                i += 1;
            }
        }
    }

    tracing::debug!(
        frame_type = ?frame.frame_type,
        command = ?frame.command,
        "frame claimed by no handler, discarding"
    );
}

fn describe_panic(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
