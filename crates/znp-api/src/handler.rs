//! The handler list primitive the frame dispatcher walks.
//!
//! spec.md §9 notes the source's type-erased callables can equivalently be
//! modeled as tagged variants, each with a typed `on_frame`. We use trait
//! objects instead of an enum so `PendingRequestHandler`, `WaiterHandler`,
//! and the event router's per-kind handlers stay in their own modules
//! without a central enum needing to know about all of them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::oneshot;
use znp_proto::{CommandCode, Frame, FrameType, RpcErrorInfo, ZnpError};

/// `(stop_processing, remove_me)` — see spec.md §3 "Handler".
pub type HandlerAction = (bool, bool);

/// A callable attached to the dispatcher's ordered handler list.
pub trait Handler: Send {
    fn on_frame(&mut self, frame: &Frame) -> HandlerAction;
}

/// The request tracker's installed handler for one outstanding SREQ.
///
/// Claims the matching SRSP or a correlated `RPC_Error`, completes the
/// single-shot slot, and always removes itself on the frame it claims
/// (spec.md §4.2).
pub struct PendingRequestHandler {
    accepted_responses: HashSet<CommandCode>,
    completion: Option<oneshot::Sender<Result<Bytes, ZnpError>>>,
}

impl PendingRequestHandler {
    pub fn new(
        accepted_responses: HashSet<CommandCode>,
        completion: oneshot::Sender<Result<Bytes, ZnpError>>,
    ) -> Self {
        Self {
            accepted_responses,
            completion: Some(completion),
        }
    }
}

impl Handler for PendingRequestHandler {
    fn on_frame(&mut self, frame: &Frame) -> HandlerAction {
        if frame.frame_type != FrameType::Srsp {
            return (false, false);
        }

        if self.accepted_responses.contains(&frame.command) {
            if let Some(tx) = self.completion.take() {
                let _ = tx.send(Ok(frame.payload.clone()));
            }
            return (true, true);
        }

        if frame.command == CommandCode::rpc_error() {
            return match RpcErrorInfo::decode(&frame.payload) {
                Ok(info)
                    if info.original_type == FrameType::Sreq
                        && self.accepted_responses.contains(&info.original_command) =>
                {
                    if let Some(tx) = self.completion.take() {
                        let _ = tx.send(Err(ZnpError::RpcError(info.error_code)));
                    }
                    (true, true)
                }
                Ok(_) => (false, false), // refuses someone else's request
                Err(e) => {
                    tracing::warn!(error = %e, "malformed RPC_Error payload, treating as unclaimed");
                    (false, false)
                }
            };
        }

        (false, false)
    }
}

/// Shared completion slot for a waiter, claimed exactly once by whichever
/// of {matching frame, timer expiry} happens first (spec.md §4.3).
pub(crate) struct WaiterSlot {
    pub active: AtomicBool,
    pub completion: Mutex<Option<oneshot::Sender<Result<Bytes, ZnpError>>>>,
}

impl WaiterSlot {
    pub fn new(completion: oneshot::Sender<Result<Bytes, ZnpError>>) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
            completion: Mutex::new(Some(completion)),
        })
    }

    /// Called by the timer task. Returns true if the timer won the race
    /// (i.e. the waiter was still active) and the caller should complete
    /// with `Timeout`.
    pub fn claim_for_timeout(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    fn take_completion(&self) -> Option<oneshot::Sender<Result<Bytes, ZnpError>>> {
        self.completion.lock().unwrap().take()
    }

    /// Resolves the waiter with `ZnpError::Timeout`. Only meaningful after
    /// `claim_for_timeout` returned true for this slot.
    pub fn complete_timeout(&self) {
        if let Some(tx) = self.take_completion() {
            let _ = tx.send(Err(ZnpError::Timeout));
        }
    }
}

/// The timed waiter's installed handler (spec.md §4.3).
///
/// On every invocation it first checks `active`: if the timer already won
/// the race, this handler reports `remove_me = true` without claiming the
/// frame — the documented lazy-removal behavior, rather than having the
/// timer reach into the handler list directly.
pub struct WaiterHandler {
    frame_type: FrameType,
    command: CommandCode,
    prefix: Option<Bytes>,
    slot: Arc<WaiterSlot>,
}

impl WaiterHandler {
    pub fn new(
        frame_type: FrameType,
        command: CommandCode,
        prefix: Option<Bytes>,
        slot: Arc<WaiterSlot>,
    ) -> Self {
        Self {
            frame_type,
            command,
            prefix,
            slot,
        }
    }
}

impl Handler for WaiterHandler {
    fn on_frame(&mut self, frame: &Frame) -> HandlerAction {
        if !self.slot.active.load(Ordering::SeqCst) {
            // Timer already fired; we're a no-op from here on.
            return (false, true);
        }

        if frame.frame_type != self.frame_type || frame.command != self.command {
            return (false, false);
        }

        let matches_prefix = match &self.prefix {
            Some(prefix) => frame.payload.len() >= prefix.len() && &frame.payload[..prefix.len()] == prefix.as_ref(),
            None => true,
        };
        if !matches_prefix {
            return (false, false);
        }

        // Claim the race against the timer.
        if !self.slot.active.swap(false, Ordering::SeqCst) {
            return (false, true);
        }

        let value = match &self.prefix {
            Some(prefix) if !prefix.is_empty() => frame.payload.slice(prefix.len()..),
            _ => frame.payload.clone(),
        };

        if let Some(tx) = self.slot.take_completion() {
            let _ = tx.send(Ok(value));
        }
        (true, true)
    }
}
