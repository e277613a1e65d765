//! Decides which hook events become breakpoints.

use std::sync::Arc;

use crate::context::DebugContext;
use crate::event::{BreakpointEvent, FrameKind, HookKind};
use crate::registry::Debugger;

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Hand the event to the remote handler.
    Escalate,
    /// Drop the event.
    Ignore(IgnoreReason),
}

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The frame is not running script code.
    NonScriptFrame,
    /// A call to a function without a known name.
    AnonymousCall,
    /// A line inside a chunk loaded from a string.
    StringChunk,
    /// Instruction-count hooks are reserved and never escalate.
    CountHook,
    /// An event kind without a policy.
    Unhandled(HookKind),
}

/// Apply the escalation policy to one event.
pub fn classify(event: &BreakpointEvent) -> Escalation {
    use Escalation::*;
    use IgnoreReason::*;

    if event.frame_kind != FrameKind::Script {
        return Ignore(NonScriptFrame);
    }
    match event.kind {
        HookKind::Call if event.function_name.is_some() => Escalate,
        HookKind::Call => Ignore(AnonymousCall),
        HookKind::Line if event.is_file_backed() => Escalate,
        HookKind::Line => Ignore(StringChunk),
        HookKind::Return => Escalate,
        HookKind::Count => Ignore(CountHook),
        kind @ (HookKind::TailReturn | HookKind::Unknown(_)) => Ignore(Unhandled(kind)),
    }
}

/// Run one event through the policy and, if the handler asks for it, park
/// the calling execution thread until the context is resumed.
pub(crate) fn dispatch(debugger: &Debugger, context: &Arc<DebugContext>, event: BreakpointEvent) {
    match classify(&event) {
        Escalation::Escalate => {}
        Escalation::Ignore(IgnoreReason::Unhandled(kind)) => {
            tracing::debug!(handle = %context.handle(), ?kind, "ignoring unhandled hook event");
            return;
        }
        Escalation::Ignore(reason) => {
            tracing::trace!(handle = %context.handle(), ?reason, "hook event ignored");
            return;
        }
    }

    // The handler may announce the pause before returning; the context has
    // to be Paused before any resume can get at it.
    let hand_off = debugger.remote().hold();
    let handled = match debugger.bridge().handle_breakpoint(context, &event) {
        Ok(handled) => handled,
        // Reload already requested; the hit is dropped.
        Err(_) => return,
    };
    if handled {
        return;
    }
    let paused = context.pause(event);
    drop(hand_off);

    if let Err(e) = paused {
        tracing::debug!(handle = %context.handle(), "not pausing: {}", e);
        return;
    }
    context.wait_while_paused_with(debugger.wait_strategy());
}
