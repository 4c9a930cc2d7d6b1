//! Typed events delivered to the embedding UI.
//!
//! One variant per UI-visible event; command completions are not events
//! but one-shot continuations keyed by token inside the session.

use crate::mi::{AsyncRecord, Record};
use tokio::sync::mpsc;

/// Message channel a piece of text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Inferior (or compiler) standard output.
    Stdout,
    /// Inferior (or compiler) standard error, and unclaimed MI errors.
    Stderr,
    /// MI console stream (`~`).
    Console,
    /// MI log stream (`&`).
    Log,
    /// MI target stream (`@`).
    Target,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
            Channel::Console => "console",
            Channel::Log => "log",
            Channel::Target => "target",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Text output on one of the UI channels.
    Msg { channel: Channel, text: String },
    /// The debugger child exited (or the compile-only run finished).
    Quit,
    /// A child process could not be started.
    LaunchError(String),
    /// Load sequence finished; gdb is ready for breakpoints.
    DebugReady,
    /// The inferior resumed.
    Running,
    /// Stopped on a breakpoint.
    BreakpointHit(AsyncRecord),
    /// Stopped at the end of a stepping range.
    StepEnd(AsyncRecord),
    /// Stopped after finishing the current function.
    StepOutEnd(AsyncRecord),
    /// Stopped by a signal.
    SignalStop(AsyncRecord),
    /// The inferior exited.
    ExitedNormally,
    /// Stopped for an unrecognized reason.
    Stopped(AsyncRecord),
    ThreadCreated(u64),
    ThreadExited(u64),
    /// Every exec async record, verbatim, for UIs that want the raw feed.
    ExecAsync(Record),
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
