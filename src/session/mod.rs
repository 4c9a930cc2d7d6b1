//! GDB/MI session driver.
//!
//! Owns the debugger child process, serializes outgoing tokenized
//! commands, parses incoming records and dispatches them: command replies
//! resolve one-shot handlers from the pending table, everything else turns
//! into [`Event`]s for the UI.

pub mod process;

use crate::debugger::error::Error;
use crate::event::{Channel, Event, EventSender};
use crate::mi::{self, AsyncKind, AsyncRecord, OutOfBand, Record, ResultClass, StreamKind};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use once_cell::sync::Lazy;
use process::EnvOverlay;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;

/// MI protocol lines: an optional token followed by a record sigil, or a
/// `(gdb)` prompt. Anything else is inferior program output.
static MI_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d*(?:[*+=^]|\(gdb\))|[~@&])").unwrap());

/// Grace period between a polite exit request and the process-group kill.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<Record>>>>;

pub struct MiSession {
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: PendingTable,
    token: AtomicU64,
    pgid: Pid,
    exited: watch::Receiver<bool>,
}

impl MiSession {
    /// Spawn the debugger child and start its reader tasks. Must be called
    /// from within a tokio runtime.
    pub fn spawn(
        program: impl AsRef<Path>,
        args: &[String],
        cwd: &Path,
        env: &EnvOverlay,
        events: EventSender,
    ) -> Result<Self, Error> {
        let mut child = process::spawn(program, args, cwd, env)?;
        let stdin = child.stdin.take().expect("stdio is piped");
        let stdout = child.stdout.take().expect("stdio is piped");
        let stderr = child.stderr.take().expect("stdio is piped");
        // process_group(0) makes the child the leader of a fresh group.
        let pgid = Pid::from_raw(child.id().expect("child just spawned") as i32);

        let pending: PendingTable = Arc::default();
        let (exit_tx, exited) = watch::channel(false);
        let out_reader = tokio::spawn(read_stdout(stdout, pending.clone(), events.clone()));
        let err_reader = tokio::spawn(read_stderr(stderr, events.clone()));
        tokio::spawn(wait_child(child, exit_tx, events, [out_reader, err_reader]));

        Ok(Self {
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            token: AtomicU64::new(0),
            pgid,
            exited,
        })
    }

    /// Send a tokenized MI command and await the matching reply. An
    /// error-class reply rejects with [`Error::Mi`].
    pub async fn send_command(&self, command: &str) -> Result<Record, Error> {
        let record = self.request(command).await?;
        if record.class() == Some(ResultClass::Error) {
            let msg = record
                .result_str("msg")
                .unwrap_or("unknown gdb error")
                .to_string();
            return Err(Error::Mi {
                msg,
                command: command.to_string(),
            });
        }
        Ok(record)
    }

    /// Like [`MiSession::send_command`], but error-class replies resolve
    /// with the record. For commands that commonly fail benignly.
    pub async fn send_command_suppress(&self, command: &str) -> Result<Record, Error> {
        self.request(command).await
    }

    /// Write one line verbatim, with no token bookkeeping.
    pub async fn send_raw(&self, line: &str) -> Result<(), Error> {
        log::debug!(target: "session", "-> {line}");
        self.write(format!("{line}\n").as_bytes()).await
    }

    /// Ask gdb to exit; SIGKILL the process group if it lingers.
    pub async fn stop(&self) -> Result<(), Error> {
        self.send_raw("-gdb-exit").await?;
        self.reap().await;
        Ok(())
    }

    /// Detach from the target; the same watchdog applies.
    pub async fn detach(&self) -> Result<(), Error> {
        self.send_raw("-target-detach").await?;
        self.reap().await;
        Ok(())
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    async fn request(&self, command: &str) -> Result<Record, Error> {
        let token = self.token.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(token, tx);

        let line = format!("{token}-{command}\n");
        log::debug!(target: "session", "-> {}", line.trim_end());
        if let Err(err) = self.write(line.as_bytes()).await {
            self.pending.lock().unwrap().remove(&token);
            return Err(err);
        }

        rx.await.map_err(|_| Error::SessionClosed)
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), Error> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(bytes).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn reap(&self) {
        let mut exited = self.exited.clone();
        let wait = async {
            while !*exited.borrow() {
                if exited.changed().await.is_err() {
                    break;
                }
            }
        };
        if timeout(SHUTDOWN_GRACE, wait).await.is_err() {
            log::warn!(
                target: "session",
                "child did not exit within {SHUTDOWN_GRACE:?}, killing group {}",
                self.pgid
            );
            crate::weak_error!(killpg(self.pgid, Signal::SIGKILL), "killpg");
        }
    }
}

/// Buffer stdout and split on the *last* newline; the tail is re-examined
/// on the next read and flushed early when it cannot be an MI prefix, so
/// interactive prompts from the debuggee appear promptly.
async fn read_stdout(mut stdout: ChildStdout, pending: PendingTable, events: EventSender) {
    let mut buf = String::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read_n = match stdout.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.push_str(&String::from_utf8_lossy(&chunk[..read_n]));

        if let Some(pos) = buf.rfind('\n') {
            let complete: String = buf.drain(..=pos).collect();
            for line in complete.lines() {
                handle_line(line, &pending, &events);
            }
        }

        if !buf.is_empty() && !could_be_mi(&buf) {
            send_msg(&events, Channel::Stdout, std::mem::take(&mut buf));
        }
    }
    // Dropping the pending table wakes every waiting caller with an error.
    pending.lock().unwrap().clear();
}

async fn read_stderr(mut stderr: ChildStderr, events: EventSender) {
    let mut buf = String::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read_n = match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.push_str(&String::from_utf8_lossy(&chunk[..read_n]));
        if let Some(pos) = buf.rfind('\n') {
            let complete: String = buf.drain(..=pos).collect();
            send_msg(&events, Channel::Stderr, complete);
        }
        if !buf.is_empty() {
            send_msg(&events, Channel::Stderr, std::mem::take(&mut buf));
        }
    }
}

async fn wait_child(
    mut child: Child,
    exit_tx: watch::Sender<bool>,
    events: EventSender,
    readers: [tokio::task::JoinHandle<()>; 2],
) {
    match child.wait().await {
        Ok(status) => log::debug!(target: "session", "child exited: {status}"),
        Err(err) => log::warn!(target: "session", "wait for child: {err}"),
    }
    // The child's death closes its pipes; let both readers drain to EOF so
    // every record is dispatched before `Quit`.
    for reader in readers {
        let _ = reader.await;
    }
    let _ = exit_tx.send(true);
    let _ = events.send(Event::Quit);
}

fn handle_line(line: &str, pending: &PendingTable, events: &EventSender) {
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        return;
    }
    if !MI_LINE.is_match(line) {
        send_msg(events, Channel::Stdout, format!("{line}\n"));
        return;
    }

    log::debug!(target: "session", "<- {line}");
    match mi::parse_line(line) {
        Ok(record) => dispatch(record, pending, events),
        Err(err) => {
            log::warn!(target: "session", "{err}");
            send_msg(events, Channel::Log, format!("{err}\n"));
        }
    }
}

fn dispatch(record: Record, pending: &PendingTable, events: &EventSender) {
    for oob in &record.out_of_band {
        match oob {
            OutOfBand::Stream(stream) => {
                let channel = match stream.kind {
                    StreamKind::Console => Channel::Console,
                    StreamKind::Target => Channel::Target,
                    StreamKind::Log => Channel::Log,
                };
                send_msg(events, channel, stream.text.clone());
            }
            OutOfBand::Async(asy) => dispatch_async(asy, &record, events),
        }
    }

    // Only result records complete pending requests; async records may
    // carry the originating token but belong to the event stream.
    let handler = match (record.token, &record.result) {
        (Some(token), Some(_)) => pending.lock().unwrap().remove(&token),
        _ => None,
    };
    match handler {
        Some(tx) => {
            let _ = tx.send(record);
        }
        None => {
            if record.class() == Some(ResultClass::Error) {
                let msg = record.result_str("msg").unwrap_or("unknown gdb error");
                send_msg(events, Channel::Stderr, format!("{msg}\n"));
            } else if record.token.is_some() && record.result.is_some() {
                log::warn!(
                    target: "session",
                    "unhandled record with token {}",
                    record.token.unwrap_or_default()
                );
            }
        }
    }
}

fn dispatch_async(asy: &AsyncRecord, record: &Record, events: &EventSender) {
    match asy.kind {
        AsyncKind::Exec => {
            let _ = events.send(Event::ExecAsync(record.clone()));
            match asy.class.as_str() {
                "running" => {
                    let _ = events.send(Event::Running);
                }
                "stopped" => emit_stop(asy, events),
                other => {
                    log::debug!(target: "session", "ignoring exec async class `{other}`")
                }
            }
        }
        AsyncKind::Notify => match asy.class.as_str() {
            "thread-created" => {
                if let Some(id) = asy.results.u64_at("id") {
                    let _ = events.send(Event::ThreadCreated(id));
                }
            }
            "thread-exited" => {
                if let Some(id) = asy.results.u64_at("id") {
                    let _ = events.send(Event::ThreadExited(id));
                }
            }
            _ => {}
        },
        AsyncKind::Status => {}
    }
}

fn emit_stop(asy: &AsyncRecord, events: &EventSender) {
    let reason = asy.results.str_at("reason").unwrap_or("");
    let event = match reason {
        "breakpoint-hit" => Event::BreakpointHit(asy.clone()),
        "end-stepping-range" => Event::StepEnd(asy.clone()),
        "function-finished" => Event::StepOutEnd(asy.clone()),
        "signal-received" => Event::SignalStop(asy.clone()),
        "exited-normally" => Event::ExitedNormally,
        "exited" => {
            let code = asy.results.str_at("exit-code").unwrap_or("?");
            send_msg(events, Channel::Stderr, format!("inferior exited with code {code}\n"));
            Event::ExitedNormally
        }
        other => {
            send_msg(
                events,
                Channel::Stderr,
                format!("stop reason `{other}` not recognized, assuming exception\n"),
            );
            Event::Stopped(asy.clone())
        }
    };
    let _ = events.send(event);
}

fn send_msg(events: &EventSender, channel: Channel, text: String) {
    let _ = events.send(Event::Msg { channel, text });
}

/// A partial chunk that may still grow into an MI protocol line is held
/// back until its newline arrives; anything else is inferior output.
fn could_be_mi(chunk: &str) -> bool {
    let rest = chunk.trim_start_matches(|c: char| c.is_ascii_digit());
    match rest.as_bytes().first() {
        None => true,
        Some(b'*' | b'+' | b'=' | b'^' | b'~' | b'@' | b'&' | b'(') => true,
        Some(_) => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mi_line_classification() {
        for line in [
            "^done",
            "12^error,msg=\"x\"",
            "*stopped",
            "3*running",
            "=thread-created,id=\"1\"",
            "+download",
            "~\"hi\"",
            "@\"t\"",
            "&\"w\"",
            "(gdb)",
            "7(gdb)",
        ] {
            assert!(MI_LINE.is_match(line), "{line}");
        }
        for line in ["Enter a number: ", "hello world", "COBOL says 42"] {
            assert!(!MI_LINE.is_match(line), "{line}");
        }
    }

    #[test]
    fn test_could_be_mi_prefix() {
        for chunk in ["12", "12^do", "^done,bk", "*stop", "(gd", "~\"par", "34(g"] {
            assert!(could_be_mi(chunk), "{chunk}");
        }
        for chunk in ["Enter a number: ", "12 apples", "prompt> "] {
            assert!(!could_be_mi(chunk), "{chunk}");
        }
    }
}
