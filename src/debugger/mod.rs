//! High-level debugger facade.
//!
//! Composes the MI session and the source map: every operation accepts and
//! returns COBOL coordinates, translating to and from the generated C at
//! the gdb boundary.

pub mod breakpoint;
pub mod error;
pub mod frame;
pub mod thread;
pub mod variable;

pub use breakpoint::{Breakpoint, BreakpointTable};
pub use frame::Frame;
pub use thread::Thread;
pub use variable::{StackVariable, VariableObject};

use crate::event::{self, Channel, Event, EventReceiver, EventSender};
use crate::mapper::SourceMap;
use crate::mi::{Record, ResultClass, Value};
use crate::session::process::{self, EnvOverlay};
use crate::session::MiSession;
use error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Notify;

/// Compiler flags that make the generated C debuggable and traceable.
const COBC_DEBUG_ARGS: &[&str] = &["-g", "-d", "-fdebugging-line", "-fsource-location", "-ftraceall"];
const GDB_MI_ARGS: &[&str] = &["-q", "--interpreter=mi2"];

/// How to launch the toolchain. The host fills this from its own
/// configuration surface.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub cwd: PathBuf,
    pub cobc: PathBuf,
    pub cobc_args: Vec<String>,
    pub gdb: PathBuf,
    pub gdb_args: Vec<String>,
    pub env: EnvOverlay,
}

impl LaunchOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        LaunchOptions {
            cwd: cwd.into(),
            cobc: PathBuf::from("cobc"),
            cobc_args: Vec::new(),
            gdb: PathBuf::from("gdb"),
            gdb_args: Vec::new(),
            env: EnvOverlay::new(),
        }
    }
}

pub struct Debugger {
    opts: LaunchOptions,
    events: EventSender,
    session: Option<MiSession>,
    map: SourceMap,
    breakpoints: BreakpointTable,
    ui_break_done: Arc<Notify>,
}

impl Debugger {
    /// Create the debugger and the event stream the host consumes.
    pub fn new(opts: LaunchOptions) -> (Self, EventReceiver) {
        let (events, receiver) = event::channel();
        (
            Debugger {
                opts,
                events,
                session: None,
                map: SourceMap::default(),
                breakpoints: BreakpointTable::default(),
                ui_break_done: Arc::new(Notify::new()),
            },
            receiver,
        )
    }

    /// Compile `target` (+ `group` modules), build the source map, spawn
    /// gdb against the produced executable and emit `DebugReady`.
    ///
    /// With `no_debug` the compiler runs the program directly (`-j`); the
    /// call resolves on compiler exit and `Quit` is emitted.
    pub async fn load(
        &mut self,
        target: &str,
        group: &[String],
        no_debug: bool,
    ) -> Result<(), Error> {
        let mut args = self.opts.cobc_args.clone();
        if no_debug {
            args.push("-j".to_string());
            args.push(target.to_string());
            args.extend(group.iter().cloned());
            let code = self.run_compiler(&args).await?;
            let _ = self.events.send(Event::Quit);
            return if code == 0 {
                Ok(())
            } else {
                Err(Error::CompileFailed(code))
            };
        }

        args.extend(COBC_DEBUG_ARGS.iter().map(ToString::to_string));
        args.push(target.to_string());
        args.extend(group.iter().cloned());
        let code = self.run_compiler(&args).await?;
        if code != 0 {
            let _ = self.events.send(Event::Quit);
            return Err(Error::CompileFailed(code));
        }

        let mut sources = vec![target.to_string()];
        sources.extend(group.iter().cloned());
        self.map = SourceMap::build(&self.opts.cwd, &sources)?;

        let executable = executable_name(target);
        let session = self.spawn_gdb(None)?;
        session
            .send_command_suppress("gdb-set target-async on")
            .await?;
        session
            .send_command_suppress(&format!(
                "environment-directory \"{}\"",
                escape(&self.opts.cwd.display().to_string())
            ))
            .await?;
        session
            .send_command(&format!(
                "file-exec-and-symbols \"{}\"",
                escape(&executable)
            ))
            .await?;

        self.session = Some(session);
        let _ = self.events.send(Event::DebugReady);
        Ok(())
    }

    /// Attach to a gdbserver-style remote target.
    pub async fn connect(
        &mut self,
        executable: Option<&str>,
        target: &str,
    ) -> Result<(), Error> {
        let session = self.spawn_gdb(executable)?;
        session
            .send_command_suppress("gdb-set target-async on")
            .await?;
        session
            .send_command_suppress(&format!(
                "environment-directory \"{}\"",
                escape(&self.opts.cwd.display().to_string())
            ))
            .await?;
        session
            .send_command(&format!("target-select remote {target}"))
            .await?;

        self.session = Some(session);
        let _ = self.events.send(Event::DebugReady);
        Ok(())
    }

    /// Wait for the UI to finish installing breakpoints, then run the
    /// inferior. True iff gdb answered `running`.
    pub async fn start(&self) -> Result<bool, Error> {
        self.ui_break_done.notified().await;
        let record = self.session()?.send_command("exec-run").await?;
        Ok(record.class() == Some(ResultClass::Running))
    }

    /// One-shot rendezvous: the UI signals its breakpoints are installed.
    pub fn breakpoints_installed(&self) {
        self.ui_break_done.notify_one();
    }

    pub async fn continue_execution(&self, reverse: bool) -> Result<bool, Error> {
        self.exec_resume("exec-continue", reverse).await
    }

    pub async fn next(&self, reverse: bool) -> Result<bool, Error> {
        self.exec_resume("exec-next", reverse).await
    }

    pub async fn step(&self, reverse: bool) -> Result<bool, Error> {
        self.exec_resume("exec-step", reverse).await
    }

    pub async fn step_out(&self, reverse: bool) -> Result<bool, Error> {
        self.exec_resume("exec-finish", reverse).await
    }

    /// True iff gdb answered `done`.
    pub async fn interrupt(&self) -> Result<bool, Error> {
        let record = self.session()?.send_command("exec-interrupt").await?;
        Ok(record.class() == Some(ResultClass::Done))
    }

    /// Jump to a location, leaving a temporary breakpoint there so
    /// execution stops after the jump. The location goes to gdb verbatim.
    pub async fn goto(&self, file: &str, line: u64) -> Result<bool, Error> {
        let session = self.session()?;
        let location = format!("\"{}:{line}\"", escape(file));
        session
            .send_command(&format!("break-insert -t {location}"))
            .await?;
        let record = session
            .send_command(&format!("exec-jump {location}"))
            .await?;
        Ok(record.class() == Some(ResultClass::Running))
    }

    /// Install a breakpoint. Returns the canonical record (gdb's actual
    /// stop position translated back to COBOL), or `None` for duplicates
    /// and condition failures.
    pub async fn add_breakpoint(&mut self, bp: Breakpoint) -> Result<Option<Breakpoint>, Error> {
        if self.breakpoints.contains(&bp) {
            return Ok(None);
        }

        let mut location = break_location_prefix(bp.count_condition.as_deref());
        if let Some(raw) = &bp.raw {
            location.push_str(&format!("\"{}\"", escape(raw)));
        } else {
            let (file, line) = match (&bp.file, bp.line) {
                (Some(file), Some(line)) => (file, line),
                _ => return Err(Error::IncompleteBreakpoint),
            };
            let entry = self
                .map
                .c_for_line(file, line)
                .ok_or_else(|| Error::MissingMapping {
                    file: file.clone(),
                    line,
                })?;
            location.push_str(&format!(
                "\"{}:{}\"",
                escape(&entry.c_file.display().to_string()),
                entry.c_line
            ));
        }

        let record = self
            .session()?
            .send_command(&format!("break-insert -f {location}"))
            .await?;
        let number = record
            .result_u64("bkpt.number")
            .ok_or(Error::UnexpectedReply("break-insert"))?;

        let mut canonical = bp.clone();
        if let (Some(c_file), Some(c_line)) =
            (record.result_str("bkpt.file"), record.result_u64("bkpt.line"))
        {
            if let Some(entry) = self.map.cobol_for_line(c_file, c_line) {
                canonical.file = Some(entry.cobol_file.clone());
                canonical.line = Some(entry.cobol_line);
            }
        }
        self.breakpoints.insert(number, canonical.clone());

        if let Some(condition) = &bp.condition {
            let command = format!("break-condition {number} {condition}");
            let outcome = self.session()?.send_command(&command).await;
            if crate::weak_error!(outcome, "set breakpoint condition").is_none() {
                return Ok(None);
            }
        }

        Ok(Some(canonical))
    }

    pub async fn remove_breakpoint(&mut self, bp: &Breakpoint) -> Result<bool, Error> {
        let Some(number) = self.breakpoints.number_of(bp) else {
            return Ok(false);
        };
        self.session()?
            .send_command(&format!("break-delete {number}"))
            .await?;
        self.breakpoints.remove(number);
        Ok(true)
    }

    pub async fn clear_breakpoints(&mut self) -> Result<bool, Error> {
        let outcome = self.session()?.send_command("break-delete").await;
        match crate::weak_error!(outcome, "clear breakpoints") {
            Some(_) => {
                self.breakpoints.clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn threads(&self) -> Result<Vec<Thread>, Error> {
        let record = self.session()?.send_command("thread-info").await?;
        let Some(list) = record.result("threads").and_then(Value::as_list) else {
            return Ok(Vec::new());
        };
        Ok(list.iter().filter_map(Thread::from_value).collect())
    }

    /// List frames of `thread` (0 = current), translated to COBOL
    /// coordinates where the map knows them.
    pub async fn stack(&self, max_levels: u64, thread: u64) -> Result<Vec<Frame>, Error> {
        let mut command = String::from("stack-list-frames");
        if thread != 0 {
            command.push_str(&format!(" --thread {thread}"));
        }
        command.push_str(&format!(" 0 {max_levels}"));
        let record = self.session()?.send_command(&command).await?;
        let frames = record
            .result("stack")
            .map(|stack| stack.path_all("@frame"))
            .unwrap_or_default();
        Ok(frames
            .into_iter()
            .enumerate()
            .map(|(index, frame)| self.translate_frame(index, frame))
            .collect())
    }

    /// Simple values of the frame's locals, restricted to variables the
    /// source map knows, under their COBOL names.
    pub async fn stack_variables(
        &self,
        thread: u64,
        frame: u64,
    ) -> Result<Vec<StackVariable>, Error> {
        let command = format!(
            "stack-list-variables --thread {thread} --frame {frame} --simple-values"
        );
        let record = self.session()?.send_command(&command).await?;
        let Some(list) = record.result("variables").and_then(Value::as_list) else {
            return Ok(Vec::new());
        };
        Ok(list
            .iter()
            .filter_map(|value| {
                let c_name = value.str_at("name")?;
                let cobol_name = self.map.cobol_name_for(c_name)?;
                Some(StackVariable {
                    name: cobol_name.to_string(),
                    value_str: value.str_at("value").unwrap_or_default().to_string(),
                    r#type: value.str_at("type").map(str::to_string),
                    raw: value.clone(),
                })
            })
            .collect())
    }

    /// Evaluate a COBOL data item (or any expression gdb understands when
    /// the name has no mapping).
    pub async fn eval_expression(
        &self,
        name: &str,
        thread: u64,
        frame: u64,
    ) -> Result<Record, Error> {
        let expr = self.map.c_name_for(name).unwrap_or(name);
        let mut command = String::from("data-evaluate-expression ");
        if thread != 0 {
            command.push_str(&format!("--thread {thread} --frame {frame} "));
        }
        command.push_str(expr);
        self.session()?.send_command(&command).await
    }

    /// Read raw memory; returns the hex contents string.
    pub async fn examine_memory(&self, from: u64, length: usize) -> Result<String, Error> {
        let record = self
            .session()?
            .send_command(&format!("data-read-memory-bytes 0x{from:x} {length}"))
            .await?;
        record
            .result_str("memory.0.contents")
            .map(str::to_string)
            .ok_or(Error::UnexpectedReply("data-read-memory-bytes"))
    }

    pub async fn var_create(
        &self,
        expression: &str,
        name: Option<&str>,
    ) -> Result<VariableObject, Error> {
        let name = name.unwrap_or("-");
        let record = self
            .session()?
            .send_command(&format!("var-create {name} @ \"{}\"", escape(expression)))
            .await?;
        let values = record.values().ok_or(Error::UnexpectedReply("var-create"))?;
        Ok(VariableObject::from_value(values, expression))
    }

    pub async fn var_eval_expression(&self, name: &str) -> Result<Record, Error> {
        self.session()?
            .send_command(&format!("var-evaluate-expression {name}"))
            .await
    }

    pub async fn var_list_children(&self, name: &str) -> Result<Vec<VariableObject>, Error> {
        let record = self
            .session()?
            .send_command(&format!("var-list-children --all-values \"{}\"", escape(name)))
            .await?;
        let children = record
            .result("children")
            .map(|children| children.path_all("@child"))
            .unwrap_or_default();
        Ok(children
            .into_iter()
            .map(|child| VariableObject::from_value(child, ""))
            .collect())
    }

    pub async fn var_update(&self, name: &str) -> Result<Record, Error> {
        self.session()?
            .send_command(&format!("var-update --all-values {name}"))
            .await
    }

    pub async fn var_assign(&self, name: &str, raw_value: &str) -> Result<String, Error> {
        let record = self
            .session()?
            .send_command(&format!("var-assign {name} {raw_value}"))
            .await?;
        record
            .result_str("value")
            .map(str::to_string)
            .ok_or(Error::UnexpectedReply("var-assign"))
    }

    /// Console passthrough: a leading `-` means raw MI, anything else is
    /// wrapped in `interpreter-exec console`.
    pub async fn send_user_input(
        &self,
        line: &str,
        thread: u64,
        frame: u64,
    ) -> Result<Record, Error> {
        if let Some(mi_command) = line.strip_prefix('-') {
            return self.session()?.send_command(mi_command).await;
        }
        let mut command = String::from("interpreter-exec ");
        if thread != 0 {
            command.push_str(&format!("--thread {thread} --frame {frame} "));
        }
        command.push_str(&format!("console \"{}\"", escape(line)));
        self.session()?.send_command(&command).await
    }

    /// Write one line to gdb verbatim, without token bookkeeping.
    pub async fn send_raw(&self, line: &str) -> Result<(), Error> {
        self.session()?.send_raw(line).await
    }

    /// Terminate the session (1 s grace, then process-group SIGKILL).
    pub async fn stop(&mut self) -> Result<(), Error> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session.stop().await?;
        self.breakpoints.clear();
        Ok(())
    }

    pub async fn detach(&mut self) -> Result<(), Error> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session.detach().await?;
        self.breakpoints.clear();
        Ok(())
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.map
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| !s.has_exited())
            .unwrap_or(false)
    }

    fn session(&self) -> Result<&MiSession, Error> {
        self.session.as_ref().ok_or(Error::NotStarted)
    }

    fn spawn_gdb(&self, executable: Option<&str>) -> Result<MiSession, Error> {
        let mut args = self.opts.gdb_args.clone();
        args.extend(GDB_MI_ARGS.iter().map(ToString::to_string));
        if let Some(executable) = executable {
            args.push(executable.to_string());
        }
        MiSession::spawn(
            &self.opts.gdb,
            &args,
            &self.opts.cwd,
            &self.opts.env,
            self.events.clone(),
        )
        .inspect_err(|err| {
            let _ = self.events.send(Event::LaunchError(err.to_string()));
        })
    }

    async fn exec_resume(&self, command: &str, reverse: bool) -> Result<bool, Error> {
        let command = if reverse {
            format!("{command} --reverse")
        } else {
            command.to_string()
        };
        let record = self.session()?.send_command(&command).await?;
        Ok(record.class() == Some(ResultClass::Running))
    }

    async fn run_compiler(&self, args: &[String]) -> Result<i32, Error> {
        let mut child = match process::spawn(&self.opts.cobc, args, &self.opts.cwd, &self.opts.env)
        {
            Ok(child) => child,
            Err(err) => {
                let _ = self.events.send(Event::LaunchError(err.to_string()));
                return Err(err);
            }
        };
        let stdout = child.stdout.take().expect("stdio is piped");
        let stderr = child.stderr.take().expect("stdio is piped");
        drop(child.stdin.take());

        let (status, (), ()) = tokio::join!(
            child.wait(),
            forward_lines(stdout, Channel::Stdout, self.events.clone()),
            forward_lines(stderr, Channel::Stderr, self.events.clone()),
        );
        Ok(status?.code().unwrap_or(-1))
    }

    fn translate_frame(&self, index: usize, value: &Value) -> Frame {
        let c_file = value
            .str_at("fullname")
            .or_else(|| value.str_at("file"))
            .unwrap_or_default();
        let c_line = value.u64_at("line").unwrap_or(0);
        let (file, line) = match self.map.cobol_for_line(c_file, c_line) {
            Some(entry) => (entry.cobol_file.clone(), entry.cobol_line),
            // No mapping: fall through to the raw C coordinates.
            None => (self.map.absolute(c_file), c_line),
        };
        let file_basename = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Frame {
            level: value.u64_at("level").unwrap_or(index as u64),
            address: value.str_at("addr").unwrap_or_default().to_string(),
            function: value
                .str_at("func")
                .or_else(|| value.str_at("from"))
                .unwrap_or_default()
                .to_string(),
            file,
            file_basename,
            line,
        }
    }
}

/// `-i N ` ignores the first N hits; a bare count N stops on the (N+1)th
/// hit and removes the breakpoint.
fn break_location_prefix(count_condition: Option<&str>) -> String {
    let Some(cc) = count_condition.map(str::trim).filter(|cc| !cc.is_empty()) else {
        return String::new();
    };
    if let Some(rest) = cc.strip_prefix('>') {
        return format!("-i {} ", rest.trim());
    }
    if let Ok(count) = cc.parse::<u64>() {
        return if count != 0 {
            format!("-t -i {count} ")
        } else {
            "-t ".to_string()
        };
    }
    log::error!(
        target: "debugger",
        "unsupported break count expression `{cc}`, expected a number or >number"
    );
    "-t ".to_string()
}

/// Executable produced by the compiler: the target with its COBOL
/// extension stripped (`.exe` appended on Windows).
fn executable_name(target: &str) -> String {
    let lower = target.to_ascii_lowercase();
    let stem = ["cbl", "cob", "cpy"]
        .iter()
        .find_map(|ext| {
            let suffix = format!(".{ext}");
            lower
                .ends_with(&suffix)
                .then(|| target[..target.len() - suffix.len()].to_string())
        })
        .unwrap_or_else(|| match target.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => target.to_string(),
        });
    if cfg!(windows) {
        format!("{stem}.exe")
    } else {
        stem
    }
}

/// Escape backslashes and double quotes for embedding in an MI argument.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

async fn forward_lines<R>(reader: R, channel: Channel, events: EventSender)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = events.send(Event::Msg {
            channel,
            text: format!("{line}\n"),
        });
    }
}
