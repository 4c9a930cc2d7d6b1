use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    RegEx(#[from] regex::Error),

    // --------------------------------- child process errors --------------------------------------
    #[error("compiler exited with code {0}")]
    CompileFailed(i32),
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("debug session is closed")]
    SessionClosed,
    #[error("debug session is not started")]
    NotStarted,

    // --------------------------------- protocol errors -------------------------------------------
    #[error("gdb: {msg} (command: {command})")]
    Mi { msg: String, command: String },
    #[error("malformed MI record: {0}")]
    MalformedRecord(String),
    #[error("unexpected reply shape for `{0}`")]
    UnexpectedReply(&'static str),

    // --------------------------------- source map errors -----------------------------------------
    #[error("no source mapping for {file}:{line}")]
    MissingMapping { file: PathBuf, line: u64 },
    #[error("breakpoint has neither a raw location nor a file and line")]
    IncompleteBreakpoint,
}

/// Transforms `Result` into `Option` and logs the error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "debugger", "{e:#}");
                None
            }
        }
    };
    ($res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "debugger", concat!($msg, ": {:#}"), e);
                None
            }
        }
    };
}
