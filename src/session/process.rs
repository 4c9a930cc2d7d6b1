//! Child process plumbing shared by the compiler and debugger children.

use crate::debugger::error::Error;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Environment overlay applied on top of the inherited process
/// environment. A `None` value deletes the inherited key.
pub type EnvOverlay = HashMap<String, Option<String>>;

/// Spawn a child with piped stdio in its own process group, so the
/// shutdown watchdog can signal the whole tree.
pub fn spawn(
    program: impl AsRef<Path>,
    args: &[String],
    cwd: &Path,
    env: &EnvOverlay,
) -> Result<Child, Error> {
    let program = program.as_ref();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    for (key, value) in env {
        match value {
            Some(value) => {
                cmd.env(key, value);
            }
            None => {
                cmd.env_remove(key);
            }
        }
    }

    log::debug!(
        target: "session",
        "spawning {} {}",
        program.display(),
        args.join(" ")
    );

    cmd.spawn().map_err(|source| Error::Spawn {
        program: program.display().to_string(),
        source,
    })
}
