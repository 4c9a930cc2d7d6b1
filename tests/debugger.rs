//! Facade tests against fake cobc and gdb scripts.
//!
//! The fake gdb appends every command it receives to a log file, so tests
//! can assert the exact MI bytes the facade produced.

use cobgdb::debugger::{Breakpoint, Debugger, LaunchOptions};
use cobgdb::event::{Channel, Event, EventReceiver};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

const FAKE_GDB: &str = r#"#!/bin/sh
log="$1"
n=0
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$log"
  tok=${line%%-*}
  case "$line" in
    *break-insert*)
      n=$((n+1))
      printf '%s^done,bkpt={number="%s",file="hello.c",line="23"}\n' "$tok" "$n"
      ;;
    *exec-run*|*exec-continue*|*exec-next*|*exec-step*|*exec-finish*|*exec-jump*)
      printf '%s^running\n' "$tok"
      ;;
    *exec-interrupt*)
      printf '%s^done\n' "$tok"
      ;;
    *stack-list-frames*)
      printf '%s^done,stack=[frame={level="0",addr="0x401100",func="hello_",file="hello.c",line="23"},frame={level="1",addr="0x401200",from="/usr/lib/libcob.so",file="foo.c",line="99"}]\n' "$tok"
      ;;
    *stack-list-variables*)
      printf '%s^done,variables=[{name="b_9",value="\\"0001\\"",type="cob_u8_t [4]"},{name="frame_ptr",value="0x0"}]\n' "$tok"
      ;;
    *thread-info*)
      printf '%s^done,threads=[{id="1",target-id="process 77",name="hello",state="stopped"}]\n' "$tok"
      ;;
    *data-read-memory-bytes*)
      printf '%s^done,memory=[{begin="0x00000a00",offset="0x0000",end="0x00000a04",contents="30303031"}]\n' "$tok"
      ;;
    *gdb-exit*)
      exit 0
      ;;
    *)
      printf '%s^done\n' "$tok"
      ;;
  esac
done
"#;

struct Fixture {
    dir: TempDir,
    log: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("cmds.log");

        // Generated C with a line marker at C line 21 (statement at 23)
        // and one mapped data item.
        let mut generated = String::from("/* Generated from hello.cbl */\n");
        generated.push_str("static cob_u8_t b_9[4]\t/* WS-COUNT */;\n");
        generated.push_str(&"\n".repeat(18));
        generated.push_str("/* Line: 10        : hello.cbl */\n");
        generated.push_str("cob_move (...);\n");
        fs::write(dir.path().join("hello.c"), generated).unwrap();
        fs::write(dir.path().join("hello.cbl"), "DISPLAY \"HI\".\n").unwrap();

        write_script(dir.path(), "cobc", "printf 'compiled ok\\n'\nexit 0\n");
        let gdb = dir.path().join("gdb");
        fs::write(&gdb, FAKE_GDB).unwrap();
        fs::set_permissions(&gdb, fs::Permissions::from_mode(0o755)).unwrap();

        Fixture { dir, log }
    }

    fn options(&self) -> LaunchOptions {
        let mut opts = LaunchOptions::new(self.dir.path());
        opts.cobc = self.dir.path().join("cobc");
        opts.gdb = self.dir.path().join("gdb");
        opts.gdb_args = vec![self.log.display().to_string()];
        opts
    }

    async fn loaded(&self) -> (Debugger, EventReceiver) {
        let (mut debugger, mut receiver) = Debugger::new(self.options());
        debugger.load("hello.cbl", &[], false).await.unwrap();
        expect_debug_ready(&mut receiver).await;
        (debugger, receiver)
    }

    fn logged_commands(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

async fn next_event(receiver: &mut EventReceiver) -> Event {
    timeout(Duration::from_secs(3), receiver.recv())
        .await
        .expect("no event within 3s")
        .expect("event channel closed")
}

async fn expect_debug_ready(receiver: &mut EventReceiver) {
    loop {
        if let Event::DebugReady = next_event(receiver).await {
            return;
        }
    }
}

#[tokio::test]
async fn test_load_initializes_gdb() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    assert_eq!(debugger.source_map().line_count(), 1);
    assert_eq!(debugger.source_map().variable_count(), 1);

    let commands = fixture.logged_commands();
    assert_eq!(commands[0], "1-gdb-set target-async on");
    assert!(
        commands[1].starts_with("2-environment-directory \""),
        "{}",
        commands[1]
    );
    // The executable is the target with its COBOL extension stripped.
    assert_eq!(commands[2], "3-file-exec-and-symbols \"hello\"");
}

#[tokio::test]
async fn test_mapped_breakpoint_with_condition() {
    let fixture = Fixture::new();
    let (mut debugger, _receiver) = fixture.loaded().await;

    let mut bp = Breakpoint::at_line(fixture.dir.path().join("hello.cbl"), 10);
    bp.condition = Some("x > 0".to_string());
    let canonical = debugger.add_breakpoint(bp).await.unwrap().unwrap();

    // gdb answered with C coordinates; they come back translated.
    assert_eq!(canonical.file, Some(fixture.dir.path().join("hello.cbl")));
    assert_eq!(canonical.line, Some(10));
    assert_eq!(debugger.breakpoints().len(), 1);

    let commands = fixture.logged_commands();
    let insert = format!(
        "4-break-insert -f \"{}/hello.c:23\"",
        fixture.dir.path().display()
    );
    assert_eq!(commands[3], insert);
    assert_eq!(commands[4], "5-break-condition 1 x > 0");
}

#[tokio::test]
async fn test_raw_breakpoint_with_ignore_count() {
    let fixture = Fixture::new();
    let (mut debugger, _receiver) = fixture.loaded().await;

    let mut bp = Breakpoint::at_raw("main");
    bp.count_condition = Some(">3".to_string());
    debugger.add_breakpoint(bp).await.unwrap().unwrap();

    let commands = fixture.logged_commands();
    assert_eq!(commands[3], "4-break-insert -f -i 3 \"main\"");
}

#[tokio::test]
async fn test_duplicate_breakpoint_rejected_locally() {
    let fixture = Fixture::new();
    let (mut debugger, _receiver) = fixture.loaded().await;

    let bp = Breakpoint::at_line(fixture.dir.path().join("hello.cbl"), 10);
    assert!(debugger.add_breakpoint(bp.clone()).await.unwrap().is_some());
    let commands_before = fixture.logged_commands().len();

    // Same location again: no new gdb traffic.
    assert!(debugger.add_breakpoint(bp.clone()).await.unwrap().is_none());
    assert_eq!(fixture.logged_commands().len(), commands_before);

    // Removal goes through the table's gdb number.
    assert!(debugger.remove_breakpoint(&bp).await.unwrap());
    assert!(debugger.breakpoints().is_empty());
    let commands = fixture.logged_commands();
    assert_eq!(commands.last().unwrap(), "5-break-delete 1");
}

#[tokio::test]
async fn test_unmapped_breakpoint_is_hard_error() {
    let fixture = Fixture::new();
    let (mut debugger, _receiver) = fixture.loaded().await;

    let bp = Breakpoint::at_line(fixture.dir.path().join("hello.cbl"), 999);
    let err = debugger.add_breakpoint(bp).await.unwrap_err();
    assert!(
        matches!(err, cobgdb::debugger::error::Error::MissingMapping { line: 999, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn test_start_waits_for_breakpoint_rendezvous() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    // The rendezvous permit may arrive before start is awaited.
    debugger.breakpoints_installed();
    assert!(debugger.start().await.unwrap());

    let commands = fixture.logged_commands();
    assert_eq!(commands.last().unwrap(), "4-exec-run");
}

#[tokio::test]
async fn test_control_flow_results() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    assert!(debugger.continue_execution(false).await.unwrap());
    assert!(debugger.next(true).await.unwrap());
    assert!(debugger.step(false).await.unwrap());
    assert!(debugger.step_out(false).await.unwrap());
    assert!(debugger.interrupt().await.unwrap());
    assert!(debugger.goto("hello.c", 23).await.unwrap());

    let commands = fixture.logged_commands();
    assert_eq!(commands[3], "4-exec-continue");
    assert_eq!(commands[4], "5-exec-next --reverse");
    assert_eq!(commands[5], "6-exec-step");
    assert_eq!(commands[6], "7-exec-finish");
    assert_eq!(commands[7], "8-exec-interrupt");
    assert_eq!(commands[8], "9-break-insert -t \"hello.c:23\"");
    assert_eq!(commands[9], "10-exec-jump \"hello.c:23\"");
}

#[tokio::test]
async fn test_stack_translated_with_fallback() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    let frames = debugger.stack(64, 0).await.unwrap();
    assert_eq!(frames.len(), 2);

    // Frame 0 is mapped back to COBOL coordinates.
    assert_eq!(frames[0].file, fixture.dir.path().join("hello.cbl"));
    assert_eq!(frames[0].line, 10);
    assert_eq!(frames[0].file_basename, "hello.cbl");
    assert_eq!(frames[0].function, "hello_");

    // Frame 1 has no mapping: raw C coordinates, function from `from`.
    assert_eq!(frames[1].file, fixture.dir.path().join("foo.c"));
    assert_eq!(frames[1].line, 99);
    assert_eq!(frames[1].function, "/usr/lib/libcob.so");

    let commands = fixture.logged_commands();
    assert_eq!(commands.last().unwrap(), "4-stack-list-frames 0 64");

    let frames = debugger.stack(8, 3).await.unwrap();
    assert_eq!(frames.len(), 2);
    let commands = fixture.logged_commands();
    assert_eq!(commands.last().unwrap(), "5-stack-list-frames --thread 3 0 8");
}

#[tokio::test]
async fn test_stack_variables_filtered_and_renamed() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    let variables = debugger.stack_variables(1, 0).await.unwrap();
    // `frame_ptr` is not in the source map and stays hidden.
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].name, "WS-COUNT");
    assert_eq!(variables[0].value_str, "\"0001\"");
    assert_eq!(variables[0].r#type.as_deref(), Some("cob_u8_t [4]"));
}

#[tokio::test]
async fn test_eval_translates_cobol_name() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    debugger.eval_expression("\"WS-COUNT\"", 1, 0).await.unwrap();
    let commands = fixture.logged_commands();
    assert_eq!(
        commands.last().unwrap(),
        "4-data-evaluate-expression --thread 1 --frame 0 b_9"
    );

    // Unmapped names pass through untranslated.
    debugger.eval_expression("some_c_expr", 0, 0).await.unwrap();
    let commands = fixture.logged_commands();
    assert_eq!(
        commands.last().unwrap(),
        "5-data-evaluate-expression some_c_expr"
    );
}

#[tokio::test]
async fn test_examine_memory() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    let contents = debugger.examine_memory(0xa00, 4).await.unwrap();
    assert_eq!(contents, "30303031");
    let commands = fixture.logged_commands();
    assert_eq!(commands.last().unwrap(), "4-data-read-memory-bytes 0xa00 4");
}

#[tokio::test]
async fn test_threads() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    let threads = debugger.threads().await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].id, 1);
    assert_eq!(threads[0].target_id, "process 77");
    assert_eq!(threads[0].name.as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_user_input_modes() {
    let fixture = Fixture::new();
    let (debugger, _receiver) = fixture.loaded().await;

    debugger
        .send_user_input("-stack-info-depth", 0, 0)
        .await
        .unwrap();
    debugger.send_user_input("info registers", 1, 0).await.unwrap();

    let commands = fixture.logged_commands();
    assert_eq!(commands[3], "4-stack-info-depth");
    assert_eq!(
        commands[4],
        "5-interpreter-exec --thread 1 --frame 0 console \"info registers\""
    );
}

#[tokio::test]
async fn test_no_debug_load_runs_and_quits() {
    let fixture = Fixture::new();
    let (mut debugger, mut receiver) = Debugger::new(fixture.options());
    debugger.load("hello.cbl", &[], true).await.unwrap();

    let mut compiled_seen = false;
    loop {
        match next_event(&mut receiver).await {
            Event::Msg {
                channel: Channel::Stdout,
                text,
            } if text == "compiled ok\n" => compiled_seen = true,
            Event::Quit => break,
            _ => {}
        }
    }
    assert!(compiled_seen);
    assert!(fixture.logged_commands().is_empty(), "no gdb expected");
}

#[tokio::test]
async fn test_compile_failure_quits_without_gdb() {
    let fixture = Fixture::new();
    write_script(
        fixture.dir.path(),
        "cobc",
        "printf 'hello.cbl: syntax error\\n' >&2\nexit 1\n",
    );

    let (mut debugger, mut receiver) = Debugger::new(fixture.options());
    let err = debugger.load("hello.cbl", &[], false).await.unwrap_err();
    assert!(
        matches!(err, cobgdb::debugger::error::Error::CompileFailed(1)),
        "{err}"
    );

    let mut stderr_seen = false;
    loop {
        match next_event(&mut receiver).await {
            Event::Msg {
                channel: Channel::Stderr,
                text,
            } if text.contains("syntax error") => stderr_seen = true,
            Event::Quit => break,
            _ => {}
        }
    }
    assert!(stderr_seen);
    assert!(fixture.logged_commands().is_empty(), "no gdb expected");
}

#[tokio::test]
async fn test_stop_clears_breakpoints_and_quits() {
    let fixture = Fixture::new();
    let (mut debugger, mut receiver) = fixture.loaded().await;

    let bp = Breakpoint::at_raw("main");
    debugger.add_breakpoint(bp).await.unwrap();
    assert_eq!(debugger.breakpoints().len(), 1);

    debugger.stop().await.unwrap();
    assert!(debugger.breakpoints().is_empty());
    assert!(!debugger.is_running());

    loop {
        if let Event::Quit = next_event(&mut receiver).await {
            break;
        }
    }
}
