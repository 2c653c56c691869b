//! Interactive debugger REPL
//!
//! Provides a command-line interface over a [`DebugSession`]. Execution
//! commands block until the program stops again, unless `continue &` sends
//! the run to the background, in which case `pause` interrupts it.

use gaddis_runtime::bytecode::pc_ref;
use gaddis_runtime::{
    DebugSession, EventHost, FrameView, PauseReason, RunState, StepGranularity, StepKind, Value,
    VmPanic,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ── Event host ───────────────────────────────────────────────────────────────

/// Prints session events as they arrive.
///
/// Pauses are only announced for background runs; a blocking command
/// reports the stop itself once the burst is over.
#[derive(Debug, Default)]
pub struct ReplHost {
    background: AtomicBool,
}

impl ReplHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_background(&self, background: bool) {
        self.background.store(background, Ordering::SeqCst);
    }

    fn is_background(&self) -> bool {
        self.background.load(Ordering::SeqCst)
    }
}

impl EventHost for ReplHost {
    fn paused(&self, reason: PauseReason) {
        if self.is_background() {
            println!("\n\x1b[33mPaused\x1b[0m ({})", reason);
        }
    }

    fn exception(&self, panic: &VmPanic) {
        if self.is_background() {
            println!("\n\x1b[31mException:\x1b[0m {}", panic);
        }
    }

    fn panicked(&self, panic: &VmPanic) {
        println!("\x1b[31merror:\x1b[0m {}", panic);
    }

    fn exited(&self, code: i32) {
        println!("Program exited with status {}.", code);
    }

    fn terminated(&self) {
        println!("Program terminated.");
    }
}

// ── REPL ─────────────────────────────────────────────────────────────────────

/// Debugger REPL state
pub struct DebugRepl {
    session: DebugSession,
    host: Arc<ReplHost>,
    file_name: String,
    source_lines: Vec<String>,
    /// Requested line breakpoints that bound to code
    breakpoints: BTreeSet<usize>,
    started: bool,
    running: bool,
}

impl DebugRepl {
    pub fn new(
        session: DebugSession,
        host: Arc<ReplHost>,
        source: Option<&str>,
        file_name: String,
    ) -> Self {
        let source_lines = source
            .map(|s| s.lines().map(String::from).collect())
            .unwrap_or_default();
        Self {
            session,
            host,
            file_name,
            source_lines,
            breakpoints: BTreeSet::new(),
            started: false,
            running: true,
        }
    }

    /// Run the interactive debugger REPL
    pub fn run(&mut self, history: Option<&Path>) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        if let Some(path) = history {
            let _ = rl.load_history(path);
        }

        println!();
        println!("\x1b[1mGaddis Debugger\x1b[0m  {}", self.file_name);
        println!("Type \x1b[1mhelp\x1b[0m for available commands.");
        println!();

        while self.running {
            match rl.readline(&self.get_prompt()) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);
                    self.execute_command(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C - Use 'quit' to exit");
                }
                Err(ReadlineError::Eof) => {
                    println!("^D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        self.session.halt();
        if let Some(path) = history {
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            if let Err(err) = rl.save_history(path) {
                tracing::warn!(%err, "failed to save debugger history");
            }
        }
        println!("Debugger exited.");
        Ok(())
    }

    fn get_prompt(&self) -> String {
        if self.session.is_done() {
            "\x1b[31m(finished)\x1b[0m > ".to_string()
        } else if self.session.is_running() {
            "\x1b[32m(running)\x1b[0m > ".to_string()
        } else {
            match self.session.run_state() {
                RunState::Halted | RunState::Terminated => "\x1b[31m(stopped)\x1b[0m > ".to_string(),
                _ => "\x1b[33m(paused)\x1b[0m > ".to_string(),
            }
        }
    }

    /// Execute a debugger command
    pub fn execute_command(&mut self, input: &str) {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return;
        }

        let cmd = parts[0].to_lowercase();
        let args = &parts[1..];

        match cmd.as_str() {
            "help" | "h" | "?" => self.cmd_help(),
            "quit" | "q" | "exit" => self.running = false,
            "run" | "r" => self.cmd_run(),
            "continue" | "c" => self.resume(args.first() == Some(&"&")),
            "step" | "s" => self.cmd_step(StepKind::In, StepGranularity::Line),
            "stepi" | "si" => self.cmd_step(StepKind::In, StepGranularity::Instruction),
            "next" | "n" => self.cmd_step(StepKind::Next, StepGranularity::Line),
            "out" | "finish" => self.cmd_step(StepKind::Out, StepGranularity::Line),
            "pause" => self.cmd_pause(),
            "break" | "b" => self.cmd_break(args),
            "delete" | "d" | "clear" => self.cmd_delete(args),
            "breakpoints" | "bp" => self.cmd_breakpoints(),
            "list" | "l" => self.cmd_list(args),
            "vars" | "v" | "locals" => self.cmd_vars(args),
            "backtrace" | "bt" | "where" => self.cmd_backtrace(),
            "restart" => self.cmd_restart(args),
            _ => println!(
                "Unknown command: '{}'. Type 'help' for available commands.",
                cmd
            ),
        }
    }

    // ── Command implementations ───────────────────────────────────────────────

    fn cmd_help(&self) {
        println!();
        println!("\x1b[1mDebugger Commands:\x1b[0m");
        println!();
        println!("  \x1b[1;33mExecution:\x1b[0m");
        println!("    run, r              Start or restart the program");
        println!("    continue, c         Continue until a breakpoint or exit");
        println!("    continue &          Continue in the background");
        println!("    pause               Pause a background run");
        println!("    step, s             Step to the next line, entering calls");
        println!("    stepi, si           Step one instruction");
        println!("    next, n             Step over calls");
        println!("    out, finish         Run until the current module returns");
        println!("    restart <frame>     Re-enter frame <frame> from its start");
        println!();
        println!("  \x1b[1;33mBreakpoints:\x1b[0m");
        println!("    break <line>, b     Set a breakpoint on a line");
        println!("    delete <line>, d    Delete the breakpoint on a line");
        println!("    delete all          Delete all breakpoints");
        println!("    breakpoints, bp     List breakpoints");
        println!();
        println!("  \x1b[1;33mInspection:\x1b[0m");
        println!("    vars [frame], v     Show variables of a frame");
        println!("    backtrace, bt       Show the call stack");
        println!("    list [line], l      List source around a line");
        println!();
        println!("    help, h, ?          Show this help");
        println!("    quit, q, exit       Exit the debugger");
        println!();
    }

    fn cmd_run(&mut self) {
        if self.started {
            self.session.reset();
            println!("Restarting program...");
        } else {
            println!("Starting program...");
        }
        self.resume(false);
    }

    fn cmd_step(&mut self, kind: StepKind, granularity: StepGranularity) {
        if self.session.is_running() {
            println!("Program is running; pause it first.");
            return;
        }
        self.session.step(kind, granularity);
        self.resume(false);
    }

    fn cmd_pause(&mut self) {
        if !self.session.is_running() {
            println!("Program is not running.");
            return;
        }
        self.session.pause();
        self.session.wait();
        self.host.set_background(false);
        self.report_stop();
    }

    fn cmd_break(&mut self, args: &[&str]) {
        let Some(line) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
            println!("Usage: break <line>");
            return;
        };
        let mut lines: Vec<usize> = self.breakpoints.iter().copied().collect();
        lines.push(line);
        let statuses = self.session.set_line_breakpoints(&lines);
        match statuses.iter().find(|s| s.requested == line) {
            Some(status) if status.verified => {
                self.breakpoints.insert(line);
                let pc = status.pc.map(pc_ref).unwrap_or_default();
                println!("Breakpoint set at line {} ({})", line, pc);
            }
            _ => println!("\x1b[33mNo code on line {}; breakpoint not set.\x1b[0m", line),
        }
    }

    fn cmd_delete(&mut self, args: &[&str]) {
        match args.first() {
            Some(&"all") => {
                self.breakpoints.clear();
                println!("All breakpoints cleared.");
            }
            Some(arg) => match arg.parse::<usize>() {
                Ok(line) if self.breakpoints.remove(&line) => {
                    println!("Breakpoint on line {} deleted.", line)
                }
                Ok(line) => println!("No breakpoint on line {}.", line),
                Err(_) => println!("Invalid line number: '{}'", arg),
            },
            None => {
                println!("Usage: delete <line> or delete all");
                return;
            }
        }
        let lines: Vec<usize> = self.breakpoints.iter().copied().collect();
        self.session.set_line_breakpoints(&lines);
    }

    fn cmd_breakpoints(&self) {
        if self.breakpoints.is_empty() {
            println!("No breakpoints set.");
            return;
        }
        for line in &self.breakpoints {
            println!("  {}:{}", self.file_name, line);
        }
    }

    fn cmd_list(&self, args: &[&str]) {
        let center = match args.first() {
            Some(arg) => arg.parse::<usize>().unwrap_or(1),
            None => self.session.position().1.line.max(1),
        };
        self.display_source_context(center, 5);
    }

    fn cmd_vars(&self, args: &[&str]) {
        let wanted = args.first().and_then(|a| a.parse::<usize>().ok());
        let mut frames = Vec::new();
        self.session.stack_frames(|frame| frames.push(frame));
        let Some(frame) = (match wanted {
            Some(id) => frames.iter().find(|f| f.id == id),
            None => frames.first(),
        }) else {
            println!("No such frame.");
            return;
        };

        println!();
        println!("\x1b[1mFrame {} ({}):\x1b[0m", frame.id, frame.scope_name);
        for (name, value) in &frame.args {
            println!("  param  {:<16} {}", name, value.debug_string());
        }
        for (name, value) in &frame.locals {
            println!("  local  {:<16} {}", name, show(value.as_ref()));
        }
        for (name, value) in &frame.globals {
            println!("  global {:<16} {}", name, show(value.as_ref()));
        }
        println!();
    }

    fn cmd_backtrace(&self) {
        let mut frames: Vec<FrameView> = Vec::new();
        self.session.stack_frames(|frame| frames.push(frame));
        if frames.is_empty() {
            println!("No stack frames.");
            return;
        }
        for (i, frame) in frames.iter().enumerate() {
            let marker = if i == 0 { "→" } else { " " };
            println!(
                "  {} #{} \x1b[33m{}\x1b[0m at {}:{} ({})",
                marker,
                frame.id,
                frame.scope_name,
                self.file_name,
                frame.pos.line,
                pc_ref(frame.pc)
            );
        }
    }

    fn cmd_restart(&mut self, args: &[&str]) {
        let Some(id) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
            println!("Usage: restart <frame>");
            return;
        };
        match self.session.restart_frame(id) {
            Ok(()) => self.show_current_location(),
            Err(err) => println!("\x1b[31mError:\x1b[0m {}", err),
        }
    }

    // ── Helper methods ────────────────────────────────────────────────────────

    fn resume(&mut self, background: bool) {
        self.host.set_background(background);
        if let Err(err) = self.session.play() {
            println!("\x1b[31mError:\x1b[0m {}", err);
            return;
        }
        self.started = true;
        if !background {
            self.session.wait();
            self.report_stop();
        }
    }

    /// Describe where a blocking run stopped
    fn report_stop(&self) {
        if self.session.is_done() {
            return;
        }
        if self.session.run_state() != RunState::Paused {
            return;
        }
        if let Some((trace, error)) = self.session.current_exception() {
            println!("\x1b[31mException:\x1b[0m {}", error);
            print!("{}", trace);
        }
        self.show_current_location();
    }

    fn show_current_location(&self) {
        let (pc, pos) = self.session.position();
        println!("At {}:{} ({})", self.file_name, pos.line, pc_ref(pc));
        self.display_source_context(pos.line, 2);
    }

    fn display_source_context(&self, center_line: usize, context: usize) {
        if self.source_lines.is_empty() {
            return;
        }
        let start = center_line.saturating_sub(context).max(1);
        let end = (center_line + context).min(self.source_lines.len());

        println!();
        for line_num in start..=end {
            let line = &self.source_lines[line_num - 1];
            let marker = if line_num == center_line { "→" } else { " " };
            let bp_marker = if self.breakpoints.contains(&line_num) {
                "\x1b[31m●\x1b[0m"
            } else {
                " "
            };
            println!("{} {} \x1b[90m{:4}\x1b[0m │ {}", marker, bp_marker, line_num, line);
        }
        println!();
    }
}

fn show(value: Option<&Value>) -> String {
    value
        .map(Value::debug_string)
        .unwrap_or_else(|| "<unassigned>".to_string())
}
