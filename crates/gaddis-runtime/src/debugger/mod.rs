//! Concurrent debug sessions
//!
//! A [`DebugSession`] owns one [`Execution`] and runs it on a worker thread in
//! bursts. Every burst ends in exactly one outcome (pause, exception, exit or
//! termination), which is reported to the host through [`EventHost`].
//!
//! Locking protocol:
//! - One mutex guards the execution and all session state.
//! - The worker holds it for a whole burst and, between instructions, hands
//!   it over fairly whenever a controller has asked for it.
//! - Controllers announce themselves before locking, so the worker stops at
//!   the next instruction boundary rather than at the end of the burst.

mod breakpoints;
mod events;
mod state;
mod stepping;

pub use breakpoints::BreakpointIndex;
pub use events::{EventGate, EventHost, PauseReason};
pub use state::RunState;
pub use stepping::{StepGranularity, StepKind, StepRequest};

use crate::bytecode::{Assembly, Instruction};
use crate::span::SourcePos;
use crate::stdlib::ExecutionContext;
use crate::value::{Reference, RuntimeError, Value};
use crate::vm::{Execution, VmPanic};
use gaddis_config::VmConfig;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

/// Control request rejected by the session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is already running")]
    AlreadyRunning,
    #[error("program has finished")]
    Finished,
    #[error("session was halted")]
    Halted,
    #[error("session was terminated")]
    Terminated,
    #[error("no frame with id {0}")]
    InvalidFrame(usize),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("evaluation failed: {0}")]
    Evaluation(VmPanic),
    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result of a breakpoint request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointStatus {
    /// Line (or pc, for instruction breakpoints) as requested
    pub requested: usize,
    pub verified: bool,
    /// Source line the breakpoint is bound to, 0 if unverified
    pub line: usize,
    /// Instruction the breakpoint is bound to
    pub pc: Option<usize>,
}

/// Snapshot of one stack frame for inspection.
#[derive(Debug, Clone)]
pub struct FrameView {
    /// 1-based from the bottom of the stack
    pub id: usize,
    pub scope_name: String,
    pub pos: SourcePos,
    pub pc: usize,
    /// Parameters by name, with their current values
    pub args: Vec<(String, Value)>,
    /// `None` for locals not yet assigned
    pub locals: Vec<(String, Option<Value>)>,
    pub globals: Vec<(String, Option<Value>)>,
}

/// Variable slot addressed by [`DebugSession::set_variable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSlot {
    Param(usize),
    Local(usize),
    Global(usize),
}

// ── Session state ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SessionState {
    exec: Execution,
    run_state: RunState,
    step: Option<StepRequest>,
    /// Indexed by pc
    line_breaks: Vec<bool>,
    /// Indexed by pc
    inst_breaks: Vec<bool>,
    exception: Option<VmPanic>,
    exception_trace: String,
    done: bool,
    no_debug: bool,
    /// Pause before the first instruction of the next burst
    stop_on_entry: bool,
    entry_requested: bool,
    file: String,
}

/// How a worker burst ended
enum Outcome {
    Paused(PauseReason),
    Exception(VmPanic),
    Panicked(VmPanic),
    Finished,
    Terminated,
    Halted,
}

struct Inner {
    state: Mutex<SessionState>,
    /// Controllers waiting for the lock
    yield_requests: AtomicUsize,
    /// A worker burst is live
    running: AtomicBool,
    events: EventGate,
    breakpoints: BreakpointIndex,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// A program under debugger control.
///
/// Cheap to clone; clones control the same session.
#[derive(Clone)]
pub struct DebugSession {
    inner: Arc<Inner>,
}

impl DebugSession {
    pub fn new(assembly: Arc<Assembly>, ctx: ExecutionContext, host: Arc<dyn EventHost>) -> Self {
        Self::with_config(assembly, ctx, host, &VmConfig::default())
    }

    pub fn with_config(
        assembly: Arc<Assembly>,
        ctx: ExecutionContext,
        host: Arc<dyn EventHost>,
        limits: &VmConfig,
    ) -> Self {
        let breakpoints = BreakpointIndex::new(&assembly);
        let ninst = assembly.code.len();
        let exec = Execution::with_config(assembly, ctx, limits);
        let state = SessionState {
            exec,
            run_state: RunState::Paused,
            step: None,
            line_breaks: vec![false; ninst],
            inst_breaks: vec![false; ninst],
            exception: None,
            exception_trace: String::new(),
            done: false,
            no_debug: false,
            stop_on_entry: false,
            entry_requested: false,
            file: "main".to_string(),
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                yield_requests: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                events: EventGate::new(host),
                breakpoints,
                worker: Mutex::new(None),
            }),
        }
    }

    /// Name used for this program in stack traces
    pub fn set_file_name(&self, file: impl Into<String>) {
        self.inner.with_outer_lock(|s| s.file = file.into());
    }

    /// Pause with reason `entry` before the first instruction
    pub fn stop_on_entry(&self) {
        self.inner.with_outer_lock(|s| {
            s.stop_on_entry = true;
            s.entry_requested = true;
        });
    }

    /// Run without breakpoints, stepping or exception pauses
    pub fn set_no_debug(&self) {
        self.inner.with_outer_lock(|s| s.no_debug = true);
    }

    pub fn breakpoints(&self) -> &BreakpointIndex {
        &self.inner.breakpoints
    }

    pub fn run_state(&self) -> RunState {
        self.inner.with_outer_lock(|s| s.run_state)
    }

    /// True once the program has exited or ended in a no-debug panic
    pub fn is_done(&self) -> bool {
        self.inner.with_outer_lock(|s| s.done)
    }

    /// True while a worker burst is live
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn suppress_events(&self, suppressed: bool) {
        self.inner.events.set_suppressed(suppressed);
    }

    /// Value left by `Halt {nval: 1}`, once the program has finished
    pub fn result(&self) -> Option<Value> {
        self.inner.with_outer_lock(|s| s.exec.result().cloned())
    }

    // ── Run control ──────────────────────────────────────────────────────────

    /// Start or continue running on a worker thread
    pub fn play(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        if inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("play rejected: worker already running");
            return Err(SessionError::AlreadyRunning);
        }

        let rejected = {
            let mut s = inner.state.lock();
            let rejected = if s.done {
                Some(SessionError::Finished)
            } else {
                match s.run_state {
                    RunState::Halted => Some(SessionError::Halted),
                    RunState::Terminated => Some(SessionError::Terminated),
                    RunState::Running | RunState::Paused => None,
                }
            };
            if rejected.is_none() {
                s.run_state = RunState::Running;
                s.exception = None;
                s.exception_trace.clear();
            }
            rejected
        };
        if let Some(err) = rejected {
            inner.running.store(false, Ordering::SeqCst);
            warn!(%err, "play rejected");
            return Err(err);
        }

        // The previous burst already cleared `running`, so its thread is exiting.
        let mut worker = inner.worker.lock();
        if let Some(previous) = worker.take() {
            // A host may call play from an event callback on the worker itself.
            if previous.thread().id() != thread::current().id() {
                let _ = previous.join();
            }
        }
        let for_worker = Arc::clone(inner);
        let handle = thread::Builder::new()
            .name("gaddis-vm".to_string())
            .spawn(move || for_worker.run_burst())
            .map_err(|err| {
                inner.running.store(false, Ordering::SeqCst);
                SessionError::Spawn(err)
            })?;
        *worker = Some(handle);
        debug!("play");
        Ok(())
    }

    /// Same as [`play`](Self::play)
    pub fn resume(&self) -> Result<(), SessionError> {
        self.play()
    }

    /// Ask the worker to stop before its next instruction
    pub fn pause(&self) {
        let paused = self.inner.with_outer_lock(|s| {
            if s.no_debug || s.run_state != RunState::Running {
                return false;
            }
            s.run_state = RunState::Paused;
            true
        });
        if paused {
            debug!("pause requested");
        }
    }

    /// Stop for good without emitting events; returns once the worker is gone
    pub fn halt(&self) {
        self.inner.with_outer_lock(|s| {
            if s.run_state != RunState::Terminated {
                s.run_state = RunState::Halted;
            }
            s.step = None;
        });
        debug!("halt");
        self.wait();
    }

    /// Stop for good and report `terminated`
    pub fn terminate(&self) {
        let worker_live = self.inner.with_outer_lock(|s| {
            if s.no_debug || s.run_state.is_stopped() {
                return None;
            }
            s.run_state = RunState::Terminated;
            s.step = None;
            Some(self.inner.running.load(Ordering::SeqCst))
        });
        match worker_live {
            None => {}
            // The live worker notices the state change and reports it.
            Some(true) => debug!("terminate requested"),
            Some(false) => {
                debug!("terminate");
                self.inner.events.terminated();
            }
        }
    }

    /// Arm a step from the current position; takes effect on the next `play`
    pub fn step(&self, kind: StepKind, granularity: StepGranularity) {
        self.inner.with_outer_lock(|s| {
            if s.no_debug || s.done {
                return;
            }
            let pc = s.exec.pc();
            let request = StepRequest::new(
                kind,
                granularity,
                pc,
                self.inner.breakpoints.source_from_inst(pc),
                s.exec.depth(),
            );
            debug!(?kind, ?granularity, pc, depth = request.depth, "step");
            s.step = Some(request);
        });
    }

    /// Block until the current worker burst has finished and reported
    pub fn wait(&self) {
        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                warn!("wait called from the worker thread");
                *self.inner.worker.lock() = Some(handle);
                return;
            }
            if handle.join().is_err() {
                error!("debug worker thread panicked");
            }
        }
    }

    /// Put a halted or finished session back at the start of the program
    pub fn reset(&self) {
        self.halt();
        self.inner.with_outer_lock(|s| {
            s.exec.rewind();
            s.run_state = RunState::Paused;
            s.step = None;
            s.exception = None;
            s.exception_trace.clear();
            s.done = false;
            s.stop_on_entry = s.entry_requested;
        });
        debug!("reset");
    }

    /// Unwind to frame `frame_id` and re-enter it with its original arguments
    pub fn restart_frame(&self, frame_id: usize) -> Result<(), SessionError> {
        self.inner.with_outer_lock(|s| {
            if s.no_debug {
                return Ok(());
            }
            if s.done {
                return Err(SessionError::Finished);
            }
            if !s.exec.restart_frame(frame_id) {
                return Err(SessionError::InvalidFrame(frame_id));
            }
            s.step = None;
            s.exception = None;
            s.exception_trace.clear();
            debug!(frame_id, pc = s.exec.pc(), "restart frame");
            Ok(())
        })
    }

    // ── Breakpoints ──────────────────────────────────────────────────────────

    /// Replace all line breakpoints
    pub fn set_line_breakpoints(&self, lines: &[usize]) -> Vec<BreakpointStatus> {
        let index = &self.inner.breakpoints;
        let statuses: Vec<BreakpointStatus> = lines
            .iter()
            .map(|&line| match index.inst_from_source(line) {
                Some(pc) => BreakpointStatus {
                    requested: line,
                    verified: true,
                    line,
                    pc: Some(pc),
                },
                None => BreakpointStatus {
                    requested: line,
                    verified: false,
                    line: 0,
                    pc: None,
                },
            })
            .collect();
        self.inner.with_outer_lock(|s| {
            s.line_breaks.iter_mut().for_each(|b| *b = false);
            for pc in statuses.iter().filter_map(|st| st.pc) {
                s.line_breaks[pc] = true;
            }
        });
        statuses
    }

    /// Replace all instruction breakpoints
    pub fn set_inst_breakpoints(&self, pcs: &[usize]) -> Vec<BreakpointStatus> {
        let index = &self.inner.breakpoints;
        let statuses: Vec<BreakpointStatus> = pcs
            .iter()
            .map(|&pc| {
                let verified = pc < index.inst_count();
                BreakpointStatus {
                    requested: pc,
                    verified,
                    line: if verified { index.source_from_inst(pc) } else { 0 },
                    pc: verified.then_some(pc),
                }
            })
            .collect();
        self.inner.with_outer_lock(|s| {
            s.inst_breaks.iter_mut().for_each(|b| *b = false);
            for pc in statuses.iter().filter_map(|st| st.pc) {
                s.inst_breaks[pc] = true;
            }
        });
        statuses
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    /// Visit the live frames, newest first
    pub fn stack_frames(&self, mut visit: impl FnMut(FrameView)) {
        let views = self.inner.with_outer_lock(|s| {
            if s.no_debug {
                return Vec::new();
            }
            frame_views(&s.exec)
        });
        views.into_iter().for_each(&mut visit);
    }

    /// Overwrite a variable of frame `frame_id`
    pub fn set_variable(
        &self,
        frame_id: usize,
        slot: VarSlot,
        value: Value,
    ) -> Result<(), SessionError> {
        self.inner.with_outer_lock(|s| {
            if frame_id == 0 || frame_id > s.exec.depth() {
                return Err(SessionError::InvalidFrame(frame_id));
            }
            let frame = frame_id - 1;
            let reference = match slot {
                VarSlot::Param(slot) => Reference::Param { frame, slot },
                VarSlot::Local(slot) => Reference::Local { frame, slot },
                VarSlot::Global(slot) => Reference::Global(slot),
            };
            s.exec.store(&reference, value)?;
            Ok(())
        })
    }

    /// Run a compiled expression (ending in `Halt {nval: 1}`) against frame `frame_id`
    pub fn evaluate(&self, frame_id: usize, code: &[Instruction]) -> Result<Value, SessionError> {
        self.inner.with_outer_lock(|s| {
            if frame_id == 0 || frame_id > s.exec.depth() {
                return Err(SessionError::InvalidFrame(frame_id));
            }
            s.exec.evaluate(frame_id, code).map_err(SessionError::Evaluation)
        })
    }

    /// Trace and error of the exception the session is paused on
    pub fn current_exception(&self) -> Option<(String, RuntimeError)> {
        self.inner.with_outer_lock(|s| {
            s.exception
                .as_ref()
                .map(|panic| (s.exception_trace.clone(), panic.error.clone()))
        })
    }

    /// Current pc and source position
    pub fn position(&self) -> (usize, SourcePos) {
        self.inner
            .with_outer_lock(|s| (s.exec.pc(), s.exec.current_pos()))
    }

    /// Live stack as `{file}:{line}: in {scope}` lines
    pub fn stack_trace(&self) -> String {
        self.inner.with_outer_lock(|s| s.exec.stack_trace(&s.file))
    }
}

impl std::fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSession")
            .field("running", &self.is_running())
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

fn frame_views(exec: &Execution) -> Vec<FrameView> {
    let assembly = exec.assembly();
    let globals: Vec<(String, Option<Value>)> = match exec.stack().first() {
        Some(global) => assembly
            .global()
            .locals
            .iter()
            .cloned()
            .zip(global.locals.iter().cloned())
            .collect(),
        None => Vec::new(),
    };

    let mut views = Vec::with_capacity(exec.depth());
    exec.stack_frames(|frame, id, inst, pc| {
        let scope = assembly.scope(frame.scope);
        views.push(FrameView {
            id,
            scope_name: scope.name.clone(),
            pos: inst.pos,
            pc,
            args: scope
                .params
                .iter()
                .cloned()
                .zip(frame.params.iter().cloned())
                .collect(),
            locals: if scope.is_global {
                Vec::new()
            } else {
                scope
                    .locals
                    .iter()
                    .cloned()
                    .zip(frame.locals.iter().cloned())
                    .collect()
            },
            globals: globals.clone(),
        });
    });
    views
}

// ── Worker ───────────────────────────────────────────────────────────────────

/// Leaves the session terminated and idle if the worker unwinds mid-burst
struct UnwindGuard<'a>(&'a Inner);

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        error!("debug worker panicked; terminating session");
        let mut state = self.0.state.lock();
        state.run_state = RunState::Terminated;
        state.step = None;
        self.0.running.store(false, Ordering::SeqCst);
    }
}

impl Inner {
    /// Take the lock ahead of the worker's next instruction
    fn with_outer_lock<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        self.yield_requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        self.yield_requests.fetch_sub(1, Ordering::SeqCst);
        f(&mut state)
    }

    fn run_burst(&self) {
        let _unwind = UnwindGuard(self);
        let mut state = self.state.lock();
        let outcome = self.burst(&mut state);
        if !matches!(outcome, Outcome::Paused(_) | Outcome::Exception(_)) {
            state.step = None;
        }
        // Cleared under the lock so controllers never see a live worker that
        // has already decided its outcome.
        self.running.store(false, Ordering::SeqCst);
        drop(state);
        self.report(outcome);
    }

    fn burst(&self, state: &mut MutexGuard<'_, SessionState>) -> Outcome {
        if state.run_state != RunState::Running {
            return stopped_outcome(state.run_state);
        }
        if state.stop_on_entry {
            state.stop_on_entry = false;
            if !state.no_debug {
                state.run_state = RunState::Paused;
                return Outcome::Paused(PauseReason::Entry);
            }
        }

        loop {
            if self.yield_requests.load(Ordering::SeqCst) > 0 {
                MutexGuard::unlocked_fair(state, || {});
            }
            if state.run_state != RunState::Running {
                return stopped_outcome(state.run_state);
            }
            if state.exec.is_done() {
                return self.finish(state);
            }

            let pc = state.exec.pc();
            if !state.no_debug {
                let line = self.breakpoints.source_from_inst(pc);
                let depth = state.exec.depth();
                if let Some(step) = state.step {
                    if step.should_pause(pc, line, depth) {
                        state.step = None;
                        state.run_state = RunState::Paused;
                        return Outcome::Paused(PauseReason::Step);
                    }
                }
            }

            if let Err(err) = state.exec.step() {
                let panic = state.exec.panic(err);
                return self.fail(state, panic);
            }
            if state.exec.is_done() {
                return self.finish(state);
            }

            let pc = state.exec.pc();
            if !state.no_debug
                && (state.line_breaks.get(pc).copied().unwrap_or(false)
                    || state.inst_breaks.get(pc).copied().unwrap_or(false))
            {
                trace!(pc, line = self.breakpoints.source_from_inst(pc), "breakpoint hit");
                state.step = None;
                state.run_state = RunState::Paused;
                return Outcome::Paused(PauseReason::Breakpoint);
            }
        }
    }

    fn finish(&self, state: &mut SessionState) -> Outcome {
        state.done = true;
        state.run_state = RunState::Terminated;
        Outcome::Finished
    }

    fn fail(&self, state: &mut SessionState, panic: VmPanic) -> Outcome {
        let trace = panic.trace(&state.file);
        if state.no_debug {
            error!(error = %panic, "program panicked\n{}", trace);
            state.done = true;
            state.run_state = RunState::Terminated;
            return Outcome::Panicked(panic);
        }
        debug!(error = %panic, pc = panic.pc, "paused on exception");
        state.run_state = RunState::Paused;
        state.step = None;
        state.exception = Some(panic.clone());
        state.exception_trace = trace;
        Outcome::Exception(panic)
    }

    fn report(&self, outcome: Outcome) {
        let events = &self.events;
        match outcome {
            Outcome::Paused(reason) => {
                debug!(%reason, "paused");
                events.paused(reason);
            }
            Outcome::Exception(panic) => events.exception(&panic),
            Outcome::Panicked(panic) => {
                events.panicked(&panic);
                events.exited(1);
            }
            Outcome::Finished => {
                debug!("program exited");
                events.exited(0);
                events.terminated();
            }
            Outcome::Terminated => events.terminated(),
            Outcome::Halted => {}
        }
    }
}

fn stopped_outcome(run_state: RunState) -> Outcome {
    match run_state {
        RunState::Terminated => Outcome::Terminated,
        RunState::Halted => Outcome::Halted,
        RunState::Running | RunState::Paused => Outcome::Paused(PauseReason::Pause),
    }
}
