//! Shared helpers for runtime integration tests
//!
//! Programs here are hand-assembled the way the code generator would emit
//! them; each instruction carries the source line it came from.

#![allow(dead_code)]

use gaddis_runtime::bytecode::{AssemblyBuilder, BinOp, NumKind, ScopeInfo};
use gaddis_runtime::stdlib::{lib_index, BufferedIo};
use gaddis_runtime::{Assembly, EventHost, ExecutionContext, Op, PauseReason, VmPanic};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Install a test-writer subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Context with scripted input and a handle on the captured output
pub fn buffered_ctx(input: &str) -> (ExecutionContext, BufferedIo) {
    let io = BufferedIo::new(input);
    (ExecutionContext::new(Box::new(io.clone()), Some(7)), io)
}

pub fn lib(name: &str) -> usize {
    lib_index(name).unwrap_or_else(|| panic!("no library function {}", name))
}

/// ```text
/// 1  Declare Integer total = 0
/// 2  For i = 1 To 10
/// 3      Set total = total + i
/// 4  End For
/// 5  Display total
/// ```
pub fn sum_program() -> Assembly {
    let mut b = AssemblyBuilder::new(vec!["total".into(), "i".into()]);
    let body = b.new_label("for_body");
    let done = b.new_label("for_done");

    b.line(1);
    b.emit(Op::LitInt(0));
    b.emit(Op::GlobalRef(0));
    b.emit(Op::Store);

    b.line(2);
    b.emit(Op::GlobalRef(1));
    b.emit(Op::LitInt(1));
    b.emit(Op::LitInt(10));
    b.emit(Op::LitInt(1));
    b.emit(Op::ForInit(NumKind::Int));
    b.emit(Op::JumpFalse(done));

    b.place(body);
    b.line(3);
    b.emit(Op::GlobalVal(0));
    b.emit(Op::GlobalVal(1));
    b.emit(Op::BinOpInt(BinOp::Add));
    b.emit(Op::GlobalRef(0));
    b.emit(Op::Store);

    b.line(4);
    b.emit(Op::GlobalRef(1));
    b.emit(Op::LitInt(10));
    b.emit(Op::LitInt(1));
    b.emit(Op::ForStep(NumKind::Int));
    b.emit(Op::JumpTrue(body));

    b.place(done);
    b.line(5);
    b.emit(Op::GlobalVal(0));
    b.emit(Op::LibCall {
        index: lib("Display"),
        nargs: 1,
    });
    b.emit(Op::End);
    b.finish().expect("sum program assembles")
}

/// ```text
/// 1  Call show(5)
/// 2  Display "after"
///    ...
/// 10 Module show(Integer n)
/// 11     Declare Integer x
/// 12     Display n, x
/// 13 End Module
/// ```
pub fn uninitialized_local_program() -> Assembly {
    let mut b = AssemblyBuilder::new(vec![]);
    let show = b.define_symbol("show");
    let scope = b.scope(ScopeInfo::function("show", vec!["n".into()], vec!["x".into()]));
    let after = b.intern("after");

    b.line(1);
    b.emit(Op::LitInt(5));
    b.emit(Op::Call {
        label: show,
        scope,
        nargs: 1,
    });
    b.line(2);
    b.emit(Op::LitStr(after));
    b.emit(Op::LibCall {
        index: lib("Display"),
        nargs: 1,
    });
    b.emit(Op::End);

    b.line(10);
    b.begin(show, scope);
    b.line(12);
    b.emit(Op::ParamVal(0));
    b.emit(Op::LocalVal(0));
    b.emit(Op::LibCall {
        index: lib("Display"),
        nargs: 2,
    });
    b.line(13);
    b.emit(Op::End);
    b.finish().expect("program assembles")
}

/// ```text
/// 1  While True
/// 2      Set n = n + 1
/// 3  End While
/// ```
pub fn endless_program() -> Assembly {
    let mut b = AssemblyBuilder::new(vec!["n".into()]);
    let top = b.new_label("while_top");
    b.line(1);
    b.emit(Op::LitInt(0));
    b.emit(Op::GlobalRef(0));
    b.emit(Op::Store);
    b.place(top);
    b.line(2);
    b.emit(Op::GlobalRef(0));
    b.emit(Op::IncrInt(1));
    b.line(3);
    b.emit(Op::Jump(top));
    b.finish().expect("loop assembles")
}

/// ```text
/// 1  While True
/// 2      Call bump(n)
/// 3  End While
///    ...
/// 10 Module bump(Integer k)
/// 11     Set n = k + 1
/// 12 End Module
/// ```
pub fn calling_loop_program() -> Assembly {
    let mut b = AssemblyBuilder::new(vec!["n".into()]);
    let bump = b.define_symbol("bump");
    let scope = b.scope(ScopeInfo::function("bump", vec!["k".into()], vec![]));
    let top = b.new_label("while_top");

    b.line(1);
    b.emit(Op::LitInt(0));
    b.emit(Op::GlobalRef(0));
    b.emit(Op::Store);
    b.place(top);
    b.line(2);
    b.emit(Op::GlobalVal(0));
    b.emit(Op::Call {
        label: bump,
        scope,
        nargs: 1,
    });
    b.line(3);
    b.emit(Op::Jump(top));

    b.line(10);
    b.begin(bump, scope);
    b.line(11);
    b.emit(Op::ParamVal(0));
    b.emit(Op::LitInt(1));
    b.emit(Op::BinOpInt(BinOp::Add));
    b.emit(Op::GlobalRef(0));
    b.emit(Op::Store);
    b.line(12);
    b.emit(Op::End);
    b.finish().expect("calling loop assembles")
}

/// Offset of the first `Begin` marker, where procedure code starts
pub fn first_begin(asm: &Assembly) -> usize {
    asm.code
        .iter()
        .position(|inst| matches!(inst.op, Op::Begin { .. }))
        .expect("program has a procedure")
}

// ── Recording host ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Paused(PauseReason),
    Exception(String),
    Panicked(String),
    Exited(i32),
    Terminated,
}

/// Event host that records everything and lets tests block on arrivals
#[derive(Default)]
pub struct RecordingHost {
    events: Mutex<Vec<Event>>,
    arrived: Condvar,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Block until `count` events have arrived, failing after five seconds
    pub fn wait_for_count(&self, count: usize) -> Vec<Event> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = self.events.lock();
        while events.len() < count {
            if self.arrived.wait_until(&mut events, deadline).timed_out() {
                panic!("timed out waiting for {} events, got {:?}", count, *events);
            }
        }
        events.clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
        self.arrived.notify_all();
    }
}

impl EventHost for RecordingHost {
    fn paused(&self, reason: PauseReason) {
        self.push(Event::Paused(reason));
    }

    fn exception(&self, panic: &VmPanic) {
        self.push(Event::Exception(panic.to_string()));
    }

    fn panicked(&self, panic: &VmPanic) {
        self.push(Event::Panicked(panic.to_string()));
    }

    fn exited(&self, code: i32) {
        self.push(Event::Exited(code));
    }

    fn terminated(&self) {
        self.push(Event::Terminated);
    }
}
