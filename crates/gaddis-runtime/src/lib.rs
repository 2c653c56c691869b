//! Gaddis Runtime - bytecode VM and debug-session engine
//!
//! This library provides:
//! - The program image (`Assembly`) with its builder, validator and disassembler
//! - The stack-based execution engine with reference semantics and virtual dispatch
//! - The host library table invoked by `LibCall`
//! - A concurrent debug session (breakpoints, stepping, frame inspection)

/// Gaddis runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bytecode;
pub mod debugger;
pub mod span;
pub mod stdlib;
pub mod value;
pub mod vm;

pub use bytecode::{Assembly, AssemblyBuilder, Instruction, Op};
pub use debugger::{
    BreakpointStatus, DebugSession, EventHost, FrameView, PauseReason, RunState, SessionError,
    StepGranularity, StepKind, VarSlot,
};
pub use span::SourcePos;
pub use stdlib::{ExecutionContext, IoProvider, LibraryTable};
pub use value::{Reference, RuntimeError, Shared, Value};
pub use vm::{Execution, Frame, TraceFrame, VmPanic};
