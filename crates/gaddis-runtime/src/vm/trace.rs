//! Panics and reconstructed stack traces

use crate::span::SourcePos;
use crate::value::RuntimeError;
use std::fmt::Write;
use thiserror::Error;

/// One line of a panic trace, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// `name(arg,arg)` for calls, the bare scope name for the global frame,
    /// the library function name for a native frame
    pub scope: String,
    pub pos: SourcePos,
    pub pc: usize,
    /// Synthetic frame for a failing library call
    pub is_native: bool,
}

/// A runtime error together with where it happened.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct VmPanic {
    pub error: RuntimeError,
    pub pc: usize,
    pub pos: SourcePos,
    pub frames: Vec<TraceFrame>,
}

impl VmPanic {
    /// Render the trace as `{file}:{line}: in {scope}` lines
    pub fn trace(&self, file: &str) -> String {
        let mut out = String::new();
        for frame in &self.frames {
            let _ = writeln!(out, "{}:{}: in {}", file, frame.pos.line, frame.scope);
        }
        out
    }
}
