//! Stack-based virtual machine
//!
//! Executes a program image one instruction at a time.
//! - The call stack holds one [`Frame`] per active scope; `stack[0]` is the
//!   global frame and its locals are the program's globals
//! - Each frame owns its evaluation stack
//! - Storage locations are addressed by [`Reference`] handles, never pointers
//! - An empty call stack means the program has finished

mod dispatch;
mod frame;
mod trace;

pub use dispatch::{exp_int, for_predicate};
pub use frame::Frame;
pub use trace::{TraceFrame, VmPanic};

use crate::bytecode::{Assembly, Instruction, Op};
use crate::span::SourcePos;
use crate::stdlib::{self, ExecutionContext, LibraryTable};
use crate::value::{Reference, RuntimeError, Shared, Value, VarKind};
use gaddis_config::VmConfig;
use std::sync::Arc;

/// A running (or finished) program.
///
/// Cloning an execution copies the call stack; arrays and objects reachable
/// from it stay shared with the original.
#[derive(Debug, Clone)]
pub struct Execution {
    pc: usize,
    assembly: Arc<Assembly>,
    /// Interned string literals, materialized once
    strings: Arc<[Arc<[u8]>]>,
    stack: Vec<Frame>,
    lib: LibraryTable,
    ctx: Shared<ExecutionContext>,
    limits: VmConfig,
    executed: u64,
    result: Option<Value>,
}

impl Execution {
    /// Create an execution with default limits
    pub fn new(assembly: Arc<Assembly>, ctx: ExecutionContext) -> Self {
        Self::with_config(assembly, ctx, &VmConfig::default())
    }

    pub fn with_config(assembly: Arc<Assembly>, ctx: ExecutionContext, limits: &VmConfig) -> Self {
        let strings: Arc<[Arc<[u8]>]> = assembly
            .strings
            .iter()
            .map(|s| Arc::from(s.as_bytes()))
            .collect();
        let global = Frame::new(
            assembly.global_scope,
            0,
            0,
            Vec::new(),
            assembly.global().locals.len(),
        );
        Self {
            pc: 0,
            assembly,
            strings,
            stack: vec![global],
            lib: LibraryTable::standard(),
            ctx: Shared::new(ctx),
            limits: *limits,
            executed: 0,
            result: None,
        }
    }

    pub fn assembly(&self) -> &Arc<Assembly> {
        &self.assembly
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Number of live frames
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_done(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn stack(&self) -> &[Frame] {
        &self.stack
    }

    /// The instruction at pc, if the program is still running
    pub fn current_instruction(&self) -> Option<&Instruction> {
        if self.is_done() {
            return None;
        }
        self.assembly.code.get(self.pc)
    }

    pub fn current_pos(&self) -> SourcePos {
        self.current_instruction()
            .map(|inst| inst.pos)
            .unwrap_or_default()
    }

    /// Value left behind by `Halt {nval: 1}`
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn context(&self) -> &Shared<ExecutionContext> {
        &self.ctx
    }

    /// Execute exactly one instruction
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        if self.is_done() {
            return Err(RuntimeError::Internal("execution already finished".to_string()));
        }
        if self.executed >= self.limits.max_instructions {
            return Err(RuntimeError::InstructionLimit);
        }
        self.executed += 1;

        let assembly = Arc::clone(&self.assembly);
        let inst = assembly.code.get(self.pc).ok_or_else(|| {
            RuntimeError::BadInstruction(format!("pc {} is past the end of the code", self.pc))
        })?;
        match self.exec_op(&inst.op)? {
            Flow::Next => self.pc += 1,
            Flow::Jump(target) => self.pc = target,
        }
        Ok(())
    }

    /// Run until the call stack empties or an instruction fails
    pub fn run(&mut self) -> Result<(), VmPanic> {
        while !self.is_done() {
            if let Err(error) = self.step() {
                return Err(self.panic(error));
            }
        }
        Ok(())
    }

    /// Capture `error` with the current location and stack trace
    pub fn panic(&self, error: RuntimeError) -> VmPanic {
        let mut frames = Vec::new();
        self.stack_frames(|frame, _, inst, pc| {
            // only the top frame can be sitting on a library call
            if let Op::LibCall { index, .. } = inst.op {
                frames.push(TraceFrame {
                    scope: stdlib::library_name(index).unwrap_or("?").to_string(),
                    pos: inst.pos,
                    pc,
                    is_native: true,
                });
            }
            frames.push(TraceFrame {
                scope: self.format_frame_scope(frame),
                pos: inst.pos,
                pc,
                is_native: false,
            });
        });
        VmPanic {
            error,
            pc: self.pc,
            pos: self.current_pos(),
            frames,
        }
    }

    /// Visit live frames from newest to oldest.
    ///
    /// The callback receives the frame, its 1-based id from the bottom of the
    /// stack, the instruction it is executing and that instruction's offset.
    pub fn stack_frames(&self, mut visit: impl FnMut(&Frame, usize, &Instruction, usize)) {
        let mut pc = self.pc;
        for (i, frame) in self.stack.iter().enumerate().rev() {
            if let Some(inst) = self.assembly.code.get(pc) {
                visit(frame, i + 1, inst, pc);
            }
            pc = frame.return_pc;
        }
    }

    /// Render the live stack as `{file}:{line}: in {scope}` lines
    pub fn stack_trace(&self, file: &str) -> String {
        let mut out = String::new();
        self.stack_frames(|frame, _, inst, _| {
            out.push_str(&format!(
                "{}:{}: in {}\n",
                file,
                inst.pos.line,
                self.format_frame_scope(frame)
            ));
        });
        out
    }

    /// `name(arg,arg)`, or just the name for the global frame
    pub fn format_frame_scope(&self, frame: &Frame) -> String {
        let scope = self.assembly.scope(frame.scope);
        if scope.is_global {
            return scope.name.clone();
        }
        let args: Vec<String> = frame.args.iter().map(Value::debug_string).collect();
        format!("{}({})", scope.name, args.join(","))
    }

    /// Unwind to frame `id` (1-based) and restart it from its `Begin`.
    ///
    /// Returns false for an id that does not name a live frame.
    pub fn restart_frame(&mut self, id: usize) -> bool {
        if id < 1 || id > self.stack.len() {
            return false;
        }
        self.stack.truncate(id);
        if let Some(frame) = self.stack.last_mut() {
            frame.reset();
            self.pc = frame.start;
        }
        true
    }

    /// Start the program over with fresh globals.
    ///
    /// The execution context (RNG, I/O provider) carries over.
    pub fn rewind(&mut self) {
        let global = Frame::new(
            self.assembly.global_scope,
            0,
            0,
            Vec::new(),
            self.assembly.global().locals.len(),
        );
        self.stack = vec![global];
        self.pc = 0;
        self.executed = 0;
        self.result = None;
    }

    /// Evaluate a compiled expression in the context of frame `frame_id`.
    ///
    /// `code` runs on a clone of this execution inside a frame that copies the
    /// target frame's slots, and must end in `Halt {nval: 1}`. The live
    /// program is not disturbed.
    pub fn evaluate(&self, frame_id: usize, code: &[Instruction]) -> Result<Value, VmPanic> {
        let target = frame_id
            .checked_sub(1)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| {
                self.panic(RuntimeError::Internal(format!("frame {} not found", frame_id)))
            })?;

        let mut assembly = (*self.assembly).clone();
        let start = assembly.code.len();
        assembly.code.extend_from_slice(code);

        let mut exec = self.clone();
        exec.assembly = Arc::new(assembly);
        exec.executed = 0;
        exec.result = None;
        exec.stack.push(Frame {
            scope: target.scope,
            start,
            return_pc: 0,
            args: target.args.clone(),
            params: target.params.clone(),
            locals: target.locals.clone(),
            eval: Vec::new(),
        });
        exec.pc = start;
        exec.run()?;
        exec.result.take().ok_or_else(|| {
            exec.panic(RuntimeError::Internal(
                "expression produced no value".to_string(),
            ))
        })
    }

    /// Read through a reference
    pub fn load(&self, reference: &Reference) -> Result<Value, RuntimeError> {
        match self.peek_ref(reference)? {
            Some(value) => Ok(value),
            None => {
                let (kind, name) = self.describe_ref(reference);
                Err(RuntimeError::ReadBeforeAssignment { kind, name })
            }
        }
    }

    /// Write through a reference
    pub fn store(&mut self, reference: &Reference, value: Value) -> Result<(), RuntimeError> {
        match reference {
            Reference::Global(slot) => {
                let global = self.stack.first_mut().ok_or_else(no_frame)?;
                *slot_mut(&mut global.locals, *slot)? = Some(value);
            }
            Reference::Local { frame, slot } => {
                let frame = self.stack.get_mut(*frame).ok_or_else(dead_frame)?;
                *slot_mut(&mut frame.locals, *slot)? = Some(value);
            }
            Reference::Param { frame, slot } => {
                let frame = self.stack.get_mut(*frame).ok_or_else(dead_frame)?;
                *slot_mut(&mut frame.params, *slot)? = value;
            }
            Reference::Element { array, index } => {
                array.with_mut(|items| match items.get_mut(*index) {
                    Some(item) => {
                        *item = value;
                        Ok(())
                    }
                    None => Err(RuntimeError::IndexOutOfRange {
                        index: *index as i64,
                        len: items.len(),
                    }),
                })?;
            }
            Reference::Field { object, index } => {
                object.with_mut(|fields| match fields.get_mut(*index) {
                    Some(field) => {
                        *field = Some(value);
                        Ok(())
                    }
                    None => Err(RuntimeError::Internal(format!(
                        "field {} out of range",
                        index
                    ))),
                })?;
            }
        }
        Ok(())
    }

    /// Read through a reference, `None` for an unassigned slot
    fn peek_ref(&self, reference: &Reference) -> Result<Option<Value>, RuntimeError> {
        match reference {
            Reference::Global(slot) => {
                let global = self.stack.first().ok_or_else(no_frame)?;
                Ok(slot_ref(&global.locals, *slot)?.clone())
            }
            Reference::Local { frame, slot } => {
                let frame = self.stack.get(*frame).ok_or_else(dead_frame)?;
                Ok(slot_ref(&frame.locals, *slot)?.clone())
            }
            Reference::Param { frame, slot } => {
                let frame = self.stack.get(*frame).ok_or_else(dead_frame)?;
                Ok(Some(slot_ref(&frame.params, *slot)?.clone()))
            }
            Reference::Element { array, index } => array.with(|items| {
                items
                    .get(*index)
                    .cloned()
                    .map(Some)
                    .ok_or(RuntimeError::IndexOutOfRange {
                        index: *index as i64,
                        len: items.len(),
                    })
            }),
            Reference::Field { object, index } => object.with(|fields| {
                fields
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| RuntimeError::Internal(format!("field {} out of range", index)))
            }),
        }
    }

    /// Variable kind and name for error messages
    fn describe_ref(&self, reference: &Reference) -> (VarKind, String) {
        let scope_names = |frame: usize, params: bool, slot: usize| {
            self.stack
                .get(frame)
                .map(|f| self.assembly.scope(f.scope))
                .and_then(|s| {
                    if params {
                        s.params.get(slot)
                    } else {
                        s.locals.get(slot)
                    }
                })
                .cloned()
                .unwrap_or_else(|| format!("#{}", slot))
        };
        match reference {
            Reference::Global(slot) => (
                VarKind::Global,
                self.assembly
                    .global()
                    .locals
                    .get(*slot)
                    .cloned()
                    .unwrap_or_else(|| format!("#{}", slot)),
            ),
            Reference::Local { frame, slot } => (VarKind::Local, scope_names(*frame, false, *slot)),
            Reference::Param { frame, slot } => (VarKind::Param, scope_names(*frame, true, *slot)),
            Reference::Element { index, .. } => (VarKind::Local, format!("element [{}]", index)),
            Reference::Field { index, .. } => (VarKind::Field, format!("#{}", index)),
        }
    }

    fn frame(&self) -> Result<&Frame, RuntimeError> {
        self.stack.last().ok_or_else(no_frame)
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.stack.last_mut().ok_or_else(no_frame)
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.frame_mut()?.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.frame_mut()?.pop()
    }
}

/// How control continues after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Jump(usize),
}

fn no_frame() -> RuntimeError {
    RuntimeError::Internal("no active frame".to_string())
}

fn dead_frame() -> RuntimeError {
    RuntimeError::Internal("reference to a frame that has returned".to_string())
}

fn slot_ref<T>(slots: &[T], slot: usize) -> Result<&T, RuntimeError> {
    slots
        .get(slot)
        .ok_or_else(|| RuntimeError::Internal(format!("slot {} out of range", slot)))
}

fn slot_mut<T>(slots: &mut [T], slot: usize) -> Result<&mut T, RuntimeError> {
    slots
        .get_mut(slot)
        .ok_or_else(|| RuntimeError::Internal(format!("slot {} out of range", slot)))
}
