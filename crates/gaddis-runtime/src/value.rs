//! Runtime value representation
//!
//! Every slot, evaluation-stack entry and library argument is a [`Value`]:
//! - Integers, Reals, Booleans, Characters: immediate values
//! - Strings: immutable byte sequences (`Arc<[u8]>`), replaced rather than mutated
//! - Arrays: `Shared<Vec<Value>>`, so element references stay valid while the array is reachable
//! - Objects: a class index plus a shared field array
//! - Files: an open host file handle
//! - References: a storage location that can be read or written in place

use crate::stdlib::io::FileHandle;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Explicit reference semantics wrapper.
///
/// All clones of a `Shared<T>` point at the same storage; a mutation through
/// any clone is visible to all of them.
#[derive(Debug)]
pub struct Shared<T>(Arc<parking_lot::Mutex<T>>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Shared(Arc::new(parking_lot::Mutex::new(value)))
    }

    /// Acquire the lock and apply a read function.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.0.lock();
        f(&*guard)
    }

    /// Acquire the lock and apply a mutation function.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut *guard)
    }

    /// True if both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Arc::clone(&self.0))
    }
}

/// An object instance: its class (which selects the vtable) and its fields.
#[derive(Debug, Clone)]
pub struct Object {
    pub class: usize,
    pub fields: Shared<Vec<Option<Value>>>,
}

impl Object {
    pub fn new(class: usize, nfields: usize) -> Self {
        Self {
            class,
            fields: Shared::new(vec![None; nfields]),
        }
    }
}

/// A writable storage location.
///
/// Frame-relative variants index into the call stack; they are only
/// meaningful while that frame is live.
#[derive(Debug, Clone)]
pub enum Reference {
    /// Slot in the global frame
    Global(usize),
    /// Local slot of the frame at `frame` (0 = bottom of the call stack)
    Local { frame: usize, slot: usize },
    /// Parameter slot of the frame at `frame`
    Param { frame: usize, slot: usize },
    /// Element of a live array
    Element {
        array: Shared<Vec<Value>>,
        index: usize,
    },
    /// Field of a live object
    Field {
        object: Shared<Vec<Option<Value>>>,
        index: usize,
    },
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reference::Global(a), Reference::Global(b)) => a == b,
            (
                Reference::Local { frame: f1, slot: s1 },
                Reference::Local { frame: f2, slot: s2 },
            )
            | (
                Reference::Param { frame: f1, slot: s1 },
                Reference::Param { frame: f2, slot: s2 },
            ) => f1 == f2 && s1 == s2,
            (
                Reference::Element { array: a, index: i },
                Reference::Element { array: b, index: j },
            ) => a.ptr_eq(b) && i == j,
            (
                Reference::Field { object: a, index: i },
                Reference::Field { object: b, index: j },
            ) => a.ptr_eq(b) && i == j,
            _ => false,
        }
    }
}

/// Runtime value type
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Real(f64),
    Bool(bool),
    Char(u8),
    Str(Arc<[u8]>),
    Array(Shared<Vec<Value>>),
    Object(Object),
    File(Shared<FileHandle>),
    Ref(Reference),
}

impl Value {
    /// Build a string value from UTF-8 text
    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s.as_bytes()))
    }

    pub fn bytes(b: Vec<u8>) -> Value {
        Value::Str(Arc::from(b))
    }

    /// Build a fresh, independently owned array
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Shared::new(items))
    }

    /// Type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Integer",
            Value::Real(_) => "Real",
            Value::Bool(_) => "Boolean",
            Value::Char(_) => "Character",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::File(_) => "File",
            Value::Ref(_) => "Reference",
        }
    }

    pub fn as_int(&self) -> Result<i64, RuntimeError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(RuntimeError::mismatch("Integer", other)),
        }
    }

    pub fn as_real(&self) -> Result<f64, RuntimeError> {
        match self {
            Value::Real(n) => Ok(*n),
            other => Err(RuntimeError::mismatch("Real", other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(RuntimeError::mismatch("Boolean", other)),
        }
    }

    pub fn as_char(&self) -> Result<u8, RuntimeError> {
        match self {
            Value::Char(c) => Ok(*c),
            other => Err(RuntimeError::mismatch("Character", other)),
        }
    }

    pub fn as_str(&self) -> Result<&Arc<[u8]>, RuntimeError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(RuntimeError::mismatch("String", other)),
        }
    }

    pub fn as_array(&self) -> Result<&Shared<Vec<Value>>, RuntimeError> {
        match self {
            Value::Array(a) => Ok(a),
            other => Err(RuntimeError::mismatch("Array", other)),
        }
    }

    pub fn as_object(&self) -> Result<&Object, RuntimeError> {
        match self {
            Value::Object(o) => Ok(o),
            other => Err(RuntimeError::mismatch("Object", other)),
        }
    }

    pub fn as_file(&self) -> Result<&Shared<FileHandle>, RuntimeError> {
        match self {
            Value::File(f) => Ok(f),
            other => Err(RuntimeError::mismatch("File", other)),
        }
    }

    pub fn as_reference(&self) -> Result<&Reference, RuntimeError> {
        match self {
            Value::Ref(r) => Ok(r),
            other => Err(RuntimeError::mismatch("Reference", other)),
        }
    }

    /// Copy an array `dims` levels deep so no storage is shared with `self`.
    ///
    /// Non-array values are returned as-is.
    pub fn deep_clone(&self, dims: usize) -> Value {
        match self {
            Value::Array(arr) if dims > 0 => {
                let items = arr.with(|items| {
                    items
                        .iter()
                        .map(|item| item.deep_clone(dims - 1))
                        .collect::<Vec<_>>()
                });
                Value::array(items)
            }
            other => other.clone(),
        }
    }

    /// Debugger rendering: strings and characters quoted, references opaque.
    pub fn debug_string(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", String::from_utf8_lossy(s)),
            Value::Char(c) => format!("{:?}", *c as char),
            Value::Ref(_) => "<ref>".to_string(),
            Value::Array(arr) => arr.with(|items| {
                let parts: Vec<String> = items.iter().map(Value::debug_string).collect();
                format!("[{}]", parts.join(", "))
            }),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                // Content equality; an array always equals itself without re-locking.
                a.ptr_eq(b) || a.with(|x| b.with(|y| x == y))
            }
            (Value::Object(a), Value::Object(b)) => a.fields.ptr_eq(&b.fields),
            (Value::File(a), Value::File(b)) => a.ptr_eq(b),
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

/// Program-visible rendering, as used by `Display`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(n) => f.write_str(&format_real(*n)),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Char(c) => write!(f, "{}", *c as char),
            Value::Str(s) => f.write_str(&String::from_utf8_lossy(s)),
            Value::Array(arr) => arr.with(|items| {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }),
            Value::Object(obj) => write!(f, "<object #{}>", obj.class),
            Value::File(_) => f.write_str("<file>"),
            Value::Ref(_) => f.write_str("<ref>"),
        }
    }
}

/// Format a real the way the language displays it: shortest round-trip
/// digits, switching to exponent form (`1e+06`, `1.5e-05`) when the decimal
/// exponent is below -4 or at least 6.
pub fn format_real(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let sci = format!("{:e}", x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };
    if exp < -4 || exp >= 6 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        format!("{}", x)
    }
}

/// Which kind of variable a failed read targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Global,
    Local,
    Param,
    Field,
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VarKind::Global => "global variable",
            VarKind::Local => "local",
            VarKind::Param => "param variable",
            VarKind::Field => "field",
        })
    }
}

/// Runtime error type; every instruction failure surfaces as one of these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    /// Operand had the wrong runtime type
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// A variable was read before anything was stored into it
    #[error("{kind} {name} read before assignment")]
    ReadBeforeAssignment { kind: VarKind, name: String },
    /// The program image broke an invariant the code generator guarantees
    #[error("internal error: {0}")]
    Internal(String),
    #[error("stack overflow")]
    StackOverflow,
    /// Instruction ceiling exceeded
    #[error("infinite loop detected")]
    InstructionLimit,
    #[error("index {index} out of range [0, {len})")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("integer divide by zero")]
    DivideByZero,
    /// Evaluation stack did not hold the declared number of values
    #[error("expected {expected} value(s) on the evaluation stack, found {found}")]
    ReturnArity { expected: usize, found: usize },
    #[error("evaluation stack underflow")]
    EvalStackUnderflow,
    #[error("unknown library function #{0}")]
    UnknownLibFunction(usize),
    /// A library function rejected its arguments
    #[error("{function}: {message}")]
    LibArgument { function: String, message: String },
    #[error("file is not open")]
    FileNotOpen,
    #[error("I/O error: {0}")]
    Io(String),
    /// Instruction cannot execute in this form
    #[error("bad instruction: {0}")]
    BadInstruction(String),
}

impl RuntimeError {
    pub fn mismatch(expected: &'static str, found: &Value) -> Self {
        RuntimeError::TypeMismatch {
            expected,
            found: found.type_name(),
        }
    }

    /// True for failures that indicate a broken program image rather than a user error
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            RuntimeError::Internal(_)
                | RuntimeError::EvalStackUnderflow
                | RuntimeError::ReturnArity { .. }
                | RuntimeError::BadInstruction(_)
                | RuntimeError::UnknownLibFunction(_)
        )
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::Io(err.to_string())
    }
}
