//! Instruction set
//!
//! One closed enum covers every instruction. Most AST constructs lower to one
//! or a few of these; operand stacks are described bottom-to-top.

use super::{ClassId, LabelId, ScopeId, StrId};
use crate::span::SourcePos;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An instruction plus the source position it was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub pos: SourcePos,
    pub op: Op,
}

impl Instruction {
    pub fn new(pos: SourcePos, op: Op) -> Self {
        Self { pos, op }
    }
}

/// Binary operators. Which ones are legal depends on the operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Exp,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinOp {
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Exp => "exp",
            BinOp::Mod => "mod",
            BinOp::Eq => "eq",
            BinOp::Neq => "neq",
            BinOp::Lt => "lt",
            BinOp::Lte => "lte",
            BinOp::Gt => "gt",
            BinOp::Gte => "gte",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
        }
    }
}

/// Container addressed by `OffsetRef` / `OffsetVal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetKind {
    String,
    Array,
    Object,
}

/// Numeric type of a counted loop variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumKind {
    Int,
    Real,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // === Literals ===
    LitInt(i64),
    LitReal(f64),
    LitBool(bool),
    LitChar(u8),
    LitStr(StrId),

    // === Variable access ===
    GlobalRef(usize),
    GlobalVal(usize),
    LocalRef(usize),
    LocalVal(usize),
    ParamRef(usize),
    ParamVal(usize),
    /// Dereference the reference held in a by-reference parameter
    ParamPtr(usize),
    /// `[object]` -> reference to field
    FieldRef(usize),
    /// `[object]` -> field value
    FieldVal(usize),

    // === Stores ===
    /// `[value, ref]`
    Store,
    /// `[char, string ref, index]`: replace one character of the referenced string
    StoreChar,
    /// `[ref]` -> value
    Deref,

    // === Operators ===
    BinOpInt(BinOp),
    BinOpReal(BinOp),
    BinOpStr(BinOp),
    BinOpChar(BinOp),
    BinOpBool(BinOp),
    UnaryOpInt(UnaryOp),
    UnaryOpReal(UnaryOp),
    UnaryOpBool(UnaryOp),
    IntToReal,
    RealToInt,
    /// `[ref]`: add a constant in place
    IncrInt(i64),
    IncrReal(f64),

    // === Counted loops ===
    /// `[ref, start, stop, step]` -> continue?
    ForInit(NumKind),
    /// `[ref, stop, step]` -> continue?
    ForStep(NumKind),

    // === Arrays, strings and objects ===
    /// `[container, index]` -> reference
    OffsetRef(OffsetKind),
    /// `[container, index]` -> element
    OffsetVal(OffsetKind),
    /// `[v0 .. vN-1]` -> array
    ArrayNew { size: usize },
    /// `[array]` -> independent copy, `dims` levels deep
    ArrayClone { dims: usize },
    /// `[array]` -> length
    ArrayLen,
    ObjNew { class: ClassId, nfields: usize },

    // === Control ===
    Jump(LabelId),
    JumpTrue(LabelId),
    JumpFalse(LabelId),

    // === Calls ===
    /// Entry marker of a callable scope
    Begin { scope: ScopeId },
    /// Falls off the end of a scope; requires an empty evaluation stack
    End,
    /// `[arg0 .. argN-1]`
    Call {
        label: LabelId,
        scope: ScopeId,
        nargs: usize,
    },
    /// `[this, arg1 .. argN-1]`; dispatches through the receiver's vtable
    VCall {
        class: ClassId,
        slot: usize,
        nargs: usize,
    },
    Return { nval: usize },
    /// Stop the whole execution, keeping `nval` values as the result
    Halt { nval: usize },
    LibCall { index: usize, nargs: usize },

    // === Stack ===
    Dup,
    Pop,
}

impl Op {
    /// The jump target, if this instruction transfers control to a label
    pub fn jump_target(&self) -> Option<LabelId> {
        match self {
            Op::Jump(l) | Op::JumpTrue(l) | Op::JumpFalse(l) => Some(*l),
            Op::Call { label, .. } => Some(*label),
            _ => None,
        }
    }

    /// Mnemonic used by the disassembler
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::LitInt(_) | Op::LitReal(_) | Op::LitBool(_) | Op::LitChar(_) | Op::LitStr(_) => {
                "literal"
            }
            Op::GlobalRef(_) => "&global",
            Op::GlobalVal(_) => "global",
            Op::LocalRef(_) => "&local",
            Op::LocalVal(_) => "local",
            Op::ParamRef(_) => "&param",
            Op::ParamVal(_) => "param",
            Op::ParamPtr(_) => "*param",
            Op::FieldRef(_) => "&field",
            Op::FieldVal(_) => "field",
            Op::Store => "store",
            Op::StoreChar => "store char",
            Op::Deref => "deref",
            Op::BinOpInt(_)
            | Op::BinOpReal(_)
            | Op::BinOpStr(_)
            | Op::BinOpChar(_)
            | Op::BinOpBool(_) => "binop",
            Op::UnaryOpInt(_) | Op::UnaryOpReal(_) | Op::UnaryOpBool(_) => "unop",
            Op::IntToReal => "conv int real",
            Op::RealToInt => "conv real int",
            Op::IncrInt(_) => "incr int",
            Op::IncrReal(_) => "incr real",
            Op::ForInit(_) => "for init",
            Op::ForStep(_) => "for step",
            Op::OffsetRef(_) => "&offset",
            Op::OffsetVal(_) => "offset",
            Op::ArrayNew { .. } => "array new",
            Op::ArrayClone { .. } => "array clone",
            Op::ArrayLen => "array len",
            Op::ObjNew { .. } => "object new",
            Op::Jump(_) => "jump",
            Op::JumpTrue(_) => "jump true",
            Op::JumpFalse(_) => "jump false",
            Op::Begin { .. } => "begin",
            Op::End => "end",
            Op::Call { .. } => "call",
            Op::VCall { .. } => "vcall",
            Op::Return { .. } => "return",
            Op::Halt { .. } => "halt",
            Op::LibCall { .. } => "libcall",
            Op::Dup => "dup",
            Op::Pop => "pop",
        }
    }
}

impl fmt::Display for NumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NumKind::Int => "int",
            NumKind::Real => "real",
        })
    }
}

impl fmt::Display for OffsetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OffsetKind::String => "str",
            OffsetKind::Array => "arr",
            OffsetKind::Object => "obj",
        })
    }
}
