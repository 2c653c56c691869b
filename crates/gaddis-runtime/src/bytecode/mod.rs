//! Program image
//!
//! An [`Assembly`] is the immutable artifact the code generator hands to the VM:
//! a flat instruction sequence, a label table, interned strings, class
//! descriptors with their virtual tables, and per-scope frame-shape metadata.

mod builder;
pub mod disasm;
mod instruction;
mod serialize;
pub mod validator;

pub use builder::{AssemblyBuilder, AssemblyError};
pub use disasm::{disassemble, disassemble_with_source, pc_ref, ref_pc};
pub use instruction::{BinOp, Instruction, NumKind, OffsetKind, Op, UnaryOp};
pub use serialize::{ImageError, IMAGE_VERSION};
pub use validator::{validate, ValidationError, ValidationErrorKind};

use serde::{Deserialize, Serialize};

/// Index into [`Assembly::labels`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub usize);

/// Index into [`Assembly::scopes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub usize);

/// Index into [`Assembly::classes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub usize);

/// Index into [`Assembly::strings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrId(pub usize);

/// A named instruction offset. `pc` is fixed once the builder places the label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub pc: usize,
}

/// Frame-shape metadata for one callable scope (or the global scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub name: String,
    #[serde(default)]
    pub is_global: bool,
    /// Parameter names, in slot order
    #[serde(default)]
    pub params: Vec<String>,
    /// Local variable names, in slot order
    #[serde(default)]
    pub locals: Vec<String>,
}

impl ScopeInfo {
    pub fn global(locals: Vec<String>) -> Self {
        Self {
            name: "global".to_string(),
            is_global: true,
            params: Vec::new(),
            locals,
        }
    }

    pub fn function(name: impl Into<String>, params: Vec<String>, locals: Vec<String>) -> Self {
        Self {
            name: name.into(),
            is_global: false,
            params,
            locals,
        }
    }
}

/// One virtual method slot: the entry label plus the callee's frame shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VtableEntry {
    pub label: LabelId,
    pub scope: ScopeId,
}

/// A class descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    /// Field names, in slot order
    #[serde(default)]
    pub fields: Vec<String>,
    /// Virtual methods, indexed by slot
    #[serde(default)]
    pub vtable: Vec<VtableEntry>,
}

/// The complete program image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub code: Vec<Instruction>,
    pub labels: Vec<Label>,
    #[serde(default)]
    pub strings: Vec<String>,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
    pub scopes: Vec<ScopeInfo>,
    pub global_scope: ScopeId,
}

impl Assembly {
    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id.0]
    }

    /// Resolved target of a label
    pub fn label_pc(&self, id: LabelId) -> usize {
        self.labels[id.0].pc
    }

    pub fn scope(&self, id: ScopeId) -> &ScopeInfo {
        &self.scopes[id.0]
    }

    pub fn global(&self) -> &ScopeInfo {
        self.scope(self.global_scope)
    }

    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.0]
    }

    /// Find a label by name
    pub fn find_label(&self, name: &str) -> Option<LabelId> {
        self.labels.iter().position(|l| l.name == name).map(LabelId)
    }

    /// Number of source lines covered by the code (the highest line seen)
    pub fn max_line(&self) -> usize {
        self.code.iter().map(|i| i.pos.line).max().unwrap_or(0)
    }
}
