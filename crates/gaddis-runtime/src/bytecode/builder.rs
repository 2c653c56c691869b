//! In-process construction of program images
//!
//! Instructions refer to labels by [`LabelId`]; a label's target is filled in
//! when it is placed, so forward references resolve in a single pass.

use super::{
    Assembly, ClassId, ClassInfo, Instruction, Label, LabelId, Op, ScopeId, ScopeInfo, StrId,
    VtableEntry,
};
use crate::span::SourcePos;
use std::collections::HashMap;
use thiserror::Error;

/// Build-time inconsistencies. A correct code generator never produces these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("label '{name}' was referenced but never placed")]
    UnresolvedLabel { name: String },
    #[error("duplicate symbol '{name}'")]
    DuplicateSymbol { name: String },
    #[error("label '{name}' placed twice")]
    LabelPlacedTwice { name: String },
}

#[derive(Debug)]
pub struct AssemblyBuilder {
    code: Vec<Instruction>,
    labels: Vec<Label>,
    placed: Vec<bool>,
    symbols: HashMap<String, LabelId>,
    strings: Vec<String>,
    string_ids: HashMap<String, StrId>,
    classes: Vec<ClassInfo>,
    scopes: Vec<ScopeInfo>,
    global_scope: ScopeId,
    pos: SourcePos,
    errors: Vec<AssemblyError>,
}

impl AssemblyBuilder {
    /// Start an image whose global scope declares `globals`
    pub fn new(globals: Vec<String>) -> Self {
        Self {
            code: Vec::new(),
            labels: Vec::new(),
            placed: Vec::new(),
            symbols: HashMap::new(),
            strings: Vec::new(),
            string_ids: HashMap::new(),
            classes: Vec::new(),
            scopes: vec![ScopeInfo::global(globals)],
            global_scope: ScopeId(0),
            pos: SourcePos::line(1),
            errors: Vec::new(),
        }
    }

    pub fn global_scope(&self) -> ScopeId {
        self.global_scope
    }

    /// Register a callable scope
    pub fn scope(&mut self, info: ScopeInfo) -> ScopeId {
        self.scopes.push(info);
        ScopeId(self.scopes.len() - 1)
    }

    /// Create an unplaced control-flow label; names need not be unique
    pub fn new_label(&mut self, name: impl Into<String>) -> LabelId {
        self.labels.push(Label {
            name: name.into(),
            pc: 0,
        });
        self.placed.push(false);
        LabelId(self.labels.len() - 1)
    }

    /// Create or look up a named symbol label (function, module, method)
    pub fn symbol(&mut self, name: &str) -> LabelId {
        if let Some(id) = self.symbols.get(name) {
            return *id;
        }
        let id = self.new_label(name);
        self.symbols.insert(name.to_string(), id);
        id
    }

    /// Create a symbol label that must not already exist
    pub fn define_symbol(&mut self, name: &str) -> LabelId {
        if self.symbols.contains_key(name) {
            self.errors.push(AssemblyError::DuplicateSymbol {
                name: name.to_string(),
            });
        }
        let id = self.new_label(name);
        self.symbols.insert(name.to_string(), id);
        id
    }

    /// Back-patch `label` to the next instruction offset
    pub fn place(&mut self, label: LabelId) {
        if self.placed[label.0] {
            self.errors.push(AssemblyError::LabelPlacedTwice {
                name: self.labels[label.0].name.clone(),
            });
            return;
        }
        self.labels[label.0].pc = self.code.len();
        self.placed[label.0] = true;
    }

    /// Intern a string literal
    pub fn intern(&mut self, s: &str) -> StrId {
        if let Some(id) = self.string_ids.get(s) {
            return *id;
        }
        self.strings.push(s.to_string());
        let id = StrId(self.strings.len() - 1);
        self.string_ids.insert(s.to_string(), id);
        id
    }

    pub fn class(&mut self, name: impl Into<String>, fields: Vec<String>) -> ClassId {
        self.classes.push(ClassInfo {
            name: name.into(),
            fields,
            vtable: Vec::new(),
        });
        ClassId(self.classes.len() - 1)
    }

    /// Append a virtual method slot to `class`, returning the slot index
    pub fn vtable_entry(&mut self, class: ClassId, label: LabelId, scope: ScopeId) -> usize {
        let vtable = &mut self.classes[class.0].vtable;
        vtable.push(VtableEntry { label, scope });
        vtable.len() - 1
    }

    /// Set the source position for subsequently emitted instructions
    pub fn at(&mut self, pos: SourcePos) -> &mut Self {
        self.pos = pos;
        self
    }

    /// Shorthand for `at(SourcePos::line(line))`
    pub fn line(&mut self, line: usize) -> &mut Self {
        self.at(SourcePos::line(line))
    }

    /// Append an instruction, returning its offset
    pub fn emit(&mut self, op: Op) -> usize {
        self.code.push(Instruction::new(self.pos, op));
        self.code.len() - 1
    }

    /// Place `label` and emit the scope's `Begin` marker
    pub fn begin(&mut self, label: LabelId, scope: ScopeId) -> usize {
        self.place(label);
        self.emit(Op::Begin { scope })
    }

    /// Current instruction count
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Finish the image, failing on any unresolved or duplicated label
    pub fn finish(mut self) -> Result<Assembly, AssemblyError> {
        if let Some(err) = self.errors.drain(..).next() {
            return Err(err);
        }
        if let Some(i) = self.placed.iter().position(|placed| !placed) {
            return Err(AssemblyError::UnresolvedLabel {
                name: self.labels[i].name.clone(),
            });
        }
        Ok(Assembly {
            code: self.code,
            labels: self.labels,
            strings: self.strings,
            classes: self.classes,
            scopes: self.scopes,
            global_scope: self.global_scope,
        })
    }
}
