//! Program image validator: static checks before VM execution
//!
//! Images arrive from an external generator (usually as JSON), so every index
//! an instruction carries is checked against the tables it points into:
//! 1. **Tables** - every label targets an instruction, every vtable entry lands
//!    on a `Begin` of the scope it names
//! 2. **Operands** - string, class, scope, label and variable-slot indexes are
//!    in range for the enclosing scope
//! 3. **Calls** - call targets land on a `Begin` whose scope matches the call
//!    and whose parameter count matches the argument count
//!
//! All problems are collected; the validator never stops at the first one.

use super::disasm::pc_ref;
use super::{Assembly, LabelId, Op, ScopeId};
use std::fmt;

// ============================================================================
// Public API
// ============================================================================

/// A validation error with the instruction offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Instruction offset; table-level problems report 0.
    pub offset: usize,
    pub kind: ValidationErrorKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", pc_ref(self.offset), self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The image holds no instructions at all.
    EmptyProgram,
    /// The global scope index does not name a scope.
    BadGlobalScope { index: usize },
    /// A label index exceeds the label table.
    LabelIndexOutOfBounds { index: usize, count: usize },
    /// A label targets past the end of the code.
    LabelOutOfBounds { name: String, target: usize, len: usize },
    StringIndexOutOfBounds { index: usize, count: usize },
    ClassIndexOutOfBounds { index: usize, count: usize },
    ScopeIndexOutOfBounds { index: usize, count: usize },
    /// A global, local or parameter slot outside the scope's frame shape.
    SlotOutOfBounds {
        kind: &'static str,
        index: usize,
        count: usize,
    },
    /// A call or vtable target is not a `Begin` marker.
    CallTargetNotBegin { name: String },
    /// A call target's `Begin` belongs to a different scope than the call names.
    ScopeMismatch { name: String },
    /// Argument count differs from the callee's parameter count.
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    VtableSlotOutOfBounds { class: String, slot: usize },
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyProgram => write!(f, "program has no instructions"),
            Self::BadGlobalScope { index } => write!(f, "global scope {} does not exist", index),
            Self::LabelIndexOutOfBounds { index, count } => {
                write!(f, "label index {} out of bounds (labels={})", index, count)
            }
            Self::LabelOutOfBounds { name, target, len } => write!(
                f,
                "label '{}' targets {} which is out of bounds (len={})",
                name, target, len
            ),
            Self::StringIndexOutOfBounds { index, count } => {
                write!(f, "string index {} out of bounds (strings={})", index, count)
            }
            Self::ClassIndexOutOfBounds { index, count } => {
                write!(f, "class index {} out of bounds (classes={})", index, count)
            }
            Self::ScopeIndexOutOfBounds { index, count } => {
                write!(f, "scope index {} out of bounds (scopes={})", index, count)
            }
            Self::SlotOutOfBounds { kind, index, count } => {
                write!(f, "{} slot {} out of bounds (slots={})", kind, index, count)
            }
            Self::CallTargetNotBegin { name } => {
                write!(f, "call target '{}' is not a begin marker", name)
            }
            Self::ScopeMismatch { name } => {
                write!(f, "call to '{}' names a different scope than its begin", name)
            }
            Self::ArityMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "call to '{}' passes {} arguments, expected {}",
                name, found, expected
            ),
            Self::VtableSlotOutOfBounds { class, slot } => {
                write!(f, "class {} has no virtual slot {}", class, slot)
            }
        }
    }
}

/// Validate `asm`, collecting all errors found.
///
/// Returns `Ok(())` if no issues are found, otherwise `Err(errors)` with every
/// detected problem.
pub fn validate(asm: &Assembly) -> Result<(), Vec<ValidationError>> {
    let mut v = Validator {
        asm,
        errors: Vec::new(),
    };

    if asm.code.is_empty() {
        v.error(0, ValidationErrorKind::EmptyProgram);
    }
    if asm.global_scope.0 >= asm.scopes.len() {
        v.error(
            0,
            ValidationErrorKind::BadGlobalScope {
                index: asm.global_scope.0,
            },
        );
        return Err(v.errors);
    }

    v.check_tables();
    v.check_code();

    if v.errors.is_empty() {
        Ok(())
    } else {
        Err(v.errors)
    }
}

// ============================================================================
// Checks
// ============================================================================

struct Validator<'a> {
    asm: &'a Assembly,
    errors: Vec<ValidationError>,
}

impl Validator<'_> {
    fn error(&mut self, offset: usize, kind: ValidationErrorKind) {
        self.errors.push(ValidationError { offset, kind });
    }

    fn check_tables(&mut self) {
        let len = self.asm.code.len();
        for label in &self.asm.labels {
            if label.pc >= len {
                self.error(
                    0,
                    ValidationErrorKind::LabelOutOfBounds {
                        name: label.name.clone(),
                        target: label.pc,
                        len,
                    },
                );
            }
        }
        for class in &self.asm.classes {
            for entry in &class.vtable {
                if self.label_ok(0, entry.label) && self.scope_ok(0, entry.scope) {
                    self.check_entry(0, entry.label, entry.scope, None);
                }
            }
        }
    }

    fn check_code(&mut self) {
        let asm = self.asm;
        let mut scope = asm.global_scope;
        for (pc, inst) in asm.code.iter().enumerate() {
            match &inst.op {
                Op::Begin { scope: id } => {
                    if self.scope_ok(pc, *id) {
                        scope = *id;
                    }
                }
                Op::LitStr(id) => {
                    if id.0 >= asm.strings.len() {
                        self.error(
                            pc,
                            ValidationErrorKind::StringIndexOutOfBounds {
                                index: id.0,
                                count: asm.strings.len(),
                            },
                        );
                    }
                }
                Op::GlobalRef(i) | Op::GlobalVal(i) => {
                    self.check_slot(pc, "global", *i, asm.global().locals.len())
                }
                Op::LocalRef(i) | Op::LocalVal(i) => {
                    self.check_slot(pc, "local", *i, asm.scope(scope).locals.len())
                }
                Op::ParamRef(i) | Op::ParamVal(i) | Op::ParamPtr(i) => {
                    self.check_slot(pc, "param", *i, asm.scope(scope).params.len())
                }
                Op::Jump(l) | Op::JumpTrue(l) | Op::JumpFalse(l) => {
                    self.label_ok(pc, *l);
                }
                Op::Call {
                    label,
                    scope: callee,
                    nargs,
                } => {
                    if self.label_ok(pc, *label) && self.scope_ok(pc, *callee) {
                        self.check_entry(pc, *label, *callee, Some(*nargs));
                    }
                }
                Op::ObjNew { class, .. } => {
                    self.class_ok(pc, class.0);
                }
                Op::VCall { class, slot, .. } => {
                    if self.class_ok(pc, class.0) {
                        let info = asm.class(*class);
                        if *slot >= info.vtable.len() {
                            self.error(
                                pc,
                                ValidationErrorKind::VtableSlotOutOfBounds {
                                    class: info.name.clone(),
                                    slot: *slot,
                                },
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// A callable entry point must be a `Begin` for the same scope
    fn check_entry(&mut self, pc: usize, label: LabelId, scope: ScopeId, nargs: Option<usize>) {
        let asm = self.asm;
        let target = asm.label(label);
        match asm.code.get(target.pc).map(|i| &i.op) {
            Some(Op::Begin { scope: begin }) => {
                if *begin != scope {
                    self.error(
                        pc,
                        ValidationErrorKind::ScopeMismatch {
                            name: target.name.clone(),
                        },
                    );
                }
            }
            Some(_) => self.error(
                pc,
                ValidationErrorKind::CallTargetNotBegin {
                    name: target.name.clone(),
                },
            ),
            // already reported as LabelOutOfBounds
            None => return,
        }
        if let Some(nargs) = nargs {
            let expected = asm.scope(scope).params.len();
            if nargs != expected {
                self.error(
                    pc,
                    ValidationErrorKind::ArityMismatch {
                        name: target.name.clone(),
                        expected,
                        found: nargs,
                    },
                );
            }
        }
    }

    fn check_slot(&mut self, pc: usize, kind: &'static str, index: usize, count: usize) {
        if index >= count {
            self.error(pc, ValidationErrorKind::SlotOutOfBounds { kind, index, count });
        }
    }

    fn label_ok(&mut self, pc: usize, label: LabelId) -> bool {
        let count = self.asm.labels.len();
        if label.0 >= count {
            self.error(
                pc,
                ValidationErrorKind::LabelIndexOutOfBounds {
                    index: label.0,
                    count,
                },
            );
            return false;
        }
        true
    }

    fn scope_ok(&mut self, pc: usize, scope: ScopeId) -> bool {
        let count = self.asm.scopes.len();
        if scope.0 >= count {
            self.error(
                pc,
                ValidationErrorKind::ScopeIndexOutOfBounds {
                    index: scope.0,
                    count,
                },
            );
            return false;
        }
        true
    }

    fn class_ok(&mut self, pc: usize, class: usize) -> bool {
        let count = self.asm.classes.len();
        if class >= count {
            self.error(
                pc,
                ValidationErrorKind::ClassIndexOutOfBounds {
                    index: class,
                    count,
                },
            );
            return false;
        }
        true
    }
}
