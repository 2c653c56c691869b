//! Instruction semantics
//!
//! Operands are popped right to left: for `[a, b]` the VM pops `b` first.

use super::{Execution, Flow, Frame};
use crate::bytecode::{BinOp, NumKind, OffsetKind, Op, ScopeId, UnaryOp};
use crate::value::{Object, Reference, RuntimeError, Value, VarKind};
use std::cmp::Ordering;
use std::sync::Arc;

impl Execution {
    pub(super) fn exec_op(&mut self, op: &Op) -> Result<Flow, RuntimeError> {
        match op {
            // === Literals ===
            Op::LitInt(n) => self.push(Value::Int(*n))?,
            Op::LitReal(n) => self.push(Value::Real(*n))?,
            Op::LitBool(b) => self.push(Value::Bool(*b))?,
            Op::LitChar(c) => self.push(Value::Char(*c))?,
            Op::LitStr(id) => {
                let s = self
                    .strings
                    .get(id.0)
                    .cloned()
                    .ok_or_else(|| RuntimeError::Internal(format!("string {} not found", id.0)))?;
                self.push(Value::Str(s))?;
            }

            // === Variable access ===
            Op::GlobalRef(slot) => self.push(Value::Ref(Reference::Global(*slot)))?,
            Op::GlobalVal(slot) => {
                let value = self.load(&Reference::Global(*slot))?;
                self.push(value)?;
            }
            Op::LocalRef(slot) => {
                let frame = self.top_index()?;
                self.push(Value::Ref(Reference::Local { frame, slot: *slot }))?;
            }
            Op::LocalVal(slot) => {
                let frame = self.top_index()?;
                let value = self.load(&Reference::Local { frame, slot: *slot })?;
                self.push(value)?;
            }
            Op::ParamRef(slot) => {
                let frame = self.top_index()?;
                self.push(Value::Ref(Reference::Param { frame, slot: *slot }))?;
            }
            Op::ParamVal(slot) => {
                let value = self.param(*slot)?;
                self.push(value)?;
            }
            Op::ParamPtr(slot) => {
                let param = self.param(*slot)?;
                let reference = param.as_reference()?;
                let value = match self.load(reference) {
                    Err(RuntimeError::ReadBeforeAssignment { .. }) => {
                        let scope = self.assembly.scope(self.frame()?.scope);
                        let name = scope.params.get(*slot).cloned().unwrap_or_default();
                        return Err(RuntimeError::ReadBeforeAssignment {
                            kind: VarKind::Param,
                            name,
                        });
                    }
                    other => other?,
                };
                self.push(value)?;
            }
            Op::FieldRef(index) => {
                let object = self.pop()?.as_object()?.clone();
                self.push(Value::Ref(Reference::Field {
                    object: object.fields,
                    index: *index,
                }))?;
            }
            Op::FieldVal(index) => {
                let object = self.pop()?.as_object()?.clone();
                let value = self.field(&object, *index)?;
                self.push(value)?;
            }

            // === Stores ===
            Op::Store => {
                let reference = self.pop()?.as_reference()?.clone();
                let value = self.pop()?;
                self.store(&reference, value)?;
            }
            Op::StoreChar => {
                let index = self.pop()?.as_int()?;
                let reference = self.pop()?.as_reference()?.clone();
                let ch = self.pop()?.as_char()?;
                let current = self.load(&reference)?;
                let mut bytes = current.as_str()?.to_vec();
                let slot = checked_index(index, bytes.len())?;
                bytes[slot] = ch;
                self.store(&reference, Value::bytes(bytes))?;
            }
            Op::Deref => {
                let reference = self.pop()?.as_reference()?.clone();
                let value = self.load(&reference)?;
                self.push(value)?;
            }

            // === Operators ===
            Op::BinOpInt(bin) => {
                let b = self.pop()?.as_int()?;
                let a = self.pop()?.as_int()?;
                self.push(binop_int(*bin, a, b)?)?;
            }
            Op::BinOpReal(bin) => {
                let b = real_operand(&self.pop()?)?;
                let a = real_operand(&self.pop()?)?;
                self.push(binop_real(*bin, a, b)?)?;
            }
            Op::BinOpStr(bin) => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(binop_str(*bin, a.as_str()?, b.as_str()?)?)?;
            }
            Op::BinOpChar(bin) => {
                let b = self.pop()?.as_char()?;
                let a = self.pop()?.as_char()?;
                self.push(compare(*bin, a.cmp(&b), "char")?)?;
            }
            Op::BinOpBool(bin) => {
                let b = self.pop()?.as_bool()?;
                let a = self.pop()?.as_bool()?;
                self.push(binop_bool(*bin, a, b)?)?;
            }
            Op::UnaryOpInt(UnaryOp::Neg) => {
                let a = self.pop()?.as_int()?;
                self.push(Value::Int(a.wrapping_neg()))?;
            }
            Op::UnaryOpReal(UnaryOp::Neg) => {
                let a = self.pop()?.as_real()?;
                self.push(Value::Real(-a))?;
            }
            Op::UnaryOpBool(UnaryOp::Not) => {
                let a = self.pop()?.as_bool()?;
                self.push(Value::Bool(!a))?;
            }
            Op::UnaryOpInt(u) | Op::UnaryOpReal(u) | Op::UnaryOpBool(u) => {
                return Err(RuntimeError::BadInstruction(format!(
                    "{} is not defined for this operand type",
                    u.name()
                )));
            }
            Op::IntToReal => {
                let a = self.pop()?.as_int()?;
                self.push(Value::Real(a as f64))?;
            }
            Op::RealToInt => {
                let a = self.pop()?.as_real()?;
                self.push(Value::Int(a as i64))?;
            }
            Op::IncrInt(delta) => {
                let reference = self.pop()?.as_reference()?.clone();
                let current = self.load(&reference)?.as_int()?;
                self.store(&reference, Value::Int(current.wrapping_add(*delta)))?;
            }
            Op::IncrReal(delta) => {
                let reference = self.pop()?.as_reference()?.clone();
                let current = self.load(&reference)?.as_real()?;
                self.store(&reference, Value::Real(current + delta))?;
            }

            // === Counted loops ===
            Op::ForInit(kind) => {
                let step = self.pop()?;
                let stop = self.pop()?;
                let start = self.pop()?;
                let reference = self.pop()?.as_reference()?.clone();
                let more = loop_predicate(*kind, &start, &stop, &step)?;
                self.store(&reference, start)?;
                self.push(Value::Bool(more))?;
            }
            Op::ForStep(kind) => {
                let step = self.pop()?;
                let stop = self.pop()?;
                let reference = self.pop()?.as_reference()?.clone();
                let current = self.load(&reference)?;
                let next = match kind {
                    NumKind::Int => Value::Int(current.as_int()?.wrapping_add(step.as_int()?)),
                    NumKind::Real => Value::Real(current.as_real()? + step.as_real()?),
                };
                let more = loop_predicate(*kind, &next, &stop, &step)?;
                self.store(&reference, next)?;
                self.push(Value::Bool(more))?;
            }

            // === Arrays, strings and objects ===
            Op::OffsetRef(kind) => {
                let index = self.pop()?.as_int()?;
                let container = self.pop()?;
                let reference = match kind {
                    OffsetKind::String => {
                        return Err(RuntimeError::BadInstruction(
                            "string characters are written with StoreChar".to_string(),
                        ))
                    }
                    OffsetKind::Array => {
                        let array = container.as_array()?.clone();
                        let len = array.with(|items| items.len());
                        Reference::Element {
                            index: checked_index(index, len)?,
                            array,
                        }
                    }
                    OffsetKind::Object => {
                        let object = container.as_object()?.clone();
                        let len = object.fields.with(|fields| fields.len());
                        Reference::Field {
                            index: checked_index(index, len)?,
                            object: object.fields,
                        }
                    }
                };
                self.push(Value::Ref(reference))?;
            }
            Op::OffsetVal(kind) => {
                let index = self.pop()?.as_int()?;
                let container = self.pop()?;
                let value = match kind {
                    OffsetKind::String => {
                        let s = container.as_str()?;
                        Value::Char(s[checked_index(index, s.len())?])
                    }
                    OffsetKind::Array => container.as_array()?.with(|items| {
                        checked_index(index, items.len()).map(|i| items[i].clone())
                    })?,
                    OffsetKind::Object => {
                        let object = container.as_object()?;
                        let len = object.fields.with(|fields| fields.len());
                        self.field(object, checked_index(index, len)?)?
                    }
                };
                self.push(value)?;
            }
            Op::ArrayNew { size } => {
                let items = self.frame_mut()?.pop_n(*size)?;
                self.push(Value::array(items))?;
            }
            Op::ArrayClone { dims } => {
                let array = self.pop()?;
                array.as_array()?;
                self.push(array.deep_clone(*dims))?;
            }
            Op::ArrayLen => {
                let len = self.pop()?.as_array()?.with(|items| items.len());
                self.push(Value::Int(len as i64))?;
            }
            Op::ObjNew { class, nfields } => {
                self.push(Value::Object(Object::new(class.0, *nfields)))?;
            }

            // === Control ===
            Op::Jump(label) => return Ok(Flow::Jump(self.assembly.label_pc(*label))),
            Op::JumpTrue(label) => {
                if self.pop()?.as_bool()? {
                    return Ok(Flow::Jump(self.assembly.label_pc(*label)));
                }
            }
            Op::JumpFalse(label) => {
                if !self.pop()?.as_bool()? {
                    return Ok(Flow::Jump(self.assembly.label_pc(*label)));
                }
            }

            // === Calls ===
            Op::Begin { .. } => {}
            Op::End => return self.return_values(0),
            Op::Return { nval } => return self.return_values(*nval),
            Op::Call {
                label,
                scope,
                nargs,
            } => {
                let args = self.frame_mut()?.pop_n(*nargs)?;
                let target = self.assembly.label_pc(*label);
                return self.call(target, *scope, args);
            }
            Op::VCall { slot, nargs, .. } => {
                let args = self.frame_mut()?.pop_n(*nargs)?;
                let receiver = args
                    .first()
                    .ok_or(RuntimeError::EvalStackUnderflow)?
                    .as_object()?;
                let entry = self
                    .assembly
                    .classes
                    .get(receiver.class)
                    .and_then(|class| class.vtable.get(*slot))
                    .copied()
                    .ok_or_else(|| {
                        RuntimeError::BadInstruction(format!("no virtual slot {}", slot))
                    })?;
                let target = self.assembly.label_pc(entry.label);
                return self.call(target, entry.scope, args);
            }
            Op::Halt { nval } => {
                let frame = self.frame_mut()?;
                if frame.eval.len() != *nval {
                    return Err(RuntimeError::ReturnArity {
                        expected: *nval,
                        found: frame.eval.len(),
                    });
                }
                let result = frame.eval.pop();
                self.result = result;
                self.stack.clear();
            }
            Op::LibCall { index, nargs } => {
                let args = self.frame_mut()?.pop_n(*nargs)?;
                let func = self
                    .lib
                    .get(*index)
                    .map(|entry| entry.func)
                    .ok_or(RuntimeError::UnknownLibFunction(*index))?;
                let result = self.ctx.with_mut(|ctx| func(ctx, &args))?;
                if let Some(value) = result {
                    self.push(value)?;
                }
            }

            // === Stack ===
            Op::Dup => {
                let value = self.pop()?;
                self.push(value.clone())?;
                self.push(value)?;
            }
            Op::Pop => {
                self.pop()?;
            }
        }
        Ok(Flow::Next)
    }

    fn call(&mut self, target: usize, scope: ScopeId, args: Vec<Value>) -> Result<Flow, RuntimeError> {
        if self.stack.len() >= self.limits.max_stack_depth {
            return Err(RuntimeError::StackOverflow);
        }
        let nlocals = self
            .assembly
            .scopes
            .get(scope.0)
            .map(|s| s.locals.len())
            .ok_or_else(|| RuntimeError::Internal(format!("scope {} not found", scope.0)))?;
        self.stack
            .push(Frame::new(scope, target, self.pc, args, nlocals));
        Ok(Flow::Jump(target))
    }

    /// Pop the current frame, handing `nval` results to the caller
    fn return_values(&mut self, nval: usize) -> Result<Flow, RuntimeError> {
        let found = self.frame()?.eval.len();
        if found != nval {
            return Err(RuntimeError::ReturnArity {
                expected: nval,
                found,
            });
        }
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| RuntimeError::Internal("no active frame".to_string()))?;
        match self.stack.last_mut() {
            Some(caller) => {
                caller.eval.extend(frame.eval);
                Ok(Flow::Jump(frame.return_pc + 1))
            }
            None => Ok(Flow::Next),
        }
    }

    fn top_index(&self) -> Result<usize, RuntimeError> {
        self.stack
            .len()
            .checked_sub(1)
            .ok_or_else(|| RuntimeError::Internal("no active frame".to_string()))
    }

    fn param(&self, slot: usize) -> Result<Value, RuntimeError> {
        self.frame()?
            .params
            .get(slot)
            .cloned()
            .ok_or_else(|| RuntimeError::Internal(format!("param {} out of range", slot)))
    }

    fn field(&self, object: &Object, index: usize) -> Result<Value, RuntimeError> {
        match object.fields.with(|fields| fields.get(index).cloned()) {
            Some(Some(value)) => Ok(value),
            Some(None) => {
                let name = self
                    .assembly
                    .classes
                    .get(object.class)
                    .and_then(|c| c.fields.get(index))
                    .cloned()
                    .unwrap_or_else(|| format!("#{}", index));
                Err(RuntimeError::ReadBeforeAssignment {
                    kind: VarKind::Field,
                    name,
                })
            }
            None => Err(RuntimeError::Internal(format!("field {} out of range", index))),
        }
    }
}

/// Continue predicate shared by `ForInit` and `ForStep`
pub fn for_predicate<T: PartialOrd + Default>(val: T, stop: T, step: T) -> bool {
    if step >= T::default() {
        val <= stop
    } else {
        val >= stop
    }
}

/// Integer exponentiation by squaring; wraps on overflow, 0 for negative exponents
pub fn exp_int(base: i64, exp: i64) -> i64 {
    if exp < 0 {
        return 0;
    }
    let mut result: i64 = 1;
    let mut base = base;
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        exp >>= 1;
        base = base.wrapping_mul(base);
    }
    result
}

fn loop_predicate(kind: NumKind, val: &Value, stop: &Value, step: &Value) -> Result<bool, RuntimeError> {
    Ok(match kind {
        NumKind::Int => for_predicate(val.as_int()?, stop.as_int()?, step.as_int()?),
        NumKind::Real => for_predicate(val.as_real()?, stop.as_real()?, step.as_real()?),
    })
}

fn checked_index(index: i64, len: usize) -> Result<usize, RuntimeError> {
    if index < 0 || index as usize >= len {
        return Err(RuntimeError::IndexOutOfRange { index, len });
    }
    Ok(index as usize)
}

/// Real operators also accept integer operands
fn real_operand(value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Real(n) => Ok(*n),
        Value::Int(n) => Ok(*n as f64),
        other => Err(RuntimeError::mismatch("Real", other)),
    }
}

fn unsupported(op: BinOp, ty: &str) -> RuntimeError {
    RuntimeError::BadInstruction(format!("{}_{} is not a valid operator", op.name(), ty))
}

fn compare(op: BinOp, ord: Ordering, ty: &str) -> Result<Value, RuntimeError> {
    let result = match op {
        BinOp::Eq => ord == Ordering::Equal,
        BinOp::Neq => ord != Ordering::Equal,
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Lte => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Gte => ord != Ordering::Less,
        _ => return Err(unsupported(op, ty)),
    };
    Ok(Value::Bool(result))
}

fn binop_int(op: BinOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    Ok(Value::Int(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div if b == 0 => return Err(RuntimeError::DivideByZero),
        BinOp::Div => a.wrapping_div(b),
        BinOp::Mod if b == 0 => return Err(RuntimeError::DivideByZero),
        BinOp::Mod => a.wrapping_rem(b),
        BinOp::Exp => exp_int(a, b),
        _ => return compare(op, a.cmp(&b), "int"),
    }))
}

fn binop_real(op: BinOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    Ok(match op {
        BinOp::Add => Value::Real(a + b),
        BinOp::Sub => Value::Real(a - b),
        BinOp::Mul => Value::Real(a * b),
        BinOp::Div => Value::Real(a / b),
        BinOp::Exp => Value::Real(a.powf(b)),
        BinOp::Mod => Value::Real(a % b),
        BinOp::Eq => Value::Bool(a == b),
        BinOp::Neq => Value::Bool(a != b),
        BinOp::Lt => Value::Bool(a < b),
        BinOp::Lte => Value::Bool(a <= b),
        BinOp::Gt => Value::Bool(a > b),
        BinOp::Gte => Value::Bool(a >= b),
        BinOp::And | BinOp::Or => return Err(unsupported(op, "real")),
    })
}

fn binop_str(op: BinOp, a: &Arc<[u8]>, b: &Arc<[u8]>) -> Result<Value, RuntimeError> {
    if op == BinOp::Add {
        let mut joined = Vec::with_capacity(a.len() + b.len());
        joined.extend_from_slice(a);
        joined.extend_from_slice(b);
        return Ok(Value::bytes(joined));
    }
    compare(op, a.as_ref().cmp(b.as_ref()), "str")
}

fn binop_bool(op: BinOp, a: bool, b: bool) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(match op {
        BinOp::Eq => a == b,
        BinOp::Neq => a != b,
        BinOp::And => a && b,
        BinOp::Or => a || b,
        _ => return Err(unsupported(op, "bool")),
    }))
}
