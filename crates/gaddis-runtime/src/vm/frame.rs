//! Call frames

use crate::bytecode::ScopeId;
use crate::value::{RuntimeError, Value};

/// One activation record.
#[derive(Debug, Clone)]
pub struct Frame {
    pub scope: ScopeId,
    /// Offset of the scope's `Begin` marker
    pub start: usize,
    /// Offset of the call instruction in the caller
    pub return_pc: usize,
    /// Arguments exactly as passed, kept so the frame can be restarted
    pub args: Vec<Value>,
    pub params: Vec<Value>,
    /// `None` until first assignment
    pub locals: Vec<Option<Value>>,
    /// In-flight operands
    pub eval: Vec<Value>,
}

impl Frame {
    pub fn new(
        scope: ScopeId,
        start: usize,
        return_pc: usize,
        args: Vec<Value>,
        nlocals: usize,
    ) -> Self {
        Self {
            scope,
            start,
            return_pc,
            params: args.clone(),
            args,
            locals: vec![None; nlocals],
            eval: Vec::with_capacity(16),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.eval.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.eval.pop().ok_or(RuntimeError::EvalStackUnderflow)
    }

    /// Pop the top `n` operands, returned bottom-to-top
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if n > self.eval.len() {
            return Err(RuntimeError::EvalStackUnderflow);
        }
        let tip = self.eval.len() - n;
        Ok(self.eval.split_off(tip))
    }

    /// Return the frame to the state it had right after its call
    pub fn reset(&mut self) {
        self.params = self.args.clone();
        self.locals.iter_mut().for_each(|slot| *slot = None);
        self.eval.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_n_preserves_order() {
        let mut frame = Frame::new(ScopeId(0), 0, 0, vec![], 0);
        for n in 1..=4 {
            frame.push(Value::Int(n));
        }
        assert_eq!(
            frame.pop_n(2).unwrap(),
            vec![Value::Int(3), Value::Int(4)]
        );
        assert_eq!(frame.eval.len(), 2);
    }

    #[test]
    fn test_underflow() {
        let mut frame = Frame::new(ScopeId(0), 0, 0, vec![], 0);
        assert_eq!(frame.pop(), Err(RuntimeError::EvalStackUnderflow));
        frame.push(Value::Bool(true));
        assert_eq!(frame.pop_n(2), Err(RuntimeError::EvalStackUnderflow));
    }

    #[test]
    fn test_reset_restores_arguments() {
        let mut frame = Frame::new(ScopeId(1), 10, 3, vec![Value::Int(7)], 2);
        frame.params[0] = Value::Int(99);
        frame.locals[1] = Some(Value::Real(1.5));
        frame.push(Value::Int(1));

        frame.reset();
        assert_eq!(frame.params, vec![Value::Int(7)]);
        assert_eq!(frame.locals, vec![None, None]);
        assert!(frame.eval.is_empty());
    }
}
