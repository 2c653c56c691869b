//! Source line <-> instruction mapping for breakpoints.

use crate::bytecode::Assembly;

// ── BreakpointIndex ──────────────────────────────────────────────────────────

/// Immutable line table built once per program image.
///
/// Line numbers are 1-based; line 0 marks instructions with no source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointIndex {
    /// First instruction on each line, indexed by line
    source_to_inst: Vec<Option<usize>>,
    /// Source line of each instruction
    inst_to_source: Vec<usize>,
}

impl BreakpointIndex {
    pub fn new(assembly: &Assembly) -> Self {
        let inst_to_source: Vec<usize> = assembly.code.iter().map(|inst| inst.pos.line).collect();
        let nlines = inst_to_source.iter().copied().max().map_or(0, |max| max + 1);

        let mut source_to_inst = vec![None; nlines];
        for (pc, &line) in inst_to_source.iter().enumerate() {
            if line > 0 && source_to_inst[line].is_none() {
                source_to_inst[line] = Some(pc);
            }
        }

        Self {
            source_to_inst,
            inst_to_source,
        }
    }

    /// First instruction generated for `line`
    pub fn inst_from_source(&self, line: usize) -> Option<usize> {
        self.source_to_inst.get(line).copied().flatten()
    }

    /// Source line of instruction `pc`, 0 when unknown
    pub fn source_from_inst(&self, pc: usize) -> usize {
        self.inst_to_source.get(pc).copied().unwrap_or(0)
    }

    /// True if a breakpoint on `line` can be hit
    pub fn valid_src_line(&self, line: usize) -> bool {
        self.inst_from_source(line).is_some()
    }

    /// One past the highest line with code
    pub fn line_count(&self) -> usize {
        self.source_to_inst.len()
    }

    pub fn inst_count(&self) -> usize {
        self.inst_to_source.len()
    }

    /// Lines that carry at least one instruction, ascending
    pub fn valid_lines(&self) -> impl Iterator<Item = usize> + '_ {
        self.source_to_inst
            .iter()
            .enumerate()
            .filter_map(|(line, pc)| pc.map(|_| line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{AssemblyBuilder, Op};

    fn index(lines: &[usize]) -> BreakpointIndex {
        let mut b = AssemblyBuilder::new(vec![]);
        for &line in lines {
            b.line(line);
            b.emit(Op::LitInt(0));
        }
        BreakpointIndex::new(&b.finish().unwrap())
    }

    #[test]
    fn test_first_instruction_per_line() {
        let idx = index(&[1, 1, 3, 3, 3, 4]);
        assert_eq!(idx.inst_from_source(1), Some(0));
        assert_eq!(idx.inst_from_source(2), None);
        assert_eq!(idx.inst_from_source(3), Some(2));
        assert_eq!(idx.inst_from_source(4), Some(5));
        assert_eq!(idx.inst_from_source(99), None);
        assert_eq!(idx.line_count(), 5);
        assert_eq!(idx.inst_count(), 6);
    }

    #[test]
    fn test_line_zero_is_never_valid() {
        let idx = index(&[0, 2]);
        assert!(!idx.valid_src_line(0));
        assert!(idx.valid_src_line(2));
        assert_eq!(idx.source_from_inst(0), 0);
        assert_eq!(idx.source_from_inst(7), 0);
        assert_eq!(idx.valid_lines().collect::<Vec<_>>(), vec![2]);
    }
}
