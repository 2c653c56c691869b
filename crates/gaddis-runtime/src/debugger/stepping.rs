//! Step-over / step-into / step-out decisions.
//!
//! A [`StepRequest`] snapshots where the program was when the step began.
//! Before each instruction the worker asks [`StepRequest::should_pause`]
//! whether the new position ends the step.

// ── StepKind ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Step over: stop on the next line of this frame or a caller
    Next,
    /// Step into: stop at the next line anywhere, including callees
    In,
    /// Step out: stop once this frame has returned
    Out,
}

/// What counts as having moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepGranularity {
    #[default]
    Line,
    Instruction,
}

// ── StepRequest ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRequest {
    pub kind: StepKind,
    pub granularity: StepGranularity,
    pub pc: usize,
    pub line: usize,
    /// Call depth when the step began
    pub depth: usize,
}

impl StepRequest {
    pub fn new(
        kind: StepKind,
        granularity: StepGranularity,
        pc: usize,
        line: usize,
        depth: usize,
    ) -> Self {
        Self {
            kind,
            granularity,
            pc,
            line,
            depth,
        }
    }

    /// True if the instruction about to run at `pc` / `line` / `depth` ends the step
    pub fn should_pause(&self, pc: usize, line: usize, depth: usize) -> bool {
        let moved = match self.granularity {
            StepGranularity::Line => line != self.line,
            StepGranularity::Instruction => pc != self.pc,
        };
        let delta = depth as isize - self.depth as isize;
        match self.kind {
            StepKind::Next => delta < 0 || (delta == 0 && moved),
            StepKind::In => delta != 0 || moved,
            StepKind::Out => delta < 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn req(kind: StepKind) -> StepRequest {
        StepRequest::new(kind, StepGranularity::Line, 10, 5, 2)
    }

    #[test]
    fn test_same_position_never_pauses() {
        for kind in [StepKind::Next, StepKind::In, StepKind::Out] {
            assert!(!req(kind).should_pause(10, 5, 2));
        }
    }

    #[test]
    fn test_next_skips_callee_lines() {
        let step = req(StepKind::Next);
        assert!(!step.should_pause(40, 20, 3));
        assert!(step.should_pause(11, 6, 2));
        assert!(step.should_pause(3, 1, 1));
    }

    #[test]
    fn test_in_stops_on_call() {
        assert!(req(StepKind::In).should_pause(40, 20, 3));
    }

    #[test]
    fn test_instruction_granularity_counts_pcs() {
        let step = StepRequest::new(StepKind::Next, StepGranularity::Instruction, 10, 5, 2);
        assert!(step.should_pause(11, 5, 2));
        let step = StepRequest::new(StepKind::Next, StepGranularity::Line, 10, 5, 2);
        assert!(!step.should_pause(11, 5, 2));
    }

    fn kind() -> impl Strategy<Value = StepKind> {
        prop_oneof![Just(StepKind::Next), Just(StepKind::In), Just(StepKind::Out)]
    }

    proptest! {
        #[test]
        fn prop_returning_always_pauses(
            kind in kind(),
            depth in 1usize..64,
            line in 0usize..500,
            pc in 0usize..5000,
            new_line in 0usize..500,
            new_pc in 0usize..5000,
        ) {
            let step = StepRequest::new(kind, StepGranularity::Line, pc, line, depth);
            prop_assert!(step.should_pause(new_pc, new_line, depth - 1));
        }

        #[test]
        fn prop_out_ignores_same_or_deeper(
            extra in 0usize..8,
            line in 0usize..500,
            new_line in 0usize..500,
        ) {
            let step = StepRequest::new(StepKind::Out, StepGranularity::Line, 0, line, 4);
            prop_assert!(!step.should_pause(0, new_line, 4 + extra));
        }

        #[test]
        fn prop_next_ignores_deeper(
            extra in 1usize..8,
            line in 0usize..500,
            new_line in 0usize..500,
        ) {
            let step = StepRequest::new(StepKind::Next, StepGranularity::Line, 0, line, 4);
            prop_assert!(!step.should_pause(0, new_line, 4 + extra));
        }

        #[test]
        fn prop_in_pauses_on_any_depth_change(
            depth in 1usize..64,
            new_depth in 1usize..64,
        ) {
            prop_assume!(depth != new_depth);
            let step = StepRequest::new(StepKind::In, StepGranularity::Line, 0, 7, depth);
            prop_assert!(step.should_pause(0, 7, new_depth));
        }
    }
}
