//! Debug sessions: breakpoints, stepping, exceptions and run control

mod common;

use common::*;
use pretty_assertions::assert_eq;
use gaddis_config::VmConfig;
use gaddis_runtime::bytecode::{AssemblyBuilder, BinOp};
use gaddis_runtime::debugger::BreakpointIndex;
use gaddis_runtime::{
    DebugSession, FrameView, Op, PauseReason, RunState, RuntimeError, SessionError,
    StepGranularity, StepKind, Value, VarSlot,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn session(asm: gaddis_runtime::Assembly) -> (DebugSession, Arc<RecordingHost>, gaddis_runtime::stdlib::BufferedIo) {
    init_tracing();
    let (ctx, io) = buffered_ctx("");
    let host = RecordingHost::new();
    let session = DebugSession::new(Arc::new(asm), ctx, host.clone());
    (session, host, io)
}

fn frames(session: &DebugSession) -> Vec<FrameView> {
    let mut out = Vec::new();
    session.stack_frames(|frame| out.push(frame));
    out
}

// ══════════════════════════════════════════════════════════════════════════════
// Breakpoints
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_breakpoint_on_display_line() {
    let (session, host, io) = session(sum_program());
    let statuses = session.set_line_breakpoints(&[5]);
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].verified);
    let bp_pc = statuses[0].pc.unwrap();

    session.play().unwrap();
    assert_eq!(host.wait_for_count(1), vec![Event::Paused(PauseReason::Breakpoint)]);
    session.wait();

    let (pc, pos) = session.position();
    assert_eq!(pc, bp_pc);
    assert_eq!(pos.line, 5);
    assert_eq!(io.output(), "");
    assert_eq!(session.run_state(), RunState::Paused);

    let stack = frames(&session);
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0].scope_name, "global");
    assert_eq!(stack[0].globals[0], ("total".to_string(), Some(Value::Int(55))));

    session.play().unwrap();
    let events = host.wait_for_count(3);
    assert_eq!(events[1..], [Event::Exited(0), Event::Terminated]);
    session.wait();
    assert_eq!(io.output(), "55\n");
    assert!(session.is_done());
    assert!(matches!(session.play(), Err(SessionError::Finished)));
}

#[test]
fn test_unverifiable_lines() {
    let (session, _, _) = session(sum_program());
    let statuses = session.set_line_breakpoints(&[0, 3, 42]);
    let verified: Vec<bool> = statuses.iter().map(|s| s.verified).collect();
    assert_eq!(verified, vec![false, true, false]);
    assert_eq!(statuses[2].requested, 42);
    assert_eq!(statuses[2].pc, None);

    let inst = session.set_inst_breakpoints(&[1, 10_000]);
    assert!(inst[0].verified);
    assert_eq!(inst[0].line, 1);
    assert!(!inst[1].verified);
}

#[test]
fn test_breakpoint_in_loop_hits_every_iteration() {
    let (session, host, _) = session(sum_program());
    session.set_line_breakpoints(&[3]);
    for hit in 1..=10 {
        session.play().unwrap();
        host.wait_for_count(hit);
        session.wait();
    }
    session.set_line_breakpoints(&[]);
    session.play().unwrap();
    let events = host.wait_for_count(12);
    assert_eq!(events[10..], [Event::Exited(0), Event::Terminated]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Exceptions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_uninitialized_local_pauses_without_crashing() {
    let (session, host, io) = session(uninitialized_local_program());
    session.set_file_name("show.gad");
    session.play().unwrap();

    let events = host.wait_for_count(1);
    assert_eq!(
        events,
        vec![Event::Exception("local x read before assignment".into())]
    );
    session.wait();
    assert_eq!(session.run_state(), RunState::Paused);

    let (trace, error) = session.current_exception().unwrap();
    assert_eq!(trace, "show.gad:12: in show(5)\nshow.gad:1: in global\n");
    assert!(matches!(error, RuntimeError::ReadBeforeAssignment { .. }));

    let stack = frames(&session);
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0].id, 2);
    assert_eq!(stack[0].scope_name, "show");
    assert_eq!(stack[0].args, vec![("n".to_string(), Value::Int(5))]);
    assert_eq!(stack[0].locals, vec![("x".to_string(), None)]);
    assert_eq!(stack[1].id, 1);

    // fix the variable and carry on from the failed instruction
    session.set_variable(2, VarSlot::Local(0), Value::Int(3)).unwrap();
    session.play().unwrap();
    let events = host.wait_for_count(3);
    assert_eq!(events[1..], [Event::Exited(0), Event::Terminated]);
    session.wait();
    assert_eq!(io.output(), "53\nafter\n");
    assert!(session.current_exception().is_none());
}

#[test]
fn test_no_debug_panic_exits_with_failure() {
    let (session, host, _) = session(uninitialized_local_program());
    session.set_no_debug();
    session.set_line_breakpoints(&[12]);
    session.play().unwrap();

    let events = host.wait_for_count(2);
    assert_eq!(
        events,
        vec![
            Event::Panicked("local x read before assignment".into()),
            Event::Exited(1)
        ]
    );
    session.wait();
    assert!(session.is_done());
    assert!(frames(&session).is_empty());
}

#[test]
fn test_instruction_ceiling_stops_endless_loop() {
    init_tracing();
    let (ctx, _) = buffered_ctx("");
    let host = RecordingHost::new();
    let limits = VmConfig {
        max_instructions: 5_000,
        ..VmConfig::default()
    };
    let session = DebugSession::with_config(Arc::new(endless_program()), ctx, host.clone(), &limits);
    session.set_no_debug();
    session.play().unwrap();
    let events = host.wait_for_count(2);
    assert_eq!(events[0], Event::Panicked("infinite loop detected".into()));
    assert_eq!(events[1], Event::Exited(1));
}

// ══════════════════════════════════════════════════════════════════════════════
// Stepping
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_stop_on_entry_then_step_over_lines() {
    let (session, host, _) = session(sum_program());
    session.stop_on_entry();
    session.play().unwrap();
    assert_eq!(host.wait_for_count(1), vec![Event::Paused(PauseReason::Entry)]);
    session.wait();
    assert_eq!(session.position().0, 0);

    let mut lines = Vec::new();
    for n in 2..=5 {
        session.step(StepKind::Next, StepGranularity::Line);
        session.play().unwrap();
        let events = host.wait_for_count(n);
        assert_eq!(events[n - 1], Event::Paused(PauseReason::Step));
        session.wait();
        lines.push(session.position().1.line);
    }
    assert_eq!(lines, vec![2, 3, 4, 3]);
}

#[test]
fn test_step_instruction_granularity() {
    let (session, host, _) = session(sum_program());
    session.stop_on_entry();
    session.play().unwrap();
    host.wait_for_count(1);
    session.wait();

    session.step(StepKind::Next, StepGranularity::Instruction);
    session.play().unwrap();
    host.wait_for_count(2);
    session.wait();
    assert_eq!(session.position().0, 1);
}

#[test]
fn test_step_in_and_out_of_call() {
    let (session, host, io) = session(uninitialized_local_program());
    session.stop_on_entry();
    session.play().unwrap();
    host.wait_for_count(1);
    session.wait();

    session.step(StepKind::In, StepGranularity::Line);
    session.play().unwrap();
    assert_eq!(host.wait_for_count(2)[1], Event::Paused(PauseReason::Step));
    session.wait();
    assert_eq!(session.position().1.line, 10);
    assert_eq!(frames(&session).len(), 2);

    session.set_variable(2, VarSlot::Local(0), Value::Int(0)).unwrap();
    session.step(StepKind::Out, StepGranularity::Line);
    session.play().unwrap();
    assert_eq!(host.wait_for_count(3)[2], Event::Paused(PauseReason::Step));
    session.wait();
    assert_eq!(session.position().1.line, 2);
    assert_eq!(frames(&session).len(), 1);
    assert_eq!(io.output(), "50\n");
}

// ══════════════════════════════════════════════════════════════════════════════
// Frames and evaluation
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_evaluate_does_not_disturb_program() {
    let (session, host, io) = session(sum_program());
    session.set_line_breakpoints(&[5]);
    session.play().unwrap();
    host.wait_for_count(1);
    session.wait();

    let code = [
        gaddis_runtime::Instruction::new(Default::default(), Op::GlobalVal(0)),
        gaddis_runtime::Instruction::new(Default::default(), Op::LitInt(2)),
        gaddis_runtime::Instruction::new(Default::default(), Op::BinOpInt(BinOp::Mul)),
        gaddis_runtime::Instruction::new(Default::default(), Op::Halt { nval: 1 }),
    ];
    assert_eq!(session.evaluate(1, &code).unwrap(), Value::Int(110));
    assert!(matches!(
        session.evaluate(4, &code),
        Err(SessionError::InvalidFrame(4))
    ));

    session.play().unwrap();
    host.wait_for_count(3);
    session.wait();
    assert_eq!(io.output(), "55\n");
}

#[test]
fn test_restart_frame_after_exception() {
    let (session, host, _) = session(uninitialized_local_program());
    session.play().unwrap();
    host.wait_for_count(1);
    session.wait();

    assert!(matches!(
        session.restart_frame(3),
        Err(SessionError::InvalidFrame(3))
    ));
    session.restart_frame(2).unwrap();
    assert_eq!(session.position().1.line, 10);
    assert!(session.current_exception().is_none());

    let stack = frames(&session);
    assert_eq!(stack[0].args, vec![("n".to_string(), Value::Int(5))]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Run control
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_pause_running_program() {
    let (session, host, _) = session(endless_program());
    session.play().unwrap();
    assert!(matches!(session.play(), Err(SessionError::AlreadyRunning)));
    session.pause();
    let events = host.wait_for_count(1);
    assert_eq!(events[0], Event::Paused(PauseReason::Pause));
    session.wait();
    assert!(!session.is_running());
    assert_eq!(session.run_state(), RunState::Paused);
}

#[test]
fn test_halt_is_silent_and_final() {
    let (session, host, _) = session(endless_program());
    session.play().unwrap();
    session.halt();
    assert!(!session.is_running());
    assert_eq!(session.run_state(), RunState::Halted);
    assert!(host.events().is_empty());
    assert!(matches!(session.play(), Err(SessionError::Halted)));

    session.reset();
    assert_eq!(session.run_state(), RunState::Paused);
    assert_eq!(session.position().0, 0);
    session.play().unwrap();
    session.terminate();
    assert_eq!(host.wait_for_count(1), vec![Event::Terminated]);
    session.wait();
    assert!(matches!(session.play(), Err(SessionError::Terminated)));
}

#[test]
fn test_terminate_idle_session_reports_itself() {
    let (session, host, _) = session(sum_program());
    session.terminate();
    assert_eq!(host.events(), vec![Event::Terminated]);
}

#[test]
fn test_suppressed_events_are_dropped() {
    let (session, host, io) = session(sum_program());
    session.suppress_events(true);
    session.play().unwrap();
    session.wait();
    assert!(host.events().is_empty());
    assert_eq!(io.output(), "55\n");
}

/// Every frame's pc lies inside its own scope's code
fn assert_frames_consistent(session: &DebugSession, begin: usize, len: usize) {
    let stack = frames(session);
    assert!(
        (1..=2).contains(&stack.len()),
        "unexpected depth {}",
        stack.len()
    );
    for frame in &stack {
        match frame.scope_name.as_str() {
            "bump" => {
                assert!(frame.id == 2 && (begin..len).contains(&frame.pc), "{:?}", frame);
                assert_eq!(frame.args.len(), 1);
            }
            _ => assert!(frame.id == 1 && frame.pc < begin, "{:?}", frame),
        }
    }
}

#[test]
fn test_concurrent_controls_keep_stack_consistent() {
    let asm = calling_loop_program();
    let begin = first_begin(&asm);
    let len = asm.code.len();
    let (session, host, _) = session(asm);
    session.play().unwrap();

    let controllers: Vec<_> = (0..3)
        .map(|worker| {
            let session = session.clone();
            thread::spawn(move || {
                for round in 0..200 {
                    match (worker + round) % 6 {
                        0 => session.pause(),
                        1 => {
                            let _ = session.play();
                        }
                        2 => {
                            let lines: &[usize] = match round % 3 {
                                0 => &[2],
                                1 => &[11],
                                _ => &[],
                            };
                            session.set_line_breakpoints(lines);
                        }
                        3 => session.step(StepKind::In, StepGranularity::Line),
                        4 => session.step(StepKind::Out, StepGranularity::Instruction),
                        _ => assert_frames_consistent(&session, begin, len),
                    }
                    if round % 50 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        })
        .collect();
    for controller in controllers {
        controller.join().unwrap();
    }

    session.pause();
    session.wait();
    assert_frames_consistent(&session, begin, len);
    assert!(host
        .events()
        .iter()
        .all(|event| matches!(event, Event::Paused(_))));

    session.halt();
    assert!(!session.is_running());
    assert_frames_consistent(&session, begin, len);
    assert!(!session.is_done());
}

#[test]
fn test_worker_panic_terminates_session() {
    // An unvalidated image whose jump target does not exist
    let mut asm = endless_program();
    asm.labels.clear();
    let (session, host, _) = session(asm);
    session.play().unwrap();
    session.wait();

    assert!(!session.is_running());
    assert_eq!(session.run_state(), RunState::Terminated);
    assert!(matches!(session.play(), Err(SessionError::Terminated)));
    assert!(host.events().is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
// Breakpoint index properties
// ══════════════════════════════════════════════════════════════════════════════

fn index_for(lines: &[usize]) -> BreakpointIndex {
    let mut b = AssemblyBuilder::new(vec![]);
    for &line in lines {
        b.line(line);
        b.emit(Op::LitInt(0));
    }
    BreakpointIndex::new(&b.finish().unwrap())
}

proptest! {
    #[test]
    fn prop_index_round_trips(lines in prop::collection::vec(1usize..200, 1..300)) {
        let idx = index_for(&lines);
        for (pc, &line) in lines.iter().enumerate() {
            prop_assert_eq!(idx.source_from_inst(pc), line);
            let first = idx.inst_from_source(line).unwrap();
            prop_assert!(first <= pc);
            prop_assert_eq!(idx.source_from_inst(first), line);
        }
    }

    #[test]
    fn prop_index_monotonic_for_sorted_lines(mut lines in prop::collection::vec(1usize..200, 1..300)) {
        lines.sort_unstable();
        let idx = index_for(&lines);
        let firsts: Vec<usize> = idx
            .valid_lines()
            .filter_map(|line| idx.inst_from_source(line))
            .collect();
        prop_assert!(firsts.windows(2).all(|w| w[0] < w[1]));
    }
}
