//! Bytecode disassembler
//!
//! Renders a program image as readable assembly. Instruction offsets are shown
//! as synthetic addresses (see [`pc_ref`]) so generic "memory address" UIs can
//! display them.

use super::{Assembly, Op, ScopeInfo};
use crate::stdlib;
use crate::value::format_real;
use std::fmt::Write;

const BASE_ADDRESS: usize = 0x1000;
const INSTRUCTION_WIDTH: usize = 4;
const MAX_ADDRESS: usize = 0xFFFF;

/// Encode an instruction offset as a display address, e.g. `0x1004` for pc 1.
///
/// Addresses past `0xFFFF` are clamped.
pub fn pc_ref(pc: usize) -> String {
    let addr = pc
        .saturating_mul(INSTRUCTION_WIDTH)
        .saturating_add(BASE_ADDRESS)
        .min(MAX_ADDRESS);
    format!("0x{:04X}", addr)
}

/// Decode a display address back to an instruction offset.
///
/// Accepts `0x`-prefixed hex or plain decimal; rejects anything outside the
/// address window or not aligned to an instruction.
pub fn ref_pc(text: &str) -> Option<usize> {
    let text = text.trim();
    let addr = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok()?,
        None => text.parse::<usize>().ok()?,
    };
    if !(BASE_ADDRESS..=MAX_ADDRESS).contains(&addr) {
        return None;
    }
    let offset = addr - BASE_ADDRESS;
    if offset % INSTRUCTION_WIDTH != 0 {
        return None;
    }
    Some(offset / INSTRUCTION_WIDTH)
}

/// Disassemble an image.
///
/// # Format
/// ```text
/// main:
/// 0x1000  1:1   begin(0,1) :main
/// 0x1004  2:5   literal int 0
/// ; -- scopes
/// ; main() sum
/// ```
pub fn disassemble(asm: &Assembly) -> String {
    render(asm, None)
}

/// Disassemble an image, interleaving each source line before its first instruction.
pub fn disassemble_with_source(asm: &Assembly, source: &str) -> String {
    render(asm, Some(source))
}

fn render(asm: &Assembly, source: Option<&str>) -> String {
    let lines: Vec<&str> = source.map(|s| s.lines().collect()).unwrap_or_default();
    let mut out = String::new();
    let mut last_line = 0;
    let mut scope = asm.global();

    for (pc, inst) in asm.code.iter().enumerate() {
        if source.is_some() && inst.pos.line != last_line {
            last_line = inst.pos.line;
            let text = lines.get(last_line.wrapping_sub(1)).copied().unwrap_or("");
            let _ = writeln!(out, "; {}: {}", last_line, text);
        }
        for label in asm.labels.iter().filter(|l| l.pc == pc) {
            if matches!(inst.op, Op::Begin { .. }) {
                let _ = writeln!(out, "{}:", label.name);
            }
        }
        if let Op::Begin { scope: id } = inst.op {
            scope = asm.scope(id);
        }
        let _ = writeln!(
            out,
            "{}  {:<6}{}",
            pc_ref(pc),
            inst.pos.to_string(),
            format_op(asm, scope, &inst.op)
        );
    }

    let _ = writeln!(out, "; -- scopes");
    for s in &asm.scopes {
        let _ = writeln!(out, "; {}({}) {}", s.name, s.params.join("|"), s.locals.join("|"));
    }
    if !asm.classes.is_empty() {
        let _ = writeln!(out, "; -- classes");
        for class in &asm.classes {
            let methods: Vec<&str> = class
                .vtable
                .iter()
                .map(|e| asm.label(e.label).name.as_str())
                .collect();
            let _ = writeln!(
                out,
                "; {} {{{}}} [{}]",
                class.name,
                class.fields.join("|"),
                methods.join(", ")
            );
        }
    }
    if !asm.strings.is_empty() {
        let _ = writeln!(out, "; -- strings");
        for (i, s) in asm.strings.iter().enumerate() {
            let _ = writeln!(out, ";[{}] {:?}", i, s);
        }
    }
    out
}

/// Render one instruction. `scope` names the enclosing scope's variables.
pub fn format_op(asm: &Assembly, scope: &ScopeInfo, op: &Op) -> String {
    let name = |names: &[String], i: usize| names.get(i).cloned().unwrap_or_default();
    match op {
        Op::LitInt(n) => format!("literal int {}", n),
        Op::LitReal(n) => format!("literal real {}", format_real(*n)),
        Op::LitBool(b) => format!("literal bool {}", b),
        Op::LitChar(c) => format!("literal char {:?}", *c as char),
        Op::LitStr(id) => format!(
            "literal str [{}] {:?}",
            id.0,
            asm.strings.get(id.0).map(String::as_str).unwrap_or("")
        ),
        Op::GlobalRef(i) | Op::GlobalVal(i) => {
            format!("{}[{}] #{}", op.mnemonic(), i, name(&asm.global().locals, *i))
        }
        Op::LocalRef(i) | Op::LocalVal(i) => {
            format!("{}[{}] #{}", op.mnemonic(), i, name(&scope.locals, *i))
        }
        Op::ParamRef(i) | Op::ParamVal(i) | Op::ParamPtr(i) => {
            format!("{}[{}] #{}", op.mnemonic(), i, name(&scope.params, *i))
        }
        Op::FieldRef(i) | Op::FieldVal(i) => format!("{}[{}]", op.mnemonic(), i),
        Op::BinOpInt(b) => format!("{}_int", b.name()),
        Op::BinOpReal(b) => format!("{}_real", b.name()),
        Op::BinOpStr(b) => format!("{}_str", b.name()),
        Op::BinOpChar(b) => format!("{}_char", b.name()),
        Op::BinOpBool(b) => format!("{}_bool", b.name()),
        Op::UnaryOpInt(u) => format!("{} int", u.name()),
        Op::UnaryOpReal(u) => format!("{} real", u.name()),
        Op::UnaryOpBool(u) => u.name().to_string(),
        Op::IncrInt(n) => format!("incr int {}", n),
        Op::IncrReal(n) => format!("incr real {}", format_real(*n)),
        Op::ForInit(k) | Op::ForStep(k) => format!("{} {}", op.mnemonic(), k),
        Op::OffsetRef(k) | Op::OffsetVal(k) => format!("{} {}", op.mnemonic(), k),
        Op::ArrayNew { size } => format!("array new [{}]", size),
        Op::ArrayClone { dims } => format!("array clone {}", "[]".repeat(*dims)),
        Op::ObjNew { class, .. } => format!(
            "object new {}",
            asm.classes.get(class.0).map(|c| c.name.as_str()).unwrap_or("?")
        ),
        Op::Jump(l) | Op::JumpTrue(l) | Op::JumpFalse(l) => {
            let label = asm.label(*l);
            format!("{} {} :{}", op.mnemonic(), pc_ref(label.pc), label.name)
        }
        Op::Begin { scope: id } => {
            let s = asm.scope(*id);
            format!("begin({},{}) :{}", s.params.len(), s.locals.len(), s.name)
        }
        Op::Call { label, nargs, .. } => {
            let label = asm.label(*label);
            format!("call({}) {} :{}", nargs, pc_ref(label.pc), label.name)
        }
        Op::VCall { class, slot, nargs } => {
            let class = asm.class(*class);
            let method = class
                .vtable
                .get(*slot)
                .map(|e| asm.label(e.label).name.as_str())
                .unwrap_or("?");
            format!("vcall[{}]({}) {}.{}", slot, nargs, class.name, method)
        }
        Op::Return { nval } | Op::Halt { nval } => {
            if *nval == 0 {
                op.mnemonic().to_string()
            } else {
                format!("{}({})", op.mnemonic(), nval)
            }
        }
        Op::LibCall { index, nargs } => format!(
            "libcall({}) {}:{}",
            nargs,
            index,
            stdlib::library_name(*index).unwrap_or("?")
        ),
        other => other.mnemonic().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{AssemblyBuilder, BinOp};
    use crate::span::SourcePos;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0x1000")]
    #[case(1, "0x1004")]
    #[case(255, "0x13FC")]
    #[case(100_000, "0xFFFF")]
    fn test_pc_ref(#[case] pc: usize, #[case] expected: &str) {
        assert_eq!(pc_ref(pc), expected);
    }

    #[rstest]
    #[case("0x1000", Some(0))]
    #[case("0x1010", Some(4))]
    #[case("4100", Some(1))]
    #[case("0x0FFC", None)]
    #[case("0x1002", None)]
    #[case("0x10000", None)]
    #[case("garbage", None)]
    fn test_ref_pc(#[case] text: &str, #[case] expected: Option<usize>) {
        assert_eq!(ref_pc(text), expected);
    }

    proptest! {
        #[test]
        fn prop_ref_pc_inverts_pc_ref(pc in 0usize..0x3C00) {
            prop_assert_eq!(ref_pc(&pc_ref(pc)), Some(pc));
        }
    }

    #[test]
    fn test_disassemble_program() {
        let mut b = AssemblyBuilder::new(vec!["total".to_string()]);
        let greeting = b.intern("hi");
        b.at(SourcePos::new(1, 1));
        b.emit(Op::LitInt(2));
        b.emit(Op::LitInt(3));
        b.emit(Op::BinOpInt(BinOp::Add));
        b.emit(Op::GlobalRef(0));
        b.emit(Op::Store);
        b.at(SourcePos::new(2, 1));
        b.emit(Op::LitStr(greeting));
        b.emit(Op::Pop);
        b.emit(Op::End);
        let asm = b.finish().unwrap();

        let text = disassemble_with_source(&asm, "Set total = 2 + 3\nDisplay \"hi\"");
        insta::assert_snapshot!(text, @r###"
        ; 1: Set total = 2 + 3
        0x1000  1:1   literal int 2
        0x1004  1:1   literal int 3
        0x1008  1:1   add_int
        0x100C  1:1   &global[0] #total
        0x1010  1:1   store
        ; 2: Display "hi"
        0x1014  2:1   literal str [0] "hi"
        0x1018  2:1   pop
        0x101C  2:1   end
        ; -- scopes
        ; global() total
        ; -- strings
        ;[0] "hi"
        "###);
    }
}
