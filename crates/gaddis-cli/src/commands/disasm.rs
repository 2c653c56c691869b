//! Disasm command - print a program image as assembly

use anyhow::{Context, Result};
use gaddis_runtime::bytecode::{disassemble, disassemble_with_source};
use std::fs;
use std::path::Path;

use super::load_image;

pub fn run(image: &Path, source: Option<&Path>) -> Result<String> {
    let assembly = load_image(image)?;
    match source {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read source file: {}", path.display()))?;
            Ok(disassemble_with_source(&assembly, &text))
        }
        None => Ok(disassemble(&assembly)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaddis_runtime::stdlib::lib_index;
    use gaddis_runtime::{AssemblyBuilder, Op};
    use tempfile::TempDir;

    #[test]
    fn test_source_is_interleaved() {
        let dir = TempDir::new().unwrap();
        let mut b = AssemblyBuilder::new(vec![]);
        let hi = b.intern("hi");
        b.line(1);
        b.emit(Op::LitStr(hi));
        b.emit(Op::LibCall {
            index: lib_index("Display").unwrap(),
            nargs: 1,
        });
        b.emit(Op::End);
        let image = dir.path().join("hi.json");
        b.finish().unwrap().save(&image).unwrap();
        let source = dir.path().join("hi.gad");
        fs::write(&source, "Display \"hi\"\n").unwrap();

        let text = run(&image, Some(&source)).unwrap();
        assert!(text.contains("; 1: Display \"hi\""));
        assert!(text.contains("0x1004"));
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let mut b = AssemblyBuilder::new(vec![]);
        b.emit(Op::End);
        let image = dir.path().join("end.json");
        b.finish().unwrap().save(&image).unwrap();
        assert!(run(&image, Some(&dir.path().join("missing.gad"))).is_err());
    }
}
