//! Test command - golden-output testing for program images
//!
//! `prog.json` is checked against `prog.out`, with `prog.in` (if present)
//! fed as standard input. When `prog.out` is missing the program runs
//! interactively and both files are recorded from the session.

use anyhow::{Context, Result};
use gaddis_config::VmConfig;
use gaddis_runtime::stdlib::{BufferedIo, StdIo};
use gaddis_runtime::{Execution, ExecutionContext, IoProvider, RuntimeError};
use parking_lot::Mutex;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{load_image, program_name};

#[derive(Debug, Clone)]
pub struct TestArgs {
    pub image: PathBuf,
    pub vm: VmConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    /// No expected output existed; it was recorded
    Captured,
    Failed {
        got: String,
        want: String,
    },
    /// The program stopped with a runtime error
    Panicked,
}

impl TestOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            TestOutcome::Passed | TestOutcome::Captured => 0,
            TestOutcome::Failed { .. } | TestOutcome::Panicked => 1,
        }
    }
}

/// Expected-output file for an image
pub fn output_path(image: &Path) -> PathBuf {
    image.with_extension("out")
}

/// Scripted-input file for an image
pub fn input_path(image: &Path) -> PathBuf {
    image.with_extension("in")
}

#[derive(Debug, Default)]
struct Recording {
    input: String,
    output: String,
}

/// Console that passes through to stdio while recording both directions
struct CaptureIo {
    inner: StdIo,
    recording: Arc<Mutex<Recording>>,
}

impl IoProvider for CaptureIo {
    fn input(&mut self) -> Result<String, RuntimeError> {
        let line = self.inner.input()?;
        let mut recording = self.recording.lock();
        recording.input.push_str(&line);
        recording.input.push('\n');
        Ok(line)
    }

    fn output(&mut self, text: &str) {
        self.recording.lock().output.push_str(text);
        self.inner.output(text);
    }

    fn work_dir(&self) -> PathBuf {
        self.inner.work_dir()
    }
}

pub fn run(args: &TestArgs) -> Result<TestOutcome> {
    let assembly = Arc::new(load_image(&args.image)?);
    let out_file = output_path(&args.image);
    let in_file = input_path(&args.image);

    let want = match fs::read_to_string(&out_file) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", out_file.display()));
        }
    };

    let (ctx, capture, buffered) = match want {
        Some(_) => {
            let input = match fs::read_to_string(&in_file) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", in_file.display()));
                }
            };
            let io = BufferedIo::new(&input);
            let ctx = ExecutionContext::new(Box::new(io.clone()), args.vm.seed);
            (ctx, None, Some(io))
        }
        None => {
            println!("Capturing...");
            let recording = Arc::new(Mutex::new(Recording::default()));
            let io = CaptureIo {
                inner: StdIo::new(),
                recording: Arc::clone(&recording),
            };
            let ctx = ExecutionContext::new(Box::new(io), args.vm.seed);
            (ctx, Some(recording), None)
        }
    };

    let mut exec = Execution::with_config(assembly, ctx, &args.vm);
    let outcome = exec.run();
    drop(exec);
    let _ = io::stdout().flush();

    if let Err(panic) = outcome {
        tracing::debug!(pc = panic.pc, "test program panicked");
        eprintln!("error: {}", panic);
        eprint!("{}", panic.trace(&program_name(&args.image)));
        return Ok(TestOutcome::Panicked);
    }

    if let Some(recording) = capture {
        let recording = recording.lock();
        if !recording.input.is_empty() {
            fs::write(&in_file, &recording.input)
                .with_context(|| format!("Failed to write {}", in_file.display()))?;
        }
        fs::write(&out_file, &recording.output)
            .with_context(|| format!("Failed to write {}", out_file.display()))?;
        println!("SAVED new test output");
        return Ok(TestOutcome::Captured);
    }

    let got = buffered.map(|io| io.output()).unwrap_or_default();
    let want = want.unwrap_or_default();
    if got == want {
        println!("PASSED");
        Ok(TestOutcome::Passed)
    } else {
        eprintln!("wrong output: got=\n{}\nwant=\n{}", got, want);
        Ok(TestOutcome::Failed { got, want })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaddis_runtime::bytecode::BinOp;
    use gaddis_runtime::stdlib::lib_index;
    use gaddis_runtime::{AssemblyBuilder, Op};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Reads an integer and displays twice its value
    fn doubler(dir: &TempDir) -> PathBuf {
        let mut b = AssemblyBuilder::new(vec![]);
        b.line(1);
        b.emit(Op::LibCall {
            index: lib_index("InputInteger").unwrap(),
            nargs: 0,
        });
        b.emit(Op::LitInt(2));
        b.emit(Op::BinOpInt(BinOp::Mul));
        b.emit(Op::LibCall {
            index: lib_index("Display").unwrap(),
            nargs: 1,
        });
        b.emit(Op::End);
        let image = dir.path().join("doubler.json");
        b.finish().unwrap().save(&image).unwrap();
        image
    }

    fn args(image: PathBuf) -> TestArgs {
        TestArgs {
            image,
            vm: VmConfig::default(),
        }
    }

    #[test]
    fn test_sibling_paths() {
        let image = Path::new("progs/sum.json");
        assert_eq!(output_path(image), PathBuf::from("progs/sum.out"));
        assert_eq!(input_path(image), PathBuf::from("progs/sum.in"));
    }

    #[test]
    fn test_matching_output_passes() {
        let dir = TempDir::new().unwrap();
        let image = doubler(&dir);
        fs::write(input_path(&image), "21\n").unwrap();
        fs::write(output_path(&image), "integer> 42\n").unwrap();
        assert_eq!(run(&args(image)).unwrap(), TestOutcome::Passed);
    }

    #[test]
    fn test_mismatch_reports_both_outputs() {
        let dir = TempDir::new().unwrap();
        let image = doubler(&dir);
        fs::write(input_path(&image), "5\n").unwrap();
        fs::write(output_path(&image), "integer> 42\n").unwrap();
        let outcome = run(&args(image)).unwrap();
        assert_eq!(
            outcome,
            TestOutcome::Failed {
                got: "integer> 10\n".to_string(),
                want: "integer> 42\n".to_string(),
            }
        );
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_missing_input_file_means_no_input() {
        let dir = TempDir::new().unwrap();
        let image = doubler(&dir);
        fs::write(output_path(&image), "integer> ").unwrap();
        assert_eq!(run(&args(image)).unwrap(), TestOutcome::Panicked);
    }
}
