//! Run command - execute a program image

use anyhow::Result;
use gaddis_config::VmConfig;
use gaddis_runtime::{Execution, ExecutionContext};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_image, program_name};

#[derive(Debug, Clone)]
pub struct RunArgs {
    pub image: PathBuf,
    pub vm: VmConfig,
    /// Overrides the image's file stem in stack traces
    pub file_name: Option<String>,
}

/// Run a program image with stdio, returning the process exit status.
///
/// A runtime error is reported on stderr as the error followed by its trace.
pub fn run(args: &RunArgs) -> Result<i32> {
    let assembly = Arc::new(load_image(&args.image)?);
    let file = args
        .file_name
        .clone()
        .unwrap_or_else(|| program_name(&args.image));

    let ctx = ExecutionContext::stdio(args.vm.seed);
    let mut exec = Execution::with_config(assembly, ctx, &args.vm);
    let outcome = exec.run();
    // closes any files the program left open
    drop(exec);
    let _ = std::io::stdout().flush();

    match outcome {
        Ok(()) => Ok(0),
        Err(panic) => {
            tracing::debug!(pc = panic.pc, "program panicked");
            eprintln!("error: {}", panic);
            eprint!("{}", panic.trace(&file));
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_missing_image() {
        let args = RunArgs {
            image: PathBuf::from("nonexistent.json"),
            vm: VmConfig::default(),
            file_name: None,
        };
        let err = run(&args).unwrap_err();
        assert!(err.to_string().contains("nonexistent.json"));
    }
}
