//! Debug command - interactive debugger for program images
//!
//! Loads an image into a debug session and hands it to the line-editor REPL.

use anyhow::{Context, Result};
use gaddis_config::VmConfig;
use gaddis_runtime::{DebugSession, ExecutionContext};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_image, program_name};
use crate::debugger::repl::{DebugRepl, ReplHost};

/// Arguments for the debug command
#[derive(Debug, Clone, Default)]
pub struct DebugArgs {
    pub image: PathBuf,
    /// Source file for listings
    pub source: Option<PathBuf>,
    /// Initial line breakpoints
    pub breakpoints: Vec<usize>,
    pub stop_on_entry: bool,
    pub vm: VmConfig,
    /// Where to persist line-editor history
    pub history: Option<PathBuf>,
}

/// Run the debugger
pub fn run(args: DebugArgs) -> Result<()> {
    let assembly = Arc::new(load_image(&args.image)?);
    let source = match &args.source {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read source file: {}", path.display()))?,
        ),
        None => None,
    };
    let file_name = match &args.source {
        Some(path) => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| program_name(&args.image)),
        None => program_name(&args.image),
    };

    let host = ReplHost::new();
    let session = DebugSession::with_config(
        assembly,
        ExecutionContext::stdio(args.vm.seed),
        host.clone(),
        &args.vm,
    );
    session.set_file_name(file_name.clone());
    if args.stop_on_entry {
        session.stop_on_entry();
    }

    let mut repl = DebugRepl::new(session, host, source.as_deref(), file_name);
    for line in &args.breakpoints {
        repl.execute_command(&format!("break {}", line));
    }
    repl.run(args.history.as_deref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_args_default() {
        let args = DebugArgs::default();
        assert!(args.breakpoints.is_empty());
        assert!(!args.stop_on_entry);
        assert!(args.history.is_none());
    }

    #[test]
    fn test_run_missing_image() {
        let args = DebugArgs {
            image: PathBuf::from("nonexistent_image.json"),
            ..Default::default()
        };
        assert!(run(args).is_err());
    }
}
