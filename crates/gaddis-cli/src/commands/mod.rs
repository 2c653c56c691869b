pub mod debug;
pub mod disasm;
pub mod run;
pub mod test;

use anyhow::{bail, Context, Result};
use gaddis_runtime::bytecode::validate;
use gaddis_runtime::Assembly;
use std::path::Path;

/// Load and validate a program image
pub fn load_image(path: &Path) -> Result<Assembly> {
    let assembly = Assembly::load(path)
        .with_context(|| format!("Failed to load program image: {}", path.display()))?;
    if let Err(errors) = validate(&assembly) {
        for err in &errors {
            eprintln!("  {}", err);
        }
        bail!(
            "{} is not a valid program image ({} problem(s))",
            path.display(),
            errors.len()
        );
    }
    Ok(assembly)
}

/// Name a program by its file stem, as stack traces show it
pub fn program_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("main")
        .to_string()
}
