//! Host library invoked by `LibCall`
//!
//! The VM only sees an index-addressed table. Indexes follow the fixed
//! registration order below, so a `LibCall` emitted against one build resolves
//! to the same function in another.

pub mod io;
mod math;
mod string;

use crate::value::{RuntimeError, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Signature shared by every library function.
///
/// Returns `Some` for functions that produce a value.
pub type LibFn = fn(&mut ExecutionContext, &[Value]) -> Result<Option<Value>, RuntimeError>;

#[derive(Clone, Copy)]
pub struct LibEntry {
    pub name: &'static str,
    pub func: LibFn,
}

impl fmt::Debug for LibEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibEntry").field("name", &self.name).finish()
    }
}

static LIBRARY: &[LibEntry] = &[
    // Console
    LibEntry { name: "Display", func: io::display },
    LibEntry { name: "InputInteger", func: io::input_integer },
    LibEntry { name: "InputReal", func: io::input_real },
    LibEntry { name: "InputString", func: io::input_string },
    LibEntry { name: "InputCharacter", func: io::input_character },
    LibEntry { name: "InputBoolean", func: io::input_boolean },
    LibEntry { name: "random", func: math::random },
    // Math
    LibEntry { name: "sqrt", func: math::sqrt },
    LibEntry { name: "pow", func: math::pow },
    LibEntry { name: "abs", func: math::abs },
    LibEntry { name: "cos", func: math::cos },
    LibEntry { name: "round", func: math::round },
    LibEntry { name: "sin", func: math::sin },
    LibEntry { name: "tan", func: math::tan },
    LibEntry { name: "toInteger", func: math::to_integer },
    LibEntry { name: "toReal", func: math::to_real },
    // Formatting
    LibEntry { name: "integerFormat", func: math::integer_format },
    LibEntry { name: "realFormat", func: math::real_format },
    LibEntry { name: "currencyFormat", func: math::currency_format },
    // Strings
    LibEntry { name: "length", func: string::length },
    LibEntry { name: "append", func: string::append },
    LibEntry { name: "toUpper", func: string::to_upper },
    LibEntry { name: "toLower", func: string::to_lower },
    LibEntry { name: "substring", func: string::substring },
    LibEntry { name: "contains", func: string::contains },
    LibEntry { name: "stringToInteger", func: string::string_to_integer },
    LibEntry { name: "stringToReal", func: string::string_to_real },
    LibEntry { name: "isInteger", func: string::is_integer },
    LibEntry { name: "isReal", func: string::is_real },
    // Files
    LibEntry { name: "OpenOutputFile", func: io::open_output_file },
    LibEntry { name: "OpenAppendFile", func: io::open_append_file },
    LibEntry { name: "OpenInputFile", func: io::open_input_file },
    LibEntry { name: "CloseOutputFile", func: io::close_file },
    LibEntry { name: "CloseInputFile", func: io::close_file },
    LibEntry { name: "WriteFile", func: io::write_file },
    LibEntry { name: "ReadInteger", func: io::read_integer },
    LibEntry { name: "ReadReal", func: io::read_real },
    LibEntry { name: "ReadString", func: io::read_string },
    LibEntry { name: "ReadCharacter", func: io::read_character },
    LibEntry { name: "ReadBoolean", func: io::read_boolean },
    LibEntry { name: "eof", func: io::eof },
];

/// Index of a library function by name
pub fn lib_index(name: &str) -> Option<usize> {
    LIBRARY.iter().position(|entry| entry.name == name)
}

/// Name of the library function at `index`
pub fn library_name(index: usize) -> Option<&'static str> {
    LIBRARY.get(index).map(|entry| entry.name)
}

/// The dispatch table an execution calls into.
#[derive(Debug, Clone, Copy)]
pub struct LibraryTable {
    entries: &'static [LibEntry],
}

impl LibraryTable {
    /// The standard Gaddis library
    pub fn standard() -> Self {
        Self { entries: LIBRARY }
    }

    pub fn get(&self, index: usize) -> Option<&LibEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LibEntry> {
        self.entries.iter()
    }
}

// ============================================================================
// Execution context
// ============================================================================

/// Console and filesystem access for library functions.
pub trait IoProvider: Send {
    /// Read one line of input without its line terminator
    fn input(&mut self) -> Result<String, RuntimeError>;
    fn output(&mut self, text: &str);
    /// Directory file names are resolved against
    fn work_dir(&self) -> PathBuf;
}

/// State shared by every library call of one execution
pub struct ExecutionContext {
    pub rng: StdRng,
    pub io: Box<dyn IoProvider>,
}

impl ExecutionContext {
    /// A fixed `seed` makes `random` reproducible; `None` seeds from the OS.
    pub fn new(io: Box<dyn IoProvider>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self { rng, io }
    }

    /// Context wired to the process's stdin and stdout
    pub fn stdio(seed: Option<u64>) -> Self {
        Self::new(Box::new(StdIo::new()), seed)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("work_dir", &self.io.work_dir())
            .finish_non_exhaustive()
    }
}

/// Process stdin/stdout
#[derive(Debug, Default)]
pub struct StdIo {
    work_dir: Option<PathBuf>,
}

impl StdIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_work_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: Some(dir.into()),
        }
    }
}

impl IoProvider for StdIo {
    fn input(&mut self) -> Result<String, RuntimeError> {
        let mut line = String::new();
        let n = std::io::stdin().read_line(&mut line)?;
        if n == 0 {
            return Err(RuntimeError::Io("unexpected end of input".to_string()));
        }
        Ok(trim_line_end(&line).to_string())
    }

    fn output(&mut self, text: &str) {
        use std::io::Write;
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Scripted input and captured output; clones share the same buffers.
#[derive(Debug, Clone, Default)]
pub struct BufferedIo {
    inner: Arc<parking_lot::Mutex<Buffers>>,
    work_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Buffers {
    input: VecDeque<String>,
    output: String,
}

impl BufferedIo {
    /// Provider whose input is the lines of `input`
    pub fn new(input: &str) -> Self {
        let buffers = Buffers {
            input: input.lines().map(str::to_string).collect(),
            output: String::new(),
        };
        Self {
            inner: Arc::new(parking_lot::Mutex::new(buffers)),
            work_dir: None,
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Everything written so far
    pub fn output(&self) -> String {
        self.inner.lock().output.clone()
    }

    /// Drain everything written so far
    pub fn take_output(&self) -> String {
        std::mem::take(&mut self.inner.lock().output)
    }
}

impl IoProvider for BufferedIo {
    fn input(&mut self) -> Result<String, RuntimeError> {
        self.inner
            .lock()
            .input
            .pop_front()
            .ok_or_else(|| RuntimeError::Io("unexpected end of input".to_string()))
    }

    fn output(&mut self, text: &str) {
        self.inner.lock().output.push_str(text);
    }

    fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

fn trim_line_end(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

// ============================================================================
// Argument helpers
// ============================================================================

fn lib_error(function: &str, message: impl Into<String>) -> RuntimeError {
    RuntimeError::LibArgument {
        function: function.to_string(),
        message: message.into(),
    }
}

fn expect_args(function: &str, args: &[Value], n: usize) -> Result<(), RuntimeError> {
    if args.len() != n {
        return Err(lib_error(
            function,
            format!("expected {} argument(s), found {}", n, args.len()),
        ));
    }
    Ok(())
}

/// Real parameters also accept integers
fn real_arg(value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Real(n) => Ok(*n),
        Value::Int(n) => Ok(*n as f64),
        other => Err(RuntimeError::mismatch("Real", other)),
    }
}

fn text_arg(value: &Value) -> Result<String, RuntimeError> {
    Ok(String::from_utf8_lossy(value.as_str()?).into_owned())
}
