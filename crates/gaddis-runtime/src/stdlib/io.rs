//! Console and file I/O functions
//!
//! Console:
//! - Display, InputInteger, InputReal, InputString, InputCharacter, InputBoolean
//!
//! Files:
//! - OpenOutputFile, OpenAppendFile, OpenInputFile, CloseOutputFile, CloseInputFile
//! - WriteFile
//! - ReadInteger, ReadReal, ReadString, ReadCharacter, ReadBoolean, eof

use super::{expect_args, lib_error, text_arg, trim_line_end, ExecutionContext};
use crate::value::{format_real, RuntimeError, Shared, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

type LibResult = Result<Option<Value>, RuntimeError>;

// ============================================================================
// Console
// ============================================================================

/// Display(args...) - write all arguments followed by a newline
pub fn display(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    let mut line = String::new();
    for arg in args {
        line.push_str(&arg.to_string());
    }
    line.push('\n');
    ctx.io.output(&line);
    Ok(None)
}

/// Prompt until `parse` accepts a line
fn prompt_until<T>(
    ctx: &mut ExecutionContext,
    prompt: &str,
    complaint: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RuntimeError> {
    loop {
        ctx.io.output(prompt);
        let line = ctx.io.input()?;
        if let Some(value) = parse(&line) {
            return Ok(value);
        }
        ctx.io.output(complaint);
    }
}

pub fn input_integer(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("InputInteger", args, 0)?;
    let n = prompt_until(
        ctx,
        "integer> ",
        "error, invalid integer, try again\n",
        |s| s.parse::<i64>().ok(),
    )?;
    Ok(Some(Value::Int(n)))
}

pub fn input_real(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("InputReal", args, 0)?;
    let n = prompt_until(ctx, "real> ", "error, invalid real, try again\n", |s| {
        s.parse::<f64>().ok()
    })?;
    Ok(Some(Value::Real(n)))
}

/// Any line is a valid string, so this never re-prompts.
pub fn input_string(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("InputString", args, 0)?;
    ctx.io.output("string> ");
    let line = ctx.io.input()?;
    Ok(Some(Value::str(&line)))
}

pub fn input_character(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("InputCharacter", args, 0)?;
    let c = prompt_until(
        ctx,
        "character> ",
        "error, input exactly 1 character, try again\n",
        |s| match s.as_bytes() {
            [c] => Some(*c),
            _ => None,
        },
    )?;
    Ok(Some(Value::Char(c)))
}

pub fn input_boolean(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("InputBoolean", args, 0)?;
    let b = prompt_until(
        ctx,
        "boolean> ",
        "error, invalid boolean, try again\n",
        parse_bool,
    )?;
    Ok(Some(Value::Bool(b)))
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

// ============================================================================
// File handles
// ============================================================================

/// An open (or closed) host file.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    state: FileState,
}

#[derive(Debug)]
enum FileState {
    Output(BufWriter<File>),
    Input(BufReader<File>),
    Closed,
}

impl FileHandle {
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, FileState::Closed)
    }

    fn writer(&mut self, function: &str) -> Result<&mut BufWriter<File>, RuntimeError> {
        match &mut self.state {
            FileState::Output(w) => Ok(w),
            FileState::Input(_) => Err(lib_error(function, "file is open for input")),
            FileState::Closed => Err(RuntimeError::FileNotOpen),
        }
    }

    fn reader(&mut self, function: &str) -> Result<&mut BufReader<File>, RuntimeError> {
        match &mut self.state {
            FileState::Input(r) => Ok(r),
            FileState::Output(_) => Err(lib_error(function, "file is open for output")),
            FileState::Closed => Err(RuntimeError::FileNotOpen),
        }
    }

    fn close(&mut self) -> Result<(), RuntimeError> {
        match std::mem::replace(&mut self.state, FileState::Closed) {
            FileState::Output(mut w) => w.flush().map_err(RuntimeError::from),
            FileState::Input(_) => Ok(()),
            FileState::Closed => Err(RuntimeError::FileNotOpen),
        }
    }

    /// Next line without its terminator
    fn read_line(&mut self, function: &str) -> Result<String, RuntimeError> {
        let reader = self.reader(function)?;
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(RuntimeError::Io(format!(
                "{}: unexpected end of file",
                function
            )));
        }
        Ok(trim_line_end(&line).to_string())
    }
}

fn resolve(ctx: &ExecutionContext, name: &Value) -> Result<PathBuf, RuntimeError> {
    Ok(ctx.io.work_dir().join(text_arg(name)?))
}

fn open_file(path: PathBuf, options: &OpenOptions, output: bool) -> LibResult {
    let file = options.open(&path)?;
    let state = if output {
        FileState::Output(BufWriter::new(file))
    } else {
        FileState::Input(BufReader::new(file))
    };
    Ok(Some(Value::File(Shared::new(FileHandle { path, state }))))
}

/// OpenOutputFile(name) - create or truncate
pub fn open_output_file(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("OpenOutputFile", args, 1)?;
    let path = resolve(ctx, &args[0])?;
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    open_file(path, &options, true)
}

/// OpenAppendFile(name) - create or append
pub fn open_append_file(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("OpenAppendFile", args, 1)?;
    let path = resolve(ctx, &args[0])?;
    let mut options = OpenOptions::new();
    options.append(true).create(true);
    open_file(path, &options, true)
}

pub fn open_input_file(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("OpenInputFile", args, 1)?;
    let path = resolve(ctx, &args[0])?;
    let mut options = OpenOptions::new();
    options.read(true);
    open_file(path, &options, false)
}

/// CloseOutputFile / CloseInputFile
pub fn close_file(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("CloseFile", args, 1)?;
    args[0].as_file()?.with_mut(FileHandle::close)?;
    Ok(None)
}

/// WriteFile(file, args...) - one line per argument, in a form the Read*
/// functions parse back
pub fn write_file(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    let (file, values) = args
        .split_first()
        .ok_or_else(|| lib_error("WriteFile", "expected a file argument"))?;
    let mut text = String::new();
    for value in values {
        text.push_str(&file_repr(value)?);
        text.push('\n');
    }
    file.as_file()?.with_mut(|handle| -> Result<(), RuntimeError> {
        handle.writer("WriteFile")?.write_all(text.as_bytes())?;
        Ok(())
    })?;
    Ok(None)
}

fn file_repr(value: &Value) -> Result<String, RuntimeError> {
    Ok(match value {
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Real(n) => format_real(*n),
        Value::Str(s) => quote(s, b'"'),
        Value::Char(c) => quote(&[*c], b'\''),
        other => {
            return Err(lib_error(
                "WriteFile",
                format!("cannot write a {}", other.type_name()),
            ))
        }
    })
}

fn read_with<T>(
    args: &[Value],
    function: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, RuntimeError> {
    expect_args(function, args, 1)?;
    let line = args[0].as_file()?.with_mut(|handle| handle.read_line(function))?;
    parse(&line).ok_or_else(|| lib_error(function, format!("invalid input {:?}", line)))
}

pub fn read_integer(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    let n = read_with(args, "ReadInteger", |s| s.parse::<i64>().ok())?;
    Ok(Some(Value::Int(n)))
}

pub fn read_real(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    let n = read_with(args, "ReadReal", |s| s.parse::<f64>().ok())?;
    Ok(Some(Value::Real(n)))
}

pub fn read_string(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    let s = read_with(args, "ReadString", |s| unquote(s, b'"'))?;
    Ok(Some(Value::bytes(s)))
}

pub fn read_character(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    let c = read_with(args, "ReadCharacter", |s| match unquote(s, b'\'')?.as_slice() {
        [c] => Some(*c),
        _ => None,
    })?;
    Ok(Some(Value::Char(c)))
}

pub fn read_boolean(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    let b = read_with(args, "ReadBoolean", parse_bool)?;
    Ok(Some(Value::Bool(b)))
}

/// eof(file) - true when no input remains
pub fn eof(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("eof", args, 1)?;
    let at_end = args[0]
        .as_file()?
        .with_mut(|handle| -> Result<bool, RuntimeError> {
            Ok(handle.reader("eof")?.fill_buf()?.is_empty())
        })?;
    Ok(Some(Value::Bool(at_end)))
}

// ============================================================================
// Quoting
// ============================================================================

fn quote(bytes: &[u8], delim: u8) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push(delim as char);
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            _ if b == delim => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push(delim as char);
    out
}

fn unquote(s: &str, delim: u8) -> Option<Vec<u8>> {
    let inner = s
        .as_bytes()
        .strip_prefix(&[delim])?
        .strip_suffix(&[delim])?;
    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.iter().copied();
    while let Some(b) = bytes.next() {
        if b == delim {
            return None;
        }
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next()? {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            b'\'' => out.push(b'\''),
            b'x' => {
                let hi = (bytes.next()? as char).to_digit(16)?;
                let lo = (bytes.next()? as char).to_digit(16)?;
                out.push((hi * 16 + lo) as u8);
            }
            _ => return None,
        }
    }
    Some(out)
}
