//! Line-oriented transports.
//!
//! Strings are written verbatim, every other message as compact JSON, one
//! message per line.

use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};
use serde_json::Value as JsonValue;

use crate::decorator::CallOptions;
use crate::transport::{Transport, TransportError};

/// Newline-delimited writer shared by the builtin transports.
pub struct LineSink<W: Write> {
    writer: W,
    lines: u64,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Write a single message as one line
    pub fn write_message(&mut self, message: &JsonValue) -> Result<(), TransportError> {
        match message {
            JsonValue::String(s) => writeln!(self.writer, "{}", s)?,
            other => {
                serde_json::to_writer(&mut self.writer, other)?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.lines += 1;
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Number of lines written so far
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Writes to standard output.
pub struct ConsoleTransport {
    sink: LineSink<Stdout>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            sink: LineSink::new(io::stdout()),
        }
    }

    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.sink.flush()
    }

    pub fn lines(&self) -> u64 {
        self.sink.lines()
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ConsoleTransport {
    const IDENTIFIER: &'static str = "console";

    fn write(&mut self, message: JsonValue, _options: &CallOptions) -> Result<(), TransportError> {
        self.sink.write_message(&message)
    }
}

/// Appends to a file, creating it if needed.
pub struct FileTransport {
    path: PathBuf,
    sink: LineSink<File>,
}

impl FileTransport {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::debug!("Opened file transport at {}", path.display());

        Ok(Self {
            path,
            sink: LineSink::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.sink.flush()
    }

    pub fn lines(&self) -> u64 {
        self.sink.lines()
    }
}

impl Transport for FileTransport {
    const IDENTIFIER: &'static str = "file";

    fn write(&mut self, message: JsonValue, _options: &CallOptions) -> Result<(), TransportError> {
        self.sink.write_message(&message)
    }
}
