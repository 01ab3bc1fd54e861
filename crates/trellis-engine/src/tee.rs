//! Byte-exact output capture with last-line tracking.
//!
//! Child process output is duplicated: every byte read lands verbatim in
//! a full buffer, while complete lines (`\n`-terminated, no trimming)
//! are surfaced one at a time for streaming progress. A trailing partial
//! line stays in the buffer and is never surfaced as a line.

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// Concurrently readable handle onto the most recent complete line.
#[derive(Debug, Clone, Default)]
pub struct LastLine(Arc<Mutex<String>>);

impl LastLine {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, line: &str) {
        *self.0.lock().unwrap() = line.to_string();
    }

    /// The last complete line, truncated to `max` characters with an
    /// ellipsis when truncation occurs. Empty until a first full line
    /// has been observed.
    pub fn get(&self, max: usize) -> String {
        let line = self.0.lock().unwrap();
        if line.chars().count() <= max {
            line.clone()
        } else {
            let mut truncated: String = line.chars().take(max).collect();
            truncated.push('…');
            truncated
        }
    }
}

/// Splits a byte stream into a verbatim buffer plus complete lines.
#[derive(Debug, Default)]
pub struct LineScanner {
    buffer: Vec<u8>,
    tail: Vec<u8>,
    last: LastLine,
}

impl LineScanner {
    pub fn new(last: LastLine) -> Self {
        Self {
            buffer: Vec::new(),
            tail: Vec::new(),
            last,
        }
    }

    /// Append `bytes` to the buffer and return every line completed by
    /// this chunk, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.tail).into_owned();
                self.last.set(&line);
                lines.push(line);
                self.tail.clear();
            } else {
                self.tail.push(byte);
            }
        }
        lines
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

/// Drain `reader` to EOF through a scanner, invoking `on_line` for every
/// complete line, and return the full captured buffer.
pub async fn pump<R, F>(mut reader: R, mut scanner: LineScanner, mut on_line: F) -> Vec<u8>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for line in scanner.feed(&chunk[..n]) {
                    on_line(line);
                }
            }
            Err(e) => {
                log::debug!("output stream read failed: {e}");
                break;
            }
        }
    }
    scanner.into_buffer()
}
