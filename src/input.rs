use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    iter::FusedIterator,
    path::Path,
};

use crate::{Error, config::STDIN_INPUT};

/// Lazily reads lookup keys, one per line.
///
/// Line terminators (`\n` or `\r\n`) are stripped and empty lines are skipped.
/// Nothing else is trimmed. A read error is logged and ends the sequence.
/// Dropping the iterator drops the source, so a consumer can stop at any point.
pub struct KeyLines<R> {
    reader: R,
    buf: Vec<u8>,
    lines_read: u64,
    done: bool,
}

impl<R: BufRead> KeyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            lines_read: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for KeyLines<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    debug!(lines = self.lines_read, "end of lookup keys");
                    self.done = true;
                }
                Ok(_) => {
                    self.lines_read += 1;
                    let line = strip_terminator(&self.buf);
                    if line.is_empty() {
                        continue;
                    }
                    return Some(String::from_utf8_lossy(line).into_owned());
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    error!(
                        line = self.lines_read + 1,
                        "An error occurred when reading lookup keys: {}", err
                    );
                    self.done = true;
                }
            }
        }
        None
    }
}

impl<R: BufRead> FusedIterator for KeyLines<R> {}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Opens the key source: `-` is standard input, anything else a file path.
pub fn open_input(input: &str) -> Result<KeyLines<Box<dyn BufRead + Send>>, Error> {
    let reader: Box<dyn BufRead + Send> = if input == STDIN_INPUT {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(Path::new(input))?))
    };
    Ok(KeyLines::new(reader))
}
