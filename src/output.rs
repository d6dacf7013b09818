use std::{
    io::Write,
    sync::{Mutex, PoisonError},
};

use serde_json::Value;

use crate::{Error, lookup::RecordForNetwork};

/// Field added to every emitted record holding the key that matched it.
pub const KEY_FIELD: &str = "ip_address";

/// Writes one JSON object per record, newline-delimited, to a shared writer.
///
/// Each line is written under the lock, so concurrent callers never
/// interleave partial lines.
pub struct JsonLinesEmitter<W> {
    out: Mutex<W>,
}

impl<W: Write> JsonLinesEmitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Emits the records of one key and returns how many were written.
    ///
    /// A record that fails to serialize is logged and skipped. Write errors
    /// are returned.
    pub fn emit(&self, key: &str, records: &[RecordForNetwork]) -> Result<usize, Error> {
        let mut written = 0;
        for record in records {
            let line = match encode(key, record) {
                Ok(line) => line,
                Err(err) => {
                    error!(
                        input = key,
                        network = record.network.as_str(),
                        "An error occurred when marshalling a record map: {}",
                        err
                    );
                    continue;
                }
            };
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            out.write_all(&line)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn flush(&self) -> Result<(), Error> {
        self.out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode(key: &str, record: &RecordForNetwork) -> Result<Vec<u8>, Error> {
    let mut map = record.record.clone();
    map.insert(KEY_FIELD.to_string(), Value::String(key.to_string()));
    let mut line = serde_json::to_vec(&map)?;
    line.push(b'\n');
    Ok(line)
}
