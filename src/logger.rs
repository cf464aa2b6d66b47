//! Append-only, tab-separated row logger.
//!
//! The header is written as soon as the file is opened. Every row is written
//! as `"\n" + values.join("\t")`, so a finished file has no trailing newline.
//! Fields that a call does not supply are rendered as [`MISSING`]. Values are
//! written verbatim: an embedded tab or newline will break row boundaries.

use crate::error::{RecorderError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sentinel written for every field absent from a `write` call.
pub const MISSING: &str = "n/a";

/// Fixed-schema TSV writer with a single owner.
#[derive(Debug)]
pub struct AppendLogger {
    path: PathBuf,
    fields: Vec<String>,
    writer: Option<BufWriter<File>>,
    rows: u64,
}

impl AppendLogger {
    /// Open `path` for writing (truncating it) and write the header line.
    pub fn create<I, S>(path: impl AsRef<Path>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.as_ref().to_path_buf();
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if let Some(dup) = duplicate(&fields) {
            return Err(RecorderError::log_write(
                &path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("duplicate field `{dup}`"),
                ),
            ));
        }

        let file = File::create(&path).map_err(|e| RecorderError::log_write(&path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(fields.join("\t").as_bytes())
            .map_err(|e| RecorderError::log_write(&path, e))?;

        debug!(path = %path.display(), fields = fields.len(), "opened log");

        Ok(Self {
            path,
            fields,
            writer: Some(writer),
            rows: 0,
        })
    }

    /// Append one row. Entries whose name is not a declared field are ignored.
    pub fn write<I, K, V>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        let supplied: HashMap<String, String> = values
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.to_string()))
            .collect();

        let mut line = String::from("\n");
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            line.push_str(supplied.get(field).map(String::as_str).unwrap_or(MISSING));
        }

        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => {
                return Err(RecorderError::log_write(
                    &self.path,
                    std::io::Error::other("log already closed"),
                ))
            }
        };
        writer
            .write_all(line.as_bytes())
            .map_err(|e| RecorderError::log_write(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Push buffered rows to the OS without closing.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| RecorderError::log_write(&self.path, e))?;
        }
        Ok(())
    }

    /// Flush and release the file. Calling this again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let file = writer
            .into_inner()
            .map_err(|e| RecorderError::log_write(&self.path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| RecorderError::log_write(&self.path, e))?;
        debug!(path = %self.path.display(), rows = self.rows, "closed log");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows written so far (header excluded).
    pub fn rows_written(&self) -> u64 {
        self.rows
    }
}

fn duplicate(fields: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    fields
        .iter()
        .map(String::as_str)
        .find(|f| !seen.insert(*f))
}

impl Drop for AppendLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close log on drop: {e}");
        }
    }
}
