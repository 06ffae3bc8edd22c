//! Lazy CSV rendering of the HR dataset.
//!
//! The export is a pull-based, forward-only stream: rows are fetched from
//! each source in keyset batches as the consumer advances, so at most one
//! batch is held in memory. Each stream reads its own snapshot, released
//! when the stream is dropped.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::Arc;

use crate::domain::{Result, RowSource, SnapshotSource, SourceRow};

/// Field delimiter of the export format.
const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Produces export streams over the sections of a snapshot source.
pub struct DataExporter {
    snapshots: Box<dyn SnapshotSource>,
    batch_size: usize,
}

impl DataExporter {
    /// Sections are written in the order the snapshot lists them.
    #[must_use]
    pub fn new(snapshots: impl SnapshotSource + 'static, batch_size: usize) -> Self {
        Self {
            snapshots: Box::new(snapshots),
            batch_size: batch_size.max(1),
        }
    }

    /// Start a new single-pass export over a fresh snapshot.
    ///
    /// Per source the stream yields a `## NAME ##` marker, the header line and
    /// one escaped line per row. After the first `Err` item the stream ends.
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be opened.
    pub fn export_all(&self) -> Result<ExportStream> {
        let sources = self.snapshots.open_snapshot()?;
        Ok(ExportStream {
            sources: sources.into_iter(),
            current: None,
            stage: Stage::Marker,
            buffer: VecDeque::new(),
            last_id: None,
            exhausted: false,
            rows: 0,
            batch_size: self.batch_size,
            done: false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Marker,
    Header,
    Rows,
}

/// Forward-only export lines. Not `Clone`: it cannot be restarted or read twice.
pub struct ExportStream {
    sources: std::vec::IntoIter<Arc<dyn RowSource>>,
    current: Option<Arc<dyn RowSource>>,
    stage: Stage,
    buffer: VecDeque<SourceRow>,
    last_id: Option<i64>,
    /// Current source returned a short batch.
    exhausted: bool,
    rows: usize,
    batch_size: usize,
    done: bool,
}

impl ExportStream {
    fn finish_section(&mut self, section: &str) {
        tracing::debug!(section, rows = self.rows, "Section exported");
        self.current = None;
    }
}

impl Iterator for ExportStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            let Some(source) = self.current.clone() else {
                match self.sources.next() {
                    Some(next) => {
                        self.current = Some(next);
                        self.stage = Stage::Marker;
                        self.buffer.clear();
                        self.last_id = None;
                        self.exhausted = false;
                        self.rows = 0;
                        continue;
                    }
                    None => {
                        self.done = true;
                        return None;
                    }
                }
            };

            match self.stage {
                Stage::Marker => {
                    self.stage = Stage::Header;
                    return Some(Ok(section_marker(source.section())));
                }
                Stage::Header => {
                    self.stage = Stage::Rows;
                    return Some(Ok(join_fields(source.headers())));
                }
                Stage::Rows => {
                    if let Some(row) = self.buffer.pop_front() {
                        self.rows += 1;
                        return Some(Ok(join_fields(&row.fields)));
                    }
                    if self.exhausted {
                        self.finish_section(source.section());
                        continue;
                    }

                    match source.fetch_after(self.last_id, self.batch_size) {
                        Ok(batch) => {
                            self.exhausted = batch.len() < self.batch_size;
                            match batch.last() {
                                Some(last) => {
                                    self.last_id = Some(last.id);
                                    self.buffer.extend(batch);
                                }
                                None => self.finish_section(source.section()),
                            }
                        }
                        Err(e) => {
                            tracing::warn!(section = source.section(), error = %e, "Export source failed");
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

impl FusedIterator for ExportStream {}

/// Marker line introducing a section.
#[must_use]
pub fn section_marker(section: &str) -> String {
    format!("## {section} ##")
}

fn join_fields<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(DELIMITER);
        }
        line.push_str(&escape_csv_value(field.as_ref()));
    }
    line
}

/// Quote a field if it contains the delimiter, a quote or a newline;
/// inner quotes are doubled. Other fields pass through untouched.
#[must_use]
pub fn escape_csv_value(value: &str) -> Cow<'_, str> {
    if value.contains([DELIMITER, QUOTE, '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
pub(crate) fn unescape_csv_value(field: &str) -> String {
    match field
        .strip_prefix(QUOTE)
        .and_then(|rest| rest.strip_suffix(QUOTE))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => field.to_string(),
    }
}
