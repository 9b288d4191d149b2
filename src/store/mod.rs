//! Control store: the control file as an ordered collection of records
//!
//! The store keeps every row it read, valid or not, together with the exact bytes it came
//! from. Rows whose typed values did not change are written back verbatim; changed rows are
//! re-rendered, and within them only the cells whose value changed.

mod columns;

pub use columns::{Column, ColumnMap, canonical_headers};

use crate::error::{Error, Result, RowError, RowErrorKind};
use crate::record::{self, Record};
use crate::types;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of coercing one row
#[derive(Clone, Debug)]
pub enum RowEntry {
    /// Coerced successfully; `loaded` is the value as read, used to detect changes on save
    Valid {
        /// Current value, mutated by the executors
        record: Record,
        /// Value at load time (or at the last save)
        loaded: Record,
    },
    /// Excluded from every phase and written back verbatim
    Rejected(RowError),
}

/// One data row of the control file
#[derive(Clone, Debug)]
pub struct ControlRow {
    line: u64,
    raw: Option<Vec<u8>>,
    cells: Vec<String>,
    entry: RowEntry,
}

impl ControlRow {
    /// 1-based line number (the header is line 1)
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Raw cell text as read
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Coercion outcome
    pub fn entry(&self) -> &RowEntry {
        &self.entry
    }

    /// The record, when the row was valid
    pub fn record(&self) -> Option<&Record> {
        match &self.entry {
            RowEntry::Valid { record, .. } => Some(record),
            RowEntry::Rejected(_) => None,
        }
    }
}

/// A loaded control file
#[derive(Clone, Debug)]
pub struct ControlFile {
    path: PathBuf,
    delimiter: u8,
    header_raw: Vec<u8>,
    headers: Vec<String>,
    columns: ColumnMap,
    rows: Vec<ControlRow>,
}

impl ControlFile {
    /// Read and coerce a control file
    ///
    /// Fails with [`Error::Format`] when the header is unusable or the file is not delimited
    /// text. Rows with bad cells or repeated dataset names are kept as rejected rows.
    pub fn load(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|e| Error::Format {
            path: path.clone(),
            reason: format!("cannot read: {e}"),
        })?;
        Self::parse(path, delimiter, &bytes)
    }

    fn parse(path: PathBuf, delimiter: u8, bytes: &[u8]) -> Result<Self> {
        let format_error = |reason: String| Error::Format {
            path: path.clone(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        // (line, start offset, cells)
        let mut parsed: Vec<(u64, usize, Vec<String>)> = Vec::new();
        let mut record = csv::StringRecord::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(true) => {
                    let (line, start) = record
                        .position()
                        .map(|p| (p.line(), line_start(bytes, p.byte() as usize)))
                        .unwrap_or((0, 0));
                    let cells = record.iter().map(str::to_string).collect();
                    parsed.push((line, start, cells));
                }
                Ok(false) => break,
                Err(e) => return Err(format_error(e.to_string())),
            }
        }

        let Some((_, _, headers)) = parsed.first().cloned() else {
            return Err(format_error("missing header row".to_string()));
        };
        let columns = ColumnMap::from_headers(&headers).map_err(&format_error)?;

        let mut ends: Vec<usize> = parsed.iter().skip(1).map(|(_, start, _)| *start).collect();
        ends.push(bytes.len());
        // Leading blank lines stay with the header
        let header_raw = bytes[..ends[0]].to_vec();

        let mut claimed: HashMap<String, u64> = HashMap::new();
        let mut rows = Vec::with_capacity(parsed.len().saturating_sub(1));
        for (i, (line, start, cells)) in parsed.into_iter().enumerate().skip(1) {
            let raw = bytes[start..ends[i]].to_vec();
            let entry = match coerce_row(&columns, &cells, line) {
                Ok(record) => match claimed.get(&record.dataset) {
                    Some(first_line) => RowEntry::Rejected(RowError {
                        line,
                        dataset: Some(record.dataset.clone()),
                        kind: RowErrorKind::Duplicate {
                            first_line: *first_line,
                        },
                    }),
                    None => {
                        claimed.insert(record.dataset.clone(), line);
                        RowEntry::Valid {
                            loaded: record.clone(),
                            record,
                        }
                    }
                },
                Err(err) => {
                    if let Some(dataset) = &err.dataset {
                        claimed.entry(dataset.clone()).or_insert(line);
                    }
                    RowEntry::Rejected(err)
                }
            };
            if let RowEntry::Rejected(err) = &entry {
                tracing::warn!(line, error = %err, "control file row rejected");
            }
            rows.push(ControlRow {
                line,
                raw: Some(raw),
                cells,
                entry,
            });
        }

        tracing::debug!(
            path = %path.display(),
            rows = rows.len(),
            "control file loaded"
        );

        Ok(Self {
            path,
            delimiter,
            header_raw,
            headers,
            columns,
            rows,
        })
    }

    /// Write a new control file holding only the canonical header row
    ///
    /// Fails if the file already exists.
    pub fn create(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let headers = canonical_headers();
        let header_raw = render_cells(&headers, delimiter, false).map_err(|reason| {
            Error::Persistence {
                path: path.clone(),
                reason,
            }
        })?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Error::Persistence {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        file.write_all(&header_raw)
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::Persistence {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %path.display(), "control file created");
        Self::parse(path, delimiter, &header_raw)
    }

    /// Path this file was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header cells in file order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// All data rows, valid and rejected, in file order
    pub fn rows(&self) -> &[ControlRow] {
        &self.rows
    }

    /// Valid records with their row index, in file order
    pub fn records(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| row.record().map(|record| (index, record)))
    }

    /// Rows rejected at load time
    pub fn rejected(&self) -> impl Iterator<Item = &RowError> {
        self.rows.iter().filter_map(|row| match &row.entry {
            RowEntry::Rejected(err) => Some(err),
            RowEntry::Valid { .. } => None,
        })
    }

    /// Look up a valid record by dataset name
    pub fn find(&self, dataset: &str) -> Option<&Record> {
        self.records()
            .map(|(_, record)| record)
            .find(|record| record.dataset == dataset)
    }

    /// Exclusive borrows of the valid records at `indices`, in file order
    ///
    /// Indices of rejected rows or out of range are ignored. The borrows are disjoint, so
    /// they can be handed to concurrent workers.
    pub fn select_mut(&mut self, indices: &[usize]) -> Vec<&mut Record> {
        let wanted: HashSet<usize> = indices.iter().copied().collect();
        self.rows
            .iter_mut()
            .enumerate()
            .filter(|(index, _)| wanted.contains(index))
            .filter_map(|(_, row)| match &mut row.entry {
                RowEntry::Valid { record, .. } => Some(record),
                RowEntry::Rejected(_) => None,
            })
            .collect()
    }

    /// Append a row for a new dataset; every other cell is blank
    pub fn append_dataset(&mut self, dataset: &str) -> Result<()> {
        let dataset = dataset.trim();
        if dataset.is_empty() {
            return Err(Error::Other("dataset name is blank".to_string()));
        }
        record::validate_dataset_name(dataset)?;
        let taken = self.rows.iter().any(|row| match &row.entry {
            RowEntry::Valid { record, .. } => record.dataset == dataset,
            RowEntry::Rejected(err) => err.dataset.as_deref() == Some(dataset),
        });
        if taken {
            return Err(Error::DuplicateKey {
                dataset: dataset.to_string(),
            });
        }

        let mut cells = vec![String::new(); self.headers.len()];
        if let Some(index) = self.columns.position(Column::Dsn) {
            cells[index] = dataset.to_string();
        }
        let record = Record::new(dataset);
        let line = self.rows.last().map(|row| row.line).unwrap_or(1) + 1;
        self.rows.push(ControlRow {
            line,
            raw: None,
            cells,
            entry: RowEntry::Valid {
                loaded: record.clone(),
                record,
            },
        });
        tracing::info!(dataset, "dataset added to control file");
        Ok(())
    }

    /// Copy the file as it currently sits on disk into `dir`
    ///
    /// The copy is named `<stem>[_<tag>]_<YYYYmmdd_HHMMSS>.csv`.
    pub fn backup(&self, dir: &Path, tag: Option<&str>) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "control".to_string());
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let name = match tag {
            Some(tag) if !tag.is_empty() => format!("{stem}_{tag}_{stamp}.csv"),
            _ => format!("{stem}_{stamp}.csv"),
        };
        let target = dir.join(name);
        std::fs::copy(&self.path, &target)?;
        tracing::info!(backup = %target.display(), "control file backed up");
        Ok(target)
    }

    /// Render the whole file as it would be saved
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let chunks = self.render_rows()?;
        Ok(concat_chunks(&self.header_raw, &chunks))
    }

    /// Atomically replace the control file with the current state
    ///
    /// The content goes to a temporary file in the same directory, is synced, then renamed
    /// over the original. On success the current values become the new baseline.
    pub fn save(&mut self) -> Result<()> {
        let chunks = self.render_rows()?;
        let bytes = concat_chunks(&self.header_raw, &chunks);

        let persistence = |reason: String| Error::Persistence {
            path: self.path.clone(),
            reason,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| persistence(e.to_string()))?;
        temp.write_all(&bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| persistence(e.to_string()))?;
        temp.persist(&self.path)
            .map_err(|e| persistence(e.error.to_string()))?;

        // Re-baseline so a later checkpoint only re-renders what changes after this one
        for (row, chunk) in self.rows.iter_mut().zip(chunks) {
            if let RowEntry::Valid { record, loaded } = &mut row.entry
                && *record != *loaded
            {
                row.cells = merged_cells(&row.cells, record, loaded, &self.columns);
                *loaded = record.clone();
            }
            row.raw = Some(chunk);
        }

        tracing::debug!(path = %self.path.display(), "control file saved");
        Ok(())
    }

    fn render_rows(&self) -> Result<Vec<Vec<u8>>> {
        self.rows
            .iter()
            .map(|row| {
                render_row(row, self.delimiter, &self.columns).map_err(|reason| {
                    Error::Persistence {
                        path: self.path.clone(),
                        reason,
                    }
                })
            })
            .collect()
    }
}

/// The reader reports a record after CRLF as starting on the `\n`; the pair belongs to the
/// line before
fn line_start(bytes: &[u8], offset: usize) -> usize {
    if offset > 0 && bytes.get(offset) == Some(&b'\n') && bytes[offset - 1] == b'\r' {
        offset + 1
    } else {
        offset
    }
}

fn concat_chunks(header: &[u8], chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = header.to_vec();
    for chunk in chunks {
        // A row appended after an unterminated last line needs its own line
        if !out.is_empty() && !out.ends_with(b"\n") {
            out.push(b'\n');
        }
        out.extend_from_slice(chunk);
    }
    out
}

fn coerce_row(
    columns: &ColumnMap,
    cells: &[String],
    line: u64,
) -> std::result::Result<Record, RowError> {
    let cell = |index: usize| cells.get(index).map(String::as_str).unwrap_or("");

    let dataset = columns
        .position(Column::Dsn)
        .map(|index| cell(index).trim().to_string())
        .unwrap_or_default();
    if dataset.is_empty() {
        return Err(RowError {
            line,
            dataset: None,
            kind: RowErrorKind::MissingDataset,
        });
    }
    if let Err(e) = types::check_dataset_name(&dataset) {
        return Err(RowError {
            line,
            dataset: None,
            kind: RowErrorKind::InvalidDataset {
                value: dataset,
                reason: e.reason,
            },
        });
    }

    let mut record = Record::new(dataset.clone());
    for (column, index) in columns.iter() {
        let value = cell(index);
        column.apply(&mut record, value).map_err(|e| RowError {
            line,
            dataset: Some(dataset.clone()),
            kind: RowErrorKind::InvalidValue {
                column: column.header().to_string(),
                value: value.to_string(),
                reason: e.reason,
            },
        })?;
    }
    Ok(record)
}

/// Bytes for one row: verbatim when unchanged, otherwise re-rendered with changed cells
fn render_row(
    row: &ControlRow,
    delimiter: u8,
    columns: &ColumnMap,
) -> std::result::Result<Vec<u8>, String> {
    let (record, loaded) = match &row.entry {
        RowEntry::Valid { record, loaded } => (record, loaded),
        RowEntry::Rejected(_) => {
            return match &row.raw {
                Some(raw) => Ok(raw.clone()),
                None => render_cells(&row.cells, delimiter, false),
            };
        }
    };

    if let Some(raw) = &row.raw
        && record == loaded
    {
        return Ok(raw.clone());
    }

    let cells = merged_cells(&row.cells, record, loaded, columns);
    let crlf = row.raw.as_ref().is_some_and(|raw| raw.ends_with(b"\r\n"));
    let mut out = render_cells(&cells, delimiter, crlf)?;
    // Keep a missing final newline missing
    if let Some(raw) = &row.raw
        && !raw.ends_with(b"\n")
    {
        while matches!(out.last(), Some(b'\n' | b'\r')) {
            out.pop();
        }
    }
    Ok(out)
}

/// `cells` with every column whose rendered value moved from `loaded` to `record` replaced
fn merged_cells(
    cells: &[String],
    record: &Record,
    loaded: &Record,
    columns: &ColumnMap,
) -> Vec<String> {
    let mut cells = cells.to_vec();
    for (column, index) in columns.iter() {
        let current = column.render(record);
        if current != column.render(loaded) {
            if cells.len() <= index {
                cells.resize(index + 1, String::new());
            }
            cells[index] = current;
        }
    }
    cells
}

fn render_cells<S: AsRef<[u8]>>(
    cells: &[S],
    delimiter: u8,
    crlf: bool,
) -> std::result::Result<Vec<u8>, String> {
    let terminator = if crlf {
        csv::Terminator::CRLF
    } else {
        csv::Terminator::Any(b'\n')
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(terminator)
        .flexible(true)
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(cells).map_err(|e| e.to_string())?;
    writer.into_inner().map_err(|e| e.to_string())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
