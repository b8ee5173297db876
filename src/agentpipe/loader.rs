//! Input loading: CSV datasets and instruction text files.
//!
//! Datasets are handed to the analysis agents as one flat string: every cell
//! of every data row (header excluded) in row-major order, joined with `", "`.
//! Empty cells are rendered as `nan`.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while locating or reading input files.
#[derive(Debug)]
pub enum LoaderError {
    Io { path: PathBuf, source: io::Error },
    /// The data directory exists but holds no `.csv` file.
    NoCsvFiles { dir: PathBuf },
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            LoaderError::NoCsvFiles { dir } => {
                write!(f, "No CSV files found in {}", dir.display())
            }
        }
    }
}

impl Error for LoaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoaderError::Io { source, .. } => Some(source),
            LoaderError::NoCsvFiles { .. } => None,
        }
    }
}

/// Rendering of an empty cell.
pub const MISSING_VALUE: &str = "nan";

/// Read `path` as a list of non-empty, trimmed lines.
///
/// A missing or unreadable file yields an empty list (logged as a warning) so
/// the personas fall back to their built-in guidance.
pub fn load_instruction_lines(path: impl AsRef<Path>) -> Vec<String> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            log::warn!(
                "load_instruction_lines(...): could not read {}: {}",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}

/// `.csv` files directly inside `dir`, sorted by file name.
pub fn list_csv_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, LoaderError> {
    let dir = dir.as_ref();
    let io_err = |source| LoaderError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(LoaderError::NoCsvFiles {
            dir: dir.to_path_buf(),
        });
    }
    files.sort();
    Ok(files)
}

/// Load a CSV file and flatten it with [`flatten_csv`].
pub fn load_csv_text(path: impl AsRef<Path>) -> Result<String, LoaderError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let flat = flatten_csv(&text);
    log::info!(
        "load_csv_text(...): loaded {} ({} chars flattened)",
        path.display(),
        flat.len()
    );
    Ok(flat)
}

/// Flatten CSV text: header dropped, cells row-major, joined with `", "`.
///
/// Rows shorter than the header are padded with [`MISSING_VALUE`].
pub fn flatten_csv(text: &str) -> String {
    let mut records = parse_csv(text).into_iter();
    let width = match records.next() {
        Some(header) => header.len(),
        None => return String::new(),
    };

    let mut cells = Vec::new();
    for record in records {
        let row_width = record.len().max(width);
        let mut fields = record.into_iter();
        for _ in 0..row_width {
            match fields.next() {
                Some(field) if !field.trim().is_empty() => cells.push(field),
                _ => cells.push(MISSING_VALUE.to_string()),
            }
        }
    }
    cells.join(", ")
}

/// Split CSV text into records.
///
/// Handles quoted fields with embedded commas, newlines and `""` escapes, and
/// both `\n` and `\r\n` line endings. Blank lines are skipped.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = true;
            }
            '\r' => {}
            '\n' => {
                if field_started || !field.is_empty() || !record.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }
    if field_started || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}
