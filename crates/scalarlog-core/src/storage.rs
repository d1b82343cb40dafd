//! Storage layer: CSV header/row I/O, atomic schema rewrites, backups.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use csv::StringRecord;

use crate::error::Result;

/// Append-mode CSV writer over a category file.
pub type CsvAppender = csv::Writer<File>;

// ─── Directory helpers ────────────────────────────────────────────────────────

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

fn file_name_of(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(crate::models::LOG_FILE_NAME)
}

// ─── Reading ─────────────────────────────────────────────────────────────────

/// Header row plus data rows of a CSV file, in file order.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl Table {
    /// Cell of `row` under column `name`, if the row has one.
    pub fn cell<'a>(&'a self, row: usize, name: &str) -> Option<&'a str> {
        let idx = self.header.iter().position(|h| h == name)?;
        self.rows.get(row)?.get(idx)
    }
}

/// Read the first record of a CSV file.
///
/// A missing or empty file has no header and yields an empty vec.
pub fn read_header(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut record = StringRecord::new();
    if reader.read_record(&mut record)? {
        Ok(record.iter().map(str::to_string).collect())
    } else {
        Ok(vec![])
    }
}

/// Read a whole CSV file. Rows may be ragged; they are kept as-is.
pub fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        return Ok(Table::default());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let header = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = vec![];
    for record in reader.records() {
        rows.push(record?);
    }
    Ok(Table { header, rows })
}

// ─── Writing ─────────────────────────────────────────────────────────────────

/// Open `path` for appending, creating it if needed.
///
/// If the file has content that does not end in a newline, one is written
/// first so the next record starts on its own line.
pub fn open_append(path: &Path) -> Result<CsvAppender> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    if file.metadata()?.len() > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            file.write_all(b"\n")?;
        }
    }
    Ok(csv::WriterBuilder::new().has_headers(false).from_writer(file))
}

/// Rewrite `path` so its header is exactly `columns`.
///
/// Every existing row is re-serialized against the new header by column
/// name; columns a row never had render empty, columns dropped from the
/// header are dropped from the row. The new content goes to a temporary
/// sibling file which is synced and renamed over the original, so the file
/// on disk is always either fully old or fully new.
///
/// Returns the number of data rows carried over.
pub fn rewrite_with_columns(path: &Path, columns: &[String]) -> Result<usize> {
    let table = read_table(path)?;
    let positions: Vec<Option<usize>> = columns
        .iter()
        .map(|c| table.header.iter().position(|h| h == c))
        .collect();

    let tmp = temp_path_for(path);
    let written = write_table(&tmp, columns, &positions, &table.rows)
        .and_then(|_| fs::rename(&tmp, path).map_err(Into::into));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    sync_parent_dir(path);
    Ok(table.rows.len())
}

fn write_table(
    tmp: &Path,
    columns: &[String],
    positions: &[Option<usize>],
    rows: &[StringRecord],
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(tmp)?);
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(
            positions
                .iter()
                .map(|p| p.and_then(|idx| row.get(idx)).unwrap_or("")),
        )?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    path.with_file_name(format!(
        ".{}.tmp.{}",
        file_name_of(path),
        std::process::id()
    ))
}

fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

// ─── Backups ─────────────────────────────────────────────────────────────────

/// First free backup name for `path` at `stamp`.
///
/// `log.csv` becomes `log.csv.<stamp>.bak`; if that is taken, a counter is
/// inserted (`log.csv.<stamp>.1.bak`, `.2.bak`, ...).
pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let name = file_name_of(path);
    let mut candidate = path.with_file_name(format!("{name}.{stamp}.bak"));
    let mut n = 1u32;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{name}.{stamp}.{n}.bak"));
        n += 1;
    }
    candidate
}

/// Move an existing file aside to a timestamped backup.
///
/// Returns the backup path, or `None` when there was nothing to back up.
pub fn backup_existing(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let dest = backup_path(path, &stamp);
    fs::rename(path, &dest)?;
    Ok(Some(dest))
}
