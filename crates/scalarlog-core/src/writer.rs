//! Schema-migrating tabular writer: one growable CSV file per category.
//!
//! Each category owns its path, its column list and a single append handle.
//! The header on disk always equals the in-memory column list: when a record
//! brings keys the file has never seen, the file is rewritten with the new
//! columns appended (sorted) before the row goes out.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, ScalarlogError};
use crate::models::{LoggerConfig, MetricValue, Record, RunMode, GLOBAL_STEP, TIMESTAMP};
use crate::storage::{self, CsvAppender};

/// On-disk state of a single category.
pub struct CategoryFile {
    name: String,
    path: PathBuf,
    columns: Vec<String>,
    handle: Option<CsvAppender>,
}

impl CategoryFile {
    fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
            columns: vec![],
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current column order; matches the file's header row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// First touch in this run (or first touch after `close`): settle the
    /// backup question, learn the existing header and open the handle.
    ///
    /// `backup` moves an existing file aside in fresh-start mode. Its failure
    /// is not fatal: the run appends to the existing file instead.
    fn open<B>(
        &mut self,
        record: &Record,
        mode: RunMode,
        initialized: &mut HashSet<PathBuf>,
        backup: B,
    ) -> Result<()>
    where
        B: FnOnce(&Path) -> Result<Option<PathBuf>>,
    {
        if let Some(dir) = self.path.parent() {
            storage::ensure_dir(dir)?;
        }

        if initialized.insert(self.path.clone()) && mode == RunMode::FreshStart {
            match backup(&self.path) {
                Ok(Some(dest)) => info!(
                    category = %self.name,
                    backup = %dest.display(),
                    "Backed up existing log"
                ),
                Ok(None) => {}
                Err(e) => warn!(
                    category = %self.name,
                    path = %self.path.display(),
                    "Failed to back up existing log, appending to it instead: {}",
                    e
                ),
            }
        }

        let existing = storage::read_header(&self.path)?;
        let needs_header = existing.is_empty();
        let columns = if needs_header {
            initial_columns(record)
        } else {
            existing
        };

        let mut handle = storage::open_append(&self.path)?;
        if needs_header {
            handle.write_record(&columns)?;
            handle.flush()?;
            info!(
                category = %self.name,
                path = %self.path.display(),
                columns = ?columns,
                "Created log file"
            );
        } else {
            debug!(
                category = %self.name,
                path = %self.path.display(),
                "Appending to existing log file"
            );
        }
        self.columns = columns;
        self.handle = Some(handle);
        Ok(())
    }

    /// Rewrite the file with any of `record`'s keys that are not columns yet.
    fn migrate_if_needed(&mut self, record: &Record) -> Result<bool> {
        let new_keys: Vec<String> = record
            .keys()
            .filter(|k| !self.columns.iter().any(|c| c == k))
            .map(str::to_string)
            .collect();
        if new_keys.is_empty() {
            return Ok(false);
        }

        if let Some(mut handle) = self.handle.take() {
            handle.flush()?;
        }

        let mut columns = self.columns.clone();
        columns.extend(new_keys.iter().cloned());
        let rows = storage::rewrite_with_columns(&self.path, &columns)?;

        self.handle = Some(storage::open_append(&self.path)?);
        self.columns = columns;
        info!(
            category = %self.name,
            new_columns = ?new_keys,
            rows,
            "Expanded CSV header"
        );
        Ok(true)
    }

    fn append(&mut self, record: &Record) -> Result<()> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| ScalarlogError::Other(format!("category {:?} is not open", self.name)))?;
        handle.write_record(record.to_row(&self.columns))?;
        handle.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.as_mut() {
            handle.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut handle) => Ok(handle.flush()?),
            None => Ok(()),
        }
    }
}

/// Reserved pair first, then the record's other keys in sorted order.
fn initial_columns(record: &Record) -> Vec<String> {
    let mut columns = vec![GLOBAL_STEP.to_string(), TIMESTAMP.to_string()];
    columns.extend(
        record
            .keys()
            .filter(|k| *k != GLOBAL_STEP && *k != TIMESTAMP)
            .map(str::to_string),
    );
    columns
}

/// Category names become directory names, so anything that would escape
/// the job directory is refused.
pub fn validate_category(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if invalid {
        return Err(ScalarlogError::InvalidCategory(name.to_string()));
    }
    Ok(())
}

/// Owns every category's file and handle for one job.
pub struct TabularWriter {
    config: LoggerConfig,
    categories: BTreeMap<String, CategoryFile>,
    /// Paths whose one-time backup decision has been made in this run.
    initialized: HashSet<PathBuf>,
}

impl TabularWriter {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            categories: BTreeMap::new(),
            initialized: HashSet::new(),
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Append one row to `category`, stamped with `step` and the current time.
    pub fn write<I, K, V>(&mut self, category: &str, fields: I, step: u64) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetricValue>,
    {
        let record = Record::now(step, fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self.write_record(category, &record)
    }

    /// Append a prepared record to `category`, migrating the schema first if
    /// the record has keys the file has not seen.
    pub fn write_record(&mut self, category: &str, record: &Record) -> Result<()> {
        validate_category(category)?;
        if !self.categories.get(category).is_some_and(CategoryFile::is_open) {
            let mut file = self.categories.remove(category).unwrap_or_else(|| {
                CategoryFile::new(category, self.config.category_path(category))
            });
            let opened = file.open(
                record,
                self.config.mode,
                &mut self.initialized,
                storage::backup_existing,
            );
            // A category that never opened successfully is not registered
            if opened.is_ok() || !file.columns.is_empty() {
                self.categories.insert(category.to_string(), file);
            }
            opened?;
        }
        let file = self
            .categories
            .get_mut(category)
            .ok_or_else(|| ScalarlogError::Other(format!("category {:?} is not open", category)))?;
        file.migrate_if_needed(record)?;
        file.append(record)
    }

    pub fn category(&self, name: &str) -> Option<&CategoryFile> {
        self.categories.get(name)
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryFile> {
        self.categories.values()
    }

    pub fn flush(&mut self) -> Result<()> {
        for file in self.categories.values_mut() {
            file.flush()?;
        }
        Ok(())
    }

    /// Flush and release every handle. Safe to call repeatedly; every
    /// handle is released even if one fails, and the first error is returned.
    pub fn close(&mut self) -> Result<()> {
        let mut first_err = None;
        for file in self.categories.values_mut() {
            if let Err(e) = file.close() {
                warn!(category = %file.name, "Failed to close log file: {}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
