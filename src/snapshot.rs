//! Recipe output snapshots.
//!
//! The recipe test run writes an Arrow IPC stream with two string columns,
//! `Recipe Name` and `Recipe Output`. The most recently written snapshot under
//! the search root is loaded once per build into a [`RecipeOutputs`] map that
//! every `{{#recipe}}` expansion then borrows.

use crate::error::{CookbookError, Result};
use arrow_array::cast::AsArray;
use arrow_array::{Array, RecordBatch};
use arrow_ipc::reader::StreamReader;
use arrow_schema::{DataType, Schema};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

pub const NAME_COLUMN: &str = "Recipe Name";
pub const OUTPUT_COLUMN: &str = "Recipe Output";

/// Finds the newest file called `file_name` anywhere below `root`.
///
/// Every candidate is logged with its modification time. Equal timestamps
/// are broken by path order, the lexicographically greatest path wins.
///
/// # Errors
///
/// [`CookbookError::MissingSnapshot`] when no candidate exists.
pub fn locate_latest_snapshot(root: &Path, file_name: &str) -> Result<PathBuf> {
    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping unreadable entry while searching {}: {}", root.display(), e);
                continue;
            }
        };
        // symlinked snapshots count, dangling links do not
        if entry.file_name() != file_name || !entry.path().is_file() {
            continue;
        }

        let modified = std::fs::metadata(entry.path())?.modified()?;
        log::info!(
            "Considering recipe file {} last updated at {}",
            entry.path().display(),
            DateTime::<Local>::from(modified).format("%Y-%m-%d %H:%M:%S%.3f")
        );
        candidates.push((modified, entry.into_path()));
    }

    candidates
        .into_iter()
        .max()
        .map(|(_, path)| path)
        .ok_or_else(|| CookbookError::MissingSnapshot {
            root: root.to_path_buf(),
            file_name: file_name.to_string(),
        })
}

/// Captured recipe outputs keyed by recipe name.
///
/// Built once per book build and never mutated after loading.
#[derive(Debug, Clone, Default)]
pub struct RecipeOutputs {
    outputs: HashMap<String, String>,
}

impl RecipeOutputs {
    /// Reads every record batch of the snapshot at `path`.
    ///
    /// Names are expected to be unique; if one repeats, the last row wins.
    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |reason: String| CookbookError::InvalidSnapshot {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path)?;
        let reader = StreamReader::try_new(file, None)?;
        check_schema(&reader.schema()).map_err(invalid)?;

        let mut outputs = Self::default();
        for batch in reader {
            let batch = batch?;
            outputs.extend_from_batch(&batch).map_err(invalid)?;
        }

        log::debug!("Loaded {} recipe output(s) from {}", outputs.len(), path.display());
        Ok(outputs)
    }

    fn extend_from_batch(&mut self, batch: &RecordBatch) -> Result<(), String> {
        let names = string_column(batch, NAME_COLUMN)?;
        let outputs = string_column(batch, OUTPUT_COLUMN)?;

        for (row, (name, output)) in names.into_iter().zip(outputs).enumerate() {
            let name = name.ok_or_else(|| format!("row {} has a null recipe name", row))?;
            self.insert(name, output.unwrap_or_default());
        }
        Ok(())
    }

    pub fn insert(&mut self, name: impl Into<String>, output: impl Into<String>) {
        self.outputs.insert(name.into(), output.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl<N: Into<String>, O: Into<String>> FromIterator<(N, O)> for RecipeOutputs {
    fn from_iter<I: IntoIterator<Item = (N, O)>>(iter: I) -> Self {
        let mut outputs = Self::default();
        for (name, output) in iter {
            outputs.insert(name, output);
        }
        outputs
    }
}

fn check_schema(schema: &Schema) -> Result<(), String> {
    for column in [NAME_COLUMN, OUTPUT_COLUMN] {
        let field = schema
            .field_with_name(column)
            .map_err(|_| format!("missing column '{}'", column))?;
        if !matches!(field.data_type(), DataType::Utf8 | DataType::LargeUtf8) {
            return Err(format!(
                "column '{}' has type {}, expected a string column",
                column,
                field.data_type()
            ));
        }
    }
    Ok(())
}

fn string_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>, String> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| format!("missing column '{}'", name))?;

    let values: Vec<Option<String>> = if let Some(array) = column.as_string_opt::<i32>() {
        array.iter().map(|v| v.map(str::to_string)).collect()
    } else if let Some(array) = column.as_string_opt::<i64>() {
        array.iter().map(|v| v.map(str::to_string)).collect()
    } else {
        return Err(format!(
            "column '{}' has type {}, expected a string column",
            name,
            column.data_type()
        ));
    };

    Ok(values)
}
