//! Common test utilities for integration tests
//!
//! Shared fixtures and helpers used across integration tests. These
//! utilities are not compiled into the library.

use anyhow::Result;
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_ipc::writer::StreamWriter;
use arrow_schema::{DataType, Field, Schema};
use mdbook::book::Book;
use mdbook::preprocess::{CmdPreprocessor, Preprocessor, PreprocessorContext};
use mdbook::MDBook;
use mdbook_cookbook::{DoctestPreprocessor, RecipePreprocessor, NAME_COLUMN, OUTPUT_COLUMN};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Isolated test fixture with automatic cleanup
///
/// Creates a temporary copy of a test fixture book, allowing tests to run
/// in parallel without interfering with each other.
pub struct TestFixture {
    _book_dir: TempDir,
    book_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture from a specific source directory
    pub fn new(source: impl AsRef<Path>) -> Result<Self> {
        let book_dir = TempDir::new()?;
        copy_dir_all(source.as_ref(), book_dir.path())?;

        Ok(Self {
            book_path: book_dir.path().to_path_buf(),
            _book_dir: book_dir,
        })
    }

    /// Get the path to the book directory
    pub fn book_path(&self) -> &Path {
        &self.book_path
    }

    /// Overwrite (or create) a file inside the fixture
    pub fn write(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.book_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write a `recipes_out.arrow` snapshot at `relative`, `age` in the past
    pub fn write_snapshot(
        &self,
        relative: &str,
        rows: &[(&str, &str)],
        age: Duration,
    ) -> Result<()> {
        let path = self.book_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let schema = Arc::new(Schema::new(vec![
            Field::new(NAME_COLUMN, DataType::Utf8, false),
            Field::new(OUTPUT_COLUMN, DataType::Utf8, false),
        ]));
        let names: ArrayRef = Arc::new(StringArray::from_iter_values(
            rows.iter().map(|(name, _)| *name),
        ));
        let outputs: ArrayRef = Arc::new(StringArray::from_iter_values(
            rows.iter().map(|(_, output)| *output),
        ));
        let batch = RecordBatch::try_new(schema.clone(), vec![names, outputs])?;

        let file = File::create(&path)?;
        let mut writer = StreamWriter::try_new(file, &schema)?;
        writer.write(&batch)?;
        writer.finish()?;

        let file = File::options().write(true).open(&path)?;
        file.set_modified(SystemTime::now() - age)?;
        Ok(())
    }
}

/// Helper to run a preprocessor on a test book
///
/// Wraps an MDBook instance and simulates how mdBook would invoke the
/// preprocessor.
pub struct PreprocessorTest {
    book: MDBook,
}

impl PreprocessorTest {
    /// Create a preprocessor test from a fixture
    pub fn from_fixture(fixture: &TestFixture) -> Result<Self> {
        let book = MDBook::load(fixture.book_path())?;
        Ok(Self { book })
    }

    /// The context and book exactly as mdBook would send them on stdin
    pub fn input(&self) -> Result<(PreprocessorContext, Book)> {
        let input_json = serde_json::json!([
            {
                "root": self.book.root,
                "config": self.book.config,
                "renderer": "html",
                "mdbook_version": mdbook::MDBOOK_VERSION,
            },
            self.book.book
        ]);

        let input_str = serde_json::to_string(&input_json)?;
        Ok(CmdPreprocessor::parse_input(input_str.as_bytes())?)
    }

    /// Run the recipe preprocessor on the test book
    pub fn run_recipe(&self) -> Result<Book> {
        let (ctx, book) = self.input()?;
        RecipePreprocessor::new().run(&ctx, book)
    }

    /// Run the doctest preprocessor on the test book
    ///
    /// Uses `DoctestPreprocessor::new_for_testing()` to bypass approval
    /// checks, allowing tests to run without manual approval.
    pub async fn run_doctest(&self) -> Result<Book> {
        let (ctx, book) = self.input()?;
        DoctestPreprocessor::new_for_testing()
            .run_async(&ctx, book)
            .await
    }
}

/// Content of the chapter whose source path ends with `suffix`
pub fn chapter_content(book: &Book, suffix: &str) -> Option<String> {
    book.iter().find_map(|item| match item {
        mdbook::book::BookItem::Chapter(ch)
            if ch.path.as_ref().is_some_and(|p| p.ends_with(suffix)) =>
        {
            Some(ch.content.clone())
        }
        _ => None,
    })
}

/// Recursively copy all files and directories from src to dst
fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    std::fs::create_dir_all(&dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            copy_dir_all(entry.path(), dst.as_ref().join(entry.file_name()))?;
        } else {
            std::fs::copy(entry.path(), dst.as_ref().join(entry.file_name()))?;
        }
    }
    Ok(())
}
