use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions that abort a book build.
///
/// Comparison failures are not errors: they are collected as
/// [`crate::execution::ExampleOutcome`]s and reported together.
#[derive(Debug, Error)]
pub enum CookbookError {
    #[error(
        "Could not find any {file_name} files in {}. Have you run the recipe tests?",
        root.display()
    )]
    MissingSnapshot { root: PathBuf, file_name: String },

    #[error("Invalid recipe snapshot {}: {reason}", path.display())]
    InvalidSnapshot { path: PathBuf, reason: String },

    #[error("Could not locate recipe output for the recipe {}:{name}", file.display())]
    MissingRecipe { file: PathBuf, name: String },

    #[error("Cannot include {}: {reason}", file.display())]
    Include { file: PathBuf, reason: String },

    #[error("Toolchain setup failed: {0}")]
    ToolchainSetup(String),

    #[error("`{command}` failed:\n{detail}")]
    Execution { command: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),
}

impl CookbookError {
    pub(crate) fn include(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CookbookError::Include {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = CookbookError> = std::result::Result<T, E>;
