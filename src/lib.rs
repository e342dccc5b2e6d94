//! mdbook-cookbook library
//!
//! Two mdBook preprocessors for cookbook-style books:
//!
//! - [`RecipePreprocessor`] expands `{{#recipe <file> <name>}}` directives
//!   into the marked region of a source file followed by the output captured
//!   for that recipe in the newest `recipes_out.arrow` snapshot.
//! - [`DoctestPreprocessor`] runs `testcode` blocks through an external
//!   build tool or shell and compares their output with `testoutput` blocks.
//!
//! The primary interface is the `mdbook-cookbook` binary; the library is
//! exposed for testing and custom integrations.

mod approval;
mod checker;
mod config;
mod directive;
mod doctest;
mod error;
mod execution;
mod extractor;
mod include;
mod program;
mod recipe;
mod reporting;
mod scrub;
mod snapshot;
mod task_collector;
mod toolchain;

pub use approval::{compute_hash, ApprovalStore};
pub use checker::{check_output, CompareFlags};
pub use config::{DoctestConfig, RecipeConfig, RunMode};
pub use directive::{RecipeDirective, RecipeExpander};
pub use doctest::DoctestPreprocessor;
pub use error::{CookbookError, Result};
pub use extractor::{extract_examples, DocExample, ExpectedOutput};
pub use include::{Dedent, IncludeOptions};
pub use program::ProgramTemplate;
pub use recipe::RecipePreprocessor;
pub use scrub::NoiseFilter;
pub use snapshot::{locate_latest_snapshot, RecipeOutputs, NAME_COLUMN, OUTPUT_COLUMN};
