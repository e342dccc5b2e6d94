use crate::approval::ApprovalStore;
use crate::config::DoctestConfig;
use crate::execution::{run_tasks, ExampleRunner};
use crate::program::ProgramTemplate;
use crate::reporting::{print_statistics, report_approval_error, report_failures, write_report};
use crate::scrub::NoiseFilter;
use crate::task_collector::collect_example_tasks;
use crate::toolchain::Toolchain;
use anyhow::{Context, Result};
use mdbook::book::Book;
use mdbook::preprocess::{Preprocessor, PreprocessorContext};

/// mdBook preprocessor that runs `testcode` blocks through an external
/// toolchain and compares their output with the following `testoutput` block.
///
/// # Overview
///
/// Every fenced block tagged `testcode` in one of the configured languages is
/// wrapped into a program (unless it already is one), built and run inside a
/// scratch copy of a template project, and its scrubbed stdout is compared
/// with the paired `testoutput` block using doctest comparison flags.
/// The book itself is passed through unchanged.
///
/// # Example
///
/// ```toml
/// [preprocessor.doctest]
/// command = "mdbook-cookbook doctest"
/// template = "java/source/demo"
/// version = "${ARROW_VERSION}"
/// jobs = 4
/// ```
///
/// # Security
///
/// The commands run come from `book.toml`, so the preprocessor refuses to
/// run until that exact file has been approved with `mdbook-cookbook allow`.
pub struct DoctestPreprocessor {
    skip_approval: bool,
}

impl DoctestPreprocessor {
    pub fn new() -> Self {
        Self {
            skip_approval: false,
        }
    }

    /// Creates a preprocessor that skips the approval check.
    pub fn new_for_testing() -> Self {
        Self {
            skip_approval: true,
        }
    }

    pub async fn run_async(&self, ctx: &PreprocessorContext, book: Book) -> Result<Book> {
        let book_toml_path = ctx.root.join("book.toml");
        if !self.skip_approval && !ApprovalStore::open()?.is_approved(&book_toml_path)? {
            report_approval_error(&book_toml_path);
            anyhow::bail!("book.toml not approved");
        }

        let config = DoctestConfig::from_preprocessor_context(ctx)?;
        let toolchain = Toolchain::new(&config, &ctx.root);
        log::info!(
            "Running doctests in {:?} mode against version {}",
            toolchain.mode(),
            toolchain.version()
        );

        let src_dir = ctx.root.join(&ctx.config.book.src);
        let tasks = collect_example_tasks(&book, &src_dir, &config)?;
        if tasks.is_empty() {
            log::info!("No doctests found");
            return Ok(book);
        }
        log::info!("Collected {} doctest(s)", tasks.len());

        let classpath = toolchain
            .resolve_classpath()
            .await
            .context("Failed to prepare the toolchain")?;
        let runner = ExampleRunner::new(
            toolchain,
            classpath,
            ProgramTemplate::from_config(&config)?,
            NoiseFilter::from_config(&config),
        );

        let (outcomes, wall_time) = run_tasks(tasks, &runner, config.concurrency())
            .await
            .context("Doctest run aborted")?;

        if let Some(report) = &config.report {
            write_report(&ctx.root.join(report), &outcomes)?;
        }

        let failed: Vec<_> = outcomes.iter().filter(|o| !o.success()).collect();
        if !failed.is_empty() {
            report_failures(&failed)?;
        }

        print_statistics(&outcomes, wall_time);
        Ok(book)
    }
}

impl Default for DoctestPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for DoctestPreprocessor {
    fn name(&self) -> &str {
        "doctest"
    }

    fn run(&self, ctx: &PreprocessorContext, book: Book) -> Result<Book> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start the async runtime")?;
        runtime.block_on(self.run_async(ctx, book))
    }

    fn supports_renderer(&self, renderer: &str) -> bool {
        renderer != "not-supported"
    }
}
