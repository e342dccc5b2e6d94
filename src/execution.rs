use crate::checker::{check_output, CompareFlags};
use crate::config::RunMode;
use crate::error::Result;
use crate::extractor::DocExample;
use crate::program::ProgramTemplate;
use crate::scrub::NoiseFilter;
use crate::toolchain::Toolchain;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One testcode block, ready to run independently of every other.
#[derive(Debug)]
pub struct ExampleTask {
    chapter_path: Arc<PathBuf>,
    index: usize,
    example: DocExample,
    flags: CompareFlags,
}

impl ExampleTask {
    pub fn new(
        chapter_path: Arc<PathBuf>,
        index: usize,
        example: DocExample,
        flags: CompareFlags,
    ) -> Self {
        Self {
            chapter_path,
            index,
            example,
            flags,
        }
    }

    /// Runs the example and compares its cleaned output.
    ///
    /// # Errors
    ///
    /// Toolchain and execution failures are fatal and returned as errors;
    /// an output mismatch is a [`Verdict::Failed`] outcome.
    pub async fn run(self, runner: &ExampleRunner) -> Result<ExampleOutcome> {
        log::debug!(
            "Running example #{} of {}",
            self.index,
            self.chapter_path.display()
        );

        let start = Instant::now();
        let source = match runner.toolchain.mode() {
            RunMode::Project => runner.template.synthesize(&self.example.code),
            RunMode::Shell => self.example.code.clone(),
        };
        let raw = runner.toolchain.run(&source, &runner.classpath).await?;
        let got = runner.filter.clean(&raw);

        let verdict = match &self.example.expected {
            None => Verdict::Ran,
            Some(expected) if check_output(&expected.text, &got, self.flags) => Verdict::Passed,
            Some(expected) => Verdict::Failed {
                expected: expected.text.trim_end_matches('\n').to_string(),
                got,
            },
        };

        Ok(ExampleOutcome {
            chapter_path: self.chapter_path,
            index: self.index,
            line: self.example.line,
            code: self.example.code,
            verdict,
            duration: start.elapsed(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Output matched the testoutput block
    Passed,
    /// No testoutput block; the example only had to run
    Ran,
    Failed { expected: String, got: String },
}

/// Result of running a single example.
#[derive(Debug)]
pub struct ExampleOutcome {
    chapter_path: Arc<PathBuf>,
    index: usize,
    line: usize,
    code: String,
    verdict: Verdict,
    duration: Duration,
}

impl ExampleOutcome {
    pub fn success(&self) -> bool {
        !matches!(self.verdict, Verdict::Failed { .. })
    }

    pub fn chapter_path(&self) -> &Path {
        &self.chapter_path
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[cfg(test)]
impl ExampleOutcome {
    pub(crate) fn fixture(chapter: &str, index: usize, code: &str, verdict: Verdict) -> Self {
        Self {
            chapter_path: Arc::new(PathBuf::from(chapter)),
            index,
            line: index + 1,
            code: code.to_string(),
            verdict,
            duration: Duration::from_millis(5),
        }
    }
}

/// What every example shares: the toolchain, the resolved classpath and the
/// program and output rules. Read-only while examples run.
pub struct ExampleRunner {
    toolchain: Toolchain,
    classpath: String,
    template: ProgramTemplate,
    filter: NoiseFilter,
}

impl ExampleRunner {
    pub fn new(
        toolchain: Toolchain,
        classpath: String,
        template: ProgramTemplate,
        filter: NoiseFilter,
    ) -> Self {
        Self {
            toolchain,
            classpath,
            template,
            filter,
        }
    }
}

/// Runs all tasks with at most `jobs` in flight, keeping document order.
///
/// Stops at the first fatal error. Returns the outcomes and the wall time.
pub async fn run_tasks(
    tasks: Vec<ExampleTask>,
    runner: &ExampleRunner,
    jobs: usize,
) -> Result<(Vec<ExampleOutcome>, Duration)> {
    let start = Instant::now();
    let outcomes = stream::iter(tasks)
        .map(|task| task.run(runner))
        .buffered(jobs.max(1))
        .try_collect()
        .await?;
    Ok((outcomes, start.elapsed()))
}
