use crate::execution::{ExampleOutcome, Verdict};
use anyhow::{Context, Result};
use chrono::Local;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// One stderr line in mdBook's own log format.
fn log_line(level: &str, message: &str) -> String {
    format!(
        "{} [{}] (mdbook_cookbook): {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        level,
        message
    )
}

fn error_lines(text: &str) {
    for line in text.lines() {
        eprintln!("{}", log_line("ERROR", line));
    }
}

/// Reports the approval error to stderr with mdBook-style formatting.
pub fn report_approval_error(book_toml_path: &Path) {
    error_lines(&format!(
        "book.toml not approved for running doctests\n\
         \n\
         The doctest preprocessor runs the build commands named in book.toml,\n\
         so each book.toml must be approved after review:\n\
         \x20 mdbook-cookbook allow {}\n\
         \n\
         Approval is tied to the exact content; edit the file and it must be approved again.",
        book_toml_path.display()
    ));
}

/// Doctest-style description of one failed example.
pub fn format_failure(outcome: &ExampleOutcome) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "File \"{}\", line {}, in example #{}",
        outcome.chapter_path().display(),
        outcome.line(),
        outcome.index()
    );
    text.push_str("Failed example:\n");
    indent_into(&mut text, outcome.code());

    if let Verdict::Failed { expected, got } = outcome.verdict() {
        text.push_str("Expected:\n");
        indent_into(&mut text, expected);
        if got.is_empty() {
            text.push_str("Got nothing\n");
        } else {
            text.push_str("Got:\n");
            indent_into(&mut text, got);
        }
    }
    text
}

fn indent_into(text: &mut String, block: &str) {
    for line in block.trim_end_matches('\n').lines() {
        let _ = writeln!(text, "    {}", line);
    }
}

/// Reports output mismatches to stderr with mdBook-style formatting.
///
/// # Errors
///
/// Always returns an error after printing, to stop the build.
pub fn report_failures(failed: &[&ExampleOutcome]) -> Result<()> {
    for outcome in failed {
        error_lines("Doctest failed");
        error_lines(&format_failure(outcome));
        eprintln!("{}", log_line("ERROR", ""));
    }

    let files: BTreeSet<_> = failed.iter().map(|o| o.chapter_path()).collect();
    eprintln!(
        "{}",
        log_line("ERROR", "Doctests failed in the following files:")
    );
    for file in files {
        eprintln!("{}", log_line("ERROR", &format!("  {}", file.display())));
    }

    anyhow::bail!("{} doctest(s) failed", failed.len());
}

/// Prints run statistics to stderr.
///
/// Per-example timings are logged at debug level (RUST_LOG=debug).
pub fn print_statistics(outcomes: &[ExampleOutcome], wall_time: Duration) {
    let compared = outcomes
        .iter()
        .filter(|o| o.verdict() == &Verdict::Passed)
        .count();
    let ran = outcomes
        .iter()
        .filter(|o| o.verdict() == &Verdict::Ran)
        .count();

    let sum: Duration = outcomes.iter().map(|o| o.duration()).sum();
    let avg_ms = if outcomes.is_empty() {
        0
    } else {
        sum.as_millis() / outcomes.len() as u128
    };

    eprintln!(
        "{}",
        log_line(
            "INFO",
            &format!(
                "{} doctest(s) passed ({} with checked output, {} run only)",
                compared + ran,
                compared,
                ran
            )
        )
    );
    eprintln!(
        "{}",
        log_line(
            "INFO",
            &format!(
                "Doctests finished in {}ms (avg {}ms per example)",
                wall_time.as_millis(),
                avg_ms
            )
        )
    );

    for outcome in outcomes {
        log::debug!(
            "[DOCTEST_TIME] {} example #{}: {}ms",
            outcome.chapter_path().display(),
            outcome.index(),
            outcome.duration().as_millis()
        );
    }
}

/// Writes a plain-text summary of the run to `path`.
pub fn write_report(path: &Path, outcomes: &[ExampleOutcome]) -> Result<()> {
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.success()).collect();

    let mut text = String::new();
    let _ = writeln!(
        text,
        "Results of doctest run on {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    text.push_str("==================================\n\n");

    let mut chapters: Vec<&Path> = outcomes.iter().map(|o| o.chapter_path()).collect();
    chapters.dedup();
    for chapter in chapters {
        let in_chapter: Vec<_> = outcomes
            .iter()
            .filter(|o| o.chapter_path() == chapter)
            .collect();
        let failures = in_chapter.iter().filter(|o| !o.success()).count();
        let _ = writeln!(
            text,
            "Document: {}\n{} example(s), {} failure(s)",
            chapter.display(),
            in_chapter.len(),
            failures
        );
    }

    text.push('\n');
    for outcome in &failed {
        text.push_str(&format_failure(outcome));
        text.push('\n');
    }

    let _ = writeln!(
        text,
        "Doctest summary\n===============\n{:5} test(s)\n{:5} failure(s)",
        outcomes.len(),
        failed.len()
    );

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write doctest report {}", path.display()))?;
    log::info!("Doctest report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn failed() -> ExampleOutcome {
        ExampleOutcome::fixture(
            "src/data.md",
            2,
            "System.out.println(vector);\n",
            Verdict::Failed {
                expected: "[1, 2, 3]".to_string(),
                got: "[1, 2]\n[3]".to_string(),
            },
        )
    }

    #[test]
    fn test_format_failure() {
        assert_eq!(
            format_failure(&failed()),
            "File \"src/data.md\", line 3, in example #2\n\
             Failed example:\n\
             \x20   System.out.println(vector);\n\
             Expected:\n\
             \x20   [1, 2, 3]\n\
             Got:\n\
             \x20   [1, 2]\n\
             \x20   [3]\n"
        );
    }

    #[test]
    fn test_format_failure_without_output() {
        let outcome = ExampleOutcome::fixture(
            "src/io.md",
            0,
            "x();",
            Verdict::Failed {
                expected: "1".to_string(),
                got: String::new(),
            },
        );
        assert!(format_failure(&outcome).ends_with("Got nothing\n"));
    }

    #[test]
    fn test_report_failures_always_errors() {
        let outcome = failed();
        let err = report_failures(&[&outcome]).unwrap_err();
        assert_eq!(err.to_string(), "1 doctest(s) failed");
    }

    #[test]
    fn test_write_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doctest/output.txt");
        let outcomes = vec![
            ExampleOutcome::fixture("src/data.md", 0, "a();", Verdict::Passed),
            ExampleOutcome::fixture("src/data.md", 1, "b();", Verdict::Ran),
            failed(),
            ExampleOutcome::fixture("src/io.md", 0, "c();", Verdict::Passed),
        ];

        write_report(&path, &outcomes).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Document: src/data.md\n3 example(s), 1 failure(s)"));
        assert!(text.contains("Document: src/io.md\n1 example(s), 0 failure(s)"));
        assert!(text.contains("Failed example:\n    System.out.println(vector);"));
        assert!(text.ends_with("    4 test(s)\n    1 failure(s)\n"));
    }
}
