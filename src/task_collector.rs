use crate::checker::CompareFlags;
use crate::config::DoctestConfig;
use crate::execution::ExampleTask;
use crate::extractor::extract_examples;
use anyhow::Result;
use mdbook::book::{Book, BookItem};
use std::path::Path;
use std::sync::Arc;

/// Maximum size of a single example in bytes (1MB)
pub const MAX_EXAMPLE_SIZE: usize = 1_000_000;

/// Maximum number of examples per chapter
pub const MAX_EXAMPLES_PER_CHAPTER: usize = 1000;

/// Collects one task per testcode block in a configured language.
///
/// # Errors
///
/// Returns an error if:
/// - A chapter exceeds MAX_EXAMPLES_PER_CHAPTER
/// - An example exceeds MAX_EXAMPLE_SIZE
/// - A comparison flag is unknown
pub fn collect_example_tasks(
    book: &Book,
    src_dir: &Path,
    config: &DoctestConfig,
) -> Result<Vec<ExampleTask>> {
    let default_flags = CompareFlags::from_names(&config.default_flags)
        .map_err(|e| anyhow::anyhow!("Invalid default-flags: {}", e))?;

    let mut tasks = Vec::new();
    let mut collection_errors = Vec::new();

    for item in book.iter() {
        let BookItem::Chapter(chapter) = item else {
            continue;
        };
        let Some(chapter_path) = &chapter.path else {
            continue;
        };
        let full_path = Arc::new(src_dir.join(chapter_path));

        log::debug!("Collecting examples from chapter: {}", chapter.name);

        let examples: Vec<_> = extract_examples(&chapter.content)
            .into_iter()
            .filter(|example| config.fence_markers.contains(&example.language))
            .collect();

        if examples.len() > MAX_EXAMPLES_PER_CHAPTER {
            collection_errors.push(format!(
                "Chapter {} has {} examples, exceeding limit of {}",
                full_path.display(),
                examples.len(),
                MAX_EXAMPLES_PER_CHAPTER
            ));
            continue;
        }

        for (i, example) in examples.into_iter().enumerate() {
            if example.code.len() > MAX_EXAMPLE_SIZE {
                collection_errors.push(format!(
                    "Example #{} in {} exceeds size limit of {} bytes ({} bytes)",
                    i,
                    full_path.display(),
                    MAX_EXAMPLE_SIZE,
                    example.code.len()
                ));
                continue;
            }

            let mut flags = default_flags;
            if let Some(expected) = &example.expected {
                for toggle in &expected.flags {
                    if let Err(e) = flags.apply(toggle) {
                        collection_errors.push(format!(
                            "Example #{} in {} (line {}): {}",
                            i,
                            full_path.display(),
                            example.line,
                            e
                        ));
                    }
                }
            }

            tasks.push(ExampleTask::new(full_path.clone(), i, example, flags));
        }
    }

    if !collection_errors.is_empty() {
        for error in &collection_errors {
            log::error!("{}", error);
        }
        anyhow::bail!(
            "Failed to collect examples due to {} error(s)",
            collection_errors.len()
        );
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdbook::book::Chapter;
    use std::path::PathBuf;

    fn book(chapters: &[(&str, &str)]) -> Book {
        let mut book = Book::new();
        for (path, content) in chapters {
            book.push_item(Chapter::new(
                path,
                content.to_string(),
                PathBuf::from(path),
                Vec::new(),
            ));
        }
        book
    }

    #[test]
    fn test_collects_only_configured_languages() {
        let book = book(&[
            (
                "io.md",
                "```java,testcode\na();\n```\n\n```python,testcode\nb()\n```\n",
            ),
            ("data.md", "```java,testcode\nc();\n```\n"),
            ("empty.md", "No examples here."),
        ]);

        let tasks = collect_example_tasks(&book, Path::new("src"), &DoctestConfig::default())
            .unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_unknown_flag_fails_collection() {
        let book = book(&[(
            "io.md",
            "```java,testcode\na();\n```\n\n```text,testoutput,+FUZZY\nx\n```\n",
        )]);

        let err = collect_example_tasks(&book, Path::new("src"), &DoctestConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("1 error(s)"));
    }

    #[test]
    fn test_tasks_are_debuggable() {
        let book = book(&[("io.md", "```java,testcode\na();\n```\n")]);
        let tasks = collect_example_tasks(&book, Path::new("src"), &DoctestConfig::default())
            .unwrap();
        let debug = format!("{:?}", tasks);
        assert!(debug.contains("io.md"));
        assert!(debug.contains("a();"));
    }

    #[test]
    fn test_invalid_default_flags() {
        let config = DoctestConfig {
            default_flags: vec!["SLOPPY".to_string()],
            ..DoctestConfig::default()
        };
        assert!(collect_example_tasks(&Book::new(), Path::new("src"), &config).is_err());
    }
}
