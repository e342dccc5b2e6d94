use crate::config::RecipeConfig;
use crate::directive::RecipeExpander;
use crate::snapshot::{locate_latest_snapshot, RecipeOutputs};
use anyhow::{Context, Result};
use mdbook::book::{Book, BookItem};
use mdbook::preprocess::{Preprocessor, PreprocessorContext};

/// mdBook preprocessor expanding `{{#recipe <file> <name>}}` directives.
///
/// On each run the newest `recipes_out.arrow` snapshot below the configured
/// search root is loaded once, then every directive is replaced by the code
/// between `StartRecipe("<name>")` and `EndRecipe("<name>")` in `<file>`,
/// followed by the output captured for `<name>`.
///
/// ```toml
/// [preprocessor.recipe]
/// command = "mdbook-cookbook recipe"
/// search-root = ".."
/// ```
///
/// A directive naming a recipe without captured output fails the build.
pub struct RecipePreprocessor;

impl RecipePreprocessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RecipePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for RecipePreprocessor {
    fn name(&self) -> &str {
        "recipe"
    }

    fn run(&self, ctx: &PreprocessorContext, mut book: Book) -> Result<Book> {
        let config = RecipeConfig::from_preprocessor_context(ctx)?;

        let search_root = ctx.root.join(&config.search_root);
        let snapshot = locate_latest_snapshot(&search_root, &config.snapshot_name)?;
        log::info!("Located recipes file: {}", snapshot.display());

        let outputs = RecipeOutputs::load(&snapshot)
            .with_context(|| format!("Failed to load {}", snapshot.display()))?;

        let src_dir = ctx.root.join(&ctx.config.book.src);
        let expander = RecipeExpander::new(&outputs, &config, &src_dir);

        let mut failure = None;
        let mut expanded = 0usize;
        book.for_each_mut(|item| {
            if failure.is_some() {
                return;
            }
            let BookItem::Chapter(chapter) = item else {
                return;
            };
            let Some(chapter_path) = &chapter.path else {
                return;
            };

            let full_path = src_dir.join(chapter_path);
            let chapter_dir = full_path.parent().unwrap_or(src_dir.as_path()).to_path_buf();
            match expander.expand(&chapter.content, &chapter_dir) {
                Ok(content) => {
                    if content != chapter.content {
                        expanded += 1;
                        chapter.content = content;
                    }
                }
                Err(e) => {
                    failure = Some(anyhow::Error::new(e).context(format!(
                        "Failed to expand recipes in {}",
                        full_path.display()
                    )));
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }

        log::info!("Expanded recipes in {} chapter(s)", expanded);
        Ok(book)
    }

    fn supports_renderer(&self, renderer: &str) -> bool {
        renderer != "not-supported"
    }
}
