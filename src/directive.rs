use crate::config::RecipeConfig;
use crate::error::{CookbookError, Result};
use crate::include::{read_literal, IncludeOptions};
use crate::snapshot::RecipeOutputs;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};

/// A parsed `{{#recipe <file> <name> [options]}}` directive.
///
/// ```markdown
/// {{#recipe ../code/basic_arrow.cc ReturnNotOk}}
/// {{#recipe /code/flight.cc ListFlights dedent lines=2- caption="Listing flights"}}
/// ```
///
/// Options are those of [`IncludeOptions`]; `start-after` and `end-before`
/// are always replaced by the recipe markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDirective {
    pub file: String,
    pub name: String,
    pub options: IncludeOptions,
}

impl RecipeDirective {
    pub fn parse(args: &str) -> Result<Self, String> {
        let mut tokens = tokenize(args)?.into_iter();
        let (Some(file), Some(name)) = (tokens.next(), tokens.next()) else {
            return Err("expected a source file and a recipe name".to_string());
        };

        let mut options = IncludeOptions::default();
        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) => options.set(key, Some(value))?,
                None => options.set(&token, None)?,
            }
        }
        options.start_after = Some(format!("StartRecipe(\"{}\")", name));
        options.end_before = Some(format!("EndRecipe(\"{}\")", name));

        Ok(Self {
            file,
            name,
            options,
        })
    }
}

/// Splits on whitespace, keeping double-quoted runs together.
fn tokenize(args: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;

    for ch in args.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if in_quotes {
        return Err(format!("unterminated quote in {:?}", args));
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Expands `{{#recipe}}` directives in chapter content.
///
/// Borrows the outputs loaded for this build; nothing is mutated while
/// chapters are expanded.
pub struct RecipeExpander<'a> {
    pattern: Regex,
    outputs: &'a RecipeOutputs,
    config: &'a RecipeConfig,
    src_dir: &'a Path,
}

impl<'a> RecipeExpander<'a> {
    pub fn new(outputs: &'a RecipeOutputs, config: &'a RecipeConfig, src_dir: &'a Path) -> Self {
        Self {
            pattern: Regex::new(r"(?s)(\\)?\{\{#recipe\s+(.*?)\}\}")
                .expect("directive pattern is valid"),
            outputs,
            config,
            src_dir,
        }
    }

    /// Replaces every directive in `content`. Relative file arguments resolve
    /// against `chapter_dir`, absolute ones against the book source directory.
    pub fn expand(&self, content: &str, chapter_dir: &Path) -> Result<String> {
        let mut out = String::with_capacity(content.len());
        let mut last = 0;

        for caps in self.pattern.captures_iter(content) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&content[last..whole.start()]);
            last = whole.end();

            if caps.get(1).is_some() {
                // escaped: drop the backslash, keep the directive text
                out.push_str(&whole.as_str()[1..]);
                continue;
            }
            out.push_str(&self.render(&caps, chapter_dir)?);
        }

        out.push_str(&content[last..]);
        Ok(out)
    }

    fn render(&self, caps: &Captures<'_>, chapter_dir: &Path) -> Result<String> {
        let args = &caps[2];
        let directive = RecipeDirective::parse(args).map_err(|reason| {
            CookbookError::include(args.split_whitespace().next().unwrap_or(args), reason)
        })?;

        let output = self
            .outputs
            .get(&directive.name)
            .ok_or_else(|| CookbookError::MissingRecipe {
                file: PathBuf::from(&directive.file),
                name: directive.name.clone(),
            })?;

        let path = self.resolve(&directive.file, chapter_dir);
        let excerpt = read_literal(&path, &directive.options)?;
        let language = directive
            .options
            .language
            .as_deref()
            .unwrap_or(&self.config.language);

        log::debug!("Rendering recipe {} from {}", directive.name, path.display());
        Ok(render_recipe(
            &excerpt,
            language,
            &directive.options,
            output,
            &self.config.caption,
        ))
    }

    fn resolve(&self, file: &str, chapter_dir: &Path) -> PathBuf {
        match file.strip_prefix('/') {
            Some(from_src) => self.src_dir.join(from_src),
            None => chapter_dir.join(file),
        }
    }
}

/// Code excerpt followed by its captured output, grouped in one wrapper.
fn render_recipe(
    excerpt: &str,
    language: &str,
    options: &IncludeOptions,
    output: &str,
    output_caption: &str,
) -> String {
    let mut html = opening_div(options);

    if let Some(caption) = &options.caption {
        html.push_str(&caption_div(caption));
        html.push_str("\n\n");
    }
    push_fenced(&mut html, language, excerpt);

    html.push_str("<div class=\"recipe-output literal-block-wrapper\">\n");
    html.push_str(&caption_div(output_caption));
    html.push_str("\n\n");
    push_fenced(&mut html, "text", output);
    html.push_str("</div>\n</div>\n");
    html
}

/// The wrapper carries line numbering and emphasis hints for themes that style them.
fn opening_div(options: &IncludeOptions) -> String {
    let mut html = String::from("<div class=\"recipe");
    if let Some(class) = &options.class {
        html.push(' ');
        html.push_str(&escape_html(class));
    }
    html.push('"');
    if options.linenos {
        html.push_str(" data-linenos=\"true\"");
    }
    if let Some(start) = options.lineno_start {
        html.push_str(&format!(" data-lineno-start=\"{}\"", start));
    }
    if let Some(lines) = &options.emphasize_lines {
        html.push_str(&format!(" data-emphasize-lines=\"{}\"", escape_html(lines)));
    }
    html.push_str(">\n\n");
    html
}

fn caption_div(caption: &str) -> String {
    format!(
        "<div class=\"code-block-caption\"><span class=\"caption-text\">{}</span></div>",
        escape_html(caption)
    )
}

/// The fence is always longer than any backtick run inside `body`.
fn push_fenced(out: &mut String, language: &str, body: &str) {
    let longest_run = body
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);

    out.push_str(&fence);
    out.push_str(language);
    out.push('\n');
    let body = body.trim_end_matches('\n');
    if !body.is_empty() {
        out.push_str(body);
        out.push('\n');
    }
    out.push_str(&fence);
    out.push_str("\n\n");
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}
