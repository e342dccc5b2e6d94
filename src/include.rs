//! Literal file inclusion with marker, line and indentation filters.
//!
//! Filters run in a fixed order: tab expansion, `start-after`, `end-before`,
//! `lines`, `dedent`, `prepend`, `append`. Line numbers in a `lines` spec
//! therefore count from the first line after the start marker.

use crate::error::{CookbookError, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dedent {
    /// Remove the indentation shared by every non-blank line
    Auto,
    /// Remove at most this many leading whitespace characters per line
    Columns(usize),
}

/// Options accepted by a literal include.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeOptions {
    pub start_after: Option<String>,
    pub end_before: Option<String>,
    pub lines: Option<String>,
    pub dedent: Option<Dedent>,
    pub prepend: Option<String>,
    pub append: Option<String>,
    pub tab_width: Option<usize>,
    pub language: Option<String>,
    pub caption: Option<String>,
    /// Presentation hints, carried into the rendered block
    pub emphasize_lines: Option<String>,
    pub linenos: bool,
    pub lineno_start: Option<usize>,
    pub class: Option<String>,
}

impl IncludeOptions {
    /// Applies one `key=value` (or bare `key`) option.
    pub fn set(&mut self, key: &str, value: Option<&str>) -> Result<(), String> {
        let required = || value.map(str::to_string).ok_or_else(|| format!("option '{}' needs a value", key));
        let number = |v: &str| {
            v.parse::<usize>()
                .map_err(|_| format!("option '{}' expects a number, got '{}'", key, v))
        };

        match key {
            "start-after" => self.start_after = Some(required()?),
            "end-before" => self.end_before = Some(required()?),
            "lines" => self.lines = Some(required()?),
            "prepend" => self.prepend = Some(required()?),
            "append" => self.append = Some(required()?),
            "language" => self.language = Some(required()?),
            "caption" => self.caption = Some(required()?),
            "tab-width" => self.tab_width = Some(number(required()?.as_str())?),
            "dedent" => {
                self.dedent = Some(match value {
                    None | Some("") => Dedent::Auto,
                    Some(v) => Dedent::Columns(number(v)?),
                })
            }
            "emphasize-lines" => self.emphasize_lines = Some(required()?),
            "linenos" | "lineno-match" => self.linenos = true,
            "lineno-start" => {
                self.lineno_start = Some(number(required()?.as_str())?);
                self.linenos = true;
            }
            "class" => self.class = Some(required()?),
            // the extent always comes from the recipe markers and files are read as UTF-8
            "name" | "encoding" | "force" | "diff" | "pyobject" | "start-at" | "end-at" => {
                log::debug!("Ignoring include option '{}'", key);
            }
            _ => return Err(format!("unknown option '{}'", key)),
        }
        Ok(())
    }
}

/// Reads `path` and returns the filtered excerpt without a trailing newline.
pub fn read_literal(path: &Path, options: &IncludeOptions) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CookbookError::include(path, format!("failed to read file: {}", e)))?;
    apply_filters(&text, options).map_err(|reason| CookbookError::include(path, reason))
}

/// The pure part of [`read_literal`].
pub fn apply_filters(text: &str, options: &IncludeOptions) -> Result<String, String> {
    let text = match options.tab_width {
        Some(width) => expand_tabs(text, width),
        None => text.to_string(),
    };
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();

    if let Some(marker) = &options.start_after {
        let found = lines
            .iter()
            .position(|line| line.contains(marker.as_str()))
            .ok_or_else(|| format!("start-after pattern not found: {}", marker))?;
        lines.drain(..=found);
    }

    if let Some(marker) = &options.end_before {
        let found = lines
            .iter()
            .position(|line| line.contains(marker.as_str()))
            .ok_or_else(|| format!("end-before pattern not found: {}", marker))?;
        lines.truncate(found);
    }

    if let Some(spec) = &options.lines {
        let wanted = parse_line_spec(spec, lines.len())?;
        let selected: Vec<String> = wanted
            .iter()
            .filter_map(|&index| lines.get(index).cloned())
            .collect();
        if selected.is_empty() {
            return Err(format!(
                "line number spec is out of range (1-{}): {}",
                lines.len(),
                spec
            ));
        }
        if selected.len() < wanted.len() {
            log::warn!("line number spec is partly out of range (1-{}): {}", lines.len(), spec);
        }
        lines = selected;
    }

    match options.dedent {
        Some(Dedent::Auto) => dedent_common(&mut lines),
        Some(Dedent::Columns(columns)) => {
            for line in lines.iter_mut() {
                let strip: usize = line
                    .chars()
                    .take(columns)
                    .take_while(|c| c.is_whitespace())
                    .map(char::len_utf8)
                    .sum();
                line.drain(..strip);
            }
        }
        None => {}
    }

    if let Some(prepend) = &options.prepend {
        lines.insert(0, prepend.clone());
    }
    if let Some(append) = &options.append {
        lines.push(append.clone());
    }

    Ok(lines.join("\n"))
}

/// Parses `1,3,5-7,9-` into zero-based line indices.
fn parse_line_spec(spec: &str, total: usize) -> Result<Vec<usize>, String> {
    let invalid = || format!("invalid line number spec: {:?}", spec);
    let mut indices = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        let (start, end) = match part.split_once('-') {
            None => {
                let n: usize = part.parse().map_err(|_| invalid())?;
                (n, n)
            }
            Some((begin, end)) => {
                let (begin, end) = (begin.trim(), end.trim());
                if begin.is_empty() && end.is_empty() {
                    return Err(invalid());
                }
                let start: usize = if begin.is_empty() {
                    1
                } else {
                    begin.parse().map_err(|_| invalid())?
                };
                let end: usize = if end.is_empty() {
                    start.max(total)
                } else {
                    end.parse().map_err(|_| invalid())?
                };
                (start, end)
            }
        };
        if start == 0 || start > end {
            return Err(invalid());
        }
        // one index past the last line is enough to flag the range as partial
        indices.extend(start - 1..end.min(total + 1));
    }

    Ok(indices)
}

fn dedent_common(lines: &mut [String]) {
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    for line in lines.iter_mut() {
        if line.trim().is_empty() {
            line.clear();
        } else {
            line.drain(..indent);
        }
    }
}

/// Column-aware tab expansion.
fn expand_tabs(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for ch in text.chars() {
        match ch {
            '\t' if width > 0 => {
                let pad = width - column % width;
                out.extend(std::iter::repeat(' ').take(pad));
                column += pad;
            }
            '\t' => {}
            '\n' | '\r' => {
                out.push(ch);
                column = 0;
            }
            _ => {
                out.push(ch);
                column += 1;
            }
        }
    }
    out
}
