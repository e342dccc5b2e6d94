use crate::config::DoctestConfig;

/// Declarative rules for removing toolchain chatter from captured stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseFilter {
    /// Lines starting with any of these are dropped
    pub prefixes: Vec<String>,
    /// Lines equal to any of these (after trimming) are dropped
    pub lines: Vec<String>,
    /// Interactive prompt left at the very end of shell output
    pub prompt_suffix: String,
    pub tab_width: usize,
}

impl NoiseFilter {
    pub fn from_config(config: &DoctestConfig) -> Self {
        Self {
            prefixes: config.noise_prefixes.clone(),
            lines: config.noise_lines.clone(),
            prompt_suffix: config.prompt_suffix.clone(),
            tab_width: config.tab_width,
        }
    }

    fn is_noise(&self, line: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()))
            || self.lines.iter().any(|noise| line.trim() == noise)
    }

    /// Cleans raw output. Pure: no I/O, same input gives same output.
    ///
    /// Drops noise lines, turns every tab into `tab_width` spaces, trims
    /// trailing whitespace of each kept line and strips leading and trailing
    /// blank lines. Kept lines stay in their original order.
    pub fn clean(&self, raw: &str) -> String {
        let raw = if self.prompt_suffix.is_empty() {
            raw
        } else {
            raw.strip_suffix(self.prompt_suffix.as_str()).unwrap_or(raw)
        };
        let tab = " ".repeat(self.tab_width);

        let kept: Vec<String> = raw
            .lines()
            .filter(|line| !self.is_noise(line))
            .map(|line| line.replace('\t', &tab).trim_end().to_string())
            .collect();

        let first = kept.iter().position(|line| !line.is_empty());
        let last = kept.iter().rposition(|line| !line.is_empty());
        match (first, last) {
            (Some(first), Some(last)) => kept[first..=last].join("\n"),
            _ => String::new(),
        }
    }
}
