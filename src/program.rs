use crate::config::DoctestConfig;
use anyhow::{Context, Result};
use regex::Regex;

/// Turns snippets into complete programs for the template project.
#[derive(Debug, Clone)]
pub struct ProgramTemplate {
    program_pattern: Regex,
    import_prefixes: Vec<String>,
    wrapper: String,
    entry_class: String,
}

impl ProgramTemplate {
    pub fn from_config(config: &DoctestConfig) -> Result<Self> {
        let program_pattern = Regex::new(&config.program_pattern)
            .with_context(|| format!("Invalid program-pattern '{}'", config.program_pattern))?;
        Ok(Self {
            program_pattern,
            import_prefixes: config.import_prefixes.clone(),
            wrapper: config.wrapper.clone(),
            entry_class: config.entry_class.clone(),
        })
    }

    /// Whether `code` already declares a complete program.
    pub fn is_program(&self, code: &str) -> bool {
        self.program_pattern.is_match(code)
    }

    /// Wraps `code` in the entry class unless it is already a program.
    ///
    /// Import lines are hoisted above the class; both imports and body keep
    /// their original relative order.
    pub fn synthesize(&self, code: &str) -> String {
        if self.is_program(code) {
            return code.to_string();
        }

        let (imports, body): (Vec<&str>, Vec<&str>) = code.lines().partition(|line| {
            let trimmed = line.trim_start();
            self.import_prefixes
                .iter()
                .any(|prefix| trimmed.starts_with(prefix.as_str()))
        });

        let body = body
            .iter()
            .map(|line| {
                if line.trim().is_empty() {
                    String::new()
                } else {
                    format!("        {}", line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        let program = self
            .wrapper
            .replace("{imports}", &imports.join("\n"))
            .replace("{entry-class}", &self.entry_class)
            .replace("{body}", body.trim_matches('\n'));

        program.trim_start_matches('\n').to_string()
    }
}
