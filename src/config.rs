use anyhow::{Context, Result};
use mdbook::preprocess::PreprocessorContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Component, Path, PathBuf};

/// Configuration for the recipe preprocessor.
///
/// Deserialized from the `[preprocessor.recipe]` section of `book.toml`.
///
/// ```toml
/// [preprocessor.recipe]
/// search-root = ".."
/// snapshot-name = "recipes_out.arrow"
/// language = "cpp"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RecipeConfig {
    /// Directory searched recursively for snapshot files, relative to the book root
    pub search_root: PathBuf,
    /// File name of the snapshot produced by the recipe test run
    pub snapshot_name: String,
    /// Highlighting language for included excerpts
    pub language: String,
    /// Caption rendered above the captured output
    pub caption: String,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            search_root: PathBuf::from("."),
            snapshot_name: "recipes_out.arrow".to_string(),
            language: "cpp".to_string(),
            caption: "Code Output".to_string(),
        }
    }
}

impl RecipeConfig {
    pub fn from_preprocessor_context(ctx: &PreprocessorContext) -> Result<Self> {
        let config: RecipeConfig = match ctx.config.get("preprocessor.recipe") {
            Some(value) => value
                .clone()
                .try_into()
                .context("Invalid [preprocessor.recipe] configuration")?,
            None => Self::default(),
        };

        if config.snapshot_name.is_empty() {
            anyhow::bail!("snapshot-name cannot be empty");
        }

        Ok(config)
    }
}

/// How an example is handed to the external toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Synthesize a program, drop it into a scratch copy of the template
    /// project and run it with the build tool.
    #[default]
    Project,
    /// Pipe the raw snippet into an interactive shell on stdin.
    Shell,
}

/// Configuration for the doctest preprocessor.
///
/// Deserialized from `[preprocessor.doctest]`. Every field has a default
/// matching a Maven-based Java cookbook, so an empty table is a working
/// configuration for that layout.
///
/// Command arguments and `env` values support `${VAR}` environment variable
/// expansion (done once at load time) and the `{version}`, `{classpath}` and
/// `{entry-class}` placeholders (substituted per invocation).
///
/// # Example
///
/// ```toml
/// [preprocessor.doctest]
/// template = "../java/source/demo"
/// mode = "shell"
/// tab-width = 4
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DoctestConfig {
    /// Fence languages whose testcode blocks are executed
    pub fence_markers: Vec<String>,
    pub mode: RunMode,
    /// Template project directory, relative to the book root
    pub template: PathBuf,
    pub entry_class: String,
    /// Where the synthesized program goes inside the scratch project
    pub source_file: String,
    /// Program skeleton with `{imports}`, `{entry-class}` and `{body}` placeholders
    pub wrapper: String,
    /// Regex recognising a snippet that is already a complete program
    pub program_pattern: String,
    pub import_prefixes: Vec<String>,
    /// Command writing the dependency classpath to `classpath_file`; empty disables it
    pub classpath_command: Vec<String>,
    pub classpath_file: String,
    pub run_command: Vec<String>,
    pub shell_command: Vec<String>,
    /// Extra environment for the run and shell commands
    pub env: BTreeMap<String, String>,
    pub version: String,
    pub nightly_version: String,
    /// Environment flag selecting `nightly_version`
    pub nightly_env: String,
    pub noise_prefixes: Vec<String>,
    pub noise_lines: Vec<String>,
    pub prompt_suffix: String,
    pub tab_width: usize,
    pub default_flags: Vec<String>,
    /// Maximum concurrent examples, 0 means one per CPU
    pub jobs: usize,
    pub timeout_secs: Option<u64>,
    /// Plain-text report path, relative to the book root
    pub report: Option<PathBuf>,
}

const DEFAULT_WRAPPER: &str = "{imports}

public class {entry-class} {
    public static void main(String[] args) throws Exception {
{body}
    }
}
";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for DoctestConfig {
    fn default() -> Self {
        Self {
            fence_markers: strings(&["java"]),
            mode: RunMode::Project,
            template: PathBuf::from("source/demo"),
            entry_class: "Example".to_string(),
            source_file: "src/main/java/{entry-class}.java".to_string(),
            wrapper: DEFAULT_WRAPPER.to_string(),
            program_pattern: r"\bstatic\s+void\s+main\s*\(".to_string(),
            import_prefixes: strings(&["import "]),
            classpath_command: strings(&[
                "mvn",
                "-q",
                "dependency:build-classpath",
                "-DincludeTypes=jar",
                "-Dmdep.outputFile=.cp.tmp",
                "-Darrow.version={version}",
            ]),
            classpath_file: ".cp.tmp".to_string(),
            run_command: strings(&[
                "mvn",
                "-q",
                "compile",
                "exec:java",
                "-Dexec.mainClass={entry-class}",
                "-Darrow.version={version}",
            ]),
            shell_command: strings(&[
                "jshell",
                "-R--add-opens=java.base/java.nio=ALL-UNNAMED",
                "--class-path",
                "{classpath}",
                "-s",
                "/dev/stdin",
            ]),
            env: BTreeMap::from([(
                "MAVEN_OPTS".to_string(),
                "--add-opens=java.base/java.nio=ALL-UNNAMED".to_string(),
            )]),
            version: "17.0.0".to_string(),
            nightly_version: "18.0.0-SNAPSHOT".to_string(),
            nightly_env: "ARROW_NIGHTLY".to_string(),
            noise_prefixes: strings(&[
                "[INFO]",
                "[WARNING]",
                "[WARN]",
                "Downloading",
                "Downloaded",
                "Progress (",
            ]),
            noise_lines: strings(&[
                "------------------------------------------------------------------------",
            ]),
            prompt_suffix: "-> ".to_string(),
            tab_width: 4,
            default_flags: strings(&["ELLIPSIS"]),
            jobs: 1,
            timeout_secs: None,
            report: None,
        }
    }
}

impl DoctestConfig {
    /// Parse `[preprocessor.doctest]`, expand environment variables and validate.
    pub fn from_preprocessor_context(ctx: &PreprocessorContext) -> Result<Self> {
        let mut config: DoctestConfig = match ctx.config.get("preprocessor.doctest") {
            Some(value) => value
                .clone()
                .try_into()
                .context("Invalid [preprocessor.doctest] configuration")?,
            None => Self::default(),
        };

        config.expand_environment();
        config
            .validate()
            .context("Invalid [preprocessor.doctest] configuration")?;

        Ok(config)
    }

    fn expand_environment(&mut self) {
        for command in [
            &mut self.classpath_command,
            &mut self.run_command,
            &mut self.shell_command,
        ] {
            for arg in command.iter_mut() {
                *arg = expand_env_vars(arg);
            }
        }
        for value in self.env.values_mut() {
            *value = expand_env_vars(value);
        }
    }

    /// Validate the configuration for security and correctness
    pub fn validate(&self) -> Result<()> {
        if self.fence_markers.is_empty() {
            anyhow::bail!("fence-markers must name at least one language");
        }
        if self.tab_width == 0 {
            anyhow::bail!("tab-width must be greater than zero");
        }
        if self.entry_class.trim().is_empty() {
            anyhow::bail!("entry-class cannot be empty");
        }
        Regex::new(&self.program_pattern)
            .with_context(|| format!("Invalid program-pattern '{}'", self.program_pattern))?;

        if !self.classpath_command.is_empty() {
            validate_command(&self.classpath_command, "classpath-command")?;
            if self.classpath_file.is_empty() {
                anyhow::bail!("classpath-file cannot be empty when classpath-command is set");
            }
        }
        match self.mode {
            RunMode::Project => validate_command(&self.run_command, "run-command")?,
            RunMode::Shell => validate_command(&self.shell_command, "shell-command")?,
        }

        if Path::new(&self.source_file).is_absolute() || has_parent_dir(Path::new(&self.source_file)) {
            anyhow::bail!(
                "source-file must stay inside the template project: {}",
                self.source_file
            );
        }

        Ok(())
    }

    /// Picks the dependency version given the value of the nightly flag.
    pub fn select_version(&self, nightly_flag: Option<&str>) -> &str {
        match nightly_flag {
            Some(flag) if !flag.is_empty() && flag != "0" => &self.nightly_version,
            _ => &self.version,
        }
    }

    /// The dependency version for this process environment.
    pub fn effective_version(&self) -> &str {
        let flag = env::var(&self.nightly_env).ok();
        self.select_version(flag.as_deref())
    }

    /// Number of examples allowed to run at once.
    pub fn concurrency(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }
}

fn has_parent_dir(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::ParentDir))
}

/// Reject programs that could smuggle shell syntax or escape upwards.
fn validate_command(command: &[String], field: &str) -> Result<()> {
    let Some(program) = command.first() else {
        anyhow::bail!("{} cannot be empty", field);
    };
    if program.is_empty() {
        anyhow::bail!("{}: program cannot be empty", field);
    }

    let dangerous_chars = [';', '|', '&', '`', '\n', '\r'];
    if let Some(ch) = dangerous_chars.iter().find(|ch| program.contains(**ch)) {
        anyhow::bail!(
            "{}: program contains invalid character '{}': {}",
            field,
            ch.escape_default(),
            program
        );
    }
    if has_parent_dir(Path::new(program)) {
        anyhow::bail!("{}: program cannot contain '..': {}", field, program);
    }

    Ok(())
}

/// Expand `${VAR_NAME}` references in a single pass.
///
/// Unknown variables and unterminated references are left as written.
fn expand_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        match env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                log::warn!(
                    "Environment variable '{}' not found, leaving unexpanded",
                    name
                );
                out.push_str(&rest[start..start + end + 3]);
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
