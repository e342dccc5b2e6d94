use crate::config::{DoctestConfig, RunMode};
use crate::error::{CookbookError, Result};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use walkdir::WalkDir;

/// The external build tool and shell, driven as subprocesses.
///
/// The template project is only ever read: classpath resolution and every
/// example run happen in scratch copies that are deleted when dropped,
/// whether the run succeeded or not.
#[derive(Debug, Clone)]
pub struct Toolchain {
    mode: RunMode,
    template_dir: PathBuf,
    source_file: String,
    entry_class: String,
    version: String,
    classpath_command: Vec<String>,
    classpath_file: String,
    run_command: Vec<String>,
    shell_command: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl Toolchain {
    /// `book_root` anchors the relative template path.
    pub fn new(config: &DoctestConfig, book_root: &Path) -> Self {
        Self {
            mode: config.mode,
            template_dir: book_root.join(&config.template),
            source_file: config.source_file.clone(),
            entry_class: config.entry_class.clone(),
            version: config.effective_version().to_string(),
            classpath_command: config.classpath_command.clone(),
            classpath_file: config.classpath_file.clone(),
            run_command: config.run_command.clone(),
            shell_command: config.shell_command.clone(),
            env: config.env.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolves the dependency classpath once for the whole run.
    ///
    /// Returns an empty classpath when no classpath command is configured.
    ///
    /// # Errors
    ///
    /// [`CookbookError::ToolchainSetup`] if the command cannot run, fails,
    /// or leaves the classpath file missing or empty.
    pub async fn resolve_classpath(&self) -> Result<String> {
        if self.classpath_command.is_empty() {
            return Ok(String::new());
        }

        let scratch = self.scratch_project().await?;
        let (command, display) = self.command(&self.classpath_command, "", scratch.path());
        log::info!("Resolving classpath: {}", display);

        let output = self.capture(command, &display, None).await.map_err(|e| {
            CookbookError::ToolchainSetup(format!("cannot resolve the classpath: {}", e))
        })?;
        if !output.status.success() {
            return Err(CookbookError::ToolchainSetup(format!(
                "`{}` exited with {}:\n{}",
                display,
                output.status,
                diagnostic(&output)
            )));
        }

        let file = scratch.path().join(&self.classpath_file);
        let classpath = tokio::fs::read_to_string(&file).await.map_err(|e| {
            CookbookError::ToolchainSetup(format!(
                "`{}` did not produce {}: {}",
                display, self.classpath_file, e
            ))
        })?;
        let classpath = classpath.trim();
        if classpath.is_empty() {
            return Err(CookbookError::ToolchainSetup(format!(
                "`{}` produced an empty {}",
                display, self.classpath_file
            )));
        }

        log::debug!("Resolved classpath with {} entries", classpath.split(':').count());
        Ok(classpath.to_string())
    }

    /// Runs one example and returns its raw standard output.
    ///
    /// In project mode `source` is a complete program; in shell mode it is
    /// the snippet fed to the shell on stdin.
    pub async fn run(&self, source: &str, classpath: &str) -> Result<String> {
        match self.mode {
            RunMode::Project => self.run_in_project(source, classpath).await,
            RunMode::Shell => self.run_in_shell(source, classpath).await,
        }
    }

    async fn run_in_project(&self, program: &str, classpath: &str) -> Result<String> {
        let scratch = self.scratch_project().await?;
        let source_path = scratch
            .path()
            .join(self.substitute(&self.source_file, classpath));
        if let Some(parent) = source_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&source_path, program).await?;

        let (command, display) = self.command(&self.run_command, classpath, scratch.path());
        let output = self.capture(command, &display, None).await?;
        if !output.status.success() {
            return Err(CookbookError::Execution {
                command: display,
                detail: format!("exited with {}\n{}", output.status, diagnostic(&output)),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_in_shell(&self, snippet: &str, classpath: &str) -> Result<String> {
        self.ensure_template()?;
        let (command, display) = self.command(&self.shell_command, classpath, &self.template_dir);
        let output = self.capture(command, &display, Some(snippet)).await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            return Err(CookbookError::Execution {
                command: display,
                detail: format!("exited with {}\n{}", output.status, diagnostic(&output)),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn ensure_template(&self) -> Result<()> {
        if self.template_dir.is_dir() {
            Ok(())
        } else {
            Err(CookbookError::ToolchainSetup(format!(
                "template project {} does not exist",
                self.template_dir.display()
            )))
        }
    }

    /// A fresh copy of the template project, removed on drop.
    async fn scratch_project(&self) -> Result<TempDir> {
        self.ensure_template()?;
        let scratch = tempfile::Builder::new().prefix("doctest-").tempdir()?;
        let (from, to) = (self.template_dir.clone(), scratch.path().to_path_buf());
        tokio::task::spawn_blocking(move || copy_template(&from, &to))
            .await
            .map_err(|e| CookbookError::ToolchainSetup(format!("template copy panicked: {}", e)))??;
        log::debug!(
            "Copied {} to {}",
            self.template_dir.display(),
            scratch.path().display()
        );
        Ok(scratch)
    }

    fn substitute(&self, arg: &str, classpath: &str) -> String {
        substitute(
            arg,
            &[
                ("version", &self.version),
                ("classpath", classpath),
                ("entry-class", &self.entry_class),
            ],
        )
    }

    fn command(&self, argv: &[String], classpath: &str, cwd: &Path) -> (Command, String) {
        let args: Vec<String> = argv.iter().map(|arg| self.substitute(arg, classpath)).collect();

        let mut command = Command::new(&args[0]);
        command.args(&args[1..]).current_dir(cwd);
        for (key, value) in &self.env {
            command.env(key, self.substitute(value, classpath));
        }

        (command, args.join(" "))
    }

    /// Spawns `command`, feeds `stdin` and waits for it to exit.
    async fn capture(
        &self,
        mut command: Command,
        display: &str,
        stdin: Option<&str>,
    ) -> Result<Output> {
        command
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| CookbookError::Execution {
            command: display.to_string(),
            detail: format!("failed to start: {}", e),
        })?;

        let pipe = child.stdin.take();
        let input = stdin.unwrap_or_default().as_bytes();
        let feed = async move {
            if let Some(mut pipe) = pipe {
                match pipe.write_all(input).await {
                    Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };
        let run = async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        };

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                CookbookError::Execution {
                    command: display.to_string(),
                    detail: format!("timed out after {}s", limit.as_secs()),
                }
            })??,
            None => run.await?,
        };
        Ok(output)
    }
}

/// stderr if the process wrote any, otherwise stdout.
fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    }
}

/// Replaces each `{key}` in `arg` with its value.
pub fn substitute(arg: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(arg.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// Recursively copy the template project into `to`.
fn copy_template(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).min_depth(1).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute() {
        let vars = [("version", "17.0.0"), ("entry-class", "Example")];
        assert_eq!(
            substitute("-Darrow.version={version}", &vars),
            "-Darrow.version=17.0.0"
        );
        assert_eq!(
            substitute("src/main/java/{entry-class}.java", &vars),
            "src/main/java/Example.java"
        );
        assert_eq!(substitute("{unknown}", &vars), "{unknown}");
    }

    #[test]
    fn test_copy_template_is_recursive() {
        let from = TempDir::new().unwrap();
        let to = TempDir::new().unwrap();
        std::fs::create_dir_all(from.path().join("src/main/java")).unwrap();
        std::fs::write(from.path().join("pom.xml"), "<project/>").unwrap();
        std::fs::write(from.path().join("src/main/java/Util.java"), "class Util {}").unwrap();

        copy_template(from.path(), to.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(to.path().join("src/main/java/Util.java")).unwrap(),
            "class Util {}"
        );
        assert!(to.path().join("pom.xml").is_file());
    }

    #[tokio::test]
    async fn test_missing_template_is_a_setup_error() {
        let dir = TempDir::new().unwrap();
        let config = DoctestConfig {
            template: PathBuf::from("does/not/exist"),
            ..DoctestConfig::default()
        };
        let toolchain = Toolchain::new(&config, dir.path());
        let err = toolchain.scratch_project().await.unwrap_err();
        assert!(matches!(err, CookbookError::ToolchainSetup(_)));
    }

    #[tokio::test]
    async fn test_scratch_project_copies_template() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("demo/src")).unwrap();
        std::fs::write(dir.path().join("demo/pom.xml"), "<project/>").unwrap();
        let config = DoctestConfig {
            template: PathBuf::from("demo"),
            ..DoctestConfig::default()
        };
        let toolchain = Toolchain::new(&config, dir.path());

        let scratch = toolchain.scratch_project().await.unwrap();
        assert!(scratch.path().join("pom.xml").is_file());
        assert!(scratch.path().join("src").is_dir());
        assert!(dir.path().join("demo/pom.xml").is_file());
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn sh(script: &str) -> Vec<String> {
            vec!["sh".to_string(), "-c".to_string(), script.to_string()]
        }

        fn toolchain(template: &Path, config: DoctestConfig) -> Toolchain {
            let config = DoctestConfig {
                template: template.to_path_buf(),
                env: BTreeMap::new(),
                ..config
            };
            Toolchain::new(&config, Path::new("/"))
        }

        #[tokio::test]
        async fn test_resolve_classpath_reads_file_and_leaves_template_alone() {
            let template = TempDir::new().unwrap();
            let chain = toolchain(
                template.path(),
                DoctestConfig {
                    classpath_command: sh("printf '/m2/arrow-vector.jar:/m2/arrow-memory.jar\\n' > .cp.tmp"),
                    ..DoctestConfig::default()
                },
            );

            let classpath = chain.resolve_classpath().await.unwrap();
            assert_eq!(classpath, "/m2/arrow-vector.jar:/m2/arrow-memory.jar");
            assert!(!template.path().join(".cp.tmp").exists());
        }

        #[tokio::test]
        async fn test_resolve_classpath_empty_or_missing_is_fatal() {
            let template = TempDir::new().unwrap();
            for script in [": > .cp.tmp", "true", "exit 3"] {
                let chain = toolchain(
                    template.path(),
                    DoctestConfig {
                        classpath_command: sh(script),
                        ..DoctestConfig::default()
                    },
                );
                let err = chain.resolve_classpath().await.unwrap_err();
                assert!(
                    matches!(err, CookbookError::ToolchainSetup(_)),
                    "{}: {}",
                    script,
                    err
                );
            }
        }

        #[tokio::test]
        async fn test_project_mode_runs_in_scratch_copy() {
            let template = TempDir::new().unwrap();
            std::fs::write(template.path().join("pom.xml"), "<project/>").unwrap();
            let chain = toolchain(
                template.path(),
                DoctestConfig {
                    run_command: sh("echo '[INFO] BUILD'; cat src/main/java/{entry-class}.java; echo cp={classpath}"),
                    ..DoctestConfig::default()
                },
            );

            let out = chain.run("class Example {}", "/a.jar").await.unwrap();
            assert_eq!(out, "[INFO] BUILD\nclass Example {}cp=/a.jar\n");
            assert!(!template.path().join("src").exists());
        }

        #[tokio::test]
        async fn test_project_mode_failure_is_an_execution_error() {
            let template = TempDir::new().unwrap();
            let chain = toolchain(
                template.path(),
                DoctestConfig {
                    run_command: sh("echo 'cannot find symbol' >&2; exit 1"),
                    ..DoctestConfig::default()
                },
            );

            let err = chain.run("class Example {}", "").await.unwrap_err();
            assert!(matches!(err, CookbookError::Execution { .. }));
            assert!(err.to_string().contains("cannot find symbol"));
        }

        #[tokio::test]
        async fn test_shell_mode_feeds_stdin_and_rejects_stderr() {
            let template = TempDir::new().unwrap();
            let chain = toolchain(
                template.path(),
                DoctestConfig {
                    mode: RunMode::Shell,
                    shell_command: vec!["cat".to_string()],
                    ..DoctestConfig::default()
                },
            );
            let out = chain.run("System.out.println(1);\n", "").await.unwrap();
            assert_eq!(out, "System.out.println(1);\n");

            let chain = toolchain(
                template.path(),
                DoctestConfig {
                    mode: RunMode::Shell,
                    shell_command: sh("cat >/dev/null; echo '|  Error: cannot find symbol' >&2"),
                    ..DoctestConfig::default()
                },
            );
            let err = chain.run("nope();", "").await.unwrap_err();
            assert!(matches!(err, CookbookError::Execution { .. }));
        }

        #[tokio::test]
        async fn test_timeout() {
            let template = TempDir::new().unwrap();
            let chain = toolchain(
                template.path(),
                DoctestConfig {
                    run_command: sh("sleep 5"),
                    timeout_secs: Some(1),
                    ..DoctestConfig::default()
                },
            );
            let err = chain.run("", "").await.unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }
    }
}
