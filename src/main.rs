use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use mdbook::preprocess::{CmdPreprocessor, Preprocessor};
use mdbook_cookbook::{ApprovalStore, DoctestPreprocessor, RecipePreprocessor};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expand {{#recipe}} directives (mdBook preprocessor)
    Recipe {
        #[command(subcommand)]
        action: Option<PreprocessorAction>,
    },
    /// Run testcode blocks and compare their output (mdBook preprocessor)
    Doctest {
        #[command(subcommand)]
        action: Option<PreprocessorAction>,
    },
    /// Approve a book.toml so its doctest commands may run
    Allow {
        #[arg(default_value = "book.toml")]
        path: PathBuf,
    },
    /// Revoke the approval of a book.toml
    Deny {
        #[arg(default_value = "book.toml")]
        path: PathBuf,
    },
    /// List approved book.toml files
    List,
}

#[derive(Subcommand, Debug)]
enum PreprocessorAction {
    /// Check whether a renderer is supported
    Supports { renderer: String },
}

pub fn main() {
    init_logger();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Recipe { action } => run_preprocessor(&RecipePreprocessor::new(), action),
        Commands::Doctest { action } => run_preprocessor(&DoctestPreprocessor::new(), action),
        Commands::Allow { path } => allow(&path),
        Commands::Deny { path } => deny(&path),
        Commands::List => list(),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

/// Log lines match mdBook's own so preprocessor output blends into a build.
fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|formatter, record| {
            writeln!(
                formatter,
                "{} [{}] ({}): {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn run_preprocessor(pre: &dyn Preprocessor, action: Option<PreprocessorAction>) -> Result<()> {
    if let Some(PreprocessorAction::Supports { renderer }) = action {
        exit(if pre.supports_renderer(&renderer) { 0 } else { 1 });
    }

    let (ctx, book) = CmdPreprocessor::parse_input(io::stdin())?;
    if ctx.mdbook_version != mdbook::MDBOOK_VERSION {
        log::warn!(
            "The {} preprocessor was built against mdbook {}, but is called from mdbook {}",
            pre.name(),
            mdbook::MDBOOK_VERSION,
            ctx.mdbook_version
        );
    }

    let processed_book = pre.run(&ctx, book)?;
    serde_json::to_writer(io::stdout(), &processed_book)?;
    Ok(())
}

fn allow(path: &Path) -> Result<()> {
    let store = ApprovalStore::open()?;
    store
        .approve(path)
        .with_context(|| format!("Failed to approve {}", path.display()))?;
    println!("Approved {}", path.display());
    Ok(())
}

fn deny(path: &Path) -> Result<()> {
    let store = ApprovalStore::open()?;
    if store.deny(path)? {
        println!("Removed approval for {}", path.display());
    } else {
        println!("{} was not approved", path.display());
    }
    Ok(())
}

fn list() -> Result<()> {
    let approved = ApprovalStore::open()?.list()?;
    if approved.is_empty() {
        println!("No approved book.toml files");
    }
    for path in approved {
        println!("{}", path);
    }
    Ok(())
}
