use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use inliner::ast::{FileId, Span};
use inliner::host::{CancelToken, SourceModel};
use inliner::memory::MemoryProject;
use inliner::pipeline::InlineConstant;
use inliner::status::RefactoringStatus;

#[derive(Parser)]
#[command(name = "inliner")]
#[command(about = "Inline a constant: replace references with its initializer, re-qualified for each destination")]
#[command(long_about = "Binding-aware constant inliner. Point it at a project model and a \
selection denoting a static final constant; it validates the selection, finds the references, \
and computes per-file text edits that keep every relocated name bound to the same declaration.

The project model is a JSON file describing parsed sources with resolved bindings \
(see MemoryProject). Edits are previewed as unified diffs; nothing is written back.")]
#[command(version)]
struct Cli {
    /// Verbose diagnostics on stderr (RUST_LOG overrides)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a selection without computing edits
    Check {
        #[command(flatten)]
        target: Target,
    },
    /// Compute the full change set and print it
    Inline {
        #[command(flatten)]
        target: Target,

        /// Replace only the selected reference instead of all of them
        #[arg(long)]
        single: bool,

        /// Also remove the declaration (requires replacing all references)
        #[arg(long)]
        remove_declaration: bool,

        /// Output format: "diff" or "json"
        #[arg(long, default_value = "diff")]
        format: String,
    },
}

#[derive(Args)]
struct Target {
    /// Project model JSON file
    #[arg(long)]
    model: PathBuf,

    /// File id containing the selection
    #[arg(long)]
    file: String,

    /// Selection start, a byte offset into the file's text
    #[arg(long)]
    offset: usize,

    /// Selection length in bytes (0 selects the name under the caret)
    #[arg(long, default_value_t = 0)]
    length: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Check { target } => check(&target),
        Command::Inline {
            target,
            single,
            remove_declaration,
            format,
        } => inline(&target, single, remove_declaration, &format),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn session<'h>(project: &'h MemoryProject, target: &Target) -> InlineConstant<'h> {
    InlineConstant::new(
        project,
        FileId(target.file.clone()),
        Span::new(target.offset, target.length),
    )
}

fn check(target: &Target) -> Result<()> {
    let project = MemoryProject::load(&target.model)?;
    let cancel = CancelToken::new();

    let mut refactoring = session(&project, target);
    let initial = refactoring.check_initial_conditions(&cancel)?;
    print_findings(&initial);
    if initial.has_fatal() {
        bail!("the selection cannot be inlined");
    }

    let final_status = refactoring.check_final_conditions(&cancel)?;
    print_findings(&final_status);
    if final_status.has_fatal() {
        bail!("no reference can be replaced");
    }
    println!("ok: the constant can be inlined");
    Ok(())
}

fn inline(target: &Target, single: bool, remove_declaration: bool, format: &str) -> Result<()> {
    let project = MemoryProject::load(&target.model)?;
    let cancel = CancelToken::new();

    let mut refactoring = session(&project, target);
    let initial = refactoring.check_initial_conditions(&cancel)?;
    print_findings(&initial);
    if initial.has_fatal() {
        bail!("the selection cannot be inlined");
    }
    if single {
        refactoring
            .set_replace_all(false)
            .context("--single is not possible here")?;
    }
    if remove_declaration {
        refactoring
            .set_remove_declaration(true)
            .context("--remove-declaration is not possible here")?;
    }

    let final_status = refactoring.check_final_conditions(&cancel)?;
    print_findings(&final_status);
    if final_status.has_fatal() {
        bail!("no reference can be replaced");
    }

    let change_set = refactoring.create_change()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&change_set)?),
        "diff" => {
            for change in &change_set.changes {
                let Some(text) = project.read_text(&change.file) else {
                    continue;
                };
                print!("{}", change.diff(text));
            }
        }
        other => bail!("unknown format '{}' (expected \"diff\" or \"json\")", other),
    }
    Ok(())
}

fn print_findings(status: &RefactoringStatus) {
    for finding in status.findings() {
        match &finding.context {
            Some(ctx) => println!(
                "{}: {} ({} @ {}..{})",
                finding.severity,
                finding.message,
                ctx.file,
                ctx.span.start,
                ctx.span.end()
            ),
            None => println!("{}: {}", finding.severity, finding.message),
        }
    }
}
