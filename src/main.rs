use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use stacker::config::{
    apply_document, apply_plan, is_valid_digest, load_from_path, load_from_workspace,
    ApplicationError, ApplyMode, DocumentReport, FieldUpdate, FieldValue, StepResult,
    DEFAULT_PLAN_FILE,
};
use stacker::yaml::{NodeRef, Patcher};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stacker")]
#[command(about = "Format-preserving YAML patching with $rebase digest pinning", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Trace logging
    #[arg(long = "vv", visible_alias = "super-verbose", global = true)]
    super_verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List $rebase annotations found in YAML files
    Scan {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Set a single scalar addressed by a path expression
    Set {
        file: PathBuf,
        path: String,
        value: String,

        /// Create missing mapping keys (path is split on '.')
        #[arg(short, long)]
        create: bool,

        /// How to interpret VALUE
        #[arg(short = 't', long = "type", value_enum, default_value_t = ValueType::Auto)]
        value_type: ValueType,

        /// Show what would change without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Pin supplied digests onto annotated image tags
    Pin {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Digest for an annotation identifier, as ID=DIGEST
        #[arg(long = "digest", value_name = "ID=DIGEST", required = true)]
        digests: Vec<String>,

        /// Show what would change without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Run a plan file
    Apply {
        /// Plan file (defaults to stacker.toml in the workspace)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Base directory for relative document paths (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Show what would change without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValueType {
    Auto,
    String,
    Int,
    Float,
    Bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.super_verbose);

    let ok = match cli.command {
        Commands::Scan { files } => cmd_scan(&files),
        Commands::Set {
            file,
            path,
            value,
            create,
            value_type,
            dry_run,
            diff,
        } => {
            let field = FieldUpdate {
                path,
                value: parse_value(&value, value_type)?,
                create,
            };
            cmd_set(&file, field, dry_run, diff)
        }
        Commands::Pin {
            files,
            digests,
            dry_run,
            diff,
        } => cmd_pin(&files, &digests, dry_run, diff)?,
        Commands::Apply {
            config,
            workspace,
            dry_run,
            diff,
        } => cmd_apply(config, workspace, dry_run, diff)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// `RUST_LOG` wins over the verbosity flags.
fn init_logging(verbose: bool, super_verbose: bool) {
    let default = if super_verbose {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_value(text: &str, value_type: ValueType) -> Result<FieldValue> {
    let value = match value_type {
        ValueType::Auto => FieldValue::infer(text),
        ValueType::String => FieldValue::String(text.to_string()),
        ValueType::Int => FieldValue::Int(
            text.parse::<i64>()
                .with_context(|| format!("'{text}' is not an integer"))?,
        ),
        ValueType::Float => FieldValue::Float(
            text.parse::<f64>()
                .with_context(|| format!("'{text}' is not a float"))?,
        ),
        ValueType::Bool => FieldValue::Bool(
            text.parse::<bool>()
                .with_context(|| format!("'{text}' is not a boolean"))?,
        ),
    };
    Ok(value)
}

fn parse_digests(args: &[String]) -> Result<BTreeMap<String, String>> {
    let mut digests = BTreeMap::new();
    for arg in args {
        let Some((identifier, digest)) = arg.split_once('=') else {
            anyhow::bail!("--digest expects ID=DIGEST, got '{arg}'");
        };
        if identifier.is_empty() || !is_valid_digest(digest) {
            anyhow::bail!("--digest expects ID=algorithm:hex, got '{arg}'");
        }
        digests.insert(identifier.to_string(), digest.to_string());
    }
    Ok(digests)
}

fn apply_mode(dry_run: bool) -> ApplyMode {
    if dry_run {
        ApplyMode::DryRun
    } else {
        ApplyMode::Write
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{change}").red(),
            ChangeTag::Insert => format!("+{change}").green(),
            ChangeTag::Equal => format!(" {change}").normal(),
        };
        print!("{line}");
    }
}

fn cmd_scan(files: &[PathBuf]) -> bool {
    let mut ok = true;

    for file in files {
        let patcher = match fs::read_to_string(file)
            .map_err(anyhow::Error::from)
            .and_then(|text| Patcher::parse(&text).map_err(anyhow::Error::from))
        {
            Ok(patcher) => patcher,
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), file.display(), e);
                ok = false;
                continue;
            }
        };

        println!("{}", file.display().to_string().bold());
        let tree = patcher.tree();
        let line_of = |node: Option<NodeRef>| {
            node.and_then(|node| tree.resolve(node).ok())
                .map(|id| tree.node(id).mark.line.to_string())
                .unwrap_or_else(|| "-".to_string())
        };

        let scan = patcher.find_rebase_annotations();
        if scan.annotations.is_empty() {
            println!("  {}", "no annotations".dimmed());
        }
        for annotation in &scan.annotations {
            let pinned = match annotation.digest() {
                Some(digest) => format!("@{digest}").dimmed().to_string(),
                None => String::new(),
            };
            println!(
                "  {} {}{} (name line {}, tag line {})",
                annotation.identifier.cyan(),
                annotation.image_reference(),
                pinned,
                line_of(annotation.name_node),
                line_of(annotation.tag_node),
            );
        }
        for issue in &scan.issues {
            eprintln!("  {} {}", "⚠".yellow(), issue);
            ok = false;
        }
    }

    ok
}

fn cmd_set(file: &Path, field: FieldUpdate, dry_run: bool, show_diff: bool) -> bool {
    let label = file.display().to_string();
    let result = apply_document(file, None, std::slice::from_ref(&field), apply_mode(dry_run));
    report_document(&label, result, dry_run, show_diff)
}

fn cmd_pin(files: &[PathBuf], digest_args: &[String], dry_run: bool, show_diff: bool) -> Result<bool> {
    let digests = parse_digests(digest_args)?;
    let mut ok = true;

    for file in files {
        let label = file.display().to_string();
        let result = apply_document(file, Some(&digests), &[], apply_mode(dry_run));
        ok &= report_document(&label, result, dry_run, show_diff);
    }

    Ok(ok)
}

fn cmd_apply(
    config: Option<PathBuf>,
    workspace: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<bool> {
    let workspace = match workspace {
        Some(path) => path,
        None => env::current_dir()?,
    };
    println!("Workspace: {}", workspace.display());
    let plan = match config {
        Some(path) => {
            println!("Loading plan from {}...", path.display());
            load_from_path(&path)?
        }
        None => {
            println!("Loading plan from {}...", workspace.join(DEFAULT_PLAN_FILE).display());
            load_from_workspace(&workspace)?
        }
    };
    if !plan.meta.name.is_empty() {
        println!("Plan: {}", plan.meta.name);
    }
    if dry_run {
        println!("{}", "  [DRY RUN - no files will be modified]".cyan());
    }
    println!();

    let mut written = 0;
    let mut unchanged = 0;
    let mut failed = 0;

    for (file, result) in apply_plan(&plan, &workspace, apply_mode(dry_run)) {
        let changed = matches!(&result, Ok(report) if report.is_changed());
        if report_document(&file, result, dry_run, show_diff) {
            if changed {
                written += 1;
            } else {
                unchanged += 1;
            }
        } else {
            failed += 1;
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    let verb = if dry_run { "would change" } else { "changed" };
    println!("  {} {}", format!("{written}").green(), verb);
    println!("  {} unchanged", format!("{unchanged}").yellow());
    println!("  {} failed", format!("{failed}").red());

    Ok(failed == 0)
}

/// Print one document's outcome. Returns false when anything in it failed.
fn report_document(
    label: &str,
    result: Result<DocumentReport, ApplicationError>,
    dry_run: bool,
    show_diff: bool,
) -> bool {
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}: Error - {}", "✗".red(), label, e);
            return false;
        }
    };

    let status = if !report.is_changed() {
        "unchanged".yellow()
    } else if dry_run {
        "would change".cyan()
    } else {
        "written".green()
    };
    println!("{} {}", label.bold(), status);

    for step in &report.steps {
        match step {
            StepResult::Pinned { .. } | StepResult::Set { .. } | StepResult::Created { .. } => {
                println!("  {} {}", "✓".green(), step)
            }
            StepResult::AlreadyPinned { .. } | StepResult::Unchanged { .. } => {
                println!("  {} {}", "⊙".yellow(), step)
            }
            StepResult::Failed { .. } => eprintln!("  {} {}", "✗".red(), step),
        }
    }
    for issue in &report.scan_issues {
        eprintln!("  {} {}", "⚠".yellow(), issue);
    }

    if show_diff && report.is_changed() {
        display_diff(&report.file, &report.original, &report.updated);
    }

    !report.has_failures()
}
