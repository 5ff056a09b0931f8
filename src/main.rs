//! Bakehouse CLI - recipe engine for tabular data

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use bakehouse::ast::RecipeFile;
use bakehouse::config::BakeConfig;
use bakehouse::error::{BakeError, FixSuggestion};
use bakehouse::event::LogEntry;
use bakehouse::ops::{builtin_registry, ArgKind};
use bakehouse::runtime::Kitchen;
use bakehouse::store::{coerce_text, Environment, Value};

#[derive(Parser)]
#[command(name = "bakehouse")]
#[command(about = "Bakehouse - run ordered data recipes over a shared variable environment")]
#[command(version)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bake a recipe file once
    Run {
        /// Path to the recipe YAML
        file: PathBuf,

        /// Config file (defaults to ./bakehouse.yaml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print {log, variables} as JSON
        #[arg(long)]
        json: bool,

        /// Seed or override a variable: NAME=VALUE (numbers are detected)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },

    /// Check a recipe file without running it
    Validate {
        /// Path to the recipe YAML
        file: PathBuf,
    },

    /// List available operations
    Ops,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            file,
            config,
            json,
            set,
        } => run_recipe(&file, config.as_deref(), json, &set).await,
        Commands::Validate { file } => validate_recipe(&file),
        Commands::Ops => {
            list_operations();
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.fix_suggestion() {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the bake halted on a step error
async fn run_recipe(
    file: &Path,
    config_path: Option<&Path>,
    json: bool,
    overrides: &[String],
) -> Result<bool, BakeError> {
    let config = BakeConfig::load(config_path)?;
    let yaml = tokio::fs::read_to_string(file).await?;
    let document = RecipeFile::from_yaml(&yaml)?;

    let kitchen = Kitchen::new(config);
    let recipe = document.recipe(kitchen.registry(), &kitchen.config().output_prefix);
    let mut environment = document.environment();
    for assignment in overrides {
        let (name, value) = parse_assignment(assignment)?;
        environment.set(name, value);
    }
    kitchen.load(recipe, environment)?;

    if !json {
        println!(
            "{} Baking {} ({} steps)",
            "→".cyan(),
            file.display().to_string().cyan().bold(),
            kitchen.recipe().len()
        );
    }

    let report = kitchen.bake().await?;
    let variables = kitchen.variables();

    if json {
        let payload = serde_json::json!({
            "log": report.log,
            "variables": variables,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(report.is_success());
    }

    for entry in report.log.iter() {
        print_entry(entry);
    }
    for skipped in &report.skipped {
        println!("{} {} skipped (unknown operation)", "-".dimmed(), skipped.dimmed());
    }
    print_variables(&variables);

    if report.is_success() {
        println!("{} Bake finished", "✓".green());
    } else {
        println!(
            "{} Bake halted at step {}",
            "✗".red(),
            report.halted_at.as_deref().unwrap_or("?").bold()
        );
    }
    Ok(report.is_success())
}

fn parse_assignment(raw: &str) -> Result<(String, Value), BakeError> {
    let (name, value) = raw.split_once('=').ok_or_else(|| BakeError::ConfigError {
        reason: format!("--set expects NAME=VALUE, got '{}'", raw),
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(BakeError::ConfigError {
            reason: format!("--set expects NAME=VALUE, got '{}'", raw),
        });
    }
    Ok((name.to_string(), Value::from(coerce_text(value))))
}

fn print_entry(entry: &LogEntry) {
    if entry.is_success() {
        println!(
            "{} {} [{}] → {} ({}ms)",
            "✓".green(),
            entry.step_id.bold(),
            entry.operation_id.dimmed(),
            entry.output_name.as_deref().unwrap_or("").cyan(),
            entry.duration_ms
        );
    } else {
        println!(
            "{} {} [{}] {}",
            "✗".red(),
            entry.step_id.bold(),
            entry.operation_id.dimmed(),
            entry.message.as_deref().unwrap_or("").red()
        );
        if let Some(hint) = &entry.hint {
            println!("    {} {}", "Fix:".yellow(), hint);
        }
    }
}

fn print_variables(env: &Environment) {
    if env.is_empty() {
        return;
    }
    println!("{}", "Variables:".cyan().bold());
    for variable in env.iter() {
        println!("  {} = {}", variable.name.bold(), variable.value.summary());
        if let Value::Table(table) = &variable.value {
            println!("    {}", table.columns.join(" | ").dimmed());
            for row in table.rows.iter().take(5) {
                let cells: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| row.get(c).map(ToString::to_string).unwrap_or_default())
                    .collect();
                println!("    {}", cells.join(" | "));
            }
            if table.len() > 5 {
                println!("    {}", format!("… {} more rows", table.len() - 5).dimmed());
            }
        }
    }
}

/// Returns `Ok(false)` when problems were found
fn validate_recipe(file: &Path) -> Result<bool, BakeError> {
    let document = RecipeFile::from_file(file)?;
    let issues = document.validate(builtin_registry());

    if issues.is_empty() {
        println!("{} Recipe '{}' is valid", "✓".green(), file.display());
        println!("  Steps: {}", document.steps.len());
        println!("  Seed variables: {}", document.variables.len());
        return Ok(true);
    }

    println!(
        "{} Recipe '{}' has {} problem(s)",
        "✗".red(),
        file.display(),
        issues.len()
    );
    for issue in &issues {
        println!("  {} {}", format!("[{}]", issue.step).bold(), issue.error);
        if let Some(suggestion) = issue.error.fix_suggestion() {
            println!("    {} {}", "Fix:".yellow(), suggestion);
        }
    }
    Ok(false)
}

fn list_operations() {
    for (category, ops) in builtin_registry().by_category() {
        println!("{}", category.to_string().cyan().bold());
        for op in ops {
            println!("  {} {}", op.id().bold(), format!("({})", op.name()).dimmed());
            println!("    {}", op.description());
            for spec in op.args() {
                let kind = match &spec.kind {
                    ArgKind::Text => "text".to_string(),
                    ArgKind::String => "string".to_string(),
                    ArgKind::Boolean => "boolean".to_string(),
                    ArgKind::Select { options } => format!("select: {}", options.join("|")),
                    ArgKind::VariableRef { accepts: Some(kinds) } => {
                        let kinds: Vec<String> = kinds.iter().map(ToString::to_string).collect();
                        format!("variable: {}", kinds.join("|"))
                    }
                    ArgKind::VariableRef { accepts: None } => "variable".to_string(),
                };
                let default = spec
                    .default
                    .as_ref()
                    .map(|d| format!(" = {}", d))
                    .unwrap_or_default();
                println!("    - {} <{}>{}", spec.name, kind, default.dimmed());
            }
        }
    }
}
