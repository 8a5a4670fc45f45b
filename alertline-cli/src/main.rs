use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use alertline_core::logging::init_tracing;
use alertline_core::serde_utils::to_pretty_json;
use alertline_core::CoreConfig;
use alertline_engine::{run_batch, BatchConfig, EvaluationTask, TaskMode};
use alertline_rules::{export_rules, SimulationOptions};

mod output;
mod workspace;

use workspace::{check_rules, rules, Sources, Workspace};

#[derive(Parser)]
#[command(name = "alertline")]
#[command(about = "Behavioral alerting rule engine", long_about = None)]
struct Cli {
    #[command(flatten)]
    sources: Sources,
    /// Print machine readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dry-run every rule for a user without recording admissions
    Simulate(SimulateArgs),
    /// Evaluate a user over one or more consecutive days
    Evaluate(EvaluateArgs),
    /// Evaluate every user found in the metrics
    Batch(BatchArgs),
    /// Print the aggregates of a user's variables
    Features(FeaturesArgs),
    /// Check the rules against the variable catalog
    Validate,
    /// Write the normalized rule set as JSON
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show version information
    Version,
}

#[derive(Args)]
struct Target {
    #[arg(short, long)]
    user: String,
    /// Evaluation date (YYYY-MM-DD)
    #[arg(short, long)]
    date: NaiveDate,
    /// Defaults to ALERTLINE_DEFAULT_TENANT
    #[arg(short, long)]
    tenant: Option<String>,
}

#[derive(Args)]
struct SimulateArgs {
    #[command(flatten)]
    target: Target,
    /// Include every rule and its trace
    #[arg(long)]
    debug: bool,
    /// Record admissions in the trigger history (saved with --triggers)
    #[arg(long)]
    commit: bool,
}

#[derive(Args)]
struct EvaluateArgs {
    #[command(flatten)]
    target: Target,
    /// Keep evaluating each following day up to this date
    #[arg(long)]
    through: Option<NaiveDate>,
}

#[derive(Args)]
struct BatchArgs {
    #[arg(short, long)]
    date: NaiveDate,
    #[arg(short, long)]
    tenant: Option<String>,
    /// Dry-run each user instead of recording admissions
    #[arg(long)]
    simulate: bool,
    /// Defaults to ALERTLINE_BATCH_WORKERS
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct FeaturesArgs {
    #[arg(short, long)]
    user: String,
    #[arg(short, long)]
    date: NaiveDate,
    /// Variables to compute; all known variables when omitted
    #[arg(long = "var")]
    vars: Vec<String>,
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", to_pretty_json(value)?);
    } else {
        text(value);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let core = CoreConfig::from_env()?;
    init_tracing(Some(&core.log_level))?;
    let tenant = |explicit: Option<String>| explicit.unwrap_or_else(|| core.default_tenant.clone());

    match cli.command {
        Commands::Simulate(args) => {
            let workspace = Workspace::load(&cli.sources)?;
            let options = if args.commit {
                SimulationOptions::commit(args.debug)
            } else {
                SimulationOptions::dry_run(args.debug)
            };
            let result = workspace
                .engine
                .simulate_with(
                    &args.target.user,
                    args.target.date,
                    &tenant(args.target.tenant),
                    options,
                )
                .await?;
            if args.commit {
                workspace.save_triggers(&cli.sources)?;
            }
            emit(cli.json, &result, output::print_simulation)?;
        }
        Commands::Evaluate(args) => {
            let workspace = Workspace::load(&cli.sources)?;
            let tenant_id = tenant(args.target.tenant);
            let last = args.through.unwrap_or(args.target.date);
            if last < args.target.date {
                bail!("--through {last} is before --date {}", args.target.date);
            }

            let mut date = args.target.date;
            let mut events = Vec::new();
            while date <= last {
                let day = workspace
                    .engine
                    .evaluate_user(&args.target.user, date, &tenant_id)
                    .await
                    .with_context(|| format!("evaluating {} on {date}", args.target.user))?;
                if !cli.json {
                    println!("{}", date);
                    output::print_events(&day);
                }
                events.extend(day);
                date += Duration::days(1);
            }
            info!(
                alerts = events.len(),
                histories = workspace.triggers.len(),
                "evaluation finished"
            );
            workspace.save_triggers(&cli.sources)?;
            if cli.json {
                println!("{}", to_pretty_json(&events)?);
            }
        }
        Commands::Batch(args) => {
            let workspace = Workspace::load(&cli.sources)?;
            let mut config = BatchConfig::from_env()?;
            if let Some(workers) = args.workers {
                config.workers = workers.max(1);
            }
            let mode = if args.simulate {
                TaskMode::Simulate { debug: false }
            } else {
                TaskMode::Evaluate
            };
            let tenant_id = tenant(args.tenant);
            let tasks = workspace
                .metrics
                .users()
                .into_iter()
                .map(|user| {
                    EvaluationTask::builder(tenant_id.clone(), user, args.date)
                        .mode(mode)
                        .build()
                })
                .collect::<Vec<_>>();

            info!(users = tasks.len(), workers = config.workers, tenant = %tenant_id, "starting batch");
            let records = run_batch(workspace.engine.clone(), tasks, &config).await?;
            if !args.simulate {
                workspace.save_triggers(&cli.sources)?;
            }
            emit(cli.json, &records, |records| output::print_batch(records))?;
        }
        Commands::Features(args) => {
            let workspace = Workspace::load(&cli.sources)?;
            let vars = if args.vars.is_empty() {
                workspace.engine.variables().list().into_iter().map(|def| def.key).collect()
            } else {
                args.vars
            };
            let snapshot = workspace
                .engine
                .aggregator()
                .features(&args.user, args.date, &vars)
                .await?;
            emit(cli.json, &snapshot.as_table(), output::print_features)?;
        }
        Commands::Validate => {
            let checks = check_rules(&cli.sources)?;
            output::print_checks(&checks);
            let failing = checks.iter().filter(|check| check.error.is_some()).count();
            if failing > 0 {
                bail!("{failing} of {} rule(s) failed validation", checks.len());
            }
        }
        Commands::Export { output: path } => {
            let rules = rules(&cli.sources)?;
            export_rules(&rules, &path)
                .with_context(|| format!("exporting to {}", path.display()))?;
            println!("Exported {} rule(s) to {}", rules.len(), path.display());
        }
        Commands::Version => {
            println!("alertline v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
