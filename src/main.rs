use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use driftwatch::backup::{backup_dir, cleanup_session_backups, session_backups};
use driftwatch::classify::classify;
use driftwatch::config::Config;
use driftwatch::git_state::{
    generate_preflight_warnings, GitInspector, PreflightGitSnapshot, VcsInspector,
};
use driftwatch::github::{get_remote_info, GitHubClient, WorkItemBatch};
use driftwatch::metrics::classify_metrics;
use driftwatch::model::{IssueState, ReconcileReport};
use driftwatch::pr_lookup::find_merged_pr_for_issue;
use driftwatch::reconcile::{apply_fixes, backfill_timestamps, BoardFieldCache};

#[derive(Parser, Debug)]
#[command(
    name = "driftwatch",
    about = "Keeps GitHub issue state and project board status in sync",
    version
)]
struct Args {
    /// Path to the repository (defaults to current directory)
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Repository as owner/name (defaults to the path's GitHub remote)
    #[arg(long)]
    repo: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check issue lifecycle state against board status and report drift
    Check {
        /// Apply corrective actions to error-severity findings
        #[arg(long)]
        fix: bool,

        /// Cap on the number of work items to check
        #[arg(long)]
        limit: Option<usize>,

        /// Lifecycle states to fetch
        #[arg(long, value_enum, default_value_t = StateFilter::All)]
        state: StateFilter,

        /// Only check items assigned to the authenticated user
        #[arg(long)]
        mine: bool,
    },
    /// Warn about local repository state before starting or ending a session
    Preflight,
    /// Delete leftover PreCompact session backups
    Cleanup,
    /// Find the merged PR that completed an issue
    PrForIssue {
        /// Issue number to look up
        number: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StateFilter {
    Open,
    Closed,
    All,
}

impl StateFilter {
    fn states(self) -> Vec<IssueState> {
        match self {
            StateFilter::Open => vec![IssueState::Open],
            StateFilter::Closed => vec![IssueState::Closed],
            StateFilter::All => vec![IssueState::Open, IssueState::Closed],
        }
    }
}

fn parse_repo_arg(value: &str) -> Result<(String, String)> {
    match value.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(anyhow!("--repo must be of the form owner/name")),
    }
}

fn resolve_repo(args: &Args) -> Result<(String, String)> {
    match &args.repo {
        Some(value) => parse_repo_arg(value),
        None => get_remote_info(&args.path),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("driftwatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32> {
    match &args.command {
        Command::Check {
            fix,
            limit,
            state,
            mine,
        } => {
            let (owner, repo) = resolve_repo(&args)?;
            run_check(owner, repo, *fix, *limit, *state, *mine).await
        }
        Command::Preflight => {
            let inspector = GitInspector::new(&args.path);
            let snapshot = PreflightGitSnapshot::capture(&inspector);
            let backups = session_backups(&backup_dir(&args.path));
            let warnings = generate_preflight_warnings(&snapshot, backups.len());
            if warnings.is_empty() {
                println!("All clear.");
            } else {
                for warning in &warnings {
                    println!("! {}", warning);
                }
            }
            Ok(0)
        }
        Command::Cleanup => {
            let removed = cleanup_session_backups(&backup_dir(&args.path));
            println!("Removed {} session backup(s)", removed);
            Ok(0)
        }
        Command::PrForIssue { number } => {
            let (owner, repo) = resolve_repo(&args)?;
            let client = GitHubClient::new(owner, repo)?;
            let branch = GitInspector::new(&args.path).current_branch();
            match find_merged_pr_for_issue(&client, branch.as_deref(), *number).await {
                Some(pr) => {
                    println!("#{}", pr);
                    Ok(0)
                }
                None => {
                    println!("No merged PR found for issue #{}", number);
                    Ok(1)
                }
            }
        }
    }
}

async fn run_check(
    owner: String,
    repo: String,
    fix: bool,
    limit: Option<usize>,
    state: StateFilter,
    mine: bool,
) -> Result<i32> {
    let config = Config::load();
    let limit = limit.unwrap_or(config.limit);
    let client = GitHubClient::new(owner, repo)?;

    // A failed read degrades to an empty snapshot rather than aborting.
    let batch = match client.fetch_work_items(&state.states(), limit).await {
        Ok(batch) => batch,
        Err(err) => {
            warn!("failed to fetch work items: {:#}", err);
            WorkItemBatch::default()
        }
    };

    let mut items = batch.items;
    if mine {
        match client.current_login().await {
            Ok(login) => items.retain(|item| item.assignees.iter().any(|a| a == &login)),
            Err(err) => debug!("could not determine current user, skipping filter: {}", err),
        }
    }

    let metrics_cfg = config.metrics();
    let mut inconsistencies = classify(&items, &config.done_statuses);
    inconsistencies.extend(classify_metrics(
        &items,
        &batch.text_fields,
        &metrics_cfg,
        Utc::now(),
    ));

    let mut fixes = Vec::new();
    if fix {
        let mut cache = BoardFieldCache::new();
        fixes = apply_fixes(&client, &items, &inconsistencies, &mut cache).await;
        fixes.extend(
            backfill_timestamps(
                &client,
                &items,
                &batch.text_fields,
                &metrics_cfg,
                &mut cache,
                Utc::now(),
            )
            .await,
        );
    }

    let report = ReconcileReport::new(items.len(), inconsistencies, fixes);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.exit_code(fix))
}
