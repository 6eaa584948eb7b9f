mod retry;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use hl_core::{
    ActivityKind, BehaviorWindow, ChangeType, CompletionEvent, EngineConfig, ExpertiseSort,
    HabitProfile, HistoryFilter, SuggestionStatus, SystemClock, parse_iso8601,
};
use hl_store::config::{config_path, data_dir, db_path, load_config};
use hl_store::{Engine, Store, StoreError};

use crate::retry::{Backoff, retry_blocking};

#[derive(Parser)]
#[command(name = "hl", about = "Habit progression engine CLI and HTTP server")]
struct Cli {
    /// Config file (default: $HL_DATA_DIR/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Award one completion
    Award {
        owner: String,
        habit_id: String,
        /// Domain code (repeat for up to 3)
        #[arg(long = "domain")]
        domains: Vec<String>,
        /// Assessed difficulty level; unassessed when omitted
        #[arg(long)]
        difficulty: Option<f64>,
        /// Current streak in days
        #[arg(long, default_value_t = 0.0)]
        streak: f64,
        /// Count the completion as a task rather than a habit
        #[arg(long)]
        task: bool,
    },

    /// Show an owner's overall level
    Level { owner: String },

    /// List an owner's expertise records
    Expertise {
        owner: String,
        /// level | recent
        #[arg(long, default_value = "level")]
        sort: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one domain with its recent history
    Domain { owner: String, domain_code: String },

    /// Show level-change history
    History {
        owner: String,
        /// Start of range, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SSZ
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        /// overall | expertise | continuity | resilience
        #[arg(long)]
        change_type: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Record the owner's current behavior window (JSON object)
    Behavior { owner: String, window: String },

    /// Register or update a habit's workload
    Habit {
        owner: String,
        habit_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "domain")]
        domains: Vec<String>,
        #[arg(long)]
        difficulty: Option<u8>,
        #[arg(long)]
        sessions: u32,
        #[arg(long)]
        minutes: u32,
        /// Completion rate over the last 30 days, 0-100
        #[arg(long, default_value_t = 100.0)]
        completion_rate: f64,
    },

    /// Detect level-change suggestions for an owner's habits
    Detect { owner: String },

    /// List an owner's suggestions
    Suggestions {
        owner: String,
        /// pending | accepted | dismissed
        #[arg(long)]
        status: Option<String>,
    },

    /// Accept a pending suggestion
    Accept { id: Uuid },

    /// Dismiss a pending suggestion
    Dismiss { id: Uuid },

    /// Run one decay pass over all expertise records
    Decay,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn load_engine_config(cli: &Cli) -> Result<EngineConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_path(&data_dir()));
    load_config(&path).with_context(|| format!("failed to load config {}", path.display()))
}

fn open_store() -> Result<Store> {
    let dir = data_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data dir {}", dir.display()))?;
    Store::open(&db_path(&dir)).context("failed to open progression store")
}

/// Open the store, build an engine and run `op` with retries.
fn with_engine<T>(
    cli: &Cli,
    op: impl Fn(&Engine<'_>) -> Result<T, StoreError>,
) -> Result<T> {
    let config = load_engine_config(cli)?;
    let store = open_store()?;
    let clock = SystemClock;
    let engine = Engine::new(&store, &config, &clock);
    let backoff = Backoff::from_config(&config.retry);
    Ok(retry_blocking(&backoff, || op(&engine))?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve { host, port } => cmd_serve(&cli, host.as_deref(), *port).await,
        Commands::Award {
            owner,
            habit_id,
            domains,
            difficulty,
            streak,
            task,
        } => {
            let event = CompletionEvent {
                owner: owner.clone(),
                habit_id: habit_id.clone(),
                domain_codes: (!domains.is_empty()).then(|| domains.clone()),
                difficulty_level: *difficulty,
                streak_days: *streak,
                kind: if *task { ActivityKind::Task } else { ActivityKind::Habit },
            };
            let outcome = with_engine(&cli, |engine| engine.award_completion(&event))?;
            print_json(&outcome)
        }
        Commands::Level { owner } => cmd_level(&cli, owner),
        Commands::Expertise { owner, sort, limit } => {
            let sort: ExpertiseSort = sort.parse()?;
            let records = with_engine(&cli, |engine| engine.list_expertise(owner, sort, *limit))?;
            print_json(&records)
        }
        Commands::Domain { owner, domain_code } => {
            let detail = with_engine(&cli, |engine| engine.domain_detail(owner, domain_code))?;
            print_json(&detail)
        }
        Commands::History {
            owner,
            from,
            to,
            change_type,
            domain,
            limit,
        } => {
            let filter = HistoryFilter {
                from: from.as_deref().map(parse_iso8601).transpose()?,
                to: to.as_deref().map(parse_iso8601).transpose()?,
                change_type: change_type
                    .as_deref()
                    .map(str::parse::<ChangeType>)
                    .transpose()?,
                domain_code: domain.clone(),
                limit: *limit,
            };
            let entries = with_engine(&cli, |engine| engine.history(owner, &filter))?;
            print_json(&entries)
        }
        Commands::Behavior { owner, window } => {
            let window: BehaviorWindow =
                serde_json::from_str(window).context("behavior window must be a JSON object")?;
            let overall = with_engine(&cli, |engine| engine.record_behavior(owner, &window))?;
            print_json(&overall)
        }
        Commands::Habit {
            owner,
            habit_id,
            name,
            domains,
            difficulty,
            sessions,
            minutes,
            completion_rate,
        } => {
            let habit = HabitProfile {
                owner: owner.clone(),
                habit_id: habit_id.clone(),
                name: name.clone().unwrap_or_else(|| habit_id.clone()),
                domain_codes: domains.clone(),
                difficulty_level: *difficulty,
                sessions_per_week: *sessions,
                minutes_per_session: *minutes,
                completion_rate_30d: *completion_rate,
            };
            let saved = with_engine(&cli, |engine| engine.upsert_habit(&habit))?;
            print_json(&saved)
        }
        Commands::Detect { owner } => {
            let created = with_engine(&cli, |engine| engine.detect_suggestions(owner))?;
            if created.is_empty() {
                eprintln!("no new suggestions");
            }
            print_json(&created)
        }
        Commands::Suggestions { owner, status } => {
            let status = status
                .as_deref()
                .map(str::parse::<SuggestionStatus>)
                .transpose()?;
            let listed = with_engine(&cli, |engine| engine.list_suggestions(owner, status))?;
            print_json(&listed)
        }
        Commands::Accept { id } => {
            let accepted = with_engine(&cli, |engine| engine.accept_suggestion(*id))?;
            print_json(&accepted)
        }
        Commands::Dismiss { id } => {
            let dismissed = with_engine(&cli, |engine| engine.dismiss_suggestion(*id))?;
            print_json(&dismissed)
        }
        Commands::Decay => {
            let report = with_engine(&cli, |engine| engine.run_decay_pass())?;
            print_json(&report)
        }
    }
}

async fn cmd_serve(cli: &Cli, host: Option<&str>, port: Option<u16>) -> Result<()> {
    let config = load_engine_config(cli)?;
    let store = open_store()?;
    let host = host.unwrap_or(&config.server.host).to_string();
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let state = server::AppState::new(store, config, Arc::new(SystemClock));
    server::run(state, addr).await
}

fn cmd_level(cli: &Cli, owner: &str) -> Result<()> {
    let overall = with_engine(cli, |engine| engine.overall_level(owner))?;

    println!("owner:       {}", overall.owner);
    println!(
        "level:       {} ({})",
        overall.overall_level, overall.overall_tier
    );
    println!("experience:  {:.0}", overall.total_experience_points);
    println!("continuity:  {:.1}", overall.habit_continuity_power);
    println!("resilience:  {:.1}", overall.resilience_score);
    println!(
        "calculated:  {}",
        hl_core::unix_to_iso8601(overall.last_calculated_at)
    );
    Ok(())
}
