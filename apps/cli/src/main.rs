#![deny(warnings)]

//! Headless league runner: plays N seasons, optionally mirroring records
//! into SQLite, and prints standings and a table census.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use persistence::{create_save, SqliteStore};
use sim_ai::profiles::load_profiles;
use sim_core::records::Table;
use sim_core::{Control, LeagueConfig, TeamName};
use sim_runtime::{
    load_league_config, ConsumerKind, LeagueSnapshot, SeasonSummary, SimulationEngine,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    /// Extra principal profiles merged over the config's own.
    profiles: Option<String>,
    seasons: Option<u32>,
    seed: Option<u64>,
    db: Option<String>,
    resume: bool,
    /// Leave human teams idle instead of following the advisor.
    manual: bool,
    consumers: Vec<ConsumerKind>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next(),
            "--profiles" => args.profiles = it.next(),
            "--seasons" => args.seasons = it.next().and_then(|s| s.parse().ok()),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--db" => args.db = it.next(),
            "--resume" => args.resume = true,
            "--manual" => args.manual = true,
            "--consumers" => {
                let list = it.next().unwrap_or_default();
                for name in list.split(',').filter(|s| !s.is_empty()) {
                    args.consumers.push(ConsumerKind::from_str(name.trim())?);
                }
            }
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    Ok(args)
}

fn human_teams(engine: &SimulationEngine) -> Vec<TeamName> {
    engine
        .league()
        .teams
        .values()
        .filter(|t| t.is_active() && matches!(t.team.control, Control::Human))
        .map(|t| t.team.name.clone())
        .collect()
}

/// Let the advisor play each human team's turn.
fn drive_humans(engine: &mut SimulationEngine) {
    for team in human_teams(engine) {
        let decision = match engine.advise(&team) {
            Ok(d) => d,
            Err(e) => {
                warn!(%team, error = %e, "advisor unavailable");
                continue;
            }
        };
        if decision.action.is_noop() {
            continue;
        }
        match engine.submit_action(&team, decision.action) {
            Ok(outcome) => debug!(%team, summary = %outcome.summary, "advised action applied"),
            Err(e) => warn!(%team, error = %e, "advised action rejected"),
        }
    }
}

async fn flush(engine: &mut SimulationEngine, store: Option<&SqliteStore>) {
    let Some(store) = store else { return };
    let batch = engine.pending_record_batch();
    if batch.is_empty() {
        return;
    }
    // Unacknowledged rows are offered again on the next flush.
    match store.flush(&batch).await {
        Ok(rows) => {
            engine.ack_record_batch(&batch);
            debug!(rows, "records flushed");
        }
        Err(e) => warn!(error = %e, "record flush failed; retrying next tick"),
    }
}

fn print_season(summary: &SeasonSummary) {
    println!("Season {} ({})", summary.season, summary.league_id);
    for s in &summary.standings {
        println!(
            "  {:>2}. {:<24} {:>4} pts  {:>2} wins  {:>2} podiums  prize {}",
            s.position, s.team, s.points, s.wins, s.podiums, s.prize
        );
    }
}

fn print_census(label: &str, census: &BTreeMap<Table, usize>) {
    println!("{label} census:");
    for (table, rows) in census {
        println!("  {:<24} {rows}", table.as_str());
    }
}

async fn open_engine(args: &Args, store: Option<&SqliteStore>) -> Result<SimulationEngine> {
    if args.resume {
        let store = store.context("--resume needs --db")?;
        if let Some(stored) = store.latest_snapshot().await? {
            let snapshot = LeagueSnapshot::from_bytes(&stored.data)?;
            info!(tick = stored.tick, season = stored.season, "resuming from snapshot");
            return Ok(SimulationEngine::from_snapshot(snapshot)?);
        }
        warn!("no snapshot to resume from; starting a new league");
    }
    let mut config = match &args.config {
        Some(path) => load_league_config(path)?,
        None => LeagueConfig::default(),
    };
    if let Some(path) = &args.profiles {
        config.principals.extend(load_profiles(Path::new(path))?);
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    Ok(SimulationEngine::new(config)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_SHA"),
        built = env!("BUILD_DATE"),
        ?args,
        "starting league runner"
    );

    // An unreachable store degrades to an in-memory run.
    let store = match &args.db {
        Some(url) => match SqliteStore::connect(url).await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(%url, error = %e, "store unavailable; continuing without persistence");
                None
            }
        },
        None => None,
    };
    let mut engine = open_engine(&args, store.as_ref()).await?;
    let save_id = match &store {
        Some(store) => {
            let league = engine.league().config.league_id.clone();
            Some(create_save(store.pool(), &league, Some("cli run")).await?)
        }
        None => None,
    };
    let mut consumers = engine.consumers(&args.consumers);

    let tps = engine.league().ticks_per_season();
    for _ in 0..args.seasons.unwrap_or(1) {
        for _ in 0..tps {
            if !args.manual {
                drive_humans(&mut engine);
            }
            let summary = engine.tick();
            consumers.pump();
            flush(&mut engine, store.as_ref()).await;
            if let Some(season) = summary.season_summary {
                print_season(&season);
                if let (Some(store), Some(save_id)) = (&store, save_id) {
                    let clock = engine.clock();
                    let bytes = engine.snapshot().to_bytes()?;
                    if let Err(e) = store.save_snapshot(save_id, clock.tick, clock.season, &bytes).await {
                        warn!(error = %e, "snapshot not saved");
                    }
                }
            }
        }
    }

    let clock = engine.clock();
    println!("Played to tick {} (season {})", clock.tick, clock.season);
    print_census("In-memory", &engine.queries().census());
    if let Some(store) = &store {
        match store.census().await {
            Ok(census) => print_census("Persisted", &census),
            Err(e) => warn!(error = %e, "persisted census unavailable"),
        }
    }
    if !consumers.is_empty() {
        println!("{}", serde_json::to_string_pretty(&consumers.summaries())?);
    }
    Ok(())
}
