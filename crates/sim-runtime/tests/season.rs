use persistence::SqliteStore;
use sim_core::records::Table;
use sim_core::{LeagueConfig, Role, TeamName};
use sim_runtime::{LeagueSnapshot, RecordFilter, SimulationEngine};

fn engine_with_seed(seed: u64) -> SimulationEngine {
    let config = LeagueConfig {
        seed,
        ..LeagueConfig::default()
    };
    SimulationEngine::new(config).unwrap()
}

#[test]
fn same_seed_replays_the_same_season() {
    let mut a = engine_with_seed(42);
    let mut b = engine_with_seed(42);
    let sa = a.run_season().unwrap();
    let sb = b.run_season().unwrap();
    assert_eq!(sa, sb);
    assert_eq!(a.records().race_results(), b.records().race_results());
    assert_eq!(
        a.records().financial_transactions(),
        b.records().financial_transactions()
    );
    for (name, team) in &a.league().teams {
        assert_eq!(team.ledger.balance(), b.league().team(name).unwrap().ledger.balance());
    }
}

#[test]
fn different_seeds_race_differently() {
    let mut a = engine_with_seed(42);
    let mut b = engine_with_seed(7);
    a.run_season();
    b.run_season();
    assert_ne!(a.records().race_results(), b.records().race_results());
}

#[test]
fn every_ledger_folds_to_its_balance_after_two_seasons() {
    let mut engine = engine_with_seed(42);
    engine.run_season();
    engine.run_season();
    for team in engine.league().teams.values() {
        assert!(team.ledger.verify().is_ok(), "{} ledger broken", team.team.name);
    }
}

#[test]
fn each_season_closes_exactly_once() {
    let mut engine = engine_with_seed(42);
    let summary = engine.run_season().unwrap();
    let rows = engine.records().season_summary().len();
    assert_eq!(rows, summary.standings.len());

    engine.tick();
    assert_eq!(engine.records().season_summary().len(), rows);
    assert!(engine.tracker().team_totals().all(|t| t.seasons <= 1));

    let second = engine.run_season().unwrap();
    assert_eq!(second.season, summary.season + 1);
    assert_eq!(
        engine.records().season_summary().len(),
        rows + second.standings.len()
    );
}

#[test]
fn restored_snapshot_continues_identically() {
    let mut original = engine_with_seed(42);
    original.run_ticks(30);
    let bytes = original.snapshot().to_bytes().unwrap();
    let mut restored =
        SimulationEngine::from_snapshot(LeagueSnapshot::from_bytes(&bytes).unwrap()).unwrap();

    original.run_ticks(10);
    restored.run_ticks(10);
    assert_eq!(original.clock(), restored.clock());
    assert_eq!(original.records(), restored.records());
    assert_eq!(original.league().teams, restored.league().teams);
    assert_eq!(original.bus().all(), restored.bus().all());
}

#[test]
fn champion_tops_the_final_standings() {
    let mut engine = engine_with_seed(42);
    let summary = engine.run_season().unwrap();
    let champion = summary.champion().unwrap();
    assert_eq!(champion.position, 1);
    assert!(summary.standings.iter().all(|s| s.points <= champion.points));
    let totals = engine
        .queries()
        .team_career_totals(&RecordFilter::default().for_team(champion.team.to_string()))
        .unwrap();
    assert_eq!(totals[0].championships, 1);
}

#[test]
fn every_tradeable_role_has_career_rows() {
    let mut engine = engine_with_seed(11);
    engine.run_season().unwrap();
    let q = engine.queries();
    for role in Role::ALL.into_iter().filter(|r| r.is_tradeable()) {
        let rows = q.career_stats(&RecordFilter::default().with_role(role)).unwrap();
        assert!(!rows.is_empty(), "no career rows for {role}");
        assert!(rows.iter().all(|r| r.races_participated > 0));
    }
}

#[tokio::test]
async fn flushed_store_mirrors_the_query_surface() {
    let mut engine = engine_with_seed(42);
    let store = SqliteStore::in_memory().await.unwrap();
    for _ in 0..engine.league().ticks_per_season() {
        engine.tick();
        let batch = engine.pending_record_batch();
        store.flush(&batch).await.unwrap();
        engine.ack_record_batch(&batch);
    }
    let memory = engine.queries().census();
    let persisted = store.census().await.unwrap();
    assert_eq!(memory, persisted);
    assert!(persisted[&Table::RaceResults] > 0);

    let filter = RecordFilter::default().for_team("Apex Racing").limit(5);
    assert_eq!(
        engine.queries().race_results(&filter).unwrap(),
        store.race_results(&filter).await.unwrap()
    );
    assert_eq!(
        engine.queries().championship_standings(&filter).unwrap(),
        store.championship_standings(&filter).await.unwrap()
    );
    let apex = TeamName::from("Apex Racing");
    assert!(engine.queries().context_packet(&apex).is_ok());
}

#[tokio::test]
async fn failed_flush_keeps_rows_for_the_retry() {
    let mut engine = engine_with_seed(7);
    let down = SqliteStore::in_memory().await.unwrap();
    down.pool().close().await;
    for _ in 0..3 {
        engine.tick();
        let batch = engine.pending_record_batch();
        assert!(down.flush(&batch).await.is_err());
    }
    let missed = engine.pending_record_batch();
    assert!(missed.appended_rows() > 0);

    for _ in 0..2 {
        engine.tick();
    }
    let store = SqliteStore::in_memory().await.unwrap();
    let batch = engine.pending_record_batch();
    assert!(batch.appended_rows() > missed.appended_rows());
    store.flush(&batch).await.unwrap();
    engine.ack_record_batch(&batch);

    assert_eq!(engine.pending_record_batch().appended_rows(), 0);
    assert_eq!(engine.queries().census(), store.census().await.unwrap());
}
