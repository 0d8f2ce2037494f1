//! SQLite-backed mirror of the record book.
//!
//! Primary tables are appended on every flush; derived tables are replaced
//! wholesale with the image carried by the batch. Flushes happen between
//! ticks only, so the store never races the simulation.

use std::collections::BTreeMap;
use std::str::FromStr;

use sim_core::records::{
    ActiveStreaks, CareerStatsRow, ChampionshipStandingRow, FinancialTransactionRow,
    FinishStatus, Momentum, RaceResultRow, RecordBatch, RecordFilter, SeasonSummaryRow, Table,
    TeamCareerTotals, TeamOutcomeRow, TeamPulse,
};
use sim_core::Role;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use crate::{cents_to_decimal, decimal_to_cents_i64, init_db, migrate, PersistenceError};

/// A snapshot blob with the position it was taken at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub save_id: i64,
    pub tick: u64,
    pub season: u32,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn tick_col(row: &SqliteRow, name: &str) -> Result<u64, PersistenceError> {
    let raw: i64 = row.try_get(name)?;
    u64::try_from(raw).map_err(|_| PersistenceError::Encode(format!("negative {name}: {raw}")))
}

fn tick_param(tick: u64) -> Result<i64, PersistenceError> {
    i64::try_from(tick).map_err(|_| PersistenceError::Encode(format!("tick {tick} out of range")))
}

fn role_col(row: &SqliteRow) -> Result<Role, PersistenceError> {
    let raw: String = row.try_get("role")?;
    Role::ALL
        .into_iter()
        .find(|r| r.as_str() == raw)
        .ok_or_else(|| PersistenceError::Encode(format!("unknown role {raw:?}")))
}

fn status_col(row: &SqliteRow) -> Result<FinishStatus, PersistenceError> {
    let raw: String = row.try_get("status")?;
    [FinishStatus::Finished, FinishStatus::Dnf]
        .into_iter()
        .find(|s| s.as_str() == raw)
        .ok_or_else(|| PersistenceError::Encode(format!("unknown finish status {raw:?}")))
}

fn momentum_col(row: &SqliteRow) -> Result<Momentum, PersistenceError> {
    let raw: String = row.try_get("momentum")?;
    [Momentum::Rising, Momentum::Steady, Momentum::Falling]
        .into_iter()
        .find(|m| m.as_str() == raw)
        .ok_or_else(|| PersistenceError::Encode(format!("unknown momentum {raw:?}")))
}

/// Start a filtered select; `team_col` and `season_col` name the columns the
/// filter's team and season apply to, if the table has them.
fn select<'a>(
    sql: &str,
    f: &'a RecordFilter,
    team_col: Option<&str>,
    season_col: Option<&str>,
) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(sql);
    qb.push(" WHERE 1 = 1");
    if let (Some(col), Some(team)) = (team_col, f.team.as_deref()) {
        qb.push(format!(" AND {col} = ")).push_bind(team);
    }
    if let (Some(col), Some(season)) = (season_col, f.season) {
        qb.push(format!(" AND {col} = ")).push_bind(season);
    }
    qb
}

fn finish(qb: &mut QueryBuilder<'_, Sqlite>, order: &str, f: &RecordFilter) {
    qb.push(format!(" ORDER BY {order}"));
    if let Some(limit) = f.limit {
        qb.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
}

impl SqliteStore {
    /// Open the store at `url`; an unreachable database is reported as
    /// [`PersistenceError::MissingDependency`].
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        Ok(Self {
            pool: init_db(url).await?,
        })
    }

    /// Private in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| PersistenceError::MissingDependency(e.to_string()))?;
        // One connection that never idles out; each new connection would see
        // a fresh empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| PersistenceError::MissingDependency(e.to_string()))?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Write one batch in a single transaction. Returns the number of
    /// primary rows appended.
    pub async fn flush(&self, batch: &RecordBatch) -> Result<usize, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        for r in &batch.season_summary {
            sqlx::query(
                "INSERT OR IGNORE INTO season_summary \
                 (season, tick, league_id, team_name, final_position, points, prize_money_cents) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(r.season)
            .bind(tick_param(r.tick)?)
            .bind(&r.league_id)
            .bind(&r.team_name)
            .bind(r.final_position)
            .bind(r.points)
            .bind(decimal_to_cents_i64(r.prize_money)?)
            .execute(&mut *tx)
            .await?;
        }
        for r in &batch.race_results {
            sqlx::query(
                "INSERT OR IGNORE INTO race_results \
                 (season, race_number, tick, track_name, team_name, driver_name, \
                  grid_position, finish_position, points_earned, status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(r.season)
            .bind(r.race_number)
            .bind(tick_param(r.tick)?)
            .bind(&r.track_name)
            .bind(&r.team_name)
            .bind(&r.driver_name)
            .bind(r.grid_position)
            .bind(r.finish_position)
            .bind(r.points_earned)
            .bind(r.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        for r in &batch.financial_transactions {
            sqlx::query(
                "INSERT INTO financial_transactions \
                 (tick, season, team_name, transaction_type, amount_cents, balance_after_cents, description) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(tick_param(r.tick)?)
            .bind(r.season)
            .bind(&r.team_name)
            .bind(&r.transaction_type)
            .bind(decimal_to_cents_i64(r.amount)?)
            .bind(decimal_to_cents_i64(r.balance_after)?)
            .bind(&r.description)
            .execute(&mut *tx)
            .await?;
        }
        for r in &batch.team_outcomes {
            sqlx::query(
                "INSERT INTO team_outcomes \
                 (tick, season, team_name, decision_type, outcome_data, result_score) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(tick_param(r.tick)?)
            .bind(r.season)
            .bind(&r.team_name)
            .bind(&r.decision_type)
            .bind(&r.outcome_data)
            .bind(r.result_score)
            .execute(&mut *tx)
            .await?;
        }
        for r in &batch.championship_standings {
            sqlx::query(
                "INSERT INTO championship_standings \
                 (tick, season, league_id, team_name, position, points, races_completed) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(tick_param(r.tick)?)
            .bind(r.season)
            .bind(&r.league_id)
            .bind(&r.team_name)
            .bind(r.position)
            .bind(r.points)
            .bind(r.races_completed)
            .execute(&mut *tx)
            .await?;
        }

        for table in Table::ALL.into_iter().filter(|t| t.is_derived()) {
            sqlx::query(&format!("DELETE FROM {}", table.as_str()))
                .execute(&mut *tx)
                .await?;
        }
        for r in &batch.career_stats {
            sqlx::query(
                "INSERT INTO career_stats \
                 (entity_name, role, races_participated, wins, podiums, points_total, championships) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&r.entity_name)
            .bind(r.role.as_str())
            .bind(r.races_participated)
            .bind(r.wins)
            .bind(r.podiums)
            .bind(r.points_total)
            .bind(r.championships)
            .execute(&mut *tx)
            .await?;
        }
        for r in &batch.team_career_totals {
            sqlx::query(
                "INSERT INTO team_career_totals \
                 (team_name, seasons, races, wins, podiums, points, championships, \
                  best_finish, peak_season_points, peak_season) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&r.team_name)
            .bind(r.seasons)
            .bind(r.races)
            .bind(r.wins)
            .bind(r.podiums)
            .bind(r.points)
            .bind(r.championships)
            .bind(r.best_finish)
            .bind(r.peak_season_points)
            .bind(r.peak_season)
            .execute(&mut *tx)
            .await?;
        }
        for r in &batch.active_streaks {
            sqlx::query(
                "INSERT INTO active_streaks \
                 (team_name, current_podiums, current_points, current_dnfs, \
                  best_podiums, best_points, longest_dnfs) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&r.team_name)
            .bind(r.current_podiums)
            .bind(r.current_points)
            .bind(r.current_dnfs)
            .bind(r.best_podiums)
            .bind(r.best_points)
            .bind(r.longest_dnfs)
            .execute(&mut *tx)
            .await?;
        }
        for r in &batch.team_pulse_metrics {
            sqlx::query(
                "INSERT INTO team_pulse_metrics \
                 (team_name, tick, pulse, win_rate, momentum, momentum_value, streak_magnitude) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&r.team_name)
            .bind(tick_param(r.tick)?)
            .bind(r.pulse)
            .bind(r.win_rate)
            .bind(r.momentum.as_str())
            .bind(r.momentum_value)
            .bind(r.streak_magnitude)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        let appended = batch.appended_rows();
        debug!(appended, "record batch flushed");
        Ok(appended)
    }

    pub async fn save_snapshot(
        &self,
        save_id: i64,
        tick: u64,
        season: u32,
        data: &[u8],
    ) -> Result<i64, PersistenceError> {
        let done = sqlx::query("INSERT INTO snapshots (save_id, tick, season, data) VALUES (?, ?, ?, ?)")
            .bind(save_id)
            .bind(tick_param(tick)?)
            .bind(season)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(done.last_insert_rowid())
    }

    /// Most recently written snapshot of any save.
    pub async fn latest_snapshot(&self) -> Result<Option<StoredSnapshot>, PersistenceError> {
        let row = sqlx::query("SELECT save_id, tick, season, data FROM snapshots ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<_, PersistenceError> {
            Ok(StoredSnapshot {
                save_id: row.try_get("save_id")?,
                tick: tick_col(&row, "tick")?,
                season: row.try_get("season")?,
                data: row.try_get("data")?,
            })
        })
        .transpose()
    }

    pub async fn season_summary(
        &self,
        f: &RecordFilter,
    ) -> Result<Vec<SeasonSummaryRow>, PersistenceError> {
        f.validate_for(Table::SeasonSummary)?;
        let mut qb = select(
            "SELECT season, tick, league_id, team_name, final_position, points, prize_money_cents \
             FROM season_summary",
            f,
            Some("team_name"),
            Some("season"),
        );
        finish(&mut qb, "id DESC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(SeasonSummaryRow {
                    season: row.try_get("season")?,
                    tick: tick_col(row, "tick")?,
                    league_id: row.try_get("league_id")?,
                    team_name: row.try_get("team_name")?,
                    final_position: row.try_get("final_position")?,
                    points: row.try_get("points")?,
                    prize_money: cents_to_decimal(row.try_get("prize_money_cents")?),
                })
            })
            .collect()
    }

    /// `entity` matches the driver name.
    pub async fn race_results(&self, f: &RecordFilter) -> Result<Vec<RaceResultRow>, PersistenceError> {
        f.validate_for(Table::RaceResults)?;
        let mut qb = select(
            "SELECT season, race_number, tick, track_name, team_name, driver_name, \
             grid_position, finish_position, points_earned, status FROM race_results",
            f,
            Some("team_name"),
            Some("season"),
        );
        if let Some(driver) = f.entity.as_deref() {
            qb.push(" AND driver_name = ").push_bind(driver);
        }
        finish(&mut qb, "id DESC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(RaceResultRow {
                    season: row.try_get("season")?,
                    race_number: row.try_get("race_number")?,
                    tick: tick_col(row, "tick")?,
                    track_name: row.try_get("track_name")?,
                    team_name: row.try_get("team_name")?,
                    driver_name: row.try_get("driver_name")?,
                    grid_position: row.try_get("grid_position")?,
                    finish_position: row.try_get("finish_position")?,
                    points_earned: row.try_get("points_earned")?,
                    status: status_col(row)?,
                })
            })
            .collect()
    }

    pub async fn financial_transactions(
        &self,
        f: &RecordFilter,
    ) -> Result<Vec<FinancialTransactionRow>, PersistenceError> {
        f.validate_for(Table::FinancialTransactions)?;
        let mut qb = select(
            "SELECT tick, season, team_name, transaction_type, amount_cents, balance_after_cents, \
             description FROM financial_transactions",
            f,
            Some("team_name"),
            Some("season"),
        );
        finish(&mut qb, "id DESC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(FinancialTransactionRow {
                    tick: tick_col(row, "tick")?,
                    season: row.try_get("season")?,
                    team_name: row.try_get("team_name")?,
                    transaction_type: row.try_get("transaction_type")?,
                    amount: cents_to_decimal(row.try_get("amount_cents")?),
                    balance_after: cents_to_decimal(row.try_get("balance_after_cents")?),
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    pub async fn team_outcomes(&self, f: &RecordFilter) -> Result<Vec<TeamOutcomeRow>, PersistenceError> {
        f.validate_for(Table::TeamOutcomes)?;
        let mut qb = select(
            "SELECT tick, season, team_name, decision_type, outcome_data, result_score FROM team_outcomes",
            f,
            Some("team_name"),
            Some("season"),
        );
        finish(&mut qb, "id DESC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(TeamOutcomeRow {
                    tick: tick_col(row, "tick")?,
                    season: row.try_get("season")?,
                    team_name: row.try_get("team_name")?,
                    decision_type: row.try_get("decision_type")?,
                    outcome_data: row.try_get("outcome_data")?,
                    result_score: row.try_get("result_score")?,
                })
            })
            .collect()
    }

    pub async fn championship_standings(
        &self,
        f: &RecordFilter,
    ) -> Result<Vec<ChampionshipStandingRow>, PersistenceError> {
        f.validate_for(Table::ChampionshipStandings)?;
        let mut qb = select(
            "SELECT tick, season, league_id, team_name, position, points, races_completed \
             FROM championship_standings",
            f,
            Some("team_name"),
            Some("season"),
        );
        finish(&mut qb, "id DESC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(ChampionshipStandingRow {
                    tick: tick_col(row, "tick")?,
                    season: row.try_get("season")?,
                    league_id: row.try_get("league_id")?,
                    team_name: row.try_get("team_name")?,
                    position: row.try_get("position")?,
                    points: row.try_get("points")?,
                    races_completed: row.try_get("races_completed")?,
                })
            })
            .collect()
    }

    /// Career lines, most points first.
    pub async fn career_stats(&self, f: &RecordFilter) -> Result<Vec<CareerStatsRow>, PersistenceError> {
        f.validate_for(Table::CareerStats)?;
        let mut qb = select(
            "SELECT entity_name, role, races_participated, wins, podiums, points_total, championships \
             FROM career_stats",
            f,
            None,
            None,
        );
        if let Some(name) = f.entity.as_deref() {
            qb.push(" AND entity_name = ").push_bind(name);
        }
        if let Some(role) = f.role {
            qb.push(" AND role = ").push_bind(role.as_str());
        }
        finish(&mut qb, "points_total DESC, entity_name ASC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(CareerStatsRow {
                    entity_name: row.try_get("entity_name")?,
                    role: role_col(row)?,
                    races_participated: row.try_get("races_participated")?,
                    wins: row.try_get("wins")?,
                    podiums: row.try_get("podiums")?,
                    points_total: row.try_get("points_total")?,
                    championships: row.try_get("championships")?,
                })
            })
            .collect()
    }

    pub async fn team_career_totals(
        &self,
        f: &RecordFilter,
    ) -> Result<Vec<TeamCareerTotals>, PersistenceError> {
        f.validate_for(Table::TeamCareerTotals)?;
        let mut qb = select(
            "SELECT team_name, seasons, races, wins, podiums, points, championships, best_finish, \
             peak_season_points, peak_season FROM team_career_totals",
            f,
            Some("team_name"),
            None,
        );
        finish(&mut qb, "team_name ASC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(TeamCareerTotals {
                    team_name: row.try_get("team_name")?,
                    seasons: row.try_get("seasons")?,
                    races: row.try_get("races")?,
                    wins: row.try_get("wins")?,
                    podiums: row.try_get("podiums")?,
                    points: row.try_get("points")?,
                    championships: row.try_get("championships")?,
                    best_finish: row.try_get("best_finish")?,
                    peak_season_points: row.try_get("peak_season_points")?,
                    peak_season: row.try_get("peak_season")?,
                })
            })
            .collect()
    }

    pub async fn active_streaks(&self, f: &RecordFilter) -> Result<Vec<ActiveStreaks>, PersistenceError> {
        f.validate_for(Table::ActiveStreaks)?;
        let mut qb = select(
            "SELECT team_name, current_podiums, current_points, current_dnfs, best_podiums, \
             best_points, longest_dnfs FROM active_streaks",
            f,
            Some("team_name"),
            None,
        );
        finish(&mut qb, "team_name ASC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(ActiveStreaks {
                    team_name: row.try_get("team_name")?,
                    current_podiums: row.try_get("current_podiums")?,
                    current_points: row.try_get("current_points")?,
                    current_dnfs: row.try_get("current_dnfs")?,
                    best_podiums: row.try_get("best_podiums")?,
                    best_points: row.try_get("best_points")?,
                    longest_dnfs: row.try_get("longest_dnfs")?,
                })
            })
            .collect()
    }

    pub async fn team_pulse_metrics(&self, f: &RecordFilter) -> Result<Vec<TeamPulse>, PersistenceError> {
        f.validate_for(Table::TeamPulseMetrics)?;
        let mut qb = select(
            "SELECT team_name, tick, pulse, win_rate, momentum, momentum_value, streak_magnitude \
             FROM team_pulse_metrics",
            f,
            Some("team_name"),
            None,
        );
        finish(&mut qb, "team_name ASC", f);
        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<_, PersistenceError> {
                Ok(TeamPulse {
                    team_name: row.try_get("team_name")?,
                    tick: tick_col(row, "tick")?,
                    pulse: row.try_get("pulse")?,
                    win_rate: row.try_get("win_rate")?,
                    momentum: momentum_col(row)?,
                    momentum_value: row.try_get("momentum_value")?,
                    streak_magnitude: row.try_get("streak_magnitude")?,
                })
            })
            .collect()
    }

    /// Row count of every logical table.
    pub async fn census(&self) -> Result<BTreeMap<Table, usize>, PersistenceError> {
        let mut counts = BTreeMap::new();
        for table in Table::ALL {
            let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.as_str()))
                .fetch_one(&self.pool)
                .await?;
            counts.insert(table, usize::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sim_core::SimError;

    fn race_row(tick: u64, race: u32, team: &str, finish: u32) -> RaceResultRow {
        RaceResultRow {
            season: 1,
            race_number: race,
            tick,
            track_name: "Harbour Loop".into(),
            team_name: team.into(),
            driver_name: format!("{team} driver"),
            grid_position: finish,
            finish_position: finish,
            points_earned: if finish == 1 { 25 } else { 18 },
            status: FinishStatus::Finished,
        }
    }

    fn sample_batch() -> RecordBatch {
        RecordBatch {
            race_results: vec![
                race_row(2, 1, "Apex Racing", 1),
                race_row(2, 1, "Meridian GP", 2),
                race_row(4, 2, "Apex Racing", 2),
                race_row(4, 2, "Meridian GP", 1),
            ],
            financial_transactions: vec![FinancialTransactionRow {
                tick: 2,
                season: 1,
                team_name: "Apex Racing".into(),
                transaction_type: "prize".into(),
                amount: Decimal::new(25_000_050, 2),
                balance_after: Decimal::new(1_225_000_050, 2),
                description: "race 1 prize".into(),
            }],
            career_stats: vec![CareerStatsRow {
                entity_name: "Apex Racing driver".into(),
                role: Role::Driver,
                races_participated: 2,
                wins: 1,
                podiums: 2,
                points_total: 43,
                championships: 0,
            }],
            team_pulse_metrics: vec![TeamPulse {
                team_name: "Apex Racing".into(),
                tick: 4,
                pulse: 61.5,
                win_rate: 0.5,
                momentum: Momentum::Falling,
                momentum_value: -0.25,
                streak_magnitude: 0.5,
            }],
            ..RecordBatch::default()
        }
    }

    #[tokio::test]
    async fn flushed_rows_read_back_newest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.flush(&sample_batch()).await.unwrap(), 5);

        let apex = store
            .race_results(&RecordFilter::default().for_team("Apex Racing"))
            .await
            .unwrap();
        assert_eq!(apex.len(), 2);
        assert_eq!(apex[0].race_number, 2);
        assert_eq!(apex[1], race_row(2, 1, "Apex Racing", 1));

        let money = store
            .financial_transactions(&RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(money[0].amount, Decimal::new(25_000_050, 2));

        let pulse = store.team_pulse_metrics(&RecordFilter::default()).await.unwrap();
        assert_eq!(pulse[0].momentum, Momentum::Falling);

        let career = store
            .career_stats(&RecordFilter::default().with_role(Role::Driver))
            .await
            .unwrap();
        assert_eq!(career[0].points_total, 43);
    }

    #[tokio::test]
    async fn derived_tables_are_replaced_not_appended() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.flush(&sample_batch()).await.unwrap();
        let mut next = RecordBatch {
            career_stats: sample_batch().career_stats,
            ..RecordBatch::default()
        };
        next.career_stats[0].points_total = 61;
        store.flush(&next).await.unwrap();

        let census = store.census().await.unwrap();
        assert_eq!(census.len(), Table::ALL.len());
        assert_eq!(census[&Table::RaceResults], 4);
        assert_eq!(census[&Table::CareerStats], 1);
        assert_eq!(census[&Table::TeamPulseMetrics], 0);
        let career = store.career_stats(&RecordFilter::default()).await.unwrap();
        assert_eq!(career[0].points_total, 61);
    }

    #[tokio::test]
    async fn replayed_race_rows_are_ignored() {
        let store = SqliteStore::in_memory().await.unwrap();
        let batch = sample_batch();
        store.flush(&batch).await.unwrap();
        store.flush(&batch).await.unwrap();
        assert_eq!(store.census().await.unwrap()[&Table::RaceResults], 4);
    }

    #[tokio::test]
    async fn limits_and_bad_filters() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.flush(&sample_batch()).await.unwrap();
        let one = store
            .race_results(&RecordFilter::default().limit(1))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].tick, 4);
        assert!(matches!(
            store.race_results(&RecordFilter::default().in_season(0)).await,
            Err(PersistenceError::Filter(_))
        ));
    }

    #[tokio::test]
    async fn season_filter_on_seasonless_tables_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.flush(&sample_batch()).await.unwrap();
        let f = RecordFilter::default().in_season(1);
        assert!(matches!(
            store.team_career_totals(&f).await,
            Err(PersistenceError::Filter(SimError::InvalidInput(_)))
        ));
        assert!(matches!(
            store.active_streaks(&f).await,
            Err(PersistenceError::Filter(SimError::InvalidInput(_)))
        ));
        assert!(matches!(
            store.team_pulse_metrics(&f).await,
            Err(PersistenceError::Filter(SimError::InvalidInput(_)))
        ));
        assert!(matches!(
            store.career_stats(&f).await,
            Err(PersistenceError::Filter(SimError::InvalidInput(_)))
        ));
        assert!(!store.race_results(&f).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_snapshot_wins() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.latest_snapshot().await.unwrap().is_none());
        let save = crate::create_save(store.pool(), "test", None).await.unwrap();
        store.save_snapshot(save, 12, 1, b"first").await.unwrap();
        store.save_snapshot(save, 24, 2, b"second").await.unwrap();
        let latest = store.latest_snapshot().await.unwrap().unwrap();
        assert_eq!(latest.save_id, save);
        assert_eq!(latest.tick, 24);
        assert_eq!(latest.data, b"second".to_vec());
    }

    #[tokio::test]
    async fn unreachable_store_is_a_missing_dependency() {
        let result = SqliteStore::connect("sqlite:///nonexistent-dir/league.db").await;
        assert!(matches!(result, Err(PersistenceError::MissingDependency(_))));
    }
}
