//! Typed CRUD over the SQLite persistence layer: scans, ticker scores,
//! AI theses, and watchlists. Ground truth: `original_source/data/repository.py`
//! verbatim for the method list and SQL shapes; connection handling
//! generalized from the teacher's `cache.rs` (single mutex-guarded
//! connection, parameterized queries throughout).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::domain::{ScanRun, ScanStatus, SignalDirection, TickerScore, TradeThesis, WatchlistSummary};
use crate::error::RepositoryError;
use crate::health::PersistenceProbe;

mod embedded {
    refinery::embed_migrations!("migrations");
}

fn direction_to_str(direction: SignalDirection) -> &'static str {
    match direction {
        SignalDirection::Bullish => "bullish",
        SignalDirection::Bearish => "bearish",
        SignalDirection::Neutral => "neutral",
    }
}

fn row_to_scan_run(
    id: String,
    started_at: String,
    completed_at: Option<String>,
    status: String,
    preset: String,
    sectors: String,
    ticker_count: u32,
    top_n: u32,
) -> Result<ScanRun, RepositoryError> {
    let started_at = started_at
        .parse::<DateTime<Utc>>()
        .map_err(|e| RepositoryError::Migration(format!("bad started_at timestamp: {e}")))?;
    let completed_at = completed_at
        .map(|s| s.parse::<DateTime<Utc>>())
        .transpose()
        .map_err(|e| RepositoryError::Migration(format!("bad completed_at timestamp: {e}")))?;
    let status = match status.as_str() {
        "running" => ScanStatus::Running,
        "completed" => ScanStatus::Completed,
        "failed" => ScanStatus::Failed,
        other => return Err(RepositoryError::Migration(format!("unknown scan status '{other}'"))),
    };
    let sectors: Vec<String> = serde_json::from_str(&sectors)
        .map_err(|e| RepositoryError::Migration(format!("bad sectors JSON: {e}")))?;
    Ok(ScanRun::new(id, started_at, completed_at, status, preset, sectors, ticker_count, top_n))
}

fn status_to_str(status: ScanStatus) -> &'static str {
    match status {
        ScanStatus::Running => "running",
        ScanStatus::Completed => "completed",
        ScanStatus::Failed => "failed",
    }
}

/// SQLite-backed implementation of all scan, score, thesis, and watchlist
/// persistence. A single connection is serialized behind a mutex, matching
/// the "one writer" resource model used elsewhere in this crate.
pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(|e| RepositoryError::Migration(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self, RepositoryError> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(|e| RepositoryError::Migration(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // ------------------------------------------------------------------
    // Scans
    // ------------------------------------------------------------------

    pub async fn save_scan_run(&self, scan: &ScanRun) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        let sectors = serde_json::to_string(&scan.sectors)
            .map_err(|e| RepositoryError::Migration(format!("failed to serialize sectors: {e}")))?;
        conn.execute(
            "INSERT OR REPLACE INTO scan_runs \
             (id, started_at, completed_at, status, preset, sectors, ticker_count, top_n) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scan.id,
                scan.started_at.to_rfc3339(),
                scan.completed_at.map(|t| t.to_rfc3339()),
                status_to_str(scan.status),
                scan.preset,
                sectors,
                scan.ticker_count,
                scan.top_n,
            ],
        )?;
        Ok(())
    }

    pub async fn save_ticker_scores(
        &self,
        scan_run_id: &str,
        scores: &[TickerScore],
        ticker_directions: &HashMap<String, SignalDirection>,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        for score in scores {
            let breakdown = serde_json::to_string(&score.signals)
                .map_err(|e| RepositoryError::Migration(format!("failed to serialize signals: {e}")))?;
            let direction = ticker_directions
                .get(&score.ticker)
                .copied()
                .unwrap_or(SignalDirection::Neutral);
            conn.execute(
                "INSERT INTO ticker_scores \
                 (scan_run_id, ticker, composite_score, direction, score_breakdown, rank) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    scan_run_id,
                    score.ticker,
                    score.score,
                    direction_to_str(direction),
                    breakdown,
                    score.rank,
                ],
            )?;
        }
        Ok(())
    }

    pub async fn get_latest_scan(&self) -> Result<Option<ScanRun>, RepositoryError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, started_at, completed_at, status, preset, sectors, ticker_count, top_n \
             FROM scan_runs ORDER BY started_at DESC LIMIT 1",
            [],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, u32>(6)?,
                    r.get::<_, u32>(7)?,
                ))
            },
        )
        .optional()?
        .map(|(id, sa, ca, st, p, se, tc, tn)| row_to_scan_run(id, sa, ca, st, p, se, tc, tn))
        .transpose()
    }

    pub async fn get_scan_by_id(&self, scan_id: &str) -> Result<Option<ScanRun>, RepositoryError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, started_at, completed_at, status, preset, sectors, ticker_count, top_n \
             FROM scan_runs WHERE id = ?1",
            [scan_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, u32>(6)?,
                    r.get::<_, u32>(7)?,
                ))
            },
        )
        .optional()?
        .map(|(id, sa, ca, st, p, se, tc, tn)| row_to_scan_run(id, sa, ca, st, p, se, tc, tn))
        .transpose()
    }

    pub async fn list_scan_runs(&self, limit: u32, offset: u32) -> Result<Vec<ScanRun>, RepositoryError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, completed_at, status, preset, sectors, ticker_count, top_n \
             FROM scan_runs ORDER BY started_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit, offset], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, u32>(6)?,
                    r.get::<_, u32>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, sa, ca, st, p, se, tc, tn)| row_to_scan_run(id, sa, ca, st, p, se, tc, tn))
            .collect()
    }

    pub async fn get_scores_for_scan(&self, scan_run_id: &str) -> Result<Vec<TickerScore>, RepositoryError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT ticker, composite_score, score_breakdown, rank \
             FROM ticker_scores WHERE scan_run_id = ?1 ORDER BY rank",
        )?;
        let rows = stmt
            .query_map([scan_run_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, f64>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, u32>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        row_tuples_to_ticker_scores(rows)
    }

    // ------------------------------------------------------------------
    // Ticker history
    // ------------------------------------------------------------------

    pub async fn get_ticker_history(&self, ticker: &str, limit: u32) -> Result<Vec<TickerScore>, RepositoryError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT ts.ticker, ts.composite_score, ts.score_breakdown, ts.rank \
             FROM ticker_scores ts \
             JOIN scan_runs sr ON ts.scan_run_id = sr.id \
             WHERE ts.ticker = ?1 \
             ORDER BY sr.started_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![ticker, limit], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, f64>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, u32>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        row_tuples_to_ticker_scores(rows)
    }

    /// Returns `ticker -> history` for every ticker that has at least one
    /// scored appearance; tickers with no history are omitted.
    pub async fn get_batch_ticker_history(
        &self,
        tickers: &[String],
        limit: u32,
    ) -> Result<HashMap<String, Vec<TickerScore>>, RepositoryError> {
        let mut result = HashMap::new();
        for ticker in tickers {
            let scores = self.get_ticker_history(ticker, limit).await?;
            if !scores.is_empty() {
                result.insert(ticker.clone(), scores);
            }
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // AI thesis
    // ------------------------------------------------------------------

    pub async fn save_ai_thesis(&self, ticker: &str, thesis: &TradeThesis) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        let timestamp = Utc::now().to_rfc3339();
        let risk_factors = serde_json::to_string(&thesis.risk_factors)
            .map_err(|e| RepositoryError::Migration(format!("failed to serialize risk_factors: {e}")))?;
        let full_thesis = serde_json::to_string(thesis)
            .map_err(|e| RepositoryError::Migration(format!("failed to serialize thesis: {e}")))?;
        conn.execute(
            "INSERT INTO ai_theses \
             (ticker, timestamp, direction, conviction, model_used, total_tokens, \
              duration_ms, entry_rationale, risk_factors, recommended_action, \
              bull_summary, bear_summary, disclaimer, full_thesis) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                ticker,
                timestamp,
                direction_to_str(thesis.direction),
                thesis.conviction,
                thesis.model_used,
                thesis.total_tokens,
                thesis.duration_ms,
                thesis.entry_rationale,
                risk_factors,
                thesis.recommended_action,
                thesis.bull_summary,
                thesis.bear_summary,
                thesis.disclaimer,
                full_thesis,
            ],
        )?;
        Ok(())
    }

    pub async fn get_debate_by_id(&self, debate_id: i64) -> Result<Option<TradeThesis>, RepositoryError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row("SELECT full_thesis FROM ai_theses WHERE id = ?1", [debate_id], |r| r.get(0))
            .optional()?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| RepositoryError::Migration(format!("corrupt stored thesis: {e}")))
        })
        .transpose()
    }

    pub async fn list_debates(&self, limit: u32, offset: u32) -> Result<Vec<TradeThesis>, RepositoryError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT full_thesis FROM ai_theses ORDER BY timestamp DESC LIMIT ?1 OFFSET ?2")?;
        let raws = stmt
            .query_map(params![limit, offset], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter()
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| RepositoryError::Migration(format!("corrupt stored thesis: {e}")))
            })
            .collect()
    }

    pub async fn get_debate_history(
        &self,
        ticker: &str,
        direction: Option<SignalDirection>,
        limit: u32,
    ) -> Result<Vec<TradeThesis>, RepositoryError> {
        let conn = self.conn.lock().await;
        let raws: Vec<String> = match direction {
            Some(direction) => {
                let mut stmt = conn.prepare(
                    "SELECT full_thesis FROM ai_theses \
                     WHERE ticker = ?1 AND direction = ?2 \
                     ORDER BY timestamp DESC LIMIT ?3",
                )?;
                stmt.query_map(params![ticker, direction_to_str(direction), limit], |r| r.get(0))?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT full_thesis FROM ai_theses WHERE ticker = ?1 ORDER BY timestamp DESC LIMIT ?2",
                )?;
                stmt.query_map(params![ticker, limit], |r| r.get(0))?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        raws.into_iter()
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| RepositoryError::Migration(format!("corrupt stored thesis: {e}")))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Watchlist CRUD
    // ------------------------------------------------------------------

    pub async fn create_watchlist(&self, name: &str) -> Result<i64, RepositoryError> {
        let conn = self.conn.lock().await;
        let created_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO watchlists (name, created_at) VALUES (?1, ?2)",
            params![name, created_at],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
                RepositoryError::DuplicateWatchlist(name.to_string())
            }
            other => RepositoryError::Sqlite(other),
        })?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn add_tickers_to_watchlist(
        &self,
        watchlist_id: i64,
        tickers: &[String],
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        let added_at = Utc::now().to_rfc3339();
        for ticker in tickers {
            conn.execute(
                "INSERT OR IGNORE INTO watchlist_tickers (watchlist_id, ticker, added_at) \
                 VALUES (?1, ?2, ?3)",
                params![watchlist_id, ticker, added_at],
            )?;
        }
        Ok(())
    }

    pub async fn remove_tickers_from_watchlist(
        &self,
        watchlist_id: i64,
        tickers: &[String],
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        for ticker in tickers {
            conn.execute(
                "DELETE FROM watchlist_tickers WHERE watchlist_id = ?1 AND ticker = ?2",
                params![watchlist_id, ticker],
            )?;
        }
        Ok(())
    }

    pub async fn list_watchlists(&self) -> Result<Vec<WatchlistSummary>, RepositoryError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM watchlists ORDER BY name")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, name, created_at)| {
                let created_at = created_at
                    .parse::<DateTime<Utc>>()
                    .map_err(|e| RepositoryError::Migration(format!("bad created_at timestamp: {e}")))?;
                Ok(WatchlistSummary::new(id, name, created_at))
            })
            .collect()
    }

    pub async fn get_watchlist_tickers(&self, watchlist_id: i64) -> Result<Vec<String>, RepositoryError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT ticker FROM watchlist_tickers WHERE watchlist_id = ?1 ORDER BY ticker")?;
        let rows = stmt
            .query_map([watchlist_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn delete_watchlist(&self, watchlist_id: i64) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM watchlists WHERE id = ?1", [watchlist_id])?;
        Ok(())
    }
}

fn row_tuples_to_ticker_scores(
    rows: Vec<(String, f64, String, u32)>,
) -> Result<Vec<TickerScore>, RepositoryError> {
    rows.into_iter()
        .map(|(ticker, score, breakdown, rank)| {
            let signals: HashMap<String, f64> = serde_json::from_str(&breakdown)
                .map_err(|e| RepositoryError::Migration(format!("bad score_breakdown JSON: {e}")))?;
            TickerScore::new(ticker, score, signals, rank)
                .map_err(|e| RepositoryError::Migration(format!("corrupt stored ticker score: {e}")))
        })
        .collect()
}

#[async_trait]
impl PersistenceProbe for Repository {
    /// Counts applied migrations as a liveness/schema check.
    async fn schema_version_count(&self) -> Result<i64, RepositoryError> {
        let conn = self.conn.lock().await;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM refinery_schema_history", [], |r| r.get(0))?;
        Ok(count)
    }
}

pub type SharedRepository = Arc<Repository>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scan(id: &str, started_at: DateTime<Utc>) -> ScanRun {
        ScanRun::new(
            id,
            started_at,
            None,
            ScanStatus::Completed,
            "default",
            vec!["Technology".to_string()],
            100,
            50,
        )
    }

    #[tokio::test]
    async fn save_and_fetch_latest_scan_round_trips() {
        let repo = Repository::in_memory().unwrap();
        let run = scan("scan-1", Utc::now());
        repo.save_scan_run(&run).await.unwrap();
        let latest = repo.get_latest_scan().await.unwrap().unwrap();
        assert_eq!(latest.id, "scan-1");
        assert_eq!(latest.sectors, vec!["Technology".to_string()]);
    }

    #[tokio::test]
    async fn list_scan_runs_orders_newest_first() {
        let repo = Repository::in_memory().unwrap();
        let earlier = Utc::now() - chrono::Duration::hours(1);
        repo.save_scan_run(&scan("scan-a", earlier)).await.unwrap();
        repo.save_scan_run(&scan("scan-b", Utc::now())).await.unwrap();
        let runs = repo.list_scan_runs(10, 0).await.unwrap();
        assert_eq!(runs[0].id, "scan-b");
        assert_eq!(runs[1].id, "scan-a");
    }

    #[tokio::test]
    async fn save_scan_run_replaces_existing_id() {
        let repo = Repository::in_memory().unwrap();
        let run = scan("scan-1", Utc::now());
        repo.save_scan_run(&run).await.unwrap();
        let mut updated = run.clone();
        updated.ticker_count = 250;
        repo.save_scan_run(&updated).await.unwrap();
        let runs = repo.list_scan_runs(10, 0).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].ticker_count, 250);
    }

    #[tokio::test]
    async fn ticker_scores_round_trip_ordered_by_rank() {
        let repo = Repository::in_memory().unwrap();
        repo.save_scan_run(&scan("scan-1", Utc::now())).await.unwrap();
        let mut signals = HashMap::new();
        signals.insert("rsi_14".to_string(), 60.0);
        let scores = vec![
            TickerScore::new("AAPL", 70.0, signals.clone(), 1).unwrap(),
            TickerScore::new("MSFT", 65.0, signals, 2).unwrap(),
        ];
        let directions = HashMap::from([
            ("AAPL".to_string(), SignalDirection::Bullish),
            ("MSFT".to_string(), SignalDirection::Bearish),
        ]);
        repo.save_ticker_scores("scan-1", &scores, &directions).await.unwrap();
        let fetched = repo.get_scores_for_scan("scan-1").await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].ticker, "AAPL");
        assert_eq!(fetched[1].ticker, "MSFT");
    }

    #[tokio::test]
    async fn ticker_scores_persist_the_computed_direction_not_the_score_sign() {
        let repo = Repository::in_memory().unwrap();
        repo.save_scan_run(&scan("scan-1", Utc::now())).await.unwrap();
        // A positive composite score paired with a bearish computed direction:
        // the stored column must reflect the direction map, not `score > 0`.
        let scores = vec![TickerScore::new("AAPL", 82.0, HashMap::new(), 1).unwrap()];
        let directions = HashMap::from([("AAPL".to_string(), SignalDirection::Bearish)]);
        repo.save_ticker_scores("scan-1", &scores, &directions).await.unwrap();

        let conn = repo.conn.lock().await;
        let stored: String = conn
            .query_row(
                "SELECT direction FROM ticker_scores WHERE scan_run_id = ?1 AND ticker = ?2",
                params!["scan-1", "AAPL"],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stored, "bearish");
    }

    #[tokio::test]
    async fn ticker_scores_default_to_neutral_when_direction_unmapped() {
        let repo = Repository::in_memory().unwrap();
        repo.save_scan_run(&scan("scan-1", Utc::now())).await.unwrap();
        let scores = vec![TickerScore::new("AAPL", 70.0, HashMap::new(), 1).unwrap()];
        repo.save_ticker_scores("scan-1", &scores, &HashMap::new()).await.unwrap();

        let conn = repo.conn.lock().await;
        let stored: String = conn
            .query_row(
                "SELECT direction FROM ticker_scores WHERE scan_run_id = ?1 AND ticker = ?2",
                params!["scan-1", "AAPL"],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stored, "neutral");
    }

    #[tokio::test]
    async fn ticker_history_omits_tickers_with_no_scores() {
        let repo = Repository::in_memory().unwrap();
        repo.save_scan_run(&scan("scan-1", Utc::now())).await.unwrap();
        let scores = vec![TickerScore::new("AAPL", 70.0, HashMap::new(), 1).unwrap()];
        repo.save_ticker_scores("scan-1", &scores, &HashMap::new()).await.unwrap();

        let batch = repo
            .get_batch_ticker_history(&["AAPL".to_string(), "GHOST".to_string()], 10)
            .await
            .unwrap();
        assert!(batch.contains_key("AAPL"));
        assert!(!batch.contains_key("GHOST"));
    }

    fn thesis() -> TradeThesis {
        TradeThesis::new(
            SignalDirection::Bullish,
            0.7,
            "strong uptrend",
            vec!["earnings in 3 days".to_string()],
            "buy call",
            "bulls say...",
            "bears say...",
            "llama3.1:8b",
            500,
            1200,
            "Not financial advice.",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn thesis_round_trips_through_storage() {
        let repo = Repository::in_memory().unwrap();
        repo.save_ai_thesis("AAPL", &thesis()).await.unwrap();
        let debates = repo.list_debates(10, 0).await.unwrap();
        assert_eq!(debates.len(), 1);
        assert_eq!(debates[0].model_used, "llama3.1:8b");

        let history = repo
            .get_debate_history("AAPL", Some(SignalDirection::Bullish), 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        let none_found = repo
            .get_debate_history("AAPL", Some(SignalDirection::Bearish), 10)
            .await
            .unwrap();
        assert!(none_found.is_empty());
    }

    #[tokio::test]
    async fn watchlist_lifecycle() {
        let repo = Repository::in_memory().unwrap();
        let id = repo.create_watchlist("Earnings Plays").await.unwrap();
        repo.add_tickers_to_watchlist(id, &["MSFT".to_string(), "AAPL".to_string()])
            .await
            .unwrap();
        // Duplicate add is a no-op.
        repo.add_tickers_to_watchlist(id, &["AAPL".to_string()]).await.unwrap();

        let tickers = repo.get_watchlist_tickers(id).await.unwrap();
        assert_eq!(tickers, vec!["AAPL".to_string(), "MSFT".to_string()]);

        repo.remove_tickers_from_watchlist(id, &["MSFT".to_string()]).await.unwrap();
        let tickers = repo.get_watchlist_tickers(id).await.unwrap();
        assert_eq!(tickers, vec!["AAPL".to_string()]);

        let lists = repo.list_watchlists().await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Earnings Plays");

        repo.delete_watchlist(id).await.unwrap();
        assert!(repo.list_watchlists().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_watchlist_name_is_rejected() {
        let repo = Repository::in_memory().unwrap();
        repo.create_watchlist("Core").await.unwrap();
        let err = repo.create_watchlist("Core").await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateWatchlist(name) if name == "Core"));
    }

    #[tokio::test]
    async fn schema_version_count_reflects_applied_migrations() {
        let repo = Repository::in_memory().unwrap();
        let count = repo.schema_version_count().await.unwrap();
        assert!(count >= 1);
    }
}
