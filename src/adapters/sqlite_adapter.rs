//! SQLite persistence: portfolio state snapshot, scheduled allocations and
//! the security name table.

use crate::domain::allocation::TargetAllocation;
use crate::domain::error::TraderError;
use crate::domain::portfolio::PortfolioState;
use crate::ports::config_port::ConfigPort;
use crate::ports::security_port::SecurityNamePort;
use crate::ports::store_port::{AllocationStore, ScheduledAllocation, StateStore};
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use tracing::{info, warn};

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> TraderError {
    TraderError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> TraderError {
    TraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_err<E>(len: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(len, rusqlite::types::Type::Text, Box::new(e))
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let db_path = config.require_string("sqlite", "path")?;
        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database; each connection to `:memory:`
    /// would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self, TraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TraderError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS portfolio_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS portfolio_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                execute_date TEXT NOT NULL,
                portfolio_json TEXT NOT NULL,
                cash_weight REAL NOT NULL,
                rationale TEXT NOT NULL DEFAULT '',
                executed INTEGER NOT NULL DEFAULT 0,
                executed_at TEXT,
                analyzed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS portfolio_stocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                portfolio_id INTEGER NOT NULL REFERENCES portfolio_history(id),
                stock_code TEXT NOT NULL,
                stock_name TEXT NOT NULL,
                weight REAL NOT NULL,
                score_data TEXT
            );
            CREATE TABLE IF NOT EXISTS stocks (
                ticker TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_portfolio_history_date
                ON portfolio_history(execute_date, executed);
            CREATE INDEX IF NOT EXISTS idx_portfolio_stocks_portfolio
                ON portfolio_stocks(portfolio_id);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn insert_stock_names(&self, names: &[(&str, &str)]) -> Result<(), TraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for (ticker, name) in names {
            tx.execute(
                "INSERT OR REPLACE INTO stocks (ticker, name) VALUES (?1, ?2)",
                params![ticker, name],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    /// Rows stored in `portfolio_stocks` for an allocation, as `(code, weight)`.
    pub fn allocation_stocks(&self, portfolio_id: i64) -> Result<Vec<(String, f64)>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT stock_code, weight FROM portfolio_stocks
                 WHERE portfolio_id = ?1 ORDER BY id ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![portfolio_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(query_err)?;

        let mut stocks = Vec::new();
        for row in rows {
            stocks.push(row.map_err(query_err)?);
        }
        Ok(stocks)
    }
}

impl StateStore for SqliteStore {
    fn load(&self) -> Result<Option<PortfolioState>, TraderError> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT state_json FROM portfolio_state WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &PortfolioState) -> Result<(), TraderError> {
        let json = serde_json::to_string(state)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO portfolio_state (id, state_json, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json,
                                           updated_at = excluded.updated_at",
            params![json, Utc::now().to_rfc3339()],
        )
        .map_err(query_err)?;
        Ok(())
    }
}

impl AllocationStore for SqliteStore {
    fn schedule(
        &self,
        execute_date: NaiveDate,
        allocation: &TargetAllocation,
        rationale: &str,
    ) -> Result<i64, TraderError> {
        let portfolio_json = serde_json::to_string(allocation)?;
        let mut conn = self.conn()?;

        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction().map_err(query_err)?;

        tx.execute(
            "INSERT INTO portfolio_history
             (execute_date, portfolio_json, cash_weight, rationale, analyzed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                execute_date.format("%Y-%m-%d").to_string(),
                portfolio_json,
                allocation.cash_weight,
                rationale,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(query_err)?;
        let id = tx.last_insert_rowid();

        for item in &allocation.items {
            tx.execute(
                "INSERT INTO portfolio_stocks
                 (portfolio_id, stock_code, stock_name, weight, score_data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, item.code, item.name, item.weight, serde_json::to_string(item)?],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        info!(id, date = %execute_date, stocks = allocation.items.len(), "allocation scheduled");
        Ok(id)
    }

    fn pending(&self, execute_date: NaiveDate) -> Result<Option<ScheduledAllocation>, TraderError> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                "SELECT id, execute_date, portfolio_json, rationale, executed, analyzed_at, executed_at
                 FROM portfolio_history
                 WHERE execute_date = ?1 AND executed = 0
                 ORDER BY analyzed_at DESC, id DESC
                 LIMIT 1",
                params![execute_date.format("%Y-%m-%d").to_string()],
                |row| {
                    let date_str: String = row.get(1)?;
                    let execute_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                        .map_err(|e| conversion_err(date_str.len(), e))?;
                    let json: String = row.get(2)?;
                    let allocation: TargetAllocation = serde_json::from_str(&json)
                        .map_err(|e| conversion_err(json.len(), e))?;
                    let analyzed: String = row.get(5)?;
                    let analyzed_at = parse_timestamp(&analyzed)?;
                    let executed_at = match row.get::<_, Option<String>>(6)? {
                        Some(ts) => Some(parse_timestamp(&ts)?),
                        None => None,
                    };

                    Ok(ScheduledAllocation {
                        id: row.get(0)?,
                        execute_date,
                        allocation,
                        rationale: row.get(3)?,
                        executed: row.get(4)?,
                        analyzed_at,
                        executed_at,
                    })
                },
            )
            .optional()
            .map_err(query_err)?;

        Ok(row)
    }

    fn mark_executed(&self, id: i64) -> Result<(), TraderError> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE portfolio_history SET executed = 1, executed_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(query_err)?;

        if updated == 0 {
            return Err(TraderError::DatabaseQuery {
                reason: format!("no scheduled allocation with id {id}"),
            });
        }
        Ok(())
    }
}

impl SecurityNamePort for SqliteStore {
    fn stock_name(&self, code: &str) -> Option<String> {
        let lookup = || -> Result<Option<String>, TraderError> {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT name FROM stocks WHERE ticker = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)
        };

        match lookup() {
            Ok(name) => name,
            Err(e) => {
                warn!(code, error = %e, "stock name lookup failed");
                None
            }
        }
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(value.len(), e))
}
