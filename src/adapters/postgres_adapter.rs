//! PostgreSQL persistence adapter.

use crate::domain::allocation::TargetAllocation;
use crate::domain::error::TraderError;
use crate::domain::portfolio::PortfolioState;
use crate::ports::config_port::ConfigPort;
use crate::ports::security_port::SecurityNamePort;
use crate::ports::store_port::{AllocationStore, ScheduledAllocation, StateStore};
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use r2d2_postgres::postgres::{Config, NoTls};
use serde_json::Value;
use tracing::{info, warn};

type Manager = PostgresConnectionManager<NoTls>;

#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<Manager>,
}

fn query_err(e: postgres::Error) -> TraderError {
    TraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl PostgresStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        // [postgres] connection_string first, then [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| TraderError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let pg_config: Config =
            connection_string
                .parse()
                .map_err(|e: postgres::Error| TraderError::ConfigInvalid {
                    section: "postgres".into(),
                    key: "connection_string".into(),
                    reason: e.to_string(),
                })?;

        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(|e: r2d2::Error| TraderError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, TraderError> {
        self.pool.get().map_err(|e: r2d2::Error| TraderError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let mut conn = self.conn()?;
        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS portfolio_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state_json JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS portfolio_history (
                id BIGSERIAL PRIMARY KEY,
                execute_date DATE NOT NULL,
                portfolio_json JSONB NOT NULL,
                cash_weight DOUBLE PRECISION NOT NULL,
                rationale TEXT NOT NULL DEFAULT '',
                executed BOOLEAN NOT NULL DEFAULT FALSE,
                executed_at TIMESTAMPTZ,
                analyzed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS portfolio_stocks (
                id BIGSERIAL PRIMARY KEY,
                portfolio_id BIGINT NOT NULL REFERENCES portfolio_history(id),
                stock_code TEXT NOT NULL,
                stock_name TEXT NOT NULL,
                weight DOUBLE PRECISION NOT NULL,
                score_data JSONB
            );
            CREATE TABLE IF NOT EXISTS stocks (
                ticker TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );",
        )
        .map_err(query_err)
    }
}

impl StateStore for PostgresStore {
    fn load(&self) -> Result<Option<PortfolioState>, TraderError> {
        let mut conn = self.conn()?;
        let row = conn
            .query_opt("SELECT state_json FROM portfolio_state WHERE id = 1", &[])
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let json: Value = row.get(0);
                Ok(Some(serde_json::from_value(json)?))
            }
            None => Ok(None),
        }
    }

    fn save(&self, state: &PortfolioState) -> Result<(), TraderError> {
        let json = serde_json::to_value(state)?;
        let mut conn = self.conn()?;
        conn.execute(
            "INSERT INTO portfolio_state (id, state_json, updated_at) VALUES (1, $1, NOW())
             ON CONFLICT (id) DO UPDATE SET state_json = EXCLUDED.state_json,
                                            updated_at = EXCLUDED.updated_at",
            &[&json],
        )
        .map_err(query_err)?;
        Ok(())
    }
}

impl AllocationStore for PostgresStore {
    fn schedule(
        &self,
        execute_date: NaiveDate,
        allocation: &TargetAllocation,
        rationale: &str,
    ) -> Result<i64, TraderError> {
        let portfolio_json = serde_json::to_value(allocation)?;
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_err)?;

        let row = tx
            .query_one(
                "INSERT INTO portfolio_history (execute_date, portfolio_json, cash_weight, rationale)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id",
                &[&execute_date, &portfolio_json, &allocation.cash_weight, &rationale],
            )
            .map_err(query_err)?;
        let id: i64 = row.get(0);

        for item in &allocation.items {
            let score_data = serde_json::to_value(item)?;
            tx.execute(
                "INSERT INTO portfolio_stocks (portfolio_id, stock_code, stock_name, weight, score_data)
                 VALUES ($1, $2, $3, $4, $5)",
                &[&id, &item.code, &item.name, &item.weight, &score_data],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        info!(id, date = %execute_date, stocks = allocation.items.len(), "allocation scheduled");
        Ok(id)
    }

    fn pending(&self, execute_date: NaiveDate) -> Result<Option<ScheduledAllocation>, TraderError> {
        let mut conn = self.conn()?;
        let row = conn
            .query_opt(
                "SELECT id, execute_date, portfolio_json, rationale, executed, analyzed_at, executed_at
                 FROM portfolio_history
                 WHERE execute_date = $1 AND executed = FALSE
                 ORDER BY analyzed_at DESC, id DESC
                 LIMIT 1",
                &[&execute_date],
            )
            .map_err(query_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let json: Value = row.get(2);
        let analyzed_at: DateTime<Utc> = row.get(5);
        let executed_at: Option<DateTime<Utc>> = row.get(6);
        Ok(Some(ScheduledAllocation {
            id: row.get(0),
            execute_date: row.get(1),
            allocation: serde_json::from_value(json)?,
            rationale: row.get(3),
            executed: row.get(4),
            analyzed_at,
            executed_at,
        }))
    }

    fn mark_executed(&self, id: i64) -> Result<(), TraderError> {
        let mut conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE portfolio_history SET executed = TRUE, executed_at = NOW() WHERE id = $1",
                &[&id],
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

impl SecurityNamePort for PostgresStore {
    fn stock_name(&self, code: &str) -> Option<String> {
        let lookup = || -> Result<Option<String>, TraderError> {
            let mut conn = self.conn()?;
            let row = conn
                .query_opt("SELECT name FROM stocks WHERE ticker = $1", &[&code])
                .map_err(query_err)?;
            Ok(row.map(|r| r.get(0)))
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
