//! Persistence ports for portfolio state and scheduled allocations.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::allocation::TargetAllocation;
use crate::domain::error::TraderError;
use crate::domain::portfolio::PortfolioState;

/// A sink that can hold the full portfolio state.
pub trait StateStore {
    fn load(&self) -> Result<Option<PortfolioState>, TraderError>;

    fn save(&self, state: &PortfolioState) -> Result<(), TraderError>;
}

/// An allocation waiting to be executed on `execute_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAllocation {
    pub id: i64,
    pub execute_date: NaiveDate,
    pub allocation: TargetAllocation,
    pub rationale: String,
    pub executed: bool,
    pub analyzed_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Relational record of produced allocations and their execution status.
pub trait AllocationStore {
    /// Store an allocation with its per-stock rows and return its id.
    fn schedule(
        &self,
        execute_date: NaiveDate,
        allocation: &TargetAllocation,
        rationale: &str,
    ) -> Result<i64, TraderError>;

    /// Most recently analyzed, not yet executed allocation for the date.
    fn pending(&self, execute_date: NaiveDate) -> Result<Option<ScheduledAllocation>, TraderError>;

    fn mark_executed(&self, id: i64) -> Result<(), TraderError>;
}
