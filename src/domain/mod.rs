//! Core domain types and logic.

pub mod allocation;
pub mod calendar;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod metrics;
pub mod portfolio;
pub mod rebalance;
pub mod report;
