//! Concrete adapter implementations for ports.

#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod csv_adapter;
pub mod fallback_store;
pub mod file_config_adapter;
pub mod json_store;
pub mod paper_broker;
pub mod text_report;
