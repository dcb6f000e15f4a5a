//! Port traits: the seams between domain logic and the outside world.

pub mod broker_port;
pub mod config_port;
pub mod report_port;
pub mod security_port;
pub mod store_port;
