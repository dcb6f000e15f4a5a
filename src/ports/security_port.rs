//! Security master lookup port.

use std::collections::HashMap;

/// Resolves a ticker code to its display name.
pub trait SecurityNamePort {
    fn stock_name(&self, code: &str) -> Option<String>;
}

impl SecurityNamePort for HashMap<String, String> {
    fn stock_name(&self, code: &str) -> Option<String> {
        self.get(code).cloned()
    }
}
