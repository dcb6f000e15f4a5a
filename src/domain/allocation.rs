//! Target allocation normalization.
//!
//! The allocation producer is not consistent about key names (`stock_code`
//! vs `code`, `selected_stocks` vs `portfolio`) or weight scale (0-100 vs
//! 0-1). All of that is absorbed here: [`parse_producer_response`] turns
//! free-form producer text into a [`RawProposal`], and [`normalize`] turns
//! that into a [`TargetAllocation`] that downstream code can trust.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::error::TraderError;
use crate::ports::security_port::SecurityNamePort;

pub const DEFAULT_MAX_POSITIONS: usize = 5;
pub const UNKNOWN_NAME: &str = "Unknown";
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationItem {
    pub code: String,
    pub name: String,
    pub weight: f64,
}

/// Normalized allocation: `Σ weight + cash_weight == 1` and weights in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAllocation {
    pub items: Vec<AllocationItem>,
    pub cash_weight: f64,
}

impl TargetAllocation {
    pub fn all_cash() -> Self {
        TargetAllocation {
            items: Vec::new(),
            cash_weight: 1.0,
        }
    }

    pub fn invested_weight(&self) -> f64 {
        self.items.iter().map(|i| i.weight).sum()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.items.iter().any(|i| i.code == code)
    }

    pub fn weight_of(&self, code: &str) -> Option<f64> {
        self.items.iter().find(|i| i.code == code).map(|i| i.weight)
    }

    pub fn is_all_cash(&self) -> bool {
        self.items.is_empty()
    }
}

/// One entry of an unnormalized proposal, as the producer emitted it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawItem {
    pub code: Option<String>,
    pub name: Option<String>,
    pub weight: f64,
}

impl RawItem {
    pub fn new(code: &str, weight: f64) -> Self {
        RawItem {
            code: Some(code.to_string()),
            name: None,
            weight,
        }
    }

    pub fn named(code: &str, name: &str, weight: f64) -> Self {
        RawItem {
            code: Some(code.to_string()),
            name: Some(name.to_string()),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawProposal {
    pub items: Vec<RawItem>,
    pub rationale: String,
}

impl RawProposal {
    /// Read a proposal out of an already-parsed JSON object.
    ///
    /// `selected_stocks` wins over `portfolio` when both are present.
    pub fn from_value(value: &Value) -> Result<Self, TraderError> {
        let object = value
            .as_object()
            .ok_or_else(|| TraderError::AllocationMalformed {
                reason: "producer output is not a JSON object".into(),
            })?;

        let list: &[Value] = match object.get("selected_stocks").or_else(|| object.get("portfolio")) {
            Some(Value::Array(entries)) => entries.as_slice(),
            Some(Value::Null) | None => &[],
            Some(_) => {
                return Err(TraderError::AllocationMalformed {
                    reason: "stock list is not an array".into(),
                });
            }
        };

        let items = list.iter().filter_map(raw_item).collect();
        let rationale = object
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(RawProposal { items, rationale })
    }
}

fn raw_item(entry: &Value) -> Option<RawItem> {
    let object = entry.as_object()?;

    let weight = match object.get("weight") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    };

    Some(RawItem {
        code: text_field(object, &["stock_code", "code"]),
        name: text_field(object, &["stock_name", "name"]),
        weight,
    })
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Extract the JSON payload from producer text and read it as a proposal.
///
/// Looks for a ```` ```json ```` fence, then any fence, then the outermost
/// braces.
pub fn parse_producer_response(text: &str) -> Result<RawProposal, TraderError> {
    let payload = extract_json(text).ok_or_else(|| TraderError::AllocationMalformed {
        reason: "no JSON object found in producer output".into(),
    })?;
    let value: Value =
        serde_json::from_str(payload).map_err(|e| TraderError::AllocationMalformed {
            reason: e.to_string(),
        })?;
    RawProposal::from_value(&value)
}

fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        let end = body.find("```")?;
        return Some(body[..end].trim());
    }
    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        let end = body.find("```")?;
        return Some(body[..end].trim());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Weights above 1 are read as percentages.
pub fn to_fraction(weight: f64) -> f64 {
    if weight > 1.0 { weight / 100.0 } else { weight }
}

/// Turn a raw proposal into a valid target allocation.
///
/// 1. weights are converted to the `[0, 1]` scale; non-positive, non-finite,
///    codeless and repeated entries are dropped
/// 2. the list is truncated to `max_positions`, preserving producer order
/// 3. if the weights sum above 1 they are shrunk proportionally
/// 4. the remainder becomes `cash_weight`
pub fn normalize(
    raw: &RawProposal,
    max_positions: usize,
    names: &dyn SecurityNamePort,
) -> TargetAllocation {
    let mut seen = HashSet::new();
    let mut items: Vec<AllocationItem> = Vec::with_capacity(raw.items.len());

    for entry in &raw.items {
        let Some(code) = entry.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
            warn!(weight = entry.weight, "allocation entry without a code dropped");
            continue;
        };
        let weight = to_fraction(entry.weight);
        if !weight.is_finite() || weight <= 0.0 {
            debug!(code, weight = entry.weight, "non-positive weight treated as not selected");
            continue;
        }
        if !seen.insert(code.to_string()) {
            warn!(code, "duplicate allocation entry dropped");
            continue;
        }

        let name = names
            .stock_name(code)
            .or_else(|| entry.name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());

        items.push(AllocationItem {
            code: code.to_string(),
            name,
            weight,
        });
    }

    if items.len() > max_positions {
        debug!(
            proposed = items.len(),
            max_positions, "allocation truncated to position cap"
        );
        items.truncate(max_positions);
    }

    let total: f64 = items.iter().map(|i| i.weight).sum();
    if total > 1.0 {
        for item in &mut items {
            item.weight /= total;
        }
    }

    let invested: f64 = items.iter().map(|i| i.weight).sum();
    TargetAllocation {
        items,
        cash_weight: (1.0 - invested).max(0.0),
    }
}

/// Parse and normalize producer text in one step.
///
/// Unparseable output degrades to an all-cash allocation with a warning.
pub fn normalize_response(
    text: &str,
    max_positions: usize,
    names: &dyn SecurityNamePort,
) -> (TargetAllocation, String) {
    match parse_producer_response(text) {
        Ok(raw) => (normalize(&raw, max_positions, names), raw.rationale),
        Err(e) => {
            warn!(error = %e, "allocation producer output rejected, holding 100% cash");
            (TargetAllocation::all_cash(), String::new())
        }
    }
}
