//! Token and cost accounting for a generation task
//!
//! Usage accumulates across the LLM nodes of a workflow run and is written
//! to the message record at finalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Running token/cost accounting for one task
///
/// Unit prices are per `price_unit` tokens (e.g. 0.001 USD per 1000
/// tokens is `unit_price = 0.001, price_unit = 1000.0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub prompt_unit_price: f64,
    pub prompt_price_unit: f64,
    pub completion_tokens: u64,
    pub completion_unit_price: f64,
    pub completion_price_unit: f64,
    pub total_tokens: u64,
    pub total_price: f64,
    pub currency: String,
    pub latency: f64,
}

impl Default for Usage {
    fn default() -> Self {
        Self {
            prompt_tokens: 0,
            prompt_unit_price: 0.0,
            prompt_price_unit: 0.0,
            completion_tokens: 0,
            completion_unit_price: 0.0,
            completion_price_unit: 0.0,
            total_tokens: 0,
            total_price: 0.0,
            currency: "USD".to_string(),
            latency: 0.0,
        }
    }
}

impl Usage {
    /// Zeroed accounting, the state every task starts from
    pub fn zero() -> Self {
        Self::default()
    }

    /// True when no tokens have been accounted yet
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }

    /// Fold another node's usage into this running total
    ///
    /// Token counts, prices and latency accumulate; unit prices and
    /// currency take the most recent node's values.
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.total_price += other.total_price;
        self.latency += other.latency;
        self.prompt_unit_price = other.prompt_unit_price;
        self.prompt_price_unit = other.prompt_price_unit;
        self.completion_unit_price = other.completion_unit_price;
        self.completion_price_unit = other.completion_price_unit;
        self.currency = other.currency.clone();
    }

    /// Extract the `usage` object from a node execution's outputs
    ///
    /// Returns `None` when the node reported no usage; partial objects
    /// parse with zero defaults.
    pub fn from_node_outputs(outputs: &Value) -> Option<Usage> {
        let usage = outputs.get("usage")?;
        serde_json::from_value(usage.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zero_usage_is_empty() {
        let usage = Usage::zero();
        assert!(usage.is_empty());
        assert_eq!(usage.currency, "USD");
    }

    #[test]
    fn test_merge_accumulates_counts_and_prices() {
        let mut total = Usage::zero();
        total.merge(&Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            total_price: 0.003,
            ..Usage::zero()
        });
        total.merge(&Usage {
            prompt_tokens: 20,
            completion_tokens: 8,
            total_tokens: 28,
            total_price: 0.005,
            currency: "EUR".to_string(),
            ..Usage::zero()
        });

        assert_eq!(total.prompt_tokens, 30);
        assert_eq!(total.completion_tokens, 13);
        assert_eq!(total.total_tokens, 43);
        assert!((total.total_price - 0.008).abs() < f64::EPSILON);
        assert_eq!(total.currency, "EUR");
    }

    #[test]
    fn test_from_node_outputs_partial_object() {
        let outputs = json!({
            "text": "Hello",
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        });

        let usage = Usage::from_node_outputs(&outputs).unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 0);
        assert_eq!(usage.currency, "USD");
    }

    #[test]
    fn test_from_node_outputs_missing_usage() {
        let outputs = json!({"text": "Hello"});
        assert!(Usage::from_node_outputs(&outputs).is_none());
    }
}
