use serde::{Deserialize, Serialize};

use crate::rule::AggKind;

/// Registry entry describing a metric variable available to rule authors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableDef {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default = "VariableDef::default_aggregators")]
    pub allowed_aggregators: Vec<AggKind>,
    /// Inclusive `[min, max]` bounds, either side optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_range: Option<(Option<f64>, Option<f64>)>,
    /// Decimal places used when the value is rendered into a message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default = "VariableDef::default_tenant")]
    pub tenant_id: String,
}

impl VariableDef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            description: None,
            unit: None,
            allowed_aggregators: Self::default_aggregators(),
            valid_range: None,
            decimals: None,
            category: None,
            tenant_id: Self::default_tenant(),
        }
    }

    pub fn default_aggregators() -> Vec<AggKind> {
        AggKind::ALL.to_vec()
    }

    pub fn default_tenant() -> String {
        "default".to_string()
    }

    pub fn allows(&self, agg: AggKind) -> bool {
        self.allowed_aggregators.contains(&agg)
    }

    pub fn with_aggregators(mut self, aggregators: Vec<AggKind>) -> Self {
        self.allowed_aggregators = aggregators;
        self
    }
}
