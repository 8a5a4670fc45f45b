use serde::{Deserialize, Serialize};

/// One message variant a rule may emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    #[serde(default = "MessageCandidate::default_weight")]
    pub weight: f64,
}

impl MessageCandidate {
    pub fn new(text: impl Into<String>, weight: f64) -> Self {
        Self {
            id: None,
            text: text.into(),
            weight,
        }
    }

    pub fn default_weight() -> f64 {
        1.0
    }
}

/// Ordered, weighted list of message candidates. Weights need not sum to one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedMessageSet {
    #[serde(default = "WeightedMessageSet::default_locale")]
    pub locale: String,
    #[serde(default)]
    pub candidates: Vec<MessageCandidate>,
}

impl WeightedMessageSet {
    pub fn new(candidates: Vec<MessageCandidate>) -> Self {
        Self {
            locale: Self::default_locale(),
            candidates,
        }
    }

    pub fn single(text: impl Into<String>) -> Self {
        Self::new(vec![MessageCandidate::new(text, 1.0)])
    }

    pub fn default_locale() -> String {
        "es-ES".to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.candidates.iter().map(|candidate| candidate.weight).sum()
    }
}
