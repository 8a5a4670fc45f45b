use std::collections::BTreeSet;
use std::sync::OnceLock;

use alertline_protocol::rule::{AggKind, WeightedMessageSet};
use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aggregator::AggregateSnapshot;
use crate::error::RuleError;
use crate::variables::VariableCatalog;

const FIELD_SEPARATOR: u8 = 0x1f;

/// Candidate picked for one `(user, rule, date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectedMessage {
    pub index: usize,
    /// Candidate id, or its position when the candidate has none.
    pub id: String,
    pub text: String,
}

/// Checks that the set has candidates and every weight is a positive number.
pub fn check_messages(rule_id: &str, messages: &WeightedMessageSet) -> Result<(), RuleError> {
    if messages.is_empty() {
        return Err(RuleError::EmptyMessageSet {
            rule_id: rule_id.to_string(),
        });
    }
    if let Some(candidate) = messages
        .candidates
        .iter()
        .find(|candidate| !(candidate.weight.is_finite() && candidate.weight > 0.0))
    {
        return Err(RuleError::InvalidWeight {
            rule_id: rule_id.to_string(),
            weight: candidate.weight,
        });
    }
    Ok(())
}

/// Stable draw in `[0, 1)` derived from SHA-256 over
/// `user_id 0x1F rule_id 0x1F YYYY-MM-DD`. The top 53 bits of the first
/// eight digest bytes (big-endian) form the fraction.
pub fn selection_draw(user_id: &str, rule_id: &str, date: NaiveDate) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(rule_id.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bits = u64::from_be_bytes(prefix) >> 11;
    bits as f64 / (1u64 << 53) as f64
}

/// Picks the first candidate, in declaration order, whose cumulative weight
/// exceeds the scaled draw. Weights are normalized by the largest one, so
/// the total stays finite for any set of finite positive weights.
pub fn select(
    messages: &WeightedMessageSet,
    user_id: &str,
    rule_id: &str,
    date: NaiveDate,
) -> Result<SelectedMessage, RuleError> {
    check_messages(rule_id, messages)?;

    let max_weight = messages
        .candidates
        .iter()
        .map(|candidate| candidate.weight)
        .fold(0.0_f64, f64::max);
    let total: f64 = messages
        .candidates
        .iter()
        .map(|candidate| candidate.weight / max_weight)
        .sum();

    let target = selection_draw(user_id, rule_id, date) * total;
    let mut cumulative = 0.0;
    let mut chosen = messages.candidates.len() - 1;
    for (index, candidate) in messages.candidates.iter().enumerate() {
        cumulative += candidate.weight / max_weight;
        if cumulative > target {
            chosen = index;
            break;
        }
    }

    let candidate = &messages.candidates[chosen];
    Ok(SelectedMessage {
        index: chosen,
        id: candidate
            .id
            .clone()
            .unwrap_or_else(|| chosen.to_string()),
        text: candidate.text.clone(),
    })
}

/// Message text after placeholder substitution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedMessage {
    pub text: String,
    pub warnings: Vec<String>,
}

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"\{\{\s*([A-Za-z0-9_]+)(?::([A-Za-z0-9_]+))?(?::([^}]+?))?\s*\}\}").ok()
        })
        .as_ref()
}

/// Aggregates referenced by `{{var}}` / `{{var:agg}}` placeholders.
/// Unknown aggregator names are left for [`render`] to report.
pub fn placeholder_refs(template: &str) -> BTreeSet<(String, AggKind)> {
    let Some(pattern) = placeholder_pattern() else {
        return BTreeSet::new();
    };
    pattern
        .captures_iter(template)
        .filter_map(|caps| {
            let var = caps.get(1)?.as_str();
            match caps.get(2) {
                None if var == "rule_id" => None,
                None => Some((var.to_string(), AggKind::Current)),
                Some(agg) => agg.as_str().parse().ok().map(|agg| (var.to_string(), agg)),
            }
        })
        .collect()
}

/// Substitutes placeholders with aggregate values from the snapshot.
///
/// `{{var}}` reads `current`, `{{var:agg}}` a named aggregate and
/// `{{var:agg:.N}}` (optionally `.Nf` or `.N%`) fixes the number of decimals.
/// Without a format the variable's configured decimals apply. `{{rule_id}}`
/// expands to the rule id. A value that cannot be resolved renders as an
/// empty string and adds a warning.
pub fn render(
    template: &str,
    rule_id: &str,
    snapshot: &AggregateSnapshot,
    variables: &VariableCatalog,
) -> RenderedMessage {
    let Some(pattern) = placeholder_pattern() else {
        return RenderedMessage {
            text: template.to_string(),
            warnings: Vec::new(),
        };
    };
    let mut warnings = Vec::new();
    let text = pattern
        .replace_all(template, |caps: &Captures<'_>| {
            let var = caps.get(1).map_or("", |m| m.as_str());
            let agg_name = caps.get(2).map(|m| m.as_str());
            let format = caps.get(3).map(|m| m.as_str().trim());

            if var == "rule_id" && agg_name.is_none() {
                return rule_id.to_string();
            }

            let agg = match agg_name.map(str::parse::<AggKind>) {
                None => AggKind::Current,
                Some(Ok(agg)) => agg,
                Some(Err(_)) => {
                    warnings.push(format!(
                        "placeholder {var}:{} uses an unknown aggregator",
                        agg_name.unwrap_or_default()
                    ));
                    return String::new();
                }
            };

            let Some(value) = snapshot.value(var, agg) else {
                warnings.push(format!("placeholder {var}:{agg} is not available"));
                return String::new();
            };

            match format {
                Some(spec) => format_value(value, spec).unwrap_or_else(|| {
                    warnings.push(format!("invalid format in placeholder {var}:{agg}:{spec}"));
                    value.to_string()
                }),
                None => match variables.get(var).and_then(|def| def.decimals) {
                    Some(decimals) => format!("{value:.decimals$}"),
                    None => value.to_string(),
                },
            }
        })
        .into_owned();

    RenderedMessage { text, warnings }
}

fn format_value(value: f64, spec: &str) -> Option<String> {
    let precision = spec.strip_prefix('.')?;
    if let Some(digits) = precision.strip_suffix('%') {
        let decimals: usize = digits.parse().ok()?;
        return Some(format!("{:.decimals$}%", value * 100.0));
    }
    let digits = precision.strip_suffix('f').unwrap_or(precision);
    let decimals: usize = digits.parse().ok()?;
    Some(format!("{value:.decimals$}"))
}
