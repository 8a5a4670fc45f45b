use std::collections::BTreeSet;
use std::sync::Arc;

use alertline_protocol::alert::AlertEvent;
use alertline_protocol::rule::{AggKind, Rule};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::aggregator::{AggregateSnapshot, Aggregator};
use crate::alerts::AlertSink;
use crate::catalog::RuleCatalog;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluator::evaluate_tree;
use crate::limiter::{Admission, RateLimiter, TriggerStore};
use crate::messages::{placeholder_refs, render, select};
use crate::metrics::MetricStore;
use crate::outcome::{EvaluationReport, RuleEvaluation, RuleStatus};
use crate::validation::validate_for_evaluation;
use crate::variables::VariableCatalog;

/// Runtime executor that evaluates a user's metrics against the enabled rules
/// of a tenant and emits alert events for admitted matches.
#[derive(Clone)]
pub struct RuleEngine {
    catalog: RuleCatalog,
    variables: VariableCatalog,
    aggregator: Aggregator,
    limiter: RateLimiter,
    alerts: Option<Arc<dyn AlertSink>>,
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(
        catalog: RuleCatalog,
        variables: VariableCatalog,
        metrics: Arc<dyn MetricStore>,
        triggers: Arc<dyn TriggerStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(metrics, config.current_lookback_days),
            limiter: RateLimiter::new(triggers, config.max_admit_retries),
            alerts: None,
            catalog,
            variables,
            config,
        }
    }

    /// Sends every alert of a committing pass to `sink` as it is admitted.
    /// Dry-run simulations never reach it.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn variables(&self) -> &VariableCatalog {
        &self.variables
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub(crate) fn alert_sink(&self) -> Option<&dyn AlertSink> {
        self.alerts.as_deref()
    }

    /// Evaluates the user and records admissions in the trigger store.
    pub async fn evaluate_user(
        &self,
        user_id: &str,
        date: NaiveDate,
        tenant_id: &str,
    ) -> Result<Vec<AlertEvent>, EngineError> {
        Ok(self.evaluate_user_report(user_id, date, tenant_id).await?.events)
    }

    /// Like [`evaluate_user`](Self::evaluate_user), also returning what
    /// happened to every rule.
    pub async fn evaluate_user_report(
        &self,
        user_id: &str,
        date: NaiveDate,
        tenant_id: &str,
    ) -> Result<EvaluationReport, EngineError> {
        self.run_pass(user_id, date, tenant_id, &self.limiter, self.alert_sink())
            .await
    }

    /// One evaluation pass with the given limiter. Rules are processed by
    /// descending priority, then id, and never influence each other.
    /// Admissions committed before a fatal error stand, and so do the alerts
    /// already handed to `sink`.
    pub(crate) async fn run_pass(
        &self,
        user_id: &str,
        date: NaiveDate,
        tenant_id: &str,
        limiter: &RateLimiter,
        sink: Option<&dyn AlertSink>,
    ) -> Result<EvaluationReport, EngineError> {
        let mut report = EvaluationReport {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            date,
            events: Vec::new(),
            rules: Vec::new(),
        };

        let mut runnable = Vec::new();
        for rule in self.catalog.enabled_rules(tenant_id) {
            match validate_for_evaluation(&rule, &self.variables) {
                Ok(()) => runnable.push(rule),
                Err(err) => {
                    warn!(rule_id = %rule.id, user_id, tenant_id, error = %err, "skipping misconfigured rule");
                    report.rules.push(skipped(&rule, err.to_string()));
                }
            }
        }

        let refs = referenced_aggregates(&runnable);
        let snapshot = self.aggregator.snapshot(user_id, date, &refs).await?;

        for rule in &runnable {
            let (entry, event) = self
                .evaluate_rule(rule, user_id, date, &snapshot, limiter)
                .await?;
            if let Some(event) = event {
                if let Some(sink) = sink {
                    sink.record(&event);
                }
                report.events.push(event);
            }
            report.rules.push(entry);
        }

        info!(
            user_id,
            tenant_id,
            %date,
            rules = report.rules.len(),
            events = report.events.len(),
            "evaluation pass finished"
        );
        Ok(report)
    }

    async fn evaluate_rule(
        &self,
        rule: &Rule,
        user_id: &str,
        date: NaiveDate,
        snapshot: &AggregateSnapshot,
        limiter: &RateLimiter,
    ) -> Result<(RuleEvaluation, Option<AlertEvent>), EngineError> {
        let (matched, trace) = match evaluate_tree(&rule.logic, snapshot) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(rule_id = %rule.id, user_id, error = %err, "rule evaluation failed");
                return Ok((skipped(rule, err.to_string()), None));
            }
        };

        let entry = |status| RuleEvaluation {
            rule_id: rule.id.clone(),
            priority: rule.priority,
            status,
            trace: Some(trace.clone()),
        };

        if !matched {
            debug!(rule_id = %rule.id, user_id, "rule did not match");
            return Ok((entry(RuleStatus::NotMatched), None));
        }

        // Selected before admission so a broken message set never consumes one.
        let selected = match select(&rule.messages, user_id, &rule.id, date) {
            Ok(selected) => selected,
            Err(err) => {
                warn!(rule_id = %rule.id, user_id, error = %err, "rule has no usable message");
                return Ok((skipped(rule, err.to_string()), None));
            }
        };

        match limiter.admit(rule, user_id, date).await? {
            Admission::Suppressed(reason) => {
                debug!(rule_id = %rule.id, user_id, ?reason, "rule suppressed");
                Ok((entry(RuleStatus::Suppressed { reason }), None))
            }
            Admission::Admitted(_) => {
                let rendered = render(&selected.text, &rule.id, snapshot, &self.variables);
                for warning in &rendered.warnings {
                    debug!(rule_id = %rule.id, user_id, warning = %warning, "message placeholder");
                }
                debug!(rule_id = %rule.id, user_id, message_id = %selected.id, "rule admitted");

                let event = AlertEvent {
                    rule_id: rule.id.clone(),
                    user_id: user_id.to_string(),
                    tenant_id: rule.tenant_id.clone(),
                    date,
                    category: rule.category.clone(),
                    priority: rule.priority,
                    severity: rule.severity,
                    locale: rule.messages.locale.clone(),
                    message_id: selected.id.clone(),
                    message_text: rendered.text,
                    warnings: rendered.warnings,
                    why: trace.clone(),
                };
                let status = RuleStatus::Admitted {
                    message_id: selected.id,
                };
                Ok((entry(status), Some(event)))
            }
        }
    }
}

fn skipped(rule: &Rule, error: String) -> RuleEvaluation {
    RuleEvaluation {
        rule_id: rule.id.clone(),
        priority: rule.priority,
        status: RuleStatus::Skipped { error },
        trace: None,
    }
}

/// Aggregates needed by the rule trees and their message placeholders.
fn referenced_aggregates(rules: &[Rule]) -> BTreeSet<(String, AggKind)> {
    let mut refs = BTreeSet::new();
    for rule in rules {
        refs.extend(rule.logic.references());
        for candidate in &rule.messages.candidates {
            refs.extend(placeholder_refs(&candidate.text));
        }
    }
    refs
}
