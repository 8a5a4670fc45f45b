use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use alertline_protocol::audit::Actor;
use alertline_protocol::rule::Rule;
use alertline_rules::{
    export_triggers, load_metrics, load_rules, load_triggers, load_variables,
    validate_for_evaluation, EngineConfig, InMemoryAuditLog, InMemoryMetricStore,
    InMemoryTriggerStore, RuleCatalog, RuleEngine, VariableCatalog,
};
use tracing::info;

/// Files the engine is assembled from.
#[derive(Args, Debug, Clone)]
pub struct Sources {
    /// Rule document or directory of documents (JSON or YAML)
    #[arg(long, global = true, env = "ALERTLINE_RULES", default_value = "rules")]
    pub rules: PathBuf,
    /// Daily metric document or directory
    #[arg(long, global = true, env = "ALERTLINE_METRICS")]
    pub metrics: Option<PathBuf>,
    /// Variable catalog; inferred from the metrics when absent
    #[arg(long, global = true, env = "ALERTLINE_VARIABLES")]
    pub variables: Option<PathBuf>,
    /// TOML file with engine settings
    #[arg(long, global = true, env = "ALERTLINE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Trigger history document; read at startup and rewritten after
    /// admissions are recorded. Without it history lasts one invocation
    #[arg(long, global = true, env = "ALERTLINE_TRIGGERS")]
    pub triggers: Option<PathBuf>,
}

/// An engine backed by in-memory stores filled from disk.
pub struct Workspace {
    pub engine: Arc<RuleEngine>,
    pub metrics: InMemoryMetricStore,
    pub triggers: InMemoryTriggerStore,
}

pub fn engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(EngineConfig::from_env()?),
    }
}

pub fn metric_store(sources: &Sources) -> Result<InMemoryMetricStore> {
    let store = InMemoryMetricStore::new();
    if let Some(path) = &sources.metrics {
        let records =
            load_metrics(path).with_context(|| format!("loading metrics {}", path.display()))?;
        store.record_all(&records);
    }
    Ok(store)
}

pub fn variable_catalog(sources: &Sources, metrics: &InMemoryMetricStore) -> Result<VariableCatalog> {
    match &sources.variables {
        Some(path) => {
            let defs = load_variables(path)
                .with_context(|| format!("loading variables {}", path.display()))?;
            Ok(VariableCatalog::from_defs(defs))
        }
        None => Ok(VariableCatalog::from_keys(metrics.variables())),
    }
}

pub fn trigger_store(sources: &Sources) -> Result<InMemoryTriggerStore> {
    match &sources.triggers {
        Some(path) if path.exists() => {
            let records = load_triggers(path)
                .with_context(|| format!("loading trigger history {}", path.display()))?;
            Ok(InMemoryTriggerStore::from_records(records))
        }
        _ => Ok(InMemoryTriggerStore::new()),
    }
}

pub fn rules(sources: &Sources) -> Result<Vec<Rule>> {
    load_rules(&sources.rules).with_context(|| format!("loading rules {}", sources.rules.display()))
}

impl Workspace {
    pub fn load(sources: &Sources) -> Result<Self> {
        let config = engine_config(sources.config.as_deref())?;
        let metrics = metric_store(sources)?;
        let variables = variable_catalog(sources, &metrics)?;

        let catalog = RuleCatalog::new(Arc::new(InMemoryAuditLog::new()));
        let actor = Actor::new("cli", "loader");
        for rule in rules(sources)? {
            let rule_id = rule.id.clone();
            catalog
                .create(rule, &actor)
                .with_context(|| format!("registering rule {rule_id}"))?;
        }

        let triggers = trigger_store(sources)?;
        let engine = RuleEngine::new(
            catalog,
            variables,
            Arc::new(metrics.clone()),
            Arc::new(triggers.clone()),
            config,
        );
        Ok(Self {
            engine: Arc::new(engine),
            metrics,
            triggers,
        })
    }

    /// Writes the trigger history back to `--triggers`, if one was given.
    pub fn save_triggers(&self, sources: &Sources) -> Result<()> {
        let Some(path) = &sources.triggers else {
            return Ok(());
        };
        let records = self.triggers.records();
        export_triggers(&records, path)
            .with_context(|| format!("writing trigger history {}", path.display()))?;
        info!(path = %path.display(), histories = records.len(), "trigger history saved");
        Ok(())
    }
}

/// Validation result of one rule document entry.
pub struct RuleCheck {
    pub rule_id: String,
    pub error: Option<String>,
}

pub fn check_rules(sources: &Sources) -> Result<Vec<RuleCheck>> {
    let metrics = metric_store(sources)?;
    let variables = variable_catalog(sources, &metrics)?;
    Ok(rules(sources)?
        .iter()
        .map(|rule| RuleCheck {
            rule_id: rule.id.clone(),
            error: validate_for_evaluation(rule, &variables)
                .err()
                .map(|err| err.to_string()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RULES: &str = r#"
rules:
  - id: sleep_short
    logic:
      all:
        - var: sleep_hours
          agg: current
          op: "<"
          value: 6
    messages:
      candidates:
        - text: "Only {{sleep_hours}}h of sleep"
          weight: 1
  - id: steps_unknown
    logic:
      var: steps
      agg: mean_7d
      op: "<"
      value: 3000
    messages:
      candidates:
        - text: "Move more"
          weight: 1
"#;

    const METRICS: &str = r#"
metrics:
  - user_id: u1
    date: 2024-06-01
    values:
      sleep_hours: 5.0
"#;

    fn sources(dir: &Path) -> Sources {
        fs::write(dir.join("rules.yaml"), RULES).unwrap();
        fs::write(dir.join("metrics.yaml"), METRICS).unwrap();
        Sources {
            rules: dir.join("rules.yaml"),
            metrics: Some(dir.join("metrics.yaml")),
            variables: None,
            config: None,
            triggers: None,
        }
    }

    #[test]
    fn reports_rules_with_unknown_variables() {
        let dir = tempfile::tempdir().unwrap();
        let checks = check_rules(&sources(dir.path())).unwrap();

        assert_eq!(checks.len(), 2);
        let failing: Vec<&str> = checks
            .iter()
            .filter(|check| check.error.is_some())
            .map(|check| check.rule_id.as_str())
            .collect();
        assert_eq!(failing, vec!["steps_unknown"]);
    }

    #[tokio::test]
    async fn loads_an_engine_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::load(&sources(dir.path())).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let events = workspace
            .engine
            .evaluate_user("u1", date, "default")
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_text, "Only 5h of sleep");
        assert_eq!(workspace.triggers.len(), 1);
    }

    #[test]
    fn reads_engine_settings_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "current_lookback_days = 30\n").unwrap();

        let config = engine_config(Some(&path)).unwrap();
        assert_eq!(config.current_lookback_days, 30);
        assert_eq!(config.max_admit_retries, 3);
    }

    #[tokio::test]
    async fn saved_history_suppresses_the_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = sources(dir.path());
        sources.triggers = Some(dir.path().join("triggers.json"));
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let first = Workspace::load(&sources).unwrap();
        let events = first.engine.evaluate_user("u1", date, "default").await.unwrap();
        assert_eq!(events.len(), 1);
        first.save_triggers(&sources).unwrap();

        let second = Workspace::load(&sources).unwrap();
        assert_eq!(second.triggers.len(), 1);
        let events = second.engine.evaluate_user("u1", date, "default").await.unwrap();
        assert!(events.is_empty());
    }
}
