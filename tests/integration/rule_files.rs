// Loading rule and metric documents from disk and evaluating them.
use std::fs;
use std::sync::Arc;

use alertline::prelude::*;
use alertline::rules::{export_rules, load_metrics, load_rules, load_variables};
use chrono::NaiveDate;

const RULES: &str = r#"
rules:
  - id: steps_drop
    priority: 80
    cooldown_days: 2
    logic:
      all:
        - var: steps
          agg: delta_pct_3v14
          op: "<"
          value: -0.2
        - none:
            - var: steps
              agg: current
              op: ">="
              value: 10000
    messages:
      candidates:
        - id: nudge
          text: "Steps are down to {{steps:mean_3d:.0}} a day"
          weight: 2
        - id: soft
          text: "A short walk helps"
          weight: 1
  - id: sleep_window
    priority: 20
    logic:
      var: sleep
      agg: mean_7d
      op: between
      value: [4, 6]
    messages:
      candidates:
        - text: "Sleep averaged {{sleep:mean_7d}}h"
"#;

const VARIABLES: &str = r#"
variables:
  - key: steps
    decimals: 0
  - key: sleep
    decimals: 1
"#;

fn metrics_document() -> String {
    let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let mut doc = String::from("metrics:\n");
    for offset in 0..14 {
        let date = start + chrono::Duration::days(offset);
        let steps = if offset < 11 { 9000.0 } else { 4000.0 };
        doc.push_str(&format!(
            "  - user_id: u1\n    date: {date}\n    values:\n      steps: {steps}\n      sleep: 5.5\n"
        ));
    }
    doc
}

#[tokio::test]
async fn documents_on_disk_drive_an_evaluation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("rules.yaml"), RULES)?;
    fs::write(dir.path().join("variables.yaml"), VARIABLES)?;
    fs::write(dir.path().join("metrics.yaml"), metrics_document())?;

    let rules = load_rules(dir.path().join("rules.yaml"))?;
    assert_eq!(
        rules.iter().map(|rule| rule.id.as_str()).collect::<Vec<_>>(),
        vec!["steps_drop", "sleep_window"]
    );

    let catalog = RuleCatalog::new(Arc::new(InMemoryAuditLog::new()));
    for rule in rules.clone() {
        catalog.create(rule, &Actor::system())?;
    }
    let metrics = InMemoryMetricStore::new();
    metrics.record_all(&load_metrics(dir.path().join("metrics.yaml"))?);
    let engine = RuleEngine::new(
        catalog,
        VariableCatalog::from_defs(load_variables(dir.path().join("variables.yaml"))?),
        Arc::new(metrics),
        Arc::new(InMemoryTriggerStore::new()),
        EngineConfig::default(),
    );

    let date = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
    let result = engine.simulate("u1", date, "default", true).await?;

    let fired: Vec<&str> = result.events.iter().map(|event| event.rule_id.as_str()).collect();
    assert_eq!(fired, vec!["steps_drop", "sleep_window"]);
    assert_eq!(result.events[1].message_text, "Sleep averaged 5.5h");
    assert!(result.events.iter().all(|event| event.warnings.is_empty()));

    let exported = dir.path().join("export.json");
    export_rules(&rules, &exported)?;
    assert_eq!(load_rules(&exported)?, rules);
    Ok(())
}
