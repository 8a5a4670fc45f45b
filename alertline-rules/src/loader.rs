use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use alertline_core::serde_utils::{from_document_str, is_document_path, to_pretty_json};
use alertline_protocol::alert::TriggerRecord;
use alertline_protocol::rule::Rule;
use alertline_protocol::variable::VariableDef;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::Value;
use tracing::debug;

use crate::catalog::slugify_id;
use crate::error::RuleError;
use crate::metrics::MetricRecord;

/// Loads rules from a JSON/YAML file or a directory of them. Each file may be
/// a `{rules: [...]}` document, a list of rules or a single rule.
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<Rule>, RuleError> {
    let mut rules: Vec<Rule> = load_items(path.as_ref(), "rules")?;
    deduplicate(&rules)?;
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
    Ok(rules)
}

/// Variable definitions in the same three shapes, keyed by `variables`.
pub fn load_variables(path: impl AsRef<Path>) -> Result<Vec<VariableDef>, RuleError> {
    load_items(path.as_ref(), "variables")
}

/// Metric rows `{user_id, date, values}` in the same three shapes, keyed by
/// `metrics`.
pub fn load_metrics(path: impl AsRef<Path>) -> Result<Vec<MetricRecord>, RuleError> {
    load_items(path.as_ref(), "metrics")
}

/// Trigger history rows, keyed by `triggers`.
pub fn load_triggers(path: impl AsRef<Path>) -> Result<Vec<TriggerRecord>, RuleError> {
    load_items(path.as_ref(), "triggers")
}

/// Writes the rules as a pretty JSON array.
pub fn export_rules(rules: &[Rule], path: impl AsRef<Path>) -> Result<(), RuleError> {
    write_json(&rules, path.as_ref())
}

/// Writes trigger history as a `{triggers: [...]}` JSON document.
pub fn export_triggers(records: &[TriggerRecord], path: impl AsRef<Path>) -> Result<(), RuleError> {
    #[derive(Serialize)]
    struct Document<'a> {
        triggers: &'a [TriggerRecord],
    }
    write_json(&Document { triggers: records }, path.as_ref())
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), RuleError> {
    let json =
        to_pretty_json(value).map_err(|err| RuleError::parse_error(path, err.to_string()))?;
    fs::write(path, json).map_err(|err| RuleError::from_io(path, err))
}

fn load_items<T: DeserializeOwned>(path: &Path, key: &str) -> Result<Vec<T>, RuleError> {
    if !path.exists() {
        return Err(RuleError::MissingPath(path.display().to_string()));
    }

    if !path.is_dir() {
        return load_from_file(path, key);
    }

    let mut items = Vec::new();
    for file in document_files(path)? {
        let mut file_items = load_from_file(&file, key)?;
        items.append(&mut file_items);
    }
    Ok(items)
}

fn document_files(path: &Path) -> Result<Vec<PathBuf>, RuleError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(|err| RuleError::from_io(path, err))? {
        let entry = entry.map_err(|err| RuleError::from_io(path, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| RuleError::from_io(entry.path(), err))?;
        if file_type.is_dir() {
            continue;
        }
        if is_document_path(&entry.path()) {
            files.push(entry.path());
        }
    }
    // read_dir order is platform dependent.
    files.sort();
    Ok(files)
}

fn load_from_file<T: DeserializeOwned>(path: &Path, key: &str) -> Result<Vec<T>, RuleError> {
    let raw = fs::read_to_string(path).map_err(|err| RuleError::from_io(path, err))?;
    let items = parse_items(&raw, path, key)?;
    debug!(path = %path.display(), count = items.len(), key, "loaded document");
    Ok(items)
}

fn parse_items<T: DeserializeOwned>(raw: &str, path: &Path, key: &str) -> Result<Vec<T>, RuleError> {
    let document: Value =
        from_document_str(raw).map_err(|err| RuleError::parse_error(path, err.to_string()))?;

    let parsed = match document {
        Value::Mapping(ref mapping) if mapping.contains_key(key) => {
            let list = mapping.get(key).cloned().unwrap_or(Value::Null);
            serde_yaml::from_value::<Vec<T>>(list)
                .map_err(|err| format!("{key} document: {err}"))
        }
        list @ Value::Sequence(_) => {
            serde_yaml::from_value::<Vec<T>>(list).map_err(|err| format!("list: {err}"))
        }
        Value::Null => Ok(Vec::new()),
        single => serde_yaml::from_value::<T>(single)
            .map(|item| vec![item])
            .map_err(|err| format!("single entry: {err}")),
    };

    parsed.map_err(|message| RuleError::parse_error(path, message))
}

/// Ids are compared after slugging, the form the catalog stores them in.
/// Blank ids get a generated one on registration and never collide.
fn deduplicate(rules: &[Rule]) -> Result<(), RuleError> {
    let mut seen = HashSet::new();
    for rule in rules {
        let slug = slugify_id(&rule.id);
        if !slug.is_empty() && !seen.insert(slug) {
            return Err(RuleError::DuplicateRule {
                id: rule.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    const SINGLE_RULE: &str = r#"
id: low_steps
priority: 10
logic:
  all:
    - {var: steps, agg: mean_7d, op: "<", value: 4000}
messages:
  candidates:
    - {text: "Move more", weight: 2}
"#;

    #[test]
    fn accepts_the_three_document_shapes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), SINGLE_RULE).unwrap();
        fs::write(
            dir.path().join("b.json"),
            r#"[{"id": "late_sleep", "priority": 80, "logic": {"any": []}, "messages": {"candidates": [{"text": "Sleep"}]}}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("c.yml"),
            "rules:\n  - id: calm\n    logic: {none: []}\n    messages: {candidates: [{text: ok}]}\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let rules = load_rules(dir.path()).unwrap();
        let ids: Vec<_> = rules.iter().map(|rule| rule.id.as_str()).collect();
        assert_eq!(ids, vec!["late_sleep", "calm", "low_steps"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), SINGLE_RULE).unwrap();
        fs::write(dir.path().join("b.yaml"), SINGLE_RULE).unwrap();

        assert!(matches!(
            load_rules(dir.path()),
            Err(RuleError::DuplicateRule { id }) if id == "low_steps"
        ));
    }

    #[test]
    fn ids_that_slug_alike_are_duplicates() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("rules.yaml"),
            "- {id: Sleep Bad, logic: {all: []}, messages: {candidates: [{text: a}]}}\n\
             - {id: sleep_bad, logic: {all: []}, messages: {candidates: [{text: b}]}}\n",
        )
        .unwrap();

        assert!(matches!(
            load_rules(dir.path()),
            Err(RuleError::DuplicateRule { id }) if id == "sleep_bad"
        ));
    }

    #[test]
    fn missing_path_and_bad_documents_are_reported() {
        assert!(matches!(
            load_rules("/definitely/not/here"),
            Err(RuleError::MissingPath(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id: broken\nlogic: {{all: [{{var: x, op: '~', value: 1}}]}}").unwrap();
        assert!(matches!(
            load_rules(file.path()),
            Err(RuleError::Parse { .. })
        ));
    }

    #[test]
    fn loads_metrics_and_variables() {
        let mut metrics = NamedTempFile::new().unwrap();
        write!(
            metrics,
            r#"{{"metrics": [{{"user_id": "u1", "date": "2024-05-01", "values": {{"steps": 1200, "sleep": null}}}}]}}"#
        )
        .unwrap();
        let records = load_metrics(metrics.path()).unwrap();
        assert_eq!(records[0].values["steps"], Some(1200.0));
        assert_eq!(records[0].values["sleep"], None);

        let mut variables = NamedTempFile::new().unwrap();
        write!(
            variables,
            "- key: steps\n  unit: count\n  allowed_aggregators: [current, mean_7d]\n"
        )
        .unwrap();
        let defs = load_variables(variables.path()).unwrap();
        assert_eq!(defs[0].allowed_aggregators.len(), 2);
    }

    #[test]
    fn export_round_trips_through_load() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("rules.yaml"), SINGLE_RULE).unwrap();
        let rules = load_rules(dir.path()).unwrap();

        let out = dir.path().join("export.json");
        export_rules(&rules, &out).unwrap();
        assert_eq!(load_rules(&out).unwrap(), rules);
    }

    #[test]
    fn trigger_history_survives_export() {
        use alertline_protocol::alert::{TriggerHistory, TriggerKey};

        let day = chrono::NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let records = vec![TriggerRecord {
            key: TriggerKey::new("default", "u1", "low_steps"),
            history: TriggerHistory::default().admitted(day),
        }];
        let dir = tempdir().unwrap();
        let out = dir.path().join("triggers.json");
        export_triggers(&records, &out).unwrap();

        assert_eq!(load_triggers(&out).unwrap(), records);
    }
}
