use colored::*;

use alertline_engine::{TaskRecord, TaskStatus};
use alertline_protocol::alert::{AlertEvent, ConditionTrace, EvaluationTrace};
use alertline_rules::{FeatureTable, RuleEvaluation, RuleStatus, SimulationResult, SuppressionReason};

use crate::workspace::RuleCheck;

pub fn print_events(events: &[AlertEvent]) {
    if events.is_empty() {
        println!("{}", "No alerts".dimmed());
        return;
    }
    for event in events {
        println!(
            "{} {} {}",
            "✔".green().bold(),
            event.rule_id.bold(),
            format!("(priority {}, message {})", event.priority, event.message_id).dimmed()
        );
        println!("  {}", event.message_text);
        for warning in &event.warnings {
            println!("  {} {}", "warning:".yellow(), warning);
        }
    }
}

pub fn print_simulation(result: &SimulationResult) {
    println!(
        "{} {} alert(s), mode {:?}",
        "Simulation:".cyan().bold(),
        result.count,
        result.mode
    );
    print_events(&result.events);
    if let Some(rules) = &result.rules {
        println!();
        for rule in rules {
            print_rule(rule);
        }
    }
}

fn print_rule(rule: &RuleEvaluation) {
    let status = match &rule.status {
        RuleStatus::NotMatched => "not matched".dimmed(),
        RuleStatus::Admitted { .. } => "admitted".green(),
        RuleStatus::Suppressed { reason } => describe_suppression(reason).yellow(),
        RuleStatus::Skipped { error } => format!("skipped: {error}").red(),
    };
    println!("{} [{}] {}", rule.rule_id.bold(), rule.priority, status);
    if let Some(trace) = &rule.trace {
        print_trace(trace, 1);
    }
}

fn describe_suppression(reason: &SuppressionReason) -> String {
    match reason {
        SuppressionReason::Cooldown {
            last_triggered_on,
            days_remaining,
        } => format!("cooldown since {last_triggered_on}, {days_remaining} day(s) left"),
        SuppressionReason::DailyCap {
            count_today,
            max_per_day,
        } => format!("daily cap reached ({count_today}/{max_per_day})"),
    }
}

fn print_trace(trace: &EvaluationTrace, depth: usize) {
    let indent = "  ".repeat(depth);
    match trace {
        EvaluationTrace::Condition(leaf) => println!("{indent}{}", describe_leaf(leaf)),
        EvaluationTrace::Combinator {
            kind,
            result,
            children,
        } => {
            println!("{indent}{kind:?} -> {}", mark(*result));
            for child in children {
                print_trace(child, depth + 1);
            }
        }
    }
}

fn describe_leaf(leaf: &ConditionTrace) -> String {
    let observed = match (&leaf.observed, &leaf.failure) {
        (Some(value), _) => format!("{value}"),
        (None, Some(failure)) => failure.to_string(),
        (None, None) => "n/a".to_string(),
    };
    format!(
        "{}:{} {} {} (observed {}) -> {}",
        leaf.var,
        leaf.agg,
        leaf.op,
        leaf.operand,
        observed,
        mark(leaf.result)
    )
}

fn mark(result: bool) -> ColoredString {
    if result {
        "true".green()
    } else {
        "false".red()
    }
}

pub fn print_features(table: &FeatureTable) {
    for (variable, aggregates) in table {
        println!("{}", variable.bold());
        for (agg, value) in aggregates {
            match value {
                Some(value) => println!("  {agg:<16} {value:.4}"),
                None => println!("  {agg:<16} {}", "n/a".dimmed()),
            }
        }
    }
}

pub fn print_checks(checks: &[RuleCheck]) {
    for check in checks {
        match &check.error {
            None => println!("{} {}", "✔".green(), check.rule_id),
            Some(error) => println!("{} {}: {}", "✘".red(), check.rule_id.bold(), error),
        }
    }
}

pub fn print_batch(records: &[TaskRecord]) {
    let mut alerts = 0;
    for record in records {
        match (&record.status, &record.outcome) {
            (TaskStatus::Completed, Some(outcome)) => {
                alerts += outcome.events.len();
                println!(
                    "{} {} {} alert(s), {} suppressed",
                    "✔".green(),
                    record.task.user_id.bold(),
                    outcome.events.len(),
                    outcome.suppressed
                );
                for event in &outcome.events {
                    println!("  {}: {}", event.rule_id, event.message_text);
                }
            }
            _ => println!(
                "{} {} {}",
                "✘".red(),
                record.task.user_id.bold(),
                record.last_error.as_deref().unwrap_or("not finished")
            ),
        }
    }
    println!(
        "{} {} user(s), {} alert(s)",
        "Batch:".cyan().bold(),
        records.len(),
        alerts
    );
}
