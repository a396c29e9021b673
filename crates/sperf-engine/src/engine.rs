// Rule execution
//
// Rules run on a scoped worker pool. Each worker appends to its own list;
// lists are merged by registration index after every worker has joined, so
// the result does not depend on scheduling.

use crate::rules::{Rule, RuleContext, RuleRegistry};
use sperf_types::{Finding, Severity};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

pub const RULE_EXECUTION_ERROR: &str = "rule-execution-error";

#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    /// Worker threads; 0 uses available parallelism
    pub workers: usize,
    /// No rule is started after this instant
    pub deadline: Option<Instant>,
}

/// Findings of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOutcome {
    pub findings: Vec<Finding>,
    /// Some rules were never started because the deadline passed
    pub truncated: bool,
    /// Ids of rules that were not run, in registration order
    pub skipped: Vec<String>,
}

pub struct RuleEngine {
    registry: RuleRegistry,
}

impl RuleEngine {
    pub fn new(registry: RuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>, options: &EvalOptions) -> EvalOutcome {
        let rules = self.registry.rules();
        if rules.is_empty() {
            return EvalOutcome::default();
        }

        let workers = match options.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
        .min(rules.len());

        let next = AtomicUsize::new(0);
        let next = &next;

        let mut slots: Vec<Option<Vec<Finding>>> = vec![None; rules.len()];
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut local: Vec<(usize, Vec<Finding>)> = Vec::new();
                        loop {
                            if deadline_passed(options.deadline) {
                                break;
                            }
                            let index = next.fetch_add(1, Ordering::SeqCst);
                            let Some(rule) = rules.get(index) else {
                                break;
                            };
                            local.push((index, run_rule(rule.as_ref(), ctx)));
                        }
                        local
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(local) => {
                        for (index, findings) in local {
                            slots[index] = Some(findings);
                        }
                    }
                    // run_rule catches rule panics; reaching this is a bug in the pool itself
                    Err(_) => tracing::error!("rule worker terminated unexpectedly"),
                }
            }
        });

        let mut outcome = EvalOutcome::default();
        for (rule, slot) in rules.iter().zip(slots) {
            match slot {
                Some(findings) => outcome.findings.extend(findings),
                None => outcome.skipped.push(rule.id().to_string()),
            }
        }
        outcome.truncated = !outcome.skipped.is_empty();

        if outcome.truncated {
            tracing::warn!(
                skipped = outcome.skipped.len(),
                "run timeout reached; remaining rules were not scheduled"
            );
        }
        tracing::debug!(
            rules = rules.len(),
            findings = outcome.findings.len(),
            workers,
            "rule evaluation finished"
        );
        outcome
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Evaluate one rule, turning an error or a panic into a single finding
fn run_rule(rule: &dyn Rule, ctx: &RuleContext<'_>) -> Vec<Finding> {
    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| rule.evaluate(ctx)));
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let reason = match result {
        Ok(Ok(findings)) => {
            tracing::debug!(rule = rule.id(), findings = findings.len(), elapsed_ms, "rule done");
            return findings;
        }
        Ok(Err(err)) => err.message,
        Err(payload) => panic_message(payload.as_ref()),
    };

    tracing::warn!(rule = rule.id(), error = %reason, "rule failed");
    vec![execution_error(rule.id(), &reason)]
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

pub fn execution_error(rule_id: &str, reason: &str) -> Finding {
    Finding::new(
        RULE_EXECUTION_ERROR,
        Severity::Warning,
        format!("rule '{}' failed: {}", rule_id, reason),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use crate::rules::test_support::Fixture;
    use std::time::Duration;

    struct Fixed(&'static str, usize);

    impl Rule for Fixed {
        fn id(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "fixed"
        }
        fn evaluate(&self, _: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
            Ok((0..self.1)
                .map(|i| Finding::new(self.0, Severity::Info, format!("{} #{}", self.0, i)))
                .collect())
        }
    }

    struct Panics;

    impl Rule for Panics {
        fn id(&self) -> &str {
            "panics"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        fn evaluate(&self, _: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
            panic!("index out of range")
        }
    }

    struct Fails;

    impl Rule for Fails {
        fn id(&self) -> &str {
            "fails"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn evaluate(&self, _: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
            Err(RuleError::new("no data"))
        }
    }

    fn engine(rules: Vec<Box<dyn Rule>>) -> RuleEngine {
        let mut registry = RuleRegistry::new();
        for rule in rules {
            registry.register(rule).unwrap();
        }
        RuleEngine::new(registry)
    }

    fn evaluate(engine: &RuleEngine, options: &EvalOptions) -> EvalOutcome {
        let fixture = Fixture::default();
        let bundle = fixture.bundle();
        let timeline = fixture.timeline();
        let ctx = RuleContext::new(&bundle, &timeline, &[]);
        engine.evaluate(&ctx, options)
    }

    #[test]
    fn test_merge_follows_registration_order() {
        let engine = engine(vec![
            Box::new(Fixed("a", 2)),
            Box::new(Fixed("b", 1)),
            Box::new(Fixed("c", 3)),
        ]);
        for workers in [1, 2, 8] {
            let outcome = evaluate(&engine, &EvalOptions { workers, deadline: None });
            let rules: Vec<_> = outcome.findings.iter().map(|f| f.rule.as_str()).collect();
            assert_eq!(rules, vec!["a", "a", "b", "c", "c", "c"]);
            assert!(!outcome.truncated);
        }
    }

    #[test]
    fn test_failing_rules_are_isolated() {
        let engine = engine(vec![
            Box::new(Fixed("before", 1)),
            Box::new(Panics),
            Box::new(Fails),
            Box::new(Fixed("after", 1)),
        ]);
        let outcome = evaluate(&engine, &EvalOptions::default());

        let errors: Vec<_> = outcome
            .findings
            .iter()
            .filter(|f| f.rule == RULE_EXECUTION_ERROR)
            .collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].explanation, "rule 'panics' failed: panicked: index out of range");
        assert_eq!(errors[1].explanation, "rule 'fails' failed: no data");
        assert!(outcome.findings.iter().any(|f| f.rule == "before"));
        assert!(outcome.findings.iter().any(|f| f.rule == "after"));
    }

    #[test]
    fn test_expired_deadline_truncates() {
        let engine = engine(vec![Box::new(Fixed("a", 1)), Box::new(Fixed("b", 1))]);
        let deadline = Instant::now().checked_sub(Duration::from_secs(1));
        let outcome = evaluate(
            &engine,
            &EvalOptions {
                workers: 1,
                deadline: deadline.or(Some(Instant::now())),
            },
        );
        assert!(outcome.truncated);
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.skipped, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_registry() {
        let outcome = evaluate(&engine(Vec::new()), &EvalOptions::default());
        assert_eq!(outcome, EvalOutcome::default());
    }
}
