use shared_models::{Metric, Rule, RuleKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub triggered: bool,
    pub reason: Option<String>,
}

impl Verdict {
    fn clear() -> Self {
        Self {
            triggered: false,
            reason: None,
        }
    }

    fn triggered(reason: String) -> Self {
        Self {
            triggered: true,
            reason: Some(reason),
        }
    }
}

/// Pure check of one metric against one rule. Inactive rules never trigger.
pub fn evaluate(rule: &Rule, metric: &Metric) -> Verdict {
    if !rule.active {
        return Verdict::clear();
    }

    match &rule.kind {
        RuleKind::LatencyGt(threshold) if metric.latency_ms > *threshold => Verdict::triggered(format!(
            "latency {}ms exceeds threshold {}ms",
            metric.latency_ms, threshold
        )),
        RuleKind::StatusNotIn(allowed) if !allowed.contains(&metric.status_code) => {
            let allowed: Vec<String> = allowed.iter().map(u16::to_string).collect();
            Verdict::triggered(format!(
                "status {} not in allowed [{}]",
                metric.status_code,
                allowed.join(", ")
            ))
        }
        _ => Verdict::clear(),
    }
}
