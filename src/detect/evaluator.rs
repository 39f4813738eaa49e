//! Threshold evaluation and the scorer seam.
//!
//! [`evaluate`] is a pure function of the reading and the machine's
//! threshold map. The pipeline only talks to [`AnomalyScorer`], so a trained
//! model can be dropped in without touching ingestion.

use super::rules::{AnomalyScore, RULES};
use super::severity::classify;
use super::{EvaluateError, Verdict};
use crate::telemetry::{Reading, Thresholds};

pub const NORMAL_EXPLANATION: &str = "all channels within configured limits";

/// Anything that can turn a reading into a verdict.
pub trait AnomalyScorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, reading: &Reading, thresholds: &Thresholds) -> Result<Verdict, EvaluateError>;
}

/// The built-in rule-table scorer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThresholdScorer;

impl AnomalyScorer for ThresholdScorer {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn score(&self, reading: &Reading, thresholds: &Thresholds) -> Result<Verdict, EvaluateError> {
        evaluate(reading, thresholds)
    }
}

pub fn evaluate(reading: &Reading, thresholds: &Thresholds) -> Result<Verdict, EvaluateError> {
    let mut score = AnomalyScore::ZERO;
    let mut violated = Vec::new();
    let mut clauses = Vec::new();

    for rule in RULES.iter() {
        let limit = rule.limit(thresholds);
        if !limit.is_finite() {
            return Err(EvaluateError::InvalidLimit {
                key: rule.limit_key.to_string(),
                value: limit,
            });
        }
        let value = rule.channel.value(reading);
        if value > limit {
            score = score.saturating_add(rule.weight);
            violated.push(rule.channel);
            clauses.push(format!(
                "{} {:.2} exceeds {} {:.2}",
                rule.channel, value, rule.limit_label, limit
            ));
        }
    }

    let explanation = if clauses.is_empty() {
        NORMAL_EXPLANATION.to_string()
    } else {
        clauses.join(" and ")
    };

    Ok(Verdict {
        score,
        anomalous: !score.is_zero(),
        severity: classify(score, &violated),
        violated,
        explanation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Severity;
    use crate::telemetry::Channel;
    use chrono::Utc;
    use uuid::Uuid;

    fn reading(temperature: f64, vibration: f64, pressure: f64, current: f64) -> Reading {
        Reading {
            machine_id: Uuid::nil(),
            timestamp: Utc::now(),
            temperature,
            vibration,
            pressure,
            current,
            operating_hours: None,
            labels: vec![],
        }
    }

    fn config(pairs: &[(&str, f64)]) -> Thresholds {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_temperature_and_vibration_is_critical_not_emergency() {
        let cfg = config(&[("temperature_critical", 85.0), ("vibration_max", 20.0)]);
        let v = evaluate(&reading(90.0, 25.0, 3.0, 10.0), &cfg).unwrap();
        assert!(v.anomalous);
        assert_eq!(v.score.as_f64(), 0.7);
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.violated, vec![Channel::Temperature, Channel::Vibration]);
        assert_eq!(
            v.explanation,
            "temperature 90.00 exceeds critical limit 85.00 and vibration 25.00 exceeds maximum 20.00"
        );
    }

    #[test]
    fn test_all_channels_caps_and_is_emergency() {
        let cfg = config(&[
            ("temperature_critical", 80.0),
            ("vibration_max", 10.0),
            ("pressure_max", 5.0),
            ("current_max", 15.0),
        ]);
        let v = evaluate(&reading(120.0, 40.0, 9.0, 30.0), &cfg).unwrap();
        assert_eq!(v.score, AnomalyScore::MAX);
        assert_eq!(v.score.as_f64(), 1.0);
        assert_eq!(v.severity, Severity::Emergency);
        assert_eq!(v.violated.len(), 4);
    }

    #[test]
    fn test_within_limits_is_normal() {
        let cfg = config(&[("temperature_critical", 85.0)]);
        let v = evaluate(&reading(70.0, 10.0, 3.0, 12.0), &cfg).unwrap();
        assert!(!v.anomalous);
        assert_eq!(v.score, AnomalyScore::ZERO);
        assert_eq!(v.explanation, NORMAL_EXPLANATION);
        assert!(v.violated.is_empty());
    }

    #[test]
    fn test_equal_to_limit_is_not_a_violation() {
        let v = evaluate(&reading(85.0, 20.0, 10.0, 25.0), &Thresholds::new()).unwrap();
        assert!(!v.anomalous);
    }

    #[test]
    fn test_defaults_apply_for_missing_keys() {
        let v = evaluate(&reading(86.0, 1.0, 1.0, 26.0), &Thresholds::new()).unwrap();
        assert_eq!(v.violated, vec![Channel::Temperature, Channel::Current]);
        assert_eq!(v.score.hundredths(), 55);
        assert_eq!(v.severity, Severity::Critical);
    }

    #[test]
    fn test_evaluate_is_pure() {
        let cfg = config(&[("vibration_max", 12.0)]);
        let r = reading(88.0, 13.0, 11.0, 3.0);
        let first = evaluate(&r, &cfg).unwrap();
        for _ in 0..10 {
            assert_eq!(evaluate(&r, &cfg).unwrap(), first);
        }
    }

    #[test]
    fn test_non_finite_limit_fails() {
        let cfg = config(&[("pressure_max", f64::NAN)]);
        let err = evaluate(&reading(1.0, 1.0, 1.0, 1.0), &cfg).unwrap_err();
        assert!(matches!(err, EvaluateError::InvalidLimit { ref key, .. } if key == "pressure_max"));
    }

    #[test]
    fn test_threshold_scorer_delegates() {
        let scorer = ThresholdScorer;
        let r = reading(99.0, 1.0, 1.0, 1.0);
        assert_eq!(scorer.score(&r, &Thresholds::new()).unwrap(), evaluate(&r, &Thresholds::new()).unwrap());
        assert_eq!(scorer.name(), "threshold");
    }
}
