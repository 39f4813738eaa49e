//! Severity escalation policy.
//!
//! Step order is part of the contract:
//! 1. a `Baseline` channel (temperature) starts severity at Critical;
//! 2. a `Promote` channel (vibration, current) lifts Warning to Critical;
//! 3. score above 0.7 forces Emergency;
//! 4. otherwise score above 0.4 lifts severity to at least Critical;
//! 5. with no rule fired, severity stays Warning.

use super::rules::{rule_for, AnomalyScore, Escalation, CRITICAL_ABOVE, EMERGENCY_ABOVE};
use super::Severity;
use crate::telemetry::Channel;

pub fn classify(score: AnomalyScore, violated: &[Channel]) -> Severity {
    let mut severity = Severity::Warning;

    for channel in violated {
        match rule_for(*channel).escalation {
            Escalation::Baseline => severity = severity.max(Severity::Critical),
            Escalation::Promote => {
                if severity == Severity::Warning {
                    severity = Severity::Critical;
                }
            }
            Escalation::None => {}
        }
    }

    if score > EMERGENCY_ABOVE {
        Severity::Emergency
    } else if score > CRITICAL_ABOVE && severity != Severity::Emergency {
        severity.max(Severity::Critical)
    } else {
        severity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(h: u16) -> AnomalyScore {
        AnomalyScore::from_hundredths(h)
    }

    #[test]
    fn test_no_violation_is_warning() {
        assert_eq!(classify(AnomalyScore::ZERO, &[]), Severity::Warning);
    }

    #[test]
    fn test_pressure_alone_stays_warning() {
        assert_eq!(classify(score(15), &[Channel::Pressure]), Severity::Warning);
    }

    #[test]
    fn test_temperature_baseline_critical() {
        assert_eq!(classify(score(40), &[Channel::Temperature]), Severity::Critical);
    }

    #[test]
    fn test_vibration_promotes_warning() {
        assert_eq!(classify(score(30), &[Channel::Vibration]), Severity::Critical);
        assert_eq!(classify(score(15), &[Channel::Current]), Severity::Critical);
    }

    #[test]
    fn test_exactly_point_seven_is_critical() {
        let violated = [Channel::Temperature, Channel::Vibration];
        assert_eq!(classify(score(70), &violated), Severity::Critical);
    }

    #[test]
    fn test_above_point_seven_is_emergency() {
        let violated = [Channel::Temperature, Channel::Vibration, Channel::Pressure];
        assert_eq!(classify(score(85), &violated), Severity::Emergency);
        assert_eq!(classify(AnomalyScore::MAX, &Channel::ALL), Severity::Emergency);
    }

    #[test]
    fn test_score_cutoff_raises_pressure_combo() {
        // pressure + current without temperature/vibration: 0.30, stays Critical via promotion
        assert_eq!(
            classify(score(30), &[Channel::Pressure, Channel::Current]),
            Severity::Critical
        );
        // score alone above 0.4 with only a non-escalating channel
        assert_eq!(classify(score(45), &[Channel::Pressure]), Severity::Critical);
        assert_eq!(classify(score(40), &[Channel::Pressure]), Severity::Warning);
    }

    #[test]
    fn test_classify_is_total_over_channel_subsets() {
        for mask in 0u8..16 {
            let violated: Vec<Channel> = Channel::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, c)| *c)
                .collect();
            for h in [0u16, 15, 30, 40, 41, 70, 71, 100] {
                let s = classify(score(h), &violated);
                if h > 70 {
                    assert_eq!(s, Severity::Emergency);
                } else {
                    assert_ne!(s, Severity::Emergency);
                }
            }
        }
    }
}
