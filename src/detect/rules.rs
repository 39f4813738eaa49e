//! Declarative scoring policy: one row per channel naming its weight, where
//! its limit comes from, and how a violation escalates severity.

use serde::{Serialize, Serializer};

use crate::telemetry::{Channel, Thresholds};

/// Anomaly score in `[0, 1]`, held as integer hundredths so that sums of
/// weights compare exactly against the escalation cut-offs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnomalyScore(u16);

impl AnomalyScore {
    pub const ZERO: AnomalyScore = AnomalyScore(0);
    pub const MAX: AnomalyScore = AnomalyScore(100);

    pub const fn from_hundredths(h: u16) -> Self {
        if h > 100 {
            AnomalyScore(100)
        } else {
            AnomalyScore(h)
        }
    }

    pub const fn hundredths(self) -> u16 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Sum capped at [`AnomalyScore::MAX`].
    pub fn saturating_add(self, other: AnomalyScore) -> AnomalyScore {
        AnomalyScore::from_hundredths(self.0.saturating_add(other.0))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Serialize for AnomalyScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl std::fmt::Display for AnomalyScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

/// How a violated channel affects severity before the score cut-offs apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Severity starts at Critical.
    Baseline,
    /// Warning is promoted to Critical.
    Promote,
    /// No effect beyond the score contribution.
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelRule {
    pub channel: Channel,
    /// Key looked up in the machine's threshold map.
    pub limit_key: &'static str,
    /// Used when the machine does not configure `limit_key`.
    pub default_limit: f64,
    pub weight: AnomalyScore,
    pub escalation: Escalation,
    /// Phrase used in explanations, e.g. "critical limit".
    pub limit_label: &'static str,
}

impl ChannelRule {
    pub fn limit(&self, thresholds: &Thresholds) -> f64 {
        thresholds
            .get(self.limit_key)
            .copied()
            .unwrap_or(self.default_limit)
    }
}

/// Scores above this force Emergency.
pub const EMERGENCY_ABOVE: AnomalyScore = AnomalyScore::from_hundredths(70);
/// Scores above this raise severity to at least Critical.
pub const CRITICAL_ABOVE: AnomalyScore = AnomalyScore::from_hundredths(40);

/// Evaluation order is also explanation order.
pub const RULES: [ChannelRule; 4] = [
    ChannelRule {
        channel: Channel::Temperature,
        limit_key: "temperature_critical",
        default_limit: 85.0,
        weight: AnomalyScore::from_hundredths(40),
        escalation: Escalation::Baseline,
        limit_label: "critical limit",
    },
    ChannelRule {
        channel: Channel::Vibration,
        limit_key: "vibration_max",
        default_limit: 20.0,
        weight: AnomalyScore::from_hundredths(30),
        escalation: Escalation::Promote,
        limit_label: "maximum",
    },
    ChannelRule {
        channel: Channel::Pressure,
        limit_key: "pressure_max",
        default_limit: 10.0,
        weight: AnomalyScore::from_hundredths(15),
        escalation: Escalation::None,
        limit_label: "maximum",
    },
    ChannelRule {
        channel: Channel::Current,
        limit_key: "current_max",
        default_limit: 25.0,
        weight: AnomalyScore::from_hundredths(15),
        escalation: Escalation::Promote,
        limit_label: "maximum",
    },
];

pub fn rule_for(channel: Channel) -> &'static ChannelRule {
    match channel {
        Channel::Temperature => &RULES[0],
        Channel::Vibration => &RULES[1],
        Channel::Pressure => &RULES[2],
        Channel::Current => &RULES[3],
    }
}
