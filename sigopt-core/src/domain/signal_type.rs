use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading style an opportunity (and its parameter set) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Scalping,
    Swing,
}

impl SignalType {
    /// Both signal types, in publish order.
    pub const ALL: [SignalType; 2] = [SignalType::Scalping, SignalType::Swing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalping => "scalping",
            Self::Swing => "swing",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalping" => Ok(Self::Scalping),
            "swing" => Ok(Self::Swing),
            other => Err(format!("unknown signal type '{other}' (expected scalping or swing)")),
        }
    }
}

/// Trade direction of an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}
