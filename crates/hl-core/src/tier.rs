use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_LEVEL;
use crate::validation::ValidationError;

/// Coarse label derived from a level through fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// [0, 50)
    Beginner,
    /// [50, 100)
    Intermediate,
    /// [100, 150)
    Advanced,
    /// [150, 199]
    Expert,
}

impl Tier {
    pub fn from_level(level: u8) -> Self {
        match level.min(MAX_LEVEL) {
            0..=49 => Tier::Beginner,
            50..=99 => Tier::Intermediate,
            100..=149 => Tier::Advanced,
            _ => Tier::Expert,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Beginner => "beginner",
            Tier::Intermediate => "intermediate",
            Tier::Advanced => "advanced",
            Tier::Expert => "expert",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Tier::Beginner),
            "intermediate" => Ok(Tier::Intermediate),
            "advanced" => Ok(Tier::Advanced),
            "expert" => Ok(Tier::Expert),
            other => Err(ValidationError::UnknownVariant {
                field: "tier",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(Tier::from_level(0), Tier::Beginner);
        assert_eq!(Tier::from_level(49), Tier::Beginner);
        assert_eq!(Tier::from_level(50), Tier::Intermediate);
        assert_eq!(Tier::from_level(99), Tier::Intermediate);
        assert_eq!(Tier::from_level(100), Tier::Advanced);
        assert_eq!(Tier::from_level(149), Tier::Advanced);
        assert_eq!(Tier::from_level(150), Tier::Expert);
        assert_eq!(Tier::from_level(199), Tier::Expert);
        assert_eq!(Tier::from_level(255), Tier::Expert);
    }

    #[test]
    fn test_monotonic_in_level() {
        let mut prev = Tier::from_level(0);
        for level in 1..=MAX_LEVEL {
            let tier = Tier::from_level(level);
            assert!(tier >= prev, "tier dropped at level {level}");
            prev = tier;
        }
    }

    #[test]
    fn test_str_roundtrip() {
        for tier in [Tier::Beginner, Tier::Intermediate, Tier::Advanced, Tier::Expert] {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
        assert!("master".parse::<Tier>().is_err());
    }
}
