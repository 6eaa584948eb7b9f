//! Engine tunables. Every section defaults independently, so a config file
//! only needs the keys it changes.

use serde::{Deserialize, Serialize};

use crate::curve::SquareRootCurve;
use crate::decay::DecayPolicy;
use crate::domain::DomainCatalog;
use crate::suggestion::DetectionPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub curve: CurveConfig,
    pub decay: DecayConfig,
    pub suggestions: SuggestionConfig,
    pub validation: ValidationConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
    pub domains: DomainCatalog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    pub expertise_points_per_level_sq: f64,
    pub overall_points_per_level_sq: f64,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            expertise_points_per_level_sq: 100.0,
            overall_points_per_level_sq: 400.0,
        }
    }
}

impl CurveConfig {
    pub fn expertise_curve(&self) -> SquareRootCurve {
        SquareRootCurve::new(self.expertise_points_per_level_sq)
    }

    pub fn overall_curve(&self) -> SquareRootCurve {
        SquareRootCurve::new(self.overall_points_per_level_sq)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub grace_period_days: i64,
    pub weekly_decay_rate: f64,
    /// Run the decay step for an owner's records before serving reads.
    pub apply_on_read: bool,
}

impl Default for DecayConfig {
    fn default() -> Self {
        let policy = DecayPolicy::default();
        Self {
            grace_period_days: policy.grace_period_days,
            weekly_decay_rate: policy.weekly_decay_rate,
            apply_on_read: false,
        }
    }
}

impl DecayConfig {
    pub fn policy(&self) -> DecayPolicy {
        DecayPolicy {
            grace_period_days: self.grace_period_days,
            weekly_decay_rate: self.weekly_decay_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub divergence_threshold: u8,
    pub minutes_per_level: f64,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        let policy = DetectionPolicy::default();
        Self {
            divergence_threshold: policy.divergence_threshold,
            minutes_per_level: policy.minutes_per_level,
        }
    }
}

impl SuggestionConfig {
    pub fn policy(&self) -> DetectionPolicy {
        DetectionPolicy {
            divergence_threshold: self.divergence_threshold,
            minutes_per_level: self.minutes_per_level,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reject domain codes missing from the catalogue.
    pub strict_domains: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.decay.grace_period_days, 14);
        assert_eq!(config.decay.weekly_decay_rate, 0.05);
        assert!(!config.decay.apply_on_read);
        assert_eq!(config.suggestions.divergence_threshold, 25);
        assert!(!config.validation.strict_domains);
        assert!(config.domains.contains("000"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"decay": {"weekly_decay_rate": 0.1}, "domains": {"A-01-001": "Strength"}}"#,
        )
        .unwrap();
        assert_eq!(config.decay.weekly_decay_rate, 0.1);
        assert_eq!(config.decay.grace_period_days, 14);
        assert_eq!(config.domains.name_for("A-01-001"), "Strength");
        assert!(config.domains.contains("000"));
        assert_eq!(config.server.port, 7878);
    }
}
