//! Configuration for the reconciliation run, read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::rate_limit::{DEFAULT_CALL_LIMIT, DEFAULT_WINDOW};
use crate::subset_sum::DEFAULT_MAX_SUBSET_ITEMS;

pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-lite";

/// When the refinement collaborator is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementMode {
    Off,
    /// Only when the deterministic run leaves a spend uncovered
    WhenUncovered,
    Always,
}

impl RefinementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::WhenUncovered => "uncovered",
            Self::Always => "always",
        }
    }
}

impl FromStr for RefinementMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" | "false" | "no" => Ok(Self::Off),
            "uncovered" | "1" | "true" | "yes" => Ok(Self::WhenUncovered),
            "always" | "full" => Ok(Self::Always),
            _ => Err(ConfigError::UnknownRefinementMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefinementConfig {
    pub mode: RefinementMode,
    pub model: String,
    pub rate_limit: u32,
    pub window: Duration,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        RefinementConfig {
            mode: RefinementMode::WhenUncovered,
            model: DEFAULT_MODEL.to_string(),
            rate_limit: DEFAULT_CALL_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoverageConfig {
    pub max_subset_items: usize,
    pub refinement: RefinementConfig,
    pub log_level: String,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        CoverageConfig {
            max_subset_items: DEFAULT_MAX_SUBSET_ITEMS,
            refinement: RefinementConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl CoverageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults,
    /// set-but-invalid keys are errors
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CoverageConfig::default();

        let max_subset_items = match lookup("COVERAGE_MAX_SUBSET_ITEMS") {
            Some(raw) => parse_max_subset_items(&raw)?,
            None => defaults.max_subset_items,
        };

        let mode = match lookup("COVERAGE_REFINEMENT") {
            Some(raw) => raw.parse::<RefinementMode>()?,
            None => defaults.refinement.mode,
        };

        let rate_limit = match lookup("COVERAGE_REFINEMENT_RATE_LIMIT") {
            Some(raw) => parse_number::<u32>("COVERAGE_REFINEMENT_RATE_LIMIT", &raw)?,
            None => defaults.refinement.rate_limit,
        };

        let window = match lookup("COVERAGE_REFINEMENT_WINDOW_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>(
                "COVERAGE_REFINEMENT_WINDOW_SECS",
                &raw,
            )?),
            None => defaults.refinement.window,
        };

        if rate_limit == 0 || window.is_zero() {
            return Err(ConfigError::ZeroRateLimit);
        }

        Ok(CoverageConfig {
            max_subset_items,
            refinement: RefinementConfig {
                mode,
                model: lookup("COVERAGE_REFINEMENT_MODEL").unwrap_or(defaults.refinement.model),
                rate_limit,
                window,
            },
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

/// Subset cap must be a positive integer
pub fn parse_max_subset_items(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidMaxSubsetItems(raw.to_string())),
    }
}

fn parse_number<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: raw.to_string(),
    })
}
