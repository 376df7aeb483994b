//! Process-wide synthesis options.
//!
//! Grounded on SPEC_FULL.md §9/§10.3: six named flags, carried as plain
//! fields with a `Default` impl, constructible either from `cozy-cli`'s
//! `clap`-derived flags or from a `serde_json` config file — the same
//! narrow, single-object configuration surface the original system
//! exposes (`cozy.opts.Option`), not a layered config system.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run `invariant_preservation::check_ops_preserve_invariants` and
    /// `check_the_wf` after type-checking and report their diagnostics.
    pub invariant_preservation_check: bool,
    /// Dedupe newly discovered sub-queries against `query_specs` before
    /// installing them (`Implementation::add_subquery`'s matching rule).
    pub deduplicate_subqueries: bool,
    /// Compose the candidate enumerator with a domain-specific
    /// acceleration layer, when one is plugged in.
    pub acceleration_rules: bool,
    /// Reject specs whose `EStateVar` placement crosses the
    /// runtime/state pool boundary (`wf::exp_wf`).
    pub enforce_well_formed_state_var_boundaries: bool,
    /// Lower worker-thread scheduling priority during synthesis, mirroring
    /// the original's `os.nice(20)` call in each improvement job.
    pub nice_children: bool,
    /// Directory improvement jobs write their per-query log file into.
    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            invariant_preservation_check: true,
            deduplicate_subqueries: true,
            acceleration_rules: true,
            enforce_well_formed_state_var_boundaries: true,
            nice_children: false,
            log_dir: "/tmp".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_documented_defaults() {
        let config = Config::default();
        assert!(config.invariant_preservation_check);
        assert!(config.acceleration_rules);
        assert!(!config.nice_children);
        assert_eq!(config.log_dir, "/tmp");
    }

    #[test]
    fn round_trips_through_json() {
        let config = Config {
            log_dir: "/var/log/cozy".to_string(),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{\"log_dir\": \"/x\"}").unwrap();
        assert_eq!(config.log_dir, "/x");
        assert!(config.acceleration_rules);
    }
}
