//! Input sanity checks and the statistical-mode decision.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{Config, SearchInputType};
use crate::psm::PsmStore;

/// Effective statistical treatment, decided once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsDecision {
    /// Scale decoy counts by pi0 and the class ratio.
    pub use_mix_max: bool,
    /// Eliminate competing PSMs per (scan, expMass, charge) before the
    /// final q-values.
    pub tdc_weeding: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SanityCheck {
    concatenated: bool,
    /// Initial weight overlay in raw feature space, when the user
    /// supplied one.
    pub init_weights: Option<Vec<f64>>,
    /// (feature index, sign) for a user-named initial direction.
    pub default_direction: Option<(usize, f64)>,
    /// Keep suspect weight vectors instead of falling back.
    pub overrule: bool,
}

impl SanityCheck {
    /// Inspect (scan, expMass) collisions: a separate-search input has
    /// target and decoy PSMs sharing the same spectrum key, a concatenated
    /// search has one PSM per key.
    pub fn detect(store: &PsmStore) -> Self {
        let mut labels_by_key: HashMap<(u32, u64), (bool, bool)> = HashMap::new();
        for psm in &store.psms {
            let entry = labels_by_key
                .entry((psm.scan, psm.exp_mass.to_bits()))
                .or_insert((false, false));
            if psm.is_target() {
                entry.0 = true;
            } else {
                entry.1 = true;
            }
        }
        let concatenated = !labels_by_key.values().any(|&(t, d)| t && d);
        Self {
            concatenated,
            ..Self::default()
        }
    }

    pub fn concatenated_search(&self) -> bool {
        self.concatenated
    }

    /// Apply the mode table from the detected input structure and the
    /// user's flags, logging the override warnings.
    pub fn resolve_statistics(&self, cfg: &Config) -> StatisticsDecision {
        let mut use_mix_max = cfg.post_processing_mixmax;
        let mut tdc_weeding = cfg.post_processing_tdc;

        match cfg.search_input {
            SearchInputType::Auto => {
                if self.concatenated {
                    if use_mix_max {
                        log::warn!(
                            "concatenated search input detected, but overridden by -y flag: \
                             using mix-max anyway"
                        );
                    } else {
                        log::info!(
                            "concatenated search input detected, skipping both \
                             target-decoy competition and mix-max"
                        );
                    }
                } else if tdc_weeding {
                    log::info!(
                        "separate target and decoy search inputs detected, using \
                         target-decoy competition on the learned scores"
                    );
                } else {
                    use_mix_max = true;
                    log::info!(
                        "separate target and decoy search inputs detected, using the \
                         mix-max method"
                    );
                }
            }
            SearchInputType::Separate => {
                if self.concatenated {
                    log::warn!(
                        "concatenated search input detected, but overridden by -I flag \
                         specifying separate searches"
                    );
                }
                if !tdc_weeding {
                    use_mix_max = true;
                }
            }
            SearchInputType::Concatenated => {
                if !self.concatenated {
                    log::warn!(
                        "separate searches input detected, but overridden by -I flag \
                         specifying a concatenated search"
                    );
                }
                use_mix_max = false;
                tdc_weeding = false;
            }
        }

        debug_assert!(!(use_mix_max && tdc_weeding));
        StatisticsDecision {
            use_mix_max,
            tdc_weeding,
        }
    }

    /// Read an initial weight vector, one value per line, in raw feature
    /// space. Accepts F values (bias defaults to 0) or F+1.
    pub fn load_init_weights(&mut self, path: &Path, num_features: usize) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read initial weights from {}", path.display()))?;
        let mut weights = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: f64 = line.parse().with_context(|| {
                format!("invalid weight on line {} of {}", lineno + 1, path.display())
            })?;
            weights.push(value);
        }
        if weights.len() == num_features {
            weights.push(0.0);
        }
        anyhow::ensure!(
            weights.len() == num_features + 1,
            "expected {} or {} initial weights, found {}",
            num_features,
            num_features + 1,
            weights.len()
        );
        self.init_weights = Some(weights);
        Ok(())
    }

    /// Resolve a user-named initial direction feature; a leading '-'
    /// means lower feature values are better.
    pub fn set_default_direction(&mut self, name: &str, feature_names: &[String]) -> Result<()> {
        let (sign, bare) = match name.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, name),
        };
        let index = feature_names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(bare))
            .with_context(|| format!("unknown default direction feature '{}'", bare))?;
        self.default_direction = Some((index, sign));
        Ok(())
    }

    /// One-hot direction vector for the named feature, length F+1.
    pub fn default_direction_vector(&self, num_features: usize) -> Option<Vec<f64>> {
        self.default_direction.map(|(index, sign)| {
            let mut direction = vec![0.0; num_features + 1];
            direction[index] = sign;
            direction
        })
    }

    /// Guard against degenerate training: a fold whose learned vector
    /// finds fewer test positives than its initial direction falls back
    /// to that direction, unless the user overrides the check.
    pub fn validate_direction(
        &self,
        weights: &mut [Vec<f64>],
        learned_positives: &[usize],
        init_directions: &[Vec<f64>],
        init_positives: &[usize],
    ) {
        for (fold, (w, &learned)) in weights
            .iter_mut()
            .zip(learned_positives.iter())
            .enumerate()
        {
            if learned < init_positives[fold] {
                if self.overrule {
                    log::warn!(
                        "fold {}: learned weights separate {} positives vs {} for the \
                         initial direction; keeping them (--override set)",
                        fold + 1,
                        learned,
                        init_positives[fold]
                    );
                } else {
                    log::warn!(
                        "fold {}: learned weights separate {} positives vs {} for the \
                         initial direction; falling back to the initial direction",
                        fold + 1,
                        learned,
                        init_positives[fold]
                    );
                    w.copy_from_slice(&init_directions[fold]);
                }
            }
        }
    }
}
