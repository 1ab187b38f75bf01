//! Protein-level inference handoff.
//!
//! The core does not infer proteins; it hands the final score set to an
//! external estimator implementing this capability set. The two known
//! families (Fido-style Bayesian inference and picked-protein FDR) are
//! configured through [`crate::config::ProteinConfig`].

use anyhow::Result;

use crate::psm::PsmStore;
use crate::scores::ScoreSet;

pub trait ProteinEstimator {
    /// Take in the peptide-level score set.
    fn initialize(&mut self, scores: &ScoreSet, store: &PsmStore) -> Result<()>;

    /// Run the inference procedure.
    fn run(&mut self) -> Result<()>;

    /// Turn inference results into per-protein probabilities.
    fn compute_probabilities(&mut self) -> Result<()>;

    /// Derive q-values and PEPs at the protein level.
    fn compute_statistics(&mut self) -> Result<()>;

    /// Emit results; either path may be None for stdout.
    fn print_out(
        &self,
        target_path: Option<&std::path::Path>,
        decoy_path: Option<&std::path::Path>,
    ) -> Result<()>;

    fn name(&self) -> &str {
        "protein estimator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingEstimator {
        calls: Vec<&'static str>,
        peptides_seen: usize,
    }

    impl ProteinEstimator for RecordingEstimator {
        fn initialize(&mut self, scores: &ScoreSet, _store: &PsmStore) -> Result<()> {
            self.calls.push("initialize");
            self.peptides_seen = scores.len();
            Ok(())
        }

        fn run(&mut self) -> Result<()> {
            self.calls.push("run");
            Ok(())
        }

        fn compute_probabilities(&mut self) -> Result<()> {
            self.calls.push("probabilities");
            Ok(())
        }

        fn compute_statistics(&mut self) -> Result<()> {
            self.calls.push("statistics");
            Ok(())
        }

        fn print_out(
            &self,
            _target_path: Option<&std::path::Path>,
            _decoy_path: Option<&std::path::Path>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn capability_sequence() {
        let store = PsmStore::new(1);
        let scores = ScoreSet::new(false);
        let mut estimator = RecordingEstimator::default();
        estimator.initialize(&scores, &store).unwrap();
        estimator.run().unwrap();
        estimator.compute_probabilities().unwrap();
        estimator.compute_statistics().unwrap();
        assert_eq!(
            estimator.calls,
            vec!["initialize", "run", "probabilities", "statistics"]
        );
    }
}
