//! percolate-core: semi-supervised rescoring of peptide-spectrum matches.
//!
//! Given PSMs labeled target or decoy, the pipeline learns a linear SVM
//! over their features by three-fold cross-validation, re-scores every
//! PSM, and converts scores into q-values and posterior error
//! probabilities, optionally collapsed to peptide level with a handoff
//! for protein inference.
pub mod arena;
pub mod config;
pub mod cv;
pub mod doc;
pub mod error;
pub mod io;
pub mod kde;
pub mod math;
pub mod normalizer;
pub mod pipeline;
pub mod proteins;
pub mod psm;
pub mod sanity;
pub mod scores;
pub mod stats;
pub mod svm;
