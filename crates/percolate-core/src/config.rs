use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Feature normalization policy, selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizerType {
    /// Subtract the mean, divide by the standard deviation.
    StandardDeviation,
    /// Rescale to the [0, 1] range per feature.
    Unit,
}

impl FromStr for NormalizerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdv" | "standard_deviation" => Ok(NormalizerType::StandardDeviation),
            "unit" | "uniform" => Ok(NormalizerType::Unit),
            _ => Err(format!("Unknown normalizer type: {}", s)),
        }
    }
}

/// What kind of target-decoy search produced the input PSMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchInputType {
    /// Detect from (scan, expMass) collisions between labels.
    Auto,
    /// Single search against a concatenated target-decoy database.
    Concatenated,
    /// Two searches, one against targets and one against decoys.
    Separate,
}

impl FromStr for SearchInputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SearchInputType::Auto),
            "concatenated" => Ok(SearchInputType::Concatenated),
            "separate" => Ok(SearchInputType::Separate),
            _ => Err(format!(
                "the -I/--search-input option has to be one out of \
                 \"concatenated\", \"separate\" or \"auto\", got \"{}\"",
                s
            )),
        }
    }
}

/// Data level for OpenSWATH OSW files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OswLevel {
    Ms1,
    Ms2,
    Transition,
}

impl OswLevel {
    pub fn score_table(&self) -> &'static str {
        match self {
            OswLevel::Ms1 => "SCORE_MS1",
            OswLevel::Ms2 => "SCORE_MS2",
            OswLevel::Transition => "SCORE_TRANSITION",
        }
    }
}

impl FromStr for OswLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MS1" => Ok(OswLevel::Ms1),
            "MS2" => Ok(OswLevel::Ms2),
            "T" | "TRANSITION" => Ok(OswLevel::Transition),
            _ => Err(format!(
                "Data-level for OpenSWATH must be MS1, MS2 or T, got \"{}\"",
                s
            )),
        }
    }
}

/// Where the PSMs come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    /// Tab-delimited PIN file (the default format).
    PinFile(PathBuf),
    /// PIN-tab streamed from standard input.
    PinStdin,
    /// Deprecated pin-xml file; accepted on the command line, rejected by
    /// the reader seam.
    PinXmlFile(PathBuf),
    PinXmlStdin,
    /// OpenSWATH SQLite file; results are written back into the same file.
    Osw { path: PathBuf, level: OswLevel },
}

/// Parameters handed to an external protein inference engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProteinConfig {
    /// Fido when true, picked-protein otherwise.
    pub use_fido: bool,
    /// Fasta database for picked-protein grouping; "auto" skips grouping.
    pub fasta: Option<String>,
    pub decoy_pattern: String,
    pub enzyme: String,
    pub report_fragment_proteins: bool,
    pub report_duplicate_proteins: bool,
    pub output_empirical_qvalues: bool,
    pub fido_alpha: f64,
    pub fido_beta: f64,
    pub fido_gamma: f64,
    pub fido_gridsearch_depth: u32,
    pub fido_gridsearch_threshold: f64,
    pub fido_no_split_large_components: bool,
    pub fido_protein_truncation_threshold: f64,
    pub fido_gridsearch_mse_threshold: f64,
}

impl Default for ProteinConfig {
    fn default() -> Self {
        Self {
            use_fido: false,
            fasta: None,
            decoy_pattern: "random_".to_string(),
            enzyme: "trypsin".to_string(),
            report_fragment_proteins: false,
            report_duplicate_proteins: false,
            output_empirical_qvalues: false,
            fido_alpha: -1.0,
            fido_beta: -1.0,
            fido_gamma: -1.0,
            fido_gridsearch_depth: 0,
            fido_gridsearch_threshold: 0.0,
            fido_no_split_large_components: false,
            fido_protein_truncation_threshold: 0.01,
            fido_gridsearch_mse_threshold: 0.1,
        }
    }
}

/// Central configuration for a rescoring run.
///
/// Built once from the command line and passed by reference through the
/// pipeline; nothing in here mutates after parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputSource,

    pub xml_output: Option<PathBuf>,
    pub tab_output: Option<PathBuf>,
    pub weight_output: Option<PathBuf>,
    pub psm_results: Option<PathBuf>,
    pub decoy_psm_results: Option<PathBuf>,
    pub peptide_results: Option<PathBuf>,
    pub decoy_peptide_results: Option<PathBuf>,
    pub protein_results: Option<PathBuf>,
    pub decoy_protein_results: Option<PathBuf>,

    pub xml_print_decoys: bool,
    pub xml_print_exp_mass: bool,

    /// Report peptide-level statistics after PSM-level ones.
    pub report_unique_peptides: bool,
    /// User asked for target-decoy competition (-Y).
    pub post_processing_tdc: bool,
    /// User asked for mix-max explicitly (-y).
    pub post_processing_mixmax: bool,
    pub search_input: SearchInputType,

    /// FDR threshold defining positive training examples.
    pub selection_fdr: f64,
    /// FDR threshold for model selection and reporting.
    pub test_fdr: f64,
    pub num_iterations: u32,
    /// Train on at most this many PSMs; 0 trains on everything.
    pub subset_max_train: usize,
    /// Cost of positive-side errors; 0 means grid-searched.
    pub cpos: f64,
    /// Cost of negative-side errors; 0 means grid-searched.
    pub cneg: f64,

    pub report_each_iteration: bool,
    pub quick_validation: bool,
    pub no_terminate: bool,
    /// Keep a suspect SVM weight vector instead of falling back.
    pub override_suspect: bool,

    pub seed: u64,
    pub normalizer: NormalizerType,
    /// Feature name used as initial search direction, optionally
    /// "-"-prefixed to flip it.
    pub default_direction: Option<String>,
    pub init_weights: Option<PathBuf>,

    /// Description-of-correct feature bitmask; None disables the add-on.
    pub doc_type: Option<u32>,
    /// Klammer et al. retention-time feature dialect.
    pub klammer: bool,

    pub verbosity: u8,
    pub protein: Option<ProteinConfig>,

    /// The command line that produced this config, echoed in banners and
    /// XML output.
    pub command_line: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputSource::PinStdin,
            xml_output: None,
            tab_output: None,
            weight_output: None,
            psm_results: None,
            decoy_psm_results: None,
            peptide_results: None,
            decoy_peptide_results: None,
            protein_results: None,
            decoy_protein_results: None,
            xml_print_decoys: false,
            xml_print_exp_mass: true,
            report_unique_peptides: true,
            post_processing_tdc: false,
            post_processing_mixmax: false,
            search_input: SearchInputType::Auto,
            selection_fdr: 0.01,
            test_fdr: 0.01,
            num_iterations: 10,
            subset_max_train: 0,
            cpos: 0.0,
            cneg: 0.0,
            report_each_iteration: false,
            quick_validation: false,
            no_terminate: false,
            override_suspect: false,
            seed: 1,
            normalizer: NormalizerType::StandardDeviation,
            default_direction: None,
            init_weights: None,
            doc_type: None,
            klammer: false,
            verbosity: 2,
            protein: None,
            command_line: String::new(),
        }
    }
}

impl Config {
    /// Both -y and -Y at once is a hard error regardless of no-terminate.
    pub fn validate(&self) -> Result<(), crate::error::PercolateError> {
        if self.post_processing_mixmax && self.post_processing_tdc {
            return Err(crate::error::PercolateError::MutuallyExclusive(
                "the -Y/--post-processing-tdc and -y/--post-processing-mix-max \
                 options were both set; use only one of these options at a time"
                    .to_string(),
            ));
        }
        if self.post_processing_mixmax && self.search_input == SearchInputType::Concatenated {
            return Err(crate::error::PercolateError::MutuallyExclusive(
                "concatenated search specified for -I/--search-input is \
                 incompatible with the -y/--post-processing-mix-max option"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizer_type_from_str() {
        assert_eq!(
            "unit".parse::<NormalizerType>().unwrap(),
            NormalizerType::Unit
        );
        assert!("banana".parse::<NormalizerType>().is_err());
    }

    #[test]
    fn search_input_from_str() {
        assert_eq!(
            "separate".parse::<SearchInputType>().unwrap(),
            SearchInputType::Separate
        );
        assert!("both".parse::<SearchInputType>().is_err());
    }

    #[test]
    fn mixmax_and_tdc_conflict() {
        let cfg = Config {
            post_processing_mixmax: true,
            post_processing_tdc: true,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mixmax_with_concatenated_conflict() {
        let cfg = Config {
            post_processing_mixmax: true,
            search_input: SearchInputType::Concatenated,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_round_trips_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg2.seed, cfg.seed);
        assert_eq!(cfg2.normalizer, cfg.normalizer);
    }
}
