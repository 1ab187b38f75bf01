use std::error::Error;
use std::fmt;

/// Errors raised by the rescoring pipeline.
///
/// Most of these are fatal by default but downgraded to warnings when the
/// user runs with `--no-terminate`; parse errors and conflicting flags are
/// always fatal.
#[derive(Debug)]
pub enum PercolateError {
    /// Conflicting flags, wrong argument counts, unknown option values.
    Parse(String),
    /// A reader rejected the input file.
    InputFormat(String),
    /// Zero targets or zero decoys in the input. `true` if only targets
    /// are present, `false` if only decoys.
    MissingClass(bool),
    /// Virtually all targets outscore all decoys, so the decoy null model
    /// carries no information.
    TooGoodSeparation,
    /// No single feature separates any positives at the training FDR.
    NoInitDirection,
    /// A learned weight vector performs worse than the initial direction.
    SuspectSvmResult,
    /// Mix-max and target-decoy competition were both requested.
    MutuallyExclusive(String),
}

impl fmt::Display for PercolateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PercolateError::Parse(msg) => write!(f, "{}", msg),
            PercolateError::InputFormat(msg) => {
                write!(f, "failed to read input: {}", msg)
            }
            PercolateError::MissingClass(only_targets) => {
                if *only_targets {
                    write!(f, "no decoy PSMs were provided")
                } else {
                    write!(f, "no target PSMs were provided")
                }
            }
            PercolateError::TooGoodSeparation => write!(
                f,
                "error in the input data: too good separation between target and decoy PSMs"
            ),
            PercolateError::NoInitDirection => write!(
                f,
                "error in the input data: cannot find an initial direction with \
                 positive training examples; consider raising the training FDR \
                 threshold (-F flag)"
            ),
            PercolateError::SuspectSvmResult => write!(
                f,
                "learned weight vector found fewer positives than the initial direction"
            ),
            PercolateError::MutuallyExclusive(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for PercolateError {}
