//! Tab-delimited result emission.

use std::io::{self, Write};

use crate::psm::PsmStore;
use crate::scores::ScoreSet;

pub const RESULT_HEADER: &str = "PSMId\tscore\tq-value\tposterior_error_prob\tpeptide\tproteinIds";

/// Write the result rows for one label (1 = targets, -1 = decoys).
pub fn write_results<W: Write>(
    out: &mut W,
    scores: &ScoreSet,
    store: &PsmStore,
    label: i32,
) -> io::Result<()> {
    writeln!(out, "{}", RESULT_HEADER)?;
    for sh in scores.holders() {
        if sh.label == label {
            writeln!(out, "{}", sh.tab_line(&store.psms))?;
        }
    }
    Ok(())
}
