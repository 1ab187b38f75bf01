//! Peptide-spectrum match records and their scored wrappers.

use std::cmp::Ordering;

use crate::arena::FeatureArena;

pub const LABEL_TARGET: i32 = 1;
pub const LABEL_DECOY: i32 = -1;

/// One peptide-spectrum match as read from the input.
///
/// Immutable after ingest except for `features`, which is rebound when the
/// arena reorders rows and cleared when a single-pass rescore releases the
/// row after use.
#[derive(Debug, Clone)]
pub struct Psm {
    pub id: String,
    pub label: i32,
    pub scan: u32,
    pub exp_mass: f64,
    pub calc_mass: f64,
    pub charge: u32,
    /// Peptide with flanking residues, e.g. `K.ELVISK.R`.
    pub peptide: String,
    pub proteins: Vec<String>,
    /// Live arena row, or None once the row has been released.
    pub features: Option<usize>,
    /// Observed retention time, kept unnormalized for the
    /// description-of-correct add-on.
    pub ret_time: f64,
    pub pred_ret_time: f64,
}

impl Psm {
    pub fn is_target(&self) -> bool {
        self.label == LABEL_TARGET
    }

    pub fn is_decoy(&self) -> bool {
        self.label == LABEL_DECOY
    }

    /// The bare peptide sequence, with flanking residues stripped.
    pub fn sequence(&self) -> &str {
        strip_flanks(&self.peptide).1
    }

    pub fn flank_n(&self) -> &str {
        strip_flanks(&self.peptide).0
    }

    pub fn flank_c(&self) -> &str {
        strip_flanks(&self.peptide).2
    }
}

/// Split `K.SEQ.R` into (n-flank, sequence, c-flank); peptides without
/// flanking annotation come back whole.
fn strip_flanks(peptide: &str) -> (&str, &str, &str) {
    let bytes = peptide.as_bytes();
    if bytes.len() >= 5 && bytes[1] == b'.' && bytes[bytes.len() - 2] == b'.' {
        (
            &peptide[..1],
            &peptide[2..peptide.len() - 2],
            &peptide[peptide.len() - 1..],
        )
    } else {
        ("", peptide, "")
    }
}

/// Owner of all PSMs and their feature rows.
#[derive(Debug)]
pub struct PsmStore {
    pub psms: Vec<Psm>,
    pub arena: FeatureArena,
}

impl PsmStore {
    pub fn new(num_features: usize) -> Self {
        Self {
            psms: Vec::new(),
            arena: FeatureArena::new(num_features),
        }
    }

    pub fn len(&self) -> usize {
        self.psms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psms.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.arena.num_features()
    }

    /// Ingest a PSM together with its raw feature row.
    pub fn push(&mut self, mut psm: Psm, features: &[f64]) -> usize {
        let idx = self.psms.len();
        let row = self.arena.alloc(idx);
        let slot = self.arena.row_mut(row);
        slot[..features.len()].copy_from_slice(features);
        psm.features = Some(row);
        self.psms.push(psm);
        idx
    }

    pub fn features_of(&self, psm: usize) -> Option<&[f64]> {
        self.psms[psm].features.map(|row| self.arena.row(row))
    }

    /// Release a PSM's feature row back to the arena.
    pub fn release_features(&mut self, psm: usize) {
        if let Some(row) = self.psms[psm].features.take() {
            self.arena.deallocate(row);
        }
    }

    /// Move the listed PSMs' rows into contiguous slots 0..order.len(),
    /// in the given order, rebinding row indices in place.
    pub fn reorder_rows(&mut self, order: &[usize]) {
        for (slot, &psm) in order.iter().enumerate() {
            let current = match self.psms[psm].features {
                Some(row) => row,
                None => continue,
            };
            if current == slot {
                continue;
            }
            let (owner_slot, owner_current) = self.arena.swap_rows(slot, current);
            debug_assert_eq!(owner_slot, Some(psm));
            self.psms[psm].features = Some(slot);
            if let Some(displaced) = owner_current {
                self.psms[displaced].features = Some(current);
            }
        }
    }

    pub fn count_label(&self, label: i32) -> usize {
        self.psms.iter().filter(|p| p.label == label).count()
    }
}

/// A PSM reference plus the mutable statistics attached to it during
/// rescoring.
#[derive(Debug, Clone)]
pub struct ScoreHolder {
    pub psm: usize,
    pub label: i32,
    pub score: f64,
    pub q: f64,
    pub pep: f64,
    pub p: f64,
}

impl ScoreHolder {
    pub fn new(psm: usize, label: i32) -> Self {
        Self {
            psm,
            label,
            score: 0.0,
            q: 0.0,
            pep: 0.0,
            p: 0.0,
        }
    }

    pub fn is_target(&self) -> bool {
        self.label == LABEL_TARGET
    }

    pub fn is_decoy(&self) -> bool {
        self.label == LABEL_DECOY
    }

    pub fn to_pair(&self) -> (f64, bool) {
        (self.score, self.is_target())
    }

    /// One line of tab-delimited results, matching the
    /// `PSMId\tscore\tq-value\tposterior_error_prob\tpeptide\tproteinIds`
    /// header.
    pub fn tab_line(&self, psms: &[Psm]) -> String {
        let psm = &psms[self.psm];
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            psm.id,
            self.score,
            self.q,
            self.pep,
            psm.peptide,
            psm.proteins.join("\t")
        )
    }
}

/// The total ordering used everywhere scores are ranked: score descending,
/// then scan, expMass and label descending. One composite comparator so
/// tie-breaking never depends on insertion order.
pub fn cmp_desc(a: &ScoreHolder, b: &ScoreHolder, psms: &[Psm]) -> Ordering {
    let pa = &psms[a.psm];
    let pb = &psms[b.psm];
    b.score
        .total_cmp(&a.score)
        .then_with(|| pb.scan.cmp(&pa.scan))
        .then_with(|| pb.exp_mass.total_cmp(&pa.exp_mass))
        .then_with(|| b.label.cmp(&a.label))
}

/// The inverse of [`cmp_desc`].
pub fn cmp_asc(a: &ScoreHolder, b: &ScoreHolder, psms: &[Psm]) -> Ordering {
    cmp_desc(b, a, psms)
}
