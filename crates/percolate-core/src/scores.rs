//! The ordered collection of scored PSMs and the operations on it:
//! ranking, merging, redundancy weeding, fold splitting, and the
//! statistical bookkeeping that feeds the posterior estimator.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::Rng;

use crate::doc::DescriptionOfCorrect;
use crate::error::PercolateError;
use crate::psm::{cmp_asc, cmp_desc, PsmStore, ScoreHolder, LABEL_DECOY, LABEL_TARGET};
use crate::stats::{self, FdrMode};
use crate::svm::SvmInput;

/// SVM score of one feature row: w[0..F] against the row plus the bias in
/// the last slot.
pub fn calc_score(features: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(features.len() + 1, weights.len());
    crate::math::dot(features, &weights[..features.len()]) + weights[features.len()]
}

#[derive(Debug, Clone)]
pub struct ScoreSet {
    scores: Vec<ScoreHolder>,
    n_targets: usize,
    n_decoys: usize,
    /// #targets / max(1, #decoys).
    ratio: f64,
    pi0: f64,
    use_pi0: bool,
    /// Representative PSM -> all PSMs sharing its peptide; populated by
    /// peptide-unique weeding.
    peptide_psm_map: HashMap<usize, Vec<usize>>,
}

impl ScoreSet {
    pub fn new(use_pi0: bool) -> Self {
        Self {
            scores: Vec::new(),
            n_targets: 0,
            n_decoys: 0,
            ratio: 0.0,
            pi0: 1.0,
            use_pi0,
            peptide_psm_map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn holders(&self) -> &[ScoreHolder] {
        &self.scores
    }

    pub fn holders_mut(&mut self) -> &mut [ScoreHolder] {
        &mut self.scores
    }

    pub fn push(&mut self, sh: ScoreHolder) {
        self.scores.push(sh);
    }

    pub fn pos_size(&self) -> usize {
        self.n_targets
    }

    pub fn neg_size(&self) -> usize {
        self.n_decoys
    }

    pub fn pi0(&self) -> f64 {
        self.pi0
    }

    pub fn uses_pi0(&self) -> bool {
        self.use_pi0
    }

    pub fn target_decoy_ratio(&self) -> f64 {
        self.ratio
    }

    pub fn fdr_mode(&self) -> FdrMode {
        if self.use_pi0 {
            FdrMode::MixMax
        } else {
            FdrMode::Tdc
        }
    }

    pub fn peptide_psms(&self, representative: usize) -> Option<&[usize]> {
        self.peptide_psm_map.get(&representative).map(|v| v.as_slice())
    }

    pub fn reset(&mut self) {
        self.scores.clear();
        self.n_targets = 0;
        self.n_decoys = 0;
        self.ratio = 0.0;
        self.pi0 = 1.0;
        self.peptide_psm_map.clear();
    }

    /// Append ScoreHolders for every stored PSM carrying `label`.
    pub fn fill(&mut self, store: &PsmStore, label: i32) -> Result<(), PercolateError> {
        if label != LABEL_TARGET && label != LABEL_DECOY {
            return Err(PercolateError::Parse(format!(
                "refusing to fill a score set with label {}",
                label
            )));
        }
        for (idx, psm) in store.psms.iter().enumerate() {
            if psm.label == label {
                self.scores.push(ScoreHolder::new(idx, label));
            }
        }
        Ok(())
    }

    /// Pull both classes from the data handler and validate that each is
    /// present.
    pub fn fill_features(
        &mut self,
        store: &PsmStore,
        no_terminate: bool,
    ) -> Result<(), PercolateError> {
        self.scores.clear();
        self.fill(store, LABEL_TARGET)?;
        self.fill(store, LABEL_DECOY)?;
        self.n_targets = store.count_label(LABEL_TARGET);
        self.n_decoys = store.count_label(LABEL_DECOY);
        self.ratio = self.n_targets as f64 / self.n_decoys.max(1) as f64;

        log::info!(
            "train/test set contains {} positives and {} negatives, size ratio = {:.4} and pi0 = {}",
            self.n_targets,
            self.n_decoys,
            self.ratio,
            self.pi0
        );

        if self.n_targets == 0 {
            if no_terminate {
                log::warn!("no target PSMs were provided; no-terminate flag set, ignoring");
            } else {
                return Err(PercolateError::MissingClass(false));
            }
        }
        if self.n_decoys == 0 {
            if no_terminate {
                log::warn!("no decoy PSMs were provided; no-terminate flag set, ignoring");
            } else {
                return Err(PercolateError::MissingClass(true));
            }
        }

        let minimum = store.num_features() * 5;
        if self.n_targets <= minimum {
            log::warn!(
                "the number of positive samples ({}) is too small to perform a correct classification",
                self.n_targets
            );
        }
        if self.n_decoys > 0 && self.n_decoys <= minimum {
            log::warn!(
                "the number of negative samples ({}) is too small to perform a correct classification",
                self.n_decoys
            );
        }
        Ok(())
    }

    /// Score one PSM with raw-space weights, release its feature row, and
    /// append it. This is the single-pass path used when streaming the
    /// full input back through a trained model.
    pub fn score_and_add(
        &mut self,
        store: &mut PsmStore,
        mut sh: ScoreHolder,
        raw_weights: &[f64],
        doc: Option<&DescriptionOfCorrect>,
    ) {
        if let Some(doc) = doc {
            doc.set_features(store, sh.psm);
        }
        let Some(row) = store.psms[sh.psm].features else {
            log::warn!(
                "the PSM {} has no live feature row and will be ignored",
                store.psms[sh.psm].id
            );
            return;
        };
        sh.score = calc_score(store.arena.row(row), raw_weights);
        store.release_features(sh.psm);

        if sh.label == LABEL_TARGET {
            self.n_targets += 1;
        } else if sh.label == LABEL_DECOY {
            self.n_decoys += 1;
        }
        if sh.label != LABEL_TARGET && sh.label != LABEL_DECOY {
            log::warn!(
                "the PSM {} has a label not in {{1, -1}} and will be ignored",
                store.psms[sh.psm].id
            );
        } else {
            self.scores.push(sh);
        }
    }

    /// Score every holder with `weights`, rank under the total order, and
    /// compute q-values at `fdr`. Returns the number of target discoveries.
    pub fn calc_scores(
        &mut self,
        weights: &[f64],
        fdr: f64,
        store: &PsmStore,
        skip_decoys_plus_one: bool,
    ) -> usize {
        for sh in self.scores.iter_mut() {
            let row = store.psms[sh.psm]
                .features
                .expect("scoring requires live feature rows");
            sh.score = calc_score(store.arena.row(row), weights);
        }
        let psms = &store.psms;
        self.scores.sort_by(|a, b| cmp_desc(a, b, psms));

        if log::log_enabled!(log::Level::Trace) && self.scores.len() >= 10 {
            for sh in self.scores.iter().take(10) {
                log::trace!("top score {} label {}", sh.score, sh.label);
            }
            for sh in self.scores.iter().rev().take(10) {
                log::trace!("bottom score {} label {}", sh.score, sh.label);
            }
        }
        self.calc_q(fdr, skip_decoys_plus_one)
    }

    pub fn score_label_pairs(&self) -> Vec<(f64, bool)> {
        self.scores.iter().map(|sh| sh.to_pair()).collect()
    }

    /// Q-values over the current ranking; the q of each holder is the
    /// minimum FDR of any prefix containing it. Returns the number of
    /// targets with q < `fdr`.
    pub fn calc_q(&mut self, fdr: f64, skip_decoys_plus_one: bool) -> usize {
        debug_assert_eq!(self.n_targets + self.n_decoys, self.scores.len());
        let combined = self.score_label_pairs();
        let qvals = stats::q_values(
            &combined,
            self.fdr_mode(),
            self.pi0,
            self.ratio,
            skip_decoys_plus_one,
        );

        let mut positives = 0;
        for (sh, q) in self.scores.iter_mut().zip(qvals) {
            sh.q = q;
            if sh.is_target() && sh.q < fdr {
                positives += 1;
            }
        }
        positives
    }

    /// Posterior error probabilities over the current ranking.
    pub fn calc_pep(&mut self) {
        let combined = self.score_label_pairs();
        let peps = stats::estimate_pep(&combined, self.use_pi0, self.pi0);
        for (sh, pep) in self.scores.iter_mut().zip(peps) {
            sh.pep = pep;
        }
    }

    /// Target p-values against the decoy null, stored on the holders, plus
    /// the separation check and (in mix-max mode) the pi0 estimate.
    pub fn check_separation_and_set_pi0(
        &mut self,
        no_terminate: bool,
    ) -> Result<(), PercolateError> {
        let combined = self.score_label_pairs();
        let pvals = stats::p_values(&combined);

        let mut pval_it = pvals.iter();
        for sh in self.scores.iter_mut() {
            sh.p = if sh.is_target() {
                *pval_it.next().unwrap_or(&1.0)
            } else {
                1.0
            };
        }

        self.pi0 = 1.0;
        if stats::check_separation(&pvals, self.n_decoys) {
            if no_terminate {
                if self.use_pi0 {
                    log::warn!(
                        "too good separation between targets and decoys; \
                         no-terminate flag set, setting pi0 = 1"
                    );
                } else {
                    log::warn!(
                        "too good separation between targets and decoys; \
                         no-terminate flag set, ignoring"
                    );
                }
            } else {
                return Err(PercolateError::TooGoodSeparation);
            }
        } else if self.use_pi0 {
            self.pi0 = stats::estimate_pi0(&pvals);
        }
        Ok(())
    }

    /// Re-rank, recount both classes, and refresh pi0.
    pub fn post_merge_step(
        &mut self,
        store: &PsmStore,
        no_terminate: bool,
    ) -> Result<(), PercolateError> {
        let psms = &store.psms;
        self.scores.sort_by(|a, b| cmp_desc(a, b, psms));
        self.recalculate_sizes();
        self.check_separation_and_set_pi0(no_terminate)
    }

    pub fn recalculate_sizes(&mut self) {
        self.n_targets = self.scores.iter().filter(|sh| sh.is_target()).count();
        self.n_decoys = self.scores.iter().filter(|sh| sh.is_decoy()).count();
        self.ratio = self.n_targets as f64 / self.n_decoys.max(1) as f64;
    }

    /// Concatenate fold subsets after calibrating each on its own decoys:
    /// per subset rank, estimate pi0, compute q-values, and rescale scores
    /// so they are comparable across folds.
    pub fn merge(
        &mut self,
        subsets: Vec<ScoreSet>,
        fdr: f64,
        store: &PsmStore,
        no_terminate: bool,
    ) -> Result<(), PercolateError> {
        self.scores.clear();
        let psms = &store.psms;
        for mut subset in subsets {
            subset.scores.sort_by(|a, b| cmp_desc(a, b, psms));
            subset.check_separation_and_set_pi0(no_terminate)?;
            subset.calc_q(fdr, false);
            subset.normalize_scores(fdr);
            self.scores.extend(subset.scores);
        }
        self.post_merge_step(store, no_terminate)
    }

    /// Linear rescale of the current ranking: the score at the `fdr`
    /// cutoff goes to 0 and the median decoy score to -1. When the
    /// difference is not positive only the translation is applied.
    pub fn normalize_scores(&mut self, fdr: f64) {
        if self.scores.is_empty() {
            return;
        }
        let median_index = self.n_decoys / 2;
        let mut decoys = 0usize;
        let mut fdr_score = self.scores[0].score;
        let mut median_decoy_score = fdr_score + 1.0;

        for sh in &self.scores {
            if sh.q < fdr {
                fdr_score = sh.score;
            }
            if sh.is_decoy() {
                decoys += 1;
                if decoys == median_index {
                    median_decoy_score = sh.score;
                    break;
                }
            }
        }

        let diff = fdr_score - median_decoy_score;
        for sh in &mut self.scores {
            sh.score -= fdr_score;
            if diff > 0.0 {
                sh.score /= diff;
            }
        }
    }

    /// Keep only the best-scoring PSM per (peptide, label); every run
    /// member is recorded under the retained PSM in the peptide map.
    pub fn weed_out_redundant(
        &mut self,
        store: &PsmStore,
        no_terminate: bool,
    ) -> Result<(), PercolateError> {
        let psms = &store.psms;
        self.scores.sort_by(|a, b| {
            psms[a.psm]
                .sequence()
                .cmp(psms[b.psm].sequence())
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| b.score.total_cmp(&a.score))
        });

        let mut last_written = 0usize;
        let mut prev_key: Option<(usize, i32)> = None;
        for idx in 0..self.scores.len() {
            let current = self.scores[idx].clone();
            let same_run = match prev_key {
                Some((rep, label)) => {
                    label == current.label
                        && psms[rep].sequence() == psms[current.psm].sequence()
                }
                None => false,
            };
            if !same_run {
                self.scores[last_written] = current.clone();
                last_written += 1;
                prev_key = Some((current.psm, current.label));
            }
            let representative = self.scores[last_written - 1].psm;
            self.peptide_psm_map
                .entry(representative)
                .or_default()
                .push(current.psm);
        }
        self.scores.truncate(last_written);
        self.post_merge_step(store, no_terminate)
    }

    /// Target-decoy competition: keep one PSM per (scan, expMass, charge),
    /// the highest-scoring one. Dropped holders release their feature rows
    /// back to the data handler.
    pub fn weed_out_redundant_tdc(
        &mut self,
        store: &mut PsmStore,
        no_terminate: bool,
    ) -> Result<(), PercolateError> {
        {
            let psms = &store.psms;
            self.scores.sort_by(|a, b| {
                let pa = &psms[a.psm];
                let pb = &psms[b.psm];
                pa.scan
                    .cmp(&pb.scan)
                    .then_with(|| pa.exp_mass.total_cmp(&pb.exp_mass))
                    .then_with(|| pa.charge.cmp(&pb.charge))
                    .then_with(|| b.score.total_cmp(&a.score))
            });
        }

        let mut kept: Vec<ScoreHolder> = Vec::with_capacity(self.scores.len());
        let mut prev: Option<(u32, u64, u32)> = None;
        for sh in std::mem::take(&mut self.scores) {
            let psm = &store.psms[sh.psm];
            let key = (psm.scan, psm.exp_mass.to_bits(), psm.charge);
            if prev == Some(key) {
                store.release_features(sh.psm);
            } else {
                prev = Some(key);
                kept.push(sh);
            }
        }
        self.scores = kept;
        self.post_merge_step(store, no_terminate)
    }

    /// Assign each scan to one test fold chosen uniformly among those
    /// still below quota; all PSMs of a scan go together, and every PSM
    /// lands in exactly one test fold and the other folds' training sets.
    /// Afterwards the arena is reordered so each fold's rows are
    /// contiguous, targets before decoys.
    pub fn create_xval_sets_by_spectrum(
        &self,
        num_folds: usize,
        store: &mut PsmStore,
        rng: &mut StdRng,
    ) -> (Vec<ScoreSet>, Vec<ScoreSet>) {
        let mut train: Vec<ScoreSet> =
            (0..num_folds).map(|_| ScoreSet::new(self.use_pi0)).collect();
        let mut test: Vec<ScoreSet> =
            (0..num_folds).map(|_| ScoreSet::new(self.use_pi0)).collect();

        // floor-of-remaining quotas so fold sizes sum to the total
        let mut remain = vec![0i64; num_folds];
        let mut ix = self.scores.len() as i64;
        for fold in (0..num_folds).rev() {
            remain[fold] = ix / (fold as i64 + 1);
            ix -= remain[fold];
        }

        let mut by_scan: BTreeMap<u32, Vec<ScoreHolder>> = BTreeMap::new();
        for sh in &self.scores {
            by_scan
                .entry(store.psms[sh.psm].scan)
                .or_default()
                .push(sh.clone());
        }

        let mut fold_idx = rng.gen_range(0..num_folds);
        let mut first = true;
        for holders in by_scan.values() {
            if !first && remain.iter().any(|&r| r > 0) {
                fold_idx = rng.gen_range(0..num_folds);
                while remain[fold_idx] <= 0 {
                    fold_idx = rng.gen_range(0..num_folds);
                }
            }
            first = false;
            for sh in holders {
                for (i, set) in test.iter_mut().enumerate() {
                    if i == fold_idx {
                        set.push(sh.clone());
                    }
                }
                for (i, set) in train.iter_mut().enumerate() {
                    if i != fold_idx {
                        set.push(sh.clone());
                    }
                }
                remain[fold_idx] -= 1;
            }
        }

        for set in train.iter_mut().chain(test.iter_mut()) {
            set.recalculate_sizes();
        }

        let mut order = Vec::with_capacity(self.scores.len());
        for set in &test {
            order.extend(set.scores.iter().filter(|sh| sh.is_target()).map(|sh| sh.psm));
            order.extend(set.scores.iter().filter(|sh| sh.is_decoy()).map(|sh| sh.psm));
        }
        store.reorder_rows(&order);

        (train, test)
    }

    /// Scan every feature in both directions for the one separating the
    /// most targets at `fdr`. Returns a one-hot signed direction of length
    /// F+1 (bias zero) and the discovery count.
    pub fn get_init_direction(
        &mut self,
        fdr: f64,
        store: &PsmStore,
        no_terminate: bool,
    ) -> Result<(Vec<f64>, usize), PercolateError> {
        let num_features = store.num_features();
        let mut best_positives: i64 = -1;
        let mut best_feature: i64 = -1;
        let mut low_best = false;

        // the +1 pseudo-decoy is too restrictive for single-feature scans
        let skip_decoys_plus_one = true;

        for feature in 0..num_features {
            for sh in self.scores.iter_mut() {
                let row = store.psms[sh.psm]
                    .features
                    .expect("direction scan requires live feature rows");
                sh.score = store.arena.row(row)[feature];
            }
            let psms = &store.psms;
            self.scores.sort_by(|a, b| cmp_asc(a, b, psms));
            for direction in 0..2 {
                if direction == 1 {
                    self.scores.reverse();
                }
                let positives = self.calc_q(fdr, skip_decoys_plus_one) as i64;
                if positives > best_positives {
                    best_positives = positives;
                    best_feature = feature as i64;
                    low_best = direction == 0;
                }
            }
        }

        let mut direction = vec![0.0; num_features + 1];
        if best_positives <= 0 {
            if no_terminate {
                log::warn!(
                    "cannot find an initial direction with positive training examples; \
                     no-terminate flag set, using the first feature"
                );
                best_feature = 0;
            } else {
                return Err(PercolateError::NoInitDirection);
            }
        }
        if best_feature >= 0 {
            direction[best_feature as usize] = if low_best { -1.0 } else { 1.0 };
        }

        log::info!(
            "selected feature {} as initial search direction, could separate {} positives",
            best_feature + 1,
            best_positives.max(0)
        );
        Ok((direction, best_positives.max(0) as usize))
    }

    /// Build the SVM training input from the current ranking: all decoys
    /// with cost `cneg`, then targets down to the `fdr` cutoff with cost
    /// `cpos`.
    pub fn generate_training_input(
        &self,
        fdr: f64,
        cpos: f64,
        cneg: f64,
        store: &PsmStore,
    ) -> SvmInput {
        let mut input = SvmInput::with_capacity(store.num_features(), self.scores.len());
        for sh in &self.scores {
            if sh.is_decoy() {
                let row = store.psms[sh.psm]
                    .features
                    .expect("training requires live feature rows");
                input.push(store.arena.row(row), -1.0, cneg);
            }
        }
        for sh in &self.scores {
            if sh.is_target() {
                if sh.q > fdr {
                    break;
                }
                let row = store.psms[sh.psm]
                    .features
                    .expect("training requires live feature rows");
                input.push(store.arena.row(row), 1.0, cpos);
            }
        }
        input
    }

    /// Refit the retention model on the targets identified with full
    /// confidence under the current ranking.
    pub fn recalculate_description_of_correct(
        &self,
        doc: &mut DescriptionOfCorrect,
        store: &PsmStore,
    ) {
        doc.clear();
        for sh in &self.scores {
            if sh.is_target() && sh.q <= 0.0 {
                doc.register_correct(&store.psms[sh.psm]);
            }
        }
        doc.train_correct();
    }

    /// Refresh the appended doc feature slots for every holder.
    pub fn set_doc_features(&self, doc: &DescriptionOfCorrect, store: &mut PsmStore) {
        for sh in &self.scores {
            doc.set_features(store, sh.psm);
        }
    }

    pub fn qvalues_below_level(&self, level: f64) -> usize {
        self.scores
            .iter()
            .filter(|sh| sh.is_target() && sh.q < level)
            .count()
    }
}
