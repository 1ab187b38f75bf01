//! Nested cross-validation driver.
//!
//! Three disjoint folds split by spectrum; each fold's classifier is
//! trained on the other two and evaluated on its own test set, with a
//! small grid search over the (C+, C-) cost pair. The whole procedure is
//! iterated so that each round's target selection comes from the previous
//! round's scores. No PSM is ever scored by an SVM it helped train.

use std::io::{self, Write};

use rand::rngs::StdRng;

use crate::config::Config;
use crate::error::PercolateError;
use crate::normalizer::Normalizer;
use crate::psm::PsmStore;
use crate::sanity::SanityCheck;
use crate::scores::ScoreSet;
use crate::svm::{self, SvmOptions};

pub const NUM_FOLDS: usize = 3;

const CPOS_CANDIDATES: [f64; 2] = [1.0, 10.0];
const CNEG_RATIO_CANDIDATES: [f64; 3] = [1.0, 3.0, 10.0];

pub struct CrossValidation {
    quick_validation: bool,
    report_each_iteration: bool,
    test_fdr: f64,
    selection_fdr: f64,
    selected_cpos: f64,
    selected_cneg: f64,
    num_iterations: u32,
    no_terminate: bool,

    train_sets: Vec<ScoreSet>,
    test_sets: Vec<ScoreSet>,
    weights: Vec<Vec<f64>>,
    init_directions: Vec<Vec<f64>>,
    init_positives: Vec<usize>,
    chosen_cpos: Vec<f64>,
    chosen_cneg: Vec<f64>,
    svm_options: SvmOptions,
}

impl CrossValidation {
    pub fn new(cfg: &Config) -> Self {
        Self {
            quick_validation: cfg.quick_validation,
            report_each_iteration: cfg.report_each_iteration,
            test_fdr: cfg.test_fdr,
            selection_fdr: cfg.selection_fdr,
            selected_cpos: cfg.cpos,
            selected_cneg: cfg.cneg,
            num_iterations: cfg.num_iterations,
            no_terminate: cfg.no_terminate,
            train_sets: Vec::new(),
            test_sets: Vec::new(),
            weights: Vec::new(),
            init_directions: Vec::new(),
            init_positives: Vec::new(),
            chosen_cpos: vec![0.0; NUM_FOLDS],
            chosen_cneg: vec![0.0; NUM_FOLDS],
            svm_options: SvmOptions::default(),
        }
    }

    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    /// Split into folds, establish the initial search direction per fold,
    /// and rank both fold halves under it. Returns the number of test-set
    /// positives found in the initial direction.
    pub fn pre_iteration_setup(
        &mut self,
        all: &ScoreSet,
        check: &SanityCheck,
        normalizer: &Normalizer,
        store: &mut PsmStore,
        rng: &mut StdRng,
    ) -> Result<usize, PercolateError> {
        let (train, test) = all.create_xval_sets_by_spectrum(NUM_FOLDS, store, rng);
        self.train_sets = train;
        self.test_sets = test;

        let num_features = store.num_features();
        self.weights.clear();
        self.init_directions.clear();

        if let Some(raw) = &check.init_weights {
            let normalized = normalizer.normalize_weights(raw);
            for _ in 0..NUM_FOLDS {
                self.weights.push(normalized.clone());
            }
        } else if let Some(direction) = check.default_direction_vector(num_features) {
            for _ in 0..NUM_FOLDS {
                self.weights.push(direction.clone());
            }
        } else {
            for fold in 0..NUM_FOLDS {
                let (direction, _) = self.train_sets[fold].get_init_direction(
                    self.selection_fdr,
                    store,
                    self.no_terminate,
                )?;
                self.weights.push(direction);
            }
        }
        self.init_directions = self.weights.clone();

        let mut total_positives = 0;
        self.init_positives.clear();
        for fold in 0..NUM_FOLDS {
            self.train_sets[fold].calc_scores(
                &self.weights[fold],
                self.selection_fdr,
                store,
                false,
            );
            let positives =
                self.test_sets[fold].calc_scores(&self.weights[fold], self.test_fdr, store, false);
            self.init_positives.push(positives);
            total_positives += positives;
        }
        Ok(total_positives)
    }

    /// The cost grid in play for one fold and iteration: the user's fixed
    /// pair, or the geometric sweep, frozen after the first round under
    /// quick validation.
    fn candidate_grid(&self, fold: usize, iteration: u32) -> Vec<(f64, f64)> {
        if self.selected_cpos > 0.0 && self.selected_cneg > 0.0 {
            return vec![(self.selected_cpos, self.selected_cneg)];
        }
        if self.quick_validation && iteration > 0 {
            return vec![(self.chosen_cpos[fold], self.chosen_cneg[fold])];
        }
        let cpos_candidates: Vec<f64> = if self.selected_cpos > 0.0 {
            vec![self.selected_cpos]
        } else {
            CPOS_CANDIDATES.to_vec()
        };
        let mut grid = Vec::new();
        for &cpos in &cpos_candidates {
            if self.selected_cneg > 0.0 {
                grid.push((cpos, self.selected_cneg));
            } else {
                for &ratio in &CNEG_RATIO_CANDIDATES {
                    grid.push((cpos, ratio * cpos));
                }
            }
        }
        grid
    }

    /// Run the iterated grid search on every fold.
    pub fn train(&mut self, store: &PsmStore) {
        for iteration in 0..self.num_iterations {
            let mut found = 0;
            for fold in 0..NUM_FOLDS {
                found += self.process_single_fold(fold, iteration, store);
            }
            if self.report_each_iteration {
                log::info!(
                    "iteration {}: {} test set positives with q < {}",
                    iteration + 1,
                    found,
                    self.test_fdr
                );
            } else {
                log::debug!(
                    "iteration {}: {} test set positives with q < {}",
                    iteration + 1,
                    found,
                    self.test_fdr
                );
            }
        }
    }

    /// Train one fold over its cost grid; the grid point maximizing
    /// test-fold discoveries wins and its weights re-rank the training
    /// half for the next iteration. Returns the winning discovery count.
    fn process_single_fold(&mut self, fold: usize, iteration: u32, store: &PsmStore) -> usize {
        let mut input = self.train_sets[fold].generate_training_input(
            self.selection_fdr,
            1.0,
            1.0,
            store,
        );
        log::debug!(
            "fold {}: training with {} positives and {} negatives",
            fold + 1,
            input.positives(),
            input.negatives()
        );

        let mut best_positives: i64 = -1;
        let mut best_weights: Option<Vec<f64>> = None;
        for (cpos, cneg) in self.candidate_grid(fold, iteration) {
            input.set_costs(cpos, cneg);
            let (weights, _) = svm::train(&input, &self.svm_options);
            let positives =
                self.test_sets[fold].calc_scores(&weights, self.test_fdr, store, false);
            log::debug!(
                "fold {}: cpos {} cneg {} gave {} positives",
                fold + 1,
                cpos,
                cneg,
                positives
            );
            if positives as i64 > best_positives {
                best_positives = positives as i64;
                best_weights = Some(weights);
                self.chosen_cpos[fold] = cpos;
                self.chosen_cneg[fold] = cneg;
            }
        }

        if let Some(weights) = best_weights {
            self.weights[fold] = weights;
        }
        self.train_sets[fold].calc_scores(&self.weights[fold], self.selection_fdr, store, false);
        best_positives.max(0) as usize
    }

    /// Validate the learned vectors against the initial directions, score
    /// each test fold with its final weights, and merge the calibrated
    /// folds into `all`.
    pub fn post_iteration_processing(
        &mut self,
        all: &mut ScoreSet,
        check: &SanityCheck,
        store: &PsmStore,
    ) -> Result<(), PercolateError> {
        let learned: Vec<usize> = (0..NUM_FOLDS)
            .map(|fold| {
                self.test_sets[fold].calc_scores(&self.weights[fold], self.test_fdr, store, false)
            })
            .collect();
        check.validate_direction(
            &mut self.weights,
            &learned,
            &self.init_directions,
            &self.init_positives,
        );

        for fold in 0..NUM_FOLDS {
            self.test_sets[fold].calc_scores(&self.weights[fold], self.test_fdr, store, false);
        }
        all.merge(
            std::mem::take(&mut self.test_sets),
            self.selection_fdr,
            store,
            self.no_terminate,
        )
    }

    /// Mean of the fold weight vectors, mapped back to raw feature space.
    pub fn averaged_raw_weights(&self, normalizer: &Normalizer) -> Vec<f64> {
        let n = normalizer.num_features() + 1;
        let mut mean = vec![0.0; n];
        for weights in &self.weights {
            let raw = normalizer.unnormalize_weights(weights);
            for (m, v) in mean.iter_mut().zip(raw.iter()) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= self.weights.len().max(1) as f64;
        }
        mean
    }

    /// One line per fold plus the mean, in raw feature space, under a
    /// feature-name header.
    pub fn print_all_weights<W: Write>(
        &self,
        out: &mut W,
        normalizer: &Normalizer,
        feature_names: &[String],
    ) -> io::Result<()> {
        writeln!(out, "{}\tm0", feature_names.join("\t"))?;
        for weights in &self.weights {
            let raw = normalizer.unnormalize_weights(weights);
            let line: Vec<String> = raw.iter().map(|w| w.to_string()).collect();
            writeln!(out, "{}", line.join("\t"))?;
        }
        let mean = self.averaged_raw_weights(normalizer);
        let line: Vec<String> = mean.iter().map(|w| w.to_string()).collect();
        writeln!(out, "{}", line.join("\t"))
    }
}
