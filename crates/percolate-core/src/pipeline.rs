//! End-to-end orchestration: read, normalize, sanity-check, train,
//! post-process, and emit.

use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{Config, InputSource};
use crate::cv::CrossValidation;
use crate::doc::DescriptionOfCorrect;
use crate::error::PercolateError;
use crate::io::osw;
use crate::io::pin::{self, PinData};
use crate::io::writer;
use crate::io::xml::PoutWriter;
use crate::normalizer::Normalizer;
use crate::proteins::ProteinEstimator;
use crate::psm::ScoreHolder;
use crate::sanity::{SanityCheck, StatisticsDecision};
use crate::scores::ScoreSet;

pub struct Pipeline {
    cfg: Config,
    protein_estimator: Option<Box<dyn ProteinEstimator>>,
}

impl Pipeline {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            protein_estimator: None,
        }
    }

    /// Register an external protein inference engine for the handoff
    /// phase.
    pub fn with_protein_estimator(mut self, estimator: Box<dyn ProteinEstimator>) -> Self {
        self.protein_estimator = Some(estimator);
        self
    }

    fn banner(&self) {
        log::info!("percolate version {}", env!("CARGO_PKG_VERSION"));
        if let Ok(host) = std::env::var("HOSTNAME") {
            log::info!("running on {}", host);
        }
        if !self.cfg.command_line.is_empty() {
            log::info!("issued command: {}", self.cfg.command_line);
        }
        log::info!(
            "hyperparameters: selectionFdr={}, Cpos={}, Cneg={}, maxNiter={}",
            self.cfg.selection_fdr,
            self.cfg.cpos,
            self.cfg.cneg,
            self.cfg.num_iterations
        );
    }

    fn read_input(&self, doc_slots: usize, max_psms: usize, rng: &mut StdRng) -> Result<PinData> {
        match &self.cfg.input {
            InputSource::PinFile(path) => {
                log::info!("reading tab-delimited input from {}", path.display());
                let file = File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                pin::read_pin(BufReader::new(file), doc_slots, max_psms, rng)
            }
            InputSource::PinStdin => {
                log::info!("reading tab-delimited input from standard input");
                let stdin = std::io::stdin();
                pin::read_pin(stdin.lock(), doc_slots, max_psms, rng)
            }
            InputSource::PinXmlFile(_) | InputSource::PinXmlStdin => Err(PercolateError::InputFormat(
                "pin-xml input is deprecated and not supported; convert to pin-tab".to_string(),
            )
            .into()),
            InputSource::Osw { path, level } => {
                log::info!("reading OSW input from {}", path.display());
                osw::read_osw(path, *level)
            }
        }
    }

    pub fn run(&mut self) -> Result<()> {
        self.cfg.validate()?;
        self.banner();

        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let mut doc_type = self.cfg.doc_type;
        if doc_type.is_some() && matches!(self.cfg.input, InputSource::Osw { .. }) {
            log::warn!("description-of-correct features require pin input, ignoring --doc");
            doc_type = None;
        }
        let doc_slots = if doc_type.is_some() {
            crate::doc::NUM_FEATURES
        } else {
            0
        };

        let mut max_psms = self.cfg.subset_max_train;
        if max_psms > 0
            && matches!(
                self.cfg.input,
                InputSource::PinStdin | InputSource::PinXmlStdin
            )
        {
            log::warn!(
                "cannot use subset-max-train when reading from stdin, training on all data"
            );
            max_psms = 0;
        }

        let mut data = self.read_input(doc_slots, max_psms, &mut rng)?;
        log::debug!(
            "{} PSMs with {} features",
            data.store.len(),
            data.store.num_features()
        );

        let num_features = data.store.num_features();
        let num_ordinary = num_features - doc_slots;

        let mut doc =
            doc_type.map(|bits| DescriptionOfCorrect::new(bits, self.cfg.klammer, num_ordinary));
        if let Some(doc) = &doc {
            for idx in 0..data.store.len() {
                doc.set_features(&mut data.store, idx);
            }
        }

        let mut normalizer = Normalizer::new(self.cfg.normalizer, num_features, num_ordinary);
        normalizer.fit(&data.store);
        if doc.is_some() {
            normalizer.fit_doc(&data.store);
        }
        normalizer.normalize_all(&mut data.store);

        let mut sanity = SanityCheck::detect(&data.store);
        sanity.overrule = self.cfg.override_suspect;
        if let Some(path) = &self.cfg.init_weights {
            sanity.load_init_weights(path, num_features)?;
        } else if let Some(name) = &self.cfg.default_direction {
            sanity.set_default_direction(name, &data.feature_names)?;
        } else if let Some(direction) = data.default_direction.clone() {
            sanity.init_weights = Some(direction);
        }

        let decision = sanity.resolve_statistics(&self.cfg);
        let mut all_scores = ScoreSet::new(decision.use_mix_max);
        all_scores.fill_features(&data.store, self.cfg.no_terminate)?;

        if decision.use_mix_max && (1.0 - all_scores.target_decoy_ratio()).abs() > 0.1 {
            log::warn!(
                "the mix-max procedure is not well behaved when #targets ({}) != #decoys ({}); \
                 consider target-decoy competition (-Y flag)",
                all_scores.pos_size(),
                all_scores.neg_size()
            );
        }

        let mut cv = CrossValidation::new(&self.cfg);
        let initial_positives =
            cv.pre_iteration_setup(&all_scores, &sanity, &normalizer, &mut data.store, &mut rng)?;
        log::info!(
            "found {} test set positives with q < {} in initial direction",
            initial_positives,
            self.cfg.test_fdr
        );

        if let Some(path) = &self.cfg.tab_output {
            let mut file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            pin::write_pin(&mut file, &data, Some(&normalizer), doc_slots)?;
            log::info!("wrote computed features to {}", path.display());
        }

        cv.train(&data.store);

        if let Some(path) = &self.cfg.weight_output {
            let mut file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            cv.print_all_weights(&mut file, &normalizer, &data.feature_names)?;
            log::info!("wrote weights to {}", path.display());
        }

        cv.post_iteration_processing(&mut all_scores, &sanity, &data.store)?;

        if let Some(doc) = &mut doc {
            all_scores.recalculate_description_of_correct(doc, &data.store);
        }

        if max_psms > 0 {
            log::info!("scoring the full list of PSMs with the trained models");
            let raw_weights = cv.averaged_raw_weights(&normalizer);
            all_scores.reset();
            match &self.cfg.input {
                InputSource::PinFile(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("failed to reopen {}", path.display()))?;
                    data.store = pin::read_and_score_pin(
                        BufReader::new(file),
                        &raw_weights,
                        &mut all_scores,
                        doc.as_ref(),
                        doc_slots,
                    )?;
                }
                InputSource::Osw { path, level } => {
                    let reread = osw::read_osw(path, *level)?;
                    data.store = reread.store;
                    for idx in 0..data.store.len() {
                        let label = data.store.psms[idx].label;
                        let sh = ScoreHolder::new(idx, label);
                        all_scores.score_and_add(&mut data.store, sh, &raw_weights, doc.as_ref());
                    }
                }
                _ => {}
            }
            log::debug!(
                "evaluated set contains {} positives and {} negatives",
                all_scores.pos_size(),
                all_scores.neg_size()
            );
            all_scores.post_merge_step(&data.store, self.cfg.no_terminate)?;
            all_scores.calc_q(self.cfg.selection_fdr, false);
            all_scores.normalize_scores(self.cfg.selection_fdr);
        }

        let mut pout = self
            .cfg
            .xml_output
            .as_ref()
            .map(|_| PoutWriter::new(self.cfg.xml_print_decoys, self.cfg.xml_print_exp_mass));

        self.calculate_psm_prob(&mut all_scores, false, decision, &mut data)?;
        if let Some(pout) = &mut pout {
            pout.write_psms(&all_scores, &data.store)?;
        }

        if self.cfg.report_unique_peptides {
            self.calculate_psm_prob(&mut all_scores, true, decision, &mut data)?;
            if let Some(pout) = &mut pout {
                pout.write_peptides(&all_scores, &data.store)?;
            }
        }

        if self.cfg.protein.is_some() {
            match &mut self.protein_estimator {
                Some(estimator) => {
                    log::info!(
                        "calculating protein level probabilities with {}",
                        estimator.name()
                    );
                    estimator.initialize(&all_scores, &data.store)?;
                    estimator.run()?;
                    estimator.compute_probabilities()?;
                    estimator.compute_statistics()?;
                    estimator.print_out(
                        self.cfg.protein_results.as_deref(),
                        self.cfg.decoy_protein_results.as_deref(),
                    )?;
                }
                None => log::warn!(
                    "protein inference requested but no estimator is registered; skipping"
                ),
            }
        }

        if let (Some(pout), Some(path)) = (&pout, &self.cfg.xml_output) {
            pout.finish(path, &self.cfg.command_line)?;
            log::info!("wrote XML output to {}", path.display());
        }
        Ok(())
    }

    /// PSM- or peptide-level statistics over the final combined scores,
    /// plus result emission.
    fn calculate_psm_prob(
        &self,
        all_scores: &mut ScoreSet,
        is_unique_peptide_run: bool,
        decision: StatisticsDecision,
        data: &mut PinData,
    ) -> Result<()> {
        let write_output = is_unique_peptide_run == self.cfg.report_unique_peptides;

        if is_unique_peptide_run {
            if write_output {
                log::info!(
                    "tossing out redundant PSMs, keeping only the best scoring PSM per unique peptide"
                );
            }
            all_scores.weed_out_redundant(&data.store, self.cfg.no_terminate)?;
        } else if decision.tdc_weeding {
            all_scores.weed_out_redundant_tdc(&mut data.store, self.cfg.no_terminate)?;
            log::info!(
                "selected best-scoring PSM per scan+expMass (target-decoy competition): \
                 {} target PSMs and {} decoy PSMs",
                all_scores.pos_size(),
                all_scores.neg_size()
            );
        }

        if decision.use_mix_max && write_output {
            log::info!("selecting pi_0 = {:.6}", all_scores.pi0());
        }

        let found = all_scores.calc_q(self.cfg.test_fdr, false);
        if write_output {
            log::info!(
                "final list yields {} target {} with q < {}",
                found,
                if is_unique_peptide_run { "peptides" } else { "PSMs" },
                self.cfg.test_fdr
            );
        }
        all_scores.calc_pep();

        let (target_path, decoy_path) = if is_unique_peptide_run {
            (
                self.cfg.peptide_results.as_ref(),
                self.cfg.decoy_peptide_results.as_ref(),
            )
        } else {
            (
                self.cfg.psm_results.as_ref(),
                self.cfg.decoy_psm_results.as_ref(),
            )
        };

        if let InputSource::Osw { path, level } = &self.cfg.input {
            osw::write_osw(path, *level, all_scores, &data.store)?;
        } else {
            if let Some(path) = target_path {
                let mut file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                writer::write_results(&mut file, all_scores, &data.store, 1)?;
            } else if write_output {
                let stdout = std::io::stdout();
                writer::write_results(&mut stdout.lock(), all_scores, &data.store, 1)?;
            }
            if let Some(path) = decoy_path {
                let mut file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                writer::write_results(&mut file, all_scores, &data.store, -1)?;
            }
        }
        Ok(())
    }
}
