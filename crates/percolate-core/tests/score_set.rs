//! Integration tests for the score set: ranking, fold splitting, weeding
//! and score normalization.

use rand::rngs::StdRng;
use rand::SeedableRng;

use percolate_core::psm::{cmp_desc, Psm, PsmStore, ScoreHolder};
use percolate_core::scores::ScoreSet;

fn make_psm(id: &str, label: i32, scan: u32, exp_mass: f64, peptide: &str) -> Psm {
    Psm {
        id: id.to_string(),
        label,
        scan,
        exp_mass,
        calc_mass: exp_mass + 0.5,
        charge: 2,
        peptide: peptide.to_string(),
        proteins: vec![format!("prot_{}", id)],
        features: None,
        ret_time: 0.0,
        pred_ret_time: 0.0,
    }
}

/// Alternating targets and decoys; target feature values sit above decoy
/// ones with some overlap.
fn fixture(n_per_class: usize) -> (PsmStore, ScoreSet) {
    let mut store = PsmStore::new(2);
    let mut set = ScoreSet::new(false);
    for i in 0..n_per_class {
        let noise = ((i * 7919) % 100) as f64 / 100.0;
        let jitter = ((i * 104729) % 100) as f64 / 100.0;
        let target = make_psm(
            &format!("t{}", i),
            1,
            i as u32,
            500.0 + i as f64,
            &format!("K.PEPT{}IDE.R", i),
        );
        // feature 0 separates the classes with some overlap, feature 1 is noise
        let idx = store.push(target, &[1.0 + noise, jitter]);
        set.push(ScoreHolder::new(idx, 1));

        let decoy = make_psm(
            &format!("d{}", i),
            -1,
            (n_per_class + i) as u32,
            600.0 + i as f64,
            &format!("K.TPEP{}IDE.R", i),
        );
        let idx = store.push(decoy, &[1.6 * noise - 0.3, 1.0 - jitter]);
        set.push(ScoreHolder::new(idx, -1));
    }
    set.fill_features(&store, false).unwrap();
    (store, set)
}

// ---------------------------------------------------------------------------
// Ranking invariants
// ---------------------------------------------------------------------------

#[test]
fn post_merge_step_sorts_and_recounts() {
    let (store, mut set) = fixture(30);
    let weights = vec![1.0, 0.0, 0.0];
    set.calc_scores(&weights, 0.05, &store, false);
    set.post_merge_step(&store, false).unwrap();

    assert_eq!(set.pos_size() + set.neg_size(), set.len());
    let holders = set.holders();
    for pair in holders.windows(2) {
        assert_ne!(
            cmp_desc(&pair[0], &pair[1], &store.psms),
            std::cmp::Ordering::Greater,
            "ranking must be non-increasing under the total order"
        );
    }
}

#[test]
fn qvalues_monotone_along_ranking() {
    let (store, mut set) = fixture(50);
    let weights = vec![1.0, 0.0, 0.0];
    set.calc_scores(&weights, 0.05, &store, false);
    let holders = set.holders();
    for pair in holders.windows(2) {
        assert!(pair[0].q <= pair[1].q + 1e-12);
    }
}

#[test]
fn peps_monotone_with_qvalues() {
    let (store, mut set) = fixture(80);
    let weights = vec![1.0, 0.0, 0.0];
    set.calc_scores(&weights, 0.05, &store, false);
    set.calc_pep();
    let holders = set.holders();
    for pair in holders.windows(2) {
        assert!(
            pair[0].pep <= pair[1].pep + 1e-9,
            "PEP must not decrease with rank"
        );
    }
}

// ---------------------------------------------------------------------------
// Fold splitting
// ---------------------------------------------------------------------------

#[test]
fn folds_keep_scans_together_and_partition_psms() {
    let mut store = PsmStore::new(1);
    let mut set = ScoreSet::new(false);
    // two PSMs per scan so scan cohesion is observable
    for scan in 0..60u32 {
        for rank in 0..2 {
            let label = if rank == 0 { 1 } else { -1 };
            let psm = make_psm(
                &format!("s{}r{}", scan, rank),
                label,
                scan,
                500.0 + scan as f64,
                "K.PEP.R",
            );
            let idx = store.push(psm, &[scan as f64]);
            set.push(ScoreHolder::new(idx, label));
        }
    }
    set.fill_features(&store, false).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let (train, test) = set.create_xval_sets_by_spectrum(3, &mut store, &mut rng);

    let total: usize = test.iter().map(|t| t.len()).sum();
    assert_eq!(total, set.len(), "every PSM lands in exactly one test fold");
    for fold in 0..3 {
        assert_eq!(
            train[fold].len() + test[fold].len(),
            set.len(),
            "each PSM is in the train or test half of every fold"
        );
    }

    // scan cohesion: a scan's PSMs share their test fold
    for scan in 0..60u32 {
        let mut fold_of_scan = None;
        for (i, fold_set) in test.iter().enumerate() {
            if fold_set
                .holders()
                .iter()
                .any(|sh| store.psms[sh.psm].scan == scan)
            {
                assert!(
                    fold_of_scan.is_none() || fold_of_scan == Some(i),
                    "scan {} split across test folds",
                    scan
                );
                fold_of_scan = Some(i);
            }
        }
        assert!(fold_of_scan.is_some());
    }
}

#[test]
fn fold_split_is_reproducible_under_fixed_seed() {
    let (mut store_a, set_a) = fixture(40);
    let (mut store_b, set_b) = fixture(40);

    let mut rng = StdRng::seed_from_u64(42);
    let (_, test_a) = set_a.create_xval_sets_by_spectrum(3, &mut store_a, &mut rng);
    let mut rng = StdRng::seed_from_u64(42);
    let (_, test_b) = set_b.create_xval_sets_by_spectrum(3, &mut store_b, &mut rng);

    for (a, b) in test_a.iter().zip(test_b.iter()) {
        let ids_a: Vec<usize> = a.holders().iter().map(|sh| sh.psm).collect();
        let ids_b: Vec<usize> = b.holders().iter().map(|sh| sh.psm).collect();
        assert_eq!(ids_a, ids_b);
    }
}

// ---------------------------------------------------------------------------
// Redundancy weeding
// ---------------------------------------------------------------------------

#[test]
fn peptide_weeding_keeps_best_and_records_members() {
    let mut store = PsmStore::new(1);
    let mut set = ScoreSet::new(false);
    // two targets sharing a peptide, different scores, plus a decoy that
    // outranks a third target
    let a = store.push(make_psm("t_hi", 1, 1, 500.0, "K.SHARED.R"), &[2.0]);
    let b = store.push(make_psm("t_lo", 1, 2, 501.0, "K.SHARED.R"), &[1.0]);
    let c = store.push(make_psm("d_0", -1, 3, 502.0, "K.OTHER.R"), &[0.5]);
    let d = store.push(make_psm("t_weak", 1, 4, 503.0, "K.WEAK.R"), &[0.1]);
    for (idx, label) in [(a, 1), (b, 1), (c, -1), (d, 1)] {
        let mut sh = ScoreHolder::new(idx, label);
        sh.score = store.features_of(idx).unwrap()[0];
        set.push(sh);
    }
    set.recalculate_sizes();

    set.weed_out_redundant(&store, false).unwrap();

    assert_eq!(set.len(), 3, "one holder per (peptide, label)");
    let kept: Vec<&str> = set
        .holders()
        .iter()
        .map(|sh| store.psms[sh.psm].id.as_str())
        .collect();
    assert!(kept.contains(&"t_hi"), "highest-scoring PSM survives");
    assert!(!kept.contains(&"t_lo"));

    let members = set.peptide_psms(a).expect("representative recorded");
    let ids: Vec<&str> = members.iter().map(|&m| store.psms[m].id.as_str()).collect();
    assert_eq!(ids, vec!["t_hi", "t_lo"]);
}

#[test]
fn tdc_weeding_dedups_scan_mass_charge() {
    let mut store = PsmStore::new(1);
    let mut set = ScoreSet::new(false);
    // target and decoy compete on the same (scan, mass, charge)
    let t = store.push(make_psm("t", 1, 9, 700.0, "K.AAA.R"), &[3.0]);
    let d = store.push(make_psm("d", -1, 9, 700.0, "K.BBB.R"), &[1.0]);
    let other = store.push(make_psm("o", 1, 10, 700.0, "K.CCC.R"), &[2.0]);
    for (idx, label, score) in [(t, 1, 3.0), (d, -1, 1.0), (other, 1, 2.0)] {
        let mut sh = ScoreHolder::new(idx, label);
        sh.score = score;
        set.push(sh);
    }
    set.recalculate_sizes();

    set.weed_out_redundant_tdc(&mut store, false).unwrap();

    assert_eq!(set.len(), 2);
    let kept: Vec<&str> = set
        .holders()
        .iter()
        .map(|sh| store.psms[sh.psm].id.as_str())
        .collect();
    assert!(kept.contains(&"t"), "higher-scoring competitor wins");
    assert!(kept.contains(&"o"));
}

// ---------------------------------------------------------------------------
// Score normalization
// ---------------------------------------------------------------------------

#[test]
fn normalize_scores_anchors_cutoff_and_median_decoy() {
    let (store, mut set) = fixture(50);
    let weights = vec![1.0, 0.0, 0.0];
    set.calc_scores(&weights, 0.2, &store, false);

    // find the score at the q < 0.2 cutoff and the median decoy score
    let fdr = 0.2;
    let mut expected_cutoff = set.holders()[0].score;
    let median_index = set.neg_size() / 2;
    let mut decoys = 0;
    let mut expected_median = expected_cutoff + 1.0;
    for sh in set.holders() {
        if sh.q < fdr {
            expected_cutoff = sh.score;
        }
        if sh.is_decoy() {
            decoys += 1;
            if decoys == median_index {
                expected_median = sh.score;
                break;
            }
        }
    }
    assert!(expected_cutoff > expected_median);

    set.normalize_scores(fdr);

    let mut cutoff_seen = f64::NAN;
    let mut median_seen = f64::NAN;
    let mut decoys = 0;
    for sh in set.holders() {
        if sh.q < fdr {
            cutoff_seen = sh.score;
        }
        if sh.is_decoy() {
            decoys += 1;
            if decoys == median_index {
                median_seen = sh.score;
                break;
            }
        }
    }
    assert!((cutoff_seen - 0.0).abs() < 1e-9, "cutoff score maps to 0");
    assert!((median_seen + 1.0).abs() < 1e-9, "median decoy maps to -1");
}

// ---------------------------------------------------------------------------
// Initial direction
// ---------------------------------------------------------------------------

#[test]
fn init_direction_picks_the_discriminative_feature() {
    let (store, mut set) = fixture(100);
    let (direction, positives) = set.get_init_direction(0.2, &store, false).unwrap();
    assert_eq!(direction.len(), 3);
    // feature 0 separates targets upward
    assert_eq!(direction[0], 1.0);
    assert_eq!(direction[1], 0.0);
    assert!(positives > 0);
}

#[test]
fn init_direction_fails_without_signal() {
    let mut store = PsmStore::new(1);
    let mut set = ScoreSet::new(false);
    // identical feature values carry no signal in either direction
    for i in 0..20 {
        let label = if i % 2 == 0 { 1 } else { -1 };
        let idx = store.push(
            make_psm(&format!("p{}", i), label, i as u32, 500.0, "K.PEP.R"),
            &[1.0],
        );
        set.push(ScoreHolder::new(idx, label));
    }
    set.fill_features(&store, false).unwrap();
    assert!(set.get_init_direction(0.01, &store, false).is_err());

    // no-terminate falls back to feature 0
    let (direction, _) = set.get_init_direction(0.01, &store, true).unwrap();
    assert_eq!(direction.len(), 2);
}

// ---------------------------------------------------------------------------
// Training set generation
// ---------------------------------------------------------------------------

#[test]
fn training_input_takes_all_decoys_and_confident_targets() {
    let (store, mut set) = fixture(50);
    let weights = vec![1.0, 0.0, 0.0];
    set.calc_scores(&weights, 0.1, &store, false);

    let input = set.generate_training_input(0.1, 2.0, 3.0, &store);
    assert_eq!(input.negatives(), set.neg_size());
    assert!(input.positives() > 0);
    assert!(input.positives() <= set.pos_size());
    // decoys first with the negative cost, then targets
    assert_eq!(input.label(0), -1.0);
    assert_eq!(input.cost(0), 3.0);
    let last = input.len() - 1;
    assert_eq!(input.label(last), 1.0);
    assert_eq!(input.cost(last), 2.0);
}

#[test]
fn fill_refuses_labels_outside_the_classes() {
    let store = PsmStore::new(1);
    let mut set = ScoreSet::new(false);
    assert!(set.fill(&store, 0).is_err());
    assert!(set.fill(&store, 2).is_err());
}

#[test]
fn missing_decoys_is_an_error_unless_no_terminate() {
    let mut store = PsmStore::new(1);
    for i in 0..5 {
        store.push(
            make_psm(&format!("t{}", i), 1, i as u32, 500.0, "K.PEP.R"),
            &[1.0],
        );
    }
    let mut set = ScoreSet::new(false);
    assert!(set.fill_features(&store, false).is_err());

    let mut set = ScoreSet::new(false);
    assert!(set.fill_features(&store, true).is_ok());
}
