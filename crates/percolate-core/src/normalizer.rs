//! Per-feature affine normalization.
//!
//! Fit once on the training rows, applied to every row and to weight
//! vectors in both directions so that weights trained on normalized
//! features can be reported in the original feature space.

use crate::config::NormalizerType;
use crate::psm::PsmStore;

#[derive(Debug, Clone)]
pub struct Normalizer {
    kind: NormalizerType,
    /// Offset per feature: the mean (stdv mode) or the minimum (unit mode).
    sub: Vec<f64>,
    /// Scale per feature: the standard deviation or the range; degenerate
    /// values are forced to 1.
    div: Vec<f64>,
    /// Features at or past this index belong to the description-of-correct
    /// segment and are fit in their own pass.
    doc_offset: usize,
}

impl Normalizer {
    pub fn new(kind: NormalizerType, num_features: usize, doc_offset: usize) -> Self {
        Self {
            kind,
            sub: vec![0.0; num_features],
            div: vec![1.0; num_features],
            doc_offset,
        }
    }

    pub fn num_features(&self) -> usize {
        self.sub.len()
    }

    /// Fit the ordinary-feature segment on all live rows.
    pub fn fit(&mut self, store: &PsmStore) {
        self.fit_range(store, 0, self.doc_offset.min(self.sub.len()));
    }

    /// Fit the description-of-correct segment in a separate pass.
    pub fn fit_doc(&mut self, store: &PsmStore) {
        self.fit_range(store, self.doc_offset, self.sub.len());
    }

    fn fit_range(&mut self, store: &PsmStore, lo: usize, hi: usize) {
        if lo >= hi {
            return;
        }
        match self.kind {
            NormalizerType::StandardDeviation => self.fit_stdv(store, lo, hi),
            NormalizerType::Unit => self.fit_unit(store, lo, hi),
        }
    }

    fn fit_stdv(&mut self, store: &PsmStore, lo: usize, hi: usize) {
        let mut n = 0.0f64;
        for j in lo..hi {
            self.sub[j] = 0.0;
            self.div[j] = 0.0;
        }
        for psm in 0..store.len() {
            let Some(row) = store.features_of(psm) else {
                continue;
            };
            n += 1.0;
            for j in lo..hi {
                self.sub[j] += row[j];
            }
        }
        if n > 0.0 {
            for j in lo..hi {
                self.sub[j] /= n;
            }
        }
        for psm in 0..store.len() {
            let Some(row) = store.features_of(psm) else {
                continue;
            };
            for j in lo..hi {
                let d = row[j] - self.sub[j];
                self.div[j] += d * d;
            }
        }
        for j in lo..hi {
            if self.div[j] <= 0.0 || n == 0.0 {
                self.div[j] = 1.0;
            } else {
                self.div[j] = (self.div[j] / n).sqrt();
            }
        }
    }

    fn fit_unit(&mut self, store: &PsmStore, lo: usize, hi: usize) {
        let mut min = vec![f64::INFINITY; hi - lo];
        let mut max = vec![f64::NEG_INFINITY; hi - lo];
        let mut any = false;
        for psm in 0..store.len() {
            let Some(row) = store.features_of(psm) else {
                continue;
            };
            any = true;
            for j in lo..hi {
                min[j - lo] = min[j - lo].min(row[j]);
                max[j - lo] = max[j - lo].max(row[j]);
            }
        }
        for j in lo..hi {
            if !any {
                self.sub[j] = 0.0;
                self.div[j] = 1.0;
            } else {
                self.sub[j] = min[j - lo];
                let range = max[j - lo] - min[j - lo];
                self.div[j] = if range == 0.0 { 1.0 } else { range };
            }
        }
    }

    pub fn normalize_value(&self, value: f64, feature: usize) -> f64 {
        (value - self.sub[feature]) / self.div[feature]
    }

    pub fn unnormalize_value(&self, value: f64, feature: usize) -> f64 {
        value * self.div[feature] + self.sub[feature]
    }

    pub fn normalize_row(&self, row: &mut [f64]) {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (*v - self.sub[j]) / self.div[j];
        }
    }

    /// Apply the forward transform to every live row in the store.
    pub fn normalize_all(&self, store: &mut PsmStore) {
        for psm in 0..store.len() {
            let Some(row_idx) = store.psms[psm].features else {
                continue;
            };
            self.normalize_row(store.arena.row_mut(row_idx));
        }
    }

    /// Map a weight vector trained on normalized features back into raw
    /// feature space. The bias sits in the last slot.
    pub fn unnormalize_weights(&self, weights: &[f64]) -> Vec<f64> {
        let n = self.sub.len();
        debug_assert_eq!(weights.len(), n + 1);
        let mut out = vec![0.0; n + 1];
        let mut offset = 0.0;
        for j in 0..n {
            out[j] = weights[j] / self.div[j];
            offset += weights[j] * self.sub[j] / self.div[j];
        }
        out[n] = weights[n] - offset;
        out
    }

    /// Inverse of [`unnormalize_weights`].
    pub fn normalize_weights(&self, weights: &[f64]) -> Vec<f64> {
        let n = self.sub.len();
        debug_assert_eq!(weights.len(), n + 1);
        let mut out = vec![0.0; n + 1];
        let mut offset = 0.0;
        for j in 0..n {
            out[j] = weights[j] * self.div[j];
            offset += weights[j] * self.sub[j];
        }
        out[n] = weights[n] + offset;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::dot;
    use crate::psm::Psm;
    use approx::assert_relative_eq;

    fn store_with_rows(rows: &[&[f64]]) -> PsmStore {
        let mut store = PsmStore::new(rows[0].len());
        for (i, row) in rows.iter().enumerate() {
            let psm = Psm {
                id: format!("psm{}", i),
                label: 1,
                scan: i as u32,
                exp_mass: 0.0,
                calc_mass: 0.0,
                charge: 2,
                peptide: "K.PEP.R".to_string(),
                proteins: vec![],
                features: None,
                ret_time: 0.0,
                pred_ret_time: 0.0,
            };
            store.push(psm, row);
        }
        store
    }

    #[test]
    fn stdv_fit_and_transform() {
        let mut store = store_with_rows(&[&[1.0, 10.0], &[3.0, 10.0], &[5.0, 10.0]]);
        let mut norm = Normalizer::new(NormalizerType::StandardDeviation, 2, 2);
        norm.fit(&store);
        norm.normalize_all(&mut store);

        let col0: Vec<f64> = (0..3).map(|i| store.features_of(i).unwrap()[0]).collect();
        assert_relative_eq!(col0.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        // constant feature gets divisor 1, values become 0
        for i in 0..3 {
            assert_relative_eq!(store.features_of(i).unwrap()[1], 0.0);
        }
    }

    #[test]
    fn unit_fit_and_transform() {
        let mut store = store_with_rows(&[&[2.0], &[4.0], &[6.0]]);
        let mut norm = Normalizer::new(NormalizerType::Unit, 1, 1);
        norm.fit(&store);
        norm.normalize_all(&mut store);
        assert_relative_eq!(store.features_of(0).unwrap()[0], 0.0);
        assert_relative_eq!(store.features_of(1).unwrap()[0], 0.5);
        assert_relative_eq!(store.features_of(2).unwrap()[0], 1.0);
    }

    #[test]
    fn weight_transforms_preserve_scores() {
        let raw_rows: Vec<Vec<f64>> = vec![
            vec![1.0, -2.0, 3.5],
            vec![0.5, 4.0, -1.0],
            vec![2.0, 1.0, 0.0],
        ];
        let mut store = store_with_rows(&[&raw_rows[0], &raw_rows[1], &raw_rows[2]]);
        let mut norm = Normalizer::new(NormalizerType::StandardDeviation, 3, 3);
        norm.fit(&store);

        let normalized_w = vec![0.7, -0.3, 1.2, 0.4];
        let raw_w = norm.unnormalize_weights(&normalized_w);

        norm.normalize_all(&mut store);
        for (i, raw_row) in raw_rows.iter().enumerate() {
            let norm_row = store.features_of(i).unwrap();
            let s_norm = dot(norm_row, &normalized_w[..3]) + normalized_w[3];
            let s_raw = dot(raw_row, &raw_w[..3]) + raw_w[3];
            assert_relative_eq!(s_norm, s_raw, epsilon = 1e-10);
        }

        // round trip
        let back = norm.normalize_weights(&raw_w);
        for (a, b) in back.iter().zip(normalized_w.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn doc_segment_fit_is_separate() {
        let mut store = store_with_rows(&[&[1.0, 100.0], &[3.0, 300.0]]);
        let mut norm = Normalizer::new(NormalizerType::StandardDeviation, 2, 1);
        norm.fit(&store);
        // doc segment untouched so far
        assert_relative_eq!(norm.normalize_value(100.0, 1), 100.0);
        norm.fit_doc(&store);
        norm.normalize_all(&mut store);
        let col1: Vec<f64> = (0..2).map(|i| store.features_of(i).unwrap()[1]).collect();
        assert_relative_eq!(col1.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
    }
}
