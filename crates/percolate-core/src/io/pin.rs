//! Percolator PIN-tab reading and writing.
//!
//! Columns: SpecId, Label (1 / -1), ScanNr, optional ExpMass/CalcMass,
//! feature columns, Peptide (with flanking residues), then one or more
//! protein columns. An optional second row with id `DefaultDirection`
//! supplies initial per-feature direction weights.

use std::io::{Read, Write};

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;
use rand::rngs::StdRng;
use rand::Rng;

use crate::doc::DescriptionOfCorrect;
use crate::normalizer::Normalizer;
use crate::psm::{Psm, PsmStore, ScoreHolder};
use crate::scores::ScoreSet;

/// Parsed PIN input ready for rescoring.
#[derive(Debug)]
pub struct PinData {
    pub store: PsmStore,
    /// Ordinary feature names followed by any appended doc slots.
    pub feature_names: Vec<String>,
    /// Initial direction from a `DefaultDirection` row, raw space,
    /// length F+1 with a zero bias.
    pub default_direction: Option<Vec<f64>>,
    pub has_exp_mass: bool,
    pub has_calc_mass: bool,
}

struct ColumnLayout {
    id_idx: usize,
    label_idx: usize,
    scan_idx: usize,
    exp_mass_idx: Option<usize>,
    calc_mass_idx: Option<usize>,
    peptide_idx: Option<usize>,
    feature_indices: Vec<usize>,
    feature_names: Vec<String>,
    /// (position within features, charge value) for one-hot Charge<N>
    /// columns.
    charge_features: Vec<(usize, u32)>,
}

const DEFAULT_DIRECTION_ID: &str = "DefaultDirection";
const DOC_FEATURE_NAMES: [&str; crate::doc::NUM_FEATURES] = ["docAbsDRt", "docSqDRt", "docRelDm"];

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case(name))
}

fn find_any_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| find_column(headers, name))
}

fn resolve_layout(headers: &StringRecord) -> Result<ColumnLayout> {
    let id_idx = find_any_column(headers, &["SpecId", "PSMId", "id"]).unwrap_or(0);
    let label_idx =
        find_column(headers, "Label").ok_or_else(|| anyhow!("missing Label column"))?;
    let scan_idx = find_any_column(headers, &["ScanNr", "ScanNum", "Scan"])
        .ok_or_else(|| anyhow!("missing ScanNr column"))?;
    let exp_mass_idx = find_column(headers, "ExpMass");
    let calc_mass_idx = find_column(headers, "CalcMass");
    let peptide_idx = find_column(headers, "Peptide");

    let mut feature_indices = Vec::new();
    let mut feature_names = Vec::new();
    let mut charge_features = Vec::new();
    let feature_end = peptide_idx.unwrap_or(headers.len());
    for (idx, header) in headers.iter().enumerate().take(feature_end) {
        if idx == id_idx
            || idx == label_idx
            || idx == scan_idx
            || Some(idx) == exp_mass_idx
            || Some(idx) == calc_mass_idx
        {
            continue;
        }
        if let Some(digits) = header.strip_prefix("Charge") {
            if let Ok(charge) = digits.parse::<u32>() {
                charge_features.push((feature_indices.len(), charge));
            }
        }
        feature_indices.push(idx);
        feature_names.push(header.to_string());
    }
    if feature_indices.is_empty() {
        return Err(anyhow!("no feature columns detected in PIN header"));
    }

    Ok(ColumnLayout {
        id_idx,
        label_idx,
        scan_idx,
        exp_mass_idx,
        calc_mass_idx,
        peptide_idx,
        feature_indices,
        feature_names,
        charge_features,
    })
}

struct ParsedRow {
    psm: Psm,
    features: Vec<f64>,
}

impl ColumnLayout {
    fn parse_row(&self, record: &StringRecord, row_idx: usize) -> Result<ParsedRow> {
        let id = record
            .get(self.id_idx)
            .unwrap_or_default()
            .trim()
            .to_string();
        let label = record
            .get(self.label_idx)
            .ok_or_else(|| anyhow!("missing label at row {}", row_idx + 1))?
            .trim()
            .parse::<i32>()
            .with_context(|| format!("invalid label at row {}", row_idx + 1))?;
        let scan = record
            .get(self.scan_idx)
            .ok_or_else(|| anyhow!("missing scan number at row {}", row_idx + 1))?
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid scan number at row {}", row_idx + 1))?;

        let parse_mass = |idx: Option<usize>| -> Result<f64> {
            match idx.and_then(|i| record.get(i)) {
                Some(value) if !value.trim().is_empty() => value
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("invalid mass at row {}", row_idx + 1)),
                _ => Ok(0.0),
            }
        };
        let exp_mass = parse_mass(self.exp_mass_idx)?;
        let calc_mass = parse_mass(self.calc_mass_idx)?;

        let mut features = Vec::with_capacity(self.feature_indices.len());
        for &idx in &self.feature_indices {
            let value = record
                .get(idx)
                .ok_or_else(|| anyhow!("missing feature value at row {}", row_idx + 1))?;
            let parsed = value.trim().parse::<f64>().with_context(|| {
                format!("invalid feature '{}' at row {}", value, row_idx + 1)
            })?;
            features.push(parsed);
        }

        let mut charge = 0;
        for &(feature_pos, value) in &self.charge_features {
            if features[feature_pos] != 0.0 {
                charge = value;
                break;
            }
        }

        let (peptide, proteins) = match self.peptide_idx {
            Some(idx) => {
                let peptide = record.get(idx).unwrap_or_default().trim().to_string();
                let proteins = record
                    .iter()
                    .skip(idx + 1)
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
                (peptide, proteins)
            }
            None => (String::new(), Vec::new()),
        };

        let ret_time = features.first().copied().unwrap_or(0.0);
        Ok(ParsedRow {
            psm: Psm {
                id,
                label,
                scan,
                exp_mass,
                calc_mass,
                charge,
                peptide,
                proteins,
                features: None,
                ret_time,
                pred_ret_time: 0.0,
            },
            features,
        })
    }
}

fn pin_reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(source)
}

/// Read a PIN-tab stream. `doc_slots` extra zeroed feature columns are
/// appended to every arena row. When `max_psms` is non-zero, a uniform
/// reservoir sample of that size is kept, drawn from the shared PRNG.
pub fn read_pin<R: Read>(
    source: R,
    doc_slots: usize,
    max_psms: usize,
    rng: &mut StdRng,
) -> Result<PinData> {
    let mut reader = pin_reader(source);
    let headers = reader.headers().context("failed to read PIN header")?.clone();
    let layout = resolve_layout(&headers)?;

    let mut default_direction = None;
    let mut rows: Vec<ParsedRow> = Vec::new();
    let mut seen = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("failed to read row {}", row_idx + 1))?;
        let id = record.get(layout.id_idx).unwrap_or_default().trim();
        if row_idx == 0 && id.eq_ignore_ascii_case(DEFAULT_DIRECTION_ID) {
            let mut direction = Vec::with_capacity(layout.feature_indices.len() + 1);
            for &idx in &layout.feature_indices {
                let value = record.get(idx).unwrap_or("0").trim();
                direction.push(value.parse::<f64>().unwrap_or(0.0));
            }
            direction.extend(std::iter::repeat(0.0).take(doc_slots));
            direction.push(0.0);
            default_direction = Some(direction);
            continue;
        }

        let parsed = layout.parse_row(&record, row_idx)?;
        if max_psms == 0 {
            rows.push(parsed);
        } else if rows.len() < max_psms {
            rows.push(parsed);
            seen += 1;
        } else {
            seen += 1;
            let slot = rng.gen_range(0..seen);
            if slot < max_psms {
                rows[slot] = parsed;
            }
        }
    }

    let num_features = layout.feature_indices.len() + doc_slots;
    let mut store = PsmStore::new(num_features);
    let mut padded = vec![0.0; num_features];
    for row in rows {
        padded[..row.features.len()].copy_from_slice(&row.features);
        padded[row.features.len()..].fill(0.0);
        store.push(row.psm, &padded);
    }

    let mut feature_names = layout.feature_names;
    for name in DOC_FEATURE_NAMES.iter().take(doc_slots) {
        feature_names.push(name.to_string());
    }

    Ok(PinData {
        store,
        feature_names,
        default_direction,
        has_exp_mass: layout.exp_mass_idx.is_some(),
        has_calc_mass: layout.calc_mass_idx.is_some(),
    })
}

/// Stream a PIN-tab source straight through a trained model: each row is
/// scored with raw-space weights and its feature row released right away,
/// so the arena footprint stays at one row.
pub fn read_and_score_pin<R: Read>(
    source: R,
    raw_weights: &[f64],
    scores: &mut ScoreSet,
    doc: Option<&DescriptionOfCorrect>,
    doc_slots: usize,
) -> Result<PsmStore> {
    let mut reader = pin_reader(source);
    let headers = reader.headers().context("failed to read PIN header")?.clone();
    let layout = resolve_layout(&headers)?;

    let num_features = layout.feature_indices.len() + doc_slots;
    let mut store = PsmStore::new(num_features);
    let mut padded = vec![0.0; num_features];

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("failed to read row {}", row_idx + 1))?;
        let id = record.get(layout.id_idx).unwrap_or_default().trim();
        if row_idx == 0 && id.eq_ignore_ascii_case(DEFAULT_DIRECTION_ID) {
            continue;
        }
        let parsed = layout.parse_row(&record, row_idx)?;
        padded[..parsed.features.len()].copy_from_slice(&parsed.features);
        padded[parsed.features.len()..].fill(0.0);
        let label = parsed.psm.label;
        let idx = store.push(parsed.psm, &padded);
        let sh = ScoreHolder::new(idx, label);
        scores.score_and_add(&mut store, sh, raw_weights, doc);
    }
    Ok(store)
}

/// Re-emit the stored PSMs in PIN format. Normalized rows are mapped back
/// to raw feature space so a read/write cycle preserves the input.
pub fn write_pin<W: Write>(
    out: &mut W,
    data: &PinData,
    normalizer: Option<&Normalizer>,
    doc_slots: usize,
) -> Result<()> {
    let num_ordinary = data.feature_names.len() - doc_slots;
    let mut header = vec!["SpecId".to_string(), "Label".to_string(), "ScanNr".to_string()];
    if data.has_exp_mass {
        header.push("ExpMass".to_string());
    }
    if data.has_calc_mass {
        header.push("CalcMass".to_string());
    }
    header.extend(data.feature_names[..num_ordinary].iter().cloned());
    header.push("Peptide".to_string());
    header.push("Proteins".to_string());
    writeln!(out, "{}", header.join("\t"))?;

    for (idx, psm) in data.store.psms.iter().enumerate() {
        let Some(row) = data.store.features_of(idx) else {
            continue;
        };
        let mut fields = vec![
            psm.id.clone(),
            psm.label.to_string(),
            psm.scan.to_string(),
        ];
        if data.has_exp_mass {
            fields.push(psm.exp_mass.to_string());
        }
        if data.has_calc_mass {
            fields.push(psm.calc_mass.to_string());
        }
        for j in 0..num_ordinary {
            let value = match normalizer {
                Some(norm) => norm.unnormalize_value(row[j], j),
                None => row[j],
            };
            fields.push(value.to_string());
        }
        fields.push(psm.peptide.clone());
        for protein in &psm.proteins {
            fields.push(protein.clone());
        }
        writeln!(out, "{}", fields.join("\t"))?;
    }
    Ok(())
}
