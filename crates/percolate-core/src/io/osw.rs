//! OpenSWATH OSW (SQLite) input and output.
//!
//! Feature scores come from the `VAR_*` columns of FEATURE_MS1,
//! FEATURE_MS2 or FEATURE_TRANSITION; results go back into the same file
//! as SCORE_MS1 / SCORE_MS2 / SCORE_TRANSITION, dropping any previous
//! score table first.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::config::OswLevel;
use crate::io::pin::PinData;
use crate::psm::{Psm, PsmStore};
use crate::scores::ScoreSet;

fn feature_table(level: OswLevel) -> &'static str {
    match level {
        OswLevel::Ms1 => "FEATURE_MS1",
        OswLevel::Ms2 => "FEATURE_MS2",
        OswLevel::Transition => "FEATURE_TRANSITION",
    }
}

/// Read one data level of an OSW file into the PIN data model. The scan
/// identity of a feature is its precursor id; decoy status comes from the
/// PRECURSOR table.
pub fn read_osw(path: &Path, level: OswLevel) -> Result<PinData> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open OSW file {}", path.display()))?;
    let table = feature_table(level);

    let var_columns = {
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {} LIMIT 0", table))
            .with_context(|| format!("OSW file has no {} table", table))?;
        stmt.column_names()
            .iter()
            .filter(|name| name.to_uppercase().starts_with("VAR_"))
            .map(|name| name.to_string())
            .collect::<Vec<String>>()
    };
    anyhow::ensure!(
        !var_columns.is_empty(),
        "no VAR_ feature columns found in {}",
        table
    );

    let transition_id = match level {
        OswLevel::Transition => ", T.TRANSITION_ID",
        _ => "",
    };
    let var_list = var_columns
        .iter()
        .map(|c| format!("T.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT FEATURE.ID, PRECURSOR.ID, PRECURSOR.PRECURSOR_MZ, PRECURSOR.DECOY, \
         PEPTIDE.MODIFIED_SEQUENCE{transition_id}, {var_list} \
         FROM {table} T \
         JOIN FEATURE ON T.FEATURE_ID = FEATURE.ID \
         JOIN PRECURSOR ON FEATURE.PRECURSOR_ID = PRECURSOR.ID \
         LEFT JOIN PRECURSOR_PEPTIDE_MAPPING ON PRECURSOR.ID = PRECURSOR_PEPTIDE_MAPPING.PRECURSOR_ID \
         LEFT JOIN PEPTIDE ON PRECURSOR_PEPTIDE_MAPPING.PEPTIDE_ID = PEPTIDE.ID \
         ORDER BY FEATURE.ID"
    );

    let fixed = if level == OswLevel::Transition { 6 } else { 5 };
    let mut store = PsmStore::new(var_columns.len());
    let mut stmt = conn.prepare(&sql).context("failed to query OSW features")?;
    let mut rows = stmt.query([]).context("failed to read OSW features")?;
    let mut features = vec![0.0; var_columns.len()];
    while let Some(row) = rows.next()? {
        let feature_id: i64 = row.get(0)?;
        let precursor_id: i64 = row.get(1)?;
        let precursor_mz: f64 = row.get::<_, Option<f64>>(2)?.unwrap_or(0.0);
        let decoy: i64 = row.get::<_, Option<i64>>(3)?.unwrap_or(0);
        let peptide: Option<String> = row.get(4)?;
        let id = if level == OswLevel::Transition {
            let transition: i64 = row.get(5)?;
            format!("{}_{}", feature_id, transition)
        } else {
            feature_id.to_string()
        };

        for (j, value) in features.iter_mut().enumerate() {
            *value = row.get::<_, Option<f64>>(fixed + j)?.unwrap_or(0.0);
        }

        let psm = Psm {
            id,
            label: if decoy != 0 { -1 } else { 1 },
            scan: precursor_id as u32,
            exp_mass: precursor_mz,
            calc_mass: 0.0,
            charge: 0,
            peptide: peptide.unwrap_or_default(),
            proteins: Vec::new(),
            features: None,
            ret_time: features.first().copied().unwrap_or(0.0),
            pred_ret_time: 0.0,
        };
        store.push(psm, &features);
    }

    Ok(PinData {
        store,
        feature_names: var_columns,
        default_direction: None,
        has_exp_mass: true,
        has_calc_mass: false,
    })
}

/// Write scores, q-values and PEPs back into the OSW file. The target
/// table is dropped and recreated, then filled in one transaction.
pub fn write_osw(
    path: &Path,
    level: OswLevel,
    scores: &ScoreSet,
    store: &PsmStore,
) -> Result<()> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open OSW file {}", path.display()))?;
    let table = level.score_table();

    let create_sql = match level {
        OswLevel::Transition => format!(
            "DROP TABLE IF EXISTS {table}; \
             CREATE TABLE {table}(\
             FEATURE_ID TEXT NOT NULL,\
             TRANSITION_ID TEXT NOT NULL,\
             SCORE DOUBLE NOT NULL,\
             QVALUE DOUBLE NOT NULL,\
             PEP DOUBLE NOT NULL);"
        ),
        _ => format!(
            "DROP TABLE IF EXISTS {table}; \
             CREATE TABLE {table}(\
             FEATURE_ID TEXT NOT NULL,\
             SCORE DOUBLE NOT NULL,\
             QVALUE DOUBLE NOT NULL,\
             PEP DOUBLE NOT NULL);"
        ),
    };
    conn.execute_batch(&create_sql)
        .with_context(|| format!("failed to recreate {}", table))?;

    let tx = conn.transaction()?;
    {
        let mut stmt = match level {
            OswLevel::Transition => tx.prepare(&format!(
                "INSERT INTO {} (FEATURE_ID, TRANSITION_ID, SCORE, QVALUE, PEP) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                table
            ))?,
            _ => tx.prepare(&format!(
                "INSERT INTO {} (FEATURE_ID, SCORE, QVALUE, PEP) VALUES (?1, ?2, ?3, ?4)",
                table
            ))?,
        };
        for sh in scores.holders() {
            let psm = &store.psms[sh.psm];
            match level {
                OswLevel::Transition => {
                    // ids carry FEATURE_ID and TRANSITION_ID merged
                    let (feature_id, transition_id) =
                        psm.id.rsplit_once('_').unwrap_or((psm.id.as_str(), ""));
                    stmt.execute(rusqlite::params![
                        feature_id, transition_id, sh.score, sh.q, sh.pep
                    ])?;
                }
                _ => {
                    stmt.execute(rusqlite::params![psm.id, sh.score, sh.q, sh.pep])?;
                }
            }
        }
    }
    tx.commit().context("failed to commit score table")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psm::ScoreHolder;

    fn fixture_osw(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE PRECURSOR (ID INTEGER PRIMARY KEY, PRECURSOR_MZ DOUBLE, DECOY INT);\
             CREATE TABLE FEATURE (ID INTEGER PRIMARY KEY, PRECURSOR_ID INT);\
             CREATE TABLE PEPTIDE (ID INTEGER PRIMARY KEY, MODIFIED_SEQUENCE TEXT);\
             CREATE TABLE PRECURSOR_PEPTIDE_MAPPING (PRECURSOR_ID INT, PEPTIDE_ID INT);\
             CREATE TABLE FEATURE_MS2 (FEATURE_ID INT, VAR_XCORR DOUBLE, VAR_COELUTION DOUBLE);\
             INSERT INTO PRECURSOR VALUES (1, 500.5, 0), (2, 600.25, 1);\
             INSERT INTO FEATURE VALUES (11, 1), (12, 2);\
             INSERT INTO PEPTIDE VALUES (21, 'ELVISK');\
             INSERT INTO PRECURSOR_PEPTIDE_MAPPING VALUES (1, 21);\
             INSERT INTO FEATURE_MS2 VALUES (11, 2.5, 0.9), (12, 1.0, NULL);",
        )
        .unwrap();
    }

    #[test]
    fn reads_var_columns_and_decoy_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.osw");
        fixture_osw(&path);

        let data = read_osw(&path, OswLevel::Ms2).unwrap();
        assert_eq!(data.store.len(), 2);
        assert_eq!(data.feature_names, vec!["VAR_XCORR", "VAR_COELUTION"]);
        assert_eq!(data.store.psms[0].label, 1);
        assert_eq!(data.store.psms[0].peptide, "ELVISK");
        assert_eq!(data.store.psms[1].label, -1);
        assert_eq!(data.store.features_of(0).unwrap(), &[2.5, 0.9]);
        // NULL feature value comes back as 0
        assert_eq!(data.store.features_of(1).unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn writes_score_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.osw");
        fixture_osw(&path);

        let data = read_osw(&path, OswLevel::Ms2).unwrap();
        let mut set = ScoreSet::new(false);
        for idx in 0..data.store.len() {
            let mut sh = ScoreHolder::new(idx, data.store.psms[idx].label);
            sh.score = idx as f64;
            sh.q = 0.01;
            sh.pep = 0.5;
            set.push(sh);
        }
        write_osw(&path, OswLevel::Ms2, &set, &data.store).unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM SCORE_MS2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        // rewrite drops the old table first
        write_osw(&path, OswLevel::Ms2, &set, &data.store).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM SCORE_MS2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
