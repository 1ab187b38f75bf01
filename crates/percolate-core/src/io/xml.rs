//! Percolator-out XML emission.

use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::psm::{PsmStore, ScoreHolder};
use crate::scores::ScoreSet;

const POUT_NAMESPACE: &str = "http://per-colator.com/percolator_out/15";

/// Buffers the `<psms>` and `<peptides>` sections as the pipeline reaches
/// them, then assembles the full document.
pub struct PoutWriter {
    print_decoys: bool,
    print_exp_mass: bool,
    psm_section: Vec<u8>,
    peptide_section: Vec<u8>,
}

type XmlWriter = Writer<Vec<u8>>;

fn text_element(writer: &mut XmlWriter, name: &str, value: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

impl PoutWriter {
    pub fn new(print_decoys: bool, print_exp_mass: bool) -> Self {
        Self {
            print_decoys,
            print_exp_mass,
            psm_section: Vec::new(),
            peptide_section: Vec::new(),
        }
    }

    fn write_common_stats(
        &self,
        writer: &mut XmlWriter,
        sh: &ScoreHolder,
        store: &PsmStore,
    ) -> Result<()> {
        let psm = &store.psms[sh.psm];
        text_element(writer, "svm_score", &format!("{:.6}", sh.score))?;
        text_element(writer, "q_value", &format!("{:.6e}", sh.q))?;
        text_element(writer, "pep", &format!("{:.6e}", sh.pep))?;
        if self.print_exp_mass {
            text_element(writer, "exp_mass", &format!("{:.4}", psm.exp_mass))?;
        }
        text_element(writer, "calc_mass", &format!("{:.3}", psm.calc_mass))?;
        Ok(())
    }

    fn write_proteins_and_pvalue(
        writer: &mut XmlWriter,
        sh: &ScoreHolder,
        store: &PsmStore,
    ) -> Result<()> {
        let psm = &store.psms[sh.psm];
        for protein in &psm.proteins {
            text_element(writer, "protein_id", protein)?;
        }
        text_element(writer, "p_value", &format!("{:.6e}", sh.p))?;
        Ok(())
    }

    fn decoy_attribute(start: &mut BytesStart, is_decoy: bool) {
        start.push_attribute(("p:decoy", if is_decoy { "true" } else { "false" }));
    }

    /// Serialize the PSM-level section from the current ranking.
    pub fn write_psms(&mut self, scores: &ScoreSet, store: &PsmStore) -> Result<()> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        for sh in scores.holders() {
            if sh.is_decoy() && !self.print_decoys {
                continue;
            }
            let psm = &store.psms[sh.psm];
            let mut start = BytesStart::new("psm");
            start.push_attribute(("p:psm_id", psm.id.as_str()));
            if self.print_decoys {
                Self::decoy_attribute(&mut start, sh.is_decoy());
            }
            writer.write_event(Event::Start(start))?;
            self.write_common_stats(&mut writer, sh, store)?;

            if !psm.sequence().is_empty() {
                let mut seq = BytesStart::new("peptide_seq");
                seq.push_attribute(("n", psm.flank_n()));
                seq.push_attribute(("c", psm.flank_c()));
                seq.push_attribute(("seq", psm.sequence()));
                writer.write_event(Event::Empty(seq))?;
            }
            Self::write_proteins_and_pvalue(&mut writer, sh, store)?;
            writer.write_event(Event::End(BytesEnd::new("psm")))?;
        }
        self.psm_section = writer.into_inner();
        Ok(())
    }

    /// Serialize the peptide-level section; each element lists the PSMs
    /// collapsed into it by peptide-unique weeding.
    pub fn write_peptides(&mut self, scores: &ScoreSet, store: &PsmStore) -> Result<()> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        for sh in scores.holders() {
            if sh.is_decoy() && !self.print_decoys {
                continue;
            }
            let psm = &store.psms[sh.psm];
            let mut start = BytesStart::new("peptide");
            start.push_attribute(("p:peptide_id", psm.sequence()));
            if self.print_decoys {
                Self::decoy_attribute(&mut start, sh.is_decoy());
            }
            writer.write_event(Event::Start(start))?;
            self.write_common_stats(&mut writer, sh, store)?;
            Self::write_proteins_and_pvalue(&mut writer, sh, store)?;

            writer.write_event(Event::Start(BytesStart::new("psm_ids")))?;
            if let Some(members) = scores.peptide_psms(sh.psm) {
                for &member in members {
                    text_element(&mut writer, "psm_id", &store.psms[member].id)?;
                }
            } else {
                text_element(&mut writer, "psm_id", &psm.id)?;
            }
            writer.write_event(Event::End(BytesEnd::new("psm_ids")))?;
            writer.write_event(Event::End(BytesEnd::new("peptide")))?;
        }
        self.peptide_section = writer.into_inner();
        Ok(())
    }

    /// Assemble and write the full document.
    pub fn finish(&self, path: &Path, command_line: &str) -> Result<()> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("percolator_output");
        root.push_attribute(("xmlns:p", POUT_NAMESPACE));
        writer.write_event(Event::Start(root))?;

        writer.write_event(Event::Start(BytesStart::new("process_info")))?;
        text_element(&mut writer, "command_line", command_line)?;
        writer.write_event(Event::End(BytesEnd::new("process_info")))?;

        writer.write_event(Event::Start(BytesStart::new("psms")))?;
        writer.get_mut().extend_from_slice(&self.psm_section);
        writer.write_event(Event::End(BytesEnd::new("psms")))?;

        if !self.peptide_section.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("peptides")))?;
            writer.get_mut().extend_from_slice(&self.peptide_section);
            writer.write_event(Event::End(BytesEnd::new("peptides")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("percolator_output")))?;
        let bytes = writer.into_inner();
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write XML output to {}", path.display()))
    }
}
