//! Accumulates PAT/SDT/NIT contents over a capture window and checks them
//! against expected counts and against each other.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::processor::SiTable;
use crate::psi::{NitTable, PatTable, SdtTable, ServiceInfo};
use crate::types::TransportStreamRef;

const MAX_LISTED_IDS: usize = 10;

/// Expected counts; `None` leaves a count unchecked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectations {
    pub programs:     Option<usize>,
    pub sdt:          Option<usize>,
    pub nit_services: Option<usize>,
    pub nit_lcn:      Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub captured_at:  String,
    pub pat_programs: usize,
    pub sdt_services: usize,
    pub nit_services: usize,
    pub nit_lcn:      usize,
    pub nit_ts:       Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Verifier {
    expect:       Expectations,
    pat_programs: BTreeMap<u16, u16>,
    sdt_services: BTreeMap<u16, ServiceInfo>,
    nit_services: BTreeMap<u16, u8>,
    nit_lcn:      BTreeMap<u16, u16>,
    nit_ts:       BTreeSet<TransportStreamRef>,
}

/// Sorted ids present in `reference` but absent from `other`.
fn missing_ids<A, B>(reference: &BTreeMap<u16, A>, other: &BTreeMap<u16, B>) -> Vec<u16> {
    reference.keys().filter(|id| !other.contains_key(id)).copied().collect()
}

fn check_count(errors: &mut Vec<String>, label: &str, expected: Option<usize>, got: usize) {
    if let Some(expected) = expected {
        if expected != got {
            errors.push(format!("{label} mismatch: expected {expected}, got {got}"));
        }
    }
}

fn check_missing(errors: &mut Vec<String>, table: &str, missing: &[u16]) {
    if !missing.is_empty() {
        let first = &missing[..missing.len().min(MAX_LISTED_IDS)];
        errors.push(format!(
            "{table} missing {} services from PAT (first: {first:?})",
            missing.len()
        ));
    }
}

impl Verifier {
    pub fn new(expect: Expectations) -> Self {
        Self { expect, ..Self::default() }
    }

    /* merged by key, latest wins */
    pub fn update_pat(&mut self, pat: &PatTable) {
        self.pat_programs.extend(pat.programs.iter().map(|(&k, &v)| (k, v)));
    }

    pub fn update_sdt(&mut self, sdt: &SdtTable) {
        self.sdt_services.extend(sdt.services.iter().map(|(&k, v)| (k, v.clone())));
    }

    pub fn update_nit(&mut self, nit: &NitTable) {
        self.nit_services.extend(nit.service_list.iter().map(|(&k, &v)| (k, v)));
        self.nit_lcn.extend(nit.lcn_list.iter().map(|(&k, &v)| (k, v)));
        self.nit_ts.extend(nit.ts_list.iter().copied());
    }

    pub fn observe(&mut self, table: &SiTable) {
        match table {
            SiTable::Pat(pat) => self.update_pat(pat),
            SiTable::Sdt(sdt) => self.update_sdt(sdt),
            SiTable::Nit(nit) => self.update_nit(nit),
            _ => {}
        }
    }

    /// Every expected count reached; with no expectations, PAT, SDT and NIT
    /// have each been seen.
    pub fn is_complete(&self) -> bool {
        let e = &self.expect;
        let reached = |want: Option<usize>, got: usize| want.is_none_or(|w| got >= w);
        if e == &Expectations::default() {
            return !self.pat_programs.is_empty()
                && !self.sdt_services.is_empty()
                && !self.nit_services.is_empty();
        }
        reached(e.programs, self.pat_programs.len())
            && reached(e.sdt, self.sdt_services.len())
            && reached(e.nit_services, self.nit_services.len())
            && reached(e.nit_lcn, self.nit_lcn.len())
    }

    pub fn summary(&self) -> Summary {
        Summary {
            captured_at:  chrono::Utc::now().to_rfc3339(),
            pat_programs: self.pat_programs.len(),
            sdt_services: self.sdt_services.len(),
            nit_services: self.nit_services.len(),
            nit_lcn:      self.nit_lcn.len(),
            nit_ts:       self.nit_ts.iter().map(ToString::to_string).collect(),
        }
    }

    /// Reporting only: never interrupts a capture.
    pub fn compare(&self) -> Verdict {
        let mut errors = Vec::new();
        let e = &self.expect;
        check_count(&mut errors, "PAT programs", e.programs, self.pat_programs.len());
        check_count(&mut errors, "SDT services", e.sdt, self.sdt_services.len());
        check_count(&mut errors, "NIT service_list", e.nit_services, self.nit_services.len());
        check_count(&mut errors, "NIT LCN", e.nit_lcn, self.nit_lcn.len());

        if !self.pat_programs.is_empty() && !self.sdt_services.is_empty() {
            check_missing(&mut errors, "SDT", &missing_ids(&self.pat_programs, &self.sdt_services));
        }
        if !self.pat_programs.is_empty() && !self.nit_services.is_empty() {
            check_missing(&mut errors, "NIT", &missing_ids(&self.pat_programs, &self.nit_services));
        }

        Verdict { passed: errors.is_empty(), errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(ids: &[u16]) -> PatTable {
        PatTable {
            tsid: 1,
            version: 0,
            programs: ids.iter().map(|&id| (id, 0x1000 + id)).collect(),
        }
    }

    fn sdt(ids: &[u16]) -> SdtTable {
        SdtTable {
            tsid: 1,
            onid: 1,
            version: 0,
            services: ids.iter().map(|&id| (id, ServiceInfo::default())).collect(),
        }
    }

    fn nit(ids: &[u16]) -> NitTable {
        NitTable {
            network_id: 1,
            version: 0,
            service_list: ids.iter().map(|&id| (id, 1)).collect(),
            lcn_list: ids.iter().map(|&id| (id, id + 100)).collect(),
            ts_list: BTreeSet::from([TransportStreamRef { tsid: 1, onid: 1 }]),
        }
    }

    #[test]
    fn sdt_missing_one_program() {
        let mut v = Verifier::default();
        v.update_pat(&pat(&[1, 2, 3]));
        v.update_sdt(&sdt(&[1, 2]));
        let verdict = v.compare();
        assert!(!verdict.passed);
        assert_eq!(verdict.errors, vec!["SDT missing 1 services from PAT (first: [3])".to_string()]);
    }

    #[test]
    fn only_first_ten_ids_listed() {
        let ids: Vec<u16> = (1..=25).collect();
        let mut v = Verifier::default();
        v.update_pat(&pat(&ids));
        v.update_nit(&nit(&[1]));
        let verdict = v.compare();
        assert_eq!(
            verdict.errors,
            vec!["NIT missing 24 services from PAT (first: [2, 3, 4, 5, 6, 7, 8, 9, 10, 11])".to_string()]
        );
    }

    #[test]
    fn count_mismatches() {
        let expect = Expectations { programs: Some(3), sdt: Some(3), nit_services: Some(2), nit_lcn: Some(3) };
        let mut v = Verifier::new(expect);
        v.observe(&SiTable::Pat(pat(&[1, 2, 3])));
        v.observe(&SiTable::Sdt(sdt(&[1, 2, 3])));
        v.observe(&SiTable::Nit(nit(&[1, 2, 3])));
        let verdict = v.compare();
        assert_eq!(
            verdict.errors,
            vec![
                "NIT service_list mismatch: expected 2, got 3".to_string(),
            ]
        );
        assert!(v.is_complete());
    }

    #[test]
    fn merge_overwrites_by_key() {
        let mut v = Verifier::default();
        v.update_pat(&pat(&[1, 2]));
        v.update_pat(&pat(&[2, 3]));
        v.update_nit(&nit(&[1]));
        v.update_nit(&nit(&[1]));
        let s = v.summary();
        assert_eq!(s.pat_programs, 3);
        assert_eq!(s.nit_services, 1);
        assert_eq!(s.nit_ts, vec!["1:1".to_string()]);
    }

    #[test]
    fn completeness() {
        let mut v = Verifier::default();
        assert!(!v.is_complete());
        v.update_pat(&pat(&[1]));
        v.update_sdt(&sdt(&[1]));
        assert!(!v.is_complete());
        v.update_nit(&nit(&[1]));
        assert!(v.is_complete());
        assert!(v.compare().passed);

        let mut v = Verifier::new(Expectations { programs: Some(2), ..Expectations::default() });
        v.update_pat(&pat(&[1]));
        assert!(!v.is_complete());
        v.update_pat(&pat(&[2]));
        assert!(v.is_complete());
    }
}
