//! In-memory patient store.
//!
//! Per patient, records are kept in non-decreasing `test_date` order. A
//! (patient, date) pair holds at most one file's worth of records; that is
//! enforced at admission, the store only merges.

mod visibility;

pub use visibility::*;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::VisitRecord;

/// What a merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    NewPatient,
    ExistingPatient,
}

/// Patient id → chronologically ordered records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientStore {
    records: BTreeMap<String, Vec<VisitRecord>>,
    /// Patient ids in natural order ("P2" before "P10")
    patient_ids: Vec<String>,
}

impl PatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one file's records for a patient.
    pub fn merge(&mut self, patient_id: &str, new_records: Vec<VisitRecord>) -> MergeOutcome {
        match self.records.get_mut(patient_id) {
            Some(existing) => {
                existing.extend(new_records);
                // stable: same-date records keep arrival order
                existing.sort_by_key(|r| r.test_date);
                MergeOutcome::ExistingPatient
            }
            None => {
                let mut records = new_records;
                records.sort_by_key(|r| r.test_date);
                self.records.insert(patient_id.to_string(), records);
                self.insert_patient_id(patient_id);
                MergeOutcome::NewPatient
            }
        }
    }

    /// Records for a patient, `None` if the patient is unknown.
    pub fn records(&self, patient_id: &str) -> Option<&[VisitRecord]> {
        self.records.get(patient_id).map(Vec::as_slice)
    }

    pub fn contains(&self, patient_id: &str) -> bool {
        self.records.contains_key(patient_id)
    }

    /// Whether any stored record for the patient falls on `date`.
    pub fn has_visit(&self, patient_id: &str, date: NaiveDate) -> bool {
        self.records
            .get(patient_id)
            .map(|records| records.iter().any(|r| r.test_date == date))
            .unwrap_or(false)
    }

    /// Distinct visit dates, ascending.
    pub fn visit_dates(&self, patient_id: &str) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .records
            .get(patient_id)
            .map(|records| records.iter().map(|r| r.test_date).collect())
            .unwrap_or_default();
        dates.dedup();
        dates
    }

    pub fn patient_ids(&self) -> &[String] {
        &self.patient_ids
    }

    /// Case-insensitive substring search over patient ids, natural order.
    pub fn search(&self, query: &str) -> Vec<String> {
        let needle = query.trim().to_lowercase();
        self.patient_ids
            .iter()
            .filter(|id| id.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn patient_count(&self) -> usize {
        self.records.len()
    }

    pub fn record_count(&self, patient_id: &str) -> usize {
        self.records.get(patient_id).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<VisitRecord>)> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.patient_ids.clear();
    }

    fn insert_patient_id(&mut self, patient_id: &str) {
        let pos = self
            .patient_ids
            .binary_search_by(|probe| natural_cmp(probe, patient_id))
            .unwrap_or_else(|pos| pos);
        self.patient_ids.insert(pos, patient_id.to_string());
    }
}

/// Numeric-aware ordering: digit runs compare by value, text case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);

    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Chunk::Digits(x)), Some(Chunk::Digits(y))) => compare_digits(x, y),
            (Some(Chunk::Text(x)), Some(Chunk::Text(y))) => {
                x.to_lowercase().cmp(&y.to_lowercase())
            }
            (Some(Chunk::Digits(_)), Some(Chunk::Text(_))) => Ordering::Less,
            (Some(Chunk::Text(_)), Some(Chunk::Digits(_))) => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

fn compare_digits(x: &str, y: &str) -> Ordering {
    let x_trimmed = x.trim_start_matches('0');
    let y_trimmed = y.trim_start_matches('0');
    x_trimmed
        .len()
        .cmp(&y_trimmed.len())
        .then_with(|| x_trimmed.cmp(y_trimmed))
}

enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}
