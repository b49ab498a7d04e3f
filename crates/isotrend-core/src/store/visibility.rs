//! Per-patient, per-visit inclusion mask.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{date_key, VisitRecord};

/// Patient id → ISO date → visible.
///
/// Entries are created (visible) the first time a date is observed and are
/// never removed; toggling only flips the flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct VisibilityMap {
    patients: BTreeMap<String, BTreeMap<String, bool>>,
}

impl VisibilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register dates for a patient; unseen dates default to visible.
    /// Returns how many entries were created.
    pub fn observe<I>(&mut self, patient_id: &str, dates: I) -> usize
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let entries = self.patients.entry(patient_id.to_string()).or_default();
        let mut created = 0;
        for date in dates {
            entries.entry(date_key(date)).or_insert_with(|| {
                created += 1;
                true
            });
        }
        created
    }

    /// Set one existing entry. Unknown dates are not created; returns whether
    /// an entry was found.
    pub fn set_visible(&mut self, patient_id: &str, date: &str, visible: bool) -> bool {
        match self
            .patients
            .get_mut(patient_id)
            .and_then(|entries| entries.get_mut(date))
        {
            Some(flag) => {
                *flag = visible;
                true
            }
            None => false,
        }
    }

    /// Flip one existing entry, returning the new value.
    pub fn toggle(&mut self, patient_id: &str, date: &str) -> Option<bool> {
        let flag = self.patients.get_mut(patient_id)?.get_mut(date)?;
        *flag = !*flag;
        Some(*flag)
    }

    /// Flag for one date; `None` if never observed.
    pub fn get(&self, patient_id: &str, date: &str) -> Option<bool> {
        self.patients.get(patient_id)?.get(date).copied()
    }

    /// All entries for a patient, ordered by date.
    pub fn entries(&self, patient_id: &str) -> Option<&BTreeMap<String, bool>> {
        self.patients.get(patient_id)
    }

    /// Records whose date is marked visible, in their original order.
    /// Dates without an entry count as visible.
    pub fn filter<'r>(&self, patient_id: &str, records: &'r [VisitRecord]) -> Vec<&'r VisitRecord> {
        let entries = self.patients.get(patient_id);
        records
            .iter()
            .filter(|record| {
                entries
                    .and_then(|e| e.get(&record.date_key()))
                    .copied()
                    .unwrap_or(true)
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.patients.clear();
    }
}
