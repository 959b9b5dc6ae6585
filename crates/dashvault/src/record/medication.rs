//! Medication tracking.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{new_entry_id, UserRecord};
use crate::error::{Error, Result};

/// One tracked medication.
///
/// `current_pills` is expected to stay within `0..=total_pills`. The
/// operations here keep it there; a stored document that violates it is
/// still accepted and corrected on the next edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRecord {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Pills consumed per dose.
    pub pills_per_dose: u32,
    /// Pills in a full supply.
    pub total_pills: u32,
    /// Pills left.
    pub current_pills: u32,
    /// Whether today's dose has been taken.
    pub taken_today: bool,
    /// When a dose was last taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_taken: Option<DateTime<Utc>>,
}

/// Format a date the way the daily reset stamps `lastCheckDate`,
/// e.g. `Mon Jun 02 2025`.
#[must_use]
pub fn day_stamp(date: NaiveDate) -> String {
    date.format("%a %b %d %Y").to_string()
}

impl MedicationRecord {
    /// Create a medication with a full supply.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or either count is zero.
    pub fn new(name: &str, pills_per_dose: u32, total_pills: u32) -> Result<Self> {
        let medication = Self {
            id: new_entry_id(),
            name: name.trim().to_string(),
            pills_per_dose,
            total_pills,
            current_pills: total_pills,
            taken_today: false,
            last_taken: None,
        };
        medication.validate()?;
        Ok(medication)
    }

    /// Check the invariants a stored medication must satisfy.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty id or name, or a zero count.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_record("medication id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::invalid_record(format!(
                "medication {} has an empty name",
                self.id
            )));
        }
        if self.pills_per_dose == 0 {
            return Err(Error::invalid_record(format!(
                "medication {}: pillsPerDose must be greater than 0",
                self.id
            )));
        }
        if self.total_pills == 0 {
            return Err(Error::invalid_record(format!(
                "medication {}: totalPills must be greater than 0",
                self.id
            )));
        }
        Ok(())
    }

    /// Flip today's dose.
    ///
    /// Taking a dose removes `pills_per_dose` pills, never going below zero,
    /// and stamps `last_taken`. Undoing it puts them back, never above
    /// `total_pills`. Returns the new `taken_today` value.
    pub fn toggle_taken(&mut self, now: DateTime<Utc>) -> bool {
        if self.taken_today {
            self.current_pills = self
                .current_pills
                .saturating_add(self.pills_per_dose)
                .min(self.total_pills);
            self.taken_today = false;
        } else {
            self.current_pills = self.current_pills.saturating_sub(self.pills_per_dose);
            self.taken_today = true;
            self.last_taken = Some(now);
        }
        self.taken_today
    }

    /// Set the pill counts after a refill or recount.
    ///
    /// A dose marked taken stays taken only while enough pills remain for it.
    ///
    /// # Errors
    ///
    /// Returns an error if `total` is zero or `current` exceeds it.
    pub fn update_pills(&mut self, current: u32, total: u32) -> Result<()> {
        if total == 0 {
            return Err(Error::invalid_record("totalPills must be greater than 0"));
        }
        if current > total {
            return Err(Error::invalid_record(format!(
                "currentPills ({current}) cannot exceed totalPills ({total})"
            )));
        }
        self.current_pills = current;
        self.total_pills = total;
        self.taken_today = self.taken_today && current >= self.pills_per_dose;
        Ok(())
    }

    /// Whole days of doses left.
    #[must_use]
    pub fn days_remaining(&self) -> u32 {
        self.current_pills
            .checked_div(self.pills_per_dose)
            .unwrap_or(0)
    }

    /// At or below a quarter of a full supply.
    #[must_use]
    pub fn is_low_stock(&self) -> bool {
        u64::from(self.current_pills) * 4 <= u64::from(self.total_pills)
    }
}

impl UserRecord {
    /// Append a medication.
    ///
    /// # Errors
    ///
    /// Returns an error if it fails validation or its id is already in use.
    pub fn add_medication(&mut self, medication: MedicationRecord) -> Result<()> {
        medication.validate()?;
        if self.medications.iter().any(|m| m.id == medication.id) {
            return Err(Error::invalid_record(format!(
                "medication id {} is already in use",
                medication.id
            )));
        }
        self.medications.push(medication);
        Ok(())
    }

    /// Look up a medication for editing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no medication has this id.
    pub fn medication_mut(&mut self, id: &str) -> Result<&mut MedicationRecord> {
        self.medications
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::not_found("medication", id))
    }

    /// Remove a medication. Returns whether it was present.
    pub fn remove_medication(&mut self, id: &str) -> bool {
        let before = self.medications.len();
        self.medications.retain(|m| m.id != id);
        self.medications.len() != before
    }

    /// Clear every `taken_today` flag if `today` differs from the last check.
    ///
    /// Returns whether a reset happened.
    pub fn reset_for_new_day(&mut self, today: NaiveDate) -> bool {
        let stamp = day_stamp(today);
        if self.last_check_date.as_deref() == Some(stamp.as_str()) {
            return false;
        }
        for medication in &mut self.medications {
            medication.taken_today = false;
        }
        self.last_check_date = Some(stamp);
        true
    }

    /// Medications whose dose is marked taken today.
    #[must_use]
    pub fn taken_today_count(&self) -> usize {
        self.medications.iter().filter(|m| m.taken_today).count()
    }

    /// Medications running low.
    #[must_use]
    pub fn low_stock_count(&self) -> usize {
        self.medications.iter().filter(|m| m.is_low_stock()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_medication() -> MedicationRecord {
        MedicationRecord::new("Vitamin D", 2, 20).unwrap()
    }

    #[test]
    fn test_new_starts_full() {
        let med = create_test_medication();
        assert_eq!(med.current_pills, 20);
        assert!(!med.taken_today);
        assert!(med.last_taken.is_none());
        assert!(!med.id.is_empty());
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(MedicationRecord::new("  ", 1, 10).is_err());
        assert!(MedicationRecord::new("Aspirin", 0, 10).is_err());
        assert!(MedicationRecord::new("Aspirin", 1, 0).is_err());
    }

    #[test]
    fn test_toggle_taken_consumes_and_restores() {
        let mut med = create_test_medication();
        let now = Utc::now();

        assert!(med.toggle_taken(now));
        assert_eq!(med.current_pills, 18);
        assert_eq!(med.last_taken, Some(now));

        assert!(!med.toggle_taken(now));
        assert_eq!(med.current_pills, 20);
    }

    #[test]
    fn test_untake_never_exceeds_total() {
        let mut med = create_test_medication();
        med.taken_today = true;
        med.current_pills = 19;
        med.toggle_taken(Utc::now());
        assert_eq!(med.current_pills, 20);
    }

    #[test]
    fn test_take_with_short_supply_floors_at_zero() {
        let mut med = create_test_medication();
        med.current_pills = 1;
        let now = Utc::now();

        assert!(med.toggle_taken(now));
        assert_eq!(med.current_pills, 0);
        assert!(med.taken_today);
        assert_eq!(med.last_taken, Some(now));

        assert!(!med.toggle_taken(now));
        assert_eq!(med.current_pills, 2);
    }

    #[test]
    fn test_take_with_empty_supply() {
        let mut med = create_test_medication();
        med.current_pills = 0;
        assert!(med.toggle_taken(Utc::now()));
        assert_eq!(med.current_pills, 0);
    }

    #[test]
    fn test_update_pills_keeps_taken_when_enough_left() {
        let mut med = create_test_medication();
        med.toggle_taken(Utc::now());
        med.update_pills(10, 30).unwrap();
        assert!(med.taken_today);
        assert_eq!(med.total_pills, 30);

        med.update_pills(1, 30).unwrap();
        assert!(!med.taken_today);
    }

    #[test]
    fn test_update_pills_rejects_bad_counts() {
        let mut med = create_test_medication();
        assert!(med.update_pills(5, 0).is_err());
        assert!(med.update_pills(31, 30).is_err());
        assert_eq!(med.current_pills, 20);
    }

    #[test]
    fn test_days_remaining() {
        let mut med = create_test_medication();
        assert_eq!(med.days_remaining(), 10);
        med.current_pills = 5;
        assert_eq!(med.days_remaining(), 2);
    }

    #[test]
    fn test_low_stock_threshold() {
        let mut med = create_test_medication();
        med.current_pills = 6;
        assert!(!med.is_low_stock());
        med.current_pills = 5;
        assert!(med.is_low_stock());
        med.current_pills = 0;
        assert!(med.is_low_stock());
    }

    #[test]
    fn test_day_stamp_format() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_eq!(day_stamp(date), "Mon Jun 02 2025");
    }

    #[test]
    fn test_reset_for_new_day() {
        let mut record = UserRecord::default();
        let mut med = create_test_medication();
        med.taken_today = true;
        record.add_medication(med).unwrap();

        let day_one = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert!(record.reset_for_new_day(day_one));
        assert_eq!(record.taken_today_count(), 0);
        assert_eq!(record.last_check_date.as_deref(), Some("Mon Jun 02 2025"));

        record.medications[0].taken_today = true;
        assert!(!record.reset_for_new_day(day_one));
        assert_eq!(record.taken_today_count(), 1);

        let day_two = day_one.succ_opt().unwrap();
        assert!(record.reset_for_new_day(day_two));
        assert_eq!(record.taken_today_count(), 0);
    }

    #[test]
    fn test_add_medication_rejects_duplicate_id() {
        let mut record = UserRecord::default();
        let med = create_test_medication();
        record.add_medication(med.clone()).unwrap();
        assert!(record.add_medication(med).is_err());
    }

    #[test]
    fn test_medication_mut_and_remove() {
        let mut record = UserRecord::default();
        let med = create_test_medication();
        let id = med.id.clone();
        record.add_medication(med).unwrap();

        record.medication_mut(&id).unwrap().current_pills = 3;
        assert_eq!(record.low_stock_count(), 1);

        assert!(record.remove_medication(&id));
        assert!(matches!(
            record.medication_mut(&id),
            Err(Error::EntryNotFound { kind: "medication", .. })
        ));
    }

    #[test]
    fn test_current_pills_above_total_is_accepted_from_storage() {
        let raw = r#"{"id":"m1","name":"Iron","pillsPerDose":1,"totalPills":10,
            "currentPills":12,"takenToday":false}"#;
        let med: MedicationRecord = serde_json::from_str(raw).unwrap();
        assert!(med.validate().is_ok());
    }
}
