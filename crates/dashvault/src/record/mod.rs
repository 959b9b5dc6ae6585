//! The per-user record schema.
//!
//! A [`UserRecord`] is everything one user's dashboard keeps between
//! sessions. It is stored as a single JSON document whose field names match
//! what the browser dashboard wrote, so existing exports import unchanged.
//!
//! Nested collections are typed and validated on the way in: a payload that
//! parses as JSON but carries, say, a medication with zero pills per dose is
//! rejected as a whole.

mod dashboard;
mod medication;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use dashboard::{default_cards, CardPrefab, CardRecord, CardSize, ContentType, CARD_PREFABS};
pub use medication::{day_stamp, MedicationRecord};

/// Everything persisted for one user.
///
/// Missing fields in a stored document take their default values, so a
/// consumer never sees a partially populated record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserRecord {
    /// Cumulative distinct flights observed.
    pub flight_count: u64,
    /// Flight identifiers already counted.
    pub tracked_flight_ids: BTreeSet<String>,
    /// Locations shown by the weather viewer, in display order.
    pub weather_locations: Vec<LocationRef>,
    /// Businesses the user kept.
    pub saved_businesses: Vec<BusinessRecord>,
    /// Businesses hidden from listings.
    pub blacklisted_businesses: Vec<BusinessRecord>,
    /// Tracked medications, in display order.
    pub medications: Vec<MedicationRecord>,
    /// Day stamp of the last "new day" reset.
    pub last_check_date: Option<String>,
    /// Most recent network speed measurement.
    pub network_speed_test: Option<NetworkSpeedTest>,
    /// Dashboard cards, in layout order.
    pub dashboard_cards: Vec<CardRecord>,
    /// Theme preference.
    pub theme: Option<Theme>,
}

/// Color theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light theme.
    Light,
    /// Dark theme.
    Dark,
}

impl Theme {
    /// The theme a user gets before choosing one.
    pub const DEFAULT: Self = Self::Dark;

    /// The other theme.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    /// Lowercase name, as stored.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(Error::invalid_record(format!("unknown theme '{other}'"))),
        }
    }
}

/// A location tracked by the weather viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRef {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Country, when the geocoder reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// A business listing the user saved or blacklisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRecord {
    /// Stable identifier.
    pub id: String,
    /// Business name.
    pub name: String,
    /// What the business does.
    pub specialization: String,
    /// Website, `null` when the business has none.
    pub website: Option<String>,
    /// Phone number.
    pub contact_number: String,
    /// Street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Listing category.
    pub category: String,
    /// When the listing was last refreshed.
    pub last_updated: DateTime<Utc>,
}

/// Result of the most recent network speed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpeedTest {
    /// Download throughput in Mbps.
    pub download_speed: f64,
    /// Upload throughput in Mbps.
    pub upload_speed: f64,
    /// Round-trip latency in milliseconds.
    pub ping: f64,
    /// Latency jitter in milliseconds.
    pub jitter: f64,
    /// When the test ran.
    pub timestamp: DateTime<Utc>,
    /// How long the test took, in seconds.
    pub test_duration: f64,
}

impl UserRecord {
    /// The theme in effect: the stored preference, else [`Theme::DEFAULT`].
    #[must_use]
    pub fn effective_theme(&self) -> Theme {
        self.theme.unwrap_or(Theme::DEFAULT)
    }

    /// Switch to the other theme and remember it. Returns the new theme.
    pub fn toggle_theme(&mut self) -> Theme {
        let theme = self.effective_theme().toggled();
        self.theme = Some(theme);
        theme
    }

    /// Parse and validate a stored or imported JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not JSON of the expected shape or
    /// if any nested entry fails validation.
    pub fn from_json(raw: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(raw)?;
        record.validate()?;
        Ok(record)
    }

    /// Serialize to the compact form written to storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to the indented form used for exports.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every nested entry.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<()> {
        for location in &self.weather_locations {
            location.validate()?;
        }
        for business in self.saved_businesses.iter().chain(&self.blacklisted_businesses) {
            business.validate()?;
        }
        for medication in &self.medications {
            medication.validate()?;
        }
        for card in &self.dashboard_cards {
            card.validate()?;
        }
        if let Some(test) = &self.network_speed_test {
            test.validate()?;
        }
        Ok(())
    }

    /// Merge observed flight ids, counting only ones not seen before.
    ///
    /// Returns how many ids were new. `flight_count` grows by exactly that.
    pub fn track_flights<I, S>(&mut self, ids: I) -> u64
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for id in ids {
            if self.tracked_flight_ids.insert(id.into()) {
                added += 1;
            }
        }
        self.flight_count += added;
        added
    }

    /// Add a weather location, replacing any existing one with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the location fails validation.
    pub fn add_location(&mut self, location: LocationRef) -> Result<()> {
        location.validate()?;
        match self
            .weather_locations
            .iter_mut()
            .find(|existing| existing.id == location.id)
        {
            Some(existing) => *existing = location,
            None => self.weather_locations.push(location),
        }
        Ok(())
    }

    /// Remove a weather location. Returns whether it was present.
    pub fn remove_location(&mut self, id: &str) -> bool {
        let before = self.weather_locations.len();
        self.weather_locations.retain(|location| location.id != id);
        self.weather_locations.len() != before
    }

    /// Save businesses, skipping ids already saved. Returns how many were added.
    pub fn save_businesses(&mut self, businesses: impl IntoIterator<Item = BusinessRecord>) -> usize {
        append_unique(&mut self.saved_businesses, businesses)
    }

    /// Blacklist businesses, skipping ids already blacklisted. Returns how many were added.
    pub fn blacklist_businesses(
        &mut self,
        businesses: impl IntoIterator<Item = BusinessRecord>,
    ) -> usize {
        append_unique(&mut self.blacklisted_businesses, businesses)
    }

    /// Remove a saved business. Returns whether it was present.
    pub fn remove_saved_business(&mut self, id: &str) -> bool {
        let before = self.saved_businesses.len();
        self.saved_businesses.retain(|b| b.id != id);
        self.saved_businesses.len() != before
    }

    /// Remove a blacklisted business. Returns whether it was present.
    pub fn remove_blacklisted_business(&mut self, id: &str) -> bool {
        let before = self.blacklisted_businesses.len();
        self.blacklisted_businesses.retain(|b| b.id != id);
        self.blacklisted_businesses.len() != before
    }

    /// Whether a business with this name is blacklisted (case-insensitive).
    #[must_use]
    pub fn is_blacklisted(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.blacklisted_businesses
            .iter()
            .any(|b| b.name.to_lowercase() == name)
    }
}

fn append_unique(
    list: &mut Vec<BusinessRecord>,
    businesses: impl IntoIterator<Item = BusinessRecord>,
) -> usize {
    let mut added = 0;
    for business in businesses {
        if !list.iter().any(|existing| existing.id == business.id) {
            list.push(business);
            added += 1;
        }
    }
    added
}

impl LocationRef {
    /// Check the id and coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty id or out-of-range coordinates.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_record("weather location id must not be empty"));
        }
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::invalid_record(format!(
                "latitude {} of location {} is out of range",
                self.lat, self.id
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(Error::invalid_record(format!(
                "longitude {} of location {} is out of range",
                self.lon, self.id
            )));
        }
        Ok(())
    }
}

impl BusinessRecord {
    /// Check the id and name.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty id or name.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_record("business id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::invalid_record(format!(
                "business {} has an empty name",
                self.id
            )));
        }
        Ok(())
    }
}

impl NetworkSpeedTest {
    /// Check that every measurement is a finite, non-negative number.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first bad measurement.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("downloadSpeed", self.download_speed),
            ("uploadSpeed", self.upload_speed),
            ("ping", self.ping),
            ("jitter", self.jitter),
            ("testDuration", self.test_duration),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_record(format!(
                    "network speed test {name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

static ENTRY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate an id for a new medication or card.
///
/// Millisecond timestamp followed by a nine character base-36 suffix, the
/// same shape the dashboard generated.
#[must_use]
pub fn new_entry_id() -> String {
    let now = Utc::now();
    let sequence = ENTRY_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut hasher = blake3::Hasher::new();
    hasher.update(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(&sequence.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest.as_bytes()[..8]);
    let mut n = u64::from_le_bytes(seed);

    let mut suffix = String::with_capacity(9);
    for _ in 0..9 {
        // n % 36 < 36, so the index is always in bounds
        suffix.push(char::from(BASE36[(n % 36) as usize]));
        n /= 36;
    }

    format!("{}{suffix}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn business(id: &str, name: &str) -> BusinessRecord {
        BusinessRecord {
            id: id.to_string(),
            name: name.to_string(),
            specialization: "Bakery".to_string(),
            website: None,
            contact_number: "+356 2123 4567".to_string(),
            address: Some("Valletta".to_string()),
            email: None,
            description: None,
            category: "restaurants-cafes".to_string(),
            last_updated: "2025-06-01T10:00:00Z".parse().unwrap(),
        }
    }

    fn location(id: &str) -> LocationRef {
        LocationRef {
            id: id.to_string(),
            name: "Valletta".to_string(),
            country: Some("Malta".to_string()),
            lat: 35.8989,
            lon: 14.5146,
        }
    }

    #[test]
    fn test_default_record_serializes_with_every_field() {
        let json = UserRecord::default().to_json().unwrap();
        for field in [
            "\"flightCount\":0",
            "\"trackedFlightIds\":[]",
            "\"weatherLocations\":[]",
            "\"savedBusinesses\":[]",
            "\"blacklistedBusinesses\":[]",
            "\"medications\":[]",
            "\"lastCheckDate\":null",
            "\"networkSpeedTest\":null",
            "\"dashboardCards\":[]",
            "\"theme\":null",
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let record = UserRecord::from_json(r#"{"flightCount": 7}"#).unwrap();
        assert_eq!(record.flight_count, 7);
        assert!(record.medications.is_empty());
        assert!(record.theme.is_none());
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(UserRecord::from_json(r#"{"flightCount": "seven"}"#).is_err());
        assert!(UserRecord::from_json(r#"{"flightCount": -1}"#).is_err());
        assert!(UserRecord::from_json("[1, 2, 3]").is_err());
        assert!(UserRecord::from_json("not json").is_err());
    }

    #[test]
    fn test_rejects_invalid_nested_medication() {
        let raw = r#"{"medications": [{"id": "m1", "name": "Aspirin", "pillsPerDose": 0,
            "totalPills": 30, "currentPills": 30, "takenToday": false}]}"#;
        let err = UserRecord::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("pillsPerDose"));
    }

    #[test]
    fn test_theme_serialization() {
        let record = UserRecord {
            theme: Some(Theme::Dark),
            ..UserRecord::default()
        };
        assert!(record.to_json().unwrap().contains("\"theme\":\"dark\""));
        assert!(UserRecord::from_json(r#"{"theme": "purple"}"#).is_err());
    }

    #[test]
    fn test_toggle_theme_starts_from_dark() {
        let mut record = UserRecord::default();
        assert_eq!(record.effective_theme(), Theme::Dark);

        assert_eq!(record.toggle_theme(), Theme::Light);
        assert_eq!(record.theme, Some(Theme::Light));
        assert_eq!(record.toggle_theme(), Theme::Dark);
    }

    #[test]
    fn test_theme_from_str() {
        assert_eq!(" Light ".parse::<Theme>().unwrap(), Theme::Light);
        assert_eq!("dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert!("purple".parse::<Theme>().unwrap_err().is_invalid_record());
        assert_eq!(Theme::Light.to_string(), "light");
    }

    #[test]
    fn test_track_flights_counts_only_new_ids() {
        let mut record = UserRecord::default();
        assert_eq!(record.track_flights(["a", "b"]), 2);
        assert_eq!(record.track_flights(["b", "c", "c"]), 1);
        assert_eq!(record.flight_count, 3);
        assert_eq!(record.tracked_flight_ids.len(), 3);
    }

    #[test]
    fn test_track_flights_empty_batch() {
        let mut record = UserRecord::default();
        assert_eq!(record.track_flights(Vec::<String>::new()), 0);
        assert_eq!(record.flight_count, 0);
    }

    #[test]
    fn test_add_location_replaces_same_id() {
        let mut record = UserRecord::default();
        record.add_location(location("mt")).unwrap();

        let mut renamed = location("mt");
        renamed.name = "Sliema".to_string();
        record.add_location(renamed).unwrap();

        assert_eq!(record.weather_locations.len(), 1);
        assert_eq!(record.weather_locations[0].name, "Sliema");
    }

    #[test]
    fn test_add_location_rejects_bad_coordinates() {
        let mut record = UserRecord::default();
        let mut bad = location("x");
        bad.lat = 120.0;
        assert!(record.add_location(bad).is_err());

        let mut bad = location("y");
        bad.lon = f64::NAN;
        assert!(record.add_location(bad).is_err());
        assert!(record.weather_locations.is_empty());
    }

    #[test]
    fn test_remove_location() {
        let mut record = UserRecord::default();
        record.add_location(location("mt")).unwrap();
        assert!(record.remove_location("mt"));
        assert!(!record.remove_location("mt"));
    }

    #[test]
    fn test_save_businesses_skips_duplicates() {
        let mut record = UserRecord::default();
        assert_eq!(
            record.save_businesses([business("1", "Caffe Cordina"), business("2", "Fontanella")]),
            2
        );
        assert_eq!(record.save_businesses([business("1", "Caffe Cordina")]), 0);
        assert_eq!(record.saved_businesses.len(), 2);
    }

    #[test]
    fn test_blacklist_and_lookup_by_name() {
        let mut record = UserRecord::default();
        record.blacklist_businesses([business("9", "Big Corp Ltd")]);
        assert!(record.is_blacklisted("big corp ltd"));
        assert!(!record.is_blacklisted("Small Shop"));
        assert!(record.remove_blacklisted_business("9"));
        assert!(!record.is_blacklisted("Big Corp Ltd"));
    }

    #[test]
    fn test_remove_saved_business() {
        let mut record = UserRecord::default();
        record.save_businesses([business("1", "A")]);
        assert!(record.remove_saved_business("1"));
        assert!(!record.remove_saved_business("1"));
    }

    #[test]
    fn test_business_website_null_round_trips() {
        let mut record = UserRecord::default();
        record.save_businesses([business("1", "A")]);
        let json = record.to_json().unwrap();
        assert!(json.contains("\"website\":null"));
        assert_eq!(UserRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn test_network_speed_test_validation() {
        let mut test = NetworkSpeedTest {
            download_speed: 95.2,
            upload_speed: 20.1,
            ping: 12.0,
            jitter: 1.5,
            timestamp: Utc::now(),
            test_duration: 8.0,
        };
        assert!(test.validate().is_ok());

        test.ping = -1.0;
        assert!(test.validate().unwrap_err().to_string().contains("ping"));
    }

    #[test]
    fn test_new_entry_id_shape() {
        let id = new_entry_id();
        assert!(id.len() > 9);
        let (millis, suffix) = id.split_at(id.len() - 9);
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_new_entry_ids_are_unique() {
        let ids: BTreeSet<String> = (0..200).map(|_| new_entry_id()).collect();
        assert_eq!(ids.len(), 200);
    }
}
