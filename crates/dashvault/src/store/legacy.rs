//! Import of pre-namespacing data.
//!
//! Before per-user records existed each dashboard widget kept its own
//! top-level key. Migration folds those keys into a [`UserRecord`]. Keys are
//! handled independently: one that fails to parse is logged and left where
//! it is, the others still migrate.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{BusinessRecord, LocationRef, MedicationRecord, NetworkSpeedTest, UserRecord};
use crate::substrate::KeyValueStore;

/// Flight counter, a decimal integer string.
pub const TOTAL_FLIGHTS_KEY: &str = "totalFlightsTracked";
/// JSON array of flight ids already counted.
pub const TRACKED_FLIGHTS_KEY: &str = "trackedFlightIds";
/// Weather viewer state, `{"locations": [...]}`.
pub const WEATHER_KEY: &str = "weather-tracker-data";
/// JSON array of saved businesses.
pub const SAVED_BUSINESSES_KEY: &str = "saved-businesses";
/// JSON array of blacklisted businesses.
pub const BLACKLISTED_BUSINESSES_KEY: &str = "blacklisted-businesses";
/// JSON array of medications.
pub const MEDICATIONS_KEY: &str = "medication-tracker-data";
/// Raw day stamp of the last medication reset.
pub const LAST_CHECK_KEY: &str = "last-check-date";
/// Last network speed test, a JSON object.
pub const SPEED_TEST_KEY: &str = "network-speed-test";

/// Every legacy key, in the order migration visits them.
pub const LEGACY_KEYS: [&str; 8] = [
    TOTAL_FLIGHTS_KEY,
    TRACKED_FLIGHTS_KEY,
    WEATHER_KEY,
    SAVED_BUSINESSES_KEY,
    BLACKLISTED_BUSINESSES_KEY,
    MEDICATIONS_KEY,
    LAST_CHECK_KEY,
    SPEED_TEST_KEY,
];

/// What a migration pass found.
#[derive(Debug, Clone, Default)]
pub(crate) struct Collected {
    pub record: UserRecord,
    /// Keys whose values were applied; safe to delete once the record is saved.
    pub migrated: Vec<&'static str>,
    /// Keys present but unusable.
    pub skipped: Vec<&'static str>,
}

#[derive(Deserialize)]
struct LegacyWeather {
    #[serde(default)]
    locations: Option<Vec<LocationRef>>,
}

/// Read the legacy keys and apply them over `base`.
///
/// Nothing is deleted here; see [`remove_migrated`].
pub(crate) fn collect(substrate: &dyn KeyValueStore, base: UserRecord) -> Collected {
    let mut collected = Collected {
        record: base,
        ..Collected::default()
    };

    for key in LEGACY_KEYS {
        let raw = match substrate.read(key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => continue,
            Err(e) => {
                warn!(key, error = %e, "Could not read legacy key, skipping");
                collected.skipped.push(key);
                continue;
            }
        };

        match apply(key, &raw, &mut collected.record) {
            Ok(()) => {
                debug!(key, "Migrated legacy key");
                collected.migrated.push(key);
            }
            Err(e) => {
                warn!(key, error = %e, "Legacy value is unusable, leaving it in place");
                collected.skipped.push(key);
            }
        }
    }

    collected
}

/// Delete legacy keys that were folded into a saved record.
///
/// Deletion failures are logged; the data is already safe in the record.
pub(crate) fn remove_migrated(substrate: &dyn KeyValueStore, keys: &[&'static str]) {
    for key in keys {
        if let Err(e) = substrate.delete(key) {
            warn!(key, error = %e, "Failed to remove migrated legacy key");
        }
    }
}

/// Legacy keys currently present.
pub(crate) fn present(substrate: &dyn KeyValueStore) -> Result<Vec<&'static str>> {
    let mut found = Vec::new();
    for key in LEGACY_KEYS {
        if substrate.read(key)?.is_some_and(|raw| !raw.is_empty()) {
            found.push(key);
        }
    }
    Ok(found)
}

fn apply(key: &str, raw: &str, record: &mut UserRecord) -> Result<()> {
    match key {
        TOTAL_FLIGHTS_KEY => record.flight_count = parse_count(raw)?,
        TRACKED_FLIGHTS_KEY => {
            let ids: Vec<String> = parse(raw)?;
            record.tracked_flight_ids = ids.into_iter().collect::<BTreeSet<_>>();
        }
        WEATHER_KEY => {
            let weather: LegacyWeather = parse(raw)?;
            let locations = weather.locations.unwrap_or_default();
            for location in &locations {
                location.validate()?;
            }
            record.weather_locations = locations;
        }
        SAVED_BUSINESSES_KEY => record.saved_businesses = parse_businesses(raw)?,
        BLACKLISTED_BUSINESSES_KEY => record.blacklisted_businesses = parse_businesses(raw)?,
        MEDICATIONS_KEY => {
            let medications: Option<Vec<MedicationRecord>> = parse(raw)?;
            let medications = medications.unwrap_or_default();
            for medication in &medications {
                medication.validate()?;
            }
            record.medications = medications;
        }
        LAST_CHECK_KEY => record.last_check_date = Some(raw.to_string()),
        SPEED_TEST_KEY => {
            let test: Option<NetworkSpeedTest> = parse(raw)?;
            if let Some(test) = &test {
                test.validate()?;
            }
            record.network_speed_test = test;
        }
        _ => return Err(Error::internal(format!("no migration for key {key}"))),
    }
    Ok(())
}

fn parse<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

fn parse_businesses(raw: &str) -> Result<Vec<BusinessRecord>> {
    let businesses: Option<Vec<BusinessRecord>> = parse(raw)?;
    let businesses = businesses.unwrap_or_default();
    for business in &businesses {
        business.validate()?;
    }
    Ok(businesses)
}

/// Accepts integers and, as the dashboard sometimes wrote, whole-valued
/// decimals such as `"12.0"`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_count(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    if let Ok(count) = trimmed.parse::<u64>() {
        return Ok(count);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 => Ok(value as u64),
        _ => Err(Error::invalid_record(format!(
            "flight count {trimmed:?} is not a non-negative integer"
        ))),
    }
}
