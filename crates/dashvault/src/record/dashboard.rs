//! Dashboard card layout.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{new_entry_id, UserRecord};
use crate::error::{Error, Result};

/// One card on the dashboard grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    /// Stable identifier.
    pub id: String,
    /// Title shown in the card header.
    pub title: String,
    /// Subtitle shown under the title.
    pub description: String,
    /// Grid footprint.
    pub size: CardSize,
    /// Icon name.
    pub icon: String,
    /// Which widget the card renders.
    pub content_type: ContentType,
}

/// Grid footprint of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardSize {
    /// Two columns, one row.
    #[serde(rename = "2x1")]
    Wide,
    /// Two columns, two rows.
    #[serde(rename = "2x2")]
    Square,
}

impl fmt::Display for CardSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wide => f.write_str("2x1"),
            Self::Square => f.write_str("2x2"),
        }
    }
}

/// Widget rendered inside a card.
///
/// Tags this build does not know are kept verbatim so a newer dashboard's
/// layout survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    /// `world-clock`
    WorldClock,
    /// `network-speed`
    NetworkSpeed,
    /// `analytics`
    Analytics,
    /// `performance`
    Performance,
    /// `security`
    Security,
    /// `data-insights`
    DataInsights,
    /// `storage`
    Storage,
    /// `system-status`
    SystemStatus,
    /// Any other tag, kept as written.
    Other(String),
}

impl ContentType {
    /// The tag stored in JSON.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::WorldClock => "world-clock",
            Self::NetworkSpeed => "network-speed",
            Self::Analytics => "analytics",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::DataInsights => "data-insights",
            Self::Storage => "storage",
            Self::SystemStatus => "system-status",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for ContentType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "world-clock" => Self::WorldClock,
            "network-speed" => Self::NetworkSpeed,
            "analytics" => Self::Analytics,
            "performance" => Self::Performance,
            "security" => Self::Security,
            "data-insights" => Self::DataInsights,
            "storage" => Self::Storage,
            "system-status" => Self::SystemStatus,
            _ => Self::Other(tag),
        }
    }
}

impl From<ContentType> for String {
    fn from(content: ContentType) -> Self {
        match content {
            ContentType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A card template offered in the sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardPrefab {
    /// Card title.
    pub title: &'static str,
    /// Card subtitle.
    pub description: &'static str,
    /// Grid footprint.
    pub size: CardSize,
    /// Icon name.
    pub icon: &'static str,
    /// Content tag; also how prefabs are looked up by name.
    pub content: &'static str,
}

/// The sidebar prefabs, in sidebar order.
pub static CARD_PREFABS: [CardPrefab; 5] = [
    CardPrefab {
        title: "World Clock",
        description: "Time in different locations",
        size: CardSize::Square,
        icon: "Clock",
        content: "world-clock",
    },
    CardPrefab {
        title: "Network Speed",
        description: "Real-time upload & download monitoring",
        size: CardSize::Square,
        icon: "Wifi",
        content: "network-speed",
    },
    CardPrefab {
        title: "Analytics",
        description: "Key metrics and KPIs",
        size: CardSize::Square,
        icon: "BarChart3",
        content: "analytics",
    },
    CardPrefab {
        title: "Storage",
        description: "Usage and capacity",
        size: CardSize::Wide,
        icon: "Database",
        content: "storage",
    },
    CardPrefab {
        title: "System Status",
        description: "Health monitoring",
        size: CardSize::Wide,
        icon: "Settings",
        content: "system-status",
    },
];

impl CardPrefab {
    /// Find a prefab by its content tag.
    #[must_use]
    pub fn find(content: &str) -> Option<&'static Self> {
        CARD_PREFABS.iter().find(|prefab| prefab.content == content)
    }

    /// Instantiate the prefab with a fresh id.
    #[must_use]
    pub fn instantiate(&self) -> CardRecord {
        CardRecord {
            id: new_entry_id(),
            title: self.title.to_string(),
            description: self.description.to_string(),
            size: self.size,
            icon: self.icon.to_string(),
            content_type: ContentType::from(self.content.to_string()),
        }
    }
}

/// The layout a new dashboard starts with.
#[must_use]
pub fn default_cards() -> Vec<CardRecord> {
    const LAYOUT: [(&str, &str, &str, &str, &str); 7] = [
        ("world-clock", "World Clock", "Time in different locations", "Clock", "world-clock"),
        (
            "performance-metrics",
            "Performance",
            "System performance and trends",
            "TrendingUp",
            "performance",
        ),
        (
            "analytics-overview",
            "Analytics Overview",
            "Key metrics and insights",
            "BarChart3",
            "analytics",
        ),
        (
            "network-status",
            "Network Status",
            "Network performance monitoring",
            "Settings",
            "system-status",
        ),
        ("data-insights", "Data Insights", "AI-powered data analysis", "PieChart", "data-insights"),
        (
            "security-monitor",
            "Security Monitor",
            "System security and alerts",
            "Database",
            "security",
        ),
        (
            "network-speed",
            "Network Speed",
            "Real-time upload & download monitoring",
            "Wifi",
            "network-speed",
        ),
    ];

    LAYOUT
        .iter()
        .map(|&(id, title, description, icon, content)| CardRecord {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            size: CardSize::Square,
            icon: icon.to_string(),
            content_type: ContentType::from(content.to_string()),
        })
        .collect()
}

impl CardRecord {
    /// Check the card id.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty id.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_record("dashboard card id must not be empty"));
        }
        Ok(())
    }
}

impl UserRecord {
    /// Insert a card at `at` (clamped to the end), or append when `None`.
    ///
    /// Returns the index the card landed at.
    ///
    /// # Errors
    ///
    /// Returns an error if the card fails validation or its id is taken.
    pub fn add_card(&mut self, card: CardRecord, at: Option<usize>) -> Result<usize> {
        card.validate()?;
        if self.card_index(&card.id).is_some() {
            return Err(Error::invalid_record(format!(
                "dashboard card id {} is already in use",
                card.id
            )));
        }
        Ok(insert_clamped(&mut self.dashboard_cards, card, at))
    }

    /// Add a new card from a sidebar prefab. Returns the new card's id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no prefab has this content tag.
    pub fn add_prefab_card(&mut self, content: &str, at: Option<usize>) -> Result<String> {
        let prefab = CardPrefab::find(content).ok_or_else(|| Error::not_found("card prefab", content))?;
        let card = prefab.instantiate();
        let id = card.id.clone();
        self.add_card(card, at)?;
        Ok(id)
    }

    /// Append a copy of a card with a fresh id and " (Copy)" appended to
    /// its title. Returns the copy's id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if the card does not exist.
    pub fn duplicate_card(&mut self, id: &str) -> Result<String> {
        let original = self
            .card_index(id)
            .map(|index| &self.dashboard_cards[index])
            .ok_or_else(|| Error::not_found("dashboard card", id))?;

        let copy = CardRecord {
            id: new_entry_id(),
            title: format!("{} (Copy)", original.title),
            ..original.clone()
        };
        let copy_id = copy.id.clone();
        self.dashboard_cards.push(copy);
        Ok(copy_id)
    }

    /// Rename a card. The title is trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed title is empty or the card does not
    /// exist.
    pub fn rename_card(&mut self, id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::invalid_record("card title must not be empty"));
        }
        let card = self
            .dashboard_cards
            .iter_mut()
            .find(|card| card.id == id)
            .ok_or_else(|| Error::not_found("dashboard card", id))?;
        card.title = title.to_string();
        Ok(())
    }

    /// Remove a card. Returns whether it was present.
    pub fn remove_card(&mut self, id: &str) -> bool {
        let before = self.dashboard_cards.len();
        self.dashboard_cards.retain(|card| card.id != id);
        self.dashboard_cards.len() != before
    }

    /// Move a card. The card is taken out first, then inserted at `to` in
    /// the shortened list (clamped), or appended when `to` is `None`.
    ///
    /// Returns the card's new index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if the card does not exist.
    pub fn move_card(&mut self, id: &str, to: Option<usize>) -> Result<usize> {
        let from = self
            .card_index(id)
            .ok_or_else(|| Error::not_found("dashboard card", id))?;
        let card = self.dashboard_cards.remove(from);
        Ok(insert_clamped(&mut self.dashboard_cards, card, to))
    }

    /// Replace the layout with the default cards.
    pub fn reset_cards(&mut self) {
        self.dashboard_cards = default_cards();
    }

    fn card_index(&self, id: &str) -> Option<usize> {
        self.dashboard_cards.iter().position(|card| card.id == id)
    }
}

fn insert_clamped(cards: &mut Vec<CardRecord>, card: CardRecord, at: Option<usize>) -> usize {
    let index = at.map_or(cards.len(), |at| at.min(cards.len()));
    cards.insert(index, card);
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record() -> UserRecord {
        UserRecord {
            dashboard_cards: default_cards(),
            ..UserRecord::default()
        }
    }

    fn ids(record: &UserRecord) -> Vec<&str> {
        record.dashboard_cards.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_default_layout() {
        let cards = default_cards();
        assert_eq!(cards.len(), 7);
        assert_eq!(cards[0].id, "world-clock");
        assert_eq!(cards[3].content_type, ContentType::SystemStatus);
        assert!(cards.iter().all(|c| c.size == CardSize::Square));
    }

    #[test]
    fn test_card_json_shape() {
        let json = serde_json::to_string(&default_cards()[1]).unwrap();
        assert!(json.contains("\"size\":\"2x2\""));
        assert!(json.contains("\"contentType\":\"performance\""));
        assert!(json.contains("\"icon\":\"TrendingUp\""));
    }

    #[test]
    fn test_unknown_content_type_is_preserved() {
        let raw = r#"{"id":"x","title":"Radar","description":"","size":"2x1","icon":"Plane","contentType":"flight-radar"}"#;
        let card: CardRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(card.content_type, ContentType::Other("flight-radar".to_string()));
        assert!(serde_json::to_string(&card).unwrap().contains("\"flight-radar\""));
    }

    #[test]
    fn test_unknown_size_is_rejected() {
        let raw = r#"{"id":"x","title":"T","description":"","size":"3x3","icon":"Clock","contentType":"storage"}"#;
        assert!(serde_json::from_str::<CardRecord>(raw).is_err());
    }

    #[test]
    fn test_add_prefab_card_appends_or_inserts() {
        let mut record = create_test_record();
        let id = record.add_prefab_card("storage", None).unwrap();
        assert_eq!(record.dashboard_cards.last().unwrap().id, id);
        assert_eq!(record.dashboard_cards.last().unwrap().size, CardSize::Wide);

        let id = record.add_prefab_card("world-clock", Some(1)).unwrap();
        assert_eq!(record.dashboard_cards[1].id, id);

        let id = record.add_prefab_card("analytics", Some(100)).unwrap();
        assert_eq!(record.dashboard_cards.last().unwrap().id, id);
    }

    #[test]
    fn test_add_unknown_prefab() {
        let mut record = create_test_record();
        assert!(matches!(
            record.add_prefab_card("weather", None),
            Err(Error::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_card() {
        let mut record = create_test_record();
        let copy_id = record.duplicate_card("world-clock").unwrap();
        let copy = record.dashboard_cards.last().unwrap();
        assert_eq!(copy.id, copy_id);
        assert_eq!(copy.title, "World Clock (Copy)");
        assert_eq!(copy.content_type, ContentType::WorldClock);
        assert!(record.duplicate_card("missing").is_err());
    }

    #[test]
    fn test_rename_card_trims() {
        let mut record = create_test_record();
        record.rename_card("world-clock", "  Clocks  ").unwrap();
        assert_eq!(record.dashboard_cards[0].title, "Clocks");

        assert!(record.rename_card("world-clock", "   ").is_err());
        assert_eq!(record.dashboard_cards[0].title, "Clocks");
    }

    #[test]
    fn test_remove_card() {
        let mut record = create_test_record();
        assert!(record.remove_card("security-monitor"));
        assert!(!record.remove_card("security-monitor"));
        assert_eq!(record.dashboard_cards.len(), 6);
    }

    #[test]
    fn test_move_card_index_applies_after_removal() {
        let mut record = create_test_record();
        // [world-clock, performance-metrics, analytics-overview, ...]
        let index = record.move_card("world-clock", Some(2)).unwrap();
        assert_eq!(index, 2);
        assert_eq!(
            &ids(&record)[..3],
            ["performance-metrics", "analytics-overview", "world-clock"]
        );
    }

    #[test]
    fn test_move_card_to_end() {
        let mut record = create_test_record();
        record.move_card("world-clock", None).unwrap();
        assert_eq!(ids(&record).last(), Some(&"world-clock"));

        record.move_card("performance-metrics", Some(99)).unwrap();
        assert_eq!(ids(&record).last(), Some(&"performance-metrics"));
        assert_eq!(record.dashboard_cards.len(), 7);
    }

    #[test]
    fn test_move_missing_card() {
        let mut record = create_test_record();
        assert!(record.move_card("nope", Some(0)).is_err());
    }

    #[test]
    fn test_add_card_rejects_duplicate_id() {
        let mut record = create_test_record();
        let card = record.dashboard_cards[0].clone();
        assert!(record.add_card(card, None).is_err());
    }

    #[test]
    fn test_reset_cards() {
        let mut record = create_test_record();
        record.dashboard_cards.clear();
        record.reset_cards();
        assert_eq!(record.dashboard_cards, default_cards());
    }
}
