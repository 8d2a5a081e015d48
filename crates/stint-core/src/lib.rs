//! Core domain model for the stint internship listing tracker.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "stint-core";

/// Job category assigned by the title classifier. The display labels are
/// stable and stored verbatim in the listings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "IT Technical Support")]
    ItTechnicalSupport,
    #[serde(rename = "Hardware Engineering")]
    HardwareEngineering,
    #[serde(rename = "Quantitative Finance")]
    QuantitativeFinance,
    #[serde(rename = "Data Science, AI & Machine Learning")]
    DataScience,
    #[serde(rename = "Product Management")]
    ProductManagement,
    #[default]
    #[serde(rename = "Software Engineering")]
    SoftwareEngineering,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ItTechnicalSupport => "IT Technical Support",
            Category::HardwareEngineering => "Hardware Engineering",
            Category::QuantitativeFinance => "Quantitative Finance",
            Category::DataScience => "Data Science, AI & Machine Learning",
            Category::ProductManagement => "Product Management",
            Category::SoftwareEngineering => "Software Engineering",
        }
    }

    /// Inverse of [`Category::as_str`]. Unknown labels map to `None`; callers
    /// reading persisted rows fall back to the default category.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "IT Technical Support" => Some(Category::ItTechnicalSupport),
            "Hardware Engineering" => Some(Category::HardwareEngineering),
            "Quantitative Finance" => Some(Category::QuantitativeFinance),
            "Data Science, AI & Machine Learning" => Some(Category::DataScience),
            "Product Management" => Some(Category::ProductManagement),
            "Software Engineering" => Some(Category::SoftwareEngineering),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical company record. `id` is store-assigned and absent until the
/// company has been persisted. Two companies whose names compare equal after
/// trimming and case-folding are the same company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub logo_url: Option<String>,
}

impl Company {
    pub fn unresolved(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: url.into(),
            logo_url: None,
        }
    }

    /// Natural key used for deduplication across runs.
    pub fn normalized_name(&self) -> String {
        normalize_company_name(&self.name)
    }
}

pub fn normalize_company_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Untyped listing record as it arrives from the feed. Missing or malformed
/// fields degrade to defaults instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawListing {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub company_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub date_posted: i64,
    #[serde(default)]
    pub date_updated: i64,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub sponsorship: String,
}

fn default_true() -> bool {
    true
}

/// Internal listing entity. Identifiers are unique across the store after
/// reconciliation; every listing references exactly one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub source: String,
    pub title: String,
    pub active: bool,
    pub date_updated: DateTime<Utc>,
    pub is_visible: bool,
    pub date_posted: DateTime<Utc>,
    pub url: String,
    pub locations: Vec<String>,
    pub terms: Vec<String>,
    pub sponsorship: String,
    pub category: Category,
    pub top_tier: bool,
    pub company: Company,
}

/// Normalize a feed epoch-seconds timestamp to a UTC instant. Out-of-range
/// values collapse to the epoch rather than failing the record.
pub fn epoch_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_round_trip() {
        for category in [
            Category::ItTechnicalSupport,
            Category::HardwareEngineering,
            Category::QuantitativeFinance,
            Category::DataScience,
            Category::ProductManagement,
            Category::SoftwareEngineering,
        ] {
            assert_eq!(Category::from_label(category.as_str()), Some(category));
        }
        assert_eq!(Category::from_label("Underwater Basket Weaving"), None);
    }

    #[test]
    fn raw_listing_tolerates_missing_fields() {
        let raw: RawListing = serde_json::from_str(r#"{"title": "SWE Intern"}"#).unwrap();
        assert_eq!(raw.title, "SWE Intern");
        assert!(raw.active);
        assert!(raw.is_visible);
        assert_eq!(raw.date_posted, 0);
        assert!(raw.locations.is_empty());
    }

    #[test]
    fn raw_listing_parses_full_record() {
        let raw: RawListing = serde_json::from_str(
            r#"{
                "id": "abc-123",
                "source": "Simplify",
                "company_name": "Stripe",
                "company_url": "https://simplify.jobs/c/Stripe",
                "title": "Software Engineer Intern",
                "active": true,
                "date_posted": 1718000000,
                "date_updated": 1718100000,
                "is_visible": true,
                "url": "https://example.com/apply",
                "locations": ["NYC", "Remote"],
                "terms": ["Summer 2026"],
                "sponsorship": "Offers Sponsorship"
            }"#,
        )
        .unwrap();
        assert_eq!(raw.id, "abc-123");
        assert_eq!(raw.locations.len(), 2);
        assert_eq!(epoch_to_utc(raw.date_posted).timestamp(), 1718000000);
    }

    #[test]
    fn company_name_normalization_folds_case_and_whitespace() {
        let a = Company::unresolved("  Google ", "https://google.com");
        let b = Company::unresolved("google", "https://google.com");
        assert_eq!(a.normalized_name(), b.normalized_name());
    }

    #[test]
    fn epoch_normalization_clamps_out_of_range() {
        assert_eq!(epoch_to_utc(i64::MAX).timestamp(), 0);
        assert_eq!(epoch_to_utc(0).timestamp(), 0);
    }
}
