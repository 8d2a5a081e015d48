//! Feed acquisition and company logo scraping.
//!
//! The upstream feed is partitioned by season year. One fetch walks the
//! candidate years newest-first and returns the first batch that parses;
//! no partial merging across years.

use std::time::Duration;

use anyhow::Context;
use chrono::{Datelike, Utc};
use scraper::{Html, Selector};
use stint_core::RawListing;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CRATE_NAME: &str = "stint-feed";

/// Year-parameterized feed endpoint; `{year}` is substituted per candidate.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str =
    "https://api.github.com/repos/SimplifyJobs/Summer{year}-Internships/contents/.github/scripts/listings.json";

/// Only company pages under this prefix are considered scrapeable.
pub const SCRAPEABLE_COMPANY_PREFIX: &str = "https://simplify.jobs/c/";

/// How many season years to probe, newest first, starting one year ahead of
/// the current calendar year.
const CANDIDATE_YEAR_COUNT: i32 = 3;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub endpoint_template: String,
    pub github_token: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
            github_token: None,
            user_agent: "stint-bot/0.1".to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

impl FeedConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint_template: std::env::var("STINT_FEED_ENDPOINT")
                .unwrap_or(defaults.endpoint_template),
            github_token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            user_agent: std::env::var("STINT_USER_AGENT").unwrap_or(defaults.user_agent),
            timeout: std::env::var("STINT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("no feed available for any candidate season year")]
    NoFeedAvailable,
}

/// Ordered candidate season years: one year ahead of `current`, walking
/// backward. Consumed until the first successful response.
pub fn candidate_years(current: i32) -> impl Iterator<Item = i32> {
    (0..CANDIDATE_YEAR_COUNT).map(move |offset| current + 1 - offset)
}

#[derive(Debug)]
pub struct FeedClient {
    client: reqwest::Client,
    config: FeedConfig,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building feed http client")?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(FeedConfig::from_env())
    }

    fn url_for_year(&self, year: i32) -> String {
        self.config
            .endpoint_template
            .replace("{year}", &year.to_string())
    }

    /// Fetch one season's raw listing batch. A failed request, non-success
    /// status, or unparseable body for a candidate year means "try the next
    /// year"; only exhausting every candidate fails.
    pub async fn fetch(&self) -> Result<Vec<RawListing>, FeedError> {
        for year in candidate_years(Utc::now().year()) {
            let url = self.url_for_year(year);
            let mut request = self
                .client
                .get(&url)
                .header("Accept", "application/vnd.github.raw+json");
            if let Some(token) = &self.config.github_token {
                request = request.bearer_auth(token);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(year, %url, error = %err, "feed request failed, trying previous year");
                    continue;
                }
            };
            if !response.status().is_success() {
                debug!(year, status = %response.status(), "feed year not available");
                continue;
            }

            let body = match response.bytes().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(year, error = %err, "reading feed body failed, trying previous year");
                    continue;
                }
            };
            match serde_json::from_slice::<Vec<RawListing>>(&body) {
                Ok(listings) => {
                    info!(year, count = listings.len(), "fetched feed batch");
                    return Ok(listings);
                }
                Err(err) => {
                    warn!(year, error = %err, "feed body did not parse as a listing array");
                    continue;
                }
            }
        }
        Err(FeedError::NoFeedAvailable)
    }

    /// Best-effort logo scrape from a company homepage. Non-scrapeable URLs,
    /// network errors, and missing images all yield `None`; a missing logo is
    /// never an error.
    pub async fn scrape_company_logo(&self, company_name: &str, company_url: &str) -> Option<String> {
        if !company_url.starts_with(SCRAPEABLE_COMPANY_PREFIX) {
            return None;
        }

        let response = match self.client.get(company_url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(company = company_name, error = %err, "logo page fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(company = company_name, status = %response.status(), "logo page unavailable");
            return None;
        }
        let html = response.text().await.ok()?;
        extract_logo_url(&html, company_name)
    }
}

/// Pull the logo URL out of company page HTML: the `src` of the first `<img>`
/// whose alt text equals the company name.
pub fn extract_logo_url(html: &str, company_name: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("img").ok()?;
    document
        .select(&selector)
        .find(|img| img.value().attr("alt") == Some(company_name))
        .and_then(|img| img.value().attr("src"))
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_years_walk_backward_from_next_year() {
        let years: Vec<i32> = candidate_years(2026).collect();
        assert_eq!(years, vec![2027, 2026, 2025]);
    }

    #[test]
    fn url_substitutes_season_year() {
        let client = FeedClient::new(FeedConfig::default()).unwrap();
        let url = client.url_for_year(2027);
        assert!(url.contains("Summer2027-Internships"));
        assert!(!url.contains("{year}"));
    }

    #[test]
    fn logo_extraction_matches_alt_text_exactly() {
        let html = r#"
            <html><body>
              <img alt="Sponsor Banner" src="https://cdn.example.com/banner.png">
              <img alt="Ramp" src="https://cdn.example.com/ramp-logo.png">
            </body></html>
        "#;
        assert_eq!(
            extract_logo_url(html, "Ramp").as_deref(),
            Some("https://cdn.example.com/ramp-logo.png")
        );
        assert_eq!(extract_logo_url(html, "ramp"), None);
        assert_eq!(extract_logo_url(html, "Stripe"), None);
    }

    #[test]
    fn logo_extraction_handles_imageless_pages() {
        assert_eq!(extract_logo_url("<html><body>no images</body></html>", "Ramp"), None);
    }

    #[tokio::test]
    async fn scrape_skips_non_scrapeable_company_urls() {
        let client = FeedClient::new(FeedConfig::default()).unwrap();
        let logo = client
            .scrape_company_logo("Acme Corp", "https://acme.example.com")
            .await;
        assert_eq!(logo, None);
    }
}
