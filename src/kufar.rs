//! Kufar rental search API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SearchQuery;
use crate::errors::FetchError;
use crate::listing_model::{RawListing, RawPrice};
use crate::pipeline::ListingSource;

/// Kufar category id for long-term flat rentals
const RENTAL_CATEGORY: &str = "1010";
const USER_AGENT: &str = concat!("flat-alerts/", env!("CARGO_PKG_VERSION"));
const REFERER_URL: &str = "https://re.kufar.by/";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    ads: Vec<KufarAd>,
}

#[derive(Debug, Deserialize)]
struct KufarAd {
    ad_id: Option<Value>,
    subject: Option<String>,
    price_byn: Option<Value>,
    ad_link: Option<String>,
    location: Option<KufarLocation>,
    #[serde(default)]
    ad_parameters: Vec<AdParameter>,
}

#[derive(Debug, Deserialize)]
struct KufarLocation {
    metro: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AdParameter {
    p: String,
    vl: Option<Value>,
}

/// Listing source backed by the Kufar search API
#[derive(Debug, Clone)]
pub struct KufarSource {
    client: reqwest::Client,
}

impl KufarSource {
    pub fn new(request_timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ListingSource for KufarSource {
    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<RawListing>, FetchError> {
        let params = [
            ("lang", "ru".to_string()),
            ("size", query.page_size.to_string()),
            ("cat", RENTAL_CATEGORY.to_string()),
            ("cur", "BYR".to_string()),
            (
                "gtsy",
                format!("country-belarus~province-minsk~locality-{}", query.city),
            ),
            ("rnt", "1".to_string()),
        ];

        let response = self
            .client
            .get(&query.api_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        let listings = parse_search_response(&body)?;
        debug!(count = listings.len(), city = %query.city, "Fetched Kufar listings");
        Ok(listings)
    }
}

/// Map a search response body into raw listings.
///
/// Ads without an id are dropped. Prices arrive in kopecks; anything that is
/// not a plain integer is kept as text and left to price normalization.
pub fn parse_search_response(body: &str) -> Result<Vec<RawListing>, FetchError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let listings = response
        .ads
        .into_iter()
        .filter_map(|ad| {
            let Some(external_id) = ad.ad_id.as_ref().and_then(value_text) else {
                warn!(title = ?ad.subject, "Dropping Kufar ad without an id");
                return None;
            };

            let price = match ad.price_byn.as_ref().and_then(value_text) {
                Some(raw) => match raw.parse::<i64>() {
                    Ok(kopecks) => RawPrice::MinorUnits(kopecks),
                    Err(_) => RawPrice::Text(raw),
                },
                None => RawPrice::Text(String::new()),
            };

            let metro_label = ad
                .location
                .as_ref()
                .and_then(|location| location.metro.as_ref())
                .and_then(value_text)
                .or_else(|| {
                    ad.ad_parameters
                        .iter()
                        .find(|param| param.p == "metro")
                        .and_then(|param| param.vl.as_ref())
                        .and_then(value_text)
                });

            Some(RawListing {
                external_id,
                title: ad.subject.unwrap_or_default(),
                price,
                metro_label,
                link: ad.ad_link.unwrap_or_default(),
            })
        })
        .collect();

    Ok(listings)
}

/// Text form of a scalar or list JSON value; `None` when empty
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };
    (!text.is_empty()).then_some(text)
}
