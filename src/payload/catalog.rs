//! Metadata catalog lookup.
//!
//! The catalog answers either an exact info request (when the path carries
//! an embedded `{tmdb-<id>}` marker) or a fuzzy keyword search. The two
//! endpoints answer in different shapes; [`normalize`] folds them into one
//! [`CatalogRecord`], empty when nothing usable came back.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use url::Url;

use crate::config::CatalogConfig;
use crate::error::{Error, Result};

/// What to ask the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogQuery {
    /// Exact lookup by catalog code, e.g. `MT12345`.
    Info { category: String, code: String },
    /// Fuzzy keyword search.
    Search {
        category: String,
        keyword: String,
        year: i64,
    },
}

impl CatalogQuery {
    /// Build the query for an item. An embedded catalog id wins over search.
    pub fn for_item(category: &str, tmdb_id: Option<&str>, keyword: &str, year: i64) -> Self {
        match tmdb_id {
            Some(id) => {
                let prefix = if category == "movie" { "MT" } else { "FT" };
                // Episodic info lives under ftv for both domestic and foreign shows.
                let category = if category == "ktv" { "ftv" } else { category };
                CatalogQuery::Info {
                    category: category.to_string(),
                    code: format!("{prefix}{id}"),
                }
            }
            None => CatalogQuery::Search {
                category: category.to_string(),
                keyword: keyword.to_string(),
                year,
            },
        }
    }

    fn api_path(&self) -> String {
        match self {
            CatalogQuery::Info { category, .. } => format!("/metadata/api/{category}/info"),
            CatalogQuery::Search { category, .. } => format!("/metadata/api/{category}/search"),
        }
    }
}

/// Looks up raw catalog JSON. Implementations may fail; callers degrade.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn lookup(&self, query: &CatalogQuery) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Enrichment fields. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRecord {
    pub title: Option<String>,
    /// English title. Movies fall back to it when `title` is missing.
    pub title_en: Option<String>,
    pub original_title: Option<String>,
    pub year: Option<i64>,
    pub genre: Vec<String>,
    pub country: Vec<String>,
    pub poster: Option<String>,
    pub code: Option<String>,
}

impl CatalogRecord {
    /// Read a record from one catalog entry, tolerating field aliases and
    /// loose typing. Non-object values give an empty record.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let year = match obj.get("year") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        Self {
            title: first_text(obj, &["title"]),
            title_en: first_text(obj, &["title_en"]),
            original_title: first_text(obj, &["originaltitle", "title_original"]),
            year,
            genre: text_list(obj, "genre"),
            country: text_list(obj, "country"),
            poster: first_text(obj, &["main_poster", "image_url"]),
            code: first_text(obj, &["code"]),
        }
    }

    pub fn movie_title(&self) -> Option<&str> {
        self.title.as_deref().or(self.title_en.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// First non-blank string among `keys`.
fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// A list of strings, or a single string promoted to a list.
fn text_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Fold a raw catalog response into a single record.
///
/// - search results for movies and foreign shows: a list, first entry wins
/// - domestic show keyword search: `{site: entry | [entries]}`, first site wins
/// - info responses: the entry itself
pub fn normalize(raw: &Value, query: &CatalogQuery) -> CatalogRecord {
    match raw {
        Value::Array(items) => items
            .first()
            .map(CatalogRecord::from_value)
            .unwrap_or_default(),
        Value::Object(map) => {
            let ktv_search = matches!(query, CatalogQuery::Search { category, .. } if category == "ktv");
            if ktv_search {
                match map.values().next() {
                    Some(Value::Array(entries)) => entries
                        .first()
                        .map(CatalogRecord::from_value)
                        .unwrap_or_default(),
                    Some(site) => CatalogRecord::from_value(site),
                    None => CatalogRecord::default(),
                }
            } else {
                CatalogRecord::from_value(raw)
            }
        }
        _ => CatalogRecord::default(),
    }
}

// ---------------------------------------------------------------------------
// Flaskfarm metadata API
// ---------------------------------------------------------------------------

/// Catalog client for a Flaskfarm metadata server.
pub struct FlaskfarmCatalog {
    base: Url,
    apikey: SecretString,
    client: Client,
}

impl FlaskfarmCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("catalog.url: {e}")))?;
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            base,
            apikey: SecretString::from(config.apikey.expose_secret()),
            client,
        })
    }

    /// Full request URL for a query, API key included.
    pub fn request_url(&self, query: &CatalogQuery) -> Result<Url> {
        let mut url = self
            .base
            .join(&query.api_path())
            .map_err(|e| Error::Catalog(format!("bad catalog url: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("apikey", self.apikey.expose_secret())
                .append_pair("call", "plex")
                .append_pair("manual", "True");
            match query {
                CatalogQuery::Info { code, .. } => {
                    pairs.append_pair("code", code);
                }
                CatalogQuery::Search { keyword, year, .. } => {
                    pairs
                        .append_pair("keyword", keyword)
                        .append_pair("year", &year.to_string());
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl CatalogLookup for FlaskfarmCatalog {
    async fn lookup(&self, query: &CatalogQuery) -> Result<Value> {
        let url = self.request_url(query)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}
