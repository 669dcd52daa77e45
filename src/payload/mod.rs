//! Payload construction: classify an event and build the JSON document the
//! receiving side expects.
//!
//! Filesystem changes map directly onto a fixed envelope. Downloader items
//! are classified by path, titled from the file name, enriched from the
//! catalog, and rendered as either a movie or a vod document. Every output
//! field carries a typed default, so missing upstream data never drops a key.

pub mod catalog;
pub mod release;

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use opentelemetry::KeyValue;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PayloadConfig;
use crate::model::{Event, EventKind, ScanMode};
use crate::telemetry::metrics;
use catalog::{CatalogLookup, CatalogQuery, CatalogRecord};
use release::{ReleaseInfo, ReleaseParser};

/// Season/episode marker; the file title is everything before it.
static EPISODE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[S\d]*E\d+").expect("valid regex"));
static TITLE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.\s]+").expect("valid regex"));
static TMDB_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{tmdb-(\d+)\}").expect("valid regex"));
static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{6}").expect("valid regex"));

const UNKNOWN: &str = "Unknown";
const DEFAULT_YEAR: i64 = 1900;
const DOWNLOADER_T1: &str = "bot_downloader";

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// A document ready to be serialized and encrypted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Gds(GdsPayload),
    Movie(MoviePayload),
    Vod(VodPayload),
}

impl Payload {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GdsPayload {
    pub t1: &'static str,
    pub t2: &'static str,
    pub t3: &'static str,
    pub data: GdsData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GdsData {
    pub gds_path: String,
    pub scan_mode: ScanMode,
    pub count: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoviePayload {
    pub t1: &'static str,
    pub t2: String,
    pub data: MovieData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieData {
    /// Shelf classification: latest, domestic, foreign or unknown.
    pub ca: String,
    pub count: u64,
    pub folderid: String,
    pub foldername: String,
    pub meta: MovieMeta,
    pub size: u64,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieMeta {
    pub code: String,
    pub country: Vec<String>,
    pub genre: Vec<String>,
    pub originaltitle: String,
    pub poster: String,
    pub title: String,
    pub year: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VodPayload {
    pub t1: &'static str,
    pub t2: String,
    pub data: VodData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VodData {
    pub f: String,
    pub id: String,
    pub meta: VodMeta,
    pub s: u64,
    pub c: u64,
    pub vod: VodInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VodMeta {
    pub code: String,
    pub genre: String,
    pub poster: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VodInfo {
    /// Six-digit broadcast date from the file name, or empty.
    pub date: String,
    pub name: String,
    pub no: u32,
    pub quality: String,
    pub release: String,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds payload documents from events.
pub struct PayloadBuilder {
    config: PayloadConfig,
    parser: Arc<dyn ReleaseParser>,
    catalog: Arc<dyn CatalogLookup>,
    lookup_timeout: Duration,
}

impl PayloadBuilder {
    pub fn new(
        config: PayloadConfig,
        parser: Arc<dyn ReleaseParser>,
        catalog: Arc<dyn CatalogLookup>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            config,
            parser,
            catalog,
            lookup_timeout,
        }
    }

    /// Build the document for one event.
    ///
    /// Catalog failures degrade to an empty record; nothing here fails.
    pub async fn build(&self, event: &Event) -> Payload {
        match &event.kind {
            EventKind::FilesystemChange { mode } => Payload::Gds(GdsPayload {
                t1: "gds_tool",
                t2: "fp",
                t3: "user",
                data: GdsData {
                    gds_path: event.path.clone(),
                    scan_mode: *mode,
                    count: event.file_count,
                    size: event.total_size,
                },
            }),
            EventKind::DownloaderItem { item } => self.build_downloader(event, item).await,
        }
    }

    async fn build_downloader(&self, event: &Event, item: &str) -> Payload {
        let path = Path::new(&event.path);
        let (category, module) = self.classify(path);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let parsed = self.parser.parse(stem);
        let file_title = file_title(path, &parsed);
        let year = parsed.year.unwrap_or(DEFAULT_YEAR);
        debug!(%category, %file_title, year, "classified downloader item");

        let tmdb_id = TMDB_MARKER
            .captures(&event.path)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());
        let query = CatalogQuery::for_item(category, tmdb_id, &file_title, year);
        let record = self.fetch_record(&query, &event.path).await;

        if category == "movie" {
            Payload::Movie(self.movie_payload(&record, path, item, module, file_title, event))
        } else {
            Payload::Vod(self.vod_payload(&record, path, item, module, file_title, &parsed, event))
        }
    }

    /// Ordered prefix rules; first match wins.
    pub fn classify(&self, path: &Path) -> (&str, &str) {
        self.config
            .category_rules
            .iter()
            .find(|rule| path.starts_with(&rule.prefix))
            .map(|rule| (rule.category.as_str(), rule.module.as_str()))
            .unwrap_or((
                self.config.default_category.as_str(),
                self.config.default_module.as_str(),
            ))
    }

    async fn fetch_record(&self, query: &CatalogQuery, path: &str) -> CatalogRecord {
        let lookup = tokio::time::timeout(self.lookup_timeout, self.catalog.lookup(query)).await;
        let (record, result) = match lookup {
            Ok(Ok(raw)) => (catalog::normalize(&raw, query), "ok"),
            Ok(Err(e)) => {
                warn!(%path, error = %e, "metadata fetch failed");
                (CatalogRecord::default(), "error")
            }
            Err(_) => {
                warn!(%path, timeout = ?self.lookup_timeout, "metadata fetch timed out");
                (CatalogRecord::default(), "timeout")
            }
        };
        metrics::catalog_lookups().add(1, &[KeyValue::new("result", result)]);
        record
    }

    /// First directory below a configured genre root, or "Unknown".
    pub fn genre_from_path(&self, path: &Path) -> String {
        self.config
            .genre_roots
            .iter()
            .filter_map(|root| path.strip_prefix(root).ok())
            .filter_map(|rest| rest.components().next())
            .filter_map(|c| c.as_os_str().to_str())
            .next()
            .unwrap_or(UNKNOWN)
            .to_string()
    }

    fn poster(&self, record: &CatalogRecord) -> String {
        record
            .poster
            .clone()
            .unwrap_or_else(|| self.config.no_poster.clone())
    }

    fn movie_payload(
        &self,
        record: &CatalogRecord,
        path: &Path,
        item: &str,
        module: &str,
        file_title: String,
        event: &Event,
    ) -> MoviePayload {
        let ca = if path.starts_with(&self.config.latest_root) {
            "최신"
        } else if record.country.is_empty() {
            UNKNOWN
        } else if record
            .country
            .iter()
            .any(|c| self.config.korea_names.contains(c))
        {
            "한국"
        } else {
            "외국"
        };
        let genre = if record.genre.is_empty() {
            vec![self.genre_from_path(path)]
        } else {
            record.genre.clone()
        };

        MoviePayload {
            t1: DOWNLOADER_T1,
            t2: module.to_string(),
            data: MovieData {
                ca: ca.to_string(),
                count: event.file_count,
                folderid: item.to_string(),
                foldername: file_name(path),
                meta: MovieMeta {
                    code: record.code.clone().unwrap_or_else(|| UNKNOWN.into()),
                    country: record.country.clone(),
                    genre,
                    originaltitle: record.original_title.clone().unwrap_or_default(),
                    poster: self.poster(record),
                    title: record.movie_title().unwrap_or(UNKNOWN).to_string(),
                    year: record.year.unwrap_or(DEFAULT_YEAR),
                },
                size: event.total_size,
                subject: file_title,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn vod_payload(
        &self,
        record: &CatalogRecord,
        path: &Path,
        item: &str,
        module: &str,
        file_title: String,
        parsed: &ReleaseInfo,
        event: &Event,
    ) -> VodPayload {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let date = DATE_TOKEN
            .find(stem)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let genre = record
            .genre
            .first()
            .cloned()
            .unwrap_or_else(|| self.genre_from_path(path));
        let quality = parsed
            .resolution
            .as_deref()
            .map(|r| r.trim_matches('p'))
            .filter(|r| !r.is_empty())
            .or(parsed.quality.as_deref())
            .unwrap_or_default()
            .to_string();

        VodPayload {
            t1: DOWNLOADER_T1,
            t2: module.to_string(),
            data: VodData {
                f: file_name(path),
                id: item.to_string(),
                meta: VodMeta {
                    code: record.code.clone().unwrap_or_else(|| UNKNOWN.into()),
                    genre,
                    poster: self.poster(record),
                    title: record.title.clone().unwrap_or_else(|| UNKNOWN.into()),
                },
                s: event.total_size,
                c: event.file_count,
                vod: VodInfo {
                    date,
                    name: file_title,
                    no: parsed.episode.unwrap_or(0),
                    quality,
                    release: parsed.encoder.clone().unwrap_or_default(),
                },
            },
        }
    }
}

/// Title from the file name: tokens before the episode marker, or the
/// parser's title when the name carries no marker.
pub fn file_title(path: &Path, parsed: &ReleaseInfo) -> String {
    let name = file_name(path);
    match EPISODE_MARKER.find(&name) {
        Some(marker) => TITLE_SEPARATORS
            .split(&name[..marker.start()])
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        None => parsed
            .title
            .as_deref()
            .unwrap_or_default()
            .trim_matches('.')
            .to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
