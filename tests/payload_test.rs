//! Integration tests for payload classification, enrichment and defaults.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_rs::config::PayloadConfig;
use relay_rs::error::{Error, Result};
use relay_rs::model::{Event, ScanMode};
use relay_rs::payload::catalog::{CatalogLookup, CatalogQuery};
use relay_rs::payload::release::PatternParser;
use relay_rs::payload::PayloadBuilder;
use serde_json::{Value, json};

const NO_POSTER: &str = "https://dummyimage.com/200x300/000/fff.jpg&text=No+Image";

/// Catalog returning one canned answer after an optional delay.
struct FakeCatalog {
    answer: std::result::Result<Value, String>,
    delay: Duration,
    queries: Mutex<Vec<CatalogQuery>>,
}

impl FakeCatalog {
    fn answering(answer: Value) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(answer),
            delay: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: Err("connection refused".into()),
            delay: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(json!([{ "title": "Too Late" }])),
            delay,
            queries: Mutex::new(Vec::new()),
        })
    }

    fn queries(&self) -> Vec<CatalogQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogLookup for FakeCatalog {
    async fn lookup(&self, query: &CatalogQuery) -> Result<Value> {
        self.queries.lock().unwrap().push(query.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone().map_err(Error::Catalog)
    }
}

fn builder(catalog: Arc<FakeCatalog>) -> PayloadBuilder {
    PayloadBuilder::new(
        PayloadConfig::default(),
        Arc::new(PatternParser),
        catalog,
        Duration::from_secs(5),
    )
}

async fn build(catalog: Arc<FakeCatalog>, event: &Event) -> Value {
    let payload = builder(catalog).build(event).await;
    serde_json::to_value(&payload).unwrap()
}

// ---------------------------------------------------------------------------
// Filesystem changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gds_payload_has_fixed_envelope() {
    let catalog = FakeCatalog::answering(json!([]));
    let event = Event::filesystem("/ROOT/GDRIVE/x", ScanMode::RemoveFolder).total_size(42);

    let payload = builder(Arc::clone(&catalog)).build(&event).await;

    assert_eq!(
        payload.to_json().unwrap(),
        r#"{"t1":"gds_tool","t2":"fp","t3":"user","data":{"gds_path":"/ROOT/GDRIVE/x","scan_mode":"REMOVE_FOLDER","count":1,"size":42}}"#
    );
    assert!(catalog.queries().is_empty());
}

// ---------------------------------------------------------------------------
// Movies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn movie_with_empty_record_gets_every_default() {
    let catalog = FakeCatalog::answering(json!([]));
    let event = Event::downloader(
        "/ROOT/GDRIVE/VIDEO/영화/외국/Some.Movie.2021.1080p.BluRay-GRP.mkv",
        "item-1",
    );

    let doc = build(Arc::clone(&catalog), &event).await;

    assert_eq!(
        doc,
        json!({
            "t1": "bot_downloader",
            "t2": "share_movie",
            "data": {
                "ca": "Unknown",
                "count": 1,
                "folderid": "item-1",
                "foldername": "Some.Movie.2021.1080p.BluRay-GRP.mkv",
                "meta": {
                    "code": "Unknown",
                    "country": [],
                    "genre": ["Unknown"],
                    "originaltitle": "",
                    "poster": NO_POSTER,
                    "title": "Unknown",
                    "year": 1900
                },
                "size": 0,
                "subject": "Some Movie"
            }
        })
    );
    assert_eq!(
        catalog.queries(),
        vec![CatalogQuery::Search {
            category: "movie".into(),
            keyword: "Some Movie".into(),
            year: 2021,
        }]
    );
}

#[tokio::test]
async fn movie_shelf_follows_path_then_country() {
    let korean = FakeCatalog::answering(json!([{
        "title": "기생충",
        "originaltitle": "Parasite",
        "year": 2019,
        "country": ["한국"],
        "genre": ["드라마"],
        "main_poster": "https://img/p.jpg",
        "code": "MT496243"
    }]));
    let event = Event::downloader("/ROOT/GDRIVE/VIDEO/영화/한국/기생충.2019.mkv", "i");
    let doc = build(korean, &event).await;
    assert_eq!(doc["data"]["ca"], "한국");
    assert_eq!(doc["data"]["meta"]["title"], "기생충");
    assert_eq!(doc["data"]["meta"]["originaltitle"], "Parasite");
    assert_eq!(doc["data"]["meta"]["year"], 2019);
    assert_eq!(doc["data"]["meta"]["genre"], json!(["드라마"]));
    assert_eq!(doc["data"]["meta"]["poster"], "https://img/p.jpg");

    let foreign = FakeCatalog::answering(json!([{ "title": "Dune", "country": ["미국"] }]));
    let event = Event::downloader("/ROOT/GDRIVE/VIDEO/영화/외국/Dune.2021.mkv", "i");
    assert_eq!(build(foreign, &event).await["data"]["ca"], "외국");

    // The latest shelf wins regardless of country.
    let korean_latest = FakeCatalog::answering(json!([{ "country": ["한국"] }]));
    let event = Event::downloader("/ROOT/GDRIVE/VIDEO/영화/최신/New.Film.2024.mkv", "i");
    assert_eq!(build(korean_latest, &event).await["data"]["ca"], "최신");
}

#[tokio::test]
async fn english_title_is_a_movie_only_fallback() {
    let answer = json!({ "title_en": "Dune", "code": "MT438631" });

    let movie = Event::downloader("/ROOT/GDRIVE/VIDEO/영화/외국/Dune {tmdb-438631}/Dune.2021.mkv", "m");
    let doc = build(FakeCatalog::answering(answer.clone()), &movie).await;
    assert_eq!(doc["data"]["meta"]["title"], "Dune");

    let show = Event::downloader(
        "/ROOT/GDRIVE/VIDEO/방송중/외국/드라마/Dune {tmdb-90228}/Dune.S01E01.1080p.mkv",
        "s",
    );
    let doc = build(FakeCatalog::answering(answer), &show).await;
    assert_eq!(doc["data"]["meta"]["title"], "Unknown");
}

// ---------------------------------------------------------------------------
// Episodic content
// ---------------------------------------------------------------------------

#[tokio::test]
async fn domestic_show_uses_first_site_of_keyword_search() {
    let catalog = FakeCatalog::answering(json!({
        "daum": [{
            "title": "런닝맨",
            "genre": "예능",
            "code": "KD57593",
            "image_url": "https://img/rm.jpg"
        }],
        "tving": [{ "title": "ignored" }]
    }));
    let event = Event::downloader(
        "/ROOT/GDRIVE/VIDEO/방송중/예능/런닝맨.E650.230402.720p-NEXT.mkv",
        "item-9",
    )
    .file_count(2)
    .total_size(1024);

    let doc = build(Arc::clone(&catalog), &event).await;

    assert_eq!(
        doc,
        json!({
            "t1": "bot_downloader",
            "t2": "vod",
            "data": {
                "f": "런닝맨.E650.230402.720p-NEXT.mkv",
                "id": "item-9",
                "meta": {
                    "code": "KD57593",
                    "genre": "예능",
                    "poster": "https://img/rm.jpg",
                    "title": "런닝맨"
                },
                "s": 1024,
                "c": 2,
                "vod": {
                    "date": "230402",
                    "name": "런닝맨",
                    "no": 650,
                    "quality": "720",
                    "release": "NEXT"
                }
            }
        })
    );
    assert!(matches!(
        &catalog.queries()[0],
        CatalogQuery::Search { category, keyword, .. } if category == "ktv" && keyword == "런닝맨"
    ));
}

#[tokio::test]
async fn embedded_catalog_id_is_looked_up_exactly() {
    let catalog = FakeCatalog::answering(json!({ "title": "Game of Thrones", "code": "FT1399" }));
    let event = Event::downloader(
        "/ROOT/GDRIVE/VIDEO/방송중/외국/드라마/Game of Thrones {tmdb-1399}/Game.of.Thrones.S01E01.1080p.mkv",
        "got",
    );

    let doc = build(Arc::clone(&catalog), &event).await;

    assert_eq!(
        catalog.queries(),
        vec![CatalogQuery::Info {
            category: "ftv".into(),
            code: "FT1399".into(),
        }]
    );
    assert_eq!(doc["data"]["meta"]["title"], "Game of Thrones");
    assert_eq!(doc["data"]["meta"]["genre"], "드라마");
    assert_eq!(doc["data"]["vod"]["name"], "Game of Thrones");
    assert_eq!(doc["data"]["vod"]["no"], 1);
    assert_eq!(doc["data"]["vod"]["date"], "");
}

// ---------------------------------------------------------------------------
// Degradation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_lookup_degrades_to_defaults() {
    let event = Event::downloader("/ROOT/GDRIVE/VIDEO/방송중/드라마/Show.E01.mkv", "i");

    let doc = build(FakeCatalog::failing(), &event).await;

    assert_eq!(doc["data"]["meta"]["title"], "Unknown");
    assert_eq!(doc["data"]["meta"]["code"], "Unknown");
    assert_eq!(doc["data"]["meta"]["poster"], NO_POSTER);
    assert_eq!(doc["data"]["meta"]["genre"], "드라마");
    assert_eq!(doc["data"]["vod"]["quality"], "");
    assert_eq!(doc["data"]["vod"]["release"], "");
}

#[tokio::test(start_paused = true)]
async fn slow_lookup_times_out_to_defaults() {
    let event = Event::downloader("/ROOT/GDRIVE/VIDEO/영화/외국/Late.2020.mkv", "i");

    let doc = build(FakeCatalog::slow(Duration::from_secs(60)), &event).await;

    assert_eq!(doc["data"]["meta"]["title"], "Unknown");
    assert_eq!(doc["data"]["meta"]["year"], 1900);
}

#[test]
fn classification_rules_first_match_wins() {
    let builder = builder(FakeCatalog::answering(json!([])));
    let classify = |p: &str| {
        let (category, module) = builder.classify(std::path::Path::new(p));
        (category.to_string(), module.to_string())
    };
    assert_eq!(classify("/ROOT/GDRIVE/VIDEO/방송중/외국/x.mkv"), ("ftv".into(), "vod".into()));
    assert_eq!(classify("/ROOT/GDRIVE/VIDEO/영화/x.mkv"), ("movie".into(), "share_movie".into()));
    assert_eq!(classify("/ROOT/GDRIVE/VIDEO/방송중/x.mkv"), ("ktv".into(), "vod".into()));
}
