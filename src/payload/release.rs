//! Release-name parsing.
//!
//! Turns a scene-style file stem such as `Show.S01E02.1080p.WEB-DL-GRP`
//! into structured fields. Every field is optional; an unparseable name
//! yields [`ReleaseInfo::default`].

use std::sync::LazyLock;

use regex::Regex;

static SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bS(\d{1,3})E(\d{1,4})\b").expect("valid regex"));
static EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[.\s_\-])E(\d{1,4})(?:[.\s_\-]|$)").expect("valid regex")
});
static YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[.\s_(\[\-])((?:19|20)\d{2})(?:[.\s_)\]\-]|$)").expect("valid regex")
});
static RESOLUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{3,4}p)\b").expect("valid regex"));
static QUALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(WEB-?DL|WEB-?Rip|BluRay|BDRip|HDTV|DVDRip|HDRip)\b").expect("valid regex")
});
static ENCODER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-([A-Za-z0-9]+)$").expect("valid regex"));

/// Structured fields extracted from a release name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub title: Option<String>,
    pub year: Option<i64>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// e.g. "1080p"
    pub resolution: Option<String>,
    /// e.g. "WEB-DL"
    pub quality: Option<String>,
    /// Release group.
    pub encoder: Option<String>,
}

/// Parses a file stem into release fields.
pub trait ReleaseParser: Send + Sync {
    fn parse(&self, stem: &str) -> ReleaseInfo;
}

/// Regex-based parser for dot-separated scene names.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternParser;

impl ReleaseParser for PatternParser {
    fn parse(&self, stem: &str) -> ReleaseInfo {
        let mut info = ReleaseInfo::default();
        // Title ends where the first structured token begins.
        let mut title_end = stem.len();

        if let Some(caps) = SEASON_EPISODE.captures(stem) {
            info.season = caps[1].parse().ok();
            info.episode = caps[2].parse().ok();
            title_end = title_end.min(caps.get(0).map_or(stem.len(), |m| m.start()));
        } else if let Some(caps) = EPISODE.captures(stem) {
            info.episode = caps[1].parse().ok();
            title_end = title_end.min(caps.get(0).map_or(stem.len(), |m| m.start()));
        }

        if let Some(m) = YEAR.captures(stem).and_then(|c| c.get(1)) {
            info.year = m.as_str().parse().ok();
            title_end = title_end.min(m.start());
        }
        if let Some(m) = RESOLUTION.captures(stem).and_then(|c| c.get(1)) {
            info.resolution = Some(m.as_str().to_string());
            title_end = title_end.min(m.start());
        }
        if let Some(m) = QUALITY.captures(stem).and_then(|c| c.get(1)) {
            info.quality = Some(m.as_str().to_string());
            title_end = title_end.min(m.start());
        }
        if let Some(m) = ENCODER.captures(stem).and_then(|c| c.get(1)) {
            info.encoder = Some(m.as_str().to_string());
            title_end = title_end.min(m.start().saturating_sub(1));
        }

        let title = stem[..title_end]
            .split(['.', '_', ' '])
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let title = title.trim_matches(|c: char| c == '-' || c == '(' || c == '[' || c.is_whitespace());
        if !title.is_empty() {
            info.title = Some(title.to_string());
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_episodic_scene_name() {
        let info = PatternParser.parse("The.Show.S02E05.1080p.WEB-DL-GRP");
        assert_eq!(info.title.as_deref(), Some("The Show"));
        assert_eq!(info.season, Some(2));
        assert_eq!(info.episode, Some(5));
        assert_eq!(info.resolution.as_deref(), Some("1080p"));
        assert_eq!(info.quality.as_deref(), Some("WEB-DL"));
        assert_eq!(info.encoder.as_deref(), Some("GRP"));
    }

    #[test]
    fn parses_broadcast_date_name() {
        let info = PatternParser.parse("런닝맨.E650.230402.720p-NEXT");
        assert_eq!(info.title.as_deref(), Some("런닝맨"));
        assert_eq!(info.episode, Some(650));
        assert_eq!(info.year, None);
        assert_eq!(info.resolution.as_deref(), Some("720p"));
        assert_eq!(info.encoder.as_deref(), Some("NEXT"));
    }

    #[test]
    fn parses_movie_name() {
        let info = PatternParser.parse("Some.Movie.2021.2160p.BluRay");
        assert_eq!(info.title.as_deref(), Some("Some Movie"));
        assert_eq!(info.year, Some(2021));
        assert_eq!(info.episode, None);
    }

    #[test]
    fn unstructured_name_is_all_title() {
        let info = PatternParser.parse("holiday video");
        assert_eq!(info.title.as_deref(), Some("holiday video"));
        assert_eq!(info.year, None);
        assert_eq!(info.resolution, None);
    }

    #[test]
    fn empty_name_is_empty_info() {
        assert_eq!(PatternParser.parse(""), ReleaseInfo::default());
    }
}
