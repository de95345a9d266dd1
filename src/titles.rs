//! Curated video titles and display-title resolution.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{Result, SearchError};

/// Default column holding the video link in the curated table.
pub const DEFAULT_URL_COLUMN: &str = "Ссылка на видео в YouTube";
/// Default column holding the curated display title.
pub const DEFAULT_TITLE_COLUMN: &str = "Подзаголовок";
/// Channel boilerplate appended to raw video titles.
pub const DEFAULT_BOILERPLATE_SUFFIX: &str = "- Даниил Зуев расскажет";

static VIDEO_URL_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^https?://(?:www\.)?youtube\.com/watch\?v=([\w-]+)").expect("static regex"),
        Regex::new(r"^https?://(?:www\.)?youtube\.com/embed/([\w-]+)").expect("static regex"),
        Regex::new(r"^https?://youtu\.be/([\w-]+)").expect("static regex"),
    ]
});

/// Extracts the video id from a `watch?v=`, `/embed/` or `youtu.be/` link.
pub fn extract_video_id(link: &str) -> Option<&str> {
    let link = link.trim();
    VIDEO_URL_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(link)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    })
}

/// Read-only map from video id to curated display title.
///
/// Loaded once at startup and shared; entries never change for the lifetime of the
/// process.
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    titles: HashMap<String, String>,
}

impl TitleIndex {
    /// Builds an index from already-extracted pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            titles: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Loads a curated CSV table from disk.
    pub fn from_csv_path(path: &Path, url_column: &str, title_column: &str) -> Result<Self> {
        let file = File::open(path).map_err(csv::Error::from)?;
        let index = Self::from_csv_reader(file, url_column, title_column)?;
        info!(path = %path.display(), titles = index.len(), "loaded curated title table");
        Ok(index)
    }

    /// Parses a curated CSV table. Rows whose link has no recognizable video id, or
    /// whose title is blank, are skipped.
    pub fn from_csv_reader<R: Read>(reader: R, url_column: &str, title_column: &str) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| SearchError::InvalidConfig(format!("title table has no column {name:?}")))
        };
        let url_idx = position(url_column)?;
        let title_idx = position(title_column)?;

        let mut titles = HashMap::new();
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            let link = record.get(url_idx).unwrap_or_default();
            let title = record.get(title_idx).unwrap_or_default().trim();
            let Some(video_id) = extract_video_id(link) else {
                warn!(row = row + 1, link, "skipping title row without a video id");
                continue;
            };
            if title.is_empty() {
                warn!(row = row + 1, video_id, "skipping title row with a blank title");
                continue;
            }
            titles.insert(video_id.to_string(), title.to_string());
        }
        Ok(Self { titles })
    }

    /// Curated title for `video_id`.
    pub fn lookup_title(&self, video_id: &str) -> Option<&str> {
        self.titles.get(video_id).map(String::as_str)
    }

    /// Number of curated entries.
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    /// True when no curated titles are loaded.
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Chooses the display title of a video.
#[derive(Debug, Clone)]
pub struct TitleResolver {
    index: TitleIndex,
    boilerplate_suffixes: Vec<String>,
    tame_caps: bool,
}

impl TitleResolver {
    /// Creates a resolver stripping the default channel boilerplate.
    pub fn new(index: TitleIndex) -> Self {
        Self {
            index,
            boilerplate_suffixes: vec![DEFAULT_BOILERPLATE_SUFFIX.to_string()],
            tame_caps: false,
        }
    }

    /// Replaces the suffixes stripped from metadata titles.
    pub fn with_boilerplate_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.boilerplate_suffixes = suffixes;
        self
    }

    /// Lower-cases shouted words in metadata-derived titles.
    pub fn with_tame_caps(mut self, enabled: bool) -> Self {
        self.tame_caps = enabled;
        self
    }

    /// Curated table backing this resolver.
    pub fn index(&self) -> &TitleIndex {
        &self.index
    }

    /// Curated title if present, else the fallback title without boilerplate, else
    /// an empty string.
    pub fn resolve_title(&self, video_id: &str, fallback_title: Option<&str>) -> String {
        if let Some(curated) = self.index.lookup_title(video_id) {
            return curated.to_string();
        }
        let Some(raw) = fallback_title else {
            return String::new();
        };
        let mut title = raw.trim();
        for suffix in &self.boilerplate_suffixes {
            if let Some(stripped) = title.strip_suffix(suffix.as_str()) {
                title = stripped.trim_end();
            }
        }
        if self.tame_caps {
            tame_caps(title)
        } else {
            title.to_string()
        }
    }
}

/// Lower-cases words that are not in Title or mixed case and capitalizes the first
/// letter of the result.
pub fn tame_caps(text: &str) -> String {
    if text.chars().count() <= 1 {
        return text.to_string();
    }
    let words: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            let keep = chars.next().is_some_and(char::is_uppercase) && chars.any(char::is_lowercase);
            if keep {
                word.to_string()
            } else {
                word.to_lowercase()
            }
        })
        .collect();
    let joined = words.join(" ");
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => joined,
    }
}
