//! Announcement provider reading the campus announcement JSON feed.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use metrohelp_core::{
    model::{Announcement, AnnouncementContent, Language, Localized},
    ports::{AnnouncementPort, FetchFailure, fetch_json},
};

/// Feed published by the campus staff.
pub const DEFAULT_FEED_URL: &str =
    "https://users.metropolia.fi/~veerakek/metrohelp_announcements/announcement.json";

/// One language version inside a feed entry
#[derive(Debug, Deserialize)]
struct RawContent {
    title: String,
    #[serde(default)]
    body: String,
    #[serde(rename = "imgUrl", default)]
    img_url: String,
}

/// Announcement feed at a fixed URL.
pub struct FeedAnnouncementPort {
    client: Client,
    url: String,
}

impl FeedAnnouncementPort {
    /// Create a port reading the feed at `url`.
    #[must_use]
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AnnouncementPort for FeedAnnouncementPort {
    async fn announcements(&self) -> Result<Vec<Announcement>, FetchFailure> {
        let entries = fetch_json::<Vec<BTreeMap<String, Value>>>(self.client.get(&self.url)).await?;
        Ok(normalize(entries))
    }
}

/// Build the announcement port, falling back to [`DEFAULT_FEED_URL`].
#[must_use]
pub fn port(client: Client, url: Option<String>) -> Arc<dyn AnnouncementPort> {
    let url = url.unwrap_or_else(|| DEFAULT_FEED_URL.to_owned());
    Arc::new(FeedAnnouncementPort::new(client, url))
}

fn normalize(entries: Vec<BTreeMap<String, Value>>) -> Vec<Announcement> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let localized = localize(index, entry);
            if localized.is_empty() {
                warn!(index, "announcement has no usable language version, dropping");
                return None;
            }
            Some(Announcement { localized })
        })
        .collect()
}

fn localize(index: usize, entry: BTreeMap<String, Value>) -> Localized<AnnouncementContent> {
    let mut localized = Localized::new();
    for (code, value) in entry {
        // Keys other than known language codes are ignored.
        let Some(language) = Language::from_code(&code) else {
            continue;
        };
        match serde_json::from_value::<RawContent>(value) {
            Ok(raw) => {
                localized.insert(
                    language,
                    AnnouncementContent {
                        title: raw.title,
                        body: raw.body,
                        image_url: raw.img_url,
                    },
                );
            }
            Err(err) => {
                warn!(index, language = %language, error = %err, "malformed announcement content");
            }
        }
    }
    localized
}

#[cfg(test)]
mod tests {
    use metrohelp_core::ports::decode_json;

    use super::*;

    const FEED: &str = r#"[
        {
            "fi": { "title": "Kirjasto suljettu", "body": "<p>Perjantaina</p>", "imgUrl": "https://img/1.jpg" },
            "en": { "title": "Library closed", "body": "<p>On Friday</p>", "imgUrl": "https://img/1.jpg" },
            "sv": { "title": "Biblioteket stängt", "body": "", "imgUrl": "" }
        },
        { "de": { "title": "Nur Deutsch", "body": "", "imgUrl": "" } },
        { "en": { "title": "Sauna evening" } },
        { "fi": { "body": "no title" } }
    ]"#;

    fn feed() -> Vec<Announcement> {
        normalize(decode_json(FEED).expect("fixture matches wire format"))
    }

    #[test]
    fn known_languages_are_kept_in_feed_order() {
        let announcements = feed();
        assert_eq!(announcements.len(), 2, "two usable entries");

        let first = announcements.first().expect("first entry");
        let languages: Vec<Language> = first.localized.keys().copied().collect();
        assert_eq!(languages, vec![Language::Fi, Language::En], "sv is ignored");
        assert_eq!(
            first.localized.get(&Language::En).map(|content| content.title.as_str()),
            Some("Library closed"),
            "english title"
        );
    }

    #[test]
    fn missing_optional_fields_default_to_empty() {
        let announcements = feed();
        let sauna = announcements
            .get(1)
            .and_then(|entry| entry.localized.get(&Language::En))
            .expect("sauna entry");
        assert_eq!(sauna.title, "Sauna evening", "title");
        assert!(sauna.body.is_empty(), "body");
        assert!(sauna.image_url.is_empty(), "image");
    }

    #[test]
    fn non_array_feed_is_a_schema_failure() {
        let result = decode_json::<Vec<BTreeMap<String, Value>>>(r#"{ "fi": {} }"#);
        assert!(matches!(result, Err(FetchFailure::Schema(_))), "got {result:?}");
    }

    #[test]
    fn empty_feed_is_empty() {
        assert!(normalize(Vec::new()).is_empty(), "nothing to show");
    }
}
