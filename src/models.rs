use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use url::Url;

const FALLBACK_COVER: &str = "logo.png";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EpisodeStatus {
    #[default]
    Draft,
    Published,
    Hidden,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Guest => "guest",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Episode {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub number: Option<u32>,
    pub status: EpisodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_token: Option<String>,
    pub file_uri: Option<Url>,
    pub duration: Option<u32>,
    pub length: Option<u64>,
    pub cover_url: Option<Url>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    /// `HH:MM:SS` rendering of the audio duration, `00:00:00` when unknown.
    pub fn duration_in_hours(&self) -> String {
        let total = self.duration.unwrap_or(0);
        if total == 0 {
            return "00:00:00".to_owned();
        }
        format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    }

    pub fn cover_image_url(&self) -> String {
        self.cover_url
            .as_ref()
            .map_or_else(|| FALLBACK_COVER.to_owned(), Url::to_string)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.title.trim().is_empty() {
            errors.add("title", "must not be blank");
        }
        if self.slug.is_empty()
            || !self
                .slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            errors.add("slug", "must contain only lowercase letters, digits, and hyphens");
        }
        if self.number == Some(0) {
            errors.add("number", "must be positive");
        }
        errors.into_result()
    }
}

/// Social-platform name to profile URL, stored as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocialLinks(pub BTreeMap<String, String>);

impl SocialLinks {
    pub fn validate(&self, errors: &mut ValidationErrors) {
        for (platform, link) in &self.0 {
            if platform.trim().is_empty() || platform.contains("://") {
                errors.add("social_links", "platform label must be a plain name");
            } else if !link.starts_with("http") {
                errors.add(
                    "social_links",
                    format!("link for {platform} must be an http(s) URL"),
                );
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Attendee {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub avatar_url: Option<Url>,
    pub social_links: SocialLinks,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attendee {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.name.trim().is_empty() {
            errors.add("name", "must not be blank");
        }
        self.social_links.validate(&mut errors);
        errors.into_result()
    }
}

/// One appearance of an attendee on an episode under a role.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Attendance {
    pub episode_id: Uuid,
    pub attendee_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{} {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Public feed entry for one published episode.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub title: String,
    pub slug: String,
    pub number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub duration: String,
    pub cover_image_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<Episode> for FeedItem {
    fn from(episode: Episode) -> Self {
        Self {
            duration: episode.duration_in_hours(),
            cover_image_url: episode.cover_image_url(),
            title: episode.title,
            slug: episode.slug,
            number: episode.number,
            summary: episode.summary,
            published_at: episode.published_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeDetail {
    #[serde(flatten)]
    pub episode: Episode,
    pub hosts: Vec<Attendee>,
    pub guests: Vec<Attendee>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendeeProfile {
    #[serde(flatten)]
    pub attendee: Attendee,
    pub episodes: Vec<FeedItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode() -> Episode {
        Episode {
            id: Uuid::new_v4(),
            title: "聊聊播客背后的技术".to_owned(),
            slug: "tech-behind-podcasts".to_owned(),
            number: None,
            status: EpisodeStatus::Draft,
            summary: None,
            description: None,
            keywords: None,
            published_at: None,
            preview_token: None,
            file_uri: None,
            duration: None,
            length: None,
            cover_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_duration_in_hours() {
        let mut ep = episode();
        ep.duration = Some(7242);
        assert_eq!(ep.duration_in_hours(), "02:00:42");
        ep.duration = Some(59);
        assert_eq!(ep.duration_in_hours(), "00:00:59");
        ep.duration = Some(0);
        assert_eq!(ep.duration_in_hours(), "00:00:00");
        ep.duration = None;
        assert_eq!(ep.duration_in_hours(), "00:00:00");
    }

    #[test]
    fn test_cover_image_falls_back_to_logo() {
        let mut ep = episode();
        assert_eq!(ep.cover_image_url(), "logo.png");
        ep.cover_url = Some(Url::parse("https://cdn.example.com/ep1.png").unwrap());
        assert_eq!(ep.cover_image_url(), "https://cdn.example.com/ep1.png");
    }

    #[test]
    fn test_slug_must_be_url_safe() {
        let mut ep = episode();
        assert!(ep.validate().is_ok());
        ep.slug = "Tech Behind Podcasts".to_owned();
        let errors = ep.validate().unwrap_err();
        assert!(errors.errors().iter().any(|e| e.field == "slug"));
        ep.slug = String::new();
        assert!(ep.validate().is_err());
    }

    #[test]
    fn test_number_must_be_positive() {
        let mut ep = episode();
        ep.number = Some(0);
        let errors = ep.validate().unwrap_err();
        assert!(errors.errors().iter().any(|e| e.field == "number"));
        ep.number = Some(1);
        assert!(ep.validate().is_ok());
    }

    #[test]
    fn test_blank_title_is_rejected() {
        let mut ep = episode();
        ep.title = "  ".to_owned();
        let errors = ep.validate().unwrap_err();
        assert!(errors.errors().iter().any(|e| e.field == "title"));
    }

    #[test]
    fn test_social_links_must_be_http_urls() {
        let mut errors = ValidationErrors::default();
        let links = SocialLinks(BTreeMap::from([
            ("weibo".to_owned(), "https://weibo.com/u/1234567890".to_owned()),
            ("twitter".to_owned(), "twitter.com/username".to_owned()),
        ]));
        links.validate(&mut errors);
        let errors = errors.into_result().unwrap_err();
        assert_eq!(errors.errors().len(), 1);
        assert!(errors.errors()[0].message.contains("twitter"));
    }

    #[test]
    fn test_social_link_labels_must_be_plain_names() {
        let mut errors = ValidationErrors::default();
        let links = SocialLinks(BTreeMap::from([(
            "https://weibo.com".to_owned(),
            "https://weibo.com/u/1".to_owned(),
        )]));
        links.validate(&mut errors);
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_feed_item_renders_duration_and_cover() {
        let mut ep = episode();
        ep.number = Some(82);
        ep.duration = Some(3660);
        let item = FeedItem::from(ep);
        assert_eq!(item.number, Some(82));
        assert_eq!(item.duration, "01:01:00");
        assert_eq!(item.cover_image_url, "logo.png");
    }
}
