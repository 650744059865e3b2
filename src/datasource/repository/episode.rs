use anyhow::Result;
use axum::async_trait;
use sqlx::types::Uuid;
use sqlx::QueryBuilder;
use url::Url;

use crate::models as domain;
use crate::models::EpisodeStatus;
use crate::publishing::{EpisodeStore, SaveError};
use crate::state::DBPool;

pub mod models {
    use chrono::{DateTime, Utc};
    use sqlx::types::Uuid;
    use url::Url;

    use crate::models as domain;
    use crate::models::EpisodeStatus;

    #[derive(Debug, sqlx::FromRow)]
    pub struct Episode {
        pub id: Uuid,
        pub title: String,
        pub slug: String,
        pub number: Option<i32>,
        pub status: EpisodeStatus,
        pub summary: Option<String>,
        pub description: Option<String>,
        pub keywords: Option<String>,
        pub published_at: Option<DateTime<Utc>>,
        pub preview_token: Option<String>,
        pub file_uri: Option<String>,
        pub duration: Option<i32>,
        pub length: Option<i64>,
        pub cover_url: Option<String>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl TryFrom<Episode> for domain::Episode {
        type Error = anyhow::Error;

        fn try_from(row: Episode) -> Result<Self, Self::Error> {
            Ok(Self {
                id: row.id,
                title: row.title,
                slug: row.slug,
                number: row.number.map(u32::try_from).transpose()?,
                status: row.status,
                summary: row.summary,
                description: row.description,
                keywords: row.keywords,
                published_at: row.published_at,
                preview_token: row.preview_token,
                file_uri: row.file_uri.as_deref().map(Url::parse).transpose()?,
                duration: row.duration.map(u32::try_from).transpose()?,
                length: row.length.map(u64::try_from).transpose()?,
                cover_url: row.cover_url.as_deref().map(Url::parse).transpose()?,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        }
    }
}

const SELECT_EPISODES: &str = "SELECT id, title, slug, number, status, summary, description, \
     keywords, published_at, preview_token, file_uri, duration, length, cover_url, created_at, \
     updated_at FROM episodes";

const UPSERT_EPISODE: &str = "INSERT INTO episodes (id, title, slug, number, status, summary, \
     description, keywords, published_at, preview_token, file_uri, duration, length, cover_url) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
     ON CONFLICT (id) DO UPDATE SET title = excluded.title, slug = excluded.slug, \
     number = excluded.number, status = excluded.status, summary = excluded.summary, \
     description = excluded.description, keywords = excluded.keywords, \
     published_at = excluded.published_at, file_uri = excluded.file_uri, \
     duration = excluded.duration, length = excluded.length, cover_url = excluded.cover_url, \
     updated_at = now()";

const PUBLISHED_NUMBER_INDEX: &str = "episodes_number_published_idx";

#[derive(Debug, Default)]
pub struct EpisodeQueryOptions {
    pub status: Option<EpisodeStatus>,
}

pub async fn get_collection(
    pool: &DBPool,
    options: Option<EpisodeQueryOptions>,
) -> Result<Vec<domain::Episode>> {
    let mut qb = QueryBuilder::new(SELECT_EPISODES);
    if let Some(options) = options {
        if let Some(status) = options.status {
            qb.push(" WHERE status = ").push_bind(status);
        }
    }
    let query = qb
        .push(" ORDER BY number DESC NULLS LAST, created_at DESC")
        .build_query_as::<models::Episode>();
    let rows = query.fetch_all(pool).await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

pub async fn find(pool: &DBPool, id: Uuid) -> Result<Option<domain::Episode>> {
    let mut qb = QueryBuilder::new(SELECT_EPISODES);
    qb.push(" WHERE id = ").push_bind(id);
    let row = qb
        .build_query_as::<models::Episode>()
        .fetch_optional(pool)
        .await?;
    row.map(TryInto::try_into).transpose()
}

/// Public lookup: slug or number of a published episode, or any episode's
/// preview token (preview links are `/episodes/<token>`).
pub async fn find_by_public_key(pool: &DBPool, key: &str) -> Result<Option<domain::Episode>> {
    let number: Option<i32> = key.parse().ok();
    let mut qb = QueryBuilder::new(SELECT_EPISODES);
    qb.push(" WHERE (status = 'published' AND (slug = ")
        .push_bind(key)
        .push(" OR number = ")
        .push_bind(number)
        .push(")) OR preview_token = ")
        .push_bind(key)
        .push(" LIMIT 1");
    let row = qb
        .build_query_as::<models::Episode>()
        .fetch_optional(pool)
        .await?;
    row.map(TryInto::try_into).transpose()
}

pub async fn slug_taken(pool: &DBPool, slug: &str, id: Uuid) -> Result<bool> {
    let (taken,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM episodes WHERE slug = $1 AND id <> $2)")
            .bind(slug)
            .bind(id)
            .fetch_one(pool)
            .await?;
    Ok(taken)
}

pub async fn delete(pool: &DBPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM episodes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn max_published_number(pool: &DBPool) -> Result<Option<u32>> {
    let (max,): (Option<i32>,) =
        sqlx::query_as("SELECT MAX(number) FROM episodes WHERE status = 'published'")
            .fetch_one(pool)
            .await?;
    Ok(max.map(u32::try_from).transpose()?)
}

/// `EpisodeStore` backed by the episodes table. The partial unique index
/// on published numbers is what turns a concurrent publish into a
/// `NumberTaken` instead of silent double assignment.
#[derive(Debug, Clone)]
pub struct PgEpisodeStore {
    pool: DBPool,
}

impl PgEpisodeStore {
    pub fn new(pool: DBPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EpisodeStore for PgEpisodeStore {
    async fn next_available_number(&mut self) -> Result<u32> {
        Ok(max_published_number(&self.pool).await?.map_or(1, |n| n + 1))
    }

    async fn persist(&mut self, episode: &domain::Episode) -> Result<(), SaveError> {
        sqlx::query(UPSERT_EPISODE)
            .bind(episode.id)
            .bind(&episode.title)
            .bind(&episode.slug)
            .bind(episode.number.map(|n| n as i32))
            .bind(episode.status)
            .bind(&episode.summary)
            .bind(&episode.description)
            .bind(&episode.keywords)
            .bind(episode.published_at)
            .bind(&episode.preview_token)
            .bind(episode.file_uri.as_ref().map(Url::as_str))
            .bind(episode.duration.map(|d| d as i32))
            .bind(episode.length.map(|l| l as i64))
            .bind(episode.cover_url.as_ref().map(Url::as_str))
            .execute(&self.pool)
            .await
            .map_err(into_save_error)?;
        Ok(())
    }
}

fn into_save_error(err: sqlx::Error) -> SaveError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() && db_err.constraint() == Some(PUBLISHED_NUMBER_INDEX) {
            return SaveError::NumberTaken;
        }
    }
    SaveError::Other(err.into())
}
