use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::types::Uuid;
use url::Url;

use crate::datasource::repository;
use crate::datasource::repository::episode::{EpisodeQueryOptions, PgEpisodeStore};
use crate::errors::Error;
use crate::models::{
    Episode, EpisodeDetail, EpisodeStatus, FeedItem, Role, ValidationErrors,
};
use crate::publishing;
use crate::remote_files;
use crate::request_cache::RequestCache;
use crate::state::{AppState, DBPool};

const FEED_CACHE_KEY: &str = "feed";

pub(crate) async fn feed(
    State(pool): State<DBPool>,
    State(cache): State<RequestCache<Vec<FeedItem>>>,
) -> Result<Json<Vec<FeedItem>>, Error> {
    if let Some(cached) = cache.get(FEED_CACHE_KEY) {
        return Ok(Json(cached.to_vec()));
    }
    let options = EpisodeQueryOptions {
        status: Some(EpisodeStatus::Published),
    };
    let episodes = repository::episode::get_collection(&pool, Some(options)).await?;
    let items: Vec<FeedItem> = episodes.into_iter().map(Into::into).collect();
    cache.insert(FEED_CACHE_KEY, items.clone());
    Ok(Json(items))
}

pub(crate) async fn show(
    Path(key): Path<String>,
    State(pool): State<DBPool>,
) -> Result<Json<EpisodeDetail>, Error> {
    let episode = repository::episode::find_by_public_key(&pool, &key)
        .await?
        .ok_or(Error::NotFound("episode"))?;
    let (hosts, guests) = repository::attendance::attendees_for_episode(&pool, episode.id).await?;
    Ok(Json(EpisodeDetail {
        episode,
        hosts,
        guests,
    }))
}

pub(crate) async fn index(State(pool): State<DBPool>) -> Result<Json<Vec<Episode>>, Error> {
    let episodes = repository::episode::get_collection(&pool, None).await?;
    Ok(Json(episodes))
}

#[derive(Debug, Deserialize)]
pub(crate) struct EpisodeForm {
    title: String,
    slug: String,
    #[serde(default)]
    number: Option<u32>,
    #[serde(default)]
    status: Option<EpisodeStatus>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    keywords: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    file_uri: Option<Url>,
    #[serde(default)]
    duration: Option<u32>,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    cover_url: Option<Url>,
    #[serde(default)]
    host_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    guest_ids: Option<Vec<Uuid>>,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Json(mut form): Json<EpisodeForm>,
) -> Result<(StatusCode, Json<Episode>), Error> {
    let host_ids = form.host_ids.take();
    let guest_ids = form.guest_ids.take();
    let now = Utc::now();
    let mut episode = Episode {
        id: Uuid::new_v4(),
        title: form.title,
        slug: form.slug,
        number: form.number,
        status: form.status.unwrap_or_default(),
        summary: form.summary,
        description: form.description,
        keywords: form.keywords,
        published_at: form.published_at,
        preview_token: Some(Uuid::new_v4().simple().to_string()),
        file_uri: form.file_uri,
        duration: form.duration,
        length: form.length,
        cover_url: form.cover_url,
        created_at: now,
        updated_at: now,
    };
    episode.validate()?;
    ensure_slug_available(&state.pool, &episode).await?;
    fill_audio_length(&state.http, &mut episode).await;

    let mut store = PgEpisodeStore::new(state.pool.clone());
    publishing::save(&mut store, &mut episode, false).await?;
    replace_attendances(&state.pool, episode.id, host_ids, guest_ids).await?;
    state.feed_cache.invalidate_all();
    Ok((StatusCode::CREATED, Json(episode)))
}

pub(crate) async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(mut form): Json<EpisodeForm>,
) -> Result<Json<Episode>, Error> {
    let existing = repository::episode::find(&state.pool, id)
        .await?
        .ok_or(Error::NotFound("episode"))?;
    let was_published = existing.status == EpisodeStatus::Published;

    let host_ids = form.host_ids.take();
    let guest_ids = form.guest_ids.take();
    let mut episode = Episode {
        id: existing.id,
        title: form.title,
        slug: form.slug,
        number: form.number.or(existing.number),
        status: form.status.unwrap_or(existing.status),
        summary: form.summary.or(existing.summary),
        description: form.description.or(existing.description),
        keywords: form.keywords.or(existing.keywords),
        published_at: form.published_at.or(existing.published_at),
        preview_token: existing.preview_token,
        file_uri: form.file_uri.or(existing.file_uri),
        duration: form.duration.or(existing.duration),
        length: form.length.or(existing.length),
        cover_url: form.cover_url.or(existing.cover_url),
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    episode.validate()?;
    ensure_slug_available(&state.pool, &episode).await?;
    fill_audio_length(&state.http, &mut episode).await;

    let mut store = PgEpisodeStore::new(state.pool.clone());
    publishing::save(&mut store, &mut episode, was_published).await?;
    replace_attendances(&state.pool, episode.id, host_ids, guest_ids).await?;
    state.feed_cache.invalidate_all();
    Ok(Json(episode))
}

pub(crate) async fn destroy(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, Error> {
    if repository::episode::delete(&state.pool, id).await? {
        state.feed_cache.invalidate_all();
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("episode"))
    }
}

async fn ensure_slug_available(pool: &DBPool, episode: &Episode) -> Result<(), Error> {
    if repository::episode::slug_taken(pool, &episode.slug, episode.id).await? {
        let mut errors = ValidationErrors::default();
        errors.add("slug", "has already been taken");
        return Err(errors.into());
    }
    Ok(())
}

async fn fill_audio_length(client: &reqwest::Client, episode: &mut Episode) {
    if episode.length.is_some() {
        return;
    }
    if let Some(url) = episode.file_uri.clone() {
        episode.length = remote_files::content_length(client, &url).await;
    }
}

async fn replace_attendances(
    pool: &DBPool,
    episode_id: Uuid,
    host_ids: Option<Vec<Uuid>>,
    guest_ids: Option<Vec<Uuid>>,
) -> Result<(), Error> {
    if let Some(ids) = host_ids {
        repository::attendance::replace(pool, episode_id, Role::Host, &ids).await?;
    }
    if let Some(ids) = guest_ids {
        repository::attendance::replace(pool, episode_id, Role::Guest, &ids).await?;
    }
    Ok(())
}
