use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use sqlx::types::Uuid;
use url::Url;

use crate::datasource::repository;
use crate::errors::Error;
use crate::models::{Attendee, AttendeeProfile, Role, SocialLinks};
use crate::state::DBPool;

pub(crate) async fn show_host(
    Path(id): Path<Uuid>,
    State(pool): State<DBPool>,
) -> Result<Json<AttendeeProfile>, Error> {
    profile(&pool, id, Role::Host).await
}

pub(crate) async fn show_guest(
    Path(id): Path<Uuid>,
    State(pool): State<DBPool>,
) -> Result<Json<AttendeeProfile>, Error> {
    profile(&pool, id, Role::Guest).await
}

async fn profile(pool: &DBPool, id: Uuid, role: Role) -> Result<Json<AttendeeProfile>, Error> {
    let attendee = repository::attendee::find_with_role(pool, id, role)
        .await?
        .ok_or(Error::NotFound(role.as_str()))?;
    let episodes = repository::attendee::published_episodes(pool, id).await?;
    Ok(Json(AttendeeProfile {
        attendee,
        episodes: episodes.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttendeeQuery {
    role: Option<Role>,
}

pub(crate) async fn index(
    Query(params): Query<AttendeeQuery>,
    State(pool): State<DBPool>,
) -> Result<Json<Vec<Attendee>>, Error> {
    let attendees = repository::attendee::get_collection(&pool, params.role).await?;
    Ok(Json(attendees))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttendeeForm {
    role: Role,
    name: String,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    avatar_url: Option<Url>,
    #[serde(default)]
    social_links: Option<SocialLinks>,
}

pub(crate) async fn create(
    State(pool): State<DBPool>,
    Json(form): Json<AttendeeForm>,
) -> Result<(StatusCode, Json<Attendee>), Error> {
    let now = Utc::now();
    let attendee = Attendee {
        id: Uuid::new_v4(),
        role: form.role,
        name: form.name,
        bio: form.bio,
        description: form.description,
        avatar_url: form.avatar_url,
        social_links: form.social_links.unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };
    attendee.validate()?;
    repository::attendee::save(&pool, &attendee).await?;
    Ok((StatusCode::CREATED, Json(attendee)))
}

pub(crate) async fn update(
    Path(id): Path<Uuid>,
    State(pool): State<DBPool>,
    Json(form): Json<AttendeeForm>,
) -> Result<Json<Attendee>, Error> {
    let existing = repository::attendee::find(&pool, id)
        .await?
        .ok_or(Error::NotFound("attendee"))?;
    let attendee = Attendee {
        id: existing.id,
        role: form.role,
        name: form.name,
        bio: form.bio.or(existing.bio),
        description: form.description.or(existing.description),
        avatar_url: form.avatar_url.or(existing.avatar_url),
        social_links: form.social_links.unwrap_or(existing.social_links),
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    attendee.validate()?;
    repository::attendee::save(&pool, &attendee).await?;
    Ok(Json(attendee))
}

pub(crate) async fn destroy(
    Path(id): Path<Uuid>,
    State(pool): State<DBPool>,
) -> Result<StatusCode, Error> {
    if repository::attendee::delete(&pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("attendee"))
    }
}
