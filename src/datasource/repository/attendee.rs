use anyhow::Result;
use sqlx::types::{Json, Uuid};
use sqlx::QueryBuilder;
use url::Url;

use crate::models as domain;
use crate::models::Role;
use crate::state::DBPool;

use super::episode;

pub mod models {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use sqlx::types::{Json, Uuid};
    use url::Url;

    use crate::models as domain;
    use crate::models::{Role, SocialLinks};

    #[derive(Debug, sqlx::FromRow)]
    pub struct Attendee {
        pub id: Uuid,
        pub role: Role,
        pub name: String,
        pub bio: Option<String>,
        pub description: Option<String>,
        pub avatar_url: Option<String>,
        pub social_links: Json<BTreeMap<String, String>>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl TryFrom<Attendee> for domain::Attendee {
        type Error = anyhow::Error;

        fn try_from(row: Attendee) -> Result<Self, Self::Error> {
            Ok(Self {
                id: row.id,
                role: row.role,
                name: row.name,
                bio: row.bio,
                description: row.description,
                avatar_url: row.avatar_url.as_deref().map(Url::parse).transpose()?,
                social_links: SocialLinks(row.social_links.0),
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        }
    }
}

const SELECT_ATTENDEES: &str = "SELECT id, role, name, bio, description, avatar_url, \
     social_links, created_at, updated_at FROM attendees";

const UPSERT_ATTENDEE: &str = "INSERT INTO attendees (id, role, name, bio, description, \
     avatar_url, social_links) VALUES ($1, $2, $3, $4, $5, $6, $7) \
     ON CONFLICT (id) DO UPDATE SET role = excluded.role, name = excluded.name, \
     bio = excluded.bio, description = excluded.description, \
     avatar_url = excluded.avatar_url, social_links = excluded.social_links, \
     updated_at = now()";

pub async fn get_collection(pool: &DBPool, role: Option<Role>) -> Result<Vec<domain::Attendee>> {
    let mut qb = QueryBuilder::new(SELECT_ATTENDEES);
    if let Some(role) = role {
        qb.push(" WHERE role = ").push_bind(role);
    }
    let rows = qb
        .push(" ORDER BY created_at DESC")
        .build_query_as::<models::Attendee>()
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

pub async fn find(pool: &DBPool, id: Uuid) -> Result<Option<domain::Attendee>> {
    let mut qb = QueryBuilder::new(SELECT_ATTENDEES);
    qb.push(" WHERE id = ").push_bind(id);
    let row = qb
        .build_query_as::<models::Attendee>()
        .fetch_optional(pool)
        .await?;
    row.map(TryInto::try_into).transpose()
}

pub async fn find_with_role(
    pool: &DBPool,
    id: Uuid,
    role: Role,
) -> Result<Option<domain::Attendee>> {
    let mut qb = QueryBuilder::new(SELECT_ATTENDEES);
    qb.push(" WHERE id = ")
        .push_bind(id)
        .push(" AND role = ")
        .push_bind(role);
    let row = qb
        .build_query_as::<models::Attendee>()
        .fetch_optional(pool)
        .await?;
    row.map(TryInto::try_into).transpose()
}

pub async fn save(pool: &DBPool, attendee: &domain::Attendee) -> Result<()> {
    sqlx::query(UPSERT_ATTENDEE)
        .bind(attendee.id)
        .bind(attendee.role)
        .bind(&attendee.name)
        .bind(&attendee.bio)
        .bind(&attendee.description)
        .bind(attendee.avatar_url.as_ref().map(Url::as_str))
        .bind(Json(&attendee.social_links.0))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &DBPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM attendees WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn published_episodes(pool: &DBPool, attendee_id: Uuid) -> Result<Vec<domain::Episode>> {
    let mut qb = QueryBuilder::new(
        "SELECT e.id, e.title, e.slug, e.number, e.status, e.summary, e.description, \
         e.keywords, e.published_at, e.preview_token, e.file_uri, e.duration, e.length, \
         e.cover_url, e.created_at, e.updated_at FROM episodes e \
         JOIN attendances a ON a.episode_id = e.id WHERE a.attendee_id = ",
    );
    qb.push_bind(attendee_id)
        .push(" AND e.status = 'published' ORDER BY e.number DESC");
    let rows = qb
        .build_query_as::<episode::models::Episode>()
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}
