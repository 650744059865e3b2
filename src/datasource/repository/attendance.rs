use anyhow::Result;
use sqlx::types::Uuid;
use sqlx::QueryBuilder;
use tokio_stream::StreamExt;

use crate::models::{Attendance, Attendee, Role};
use crate::state::DBPool;

pub mod models {
    use crate::models::Role;

    use super::super::attendee;

    #[derive(Debug, sqlx::FromRow)]
    pub struct EpisodeAttendee {
        pub attendance_role: Role,
        #[sqlx(flatten)]
        pub attendee: attendee::models::Attendee,
    }
}

/// Swap out the full set of hosts or guests on an episode in one
/// transaction. Set-replacement, not incremental diffing.
pub async fn replace(
    pool: &DBPool,
    episode_id: Uuid,
    role: Role,
    attendee_ids: &[Uuid],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM attendances WHERE episode_id = $1 AND role = $2")
        .bind(episode_id)
        .bind(role)
        .execute(&mut *tx)
        .await?;
    for &attendee_id in attendee_ids {
        let attendance = Attendance {
            episode_id,
            attendee_id,
            role,
        };
        sqlx::query("INSERT INTO attendances (episode_id, attendee_id, role) VALUES ($1, $2, $3)")
            .bind(attendance.episode_id)
            .bind(attendance.attendee_id)
            .bind(attendance.role)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn attendees_for_episode(
    pool: &DBPool,
    episode_id: Uuid,
) -> Result<(Vec<Attendee>, Vec<Attendee>)> {
    let mut qb = QueryBuilder::new(
        "SELECT a.role AS attendance_role, t.id, t.role, t.name, t.bio, t.description, \
         t.avatar_url, t.social_links, t.created_at, t.updated_at \
         FROM attendances a JOIN attendees t ON t.id = a.attendee_id WHERE a.episode_id = ",
    );
    qb.push_bind(episode_id).push(" ORDER BY a.created_at");

    let mut hosts = Vec::new();
    let mut guests = Vec::new();
    let query = qb.build_query_as::<models::EpisodeAttendee>();
    let mut rows = query.fetch(pool);
    while let Some(row) = rows.next().await {
        let row = row?;
        let role = row.attendance_role;
        let attendee: Attendee = row.attendee.try_into()?;
        match role {
            Role::Host => hosts.push(attendee),
            Role::Guest => guests.push(attendee),
        }
    }
    Ok((hosts, guests))
}
