//! Episode numbering and publication guard.
//!
//! Every published episode carries a unique positive number; drafts may
//! stay unnumbered. The partial unique index on published numbers is the
//! arbiter under concurrent publishes, and a bounded retry loop recovers
//! the race here instead of surfacing the first conflict.

use axum::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::models::{Episode, EpisodeStatus, ValidationErrors};

pub const MAX_NUMBERING_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// The partial unique index rejected the number. Distinguished from
    /// every other write failure so the caller can recompute and retry.
    #[error("episode number is already taken by a published episode")]
    NumberTaken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SaveFailure {
    #[error("{0}")]
    Conflict(ValidationErrors),
    #[error(transparent)]
    Store(anyhow::Error),
}

/// Persistence boundary the guard operates over. Anything that can report
/// the current published-number ceiling and persist with a distinguishable
/// uniqueness failure qualifies.
#[async_trait]
pub trait EpisodeStore {
    /// One past the highest published number, or 1 when nothing is
    /// published. A read, not a reservation.
    async fn next_available_number(&mut self) -> anyhow::Result<u32>;

    async fn persist(&mut self, episode: &Episode) -> Result<(), SaveError>;
}

/// The single save path for episodes. Numbering and publish-timestamping
/// run only on the `* -> published` transition; a re-save of an already
/// published episode persists as-is.
pub async fn save<S>(
    store: &mut S,
    episode: &mut Episode,
    was_published: bool,
) -> Result<(), SaveFailure>
where
    S: EpisodeStore + Send,
{
    let publishing = episode.status == EpisodeStatus::Published && !was_published;

    if publishing && episode.published_at.is_none() {
        episode.published_at = Some(Utc::now());
    }

    if publishing && episode.number.is_none() {
        return assign_number_and_persist(store, episode).await;
    }

    match store.persist(episode).await {
        Ok(()) => Ok(()),
        Err(SaveError::NumberTaken) => Err(SaveFailure::Conflict(number_taken())),
        Err(SaveError::Other(err)) => Err(SaveFailure::Store(err)),
    }
}

async fn assign_number_and_persist<S>(
    store: &mut S,
    episode: &mut Episode,
) -> Result<(), SaveFailure>
where
    S: EpisodeStore + Send,
{
    for attempt in 1..=MAX_NUMBERING_ATTEMPTS {
        let number = store
            .next_available_number()
            .await
            .map_err(SaveFailure::Store)?;
        episode.number = Some(number);
        match store.persist(episode).await {
            Ok(()) => return Ok(()),
            Err(SaveError::NumberTaken) => {
                debug!("lost the race for episode number {number} (attempt {attempt})");
                episode.number = None;
            }
            Err(SaveError::Other(err)) => return Err(SaveFailure::Store(err)),
        }
    }

    let mut errors = ValidationErrors::default();
    errors.add(
        "number",
        format!("could not be assigned after {MAX_NUMBERING_ATTEMPTS} attempts"),
    );
    Err(SaveFailure::Conflict(errors))
}

fn number_taken() -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    errors.add("number", "is already taken by a published episode");
    errors
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sqlx::types::Uuid;

    use super::*;

    /// In-memory store enforcing the same partial uniqueness rule as the
    /// database index. `sabotage` makes the next N persists lose the
    /// number race to a phantom concurrent publisher.
    #[derive(Debug, Default)]
    struct MemoryStore {
        published_numbers: Vec<u32>,
        saved: Vec<Episode>,
        sabotage: u32,
        persist_calls: u32,
    }

    #[async_trait]
    impl EpisodeStore for MemoryStore {
        async fn next_available_number(&mut self) -> anyhow::Result<u32> {
            Ok(self.published_numbers.iter().max().map_or(1, |n| n + 1))
        }

        async fn persist(&mut self, episode: &Episode) -> Result<(), SaveError> {
            self.persist_calls += 1;
            if self.sabotage > 0 {
                self.sabotage -= 1;
                if let Some(number) = episode.number {
                    self.published_numbers.push(number);
                }
                return Err(SaveError::NumberTaken);
            }
            if episode.status == EpisodeStatus::Published {
                if let Some(number) = episode.number {
                    if self.published_numbers.contains(&number) {
                        return Err(SaveError::NumberTaken);
                    }
                    self.published_numbers.push(number);
                }
            }
            self.saved.push(episode.clone());
            Ok(())
        }
    }

    fn episode(status: EpisodeStatus, number: Option<u32>) -> Episode {
        Episode {
            id: Uuid::new_v4(),
            title: "Coding with friends".to_owned(),
            slug: "coding-with-friends".to_owned(),
            number,
            status,
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

    #[tokio::test]
    async fn test_draft_saves_stay_unnumbered_and_unstamped() {
        let mut store = MemoryStore::default();
        let mut ep = episode(EpisodeStatus::Draft, None);
        save(&mut store, &mut ep, false).await.unwrap();
        assert_eq!(ep.number, None);
        assert_eq!(ep.published_at, None);
    }

    #[tokio::test]
    async fn test_first_publish_takes_the_next_number() {
        let mut store = MemoryStore {
            published_numbers: vec![4, 7],
            ..MemoryStore::default()
        };
        let before = Utc::now();
        let mut ep = episode(EpisodeStatus::Published, None);
        save(&mut store, &mut ep, false).await.unwrap();
        assert_eq!(ep.number, Some(8));
        let published_at = ep.published_at.unwrap();
        assert!(published_at >= before && published_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_publish_into_an_empty_catalog_starts_at_one() {
        let mut store = MemoryStore::default();
        let mut ep = episode(EpisodeStatus::Published, None);
        save(&mut store, &mut ep, false).await.unwrap();
        assert_eq!(ep.number, Some(1));
    }

    #[tokio::test]
    async fn test_resave_of_published_episode_keeps_timestamp_and_number() {
        let mut store = MemoryStore::default();
        let stamped = Utc::now() - Duration::days(30);
        let mut ep = episode(EpisodeStatus::Published, Some(3));
        ep.published_at = Some(stamped);
        save(&mut store, &mut ep, true).await.unwrap();
        assert_eq!(ep.number, Some(3));
        assert_eq!(ep.published_at, Some(stamped));
    }

    #[tokio::test]
    async fn test_lost_race_recovers_with_a_higher_number() {
        let mut store = MemoryStore {
            published_numbers: vec![1],
            sabotage: 1,
            ..MemoryStore::default()
        };
        let mut ep = episode(EpisodeStatus::Published, None);
        save(&mut store, &mut ep, false).await.unwrap();
        // the phantom publisher claimed 2, so the retry lands on 3
        assert_eq!(ep.number, Some(3));
        assert_eq!(store.persist_calls, 2);
    }

    #[tokio::test]
    async fn test_sustained_contention_gives_up_after_bounded_attempts() {
        let mut store = MemoryStore {
            sabotage: MAX_NUMBERING_ATTEMPTS,
            ..MemoryStore::default()
        };
        let mut ep = episode(EpisodeStatus::Published, None);
        let failure = save(&mut store, &mut ep, false).await.unwrap_err();
        assert_eq!(store.persist_calls, MAX_NUMBERING_ATTEMPTS);
        assert_eq!(ep.number, None);
        match failure {
            SaveFailure::Conflict(errors) => {
                assert!(errors.errors().iter().any(|e| e.field == "number"));
            }
            SaveFailure::Store(err) => panic!("expected a conflict, got {err}"),
        }
    }

    #[tokio::test]
    async fn test_manual_number_is_never_overwritten() {
        let mut store = MemoryStore {
            published_numbers: vec![1, 2],
            ..MemoryStore::default()
        };
        let mut ep = episode(EpisodeStatus::Published, Some(82));
        save(&mut store, &mut ep, false).await.unwrap();
        assert_eq!(ep.number, Some(82));
        // timestamping is independent of who picked the number
        assert!(ep.published_at.is_some());
    }

    #[tokio::test]
    async fn test_manual_number_conflict_is_not_retried() {
        let mut store = MemoryStore {
            published_numbers: vec![82],
            ..MemoryStore::default()
        };
        let mut ep = episode(EpisodeStatus::Published, Some(82));
        let failure = save(&mut store, &mut ep, false).await.unwrap_err();
        assert_eq!(store.persist_calls, 1);
        assert!(matches!(failure, SaveFailure::Conflict(_)));
        assert_eq!(ep.number, Some(82));
    }

    #[tokio::test]
    async fn test_drafts_may_share_a_number() {
        let mut store = MemoryStore::default();
        let mut first = episode(EpisodeStatus::Draft, Some(5));
        let mut second = episode(EpisodeStatus::Draft, Some(5));
        save(&mut store, &mut first, false).await.unwrap();
        save(&mut store, &mut second, false).await.unwrap();
        assert_eq!(store.saved.len(), 2);
    }
}
