//! Moves job output into the durable content store.

use dkpublish_interchange::publishing_id;
use dkpublish_storage::{ContentRecord, JobKind, PublishingStore};
use time::{Duration, OffsetDateTime};

use super::abort;
use crate::error::EngineError;

/// Smallest max-age handed to content delivery.
pub const MIN_MAX_AGE_SECS: i64 = 60;

/// Write every job output of `job` as content and release the staging area,
/// in one snapshot. Returns the number of artifacts written.
pub async fn write_job_output<S: PublishingStore>(
    store: &S,
    job: JobKind,
) -> Result<usize, EngineError> {
    let outputs = store.list_job_output(job).await?;
    let written = outputs.len();

    let mut snapshot = store.begin_snapshot().await?;
    let staged = async {
        for output in outputs {
            let record = ContentRecord {
                id: 0,
                content_type: output.content_type,
                created: output.created,
                release: output.release,
                publishing_id: publishing_id(&output.content),
                content: output.content,
            };
            store.insert_content(&mut snapshot, record).await?;
        }
        store.clear_job(&mut snapshot, job).await
    }
    .await;
    if let Err(e) = staged {
        abort(store, snapshot).await;
        return Err(e.into());
    }
    store.commit_snapshot(snapshot).await?;
    Ok(written)
}

/// Remaining lifetime of an artifact created at `created`, in seconds,
/// never below [`MIN_MAX_AGE_SECS`].
pub fn max_age_secs(created: OffsetDateTime, now: OffsetDateTime, lifetime_days: i64) -> i64 {
    let expires = created + Duration::days(lifetime_days);
    (expires - now).whole_seconds().max(MIN_MAX_AGE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkpublish_storage::{ContentType, JobOutput, MemoryStore};
    use time::macros::datetime;

    #[tokio::test]
    async fn output_becomes_content_and_staging_is_released() {
        let store = MemoryStore::new();
        let at = datetime!(2020-10-23 12:00:00 UTC);
        let mut snap = store.begin_snapshot().await.unwrap();
        for content in [b"one".to_vec(), b"two".to_vec()] {
            store
                .insert_job_output(
                    &mut snap,
                    JobKind::Eks,
                    JobOutput {
                        id: 0,
                        content_type: ContentType::ExposureKeySet,
                        created: at,
                        release: at,
                        key_count: 1,
                        content,
                    },
                )
                .await
                .unwrap();
        }
        store.commit_snapshot(snap).await.unwrap();

        assert_eq!(write_job_output(&store, JobKind::Eks).await.unwrap(), 2);
        let content = store.list_content(ContentType::ExposureKeySet).await.unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0].publishing_id, publishing_id(b"one"));
        assert!(store.list_job_output(JobKind::Eks).await.unwrap().is_empty());
    }

    #[test]
    fn max_age_counts_down_to_a_floor() {
        let created = datetime!(2020-10-01 00:00:00 UTC);
        assert_eq!(max_age_secs(created, created, 14), 14 * 86_400);
        assert_eq!(
            max_age_secs(created, datetime!(2020-10-14 23:59:30 UTC), 14),
            MIN_MAX_AGE_SECS
        );
        assert_eq!(
            max_age_secs(created, datetime!(2021-01-01 00:00:00 UTC), 14),
            MIN_MAX_AGE_SECS
        );
    }
}
