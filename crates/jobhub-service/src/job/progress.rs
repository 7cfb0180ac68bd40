//! Progress subscriptions.

use futures::StreamExt;
use futures::stream::{self, BoxStream};

use jobhub_core::error::AppError;
use jobhub_core::types::JobId;
use jobhub_entity::job::Job;

use super::service::JobService;

/// Sequence of job snapshots. Dropping the stream ends the subscription.
pub type ProgressStream = BoxStream<'static, Job>;

impl JobService {
    /// Subscribes to a job's snapshots.
    ///
    /// The first item is the current snapshot; each later item is the
    /// newest committed revision at the time it is polled, so a slow reader
    /// sees fewer, fresher snapshots. The stream ends after yielding a
    /// terminal snapshot.
    pub async fn stream_progress(&self, id: JobId) -> Result<ProgressStream, AppError> {
        let rx = self.store.subscribe(id)?;

        let snapshots = stream::unfold((rx, true, false), |(mut rx, first, done)| async move {
            if done {
                return None;
            }
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let job = rx.borrow_and_update().clone();
            let terminal = job.is_terminal();
            Some((job, (rx, false, terminal)))
        });

        Ok(snapshots.boxed())
    }
}
