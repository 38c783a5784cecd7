use std::sync::Arc;

use crate::models::events::StatusEvent;
use crate::models::job::Job;

/// Merge a push event into a displayed job collection.
///
/// Collections are replaced, never edited: when the event changes a job the
/// result is a new collection, otherwise it is the same `Arc` (pointer-equal).
/// Events for ids the collection does not hold are ignored; the push channel
/// never adds rows.
pub fn apply_event(event: &StatusEvent, jobs: &Arc<[Job]>) -> Arc<[Job]> {
    let Some(patch) = event.patch() else {
        return Arc::clone(jobs);
    };

    let changed = jobs
        .iter()
        .any(|job| job.id == patch.id && job.merged(patch) != *job);
    if !changed {
        tracing::trace!(job_id = %patch.id, "Status event left collection unchanged");
        return Arc::clone(jobs);
    }

    metrics::counter!("push_events_applied_total").increment(1);
    tracing::debug!(job_id = %patch.id, status = ?patch.status, "Applying status event");

    jobs.iter()
        .map(|job| {
            if job.id == patch.id {
                job.merged(patch)
            } else {
                job.clone()
            }
        })
        .collect()
}

/// Drop a job after the backend confirmed its deletion.
pub fn remove_job(jobs: &Arc<[Job]>, job_id: &str) -> Arc<[Job]> {
    if !jobs.iter().any(|job| job.id == job_id) {
        return Arc::clone(jobs);
    }
    jobs.iter().filter(|job| job.id != job_id).cloned().collect()
}
