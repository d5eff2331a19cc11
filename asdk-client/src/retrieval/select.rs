//! Picking an export out of an avatar's export list

use crate::error::AsdkResult;
use crate::jobs::{poll_job, ExportJob, JobFetcher, JobStatus, PollOptions};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Export requested first: reduced settings for a quick preview
pub const VISUAL_EXPORT_INDEX: usize = 0;

/// Export requested second: the user's full settings
pub const FULL_EXPORT_INDEX: usize = 1;

/// Order exports by creation time, oldest first
///
/// The sort is stable; exports without a timestamp come first.
pub fn sort_exports(exports: &mut [ExportJob]) {
    if exports.len() > 1 {
        exports.sort_by(|a, b| a.created_on.cmp(&b.created_on));
    }
}

/// Export at `index` after ordering by creation time
pub fn select_export(mut exports: Vec<ExportJob>, index: usize) -> Option<ExportJob> {
    sort_exports(&mut exports);
    exports.into_iter().nth(index)
}

/// Select an export and wait until it is completed
///
/// `Ok(None)` when the list has no export at `index`. A completed export is
/// returned as-is; anything else goes through the polling machine.
pub async fn resolve_export<F, P>(
    fetcher: &F,
    exports: Vec<ExportJob>,
    index: usize,
    options: &PollOptions,
    cancel: &CancellationToken,
    on_progress: P,
) -> AsdkResult<Option<ExportJob>>
where
    F: JobFetcher<ExportJob> + ?Sized,
    P: FnMut(&ExportJob) + Send,
{
    let Some(export) = select_export(exports, index) else {
        debug!(index, "No export at index");
        return Ok(None);
    };

    if export.status == JobStatus::Completed {
        return Ok(Some(export));
    }

    poll_job(fetcher, &export, options, cancel, on_progress)
        .await
        .map(Some)
}
