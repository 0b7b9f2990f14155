//! Update detection: pull a reference and see whether its tag moved.

use tokio_util::sync::CancellationToken;

use crate::error::{ReconcileError, RuntimeError};
use crate::events::{EventSink, Stage};
use crate::runtime::ContainerRuntime;
use crate::types::{is_pinned, ContainerRecord, UpdatePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Digest references never move.
    Pinned,
    /// No local image carries the tag, so there is nothing to compare.
    Untracked,
    /// The tag still points at the deployed image.
    Unchanged,
}

#[derive(Debug, Clone)]
pub enum Detection {
    Update(UpdatePlan),
    Skip(SkipReason),
}

pub async fn check_for_update<R>(
    runtime: &R,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
    reference: &str,
    current_id: Option<&str>,
    containers: &[ContainerRecord],
) -> Result<Detection, ReconcileError>
where
    R: ContainerRuntime + ?Sized,
{
    if is_pinned(reference) {
        sink.debug(Stage::Pull, reference, "pinned by digest, skipping".into());
        return Ok(Detection::Skip(SkipReason::Pinned));
    }
    let Some(old_id) = current_id else {
        // Also where containers land once their tag moved without them.
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        sink.warn(
            Stage::Pull,
            reference,
            format!(
                "no local image tagged {}, not tracking {}",
                reference,
                names.join(", ")
            ),
        );
        return Ok(Detection::Skip(SkipReason::Untracked));
    };

    if cancel.is_cancelled() {
        return Err(ReconcileError::Cancelled);
    }
    sink.info(Stage::Pull, reference, reference.to_string());
    if let Err(source) = runtime.pull_image(reference).await {
        sink.error(Stage::Pull, reference, format!("can't pull {}", reference));
        return Err(ReconcileError::Fetch {
            reference: reference.to_string(),
            source,
        });
    }

    if cancel.is_cancelled() {
        return Err(ReconcileError::Cancelled);
    }
    let new_id = match resolve(runtime, reference).await {
        Ok(id) => id,
        Err(source) => {
            sink.error(Stage::GetImage, reference, source.to_string());
            return Err(ReconcileError::ReconcileQuery {
                reference: reference.to_string(),
                source,
            });
        }
    };

    let plan = UpdatePlan {
        reference: reference.to_string(),
        previous_id: old_id.to_string(),
        new_id,
        containers: containers.to_vec(),
    };
    if !plan.is_actionable() {
        sink.debug(Stage::Pull, reference, "image is up to date".into());
        return Ok(Detection::Skip(SkipReason::Unchanged));
    }

    sink.info(
        Stage::Pull,
        reference,
        format!("pulled new image for {}", reference),
    );
    Ok(Detection::Update(plan))
}

/// Identity the tag points at after the pull.
async fn resolve<R>(runtime: &R, reference: &str) -> Result<String, RuntimeError>
where
    R: ContainerRuntime + ?Sized,
{
    let images = runtime.list_images(Some(reference)).await?;
    images
        .into_iter()
        .find(|i| i.repo_tags.iter().any(|t| t == reference))
        .map(|i| i.id)
        .ok_or_else(|| RuntimeError::Other(format!("no image tagged {} after pull", reference)))
}
