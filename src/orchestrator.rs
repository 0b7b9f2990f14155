//! Recreation of containers whose image moved.
//!
//! The old container is never deleted before its replacement runs:
//!
//! 1. snapshot the old container's configuration,
//! 2. stop it and park it under `<name><backup_suffix>`,
//! 3. create the replacement under the original name,
//! 4. start the replacement,
//! 5. remove the parked container.
//!
//! If any of steps 2 to 4 fails the old container gets its name back and
//! is started again. Auto-remove containers vanish on stop, so they are
//! removed and recreated directly instead.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::error::{ReconcileError, RuntimeError};
use crate::events::{EventSink, Stage};
use crate::runtime::ContainerRuntime;
use crate::types::{ContainerOutcome, ContainerRecord, Snapshot, UpdatePlan};

#[derive(Debug, Clone)]
pub struct RecreateSettings {
    pub excluded_labels: Vec<String>,
    pub stop_timeout_secs: i64,
    pub backup_suffix: String,
    pub dry_run: bool,
}

/// Result for one container of a plan.
#[derive(Debug)]
pub struct ContainerReport {
    pub name: String,
    pub reference: String,
    pub result: Result<ContainerOutcome, ReconcileError>,
    /// Failure after the replacement was already running.
    pub cleanup: Option<ReconcileError>,
}

/// True when a label marks the container as owned by another controller.
pub fn is_externally_managed(labels: &HashMap<String, String>, reserved: &[String]) -> bool {
    reserved.iter().any(|key| labels.contains_key(key))
}

/// Works through every container of `plan`, one at a time.
///
/// Cancellation is only observed between containers.
pub async fn apply<R>(
    runtime: &R,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
    settings: &RecreateSettings,
    plan: &UpdatePlan,
) -> Vec<ContainerReport>
where
    R: ContainerRuntime + ?Sized,
{
    let mut reports = Vec::with_capacity(plan.containers.len());
    for container in &plan.containers {
        let mut cleanup = None;
        let result = if cancel.is_cancelled() {
            Ok(ContainerOutcome::Cancelled)
        } else if is_externally_managed(&container.labels, &settings.excluded_labels) {
            sink.info(
                Stage::Recreate,
                &container.name,
                format!("{} is managed by an external orchestrator, skipping", container.name),
            );
            Ok(ContainerOutcome::ExternallyManaged)
        } else if settings.dry_run {
            sink.info(
                Stage::Recreate,
                &container.name,
                format!("would recreate {} with image {}", container.name, plan.reference),
            );
            Ok(ContainerOutcome::DryRun)
        } else {
            recreate(runtime, sink, settings, &plan.reference, container)
                .await
                .map(|done| {
                    cleanup = done.cleanup;
                    ContainerOutcome::Recreated {
                        new_id: done.new_id,
                    }
                })
        };

        reports.push(ContainerReport {
            name: container.name.clone(),
            reference: plan.reference.clone(),
            result,
            cleanup,
        });
    }
    reports
}

struct Recreation {
    new_id: String,
    cleanup: Option<ReconcileError>,
}

async fn recreate<R>(
    runtime: &R,
    sink: &dyn EventSink,
    settings: &RecreateSettings,
    reference: &str,
    container: &ContainerRecord,
) -> Result<Recreation, ReconcileError>
where
    R: ContainerRuntime + ?Sized,
{
    let name = container.name.as_str();

    let snapshot = match runtime.inspect_container(&container.id).await {
        Ok(snapshot) => snapshot,
        Err(source) => {
            sink.error(Stage::GetConfig, name, source.to_string());
            return Err(ReconcileError::Snapshot {
                container: name.to_string(),
                reference: reference.to_string(),
                source,
            });
        }
    };

    // The engine deletes an auto-remove container as soon as it stops, so
    // it can't be parked.
    let auto_remove = snapshot
        .host_config
        .as_ref()
        .and_then(|h| h.auto_remove)
        .unwrap_or(false);
    if auto_remove {
        return replace(runtime, sink, reference, container, &snapshot).await;
    }

    if let Err(source) = runtime
        .stop_container(&container.id, settings.stop_timeout_secs)
        .await
    {
        sink.error(Stage::Stop, name, format!("can't stop {}: {}", name, source));
        // A failed stop may still have killed the container.
        restore(runtime, sink, container, reference, name, false).await?;
        return Err(remove_error(container, reference, "stop", source));
    }
    sink.info(Stage::Stop, name, format!("Successfully stopped {}", name));

    let parked = format!("{}{}", name, settings.backup_suffix);
    if let Err(source) = runtime.rename_container(&container.id, &parked).await {
        sink.error(
            Stage::Stop,
            name,
            format!("can't rename {} to {}: {}", name, parked, source),
        );
        restore(runtime, sink, container, reference, &parked, false).await?;
        return Err(remove_error(container, reference, "rename", source));
    }

    let new_id = match runtime.create_container(name, &snapshot).await {
        Ok(id) => id,
        Err(source) => {
            sink.error(Stage::Recreate, name, format!("can't create {}: {}", name, source));
            restore(runtime, sink, container, reference, &parked, true).await?;
            return Err(ReconcileError::Create {
                container: name.to_string(),
                reference: reference.to_string(),
                source,
            });
        }
    };

    if let Err(source) = runtime.start_container(&new_id).await {
        sink.error(Stage::Recreate, name, format!("can't start {}: {}", name, source));
        // The failed replacement still holds the name.
        if let Err(err) = runtime.remove_container(&new_id).await {
            sink.error(
                Stage::Rollback,
                name,
                format!("can't remove failed replacement {}: {}", new_id, err),
            );
            return Err(rollback_error(container, reference, &parked, err));
        }
        restore(runtime, sink, container, reference, &parked, true).await?;
        return Err(ReconcileError::Start {
            container: name.to_string(),
            reference: reference.to_string(),
            source,
        });
    }
    sink.info(
        Stage::Recreate,
        name,
        format!("created new container {} with image {}", name, reference),
    );

    let cleanup = match runtime.remove_container(&container.id).await {
        Ok(()) => {
            sink.debug(Stage::RemoveContainer, &parked, format!("removed {}", parked));
            None
        }
        Err(source) => {
            sink.error(
                Stage::RemoveContainer,
                &parked,
                format!("can't remove {}: {}", parked, source),
            );
            Some(ReconcileError::Remove {
                container: parked,
                reference: reference.to_string(),
                step: "remove",
                source,
            })
        }
    };

    Ok(Recreation { new_id, cleanup })
}

/// Remove-then-create for containers that can't outlive a stop.
///
/// There is nothing to roll back to if create or start fails.
async fn replace<R>(
    runtime: &R,
    sink: &dyn EventSink,
    reference: &str,
    container: &ContainerRecord,
    snapshot: &Snapshot,
) -> Result<Recreation, ReconcileError>
where
    R: ContainerRuntime + ?Sized,
{
    let name = container.name.as_str();

    if let Err(source) = runtime.remove_container(&container.id).await {
        sink.error(Stage::Stop, name, format!("can't remove {}: {}", name, source));
        return Err(remove_error(container, reference, "remove", source));
    }
    sink.info(Stage::Stop, name, format!("Successfully removed {}", name));

    let new_id = match runtime.create_container(name, snapshot).await {
        Ok(id) => id,
        Err(source) => {
            sink.error(Stage::Recreate, name, format!("can't create {}: {}", name, source));
            return Err(ReconcileError::Create {
                container: name.to_string(),
                reference: reference.to_string(),
                source,
            });
        }
    };
    if let Err(source) = runtime.start_container(&new_id).await {
        sink.error(Stage::Recreate, name, format!("can't start {}: {}", name, source));
        return Err(ReconcileError::Start {
            container: name.to_string(),
            reference: reference.to_string(),
            source,
        });
    }
    sink.info(
        Stage::Recreate,
        name,
        format!("created new container {} with image {}", name, reference),
    );

    Ok(Recreation {
        new_id,
        cleanup: None,
    })
}

/// Puts the parked container back under its own name and starts it.
async fn restore<R>(
    runtime: &R,
    sink: &dyn EventSink,
    container: &ContainerRecord,
    reference: &str,
    parked: &str,
    renamed: bool,
) -> Result<(), ReconcileError>
where
    R: ContainerRuntime + ?Sized,
{
    let name = container.name.as_str();
    if renamed {
        if let Err(err) = runtime.rename_container(&container.id, name).await {
            sink.error(
                Stage::Rollback,
                name,
                format!("can't rename {} back to {}: {}", parked, name, err),
            );
            return Err(rollback_error(container, reference, parked, err));
        }
    }
    if let Err(err) = runtime.start_container(&container.id).await {
        sink.error(Stage::Rollback, name, format!("can't restart {}: {}", name, err));
        return Err(rollback_error(container, reference, parked, err));
    }
    sink.warn(Stage::Rollback, name, format!("restored previous {}", name));
    Ok(())
}

fn remove_error(
    container: &ContainerRecord,
    reference: &str,
    step: &'static str,
    source: RuntimeError,
) -> ReconcileError {
    ReconcileError::Remove {
        container: container.name.clone(),
        reference: reference.to_string(),
        step,
        source,
    }
}

fn rollback_error(
    container: &ContainerRecord,
    reference: &str,
    parked: &str,
    source: RuntimeError,
) -> ReconcileError {
    ReconcileError::Rollback {
        container: container.name.clone(),
        parked: parked.to_string(),
        reference: reference.to_string(),
        source,
    }
}
