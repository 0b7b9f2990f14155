//! Inventory collection: which references are running, and which image
//! each of those tags points at right now.

use crate::error::ReconcileError;
use crate::events::{EventSink, Stage};
use crate::runtime::ContainerRuntime;
use crate::types::{ContainerRecord, Inventory, RunningIndex};

/// Builds the inventory for one pass.
///
/// Both listings are required. If either fails there is no inventory.
pub async fn collect<R>(
    runtime: &R,
    sink: &dyn EventSink,
    include_stopped: bool,
) -> Result<Inventory, ReconcileError>
where
    R: ContainerRuntime + ?Sized,
{
    sink.info(Stage::Container, "runtime", "gathering container".into());
    let containers = runtime
        .list_containers(include_stopped)
        .await
        .map_err(|source| ReconcileError::Inventory {
            what: "containers",
            source,
        })?;

    sink.info(Stage::Images, "runtime", "gathering images".into());
    let images = runtime
        .list_images(None)
        .await
        .map_err(|source| ReconcileError::Inventory {
            what: "images",
            source,
        })?;

    let mut running = RunningIndex::new();
    for summary in containers {
        let record = ContainerRecord::from_summary(summary);
        sink.debug(
            Stage::Container,
            &record.name,
            format!("found {} running {}", record.id, record.image),
        );
        running.insert(record);
    }

    let mut inventory = Inventory {
        running,
        ..Default::default()
    };
    for image in images {
        for tag in image.repo_tags {
            if inventory.running.get(&tag).is_some() {
                inventory.current.insert(tag, image.id.clone());
            }
        }
    }

    sink.info(
        Stage::Container,
        "runtime",
        format!(
            "{} containers across {} references",
            inventory.running.container_count(),
            inventory.running.len()
        ),
    );
    Ok(inventory)
}
