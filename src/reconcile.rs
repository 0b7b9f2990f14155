//! One reconciliation pass: collect, detect, recreate, report.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::detector::{check_for_update, Detection};
use crate::error::{Policy, ReconcileError};
use crate::events::EventSink;
use crate::inventory;
use crate::orchestrator::{apply, ContainerReport, RecreateSettings};
use crate::runtime::ContainerRuntime;
use crate::types::{ContainerOutcome, ContainerRecord};

#[derive(Debug, Clone)]
pub struct PassSettings {
    pub include_stopped: bool,
    /// Image references processed at the same time.
    pub concurrency: usize,
    pub recreate: RecreateSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedReference {
    pub reference: String,
    pub previous_id: String,
    pub new_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recreated {
    pub name: String,
    pub reference: String,
    pub new_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub stage: String,
    pub target: String,
    pub reference: String,
    pub message: String,
}

/// Aggregate of everything that happened during a pass.
#[derive(Debug, Default, Serialize)]
pub struct PassReport {
    pub references_checked: usize,
    pub updated: Vec<UpdatedReference>,
    pub recreated: Vec<Recreated>,
    pub skipped: Vec<String>,
    pub failures: Vec<Failure>,
    pub cancelled: bool,
}

impl PassReport {
    /// A clean pass finished everything it started without failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    fn record_error(&mut self, reference: &str, err: &ReconcileError) {
        match err.policy() {
            Policy::AbortPass => self.cancelled = true,
            Policy::SkipReference | Policy::SkipContainer | Policy::ReportContainer => {
                self.failures.push(Failure {
                    stage: err.stage().to_string(),
                    target: err.target().to_string(),
                    reference: reference.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn record_containers(&mut self, reports: Vec<ContainerReport>) {
        for report in reports {
            if let Some(err) = &report.cleanup {
                self.record_error(&report.reference, err);
            }
            match report.result {
                Ok(ContainerOutcome::Recreated { new_id }) => self.recreated.push(Recreated {
                    name: report.name,
                    reference: report.reference,
                    new_id,
                }),
                Ok(ContainerOutcome::ExternallyManaged | ContainerOutcome::DryRun) => {
                    self.skipped.push(report.name)
                }
                Ok(ContainerOutcome::Cancelled) => self.cancelled = true,
                Err(err) => self.record_error(&report.reference, &err),
            }
        }
    }
}

struct ReferenceResult {
    reference: String,
    detection: Result<Detection, ReconcileError>,
    containers: Vec<ContainerReport>,
}

/// Runs a full pass.
///
/// Only an inventory failure is returned as `Err`; everything else is
/// collected into the report while the pass keeps going.
pub async fn run_pass<R>(
    runtime: &R,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
    settings: &PassSettings,
) -> Result<PassReport, ReconcileError>
where
    R: ContainerRuntime + ?Sized,
{
    let inventory = inventory::collect(runtime, sink, settings.include_stopped).await?;

    // Every reference key is unique and every container sits under exactly
    // one key, so concurrent futures never share a pull or a container.
    let results: Vec<ReferenceResult> = stream::iter(inventory.running.iter())
        .map(|(reference, containers)| {
            process_reference(
                runtime,
                sink,
                cancel,
                &settings.recreate,
                reference,
                inventory.current_id(reference),
                containers,
            )
        })
        .buffer_unordered(settings.concurrency.max(1))
        .collect()
        .await;

    let mut report = PassReport {
        references_checked: results.len(),
        ..Default::default()
    };
    for result in results {
        match result.detection {
            Ok(Detection::Update(plan)) => report.updated.push(UpdatedReference {
                reference: plan.reference,
                previous_id: plan.previous_id,
                new_id: plan.new_id,
            }),
            Ok(Detection::Skip(_)) => {}
            Err(err) => report.record_error(&result.reference, &err),
        }
        report.record_containers(result.containers);
    }
    Ok(report)
}

async fn process_reference<R>(
    runtime: &R,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
    settings: &RecreateSettings,
    reference: &str,
    current_id: Option<&str>,
    containers: &[ContainerRecord],
) -> ReferenceResult
where
    R: ContainerRuntime + ?Sized,
{
    let detection =
        check_for_update(runtime, sink, cancel, reference, current_id, containers).await;
    let containers = match &detection {
        Ok(Detection::Update(plan)) => apply(runtime, sink, cancel, settings, plan).await,
        _ => Vec::new(),
    };
    ReferenceResult {
        reference: reference.to_string(),
        detection,
        containers,
    }
}
