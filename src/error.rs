use crate::events::Stage;

/// Failure of a single call against the container runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Api(#[from] bollard::errors::Error),
    #[error("{0}")]
    Other(String),
}

/// What a pass does after an error of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Stop the whole pass.
    AbortPass,
    /// Drop this reference, keep going with the others.
    SkipReference,
    /// Leave this container untouched, keep going.
    SkipContainer,
    /// The container may need manual attention; keep going.
    ReportContainer,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to list {what}: {source}")]
    Inventory {
        what: &'static str,
        #[source]
        source: RuntimeError,
    },
    #[error("can't pull {reference}: {source}")]
    Fetch {
        reference: String,
        #[source]
        source: RuntimeError,
    },
    #[error("can't resolve {reference} after pull: {source}")]
    ReconcileQuery {
        reference: String,
        #[source]
        source: RuntimeError,
    },
    #[error("can't inspect {container} ({reference}): {source}")]
    Snapshot {
        container: String,
        reference: String,
        #[source]
        source: RuntimeError,
    },
    #[error("can't {step} {container} ({reference}): {source}")]
    Remove {
        container: String,
        reference: String,
        step: &'static str,
        #[source]
        source: RuntimeError,
    },
    #[error("can't create replacement for {container} ({reference}): {source}")]
    Create {
        container: String,
        reference: String,
        #[source]
        source: RuntimeError,
    },
    #[error("can't start replacement for {container} ({reference}): {source}")]
    Start {
        container: String,
        reference: String,
        #[source]
        source: RuntimeError,
    },
    #[error("can't restore {container} from {parked} ({reference}): {source}")]
    Rollback {
        container: String,
        parked: String,
        reference: String,
        #[source]
        source: RuntimeError,
    },
    #[error("pass cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub fn policy(&self) -> Policy {
        match self {
            ReconcileError::Inventory { .. } | ReconcileError::Cancelled => Policy::AbortPass,
            ReconcileError::Fetch { .. } | ReconcileError::ReconcileQuery { .. } => {
                Policy::SkipReference
            }
            ReconcileError::Snapshot { .. } => Policy::SkipContainer,
            ReconcileError::Remove { .. }
            | ReconcileError::Create { .. }
            | ReconcileError::Start { .. }
            | ReconcileError::Rollback { .. } => Policy::ReportContainer,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            ReconcileError::Inventory { what, .. } if *what == "images" => Stage::Images,
            ReconcileError::Inventory { .. } => Stage::Container,
            ReconcileError::Fetch { .. } => Stage::Pull,
            ReconcileError::ReconcileQuery { .. } => Stage::GetImage,
            ReconcileError::Snapshot { .. } => Stage::GetConfig,
            ReconcileError::Remove { step, .. } if *step == "remove" => Stage::RemoveContainer,
            ReconcileError::Remove { .. } => Stage::Stop,
            ReconcileError::Create { .. } | ReconcileError::Start { .. } => Stage::Recreate,
            ReconcileError::Rollback { .. } => Stage::Rollback,
            ReconcileError::Cancelled => Stage::Container,
        }
    }

    /// Reference or container the error is about.
    pub fn target(&self) -> &str {
        match self {
            ReconcileError::Inventory { what, .. } => *what,
            ReconcileError::Fetch { reference, .. }
            | ReconcileError::ReconcileQuery { reference, .. } => reference,
            ReconcileError::Snapshot { container, .. }
            | ReconcileError::Remove { container, .. }
            | ReconcileError::Create { container, .. }
            | ReconcileError::Start { container, .. }
            | ReconcileError::Rollback { container, .. } => container,
            ReconcileError::Cancelled => "pass",
        }
    }
}
