//! Structured events emitted by every reconciliation step.
//!
//! Components never talk to the global logger.  They are handed an
//! [`EventSink`] and report through it, tagging each event with a
//! [`Stage`].  The stage strings are what log-based monitoring keys on,
//! so they must stay stable.

use std::fmt;

use log::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Container,
    Images,
    Pull,
    GetImage,
    GetConfig,
    Stop,
    Recreate,
    RemoveContainer,
    Rollback,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Container => "container",
            Stage::Images => "images",
            Stage::Pull => "pull",
            Stage::GetImage => "get image",
            Stage::GetConfig => "get config",
            Stage::Stop => "stop",
            Stage::Recreate => "recreate",
            Stage::RemoveContainer => "remove container",
            Stage::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub stage: Stage,
    /// Reference or container name the event is about.
    pub target: String,
    pub message: String,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);

    fn debug(&self, stage: Stage, target: &str, message: String) {
        self.emit(Event {
            level: Level::Debug,
            stage,
            target: target.to_string(),
            message,
        });
    }

    fn info(&self, stage: Stage, target: &str, message: String) {
        self.emit(Event {
            level: Level::Info,
            stage,
            target: target.to_string(),
            message,
        });
    }

    fn warn(&self, stage: Stage, target: &str, message: String) {
        self.emit(Event {
            level: Level::Warn,
            stage,
            target: target.to_string(),
            message,
        });
    }

    fn error(&self, stage: Stage, target: &str, message: String) {
        self.emit(Event {
            level: Level::Error,
            stage,
            target: target.to_string(),
            message,
        });
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        log::log!(
            event.level,
            "stage={} target={}: {}",
            event.stage,
            event.target,
            event.message
        );
    }
}
