use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::orchestrator::RecreateSettings;
use crate::reconcile::PassSettings;

/// Label set by `docker stack deploy` on every service task.
pub const STACK_NAMESPACE_LABEL: &str = "com.docker.stack.namespace";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Label keys marking containers another controller owns.
    pub excluded_labels: Vec<String>,
    pub include_stopped: bool,
    pub concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub stop_timeout_secs: i64,
    pub backup_suffix: String,
    pub dry_run: bool,
    pub report_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            excluded_labels: vec![STACK_NAMESPACE_LABEL.into()],
            include_stopped: false,
            concurrency: 1,
            timeout_secs: None,
            stop_timeout_secs: 10,
            backup_suffix: "_reimage_old".into(),
            dry_run: false,
            report_json: false,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::figment()
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("reimage.toml"))
            .merge(Json::file("reimage.json"))
            .merge(Env::prefixed("REIMAGE_"))
    }

    pub fn pass_settings(&self) -> PassSettings {
        PassSettings {
            include_stopped: self.include_stopped,
            concurrency: self.concurrency.max(1),
            recreate: RecreateSettings {
                excluded_labels: self.excluded_labels.clone(),
                stop_timeout_secs: self.stop_timeout_secs,
                backup_suffix: self.backup_suffix.clone(),
                dry_run: self.dry_run,
            },
        }
    }
}
