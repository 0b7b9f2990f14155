use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    NetworkingConfig, RemoveContainerOptions, RenameContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, trace};

use super::{ContainerRuntime, Result};
use crate::error::RuntimeError;
use crate::types::{ContainerSummary, ImageRecord, Snapshot};

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    pub fn connect() -> Result<Self> {
        // Honours DOCKER_HOST, otherwise the local unix socket.
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let opts = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    names: c.names.unwrap_or_default(),
                    image: c.image.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn list_images(&self, reference: Option<&str>) -> Result<Vec<ImageRecord>> {
        let mut filters = HashMap::new();
        if let Some(reference) = reference {
            filters.insert("reference".to_string(), vec![reference.to_string()]);
        }
        let opts = ListImagesOptions::<String> {
            filters,
            ..Default::default()
        };
        let images = self.docker.list_images(Some(opts)).await?;

        Ok(images
            .into_iter()
            .map(|i| ImageRecord {
                id: i.id,
                repo_tags: i.repo_tags,
            })
            .collect())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        let opts = CreateImageOptions {
            from_image: reference.to_string(),
            ..Default::default()
        };
        // The stream is owned by this scope and dropped on every return path.
        let mut stream = self.docker.create_image(Some(opts), None, None);
        while let Some(msg) = stream.next().await {
            let info = msg?;
            if let Some(err) = info.error {
                return Err(RuntimeError::Other(err));
            }
            if let Some(status) = info.status {
                trace!("pull {}: {}", reference, status);
            }
        }
        debug!("pull {} complete", reference);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<Snapshot> {
        let detail = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let config = detail
            .config
            .ok_or_else(|| RuntimeError::Other(format!("container {} has no config", id)))?;
        let networks = detail
            .network_settings
            .and_then(|s| s.networks)
            .unwrap_or_default();

        Ok(Snapshot {
            config,
            host_config: detail.host_config,
            networks,
        })
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_secs }))
            .await?;
        Ok(())
    }

    async fn rename_container(&self, id: &str, name: &str) -> Result<()> {
        self.docker
            .rename_container(
                id,
                RenameContainerOptions {
                    name: name.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let opts = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(opts)).await?;
        Ok(())
    }

    async fn create_container(&self, name: &str, snapshot: &Snapshot) -> Result<String> {
        let mut config: Config<String> = snapshot.config.clone().into();
        config.host_config = snapshot.host_config.clone();
        config.networking_config = Some(NetworkingConfig {
            endpoints_config: snapshot.networks.clone(),
        });

        let opts = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        let resp = self.docker.create_container(Some(opts), config).await?;
        for warning in &resp.warnings {
            debug!("create {}: {}", name, warning);
        }
        Ok(resp.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        match self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
        {
            // 304: already running.
            Ok(())
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
