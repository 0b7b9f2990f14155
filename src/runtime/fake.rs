//! In-memory runtime used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bollard::models::{ContainerConfig, EndpointSettings, HostConfig};

use super::{ContainerRuntime, Result};
use crate::error::RuntimeError;
use crate::types::{ContainerSummary, ImageRecord, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListContainers,
    ListImages,
    Pull,
    Inspect,
    Stop,
    Rename,
    Remove,
    Create,
    Start,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListContainers,
    ListImages(Option<String>),
    Pull(String),
    Inspect(String),
    Stop(String),
    Rename(String, String),
    Remove(String),
    Create(String),
    Start(String),
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub snapshot: Snapshot,
    pub running: bool,
}

#[derive(Default)]
struct State {
    containers: Vec<FakeContainer>,
    images: Vec<ImageRecord>,
    published: HashMap<String, String>,
    failures: HashSet<(Op, String)>,
    calls: Vec<Call>,
    next_id: usize,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a running container whose snapshot carries one network.
    pub fn with_container(self, id: &str, name: &str, image: &str) -> Self {
        self.with_labeled_container(id, name, image, &[])
    }

    pub fn with_labeled_container(
        self,
        id: &str,
        name: &str,
        image: &str,
        labels: &[(&str, &str)],
    ) -> Self {
        let labels: HashMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let snapshot = Snapshot {
            config: ContainerConfig {
                image: Some(image.to_string()),
                env: Some(vec![format!("NAME={}", name)]),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            host_config: Some(HostConfig {
                network_mode: Some("backend".into()),
                ..Default::default()
            }),
            networks: HashMap::from([(
                "backend".to_string(),
                EndpointSettings {
                    aliases: Some(vec![name.to_string()]),
                    ..Default::default()
                },
            )]),
        };
        self.state.lock().unwrap().containers.push(FakeContainer {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            labels,
            snapshot,
            running: true,
        });
        self
    }

    /// Marks `id` as started with `--rm`: stopping it deletes it.
    pub fn with_auto_remove(self, id: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(c) = state.containers.iter_mut().find(|c| c.id == id) {
                if let Some(host) = c.snapshot.host_config.as_mut() {
                    host.auto_remove = Some(true);
                }
            }
        }
        self
    }

    pub fn with_image(self, id: &str, tags: &[&str]) -> Self {
        self.state.lock().unwrap().images.push(ImageRecord {
            id: id.into(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    /// Makes the next pull of `reference` move the tag to `id`.
    pub fn publish(&self, reference: &str, id: &str) {
        self.state
            .lock()
            .unwrap()
            .published
            .insert(reference.into(), id.into());
    }

    pub fn fail(&self, op: Op, target: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, target.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().unwrap().containers.clone()
    }

    pub fn container_named(&self, name: &str) -> Option<FakeContainer> {
        self.containers().into_iter().find(|c| c.name == name)
    }

    /// Number of calls that change runtime state.
    pub fn mutations(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::Stop(_)
                        | Call::Rename(..)
                        | Call::Remove(_)
                        | Call::Create(_)
                        | Call::Start(_)
                )
            })
            .count()
    }

    fn enter(
        &self,
        call: Call,
        op: Op,
        target: &str,
    ) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failures.contains(&(op, target.to_string())) {
            return Err(RuntimeError::Other(format!("injected {:?} failure", op)));
        }
        Ok(state)
    }
}

fn no_such(id: &str) -> RuntimeError {
    RuntimeError::Other(format!("no such container: {}", id))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let state = self.enter(Call::ListContainers, Op::ListContainers, "")?;
        Ok(state
            .containers
            .iter()
            .filter(|c| all || c.running)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                image: c.image.clone(),
                labels: c.labels.clone(),
            })
            .collect())
    }

    async fn list_images(&self, reference: Option<&str>) -> Result<Vec<ImageRecord>> {
        let state = self.enter(
            Call::ListImages(reference.map(str::to_string)),
            Op::ListImages,
            reference.unwrap_or(""),
        )?;
        Ok(state
            .images
            .iter()
            .filter(|i| reference.map_or(true, |r| i.repo_tags.iter().any(|t| t == r)))
            .cloned()
            .collect())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        let mut state = self.enter(Call::Pull(reference.into()), Op::Pull, reference)?;
        let Some(new_id) = state.published.get(reference).cloned() else {
            return Ok(());
        };
        for image in state.images.iter_mut() {
            image.repo_tags.retain(|t| t != reference);
        }
        match state.images.iter_mut().find(|i| i.id == new_id) {
            Some(image) => image.repo_tags.push(reference.into()),
            None => state.images.push(ImageRecord {
                id: new_id,
                repo_tags: vec![reference.into()],
            }),
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<Snapshot> {
        let state = self.enter(Call::Inspect(id.into()), Op::Inspect, id)?;
        state
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.snapshot.clone())
            .ok_or_else(|| no_such(id))
    }

    async fn stop_container(&self, id: &str, _timeout_secs: i64) -> Result<()> {
        let mut state = self.enter(Call::Stop(id.into()), Op::Stop, id)?;
        let c = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such(id))?;
        c.running = false;
        let auto_remove = c
            .snapshot
            .host_config
            .as_ref()
            .and_then(|h| h.auto_remove)
            .unwrap_or(false);
        if auto_remove {
            state.containers.retain(|c| c.id != id);
        }
        Ok(())
    }

    async fn rename_container(&self, id: &str, name: &str) -> Result<()> {
        let mut state = self.enter(Call::Rename(id.into(), name.into()), Op::Rename, id)?;
        if state.containers.iter().any(|c| c.name == name && c.id != id) {
            return Err(RuntimeError::Other(format!("name {} already in use", name)));
        }
        let c = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such(id))?;
        c.name = name.into();
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let mut state = self.enter(Call::Remove(id.into()), Op::Remove, id)?;
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id);
        if state.containers.len() == before {
            return Err(no_such(id));
        }
        Ok(())
    }

    async fn create_container(&self, name: &str, snapshot: &Snapshot) -> Result<String> {
        let mut state = self.enter(Call::Create(name.into()), Op::Create, name)?;
        if state.containers.iter().any(|c| c.name == name) {
            return Err(RuntimeError::Other(format!("name {} already in use", name)));
        }
        state.next_id += 1;
        let id = format!("new-{}", state.next_id);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.into(),
            image: snapshot.config.image.clone().unwrap_or_default(),
            labels: snapshot.config.labels.clone().unwrap_or_default(),
            snapshot: snapshot.clone(),
            running: false,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.enter(Call::Start(id.into()), Op::Start, id)?;
        let c = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such(id))?;
        c.running = true;
        Ok(())
    }
}
