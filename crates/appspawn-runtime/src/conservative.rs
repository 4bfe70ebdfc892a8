//! Conservative spawning: every worker boots from scratch.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use appspawn_core::protocol::encode_frame;
use appspawn_core::{
    APP_ENV_VAR, AgentRole, OwnerPipe, ProcessHandle, Settings, SpawnError, SpawnMethod,
    SpawnOptions, Spawner, SpawnerError, Transport, WorkerBoot, run_root, sockets_dir,
};

use crate::error::SetupError;
use crate::handshake::{BootSpec, StderrTarget, launch, reap_in_background};
use crate::launch::{agent_command, allocate_endpoint, resolve_agent_path, resolve_run_as};

/// Spawner that cold-boots one agent worker per call.
///
/// Calls share nothing: no backend, no lock, no `AlreadyStarted`.
#[derive(Debug, Clone)]
pub struct ConservativeSpawner {
    agent: PathBuf,
    sockets_dir: PathBuf,
    transport: Transport,
    spawn_timeout: Duration,
    ping_timeout: Duration,
}

impl ConservativeSpawner {
    pub fn new(settings: &Settings) -> Result<Self, SetupError> {
        let root = run_root(settings)?;
        Ok(Self {
            agent: resolve_agent_path(settings)?,
            sockets_dir: sockets_dir(&root)?,
            transport: settings.transport(),
            spawn_timeout: settings.spawn_timeout(),
            ping_timeout: settings.ping_timeout(),
        })
    }
}

#[async_trait]
impl Spawner for ConservativeSpawner {
    async fn spawn_application(
        &self,
        options: &SpawnOptions,
    ) -> Result<ProcessHandle, SpawnerError> {
        options.validate()?;
        let run_as = resolve_run_as(options.user.as_deref())?;

        let endpoint = allocate_endpoint(self.transport, &self.sockets_dir, "worker");
        let mut cmd = agent_command(&self.agent, AgentRole::Worker, &endpoint);
        cmd.env(APP_ENV_VAR, &options.environment).envs(&options.env);
        if let Some(run_as) = run_as {
            run_as.apply(&mut cmd);
        }

        let frame = encode_frame(&WorkerBoot::Cold {
            options: options.clone(),
        })?;
        let launched = launch(cmd, &StderrTarget::Capture).map_err(SpawnError::from)?;
        let spec = BootSpec {
            endpoint,
            timeout: self.spawn_timeout,
            ping_timeout: self.ping_timeout,
            keep_stdin: !options.detached,
        };
        let booted = launched
            .handshake(&frame, &spec)
            .await
            .map_err(SpawnError::from)?;

        let mut handle = ProcessHandle::new(
            booted.pid,
            booted.endpoint.clone(),
            SpawnMethod::Conservative,
        );
        if let Some(stdin) = booted.stdin {
            handle = handle.with_owner_pipe(OwnerPipe::new(stdin));
        }
        info!(pid = handle.pid, endpoint = %handle.endpoint, detached = options.detached, "Spawned cold worker");

        reap_in_background(booted.child, booted.pid, booted.endpoint);
        Ok(handle)
    }
}
