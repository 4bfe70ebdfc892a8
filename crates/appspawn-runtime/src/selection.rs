//! Choosing a spawn strategy from the `spawn_method` hint.

use async_trait::async_trait;

use appspawn_core::{
    ProcessHandle, ServerError, Settings, SpawnMethod, SpawnOptions, Spawner, SpawnerError,
};

use crate::conservative::ConservativeSpawner;
use crate::error::SetupError;
use crate::preloading::PreloadingSpawnServer;

/// The strategy picked for an application.
pub enum SpawnStrategy {
    Smart(PreloadingSpawnServer),
    Conservative(ConservativeSpawner),
}

/// Build the spawner `options.spawn_method` asks for.
///
/// A smart spawner still needs [`SpawnStrategy::prepare`] to start its
/// backend before the first spawn.
pub fn select_spawner(options: &SpawnOptions, settings: &Settings) -> Result<SpawnStrategy, SetupError> {
    match options.spawn_method {
        SpawnMethod::Smart => Ok(SpawnStrategy::Smart(PreloadingSpawnServer::new(
            options.clone(),
            settings,
        )?)),
        SpawnMethod::Conservative => Ok(SpawnStrategy::Conservative(ConservativeSpawner::new(
            settings,
        )?)),
    }
}

impl SpawnStrategy {
    pub const fn method(&self) -> SpawnMethod {
        match self {
            Self::Smart(_) => SpawnMethod::Smart,
            Self::Conservative(_) => SpawnMethod::Conservative,
        }
    }

    /// Start the preloading backend, if any.
    pub async fn prepare(&self) -> Result<(), ServerError> {
        match self {
            Self::Smart(server) => server.start().await,
            Self::Conservative(_) => Ok(()),
        }
    }

    /// Stop the preloading backend, if any. Workers keep running.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        match self {
            Self::Smart(server) => server.stop().await,
            Self::Conservative(_) => Ok(()),
        }
    }
}

#[async_trait]
impl Spawner for SpawnStrategy {
    async fn spawn_application(
        &self,
        options: &SpawnOptions,
    ) -> Result<ProcessHandle, SpawnerError> {
        match self {
            Self::Smart(server) => server.spawn_application(options).await,
            Self::Conservative(spawner) => spawner.spawn_application(options).await,
        }
    }
}
