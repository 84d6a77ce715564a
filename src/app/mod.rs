pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod storage;
pub mod store;
pub mod task_edit;
pub mod task_list;
pub mod ui;
pub mod undo;

use tracing::info;

use config::{Backend, Config};
use error::{ConfigError, PersistenceError, StoreError};
use remote::{HttpRecordService, RemoteTaskStore};
use storage::{MemorySlot, SqliteSlot};
use store::{LocalTaskStore, TaskStore};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot open local storage: {0}")]
    Storage(#[from] PersistenceError),

    #[error("cannot set up remote store: {0}")]
    Remote(#[from] StoreError),
}

// Build the store selected by the configuration
pub fn open_store(config: &Config) -> Result<Box<dyn TaskStore>, StartupError> {
    let store: Box<dyn TaskStore> = match config.backend {
        Backend::Local => {
            let path = config.database_path();
            info!(path = %path.display(), "Opening local task store");
            let slot = SqliteSlot::open(&path, &config.local.storage_key)?;
            Box::new(LocalTaskStore::open(slot).with_latency(config.latency()))
        }
        Backend::Memory => {
            info!("Opening in-memory task store");
            Box::new(LocalTaskStore::open(MemorySlot::new()).with_latency(config.latency()))
        }
        Backend::Remote => {
            let base_url = config.remote.base_url.as_deref().ok_or_else(|| {
                ConfigError::Invalid("remote backend needs remote.base_url".into())
            })?;
            info!(%base_url, table = %config.remote.table, "Opening remote task store");
            let service = HttpRecordService::new(
                base_url,
                config.remote.api_key.clone(),
                config.remote_timeout(),
            )?;
            Box::new(RemoteTaskStore::new(service, &config.remote.table))
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::LocalConfig;
    use tempfile::TempDir;

    #[test]
    fn local_backend_seeds_a_fresh_database() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            local: LocalConfig {
                path: Some(temp.path().join("nested").join("tasks.db")),
                ..LocalConfig::default()
            },
            ..Config::default()
        };

        let opened = open_store(&config).unwrap();
        let mut expected = store::default_tasks();
        store::newest_first(&mut expected);
        assert_eq!(opened.describe(), "local");
        assert_eq!(opened.get_all().unwrap(), expected);
    }

    #[test]
    fn memory_backend_does_not_touch_disk() {
        let config = Config {
            backend: Backend::Memory,
            ..Config::default()
        };
        let mut opened = open_store(&config).unwrap();
        let created = opened.create(models::NewTask::titled("scratch")).unwrap();
        assert_eq!(opened.get_by_id(created.id).unwrap().title, "scratch");
    }

    #[test]
    fn remote_backend_without_url_fails() {
        let config = Config {
            backend: Backend::Remote,
            ..Config::default()
        };
        assert!(matches!(
            open_store(&config),
            Err(StartupError::Config(ConfigError::Invalid(_)))
        ));
    }
}
