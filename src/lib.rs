use std::sync::Arc;

mod domain;
mod interfaces;
mod infrastructure;
pub mod errors;
pub mod settings;
pub mod constants;
pub mod graceful_shutdown;
pub mod background_task;

pub use domain::{date_grouping, entities, use_cases};
pub use interfaces::{handlers, repositories, routes};
pub use infrastructure::{documents, kv, limiter, media, utils};

use date_grouping::DateGroupingEngine;
use entities::family_config::FamilyConfig;
use errors::AppError;
use kv::FileKeyValueStore;
use media::CloudinaryAdmin;
use repositories::gateway::{GatewayOptions, PersistenceGateway};
use settings::AppConfig;

pub struct AppState {
    pub gateway: Arc<PersistenceGateway>,
    pub engine: DateGroupingEngine,
    pub media_admin: Option<CloudinaryAdmin>,
}

impl AppState {
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        engine: DateGroupingEngine,
        media_admin: Option<CloudinaryAdmin>,
    ) -> Self {
        AppState { gateway, engine, media_admin }
    }

    /// Opens the local profile store, selects the persistence backend and
    /// configures the date engine from the stored family settings.
    pub async fn build(config: &AppConfig) -> Result<Self, AppError> {
        let store = FileKeyValueStore::open(&config.data_dir)?;
        let gateway = Arc::new(PersistenceGateway::new(Arc::new(store), GatewayOptions::from(config)));

        let family = gateway.load_family_config(FamilyConfig::defaults(config))?;

        if family.use_remote {
            match &config.remote {
                Some(credentials) => {
                    gateway.init_remote(credentials).await;
                }
                None => {
                    tracing::warn!("Remote storage requested without credentials, using local storage");
                    gateway.use_local_only();
                }
            }
        } else {
            gateway.use_local_only();
        }

        let engine = DateGroupingEngine::new(family.dday).with_convention(config.epoch_convention);

        let media_admin = CloudinaryAdmin::from_config(&config.cloudinary);
        if media_admin.is_none() {
            tracing::warn!("Cloudinary admin credentials missing, media endpoints run as no-ops");
        }

        Ok(AppState::new(gateway, engine, media_admin))
    }
}
