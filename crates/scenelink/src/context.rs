//! Application Context
//!
//! Shared services built once at startup and handed to the transport and the
//! scene parser by reference.

use std::sync::Arc;

use scenelink_ecs::EcModel;

use crate::assets::{AssetError, AssetManager};
use crate::config::ClientConfig;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<AppContextInner>,
}

struct AppContextInner {
    /// Effective configuration
    config: ClientConfig,

    /// Remote mesh storage
    assets: AssetManager,

    /// Live scene graph
    model: EcModel,
}

impl AppContext {
    /// Build the asset manager and the model from `config`.
    pub fn new(config: ClientConfig) -> Result<Self, AssetError> {
        let assets = AssetManager::new(&config.assets)?;
        let model = EcModel::new(Arc::new(assets.clone()));

        Ok(Self {
            inner: Arc::new(AppContextInner {
                config,
                assets,
                model,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn assets(&self) -> &AssetManager {
        &self.inner.assets
    }

    pub fn model(&self) -> &EcModel {
        &self.inner.model
    }
}
