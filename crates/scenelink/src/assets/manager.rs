//! Asset manager: remote fetch, de-duplication and caching.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use scenelink_ecs::{AssetResolver, AssetSignal, MeshAsset, MeshSource};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::importer::{MeshImporter, XmlMeshImporter};
use super::AssetError;
use crate::config::AssetConfig;

const ACCEPTED_TYPES: &str = "application/xml, text/xml";

/// A fetch in progress and everyone waiting on it
struct PendingAsset {
    waiters: Vec<AssetResolver>,
    task: Option<JoinHandle<()>>,
}

struct AssetInner {
    client: reqwest::Client,
    remote_storage: RwLock<String>,
    forced_type: String,
    settle_delay: Duration,
    importer: Arc<dyn MeshImporter>,
    /// In-flight fetches keyed by full URL
    pending: DashMap<String, PendingAsset>,
    /// Imported assets keyed by full URL
    resolved: DashMap<String, Arc<MeshAsset>>,
}

/// Fetches mesh documents and resolves [`AssetSignal`]s.
#[derive(Clone)]
pub struct AssetManager {
    inner: Arc<AssetInner>,
}

impl AssetManager {
    /// Create a manager using the default XML importer.
    pub fn new(config: &AssetConfig) -> Result<Self, AssetError> {
        Self::with_importer(config, Arc::new(XmlMeshImporter))
    }

    pub fn with_importer(
        config: &AssetConfig,
        importer: Arc<dyn MeshImporter>,
    ) -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            inner: Arc::new(AssetInner {
                client,
                remote_storage: RwLock::new(config.remote_storage.clone()),
                forced_type: config.forced_type.clone(),
                settle_delay: Duration::from_millis(config.settle_delay_ms),
                importer,
                pending: DashMap::new(),
                resolved: DashMap::new(),
            }),
        })
    }

    /// Replace the base URL for subsequent requests.
    pub fn set_remote_storage(&self, url: impl Into<String>) {
        let url = url.into();
        debug!(remote_storage = %url, "Remote storage changed");
        *self.inner.remote_storage.write() = url;
    }

    pub fn remote_storage(&self) -> String {
        self.inner.remote_storage.read().clone()
    }

    /// Force the file extension of `name` to the configured type.
    ///
    /// `model.obj` becomes `model.dae`; a name without an extension gets one
    /// appended; a name already of the forced type is returned unchanged.
    pub fn check_file_name(&self, name: &str) -> String {
        let forced = &self.inner.forced_type;
        let file_start = name.rfind('/').map_or(0, |slash| slash + 1);

        match name[file_start..].rfind('.') {
            Some(dot) => {
                let dot = file_start + dot;
                if &name[dot + 1..] == forced.as_str() {
                    name.to_string()
                } else {
                    format!("{}.{}", &name[..dot], forced)
                }
            }
            None => format!("{name}.{forced}"),
        }
    }

    /// Request `name` under `rel_path` of the remote storage.
    ///
    /// The returned signal resolves with the asset on success. On any
    /// failure it resolves to `None`; the failure itself is only logged.
    pub fn request_asset(&self, name: &str, rel_path: &str) -> AssetSignal {
        let file_name = self.check_file_name(name);
        let url = self.asset_url(&file_name, rel_path);

        if let Some(asset) = self.inner.resolved.get(&url) {
            trace!(url = %url, "Asset served from cache");
            return AssetSignal::resolved(Arc::clone(asset.value()));
        }

        let (resolver, signal) = AssetSignal::channel();
        match self.inner.pending.entry(url.clone()) {
            Entry::Occupied(mut pending) => {
                trace!(url = %url, "Joining in-flight request");
                pending.get_mut().waiters.push(resolver);
            }
            Entry::Vacant(slot) => match Handle::try_current() {
                Ok(runtime) => {
                    // Spawn under the slot guard: the stored handle must be this fetch's
                    debug!(url = %url, "Fetching asset");
                    let task = runtime.spawn(self.clone().fetch(url.clone(), file_name));
                    slot.insert(PendingAsset {
                        waiters: vec![resolver],
                        task: Some(task),
                    });
                }
                Err(e) => {
                    error!(url = %url, "Cannot fetch asset: {}", e);
                }
            },
        }
        signal
    }

    /// Import `body` as the asset `name` under `rel_path`, cache it and fire
    /// every waiting signal.
    pub fn process_asset(
        &self,
        name: &str,
        rel_path: &str,
        body: &str,
    ) -> Result<Arc<MeshAsset>, AssetError> {
        let file_name = self.check_file_name(name);
        let url = self.asset_url(&file_name, rel_path);
        self.complete(&url, &file_name, body)
    }

    /// Abort an in-flight request. Its waiters resolve to `None`.
    pub fn abort(&self, name: &str, rel_path: &str) -> bool {
        let url = self.asset_url(&self.check_file_name(name), rel_path);
        match self.inner.pending.remove(&url) {
            Some((_, pending)) => {
                if let Some(task) = pending.task {
                    task.abort();
                }
                warn!(url = %url, waiters = pending.waiters.len(), "Asset request aborted");
                true
            }
            None => false,
        }
    }

    /// Number of fetches in progress.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of cached assets.
    pub fn cached(&self) -> usize {
        self.inner.resolved.len()
    }

    pub fn clear_cache(&self) {
        self.inner.resolved.clear();
    }

    fn asset_url(&self, file_name: &str, rel_path: &str) -> String {
        format!("{}{}{}", self.inner.remote_storage.read(), rel_path, file_name)
    }

    async fn fetch(self, url: String, file_name: String) {
        let body = match self.download(&url).await {
            Ok(body) => body,
            Err(AssetError::NotFound(_)) => {
                error!(url = %url, "asset not found");
                self.fail(&url);
                return;
            }
            Err(e) => {
                error!(url = %url, "Failed to fetch asset: {}", e);
                self.fail(&url);
                return;
            }
        };

        if !self.inner.settle_delay.is_zero() {
            tokio::time::sleep(self.inner.settle_delay).await;
        }

        if let Err(e) = self.complete(&url, &file_name, &body) {
            error!(url = %url, "Failed to import asset: {}", e);
            self.fail(&url);
        }
    }

    async fn download(&self, url: &str) -> Result<String, AssetError> {
        let mut response = self
            .inner
            .client
            .get(url)
            .header(ACCEPT, ACCEPTED_TYPES)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(AssetError::NotFound(url.to_string())),
            status => {
                return Err(AssetError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
        }

        let total = response.content_length();
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            trace!(url = %url, received = body.len(), total = ?total, "Asset download progress");
        }

        String::from_utf8(body).map_err(|_| AssetError::InvalidEncoding)
    }

    fn complete(&self, url: &str, file_name: &str, body: &str) -> Result<Arc<MeshAsset>, AssetError> {
        let asset = Arc::new(self.inner.importer.import(file_name, body)?);

        // Cache before releasing the pending slot so no request slips between
        self.inner.resolved.insert(url.to_string(), Arc::clone(&asset));
        let waiters = self
            .inner
            .pending
            .remove(url)
            .map(|(_, pending)| pending.waiters)
            .unwrap_or_default();

        let notified = waiters
            .into_iter()
            .map(|waiter| waiter.resolve(Arc::clone(&asset)))
            .filter(|delivered| *delivered)
            .count();

        info!(asset = %file_name, root = %asset.root, waiters = notified, "Asset ready");
        Ok(asset)
    }

    /// Drop the pending slot; its waiters observe `None`.
    fn fail(&self, url: &str) {
        self.inner.pending.remove(url);
    }
}

impl MeshSource for AssetManager {
    fn request_mesh(&self, name: &str) -> AssetSignal {
        self.request_asset(name, "")
    }
}
