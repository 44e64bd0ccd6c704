//! Asset seam between the model and whatever resolves mesh files.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::transform::Pose;

/// An imported mesh document, shared by every component that references it.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    /// Logical name the asset was requested under
    pub name: String,
    /// Root element of the mesh document (e.g. `COLLADA`)
    pub root: String,
    /// Raw document, handed to the renderer's decoder
    pub document: Arc<str>,
}

/// A resolved mesh placed in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    pub asset: Arc<MeshAsset>,
    pub pose: Pose,
}

/// One-shot notification for an asset request.
///
/// Resolves to `Some(asset)` exactly once on success. When the request fails
/// or is aborted, the resolving side is dropped and the signal resolves to
/// `None`; failures have no other channel.
#[derive(Debug)]
pub struct AssetSignal {
    rx: oneshot::Receiver<Arc<MeshAsset>>,
}

/// Sending half of an [`AssetSignal`].
#[derive(Debug)]
pub struct AssetResolver {
    tx: oneshot::Sender<Arc<MeshAsset>>,
}

impl AssetSignal {
    /// Create a pending signal and the resolver that completes it.
    pub fn channel() -> (AssetResolver, AssetSignal) {
        let (tx, rx) = oneshot::channel();
        (AssetResolver { tx }, AssetSignal { rx })
    }

    /// A signal that is already resolved.
    pub fn resolved(asset: Arc<MeshAsset>) -> Self {
        let (resolver, signal) = Self::channel();
        resolver.resolve(asset);
        signal
    }
}

impl Future for AssetSignal {
    type Output = Option<Arc<MeshAsset>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

impl AssetResolver {
    /// Fire the signal. Returns `false` if nobody is waiting anymore.
    pub fn resolve(self, asset: Arc<MeshAsset>) -> bool {
        self.tx.send(asset).is_ok()
    }
}

/// Something that can turn a logical mesh name into an [`AssetSignal`].
pub trait MeshSource: Send + Sync + 'static {
    fn request_mesh(&self, name: &str) -> AssetSignal;
}
