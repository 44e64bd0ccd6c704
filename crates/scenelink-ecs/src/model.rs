//! The entity-component store.
//!
//! `EcModel` is a cheap-to-clone handle; the scene parser mutates it
//! synchronously while asset tasks write composed meshes back into it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

use crate::asset::{MeshAsset, MeshInstance, MeshSource};
use crate::components::{ComponentKind, MESH, MeshSpec};
use crate::entity::{Component, Entity};
use crate::signal::Signal;
use crate::transform::{Pose, Transform};

/// Emitted once an `EC_Mesh` asset has resolved and its pose is composed.
#[derive(Debug, Clone)]
pub struct MeshReady {
    pub entity_id: String,
    /// Snapshot of the mesh component, with `mesh()` filled in
    pub component: Component,
}

/// Emitted for every component that leaves the model.
#[derive(Debug, Clone)]
pub struct ComponentRemoved {
    pub entity_id: String,
    pub component: Component,
}

#[derive(Default)]
struct Graph {
    entities: HashMap<String, Entity>,
    /// Entity ids in insertion order
    order: Vec<String>,
}

struct ModelInner {
    graph: RwLock<Graph>,
    source: Arc<dyn MeshSource>,
    next_serial: AtomicU64,
    mesh_ready: Signal<MeshReady>,
    component_removed: Signal<ComponentRemoved>,
}

/// Entity-component store with type-driven side effects.
#[derive(Clone)]
pub struct EcModel {
    inner: Arc<ModelInner>,
}

impl EcModel {
    /// Create an empty model resolving meshes through `source`.
    pub fn new(source: Arc<dyn MeshSource>) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                graph: RwLock::new(Graph::default()),
                source,
                next_serial: AtomicU64::new(1),
                mesh_ready: Signal::new(),
                component_removed: Signal::new(),
            }),
        }
    }

    /// Insert an entity unless one with the same id exists.
    ///
    /// Returns `false` (and leaves the existing entity untouched) on a
    /// duplicate id.
    pub fn add_entity(&self, entity: Entity) -> bool {
        let mut graph = self.inner.graph.write();
        if graph.entities.contains_key(entity.id()) {
            debug!(entity_id = %entity.id(), "Entity already exists, ignoring");
            return false;
        }

        let id = entity.id().to_string();
        let components = entity.len();
        graph.entities.insert(id.clone(), entity);
        graph.order.push(id.clone());
        trace!(entity_id = %id, components, "Entity added");
        true
    }

    /// Attach `component` to `entity_id` and run its side effect.
    ///
    /// Unknown entities, duplicate component types and attribute bags that
    /// fail validation are ignored and reported through the log only.
    pub fn add_component(&self, mut component: Component, entity_id: &str) -> bool {
        let attached = {
            let mut graph = self.inner.graph.write();
            let Some(entity) = graph.entities.get_mut(entity_id) else {
                debug!(
                    entity_id,
                    component = %component.type_name(),
                    "Component for unknown entity, ignoring"
                );
                return false;
            };

            if entity.has_component(component.type_name()) {
                debug!(
                    entity_id,
                    component = %component.type_name(),
                    "Entity already has a component of this type, ignoring"
                );
                return false;
            }

            if let Err(e) = component.validate() {
                warn!(
                    entity_id,
                    component = %component.type_name(),
                    "Invalid component attributes: {}",
                    e
                );
                return false;
            }

            let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
            component.attach(entity_id, serial);
            let snapshot = component.clone();
            entity.insert(component);
            snapshot
        };

        self.component_added(&attached);
        true
    }

    /// Remove one component. Emits `component_removed` if it existed.
    pub fn remove_component(&self, entity_id: &str, type_name: &str) -> Option<Component> {
        let removed = self
            .inner
            .graph
            .write()
            .entities
            .get_mut(entity_id)?
            .remove(type_name)?;

        debug!(entity_id, component = %type_name, "Component removed");
        self.inner.component_removed.emit(&ComponentRemoved {
            entity_id: entity_id.to_string(),
            component: removed.clone(),
        });
        Some(removed)
    }

    /// Remove an entity and all of its components.
    ///
    /// In-flight mesh requests are left running, since other components may
    /// share them; their results are discarded for the removed entity.
    pub fn remove_entity(&self, entity_id: &str) -> Option<Entity> {
        let (mut entity, components) = {
            let mut graph = self.inner.graph.write();
            let mut entity = graph.entities.remove(entity_id)?;
            graph.order.retain(|id| id != entity_id);
            let components = entity.drain();
            (entity, components)
        };

        debug!(entity_id, components = components.len(), "Entity removed");
        for component in &components {
            self.inner.component_removed.emit(&ComponentRemoved {
                entity_id: entity_id.to_string(),
                component: component.clone(),
            });
        }

        for component in components {
            entity.insert(component);
        }
        Some(entity)
    }

    /// Snapshot of one entity.
    pub fn entity(&self, entity_id: &str) -> Option<Entity> {
        self.inner.graph.read().entities.get(entity_id).cloned()
    }

    /// Snapshot of one component.
    pub fn component(&self, entity_id: &str, type_name: &str) -> Option<Component> {
        self.inner
            .graph
            .read()
            .entities
            .get(entity_id)?
            .component(type_name)
            .cloned()
    }

    /// Entity ids in insertion order.
    pub fn entity_ids(&self) -> Vec<String> {
        self.inner.graph.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.graph.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.graph.read().entities.is_empty()
    }

    /// Fired when a mesh asset resolves and its pose is composed.
    pub fn mesh_ready(&self) -> &Signal<MeshReady> {
        &self.inner.mesh_ready
    }

    /// Fired for every removed component.
    pub fn component_removed(&self) -> &Signal<ComponentRemoved> {
        &self.inner.component_removed
    }

    fn component_added(&self, component: &Component) {
        let entity_id = component.parent();
        match component.kind() {
            ComponentKind::Mesh(mesh) => self.request_mesh(entity_id, component.serial(), mesh),
            ComponentKind::Placeable(placeable) => {
                debug!(
                    entity_id,
                    position = ?placeable.transform.position,
                    "Placeable attached"
                );
            }
            ComponentKind::RigidBody => {
                trace!(entity_id, "Rigid body attached");
            }
            ComponentKind::Other => {
                trace!(entity_id, component = %component.type_name(), "Component attached");
            }
        }
    }

    fn request_mesh(&self, entity_id: &str, serial: u64, mesh: &MeshSpec) {
        let Some(mesh_ref) = mesh.mesh_ref.as_deref() else {
            debug!(entity_id, "Mesh component has no mesh ref, nothing to load");
            return;
        };

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(entity_id, mesh_ref, "Cannot resolve mesh outside a runtime: {}", e);
                return;
            }
        };

        let signal = self.inner.source.request_mesh(mesh_ref);
        let model = self.clone();
        let entity_id = entity_id.to_string();
        let mesh_ref = mesh_ref.to_string();
        let local = mesh.transform;

        runtime.spawn(async move {
            match signal.await {
                Some(asset) => model.mesh_resolved(&entity_id, serial, local, asset),
                None => debug!(entity_id = %entity_id, mesh_ref = %mesh_ref, "Mesh asset did not resolve"),
            }
        });
    }

    fn mesh_resolved(&self, entity_id: &str, serial: u64, local: Transform, asset: Arc<MeshAsset>) {
        let ready = {
            let mut graph = self.inner.graph.write();
            let Some(entity) = graph.entities.get_mut(entity_id) else {
                debug!(entity_id, "Mesh resolved for a removed entity, discarding");
                return;
            };

            // Placeable-before-mesh is a document ordering contract; compose
            // against whatever frame exists now.
            let frame = entity.placeable_transform().unwrap_or_else(|| {
                debug!(entity_id, "No placeable yet, composing against identity");
                Transform::IDENTITY
            });

            let Some(component) = entity
                .component_mut(MESH)
                .filter(|component| component.serial() == serial)
            else {
                debug!(entity_id, "Mesh resolved for a removed component, discarding");
                return;
            };

            let pose = Pose::compose(&frame, &local);
            component.set_mesh(MeshInstance {
                asset: asset.clone(),
                pose,
            });

            MeshReady {
                entity_id: entity_id.to_string(),
                component: component.clone(),
            }
        };

        info!(
            entity_id,
            asset = %asset.name,
            position = ?ready.component.mesh().map(|m| m.pose.position),
            "Mesh ready"
        );
        self.inner.mesh_ready.emit(&ready);
    }
}

impl fmt::Debug for EcModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcModel")
            .field("entities", &self.len())
            .finish()
    }
}
