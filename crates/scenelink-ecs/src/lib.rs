//! Scenelink ECS - Entity Component store for synchronized scenes
//!
//! Holds the entity/component graph received from the scene authority and
//! runs type-specific side effects when components are attached.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Scene Parser                            │
//! │        add_entity / add_component (document order)           │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         EcModel                              │
//! │  - entity id -> Entity (one component per type)              │
//! │  - validates attributes into a ComponentKind                 │
//! │  - EC_Mesh: requests the asset through a MeshSource          │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ AssetSignal (one-shot)
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           mesh_ready / component_removed signals             │
//! │                   (consumed by a renderer)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod asset;
pub mod components;
pub mod entity;
pub mod model;
pub mod signal;
pub mod transform;

pub use asset::{AssetResolver, AssetSignal, MeshAsset, MeshInstance, MeshSource};
pub use components::{ComponentKind, MeshSpec, Placeable, SchemaError};
pub use entity::{Component, Entity};
pub use model::{ComponentRemoved, EcModel, MeshReady};
pub use signal::Signal;
pub use transform::{Pose, Transform};
