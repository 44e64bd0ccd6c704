//! Scenelink - scene synchronization client
//!
//! Connects to a scene authority over WebSocket, parses the scene documents
//! it pushes into an entity-component model and resolves referenced meshes
//! from remote storage.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  "scene"   ┌─────────────┐  add_entity /   ┌──────────┐
//! │  WsManager   │──────────► │ SceneParser │ ──────────────► │ EcModel  │
//! │ (reconnects) │            └─────────────┘  add_component  └────┬─────┘
//! └──────────────┘                                   EC_Mesh       │
//!                                                                  ▼
//!                          mesh_ready ◄──── compose ◄──── ┌──────────────┐
//!                                                         │ AssetManager │
//!                                                         └──────────────┘
//! ```

// Re-export the model crate
pub use scenelink_ecs;

// Layered configuration
pub mod config;

// Shared services
pub mod context;

// WebSocket transport
pub mod transport;

// Mesh fetching and import
pub mod assets;

// Scene document parsing
pub mod scene;

pub use config::ClientConfig;
pub use context::AppContext;
