//! WebSocket Transport
//!
//! Keeps a connection to the scene authority open, reconnecting after
//! abnormal closes, and dispatches incoming envelopes to callbacks bound by
//! event name.
//!
//! ```text
//!   authority ──frames──► WsManager ──"scene"──► SceneParser
//!                            │
//!                            └── connected / disconnected / reconnecting / error
//! ```

mod manager;
mod policy;
mod protocol;
mod registry;

pub use manager::*;
pub use policy::*;
pub use protocol::*;
pub use registry::*;
