//! Known component types and their typed attribute schemas.
//!
//! Components arrive as a type name plus a string attribute bag. When a
//! component is attached, the bag is validated once into a [`ComponentKind`];
//! unknown type names become [`ComponentKind::Other`] and are kept as-is.

use thiserror::Error;

use crate::transform::Transform;

/// Spatial reference frame of an entity.
pub const PLACEABLE: &str = "EC_Placeable";
/// Renderable mesh, resolved asynchronously.
pub const MESH: &str = "EC_Mesh";
/// Physics body. Accepted, currently unused.
pub const RIGID_BODY: &str = "EC_RigidBody";

/// Attribute holding a 9-field transform.
pub const TRANSFORM_ATTR: &str = "Transform";
/// Attribute naming the mesh asset of an `EC_Mesh`.
pub const MESH_REF_ATTR: &str = "Mesh ref";

/// Errors raised while validating a component's attributes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("expected 9 transform fields, found {0}")]
    FieldCount(usize),

    #[error("transform field {index} is not a number: {value:?}")]
    InvalidNumber { index: usize, value: String },
}

/// `EC_Placeable` data.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placeable {
    pub transform: Transform,
}

/// `EC_Mesh` data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshSpec {
    /// Logical asset name; `None` when the attribute is missing or empty
    pub mesh_ref: Option<String>,
    /// Offset from the owning entity's placeable
    pub transform: Transform,
}

/// Typed view of a component, keyed by its type name.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ComponentKind {
    Placeable(Placeable),
    Mesh(MeshSpec),
    RigidBody,
    #[default]
    Other,
}

impl ComponentKind {
    /// Validate an attribute bag for the given component type.
    pub fn from_attributes<'a, I>(type_name: &str, attributes: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
    {
        let lookup = |name: &str| {
            attributes
                .clone()
                .into_iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value)
        };

        let transform = || -> Result<Transform, SchemaError> {
            match lookup(TRANSFORM_ATTR) {
                Some(raw) => raw.parse(),
                None => Ok(Transform::IDENTITY),
            }
        };

        match type_name {
            PLACEABLE => Ok(Self::Placeable(Placeable {
                transform: transform()?,
            })),
            MESH => Ok(Self::Mesh(MeshSpec {
                mesh_ref: lookup(MESH_REF_ATTR)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from),
                transform: transform()?,
            })),
            RIGID_BODY => Ok(Self::RigidBody),
            _ => Ok(Self::Other),
        }
    }
}
