//! Transforms carried by placeable and mesh components.

use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::components::SchemaError;

/// Number of comma-separated fields in a wire transform.
pub const TRANSFORM_FIELDS: usize = 9;

/// Position, rotation (degrees) and scale as sent on the wire.
///
/// Wire format: `posX,posY,posZ,rotX,rotY,rotZ,scaleX,scaleY,scaleZ`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles in degrees
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    /// Rotation converted to radians.
    pub fn rotation_radians(&self) -> Vec3 {
        Vec3::new(
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl FromStr for Transform {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        if fields.len() != TRANSFORM_FIELDS {
            return Err(SchemaError::FieldCount(fields.len()));
        }

        let mut values = [0.0f32; TRANSFORM_FIELDS];
        for (index, (slot, field)) in values.iter_mut().zip(&fields).enumerate() {
            *slot = field.parse().map_err(|_| SchemaError::InvalidNumber {
                index,
                value: field.to_string(),
            })?;
        }

        Ok(Self {
            position: Vec3::new(values[0], values[1], values[2]),
            rotation: Vec3::new(values[3], values[4], values[5]),
            scale: Vec3::new(values[6], values[7], values[8]),
        })
    }
}

/// World pose of a resolved mesh. Rotation is in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Pose {
    /// Compose a local transform onto its owner's reference frame.
    ///
    /// Positions and rotations add, scales multiply component-wise.
    pub fn compose(frame: &Transform, local: &Transform) -> Self {
        Self {
            position: local.position + frame.position,
            rotation: local.rotation_radians() + frame.rotation_radians(),
            scale: local.scale * frame.scale,
        }
    }
}
