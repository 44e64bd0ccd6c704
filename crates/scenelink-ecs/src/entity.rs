//! Entities and components.

use std::collections::HashMap;

use crate::asset::MeshInstance;
use crate::components::{ComponentKind, PLACEABLE, SchemaError};
use crate::transform::Transform;

/// A typed component attached to (or about to be attached to) an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    type_name: String,
    parent: String,
    attributes: Vec<(String, String)>,
    kind: ComponentKind,
    serial: u64,
    mesh: Option<MeshInstance>,
}

impl Component {
    /// Create an empty component of `type_name` owned by `parent`.
    pub fn new(type_name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            parent: parent.into(),
            attributes: Vec::new(),
            kind: ComponentKind::Other,
            serial: 0,
            mesh: None,
        }
    }

    /// Set an attribute. A repeated name replaces the earlier value in place.
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> + Clone {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Id of the owning entity.
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Typed view, filled in when the component is attached.
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    /// Attachment serial, unique per model. Zero while detached.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Composed mesh, once an `EC_Mesh` asset has resolved.
    pub fn mesh(&self) -> Option<&MeshInstance> {
        self.mesh.as_ref()
    }

    pub(crate) fn validate(&mut self) -> Result<(), SchemaError> {
        self.kind = ComponentKind::from_attributes(&self.type_name, self.attributes())?;
        Ok(())
    }

    pub(crate) fn attach(&mut self, parent: &str, serial: u64) {
        self.parent = parent.to_string();
        self.serial = serial;
    }

    pub(crate) fn set_mesh(&mut self, mesh: MeshInstance) {
        self.mesh = Some(mesh);
    }
}

/// An entity: an id plus at most one component per type.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: String,
    components: HashMap<String, Component>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            components: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn component(&self, type_name: &str) -> Option<&Component> {
        self.components.get(type_name)
    }

    pub fn has_component(&self, type_name: &str) -> bool {
        self.components.contains_key(type_name)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Transform of the entity's `EC_Placeable`, if one is attached.
    pub fn placeable_transform(&self) -> Option<Transform> {
        match self.components.get(PLACEABLE)?.kind() {
            ComponentKind::Placeable(placeable) => Some(placeable.transform),
            _ => None,
        }
    }

    pub(crate) fn component_mut(&mut self, type_name: &str) -> Option<&mut Component> {
        self.components.get_mut(type_name)
    }

    pub(crate) fn insert(&mut self, component: Component) {
        self.components
            .insert(component.type_name.clone(), component);
    }

    pub(crate) fn remove(&mut self, type_name: &str) -> Option<Component> {
        self.components.remove(type_name)
    }

    pub(crate) fn drain(&mut self) -> Vec<Component> {
        self.components.drain().map(|(_, component)| component).collect()
    }
}
