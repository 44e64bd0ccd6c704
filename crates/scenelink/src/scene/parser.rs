//! Scene parser: XML and JSON scene documents into the EC model.
//!
//! XML layout:
//!
//! ```text
//! <scene>
//!   <entity id="1">
//!     <component type="EC_Placeable">
//!       <attribute name="Transform" value="0,0,0,0,0,0,1,1,1"/>
//!     </component>
//!   </entity>
//! </scene>
//! ```
//!
//! A component is attached only after all of its attributes have been read.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use scenelink_ecs::{Component, EcModel, Entity};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::SceneError;
use crate::context::AppContext;

/// Which parser handles a document
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneBackend<'a> {
    Xml(&'a str),
    Json(&'a Value),
}

impl<'a> SceneBackend<'a> {
    /// Pick a backend for an event payload.
    ///
    /// Strings that start with `<` are XML; objects with an `entities` array
    /// are JSON scenes. Anything else is rejected.
    pub fn select(document: &'a Value) -> Result<Self, SceneError> {
        match document {
            Value::String(text) if strip_bom(text).trim_start().starts_with('<') => {
                Ok(Self::Xml(strip_bom(text)))
            }
            Value::Object(map) if map.get("entities").is_some_and(Value::is_array) => {
                Ok(Self::Json(document))
            }
            Value::String(_) => Err(SceneError::UnsupportedDocument(
                "string payload is not XML".to_string(),
            )),
            Value::Object(_) => Err(SceneError::UnsupportedDocument(
                "object payload has no entities array".to_string(),
            )),
            other => Err(SceneError::UnsupportedDocument(format!(
                "unexpected payload {other}"
            ))),
        }
    }
}

/// Feeds scene documents into an [`EcModel`].
#[derive(Clone)]
pub struct SceneParser {
    model: EcModel,
}

impl SceneParser {
    pub fn new(ctx: &AppContext) -> Self {
        Self::for_model(ctx.model().clone())
    }

    pub fn for_model(model: EcModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &EcModel {
        &self.model
    }

    /// Parse a `scene` event payload with the matching backend.
    pub fn parse(&self, document: &Value) -> Result<EcModel, SceneError> {
        match SceneBackend::select(document)? {
            SceneBackend::Xml(text) => self.parse_xml(text),
            SceneBackend::Json(value) => self.parse_json(value),
        }
    }

    /// Parse an XML scene document.
    pub fn parse_xml(&self, document: &str) -> Result<EcModel, SceneError> {
        let mut reader = Reader::from_str(strip_bom(document));
        reader.config_mut().trim_text(true);

        let mut walker = Walker::new(&self.model);
        loop {
            match reader.read_event()? {
                Event::Start(element) => walker.open(&element)?,
                Event::Empty(element) => {
                    walker.open(&element)?;
                    walker.close(element.local_name().as_ref());
                }
                Event::End(element) => walker.close(element.local_name().as_ref()),
                Event::Eof => break,
                _ => {}
            }
        }

        info!(entities = walker.entities, components = walker.components, "Scene parsed");
        Ok(self.model.clone())
    }

    /// Parse a JSON scene document.
    pub fn parse_json(&self, document: &Value) -> Result<EcModel, SceneError> {
        let scene = JsonScene::deserialize(document)?;
        let (mut entities, mut components) = (0usize, 0usize);

        for entity in scene.entities {
            let Some(id) = entity.id.filter(|id| !id.is_empty()) else {
                warn!("Skipping entity without id");
                continue;
            };
            if self.model.add_entity(Entity::new(id.as_str())) {
                entities += 1;
            }

            for json in entity.components {
                let Some(type_name) = json.type_name.filter(|t| !t.is_empty()) else {
                    warn!(entity_id = %id, "Skipping component without type");
                    continue;
                };

                let mut component = Component::new(type_name, id.as_str());
                match json.attributes {
                    JsonAttributes::List(attributes) => {
                        for attribute in attributes {
                            component.add_attribute(attribute.name, value_text(&attribute.value));
                        }
                    }
                    JsonAttributes::Map(attributes) => {
                        for (name, value) in attributes {
                            component.add_attribute(name, value_text(&value));
                        }
                    }
                }

                if self.model.add_component(component, &id) {
                    components += 1;
                }
            }
        }

        info!(entities, components, "Scene parsed");
        Ok(self.model.clone())
    }
}

/// XML walk state
struct Walker<'m> {
    model: &'m EcModel,
    /// Entity being read; `None` outside an entity or inside a skipped one
    entity: Option<String>,
    /// Component collecting attributes
    component: Option<Component>,
    entities: usize,
    components: usize,
}

impl<'m> Walker<'m> {
    fn new(model: &'m EcModel) -> Self {
        Self {
            model,
            entity: None,
            component: None,
            entities: 0,
            components: 0,
        }
    }

    fn open(&mut self, element: &BytesStart<'_>) -> Result<(), SceneError> {
        match element.local_name().as_ref() {
            b"entity" => {
                self.component = None;
                match attribute(element, "id")?.filter(|id| !id.is_empty()) {
                    Some(id) => {
                        if self.model.add_entity(Entity::new(id.as_str())) {
                            self.entities += 1;
                        }
                        self.entity = Some(id);
                    }
                    None => {
                        warn!("Skipping entity without id");
                        self.entity = None;
                    }
                }
            }
            b"component" => {
                let Some(entity_id) = &self.entity else {
                    return Ok(());
                };
                match attribute(element, "type")?.filter(|t| !t.is_empty()) {
                    Some(type_name) => {
                        self.component = Some(Component::new(type_name, entity_id.as_str()));
                    }
                    None => warn!(entity_id = %entity_id, "Skipping component without type"),
                }
            }
            b"attribute" => {
                let Some(component) = self.component.as_mut() else {
                    return Ok(());
                };
                match attribute(element, "name")? {
                    Some(name) => {
                        let value = attribute(element, "value")?.unwrap_or_default();
                        component.add_attribute(name, value);
                    }
                    None => debug!(
                        component = %component.type_name(),
                        "Ignoring attribute without name"
                    ),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"component" => {
                if let (Some(component), Some(entity_id)) = (self.component.take(), &self.entity) {
                    if self.model.add_component(component, entity_id) {
                        self.components += 1;
                    }
                }
            }
            b"entity" => {
                self.entity = None;
                self.component = None;
            }
            _ => {}
        }
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, SceneError> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct JsonScene {
    entities: Vec<JsonEntity>,
}

#[derive(Deserialize)]
struct JsonEntity {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    components: Vec<JsonComponent>,
}

#[derive(Deserialize)]
struct JsonComponent {
    #[serde(rename = "type", default)]
    type_name: Option<String>,
    #[serde(default)]
    attributes: JsonAttributes,
}

/// Attributes as `[{"name", "value"}]` (ordered) or a `{name: value}` map
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonAttributes {
    List(Vec<JsonAttribute>),
    Map(Map<String, Value>),
}

impl Default for JsonAttributes {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

#[derive(Deserialize)]
struct JsonAttribute {
    name: String,
    #[serde(default)]
    value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use glam::Vec3;
    use parking_lot::Mutex;
    use scenelink_ecs::{AssetSignal, ComponentKind, MeshAsset, MeshReady, MeshSource, Transform};
    use serde_json::json;

    /// Resolves every mesh immediately and records what was asked for
    #[derive(Default)]
    struct StubSource {
        requests: Mutex<Vec<String>>,
    }

    impl MeshSource for StubSource {
        fn request_mesh(&self, name: &str) -> AssetSignal {
            self.requests.lock().push(name.to_string());
            AssetSignal::resolved(Arc::new(MeshAsset {
                name: name.to_string(),
                root: "COLLADA".to_string(),
                document: Arc::from("<COLLADA/>"),
            }))
        }
    }

    fn parser() -> (SceneParser, Arc<StubSource>) {
        let source = Arc::new(StubSource::default());
        let model = EcModel::new(source.clone());
        (SceneParser::for_model(model), source)
    }

    const SCENE: &str = r#"<?xml version="1.0"?>
<scene>
  <entity id="7">
    <component type="EC_Placeable">
      <attribute name="Transform" value="0,0,0,0,0,0,1,1,1"/>
    </component>
    <component type="EC_Mesh">
      <attribute name="Transform" value="1,0,0, 0,0,0, 1,1,1"/>
      <attribute name="Mesh ref" value="box.obj"/>
    </component>
    <component type="EC_RigidBody">
      <attribute name="Mass" value="0"/>
    </component>
  </entity>
  <entity id="3">
    <component type="EC_Placeable">
      <attribute name="Transform" value="5,0,0,0,0,0,2,2,2"/>
    </component>
    <component type="EC_Script"/>
  </entity>
</scene>"#;

    #[tokio::test]
    async fn test_parse_xml_builds_model() {
        let (parser, source) = parser();
        let model = parser.parse_xml(SCENE).unwrap();

        assert_eq!(model.entity_ids(), vec!["7".to_string(), "3".to_string()]);

        let first = model.entity("7").unwrap();
        assert_eq!(first.len(), 3);
        assert!(matches!(
            first.component("EC_RigidBody").unwrap().kind(),
            ComponentKind::RigidBody
        ));
        let mesh = model.component("7", "EC_Mesh").unwrap();
        assert_eq!(mesh.parent(), "7");
        assert_eq!(mesh.attribute("Mesh ref"), Some("box.obj"));

        // Attributes were complete before attachment
        let second = model.entity("3").unwrap();
        assert_eq!(
            second.placeable_transform().unwrap().position,
            Vec3::new(5.0, 0.0, 0.0)
        );
        assert!(matches!(
            second.component("EC_Script").unwrap().kind(),
            ComponentKind::Other
        ));

        assert_eq!(*source.requests.lock(), vec!["box.obj".to_string()]);
    }

    #[tokio::test]
    async fn test_mesh_is_composed_with_placeable() {
        let (parser, _source) = parser();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        parser.model().mesh_ready().connect(move |ready: &MeshReady| {
            let _ = tx.send(ready.clone());
        });

        parser.parse(&Value::String(SCENE.to_string())).unwrap();

        let ready = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ready.entity_id, "7");
        let pose = ready.component.mesh().unwrap().pose;
        assert_eq!(pose.position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(pose.scale, Vec3::ONE);
    }

    #[test]
    fn test_skips_entities_without_id_and_components_without_type() {
        let (parser, _source) = parser();
        let model = parser
            .parse_xml(
                r#"<scene>
                  <entity><component type="EC_Placeable"/></entity>
                  <entity id="">
                    <component type="EC_Placeable"/>
                  </entity>
                  <entity id="a">
                    <component><attribute name="Transform" value="1,1,1,0,0,0,1,1,1"/></component>
                    <component type="EC_RigidBody"/>
                  </entity>
                </scene>"#,
            )
            .unwrap();

        assert_eq!(model.entity_ids(), vec!["a".to_string()]);
        let entity = model.entity("a").unwrap();
        assert_eq!(entity.len(), 1);
        assert!(entity.has_component("EC_RigidBody"));
    }

    #[test]
    fn test_invalid_component_is_rejected() {
        let (parser, _source) = parser();
        let model = parser
            .parse_xml(
                r#"<scene><entity id="x">
                  <component type="EC_Placeable">
                    <attribute name="Transform" value="1,2,3"/>
                  </component>
                </entity></scene>"#,
            )
            .unwrap();

        assert!(model.entity("x").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml() {
        let (parser, _source) = parser();
        let err = parser
            .parse_xml(r#"<scene><entity id="1"></component></scene>"#)
            .unwrap_err();
        assert!(matches!(err, SceneError::Xml(_)));
    }

    #[test]
    fn test_backend_selection() {
        let xml = json!("  <scene/>");
        assert!(matches!(SceneBackend::select(&xml), Ok(SceneBackend::Xml(_))));

        let structured = json!({ "entities": [] });
        assert!(matches!(
            SceneBackend::select(&structured),
            Ok(SceneBackend::Json(_))
        ));

        for unsupported in [json!("scene"), json!(42), json!({ "nodes": [] }), Value::Null] {
            assert!(matches!(
                SceneBackend::select(&unsupported),
                Err(SceneError::UnsupportedDocument(_))
            ));
        }
    }

    #[test]
    fn test_byte_order_mark_is_accepted() {
        let document = json!("\u{feff}<?xml version=\"1.0\"?><scene><entity id=\"b\"/></scene>");
        assert!(matches!(
            SceneBackend::select(&document),
            Ok(SceneBackend::Xml(text)) if text.starts_with("<?xml")
        ));

        let (parser, _source) = parser();
        let model = parser.parse(&document).unwrap();
        assert_eq!(model.entity_ids(), vec!["b".to_string()]);
    }

    #[test]
    fn test_parse_json_scene() {
        let (parser, _source) = parser();
        let model = parser
            .parse(&json!({
                "entities": [
                    {
                        "id": "p1",
                        "components": [
                            {
                                "type": "EC_Placeable",
                                "attributes": [
                                    { "name": "Transform", "value": "0,1,0,0,90,0,1,1,1" }
                                ]
                            },
                            { "type": "EC_RigidBody", "attributes": { "Mass": 4.5 } },
                            { "attributes": [] }
                        ]
                    },
                    { "components": [] }
                ]
            }))
            .unwrap();

        assert_eq!(model.len(), 1);
        let entity = model.entity("p1").unwrap();
        assert_eq!(entity.len(), 2);
        assert_eq!(
            entity.placeable_transform(),
            Some(Transform {
                position: Vec3::new(0.0, 1.0, 0.0),
                rotation: Vec3::new(0.0, 90.0, 0.0),
                scale: Vec3::ONE,
            })
        );
        assert_eq!(
            entity.component("EC_RigidBody").unwrap().attribute("Mass"),
            Some("4.5")
        );
    }

    #[test]
    fn test_parse_is_idempotent_for_existing_entities() {
        let (parser, _source) = parser();
        let doc = r#"<scene><entity id="1"><component type="EC_RigidBody"/></entity></scene>"#;
        parser.parse_xml(doc).unwrap();
        let model = parser.parse_xml(doc).unwrap();
        assert_eq!(model.len(), 1);
        assert_eq!(model.entity("1").unwrap().len(), 1);
    }
}
