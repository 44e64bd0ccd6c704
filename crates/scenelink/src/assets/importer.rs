//! Mesh document importers.

use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::events::Event;
use scenelink_ecs::MeshAsset;

use super::AssetError;

/// Turns a downloaded document into a [`MeshAsset`].
pub trait MeshImporter: Send + Sync + 'static {
    fn import(&self, name: &str, document: &str) -> Result<MeshAsset, AssetError>;
}

/// Accepts any well-formed XML document and records its root element.
///
/// Geometry decoding is left to the renderer.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlMeshImporter;

impl MeshImporter for XmlMeshImporter {
    fn import(&self, name: &str, document: &str) -> Result<MeshAsset, AssetError> {
        let mut reader = Reader::from_str(document);
        reader.config_mut().trim_text(true);

        let mut root = None;
        let mut depth = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(element) => {
                    if root.is_none() {
                        root = Some(String::from_utf8_lossy(element.name().as_ref()).into_owned());
                    }
                    depth += 1;
                }
                Event::Empty(element) => {
                    if root.is_none() {
                        root = Some(String::from_utf8_lossy(element.name().as_ref()).into_owned());
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(AssetError::Import(format!(
                "{depth} unclosed element(s) at end of document"
            )));
        }

        let root = root.ok_or(AssetError::EmptyDocument)?;
        Ok(MeshAsset {
            name: name.to_string(),
            root,
            document: Arc::from(document),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLADA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- exported -->
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><up_axis>Y_UP</up_axis></asset>
  <library_geometries/>
</COLLADA>"#;

    #[test]
    fn test_import_records_root() {
        let asset = XmlMeshImporter.import("box.dae", COLLADA).unwrap();
        assert_eq!(asset.name, "box.dae");
        assert_eq!(asset.root, "COLLADA");
        assert_eq!(&*asset.document, COLLADA);
    }

    #[test]
    fn test_import_self_closing_root() {
        let asset = XmlMeshImporter.import("empty.dae", "<COLLADA/>").unwrap();
        assert_eq!(asset.root, "COLLADA");
    }

    #[test]
    fn test_import_rejects_empty_document() {
        let err = XmlMeshImporter.import("none.dae", "  <!-- nothing -->  ").unwrap_err();
        assert!(matches!(err, AssetError::EmptyDocument));
    }

    #[test]
    fn test_import_rejects_broken_xml() {
        assert!(XmlMeshImporter.import("a.dae", "<COLLADA><asset>").is_err());
        assert!(XmlMeshImporter.import("b.dae", "<COLLADA></asset>").is_err());
    }
}
