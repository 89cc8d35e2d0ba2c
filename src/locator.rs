//! Document Locator: resolves the manifest's declared objects to files on disk.
//!
//! The manifest (`Configuration.xml`) names the configuration and lists child
//! objects per type tag. Each declared object maps to
//! `<container_dir>/<Name>.xml` next to the manifest. A missing per-object
//! file is not an error here — the ingestion pipeline skips it and reports
//! the skip. A missing or unparsable manifest is fatal.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::models::ObjectType;
use crate::xml;

/// One object declared by the manifest, with its resolved file locations.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    pub object_type: ObjectType,
    pub name: String,
    /// `<container>/<Name>.xml` — structural metadata.
    pub xml_path: PathBuf,
    /// `<container>/<Name>/` — modules and forms live beneath this.
    pub object_dir: PathBuf,
}

/// Parsed manifest: configuration name plus the declared object list in
/// enumeration order.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub configuration_name: String,
    pub objects: Vec<ObjectRef>,
}

/// Reads and resolves the manifest. Fails when the file is unreadable, is
/// not well-formed XML, or lacks a `Configuration` element.
pub fn read_manifest(manifest_path: &Path) -> Result<Manifest> {
    let text = xml::read_file(manifest_path)?;
    let doc = roxmltree::Document::parse(&text)
        .with_context(|| format!("manifest {} is not valid XML", manifest_path.display()))?;

    let root_dir = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let Some(config) = xml::child(doc.root_element(), "Configuration") else {
        bail!(
            "manifest {} has no Configuration element",
            manifest_path.display()
        );
    };

    let configuration_name = xml::child(config, "Properties")
        .and_then(|p| xml::child_text(p, "Name"))
        .unwrap_or_default();

    let mut objects = Vec::new();
    if let Some(child_objects) = xml::child(config, "ChildObjects") {
        for object_type in ObjectType::ALL {
            for decl in xml::children(child_objects, object_type.as_str()) {
                let name = xml::text(decl);
                if name.is_empty() {
                    continue;
                }
                let container = root_dir.join(object_type.container_dir());
                objects.push(ObjectRef {
                    object_type,
                    xml_path: container.join(format!("{name}.xml")),
                    object_dir: container.join(&name),
                    name,
                });
            }
        }
    }

    Ok(Manifest {
        configuration_name,
        objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Configuration uuid="11111111-2222-3333-4444-555555555555">
    <Properties>
      <Name>УправлениеТорговлей</Name>
    </Properties>
    <ChildObjects>
      <Catalog>Контрагенты</Catalog>
      <Document>РеализацияТоваров</Document>
      <FunctionalOption>ИспользоватьСкидки</FunctionalOption>
    </ChildObjects>
  </Configuration>
</MetaDataObject>"#;

    #[test]
    fn resolves_declared_objects_to_container_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Configuration.xml");
        fs::write(&path, MANIFEST).unwrap();

        let manifest = read_manifest(&path).unwrap();
        assert_eq!(manifest.configuration_name, "УправлениеТорговлей");
        assert_eq!(manifest.objects.len(), 3);

        let catalog = &manifest.objects[0];
        assert_eq!(catalog.object_type, ObjectType::Catalog);
        assert_eq!(catalog.name, "Контрагенты");
        assert_eq!(
            catalog.xml_path,
            tmp.path().join("Catalogs").join("Контрагенты.xml")
        );
        assert_eq!(
            catalog.object_dir,
            tmp.path().join("Catalogs").join("Контрагенты")
        );

        let fo = &manifest.objects[2];
        assert_eq!(fo.object_type, ObjectType::FunctionalOption);
        assert!(fo.xml_path.starts_with(tmp.path().join("FunctionalOptions")));
    }

    #[test]
    fn missing_manifest_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_manifest(&tmp.path().join("Configuration.xml")).is_err());
    }

    #[test]
    fn manifest_without_configuration_element_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Configuration.xml");
        fs::write(&path, "<MetaDataObject/>").unwrap();
        assert!(read_manifest(&path).is_err());
    }
}
