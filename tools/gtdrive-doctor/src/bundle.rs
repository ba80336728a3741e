// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FMU bundles: extracted archives or unpacked directories.

use std::fs::File;
use std::path::{Path, PathBuf};

use gtdrive::resolver;
use tempfile::TempDir;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot extract archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("modelDescription.xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("modelDescription.xml: {0}")]
    Invalid(String),
}

/// The only `fmiVersion` the shim implements.
pub const SUPPORTED_FMI_VERSION: &str = "2.0";

/// One `ScalarVariable` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarVariable {
    pub name: String,
    pub value_reference: u32,
    pub causality: String,
    /// `Real`, `Integer`, `Boolean` or `String`.
    pub kind: String,
}

/// The parts of `modelDescription.xml` the doctor needs.
#[derive(Debug, Clone)]
pub struct ModelDescription {
    pub fmi_version: String,
    pub model_name: String,
    pub guid: String,
    pub model_identifier: String,
    pub variables: Vec<ScalarVariable>,
}

impl ModelDescription {
    pub fn parse(text: &str) -> Result<Self, BundleError> {
        let doc = roxmltree::Document::parse(text)?;
        let root = doc.root_element();
        if !root.has_tag_name("fmiModelDescription") {
            return Err(BundleError::Invalid(format!(
                "root element is <{}>",
                root.tag_name().name()
            )));
        }
        let fmi_version = required(root, "fmiVersion")?;
        if fmi_version != SUPPORTED_FMI_VERSION {
            return Err(BundleError::Invalid(format!(
                "fmiVersion {fmi_version}, expected {SUPPORTED_FMI_VERSION}"
            )));
        }
        let cosim = root
            .children()
            .find(|n| n.has_tag_name("CoSimulation"))
            .ok_or_else(|| BundleError::Invalid("no <CoSimulation> element".to_string()))?;

        let mut variables = Vec::new();
        for node in doc.descendants().filter(|n| n.has_tag_name("ScalarVariable")) {
            let value_reference = required(node, "valueReference")?
                .parse()
                .map_err(|_| BundleError::Invalid("valueReference is not a number".to_string()))?;
            let kind = node
                .children()
                .find(|c| c.is_element())
                .map(|c| c.tag_name().name().to_string())
                .unwrap_or_default();
            variables.push(ScalarVariable {
                name: required(node, "name")?,
                value_reference,
                causality: node.attribute("causality").unwrap_or("local").to_string(),
                kind,
            });
        }

        Ok(Self {
            fmi_version,
            model_name: required(root, "modelName")?,
            guid: required(root, "guid")?,
            model_identifier: required(cosim, "modelIdentifier")?,
            variables,
        })
    }

    pub fn variable(&self, name: &str) -> Option<&ScalarVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

fn required(node: roxmltree::Node<'_, '_>, name: &str) -> Result<String, BundleError> {
    node.attribute(name)
        .map(str::to_string)
        .ok_or_else(|| BundleError::Invalid(format!("missing attribute {name}")))
}

/// An FMU opened for a trial run.
#[derive(Debug)]
pub struct Bundle {
    root: PathBuf,
    description: ModelDescription,
    // Keeps the extraction directory alive.
    _extracted: Option<TempDir>,
}

impl Bundle {
    /// Open an `.fmu` archive (extracted to a temporary directory) or an
    /// already unpacked bundle directory.
    pub fn open(path: &Path) -> Result<Self, BundleError> {
        let (root, extracted) = if path.is_dir() {
            (path.to_path_buf(), None)
        } else {
            let dir = tempfile::tempdir().map_err(|source| BundleError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
            let file = File::open(path).map_err(|source| BundleError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            zip::ZipArchive::new(file)?.extract(dir.path())?;
            info!("extracted {} to {}", path.display(), dir.path().display());
            (dir.path().to_path_buf(), Some(dir))
        };

        let description_path = root.join("modelDescription.xml");
        let text = std::fs::read_to_string(&description_path).map_err(|source| BundleError::Io {
            path: description_path,
            source,
        })?;
        Ok(Self {
            root,
            description: ModelDescription::parse(&text)?,
            _extracted: extracted,
        })
    }

    #[cfg(test)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn description(&self) -> &ModelDescription {
        &self.description
    }

    /// `binaries/<platform>/<modelIdentifier>.<ext>` for this process.
    pub fn library_path(&self) -> PathBuf {
        self.root
            .join("binaries")
            .join(resolver::platform_dir())
            .join(format!(
                "{}.{}",
                self.description.model_identifier,
                std::env::consts::DLL_EXTENSION
            ))
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.root.join("resources")
    }

    /// `fmuResourceLocation` URI of the resources directory.
    pub fn resource_uri(&self) -> String {
        file_uri(&self.resources_dir())
    }
}

/// Absolute path to a `file:///` URI, percent-encoding anything outside the
/// unreserved set.
pub fn file_uri(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let mut uri = String::from("file://");
    if !text.starts_with('/') {
        uri.push('/');
    }
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' | b':' => {
                uri.push(char::from(byte));
            }
            other => uri.push_str(&format!("%{other:02X}")),
        }
    }
    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DESCRIPTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="2.0" modelName="Demo" guid="{1234}">
  <CoSimulation modelIdentifier="demo_fmi"/>
  <ModelVariables>
    <ScalarVariable name="OSMPSensorViewIn.size" valueReference="2" causality="input">
      <Integer start="0"/>
    </ScalarVariable>
    <ScalarVariable name="Throttle" valueReference="3" causality="output">
      <Real start="0.0"/>
    </ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#;

    #[test]
    fn test_parse_description() {
        let md = ModelDescription::parse(DESCRIPTION).expect("parse");
        assert_eq!(md.model_identifier, "demo_fmi");
        assert_eq!(md.guid, "{1234}");
        let throttle = md.variable("Throttle").expect("throttle");
        assert_eq!(throttle.value_reference, 3);
        assert_eq!(throttle.kind, "Real");
        assert_eq!(throttle.causality, "output");
    }

    #[test]
    fn test_parse_rejects_model_exchange_only() {
        let text = r#"<fmiModelDescription fmiVersion="2.0" modelName="m" guid="g">
            <ModelExchange modelIdentifier="m"/></fmiModelDescription>"#;
        assert!(matches!(ModelDescription::parse(text), Err(BundleError::Invalid(_))));
    }

    #[test]
    fn test_parse_rejects_other_fmi_versions() {
        let text = DESCRIPTION.replace(r#"fmiVersion="2.0""#, r#"fmiVersion="3.0""#);
        match ModelDescription::parse(&text) {
            Err(BundleError::Invalid(reason)) => assert!(reason.contains("3.0"), "{reason}"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_open_directory_and_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("modelDescription.xml"), DESCRIPTION).expect("write");
        let bundle = Bundle::open(dir.path()).expect("open dir");
        assert!(bundle
            .library_path()
            .starts_with(dir.path().join("binaries").join(resolver::platform_dir())));
        assert!(bundle.resource_uri().starts_with("file:///"));

        let fmu = dir.path().join("demo.fmu");
        {
            let file = File::create(&fmu).expect("create");
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("modelDescription.xml", options).expect("entry");
            zip.write_all(DESCRIPTION.as_bytes()).expect("write");
            zip.finish().expect("finish");
        }
        let bundle = Bundle::open(&fmu).expect("open archive");
        assert_eq!(bundle.description().model_name, "Demo");
        assert_ne!(bundle.root(), dir.path());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_uri_escapes() {
        assert_eq!(
            file_uri(Path::new("/tmp/my fmu/resources")),
            "file:///tmp/my%20fmu/resources"
        );
    }
}
