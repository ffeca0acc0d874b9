// src/config/mod.rs

//! Loads motor parameters from a YAML file.
//!
//! The file has two required top-level sections, `Magnet` and `Coil`, each
//! a flat mapping. Keys inside a section are matched case-insensitively, and
//! a few historical spellings are folded onto the canonical field names.

use crate::params::{Coil, Magnet, DEFAULT_MATERIAL};
use crate::{StudyError, StudyResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const MAGNET_SECTION: &str = "Magnet";
pub const COIL_SECTION: &str = "Coil";

pub const REQUIRED_MAGNET_FIELDS: [&str; 5] = ["number", "pitch", "length", "od", "material"];
pub const REQUIRED_COIL_FIELDS: [&str; 7] = ["number", "pitch", "length", "od", "id", "nb_turn", "material"];

/// Alternative spellings accepted for field names, after lower-casing.
const FIELD_ALIASES: [(&str, &str); 5] = [
    ("tube_diameter", "tube_od"),
    ("inner_diameter", "id"),
    ("outer_diameter", "od"),
    ("turns", "nb_turn"),
    ("spool_flange", "spool_flange_width"),
];

/// Validated parameters for one motor, plus everything the assembly needs from the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorParameters {
    pub magnet: Magnet,
    pub coil: Coil,
    /// Every material named anywhere in the file, plus air.
    pub materials: BTreeSet<String>,
    pub source: PathBuf,
}

/// Reads and validates a parameter file.
pub fn load_parameters(path: &Path) -> StudyResult<MotorParameters> {
    let content = fs::read_to_string(path).map_err(|e| StudyError::Configuration {
        path: path.to_path_buf(),
        message: format!("cannot read parameter file: {}", e),
    })?;
    let params = parse_parameters(&content, path)?;
    tracing::info!(
        path = %path.display(),
        magnets = params.magnet.number,
        coils = params.coil.number,
        "loaded motor parameters"
    );
    Ok(params)
}

/// Parses parameter text; `source` only labels errors.
pub fn parse_parameters(content: &str, source: &Path) -> StudyResult<MotorParameters> {
    let config_error = |message: String| StudyError::Configuration { path: source.to_path_buf(), message };

    let document: Value =
        serde_yaml::from_str(content).map_err(|e| config_error(format!("invalid YAML: {}", e)))?;
    let root = match document {
        Value::Mapping(root) => root,
        _ => return Err(config_error("YAML root must be a mapping".to_string())),
    };

    let coil_section = section(&root, COIL_SECTION, source)?;
    let magnet_section = section(&root, MAGNET_SECTION, source)?;

    let magnet: Magnet = typed_section(MAGNET_SECTION, magnet_section, &REQUIRED_MAGNET_FIELDS, source)?;
    let coil: Coil = typed_section(COIL_SECTION, coil_section, &REQUIRED_COIL_FIELDS, source)?;
    // signed turns are passed to the solver as i32
    if i32::try_from(coil.nb_turn).is_err() {
        return Err(config_error(format!(
            "section '{}': nb_turn {} exceeds the solver limit of {}",
            COIL_SECTION,
            coil.nb_turn,
            i32::MAX
        )));
    }

    Ok(MotorParameters { magnet, coil, materials: discover_materials(&root), source: source.to_path_buf() })
}

/// Collects every string value whose key mentions "material", in any section, plus air.
pub fn discover_materials(root: &Mapping) -> BTreeSet<String> {
    let mut found: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (section_name, section_data) in root {
        let (Some(section_name), Value::Mapping(section_data)) = (section_name.as_str(), section_data) else {
            continue;
        };
        for (key, value) in section_data {
            if let (Some(key), Value::String(material)) = (key.as_str(), value) {
                if key.to_lowercase().contains("material") {
                    found.entry(section_name.to_string()).or_default().insert(material.clone());
                }
            }
        }
    }

    for (section, materials) in &found {
        let names: Vec<&str> = materials.iter().map(String::as_str).collect();
        tracing::info!(section = %section, "found materials: {}", names.join(", "));
    }

    let mut materials: BTreeSet<String> = found.into_values().flatten().collect();
    materials.insert(DEFAULT_MATERIAL.to_string());
    materials
}

fn section<'a>(root: &'a Mapping, name: &str, source: &Path) -> StudyResult<&'a Mapping> {
    match root.get(name) {
        Some(Value::Mapping(section)) => Ok(section),
        Some(Value::Null) | None => Err(StudyError::Configuration {
            path: source.to_path_buf(),
            message: format!("missing required section: '{}'", name),
        }),
        Some(_) => Err(StudyError::Configuration {
            path: source.to_path_buf(),
            message: format!("section '{}' must be a mapping", name),
        }),
    }
}

/// Lower-cases keys, folds aliases, drops nulls.
fn normalize_section(name: &str, section: &Mapping, source: &Path) -> StudyResult<Mapping> {
    let mut normalized = Mapping::new();
    for (key, value) in section {
        let key = key.as_str().ok_or_else(|| StudyError::Configuration {
            path: source.to_path_buf(),
            message: format!("section '{}' has a non-string key: {:?}", name, key),
        })?;
        let lowered = key.to_lowercase();
        let canonical = FIELD_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(_, field)| field.to_string())
            .unwrap_or(lowered);
        if value.is_null() {
            continue;
        }
        if normalized.insert(Value::String(canonical.clone()), value.clone()).is_some() {
            return Err(StudyError::Configuration {
                path: source.to_path_buf(),
                message: format!("section '{}' sets '{}' more than once", name, canonical),
            });
        }
    }
    Ok(normalized)
}

fn typed_section<T: DeserializeOwned>(
    name: &'static str,
    section: &Mapping,
    required: &[&'static str],
    source: &Path,
) -> StudyResult<T> {
    let normalized = normalize_section(name, section, source)?;
    for &field in required {
        if !normalized.contains_key(field) {
            return Err(StudyError::Validation { section: name, field });
        }
    }
    serde_yaml::from_value(Value::Mapping(normalized)).map_err(|e| StudyError::Configuration {
        path: source.to_path_buf(),
        message: format!("section '{}': {}", name, e),
    })
}
