// sqlbackuptool/src/backup/intake.rs
use log::warn;
use serde::Deserialize;

use crate::server::RecoveryModel;

/// One entry of the requested database list: a bare name or an object that
/// carries at least a `name`. Other fields on the object are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DatabaseInput {
    Name(String),
    Descriptor(DatabaseObject),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseObject {
    pub name: String,
}

impl DatabaseInput {
    pub fn name(&self) -> &str {
        match self {
            DatabaseInput::Name(name) => name,
            DatabaseInput::Descriptor(object) => &object.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDescriptor {
    pub name: String,
    pub recovery_model: RecoveryModel,
}

impl DatabaseDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recovery_model: RecoveryModel::Unknown,
        }
    }

    pub fn with_recovery_model(&self, recovery_model: RecoveryModel) -> Self {
        Self {
            name: self.name.clone(),
            recovery_model,
        }
    }
}

/// Normalizes the raw input list, preserving order. Names are trimmed and
/// entries with a blank name are dropped.
pub fn normalize_inputs(inputs: &[DatabaseInput]) -> Vec<DatabaseDescriptor> {
    inputs
        .iter()
        .filter_map(|input| {
            let name = input.name().trim();
            if name.is_empty() {
                warn!("Skipping database entry with an empty name: {:?}", input);
                None
            } else {
                Some(DatabaseDescriptor::new(name))
            }
        })
        .collect()
}
