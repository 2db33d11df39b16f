//! Entity classes and the tables they occupy.

use std::collections::HashMap;

use crate::config::{LocalisationConfig, SchemaConfig};

const VERSIONS_SUFFIX: &str = "_Versions";

/// A configured entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityClass {
    pub name: String,
    pub table: String,
    pub parent: Option<String>,
    pub versioned: bool,
    pub localised: bool,
}

/// Lookup of entity classes by name, with inheritance resolution.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    classes: HashMap<String, EntityClass>,
}

impl SchemaRegistry {
    pub fn from_config(config: &SchemaConfig) -> Self {
        let classes = config
            .classes
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    EntityClass {
                        name: c.name.clone(),
                        table: c.table_name().to_string(),
                        parent: c.parent.clone(),
                        versioned: c.versioned,
                        localised: c.localised,
                    },
                )
            })
            .collect();
        Self { classes }
    }

    pub fn get(&self, name: &str) -> Option<&EntityClass> {
        self.classes.get(name)
    }

    /// The class and its ancestors, root first. Empty for unknown classes.
    ///
    /// Stops at the first unknown or repeated parent; configuration
    /// validation rejects both.
    pub fn ancestry(&self, name: &str) -> Vec<&EntityClass> {
        let mut chain = Vec::new();
        let mut next = self.classes.get(name);
        while let Some(class) = next {
            if chain.iter().any(|c: &&EntityClass| c.name == class.name) {
                break;
            }
            chain.push(class);
            next = class.parent.as_deref().and_then(|p| self.classes.get(p));
        }
        chain.reverse();
        chain
    }

    /// Root of the class's inheritance chain.
    pub fn base_class(&self, name: &str) -> Option<&EntityClass> {
        self.ancestry(name).into_iter().next()
    }
}

/// Names version tables, with or without localised variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableResolver {
    Plain,
    Localised { suffix: String },
}

impl TableResolver {
    pub fn from_config(config: &LocalisationConfig) -> Self {
        if config.enabled {
            TableResolver::Localised {
                suffix: config.suffix.clone(),
            }
        } else {
            TableResolver::Plain
        }
    }

    pub fn versions_table(&self, class: &EntityClass) -> String {
        format!("{}{VERSIONS_SUFFIX}", class.table)
    }

    /// `<Table>_Localised_Versions`, if localisation is on and the class is localised.
    pub fn localised_versions_table(&self, class: &EntityClass) -> Option<String> {
        match self {
            TableResolver::Localised { suffix } if class.localised => {
                Some(format!("{}{suffix}", class.table))
            }
            _ => None,
        }
    }

    pub fn is_localised(&self, class: &EntityClass) -> bool {
        self.localised_versions_table(class).is_some()
    }
}
