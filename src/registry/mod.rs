//! Program-Class Registry (§4.4): the merged, inheritance-resolved view of
//! every configured SmartWeb program class.

pub mod class;
pub mod loader;

pub use class::{ClassSource, Field, ProgramClass, ROOT_CLASS_NAME};

use std::collections::HashMap;

use tracing::warn;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone)]
pub struct Registry {
    classes_by_type: HashMap<u8, ProgramClass>,
    classes_by_name: HashMap<String, u8>,
}

impl Registry {
    pub fn new(classes_by_type: HashMap<u8, ProgramClass>) -> Self {
        let classes_by_name = classes_by_type
            .values()
            .map(|c| (c.name.clone(), c.program_type))
            .collect();
        Registry {
            classes_by_type,
            classes_by_name,
        }
    }

    /// Loads built-in classes merged with any user directory, per §4.4's
    /// override rules.
    pub fn load(user_dir: Option<&std::path::Path>) -> Result<Self> {
        let mut all = loader::load_builtin_classes()?;
        if let Some(dir) = user_dir {
            all.extend(loader::load_user_directory(dir)?);
        }
        Ok(Registry::new(loader::merge_classes(all)))
    }

    pub fn by_type(&self, program_type: u8) -> Option<&ProgramClass> {
        self.classes_by_type.get(&program_type)
    }

    pub fn by_name(&self, name: &str) -> Option<&ProgramClass> {
        self.classes_by_name.get(name).and_then(|t| self.classes_by_type.get(t))
    }

    /// Every parameter of `class`, plus recursively every parameter of each
    /// parent class whose name resolves to a known class, terminating at
    /// `ROOT_CLASS_NAME` (§4.7's discovery/request-construction step).
    /// Each parameter is paired with the `program_type` of the class that
    /// declares it, since a `SET_PARAMETER_VALUE`/`GET_PARAMETER_VALUE`
    /// payload addresses a parent class's parameter under that class's own
    /// type, not the discovered program's leaf type. Only inputs/outputs are
    /// NOT inherited this way — only the discovered program's own (§4.7).
    pub fn inherited_parameters<'a>(&'a self, class: &'a ProgramClass) -> Vec<(u8, &'a Field)> {
        let mut seen_classes = std::collections::HashSet::new();
        let mut out = Vec::new();
        self.collect_parameters(class, &mut seen_classes, &mut out);
        out
    }

    fn collect_parameters<'a>(
        &'a self,
        class: &'a ProgramClass,
        seen_classes: &mut std::collections::HashSet<String>,
        out: &mut Vec<(u8, &'a Field)>,
    ) {
        if !seen_classes.insert(class.name.clone()) {
            return;
        }
        out.extend(class.parameters.values().map(|field| (class.program_type, field)));
        for parent_name in &class.parent_class_names {
            if parent_name == ROOT_CLASS_NAME {
                continue;
            }
            match self.by_name(parent_name) {
                Some(parent) => self.collect_parameters(parent, seen_classes, out),
                None => warn!("unknown program type: '{parent_name}'"),
            }
        }
    }

    pub fn class_for_type(&self, program_type: u8) -> Result<&ProgramClass> {
        self.by_type(program_type)
            .ok_or_else(|| GatewayError::driver(format!("unknown program class type {program_type}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_builtin_room_device() {
        let registry = Registry::load(None).unwrap();
        let class = registry.class_for_type(5).unwrap();
        assert_eq!(class.name, "ROOM_DEVICE");
        let params = registry.inherited_parameters(class);
        assert!(params.iter().any(|(_, f)| f.name == "roomReducedTemperature"));
    }
}
