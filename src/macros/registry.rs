//! Macro storage and accessibility.
//!
//! Two tables: system macros, loaded from the embedded stdlib and always
//! globally accessible, and user macros, which belong to the file that
//! defined them and cross file boundaries only through explicit export and
//! import. A macro is accessible in file F iff it is a system macro, was
//! defined in F, or was imported into F.
//!
//! A macro definition is data (parameters, optional rest name, body forms,
//! defining file), not a host function. Invocation happens in the macro
//! expander via the interpreter.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::Form;
use crate::errors::{codes, HqlError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub rest: Option<String>,
    pub body: Vec<Form>,
    pub source_file: String,
}

#[derive(Debug, Default)]
pub struct MacroRegistry {
    system: HashMap<String, Rc<MacroDef>>,
    user: HashMap<String, Rc<MacroDef>>,
    /// Defining file per user macro. Defined for every user macro.
    macro_source_files: HashMap<String, String>,
    /// file -> names that file exported.
    exported_macros: HashMap<String, HashSet<String>>,
    /// file -> names imported into that file.
    imported_macros: HashMap<String, HashSet<String>>,
    /// Bumped on every definition; the expansion cache keys on it.
    revision: u64,
    /// Expansion results keyed by structural hash. Any definition that
    /// shadows a name bumps `revision`, which drops the whole cache.
    expansion_cache: RefCell<HashMap<[u8; 32], Form>>,
    cached_revision: Cell<u64>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_system(&mut self, def: MacroDef) {
        self.revision += 1;
        self.system.insert(def.name.clone(), Rc::new(def));
    }

    pub fn define_user(&mut self, def: MacroDef) {
        self.revision += 1;
        self.macro_source_files
            .insert(def.name.clone(), def.source_file.clone());
        self.user.insert(def.name.clone(), Rc::new(def));
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.system.contains_key(name) || self.user.contains_key(name)
    }

    pub fn is_system_macro(&self, name: &str) -> bool {
        self.system.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Rc<MacroDef>> {
        self.user
            .get(name)
            .or_else(|| self.system.get(name))
            .map(Rc::clone)
    }

    pub fn source_file_of(&self, name: &str) -> Option<&str> {
        self.macro_source_files.get(name).map(String::as_str)
    }

    pub fn is_accessible(&self, name: &str, file: &str) -> bool {
        if self.system.contains_key(name) {
            return true;
        }
        if !self.user.contains_key(name) {
            return false;
        }
        if self.macro_source_files.get(name).map(String::as_str) == Some(file) {
            return true;
        }
        self.imported_macros
            .get(file)
            .map(|names| names.contains(name))
            .unwrap_or(false)
    }

    pub fn mark_exported(&mut self, file: &str, name: &str) -> Result<()> {
        if !self.user.contains_key(name) {
            return Err(HqlError::macro_error(format!(
                "Macro '{}' not found in this file, so it cannot be exported",
                name
            ))
            .with_code(codes::MACRO_NOT_FOUND));
        }
        self.exported_macros
            .entry(file.to_string())
            .or_default()
            .insert(name.to_string());
        Ok(())
    }

    pub fn mark_imported(&mut self, file: &str, name: &str) {
        self.imported_macros
            .entry(file.to_string())
            .or_default()
            .insert(name.to_string());
    }

    pub fn is_exported_from(&self, file: &str, name: &str) -> bool {
        self.exported_macros
            .get(file)
            .map(|names| names.contains(name))
            .unwrap_or(false)
    }

    pub fn exported_macros_of(&self, file: &str) -> Option<&HashSet<String>> {
        self.exported_macros.get(file)
    }

    /// Imports a user macro into `importing_file`, optionally under an
    /// alias. Succeeds only when `source_file` exported it.
    pub fn import_user_macro(
        &mut self,
        name: &str,
        alias: Option<&str>,
        source_file: &str,
        importing_file: &str,
    ) -> Result<()> {
        if !self.is_exported_from(source_file, name) {
            return Err(HqlError::macro_error(format!(
                "Macro '{}' not found among the exports of '{}'",
                name, source_file
            ))
            .with_code(codes::MACRO_NOT_FOUND)
            .with_suggestion(format!("Add (export [{}]) to {}.", name, source_file)));
        }
        let def = self.user.get(name).map(Rc::clone).ok_or_else(|| {
            HqlError::macro_error(format!("Macro '{}' not found", name))
                .with_code(codes::MACRO_NOT_FOUND)
        })?;

        let visible_name = alias.unwrap_or(name);
        if visible_name != name {
            // The alias gets its own table entry pointing at the same body.
            self.revision += 1;
            self.macro_source_files
                .insert(visible_name.to_string(), def.source_file.clone());
            self.user.insert(visible_name.to_string(), def);
        }
        self.mark_imported(importing_file, visible_name);
        Ok(())
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn cache_get(&self, key: &[u8; 32]) -> Option<Form> {
        if self.cached_revision.get() != self.revision {
            return None;
        }
        self.expansion_cache.borrow().get(key).cloned()
    }

    pub fn cache_put(&self, key: [u8; 32], expansion: Form) {
        if self.cached_revision.get() != self.revision {
            self.expansion_cache.borrow_mut().clear();
            self.cached_revision.set(self.revision);
        }
        self.expansion_cache.borrow_mut().insert(key, expansion);
    }

    /// Stable fingerprint of the visible macro table, mixed into expansion
    /// cache keys.
    pub fn fingerprint(&self) -> String {
        let mut names: Vec<&str> = self
            .system
            .keys()
            .chain(self.user.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        format!("{}:{}", self.revision, names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, file: &str) -> MacroDef {
        MacroDef {
            name: name.to_string(),
            params: vec![],
            rest: None,
            body: vec![],
            source_file: file.to_string(),
        }
    }

    #[test]
    fn system_macros_are_globally_accessible() {
        let mut reg = MacroRegistry::new();
        reg.define_system(def("print", "@hql/core"));
        assert!(reg.is_accessible("print", "anything.hql"));
    }

    #[test]
    fn user_macros_are_file_scoped() {
        let mut reg = MacroRegistry::new();
        reg.define_user(def("twice", "a.hql"));
        assert!(reg.is_accessible("twice", "a.hql"));
        assert!(!reg.is_accessible("twice", "b.hql"));
        assert_eq!(reg.source_file_of("twice"), Some("a.hql"));
    }

    #[test]
    fn import_requires_export() {
        let mut reg = MacroRegistry::new();
        reg.define_user(def("twice", "a.hql"));
        let err = reg
            .import_user_macro("twice", None, "a.hql", "b.hql")
            .unwrap_err();
        assert_eq!(err.code, codes::MACRO_NOT_FOUND);

        reg.mark_exported("a.hql", "twice").unwrap();
        reg.import_user_macro("twice", None, "a.hql", "b.hql").unwrap();
        assert!(reg.is_accessible("twice", "b.hql"));
    }

    #[test]
    fn aliased_import_registers_alias() {
        let mut reg = MacroRegistry::new();
        reg.define_user(def("twice", "a.hql"));
        reg.mark_exported("a.hql", "twice").unwrap();
        reg.import_user_macro("twice", Some("double"), "a.hql", "b.hql")
            .unwrap();
        assert!(reg.is_accessible("double", "b.hql"));
        assert!(reg.get("double").is_some());
    }

    #[test]
    fn fingerprint_changes_with_definitions() {
        let mut reg = MacroRegistry::new();
        let before = reg.fingerprint();
        reg.define_user(def("m", "a.hql"));
        assert_ne!(before, reg.fingerprint());
    }
}
