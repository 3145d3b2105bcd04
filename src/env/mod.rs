//! Lexically scoped binding environment.
//!
//! Scopes live in an arena addressed by [`ScopeId`]; parent pointers are
//! indices, so the lexical chain carries no ownership cycles. The root
//! environment also owns the macro registry and all per-module bookkeeping:
//! live export maps, processed/in-progress file sets, and the current file
//! label that macro accessibility checks consult.
//!
//! Lookups walk the scope chain and understand dotted paths (`a.b.c`)
//! through module exports and map values. A bounded cache fronts lookups
//! and is invalidated on every define.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::errors::{codes, HqlError, Result};
use crate::interp::value::{new_export_map, ExportMap, Value};
use crate::macros::registry::MacroRegistry;

/// Index of a scope in the environment arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

/// The root scope created by [`Environment::new`].
pub const GLOBAL_SCOPE: ScopeId = ScopeId(0);

const LOOKUP_CACHE_CAPACITY: usize = 500;

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    variables: HashMap<String, Value>,
}

#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
    pub macros: MacroRegistry,
    module_exports: HashMap<String, ExportMap>,
    processed_files: HashSet<String>,
    in_progress_files: HashSet<String>,
    /// Modules another file bound while they were still in progress, i.e.
    /// modules on a live import cycle.
    cycle_bound_files: HashSet<String>,
    pub current_file: Option<String>,
    pub current_macro_context: Option<String>,
    cache: RefCell<LookupCache>,
    gensym_counter: u64,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            macros: MacroRegistry::new(),
            module_exports: HashMap::new(),
            processed_files: HashSet::new(),
            in_progress_files: HashSet::new(),
            cycle_bound_files: HashSet::new(),
            current_file: None,
            current_macro_context: None,
            cache: RefCell::new(LookupCache::new(LOOKUP_CACHE_CAPACITY)),
            gensym_counter: 0,
        }
    }

    /// Creates a child scope. The macro registry is shared; only variable
    /// bindings are scoped.
    pub fn extend(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            variables: HashMap::new(),
        });
        id
    }

    /// Binds `name` in `scope`. Re-binding the same key in the same scope
    /// replaces the value. Every define invalidates the lookup cache.
    pub fn define(&mut self, scope: ScopeId, name: impl Into<String>, value: Value) {
        self.scopes[scope.0].variables.insert(name.into(), value);
        self.cache.borrow_mut().clear();
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Result<Value> {
        if let Some(hit) = self.cache.borrow_mut().get(scope, name) {
            return Ok(hit);
        }
        let value = self.lookup_uncached(scope, name)?;
        self.cache.borrow_mut().insert(scope, name, value.clone());
        Ok(value)
    }

    fn lookup_uncached(&self, scope: ScopeId, name: &str) -> Result<Value> {
        if !name.contains('.') {
            return self
                .resolve_simple(scope, name)
                .ok_or_else(|| undefined(name));
        }

        // Dotted path: resolve the head, then walk module exports and maps.
        let mut segments = name.split('.');
        let head = segments.next().expect("split yields at least one segment");
        let mut current = self
            .resolve_simple(scope, head)
            .ok_or_else(|| undefined(head))?;
        for segment in segments {
            current = match &current {
                Value::Module(exports) => exports
                    .borrow()
                    .get(segment)
                    .cloned()
                    .ok_or_else(|| undefined(name))?,
                Value::Map(map) => map.get(segment).cloned().ok_or_else(|| undefined(name))?,
                // Opaque hosts yield opaque members; the target runtime
                // resolves them for real.
                Value::Opaque(host) => Value::Opaque(format!("{}.{}", host, segment)),
                _ => return Err(undefined(name)),
            };
        }
        Ok(current)
    }

    fn resolve_simple(&self, scope: ScopeId, name: &str) -> Option<Value> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let scope = &self.scopes[id.0];
            if let Some(value) = scope.variables.get(name) {
                return Some(value.clone());
            }
            cursor = scope.parent;
        }
        self.module_exports
            .get(name)
            .map(|exports| Value::Module(Rc::clone(exports)))
    }

    /// Mutates the nearest binding of `name` on the chain, or defines it in
    /// `scope` when unbound.
    pub fn assign(&mut self, scope: ScopeId, name: &str, value: Value) {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if self.scopes[id.0].variables.contains_key(name) {
                self.scopes[id.0].variables.insert(name.to_string(), value);
                self.cache.borrow_mut().clear();
                return;
            }
            cursor = self.scopes[id.0].parent;
        }
        self.define(scope, name, value);
    }

    /// True when `name` is bound somewhere on the chain (ignoring modules).
    pub fn is_defined(&self, scope: ScopeId, name: &str) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let s = &self.scopes[id.0];
            if s.variables.contains_key(name) {
                return true;
            }
            cursor = s.parent;
        }
        false
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    /// Ensures one stable exports mapping for `name` and merges `exports`
    /// into it. The mapping instance never changes, so importers that bound
    /// it earlier observe the merge (live bindings, circular imports).
    pub fn import_module(
        &mut self,
        name: impl Into<String>,
        exports: HashMap<String, Value>,
    ) -> ExportMap {
        let entry = self
            .module_exports
            .entry(name.into())
            .or_insert_with(new_export_map);
        entry.borrow_mut().extend(exports);
        let map = Rc::clone(entry);
        self.cache.borrow_mut().clear();
        map
    }

    pub fn module_export_map(&self, name: &str) -> Option<ExportMap> {
        self.module_exports.get(name).map(Rc::clone)
    }

    // ------------------------------------------------------------------
    // File tracking for the import processor
    // ------------------------------------------------------------------

    pub fn has_processed_file(&self, path: &str) -> bool {
        self.processed_files.contains(path)
    }

    pub fn is_file_in_progress(&self, path: &str) -> bool {
        self.in_progress_files.contains(path)
    }

    pub fn begin_file(&mut self, path: &str) {
        debug_assert!(!self.processed_files.contains(path));
        self.in_progress_files.insert(path.to_string());
    }

    /// Moves a file from in-progress to processed. The two sets stay
    /// disjoint at all times.
    pub fn mark_file_processed(&mut self, path: &str) {
        self.in_progress_files.remove(path);
        self.processed_files.insert(path.to_string());
    }

    /// Records that some importer bound `path` while it was in progress.
    pub fn note_cycle_binding(&mut self, path: &str) {
        self.cycle_bound_files.insert(path.to_string());
    }

    pub fn was_cycle_bound(&self, path: &str) -> bool {
        self.cycle_bound_files.contains(path)
    }

    // ------------------------------------------------------------------
    // Macros (delegated to the registry with the current file filled in)
    // ------------------------------------------------------------------

    pub fn define_macro(&mut self, def: crate::macros::registry::MacroDef, is_system: bool) {
        if is_system {
            self.macros.define_system(def);
        } else {
            self.macros.define_user(def);
        }
    }

    pub fn mark_macro_exported(&mut self, name: &str) -> Result<()> {
        let file = self.current_file.clone().unwrap_or_default();
        self.macros.mark_exported(&file, name)
    }

    pub fn mark_macro_imported(&mut self, name: &str) {
        let file = self.current_file.clone().unwrap_or_default();
        self.macros.mark_imported(&file, name);
    }

    pub fn import_user_macro(&mut self, name: &str, alias: Option<&str>, source_file: &str) -> Result<()> {
        let file = self.current_file.clone().unwrap_or_default();
        self.macros.import_user_macro(name, alias, source_file, &file)
    }

    pub fn is_macro_accessible(&self, name: &str) -> bool {
        let file = self.current_file.as_deref().unwrap_or_default();
        self.macros.is_accessible(name, file)
    }

    // ------------------------------------------------------------------
    // Gensym
    // ------------------------------------------------------------------

    /// Fresh symbol for `prefix#`. Deterministic within one environment.
    pub fn gensym(&mut self, prefix: &str) -> String {
        self.gensym_counter += 1;
        let stem = prefix.trim_end_matches('#');
        format!("{}__{}", stem, self.gensym_counter)
    }

    /// Flattens the whole scope chain of `scope` into a single fresh scope,
    /// inner bindings shadowing outer. This is the bridge the macro
    /// expander uses when entering the interpreter.
    pub fn flattened(&mut self, scope: ScopeId) -> ScopeId {
        let mut chain = Vec::new();
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.scopes[id.0].parent;
        }
        let mut flat = HashMap::new();
        for id in chain.into_iter().rev() {
            for (k, v) in &self.scopes[id.0].variables {
                flat.insert(k.clone(), v.clone());
            }
        }
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: None,
            variables: flat,
        });
        id
    }
}

fn undefined(name: &str) -> HqlError {
    HqlError::runtime(format!("Undefined variable '{}'", name))
        .with_code(codes::UNDEFINED_VARIABLE)
        .with_suggestion(format!("Define '{}' before use or import it.", name))
}

// ============================================================================
// LOOKUP CACHE
// ============================================================================

// Bounded LRU keyed by (scope, name). Defines clear it wholesale, so
// entries never go stale; the LRU policy only matters between writes.
#[derive(Debug)]
struct LookupCache {
    entries: HashMap<(usize, String), (Value, u64)>,
    tick: u64,
    capacity: usize,
}

impl LookupCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            capacity,
        }
    }

    fn get(&mut self, scope: ScopeId, name: &str) -> Option<Value> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(&(scope.0, name.to_string()))?;
        entry.1 = tick;
        Some(entry.0.clone())
    }

    fn insert(&mut self, scope: ScopeId, name: &str, value: Value) {
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, stamp))| *stamp)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.tick += 1;
        self.entries
            .insert((scope.0, name.to_string()), (value, self.tick));
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_lookup_and_shadowing() {
        let mut env = Environment::new();
        env.define(GLOBAL_SCOPE, "x", Value::Int(1));
        let inner = env.extend(GLOBAL_SCOPE);
        assert_eq!(env.lookup(inner, "x").unwrap(), Value::Int(1));
        env.define(inner, "x", Value::Int(2));
        assert_eq!(env.lookup(inner, "x").unwrap(), Value::Int(2));
        assert_eq!(env.lookup(GLOBAL_SCOPE, "x").unwrap(), Value::Int(1));
    }

    #[test]
    fn undefined_variable_error() {
        let env = Environment::new();
        let err = env.lookup(GLOBAL_SCOPE, "nope").unwrap_err();
        assert_eq!(err.code, codes::UNDEFINED_VARIABLE);
    }

    #[test]
    fn dotted_lookup_through_module() {
        let mut env = Environment::new();
        let mut exports = HashMap::new();
        exports.insert("bar".to_string(), Value::Int(7));
        env.import_module("mod", exports);
        assert_eq!(env.lookup(GLOBAL_SCOPE, "mod.bar").unwrap(), Value::Int(7));
    }

    #[test]
    fn export_map_is_stable_across_merges() {
        let mut env = Environment::new();
        let first = env.import_module("m", HashMap::new());
        let mut late = HashMap::new();
        late.insert("x".to_string(), Value::Int(1));
        let second = env.import_module("m", late);
        assert!(std::rc::Rc::ptr_eq(&first, &second));
        // The earlier handle observes the merge.
        assert_eq!(first.borrow().get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn processed_and_in_progress_stay_disjoint() {
        let mut env = Environment::new();
        env.begin_file("a.hql");
        assert!(env.is_file_in_progress("a.hql"));
        env.mark_file_processed("a.hql");
        assert!(env.has_processed_file("a.hql"));
        assert!(!env.is_file_in_progress("a.hql"));
    }

    #[test]
    fn cache_cleared_on_define() {
        let mut env = Environment::new();
        env.define(GLOBAL_SCOPE, "x", Value::Int(1));
        assert_eq!(env.lookup(GLOBAL_SCOPE, "x").unwrap(), Value::Int(1));
        env.define(GLOBAL_SCOPE, "x", Value::Int(2));
        assert_eq!(env.lookup(GLOBAL_SCOPE, "x").unwrap(), Value::Int(2));
    }

    #[test]
    fn gensym_is_fresh_and_prefixed() {
        let mut env = Environment::new();
        let a = env.gensym("tmp#");
        let b = env.gensym("tmp#");
        assert_ne!(a, b);
        assert!(a.starts_with("tmp__"));
    }

    #[test]
    fn flattened_scope_shadows_outer() {
        let mut env = Environment::new();
        env.define(GLOBAL_SCOPE, "x", Value::Int(1));
        env.define(GLOBAL_SCOPE, "y", Value::Int(9));
        let inner = env.extend(GLOBAL_SCOPE);
        env.define(inner, "x", Value::Int(2));
        let flat = env.flattened(inner);
        assert_eq!(env.lookup(flat, "x").unwrap(), Value::Int(2));
        assert_eq!(env.lookup(flat, "y").unwrap(), Value::Int(9));
    }
}
