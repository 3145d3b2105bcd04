//! Embedded standard library.
//!
//! Stdlib code is ordinary HQL source compiled through the same pipeline as
//! user code. The core module is loaded once per environment at driver
//! setup and registers its macros as system macros; other `@hql/...`
//! modules resolve here when imported explicitly.

use crate::env::{Environment, GLOBAL_SCOPE};
use crate::errors::Result;
use crate::macros::{expand_program, ExpandOptions};
use crate::syntax::{reader, transform_program};

pub const CORE_MODULE: &str = "@hql/core";

const CORE_SOURCE: &str = include_str!("core.hql");

/// Resolves an `@hql/...` specifier to embedded source.
pub fn embedded_source(path: &str) -> Option<&'static str> {
    match path {
        "@hql/core" | "@hql/core.hql" => Some(CORE_SOURCE),
        _ => None,
    }
}

/// Loads the core macros into `env` once; later calls are no-ops.
pub fn ensure_core_macros(env: &mut Environment) -> Result<()> {
    if env.macros.is_system_macro("print") {
        return Ok(());
    }
    let saved_file = env.current_file.take();
    let forms = reader::read_program(CORE_SOURCE, CORE_MODULE)?;
    let forms = transform_program(forms)?;
    let opts = ExpandOptions {
        current_file: Some(CORE_MODULE.to_string()),
        system_mode: true,
        ..Default::default()
    };
    let result = expand_program(forms, GLOBAL_SCOPE, env, &opts);
    env.current_file = saved_file;
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_macros_register_as_system() {
        let mut env = Environment::new();
        ensure_core_macros(&mut env).unwrap();
        assert!(env.macros.is_system_macro("print"));
        assert!(env.macros.is_system_macro("->"));
        assert!(env.macros.is_accessible("print", "anything.hql"));
    }

    #[test]
    fn loading_twice_is_idempotent() {
        let mut env = Environment::new();
        ensure_core_macros(&mut env).unwrap();
        let revision = env.macros.revision();
        ensure_core_macros(&mut env).unwrap();
        assert_eq!(env.macros.revision(), revision);
    }
}
