//! Runtime helper prelude.
//!
//! The compiler leans on a small set of `__hql_`-prefixed helpers in the
//! emitted module. The lowerer records which helpers a program actually
//! references; the driver injects just those definitions (plus their own
//! dependencies) ahead of the module body, in a stable order.

/// All helper names, in the order they are emitted.
pub const HELPER_NAMES: &[&str] = &[
    "__hql_get",
    "__hql_getNumeric",
    "__hql_range",
    "__hql_toSequence",
    "__hql_for_each",
    "__hql_hash_map",
    "__hql_throw",
    "__hql_deepFreeze",
];

/// Maps an identifier to its helper name, if it is one.
pub fn helper_name(ident: &str) -> Option<&'static str> {
    HELPER_NAMES.iter().find(|name| **name == ident).copied()
}

/// Helpers a helper itself depends on.
fn dependencies(name: &str) -> &'static [&'static str] {
    match name {
        "__hql_for_each" => &["__hql_toSequence"],
        _ => &[],
    }
}

fn source_of(name: &str) -> &'static str {
    match name {
        "__hql_get" => {
            "function __hql_get(coll, key, fallback) {\n  if (coll == null) return fallback;\n  if (typeof coll.get === \"function\") {\n    const hit = coll.get(key);\n    return hit === undefined ? fallback : hit;\n  }\n  const hit = coll[key];\n  return hit === undefined ? fallback : hit;\n}\n"
        }
        "__hql_getNumeric" => {
            "function __hql_getNumeric(coll, index) {\n  return coll == null ? undefined : coll[index];\n}\n"
        }
        "__hql_range" => {
            "function __hql_range(start, end, step) {\n  if (end === undefined) {\n    end = start;\n    start = 0;\n  }\n  if (step === undefined) step = start <= end ? 1 : -1;\n  const out = [];\n  if (step > 0) {\n    for (let i = start; i < end; i += step) out.push(i);\n  } else if (step < 0) {\n    for (let i = start; i > end; i += step) out.push(i);\n  }\n  return out;\n}\n"
        }
        "__hql_toSequence" => {
            "function __hql_toSequence(value) {\n  if (value == null) return [];\n  if (Array.isArray(value)) return value;\n  if (typeof value === \"string\") return Array.from(value);\n  if (typeof value[Symbol.iterator] === \"function\") return value;\n  if (typeof value === \"object\") return Object.entries(value);\n  return [value];\n}\n"
        }
        "__hql_for_each" => {
            "function __hql_for_each(seq, fn) {\n  for (const item of __hql_toSequence(seq)) fn(item);\n}\n"
        }
        "__hql_hash_map" => {
            "function __hql_hash_map(...entries) {\n  const out = {};\n  for (let i = 0; i + 1 < entries.length; i += 2) {\n    out[entries[i]] = entries[i + 1];\n  }\n  return out;\n}\n"
        }
        "__hql_throw" => "function __hql_throw(error) {\n  throw error;\n}\n",
        "__hql_deepFreeze" => {
            "function __hql_deepFreeze(obj) {\n  for (const key of Object.getOwnPropertyNames(obj)) {\n    const value = obj[key];\n    if (value && typeof value === \"object\") __hql_deepFreeze(value);\n  }\n  return Object.freeze(obj);\n}\n"
        }
        _ => "",
    }
}

/// Builds the prelude text for the helpers `used`, dependency-closed and in
/// declaration order.
pub fn prelude_for<'a, I: IntoIterator<Item = &'a str>>(used: I) -> String {
    let mut wanted: Vec<&str> = Vec::new();
    for name in used {
        if !wanted.contains(&name) {
            wanted.push(name);
        }
        for dep in dependencies(name) {
            if !wanted.contains(dep) {
                wanted.push(dep);
            }
        }
    }
    let mut out = String::new();
    for name in HELPER_NAMES {
        if wanted.contains(name) {
            out.push_str(source_of(name));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_is_dependency_closed() {
        let prelude = prelude_for(["__hql_for_each"]);
        assert!(prelude.contains("function __hql_for_each"));
        assert!(prelude.contains("function __hql_toSequence"));
    }

    #[test]
    fn unused_helpers_are_omitted() {
        let prelude = prelude_for(["__hql_get"]);
        assert!(prelude.contains("__hql_get"));
        assert!(!prelude.contains("__hql_range"));
    }

    #[test]
    fn helper_name_detection() {
        assert_eq!(helper_name("__hql_get"), Some("__hql_get"));
        assert_eq!(helper_name("regular"), None);
    }
}
