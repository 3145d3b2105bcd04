//! Remote module fetching.
//!
//! `npm:` and `jsr:` specifiers map to registry CDN mirrors, tried in
//! order; direct URLs fetch as-is. Fetches for one file run with a bounded
//! fan-out over scoped threads, the only concurrency in the compiler.

use std::collections::HashMap;

use crate::errors::{codes, HqlError, Result};

const FETCH_FAN_OUT: usize = 4;

pub trait ModuleFetcher: Sync {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Candidate URLs for a remote specifier, in fallback order.
pub fn mirror_urls(spec: &str) -> Vec<String> {
    if let Some(pkg) = spec.strip_prefix("npm:") {
        return vec![
            format!("https://esm.sh/{}", pkg),
            format!("https://cdn.jsdelivr.net/npm/{}/+esm", pkg),
        ];
    }
    if let Some(pkg) = spec.strip_prefix("jsr:") {
        return vec![format!("https://esm.sh/jsr/{}", pkg)];
    }
    vec![spec.to_string()]
}

/// ureq-backed fetcher used outside tests.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(30))
                .build(),
        }
    }
}

impl ModuleFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        self.agent
            .get(url)
            .call()
            .map_err(|e| {
                HqlError::import(format!("Failed to fetch '{}': {}", url, e))
                    .with_code(codes::REMOTE_FETCH_FAILED)
            })?
            .into_string()
            .map_err(|e| {
                HqlError::import(format!("Failed to fetch '{}': {}", url, e))
                    .with_code(codes::REMOTE_FETCH_FAILED)
            })
    }
}

/// Fetches one specifier, trying each mirror before giving up.
pub fn fetch_with_fallback(fetcher: &dyn ModuleFetcher, spec: &str) -> Result<String> {
    let mut last_err = None;
    for url in mirror_urls(spec) {
        match fetcher.fetch(&url) {
            Ok(text) => return Ok(text),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        HqlError::import(format!("Failed to fetch '{}'", spec))
            .with_code(codes::REMOTE_FETCH_FAILED)
    }))
}

/// Fetches many specifiers with bounded parallelism. Returns the fetched
/// text per specifier; the first failure aborts the batch.
pub fn fetch_many(fetcher: &dyn ModuleFetcher, specs: &[String]) -> Result<HashMap<String, String>> {
    let mut results = HashMap::new();
    for chunk in specs.chunks(FETCH_FAN_OUT) {
        let fetched: Vec<(String, Result<String>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|spec| {
                    scope.spawn(move || (spec.clone(), fetch_with_fallback(fetcher, spec)))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("fetch thread does not panic"))
                .collect()
        });
        for (spec, result) in fetched {
            results.insert(spec, result?);
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeFetcher;

    impl ModuleFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            if url.contains("esm.sh") {
                Err(HqlError::import("Failed to fetch: mirror down")
                    .with_code(codes::REMOTE_FETCH_FAILED))
            } else {
                Ok(format!("// from {}", url))
            }
        }
    }

    #[test]
    fn npm_mirrors_in_order() {
        let urls = mirror_urls("npm:chalk@5");
        assert_eq!(urls[0], "https://esm.sh/chalk@5");
        assert!(urls[1].contains("jsdelivr"));
    }

    #[test]
    fn fallback_uses_second_mirror() {
        let text = fetch_with_fallback(&FakeFetcher, "npm:chalk").unwrap();
        assert!(text.contains("jsdelivr"));
    }

    #[test]
    fn batch_fetch_collects_all() {
        let specs = vec![
            "https://example.com/a.js".to_string(),
            "https://example.com/b.js".to_string(),
        ];
        let results = fetch_many(&FakeFetcher, &specs).unwrap();
        assert_eq!(results.len(), 2);
    }
}
