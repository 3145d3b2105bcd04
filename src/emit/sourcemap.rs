//! Source map V3: building, parsing, and position mapping.
//!
//! The builder accumulates (generated, original) position pairs as the
//! generator writes tokens, then encodes the standard `mappings` string:
//! semicolon-separated generated lines, comma-separated segments, each
//! segment a run of base64 VLQ deltas. The parser does the reverse and
//! backs `map_position`, which tools use to walk generated positions back
//! to the original source.
//!
//! Parsed maps loaded from disk are cached; `invalidate_source_map_cache`
//! drops the cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{codes, HqlError};

const BASE64_CHARS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid VLQ data in mappings")]
    InvalidVlq,
    #[error("failed to read source map: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SourceMapError> for HqlError {
    fn from(err: SourceMapError) -> Self {
        HqlError::codegen(err.to_string()).with_code(codes::SOURCE_MAP_INVALID)
    }
}

// ============================================================================
// VLQ
// ============================================================================

pub fn vlq_encode(value: i64, out: &mut String) {
    // Sign goes into the lowest bit.
    let mut n = if value < 0 {
        (((-value) as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (n & 0b11111) as u8;
        n >>= 5;
        if n > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if n == 0 {
            break;
        }
    }
}

fn vlq_decode(bytes: &[u8], cursor: &mut usize) -> Result<i64, SourceMapError> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*cursor).ok_or(SourceMapError::InvalidVlq)?;
        *cursor += 1;
        let digit = BASE64_CHARS
            .iter()
            .position(|c| *c == byte)
            .ok_or(SourceMapError::InvalidVlq)? as u64;
        result |= (digit & 0b11111) << shift;
        shift += 5;
        if digit & 0b100000 == 0 {
            break;
        }
        if shift > 62 {
            return Err(SourceMapError::InvalidVlq);
        }
    }
    let value = (result >> 1) as i64;
    Ok(if result & 1 == 1 { -value } else { value })
}

// ============================================================================
// SERIALIZED FORM
// ============================================================================

/// The V3 JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMap {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    #[serde(rename = "sourcesContent", skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("source map serializes")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    gen_col: u32,
    source: u32,
    src_line: u32,
    src_col: u32,
    name: Option<u32>,
}

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    file: Option<String>,
    sources: Vec<String>,
    source_lookup: HashMap<String, u32>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
    name_lookup: HashMap<String, u32>,
    lines: Vec<Vec<Segment>>,
}

impl SourceMapBuilder {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Default::default()
        }
    }

    fn source_id(&mut self, source: &str) -> u32 {
        if let Some(id) = self.source_lookup.get(source) {
            return *id;
        }
        let id = self.sources.len() as u32;
        self.sources.push(source.to_string());
        self.sources_content.push(None);
        self.source_lookup.insert(source.to_string(), id);
        id
    }

    pub fn set_source_content(&mut self, source: &str, content: &str) {
        let id = self.source_id(source) as usize;
        self.sources_content[id] = Some(content.to_string());
    }

    /// Records one mapping. Generated and original lines/columns are
    /// 0-based here, per the mappings encoding.
    pub fn add_mapping(
        &mut self,
        gen_line: u32,
        gen_col: u32,
        source: &str,
        src_line: u32,
        src_col: u32,
        name: Option<&str>,
    ) {
        let source = self.source_id(source);
        let name = name.map(|n| {
            if let Some(id) = self.name_lookup.get(n) {
                return *id;
            }
            let id = self.names.len() as u32;
            self.names.push(n.to_string());
            self.name_lookup.insert(n.to_string(), id);
            id
        });
        while self.lines.len() <= gen_line as usize {
            self.lines.push(Vec::new());
        }
        self.lines[gen_line as usize].push(Segment {
            gen_col,
            source,
            src_line,
            src_col,
            name,
        });
    }

    pub fn build(mut self) -> SourceMap {
        let mut mappings = String::new();
        let mut prev_source: i64 = 0;
        let mut prev_src_line: i64 = 0;
        let mut prev_src_col: i64 = 0;
        let mut prev_name: i64 = 0;

        for (i, line) in self.lines.iter_mut().enumerate() {
            if i > 0 {
                mappings.push(';');
            }
            line.sort_by_key(|s| s.gen_col);
            line.dedup_by_key(|s| s.gen_col);
            let mut prev_gen_col: i64 = 0;
            for (j, segment) in line.iter().enumerate() {
                if j > 0 {
                    mappings.push(',');
                }
                vlq_encode(segment.gen_col as i64 - prev_gen_col, &mut mappings);
                prev_gen_col = segment.gen_col as i64;
                vlq_encode(segment.source as i64 - prev_source, &mut mappings);
                prev_source = segment.source as i64;
                vlq_encode(segment.src_line as i64 - prev_src_line, &mut mappings);
                prev_src_line = segment.src_line as i64;
                vlq_encode(segment.src_col as i64 - prev_src_col, &mut mappings);
                prev_src_col = segment.src_col as i64;
                if let Some(name) = segment.name {
                    vlq_encode(name as i64 - prev_name, &mut mappings);
                    prev_name = name as i64;
                }
            }
        }

        let has_content = self.sources_content.iter().any(Option::is_some);
        SourceMap {
            version: 3,
            file: self.file,
            sources: self.sources,
            sources_content: has_content.then_some(self.sources_content),
            names: self.names,
            mappings,
        }
    }
}

// ============================================================================
// PARSING AND POSITION MAPPING
// ============================================================================

#[derive(Debug)]
pub struct ParsedSourceMap {
    pub map: SourceMap,
    lines: Vec<Vec<Segment>>,
}

pub fn parse_source_map(json: &str) -> Result<ParsedSourceMap, SourceMapError> {
    let map: SourceMap = serde_json::from_str(json)?;
    if map.version != 3 {
        return Err(SourceMapError::UnsupportedVersion(map.version));
    }

    let mut lines = Vec::new();
    let mut source: i64 = 0;
    let mut src_line: i64 = 0;
    let mut src_col: i64 = 0;
    let mut name: i64 = 0;

    for line_text in map.mappings.split(';') {
        let mut segments = Vec::new();
        let bytes = line_text.as_bytes();
        let mut cursor = 0;
        let mut gen_col: i64 = 0;
        while cursor < bytes.len() {
            gen_col += vlq_decode(bytes, &mut cursor)?;
            let mut segment = Segment {
                gen_col: gen_col as u32,
                source: 0,
                src_line: 0,
                src_col: 0,
                name: None,
            };
            if cursor < bytes.len() && bytes[cursor] != b',' {
                source += vlq_decode(bytes, &mut cursor)?;
                src_line += vlq_decode(bytes, &mut cursor)?;
                src_col += vlq_decode(bytes, &mut cursor)?;
                segment.source = source as u32;
                segment.src_line = src_line as u32;
                segment.src_col = src_col as u32;
                if cursor < bytes.len() && bytes[cursor] != b',' {
                    name += vlq_decode(bytes, &mut cursor)?;
                    segment.name = Some(name as u32);
                }
            }
            segments.push(segment);
            if cursor < bytes.len() && bytes[cursor] == b',' {
                cursor += 1;
            }
        }
        segments.sort_by_key(|s| s.gen_col);
        lines.push(segments);
    }

    Ok(ParsedSourceMap { map, lines })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedPosition {
    pub source: String,
    /// 1-based line in the original source.
    pub line: u32,
    /// 0-based column in the original source.
    pub column: u32,
}

/// Maps a generated position (1-based line, 0-based column) back to the
/// original source, or `None` when nothing maps there.
pub fn map_position(map: &ParsedSourceMap, line: u32, column: u32) -> Option<MappedPosition> {
    let segments = map.lines.get(line.checked_sub(1)? as usize)?;
    if segments.is_empty() {
        return None;
    }
    // Last segment at or before the queried column.
    let idx = match segments.binary_search_by_key(&column, |s| s.gen_col) {
        Ok(i) => i,
        Err(0) => return None,
        Err(i) => i - 1,
    };
    let segment = segments[idx];
    Some(MappedPosition {
        source: map
            .map
            .sources
            .get(segment.source as usize)
            .cloned()
            .unwrap_or_default(),
        line: segment.src_line + 1,
        column: segment.src_col,
    })
}

// ============================================================================
// CACHE
// ============================================================================

static MAP_CACHE: Lazy<Mutex<HashMap<PathBuf, Arc<ParsedSourceMap>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Loads and parses a source map from disk, with caching.
pub fn load_source_map(path: impl AsRef<Path>) -> Result<Arc<ParsedSourceMap>, HqlError> {
    let path = path.as_ref().to_path_buf();
    if let Some(cached) = MAP_CACHE.lock().unwrap().get(&path) {
        return Ok(Arc::clone(cached));
    }
    let text = std::fs::read_to_string(&path).map_err(SourceMapError::Io)?;
    let parsed = Arc::new(parse_source_map(&text)?);
    MAP_CACHE
        .lock()
        .unwrap()
        .insert(path, Arc::clone(&parsed));
    Ok(parsed)
}

pub fn invalidate_source_map_cache() {
    MAP_CACHE.lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlq_round_trip() {
        for value in [0i64, 1, -1, 16, -16, 31, 32, 1000, -1000, 123456] {
            let mut encoded = String::new();
            vlq_encode(value, &mut encoded);
            let mut cursor = 0;
            let decoded = vlq_decode(encoded.as_bytes(), &mut cursor).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(cursor, encoded.len());
        }
    }

    #[test]
    fn known_vlq_values() {
        let mut out = String::new();
        vlq_encode(0, &mut out);
        assert_eq!(out, "A");
        let mut out = String::new();
        vlq_encode(16, &mut out);
        assert_eq!(out, "gB");
    }

    #[test]
    fn build_and_map_back() {
        let mut builder = SourceMapBuilder::new("out.js");
        builder.set_source_content("in.hql", "(print 1)");
        builder.add_mapping(0, 0, "in.hql", 0, 1, Some("print"));
        builder.add_mapping(0, 12, "in.hql", 0, 7, None);
        builder.add_mapping(1, 0, "in.hql", 1, 0, None);
        let map = builder.build();
        assert_eq!(map.version, 3);
        assert_eq!(map.sources, vec!["in.hql"]);
        assert_eq!(map.names, vec!["print"]);

        let parsed = parse_source_map(&map.to_json()).unwrap();
        let hit = map_position(&parsed, 1, 0).unwrap();
        assert_eq!(hit.source, "in.hql");
        assert_eq!((hit.line, hit.column), (1, 1));

        // A column between segments resolves to the previous segment.
        let hit = map_position(&parsed, 1, 15).unwrap();
        assert_eq!((hit.line, hit.column), (1, 7));

        assert!(map_position(&parsed, 9, 0).is_none());
    }

    #[test]
    fn sources_content_round_trips() {
        let mut builder = SourceMapBuilder::new("out.js");
        builder.set_source_content("in.hql", "(+ 1 2)");
        builder.add_mapping(0, 0, "in.hql", 0, 0, None);
        let json = builder.build().to_json();
        let parsed = parse_source_map(&json).unwrap();
        assert_eq!(
            parsed.map.sources_content.as_ref().unwrap()[0].as_deref(),
            Some("(+ 1 2)")
        );
    }
}
