//! Emission: IR to ESTree, ESTree to module text plus a V3 source map.

pub mod codegen;
pub mod estree;
pub mod helpers;
pub mod lower;
pub mod sourcemap;

pub use codegen::{generate, GeneratedModule};
pub use lower::lower_program;
pub use sourcemap::{
    invalidate_source_map_cache, load_source_map, map_position, MappedPosition, SourceMap,
};
