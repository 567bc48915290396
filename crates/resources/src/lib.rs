//! Asset loading.
//!
//! Loads Wavefront OBJ meshes into the engine's vertex format, merging
//! duplicate vertices by full attribute content.

mod error;
pub mod model;

pub use error::{ResourceError, ResourceResult};
pub use model::MeshData;
