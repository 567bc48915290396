//! Mesh loading from Wavefront OBJ files.
//!
//! OBJ faces index positions, normals, and texture coordinates separately;
//! assembling them per corner produces many vertices that are identical
//! across every attribute. [`MeshData`] merges those by a content-addressed
//! key over all attribute bits, so the GPU sees one copy of each distinct
//! vertex and an index list referencing it.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use glam::{Vec2, Vec3};
use tracing::{debug, info};

use orrery_rhi::vertex::Vertex;

use crate::error::{ResourceError, ResourceResult};

/// Deduplicated vertex and index lists for one mesh.
#[derive(Debug, Default, Clone)]
pub struct MeshData {
    /// Unique vertices in first-seen order.
    pub vertices: Vec<Vertex>,
    /// Triangle indices into `vertices`.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Loads and deduplicates a mesh from an OBJ file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if it
    /// contains no geometry.
    pub fn load_obj(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        let (models, _) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                ..Default::default()
            },
        )
        .map_err(|e| ResourceError::ObjLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mesh = Self::from_models(&models);
        if mesh.vertices.len() < 3 {
            return Err(ResourceError::EmptyMesh(path.to_path_buf()));
        }

        info!(
            "Loaded '{}': {} unique vertices, {} indices",
            path.display(),
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(mesh)
    }

    /// Loads and deduplicates a mesh from an in-memory OBJ document.
    ///
    /// Material libraries are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed.
    pub fn from_obj_buf(reader: &mut impl BufRead) -> ResourceResult<Self> {
        let (models, _) = tobj::load_obj_buf(
            reader,
            &tobj::LoadOptions {
                triangulate: true,
                ..Default::default()
            },
            |_| Ok(Default::default()),
        )
        .map_err(|e| ResourceError::ObjLoad {
            path: "<buffer>".into(),
            message: e.to_string(),
        })?;

        Ok(Self::from_models(&models))
    }

    /// Assembles per-corner vertices from parsed OBJ models, then merges
    /// duplicates.
    fn from_models(models: &[tobj::Model]) -> Self {
        let mut raw = Vec::new();

        for model in models {
            let mesh = &model.mesh;
            for (corner, &position_index) in mesh.indices.iter().enumerate() {
                let pos = 3 * position_index as usize;
                let position = Vec3::new(
                    mesh.positions[pos],
                    mesh.positions[pos + 1],
                    mesh.positions[pos + 2],
                );

                // Per-vertex colors are optional; default to white
                let color = if mesh.vertex_color.is_empty() {
                    Vec3::ONE
                } else {
                    Vec3::new(
                        mesh.vertex_color[pos],
                        mesh.vertex_color[pos + 1],
                        mesh.vertex_color[pos + 2],
                    )
                };

                let normal = match mesh.normal_indices.get(corner) {
                    Some(&ni) => {
                        let n = 3 * ni as usize;
                        Vec3::new(mesh.normals[n], mesh.normals[n + 1], mesh.normals[n + 2])
                    }
                    None => Vec3::ZERO,
                };

                // uv comes from the texcoord index, not the normal index
                let uv = match mesh.texcoord_indices.get(corner) {
                    Some(&ti) => {
                        let t = 2 * ti as usize;
                        Vec2::new(mesh.texcoords[t], mesh.texcoords[t + 1])
                    }
                    None => Vec2::ZERO,
                };

                raw.push(Vertex::new(position, color, normal, uv));
            }
        }

        Self::from_raw_vertices(&raw)
    }

    /// Merges vertices that are identical across every attribute.
    ///
    /// The output vertex list keeps first-seen order; the index list has one
    /// entry per input vertex, pointing at the merged copy.
    pub fn from_raw_vertices(raw: &[Vertex]) -> Self {
        let mut unique = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(raw.len());

        for vertex in raw {
            let index = *unique.entry(vertex.dedup_key()).or_insert_with(|| {
                vertices.push(*vertex);
                (vertices.len() - 1) as u32
            });
            indices.push(index);
        }

        debug!(
            "Vertex dedup: {} raw -> {} unique",
            raw.len(),
            vertices.len()
        );

        Self { vertices, indices }
    }

    /// Number of triangles described by the index list.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32) -> Vertex {
        Vertex::new(Vec3::new(x, 0.0, 0.0), Vec3::ONE, Vec3::Y, Vec2::ZERO)
    }

    #[test]
    fn dedup_merges_identical_vertices() {
        let a = vertex(0.0);
        let b = vertex(1.0);
        let c = vertex(2.0);

        let mesh = MeshData::from_raw_vertices(&[a, b, a, c, b]);

        assert_eq!(mesh.vertices, vec![a, b, c]);
        assert_eq!(mesh.indices, vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn dedup_keeps_attribute_distinct_vertices() {
        let a = vertex(0.0);
        // Same position, different normal: not a duplicate
        let b = Vertex { normal: Vec3::Z, ..a };

        let mesh = MeshData::from_raw_vertices(&[a, b]);
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1]);
    }

    #[test]
    fn dedup_of_empty_input_is_empty() {
        let mesh = MeshData::from_raw_vertices(&[]);
        assert!(mesh.vertices.is_empty());
        assert!(mesh.indices.is_empty());
        assert_eq!(mesh.triangle_count(), 0);
    }
}
