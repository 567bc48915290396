//! Integration tests for OBJ loading and vertex deduplication.

use std::io::BufReader;

use glam::Vec2;

use orrery_resources::MeshData;

fn load(source: &str) -> MeshData {
    let mut reader = BufReader::new(source.as_bytes());
    MeshData::from_obj_buf(&mut reader).expect("OBJ document should parse")
}

#[test]
fn quad_shares_edge_vertices() {
    // Two triangles sharing an edge: 6 corners, 4 distinct vertices
    let mesh = load(
        "v 0.0 0.0 0.0\n\
         v 1.0 0.0 0.0\n\
         v 0.0 1.0 0.0\n\
         v 1.0 1.0 0.0\n\
         vt 0.0 0.0\n\
         vt 1.0 0.0\n\
         vt 0.0 1.0\n\
         vt 1.0 1.0\n\
         vn 0.0 0.0 1.0\n\
         f 1/1/1 2/2/1 3/3/1\n\
         f 2/2/1 4/4/1 3/3/1\n",
    );

    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.indices, vec![0, 1, 2, 1, 3, 2]);
    assert_eq!(mesh.triangle_count(), 2);
}

#[test]
fn same_position_different_uv_stays_distinct() {
    // Both faces reuse the same three positions, but with different texture
    // coordinates, so no corner may be merged across faces.
    let mesh = load(
        "v 0.0 0.0 0.0\n\
         v 1.0 0.0 0.0\n\
         v 0.0 1.0 0.0\n\
         vt 0.0 0.0\n\
         vt 1.0 1.0\n\
         f 1/1 2/1 3/1\n\
         f 1/2 2/2 3/2\n",
    );

    assert_eq!(mesh.vertices.len(), 6);
    assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn uv_reads_through_the_texcoord_index() {
    // texcoord and normal indices deliberately disagree: every corner uses
    // texcoord 1 but normal 2, so a lookup through the wrong index array
    // would produce (0.5, 0.5) instead of (0.25, 0.75).
    let mesh = load(
        "v 0.0 0.0 0.0\n\
         v 1.0 0.0 0.0\n\
         v 0.0 1.0 0.0\n\
         vt 0.25 0.75\n\
         vt 0.5 0.5\n\
         vn 1.0 0.0 0.0\n\
         vn 0.0 1.0 0.0\n\
         f 1/1/2 2/1/2 3/1/2\n",
    );

    for vertex in &mesh.vertices {
        assert_eq!(vertex.uv, Vec2::new(0.25, 0.75));
        assert_eq!(vertex.normal.y, 1.0);
    }
}

#[test]
fn positions_only_mesh_defaults_attributes() {
    let mesh = load(
        "v 0.0 0.0 0.0\n\
         v 1.0 0.0 0.0\n\
         v 0.0 1.0 0.0\n\
         f 1 2 3\n",
    );

    assert_eq!(mesh.vertices.len(), 3);
    for vertex in &mesh.vertices {
        // Color defaults to white, uv and normal to zero
        assert_eq!(vertex.color.to_array(), [1.0, 1.0, 1.0]);
        assert_eq!(vertex.uv, Vec2::ZERO);
    }
}
