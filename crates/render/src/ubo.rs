//! Per-frame uniform data.
//!
//! Must match the shader's set 0, binding 0 uniform block exactly.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Global per-frame uniform data.
///
/// # Memory Layout
///
/// - Offset 0: projection matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalUbo {
    /// View-to-clip matrix.
    pub projection: Mat4,
    /// World-to-view matrix.
    pub view: Mat4,
}

impl GlobalUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates the per-frame uniform data.
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        Self { projection, view }
    }
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_two_matrices() {
        assert_eq!(GlobalUbo::SIZE, 128);
    }

    #[test]
    fn alignment_satisfies_gpu_mat4() {
        assert_eq!(std::mem::align_of::<GlobalUbo>(), 16);
    }

    #[test]
    fn pod_roundtrip() {
        let ubo = GlobalUbo::default();
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), GlobalUbo::SIZE);
    }
}
