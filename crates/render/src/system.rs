//! Per-object draw pass.
//!
//! [`MeshRenderSystem`] owns the graphics pipeline and its layout. Per
//! frame it binds the pipeline and the frame's global descriptor set once,
//! then pushes each object's matrices as push constants and issues the draw.

use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use tracing::warn;

use orrery_rhi::RhiResult;
use orrery_rhi::command::CommandBuffer;
use orrery_rhi::descriptor::DescriptorSetLayout;
use orrery_rhi::device::Device;
use orrery_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use orrery_rhi::shader::{Shader, ShaderStage};
use orrery_rhi::vertex::Vertex;
use orrery_scene::{Scene, SceneObject};

use crate::mesh::GpuMesh;

/// Per-object push constant block.
///
/// Exactly 128 bytes, the minimum `maxPushConstantsSize` every Vulkan
/// implementation guarantees. The object color rides in the normal matrix's
/// unused translation row; the shader reads it from `normal_matrix[3].xyz`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PushConstantData {
    model_matrix: Mat4,
    normal_matrix: Mat4,
}

impl PushConstantData {
    fn for_object(object: &SceneObject) -> Self {
        let mut normal_matrix = object.transform.normal_matrix();
        normal_matrix.w_axis = object.color.extend(1.0);
        Self {
            model_matrix: object.transform.matrix(),
            normal_matrix,
        }
    }
}

const PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

/// Draws every scene object with one pipeline.
pub struct MeshRenderSystem {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
}

impl MeshRenderSystem {
    /// Builds the pipeline layout and pipeline.
    ///
    /// `global_set_layout` becomes descriptor set 0; the attachment formats
    /// must match the presentation surface the pipeline will render into.
    ///
    /// # Errors
    ///
    /// Returns an error if shader loading or pipeline creation fails.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
        global_set_layout: &DescriptorSetLayout,
    ) -> RhiResult<Self> {
        let push_range = vk::PushConstantRange::default()
            .stage_flags(PUSH_STAGES)
            .offset(0)
            .size(std::mem::size_of::<PushConstantData>() as u32);

        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[global_set_layout.handle()],
            &[push_range],
        )?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            "assets/shaders/mesh.vert.spv",
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            "assets/shaders/mesh.frag.spv",
            ShaderStage::Fragment,
        )?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .color_attachment_format(color_format)
            .depth_attachment_format(depth_format)
            .build(device, &pipeline_layout)?;

        Ok(Self {
            pipeline,
            pipeline_layout,
        })
    }

    /// Records draws for every object in the scene.
    ///
    /// `global_set` is the current frame's descriptor set; `meshes` is the
    /// mesh list object `mesh` indices refer to.
    pub fn render(
        &self,
        cmd: &CommandBuffer,
        global_set: vk::DescriptorSet,
        scene: &Scene,
        meshes: &[GpuMesh],
    ) {
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(
            self.pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &[global_set],
            &[],
        );

        for (id, object) in scene.iter() {
            let Some(mesh) = meshes.get(object.mesh) else {
                warn!("Object {:?} references missing mesh {}", id, object.mesh);
                continue;
            };

            let push = PushConstantData::for_object(object);
            cmd.push_constants(self.pipeline_layout.handle(), PUSH_STAGES, 0, &push);

            mesh.bind(cmd);
            mesh.draw(cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use orrery_scene::Transform;

    #[test]
    fn push_constants_fit_the_guaranteed_minimum() {
        // maxPushConstantsSize is at least 128 on every implementation
        assert_eq!(std::mem::size_of::<PushConstantData>(), 128);
    }

    #[test]
    fn object_color_rides_in_the_normal_matrix() {
        let mut object = SceneObject::new(0);
        object.color = Vec3::new(0.2, 0.4, 0.8);
        object.transform = Transform::new().with_position(Vec3::new(1.0, 0.0, 0.0));

        let push = PushConstantData::for_object(&object);
        assert_eq!(push.normal_matrix.w_axis.x, 0.2);
        assert_eq!(push.normal_matrix.w_axis.y, 0.4);
        assert_eq!(push.normal_matrix.w_axis.z, 0.8);
        // Translation still lives in the model matrix only
        assert_eq!(push.model_matrix.w_axis.x, 1.0);
    }
}
