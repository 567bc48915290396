//! Top-level renderer.
//!
//! Owns the whole Vulkan stack (instance, device, surface, frame manager,
//! descriptor resources, uploaded meshes) plus the scene and camera, and
//! drives one frame per [`Renderer::render_frame`] call.
//!
//! Field order doubles as destruction order: GPU resources drop before the
//! frame manager, which drops before the surface, device, and instance.
//! [`Drop`] idles the device first so nothing is destroyed mid-flight.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::{Quat, Vec3};
use tracing::info;

use orrery_core::{Error, Result};
use orrery_platform::{Surface, Window};
use orrery_resources::MeshData;
use orrery_rhi::RhiError;
use orrery_rhi::buffer::{Buffer, BufferUsage};
use orrery_rhi::command::{CommandBuffer, CommandPool};
use orrery_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use orrery_rhi::device::Device;
use orrery_rhi::instance::Instance;
use orrery_rhi::physical_device::select_physical_device;
use orrery_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use orrery_scene::{Camera, Scene, SceneObject, Transform};

use crate::frame::FrameManager;
use crate::mesh::GpuMesh;
use crate::system::MeshRenderSystem;
use crate::ubo::GlobalUbo;

use gpu_allocator::MemoryLocation;

fn vk_err(e: RhiError) -> Error {
    Error::Vulkan(e.to_string())
}

/// Everything needed to render the scene, wired together.
pub struct Renderer {
    // CPU-side state
    scene: Scene,
    camera: Camera,

    // GPU resources, in destruction order
    system: MeshRenderSystem,
    global_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    global_set_layout: Arc<DescriptorSetLayout>,
    global_ubo: Buffer,
    meshes: Vec<GpuMesh>,
    upload_pool: CommandPool,
    frame_manager: FrameManager,
    surface: Surface,
    device: Arc<Device>,
    instance: Instance,
}

impl Renderer {
    /// Brings up the full stack and loads the model at `model_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if any device object creation or the model load
    /// fails.
    pub fn new(window: &Window, model_path: &Path) -> Result<Self> {
        info!("Initializing renderer");

        let instance = Instance::new(cfg!(debug_assertions)).map_err(vk_err)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())
                .map_err(vk_err)?;
        let device = Device::new(&instance, &physical_device_info).map_err(vk_err)?;

        let frame_manager =
            FrameManager::new(&instance, device.clone(), &surface, window).map_err(vk_err)?;

        let graphics_family = device.queue_families().graphics_family.unwrap();
        let upload_pool = CommandPool::new(device.clone(), graphics_family).map_err(vk_err)?;

        // Model upload
        let mesh_data =
            MeshData::load_obj(model_path).map_err(|e| Error::Resource(e.to_string()))?;
        let meshes = vec![
            GpuMesh::from_mesh_data(device.clone(), &upload_pool, &mesh_data).map_err(vk_err)?,
        ];

        // One uniform element per frame in flight, strided to the device's
        // uniform offset alignment
        let mut global_ubo = Buffer::new_aligned(
            device.clone(),
            GlobalUbo::SIZE as vk::DeviceSize,
            MAX_FRAMES_IN_FLIGHT as u32,
            BufferUsage::Uniform,
            MemoryLocation::CpuToGpu,
            device.min_uniform_buffer_offset_alignment(),
        )
        .map_err(vk_err)?;
        global_ubo.map();

        let global_set_layout = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )
            .build(device.clone())
            .map_err(vk_err)?;

        let descriptor_pool = DescriptorPool::builder()
            .pool_size(
                vk::DescriptorType::UNIFORM_BUFFER,
                MAX_FRAMES_IN_FLIGHT as u32,
            )
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32)
            .build(device.clone())
            .map_err(vk_err)?;

        let global_sets = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|frame| {
                DescriptorWriter::new(&global_set_layout, &descriptor_pool)
                    .write_buffer(0, global_ubo.descriptor_info_for_index(frame as u32))
                    .build()
                    .ok_or_else(|| {
                        Error::Internal("descriptor pool exhausted during startup".to_string())
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let system = MeshRenderSystem::new(
            device.clone(),
            frame_manager.color_format(),
            frame_manager.depth_format(),
            &global_set_layout,
        )
        .map_err(vk_err)?;

        // A single object showing the loaded model
        let mut scene = Scene::new();
        let mut object = SceneObject::new(0);
        object.transform = Transform::new().with_scale(Vec3::splat(1.5));
        object.color = Vec3::new(0.9, 0.7, 0.4);
        scene.insert(object);

        let mut camera = Camera::new();
        camera.position = Vec3::new(2.0, 2.0, 2.0);
        camera.look_at(Vec3::ZERO);

        info!("Renderer initialized");

        Ok(Self {
            scene,
            camera,
            system,
            global_sets,
            descriptor_pool,
            global_set_layout,
            global_ubo,
            meshes,
            upload_pool,
            frame_manager,
            surface,
            device,
            instance,
        })
    }

    /// Advances animation state by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        let ids: Vec<_> = self.scene.iter().map(|(id, _)| id).collect();
        for id in ids {
            if let Some(object) = self.scene.get_mut(id) {
                object.transform.rotation =
                    Quat::from_rotation_y(dt * 0.6) * object.transform.rotation;
            }
        }
    }

    /// Renders one frame.
    ///
    /// A stale presentation surface is not an error: the tick is skipped
    /// and the next call renders against the rebuilt surface.
    ///
    /// # Errors
    ///
    /// Propagates fatal device errors; the host loop is expected to abort
    /// on them.
    pub fn render_frame(&mut self, window: &Window) -> Result<()> {
        let Some(cmd) = self
            .frame_manager
            .begin_frame(&self.instance, &self.surface, window)
            .map_err(vk_err)?
        else {
            // Surface was rebuilt; skip this tick
            return Ok(());
        };

        let frame = self.frame_manager.current_frame_index();

        self.camera.set_aspect(self.frame_manager.aspect_ratio());
        let ubo = GlobalUbo::new(self.camera.projection_matrix(), self.camera.view_matrix());
        self.global_ubo
            .write_to_index(bytemuck::bytes_of(&ubo), frame as u32);
        self.global_ubo.flush_index(frame as u32).map_err(vk_err)?;

        self.frame_manager.begin_render_pass(cmd);

        let recording = CommandBuffer::from_handle(self.device.clone(), cmd);
        self.system.render(
            &recording,
            self.global_sets[frame],
            &self.scene,
            &self.meshes,
        );

        self.frame_manager.end_render_pass(cmd);
        self.frame_manager
            .end_frame(&self.instance, &self.surface, window)
            .map_err(vk_err)?;

        Ok(())
    }

    /// Loads another model at runtime, returning its mesh slot for
    /// [`SceneObject::new`].
    ///
    /// # Errors
    ///
    /// Returns an error if loading or the GPU upload fails.
    pub fn load_mesh(&mut self, path: &Path) -> Result<usize> {
        let mesh_data = MeshData::load_obj(path).map_err(|e| Error::Resource(e.to_string()))?;
        let mesh = GpuMesh::from_mesh_data(self.device.clone(), &self.upload_pool, &mesh_data)
            .map_err(vk_err)?;
        self.meshes.push(mesh);
        Ok(self.meshes.len() - 1)
    }

    /// Rewrites every frame's global descriptor set against the current
    /// uniform buffer, without allocating new sets.
    ///
    /// Call after replacing `global_ubo`'s backing buffer. The device must
    /// be idle: the sets may otherwise still be read by in-flight frames.
    pub fn refresh_global_sets(&mut self) -> Result<()> {
        self.device.wait_idle().map_err(vk_err)?;
        for (frame, &set) in self.global_sets.iter().enumerate() {
            DescriptorWriter::new(&self.global_set_layout, &self.descriptor_pool)
                .write_buffer(0, self.global_ubo.descriptor_info_for_index(frame as u32))
                .overwrite(set);
        }
        Ok(())
    }

    /// Scene access for the host application.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Camera access for the host application.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Nothing may be destroyed while the GPU still reads it
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Device wait failed during renderer teardown: {}", e);
        }
        info!("Renderer shut down");
    }
}
