//! Descriptor set layouts, pools, and writers.
//!
//! Shader resource binding follows a three-piece protocol:
//!
//! 1. A [`DescriptorSetLayout`] declares the binding slots (index →
//!    descriptor type, shader stages, count), built once through its builder
//!    and shared by reference afterwards.
//! 2. A [`DescriptorPool`] carves concrete sets out of a pre-declared budget
//!    of descriptor counts. Pool exhaustion is an expected, recoverable
//!    condition, so allocation reports success as an `Option` rather than an
//!    error; a caller that runs dry can build another pool.
//! 3. A [`DescriptorWriter`] accumulates buffer/image writes against a
//!    layout, validating each slot, then either allocates-and-applies
//!    ([`DescriptorWriter::build`]) or refreshes an existing set
//!    ([`DescriptorWriter::overwrite`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use orrery_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
//! use orrery_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, buffer_info: vk::DescriptorBufferInfo) -> Option<()> {
//! let layout = DescriptorSetLayout::builder()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
//!     .build(device.clone())
//!     .ok()?;
//!
//! let pool = DescriptorPool::builder()
//!     .pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
//!     .max_sets(2)
//!     .build(device)
//!     .ok()?;
//!
//! let set = DescriptorWriter::new(&layout, &pool)
//!     .write_buffer(0, buffer_info)
//!     .build()?;
//! # Some(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::RhiResult;

/// One declared binding slot of a layout.
#[derive(Clone, Copy, Debug)]
pub struct LayoutBinding {
    /// Descriptor type bound at this slot.
    pub kind: vk::DescriptorType,
    /// Shader stages that can access the slot.
    pub stages: vk::ShaderStageFlags,
    /// Number of descriptors in the slot (arrays > 1 are declared but the
    /// writer only supports single-descriptor slots).
    pub count: u32,
}

/// Accumulates binding declarations for a [`DescriptorSetLayout`].
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: BTreeMap<u32, LayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Declares a single-descriptor binding slot.
    ///
    /// # Panics
    ///
    /// Panics if `index` is already declared.
    pub fn add_binding(
        self,
        index: u32,
        kind: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.add_binding_count(index, kind, stages, 1)
    }

    /// Declares a binding slot with an explicit descriptor count.
    ///
    /// # Panics
    ///
    /// Panics if `index` is already declared or `count` is zero.
    pub fn add_binding_count(
        mut self,
        index: u32,
        kind: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        assert!(count >= 1, "binding {index} must hold at least one descriptor");
        let previous = self.bindings.insert(
            index,
            LayoutBinding {
                kind,
                stages,
                count,
            },
        );
        assert!(previous.is_none(), "binding {index} already in use");
        self
    }

    /// Freezes the accumulated bindings into a device layout object.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the binding set; this is a
    /// fatal configuration error.
    pub fn build(self, device: Arc<Device>) -> RhiResult<Arc<DescriptorSetLayout>> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .bindings
            .iter()
            .map(|(&index, binding)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(index)
                    .descriptor_type(binding.kind)
                    .descriptor_count(binding.count)
                    .stage_flags(binding.stages)
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            self.bindings.len()
        );

        Ok(Arc::new(DescriptorSetLayout {
            device,
            layout,
            bindings: self.bindings,
        }))
    }
}

/// Immutable description of a set's binding slots.
///
/// Shared (`Arc`) by every set allocated against it and by writers, which
/// validate their writes against the retained binding table.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: BTreeMap<u32, LayoutBinding>,
}

impl DescriptorSetLayout {
    /// Starts building a layout.
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::default()
    }

    /// Returns the Vulkan layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Looks up a declared binding slot.
    #[inline]
    pub fn binding(&self, index: u32) -> Option<&LayoutBinding> {
        self.bindings.get(&index)
    }

    /// Number of declared binding slots.
    #[inline]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Accumulates the capacity budget for a [`DescriptorPool`].
#[derive(Default)]
pub struct DescriptorPoolBuilder {
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPoolBuilder {
    /// Adds `count` descriptors of `kind` to the pool budget.
    pub fn pool_size(mut self, kind: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(kind)
                .descriptor_count(count),
        );
        self
    }

    /// Sets the maximum number of concurrently allocated sets.
    pub fn max_sets(mut self, count: u32) -> Self {
        self.max_sets = count;
        self
    }

    /// Allows individual sets to be returned via
    /// [`DescriptorPool::free_sets`]; without it only
    /// [`DescriptorPool::reset`] reclaims capacity.
    pub fn free_individual_sets(mut self) -> Self {
        self.flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        self
    }

    /// Creates a pool sized to the accumulated budget.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes)
            .flags(self.flags);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, {} pool size(s)",
            self.max_sets,
            self.pool_sizes.len()
        );

        Ok(DescriptorPool {
            device,
            pool,
            max_sets: self.max_sets,
            flags: self.flags,
        })
    }
}

/// Fixed-capacity allocator for descriptor sets.
///
/// The pool is the single owner of every set it hands out; sets become
/// invalid when freed, when the pool is reset, and when the pool is dropped.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPool {
    /// Starts building a pool.
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Allocates one set with the given layout.
    ///
    /// Returns `None` when the pool cannot satisfy the allocation (out of
    /// sets, out of descriptors of a required type, or fragmented). That is
    /// a recoverable condition: the caller may allocate a fresh pool;
    /// growing pools automatically is deliberately not this type's job.
    pub fn try_allocate(&self, layout: &DescriptorSetLayout) -> Option<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        match unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Some(sets[0]),
            Err(e) => {
                warn!("Descriptor set allocation failed: {:?}", e);
                None
            }
        }
    }

    /// Returns the listed sets to the pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool was not built with
    /// [`DescriptorPoolBuilder::free_individual_sets`].
    ///
    /// # Errors
    ///
    /// Returns an error if the free call fails.
    pub fn free_sets(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        assert!(
            self.flags
                .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET),
            "pool was not built with free_individual_sets"
        );
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }
        debug!("Freed {} descriptor set(s)", sets.len());
        Ok(())
    }

    /// Invalidates every outstanding set at once.
    ///
    /// Callers must not use any previously allocated handle afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        debug!("Reset descriptor pool");
        Ok(())
    }

    /// Returns the Vulkan pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Maximum number of concurrently allocated sets.
    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// Returns a reference to the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

enum WriteSource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

struct PendingWrite {
    binding: u32,
    kind: vk::DescriptorType,
    source: WriteSource,
}

/// Validates the slot exists and holds exactly one descriptor.
fn single_descriptor_binding(layout: &DescriptorSetLayout, index: u32) -> LayoutBinding {
    let binding = layout
        .binding(index)
        .unwrap_or_else(|| panic!("layout does not contain binding {index}"));
    assert_eq!(
        binding.count, 1,
        "binding {index} expects {} descriptors, writer supports exactly one",
        binding.count
    );
    *binding
}

/// Binds concrete buffer/image descriptors into the slots of a set.
///
/// Stateless per use: accumulate writes, then `build` (allocate + apply) or
/// `overwrite` (apply to an existing set). Re-running `overwrite` with the
/// same pending writes produces the same binding state.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorWriter<'a> {
    /// Creates a writer against one layout and one pool.
    pub fn new(layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            layout,
            pool,
            writes: Vec::new(),
        }
    }

    /// Queues a buffer descriptor for `binding`.
    ///
    /// # Panics
    ///
    /// Panics if the layout has no such binding or the slot declares more
    /// than one descriptor.
    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        let slot = single_descriptor_binding(self.layout, binding);
        self.writes.push(PendingWrite {
            binding,
            kind: slot.kind,
            source: WriteSource::Buffer(info),
        });
        self
    }

    /// Queues an image descriptor for `binding`.
    ///
    /// # Panics
    ///
    /// Panics if the layout has no such binding or the slot declares more
    /// than one descriptor.
    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        let slot = single_descriptor_binding(self.layout, binding);
        self.writes.push(PendingWrite {
            binding,
            kind: slot.kind,
            source: WriteSource::Image(info),
        });
        self
    }

    /// Allocates a set from the pool and applies the pending writes.
    ///
    /// Returns `None` if the pool is exhausted (see
    /// [`DescriptorPool::try_allocate`]); nothing is written in that case.
    pub fn build(&self) -> Option<vk::DescriptorSet> {
        let set = self.pool.try_allocate(self.layout)?;
        self.overwrite(set);
        Some(set)
    }

    /// Applies the pending writes to a set the caller already owns.
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let vk_writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(0)
                    .descriptor_type(write.kind);
                match &write.source {
                    WriteSource::Buffer(info) => base.buffer_info(std::slice::from_ref(info)),
                    WriteSource::Image(info) => base.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        if vk_writes.is_empty() {
            return;
        }

        unsafe {
            self.pool
                .device()
                .handle()
                .update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with_two_bindings() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )
            .add_binding(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
    }

    #[test]
    fn builder_accumulates_bindings() {
        let builder = builder_with_two_bindings();
        assert_eq!(builder.bindings.len(), 2);
        assert_eq!(
            builder.bindings[&0].kind,
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(builder.bindings[&0].stages, vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            builder.bindings[&1].kind,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(builder.bindings[&1].stages, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    #[should_panic(expected = "binding 0 already in use")]
    fn builder_rejects_duplicate_index() {
        let _ = builder_with_two_bindings().add_binding(
            0,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::ShaderStageFlags::FRAGMENT,
        );
    }

    #[test]
    #[should_panic(expected = "at least one descriptor")]
    fn builder_rejects_zero_count() {
        let _ = DescriptorSetLayout::builder().add_binding_count(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
            0,
        );
    }

    #[test]
    fn builder_allows_array_counts() {
        let builder = DescriptorSetLayout::builder().add_binding_count(
            3,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            4,
        );
        assert_eq!(builder.bindings[&3].count, 4);
    }

    #[test]
    fn pool_builder_accumulates_budget() {
        let builder = DescriptorPool::builder()
            .pool_size(vk::DescriptorType::UNIFORM_BUFFER, 4)
            .pool_size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2)
            .max_sets(4)
            .free_individual_sets();

        assert_eq!(builder.pool_sizes.len(), 2);
        assert_eq!(builder.max_sets, 4);
        assert!(
            builder
                .flags
                .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        );
    }
}
