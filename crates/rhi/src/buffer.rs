//! GPU buffer management.
//!
//! [`Buffer`] pairs a VkBuffer with gpu-allocator managed memory and models
//! the buffer as `instance_count` elements of `instance_size` bytes, each
//! placed at a stride rounded up to a caller-supplied offset alignment (for
//! uniform buffers, the device's `minUniformBufferOffsetAlignment`). Indexed
//! writes, flushes, and descriptor infos address element `i` at byte offset
//! `i * alignment_size`.
//!
//! Host access follows an explicit map/write/flush discipline:
//!
//! ```no_run
//! use std::sync::Arc;
//! use gpu_allocator::MemoryLocation;
//! use orrery_rhi::buffer::{Buffer, BufferUsage};
//! use orrery_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), orrery_rhi::RhiError> {
//! let mut ubo = Buffer::new_aligned(
//!     device.clone(),
//!     128,
//!     2,
//!     BufferUsage::Uniform,
//!     MemoryLocation::CpuToGpu,
//!     device.min_uniform_buffer_offset_alignment(),
//! )?;
//! ubo.map();
//! ubo.write_to_index(&[0u8; 128], 1);
//! ubo.flush_index(1)?;
//! # Ok(())
//! # }
//! ```
//!
//! Writing without mapping, mapping device-local memory, or writing past the
//! end of the buffer are caller bugs and panic; device-level allocation
//! failure is a fatal [`RhiError`].

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::RhiResult;

/// Rounds `size` up to the next multiple of `alignment`.
///
/// `alignment` must be zero or a power of two. Zero (and one) leave the size
/// unchanged.
#[inline]
pub fn align_to(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment > 0 {
        debug_assert!(
            alignment.is_power_of_two(),
            "offset alignment must be a power of two, got {alignment}"
        );
        (size + alignment - 1) & !(alignment - 1)
    } else {
        size
    }
}

/// Buffer usage intent.
///
/// Determines the Vulkan usage flags; the memory location is chosen
/// separately so vertex/index buffers can live in device-local memory and be
/// filled through a staging copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer (transfer destination for staging uploads)
    Vertex,
    /// Index buffer (transfer destination for staging uploads)
    Index,
    /// Uniform buffer for per-frame shader data
    Uniform,
    /// Staging buffer, the host-visible source of a device-side copy
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Human-readable name, used as the allocation label.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer with managed memory and aligned per-element access.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    /// Size of one element in bytes, as declared by the caller.
    instance_size: vk::DeviceSize,
    /// Number of elements.
    instance_count: u32,
    /// Per-element stride: `instance_size` rounded up to the offset alignment.
    alignment_size: vk::DeviceSize,
    /// Total size in bytes (`alignment_size * instance_count`).
    buffer_size: vk::DeviceSize,
    usage: BufferUsage,
    location: MemoryLocation,
    /// Whether the host mapping is currently active.
    mapped: bool,
}

impl Buffer {
    /// Creates a buffer of `instance_count` tightly packed elements.
    ///
    /// Equivalent to [`Buffer::new_aligned`] with no offset alignment; use
    /// the aligned variant for uniform buffers addressed per index.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or memory allocation fails.
    pub fn new(
        device: Arc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: BufferUsage,
        location: MemoryLocation,
    ) -> RhiResult<Self> {
        Self::new_aligned(device, instance_size, instance_count, usage, location, 1)
    }

    /// Creates a buffer whose elements are strided to `min_offset_alignment`.
    ///
    /// # Arguments
    ///
    /// * `instance_size` - Size of one element in bytes
    /// * `instance_count` - Number of elements
    /// * `usage` - Buffer usage intent
    /// * `location` - `CpuToGpu` for host-written data, `GpuOnly` for
    ///   staging-copy targets
    /// * `min_offset_alignment` - Minimum stride alignment (e.g. the device's
    ///   `minUniformBufferOffsetAlignment`); 0 or 1 packs elements tightly
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or memory allocation fails.
    pub fn new_aligned(
        device: Arc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: BufferUsage,
        location: MemoryLocation,
        min_offset_alignment: vk::DeviceSize,
    ) -> RhiResult<Self> {
        assert!(instance_size > 0, "buffer element size must be non-zero");
        assert!(instance_count > 0, "buffer element count must be non-zero");

        let alignment_size = align_to(instance_size, min_offset_alignment);
        let buffer_size = alignment_size * instance_count as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(buffer_size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!(
            "Created {} buffer: {} x {} bytes (stride {})",
            usage.name(),
            instance_count,
            instance_size,
            alignment_size
        );

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            instance_size,
            instance_count,
            alignment_size,
            buffer_size,
            usage,
            location,
            mapped: false,
        })
    }

    /// Creates a device-local buffer and fills it with `data` through a
    /// staging buffer and a blocking copy.
    ///
    /// The staging buffer lives only for the duration of this call; the copy
    /// completes synchronously on the graphics queue, so no shared ownership
    /// is needed to keep it alive.
    ///
    /// # Errors
    ///
    /// Returns an error if any allocation or the copy submission fails.
    pub fn device_local_with_data(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;

        let mut staging = Self::new(
            device.clone(),
            size,
            1,
            BufferUsage::Staging,
            MemoryLocation::CpuToGpu,
        )?;
        staging.map();
        staging.write_to_buffer(data, 0);
        staging.flush(vk::WHOLE_SIZE, 0)?;
        staging.unmap();

        let buffer = Self::new(device.clone(), size, 1, usage, MemoryLocation::GpuOnly)?;

        pool.submit_one_time(device.graphics_queue(), |cmd| {
            let region = vk::BufferCopy::default().size(size);
            cmd.copy_buffer(staging.handle(), buffer.handle(), &[region]);
        })?;

        Ok(buffer)
    }

    fn allocation(&self) -> &Allocation {
        self.allocation
            .as_ref()
            .expect("buffer allocation already freed")
    }

    /// Activates the host mapping for this buffer.
    ///
    /// gpu-allocator maps host-visible memory persistently, so this only
    /// flips the write gate; it exists so that every write site is forced to
    /// state the mapping explicitly. Mapping twice is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the buffer's memory is device-local: such buffers are never
    /// host-written and must be filled through a staging copy.
    pub fn map(&mut self) {
        assert!(
            self.allocation().mapped_ptr().is_some(),
            "cannot map a device-local {} buffer; use a staging copy",
            self.usage.name()
        );
        self.mapped = true;
    }

    /// Releases the host mapping. No-op if not mapped.
    pub fn unmap(&mut self) {
        self.mapped = false;
    }

    /// Returns whether the host mapping is active.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Copies `data` into the buffer at `offset` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is not mapped or the write would run past the
    /// end of the buffer.
    pub fn write_to_buffer(&self, data: &[u8], offset: vk::DeviceSize) {
        assert!(self.mapped, "cannot write to unmapped buffer");

        let end = offset + data.len() as vk::DeviceSize;
        assert!(
            end <= self.buffer_size,
            "write of {} bytes at offset {} exceeds buffer size {}",
            data.len(),
            offset,
            self.buffer_size
        );

        let mapped_ptr = self
            .allocation()
            .mapped_ptr()
            .expect("mapped buffer lost its host pointer")
            .as_ptr() as *mut u8;

        unsafe {
            let dst = mapped_ptr.add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
    }

    /// Flushes a memory range to make host writes visible to the device.
    ///
    /// Only required for non-coherent memory. Pass [`vk::WHOLE_SIZE`] to
    /// flush from `offset` to the end of the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush call fails.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        let range = self.mapped_range(size, offset);
        unsafe {
            self.device.handle().flush_mapped_memory_ranges(&[range])?;
        }
        Ok(())
    }

    /// Invalidates a memory range to make device writes visible to the host.
    ///
    /// Only required for non-coherent memory. Pass [`vk::WHOLE_SIZE`] to
    /// invalidate from `offset` to the end of the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the invalidate call fails.
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        let range = self.mapped_range(size, offset);
        unsafe {
            self.device
                .handle()
                .invalidate_mapped_memory_ranges(&[range])?;
        }
        Ok(())
    }

    fn mapped_range(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> vk::MappedMemoryRange {
        let allocation = self.allocation();
        let size = if size == vk::WHOLE_SIZE {
            self.buffer_size - offset
        } else {
            size
        };
        vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(allocation.offset() + offset)
            .size(size)
    }

    /// Returns a descriptor info covering `size` bytes at `offset`.
    pub fn descriptor_info(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(offset)
            .range(size)
    }

    /// Byte offset of element `index` (`index * alignment_size`).
    #[inline]
    pub fn index_offset(&self, index: u32) -> vk::DeviceSize {
        index as vk::DeviceSize * self.alignment_size
    }

    /// Writes one element's worth of data at element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `data` is larger than the element size, `index` is out of
    /// range, or the buffer is not mapped.
    pub fn write_to_index(&self, data: &[u8], index: u32) {
        assert!(
            data.len() as vk::DeviceSize <= self.instance_size,
            "element write of {} bytes exceeds instance size {}",
            data.len(),
            self.instance_size
        );
        assert!(
            index < self.instance_count,
            "element index {} out of range ({} elements)",
            index,
            self.instance_count
        );
        self.write_to_buffer(data, self.index_offset(index));
    }

    /// Flushes the memory range of element `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush call fails.
    pub fn flush_index(&self, index: u32) -> RhiResult<()> {
        self.flush(self.alignment_size, self.index_offset(index))
    }

    /// Invalidates the memory range of element `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the invalidate call fails.
    pub fn invalidate_index(&self, index: u32) -> RhiResult<()> {
        self.invalidate(self.alignment_size, self.index_offset(index))
    }

    /// Returns a descriptor info covering element `index`.
    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.alignment_size, self.index_offset(index))
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size of one element in bytes, as declared at construction.
    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    /// Number of elements.
    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Per-element stride in bytes.
    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    /// Total buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    /// Buffer usage intent.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Memory location of the backing allocation.
    #[inline]
    pub fn location(&self) -> MemoryLocation {
        self.location
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.mapped = false;

        // Free allocation first, then destroy the buffer handle
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free buffer allocation: {:?}", e);
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_rounds_up() {
        assert_eq!(align_to(10, 16), 16);
        assert_eq!(align_to(16, 16), 16);
        assert_eq!(align_to(17, 16), 32);
        assert_eq!(align_to(255, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
    }

    #[test]
    fn align_to_zero_and_one_are_identity() {
        assert_eq!(align_to(10, 0), 10);
        assert_eq!(align_to(10, 1), 10);
        assert_eq!(align_to(0, 16), 0);
    }

    #[test]
    fn index_offsets_use_aligned_stride() {
        // element size 10, alignment 16 -> stride 16
        let stride = align_to(10, 16);
        assert_eq!(stride, 16);
        for index in 0..4u64 {
            assert_eq!(index * stride, index * 16);
        }

        // already-aligned element sizes keep their natural stride
        assert_eq!(align_to(64, 16), 64);
        assert_eq!(align_to(64, 256), 256);
        // alignment 1 packs tightly
        assert_eq!(align_to(44, 1), 44);
    }

    #[test]
    fn usage_flags() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn usage_names() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Index.name(), "index");
        assert_eq!(BufferUsage::Uniform.name(), "uniform");
        assert_eq!(BufferUsage::Staging.name(), "staging");
    }
}
