//! Growable host-visible GPU buffer
//!
//! Elements are laid out at a fixed stride. For uniform usage the stride is
//! rounded up to the device's dynamic offset alignment so any element can be
//! selected with a dynamic offset.

use ash::vk;
use bytemuck::Pod;

use crate::render::backends::vulkan::{GpuBuffer, SharedDevice, VulkanError, VulkanResult};

/// Host-visible array of fixed-stride elements
pub struct GpuVector {
    device: SharedDevice,
    usage: vk::BufferUsageFlags,
    element_size: u64,
    stride: u64,
    capacity: usize,
    buffer: Option<GpuBuffer>,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

impl GpuVector {
    /// Create an empty vector; no buffer exists until the first reserve
    pub fn new(device: SharedDevice, usage: vk::BufferUsageFlags, element_size: u64) -> Self {
        let stride = if usage.intersects(vk::BufferUsageFlags::UNIFORM_BUFFER) {
            align_up(element_size, device.limits().min_uniform_buffer_offset_alignment)
        } else {
            element_size
        };

        Self {
            device,
            usage,
            element_size,
            stride,
            capacity: 0,
            buffer: None,
        }
    }

    /// Ensure room for `count` elements
    ///
    /// Grows to at least double the old capacity. Growing discards contents.
    pub fn reserve(&mut self, count: usize) -> VulkanResult<()> {
        if count <= self.capacity && self.buffer.is_some() {
            return Ok(());
        }

        let capacity = count.max(self.capacity * 2).max(1);
        let buffer = self.device.create_buffer(capacity as u64 * self.stride, self.usage)?;
        if let Some(old) = self.buffer.replace(buffer) {
            self.device.destroy_buffer(&old);
        }
        log::debug!(
            "GpuVector grew to {} elements ({} byte stride)",
            capacity,
            self.stride
        );
        self.capacity = capacity;
        Ok(())
    }

    fn buffer_ref(&self) -> VulkanResult<&GpuBuffer> {
        self.buffer.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "GpuVector written before reserve".to_string(),
        })
    }

    /// Write one element at `index`
    pub fn write_element<T: Pod>(&self, index: usize, value: &T) -> VulkanResult<()> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() as u64 > self.stride {
            return Err(VulkanError::InvalidOperation {
                reason: format!("element of {} bytes exceeds stride {}", bytes.len(), self.stride),
            });
        }
        if index >= self.capacity {
            return Err(VulkanError::InvalidOperation {
                reason: format!("index {} out of capacity {}", index, self.capacity),
            });
        }
        self.device.write_buffer(self.buffer_ref()?, self.offset_of(index), bytes)
    }

    /// Write tightly packed elements starting at index 0
    ///
    /// Only valid when the stride equals the element size (vertex and index data).
    pub fn write_slice<T: Pod>(&self, values: &[T]) -> VulkanResult<()> {
        if self.stride != std::mem::size_of::<T>() as u64 {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "packed write of {} byte elements into {} byte stride",
                    std::mem::size_of::<T>(),
                    self.stride
                ),
            });
        }
        if values.len() > self.capacity {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{} elements exceed capacity {}", values.len(), self.capacity),
            });
        }
        self.device.write_buffer(self.buffer_ref()?, 0, bytemuck::cast_slice(values))
    }

    /// Byte offset of element `index`
    pub fn offset_of(&self, index: usize) -> u64 {
        index as u64 * self.stride
    }

    /// Distance between elements in bytes
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Unpadded element size in bytes
    pub fn element_size(&self) -> u64 {
        self.element_size
    }

    /// Number of elements that fit without growing
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backing buffer, null before the first reserve
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.map(|b| b.buffer).unwrap_or_default()
    }
}

impl Drop for GpuVector {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.device.destroy_buffer(&buffer);
        }
    }
}
