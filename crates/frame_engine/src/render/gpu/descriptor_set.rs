//! Descriptor set layouts, per-frame pools and allocated sets
//!
//! A [`DescriptorSetLayout`] collects bindings in insertion order and compiles
//! lazily; once compiled it is frozen. A [`DescriptorPool`] hands out sets for
//! one frame cycle and is bulk-reset at the start of the next. Sets remember
//! the pool generation they came from so use after a reset is caught instead
//! of reaching the driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::config::DescriptorPoolConfig;
use crate::render::backends::vulkan::{LayoutBinding, SharedDevice, VulkanError, VulkanResult};

/// Stages every binding is visible to
const BINDING_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Kind of resource behind one binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Sampled image with an immutable sampler
    CombinedImageSampler {
        /// Sampler baked into the layout
        sampler: vk::Sampler,
    },
    /// Array of structs in a storage buffer
    StorageBuffer {
        /// Size of one element in bytes
        element_size: u64,
    },
    /// Uniform buffer window selected by a bind-time offset
    DynamicUniformBuffer {
        /// Size of the window visible to the shader
        buffer_size: u64,
    },
}

impl BindingKind {
    /// Backend descriptor type
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::CombinedImageSampler { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::StorageBuffer { .. } => vk::DescriptorType::STORAGE_BUFFER,
            Self::DynamicUniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        }
    }
}

/// Ordered binding declaration, compiled on first use
pub struct DescriptorSetLayout {
    device: SharedDevice,
    bindings: Vec<BindingKind>,
    dynamic_offset_count: u32,
    layout: Option<vk::DescriptorSetLayout>,
}

impl DescriptorSetLayout {
    /// Create an empty layout
    pub fn new(device: SharedDevice) -> Self {
        Self {
            device,
            bindings: Vec::new(),
            dynamic_offset_count: 0,
            layout: None,
        }
    }

    fn push(&mut self, kind: BindingKind) -> VulkanResult<u32> {
        if self.layout.is_some() {
            return Err(VulkanError::LayoutFrozen);
        }
        let binding = self.bindings.len() as u32;
        self.bindings.push(kind);
        Ok(binding)
    }

    /// Append a combined image sampler; returns its binding index
    pub fn add_combined_image_sampler(&mut self, sampler: vk::Sampler) -> VulkanResult<u32> {
        self.push(BindingKind::CombinedImageSampler { sampler })
    }

    /// Append a storage buffer; returns its binding index
    pub fn add_storage_buffer(&mut self, element_size: u64) -> VulkanResult<u32> {
        self.push(BindingKind::StorageBuffer { element_size })
    }

    /// Append a dynamic uniform buffer; returns its binding index
    ///
    /// Every dynamic binding adds one offset that must be supplied at bind time.
    pub fn add_dynamic_uniform_buffer(&mut self, buffer_size: u64) -> VulkanResult<u32> {
        let binding = self.push(BindingKind::DynamicUniformBuffer { buffer_size })?;
        self.dynamic_offset_count += 1;
        Ok(binding)
    }

    /// Compiled layout handle, compiling on first call
    pub fn layout(&mut self) -> VulkanResult<vk::DescriptorSetLayout> {
        if let Some(layout) = self.layout {
            return Ok(layout);
        }

        let bindings: Vec<_> = self
            .bindings
            .iter()
            .enumerate()
            .map(|(index, kind)| LayoutBinding {
                binding: index as u32,
                descriptor_type: kind.descriptor_type(),
                stages: BINDING_STAGES,
                immutable_sampler: match kind {
                    BindingKind::CombinedImageSampler { sampler } => Some(*sampler),
                    _ => None,
                },
            })
            .collect();

        let layout = self.device.create_descriptor_set_layout(&bindings)?;
        log::debug!(
            "Compiled descriptor set layout with {} bindings ({} dynamic)",
            bindings.len(),
            self.dynamic_offset_count
        );
        self.layout = Some(layout);
        Ok(layout)
    }

    /// Compiled handle, if [`Self::layout`] has run
    pub fn handle(&self) -> Option<vk::DescriptorSetLayout> {
        self.layout
    }

    /// Whether the layout is compiled (and therefore frozen)
    pub fn is_compiled(&self) -> bool {
        self.layout.is_some()
    }

    /// Bindings in declaration order
    pub fn bindings(&self) -> &[BindingKind] {
        &self.bindings
    }

    /// Number of dynamic offsets a bind must supply
    pub fn dynamic_offset_count(&self) -> u32 {
        self.dynamic_offset_count
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        if let Some(layout) = self.layout.take() {
            self.device.destroy_descriptor_set_layout(layout);
        }
    }
}

/// Per-frame descriptor arena, freed in bulk
pub struct DescriptorPool {
    device: SharedDevice,
    pool: vk::DescriptorPool,
    max_sets: u32,
    allocated: u32,
    generation: Arc<AtomicU64>,
}

impl DescriptorPool {
    /// Create a pool sized for one frame's allocations
    pub fn new(device: SharedDevice, config: &DescriptorPoolConfig) -> VulkanResult<Self> {
        let sizes: Vec<_> = [
            (vk::DescriptorType::UNIFORM_BUFFER, config.uniform_buffers),
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, config.dynamic_uniform_buffers),
            (vk::DescriptorType::STORAGE_BUFFER, config.storage_buffers),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, config.combined_image_samplers),
        ]
        .into_iter()
        .filter(|&(_, count)| count > 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect();

        let pool = device.create_descriptor_pool(config.max_sets, &sizes)?;

        Ok(Self {
            device,
            pool,
            max_sets: config.max_sets,
            allocated: 0,
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Allocate one set, compiling `layout` if needed
    pub fn allocate(&mut self, layout: &mut DescriptorSetLayout) -> VulkanResult<DescriptorSet> {
        if self.allocated >= self.max_sets {
            return Err(VulkanError::DescriptorPoolExhausted {
                capacity: self.max_sets,
            });
        }

        let layout_handle = layout.layout()?;
        let set = match self.device.allocate_descriptor_set(self.pool, layout_handle) {
            Ok(set) => set,
            Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
            | Err(VulkanError::Api(vk::Result::ERROR_FRAGMENTED_POOL)) => {
                return Err(VulkanError::DescriptorPoolExhausted {
                    capacity: self.max_sets,
                })
            }
            Err(e) => return Err(e),
        };
        self.allocated += 1;

        let dynamic_bindings = layout
            .bindings()
            .iter()
            .enumerate()
            .filter(|(_, kind)| matches!(kind, BindingKind::DynamicUniformBuffer { .. }))
            .map(|(index, _)| index as u32)
            .collect::<Vec<_>>();

        Ok(DescriptorSet {
            device: self.device.clone(),
            set,
            bindings: layout.bindings().to_vec(),
            dynamic_offsets: vec![0; dynamic_bindings.len()],
            dynamic_bindings,
            generation: self.generation.load(Ordering::Acquire),
            pool_generation: Arc::clone(&self.generation),
        })
    }

    /// Free every set allocated since the last reset
    ///
    /// Sets from earlier cycles become stale and refuse to bind.
    pub fn reset(&mut self) -> VulkanResult<()> {
        self.device.reset_descriptor_pool(self.pool)?;
        self.allocated = 0;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Sets this pool can hold between resets
    pub fn capacity(&self) -> u32 {
        self.max_sets
    }

    /// Sets allocated in the current cycle
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
    }
}

/// Descriptor set valid until its pool is next reset
pub struct DescriptorSet {
    device: SharedDevice,
    set: vk::DescriptorSet,
    bindings: Vec<BindingKind>,
    dynamic_bindings: Vec<u32>,
    dynamic_offsets: Vec<u32>,
    generation: u64,
    pool_generation: Arc<AtomicU64>,
}

impl DescriptorSet {
    /// Whether the owning pool has not been reset since allocation
    pub fn is_valid(&self) -> bool {
        self.pool_generation.load(Ordering::Acquire) == self.generation
    }

    fn check_valid(&self) -> VulkanResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(VulkanError::StaleDescriptorSet)
        }
    }

    fn binding(&self, binding: u32) -> VulkanResult<BindingKind> {
        self.bindings
            .get(binding as usize)
            .copied()
            .ok_or_else(|| VulkanError::InvalidBinding {
                binding,
                reason: format!("layout has {} bindings", self.bindings.len()),
            })
    }

    /// Point a dynamic uniform binding at `buffer`
    pub fn update_dynamic_buffer(&mut self, binding: u32, buffer: vk::Buffer) -> VulkanResult<()> {
        self.check_valid()?;
        match self.binding(binding)? {
            BindingKind::DynamicUniformBuffer { buffer_size } => {
                self.device.write_buffer_descriptor(
                    self.set,
                    binding,
                    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    buffer,
                    0,
                    buffer_size,
                );
                Ok(())
            }
            other => Err(mismatch(binding, "dynamic uniform buffer", other)),
        }
    }

    /// Point a storage binding at `element_count` elements starting at `offset`
    pub fn update_storage_buffer(&mut self, binding: u32, buffer: vk::Buffer, offset: u64, element_count: u64) -> VulkanResult<()> {
        self.check_valid()?;
        match self.binding(binding)? {
            BindingKind::StorageBuffer { element_size } => {
                if element_count == 0 {
                    return Err(VulkanError::InvalidBinding {
                        binding,
                        reason: "storage range of zero elements".to_string(),
                    });
                }
                self.device.write_buffer_descriptor(
                    self.set,
                    binding,
                    vk::DescriptorType::STORAGE_BUFFER,
                    buffer,
                    offset,
                    element_size * element_count,
                );
                Ok(())
            }
            other => Err(mismatch(binding, "storage buffer", other)),
        }
    }

    /// Point a sampler binding at `view` in shader-read layout
    pub fn update_image(&mut self, binding: u32, view: vk::ImageView) -> VulkanResult<()> {
        self.check_valid()?;
        match self.binding(binding)? {
            BindingKind::CombinedImageSampler { .. } => {
                self.device
                    .write_image_descriptor(self.set, binding, view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                Ok(())
            }
            other => Err(mismatch(binding, "combined image sampler", other)),
        }
    }

    /// Set the bind-time offset of a dynamic uniform binding
    pub fn set_dynamic_offset(&mut self, binding: u32, offset: u32) -> VulkanResult<()> {
        let slot = self
            .dynamic_bindings
            .iter()
            .position(|&b| b == binding)
            .ok_or_else(|| VulkanError::InvalidBinding {
                binding,
                reason: "not a dynamic uniform buffer".to_string(),
            })?;
        self.dynamic_offsets[slot] = offset;
        Ok(())
    }

    /// Current dynamic offsets, in declaration order
    pub fn dynamic_offsets(&self) -> &[u32] {
        &self.dynamic_offsets
    }

    /// Record a bind of this set at `set_index`
    pub fn cmd_bind(&self, command_buffer: vk::CommandBuffer, layout: vk::PipelineLayout, set_index: u32) -> VulkanResult<()> {
        self.check_valid()?;
        self.device
            .cmd_bind_descriptor_set(command_buffer, layout, set_index, self.set, &self.dynamic_offsets);
        Ok(())
    }

    /// Get the set handle
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }
}

fn mismatch(binding: u32, expected: &str, found: BindingKind) -> VulkanError {
    VulkanError::InvalidBinding {
        binding,
        reason: format!("expected {}, layout declares {:?}", expected, found.descriptor_type()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::mock::{Call, MockDevice};

    fn pool_config(max_sets: u32) -> DescriptorPoolConfig {
        DescriptorPoolConfig {
            max_sets,
            ..DescriptorPoolConfig::default()
        }
    }

    #[test]
    fn test_bindings_follow_insertion_order() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        assert_eq!(layout.add_storage_buffer(64).unwrap(), 0);
        assert_eq!(layout.add_dynamic_uniform_buffer(144).unwrap(), 1);
        assert_eq!(layout.add_combined_image_sampler(vk::Sampler::null()).unwrap(), 2);
        assert_eq!(layout.add_dynamic_uniform_buffer(16).unwrap(), 3);
        assert_eq!(layout.dynamic_offset_count(), 2);
        assert_eq!(layout.bindings()[0], BindingKind::StorageBuffer { element_size: 64 });
    }

    #[test]
    fn test_layout_compiles_once_and_freezes() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_dynamic_uniform_buffer(144).unwrap();

        let first = layout.layout().unwrap();
        let second = layout.layout().unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.live_objects(), 1);

        assert_eq!(layout.add_storage_buffer(4), Err(VulkanError::LayoutFrozen));
        assert_eq!(layout.bindings().len(), 1);

        drop(layout);
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn test_pool_exhaustion_and_reset() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_dynamic_uniform_buffer(144).unwrap();
        let mut pool = DescriptorPool::new(mock.shared(), &pool_config(2)).unwrap();

        pool.allocate(&mut layout).unwrap();
        pool.allocate(&mut layout).unwrap();
        assert_eq!(
            pool.allocate(&mut layout).err(),
            Some(VulkanError::DescriptorPoolExhausted { capacity: 2 })
        );

        pool.reset().unwrap();
        assert_eq!(pool.allocated(), 0);
        assert!(pool.allocate(&mut layout).is_ok());
    }

    #[test]
    fn test_reset_invalidates_previous_sets() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_dynamic_uniform_buffer(144).unwrap();
        let mut pool = DescriptorPool::new(mock.shared(), &pool_config(4)).unwrap();

        let mut set = pool.allocate(&mut layout).unwrap();
        assert!(set.is_valid());
        pool.reset().unwrap();

        assert!(!set.is_valid());
        assert_eq!(
            set.cmd_bind(vk::CommandBuffer::null(), vk::PipelineLayout::null(), 0),
            Err(VulkanError::StaleDescriptorSet)
        );
        assert_eq!(
            set.update_dynamic_buffer(0, vk::Buffer::null()),
            Err(VulkanError::StaleDescriptorSet)
        );
    }

    #[test]
    fn test_bind_supplies_dynamic_offsets_in_order() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_dynamic_uniform_buffer(144).unwrap();
        layout.add_storage_buffer(16).unwrap();
        layout.add_dynamic_uniform_buffer(64).unwrap();
        let mut pool = DescriptorPool::new(mock.shared(), &pool_config(1)).unwrap();

        let mut set = pool.allocate(&mut layout).unwrap();
        set.set_dynamic_offset(2, 512).unwrap();
        set.set_dynamic_offset(0, 256).unwrap();
        assert!(set.set_dynamic_offset(1, 0).is_err());

        set.cmd_bind(vk::CommandBuffer::null(), vk::PipelineLayout::null(), 0).unwrap();
        assert!(mock.calls().contains(&Call::BindDescriptorSet {
            set_index: 0,
            set: set.handle(),
            dynamic_offsets: vec![256, 512],
        }));
    }

    #[test]
    fn test_update_rejects_wrong_kind() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_storage_buffer(16).unwrap();
        let mut pool = DescriptorPool::new(mock.shared(), &pool_config(1)).unwrap();
        let mut set = pool.allocate(&mut layout).unwrap();

        assert!(matches!(
            set.update_dynamic_buffer(0, vk::Buffer::null()),
            Err(VulkanError::InvalidBinding { binding: 0, .. })
        ));
        assert!(matches!(
            set.update_image(5, vk::ImageView::null()),
            Err(VulkanError::InvalidBinding { binding: 5, .. })
        ));
        set.update_storage_buffer(0, vk::Buffer::null(), 0, 8).unwrap();
    }

    #[test]
    fn test_storage_range_covers_requested_elements() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_storage_buffer(16).unwrap();
        let mut pool = DescriptorPool::new(mock.shared(), &pool_config(1)).unwrap();
        let mut set = pool.allocate(&mut layout).unwrap();
        mock.clear_calls();

        assert!(matches!(
            set.update_storage_buffer(0, vk::Buffer::null(), 0, 0),
            Err(VulkanError::InvalidBinding { binding: 0, .. })
        ));
        assert!(mock.calls().is_empty());

        set.update_storage_buffer(0, vk::Buffer::null(), 32, 8).unwrap();
        assert_eq!(
            mock.calls(),
            vec![Call::WriteBufferDescriptor {
                set: set.handle(),
                binding: 0,
                buffer: vk::Buffer::null(),
                range: 128,
            }]
        );
    }

    #[test]
    fn test_update_image_writes_shader_read_view() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_dynamic_uniform_buffer(144).unwrap();
        layout.add_combined_image_sampler(vk::Sampler::null()).unwrap();
        let mut pool = DescriptorPool::new(mock.shared(), &pool_config(1)).unwrap();
        let mut set = pool.allocate(&mut layout).unwrap();
        mock.clear_calls();

        let view = vk::Handle::from_raw(0xbeef);
        set.update_image(1, view).unwrap();
        assert_eq!(
            mock.calls(),
            vec![Call::WriteImageDescriptor {
                set: set.handle(),
                binding: 1,
                view,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }]
        );
        assert!(set.update_image(0, view).is_err());
    }
}
