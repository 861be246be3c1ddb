/// VulkanContext - Shared Vulkan resources used by the buffer device
///
/// Contains everything needed for buffer operations:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Queue and command pool for one-shot transfer and barrier submissions

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use galaxy_3d_buffers::galaxy3d::Result;
use galaxy_3d_buffers::{engine_err, engine_trace};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

pub(crate) const SOURCE: &str = "galaxy3d::vulkan";

/// Shared Vulkan context for the buffer device.
///
/// Device and instance destruction stay with the owner of the `ash::Device`;
/// the context only destroys what it created (allocator and command pool).
pub struct VulkanContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped before the command pool is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    /// Queue used for transfer and barrier submissions
    pub queue: vk::Queue,

    pub queue_family: u32,

    /// Reusable command pool for one-shot operations
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    pub command_pool: Mutex<vk::CommandPool>,
}

impl VulkanContext {
    /// Create the allocator and command pool on an existing device
    ///
    /// # Arguments
    ///
    /// * `instance` - Vulkan instance the device was created from
    /// * `physical_device` - Physical device backing `device`
    /// * `device` - Vulkan logical device
    /// * `queue_family` - Queue family index used for submissions
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family: u32,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| engine_err!(SOURCE, InitializationFailed => "Failed to create GPU allocator: {:?}", e))?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(|e| engine_err!(SOURCE, InitializationFailed => "Failed to create command pool: {:?}", e))?
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        Ok(Self {
            device,
            allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
            queue,
            queue_family,
            command_pool: Mutex::new(command_pool),
        })
    }

    /// Record commands into a one-shot command buffer, submit and wait
    pub fn submit_one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let pool = self
            .command_pool
            .lock()
            .map_err(|_| engine_err!(SOURCE, "Command pool mutex poisoned"))?;

        unsafe {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = self
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| engine_err!(SOURCE, "Failed to allocate command buffer: {:?}", e))?[0];

            let result = self.record_and_submit(command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        self.device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| engine_err!(SOURCE, "Failed to begin command buffer: {:?}", e))?;

        record(&self.device, command_buffer);

        self.device
            .end_command_buffer(command_buffer)
            .map_err(|e| engine_err!(SOURCE, "Failed to end command buffer: {:?}", e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        self.device
            .queue_submit(self.queue, &[submit_info], vk::Fence::null())
            .map_err(|e| engine_err!(SOURCE, "Failed to submit command buffer: {:?}", e))?;

        self.device
            .queue_wait_idle(self.queue)
            .map_err(|e| engine_err!(SOURCE, "Failed to wait for queue idle: {:?}", e))?;

        engine_trace!(SOURCE, "One-shot submission completed");
        Ok(())
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Allocations still alive keep their own Arc; the allocator goes when the last one drops
            ManuallyDrop::drop(&mut self.allocator);

            if let Ok(pool) = self.command_pool.lock() {
                self.device.destroy_command_pool(*pool, None);
            }
        }
    }
}
