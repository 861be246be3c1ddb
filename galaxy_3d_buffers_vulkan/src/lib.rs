/*!
# Galaxy 3D Buffers - Vulkan Device

Vulkan implementation of the galaxy_3d_buffers `BufferDevice` trait.

Buffer objects are created with Ash and backed by gpu-allocator memory.
Host-visible objects are written through their persistent mapping,
device-local objects through staging buffers and one-shot submissions.

```no_run
# fn setup(instance: &ash::Instance, physical_device: ash::vk::PhysicalDevice, device: ash::Device) -> galaxy_3d_buffers::galaxy3d::Result<()> {
use std::sync::Arc;
use galaxy_3d_buffers::galaxy3d::{BufferDesc, BufferResource};
use galaxy_3d_buffers::galaxy3d::buffer::BindFlags;
use galaxy_3d_buffers_vulkan::{VulkanBufferDevice, VulkanContext};

let context = Arc::new(VulkanContext::new(instance, physical_device, device, 0)?);
let mut buffers = VulkanBufferDevice::new(context);
let buffer = BufferResource::create(&mut buffers, &BufferDesc::new(256, BindFlags::VERTEX_BUFFER), None)?;
buffer.destroy(&mut buffers);
# Ok(())
# }
```
*/

mod vulkan_context;
mod vulkan_flags;
mod vulkan_buffer_device;

pub use vulkan_context::VulkanContext;
pub use vulkan_buffer_device::VulkanBufferDevice;
