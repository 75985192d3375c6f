// Per-frame submission
//
// Owns everything the triangle pass needs on top of the swapchain: render
// pass, pipeline, framebuffers, the command buffer and its sync objects.
//
// FRAME FLOW (one frame in flight):
// wait fence -> reset fence -> acquire image -> record -> submit -> present

use super::pipeline;
use super::sync::FrameSync;
use super::{Swapchain, VulkanDevice};
use crate::config::ShaderConfig;
use crate::error::VkResultExt;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

/// Vertices emitted by the single draw call; positions come from the shader.
pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// What happened to a frame on the presentation side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatus {
    pub image_index: u32,
    /// The swapchain no longer matches the surface exactly
    pub suboptimal: bool,
}

/// Resources for drawing the triangle, destroyed in reverse creation order.
pub struct TriangleRenderer {
    sync: FrameSync,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    clear_color: [f32; 4],
    wait_stages: [vk::PipelineStageFlags; 1],
    device: Arc<VulkanDevice>,
}

impl TriangleRenderer {
    pub fn new(
        device: Arc<VulkanDevice>,
        swapchain: &Swapchain,
        shaders: &ShaderConfig,
        clear_color: [f32; 4],
    ) -> Result<Self> {
        // Handles start null. Destroying a null handle is a no-op, so Drop
        // cleans up after a failure half way through.
        let mut renderer = Self {
            sync: FrameSync {
                image_available: vk::Semaphore::null(),
                render_finished: vk::Semaphore::null(),
                in_flight_fence: vk::Fence::null(),
            },
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            framebuffers: Vec::new(),
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            clear_color,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            device,
        };

        let device = renderer.device.clone();

        renderer.render_pass = pipeline::create_render_pass(&device, swapchain.format)?;

        let (pipeline, pipeline_layout) = pipeline::create_graphics_pipeline(
            &device,
            renderer.render_pass,
            &shaders.vertex,
            &shaders.fragment,
            &shaders.entry_point,
        )?;
        renderer.pipeline = pipeline;
        renderer.pipeline_layout = pipeline_layout;

        renderer.framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            renderer.render_pass,
            swapchain.extent,
        )?;

        // RESET: the single buffer is re-recorded every frame
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        renderer.command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .vk("vkCreateCommandPool")
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(renderer.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        renderer.command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .vk("vkAllocateCommandBuffers")
            .context("Failed to allocate command buffer")?[0];

        renderer.sync = FrameSync::new(&device)?;

        log::info!(
            "Triangle pipeline ready ({} framebuffers)",
            renderer.framebuffers.len()
        );
        Ok(renderer)
    }

    /// Render and present one frame.
    pub fn draw_frame(&self, swapchain: &Swapchain) -> Result<FrameStatus> {
        let device = &self.device;
        let sync = &self.sync;

        // STEP 1: wait until the GPU is done with the previous frame
        unsafe {
            device
                .device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)
                .vk("vkWaitForFences")?;
            device
                .device
                .reset_fences(&[sync.in_flight_fence])
                .vk("vkResetFences")?;
        }

        // STEP 2: acquire the next swapchain image
        let (image_index, acquire_suboptimal) =
            swapchain.acquire_next_image(u64::MAX, sync.image_available)?;

        // STEP 3: record
        unsafe {
            device
                .device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .vk("vkResetCommandBuffer")?;
        }
        self.record_command_buffer(swapchain, image_index)?;

        // STEP 4: submit
        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [self.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], sync.in_flight_fence)
                .vk("vkQueueSubmit")?;
        }

        // STEP 5: present once rendering has finished
        let present_suboptimal =
            swapchain.present(device.graphics_queue, image_index, &signal_semaphores)?;

        Ok(FrameStatus {
            image_index,
            suboptimal: acquire_suboptimal || present_suboptimal,
        })
    }

    fn record_command_buffer(&self, swapchain: &Swapchain, image_index: u32) -> Result<()> {
        let device = &self.device.device;
        let cmd = self.command_buffer;
        let framebuffer = *self
            .framebuffers
            .get(image_index as usize)
            .with_context(|| format!("No framebuffer for swapchain image {}", image_index))?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(full_scissor(swapchain.extent))
            .clear_values(&clear_values);

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(cmd, &begin_info)
                .vk("vkBeginCommandBuffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            device.cmd_set_viewport(cmd, 0, &[full_viewport(swapchain.extent)]);
            device.cmd_set_scissor(cmd, 0, &[full_scissor(swapchain.extent)]);
            device.cmd_draw(cmd, TRIANGLE_VERTEX_COUNT, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd).vk("vkEndCommandBuffer")?;
        }

        Ok(())
    }
}

impl Drop for TriangleRenderer {
    fn drop(&mut self) {
        let device = &self.device.device;
        self.sync.destroy(device);
        unsafe {
            // Also frees the command buffer
            device.destroy_command_pool(self.command_pool, None);
        }
        pipeline::destroy_framebuffers(&self.device, &self.framebuffers);
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Viewport covering the whole swapchain image
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole swapchain image
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn viewport_covers_the_swapchain() {
        let viewport = full_viewport(EXTENT);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn scissor_covers_the_swapchain() {
        let scissor = full_scissor(EXTENT);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(
            (scissor.extent.width, scissor.extent.height),
            (800, 600)
        );
    }
}
