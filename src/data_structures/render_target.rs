//! Offscreen render targets.
//!
//! A [`RenderTarget`] owns a device framebuffer and remembers which image sits
//! at each attachment point. Completeness is re-evaluated after every
//! attachment change and again whenever the target is bound for drawing, since
//! resizing an attached texture can break it without the target noticing.
//! Incomplete targets are reported through `log::error!` and rendering goes on.

use std::collections::BTreeMap;

use crate::{
    data_structures::texture::TextureResource,
    gpu::{
        AttachedImage, AttachmentPoint, BlitSource, FramebufferStatus, FramebufferTarget,
        GpuDevice, GpuFramebuffer, GpuRenderBuffer, RenderBufferDesc, RenderBufferId,
        TextureFormat,
    },
};

/// Non-sampled attachment storage, used for depth buffers.
#[derive(Debug)]
pub struct RenderBuffer {
    desc: RenderBufferDesc,
    handle: GpuRenderBuffer,
}

impl RenderBuffer {
    pub fn depth(gpu: &mut impl GpuDevice, label: &str, width: u32, height: u32, samples: u32) -> Self {
        let desc = RenderBufferDesc {
            label: label.to_string(),
            width: width.max(1),
            height: height.max(1),
            format: TextureFormat::Depth32Float,
            samples: samples.max(1),
        };
        let id = gpu.create_render_buffer(&desc);
        Self {
            desc,
            handle: GpuRenderBuffer::new(id, gpu.releaser()),
        }
    }

    pub fn id(&self) -> RenderBufferId {
        self.handle.id()
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn samples(&self) -> u32 {
        self.desc.samples
    }

    /// Stores a new sample count. Takes effect on the next [`resize`](Self::resize).
    pub fn set_samples(&mut self, samples: u32) {
        self.desc.samples = samples.max(1);
    }

    pub fn resize(&mut self, gpu: &mut impl GpuDevice, width: u32, height: u32) {
        self.desc.width = width.max(1);
        self.desc.height = height.max(1);
        gpu.resize_render_buffer(self.id(), &self.desc);
    }
}

#[derive(Debug)]
pub struct RenderTarget {
    label: String,
    handle: GpuFramebuffer,
    attachments: BTreeMap<AttachmentPoint, AttachedImage>,
    draw_buffers: Vec<AttachmentPoint>,
    status: FramebufferStatus,
    reported: Option<FramebufferStatus>,
}

impl RenderTarget {
    pub fn new(gpu: &mut impl GpuDevice, label: &str) -> Self {
        let id = gpu.create_framebuffer(label);
        Self {
            label: label.to_string(),
            handle: GpuFramebuffer::new(id, gpu.releaser()),
            attachments: BTreeMap::new(),
            draw_buffers: Vec::new(),
            status: FramebufferStatus::MissingAttachment,
            reported: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> FramebufferTarget {
        FramebufferTarget::Offscreen(self.handle.id())
    }

    fn set(&mut self, gpu: &mut impl GpuDevice, point: AttachmentPoint, image: Option<AttachedImage>) {
        gpu.attach(self.handle.id(), point, image);
        match image {
            Some(image) => {
                self.attachments.insert(point, image);
            }
            None => {
                self.attachments.remove(&point);
            }
        }
        self.check(&*gpu);
    }

    /// Replaces whatever was attached at `point` with mip 0 of `texture`.
    pub fn attach_texture(&mut self, gpu: &mut impl GpuDevice, point: AttachmentPoint, texture: &TextureResource) {
        self.set(gpu, point, Some(texture.image(0, 0)));
    }

    /// Attaches one face of a cubemap at the given mip level.
    pub fn attach_cube_face(
        &mut self,
        gpu: &mut impl GpuDevice,
        point: AttachmentPoint,
        cube: &TextureResource,
        face: u32,
        mip: u32,
    ) {
        self.set(gpu, point, Some(cube.image(face, mip)));
    }

    pub fn attach_render_buffer(&mut self, gpu: &mut impl GpuDevice, point: AttachmentPoint, buffer: &RenderBuffer) {
        self.set(gpu, point, Some(AttachedImage::RenderBuffer(buffer.id())));
    }

    pub fn detach(&mut self, gpu: &mut impl GpuDevice, point: AttachmentPoint) {
        self.set(gpu, point, None);
    }

    pub fn set_draw_buffers(&mut self, gpu: &mut impl GpuDevice, buffers: &[AttachmentPoint]) {
        gpu.set_draw_buffers(self.handle.id(), buffers);
        self.draw_buffers = buffers.to_vec();
        self.check(&*gpu);
    }

    pub fn attachment(&self, point: AttachmentPoint) -> Option<&AttachedImage> {
        self.attachments.get(&point)
    }

    /// Attachments in attachment-point order.
    pub fn attachments(&self) -> impl Iterator<Item = (&AttachmentPoint, &AttachedImage)> {
        self.attachments.iter()
    }

    pub fn draw_buffers(&self) -> &[AttachmentPoint] {
        &self.draw_buffers
    }

    /// Result of the most recent completeness check.
    pub fn status(&self) -> &FramebufferStatus {
        &self.status
    }

    /// Re-queries completeness from the device.
    pub fn check(&mut self, gpu: &impl GpuDevice) -> &FramebufferStatus {
        self.status = gpu.framebuffer_status(self.handle.id());
        log::trace!("{} framebuffer: {}", self.label, self.status);
        &self.status
    }

    /// Makes this target the draw target. An incomplete target is logged, not refused.
    pub fn bind(&mut self, gpu: &mut impl GpuDevice) {
        self.check(&*gpu);
        if !self.status.is_complete() && self.reported.as_ref() != Some(&self.status) {
            log::error!("{} framebuffer is not complete: {}", self.label, self.status);
        }
        self.reported = Some(self.status.clone()).filter(|s| !s.is_complete());
        gpu.bind_framebuffer(self.target());
    }

    /// Copies every color attachment this target shares with `other`.
    pub fn blit_to(&self, gpu: &mut impl GpuDevice, other: &RenderTarget, width: u32, height: u32) {
        for point in self.attachments.keys() {
            if let AttachmentPoint::Color(index) = point {
                if other.attachments.contains_key(point) {
                    gpu.blit(
                        self.handle.id(),
                        other.handle.id(),
                        width,
                        height,
                        BlitSource::Color(*index),
                    );
                }
            }
        }
    }

    pub fn blit_depth_to(&self, gpu: &mut impl GpuDevice, other: &RenderTarget, width: u32, height: u32) {
        gpu.blit(self.handle.id(), other.handle.id(), width, height, BlitSource::Depth);
    }
}
