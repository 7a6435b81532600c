use flow_render::{
    data_structures::{
        render_target::{RenderBuffer, RenderTarget},
        texture::{TextureConfig, TextureResource},
    },
    gpu::{
        AttachmentPoint, BlitSource, FramebufferStatus, FramebufferTarget, GpuDevice, TextureFormat,
        recording::{Command, RecordingDevice},
    },
};

mod common;
use crate::common::test_utils::blits;

fn color(gpu: &mut RecordingDevice, label: &str, width: u32, height: u32) -> TextureResource {
    TextureResource::color_attachment(gpu, label, width, height, TextureConfig::attachment())
}

#[test]
fn completeness_check_is_idempotent() {
    let mut gpu = RecordingDevice::new();
    let scene = color(&mut gpu, "scene", 16, 16);
    let depth = RenderBuffer::depth(&mut gpu, "depth", 16, 16, 1);
    let mut target = RenderTarget::new(&mut gpu, "target");
    target.attach_texture(&mut gpu, AttachmentPoint::Color(0), &scene);
    target.attach_render_buffer(&mut gpu, AttachmentPoint::Depth, &depth);
    target.set_draw_buffers(&mut gpu, &[AttachmentPoint::Color(0)]);

    let first = target.check(&gpu).clone();
    let second = target.check(&gpu).clone();
    assert_eq!(first, FramebufferStatus::Complete);
    assert_eq!(first, second);
    assert_eq!(target.status(), &first);
}

#[test]
fn empty_target_is_missing_attachments() {
    let mut gpu = RecordingDevice::new();
    let mut target = RenderTarget::new(&mut gpu, "empty");
    assert_eq!(target.check(&gpu), &FramebufferStatus::MissingAttachment);
}

#[test]
fn attachment_change_rechecks_completeness() {
    let mut gpu = RecordingDevice::new();
    let scene = color(&mut gpu, "scene", 16, 16);
    let mut depth = RenderBuffer::depth(&mut gpu, "depth", 8, 8, 1);
    let mut target = RenderTarget::new(&mut gpu, "target");
    target.attach_texture(&mut gpu, AttachmentPoint::Color(0), &scene);
    target.attach_render_buffer(&mut gpu, AttachmentPoint::Depth, &depth);
    assert_eq!(target.status(), &FramebufferStatus::IncompleteDimensions);

    depth.resize(&mut gpu, 16, 16);
    // Resizing does not go through the target, the next check picks it up.
    assert_eq!(target.check(&gpu), &FramebufferStatus::Complete);

    target.detach(&mut gpu, AttachmentPoint::Depth);
    assert_eq!(target.status(), &FramebufferStatus::Complete);
    assert!(target.attachment(AttachmentPoint::Depth).is_none());
}

#[test]
fn draw_buffer_needs_an_attachment() {
    let mut gpu = RecordingDevice::new();
    let scene = color(&mut gpu, "scene", 16, 16);
    let mut target = RenderTarget::new(&mut gpu, "target");
    target.attach_texture(&mut gpu, AttachmentPoint::Color(0), &scene);
    target.set_draw_buffers(&mut gpu, &[AttachmentPoint::Color(0), AttachmentPoint::Color(1)]);
    assert_eq!(
        target.status(),
        &FramebufferStatus::IncompleteDrawBuffer(AttachmentPoint::Color(1))
    );
}

#[test]
fn mixed_sample_counts_are_incomplete() {
    let mut gpu = RecordingDevice::new();
    let config = TextureConfig {
        msaa_multiplier: 4,
        ..TextureConfig::attachment()
    };
    let msaa = TextureResource::multisample_attachment(&mut gpu, "msaa", 16, 16, config);
    let depth = RenderBuffer::depth(&mut gpu, "depth", 16, 16, 1);
    let mut target = RenderTarget::new(&mut gpu, "target");
    target.attach_texture(&mut gpu, AttachmentPoint::Color(0), &msaa);
    target.attach_render_buffer(&mut gpu, AttachmentPoint::Depth, &depth);
    assert_eq!(target.status(), &FramebufferStatus::IncompleteMultisample);
}

#[test]
fn depth_texture_cannot_be_a_color_attachment() {
    let mut gpu = RecordingDevice::new();
    let shadow = TextureResource::depth_attachment(&mut gpu, "shadow", 16, 16);
    assert_eq!(shadow.format(), TextureFormat::Depth32Float);
    let mut target = RenderTarget::new(&mut gpu, "target");
    target.attach_texture(&mut gpu, AttachmentPoint::Color(0), &shadow);
    assert_eq!(
        target.status(),
        &FramebufferStatus::IncompleteAttachment(AttachmentPoint::Color(0))
    );
}

#[test]
fn incomplete_target_is_still_bound() {
    let mut gpu = RecordingDevice::new();
    let mut target = RenderTarget::new(&mut gpu, "broken");
    target.bind(&mut gpu);
    assert!(!target.status().is_complete());
    assert_eq!(gpu.bound_framebuffer(), target.target());
    assert_ne!(gpu.bound_framebuffer(), FramebufferTarget::Default);
}

#[test]
fn cube_faces_attach_per_mip() {
    let mut gpu = RecordingDevice::new();
    let config = TextureConfig {
        gen_mipmap: true,
        mip_levels: Some(5),
        ..TextureConfig::attachment()
    };
    let cube = TextureResource::cube_map(&mut gpu, "cube", 128, config);
    assert_eq!(cube.mip_levels(), 5);
    let depth = RenderBuffer::depth(&mut gpu, "depth", 32, 32, 1);
    let mut target = RenderTarget::new(&mut gpu, "capture");
    target.attach_render_buffer(&mut gpu, AttachmentPoint::Depth, &depth);
    target.set_draw_buffers(&mut gpu, &[AttachmentPoint::Color(0)]);

    target.attach_cube_face(&mut gpu, AttachmentPoint::Color(0), &cube, 3, 2);
    assert_eq!(target.status(), &FramebufferStatus::Complete);

    // Mip 5 does not exist on a five level chain.
    target.attach_cube_face(&mut gpu, AttachmentPoint::Color(0), &cube, 3, 5);
    assert_eq!(
        target.status(),
        &FramebufferStatus::IncompleteAttachment(AttachmentPoint::Color(0))
    );
}

#[test]
fn blit_copies_only_shared_color_attachments() {
    let mut gpu = RecordingDevice::new();
    let a0 = color(&mut gpu, "a0", 16, 16);
    let a1 = color(&mut gpu, "a1", 16, 16);
    let b0 = color(&mut gpu, "b0", 16, 16);
    let mut a = RenderTarget::new(&mut gpu, "a");
    a.attach_texture(&mut gpu, AttachmentPoint::Color(0), &a0);
    a.attach_texture(&mut gpu, AttachmentPoint::Color(1), &a1);
    let mut b = RenderTarget::new(&mut gpu, "b");
    b.attach_texture(&mut gpu, AttachmentPoint::Color(0), &b0);

    gpu.clear_commands();
    a.blit_to(&mut gpu, &b, 16, 16);
    let copies = blits(&gpu);
    assert_eq!(copies.len(), 1);
    assert!(matches!(
        copies[0],
        Command::Blit {
            width: 16,
            height: 16,
            source: BlitSource::Color(0),
            ..
        }
    ));
}

#[test]
fn resize_keeps_configuration_until_reconfigured() {
    let mut gpu = RecordingDevice::new();
    let mut texture = color(&mut gpu, "scene", 16, 16);
    texture.resize(&mut gpu, 32, 8);
    assert_eq!((texture.width(), texture.height()), (32, 8));
    assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
    assert_eq!(gpu.texture(texture.id()).map(|d| d.width), Some(32));

    let mut hdr = texture.config().clone();
    hdr.hdr = true;
    texture.set_config(hdr);
    assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
    texture.resize(&mut gpu, 32, 8);
    assert_eq!(texture.format(), TextureFormat::Rgba16Float);
}

#[test]
fn dropped_resources_release_newest_first() {
    let mut gpu = RecordingDevice::new();
    let first = color(&mut gpu, "first", 4, 4);
    let second = color(&mut gpu, "second", 4, 4);
    let target = RenderTarget::new(&mut gpu, "target");
    let ids = [first.id().0, second.id().0];
    drop(first);
    drop(target);
    drop(second);
    gpu.maintain();

    let released: Vec<u64> = gpu.released().iter().map(|id| id.sequence()).collect();
    assert_eq!(released.len(), 3);
    assert!(released.windows(2).all(|w| w[0] > w[1]));
    assert!(released.contains(&ids[0]) && released.contains(&ids[1]));
    assert_eq!(gpu.live_resources(), 0);
}
