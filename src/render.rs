//! Per-frame pass sequencing.
//!
//! A frame runs, in order:
//!
//! - configuration reconciliation ([`Context::update_state`])
//! - clear of the visible target and camera/projection matrix update
//! - the shadow pass
//! - the G-buffer pass and SSAO when deferred shading is on
//! - the lit backbuffer pass into the offscreen target
//! - bloom and the post-process composite onto the visible target
//!
//! Released GPU objects are freed after submission.

use std::time::Duration;

use crate::{
    camera::to_clip_space,
    config::Reconciliation,
    context::Context,
    gpu::{ClearFlags, FramebufferTarget, GpuDevice},
};

/// Counters of the frames rendered so far.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub last_frame_time: Duration,
    /// How often resolution dependent buffers were rebuilt.
    pub regenerations: u64,
    /// Bloom blur iterations of the last frame.
    pub blur_iterations: u32,
}

impl<D: GpuDevice> Context<D> {
    pub fn render(&mut self) -> Reconciliation {
        let start = instant::Instant::now();
        let changes = self.update_state();

        self.begin_frame();
        self.shadow_pass();
        if self.config.deferred {
            self.geometry_pass();
            if self.config.ssao {
                self.ssao_pass();
            }
        }
        self.backbuffer_pass();
        self.stats.blur_iterations = self.bloom_pass();
        self.postprocess_pass();

        self.gpu.end_frame();
        self.gpu.maintain();
        self.stats.frames += 1;
        self.stats.last_frame_time = start.elapsed();
        log::trace!("Frame {} took {:?}", self.stats.frames, self.stats.last_frame_time);
        changes
    }

    fn begin_frame(&mut self) {
        let config = &self.config;
        let flags = ClearFlags {
            color: config.clear_color_buffer,
            depth: config.clear_depth_buffer,
            stencil: config.clear_stencil_buffer,
        };
        self.gpu.bind_framebuffer(FramebufferTarget::Default);
        self.gpu.set_clear_color(config.clear_color.into());
        if !flags.is_empty() {
            self.gpu.clear(flags);
        }

        let projection = self.projection();
        self.frame.view = self.camera.calc_matrix();
        self.frame.projection = to_clip_space(projection.calc_matrix(), self.gpu.clip_space());
        self.frame.view_position = self.view_position();
    }
}
