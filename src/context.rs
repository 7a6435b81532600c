use cgmath::{Deg, Vector3};

use crate::{
    camera::{Camera, Projection},
    config::{EngineConfig, Reconciliation, reconcile},
    data_structures::{
        gbuffer::GBuffer,
        light::{DirectionalLight, LightRegistry},
        model::{Mesh, Scene},
    },
    gpu::GpuDevice,
    pipelines::{
        backbuffer::{FrameMatrices, Offscreen},
        bloom::BloomPass,
        ibl::{CaptureTarget, IblMaps},
        programs::{ShaderLibrary, ShaderSet},
        shadow::ShadowPass,
        ssao::SsaoPass,
    },
    render::FrameStats,
    resources::shapes,
};

/// Built-in meshes every pass can draw.
#[derive(Debug)]
pub struct Shapes {
    pub cube: Mesh,
    pub quad: Mesh,
}

/// Owns the device, every pipeline resource and the scene state.
///
/// Configuration edits go through [`configure`](Self::configure) and are
/// applied at the start of the next [`render`](Self::render).
pub struct Context<D: GpuDevice> {
    pub gpu: D,
    pub camera: Camera,
    pub lights: LightRegistry,
    pub scenes: Vec<Scene>,
    pub(crate) config: EngineConfig,
    pub(crate) desired: EngineConfig,
    pub(crate) shaders: ShaderSet,
    pub(crate) shapes: Shapes,
    pub(crate) shadow: ShadowPass,
    pub(crate) offscreen: Offscreen,
    pub(crate) gbuffer: GBuffer,
    pub(crate) ssao: SsaoPass,
    pub(crate) bloom: BloomPass,
    pub(crate) ibl: IblMaps,
    pub(crate) capture: Option<CaptureTarget>,
    pub(crate) frame: FrameMatrices,
    pub(crate) stats: FrameStats,
}

fn sun_from(config: &EngineConfig) -> DirectionalLight {
    DirectionalLight::new(
        config.light_direction,
        config.light_ambient,
        config.light_diffuse,
        config.light_specular,
    )
}

impl<D: GpuDevice> Context<D> {
    /// Compiles the programs and allocates every pass target.
    ///
    /// Image based lighting is not baked here. Call
    /// [`load_environment`](Self::load_environment) or
    /// [`bake_environment`](Self::bake_environment) once an environment is
    /// available, until then PBR shading runs without ambient maps.
    pub fn new(mut gpu: D, library: &ShaderLibrary, config: EngineConfig) -> anyhow::Result<Self> {
        log::info!("Pipeline setup");
        let shaders = ShaderSet::new(&mut gpu, library)?;
        let (w, h) = (config.render_width, config.render_height);

        let shapes = Shapes {
            cube: Mesh::new(&mut gpu, &shapes::cube()),
            quad: Mesh::new(&mut gpu, &shapes::quad()),
        };
        let shadow = ShadowPass::new(&mut gpu, config.shadow_width, config.shadow_height);
        let offscreen = Offscreen::new(&mut gpu, &config);
        let gbuffer = GBuffer::new(&mut gpu, w, h);
        let ssao = SsaoPass::new(&mut gpu, &shaders.ssao, w, h);
        let bloom = BloomPass::new(&mut gpu, &config);
        gpu.resize_screen(config.screen_width, config.screen_height);

        log::info!("Pipeline ready at {w}x{h}");
        Ok(Self {
            gpu,
            camera: Camera::default(),
            lights: LightRegistry::new(sun_from(&config)),
            scenes: Vec::new(),
            desired: config.clone(),
            config,
            shaders,
            shapes,
            shadow,
            offscreen,
            gbuffer,
            ssao,
            bloom,
            ibl: IblMaps::default(),
            capture: None,
            frame: FrameMatrices::default(),
            stats: FrameStats::default(),
        })
    }

    /// The configuration the last frame rendered with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pending edits, applied on the next frame.
    pub fn desired(&self) -> &EngineConfig {
        &self.desired
    }

    pub fn configure(&mut self, edit: impl FnOnce(&mut EngineConfig)) {
        edit(&mut self.desired);
    }

    pub fn add_scene(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn ibl_maps(&self) -> &IblMaps {
        &self.ibl
    }

    pub fn shaders(&self) -> &ShaderSet {
        &self.shaders
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn frame_matrices(&self) -> &FrameMatrices {
        &self.frame
    }

    pub fn shadow_map(&self) -> &crate::data_structures::texture::TextureResource {
        &self.shadow.map
    }

    pub fn offscreen(&self) -> &Offscreen {
        &self.offscreen
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn bloom(&self) -> &BloomPass {
        &self.bloom
    }

    pub fn ssao(&self) -> &SsaoPass {
        &self.ssao
    }

    pub fn projection(&self) -> Projection {
        Projection::new(
            self.config.render_width,
            self.config.render_height,
            Deg(self.config.fov),
            self.config.near_plane,
            self.config.far_plane,
        )
    }

    /// Applies pending configuration edits and the resource work they need.
    pub fn update_state(&mut self) -> Reconciliation {
        let changes = reconcile(&mut self.config, &mut self.desired);
        if !changes.changed.is_empty() {
            log::debug!("Configuration changed: {:?} (regenerate {})", changes.changed, changes.regenerate);
        }
        for field in &changes.dropped {
            log::debug!("{field:?} edit dropped, its feature is disabled");
        }
        if changes.sun_changed {
            *self.lights.sun_mut() = sun_from(&self.config);
        }
        if let Some((w, h)) = changes.shadow_resize {
            self.shadow.resize(&mut self.gpu, w, h);
        }
        if changes.regenerate {
            self.regenerate_buffers();
        }
        if let Some((w, h)) = changes.screen_resize {
            self.gpu.resize_screen(w, h);
        }
        changes
    }

    /// Rebuilds every resolution or format dependent buffer from the applied config.
    pub fn regenerate_buffers(&mut self) {
        let (w, h) = (self.config.render_width, self.config.render_height);
        self.offscreen.regenerate(&mut self.gpu, &self.config);
        self.gbuffer.resize(&mut self.gpu, w, h);
        self.ssao.resize(&mut self.gpu, w, h);
        self.bloom.regenerate(&mut self.gpu, &self.config);
        self.stats.regenerations += 1;
        if self.config.msaa && self.config.deferred {
            log::warn!("MSAA is ignored while deferred shading is on");
        }
        log::info!(
            "Buffers regenerated at {w}x{h} (msaa {}, hdr {}, deferred {})",
            self.config.samples(),
            self.config.hdr,
            self.config.deferred
        );
    }

    /// Releases every GPU resource newest first and hands the device back.
    pub fn terminate(self) -> D {
        let Context {
            mut gpu,
            shaders,
            scenes,
            shapes,
            shadow,
            offscreen,
            gbuffer,
            ssao,
            bloom,
            ibl,
            capture,
            ..
        } = self;
        drop((scenes, ibl, capture, bloom, ssao, gbuffer, offscreen, shadow, shapes, shaders));
        gpu.maintain();
        log::info!("Pipeline terminated");
        gpu
    }

    pub(crate) fn view_position(&self) -> Vector3<f32> {
        Vector3::new(self.camera.position.x, self.camera.position.y, self.camera.position.z)
    }
}
