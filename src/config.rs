//! Engine tunables and their per-frame reconciliation.
//!
//! Two [`EngineConfig`] snapshots exist at runtime: the *applied* one the
//! pipeline renders with and the *desired* one that control surfaces mutate
//! (see [`Context::configure`](crate::context::Context::configure)). Once per
//! frame [`reconcile`] walks the declarative [`ConfigField`] table, copies
//! every changed field and collects the side effects the change requires.
//! Buffer regeneration is reported once, no matter how many fields asked for it.

use std::path::Path;

use anyhow::Context as _;
use cgmath::{Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Largest MSAA sample count the targets are allocated with.
pub const MAX_SAMPLES: u32 = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub light_direction: Vector3<f32>,
    pub light_ambient: f32,
    pub light_diffuse: f32,
    pub light_specular: f32,
    /// Blinn-Phong instead of Phong specular.
    pub blinn: bool,

    pub clear_color: Vector4<f32>,
    pub clear_color_buffer: bool,
    pub clear_depth_buffer: bool,
    pub clear_stencil_buffer: bool,

    pub near_plane: f32,
    pub far_plane: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,

    pub render_width: u32,
    pub render_height: u32,
    pub screen_width: u32,
    pub screen_height: u32,

    pub msaa: bool,
    pub msaa_multiplier: u32,

    pub shadows: bool,
    pub shadow_width: u32,
    pub shadow_height: u32,

    pub hdr: bool,
    pub exposure: f32,
    pub bloom: bool,

    pub pbr: bool,
    pub deferred: bool,
    pub ssao: bool,
    /// Draw a small cube at every point/spot light.
    pub debug_lights: bool,

    pub sharpen: bool,
    pub sharpness: f32,
    pub blur: bool,
    pub grayscale: bool,

    /// World offset applied to every scene.
    pub object_position: Vector3<f32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            light_direction: Vector3::new(-4.0, -2.0, -3.0),
            light_ambient: 0.1,
            light_diffuse: 0.5,
            light_specular: 1.0,
            blinn: false,
            clear_color: Vector4::new(0.2, 0.1, 0.15, 1.0),
            clear_color_buffer: true,
            clear_depth_buffer: true,
            clear_stencil_buffer: true,
            near_plane: 0.1,
            far_plane: 100.0,
            fov: 45.0,
            render_width: 1280,
            render_height: 720,
            screen_width: 1280,
            screen_height: 720,
            msaa: false,
            msaa_multiplier: 4,
            shadows: true,
            shadow_width: 1024,
            shadow_height: 1024,
            hdr: true,
            exposure: 1.0,
            bloom: true,
            pbr: true,
            deferred: false,
            ssao: false,
            debug_lights: false,
            sharpen: false,
            sharpness: 1.0,
            blur: false,
            grayscale: false,
            object_position: Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Invalid engine configuration")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read engine configuration {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_aspect(&self) -> f32 {
        self.render_width.max(1) as f32 / self.render_height.max(1) as f32
    }

    /// Sample count the multisample targets are allocated with: the
    /// multiplier rounded down to a power of two no larger than [`MAX_SAMPLES`].
    pub fn msaa_samples(&self) -> u32 {
        let m = self.msaa_multiplier.clamp(1, MAX_SAMPLES);
        1 << (u32::BITS - 1 - m.leading_zeros())
    }

    /// Sample count the backbuffer renders with, 1 when MSAA is off.
    pub fn samples(&self) -> u32 {
        if self.msaa { self.msaa_samples() } else { 1 }
    }
}

/// Resource call a field change triggers right away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Targeted {
    /// Push direction/colors into the directional light.
    SunLight,
    ShadowResize,
    ScreenResize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldEffect {
    /// Plain copy, read by the passes on the next frame.
    Copy,
    Targeted(Targeted),
    /// Resolution-dependent buffers must be rebuilt.
    Regenerate,
}

macro_rules! config_fields {
    ($($variant:ident => [$($field:ident),+] => $effect:expr),* $(,)?) => {
        /// Reconciliation unit. Each variant covers one or more [`EngineConfig`] fields.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum ConfigField {
            $($variant),*
        }

        impl ConfigField {
            /// Every field in reconciliation order. Gate fields precede what they gate.
            pub const ALL: &'static [ConfigField] = &[$(ConfigField::$variant),*];

            pub fn effect(&self) -> FieldEffect {
                match self {
                    $(ConfigField::$variant => $effect),*
                }
            }

            /// Names of the [`EngineConfig`] fields this entry covers.
            pub fn struct_fields(&self) -> &'static [&'static str] {
                match self {
                    $(ConfigField::$variant => &[$(stringify!($field)),+]),*
                }
            }

            pub fn differs(&self, a: &EngineConfig, b: &EngineConfig) -> bool {
                match self {
                    $(ConfigField::$variant => false $(|| a.$field != b.$field)+),*
                }
            }

            fn copy(&self, from: &EngineConfig, to: &mut EngineConfig) {
                match self {
                    $(ConfigField::$variant => { $(to.$field = from.$field;)+ }),*
                }
            }
        }
    };
}

config_fields! {
    ClearColor => [clear_color] => FieldEffect::Copy,
    ClearFlags => [clear_color_buffer, clear_depth_buffer, clear_stencil_buffer] => FieldEffect::Copy,
    DebugLights => [debug_lights] => FieldEffect::Copy,
    ObjectPosition => [object_position] => FieldEffect::Copy,
    LightDirection => [light_direction] => FieldEffect::Targeted(Targeted::SunLight),
    LightAmbient => [light_ambient] => FieldEffect::Targeted(Targeted::SunLight),
    LightDiffuse => [light_diffuse] => FieldEffect::Targeted(Targeted::SunLight),
    LightSpecular => [light_specular] => FieldEffect::Targeted(Targeted::SunLight),
    Blinn => [blinn] => FieldEffect::Copy,
    Projection => [near_plane, far_plane, fov] => FieldEffect::Copy,
    Sharpen => [sharpen] => FieldEffect::Copy,
    Sharpness => [sharpness] => FieldEffect::Copy,
    Blur => [blur] => FieldEffect::Copy,
    Grayscale => [grayscale] => FieldEffect::Copy,
    Shadows => [shadows] => FieldEffect::Copy,
    ShadowResolution => [shadow_width, shadow_height] => FieldEffect::Targeted(Targeted::ShadowResize),
    Msaa => [msaa] => FieldEffect::Regenerate,
    Pbr => [pbr] => FieldEffect::Regenerate,
    MsaaMultiplier => [msaa_multiplier] => FieldEffect::Regenerate,
    RenderResolution => [render_width, render_height] => FieldEffect::Regenerate,
    Hdr => [hdr] => FieldEffect::Regenerate,
    Bloom => [bloom] => FieldEffect::Regenerate,
    Exposure => [exposure] => FieldEffect::Copy,
    Deferred => [deferred] => FieldEffect::Regenerate,
    Ssao => [ssao] => FieldEffect::Regenerate,
    ScreenResolution => [screen_width, screen_height] => FieldEffect::Targeted(Targeted::ScreenResize),
}

impl ConfigField {
    /// Some fields only apply while a feature is on, judged on the already applied value.
    pub fn gate_open(&self, applied: &EngineConfig) -> bool {
        match self {
            ConfigField::ShadowResolution => applied.shadows,
            ConfigField::MsaaMultiplier => applied.msaa,
            ConfigField::Exposure => applied.hdr,
            _ => true,
        }
    }
}

/// What one reconciliation changed and which resource work it asks for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciliation {
    pub changed: Vec<ConfigField>,
    /// Edits discarded because their gate was closed.
    pub dropped: Vec<ConfigField>,
    pub sun_changed: bool,
    pub shadow_resize: Option<(u32, u32)>,
    pub screen_resize: Option<(u32, u32)>,
    pub regenerate: bool,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.dropped.is_empty()
    }
}

/// Copies `desired` into `applied` field by field, then re-synchronises `desired`.
pub fn reconcile(applied: &mut EngineConfig, desired: &mut EngineConfig) -> Reconciliation {
    let mut result = Reconciliation::default();
    for field in ConfigField::ALL {
        if !field.differs(applied, desired) {
            continue;
        }
        if !field.gate_open(applied) {
            result.dropped.push(*field);
            continue;
        }
        field.copy(desired, applied);
        result.changed.push(*field);
        if *field == ConfigField::MsaaMultiplier && applied.msaa_samples() != applied.msaa_multiplier {
            log::warn!(
                "MSAA multiplier {} is not a supported sample count, using {}",
                applied.msaa_multiplier,
                applied.msaa_samples()
            );
        }
        match field.effect() {
            FieldEffect::Copy => (),
            FieldEffect::Targeted(Targeted::SunLight) => result.sun_changed = true,
            FieldEffect::Targeted(Targeted::ShadowResize) => {
                result.shadow_resize = Some((applied.shadow_width, applied.shadow_height))
            }
            FieldEffect::Targeted(Targeted::ScreenResize) => {
                result.screen_resize = Some((applied.screen_width, applied.screen_height))
            }
            FieldEffect::Regenerate => result.regenerate = true,
        }
    }
    *desired = applied.clone();
    result
}
