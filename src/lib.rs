//! flow-render
//!
//! A multi-pass real-time renderer: directional shadow mapping, optional
//! deferred shading with SSAO, Phong or physically based lighting with image
//! based ambient light, bloom and a tone-mapping post-process composite. All
//! passes are written against the small [`gpu::GpuDevice`] command surface,
//! which ships with a wgpu implementation and a headless recording one.
//!
//! High-level modules
//! - `camera`: fly camera and perspective projection
//! - `config`: engine tunables and their per-frame reconciliation
//! - `context`: owner of the device, pipeline resources and scene state
//! - `data_structures`: textures, render targets, lights and meshes
//! - `gpu`: device abstraction, resource handles and the two backends
//! - `pipelines`: the render passes and their shader contracts
//! - `resources`: image decoding, mip chains, built-in shapes, tangents
//! - `render`: per-frame pass sequencing
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod gpu;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use config::EngineConfig;
pub use context::Context;

/// Installs `env_logger` unless a logger is already set.
pub fn init_logger() {
    if let Err(e) = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init() {
        log::warn!("Logger already initialised: {e}");
    }
}
