//! Pipeline data structures: textures, render targets, lights and scenes.
//!
//! - `texture` holds the GPU texture family and its configuration record
//! - `render_target` holds framebuffers and render buffers
//! - `gbuffer` is the multi-attachment target of deferred shading
//! - `light` holds the light variants and the bounded light registry
//! - `model` contains mesh and material definitions consumed by the passes
//! - `transform` holds position/rotation/scale and their composition

pub mod gbuffer;
pub mod light;
pub mod model;
pub mod render_target;
pub mod texture;
pub mod transform;
