#![allow(dead_code)]

use std::rc::Rc;

use flow_render::{
    Context, EngineConfig,
    data_structures::{
        model::{Material, Mesh, Scene},
        texture::{TextureConfig, TextureResource, TextureSemantic},
    },
    gpu::{
        FramebufferId, FramebufferTarget, GpuDevice, ProgramId, UniformValue,
        recording::{Command, RecordingDevice},
    },
    pipelines::programs::{ProgramKind, ShaderLibrary},
    resources::{shapes, texture::ImageData},
};

/// Small targets keep the recorded descriptors readable.
pub fn small_config() -> EngineConfig {
    EngineConfig {
        render_width: 64,
        render_height: 48,
        screen_width: 64,
        screen_height: 48,
        shadow_width: 32,
        shadow_height: 32,
        ..Default::default()
    }
}

pub fn headless(config: EngineConfig) -> Context<RecordingDevice> {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::new(RecordingDevice::new(), &ShaderLibrary::headless(), config).expect("headless context")
}

pub fn program(ctx: &Context<RecordingDevice>, kind: ProgramKind) -> ProgramId {
    ctx.shaders().get(kind).id()
}

pub fn uniform(ctx: &Context<RecordingDevice>, kind: ProgramKind, name: &str) -> Option<UniformValue> {
    ctx.gpu.uniform(program(ctx, kind), name)
}

pub fn framebuffer(ctx: &Context<RecordingDevice>, label: &str) -> FramebufferId {
    ctx.gpu
        .framebuffer_by_label(label)
        .unwrap_or_else(|| panic!("no framebuffer labelled {label}"))
}

pub fn offscreen(ctx: &Context<RecordingDevice>, label: &str) -> FramebufferTarget {
    FramebufferTarget::Offscreen(framebuffer(ctx, label))
}

pub fn solid_texture(gpu: &mut impl GpuDevice, label: &str, color: [u8; 4]) -> Rc<TextureResource> {
    Rc::new(TextureResource::from_image(
        gpu,
        label,
        &ImageData::solid(4, 4, color),
        TextureConfig::default(),
    ))
}

/// Tiny HDR stand-in for an equirectangular environment.
pub fn environment_source(gpu: &mut impl GpuDevice) -> TextureResource {
    let image = ImageData::Rgba32F {
        width: 8,
        height: 4,
        pixels: vec![0.5; 8 * 4 * 4],
    };
    TextureResource::from_image(
        gpu,
        "sky",
        &image,
        TextureConfig {
            hdr: true,
            srgb: false,
            ..Default::default()
        },
    )
}

pub fn cube_with(gpu: &mut impl GpuDevice, maps: &[TextureSemantic]) -> Mesh {
    let mut mesh = Mesh::new(gpu, &shapes::cube());
    for semantic in maps {
        let texture = solid_texture(gpu, &format!("{semantic:?}"), [200, 120, 40, 255]);
        mesh = mesh.with_texture(*semantic, texture);
    }
    mesh
}

pub fn add_mesh(ctx: &mut Context<RecordingDevice>, maps: &[TextureSemantic], material: Option<Material>) {
    let mut mesh = cube_with(&mut ctx.gpu, maps);
    mesh.material = material;
    ctx.add_scene(Scene::new().with_mesh(mesh));
}

/// Texture bound at `slot` whenever `program` issued a draw, in draw order.
pub fn sampled_at_draws(gpu: &RecordingDevice, program: ProgramId, slot: u32) -> Vec<Option<flow_render::gpu::TextureId>> {
    let mut bound = None;
    let mut active = None;
    let mut sampled = Vec::new();
    for command in gpu.commands() {
        match command {
            Command::BindTexture(s, id) if *s == slot => bound = Some(*id),
            Command::UseProgram(p) => active = Some(*p),
            Command::Draw { .. } if active == Some(program) => sampled.push(bound),
            _ => (),
        }
    }
    sampled
}

pub fn blits(gpu: &RecordingDevice) -> Vec<Command> {
    gpu.commands()
        .iter()
        .filter(|c| matches!(c, Command::Blit { .. }))
        .cloned()
        .collect()
}
