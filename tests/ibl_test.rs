use flow_render::{
    gpu::{
        ClipSpace, GpuDevice, TextureDimension, TextureFormat, UniformValue,
        recording::{Command, RecordingDevice},
    },
    pipelines::{
        ibl::{
            BRDF_LUT_SIZE, ENVIRONMENT_SIZE, IRRADIANCE_SIZE, PREFILTER_MIP_LEVELS, PREFILTER_SIZE,
            capture_projection, capture_views, prefilter_roughness,
        },
        programs::ProgramKind,
    },
};

mod common;
use crate::common::test_utils::{environment_source, headless, program, small_config};

fn baked() -> flow_render::Context<RecordingDevice> {
    let mut ctx = headless(small_config());
    let source = environment_source(&mut ctx.gpu);
    ctx.gpu.clear_commands();
    assert!(ctx.bake_environment(&source));
    ctx
}

#[test]
fn maps_have_their_fixed_sizes() {
    let ctx = baked();
    let maps = ctx.ibl_maps();
    assert!(maps.has_maps());

    let environment = maps.environment.as_ref().expect("environment baked");
    assert_eq!(environment.desc().dimension, TextureDimension::Cube);
    assert_eq!(environment.width(), ENVIRONMENT_SIZE);
    assert_eq!(environment.mip_levels(), 1);

    let irradiance = maps.irradiance.as_ref().expect("irradiance baked");
    assert_eq!(irradiance.width(), IRRADIANCE_SIZE);
    assert_eq!(irradiance.format(), TextureFormat::Rgba16Float);

    let prefilter = maps.prefilter.as_ref().expect("prefilter baked");
    assert_eq!(prefilter.mip_levels(), PREFILTER_MIP_LEVELS);
    for mip in 0..PREFILTER_MIP_LEVELS {
        let size = PREFILTER_SIZE >> mip;
        assert_eq!(prefilter.mip_extent(mip), (size, size));
    }

    let brdf = maps.brdf_lut.as_ref().expect("brdf lut baked");
    assert_eq!(brdf.format(), TextureFormat::Rg16Float);
    assert_eq!((brdf.width(), brdf.height()), (BRDF_LUT_SIZE, BRDF_LUT_SIZE));
}

#[test]
fn every_capture_face_is_drawn() {
    let ctx = baked();
    let gpu = &ctx.gpu;
    assert_eq!(gpu.draw_count(program(&ctx, ProgramKind::EquirectToCube)), 6);
    assert_eq!(gpu.draw_count(program(&ctx, ProgramKind::Irradiance)), 6);
    assert_eq!(
        gpu.draw_count(program(&ctx, ProgramKind::Prefilter)),
        6 * PREFILTER_MIP_LEVELS as usize
    );
    assert_eq!(gpu.draw_count(program(&ctx, ProgramKind::BrdfLut)), 1);

    let viewports: Vec<u32> = gpu
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::Viewport(w, _) => Some(*w),
            _ => None,
        })
        .collect();
    assert_eq!(viewports, vec![1024, 64, 128, 64, 32, 16, 8, 1024]);
    assert!(gpu.undeclared_uniforms().is_empty());
    assert!(gpu.framebuffer_by_label("capture").is_some());
}

#[test]
fn prefilter_roughness_rises_per_mip() {
    let ctx = baked();
    let prefilter = program(&ctx, ProgramKind::Prefilter);
    let roughness: Vec<f32> = ctx
        .gpu
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::SetUniform(p, name, UniformValue::Float(r)) if *p == prefilter && name == "roughness" => Some(*r),
            _ => None,
        })
        .collect();
    assert_eq!(roughness, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    assert_eq!(prefilter_roughness(PREFILTER_MIP_LEVELS - 1), 1.0);
}

#[test]
fn baking_is_deterministic() {
    let a = baked();
    let b = baked();
    let strip = |gpu: &RecordingDevice| -> Vec<String> {
        gpu.commands()
            .iter()
            .filter_map(|c| match c {
                Command::Draw { .. } | Command::Viewport(..) | Command::SetUniform(..) => {
                    Some(format!("{c:?}"))
                }
                _ => None,
            })
            .collect()
    };
    assert_eq!(strip(&a.gpu), strip(&b.gpu));
}

#[test]
fn rebaking_replaces_the_maps() {
    let mut ctx = baked();
    let first = ctx.ibl_maps().irradiance.as_ref().map(|t| t.id());
    let source = environment_source(&mut ctx.gpu);
    assert!(ctx.bake_environment(&source));
    ctx.gpu.maintain();
    let second = ctx.ibl_maps().irradiance.as_ref().map(|t| t.id());
    assert_ne!(first, second);
    let first = first.expect("first bake");
    assert!(ctx.gpu.texture(first).is_none());
}

#[test]
fn capture_cameras_cover_the_cube() {
    let views = capture_views();
    assert_eq!(views.len(), 6);
    for (i, a) in views.iter().enumerate() {
        for b in &views[i + 1..] {
            assert_ne!(a, b);
        }
    }
    let gl = capture_projection(ClipSpace::NegativeOneToOne);
    let wgpu = capture_projection(ClipSpace::ZeroToOne);
    assert_ne!(gl, wgpu);
    // Square 90 degree frustum.
    assert!((gl.x.x - 1.0).abs() < 1e-6 && (gl.y.y - 1.0).abs() < 1e-6);
}
