use cgmath::Vector3;
use flow_render::{
    EngineConfig,
    camera::to_clip_space,
    data_structures::{model::Material, texture::TextureSemantic},
    gpu::{
        BlitSource, ClearFlags, FramebufferTarget, GpuDevice, ResourceId, UniformValue,
        recording::Command,
    },
    pipelines::{
        bloom::BLOOM_ITERATIONS,
        programs::ProgramKind,
        slots::{self, deferred, pbr, phong},
    },
};

mod common;
use crate::common::test_utils::{
    add_mesh, blits, environment_source, framebuffer, headless, offscreen, program, sampled_at_draws,
    small_config, uniform,
};

#[test]
fn frame_runs_every_pass_once() {
    let mut ctx = headless(small_config());
    add_mesh(&mut ctx, &[], None);
    ctx.render();

    assert_eq!(ctx.stats().frames, 1);
    assert_eq!(ctx.gpu.frames(), 1);
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Shadow)), 1);
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Phong)), 1);
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::PostProcess)), 1);
    // No environment, no skybox.
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Skybox)), 0);
    assert_eq!(ctx.gpu.bound_framebuffer(), FramebufferTarget::Default);
    assert!(ctx.gpu.undeclared_uniforms().is_empty());
}

#[test]
fn disabled_bloom_runs_no_blur_and_clears_its_buffers() {
    let config = EngineConfig {
        bloom: false,
        ..small_config()
    };
    let mut ctx = headless(config);
    ctx.render();

    assert_eq!(ctx.stats().blur_iterations, 0);
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Blur)), 0);
    for label in ["bloom_horizontal", "bloom_vertical"] {
        let cleared = Command::Clear(offscreen(&ctx, label), ClearFlags::COLOR);
        assert!(ctx.gpu.commands().contains(&cleared), "{label} cleared");
    }
    assert_eq!(
        uniform(&ctx, ProgramKind::PostProcess, "bloom"),
        Some(UniformValue::Bool(false))
    );
}

#[test]
fn bloom_alternates_between_its_buffers() {
    let mut ctx = headless(small_config());
    ctx.render();
    assert_eq!(ctx.stats().blur_iterations, BLOOM_ITERATIONS);

    let bright = ctx.offscreen().bright.id();
    let h = ctx.bloom().horizontal.texture.id();
    let v = ctx.bloom().vertical.texture.id();
    let mut expected = vec![Some(bright)];
    for i in 1..BLOOM_ITERATIONS {
        expected.push(Some(if i % 2 == 1 { h } else { v }));
    }
    let blur = program(&ctx, ProgramKind::Blur);
    assert_eq!(sampled_at_draws(&ctx.gpu, blur, slots::SOURCE), expected);

    let targets: Vec<FramebufferTarget> = ctx
        .gpu
        .draws()
        .filter(|(p, _, _)| *p == Some(blur))
        .map(|(_, target, _)| target)
        .collect();
    assert_eq!(targets[0], offscreen(&ctx, "bloom_horizontal"));
    assert_eq!(targets[1], offscreen(&ctx, "bloom_vertical"));
    assert_eq!(sampled_at_draws(&ctx.gpu, program(&ctx, ProgramKind::PostProcess), slots::postprocess::BLOOM), vec![Some(v)]);
}

#[test]
fn no_msaa_means_no_resolve() {
    let mut ctx = headless(small_config());
    add_mesh(&mut ctx, &[], None);
    ctx.render();
    assert!(blits(&ctx.gpu).is_empty());
}

#[test]
fn forward_msaa_resolves_both_color_buffers() {
    let config = EngineConfig {
        msaa: true,
        ..small_config()
    };
    let mut ctx = headless(config);
    add_mesh(&mut ctx, &[], None);
    ctx.render();

    let msaa = framebuffer(&ctx, "offscreen_msaa");
    let resolved = framebuffer(&ctx, "offscreen");
    let sources: Vec<BlitSource> = blits(&ctx.gpu)
        .into_iter()
        .map(|c| match c {
            Command::Blit { src, dst, source, .. } => {
                assert_eq!((src, dst), (msaa, resolved));
                source
            }
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(sources, vec![BlitSource::Color(0), BlitSource::Color(1)]);

    let phong = program(&ctx, ProgramKind::Phong);
    assert!(
        ctx.gpu
            .draws()
            .filter(|(p, _, _)| *p == Some(phong))
            .all(|(_, target, _)| target == FramebufferTarget::Offscreen(msaa))
    );
}

#[test]
fn deferred_shading_ignores_msaa() {
    let config = EngineConfig {
        msaa: true,
        deferred: true,
        ..small_config()
    };
    let mut ctx = headless(config);
    add_mesh(&mut ctx, &[], None);
    ctx.render();

    let copies = blits(&ctx.gpu);
    assert_eq!(copies.len(), 1);
    assert!(matches!(
        copies[0],
        Command::Blit {
            source: BlitSource::Depth,
            ..
        }
    ));
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Phong)), 0);
}

#[test]
fn disabled_shadows_skip_the_depth_draws() {
    let config = EngineConfig {
        shadows: false,
        ..small_config()
    };
    let mut ctx = headless(config);
    add_mesh(&mut ctx, &[], None);
    ctx.render();

    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Shadow)), 0);
    assert!(
        ctx.gpu
            .commands()
            .contains(&Command::Clear(offscreen(&ctx, "shadow"), ClearFlags::DEPTH))
    );
    for kind in [ProgramKind::Phong, ProgramKind::LightPass] {
        assert_eq!(uniform(&ctx, kind, "hasShadow"), Some(UniformValue::Bool(false)));
    }
}

#[test]
fn shadow_map_is_bound_for_every_forward_mesh() {
    let config = EngineConfig {
        pbr: false,
        ..small_config()
    };
    let mut ctx = headless(config);
    add_mesh(&mut ctx, &[], None);
    add_mesh(&mut ctx, &[TextureSemantic::Diffuse], None);
    ctx.render();

    let shadow_map = ctx.shadow_map().id();
    let phong = program(&ctx, ProgramKind::Phong);
    assert_eq!(
        sampled_at_draws(&ctx.gpu, phong, phong::SHADOW),
        vec![Some(shadow_map), Some(shadow_map)]
    );
    assert_eq!(uniform(&ctx, ProgramKind::Phong, "hasShadow"), Some(UniformValue::Bool(true)));
}

#[test]
fn albedo_only_mesh_gets_ibl_lighting() {
    let mut ctx = headless(small_config());
    let source = environment_source(&mut ctx.gpu);
    assert!(ctx.bake_environment(&source));
    add_mesh(&mut ctx, &[TextureSemantic::Albedo], None);
    ctx.gpu.clear_commands();
    ctx.render();

    let pbr_program = program(&ctx, ProgramKind::Pbr);
    assert_eq!(ctx.gpu.draw_count(pbr_program), 1);
    assert_eq!(uniform(&ctx, ProgramKind::Pbr, "hasAlbedo"), Some(UniformValue::Bool(true)));
    for flag in ["hasMetallic", "hasRoughness", "hasAo", "hasNormal"] {
        assert_eq!(uniform(&ctx, ProgramKind::Pbr, flag), Some(UniformValue::Bool(false)), "{flag}");
    }
    assert_eq!(uniform(&ctx, ProgramKind::Pbr, "hasIBLMaps"), Some(UniformValue::Bool(true)));

    let irradiance = ctx.ibl_maps().irradiance.as_ref().map(|t| t.id());
    assert_eq!(sampled_at_draws(&ctx.gpu, pbr_program, pbr::IRRADIANCE), vec![irradiance]);
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Skybox)), 1);
    assert!(ctx.gpu.undeclared_uniforms().is_empty());
}

#[test]
fn missing_environment_leaves_ibl_off() {
    let mut ctx = headless(small_config());
    assert!(!ctx.load_environment("no/such/environment.hdr"));
    assert!(!ctx.ibl_maps().has_maps());
    add_mesh(&mut ctx, &[TextureSemantic::Albedo], None);
    ctx.render();
    assert_eq!(uniform(&ctx, ProgramKind::Pbr, "hasIBLMaps"), Some(UniformValue::Bool(false)));
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Skybox)), 0);
}

#[test]
fn new_context_renders_pbr_until_an_environment_is_baked() {
    let mut ctx = headless(small_config());
    assert!(!ctx.ibl_maps().has_maps());
    add_mesh(&mut ctx, &[TextureSemantic::Albedo], None);
    ctx.render();
    assert_eq!(uniform(&ctx, ProgramKind::Pbr, "hasIBLMaps"), Some(UniformValue::Bool(false)));

    let source = environment_source(&mut ctx.gpu);
    assert!(ctx.bake_environment(&source));
    ctx.render();
    assert_eq!(uniform(&ctx, ProgramKind::Pbr, "hasIBLMaps"), Some(UniformValue::Bool(true)));
}

#[test]
fn mesh_shading_is_chosen_per_mesh() {
    let mut ctx = headless(small_config());
    add_mesh(&mut ctx, &[TextureSemantic::Diffuse], None);
    add_mesh(&mut ctx, &[TextureSemantic::Albedo, TextureSemantic::Metallic], None);
    ctx.render();
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Phong)), 1);
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Pbr)), 1);
}

#[test]
fn phong_mode_falls_back_to_albedo_for_diffuse() {
    let config = EngineConfig {
        pbr: false,
        ..small_config()
    };
    let mut ctx = headless(config);
    add_mesh(
        &mut ctx,
        &[TextureSemantic::Albedo],
        Some(Material::Solid {
            color: Vector3::new(0.2, 0.4, 0.6),
        }),
    );
    ctx.render();
    assert_eq!(ctx.gpu.draw_count(program(&ctx, ProgramKind::Pbr)), 0);
    assert_eq!(uniform(&ctx, ProgramKind::Phong, "hasDiffuse"), Some(UniformValue::Bool(true)));
    assert_eq!(
        uniform(&ctx, ProgramKind::Phong, "obj_color"),
        Some(UniformValue::Vec3([0.2, 0.4, 0.6]))
    );
}

#[test]
fn deferred_frame_fills_gbuffer_and_occlusion() {
    let config = EngineConfig {
        deferred: true,
        ssao: true,
        debug_lights: true,
        ..small_config()
    };
    let mut ctx = headless(config);
    ctx.lights.add_default_point_light();
    ctx.lights.add_default_spot_light();
    add_mesh(&mut ctx, &[TextureSemantic::Diffuse], None);
    add_mesh(&mut ctx, &[], None);
    ctx.render();

    let gpu = &ctx.gpu;
    assert_eq!(gpu.draw_count(program(&ctx, ProgramKind::GBuffer)), 2);
    assert_eq!(gpu.draw_count(program(&ctx, ProgramKind::Ssao)), 1);
    assert_eq!(gpu.draw_count(program(&ctx, ProgramKind::SsaoBlur)), 1);
    assert_eq!(gpu.draw_count(program(&ctx, ProgramKind::LightPass)), 1);
    assert_eq!(gpu.draw_count(program(&ctx, ProgramKind::LightCube)), 2);
    assert_eq!(uniform(&ctx, ProgramKind::LightPass, "hasSsao"), Some(UniformValue::Bool(true)));
    assert_eq!(
        uniform(&ctx, ProgramKind::LightPass, "pointLightsSize"),
        Some(UniformValue::Int(1))
    );

    let light_pass = program(&ctx, ProgramKind::LightPass);
    assert_eq!(
        sampled_at_draws(gpu, light_pass, deferred::SSAO),
        vec![Some(ctx.ssao().output().id())]
    );
    assert_eq!(
        sampled_at_draws(gpu, light_pass, deferred::POSITION),
        vec![Some(ctx.gbuffer().position.id())]
    );
    let gbuffer = framebuffer(&ctx, "G-buffer");
    assert!(
        gpu.draws()
            .filter(|(p, _, _)| *p == Some(program(&ctx, ProgramKind::GBuffer)))
            .all(|(_, target, _)| target == FramebufferTarget::Offscreen(gbuffer))
    );
    assert!(gpu.undeclared_uniforms().is_empty());
}

#[test]
fn ssao_kernel_is_reproducible() {
    let a = headless(small_config());
    let b = headless(small_config());
    assert_eq!(a.ssao().kernel(), b.ssao().kernel());
    assert!(a.ssao().kernel().iter().all(|s| s.z >= 0.0));
}

#[test]
fn clear_flags_select_the_buffers_cleared() {
    let config = EngineConfig {
        clear_color_buffer: true,
        clear_depth_buffer: false,
        clear_stencil_buffer: false,
        ..small_config()
    };
    let mut ctx = headless(config);
    ctx.gpu.clear_commands();
    ctx.render();
    let frame_start: Vec<&Command> = ctx
        .gpu
        .commands()
        .iter()
        .take_while(|c| !matches!(c, Command::Viewport(..)))
        .collect();
    assert!(frame_start.contains(&&Command::Clear(FramebufferTarget::Default, ClearFlags::COLOR)));

    ctx.configure(|c| c.clear_color_buffer = false);
    ctx.render();
    ctx.gpu.clear_commands();
    ctx.render();
    assert!(
        ctx.gpu
            .commands()
            .iter()
            .take_while(|c| !matches!(c, Command::Viewport(..)))
            .all(|c| !matches!(c, Command::Clear(..)))
    );
}

#[test]
fn terminate_releases_everything_newest_first() {
    let mut ctx = headless(small_config());
    let source = environment_source(&mut ctx.gpu);
    ctx.bake_environment(&source);
    drop(source);
    add_mesh(&mut ctx, &[TextureSemantic::Albedo], None);
    ctx.render();
    ctx.gpu.clear_commands();

    let programs: Vec<_> = ProgramKind::ALL.iter().map(|kind| program(&ctx, *kind)).collect();
    let gpu = ctx.terminate();
    let released: Vec<u64> = gpu.released().iter().map(|id| id.sequence()).collect();
    assert!(!released.is_empty());
    assert!(released.windows(2).all(|w| w[0] > w[1]));
    for id in programs {
        assert!(gpu.released().contains(&ResourceId::Program(id)), "{id:?} released");
    }
    assert_eq!(gpu.live_resources(), 0);
}

#[test]
fn frame_projection_matches_the_context_projection() {
    let mut ctx = headless(small_config());
    ctx.configure(|c| {
        c.fov = 60.0;
        c.far_plane = 40.0;
    });
    ctx.render();
    let expected = to_clip_space(ctx.projection().calc_matrix(), ctx.gpu.clip_space());
    assert_eq!(ctx.frame_matrices().projection, expected);
}

#[test]
fn command_log_can_be_drained_per_frame() {
    let mut ctx = headless(small_config());
    add_mesh(&mut ctx, &[], None);
    ctx.render();
    let first = ctx.gpu.take_commands();
    assert!(ctx.gpu.commands().is_empty());

    ctx.render();
    let second = ctx.gpu.take_commands();
    let end_frames = second.iter().filter(|c| matches!(c, Command::EndFrame)).count();
    assert_eq!(end_frames, 1);
    // Setup commands are only part of the first capture.
    assert!(second.len() < first.len());
    assert_eq!(ctx.gpu.frames(), 2);
}
