use flow_render::{
    gpu::{
        SamplerDecl, TextureDimension, UniformDecl, UniformKind,
        wgpu_backend::{UniformLayout, sample_count, wgsl_field_name},
    },
    pipelines::programs::ProgramKind,
};

fn decl(name: &str, kind: UniformKind) -> UniformDecl {
    UniformDecl {
        name: name.to_string(),
        kind,
    }
}

#[test]
fn dotted_names_become_wgsl_fields() {
    assert_eq!(wgsl_field_name("pointLights[2].position"), "pointLights_2_position");
    assert_eq!(wgsl_field_name("material.albedo"), "material_albedo");
    assert_eq!(wgsl_field_name("samples[63]"), "samples_63");
    assert_eq!(wgsl_field_name("viewPos"), "viewPos");
}

#[test]
fn fields_follow_uniform_alignment() {
    let layout = UniformLayout::new(
        &[
            decl("viewPos", UniformKind::Vec3),
            decl("exposure", UniformKind::Float),
            decl("model", UniformKind::Mat4),
        ],
        &[],
    );
    // A scalar packs into the tail of a vec3, matrices start on 16 bytes.
    assert_eq!(layout.offset_of("viewPos"), Some(0));
    assert_eq!(layout.offset_of("exposure"), Some(12));
    assert_eq!(layout.offset_of("model"), Some(16));
    assert_eq!(layout.size(), 80);
    assert_eq!(layout.offset_of("missing"), None);
}

#[test]
fn size_rounds_up_to_sixteen_bytes() {
    let layout = UniformLayout::new(
        &[decl("hasShadow", UniformKind::Bool), decl("gamma", UniformKind::Bool)],
        &[],
    );
    assert_eq!(layout.size(), 16);
    assert!(layout.declarations().contains("hasShadow: u32"));
}

#[test]
fn empty_block_keeps_a_placeholder() {
    let layout = UniformLayout::new(&[], &[]);
    assert_eq!(layout.size(), 16);
    assert!(layout.declarations().contains("reserved: vec4<f32>"));
}

#[test]
fn samplers_take_consecutive_bindings() {
    let samplers = [
        SamplerDecl {
            slot: 0,
            dimension: TextureDimension::D2,
            depth: false,
        },
        SamplerDecl {
            slot: 5,
            dimension: TextureDimension::Cube,
            depth: false,
        },
        SamplerDecl {
            slot: 8,
            dimension: TextureDimension::D2,
            depth: true,
        },
    ];
    let layout = UniformLayout::new(&[decl("roughness", UniformKind::Float)], &samplers);
    let wgsl = layout.declarations();
    assert!(wgsl.contains("@group(0) @binding(1) var t_0: texture_2d<f32>;"));
    assert!(wgsl.contains("@group(0) @binding(2) var s_0: sampler;"));
    assert!(wgsl.contains("@group(0) @binding(3) var t_5: texture_cube<f32>;"));
    assert!(wgsl.contains("@group(0) @binding(5) var t_8: texture_depth_2d;"));
    assert!(wgsl.contains("@group(0) @binding(6) var s_8: sampler_comparison;"));
}

#[test]
fn every_program_contract_has_a_layout() {
    for kind in ProgramKind::ALL {
        let contract = kind.contract();
        let layout = UniformLayout::new(&contract.uniforms, &contract.samplers);
        assert_eq!(layout.size() % 16, 0, "{}", kind.label());
        for uniform in &contract.uniforms {
            assert!(layout.offset_of(&uniform.name).is_some(), "{} {}", kind.label(), uniform.name);
        }
    }
}

#[test]
fn multisampled_attachments_use_four_samples() {
    assert_eq!(sample_count(0), 1);
    assert_eq!(sample_count(1), 1);
    for requested in [2, 4, 8] {
        assert_eq!(sample_count(requested), 4);
    }
}
