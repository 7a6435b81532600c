use std::collections::HashMap;

use cgmath::Vector3;
use flow_render::{
    EngineConfig,
    config::{ConfigField, FieldEffect, reconcile},
    gpu::recording::Command,
};

mod common;
use crate::common::test_utils::{headless, small_config};

#[test]
fn every_field_is_classified_exactly_once() {
    let json = serde_json::to_value(EngineConfig::default()).expect("config serializes");
    let fields: Vec<&String> = json.as_object().expect("config is an object").keys().collect();

    let mut classified: HashMap<&str, usize> = HashMap::new();
    for entry in ConfigField::ALL {
        for name in entry.struct_fields() {
            *classified.entry(name).or_default() += 1;
        }
    }
    for field in &fields {
        assert_eq!(classified.get(field.as_str()), Some(&1), "{field} classified once");
    }
    assert_eq!(classified.len(), fields.len());
}

#[test]
fn regenerating_fields_are_the_resolution_and_format_ones() {
    let regenerating: Vec<ConfigField> = ConfigField::ALL
        .iter()
        .copied()
        .filter(|f| f.effect() == FieldEffect::Regenerate)
        .collect();
    for field in [
        ConfigField::RenderResolution,
        ConfigField::Msaa,
        ConfigField::MsaaMultiplier,
        ConfigField::Hdr,
        ConfigField::Bloom,
        ConfigField::Deferred,
    ] {
        assert!(regenerating.contains(&field), "{field:?} regenerates");
    }
    assert_eq!(ConfigField::ObjectPosition.effect(), FieldEffect::Copy);
}

#[test]
fn object_position_only_copies() {
    let mut applied = EngineConfig::default();
    let mut desired = applied.clone();
    desired.object_position = Vector3::new(1.0, 2.0, 3.0);
    let changes = reconcile(&mut applied, &mut desired);
    assert_eq!(changes.changed, vec![ConfigField::ObjectPosition]);
    assert!(!changes.regenerate);
    assert_eq!(applied.object_position, Vector3::new(1.0, 2.0, 3.0));
}

#[test]
fn unchanged_config_reconciles_to_nothing() {
    let mut applied = EngineConfig::default();
    let mut desired = applied.clone();
    assert!(reconcile(&mut applied, &mut desired).is_empty());
}

#[test]
fn gated_edits_are_dropped() {
    let mut applied = EngineConfig {
        shadows: false,
        hdr: false,
        msaa: false,
        ..Default::default()
    };
    let mut desired = applied.clone();
    desired.shadow_width = 4096;
    desired.exposure = 3.0;
    desired.msaa_multiplier = 8;
    let changes = reconcile(&mut applied, &mut desired);

    assert!(changes.changed.is_empty());
    for field in [ConfigField::ShadowResolution, ConfigField::Exposure, ConfigField::MsaaMultiplier] {
        assert!(changes.dropped.contains(&field), "{field:?} dropped");
    }
    assert_eq!(applied.shadow_width, 1024);
    // Desired is re-synchronised so the dropped edit does not linger.
    assert_eq!(desired.shadow_width, 1024);
    assert_eq!(desired.exposure, applied.exposure);
    assert!(changes.shadow_resize.is_none());
}

#[test]
fn gates_are_judged_on_the_applied_value() {
    let mut applied = EngineConfig {
        shadows: false,
        ..Default::default()
    };
    let mut desired = applied.clone();
    desired.shadows = true;
    desired.shadow_width = 2048;
    let changes = reconcile(&mut applied, &mut desired);
    // Shadows precede their resolution, so both land in one pass.
    assert!(changes.changed.contains(&ConfigField::Shadows));
    assert_eq!(changes.shadow_resize, Some((2048, 1024)));
}

#[test]
fn object_position_does_not_regenerate_buffers() {
    let mut ctx = headless(small_config());
    ctx.render();
    ctx.configure(|c| c.object_position = Vector3::new(0.0, 1.0, 0.0));
    let changes = ctx.render();
    assert_eq!(changes.changed, vec![ConfigField::ObjectPosition]);
    assert_eq!(ctx.stats().regenerations, 0);
}

#[test]
fn many_flagged_fields_regenerate_once() {
    let mut ctx = headless(small_config());
    ctx.render();
    let scene = ctx.offscreen().scene.id();
    ctx.gpu.clear_commands();

    ctx.configure(|c| {
        c.render_width = 128;
        c.render_height = 96;
        c.hdr = false;
        c.bloom = false;
        c.msaa = true;
    });
    let changes = ctx.render();
    assert!(changes.regenerate);
    assert_eq!(ctx.stats().regenerations, 1);

    let scene_resizes = ctx
        .gpu
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::ResizeTexture(id, _) if *id == scene))
        .count();
    assert_eq!(scene_resizes, 1);
    let desc = ctx.gpu.texture(scene).expect("scene texture alive");
    assert_eq!((desc.width, desc.height), (128, 96));
    assert!(!desc.format.is_float());
    assert_eq!(ctx.gbuffer().position.width(), 128);
    assert_eq!(ctx.bloom().output().height(), 96);
    assert!(ctx.offscreen().target.status().is_complete());
    assert!(ctx.offscreen().msaa_target.status().is_complete());
}

#[test]
fn targeted_fields_reach_their_resources() {
    let mut ctx = headless(small_config());
    ctx.configure(|c| {
        c.light_direction = Vector3::new(0.0, -1.0, 0.0);
        c.shadow_width = 64;
        c.screen_width = 200;
        c.screen_height = 100;
    });
    let changes = ctx.render();
    assert!(changes.sun_changed);
    assert!(!changes.regenerate);
    assert_eq!(ctx.lights.sun().direction, Vector3::new(0.0, -1.0, 0.0));
    assert_eq!(ctx.shadow_map().width(), 64);
    assert_eq!(ctx.gpu.screen_size(), (200, 100));
    assert_eq!(ctx.stats().regenerations, 0);
}

#[test]
fn config_loads_from_partial_json() {
    let config = EngineConfig::from_json_str(r#"{ "msaa": true, "render_width": 800, "bloom": false }"#)
        .expect("valid json");
    assert!(config.msaa);
    assert!(!config.bloom);
    assert_eq!(config.render_width, 800);
    assert_eq!(config.render_height, EngineConfig::default().render_height);

    let round = EngineConfig::from_json_str(&config.to_json().expect("serializes")).expect("parses");
    assert_eq!(round, config);
    assert!(EngineConfig::from_json_str("{ \"msaa\": 3 }").is_err());
}

#[test]
fn msaa_multiplier_rounds_down_to_a_sample_count() {
    let config = |msaa_multiplier| EngineConfig {
        msaa: true,
        msaa_multiplier,
        ..Default::default()
    };
    let counts: Vec<u32> = [0, 1, 3, 4, 6, 8, 16].into_iter().map(|m| config(m).samples()).collect();
    assert_eq!(counts, vec![1, 1, 2, 4, 4, 8, 8]);
    assert_eq!(EngineConfig { msaa: false, ..config(4) }.samples(), 1);
    assert_eq!(EngineConfig { msaa: false, ..config(6) }.msaa_samples(), 4);
}

#[test]
fn odd_msaa_multiplier_allocates_a_valid_sample_count() {
    let mut ctx = headless(EngineConfig {
        msaa: true,
        ..small_config()
    });
    ctx.configure(|c| c.msaa_multiplier = 5);
    let changes = ctx.render();
    assert!(changes.changed.contains(&ConfigField::MsaaMultiplier));
    assert_eq!(ctx.config().msaa_multiplier, 5);
    assert_eq!(ctx.offscreen().msaa_scene.samples(), 4);
    assert_eq!(ctx.offscreen().msaa_depth.samples(), 4);
    assert!(ctx.offscreen().msaa_target.status().is_complete());
}
