use cgmath::{Deg, Vector3};
use flow_render::data_structures::light::{
    Attenuation, DirectionalLight, Light, LightColor, LightKind, LightRegistry, MAX_LIGHTS,
};

fn registry() -> LightRegistry {
    LightRegistry::new(DirectionalLight::new(Vector3::new(-4.0, -2.0, -3.0), 0.1, 0.5, 1.0))
}

fn white() -> Vector3<f32> {
    Vector3::new(1.0, 1.0, 1.0)
}

#[test]
fn adding_beyond_capacity_is_ignored() {
    let mut lights = registry();
    for i in 0..MAX_LIGHTS {
        if i % 2 == 0 {
            lights.add_point_light(Vector3::new(i as f32, 0.0, 0.0), 13, white());
        } else {
            lights.add_default_spot_light();
        }
    }
    assert!(lights.is_full());
    lights.add_point_light(Vector3::new(99.0, 0.0, 0.0), 13, white());
    lights.add_default_spot_light();
    assert_eq!(lights.len(), MAX_LIGHTS);
    assert!(lights.point_lights().all(|p| p.position.x != 99.0));
}

#[test]
fn removal_preserves_order() {
    let mut lights = registry();
    for x in 0..4 {
        lights.add_point_light(Vector3::new(x as f32, 0.0, 0.0), 20, white());
    }
    let removed = lights.remove(1).expect("index 1 exists");
    assert_eq!(removed.position(), Some(Vector3::new(1.0, 0.0, 0.0)));
    assert_eq!(lights.len(), 3);
    let xs: Vec<f32> = lights.lights().iter().filter_map(|l| l.position()).map(|p| p.x).collect();
    assert_eq!(xs, vec![0.0, 2.0, 3.0]);
}

#[test]
fn out_of_range_removal_is_an_error() {
    let mut lights = registry();
    lights.add_default_point_light();
    assert!(lights.remove(1).is_err());
    assert_eq!(lights.len(), 1);
}

#[test]
fn out_of_range_lookup_is_absent() {
    let mut lights = registry();
    lights.add_default_point_light();
    assert!(lights.get(0).is_some());
    assert!(lights.get(1).is_none());
    assert!(lights.point_mut(7).is_none());
}

#[test]
fn counts_by_kind() {
    let mut lights = registry();
    lights.add_default_point_light();
    lights.add_default_point_light();
    lights.add_default_spot_light();
    assert_eq!(lights.count(LightKind::Point), 2);
    assert_eq!(lights.count(LightKind::Spot), 1);
    assert_eq!(lights.count(LightKind::Directional), 1);
}

#[test]
fn attenuation_follows_the_falloff_table() {
    let exact = Attenuation::from_distance(13);
    assert_eq!((exact.constant, exact.linear, exact.quadratic), (1.0, 0.35, 0.44));
    // Between buckets the next larger distance is used.
    assert_eq!(Attenuation::from_distance(40), Attenuation::from_distance(50));
    assert_eq!(Attenuation::from_distance(1), Attenuation::from_distance(7));
    // Beyond the table the last bucket applies.
    assert_eq!(Attenuation::from_distance(10_000), Attenuation::from_distance(3250));

    let near = Attenuation::from_distance(7);
    let far = Attenuation::from_distance(100);
    assert!(far.linear < near.linear && far.quadratic < near.quadratic);
    assert!(far.intensity_at(5.0) > near.intensity_at(5.0));
}

#[test]
fn spot_light_stores_cone_cosines() {
    let mut lights = registry();
    lights.add_spot_light(
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.0, 2.0, 0.0),
        30,
        white(),
        Deg(10.0),
        Deg(15.0),
    );
    let Some(Light::Spot(spot)) = lights.get(0) else {
        panic!("expected a spot light");
    };
    assert!((spot.cut_off - 10f32.to_radians().cos()).abs() < 1e-6);
    assert!((spot.outer_cut_off - 15f32.to_radians().cos()).abs() < 1e-6);
    assert!(spot.cut_off > spot.outer_cut_off);
    assert_eq!(spot.direction, Vector3::new(0.0, 1.0, 0.0));
}

#[test]
fn single_color_splits_into_terms() {
    let mut lights = registry();
    lights.add_point_light(Vector3::new(0.0, 0.0, 0.0), 13, Vector3::new(1.0, 0.5, 0.0));
    let color = lights.get(0).map(|l| *l.color()).expect("light added");
    assert_eq!(color.diffuse, Vector3::new(1.0, 0.5, 0.0));
    assert_eq!(color.specular, color.diffuse);
    assert!((color.ambient.x - 0.1).abs() < 1e-6);
}

#[test]
fn edits_keep_each_light_its_kind() {
    let mut lights = registry();
    lights.add_default_point_light();
    lights.add_default_spot_light();

    assert!(lights.spot_mut(0).is_none());
    assert!(lights.point_mut(1).is_none());

    let point = lights.point_mut(0).expect("point light at 0");
    point.position = Vector3::new(0.0, 3.0, 0.0);
    point.set_distance(100);
    let spot = lights.spot_mut(1).expect("spot light at 1");
    spot.color = LightColor::from_color(Vector3::new(1.0, 0.0, 0.0));
    spot.cut_off = 0.9;

    assert_eq!(lights.count(LightKind::Point), 1);
    assert_eq!(lights.count(LightKind::Spot), 1);
    assert!(lights.lights().iter().all(|l| l.kind() != LightKind::Directional));

    let shaded = lights.point_lights().next().expect("still shaded");
    assert_eq!(shaded.position, Vector3::new(0.0, 3.0, 0.0));
    assert_eq!(shaded.attenuation, Attenuation::from_distance(100));
    let spot = lights.spot_lights().next().expect("still shaded");
    assert_eq!(spot.cut_off, 0.9);
    assert_eq!(spot.color.diffuse, Vector3::new(1.0, 0.0, 0.0));
}
