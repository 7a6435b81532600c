//! Light sources and the bounded light registry.
//!
//! The registry holds exactly one directional light (the sun) and an ordered,
//! capped list of point and spot lights. Point and spot falloff is expressed
//! as an illumination distance which is converted to the usual
//! constant/linear/quadratic attenuation coefficients.

use anyhow::bail;
use cgmath::{Deg, InnerSpace, Vector3};

/// Point + spot lights the shaders are compiled for.
pub const MAX_LIGHTS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

/// (distance, linear, quadratic) with a constant term of 1.
const ATTENUATION_TABLE: [(u32, f32, f32); 12] = [
    (7, 0.7, 1.8),
    (13, 0.35, 0.44),
    (20, 0.22, 0.20),
    (32, 0.14, 0.07),
    (50, 0.09, 0.032),
    (65, 0.07, 0.017),
    (100, 0.045, 0.0075),
    (160, 0.027, 0.0028),
    (200, 0.022, 0.0019),
    (325, 0.014, 0.0007),
    (600, 0.007, 0.0002),
    (3250, 0.0014, 0.000007),
];

impl Attenuation {
    /// Coefficients of the smallest table distance that still covers `distance`.
    pub fn from_distance(distance: u32) -> Self {
        let (_, linear, quadratic) = ATTENUATION_TABLE
            .iter()
            .copied()
            .find(|(d, _, _)| *d >= distance)
            .unwrap_or(ATTENUATION_TABLE[ATTENUATION_TABLE.len() - 1]);
        Self {
            constant: 1.0,
            linear,
            quadratic,
        }
    }

    /// Relative intensity left at distance `d`.
    pub fn intensity_at(&self, d: f32) -> f32 {
        1.0 / (self.constant + self.linear * d + self.quadratic * d * d)
    }
}

/// Ambient/diffuse/specular terms shared by every light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightColor {
    pub ambient: Vector3<f32>,
    pub diffuse: Vector3<f32>,
    pub specular: Vector3<f32>,
}

impl LightColor {
    pub fn new(ambient: Vector3<f32>, diffuse: Vector3<f32>, specular: Vector3<f32>) -> Self {
        Self {
            ambient,
            diffuse,
            specular,
        }
    }

    /// Splits a single color into a dim ambient and full diffuse/specular terms.
    pub fn from_color(color: Vector3<f32>) -> Self {
        Self {
            ambient: color * 0.1,
            diffuse: color,
            specular: color,
        }
    }

    /// The single color physically based shading works with.
    pub fn averaged(&self) -> Vector3<f32> {
        (self.ambient + self.diffuse + self.specular) / 3.0
    }

    /// Averaged color squeezed into [0, 1] for debug drawing.
    pub fn averaged_clamped(&self) -> Vector3<f32> {
        let c = self.averaged();
        Vector3::new(c.x.clamp(0.0, 1.0), c.y.clamp(0.0, 1.0), c.z.clamp(0.0, 1.0))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vector3<f32>,
    pub color: LightColor,
}

impl DirectionalLight {
    pub fn new(direction: Vector3<f32>, ambient: f32, diffuse: f32, specular: f32) -> Self {
        Self {
            direction,
            color: LightColor::new(
                Vector3::new(ambient, ambient, ambient),
                Vector3::new(diffuse, diffuse, diffuse),
                Vector3::new(specular, specular, specular),
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vector3<f32>,
    pub distance: u32,
    pub attenuation: Attenuation,
    pub color: LightColor,
}

impl PointLight {
    pub fn new(position: Vector3<f32>, distance: u32, color: Vector3<f32>) -> Self {
        Self {
            position,
            distance,
            attenuation: Attenuation::from_distance(distance),
            color: LightColor::from_color(color),
        }
    }

    pub fn set_distance(&mut self, distance: u32) {
        self.distance = distance;
        self.attenuation = Attenuation::from_distance(distance);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpotLight {
    pub position: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub distance: u32,
    pub attenuation: Attenuation,
    pub color: LightColor,
    /// Cosine of the inner cone angle.
    pub cut_off: f32,
    /// Cosine of the outer cone angle.
    pub outer_cut_off: f32,
}

impl SpotLight {
    pub fn new(
        position: Vector3<f32>,
        direction: Vector3<f32>,
        distance: u32,
        color: Vector3<f32>,
        inner: Deg<f32>,
        outer: Deg<f32>,
    ) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            distance,
            attenuation: Attenuation::from_distance(distance),
            color: LightColor::from_color(color),
            cut_off: cgmath::Rad::from(inner).0.cos(),
            outer_cut_off: cgmath::Rad::from(outer).0.cos(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl Light {
    pub fn kind(&self) -> LightKind {
        match self {
            Light::Directional(_) => LightKind::Directional,
            Light::Point(_) => LightKind::Point,
            Light::Spot(_) => LightKind::Spot,
        }
    }

    pub fn color(&self) -> &LightColor {
        match self {
            Light::Directional(l) => &l.color,
            Light::Point(l) => &l.color,
            Light::Spot(l) => &l.color,
        }
    }

    /// World position, directional lights have none.
    pub fn position(&self) -> Option<Vector3<f32>> {
        match self {
            Light::Directional(_) => None,
            Light::Point(l) => Some(l.position),
            Light::Spot(l) => Some(l.position),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Clone, Debug)]
pub struct LightRegistry {
    sun: DirectionalLight,
    lights: Vec<Light>,
}

impl LightRegistry {
    pub fn new(sun: DirectionalLight) -> Self {
        Self {
            sun,
            lights: Vec::with_capacity(MAX_LIGHTS),
        }
    }

    pub fn sun(&self) -> &DirectionalLight {
        &self.sun
    }

    pub fn sun_mut(&mut self) -> &mut DirectionalLight {
        &mut self.sun
    }

    /// Point and spot lights in insertion order.
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lights.len() >= MAX_LIGHTS
    }

    fn push(&mut self, light: Light) {
        if self.is_full() {
            log::trace!("Light registry full, ignoring {:?} light", light.kind());
            return;
        }
        self.lights.push(light);
    }

    /// Ignored once the registry holds [`MAX_LIGHTS`] lights.
    pub fn add_point_light(&mut self, position: Vector3<f32>, distance: u32, color: Vector3<f32>) {
        self.push(Light::Point(PointLight::new(position, distance, color)));
    }

    /// Ignored once the registry holds [`MAX_LIGHTS`] lights.
    pub fn add_spot_light(
        &mut self,
        position: Vector3<f32>,
        direction: Vector3<f32>,
        distance: u32,
        color: Vector3<f32>,
        inner: Deg<f32>,
        outer: Deg<f32>,
    ) {
        self.push(Light::Spot(SpotLight::new(
            position, direction, distance, color, inner, outer,
        )));
    }

    pub fn add_default_point_light(&mut self) {
        self.add_point_light(Vector3::new(2.0, 2.0, 5.0), 13, Vector3::new(1.0, 1.0, 1.0));
    }

    pub fn add_default_spot_light(&mut self) {
        self.add_spot_light(
            Vector3::new(-8.0, 2.0, 3.0),
            Vector3::new(0.0, 1.0, 0.0),
            30,
            Vector3::new(1.0, 1.0, 1.0),
            Deg(10.0),
            Deg(15.0),
        );
    }

    /// Removes the light at `index`, keeping the order of the others.
    pub fn remove(&mut self, index: usize) -> anyhow::Result<Light> {
        if index >= self.lights.len() {
            bail!(
                "Cannot remove light {index}, the registry holds {} lights",
                self.lights.len()
            );
        }
        Ok(self.lights.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Light> {
        self.lights.get(index)
    }

    /// Mutable access to the point light at `index`. The variant of an entry
    /// never changes, so the sun stays the only directional light.
    pub fn point_mut(&mut self, index: usize) -> Option<&mut PointLight> {
        match self.lights.get_mut(index) {
            Some(Light::Point(p)) => Some(p),
            _ => None,
        }
    }

    pub fn spot_mut(&mut self, index: usize) -> Option<&mut SpotLight> {
        match self.lights.get_mut(index) {
            Some(Light::Spot(s)) => Some(s),
            _ => None,
        }
    }

    pub fn count(&self, kind: LightKind) -> usize {
        match kind {
            LightKind::Directional => 1,
            _ => self.lights.iter().filter(|l| l.kind() == kind).count(),
        }
    }

    pub fn point_lights(&self) -> impl Iterator<Item = &PointLight> {
        self.lights.iter().filter_map(|l| match l {
            Light::Point(p) => Some(p),
            _ => None,
        })
    }

    pub fn spot_lights(&self) -> impl Iterator<Item = &SpotLight> {
        self.lights.iter().filter_map(|l| match l {
            Light::Spot(s) => Some(s),
            _ => None,
        })
    }
}
