//! Light uniforms and debug light cubes.

use cgmath::{Matrix4, Vector3};

use crate::{
    data_structures::{
        light::{LightRegistry, LightColor},
        model::Mesh,
    },
    gpu::GpuDevice,
};

use super::Shader;

const DEFAULT_SHININESS: f32 = 32.0;
const LIGHT_CUBE_SCALE: f32 = 0.25;

fn send_colors(gpu: &mut impl GpuDevice, shader: &Shader, prefix: &str, color: &LightColor) {
    shader.set_vec3(gpu, &format!("{prefix}.ambient"), color.ambient);
    shader.set_vec3(gpu, &format!("{prefix}.diffuse"), color.diffuse);
    shader.set_vec3(gpu, &format!("{prefix}.specular"), color.specular);
}

/// Sun, point and spot lights for the Phong and deferred lighting programs.
pub fn send_light_uniforms(gpu: &mut impl GpuDevice, shader: &Shader, lights: &LightRegistry, blinn: bool) {
    shader.set_bool(gpu, "blinn", blinn);
    shader.set_float(gpu, "material.shininess", DEFAULT_SHININESS);

    let mut points = 0;
    for (i, light) in lights.point_lights().enumerate() {
        let prefix = format!("pointLights[{i}]");
        shader.set_vec3(gpu, &format!("{prefix}.position"), light.position);
        send_colors(gpu, shader, &prefix, &light.color);
        shader.set_float(gpu, &format!("{prefix}.constant"), light.attenuation.constant);
        shader.set_float(gpu, &format!("{prefix}.linear"), light.attenuation.linear);
        shader.set_float(gpu, &format!("{prefix}.quadratic"), light.attenuation.quadratic);
        points += 1;
    }
    shader.set_int(gpu, "pointLightsSize", points);

    let mut spots = 0;
    for (i, light) in lights.spot_lights().enumerate() {
        let prefix = format!("spotLights[{i}]");
        shader.set_vec3(gpu, &format!("{prefix}.position"), light.position);
        shader.set_vec3(gpu, &format!("{prefix}.direction"), light.direction);
        send_colors(gpu, shader, &prefix, &light.color);
        shader.set_float(gpu, &format!("{prefix}.constant"), light.attenuation.constant);
        shader.set_float(gpu, &format!("{prefix}.linear"), light.attenuation.linear);
        shader.set_float(gpu, &format!("{prefix}.quadratic"), light.attenuation.quadratic);
        shader.set_float(gpu, &format!("{prefix}.cutOff"), light.cut_off);
        shader.set_float(gpu, &format!("{prefix}.outerCutOff"), light.outer_cut_off);
        spots += 1;
    }
    shader.set_int(gpu, "spotLightsSize", spots);

    let sun = lights.sun();
    shader.set_vec3(gpu, "directionalLight.direction", sun.direction);
    send_colors(gpu, shader, "directionalLight", &sun.color);
}

/// PBR lights carry a single radiance color. Spot lights are not shaded by PBR.
pub fn send_light_pbr_uniforms(gpu: &mut impl GpuDevice, shader: &Shader, lights: &LightRegistry) {
    let mut points = 0;
    for (i, light) in lights.point_lights().enumerate() {
        shader.set_vec3(gpu, &format!("pointLights[{i}].position"), light.position);
        shader.set_vec3(gpu, &format!("pointLights[{i}].color"), light.color.averaged());
        points += 1;
    }
    shader.set_int(gpu, "pointLightsSize", points);

    let sun = lights.sun();
    shader.set_vec3(gpu, "directionalLight.direction", sun.direction);
    shader.set_vec3(gpu, "directionalLight.color", sun.color.averaged());
}

/// One small cube per positioned light, tinted with its clamped average color.
pub fn render_light_cubes(
    gpu: &mut impl GpuDevice,
    shader: &Shader,
    cube: &Mesh,
    lights: &LightRegistry,
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
) {
    shader.use_program(gpu);
    shader.set_mat4(gpu, "view", view);
    shader.set_mat4(gpu, "projection", projection);
    for light in lights.lights() {
        let Some(position) = light.position() else {
            continue;
        };
        let model = Matrix4::from_translation(position) * Matrix4::from_scale(LIGHT_CUBE_SCALE);
        shader.set_vec3(gpu, "lightColor", light.color().averaged_clamped());
        shader.set_mat4(gpu, "model", model);
        gpu.draw_mesh(cube.id());
    }
}

/// Position the shadow camera looks from: opposite to where the sun shines.
pub fn sun_eye(direction: Vector3<f32>) -> cgmath::Point3<f32> {
    cgmath::Point3::new(-direction.x, -direction.y, -direction.z)
}
