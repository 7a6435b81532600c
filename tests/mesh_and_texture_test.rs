use std::io::Cursor;

use cgmath::{Deg, Matrix4, Vector3, Vector4};
use flow_render::{
    data_structures::{
        model::{Mesh, MeshData, ModelVertex, Scene},
        texture::{TextureConfig, TextureResource},
        transform::Transform,
    },
    gpu::{
        TextureFormat,
        recording::{Command, RecordingDevice},
    },
    resources::{
        shapes,
        texture::{ImageData, decode_image, mip_chain, mip_level_count},
    },
};

fn vertex(position: [f32; 3], tex_coords: [f32; 2]) -> ModelVertex {
    ModelVertex {
        position,
        tex_coords,
        normal: [0.0, 0.0, 1.0],
        ..Default::default()
    }
}

fn approx(a: [f32; 3], b: [f32; 3]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
}

#[test]
fn tangents_follow_the_uv_axes() {
    let data = MeshData::new(
        "plane",
        vec![
            vertex([0.0, 0.0, 0.0], [0.0, 0.0]),
            vertex([1.0, 0.0, 0.0], [1.0, 0.0]),
            vertex([1.0, 1.0, 0.0], [1.0, 1.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 1.0]),
        ],
        vec![0, 1, 2, 0, 2, 3],
    );
    for v in &data.vertices {
        assert!(approx(v.tangent, [1.0, 0.0, 0.0]), "{:?}", v.tangent);
        assert!(approx(v.bitangent, [0.0, -1.0, 0.0]), "{:?}", v.bitangent);
    }
}

#[test]
fn degenerate_and_out_of_range_triangles_are_skipped() {
    let data = MeshData::new(
        "broken",
        vec![
            vertex([0.0, 0.0, 0.0], [0.5, 0.5]),
            vertex([1.0, 0.0, 0.0], [0.5, 0.5]),
            vertex([0.0, 1.0, 0.0], [0.5, 0.5]),
        ],
        vec![0, 1, 2, 0, 1, 9],
    );
    assert!(data.vertices.iter().all(|v| v.tangent == [0.0; 3]));
}

#[test]
fn built_in_shapes_are_closed() {
    let cube = shapes::cube();
    assert_eq!((cube.vertices.len(), cube.indices.len()), (24, 36));
    assert!(cube.vertices.iter().all(|v| v.position.iter().all(|c| c.abs() == 1.0)));
    let quad = shapes::quad();
    assert_eq!(quad.indices.len(), 6);
}

#[test]
fn transforms_compose_parent_first() {
    let parent = Transform::new()
        .translated(Vector3::new(1.0, 0.0, 0.0))
        .scaled(Vector3::new(2.0, 2.0, 2.0));
    let child = Transform::from(Vector3::new(0.0, 1.0, 0.0));
    let world = &parent * &child;
    assert_eq!(world.position, Vector3::new(1.0, 2.0, 0.0));
    assert_eq!(world.to_matrix(), parent.to_matrix() * child.to_matrix());

    let turned = Transform::new().rotated(Deg(90.0), Vector3::new(0.0, 0.0, 3.0));
    let x = turned.to_matrix() * Vector4::new(1.0, 0.0, 0.0, 1.0);
    assert!((x.y - 1.0).abs() < 1e-6 && x.x.abs() < 1e-6);
}

#[test]
fn object_position_sits_between_scene_and_mesh() {
    let mut gpu = RecordingDevice::new();
    let mesh = Mesh::new(&mut gpu, &shapes::cube())
        .with_transform(Transform::from(Vector3::new(0.0, 0.0, 1.0)));
    let scene = Scene {
        transform: Transform::new().scaled(Vector3::new(2.0, 2.0, 2.0)),
        meshes: Vec::new(),
    };
    let model = scene.model_matrix(&mesh, Vector3::new(1.0, 0.0, 0.0));
    let origin = model * Vector4::new(0.0, 0.0, 0.0, 1.0);
    assert_eq!(origin, Vector4::new(2.0, 0.0, 2.0, 1.0));
    assert_eq!(
        Scene::new().model_matrix(&mesh, Vector3::new(0.0, 0.0, 0.0)),
        Matrix4::from_translation(Vector3::new(0.0, 0.0, 1.0))
    );
}

#[test]
fn mip_chain_halves_down_to_one_pixel() {
    assert_eq!(mip_level_count(16, 4), 5);
    assert_eq!(mip_level_count(1, 1), 1);
    let chain = mip_chain(&ImageData::solid(16, 4, [255, 0, 0, 255]), 5);
    let extents: Vec<(u32, u32)> = chain.iter().map(|m| (m.width(), m.height())).collect();
    assert_eq!(extents, vec![(16, 4), (8, 2), (4, 1), (2, 1), (1, 1)]);
    assert!(chain.iter().all(|m| m.as_bytes().len() == (m.width() * m.height() * 4) as usize));
}

#[test]
fn images_upload_every_mip_level() {
    let mut gpu = RecordingDevice::new();
    let config = TextureConfig {
        gen_mipmap: true,
        ..Default::default()
    };
    let texture = TextureResource::from_image(&mut gpu, "albedo", &ImageData::solid(8, 8, [9, 9, 9, 255]), config);
    assert_eq!(texture.format(), TextureFormat::Rgba8UnormSrgb);
    assert_eq!(texture.mip_levels(), 4);
    let uploads = gpu
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::UploadTexture { .. }))
        .count();
    assert_eq!(uploads, 4);
}

#[test]
fn hdr_images_are_stored_as_half_floats() {
    let mut gpu = RecordingDevice::new();
    let image = ImageData::Rgba32F {
        width: 2,
        height: 2,
        pixels: vec![4.0; 16],
    };
    let texture = TextureResource::from_image(&mut gpu, "sky", &image, TextureConfig::default());
    assert_eq!(texture.format(), TextureFormat::Rgba16Float);
    assert_eq!(image.to_half().bytes_per_pixel(), 8);
}

#[test]
fn encoded_images_decode_and_flip() {
    let mut png = Vec::new();
    let mut source = image::RgbaImage::new(1, 2);
    source.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
    source.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
    source
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .expect("png encodes");

    let upright = decode_image(&png, false).expect("png decodes");
    let flipped = decode_image(&png, true).expect("png decodes");
    assert_eq!(&upright.as_bytes()[..4], &[255, 0, 0, 255]);
    assert_eq!(&flipped.as_bytes()[..4], &[0, 0, 255, 255]);
    assert!(decode_image(b"not an image", false).is_err());
}

#[test]
fn missing_file_yields_an_unusable_texture() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut gpu = RecordingDevice::new();
    let texture = TextureResource::from_path(&mut gpu, "missing/albedo.png", TextureConfig::default());
    assert!(!texture.is_usable());
    assert_eq!(gpu.texture(texture.id()).map(|d| d.width), Some(1));
}
