use std::path::Path;

use anyhow::Context as _;
use half::f16;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgba, imageops::FilterType};

/// CPU-side pixels ready for upload.
///
/// LDR images decode to `Rgba8`, HDR/EXR images to `Rgba32F`. The latter is
/// converted to `Rgba16F` before it reaches the device.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageData {
    Rgba8 {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    Rgba16F {
        width: u32,
        height: u32,
        pixels: Vec<f16>,
    },
    Rgba32F {
        width: u32,
        height: u32,
        pixels: Vec<f32>,
    },
}

impl ImageData {
    pub fn width(&self) -> u32 {
        match self {
            ImageData::Rgba8 { width, .. }
            | ImageData::Rgba16F { width, .. }
            | ImageData::Rgba32F { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            ImageData::Rgba8 { height, .. }
            | ImageData::Rgba16F { height, .. }
            | ImageData::Rgba32F { height, .. } => *height,
        }
    }

    pub fn is_hdr(&self) -> bool {
        !matches!(self, ImageData::Rgba8 { .. })
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ImageData::Rgba8 { .. } => 4,
            ImageData::Rgba16F { .. } => 8,
            ImageData::Rgba32F { .. } => 16,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ImageData::Rgba8 { pixels, .. } => pixels,
            ImageData::Rgba16F { pixels, .. } => bytemuck::cast_slice(pixels),
            ImageData::Rgba32F { pixels, .. } => bytemuck::cast_slice(pixels),
        }
    }

    /// Half-float copy of an HDR image, LDR images are returned unchanged.
    pub fn to_half(&self) -> ImageData {
        match self {
            ImageData::Rgba32F {
                width,
                height,
                pixels,
            } => ImageData::Rgba16F {
                width: *width,
                height: *height,
                pixels: pixels.iter().map(|p| f16::from_f32(*p)).collect(),
            },
            other => other.clone(),
        }
    }

    /// A `width` x `height` image filled with one RGBA8 color.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> ImageData {
        let pixels = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        ImageData::Rgba8 {
            width,
            height,
            pixels,
        }
    }

    fn from_dynamic(img: DynamicImage) -> ImageData {
        let (width, height) = img.dimensions();
        match img {
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => ImageData::Rgba32F {
                width,
                height,
                pixels: img.to_rgba32f().into_raw(),
            },
            _ => ImageData::Rgba8 {
                width,
                height,
                pixels: img.to_rgba8().into_raw(),
            },
        }
    }
}

/// Number of levels in a full mip chain for the given extent.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Builds `levels` images, level 0 being `image` itself.
pub fn mip_chain(image: &ImageData, levels: u32) -> Vec<ImageData> {
    if let ImageData::Rgba16F {
        width,
        height,
        pixels,
    } = image
    {
        let wide = ImageData::Rgba32F {
            width: *width,
            height: *height,
            pixels: pixels.iter().map(|p| p.to_f32()).collect(),
        };
        return mip_chain(&wide, levels).iter().map(ImageData::to_half).collect();
    }
    let mut chain = vec![image.clone()];
    for level in 1..levels.max(1) {
        let width = (image.width() >> level).max(1);
        let height = (image.height() >> level).max(1);
        let next = match image {
            ImageData::Rgba8 {
                width: w,
                height: h,
                pixels,
            } => ImageBuffer::<Rgba<u8>, _>::from_raw(*w, *h, pixels.as_slice())
                .map(|src| image::imageops::resize(&src, width, height, FilterType::Triangle))
                .map(|img| ImageData::Rgba8 {
                    width,
                    height,
                    pixels: img.into_raw(),
                }),
            ImageData::Rgba32F {
                width: w,
                height: h,
                pixels,
            } => ImageBuffer::<Rgba<f32>, _>::from_raw(*w, *h, pixels.as_slice())
                .map(|src| image::imageops::resize(&src, width, height, FilterType::Triangle))
                .map(|img| ImageData::Rgba32F {
                    width,
                    height,
                    pixels: img.into_raw(),
                }),
            ImageData::Rgba16F { .. } => unreachable!("half images are widened above"),
        };
        match next {
            Some(img) => chain.push(img),
            None => {
                log::warn!("Pixel buffer does not match its extent, mip chain stops at level {level}");
                break;
            }
        }
    }
    chain
}

pub fn load_binary(path: impl AsRef<Path>) -> anyhow::Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))
}

/// Decodes an encoded image (png, jpeg, tga, hdr, exr).
pub fn decode_image(bytes: &[u8], flip: bool) -> anyhow::Result<ImageData> {
    let img = image::load_from_memory(bytes)?;
    let img = if flip { img.flipv() } else { img };
    Ok(ImageData::from_dynamic(img))
}

pub fn load_image(path: impl AsRef<Path>, flip: bool) -> anyhow::Result<ImageData> {
    let path = path.as_ref();
    let data = load_binary(path)?;
    decode_image(&data, flip).with_context(|| format!("Cannot decode {}", path.display()))
}
