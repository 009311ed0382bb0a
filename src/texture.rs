use std::path::Path;

use image::{RgbaImage, imageops};

use crate::gpu::GpuContext;

/// A sampled GPU texture with a full mip chain.
///
/// The hologram's scrolling line pattern is one of these. Mip bias is not a
/// property of the texture: the composite shader applies it per draw.
#[derive(Debug)]
pub struct Texture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
}

impl Texture {
    /// Create a texture from an RGBA image, generating every mip level.
    pub fn from_image(gpu: &GpuContext, image: &RgbaImage, label: &str) -> Self {
        use wgpu::util::DeviceExt;

        let chain = mip_chain(image);
        let data: Vec<u8> = chain.iter().flat_map(|level| level.as_raw().iter().copied()).collect();
        let (width, height) = image.dimensions();

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: chain.len() as u32,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Repeat so world-space pattern coordinates tile; trilinear so the
        // composite's LOD bias has something to act on.
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width,
            height,
            mip_levels: chain.len() as u32,
        }
    }

    /// Load a texture from an image file.
    pub fn from_file(gpu: &GpuContext, path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        let path = path.as_ref();
        let img = image::open(path)?.to_rgba8();
        Ok(Self::from_image(gpu, &img, &path.display().to_string()))
    }

    /// The default hologram line pattern: `line_count` soft horizontal bands.
    pub fn scanlines(gpu: &GpuContext, size: u32, line_count: u32) -> Self {
        Self::from_image(gpu, &scanline_image(size, line_count), "Hologram Lines Texture")
    }
}

/// Every mip level of `base`, largest first, down to 1x1.
pub fn mip_chain(base: &RgbaImage) -> Vec<RgbaImage> {
    let mut chain = vec![base.clone()];
    let (mut width, mut height) = base.dimensions();
    while width > 1 || height > 1 {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        let previous = chain.last().unwrap_or(base);
        let next = imageops::resize(previous, width, height, imageops::FilterType::Triangle);
        chain.push(next);
    }
    chain
}

/// Grayscale band pattern: a raised cosine per line along V, constant along U.
pub fn scanline_image(size: u32, line_count: u32) -> RgbaImage {
    let size = size.max(1);
    let line_count = line_count.max(1) as f32;
    RgbaImage::from_fn(size, size, |_, y| {
        let v = (y as f32 + 0.5) / size as f32;
        let phase = (v * line_count * std::f32::consts::TAU).cos();
        let value = ((phase * 0.5 + 0.5) * 255.0).round() as u8;
        image::Rgba([value, value, value, 255])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let base = RgbaImage::new(16, 4);
        let sizes: Vec<_> = mip_chain(&base).iter().map(|m| m.dimensions()).collect();
        assert_eq!(sizes, vec![(16, 4), (8, 2), (4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn single_pixel_has_one_level() {
        let base = RgbaImage::new(1, 1);
        assert_eq!(mip_chain(&base).len(), 1);
    }

    #[test]
    fn scanlines_vary_along_v_only() {
        let img = scanline_image(32, 4);
        assert_eq!(img.get_pixel(0, 5), img.get_pixel(31, 5));
        let column: Vec<u8> = (0..32).map(|y| img.get_pixel(0, y)[0]).collect();
        assert!(column.iter().any(|&v| v > 200));
        assert!(column.iter().any(|&v| v < 55));
    }
}
