//! Configuration of the hologram pass.
//!
//! A [`HologramConfig`] is assembled with [`HologramConfig::builder`] and
//! validated once in [`HologramConfigBuilder::build`]. After that the pass
//! treats it as read-only: every frame derives its [`EffectParameters`] from
//! it, and the target set is sized and formatted from it.
//!
//! ```ignore
//! let config = HologramConfig::builder()
//!     .mapping(LayerTintMapping::new(LayerMask::layer(1)).with_tint(tint))
//!     .scroll_velocity(Vec3::new(0.0, 0.05, 0.0))
//!     .scanline(0.2, 0.6)
//!     .build()?;
//! ```

use std::path::PathBuf;
use std::rc::Rc;

use glam::{Quat, Vec3};

use crate::color::Color;
use crate::error::ConfigError;
use crate::layer::{LayerMask, LayerTintMapping};
use crate::material::Material;
use crate::params::{EffectParameters, OrientationMode, ScanlineRemap};
use crate::target_set::{DepthBits, TargetSetDescriptor};

/// Where the scrolling line pattern comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum LinesTexture {
    /// A procedural band texture (see [`Texture::scanlines`](crate::Texture::scanlines)).
    Generated { size: u32, line_count: u32 },
    /// An image file on disk.
    File(PathBuf),
}

impl Default for LinesTexture {
    fn default() -> Self {
        LinesTexture::Generated {
            size: 256,
            line_count: 32,
        }
    }
}

/// Validated hologram pass settings.
#[derive(Clone, Debug)]
pub struct HologramConfig {
    /// Layer selections, processed in this order.
    pub mappings: Vec<LayerTintMapping>,
    /// Composite effect. `None` captures objects but never composites them.
    pub hologram_material: Option<Rc<Material>>,
    pub lines_texture: LinesTexture,
    pub color_format: wgpu::TextureFormat,
    pub depth_bits: DepthBits,
    pub rotation: Quat,
    pub scale: Vec3,
    pub mode: OrientationMode,
    /// Pattern velocity in world units per second.
    pub scroll_velocity: Vec3,
    pub scanline: ScanlineRemap,
    pub mip_bias: f32,
    pub tint_color: Color,
}

impl HologramConfig {
    pub fn builder() -> HologramConfigBuilder {
        HologramConfigBuilder::default()
    }

    /// Union of every mapping's mask.
    pub fn culling_mask(&self) -> LayerMask {
        crate::layer::aggregate_culling_mask(&self.mappings)
    }

    /// Per-frame parameters for a pattern scrolled to `line_offset`.
    pub fn effect_parameters(&self, line_offset: Vec3) -> EffectParameters {
        EffectParameters {
            orientation: EffectParameters::orientation_matrix(self.rotation, self.scale),
            line_offset,
            tint_color: self.tint_color,
            scanline: self.scanline,
            mip_bias: self.mip_bias,
            mode: self.mode,
        }
    }
}

impl Default for HologramConfig {
    fn default() -> Self {
        Self {
            mappings: Vec::new(),
            hologram_material: Some(Rc::new(Material::hologram())),
            lines_texture: LinesTexture::default(),
            color_format: TargetSetDescriptor::DEFAULT_COLOR_FORMAT,
            depth_bits: DepthBits::Depth24,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            mode: OrientationMode::World,
            scroll_velocity: Vec3::new(0.0, 0.01, 0.0),
            scanline: ScanlineRemap::FULL,
            mip_bias: 0.0,
            tint_color: Color::WHITE,
        }
    }
}

/// Fluent builder for [`HologramConfig`].
///
/// Setters never fail; everything is checked in [`build`](Self::build).
#[derive(Clone, Debug)]
pub struct HologramConfigBuilder {
    config: HologramConfig,
    scanline: (f32, f32),
}

impl Default for HologramConfigBuilder {
    fn default() -> Self {
        Self {
            config: HologramConfig::default(),
            scanline: (0.0, 1.0),
        }
    }
}

impl HologramConfigBuilder {
    /// Appends a layer mapping.
    pub fn mapping(mut self, mapping: LayerTintMapping) -> Self {
        self.config.mappings.push(mapping);
        self
    }

    /// Replaces all layer mappings.
    pub fn mappings(mut self, mappings: impl IntoIterator<Item = LayerTintMapping>) -> Self {
        self.config.mappings = mappings.into_iter().collect();
        self
    }

    pub fn hologram_material(mut self, material: Option<Rc<Material>>) -> Self {
        self.config.hologram_material = material;
        self
    }

    pub fn lines_texture(mut self, lines: LinesTexture) -> Self {
        self.config.lines_texture = lines;
        self
    }

    pub fn color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.config.color_format = format;
        self
    }

    pub fn depth_bits(mut self, depth_bits: DepthBits) -> Self {
        self.config.depth_bits = depth_bits;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn mode(mut self, mode: OrientationMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn scroll_velocity(mut self, velocity: Vec3) -> Self {
        self.config.scroll_velocity = velocity;
        self
    }

    /// Scanline remap band. Must satisfy `0 <= min <= max <= 1`.
    pub fn scanline(mut self, min: f32, max: f32) -> Self {
        self.scanline = (min, max);
        self
    }

    pub fn mip_bias(mut self, mip_bias: f32) -> Self {
        self.config.mip_bias = mip_bias;
        self
    }

    pub fn tint_color(mut self, color: Color) -> Self {
        self.config.tint_color = color;
        self
    }

    pub fn build(self) -> Result<HologramConfig, ConfigError> {
        let mut config = self.config;
        let (min, max) = self.scanline;
        config.scanline = ScanlineRemap::new(min, max)?;

        if !config.rotation.is_finite() {
            return Err(ConfigError::NonFinite("rotation"));
        }
        if !config.scale.is_finite() {
            return Err(ConfigError::NonFinite("scale"));
        }
        if !config.scroll_velocity.is_finite() {
            return Err(ConfigError::NonFinite("scroll velocity"));
        }
        if !config.mip_bias.is_finite() {
            return Err(ConfigError::NonFinite("mip bias"));
        }
        if !config.tint_color.is_finite() {
            return Err(ConfigError::NonFinite("tint color"));
        }

        if let Some(material) = &config.hologram_material {
            material.validate()?;
        }
        for material in config.mappings.iter().filter_map(|m| m.tint_material.as_deref()) {
            material.validate()?;
        }

        if config.rotation.length_squared() > 0.0 {
            config.rotation = config.rotation.normalize();
        }
        Ok(config)
    }
}
