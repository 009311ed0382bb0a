//! Per-frame effect parameters and their GPU layout.
//!
//! [`EffectParameters`] is rebuilt from the configuration and the scroll state
//! on every `execute` and handed by value to the composite draw. Nothing in it
//! outlives the frame, and nothing is written back into shared assets: the mip
//! bias in particular travels with the draw instead of being stored on the
//! lines texture.

use glam::{Mat4, Quat, Vec3};

use crate::camera::Camera;
use crate::color::Color;
use crate::error::ConfigError;

/// Remaps the sampled line pattern into a scanline band.
///
/// Pattern values below `min` are fully dark, values above `max` fully lit,
/// and values in between follow a smoothstep. `min == max` is allowed and acts
/// as a single hard threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanlineRemap {
    min: f32,
    max: f32,
}

impl ScanlineRemap {
    /// The identity band `[0, 1]`.
    pub const FULL: ScanlineRemap = ScanlineRemap { min: 0.0, max: 1.0 };

    pub fn new(min: f32, max: f32) -> Result<Self, ConfigError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !(in_unit(min) && in_unit(max) && min <= max) {
            return Err(ConfigError::ScanlineRemap { min, max });
        }
        Ok(Self { min, max })
    }

    /// Builds a band from arbitrary input by clamping both bounds into
    /// `[0, 1]` and swapping them if inverted. NaN bounds fall back to the
    /// full band.
    pub fn clamped(min: f32, max: f32) -> Self {
        let min = if min.is_nan() { 0.0 } else { min.clamp(0.0, 1.0) };
        let max = if max.is_nan() { 1.0 } else { max.clamp(0.0, 1.0) };
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn is_threshold(&self) -> bool {
        self.max - self.min <= f32::EPSILON
    }

    /// CPU mirror of the remap performed in `hologram.wgsl`.
    pub fn apply(&self, value: f32) -> f32 {
        if self.is_threshold() {
            return if value >= self.min { 1.0 } else { 0.0 };
        }
        let t = ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }
}

impl Default for ScanlineRemap {
    fn default() -> Self {
        Self::FULL
    }
}

/// Coordinate space the line pattern is laid out in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrientationMode {
    /// Pattern coordinates are normalized screen coordinates; lines stay fixed
    /// to the screen as the camera moves.
    Screen,
    /// Pattern coordinates are world positions reconstructed from the captured
    /// depth; lines stick to the objects as the camera moves.
    #[default]
    World,
}

impl OrientationMode {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            OrientationMode::Screen => 0,
            OrientationMode::World => 1,
        }
    }
}

/// Everything the composite effect needs besides its textures.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParameters {
    /// Rotation and scale applied to pattern coordinates.
    pub orientation: Mat4,
    /// World-space offset of the line pattern (from the scroll state).
    pub line_offset: Vec3,
    /// Multiplied into the captured color.
    pub tint_color: Color,
    pub scanline: ScanlineRemap,
    /// LOD bias for sampling the line texture.
    pub mip_bias: f32,
    pub mode: OrientationMode,
}

impl EffectParameters {
    /// Orientation matrix from a rotation/scale pair, with no translation.
    pub fn orientation_matrix(rotation: Quat, scale: Vec3) -> Mat4 {
        Mat4::from_scale_rotation_translation(scale, rotation, Vec3::ZERO)
    }

    /// Packs the parameters into the uniform block read by `hologram.wgsl`.
    pub fn to_uniforms(&self, frame: &CompositeFrame) -> HologramUniforms {
        let view_proj = frame.camera.view_projection(frame.aspect());
        HologramUniforms {
            orientation: self.orientation.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            line_offset: self.line_offset.extend(self.mip_bias).to_array(),
            tint_color: self.tint_color.to_array(),
            scanline_remap: [self.scanline.min(), self.scanline.max()],
            resolution: [frame.width as f32, frame.height as f32],
            slice: frame.slice,
            mode: self.mode.as_u32(),
            has_tint: frame.has_tint as u32,
            _padding: 0,
        }
    }
}

/// Per-view data the composite needs on top of [`EffectParameters`].
#[derive(Clone, Copy, Debug)]
pub struct CompositeFrame<'a> {
    pub camera: &'a Camera,
    pub width: u32,
    pub height: u32,
    /// Array layer of the target set that holds this view.
    pub slice: u32,
    pub has_tint: bool,
}

impl CompositeFrame<'_> {
    fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

/// Uniform block of the hologram composite shader.
///
/// # WGSL Declaration
///
/// ```wgsl
/// struct Uniforms {
///     orientation: mat4x4<f32>,
///     inv_view_proj: mat4x4<f32>,
///     line_offset: vec4<f32>,   // xyz offset, w mip bias
///     tint_color: vec4<f32>,
///     scanline_remap: vec2<f32>,
///     resolution: vec2<f32>,
///     slice: u32,
///     mode: u32,
///     has_tint: u32,
///     _padding: u32,
/// }
/// ```
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct HologramUniforms {
    pub orientation: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub line_offset: [f32; 4],
    pub tint_color: [f32; 4],
    pub scanline_remap: [f32; 2],
    pub resolution: [f32; 2],
    pub slice: u32,
    pub mode: u32,
    pub has_tint: u32,
    pub _padding: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_rejects_inverted_bounds() {
        assert_eq!(
            ScanlineRemap::new(0.8, 0.2),
            Err(ConfigError::ScanlineRemap { min: 0.8, max: 0.2 })
        );
        assert!(ScanlineRemap::new(-0.1, 0.5).is_err());
        assert!(ScanlineRemap::new(0.0, 1.5).is_err());
        assert!(ScanlineRemap::new(f32::NAN, 0.5).is_err());
    }

    #[test]
    fn equal_bounds_act_as_threshold() {
        let remap = ScanlineRemap::new(0.3, 0.3).unwrap();
        assert!(remap.is_threshold());
        assert_eq!(remap.apply(0.29), 0.0);
        assert_eq!(remap.apply(0.3), 1.0);
        assert_eq!(remap.apply(0.9), 1.0);
    }

    #[test]
    fn full_band_is_smoothstep() {
        let remap = ScanlineRemap::FULL;
        assert_eq!(remap.apply(0.0), 0.0);
        assert_eq!(remap.apply(1.0), 1.0);
        assert!((remap.apply(0.5) - 0.5).abs() < 1e-6);
        assert!(remap.apply(0.25) < 0.25);
    }

    #[test]
    fn clamped_repairs_bad_input() {
        let remap = ScanlineRemap::clamped(1.4, -0.2);
        assert_eq!((remap.min(), remap.max()), (0.0, 1.0));
        let remap = ScanlineRemap::clamped(0.7, 0.4);
        assert_eq!((remap.min(), remap.max()), (0.4, 0.7));
    }

    #[test]
    fn orientation_has_no_translation() {
        let m = EffectParameters::orientation_matrix(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(2.0, 2.0, 2.0),
        );
        let p = m.transform_point3(Vec3::X);
        assert!((p - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::ZERO);
    }

    #[test]
    fn uniforms_pack_offset_and_mip_bias() {
        let camera = Camera::default();
        let params = EffectParameters {
            orientation: Mat4::IDENTITY,
            line_offset: Vec3::new(0.0, 0.5, 0.0),
            tint_color: Color::HOLO_CYAN,
            scanline: ScanlineRemap::new(0.2, 0.6).unwrap(),
            mip_bias: -0.5,
            mode: OrientationMode::Screen,
        };
        let uniforms = params.to_uniforms(&CompositeFrame {
            camera: &camera,
            width: 640,
            height: 480,
            slice: 1,
            has_tint: true,
        });
        assert_eq!(uniforms.line_offset, [0.0, 0.5, 0.0, -0.5]);
        assert_eq!(uniforms.scanline_remap, [0.2, 0.6]);
        assert_eq!(uniforms.resolution, [640.0, 480.0]);
        assert_eq!((uniforms.slice, uniforms.mode, uniforms.has_tint), (1, 0, 1));
    }

    #[test]
    fn uniform_block_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<HologramUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<HologramUniforms>(), 192);
    }
}
