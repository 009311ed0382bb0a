//! Effect programs ("materials") referenced by the hologram pass.
//!
//! A [`Material`] is a WGSL module plus the list of fragment entry points it
//! exposes. Entry point `i` is shader pass `i`; the composite always draws
//! pass 0. Pipelines are not owned by the material: each renderer builds and
//! caches its own, keyed by [`MaterialId`] and target formats, because the
//! same material can be drawn into buffers of different formats.
//!
//! # Binding contracts
//!
//! - **Object materials** (lit and tint) are drawn through the mesh renderer:
//!   `vs` takes [`Vertex3d`](crate::Vertex3d), group 0 holds the camera
//!   uniforms at binding 0 and the per-draw model uniforms at binding 1.
//!   The fragment stage writes its color to `@location(0)` and its depth
//!   (`position.z`) to `@location(1)`, which feeds the object depth mirror
//!   during capture.
//! - **Hologram materials** are drawn as a full-screen triangle by the
//!   composite renderer; see `shaders/hologram.wgsl` for the bindings.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::color::Color;
use crate::error::ConfigError;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a material, used as a pipeline cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(u64);

/// A named WGSL effect program.
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    name: String,
    source: Cow<'static, str>,
    passes: Vec<String>,
    color: Color,
}

impl Material {
    /// Creates a material with a single shader pass (`fs`).
    pub fn new(name: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            source: source.into(),
            passes: vec!["fs".to_owned()],
            color: Color::WHITE,
        }
    }

    /// The default lit object material.
    pub fn lit(name: impl Into<String>) -> Self {
        Self::new(name, include_str!("shaders/mesh.wgsl"))
    }

    /// A flat tint material for the tint pre-pass. `color` lands in the tint
    /// buffer for every covered pixel.
    pub fn tint(name: impl Into<String>, color: Color) -> Self {
        Self::new(name, include_str!("shaders/tint.wgsl")).with_color(color)
    }

    /// The built-in hologram composite effect.
    pub fn hologram() -> Self {
        Self::new("Hologram", include_str!("shaders/hologram.wgsl"))
    }

    /// Replaces the shader pass entry points. Index `i` is pass `i`.
    pub fn with_passes<I, S>(mut self, passes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passes = passes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the constant color handed to the shader with every draw.
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Fragment entry point for shader pass `index`.
    pub fn entry_point(&self, index: u32) -> Option<&str> {
        self.passes.get(index as usize).map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.passes.is_empty() {
            return Err(ConfigError::NoShaderPasses(self.name.clone()));
        }
        if !self.color.is_finite() {
            return Err(ConfigError::NonFinite("material color"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Material::lit("a");
        let b = Material::lit("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn pass_zero_is_fs_by_default() {
        let material = Material::hologram();
        assert_eq!(material.entry_point(0), Some("fs"));
        assert_eq!(material.entry_point(1), None);
    }

    #[test]
    fn custom_passes_map_by_index() {
        let material = Material::hologram().with_passes(["fs_main", "fs_debug"]);
        assert_eq!(material.pass_count(), 2);
        assert_eq!(material.entry_point(1), Some("fs_debug"));
    }

    #[test]
    fn material_without_passes_is_rejected() {
        let material = Material::lit("empty").with_passes(Vec::<String>::new());
        assert_eq!(
            material.validate(),
            Err(ConfigError::NoShaderPasses("empty".to_owned()))
        );
    }

    #[test]
    fn tint_material_carries_color() {
        let material = Material::tint("red", Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(material.color(), Color::rgb(1.0, 0.0, 0.0));
        assert!(material.validate().is_ok());
    }
}
