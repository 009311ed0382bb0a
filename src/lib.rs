//! # Holopass
//!
//! **A wgpu render pass that draws layer-masked objects as scanlined holograms.**
//!
//! Objects on selected layers are captured into off-screen buffers, then
//! composited over the camera image with a scrolling line pattern, an
//! optional per-layer tint and a configurable scanline band.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::rc::Rc;
//! use holopass::*;
//!
//! fn build() -> Result<HologramPass> {
//!     let cyan = Rc::new(Material::tint("cyan", Color::HOLO_CYAN));
//!     let config = HologramConfig::builder()
//!         .mapping(LayerTintMapping::new(LayerMask::layer(1)).with_tint(cyan))
//!         .scroll_velocity(Vec3::new(0.0, 0.05, 0.0))
//!         .scanline(0.2, 0.6)
//!         .build()?;
//!     Ok(HologramPass::new(config))
//! }
//! ```
//!
//! The host then drives the pass through [`CustomPass`]: `setup` once,
//! `aggregate_culling_parameters` and `execute` every frame, `cleanup` once.

mod camera;
mod capture;
mod color;
mod commands;
mod composite;
mod config;
mod error;
mod gpu;
mod layer;
mod material;
mod mesh;
mod mesh_renderer;
mod params;
mod pass;
mod recorder;
mod scroll;
mod target_set;
mod texture;

pub use camera::Camera;
pub use capture::{CaptureSummary, needs_tint_prepass, record_capture};
pub use color::Color;
pub use commands::{
    Attachment, ClearFlags, CommandRecorder, DepthState, DrawRenderers, EffectInputs,
    FullScreenDraw,
};
pub use composite::{
    COMPOSITE_SHADER_PASS, CompositeBindings, CompositeRenderer, effect_inputs, record_composite,
};
pub use config::{HologramConfig, HologramConfigBuilder, LinesTexture};
pub use error::{ConfigError, HologramError, ResourceError, Result};
pub use gpu::GpuContext;
pub use layer::{CullingParameters, LayerMask, LayerTintMapping, aggregate_culling_mask};
pub use material::{Material, MaterialId};
pub use mesh::{Mesh, MeshData, MeshId, MeshQueue, QueuedMesh, Transform, Vertex3d};
pub use mesh_renderer::{MeshRenderer, MeshScene};
pub use params::{CompositeFrame, EffectParameters, HologramUniforms, OrientationMode, ScanlineRemap};
pub use pass::{CustomPass, HologramPass, PassContext, PassState};
pub use recorder::{CameraTargets, SceneRenderer, SceneTarget, WgpuRecorder};
pub use scroll::{FrameTiming, ScrollState};
pub use target_set::{
    BufferRole, BufferSpec, DepthBits, RenderTarget, TargetSet, TargetSetDescriptor, Viewport,
    live_target_sets,
};
pub use texture::Texture;

pub use glam::{Mat4, Quat, Vec3};
