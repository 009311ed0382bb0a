//! Off-screen render targets owned by the hologram pass.
//!
//! A [`TargetSet`] holds the object color buffer, the object depth buffer, a
//! single-channel float mirror of that depth and (only when some mapping
//! declares a tint material) the tint buffer. All of them share one extent: viewport width × height × slice count, where slices
//! are the array layers used for stereo / multi-view rendering.
//!
//! The set is allocated once per activation and released on cleanup. When the
//! viewport changes, [`TargetSet::ensure_size`] reallocates every buffer
//! together, so the shared-extent invariant always holds.
//!
//! The composite never samples the depth buffer itself. Capture draws write
//! their fragment depth into the mirror as a second color output, and the
//! composite loads that instead, since depth texture loads do not translate
//! on every backend.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::capture::needs_tint_prepass;
use crate::commands::Attachment;
use crate::config::HologramConfig;
use crate::error::ResourceError;
use crate::gpu::GpuContext;

static LIVE_TARGET_SETS: AtomicUsize = AtomicUsize::new(0);

/// Number of target sets acquired and not yet released, process-wide.
pub fn live_target_sets() -> usize {
    LIVE_TARGET_SETS.load(Ordering::SeqCst)
}

/// Size of the region the host renders this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Array layers, one per view (1 for mono, 2 for stereo).
    pub slices: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            slices: 1,
        }
    }

    pub fn with_slices(mut self, slices: u32) -> Self {
        self.slices = slices;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.slices == 0
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.slices,
        }
    }
}

/// Precision of the object depth buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthBits {
    Depth16,
    #[default]
    Depth24,
    Depth32,
}

impl DepthBits {
    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            DepthBits::Depth16 => wgpu::TextureFormat::Depth16Unorm,
            DepthBits::Depth24 => wgpu::TextureFormat::Depth24Plus,
            DepthBits::Depth32 => wgpu::TextureFormat::Depth32Float,
        }
    }
}

/// Role of a buffer within the target set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Color,
    Depth,
    DepthMirror,
    Tint,
}

/// Everything needed to allocate one buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSpec {
    pub role: BufferRole,
    pub label: &'static str,
    pub format: wgpu::TextureFormat,
    pub viewport: Viewport,
}

/// Which buffers a target set holds, at what size and format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSetDescriptor {
    pub viewport: Viewport,
    pub color_format: wgpu::TextureFormat,
    pub depth_bits: DepthBits,
    /// Allocate the tint buffer.
    pub tint: bool,
}

impl TargetSetDescriptor {
    /// Compact HDR RGB, the preferred object color format.
    pub const DEFAULT_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg11b10Ufloat;
    /// Used when the device cannot render to the requested color format.
    pub const FALLBACK_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
    /// Readable copy of the object depth.
    pub const DEPTH_MIRROR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            color_format: Self::DEFAULT_COLOR_FORMAT,
            depth_bits: DepthBits::default(),
            tint: false,
        }
    }

    /// The buffers `config` needs at `viewport`. The tint buffer is only
    /// requested when some mapping declares a tint material.
    pub fn for_config(config: &HologramConfig, viewport: Viewport) -> Self {
        Self {
            viewport,
            color_format: config.color_format,
            depth_bits: config.depth_bits,
            tint: needs_tint_prepass(&config.mappings),
        }
    }

    pub fn with_color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    pub fn with_depth_bits(mut self, depth_bits: DepthBits) -> Self {
        self.depth_bits = depth_bits;
        self
    }

    pub fn with_tint(mut self, tint: bool) -> Self {
        self.tint = tint;
        self
    }

    /// The buffers to allocate: color, depth and its mirror always, tint on
    /// request.
    pub fn buffers(&self) -> Vec<BufferSpec> {
        let mut specs = vec![
            BufferSpec {
                role: BufferRole::Color,
                label: "Hologram Object Buffer",
                format: self.color_format,
                viewport: self.viewport,
            },
            BufferSpec {
                role: BufferRole::Depth,
                label: "Hologram Object Buffer Depth",
                format: self.depth_bits.format(),
                viewport: self.viewport,
            },
            BufferSpec {
                role: BufferRole::DepthMirror,
                label: "Hologram Object Buffer Depth Mirror",
                format: Self::DEPTH_MIRROR_FORMAT,
                viewport: self.viewport,
            },
        ];
        if self.tint {
            specs.push(BufferSpec {
                role: BufferRole::Tint,
                label: "Hologram Object Tint Buffer",
                format: self.color_format,
                viewport: self.viewport,
            });
        }
        specs
    }

    /// Replaces formats the device cannot render to.
    fn resolved_for(mut self, gpu: &GpuContext) -> Self {
        if !gpu.supports_render_format(self.color_format) {
            tracing::warn!(
                "Color format {:?} is not renderable on this device, using {:?}",
                self.color_format,
                Self::FALLBACK_COLOR_FORMAT
            );
            self.color_format = Self::FALLBACK_COLOR_FORMAT;
        }
        self
    }

    fn check_limits(&self, limits: &wgpu::Limits) -> Result<(), ResourceError> {
        let Viewport {
            width,
            height,
            slices,
        } = self.viewport;
        if self.viewport.is_empty() {
            return Err(ResourceError::EmptyViewport {
                width,
                height,
                slices,
            });
        }
        let max_dim = limits.max_texture_dimension_2d;
        if width > max_dim || height > max_dim || slices > limits.max_texture_array_layers {
            return Err(ResourceError::ExceedsLimits {
                label: "Hologram Target Set",
                width,
                height,
                slices,
            });
        }
        Ok(())
    }
}

/// One off-screen buffer: the texture, one attachment view per slice and an
/// array view for sampling.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    slice_views: Vec<wgpu::TextureView>,
    sample_view: wgpu::TextureView,
    spec: BufferSpec,
}

impl RenderTarget {
    fn new(gpu: &GpuContext, spec: BufferSpec) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(spec.label),
            size: spec.viewport.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: spec.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let slice_views = (0..spec.viewport.slices)
            .map(|slice| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(spec.label),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: slice,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(spec.label),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        Self {
            texture,
            slice_views,
            sample_view,
            spec,
        }
    }

    pub fn spec(&self) -> &BufferSpec {
        &self.spec
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.spec.format
    }

    /// Attachment view of one array layer.
    pub fn slice_view(&self, slice: u32) -> Option<&wgpu::TextureView> {
        self.slice_views.get(slice as usize)
    }

    /// View of every layer, for binding as `texture_2d_array`.
    pub fn sample_view(&self) -> &wgpu::TextureView {
        &self.sample_view
    }
}

/// The object color, object depth, depth mirror and optional tint buffers of
/// one pass activation.
pub struct TargetSet {
    descriptor: TargetSetDescriptor,
    color: RenderTarget,
    depth: RenderTarget,
    depth_mirror: RenderTarget,
    tint: Option<RenderTarget>,
    released: bool,
}

impl TargetSet {
    /// Allocates every buffer in `descriptor`.
    ///
    /// Either all buffers are allocated or none are: on failure everything
    /// created so far is destroyed before the error is returned.
    pub fn acquire(
        gpu: &GpuContext,
        descriptor: &TargetSetDescriptor,
    ) -> Result<Self, ResourceError> {
        let descriptor = descriptor.resolved_for(gpu);
        descriptor.check_limits(&gpu.device.limits())?;

        gpu.device.push_error_scope(wgpu::ErrorFilter::Internal);
        gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut color = None;
        let mut depth = None;
        let mut depth_mirror = None;
        let mut tint = None;
        for spec in descriptor.buffers() {
            let target = RenderTarget::new(gpu, spec);
            match spec.role {
                BufferRole::Color => color = Some(target),
                BufferRole::Depth => depth = Some(target),
                BufferRole::DepthMirror => depth_mirror = Some(target),
                BufferRole::Tint => tint = Some(target),
            }
        }

        let validation = pollster::block_on(gpu.device.pop_error_scope());
        let out_of_memory = pollster::block_on(gpu.device.pop_error_scope());
        let internal = pollster::block_on(gpu.device.pop_error_scope());

        let failure = validation
            .or(out_of_memory)
            .or(internal)
            .map(|e| e.to_string());
        let (color, depth, depth_mirror) = match (color, depth, depth_mirror, failure) {
            (Some(color), Some(depth), Some(depth_mirror), None) => (color, depth, depth_mirror),
            (color, depth, depth_mirror, failure) => {
                let allocated = color.iter().chain(&depth).chain(&depth_mirror).chain(&tint);
                for target in allocated {
                    target.texture.destroy();
                }
                return Err(ResourceError::Allocation {
                    label: "Hologram Target Set",
                    message: failure.unwrap_or_else(|| "missing required buffer".to_owned()),
                });
            }
        };

        LIVE_TARGET_SETS.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            width = descriptor.viewport.width,
            height = descriptor.viewport.height,
            slices = descriptor.viewport.slices,
            tint = descriptor.tint,
            "Allocated hologram target set"
        );

        Ok(Self {
            descriptor,
            color,
            depth,
            depth_mirror,
            tint,
            released: false,
        })
    }

    /// Reallocates all buffers if `viewport` differs from the current extent.
    ///
    /// Returns `Ok(true)` when a reallocation happened. On failure the current
    /// buffers are kept.
    pub fn ensure_size(
        &mut self,
        gpu: &GpuContext,
        viewport: Viewport,
    ) -> Result<bool, ResourceError> {
        if self.descriptor.viewport == viewport {
            return Ok(false);
        }
        let descriptor = TargetSetDescriptor {
            viewport,
            ..self.descriptor
        };
        let replacement = Self::acquire(gpu, &descriptor)?;
        self.release();
        *self = replacement;
        Ok(true)
    }

    /// Destroys every buffer.
    ///
    /// Releasing twice is a programming error: it asserts in debug builds and
    /// is ignored (with a warning) in release builds.
    pub fn release(&mut self) {
        debug_assert!(!self.released, "hologram target set released twice");
        if self.released {
            tracing::warn!("Ignoring second release of hologram target set");
            return;
        }
        self.color.texture.destroy();
        self.depth.texture.destroy();
        self.depth_mirror.texture.destroy();
        if let Some(tint) = &self.tint {
            tint.texture.destroy();
        }
        self.released = true;
        LIVE_TARGET_SETS.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn descriptor(&self) -> &TargetSetDescriptor {
        &self.descriptor
    }

    pub fn viewport(&self) -> Viewport {
        self.descriptor.viewport
    }

    pub fn color(&self) -> &RenderTarget {
        &self.color
    }

    pub fn depth(&self) -> &RenderTarget {
        &self.depth
    }

    pub fn depth_mirror(&self) -> &RenderTarget {
        &self.depth_mirror
    }

    pub fn tint(&self) -> Option<&RenderTarget> {
        self.tint.as_ref()
    }

    pub fn has_tint(&self) -> bool {
        self.tint.is_some()
    }

    /// The buffer behind an object attachment. Camera attachments belong to
    /// the host and return `None`.
    pub fn target(&self, attachment: Attachment) -> Option<&RenderTarget> {
        match attachment {
            Attachment::ObjectColor => Some(&self.color),
            Attachment::ObjectDepth => Some(&self.depth),
            Attachment::ObjectDepthMirror => Some(&self.depth_mirror),
            Attachment::ObjectTint => self.tint.as_ref(),
            Attachment::CameraColor | Attachment::CameraDepth => None,
        }
    }
}

impl Drop for TargetSet {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Hologram target set dropped without release, releasing now");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TargetSetDescriptor {
        TargetSetDescriptor::new(Viewport::new(320, 200).with_slices(2))
    }

    #[test]
    fn tint_buffer_only_on_request() {
        let roles: Vec<_> = descriptor().buffers().iter().map(|b| b.role).collect();
        assert_eq!(
            roles,
            vec![BufferRole::Color, BufferRole::Depth, BufferRole::DepthMirror]
        );

        let roles: Vec<_> = descriptor()
            .with_tint(true)
            .buffers()
            .iter()
            .map(|b| b.role)
            .collect();
        assert_eq!(
            roles,
            vec![
                BufferRole::Color,
                BufferRole::Depth,
                BufferRole::DepthMirror,
                BufferRole::Tint,
            ]
        );
    }

    #[test]
    fn tint_buffer_follows_mapping_materials() {
        use std::rc::Rc;

        use crate::color::Color;
        use crate::layer::LayerTintMapping;
        use crate::material::Material;

        let viewport = Viewport::new(64, 64);
        let untinted = HologramConfig::builder()
            .mapping(LayerTintMapping::new(1u32))
            .depth_bits(DepthBits::Depth16)
            .build()
            .unwrap();
        let desc = TargetSetDescriptor::for_config(&untinted, viewport);
        assert!(!desc.tint);
        assert_eq!(desc.depth_bits, DepthBits::Depth16);

        let tinted = HologramConfig::builder()
            .mapping(LayerTintMapping::new(1u32))
            .mapping(
                LayerTintMapping::new(2u32)
                    .with_tint(Rc::new(Material::tint("t", Color::WHITE))),
            )
            .build()
            .unwrap();
        let desc = TargetSetDescriptor::for_config(&tinted, viewport);
        assert!(desc.tint);
        assert_eq!(desc.buffers().len(), 4);
    }

    #[test]
    fn all_buffers_share_extent() {
        let specs = descriptor().with_tint(true).buffers();
        assert!(specs.iter().all(|s| s.viewport == Viewport::new(320, 200).with_slices(2)));
    }

    #[test]
    fn formats_follow_configuration() {
        let specs = descriptor()
            .with_tint(true)
            .with_color_format(wgpu::TextureFormat::Rgba16Float)
            .with_depth_bits(DepthBits::Depth32)
            .buffers();
        assert_eq!(specs[0].format, wgpu::TextureFormat::Rgba16Float);
        assert_eq!(specs[1].format, wgpu::TextureFormat::Depth32Float);
        assert_eq!(specs[2].format, wgpu::TextureFormat::R32Float);
        assert_eq!(specs[3].format, wgpu::TextureFormat::Rgba16Float);
    }

    #[test]
    fn default_color_format_is_compact_hdr() {
        assert_eq!(descriptor().color_format, wgpu::TextureFormat::Rg11b10Ufloat);
        assert_eq!(DepthBits::default().format(), wgpu::TextureFormat::Depth24Plus);
        assert_eq!(DepthBits::Depth16.format(), wgpu::TextureFormat::Depth16Unorm);
    }

    #[test]
    fn empty_viewport_is_rejected() {
        let desc = TargetSetDescriptor::new(Viewport::new(0, 200));
        assert_eq!(
            desc.check_limits(&wgpu::Limits::default()),
            Err(ResourceError::EmptyViewport {
                width: 0,
                height: 200,
                slices: 1,
            })
        );
    }

    #[test]
    fn oversized_viewport_is_rejected() {
        let limits = wgpu::Limits::default();
        let desc = TargetSetDescriptor::new(Viewport::new(limits.max_texture_dimension_2d + 1, 8));
        assert!(matches!(
            desc.check_limits(&limits),
            Err(ResourceError::ExceedsLimits { .. })
        ));
        let desc = TargetSetDescriptor::new(
            Viewport::new(8, 8).with_slices(limits.max_texture_array_layers + 1),
        );
        assert!(desc.check_limits(&limits).is_err());
    }

    // The tests below need a GPU and are skipped when no adapter is available.

    #[test]
    fn acquire_and_release_balance_live_count() {
        let _guard = crate::gpu::test_lock();
        let Some(gpu) = GpuContext::headless(64, 64) else {
            return;
        };
        let before = live_target_sets();
        let mut set = TargetSet::acquire(&gpu, &descriptor().with_tint(true)).unwrap();
        assert!(set.has_tint());
        assert_eq!(set.color().spec().viewport.slices, 2);
        assert!(set.color().slice_view(1).is_some());
        assert!(set.color().slice_view(2).is_none());
        assert_eq!(set.depth_mirror().format(), wgpu::TextureFormat::R32Float);
        assert!(set.target(Attachment::ObjectDepthMirror).is_some());
        assert!(set.target(Attachment::CameraDepth).is_none());
        set.release();
        assert!(set.is_released());
        assert_eq!(live_target_sets(), before);
    }

    #[test]
    fn ensure_size_reallocates_everything() {
        let _guard = crate::gpu::test_lock();
        let Some(gpu) = GpuContext::headless(64, 64) else {
            return;
        };
        let mut set = TargetSet::acquire(&gpu, &descriptor()).unwrap();
        assert!(!set.ensure_size(&gpu, set.viewport()).unwrap());

        let resized = Viewport::new(100, 50).with_slices(2);
        assert!(set.ensure_size(&gpu, resized).unwrap());
        assert_eq!(set.viewport(), resized);
        assert_eq!(set.depth().spec().viewport, resized);
        assert_eq!(set.depth_mirror().spec().viewport, resized);
        set.release();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "released twice")]
    fn double_release_asserts_in_debug() {
        let _guard = crate::gpu::test_lock();
        let Some(gpu) = GpuContext::headless(64, 64) else {
            panic!("released twice (no adapter)");
        };
        let mut set = TargetSet::acquire(&gpu, &descriptor()).unwrap();
        set.release();
        set.release();
    }
}
