//! The hologram pass and the lifecycle contract it shares with the host.
//!
//! The host drives every [`CustomPass`] through the same sequence:
//!
//! ```text
//! setup ──► (aggregate_culling_parameters ─► cull ─► execute)* ──► cleanup
//! ```
//!
//! [`PassState`] enforces it. Executing a pass that is not active, or setting
//! up a pass twice, is a host bug and panics. Releasing twice asserts in debug
//! builds and is ignored in release builds.

use std::rc::Rc;

use crate::capture::record_capture;
use crate::composite::{CompositeRenderer, effect_inputs, record_composite};
use crate::config::{HologramConfig, HologramConfigBuilder, LinesTexture};
use crate::error::{ConfigError, ResourceError, Result};
use crate::gpu::GpuContext;
use crate::layer::{CullingParameters, LayerMask, LayerTintMapping};
use crate::material::Material;
use crate::recorder::{CameraTargets, FrameAttachments, SceneRenderer, WgpuRecorder};
use crate::scroll::{FrameTiming, ScrollState};
use crate::target_set::{TargetSet, TargetSetDescriptor, Viewport};
use crate::texture::Texture;

/// Lifecycle state of a custom pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PassState {
    #[default]
    Uninitialized,
    Active,
    Released,
}

impl PassState {
    /// # Panics
    ///
    /// Panics unless the pass is uninitialized.
    pub fn begin_setup(&self) {
        assert!(
            *self == PassState::Uninitialized,
            "setup called on a {self:?} pass"
        );
    }

    /// # Panics
    ///
    /// Panics unless the pass is active.
    pub fn require_active(&self, operation: &str) {
        assert!(
            *self == PassState::Active,
            "{operation} called on a {self:?} pass"
        );
    }

    pub fn activate(&mut self) {
        self.begin_setup();
        *self = PassState::Active;
    }

    /// Moves an active pass to released. Returns whether anything changed.
    pub fn release(&mut self) -> bool {
        debug_assert!(
            *self == PassState::Active,
            "cleanup called on a {self:?} pass"
        );
        if *self != PassState::Active {
            tracing::warn!(state = ?self, "Ignoring cleanup of inactive pass");
            return false;
        }
        *self = PassState::Released;
        true
    }
}

/// Everything a pass can use while executing one frame.
pub struct PassContext<'a> {
    pub gpu: &'a GpuContext,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// One entry per view (array slice), in slice order.
    pub views: &'a [CameraTargets<'a>],
    pub viewport: Viewport,
    pub timing: FrameTiming,
    /// The host's culled renderables.
    pub scene: &'a dyn SceneRenderer,
}

/// A render pass plugged into the host pipeline.
pub trait CustomPass {
    /// Allocates the pass's resources. On error nothing stays allocated and
    /// the pass remains uninitialized.
    fn setup(&mut self, gpu: &GpuContext, viewport: Viewport) -> Result<()>;

    /// Widens the host's culling parameters before it culls the scene.
    fn aggregate_culling_parameters(&self, _parameters: &mut CullingParameters) {}

    /// Records this frame's commands.
    fn execute(&mut self, ctx: &mut PassContext<'_>);

    /// Releases everything `setup` allocated.
    fn cleanup(&mut self);
}

struct PassResources {
    targets: TargetSet,
    composite: CompositeRenderer,
    lines: Texture,
}

/// Renders objects on the configured layers as holograms.
pub struct HologramPass {
    config: HologramConfig,
    state: PassState,
    scroll: ScrollState,
    resources: Option<PassResources>,
}

impl HologramPass {
    pub fn new(config: HologramConfig) -> Self {
        let scroll = ScrollState::new(config.scroll_velocity);
        Self {
            config,
            state: PassState::Uninitialized,
            scroll,
            resources: None,
        }
    }

    /// A pass over a single layer mask, with an optional tint material.
    ///
    /// `settings` supplies everything else; any mappings it already holds are
    /// replaced.
    pub fn single(
        layers: LayerMask,
        tint_material: Option<Rc<Material>>,
        settings: HologramConfigBuilder,
    ) -> std::result::Result<Self, ConfigError> {
        let mut mapping = LayerTintMapping::new(layers);
        mapping.tint_material = tint_material;
        let config = settings.mappings([mapping]).build()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &HologramConfig {
        &self.config
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn scroll(&self) -> &ScrollState {
        &self.scroll
    }

    /// The off-screen buffers, while the pass is active.
    pub fn target_set(&self) -> Option<&TargetSet> {
        self.resources.as_ref().map(|r| &r.targets)
    }

    fn load_lines(&self, gpu: &GpuContext) -> std::result::Result<Texture, ResourceError> {
        match &self.config.lines_texture {
            LinesTexture::Generated { size, line_count } => {
                Ok(Texture::scanlines(gpu, *size, *line_count))
            }
            LinesTexture::File(path) => {
                Texture::from_file(gpu, path).map_err(|e| ResourceError::Texture {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

impl CustomPass for HologramPass {
    fn setup(&mut self, gpu: &GpuContext, viewport: Viewport) -> Result<()> {
        self.state.begin_setup();

        let lines = self.load_lines(gpu)?;
        let descriptor = TargetSetDescriptor::for_config(&self.config, viewport);
        let targets = TargetSet::acquire(gpu, &descriptor)?;

        if self.config.hologram_material.is_none() {
            tracing::warn!("No hologram material configured, objects are captured but not composited");
        }
        tracing::debug!(
            mappings = self.config.mappings.len(),
            tint_buffer = targets.has_tint(),
            "Hologram pass set up"
        );

        self.resources = Some(PassResources {
            targets,
            composite: CompositeRenderer::new(gpu),
            lines,
        });
        self.scroll = ScrollState::new(self.config.scroll_velocity);
        self.state.activate();
        Ok(())
    }

    fn aggregate_culling_parameters(&self, parameters: &mut CullingParameters) {
        parameters.culling_mask |= self.config.culling_mask();
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) {
        self.state.require_active("execute");
        let _span = tracing::info_span!("hologram_pass").entered();

        // the pattern keeps moving even on frames that end up skipped
        let offset = self.scroll.advance(ctx.timing.scaled_delta());
        let parameters = self.config.effect_parameters(offset);

        let Some(resources) = self.resources.as_mut() else {
            return;
        };
        if let Err(error) = resources.targets.ensure_size(ctx.gpu, ctx.viewport) {
            tracing::warn!("Skipping hologram frame: {error}");
            return;
        }

        let resources = &*resources;
        let tint_buffer = resources.targets.has_tint();
        let slices = resources.targets.viewport().slices as usize;
        if ctx.views.len() < slices {
            tracing::debug!(
                views = ctx.views.len(),
                slices,
                "Fewer camera views than target slices"
            );
        }

        for (slice, camera) in ctx.views.iter().take(slices).enumerate() {
            let attachments = FrameAttachments {
                targets: &resources.targets,
                camera: *camera,
                slice: slice as u32,
            };
            let mut recorder = WgpuRecorder::new(
                ctx.gpu,
                &mut *ctx.encoder,
                attachments,
                ctx.scene,
                &resources.composite,
                &resources.lines,
            );

            let summary = record_capture(&mut recorder, &self.config.mappings, tint_buffer);
            let composited = record_composite(
                &mut recorder,
                self.config.hologram_material.as_deref(),
                parameters,
                effect_inputs(tint_buffer),
            );
            let passes = recorder.finish();

            tracing::trace!(
                slice,
                tint_prepass = summary.tint_prepass,
                tint_draws = summary.tint_draws,
                object_draws = summary.object_draws,
                composited,
                passes,
                "Recorded hologram view"
            );
        }
    }

    fn cleanup(&mut self) {
        if !self.state.release() {
            return;
        }
        if let Some(mut resources) = self.resources.take() {
            resources.targets.release();
        }
        self.scroll.reset();
        tracing::debug!("Hologram pass released");
    }
}
