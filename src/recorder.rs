//! wgpu implementation of [`CommandRecorder`].
//!
//! wgpu has no "set render target" command: attachments and their load ops
//! are fixed when a render pass begins. [`WgpuRecorder`] therefore remembers
//! the bound attachments and the requested clear, and opens a fresh render
//! pass for every draw. The first pass after a bind applies the clear; later
//! ones load. A clear that no draw consumed is flushed when the next target
//! is bound or in [`WgpuRecorder::finish`].
//!
//! Binding the object depth also attaches its mirror as color output 1.

use crate::camera::Camera;
use crate::color::Color;
use crate::commands::{
    Attachment, ClearFlags, CommandRecorder, DrawRenderers, FullScreenDraw,
};
use crate::composite::{CompositeBindings, CompositeRenderer};
use crate::gpu::GpuContext;
use crate::params::CompositeFrame;
use crate::target_set::TargetSet;
use crate::texture::Texture;

/// Where and how a scene draw lands.
#[derive(Clone, Copy)]
pub struct SceneTarget<'a> {
    pub gpu: &'a GpuContext,
    pub camera: &'a Camera,
    pub aspect: f32,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    /// Format of color output 1, when the pass carries a depth mirror.
    pub depth_mirror_format: Option<wgpu::TextureFormat>,
}

/// The host's ability to draw its culled renderables by layer.
///
/// Implementations draw every visible object whose layers intersect
/// `draw.layers`, in a stable order, with `draw.depth` as the depth test and
/// `draw.override_material` (if any) in place of the objects' own materials.
///
/// When `target.depth_mirror_format` is set, pipelines need a second color
/// target of that format and materials write the fragment depth
/// (`position.z`) to `@location(1)`.
pub trait SceneRenderer {
    fn draw_renderers(
        &self,
        target: &SceneTarget<'_>,
        pass: &mut wgpu::RenderPass<'_>,
        draw: &DrawRenderers<'_>,
    );
}

/// The host camera's attachments for one view.
#[derive(Clone, Copy)]
pub struct CameraTargets<'a> {
    pub camera: &'a Camera,
    pub color: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
}

/// Everything one view of one frame can bind.
#[derive(Clone, Copy)]
pub struct FrameAttachments<'a> {
    pub targets: &'a TargetSet,
    pub camera: CameraTargets<'a>,
    /// Array layer of the target set holding this view.
    pub slice: u32,
}

impl<'a> FrameAttachments<'a> {
    fn view(&self, attachment: Attachment) -> Option<&'a wgpu::TextureView> {
        let targets: &'a TargetSet = self.targets;
        match attachment {
            Attachment::CameraColor => Some(self.camera.color),
            Attachment::CameraDepth => Some(self.camera.depth),
            _ => targets.target(attachment)?.slice_view(self.slice),
        }
    }

    fn format(&self, attachment: Attachment) -> Option<wgpu::TextureFormat> {
        match attachment {
            Attachment::CameraColor => Some(self.camera.color_format),
            Attachment::CameraDepth => Some(self.camera.depth_format),
            _ => self.targets.target(attachment).map(|t| t.format()),
        }
    }

    /// The mirror attached next to `depth`, if it is the object depth.
    fn depth_mirror(&self, depth: Attachment) -> Option<&'a wgpu::TextureView> {
        match depth {
            Attachment::ObjectDepth => self.view(Attachment::ObjectDepthMirror),
            _ => None,
        }
    }

    fn sample_view(&self, attachment: Attachment) -> Option<&'a wgpu::TextureView> {
        let targets: &'a TargetSet = self.targets;
        targets.target(attachment).map(|t| t.sample_view())
    }
}

/// Clear value for a color attachment. The tint buffer clears to white so
/// objects without a tint material composite untinted. The depth mirror
/// clears to the far plane, like the depth it copies.
fn clear_color(attachment: Attachment) -> Color {
    match attachment {
        Attachment::ObjectTint => Color::WHITE,
        Attachment::ObjectDepthMirror => Color::rgba(1.0, 0.0, 0.0, 0.0),
        _ => Color::TRANSPARENT,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Binding {
    color: Attachment,
    depth: Attachment,
}

/// Records capture and composite commands into a wgpu encoder.
pub struct WgpuRecorder<'a> {
    gpu: &'a GpuContext,
    encoder: &'a mut wgpu::CommandEncoder,
    attachments: FrameAttachments<'a>,
    scene: &'a dyn SceneRenderer,
    composite: &'a CompositeRenderer,
    lines: &'a Texture,
    bound: Option<Binding>,
    pending_clear: ClearFlags,
    passes: usize,
}

impl<'a> WgpuRecorder<'a> {
    pub fn new(
        gpu: &'a GpuContext,
        encoder: &'a mut wgpu::CommandEncoder,
        attachments: FrameAttachments<'a>,
        scene: &'a dyn SceneRenderer,
        composite: &'a CompositeRenderer,
        lines: &'a Texture,
    ) -> Self {
        Self {
            gpu,
            encoder,
            attachments,
            scene,
            composite,
            lines,
            bound: None,
            pending_clear: ClearFlags::NONE,
            passes: 0,
        }
    }

    /// Flushes an unconsumed clear. Returns the number of render passes
    /// recorded.
    pub fn finish(mut self) -> usize {
        self.flush_clear();
        self.passes
    }

    fn flush_clear(&mut self) {
        if self.pending_clear != ClearFlags::NONE {
            drop(self.begin_pass("Hologram Clear"));
        }
    }

    /// Opens a render pass on the bound attachments, consuming the pending
    /// clear.
    fn begin_pass(&mut self, label: &'static str) -> Option<wgpu::RenderPass<'_>> {
        let Some(binding) = self.bound else {
            tracing::warn!("Draw recorded before a render target was bound");
            return None;
        };
        let (Some(color), Some(depth)) = (
            self.attachments.view(binding.color),
            self.attachments.view(binding.depth),
        ) else {
            tracing::warn!(?binding, "Bound attachment is not available, skipping");
            self.pending_clear = ClearFlags::NONE;
            return None;
        };

        let clear = std::mem::take(&mut self.pending_clear);
        let color_load = if clear.color {
            wgpu::LoadOp::Clear(clear_color(binding.color).to_wgpu())
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if clear.depth {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };

        let mut color_attachments = vec![Some(wgpu::RenderPassColorAttachment {
            view: color,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
        })];
        if let Some(mirror) = self.attachments.depth_mirror(binding.depth) {
            let load = if clear.depth {
                wgpu::LoadOp::Clear(clear_color(Attachment::ObjectDepthMirror).to_wgpu())
            } else {
                wgpu::LoadOp::Load
            };
            color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                view: mirror,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            }));
        }

        self.passes += 1;
        Some(self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        }))
    }

    fn bound_formats(&self) -> Option<(wgpu::TextureFormat, wgpu::TextureFormat)> {
        let binding = self.bound?;
        Some((
            self.attachments.format(binding.color)?,
            self.attachments.format(binding.depth)?,
        ))
    }
}

impl CommandRecorder for WgpuRecorder<'_> {
    fn set_render_target(&mut self, color: Attachment, depth: Attachment, clear: ClearFlags) {
        self.flush_clear();
        self.bound = Some(Binding { color, depth });
        self.pending_clear = clear;
    }

    fn draw_renderers(&mut self, draw: &DrawRenderers<'_>) {
        let Some((color_format, depth_format)) = self.bound_formats() else {
            return;
        };
        let depth_mirror_format = self
            .bound
            .filter(|binding| binding.depth == Attachment::ObjectDepth)
            .and_then(|_| self.attachments.format(Attachment::ObjectDepthMirror));
        let target = SceneTarget {
            gpu: self.gpu,
            camera: self.attachments.camera.camera,
            aspect: self.attachments.targets.viewport().aspect(),
            color_format,
            depth_format,
            depth_mirror_format,
        };
        let scene = self.scene;
        if let Some(mut pass) = self.begin_pass("Hologram Capture") {
            scene.draw_renderers(&target, &mut pass, draw);
        }
    }

    fn draw_full_screen(&mut self, draw: &FullScreenDraw<'_>) {
        let Some((color_format, depth_format)) = self.bound_formats() else {
            return;
        };
        let attachments = self.attachments;
        let (Some(color), Some(depth)) = (
            attachments.sample_view(draw.inputs.color),
            attachments.sample_view(draw.inputs.depth),
        ) else {
            tracing::warn!(inputs = ?draw.inputs, "Composite inputs are not available, skipping");
            return;
        };
        let bindings = CompositeBindings {
            color,
            depth,
            tint: draw.inputs.tint.and_then(|t| attachments.sample_view(t)),
            lines: self.lines,
        };
        let viewport = attachments.targets.viewport();
        let frame = CompositeFrame {
            camera: attachments.camera.camera,
            width: viewport.width,
            height: viewport.height,
            slice: attachments.slice,
            has_tint: bindings.tint.is_some(),
        };

        let gpu = self.gpu;
        let composite = self.composite;
        if let Some(mut pass) = self.begin_pass("Hologram Composite") {
            composite.draw(gpu, &mut pass, color_format, depth_format, draw, &bindings, frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tint_clears_to_white_and_object_color_to_transparent() {
        assert_eq!(clear_color(Attachment::ObjectTint), Color::WHITE);
        assert_eq!(clear_color(Attachment::ObjectColor), Color::TRANSPARENT);
    }

    #[test]
    fn depth_mirror_clears_to_far_plane() {
        assert_eq!(clear_color(Attachment::ObjectDepthMirror).r, 1.0);
    }
}
