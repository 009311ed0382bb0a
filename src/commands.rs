//! The command-recording seam between the pass logic and the GPU.
//!
//! The capture and composite passes never touch wgpu directly. They describe
//! their work as a linear sequence of target switches and draws on a
//! [`CommandRecorder`], in the order the GPU must execute it. The wgpu
//! implementation lives in [`recorder`](crate::recorder); tests use an
//! in-memory recorder and check the sequence itself.

use crate::layer::LayerMask;
use crate::material::Material;
use crate::params::EffectParameters;

/// Render targets the hologram pass can bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Captured object colors (target set).
    ObjectColor,
    /// Per-layer tint stamped by the pre-pass (target set, optional).
    ObjectTint,
    /// Depth shared by the tint pre-pass and the object draw (target set).
    ///
    /// Binding it also binds [`ObjectDepthMirror`](Self::ObjectDepthMirror)
    /// as a second color output, cleared whenever the depth is.
    ObjectDepth,
    /// Single-channel float copy of `ObjectDepth`, for sampling (target set).
    ObjectDepthMirror,
    /// The host camera's color buffer.
    CameraColor,
    /// The host camera's depth buffer.
    CameraDepth,
}

/// Which channels of the bound targets are cleared when binding them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ClearFlags {
    pub color: bool,
    pub depth: bool,
}

impl ClearFlags {
    pub const NONE: ClearFlags = ClearFlags {
        color: false,
        depth: false,
    };
    pub const COLOR: ClearFlags = ClearFlags {
        color: true,
        depth: false,
    };
    pub const ALL: ClearFlags = ClearFlags {
        color: true,
        depth: true,
    };
}

/// Depth-test override applied to a renderer draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub write: bool,
    pub compare: wgpu::CompareFunction,
}

impl DepthState {
    pub const LESS: DepthState = DepthState {
        write: true,
        compare: wgpu::CompareFunction::Less,
    };
    pub const LESS_EQUAL: DepthState = DepthState {
        write: true,
        compare: wgpu::CompareFunction::LessEqual,
    };

    /// Whether a fragment at `incoming` depth passes against `stored`.
    pub fn passes(&self, incoming: f32, stored: f32) -> bool {
        use wgpu::CompareFunction::*;
        match self.compare {
            Never => false,
            Less => incoming < stored,
            Equal => incoming == stored,
            LessEqual => incoming <= stored,
            Greater => incoming > stored,
            NotEqual => incoming != stored,
            GreaterEqual => incoming >= stored,
            Always => true,
        }
    }
}

/// Draws every culled renderable on `layers`, with a depth override and an
/// optional material that replaces the objects' own.
#[derive(Clone, Copy, Debug)]
pub struct DrawRenderers<'a> {
    pub layers: LayerMask,
    pub depth: DepthState,
    pub override_material: Option<&'a Material>,
}

/// Target-set buffers sampled by the composite effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectInputs {
    pub color: Attachment,
    pub depth: Attachment,
    pub tint: Option<Attachment>,
}

/// One full-screen draw of an effect program.
#[derive(Clone, Copy, Debug)]
pub struct FullScreenDraw<'a> {
    pub material: &'a Material,
    pub shader_pass: u32,
    pub inputs: EffectInputs,
    pub parameters: EffectParameters,
}

/// A linear command stream for one view of one frame.
///
/// Draws go to the targets bound by the most recent
/// [`set_render_target`](Self::set_render_target). Clears requested there are
/// applied before the first draw, or when the next target is bound if no draw
/// follows.
pub trait CommandRecorder {
    fn set_render_target(&mut self, color: Attachment, depth: Attachment, clear: ClearFlags);

    fn draw_renderers(&mut self, draw: &DrawRenderers<'_>);

    fn draw_full_screen(&mut self, draw: &FullScreenDraw<'_>);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn less_equal_accepts_ties_and_less_rejects_them() {
        assert!(DepthState::LESS_EQUAL.passes(0.5, 0.5));
        assert!(!DepthState::LESS.passes(0.5, 0.5));
        assert!(DepthState::LESS.passes(0.4, 0.5));
        assert!(!DepthState::LESS_EQUAL.passes(0.6, 0.5));
    }
}
