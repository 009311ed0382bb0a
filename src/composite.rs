//! Composite pass: blends the captured objects into the camera targets.
//!
//! [`record_composite`] is the pass algorithm: one full-screen draw of the
//! hologram material's first shader pass, into the camera's color and depth
//! without clearing either. [`CompositeRenderer`] is the wgpu side that turns
//! that draw into a pipeline, a bind group and a triangle.
//!
//! The effect writes `frag_depth` from the captured object depth (read from
//! its single-channel mirror, which loads on every backend) and tests it
//! with `LessEqual` against the camera depth, so scene geometry in front of a
//! hologram still hides it.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::commands::{Attachment, ClearFlags, CommandRecorder, EffectInputs, FullScreenDraw};
use crate::gpu::GpuContext;
use crate::material::{Material, MaterialId};
use crate::params::{CompositeFrame, EffectParameters, HologramUniforms};
use crate::texture::Texture;

/// The composite always draws this shader pass of the hologram material.
pub const COMPOSITE_SHADER_PASS: u32 = 0;

/// Target-set buffers the composite samples. The tint buffer is only listed
/// when the target set owns one.
pub fn effect_inputs(tint_buffer: bool) -> EffectInputs {
    EffectInputs {
        color: Attachment::ObjectColor,
        depth: Attachment::ObjectDepthMirror,
        tint: tint_buffer.then_some(Attachment::ObjectTint),
    }
}

/// Records the composite for one view.
///
/// Returns `false` (and records nothing) when no hologram material is
/// configured.
pub fn record_composite<R>(
    recorder: &mut R,
    material: Option<&Material>,
    parameters: EffectParameters,
    inputs: EffectInputs,
) -> bool
where
    R: CommandRecorder + ?Sized,
{
    let Some(material) = material else {
        tracing::debug!("No hologram material, skipping composite");
        return false;
    };

    recorder.set_render_target(Attachment::CameraColor, Attachment::CameraDepth, ClearFlags::NONE);
    recorder.draw_full_screen(&FullScreenDraw {
        material,
        shader_pass: COMPOSITE_SHADER_PASS,
        inputs,
        parameters,
    });
    true
}

/// Views bound by one composite draw.
pub struct CompositeBindings<'a> {
    pub color: &'a wgpu::TextureView,
    /// The object depth mirror.
    pub depth: &'a wgpu::TextureView,
    /// `None` binds the color buffer in its place and tells the shader there
    /// is no tint.
    pub tint: Option<&'a wgpu::TextureView>,
    pub lines: &'a Texture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    material: MaterialId,
    shader_pass: u32,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
}

/// Draws hologram materials as a full-screen triangle.
///
/// # Bindings (group 0)
///
/// | Binding | Resource                                  |
/// |---------|-------------------------------------------|
/// | 0       | [`HologramUniforms`]                      |
/// | 1       | object color, `texture_2d_array<f32>`     |
/// | 2       | object depth mirror, `texture_2d_array<f32>` |
/// | 3       | object tint, `texture_2d_array<f32>`      |
/// | 4       | lines texture, `texture_2d<f32>`          |
/// | 5       | lines sampler                             |
pub struct CompositeRenderer {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    // `None` marks a material that failed to build, so it is not retried
    pipelines: RefCell<HashMap<PipelineKey, Option<wgpu::RenderPipeline>>>,
}

impl CompositeRenderer {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let array_texture = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2Array,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Hologram Composite Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                array_texture(1),
                array_texture(2),
                array_texture(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Hologram Composite Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            pipelines: RefCell::new(HashMap::new()),
        }
    }

    fn pipeline(
        &self,
        gpu: &GpuContext,
        material: &Material,
        shader_pass: u32,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Option<wgpu::RenderPipeline> {
        let key = PipelineKey {
            material: material.id(),
            shader_pass,
            color_format,
            depth_format,
        };
        if let Some(cached) = self.pipelines.borrow().get(&key) {
            return cached.clone();
        }

        let built = self.build_pipeline(gpu, material, shader_pass, color_format, depth_format);
        self.pipelines.borrow_mut().insert(key, built.clone());
        built
    }

    fn build_pipeline(
        &self,
        gpu: &GpuContext,
        material: &Material,
        shader_pass: u32,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Option<wgpu::RenderPipeline> {
        let Some(entry_point) = material.entry_point(shader_pass) else {
            tracing::warn!(
                material = material.name(),
                shader_pass,
                "Hologram material has no such shader pass"
            );
            return None;
        };

        let result = gpu.validated(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(material.name()),
                source: wgpu::ShaderSource::Wgsl(material.source().into()),
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Hologram Composite Pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: depth_format,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });

        match result {
            Ok(pipeline) => {
                tracing::debug!(material = material.name(), ?color_format, "Built composite pipeline");
                Some(pipeline)
            }
            Err(error) => {
                tracing::warn!(
                    material = material.name(),
                    "Hologram material failed to build, composite disabled: {error}"
                );
                None
            }
        }
    }

    /// Draws one composite into `pass`.
    ///
    /// `color_format` and `depth_format` are those of the camera attachments
    /// bound to `pass`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        gpu: &GpuContext,
        pass: &mut wgpu::RenderPass<'_>,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
        draw: &FullScreenDraw<'_>,
        bindings: &CompositeBindings<'_>,
        frame: CompositeFrame<'_>,
    ) {
        use wgpu::util::DeviceExt;

        let Some(pipeline) =
            self.pipeline(gpu, draw.material, draw.shader_pass, color_format, depth_format)
        else {
            return;
        };

        let frame = CompositeFrame {
            has_tint: bindings.tint.is_some(),
            ..frame
        };
        let uniforms: HologramUniforms = draw.parameters.to_uniforms(&frame);
        let uniform_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Hologram Uniforms"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Hologram Composite Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(bindings.color),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(bindings.depth),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(
                        bindings.tint.unwrap_or(bindings.color),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&bindings.lines.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&bindings.lines.sampler),
                },
            ],
        });

        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::commands::testing::{Recorded, RecordingRecorder};
    use crate::params::{OrientationMode, ScanlineRemap};
    use glam::{Mat4, Vec3};

    fn parameters(scanline: ScanlineRemap) -> EffectParameters {
        EffectParameters {
            orientation: Mat4::IDENTITY,
            line_offset: Vec3::new(0.0, 0.3, 0.0),
            tint_color: Color::HOLO_CYAN,
            scanline,
            mip_bias: 0.0,
            mode: OrientationMode::World,
        }
    }

    #[test]
    fn one_draw_into_camera_targets_without_clearing() {
        let material = Material::hologram();
        let params = parameters(ScanlineRemap::FULL);
        let mut recorder = RecordingRecorder::default();

        assert!(record_composite(&mut recorder, Some(&material), params, effect_inputs(true)));

        assert_eq!(
            recorder.commands,
            vec![
                Recorded::SetTarget {
                    color: Attachment::CameraColor,
                    depth: Attachment::CameraDepth,
                    clear: ClearFlags::NONE,
                },
                Recorded::FullScreen {
                    material: material.id(),
                    shader_pass: 0,
                    inputs: EffectInputs {
                        color: Attachment::ObjectColor,
                        depth: Attachment::ObjectDepthMirror,
                        tint: Some(Attachment::ObjectTint),
                    },
                    parameters: params,
                },
            ]
        );
    }

    #[test]
    fn threshold_scanline_passes_through_unchanged() {
        let material = Material::hologram();
        let remap = ScanlineRemap::new(0.3, 0.3).unwrap();
        let mut recorder = RecordingRecorder::default();

        record_composite(&mut recorder, Some(&material), parameters(remap), effect_inputs(false));

        let Some(Recorded::FullScreen { parameters, inputs, .. }) = recorder.commands.last() else {
            panic!("expected a full-screen draw");
        };
        assert_eq!(parameters.scanline, remap);
        assert_eq!(inputs.tint, None);
    }

    #[test]
    fn missing_material_records_nothing() {
        let mut recorder = RecordingRecorder::default();
        let drawn = record_composite(
            &mut recorder,
            None,
            parameters(ScanlineRemap::FULL),
            effect_inputs(true),
        );
        assert!(!drawn);
        assert!(recorder.commands.is_empty());
    }

    // The tests below need a GPU and are skipped when no adapter is available.

    #[test]
    fn builtin_hologram_pipeline_builds_on_this_backend() {
        let _guard = crate::gpu::test_lock();
        let Some(gpu) = GpuContext::headless(4, 4) else {
            return;
        };
        let renderer = CompositeRenderer::new(&gpu);
        let pipeline = renderer.pipeline(
            &gpu,
            &Material::hologram(),
            COMPOSITE_SHADER_PASS,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureFormat::Depth32Float,
        );
        assert!(pipeline.is_some(), "hologram.wgsl failed to build");
    }

    #[test]
    fn untranslatable_material_is_skipped_not_fatal() {
        let _guard = crate::gpu::test_lock();
        let Some(gpu) = GpuContext::headless(4, 4) else {
            return;
        };
        let renderer = CompositeRenderer::new(&gpu);
        // binding 2 does not match the layout
        let broken = Material::new(
            "broken",
            include_str!("shaders/hologram.wgsl").replace(
                "var object_depth: texture_2d_array<f32>",
                "var object_depth: texture_depth_2d_array",
            ),
        );
        let build = || {
            renderer.pipeline(
                &gpu,
                &broken,
                COMPOSITE_SHADER_PASS,
                wgpu::TextureFormat::Rgba8UnormSrgb,
                wgpu::TextureFormat::Depth32Float,
            )
        };
        assert!(build().is_none());
        // cached as broken
        assert!(build().is_none());
    }
}
