//! Draws queued meshes by layer, for both the host scene and the hologram
//! capture.
//!
//! [`MeshRenderer`] owns the shared bind group layout and a pipeline cache.
//! [`MeshScene`] pairs it with the draws that survived culling this frame and
//! implements [`SceneRenderer`], which is how the hologram pass reaches the
//! host's objects.
//!
//! Every object material uses one bind group (group 0):
//! - binding 0: [`CameraUniforms`]
//! - binding 1: [`ModelUniforms`], dynamic offset per draw
//!
//! Capture draws add a second color target for the hologram depth mirror;
//! object materials write their fragment depth there.
//!
//! All uniforms for one `draw_renderers` call are packed into a single buffer
//! created for that call, so nothing is overwritten while earlier draws of
//! the same frame are still pending.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::camera::Camera;
use crate::color::Color;
use crate::commands::{DepthState, DrawRenderers};
use crate::gpu::GpuContext;
use crate::layer::CullingParameters;
use crate::material::{Material, MaterialId};
use crate::mesh::{MeshQueue, QueuedMesh, Vertex3d};
use crate::recorder::{SceneRenderer, SceneTarget};

/// Camera data shared by every draw in a call.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// World-space position, w unused.
    pub position: [f32; 4],
}

impl CameraUniforms {
    pub fn new(camera: &Camera, aspect: f32) -> Self {
        Self {
            view_proj: camera.view_projection(aspect).to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
        }
    }
}

/// Per-draw model data.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`, for normals under non-uniform scale.
    pub normal_matrix: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl ModelUniforms {
    fn new(queued: &QueuedMesh, override_material: Option<&Material>) -> Self {
        let model = queued.transform.matrix();
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            color: draw_color(queued, override_material).to_array(),
        }
    }
}

/// Color handed to the shader: an override material draws in its own color,
/// otherwise the queued color modulates the object's material color.
pub fn draw_color(queued: &QueuedMesh, override_material: Option<&Material>) -> Color {
    match override_material {
        Some(material) => material.color(),
        None => queued.color * queued.material.color(),
    }
}

/// `size` rounded up to a multiple of `alignment`.
pub fn uniform_stride(size: u64, alignment: u32) -> u64 {
    let alignment = u64::from(alignment.max(1));
    size.div_ceil(alignment) * alignment
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    material: MaterialId,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
    depth_mirror_format: Option<wgpu::TextureFormat>,
    depth: DepthState,
}

/// Pipelines and layouts for drawing [`Vertex3d`] meshes with object
/// materials.
pub struct MeshRenderer {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    // `None` marks a material that failed to build, so it is not retried
    pipelines: RefCell<HashMap<PipelineKey, Option<wgpu::RenderPipeline>>>,
}

impl MeshRenderer {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<CameraUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<ModelUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            pipelines: RefCell::new(HashMap::new()),
        }
    }

    /// The culled view of `queue` for this frame.
    pub fn scene<'a>(&'a self, queue: &'a MeshQueue, culling: &CullingParameters) -> MeshScene<'a> {
        MeshScene {
            renderer: self,
            queue,
            visible: queue.cull(culling),
        }
    }

    fn pipeline(
        &self,
        target: &SceneTarget<'_>,
        material: &Material,
        depth: DepthState,
    ) -> Option<wgpu::RenderPipeline> {
        let key = PipelineKey {
            material: material.id(),
            color_format: target.color_format,
            depth_format: target.depth_format,
            depth_mirror_format: target.depth_mirror_format,
            depth,
        };
        if let Some(cached) = self.pipelines.borrow().get(&key) {
            return cached.clone();
        }

        let built = self.build_pipeline(target.gpu, material, key);
        self.pipelines.borrow_mut().insert(key, built.clone());
        built
    }

    fn build_pipeline(
        &self,
        gpu: &GpuContext,
        material: &Material,
        key: PipelineKey,
    ) -> Option<wgpu::RenderPipeline> {
        let Some(entry_point) = material.entry_point(0) else {
            tracing::warn!(material = material.name(), "Material has no shader pass");
            return None;
        };

        let mut targets = vec![Some(wgpu::ColorTargetState {
            format: key.color_format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        if let Some(format) = key.depth_mirror_format {
            targets.push(Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }));
        }

        let result = gpu.validated(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(material.name()),
                source: wgpu::ShaderSource::Wgsl(material.source().into()),
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Mesh Pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[Vertex3d::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: Some(wgpu::Face::Back),
                    front_face: wgpu::FrontFace::Ccw,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: key.depth_format,
                    depth_write_enabled: key.depth.write,
                    depth_compare: key.depth.compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });

        match result {
            Ok(pipeline) => Some(pipeline),
            Err(error) => {
                tracing::warn!(
                    material = material.name(),
                    "Material failed to build, its draws are skipped: {error}"
                );
                None
            }
        }
    }
}

/// The draws that survived culling, ready to be drawn by layer.
pub struct MeshScene<'a> {
    renderer: &'a MeshRenderer,
    queue: &'a MeshQueue,
    visible: Vec<&'a QueuedMesh>,
}

impl<'a> MeshScene<'a> {
    pub fn visible(&self) -> &[&'a QueuedMesh] {
        &self.visible
    }

    /// Visible draws on any of `draw.layers`, in queue order.
    pub fn selected(&self, draw: &DrawRenderers<'_>) -> Vec<&'a QueuedMesh> {
        self.visible
            .iter()
            .copied()
            .filter(|queued| queued.layers.intersects(draw.layers))
            .collect()
    }
}

impl SceneRenderer for MeshScene<'_> {
    fn draw_renderers(
        &self,
        target: &SceneTarget<'_>,
        pass: &mut wgpu::RenderPass<'_>,
        draw: &DrawRenderers<'_>,
    ) {
        use wgpu::util::DeviceExt;

        let selected = self.selected(draw);
        if selected.is_empty() {
            return;
        }
        let gpu = target.gpu;

        let alignment = gpu.device.limits().min_uniform_buffer_offset_alignment;
        let camera_size = std::mem::size_of::<CameraUniforms>();
        let model_size = std::mem::size_of::<ModelUniforms>();
        let stride = uniform_stride(camera_size.max(model_size) as u64, alignment) as usize;

        // camera at offset 0, draw i at stride * (i + 1)
        let mut contents = vec![0u8; stride * (selected.len() + 1)];
        let camera = CameraUniforms::new(target.camera, target.aspect);
        contents[..camera_size].copy_from_slice(bytemuck::bytes_of(&camera));
        for (i, queued) in selected.iter().enumerate() {
            let offset = stride * (i + 1);
            let model = ModelUniforms::new(queued, draw.override_material);
            contents[offset..offset + model_size].copy_from_slice(bytemuck::bytes_of(&model));
        }

        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Uniforms"),
                contents: &contents,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Bind Group"),
            layout: &self.renderer.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(camera_size as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(model_size as u64),
                    }),
                },
            ],
        });

        for (i, queued) in selected.iter().enumerate() {
            let material = draw
                .override_material
                .unwrap_or_else(|| queued.material.as_ref());
            let Some(pipeline) = self.renderer.pipeline(target, material, draw.depth) else {
                continue;
            };
            let Some(mesh) = self.queue.mesh(queued.mesh) else {
                tracing::warn!(mesh = queued.mesh.0, "Queued draw references an unknown mesh");
                continue;
            };

            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[(stride * (i + 1)) as u32]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}
