use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use holopass::{
    Camera, CameraTargets, Color, CullingParameters, CustomPass, DepthState, DrawRenderers,
    FrameTiming, GpuContext, HologramConfig, HologramPass, LayerMask, LayerTintMapping, Material,
    Mesh, MeshId, MeshQueue, MeshRenderer, PassContext, Quat, SceneRenderer, SceneTarget,
    Transform, Vec3, Viewport,
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const OPAQUE: LayerMask = LayerMask::layer(0);
const HOLO_CYAN: LayerMask = LayerMask::layer(1);
const HOLO_AMBER: LayerMask = LayerMask::layer(2);

struct Scene {
    renderer: MeshRenderer,
    queue: MeshQueue,
    cube: MeshId,
    sphere: MeshId,
    plane: MeshId,
    lit: Rc<Material>,
}

impl Scene {
    fn new(gpu: &GpuContext) -> Self {
        let mut queue = MeshQueue::new();
        let cube = queue.add_mesh(Mesh::cube(gpu));
        let sphere = queue.add_mesh(Mesh::sphere(gpu, 32, 16));
        let plane = queue.add_mesh(Mesh::plane(gpu, 8.0));
        Self {
            renderer: MeshRenderer::new(gpu),
            queue,
            cube,
            sphere,
            plane,
            lit: Rc::new(Material::lit("lit")),
        }
    }

    fn queue_frame(&mut self, time: f32) {
        let spin = Quat::from_rotation_y(time * 0.6);
        self.queue.clear_queue();
        self.queue.draw_colored(
            self.plane,
            Transform::from_position(Vec3::new(0.0, -1.0, 0.0)),
            self.lit.clone(),
            Color::rgb(0.25, 0.25, 0.3),
            OPAQUE,
        );
        self.queue.draw_colored(
            self.cube,
            Transform::from_position(Vec3::new(-2.0, -0.5, 0.0)).uniform_scale(0.5),
            self.lit.clone(),
            Color::rgb(0.8, 0.3, 0.2),
            OPAQUE,
        );
        self.queue.draw(
            self.sphere,
            Transform::from_position(Vec3::new(0.0, 0.2, 0.0)).rotation(spin),
            self.lit.clone(),
            HOLO_CYAN,
        );
        self.queue.draw(
            self.cube,
            Transform::from_position(Vec3::new(2.0, 0.0, 0.0))
                .rotation(spin.inverse())
                .uniform_scale(0.7),
            self.lit.clone(),
            HOLO_AMBER,
        );
    }
}

struct Frame {
    gpu: GpuContext,
    scene: Scene,
    hologram: HologramPass,
    depth: wgpu::TextureView,
}

fn create_depth_view(gpu: &GpuContext) -> wgpu::TextureView {
    gpu.device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Camera Depth"),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn hologram_config() -> holopass::Result<HologramConfig> {
    let cyan = Rc::new(Material::tint("cyan", Color::HOLO_CYAN));
    let amber = Rc::new(Material::tint("amber", Color::rgb(1.0, 0.7, 0.2)));
    Ok(HologramConfig::builder()
        .mapping(LayerTintMapping::new(HOLO_CYAN).with_tint(cyan))
        .mapping(LayerTintMapping::new(HOLO_AMBER).with_tint(amber))
        .scroll_velocity(Vec3::new(0.0, 0.05, 0.0))
        .scale(Vec3::splat(1.5))
        .scanline(0.15, 0.65)
        .build()?)
}

struct App {
    window: Option<Arc<Window>>,
    frame: Option<Frame>,
    camera: Camera,
    start_time: Instant,
    last_frame: Instant,
    paused: bool,
}

impl Default for App {
    fn default() -> Self {
        Self {
            window: None,
            frame: None,
            camera: Camera::new().at(0.0, 1.5, 6.0).looking_at(0.0, 0.0, 0.0).with_fov(60.0),
            start_time: Instant::now(),
            last_frame: Instant::now(),
            paused: false,
        }
    }
}

impl App {
    fn render(&mut self) {
        let Some(frame) = &mut self.frame else {
            return;
        };
        let now = Instant::now();
        let timing = FrameTiming::new((now - self.last_frame).as_secs_f32()).paused(self.paused);
        self.last_frame = now;
        frame.scene.queue_frame(self.start_time.elapsed().as_secs_f32());

        let Some(surface) = &frame.gpu.surface else {
            return;
        };
        let output = match surface.get_current_texture() {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!("Skipping frame: {error}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let gpu = &frame.gpu;

        let mut culling = CullingParameters::new(OPAQUE);
        frame.hologram.aggregate_culling_parameters(&mut culling);
        let scene = frame.scene.renderer.scene(&frame.scene.queue, &culling);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Opaque Scene"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.02,
                            b: 0.04,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &frame.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let target = SceneTarget {
                gpu,
                camera: &self.camera,
                aspect: gpu.aspect(),
                color_format: gpu.config.format,
                depth_format: DEPTH_FORMAT,
                depth_mirror_format: None,
            };
            scene.draw_renderers(
                &target,
                &mut pass,
                &DrawRenderers {
                    layers: OPAQUE,
                    depth: DepthState::LESS,
                    override_material: None,
                },
            );
        }

        let views = [CameraTargets {
            camera: &self.camera,
            color: &view,
            depth: &frame.depth,
            color_format: gpu.config.format,
            depth_format: DEPTH_FORMAT,
        }];
        let mut ctx = PassContext {
            gpu,
            encoder: &mut encoder,
            views: &views,
            viewport: Viewport::new(gpu.width(), gpu.height()),
            timing,
            scene: &scene,
        };
        frame.hologram.execute(&mut ctx);

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes().with_title("holopass");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(error) => {
                tracing::error!("Failed to create window: {error}");
                event_loop.exit();
                return;
            }
        };

        let gpu = GpuContext::new(window.clone());
        let mut hologram = match hologram_config() {
            Ok(config) => HologramPass::new(config),
            Err(error) => {
                tracing::error!("Invalid hologram configuration: {error}");
                event_loop.exit();
                return;
            }
        };
        if let Err(error) = hologram.setup(&gpu, Viewport::new(gpu.width(), gpu.height())) {
            tracing::error!("Hologram pass setup failed: {error}");
            event_loop.exit();
            return;
        }

        let depth = create_depth_view(&gpu);
        let scene = Scene::new(&gpu);
        self.frame = Some(Frame {
            gpu,
            scene,
            hologram,
            depth,
        });
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(frame) = &mut self.frame {
                    frame.hologram.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(frame) = &mut self.frame {
                    frame.gpu.resize(size.width, size.height);
                    frame.depth = create_depth_view(&frame.gpu);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Space),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.paused = !self.paused;
                tracing::info!(paused = self.paused, "Toggled scroll");
            }
            WindowEvent::RedrawRequested => {
                self.render();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("holopass=info")),
        )
        .init();

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    if let Err(error) = event_loop.run_app(&mut app) {
        tracing::error!("Event loop error: {error}");
    }
}
