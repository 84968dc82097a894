use std::sync::Arc;
use std::time::{Duration, Instant};

use wgpu::{
    Device, DeviceDescriptor, ExperimentalFeatures, Extent3d, Instance, InstanceDescriptor,
    MemoryHints, PowerPreference, Queue, RequestAdapterOptions, Surface, SurfaceConfiguration,
    TextureFormat, TextureUsages, Trace,
};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use super::{BackendFactory, Blit, RenderBackend, SurfaceInput};
use crate::error::DisplayError;
use crate::frame::convert::{ChannelOrder, rgb565_to_rgbx};

const CREATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Native window painted with wgpu, driven from the render thread by
/// pumping winit's event loop instead of handing it control.
pub struct WindowBackend {
    event_loop: EventLoop<()>,
    app: SurfaceApp,
    /// RGB565 → 8-bit conversion target, reused across frames.
    scratch: Vec<u8>,
}

impl WindowBackend {
    pub fn new() -> Result<Self, DisplayError> {
        Ok(Self {
            event_loop: build_event_loop()?,
            app: SurfaceApp::default(),
            scratch: Vec::new(),
        })
    }

    pub fn factory() -> BackendFactory {
        Arc::new(|| -> Result<Box<dyn RenderBackend>, DisplayError> {
            Ok(Box::new(WindowBackend::new()?))
        })
    }
}

fn build_event_loop() -> Result<EventLoop<()>, DisplayError> {
    let mut builder = EventLoop::builder();
    // The render thread is not the main thread.
    #[cfg(target_os = "linux")]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        builder.with_any_thread(true);
    }
    #[cfg(target_os = "windows")]
    {
        use winit::platform::windows::EventLoopBuilderExtWindows;
        builder.with_any_thread(true);
    }
    builder
        .build()
        .map_err(|e| DisplayError::EventLoop(e.to_string()))
}

#[derive(Default)]
struct SurfaceApp {
    title: String,
    window: Option<Arc<Window>>,
    gpu: Option<SurfaceGpu>,
    init_error: Option<DisplayError>,
    close_requested: bool,
}

impl ApplicationHandler for SurfaceApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Sized by the first frame; the user cannot resize it.
        let attrs = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(10, 10))
            .with_resizable(false);

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.init_error = Some(DisplayError::Window(e.to_string()));
                return;
            }
        };

        match SurfaceGpu::new(window.clone()) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => self.init_error = Some(e),
        }
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.configure(size.width, size.height);
                }
            }
            _ => {}
        }
    }
}

struct SurfaceGpu {
    device: Device,
    queue: Queue,
    surface: Surface<'static>,
    config: SurfaceConfiguration,
    order: ChannelOrder,
}

impl SurfaceGpu {
    fn new(window: Arc<Window>) -> Result<Self, DisplayError> {
        let instance = Instance::new(&InstanceDescriptor::default());

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| DisplayError::Gpu(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| DisplayError::Gpu(e.to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("dronefeed-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: ExperimentalFeatures::default(),
            memory_hints: MemoryHints::Performance,
            trace: Trace::Off,
        }))
        .map_err(|e| DisplayError::Gpu(e.to_string()))?;

        let capabilities = surface.get_capabilities(&adapter);
        if !capabilities.usages.contains(TextureUsages::COPY_DST) {
            return Err(DisplayError::Unsupported("COPY_DST"));
        }
        let (format, order) = capabilities
            .formats
            .iter()
            .find_map(|f| channel_order(*f).map(|order| (*f, order)))
            .ok_or(DisplayError::Unsupported("8-bit RGBA/BGRA formats"))?;

        let size = window.inner_size();
        let (width, height) = clamp_extent(
            size.width.max(1),
            size.height.max(1),
            device.limits().max_texture_dimension_2d,
        );
        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_DST,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: capabilities.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        log::info!(
            "Display GPU initialized: {} ({:?}), surface format {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            order,
        })
    }

    fn max_extent(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn configure(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let (width, height) = clamp_extent(width, height, self.max_extent());
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn present(&mut self, blit: &Blit<'_>, scratch: &mut Vec<u8>) -> Result<(), DisplayError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Err(DisplayError::SurfaceLost);
            }
            Err(e) => return Err(DisplayError::Gpu(e.to_string())),
        };

        // Paint what fits; the window may lag behind a resize request.
        let width = blit.width.min(self.config.width);
        let height = blit.height.min(self.config.height);
        rgb565_to_rgbx(
            blit.data,
            blit.stride as usize,
            width as usize,
            height as usize,
            self.order,
            scratch,
        );

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &frame.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            scratch,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        // Flush the staged write before presenting.
        self.queue.submit(std::iter::empty());
        frame.present();
        Ok(())
    }
}

/// Caps a surface extent at the device's texture limit. Configuring past it
/// is a validation error on the render thread.
fn clamp_extent(width: u32, height: u32, max: u32) -> (u32, u32) {
    (width.min(max), height.min(max))
}

fn channel_order(format: TextureFormat) -> Option<ChannelOrder> {
    match format {
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => Some(ChannelOrder::Bgra),
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => Some(ChannelOrder::Rgba),
        _ => None,
    }
}

impl RenderBackend for WindowBackend {
    fn create_surface(&mut self, title: &str) -> Result<(), DisplayError> {
        self.app.title = title.to_string();
        let deadline = Instant::now() + CREATE_TIMEOUT;
        while self.app.gpu.is_none() {
            if let Some(e) = self.app.init_error.take() {
                return Err(e);
            }
            if Instant::now() >= deadline {
                return Err(DisplayError::Window("window was not created in time".into()));
            }
            if let PumpStatus::Exit(code) = self
                .event_loop
                .pump_app_events(Some(Duration::from_millis(10)), &mut self.app)
            {
                return Err(DisplayError::EventLoop(format!("exited with code {code}")));
            }
        }
        Ok(())
    }

    fn pump(&mut self, timeout: Duration) -> SurfaceInput {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(Some(timeout), &mut self.app)
        {
            self.app.close_requested = true;
        }
        if self.app.close_requested {
            SurfaceInput::CloseRequested
        } else {
            SurfaceInput::Idle
        }
    }

    fn size(&self) -> (u32, u32) {
        self.app
            .gpu
            .as_ref()
            .map_or((0, 0), |gpu| (gpu.config.width, gpu.config.height))
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = match self.app.gpu.as_ref() {
            Some(gpu) => clamp_extent(width, height, gpu.max_extent()),
            None => (width, height),
        };
        if let Some(window) = self.app.window.as_ref() {
            let _ = window.request_inner_size(PhysicalSize::new(width, height));
        }
        if let Some(gpu) = self.app.gpu.as_mut() {
            gpu.configure(width, height);
        }
    }

    fn blit(&mut self, blit: &Blit<'_>) -> Result<(), DisplayError> {
        let Some(gpu) = self.app.gpu.as_mut() else {
            return Ok(());
        };
        gpu.present(blit, &mut self.scratch)
    }

    fn destroy(&mut self) {
        self.app.gpu = None;
        self.app.window = None;
        // Let the window system see the window go away.
        let _ = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.app);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_order_for_common_formats() {
        assert_eq!(channel_order(TextureFormat::Bgra8UnormSrgb), Some(ChannelOrder::Bgra));
        assert_eq!(channel_order(TextureFormat::Rgba8Unorm), Some(ChannelOrder::Rgba));
        assert_eq!(channel_order(TextureFormat::Rgba16Float), None);
    }

    #[test]
    fn oversized_extents_are_clamped() {
        let max = wgpu::Limits::default().max_texture_dimension_2d;
        assert_eq!(clamp_extent(1280, 720, max), (1280, 720));
        assert_eq!(clamp_extent(max + 1, 720, max), (max, 720));
        assert_eq!(clamp_extent(u32::MAX, u32::MAX, max), (max, max));
        assert_eq!(clamp_extent(4096, 2048, 2048), (2048, 2048));
    }
}
