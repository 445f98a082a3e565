use crate::error::{PipelineError, PipelineResult};
use crate::types::Viewport;

/// Format of every off-screen target. Stores clamp to `[0, 1]`.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) struct SurfaceState {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

/// wgpu instance, device and (for windowed runs) the presentation surface.
pub struct GpuContext {
    _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    pub(crate) surface: Option<SurfaceState>,
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_device(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> PipelineResult<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface,
        force_fallback_adapter: false,
    }))
    .map_err(|err| PipelineError::ContextUnavailable(format!("no suitable GPU adapter: {err}")))?;

    let info = adapter.get_info();
    tracing::debug!(
        name = %info.name,
        backend = ?info.backend,
        device_type = ?info.device_type,
        "selected GPU adapter"
    );

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("glowpipe device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::default(),
    }))
    .map_err(|err| PipelineError::ContextUnavailable(format!("failed to create GPU device: {err}")))?;

    Ok((adapter, device, queue))
}

impl GpuContext {
    /// A device without a surface; the screen is an off-screen texture.
    pub fn headless() -> PipelineResult<Self> {
        let instance = instance();
        let (adapter, device, queue) = request_device(&instance, None)?;
        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_info: adapter.get_info(),
            surface: None,
        })
    }

    /// A device presenting to `window`.
    pub fn windowed<W>(window: W, size: Viewport) -> PipelineResult<Self>
    where
        W: wgpu::WindowHandle + 'static,
    {
        let instance = instance();
        let surface = instance.create_surface(window).map_err(|err| {
            PipelineError::ContextUnavailable(format!("failed to create rendering surface: {err}"))
        })?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| {
                PipelineError::ContextUnavailable("surface reports no supported formats".into())
            })?;
        if format.is_srgb() {
            tracing::warn!(?format, "no non-sRGB surface format available; colours will be brighter");
        }
        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .unwrap_or(wgpu::PresentMode::AutoVsync);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        tracing::debug!(?format, ?present_mode, "configured surface");

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_info: adapter.get_info(),
            surface: Some(SurfaceState { surface, config }),
        })
    }

    /// Format the screen pass renders into.
    pub fn screen_format(&self) -> wgpu::TextureFormat {
        self.surface
            .as_ref()
            .map_or(OFFSCREEN_FORMAT, |state| state.config.format)
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    /// Reconfigures the surface at `size`; a no-op when headless.
    pub(crate) fn configure_surface(&mut self, size: Viewport) {
        if let Some(state) = self.surface.as_mut() {
            state.config.width = size.width;
            state.config.height = size.height;
            state.surface.configure(&self.device, &state.config);
        }
    }
}
