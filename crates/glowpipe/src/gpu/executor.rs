use std::collections::BTreeMap;

use wgpu::util::DeviceExt;

use crate::buffer::VertexBuffer;
use crate::error::{PipelineError, PipelineResult};
use crate::executor::{PassExecutor, TargetImage, ViewportSource};
use crate::graph::{FramePlan, Geometry, Pass, Target, FILTER_QUAD};
use crate::program::{ProgramId, ProgramState};
use crate::types::Viewport;

use super::context::{GpuContext, OFFSCREEN_FORMAT};
use super::programs::{texture_entries, GpuProgram};
use super::targets::RenderTargets;

/// GPU vertex buffer mirroring one layer's [`VertexBuffer`].
struct LineBuffer {
    buffer: wgpu::Buffer,
    floats: usize,
    /// Generation of the mirrored store; `None` until the first upload.
    generation: Option<u64>,
}

impl LineBuffer {
    fn is_stale(&self, source: &VertexBuffer) -> bool {
        line_buffer_stale(self.generation, self.floats, source)
    }
}

fn line_buffer_stale(generation: Option<u64>, floats: usize, source: &VertexBuffer) -> bool {
    generation != Some(source.generation()) || floats < source.capacity()
}

/// Executes frame plans with wgpu: one command encoder and one submit per
/// frame. Uniforms for the whole frame share one staging buffer; each pass
/// copies its block into its program's buffer just before it is recorded.
pub struct GpuExecutor {
    context: GpuContext,
    viewport_source: Box<dyn ViewportSource>,
    programs: BTreeMap<ProgramId, GpuProgram>,
    targets: RenderTargets,
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
    lines: Vec<LineBuffer>,
}

struct FrameResources<'a> {
    device: &'a wgpu::Device,
    targets: &'a RenderTargets,
    screen: &'a wgpu::TextureView,
    screen_format: wgpu::TextureFormat,
    sampler: &'a wgpu::Sampler,
    quad: &'a wgpu::Buffer,
    lines: &'a [LineBuffer],
}

impl<'a> FrameResources<'a> {
    fn view(&self, target: Target) -> PipelineResult<&'a wgpu::TextureView> {
        match target {
            Target::Screen => Ok(self.screen),
            other => Ok(&self.targets.get(other)?.view),
        }
    }

    fn format(&self, target: Target) -> wgpu::TextureFormat {
        match target {
            Target::Screen => self.screen_format,
            _ => OFFSCREEN_FORMAT,
        }
    }
}

impl GpuExecutor {
    /// Renders into off-screen textures of a fixed size.
    pub fn headless(viewport: Viewport) -> PipelineResult<Self> {
        let context = GpuContext::headless()?;
        Ok(Self::with_context(context, Box::new(move || viewport)))
    }

    /// Presents to `window`, asking `viewport_source` for its size each frame.
    pub fn windowed<W, V>(window: W, viewport_source: V) -> PipelineResult<Self>
    where
        W: wgpu::WindowHandle + 'static,
        V: ViewportSource + 'static,
    {
        let context = GpuContext::windowed(window, viewport_source.current_viewport())?;
        Ok(Self::with_context(context, Box::new(viewport_source)))
    }

    fn with_context(context: GpuContext, viewport_source: Box<dyn ViewportSource>) -> Self {
        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("target sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let quad = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("filter quad"),
                contents: bytemuck::cast_slice(&FILTER_QUAD),
                usage: wgpu::BufferUsages::VERTEX,
            });
        tracing::info!(
            adapter = %context.adapter_info.name,
            backend = ?context.adapter_info.backend,
            headless = context.is_headless(),
            "GPU context ready"
        );
        Self {
            context,
            viewport_source,
            programs: BTreeMap::new(),
            targets: RenderTargets::default(),
            sampler,
            quad,
            lines: Vec::new(),
        }
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.context.adapter_info
    }

    /// Reconfigures the surface after it was lost or became outdated.
    pub fn reconfigure_surface(&mut self) {
        let viewport = self.viewport_source.current_viewport();
        self.context.configure_surface(viewport);
        self.targets.invalidate();
    }

    fn encode_pass(
        resources: &FrameResources<'_>,
        encoder: &mut wgpu::CommandEncoder,
        program: &GpuProgram,
        pass: &Pass,
        staging: (&wgpu::Buffer, wgpu::BufferAddress),
    ) -> PipelineResult<()> {
        let (staging, offset) = staging;
        encoder.copy_buffer_to_buffer(
            staging,
            offset,
            &program.uniform_buffer,
            0,
            program.state.bytes().len() as wgpu::BufferAddress,
        );

        let layout = program.state.layout();
        let mut views = vec![None; layout.textures.len()];
        for (name, target) in &pass.inputs {
            views[layout.texture_slot(name)?] = Some(resources.view(*target)?);
        }
        let views = views
            .into_iter()
            .zip(&layout.textures)
            .map(|(view, name)| {
                view.ok_or_else(|| {
                    PipelineError::MissingTarget(format!("{} input '{name}'", pass.program))
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        let texture_bind_group = program.texture_layout.as_ref().map(|texture_layout| {
            resources.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("texture bind group"),
                layout: texture_layout,
                entries: &texture_entries(&views, resources.sampler),
            })
        });

        let pipeline = program.pipeline(resources.format(pass.target))?;
        let label = pass.target.to_string();
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: resources.view(pass.target)?,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &program.uniform_bind_group, &[]);
        if let Some(bind_group) = texture_bind_group.as_ref() {
            render_pass.set_bind_group(1, bind_group, &[]);
        }
        match pass.geometry {
            Geometry::Quad => {
                render_pass.set_vertex_buffer(0, resources.quad.slice(..));
                render_pass.draw(0..4, 0..1);
            }
            Geometry::Lines {
                layer,
                vertex_count,
            } => {
                let line = resources.lines.get(layer).ok_or(PipelineError::UnknownLayer {
                    index: layer,
                    count: resources.lines.len(),
                })?;
                if vertex_count > 0 {
                    render_pass.set_vertex_buffer(0, line.buffer.slice(..));
                    render_pass.draw(0..vertex_count, 0..1);
                }
            }
        }
        Ok(())
    }
}

impl PassExecutor for GpuExecutor {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn configure_layers(&mut self, layer_count: usize) -> PipelineResult<()> {
        let device = &self.context.device;
        let screen_format = self.context.screen_format();
        let mut programs = BTreeMap::new();
        for id in ProgramId::ALL {
            // Only the final copy renders to the screen format.
            let formats: &[wgpu::TextureFormat] = if id == ProgramId::Copy {
                &[OFFSCREEN_FORMAT, screen_format]
            } else {
                &[OFFSCREEN_FORMAT]
            };
            programs.insert(id, GpuProgram::new(device, id.layout(layer_count), formats)?);
        }
        self.programs = programs;
        self.lines = (0..layer_count)
            .map(|_| LineBuffer {
                buffer: create_line_buffer(device, 0),
                floats: 0,
                generation: None,
            })
            .collect();
        self.targets.invalidate();
        Ok(())
    }

    fn sync_viewport(&mut self) -> PipelineResult<Viewport> {
        let viewport = self.viewport_source.current_viewport();
        let headless = self.context.is_headless();
        if self
            .targets
            .ensure(&self.context.device, viewport, self.lines.len(), headless)
        {
            self.context.configure_surface(viewport);
        }
        Ok(viewport)
    }

    fn upload_vertices(&mut self, layer: usize, buffer: &VertexBuffer) -> PipelineResult<()> {
        let count = self.lines.len();
        let line = self
            .lines
            .get_mut(layer)
            .ok_or(PipelineError::UnknownLayer { index: layer, count })?;
        if line.is_stale(buffer) {
            tracing::debug!(
                layer,
                floats = buffer.capacity(),
                generation = buffer.generation(),
                "reallocating GPU line buffer"
            );
            line.buffer = create_line_buffer(&self.context.device, buffer.capacity());
            line.floats = buffer.capacity();
            line.generation = Some(buffer.generation());
        }
        self.context
            .queue
            .write_buffer(&line.buffer, 0, bytemuck::cast_slice(buffer.backing_store()));
        Ok(())
    }

    fn execute(&mut self, plan: &FramePlan) -> PipelineResult<()> {
        if self.targets.viewport() != Some(plan.viewport) {
            return Err(PipelineError::MissingTarget(format!(
                "targets sized for {}x{}",
                plan.viewport.width, plan.viewport.height
            )));
        }

        // Every pass's uniform block goes into one staging buffer, copied
        // into the program's uniform buffer right before the pass.
        let mut staged = Vec::new();
        let mut offsets = Vec::with_capacity(plan.passes.len());
        for pass in &plan.passes {
            let program = self.programs.get_mut(&pass.program).ok_or_else(|| {
                PipelineError::Layers("executor has no configured programs".into())
            })?;
            offsets.push(stage_uniforms(&mut staged, &mut program.state, pass)?);
        }

        let frame = match self.context.surface.as_ref() {
            Some(state) => Some(state.surface.get_current_texture()?),
            None => None,
        };
        let screen = match frame.as_ref() {
            Some(frame) => frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
            None => self.targets.get(Target::Screen)?.view.clone(),
        };

        let device = &self.context.device;
        let resources = FrameResources {
            device,
            targets: &self.targets,
            screen: &screen,
            screen_format: self.context.screen_format(),
            sampler: &self.sampler,
            quad: &self.quad,
            lines: &self.lines,
        };
        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniform staging"),
            contents: &staged,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame encoder"),
        });
        for (pass, &offset) in plan.passes.iter().zip(&offsets) {
            let program = self.programs.get(&pass.program).ok_or_else(|| {
                PipelineError::Layers("executor has no configured programs".into())
            })?;
            Self::encode_pass(&resources, &mut encoder, program, pass, (&staging, offset))?;
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));

        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }

    fn read_target(&mut self, target: Target) -> PipelineResult<TargetImage> {
        if target == Target::Screen && !self.context.is_headless() {
            return Err(PipelineError::Readback(
                "the screen is presented to a window and cannot be read back".into(),
            ));
        }
        let viewport = self
            .targets
            .viewport()
            .ok_or_else(|| PipelineError::MissingTarget(target.to_string()))?;
        let texture = &self.targets.get(target)?.texture;
        read_texture(&self.context, texture, viewport)
    }
}

/// Applies `pass`'s uniforms and appends the program's whole block to the
/// frame's staging bytes. Returns the block's offset.
fn stage_uniforms(
    staged: &mut Vec<u8>,
    state: &mut ProgramState,
    pass: &Pass,
) -> PipelineResult<wgpu::BufferAddress> {
    state.apply(&pass.uniforms)?;
    let offset = staged.len();
    staged.extend_from_slice(state.bytes());
    let aligned = staged.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
    staged.resize(aligned, 0);
    Ok(offset as wgpu::BufferAddress)
}

fn create_line_buffer(device: &wgpu::Device, floats: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("line vertices"),
        size: (floats.max(1) * 4) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn read_texture(
    context: &GpuContext,
    texture: &wgpu::Texture,
    viewport: Viewport,
) -> PipelineResult<TargetImage> {
    let row_bytes = viewport.width as usize * 4;
    let padded_row_bytes = row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize);
    let readback = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: (padded_row_bytes * viewport.height as usize) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row_bytes as u32),
                rows_per_image: Some(viewport.height),
            },
        },
        wgpu::Extent3d {
            width: viewport.width,
            height: viewport.height,
            depth_or_array_layers: 1,
        },
    );
    context.queue.submit(Some(encoder.finish()));

    let slice = readback.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    context
        .device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| PipelineError::Readback(format!("device poll failed: {err}")))?;
    rx.recv()
        .map_err(|_| PipelineError::Readback("readback channel closed".into()))?
        .map_err(|err| PipelineError::Readback(format!("buffer map failed: {err}")))?;

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity(row_bytes * viewport.height as usize);
    for row in 0..viewport.height as usize {
        let start = row * padded_row_bytes;
        pixels.extend_from_slice(&mapped[start..start + row_bytes]);
    }
    drop(mapped);
    readback.unmap();

    Ok(TargetImage {
        width: viewport.width,
        height: viewport.height,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_share_one_staging_block_per_frame() {
        let mut state = ProgramState::new(ProgramId::Copy.layout(1));
        let block = state.layout().block_size as u64;
        let opacity = state.layout().field("opacity").unwrap().offset;
        let passes = [0.5_f32, 0.25].map(|value| {
            Pass::filter(ProgramId::Copy, Target::Screen)
                .uniform("uViewportSize", [8.0_f32, 8.0])
                .uniform("opacity", value)
        });

        let mut staged = Vec::new();
        let offsets: Vec<u64> = passes
            .iter()
            .map(|pass| stage_uniforms(&mut staged, &mut state, pass).unwrap())
            .collect();

        assert_eq!(offsets, vec![0, block]);
        assert_eq!(staged.len() as u64, 2 * block);
        let read = |base: u64| -> f32 {
            let start = base as usize + opacity;
            bytemuck::pod_read_unaligned(&staged[start..start + 4])
        };
        assert_eq!(read(offsets[0]), 0.5);
        assert_eq!(read(offsets[1]), 0.25);
    }

    #[test]
    fn line_buffers_follow_the_source_generation() {
        let mut source = VertexBuffer::with_capacity(16);
        assert!(line_buffer_stale(None, 16, &source));
        assert!(!line_buffer_stale(Some(0), 16, &source));

        source.reset(17);
        assert!(line_buffer_stale(Some(0), 16, &source));
        assert!(!line_buffer_stale(Some(1), source.capacity(), &source));

        source.reset(4);
        assert!(!line_buffer_stale(Some(1), source.capacity(), &source));
    }
}
