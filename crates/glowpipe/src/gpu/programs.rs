use std::borrow::Cow;
use std::collections::HashMap;

use wgpu::naga::ShaderStage;

use crate::error::{PipelineError, PipelineResult};
use crate::geometry::VERTEX_FLOATS;
use crate::program::{ProgramId, ProgramLayout, ProgramState};
use crate::shaders::{fragment_source, vertex_source};

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

const LINE_ATTRIBUTES: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
    0 => Float32,
    1 => Float32x2,
    2 => Float32x2,
    3 => Float32x2,
    4 => Float32,
    5 => Float32,
    6 => Float32x4
];

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// One compiled program: retained uniform state, its uniform buffer and a
/// render pipeline per target format it renders into.
pub(crate) struct GpuProgram {
    pub state: ProgramState,
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    pub texture_layout: Option<wgpu::BindGroupLayout>,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl GpuProgram {
    pub fn new(
        device: &wgpu::Device,
        layout: ProgramLayout,
        formats: &[wgpu::TextureFormat],
    ) -> PipelineResult<Self> {
        let program = layout.program;
        let vertex_module = compile(device, program, ShaderStage::Vertex, vertex_source(&layout))?;
        let fragment_module =
            compile(device, program, ShaderStage::Fragment, fragment_source(&layout))?;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(program.name()),
            size: layout.block_size as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let texture_layout = (!layout.textures.is_empty()).then(|| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("texture layout"),
                entries: &texture_layout_entries(layout.textures.len()),
            })
        });

        let mut bind_group_layouts = vec![&uniform_layout];
        bind_group_layouts.extend(texture_layout.as_ref());
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let (buffers, blend) = match program {
            ProgramId::LineDraw => (
                wgpu::VertexBufferLayout {
                    array_stride: (VERTEX_FLOATS * 4) as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &LINE_ATTRIBUTES,
                },
                Some(ADDITIVE),
            ),
            _ => (
                wgpu::VertexBufferLayout {
                    array_stride: 8,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &QUAD_ATTRIBUTES,
                },
                None,
            ),
        };

        let mut pipelines = HashMap::new();
        for &format in formats {
            if pipelines.contains_key(&format) {
                continue;
            }
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.name()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some("main"),
                    buffers: std::slice::from_ref(&buffers),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });
            if let Some(err) = pollster::block_on(device.pop_error_scope()) {
                return Err(PipelineError::ShaderCompile {
                    program: program.name(),
                    message: err.to_string(),
                });
            }
            pipelines.insert(format, pipeline);
        }

        tracing::debug!(program = %program, formats = ?formats, "compiled program");
        Ok(Self {
            state: ProgramState::new(layout),
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            pipelines,
        })
    }

    pub fn pipeline(&self, format: wgpu::TextureFormat) -> PipelineResult<&wgpu::RenderPipeline> {
        self.pipelines.get(&format).ok_or_else(|| PipelineError::ShaderCompile {
            program: self.state.layout().program.name(),
            message: format!("no pipeline built for target format {format:?}"),
        })
    }
}

fn compile(
    device: &wgpu::Device,
    program: ProgramId,
    stage: ShaderStage,
    source: String,
) -> PipelineResult<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(program.name()),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source),
            stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(PipelineError::ShaderCompile {
            program: program.name(),
            message: err.to_string(),
        }),
        None => Ok(module),
    }
}

/// Texture `i` at binding `2i`, its sampler at `2i + 1`.
fn texture_layout_entries(count: usize) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(count * 2);
    for index in 0..count as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

pub(crate) fn texture_entries<'a>(
    views: &[&'a wgpu::TextureView],
    sampler: &'a wgpu::Sampler,
) -> Vec<wgpu::BindGroupEntry<'a>> {
    let mut entries = Vec::with_capacity(views.len() * 2);
    for (index, &view) in views.iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: (index as u32) * 2,
            resource: wgpu::BindingResource::TextureView(view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: (index as u32) * 2 + 1,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }
    entries
}
