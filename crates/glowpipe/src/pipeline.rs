use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::buffer::VertexBuffer;
use crate::error::{PipelineError, PipelineResult};
use crate::executor::{PassExecutor, TargetImage};
use crate::graph::{build_frame_plan, LayerFrame, Target};
use crate::packer::pack_sprites;
use crate::types::{FrameParams, LayerParams, SpriteMap, Viewport, MAX_LAYERS};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Summary of one [`LinePipeline::draw`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub viewport: Viewport,
    /// Strip vertices drawn per layer, in layer order.
    pub vertex_counts: Vec<u32>,
    pub passes: usize,
}

impl FrameStats {
    pub fn total_vertices(&self) -> u64 {
        self.vertex_counts.iter().map(|&count| u64::from(count)).sum()
    }
}

/// Owns the per-layer vertex buffers and drives one executor frame by frame.
pub struct LinePipeline<E> {
    layers: Vec<String>,
    buffers: Vec<VertexBuffer>,
    executor: E,
    frame: u64,
    last_stats_log: Option<Instant>,
}

impl<E: PassExecutor> LinePipeline<E> {
    /// Validates the ordered layer names and prepares `executor` for them.
    pub fn new<S: AsRef<str>>(layer_names: &[S], mut executor: E) -> PipelineResult<Self> {
        let layers: Vec<String> = layer_names.iter().map(|name| name.as_ref().to_owned()).collect();
        validate_layers(&layers)?;

        executor.configure_layers(layers.len())?;
        tracing::info!(
            backend = executor.name(),
            layers = ?layers,
            "line pipeline ready"
        );

        Ok(Self {
            buffers: layers.iter().map(|_| VertexBuffer::new()).collect(),
            layers,
            executor,
            frame: 0,
            last_stats_log: None,
        })
    }

    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer == name)
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Renders one frame.
    ///
    /// `sprites` and `layer_params` are indexed by layer. The sprite maps are
    /// only read; any error aborts the frame and is returned as is. The
    /// output depends only on the arguments and, through the afterglow, on
    /// the previous frame.
    pub fn draw(
        &mut self,
        sprites: &[SpriteMap],
        layer_params: &[LayerParams],
        frame_params: &FrameParams,
    ) -> PipelineResult<FrameStats> {
        let count = self.layers.len();
        if sprites.len() != count || layer_params.len() != count {
            return Err(PipelineError::Layers(format!(
                "expected {count} sprite maps and parameter sets, got {} and {}",
                sprites.len(),
                layer_params.len()
            )));
        }

        let viewport = self.executor.sync_viewport()?;

        let mut vertex_counts = Vec::with_capacity(count);
        for (index, (layer_sprites, buffer)) in sprites.iter().zip(&mut self.buffers).enumerate() {
            vertex_counts.push(pack_sprites(layer_sprites, buffer));
            self.executor.upload_vertices(index, buffer)?;
        }

        let layers: Vec<LayerFrame<'_>> = layer_params
            .iter()
            .zip(&vertex_counts)
            .map(|(params, &vertex_count)| LayerFrame {
                params,
                vertex_count,
            })
            .collect();
        let plan = build_frame_plan(viewport, &layers, frame_params);
        self.executor.execute(&plan)?;

        let stats = FrameStats {
            frame: self.frame,
            viewport,
            vertex_counts,
            passes: plan.passes.len(),
        };
        self.frame += 1;
        self.log_stats(&stats);
        Ok(stats)
    }

    /// Reads back a target after the last frame, e.g. [`Target::Screen`].
    pub fn read_target(&mut self, target: Target) -> PipelineResult<TargetImage> {
        self.executor.read_target(target)
    }

    fn log_stats(&mut self, stats: &FrameStats) {
        let now = Instant::now();
        let due = self
            .last_stats_log
            .map_or(true, |last| now.duration_since(last) >= STATS_LOG_INTERVAL);
        if due {
            self.last_stats_log = Some(now);
            tracing::debug!(
                frame = stats.frame,
                width = stats.viewport.width,
                height = stats.viewport.height,
                vertices = stats.total_vertices(),
                passes = stats.passes,
                "frame stats"
            );
        }
    }
}

fn validate_layers(layers: &[String]) -> PipelineResult<()> {
    if layers.is_empty() {
        return Err(PipelineError::Layers("at least one layer is required".into()));
    }
    if layers.len() > MAX_LAYERS {
        return Err(PipelineError::Layers(format!(
            "{} layers configured, at most {MAX_LAYERS} are supported",
            layers.len()
        )));
    }
    let mut seen = BTreeSet::new();
    for name in layers {
        if name.trim().is_empty() {
            return Err(PipelineError::Layers("layer names must not be empty".into()));
        }
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::Layers(format!("duplicate layer '{name}'")));
        }
    }
    Ok(())
}
