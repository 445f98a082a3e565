use crate::buffer::VertexBuffer;
use crate::error::PipelineResult;
use crate::graph::{FramePlan, Target};
use crate::types::Viewport;

/// Reports the current drawable size.
///
/// Queried at the start of every draw; there is no resize subscription.
pub trait ViewportSource {
    fn current_viewport(&self) -> Viewport;
}

impl<F> ViewportSource for F
where
    F: Fn() -> Viewport,
{
    fn current_viewport(&self) -> Viewport {
        (self)()
    }
}

/// An RGBA8 image read back from a render target, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TargetImage {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let index = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[index],
            self.pixels[index + 1],
            self.pixels[index + 2],
            self.pixels[index + 3],
        ]
    }

    /// Channel values of one pixel normalised to `[0, 1]`.
    pub fn pixel_f32(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixel(x, y).map(|channel| f32::from(channel) / 255.0)
    }
}

/// Runs frame plans against some backend.
///
/// The call order per frame is [`sync_viewport`](Self::sync_viewport),
/// one [`upload_vertices`](Self::upload_vertices) per layer, then
/// [`execute`](Self::execute), which also presents.
pub trait PassExecutor {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Builds the layer-count dependent resources (the merge program and the
    /// per-layer targets and buffers). Called once, before the first frame.
    fn configure_layers(&mut self, layer_count: usize) -> PipelineResult<()>;

    /// Reads the current drawable size and reallocates target storage if it
    /// changed since the previous frame.
    fn sync_viewport(&mut self) -> PipelineResult<Viewport>;

    fn upload_vertices(&mut self, layer: usize, buffer: &VertexBuffer) -> PipelineResult<()>;

    fn execute(&mut self, plan: &FramePlan) -> PipelineResult<()>;

    /// Copies a target's current contents back to the CPU.
    fn read_target(&mut self, target: Target) -> PipelineResult<TargetImage>;
}

impl<E: PassExecutor + ?Sized> PassExecutor for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn configure_layers(&mut self, layer_count: usize) -> PipelineResult<()> {
        (**self).configure_layers(layer_count)
    }

    fn sync_viewport(&mut self) -> PipelineResult<Viewport> {
        (**self).sync_viewport()
    }

    fn upload_vertices(&mut self, layer: usize, buffer: &VertexBuffer) -> PipelineResult<()> {
        (**self).upload_vertices(layer, buffer)
    }

    fn execute(&mut self, plan: &FramePlan) -> PipelineResult<()> {
        (**self).execute(plan)
    }

    fn read_target(&mut self, target: Target) -> PipelineResult<TargetImage> {
        (**self).read_target(target)
    }
}
