//! CPU reference executor.
//!
//! Runs the same [`FramePlan`] as the GPU path against RGBA8 surfaces. Values
//! are clamped and rounded to 8 bits on every store, as a `Rgba8Unorm` render
//! target does, and sampling clamps to the edge. Filter passes render at the
//! target's own resolution, so linear sampling at texel centres reduces to
//! exact texel fetches.

use std::collections::{BTreeMap, HashMap};

use crate::buffer::VertexBuffer;
use crate::error::{PipelineError, PipelineResult};
use crate::executor::{PassExecutor, TargetImage};
use crate::geometry::{clip_to_pixel, expand_vertex, LineCamera, LineVertex, VERTEX_FLOATS};
use crate::graph::{FramePlan, Geometry, Pass, Target};
use crate::program::{ProgramId, ProgramState};
use crate::types::{Point, Viewport};

#[derive(Debug, Clone)]
struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    fn new(viewport: Viewport) -> Self {
        Self {
            width: viewport.width,
            height: viewport.height,
            data: vec![0; viewport.pixel_count() * 4],
        }
    }

    fn clear(&mut self) {
        self.data.fill(0);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        ((y * self.width + x) * 4) as usize
    }

    /// Clamp-to-edge texel fetch.
    fn fetch(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, i64::from(self.width) - 1) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;
        let i = self.index(x, y);
        [0, 1, 2, 3].map(|c| f32::from(self.data[i + c]) / 255.0)
    }

    fn store(&mut self, x: u32, y: u32, value: [f32; 4]) {
        let i = self.index(x, y);
        for (c, v) in value.iter().enumerate() {
            self.data[i + c] = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }

    fn fill(&mut self, mut shade: impl FnMut(i64, i64) -> [f32; 4]) {
        for y in 0..self.height {
            for x in 0..self.width {
                let value = shade(i64::from(x), i64::from(y));
                self.store(x, y, value);
            }
        }
    }
}

fn add(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

fn scale(a: [f32; 4], s: f32) -> [f32; 4] {
    a.map(|v| v * s)
}

fn edge(a: Point, b: Point, p: Point) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Top-left fill rule for a positively oriented triangle in y-down space.
fn is_top_left(a: Point, b: Point) -> bool {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dy == 0.0 && dx > 0.0) || dy < 0.0
}

/// Executes frame plans on the CPU.
#[derive(Debug)]
pub struct SoftwareExecutor {
    viewport: Viewport,
    allocated: Option<Viewport>,
    layer_count: usize,
    programs: BTreeMap<ProgramId, ProgramState>,
    surfaces: HashMap<Target, Surface>,
    vertices: Vec<Vec<f32>>,
}

impl SoftwareExecutor {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            allocated: None,
            layer_count: 0,
            programs: BTreeMap::new(),
            surfaces: HashMap::new(),
            vertices: Vec::new(),
        }
    }

    /// Changes the size reported to the next [`PassExecutor::sync_viewport`].
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn surface(&self, target: Target) -> PipelineResult<&Surface> {
        self.surfaces
            .get(&target)
            .ok_or_else(|| PipelineError::MissingTarget(target.to_string()))
    }

    fn program(&self, id: ProgramId) -> PipelineResult<&ProgramState> {
        self.programs
            .get(&id)
            .ok_or_else(|| PipelineError::Layers("executor has no configured programs".into()))
    }

    fn run_pass(&mut self, pass: &Pass) -> PipelineResult<()> {
        self.programs
            .get_mut(&pass.program)
            .ok_or_else(|| PipelineError::Layers("executor has no configured programs".into()))?
            .apply(&pass.uniforms)?;

        let mut output = self
            .surfaces
            .remove(&pass.target)
            .ok_or_else(|| PipelineError::MissingTarget(pass.target.to_string()))?;
        output.clear();
        let result = match pass.geometry {
            Geometry::Lines {
                layer,
                vertex_count,
            } => self.draw_lines(layer, vertex_count, &mut output),
            Geometry::Quad => self.draw_filter(pass, &mut output),
        };
        self.surfaces.insert(pass.target, output);
        result
    }

    fn draw_lines(&self, layer: usize, vertex_count: u32, output: &mut Surface) -> PipelineResult<()> {
        let state = self.program(ProgramId::LineDraw)?;
        let camera = LineCamera {
            viewport: state.vec2("uViewportSize")?,
            origin: state.vec2("uCameraOrigin")?,
            zoom: state.float("uCameraZoom")?,
            rotation: state.float("uCameraRotation")?,
            line_width: state.float("uLineWidth")?,
            jitter: state.float("uJitter")?,
            jitter_seed: state.float("uJitterSeed")?,
        };
        let floats = self.vertices.get(layer).ok_or(PipelineError::UnknownLayer {
            index: layer,
            count: self.layer_count,
        })?;
        let size = Viewport::new(output.width, output.height);
        let strip: Vec<(Point, [f32; 4])> = floats
            .chunks_exact(VERTEX_FLOATS)
            .take(vertex_count as usize)
            .map(|chunk| {
                let vertex = LineVertex::from_floats(chunk);
                (clip_to_pixel(expand_vertex(&vertex, &camera), size), vertex.color)
            })
            .collect();

        for triangle in strip.windows(3) {
            rasterize(output, triangle[0], triangle[1], triangle[2]);
        }
        Ok(())
    }

    fn draw_filter(&self, pass: &Pass, output: &mut Surface) -> PipelineResult<()> {
        let state = self.program(pass.program)?;
        let layout = state.layout();

        let mut bound: Vec<Option<&Surface>> = vec![None; layout.textures.len()];
        for (name, target) in &pass.inputs {
            bound[layout.texture_slot(name)?] = Some(self.surface(*target)?);
        }
        let inputs = bound
            .into_iter()
            .zip(&layout.textures)
            .map(|(surface, name)| {
                surface.ok_or_else(|| {
                    PipelineError::MissingTarget(format!("{} input '{name}'", pass.program))
                })
            })
            .collect::<PipelineResult<Vec<&Surface>>>()?;

        match pass.program {
            ProgramId::SeparableBlur => {
                let direction = state.vec2("direction")?;
                let radius = state.float("kernelRadius")? as i64;
                let sigma = state.float("sigma")?.max(0.0001);
                let weights: Vec<(i64, f32)> = (-radius..=radius)
                    .map(|i| {
                        let x = i as f32;
                        (i, (-(x * x) / (2.0 * sigma * sigma)).exp())
                    })
                    .collect();
                let total: f32 = weights.iter().map(|(_, w)| w).sum();
                let (dx, dy) = (direction[0].round() as i64, direction[1].round() as i64);
                let source = inputs[0];
                output.fill(|x, y| {
                    let sum = weights.iter().fold([0.0; 4], |acc, &(i, w)| {
                        add(acc, scale(source.fetch(x + dx * i, y + dy * i), w))
                    });
                    scale(sum, 1.0 / total)
                });
            }
            ProgramId::Copy => {
                let opacity = state.float("opacity")?;
                output.fill(|x, y| scale(inputs[0].fetch(x, y), opacity));
            }
            ProgramId::Combine => {
                output.fill(|x, y| add(inputs[0].fetch(x, y), inputs[1].fetch(x, y)));
            }
            ProgramId::Composite => {
                let strength = state.float("bloomStrength")?;
                let factors = state.float_array("bloomFactors")?;
                let tints = state.vec3_array("bloomTintColors")?;
                output.fill(|x, y| {
                    let sum = inputs.iter().enumerate().fold([0.0; 4], |acc, (level, input)| {
                        let texel = input.fetch(x, y);
                        let tint = tints[level];
                        let weighted = [
                            texel[0] * tint[0],
                            texel[1] * tint[1],
                            texel[2] * tint[2],
                            texel[3],
                        ];
                        add(acc, scale(weighted, factors[level]))
                    });
                    scale(sum, strength)
                });
            }
            ProgramId::MergeLayers => {
                output.fill(|x, y| {
                    inputs
                        .iter()
                        .fold([0.0; 4], |acc, input| add(acc, input.fetch(x, y)))
                });
            }
            ProgramId::LineDraw => {
                return Err(PipelineError::Layers(
                    "lineDraw cannot run as a full-screen pass".into(),
                ))
            }
        }
        Ok(())
    }
}

/// Fills one triangle with `SRC_ALPHA, ONE` additive blending.
fn rasterize(
    output: &mut Surface,
    (a, color_a): (Point, [f32; 4]),
    (mut b, mut color_b): (Point, [f32; 4]),
    (mut c, mut color_c): (Point, [f32; 4]),
) {
    let mut area = edge(a, b, c);
    if area.abs() < 1e-6 {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut b, &mut c);
        std::mem::swap(&mut color_b, &mut color_c);
        area = -area;
    }

    let min_x = a[0].min(b[0]).min(c[0]).floor().max(0.0) as u32;
    let min_y = a[1].min(b[1]).min(c[1]).floor().max(0.0) as u32;
    let max_x = (a[0].max(b[0]).max(c[0]).ceil() as i64).min(i64::from(output.width)) as u32;
    let max_y = (a[1].max(b[1]).max(c[1]).ceil() as i64).min(i64::from(output.height)) as u32;

    let inside = |w: f32, from: Point, to: Point| w > 0.0 || (w == 0.0 && is_top_left(from, to));

    for y in min_y..max_y {
        for x in min_x..max_x {
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let w0 = edge(b, c, p);
            let w1 = edge(c, a, p);
            let w2 = edge(a, b, p);
            if !(inside(w0, b, c) && inside(w1, c, a) && inside(w2, a, b)) {
                continue;
            }
            let src = [0, 1, 2, 3].map(|i| (color_a[i] * w0 + color_b[i] * w1 + color_c[i] * w2) / area);
            let dst = output.fetch(i64::from(x), i64::from(y));
            let blended = [
                src[0] * src[3] + dst[0],
                src[1] * src[3] + dst[1],
                src[2] * src[3] + dst[2],
                src[3] + dst[3],
            ];
            output.store(x, y, blended);
        }
    }
}

impl PassExecutor for SoftwareExecutor {
    fn name(&self) -> &'static str {
        "software"
    }

    fn configure_layers(&mut self, layer_count: usize) -> PipelineResult<()> {
        self.layer_count = layer_count;
        self.programs = ProgramId::ALL
            .iter()
            .map(|&id| (id, ProgramState::new(id.layout(layer_count))))
            .collect();
        self.vertices = vec![Vec::new(); layer_count];
        self.allocated = None;
        Ok(())
    }

    fn sync_viewport(&mut self) -> PipelineResult<Viewport> {
        if self.allocated != Some(self.viewport) {
            tracing::debug!(
                width = self.viewport.width,
                height = self.viewport.height,
                "allocating software render targets"
            );
            self.surfaces = Target::offscreen(self.layer_count)
                .into_iter()
                .chain(std::iter::once(Target::Screen))
                .map(|target| (target, Surface::new(self.viewport)))
                .collect();
            self.allocated = Some(self.viewport);
        }
        Ok(self.viewport)
    }

    fn upload_vertices(&mut self, layer: usize, buffer: &VertexBuffer) -> PipelineResult<()> {
        let count = self.layer_count;
        let slot = self
            .vertices
            .get_mut(layer)
            .ok_or(PipelineError::UnknownLayer { index: layer, count })?;
        slot.clear();
        slot.extend_from_slice(buffer.written());
        Ok(())
    }

    fn execute(&mut self, plan: &FramePlan) -> PipelineResult<()> {
        if self.allocated != Some(plan.viewport) {
            return Err(PipelineError::MissingTarget(format!(
                "targets sized for {}x{}",
                plan.viewport.width, plan.viewport.height
            )));
        }
        for pass in &plan.passes {
            self.run_pass(pass)?;
        }
        Ok(())
    }

    fn read_target(&mut self, target: Target) -> PipelineResult<TargetImage> {
        let surface = self.surface(target)?;
        Ok(TargetImage {
            width: surface.width,
            height: surface.height,
            pixels: surface.data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_frame_plan, LayerFrame, BLOOM_FACTORS};
    use crate::packer::pack_sprites;
    use crate::types::{FrameParams, LayerParams, Sprite, SpriteMap};

    fn line_executor(size: u32) -> (SoftwareExecutor, FramePlan) {
        line_executor_with(
            size,
            LayerParams {
                line_width: 100.0,
                ..LayerParams::default()
            },
        )
    }

    fn line_executor_with(size: u32, params: LayerParams) -> (SoftwareExecutor, FramePlan) {
        let mut executor = SoftwareExecutor::new(Viewport::new(size, size));
        executor.configure_layers(1).unwrap();
        let viewport = executor.sync_viewport().unwrap();

        let mut sprites = SpriteMap::new();
        sprites.insert("bar".into(), Sprite::new(vec![vec![[-10.0, 0.0], [10.0, 0.0]]]));
        let mut buffer = VertexBuffer::new();
        let vertex_count = pack_sprites(&sprites, &mut buffer);
        executor.upload_vertices(0, &buffer).unwrap();

        let plan = build_frame_plan(
            viewport,
            &[LayerFrame {
                params: &params,
                vertex_count,
            }],
            &FrameParams::default(),
        );
        (executor, plan)
    }

    fn run_first(executor: &mut SoftwareExecutor, plan: &FramePlan, passes: usize) {
        let partial = FramePlan {
            viewport: plan.viewport,
            passes: plan.passes[..passes].to_vec(),
        };
        executor.execute(&partial).unwrap();
    }

    #[test]
    fn line_strip_fills_its_quad_once() {
        let (mut executor, plan) = line_executor(32);
        run_first(&mut executor, &plan, 1);
        let clean = executor.read_target(Target::LayerClean(0)).unwrap();

        // 1.6 px half width around row 16; x spans 6..26.
        assert_eq!(clean.pixel(16, 16), [255, 255, 255, 255]);
        assert_eq!(clean.pixel(16, 15), [255, 255, 255, 255]);
        assert_eq!(clean.pixel(7, 16), [255, 255, 255, 255]);
        assert_eq!(clean.pixel(16, 12), [0, 0, 0, 0]);
        assert_eq!(clean.pixel(4, 16), [0, 0, 0, 0]);
        assert_eq!(clean.pixel(28, 16), [0, 0, 0, 0]);
    }

    #[test]
    fn separable_blur_spreads_symmetrically() {
        let (mut executor, plan) = line_executor(32);
        run_first(&mut executor, &plan, 3);
        let blurred = executor.read_target(Target::BlurVertical).unwrap();

        let above = blurred.pixel(16, 12);
        let below = blurred.pixel(16, 19);
        assert_eq!(above, below);
        assert!(above[0] > 0 && above[0] < 255);
        assert!(blurred.pixel(16, 16)[0] > above[0]);
    }

    #[test]
    fn zero_bloom_strength_leaves_only_the_clean_lines() {
        let (mut executor, plan) = line_executor_with(
            32,
            LayerParams {
                line_width: 100.0,
                bloom_strength: 0.0,
                ..LayerParams::default()
            },
        );
        executor.execute(&plan).unwrap();

        let clean = executor.read_target(Target::LayerClean(0)).unwrap();
        let glow = executor.read_target(Target::LayerGlow(0)).unwrap();
        assert!(executor
            .read_target(Target::BlurResult)
            .unwrap()
            .pixels
            .iter()
            .all(|&b| b == 0));
        assert_eq!(glow, clean);
    }

    #[test]
    fn glow_adds_bloom_around_the_clean_lines() {
        let (mut executor, plan) = line_executor(32);
        executor.execute(&plan).unwrap();

        let clean = executor.read_target(Target::LayerClean(0)).unwrap();
        let glow = executor.read_target(Target::LayerGlow(0)).unwrap();
        assert_eq!(clean.pixel(16, 12)[0], 0);
        assert!(glow.pixel(16, 12)[0] > 0);
        assert_eq!(glow.pixel(16, 16), clean.pixel(16, 16));
    }

    #[test]
    fn composite_weights_each_blur_level() {
        let (mut executor, plan) = line_executor(32);
        executor.execute(&plan).unwrap();

        let (x, y) = (16, 9);
        let expected: f32 = BLOOM_FACTORS
            .iter()
            .enumerate()
            .map(|(level, factor)| {
                let image = executor.read_target(Target::BlurLevel(level)).unwrap();
                factor * image.pixel_f32(x, y)[0]
            })
            .sum();
        let composite = executor.read_target(Target::BlurResult).unwrap().pixel_f32(x, y)[0];
        assert!(expected > 0.0 && expected < 1.0, "expected {expected}");
        assert!((composite - expected).abs() < 0.02, "{composite} vs {expected}");

        let glow = executor.read_target(Target::LayerGlow(0)).unwrap().pixel_f32(x, y)[0];
        let clean = executor.read_target(Target::LayerClean(0)).unwrap().pixel_f32(x, y)[0];
        assert!((glow - (clean + composite)).abs() < 0.01);
    }

    #[test]
    fn resizing_reallocates_cleared_targets() {
        let (mut executor, plan) = line_executor(16);
        run_first(&mut executor, &plan, 1);
        executor.resize(Viewport::new(24, 8));
        let viewport = executor.sync_viewport().unwrap();
        assert_eq!(viewport, Viewport::new(24, 8));

        let clean = executor.read_target(Target::LayerClean(0)).unwrap();
        assert_eq!((clean.width, clean.height), (24, 8));
        assert!(clean.pixels.iter().all(|&b| b == 0));

        // The old plan targets the previous size.
        assert!(executor.execute(&plan).is_err());
    }

    #[test]
    fn unconfigured_executor_rejects_plans() {
        let mut executor = SoftwareExecutor::new(Viewport::new(4, 4));
        let viewport = executor.sync_viewport().unwrap();
        let plan = build_frame_plan(viewport, &[], &FrameParams::default());
        assert!(executor.execute(&plan).is_err());
    }
}
