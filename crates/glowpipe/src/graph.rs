//! The per-frame pass graph.
//!
//! A [`FramePlan`] is plain data: executors walk its passes in order, clear
//! each pass's target, bind the named inputs, apply the uniforms and draw
//! either the full-screen quad or one layer's line strip.

use std::fmt;

use crate::geometry::LINE_WIDTH_UNIT;
use crate::program::{ProgramId, UniformValue, BLUR_LEVELS};
use crate::types::{FrameParams, LayerParams, Viewport};

/// Kernel radius of each blur level, in texels.
pub const KERNEL_RADII: [f32; BLUR_LEVELS] = [3.0, 5.0, 7.0, 9.0, 11.0];

/// Weight of each blur level in the bloom composite.
pub const BLOOM_FACTORS: [f32; BLUR_LEVELS] = [1.0, 0.8, 0.6, 0.4, 0.2];

pub const BLOOM_TINT: [f32; 3] = [1.0, 1.0, 1.0];

pub const BLUR_DIRECTION_HORIZONTAL: [f32; 2] = [1.0, 0.0];
pub const BLUR_DIRECTION_VERTICAL: [f32; 2] = [0.0, 1.0];

/// Full-screen rectangle drawn as a 4-vertex triangle strip.
pub const FILTER_QUAD: [f32; 8] = [-1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0, -1.0];

/// Passes emitted per layer: line draw, three per blur level, composite, combine.
pub const PASSES_PER_LAYER: usize = 1 + 3 * BLUR_LEVELS + 2;

/// Passes emitted once per frame after the layers: merge, trail combine,
/// screen copy, afterglow copy.
pub const FRAME_PASSES: usize = 4;

/// A render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    /// Line drawing of one layer.
    LayerClean(usize),
    /// Line drawing plus bloom of one layer.
    LayerGlow(usize),
    BlurHorizontal,
    BlurVertical,
    BlurLevel(usize),
    BlurResult,
    FrameClean,
    LastFrame,
    FrameWithLastFrame,
    /// The presented image.
    Screen,
}

impl Target {
    /// Every off-screen target used with `layer_count` layers.
    pub fn offscreen(layer_count: usize) -> Vec<Target> {
        let mut targets = Vec::with_capacity(2 * layer_count + BLUR_LEVELS + 7);
        for layer in 0..layer_count {
            targets.push(Target::LayerClean(layer));
            targets.push(Target::LayerGlow(layer));
        }
        targets.push(Target::BlurHorizontal);
        targets.push(Target::BlurVertical);
        targets.extend((0..BLUR_LEVELS).map(Target::BlurLevel));
        targets.extend([
            Target::BlurResult,
            Target::FrameClean,
            Target::LastFrame,
            Target::FrameWithLastFrame,
        ]);
        targets
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::LayerClean(layer) => write!(f, "clean[{layer}]"),
            Target::LayerGlow(layer) => write!(f, "glow[{layer}]"),
            Target::BlurHorizontal => f.write_str("blurPassHorizontal"),
            Target::BlurVertical => f.write_str("blurPassVertical"),
            Target::BlurLevel(level) => write!(f, "blurLevel{level}"),
            Target::BlurResult => f.write_str("blurResult"),
            Target::FrameClean => f.write_str("frameClean"),
            Target::LastFrame => f.write_str("lastFrame"),
            Target::FrameWithLastFrame => f.write_str("frameWithLastFrame"),
            Target::Screen => f.write_str("screen"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// [`FILTER_QUAD`] as a triangle strip.
    Quad,
    /// The first `vertex_count` vertices of a layer's line buffer.
    Lines { layer: usize, vertex_count: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub program: ProgramId,
    pub target: Target,
    pub uniforms: Vec<(&'static str, UniformValue)>,
    /// Texture inputs by program input name.
    pub inputs: Vec<(String, Target)>,
    pub geometry: Geometry,
}

impl Pass {
    pub(crate) fn filter(program: ProgramId, target: Target) -> Self {
        Self {
            program,
            target,
            uniforms: Vec::new(),
            inputs: Vec::new(),
            geometry: Geometry::Quad,
        }
    }

    pub(crate) fn uniform(mut self, name: &'static str, value: impl Into<UniformValue>) -> Self {
        self.uniforms.push((name, value.into()));
        self
    }

    fn input(mut self, name: impl Into<String>, target: Target) -> Self {
        self.inputs.push((name.into(), target));
        self
    }

    /// Line draws accumulate with `SRC_ALPHA, ONE`; filters overwrite.
    pub fn blends_additively(&self) -> bool {
        self.program == ProgramId::LineDraw
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub viewport: Viewport,
    pub passes: Vec<Pass>,
}

/// Per-layer input of [`build_frame_plan`].
#[derive(Debug, Clone, Copy)]
pub struct LayerFrame<'a> {
    pub params: &'a LayerParams,
    pub vertex_count: u32,
}

/// Builds the ordered pass list for one frame.
pub fn build_frame_plan(
    viewport: Viewport,
    layers: &[LayerFrame<'_>],
    frame: &FrameParams,
) -> FramePlan {
    let size = viewport.as_uniform();
    let mut passes = Vec::with_capacity(layers.len() * PASSES_PER_LAYER + FRAME_PASSES);

    for (index, layer) in layers.iter().enumerate() {
        passes.push(line_pass(index, layer, size, frame.jitter_seed));
        glow_passes(&mut passes, index, layer.params, size);
    }

    let mut merge =
        Pass::filter(ProgramId::MergeLayers, Target::FrameClean).uniform("uViewportSize", size);
    for index in 0..layers.len() {
        merge = merge.input(format!("layer{index}"), Target::LayerGlow(index));
    }
    passes.push(merge);

    passes.push(
        Pass::filter(ProgramId::Combine, Target::FrameWithLastFrame)
            .uniform("uViewportSize", size)
            .input("srcData", Target::FrameClean)
            .input("blurData", Target::LastFrame),
    );
    passes.push(
        Pass::filter(ProgramId::Copy, Target::Screen)
            .uniform("uViewportSize", size)
            .uniform("opacity", 1.0)
            .input("texture", Target::FrameWithLastFrame),
    );
    passes.push(
        Pass::filter(ProgramId::Copy, Target::LastFrame)
            .uniform("uViewportSize", size)
            .uniform("opacity", frame.after_glow)
            .input("texture", Target::FrameWithLastFrame),
    );

    FramePlan { viewport, passes }
}

fn line_pass(index: usize, layer: &LayerFrame<'_>, size: [f32; 2], jitter_seed: f32) -> Pass {
    let params = layer.params;
    Pass {
        program: ProgramId::LineDraw,
        target: Target::LayerClean(index),
        uniforms: vec![
            ("uViewportSize", size.into()),
            ("uCameraOrigin", [params.camera_x, params.camera_y].into()),
            ("uCameraZoom", params.zoom.into()),
            ("uCameraRotation", params.rotation.into()),
            ("uLineWidth", (LINE_WIDTH_UNIT * params.line_width).into()),
            ("uJitter", params.jitter.into()),
            ("uJitterSeed", jitter_seed.into()),
        ],
        inputs: Vec::new(),
        geometry: Geometry::Lines {
            layer: index,
            vertex_count: layer.vertex_count,
        },
    }
}

fn glow_passes(passes: &mut Vec<Pass>, index: usize, params: &LayerParams, size: [f32; 2]) {
    let clean = Target::LayerClean(index);

    for (level, radius) in KERNEL_RADII.iter().copied().enumerate() {
        let sigma = radius * 2.0 * params.bloom_radius;
        passes.push(
            Pass::filter(ProgramId::SeparableBlur, Target::BlurHorizontal)
                .uniform("uViewportSize", size)
                .uniform("kernelRadius", radius)
                .uniform("sigma", sigma)
                .uniform("direction", BLUR_DIRECTION_HORIZONTAL)
                .input("texture", clean),
        );
        passes.push(
            Pass::filter(ProgramId::SeparableBlur, Target::BlurVertical)
                .uniform("direction", BLUR_DIRECTION_VERTICAL)
                .input("texture", Target::BlurHorizontal),
        );
        passes.push(
            Pass::filter(ProgramId::Copy, Target::BlurLevel(level))
                .uniform("uViewportSize", size)
                .uniform("opacity", 1.0)
                .input("texture", Target::BlurVertical),
        );
    }

    let mut composite = Pass::filter(ProgramId::Composite, Target::BlurResult)
        .uniform("uViewportSize", size)
        .uniform("bloomStrength", params.bloom_strength)
        .uniform("bloomFactors", UniformValue::FloatArray(BLOOM_FACTORS.to_vec()))
        .uniform("bloomTintColors", UniformValue::Vec3Array(vec![BLOOM_TINT; BLUR_LEVELS]));
    for level in 0..BLUR_LEVELS {
        composite = composite.input(format!("blurLevel{level}"), Target::BlurLevel(level));
    }
    passes.push(composite);

    passes.push(
        Pass::filter(ProgramId::Combine, Target::LayerGlow(index))
            .uniform("uViewportSize", size)
            .input("srcData", clean)
            .input("blurData", Target::BlurResult),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(layer_count: usize, after_glow: f32) -> FramePlan {
        let params = vec![LayerParams::default(); layer_count];
        let layers: Vec<LayerFrame<'_>> = params
            .iter()
            .enumerate()
            .map(|(i, params)| LayerFrame {
                params,
                vertex_count: 6 * i as u32,
            })
            .collect();
        let frame = FrameParams {
            after_glow,
            ..FrameParams::default()
        };
        build_frame_plan(Viewport::new(64, 48), &layers, &frame)
    }

    #[test]
    fn pass_count_scales_with_layers() {
        for layers in 1..=4 {
            assert_eq!(plan(layers, 0.1).passes.len(), layers * PASSES_PER_LAYER + FRAME_PASSES);
        }
        assert_eq!(PASSES_PER_LAYER, 18);
    }

    #[test]
    fn each_layer_draws_lines_then_glows_into_its_own_targets() {
        let plan = plan(2, 0.1);
        let second = &plan.passes[PASSES_PER_LAYER..2 * PASSES_PER_LAYER];
        assert_eq!(second[0].program, ProgramId::LineDraw);
        assert_eq!(second[0].target, Target::LayerClean(1));
        assert_eq!(second[0].geometry, Geometry::Lines { layer: 1, vertex_count: 6 });
        assert_eq!(second[1].inputs, vec![("texture".to_owned(), Target::LayerClean(1))]);
        assert_eq!(second[3].target, Target::BlurLevel(0));
        assert_eq!(second[15].target, Target::BlurLevel(4));
        assert_eq!(second[16].program, ProgramId::Composite);
        assert_eq!(second[17].target, Target::LayerGlow(1));
    }

    #[test]
    fn line_pass_takes_the_jitter_seed_from_the_frame() {
        let params = LayerParams::default();
        let frame = FrameParams::default().for_frame(3);
        let plan = build_frame_plan(
            Viewport::new(8, 8),
            &[LayerFrame { params: &params, vertex_count: 6 }],
            &frame,
        );
        let seed = plan.passes[0]
            .uniforms
            .iter()
            .find(|(name, _)| *name == "uJitterSeed")
            .map(|(_, value)| value.clone());
        assert_eq!(seed, Some(UniformValue::Float(frame.jitter_seed)));
    }

    #[test]
    fn blur_schedule_scales_sigma_with_bloom_radius() {
        let params = LayerParams {
            bloom_radius: 1.0,
            ..LayerParams::default()
        };
        let plan = build_frame_plan(
            Viewport::new(8, 8),
            &[LayerFrame { params: &params, vertex_count: 0 }],
            &FrameParams::default(),
        );
        let sigmas: Vec<UniformValue> = plan
            .passes
            .iter()
            .filter(|pass| pass.target == Target::BlurHorizontal)
            .filter_map(|pass| pass.uniforms.iter().find(|(n, _)| *n == "sigma"))
            .map(|(_, v)| v.clone())
            .collect();
        let expected: Vec<UniformValue> = [6.0, 10.0, 14.0, 18.0, 22.0].map(UniformValue::Float).to_vec();
        assert_eq!(sigmas, expected);
    }

    #[test]
    fn merge_reads_every_layer_glow() {
        let plan = plan(4, 0.1);
        let merge = &plan.passes[4 * PASSES_PER_LAYER];
        assert_eq!(merge.program, ProgramId::MergeLayers);
        let inputs: Vec<Target> = merge.inputs.iter().map(|(_, t)| *t).collect();
        assert_eq!(
            inputs,
            (0..4).map(Target::LayerGlow).collect::<Vec<_>>()
        );
    }

    #[test]
    fn trail_passes_end_the_frame() {
        let plan = plan(1, 0.25);
        let tail: Vec<(ProgramId, Target)> = plan.passes[plan.passes.len() - 3..]
            .iter()
            .map(|pass| (pass.program, pass.target))
            .collect();
        assert_eq!(
            tail,
            vec![
                (ProgramId::Combine, Target::FrameWithLastFrame),
                (ProgramId::Copy, Target::Screen),
                (ProgramId::Copy, Target::LastFrame),
            ]
        );
        let last = plan.passes.last().unwrap();
        assert!(last.uniforms.contains(&("opacity", UniformValue::Float(0.25))));
    }

    #[test]
    fn only_line_draws_blend() {
        let plan = plan(1, 0.1);
        assert!(plan.passes[0].blends_additively());
        assert!(plan.passes[1..].iter().all(|pass| !pass.blends_additively()));
    }
}
