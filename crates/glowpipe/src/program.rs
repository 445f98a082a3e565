//! Program descriptions shared by every executor.
//!
//! A [`ProgramLayout`] is the single source of truth for a program's uniform
//! block (std140) and texture inputs. The GLSL declarations in
//! [`crate::shaders`] are generated from it, the GPU executor uploads
//! [`ProgramState::bytes`] verbatim, and the software executor reads the
//! same bytes back through the typed getters.

use std::fmt;

use crate::error::{PipelineError, PipelineResult};

/// The six programs the pass graph is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramId {
    LineDraw,
    SeparableBlur,
    Copy,
    Combine,
    Composite,
    MergeLayers,
}

impl ProgramId {
    pub const ALL: [ProgramId; 6] = [
        ProgramId::LineDraw,
        ProgramId::SeparableBlur,
        ProgramId::Copy,
        ProgramId::Combine,
        ProgramId::Composite,
        ProgramId::MergeLayers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProgramId::LineDraw => "lineDraw",
            ProgramId::SeparableBlur => "separableBlur",
            ProgramId::Copy => "copy",
            ProgramId::Combine => "combine",
            ProgramId::Composite => "composite",
            ProgramId::MergeLayers => "mergeLayers",
        }
    }

    /// Uniform and texture layout of this program.
    ///
    /// `layer_count` only affects `mergeLayers`, which samples one texture
    /// per configured layer.
    pub fn layout(self, layer_count: usize) -> ProgramLayout {
        use UniformKind::*;

        let (uniforms, textures): (&[(&'static str, UniformKind)], Vec<String>) = match self {
            ProgramId::LineDraw => (
                &[
                    ("uViewportSize", Vec2),
                    ("uCameraOrigin", Vec2),
                    ("uCameraZoom", Float),
                    ("uCameraRotation", Float),
                    ("uLineWidth", Float),
                    ("uJitter", Float),
                    ("uJitterSeed", Float),
                ],
                Vec::new(),
            ),
            ProgramId::SeparableBlur => (
                &[
                    ("uViewportSize", Vec2),
                    ("direction", Vec2),
                    ("kernelRadius", Float),
                    ("sigma", Float),
                ],
                vec!["texture".to_owned()],
            ),
            ProgramId::Copy => (
                &[("uViewportSize", Vec2), ("opacity", Float)],
                vec!["texture".to_owned()],
            ),
            ProgramId::Combine => (
                &[("uViewportSize", Vec2)],
                vec!["srcData".to_owned(), "blurData".to_owned()],
            ),
            ProgramId::Composite => (
                &[
                    ("uViewportSize", Vec2),
                    ("bloomStrength", Float),
                    ("bloomFactors", FloatArray(BLUR_LEVELS)),
                    ("bloomTintColors", Vec3Array(BLUR_LEVELS)),
                ],
                (0..BLUR_LEVELS).map(|i| format!("blurLevel{i}")).collect(),
            ),
            ProgramId::MergeLayers => (
                &[("uViewportSize", Vec2)],
                (0..layer_count).map(|i| format!("layer{i}")).collect(),
            ),
        };
        ProgramLayout::new(self, uniforms, textures)
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of retained blur levels sampled by `composite`.
pub const BLUR_LEVELS: usize = 5;

/// GLSL type of one uniform block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    FloatArray(usize),
    Vec3Array(usize),
}

impl UniformKind {
    /// std140 base alignment in bytes.
    fn align(self) -> usize {
        match self {
            UniformKind::Float => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 | UniformKind::Vec4 => 16,
            UniformKind::FloatArray(_) | UniformKind::Vec3Array(_) => 16,
        }
    }

    /// Bytes occupied in the block, array padding included.
    fn size(self) -> usize {
        match self {
            UniformKind::Float => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::FloatArray(len) | UniformKind::Vec3Array(len) => 16 * len,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            UniformKind::Float => "a float",
            UniformKind::Vec2 => "a vec2",
            UniformKind::Vec3 => "a vec3",
            UniformKind::Vec4 => "a vec4",
            UniformKind::FloatArray(_) => "a float array",
            UniformKind::Vec3Array(_) => "a vec3 array",
        }
    }

    /// Member declaration inside the uniform block, e.g. `float sigma;`.
    pub fn glsl_member(self, name: &str) -> String {
        match self {
            UniformKind::Float => format!("float {name};"),
            UniformKind::Vec2 => format!("vec2 {name};"),
            UniformKind::Vec3 => format!("vec3 {name};"),
            UniformKind::Vec4 => format!("vec4 {name};"),
            UniformKind::FloatArray(len) => format!("float {name}[{len}];"),
            UniformKind::Vec3Array(len) => format!("vec3 {name}[{len}];"),
        }
    }
}

/// A value accepted by [`ProgramState::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    FloatArray(Vec<f32>),
    Vec3Array(Vec<[f32; 3]>),
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: &'static str,
    pub kind: UniformKind,
    pub offset: usize,
}

/// Uniform block and texture inputs of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLayout {
    pub program: ProgramId,
    pub uniforms: Vec<UniformField>,
    /// Texture inputs in declaration order; input `i` binds to slot `i`.
    pub textures: Vec<String>,
    /// Block size rounded up to a multiple of 16 bytes.
    pub block_size: usize,
}

impl ProgramLayout {
    pub fn new(
        program: ProgramId,
        uniforms: &[(&'static str, UniformKind)],
        textures: Vec<String>,
    ) -> Self {
        let mut offset = 0usize;
        let mut fields = Vec::with_capacity(uniforms.len());
        for &(name, kind) in uniforms {
            offset = offset.next_multiple_of(kind.align());
            fields.push(UniformField { name, kind, offset });
            offset += kind.size();
        }
        Self {
            program,
            uniforms: fields,
            textures,
            block_size: offset.next_multiple_of(16).max(16),
        }
    }

    pub fn field(&self, name: &str) -> PipelineResult<&UniformField> {
        self.uniforms
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| PipelineError::UnknownUniform {
                program: self.program.name(),
                name: name.to_owned(),
            })
    }

    /// Binding slot of the named texture input.
    pub fn texture_slot(&self, name: &str) -> PipelineResult<usize> {
        self.textures
            .iter()
            .position(|texture| texture == name)
            .ok_or_else(|| PipelineError::UnknownUniform {
                program: self.program.name(),
                name: name.to_owned(),
            })
    }
}

/// Retained uniform values of one program.
///
/// Uniforms not mentioned in an [`apply`](ProgramState::apply) call keep
/// whatever value they were last given (zero initially).
#[derive(Debug, Clone)]
pub struct ProgramState {
    layout: ProgramLayout,
    bytes: Vec<u8>,
}

impl ProgramState {
    pub fn new(layout: ProgramLayout) -> Self {
        let bytes = vec![0; layout.block_size];
        Self { layout, bytes }
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }

    /// The std140 block as it is uploaded.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Sets every value in `values`. Nothing is written unless all of them
    /// name a uniform of the matching kind.
    pub fn apply(&mut self, values: &[(&str, UniformValue)]) -> PipelineResult<()> {
        let fields = values
            .iter()
            .map(|(name, value)| self.checked_field(name, value))
            .collect::<PipelineResult<Vec<UniformField>>>()?;
        for (field, (_, value)) in fields.iter().zip(values) {
            self.store(field, value);
        }
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: &UniformValue) -> PipelineResult<()> {
        let field = self.checked_field(name, value)?;
        self.store(&field, value);
        Ok(())
    }

    fn checked_field(&self, name: &str, value: &UniformValue) -> PipelineResult<UniformField> {
        let field = self.layout.field(name)?;
        let matches = match (field.kind, value) {
            (UniformKind::Float, UniformValue::Float(_))
            | (UniformKind::Vec2, UniformValue::Vec2(_))
            | (UniformKind::Vec3, UniformValue::Vec3(_))
            | (UniformKind::Vec4, UniformValue::Vec4(_)) => true,
            (UniformKind::FloatArray(len), UniformValue::FloatArray(items)) => items.len() == len,
            (UniformKind::Vec3Array(len), UniformValue::Vec3Array(items)) => items.len() == len,
            _ => false,
        };
        if matches {
            Ok(field.clone())
        } else {
            Err(self.kind_error(name, field.kind))
        }
    }

    fn store(&mut self, field: &UniformField, value: &UniformValue) {
        match value {
            UniformValue::Float(v) => self.write(field.offset, &[*v]),
            UniformValue::Vec2(v) => self.write(field.offset, v),
            UniformValue::Vec3(v) => self.write(field.offset, v),
            UniformValue::Vec4(v) => self.write(field.offset, v),
            UniformValue::FloatArray(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.write(field.offset + 16 * i, &[*item]);
                }
            }
            UniformValue::Vec3Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.write(field.offset + 16 * i, item);
                }
            }
        }
    }

    fn kind_error(&self, name: &str, kind: UniformKind) -> PipelineError {
        PipelineError::UniformKind {
            program: self.layout.program.name(),
            name: name.to_owned(),
            expected: kind.describe(),
        }
    }

    fn write(&mut self, offset: usize, values: &[f32]) {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn read(&self, offset: usize) -> f32 {
        bytemuck::pod_read_unaligned(&self.bytes[offset..offset + 4])
    }

    pub fn float(&self, name: &str) -> PipelineResult<f32> {
        let field = self.layout.field(name)?;
        match field.kind {
            UniformKind::Float => Ok(self.read(field.offset)),
            kind => Err(self.kind_error(name, kind)),
        }
    }

    pub fn vec2(&self, name: &str) -> PipelineResult<[f32; 2]> {
        let field = self.layout.field(name)?;
        match field.kind {
            UniformKind::Vec2 => Ok([self.read(field.offset), self.read(field.offset + 4)]),
            kind => Err(self.kind_error(name, kind)),
        }
    }

    pub fn float_array(&self, name: &str) -> PipelineResult<Vec<f32>> {
        let field = self.layout.field(name)?;
        match field.kind {
            UniformKind::FloatArray(len) => {
                Ok((0..len).map(|i| self.read(field.offset + 16 * i)).collect())
            }
            kind => Err(self.kind_error(name, kind)),
        }
    }

    pub fn vec3_array(&self, name: &str) -> PipelineResult<Vec<[f32; 3]>> {
        let field = self.layout.field(name)?;
        match field.kind {
            UniformKind::Vec3Array(len) => Ok((0..len)
                .map(|i| {
                    let base = field.offset + 16 * i;
                    [self.read(base), self.read(base + 4), self.read(base + 8)]
                })
                .collect()),
            kind => Err(self.kind_error(name, kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_draw_block_follows_std140_packing() {
        let layout = ProgramId::LineDraw.layout(3);
        let offsets: Vec<(&str, usize)> = layout.uniforms.iter().map(|f| (f.name, f.offset)).collect();
        assert_eq!(
            offsets,
            vec![
                ("uViewportSize", 0),
                ("uCameraOrigin", 8),
                ("uCameraZoom", 16),
                ("uCameraRotation", 20),
                ("uLineWidth", 24),
                ("uJitter", 28),
                ("uJitterSeed", 32),
            ]
        );
        assert_eq!(layout.block_size, 48);
    }

    #[test]
    fn composite_arrays_use_sixteen_byte_stride() {
        let layout = ProgramId::Composite.layout(3);
        assert_eq!(layout.field("bloomStrength").unwrap().offset, 8);
        assert_eq!(layout.field("bloomFactors").unwrap().offset, 16);
        assert_eq!(layout.field("bloomTintColors").unwrap().offset, 96);
        assert_eq!(layout.block_size, 176);
        assert_eq!(layout.textures.len(), BLUR_LEVELS);
    }

    #[test]
    fn merge_layers_declares_one_texture_per_layer() {
        let layout = ProgramId::MergeLayers.layout(4);
        assert_eq!(layout.textures, vec!["layer0", "layer1", "layer2", "layer3"]);
        assert_eq!(layout.texture_slot("layer3").unwrap(), 3);
    }

    #[test]
    fn unspecified_uniforms_retain_previous_values() {
        let mut state = ProgramState::new(ProgramId::SeparableBlur.layout(1));
        state
            .apply(&[
                ("uViewportSize", [640.0, 480.0].into()),
                ("sigma", 3.0.into()),
                ("kernelRadius", 3.0.into()),
            ])
            .unwrap();
        state.apply(&[("direction", [0.0, 1.0].into())]).unwrap();

        assert_eq!(state.vec2("uViewportSize").unwrap(), [640.0, 480.0]);
        assert_eq!(state.float("sigma").unwrap(), 3.0);
        assert_eq!(state.vec2("direction").unwrap(), [0.0, 1.0]);
    }

    #[test]
    fn arrays_round_trip_through_the_block() {
        let mut state = ProgramState::new(ProgramId::Composite.layout(1));
        let factors = vec![1.0, 0.8, 0.6, 0.4, 0.2];
        let tints = vec![[1.0, 0.5, 0.25]; BLUR_LEVELS];
        state
            .apply(&[
                ("bloomFactors", UniformValue::FloatArray(factors.clone())),
                ("bloomTintColors", UniformValue::Vec3Array(tints.clone())),
            ])
            .unwrap();
        assert_eq!(state.float_array("bloomFactors").unwrap(), factors);
        assert_eq!(state.vec3_array("bloomTintColors").unwrap(), tints);
    }

    #[test]
    fn unknown_names_and_kind_mismatches_are_rejected() {
        let mut state = ProgramState::new(ProgramId::Copy.layout(1));
        let err = state.apply(&[("bloomRadius", 0.5.into())]).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownUniform { program: "copy", .. }));

        let err = state.apply(&[("opacity", [1.0, 1.0].into())]).unwrap_err();
        assert!(matches!(err, PipelineError::UniformKind { expected: "a float", .. }));

        let mut composite = ProgramState::new(ProgramId::Composite.layout(1));
        let err = composite
            .apply(&[("bloomFactors", UniformValue::FloatArray(vec![1.0]))])
            .unwrap_err();
        assert!(matches!(err, PipelineError::UniformKind { .. }));
    }

    #[test]
    fn failed_apply_leaves_the_block_untouched() {
        let mut state = ProgramState::new(ProgramId::Copy.layout(1));
        state
            .apply(&[("uViewportSize", [64.0, 48.0].into()), ("opacity", 1.0.into())])
            .unwrap();
        let before = state.bytes().to_vec();

        let err = state
            .apply(&[
                ("opacity", 0.25.into()),
                ("uViewportSize", [8.0, 8.0].into()),
                ("sigma", 2.0.into()),
            ])
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownUniform { .. }));
        assert_eq!(state.bytes(), &before[..]);

        let err = state
            .apply(&[("opacity", 0.25.into()), ("uViewportSize", 8.0.into())])
            .unwrap_err();
        assert!(matches!(err, PipelineError::UniformKind { .. }));
        assert_eq!(state.float("opacity").unwrap(), 1.0);
    }
}
