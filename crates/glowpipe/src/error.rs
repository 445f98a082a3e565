use thiserror::Error;

/// Errors raised by the line pipeline.
///
/// Initialisation failures (context, shaders, layer setup) are fatal; the
/// remaining variants surface per-frame problems to the caller untouched.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no drawing context available: {0}")]
    ContextUnavailable(String),
    #[error("program '{program}' failed to compile: {message}")]
    ShaderCompile {
        program: &'static str,
        message: String,
    },
    #[error("program '{program}' has no uniform named '{name}'")]
    UnknownUniform { program: &'static str, name: String },
    #[error("uniform '{name}' of program '{program}' expects {expected}")]
    UniformKind {
        program: &'static str,
        name: String,
        expected: &'static str,
    },
    #[error("invalid layer configuration: {0}")]
    Layers(String),
    #[error("layer index {index} out of range ({count} layers configured)")]
    UnknownLayer { index: usize, count: usize },
    #[error("render target {0} has not been drawn yet")]
    MissingTarget(String),
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("readback failed: {0}")]
    Readback(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
