//! wgpu backend.
//!
//! - `context` owns the instance, device and optional window surface.
//! - `programs` compiles the generated GLSL into render pipelines, one per
//!   target format, inside validation error scopes.
//! - `targets` allocates the `Rgba8Unorm` render targets and reallocates
//!   them only when the viewport changes.
//! - `executor` records a whole frame plan into one command encoder.

mod context;
mod executor;
mod programs;
mod targets;

pub use context::{GpuContext, OFFSCREEN_FORMAT};
pub use executor::GpuExecutor;
