//! Multi-pass line renderer with bloom and afterglow trails.
//!
//! Every frame flows through the same graph:
//!
//! ```text
//! sprites ─► packer ─► vertex buffer ─► lineDraw ─► clean[i]
//!                                                     │
//!      5 × (blur H ─► blur V ─► copy) ─► composite ─► combine ─► glow[i]
//!                                                                  │
//!                          mergeLayers(glow[0..n]) ─► frameClean ◄─┘
//!                                                       │
//!        combine(frameClean, lastFrame) ─► frameWithLastFrame
//!                                            ├─► copy(1.0) ─► screen
//!                                            └─► copy(after_glow) ─► lastFrame
//! ```
//!
//! [`LinePipeline`] drives one [`PassExecutor`]: [`GpuExecutor`] on wgpu,
//! or [`SoftwareExecutor`] on the CPU.

pub mod buffer;
pub mod error;
pub mod executor;
pub mod geometry;
pub mod gpu;
pub mod graph;
pub mod packer;
pub mod pipeline;
pub mod program;
pub mod shaders;
pub mod software;
pub mod types;

pub use buffer::VertexBuffer;
pub use error::{PipelineError, PipelineResult};
pub use executor::{PassExecutor, TargetImage, ViewportSource};
pub use gpu::{GpuContext, GpuExecutor};
pub use graph::{FramePlan, Target};
pub use packer::pack_sprites;
pub use pipeline::{FrameStats, LinePipeline};
pub use software::SoftwareExecutor;
pub use types::{FrameParams, LayerParams, Point, Polyline, Sprite, SpriteMap, Viewport, MAX_LAYERS};
pub use wgpu::SurfaceError;
