use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Upper bound on configured layers; the merge shader samples one texture per layer.
pub const MAX_LAYERS: usize = 8;

/// A 2D point in sprite-local or world units.
pub type Point = [f32; 2];

/// Ordered sequence of points joined by straight segments.
pub type Polyline = Vec<Point>;

/// Sprites of one layer keyed by name.
///
/// `BTreeMap` iteration is sorted by key, which is the packing order.
pub type SpriteMap = BTreeMap<String, Sprite>;

/// A placeable, coloured collection of polylines drawn within one layer.
///
/// Deserialised sprites that omit `visible` or `shapes` are treated as
/// invisible with no geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub shapes: Vec<Polyline>,
    #[serde(default)]
    pub position: Point,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_color")]
    pub color: [f32; 4],
}

fn default_scale() -> f32 {
    1.0
}

fn default_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

impl Sprite {
    /// Creates a visible, untransformed white sprite from the given shapes.
    pub fn new(shapes: Vec<Polyline>) -> Self {
        Self {
            visible: true,
            shapes,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Total number of points across every shape.
    pub fn point_count(&self) -> usize {
        self.shapes.iter().map(Vec::len).sum()
    }
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            visible: false,
            shapes: Vec::new(),
            position: [0.0, 0.0],
            scale: default_scale(),
            rotation: 0.0,
            color: default_color(),
        }
    }
}

/// Per-layer draw parameters.
///
/// Every field is independently defaulted so partial TOML tables work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerParams {
    /// Camera zoom factor applied after the camera offset.
    pub zoom: f32,
    /// Camera rotation in radians.
    pub rotation: f32,
    /// Camera offset in world units.
    pub camera_x: f32,
    pub camera_y: f32,
    /// Stroke width; one unit is a thousandth of the shorter viewport side.
    pub line_width: f32,
    /// Scales the composited bloom before the clean lines are added back.
    pub bloom_strength: f32,
    /// Scales the Gaussian sigma of every blur level (0.5 keeps sigma equal to the kernel radius).
    pub bloom_radius: f32,
    /// Per-vertex positional noise amplitude in pixels.
    pub jitter: f32,
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            rotation: 0.0,
            camera_x: 0.0,
            camera_y: 0.0,
            line_width: 1.0,
            bloom_strength: 1.0,
            bloom_radius: 0.5,
            jitter: 0.0,
        }
    }
}

/// Global per-frame draw parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameParams {
    /// Opacity applied to the stored previous frame; 0 disables trails.
    pub after_glow: f32,
    /// Seed of the per-vertex jitter hash. Lines only shimmer when the
    /// caller changes it between frames.
    #[serde(default)]
    pub jitter_seed: f32,
}

impl FrameParams {
    /// Same parameters with the jitter seed derived from a frame number.
    /// The seed wraps so the shader hash keeps its precision.
    pub fn for_frame(self, frame: u64) -> Self {
        Self {
            jitter_seed: (frame % 1024) as f32 * 0.618_034,
            ..self
        }
    }
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            after_glow: 0.1,
            jitter_seed: 0.0,
        }
    }
}

/// Size of the drawable area in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Builds a viewport, clamping each side to at least one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// `uViewportSize` uniform value.
    pub fn as_uniform(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
