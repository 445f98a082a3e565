//! Line vertex layout and the segment-to-quad expansion.
//!
//! The expansion here is the CPU twin of the `lineDraw` vertex shader in
//! [`crate::shaders`]; the software executor rasterises with it and the GPU
//! path runs the GLSL version. Keep both in step.

use crate::types::{LayerParams, Point, Viewport};

/// Floats per packed line vertex.
pub const VERTEX_FLOATS: usize = 13;

/// Vertices emitted per segment record (one quad in the strip).
pub const SEGMENT_VERTICES: usize = 4;

/// `uLineWidth` is expressed in thousandths of the shorter viewport side.
pub const LINE_WIDTH_UNIT: f32 = 0.001;

/// One packed vertex, in the order it is laid out in the vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineVertex {
    /// 0 and 1 sit on the `from` end, 2 and 3 on the `to` end; even sides
    /// are pushed along the positive normal.
    pub side: f32,
    pub from: Point,
    pub to: Point,
    pub position: Point,
    pub scale: f32,
    pub rotation: f32,
    pub color: [f32; 4],
}

impl LineVertex {
    pub fn to_floats(&self) -> [f32; VERTEX_FLOATS] {
        [
            self.side,
            self.from[0],
            self.from[1],
            self.to[0],
            self.to[1],
            self.position[0],
            self.position[1],
            self.scale,
            self.rotation,
            self.color[0],
            self.color[1],
            self.color[2],
            self.color[3],
        ]
    }

    pub fn from_floats(values: &[f32]) -> Self {
        Self {
            side: values[0],
            from: [values[1], values[2]],
            to: [values[3], values[4]],
            position: [values[5], values[6]],
            scale: values[7],
            rotation: values[8],
            color: [values[9], values[10], values[11], values[12]],
        }
    }
}

/// Camera uniforms of the `lineDraw` program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineCamera {
    pub viewport: [f32; 2],
    pub origin: [f32; 2],
    pub zoom: f32,
    pub rotation: f32,
    pub line_width: f32,
    pub jitter: f32,
    pub jitter_seed: f32,
}

impl LineCamera {
    pub fn new(params: &LayerParams, viewport: Viewport, jitter_seed: f32) -> Self {
        Self {
            viewport: viewport.as_uniform(),
            origin: [params.camera_x, params.camera_y],
            zoom: params.zoom,
            rotation: params.rotation,
            line_width: LINE_WIDTH_UNIT * params.line_width,
            jitter: params.jitter,
            jitter_seed,
        }
    }
}

fn rotate(p: Point, angle: f32) -> Point {
    let (s, c) = angle.sin_cos();
    [c * p[0] - s * p[1], s * p[0] + c * p[1]]
}

fn hash(p: Point) -> f32 {
    let v = (p[0] * 12.9898 + p[1] * 78.233).sin() * 43758.547;
    v - v.floor()
}

/// Expands one strip vertex into clip space (`[-1, 1]`, y up).
///
/// World and view units are pixels with the origin at the viewport centre.
pub fn expand_vertex(vertex: &LineVertex, camera: &LineCamera) -> Point {
    let to_world = |p: Point| {
        let local = rotate([p[0] * vertex.scale, p[1] * vertex.scale], vertex.rotation);
        [local[0] + vertex.position[0], local[1] + vertex.position[1]]
    };
    let to_view = |p: Point| {
        let offset = rotate(
            [p[0] - camera.origin[0], p[1] - camera.origin[1]],
            -camera.rotation,
        );
        [offset[0] * camera.zoom, offset[1] * camera.zoom]
    };

    let world_from = to_world(vertex.from);
    let world_to = to_world(vertex.to);
    let view_from = to_view(world_from);
    let view_to = to_view(world_to);

    let delta = [view_to[0] - view_from[0], view_to[1] - view_from[1]];
    let length = (delta[0] * delta[0] + delta[1] * delta[1]).sqrt();
    let dir = if length > 1e-6 {
        [delta[0] / length, delta[1] / length]
    } else {
        [1.0, 0.0]
    };
    let normal = [-dir[1], dir[0]];

    let side = vertex.side.round() as i32;
    let (anchor, world_anchor) = if side < 2 {
        (view_from, world_from)
    } else {
        (view_to, world_to)
    };
    let sign = if side % 2 == 0 { 1.0 } else { -1.0 };
    let half_width = 0.5 * camera.line_width * camera.viewport[0].min(camera.viewport[1]);

    let jitter = [
        camera.jitter * (hash([world_anchor[0] + camera.jitter_seed, world_anchor[1]]) * 2.0 - 1.0),
        camera.jitter * (hash([world_anchor[1], world_anchor[0] + camera.jitter_seed]) * 2.0 - 1.0),
    ];

    let pixel = [
        anchor[0] + normal[0] * half_width * sign + jitter[0],
        anchor[1] + normal[1] * half_width * sign + jitter[1],
    ];
    [
        pixel[0] / (camera.viewport[0] * 0.5),
        pixel[1] / (camera.viewport[1] * 0.5),
    ]
}

/// Maps clip space to pixel coordinates (origin top-left, y down).
pub fn clip_to_pixel(clip: Point, viewport: Viewport) -> Point {
    [
        (clip[0] * 0.5 + 0.5) * viewport.width as f32,
        (0.5 - clip[1] * 0.5) * viewport.height as f32,
    ]
}
