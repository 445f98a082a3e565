use crate::buffer::VertexBuffer;
use crate::geometry::{LineVertex, SEGMENT_VERTICES, VERTEX_FLOATS};
use crate::types::{Polyline, Sprite, SpriteMap};

/// Floats reserved per polyline point when sizing the buffer.
///
/// Every point may carry one full segment record plus the two cap vertices
/// at the ends of the strip.
const FLOATS_PER_POINT: usize = SEGMENT_VERTICES * VERTEX_FLOATS;

/// Upper bound on the floats needed to pack `sprites`.
///
/// Every sprite is counted, visible or not, so the buffer settles at the
/// scene's peak instead of oscillating as sprites toggle.
pub fn required_floats(sprites: &SpriteMap) -> usize {
    sprites
        .values()
        .flat_map(|sprite| sprite.shapes.iter())
        .map(|shape| (2 + shape.len()) * FLOATS_PER_POINT)
        .sum()
}

/// Number of strip vertices one polyline expands to.
pub fn shape_vertex_count(shape: &Polyline) -> usize {
    if shape.len() < 2 {
        0
    } else {
        2 + SEGMENT_VERTICES * (shape.len() - 1)
    }
}

/// Flattens `sprites` into `buffer` as one triangle strip of thick segments.
///
/// Sprites are visited in key order. Each polyline opens with a duplicate of
/// its first vertex and closes with a duplicate of its last one; the
/// resulting degenerate triangles separate consecutive polylines, and the
/// two triangles spanning the end of one segment and the start of the next
/// bridge the joint. Returns the number of vertices written.
pub fn pack_sprites(sprites: &SpriteMap, buffer: &mut VertexBuffer) -> u32 {
    buffer.reset(required_floats(sprites));

    let mut vertex_count = 0u32;
    for sprite in sprites.values().filter(|sprite| sprite.visible) {
        for shape in &sprite.shapes {
            vertex_count += pack_shape(sprite, shape, buffer);
        }
    }
    vertex_count
}

fn pack_shape(sprite: &Sprite, shape: &Polyline, buffer: &mut VertexBuffer) -> u32 {
    let count = shape_vertex_count(shape);
    if count == 0 {
        return 0;
    }

    let mut emit = |segment_end: usize, side: f32| {
        let vertex = LineVertex {
            side,
            from: shape[segment_end - 1],
            to: shape[segment_end],
            position: sprite.position,
            scale: sprite.scale,
            rotation: sprite.rotation,
            color: sprite.color,
        };
        buffer.push(&vertex.to_floats());
    };

    emit(1, 0.0);
    for segment_end in 1..shape.len() {
        for side in 0..SEGMENT_VERTICES {
            emit(segment_end, side as f32);
        }
    }
    emit(shape.len() - 1, 3.0);
    count as u32
}
