//! GLSL sources for the six programs.
//!
//! Uniform blocks and texture bindings are generated from each
//! [`ProgramLayout`], so the declarations always match the std140 offsets
//! written by [`crate::program::ProgramState`]. Every program reads its block
//! through the instance name `params`; texture input `name` is read with the
//! generated helper `sample_name(uv)`.

use std::fmt::Write as _;

use crate::program::{ProgramId, ProgramLayout, BLUR_LEVELS};

/// Vertex stage of every full-screen filter pass.
///
/// Clip space `y = 1` is the top row of the target, which is texture row 0.
pub const QUAD_VERTEX: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = vec2(a_position.x * 0.5 + 0.5, 0.5 - a_position.y * 0.5);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

const LINE_VERTEX_BODY: &str = r"
layout(location = 0) in float a_side;
layout(location = 1) in vec2 a_from;
layout(location = 2) in vec2 a_to;
layout(location = 3) in vec2 a_position;
layout(location = 4) in float a_scale;
layout(location = 5) in float a_rotation;
layout(location = 6) in vec4 a_color;

layout(location = 0) out vec4 v_color;

vec2 rotate2(vec2 p, float angle) {
    float s = sin(angle);
    float c = cos(angle);
    return vec2(c * p.x - s * p.y, s * p.x + c * p.y);
}

float hash(vec2 p) {
    return fract(sin(dot(p, vec2(12.9898, 78.233))) * 43758.547);
}

vec2 toWorld(vec2 p) {
    return rotate2(p * a_scale, a_rotation) + a_position;
}

vec2 toView(vec2 p) {
    return rotate2(p - params.uCameraOrigin, -params.uCameraRotation) * params.uCameraZoom;
}

void main() {
    vec2 worldFrom = toWorld(a_from);
    vec2 worldTo = toWorld(a_to);
    vec2 viewFrom = toView(worldFrom);
    vec2 viewTo = toView(worldTo);

    vec2 delta = viewTo - viewFrom;
    float len = length(delta);
    vec2 dir = len > 1e-6 ? delta / len : vec2(1.0, 0.0);
    vec2 normal = vec2(-dir.y, dir.x);

    int side = int(a_side + 0.5);
    bool atFrom = side < 2;
    vec2 anchor = atFrom ? viewFrom : viewTo;
    vec2 worldAnchor = atFrom ? worldFrom : worldTo;
    float flip = (side % 2 == 0) ? 1.0 : -1.0;
    float halfWidth = 0.5 * params.uLineWidth * min(params.uViewportSize.x, params.uViewportSize.y);

    vec2 jitter = params.uJitter * vec2(
        hash(vec2(worldAnchor.x + params.uJitterSeed, worldAnchor.y)) * 2.0 - 1.0,
        hash(vec2(worldAnchor.y, worldAnchor.x + params.uJitterSeed)) * 2.0 - 1.0);

    vec2 pixel = anchor + normal * halfWidth * flip + jitter;
    gl_Position = vec4(pixel / (params.uViewportSize * 0.5), 0.0, 1.0);
    v_color = a_color;
}
";

const LINE_FRAGMENT_BODY: &str = r"
layout(location = 0) in vec4 v_color;
layout(location = 0) out vec4 out_color;

void main() {
    out_color = v_color;
}
";

const BLUR_BODY: &str = r"
void main() {
    vec2 texel = 1.0 / params.uViewportSize;
    int radius = int(params.kernelRadius);
    float sigma = max(params.sigma, 0.0001);
    float twoSigmaSq = 2.0 * sigma * sigma;

    vec4 sum = vec4(0.0);
    float weightSum = 0.0;
    for (int i = -radius; i <= radius; i++) {
        float x = float(i);
        float weight = exp(-(x * x) / twoSigmaSq);
        sum += sample_texture(v_uv + params.direction * texel * x) * weight;
        weightSum += weight;
    }
    out_color = sum / weightSum;
}
";

const COPY_BODY: &str = r"
void main() {
    out_color = sample_texture(v_uv) * params.opacity;
}
";

const COMBINE_BODY: &str = r"
void main() {
    out_color = sample_srcData(v_uv) + sample_blurData(v_uv);
}
";

fn uniform_block(layout: &ProgramLayout) -> String {
    let mut block = String::from("layout(std140, set = 0, binding = 0) uniform Params {\n");
    for field in &layout.uniforms {
        let _ = writeln!(block, "    {}", field.kind.glsl_member(field.name));
    }
    block.push_str("} params;\n");
    block
}

fn texture_bindings(layout: &ProgramLayout) -> String {
    let mut out = String::new();
    for (slot, name) in layout.textures.iter().enumerate() {
        let binding = slot * 2;
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {binding}) uniform texture2D t_{name};\n\
             layout(set = 1, binding = {}) uniform sampler s_{name};\n\
             vec4 sample_{name}(vec2 uv) {{ return texture(sampler2D(t_{name}, s_{name}), uv); }}",
            binding + 1
        );
    }
    out
}

fn filter_prelude(layout: &ProgramLayout) -> String {
    format!(
        "#version 450\nlayout(location = 0) in vec2 v_uv;\nlayout(location = 0) out vec4 out_color;\n\n{}\n{}",
        uniform_block(layout),
        texture_bindings(layout)
    )
}

fn composite_body() -> String {
    let mut body = String::from("\nvoid main() {\n    vec4 sum = vec4(0.0);\n");
    for level in 0..BLUR_LEVELS {
        let _ = writeln!(
            body,
            "    sum += params.bloomFactors[{level}] * vec4(params.bloomTintColors[{level}], 1.0) * sample_blurLevel{level}(v_uv);"
        );
    }
    body.push_str("    out_color = params.bloomStrength * sum;\n}\n");
    body
}

fn merge_body(layout: &ProgramLayout) -> String {
    let mut body = String::from("\nvoid main() {\n    vec4 sum = vec4(0.0);\n");
    for name in &layout.textures {
        let _ = writeln!(body, "    sum += sample_{name}(v_uv);");
    }
    body.push_str("    out_color = sum;\n}\n");
    body
}

/// Vertex stage source for `layout.program`.
pub fn vertex_source(layout: &ProgramLayout) -> String {
    match layout.program {
        ProgramId::LineDraw => format!("#version 450\n{}{LINE_VERTEX_BODY}", uniform_block(layout)),
        _ => QUAD_VERTEX.to_owned(),
    }
}

/// Fragment stage source for `layout.program`.
pub fn fragment_source(layout: &ProgramLayout) -> String {
    match layout.program {
        ProgramId::LineDraw => format!("#version 450\n{LINE_FRAGMENT_BODY}"),
        ProgramId::SeparableBlur => format!("{}{BLUR_BODY}", filter_prelude(layout)),
        ProgramId::Copy => format!("{}{COPY_BODY}", filter_prelude(layout)),
        ProgramId::Combine => format!("{}{COMBINE_BODY}", filter_prelude(layout)),
        ProgramId::Composite => format!("{}{}", filter_prelude(layout), composite_body()),
        ProgramId::MergeLayers => format!("{}{}", filter_prelude(layout), merge_body(layout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_members_follow_layout_order() {
        let layout = ProgramId::Copy.layout(1);
        let source = fragment_source(&layout);
        let viewport = source.find("vec2 uViewportSize;").unwrap();
        let opacity = source.find("float opacity;").unwrap();
        assert!(viewport < opacity);
        assert!(source.contains("} params;"));
        assert!(source.contains("uniform texture2D t_texture;"));
        assert!(source.contains("uniform sampler s_texture;"));
    }

    #[test]
    fn merge_shader_samples_every_layer() {
        let layout = ProgramId::MergeLayers.layout(5);
        let source = fragment_source(&layout);
        for layer in 0..5 {
            assert!(source.contains(&format!("sum += sample_layer{layer}(v_uv);")));
        }
        assert!(source.contains("layout(set = 1, binding = 9) uniform sampler s_layer4;"));
        assert!(!source.contains("layer5"));
    }

    #[test]
    fn composite_weights_every_blur_level() {
        let source = fragment_source(&ProgramId::Composite.layout(1));
        assert!(source.contains("float bloomFactors[5];"));
        assert!(source.contains("vec3 bloomTintColors[5];"));
        assert!(source.contains("sample_blurLevel4(v_uv)"));
        assert!(source.contains("params.bloomStrength * sum"));
    }

    #[test]
    fn line_program_declares_block_only_in_vertex_stage() {
        let layout = ProgramId::LineDraw.layout(1);
        assert!(vertex_source(&layout).contains("float uJitterSeed;"));
        assert!(!fragment_source(&layout).contains("Params"));
        assert_eq!(vertex_source(&ProgramId::Copy.layout(1)), QUAD_VERTEX);
    }
}
