//! GLSL ES 1.00 sources for the point and extrusion programs
//!
//! Per-style data lives in uniform arrays sized to the style count, so sources are generated
//! per style list.

/// Uniforms of the point program
pub const POINT_UNIFORMS: &[&str] = &["u_matrix", "u_scale", "u_sprite", "u_texture"];

/// Uniforms of the extrusion program
pub const EXTRUDE_UNIFORMS: &[&str] = &[
    "u_matrix",
    "u_fill_styles",
    "u_lightcolor",
    "u_lightpos",
    "u_ambientlight",
    "u_lightintensity",
];

const POINT_VERTEX: &str = r#"
attribute vec2 a_pos;
attribute float a_sprite_idx;

uniform mat4 u_matrix;
// Current zoom scale divided by the target zoom scale
uniform float u_scale;
// Two vec4 per style: texture rect, then (width, height, dx, dy)
uniform vec4 u_sprite[STYLE_COUNT * 2];

varying vec4 v_tex_rect;
varying vec2 v_extent;

void main() {
    int idx = int(a_sprite_idx) * 2;
    vec4 rect = u_sprite[idx];
    vec4 meta = u_sprite[idx + 1];
    float side = max(meta.x, meta.y);

    gl_Position = u_matrix * vec4(a_pos + meta.zw * u_scale, 0.0, 1.0);
    gl_PointSize = side;
    v_tex_rect = rect;
    v_extent = side > 0.0 ? meta.xy / side : vec2(0.0);
}
"#;

const POINT_FRAGMENT: &str = r#"
precision mediump float;

uniform sampler2D u_texture;

varying vec4 v_tex_rect;
varying vec2 v_extent;

void main() {
    vec2 uv = (gl_PointCoord - 0.5) / max(v_extent, vec2(1e-6)) + 0.5;
    if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0) {
        discard;
    }
    gl_FragColor = texture2D(u_texture, mix(v_tex_rect.xy, v_tex_rect.zw, uv));
}
"#;

const EXTRUDE_VERTEX: &str = r#"
attribute vec3 a_pos;
attribute vec3 a_normal;
attribute float a_fill_style;

uniform mat4 u_matrix;
uniform vec4 u_fill_styles[STYLE_COUNT];
uniform vec3 u_lightcolor;
uniform vec3 u_lightpos;
uniform vec3 u_ambientlight;
uniform float u_lightintensity;

varying vec4 v_color;

void main() {
    gl_Position = u_matrix * vec4(a_pos, 1.0);

    vec4 fill = u_fill_styles[int(a_fill_style)];
    float directional = clamp(dot(a_normal, u_lightpos), 0.0, 1.0);
    float shade = (1.0 - u_lightintensity) + u_lightintensity * directional;
    vec3 light = clamp(u_ambientlight + u_lightcolor * shade, 0.0, 1.0);
    v_color = vec4(fill.rgb * light, fill.a);
}
"#;

const EXTRUDE_FRAGMENT: &str = r#"
precision mediump float;

varying vec4 v_color;

void main() {
    gl_FragColor = v_color;
}
"#;

fn with_style_count(source: &str, style_count: usize) -> String {
    format!("#define STYLE_COUNT {}\n{}", style_count.max(1), source)
}

/// Vertex and fragment source of the point program
pub fn point_program(style_count: usize) -> (String, String) {
    (
        with_style_count(POINT_VERTEX, style_count),
        POINT_FRAGMENT.to_string(),
    )
}

/// Vertex and fragment source of the extrusion program
pub fn extrude_program(style_count: usize) -> (String, String) {
    (
        with_style_count(EXTRUDE_VERTEX, style_count),
        EXTRUDE_FRAGMENT.to_string(),
    )
}
