// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Triangle setup and traversal.
//!
//! Setup works on 2D homogeneous coordinates: the edge equations are the
//! rows of the adjoint of the matrix built from the clip-space `(x, y, w)`
//! of the three vertices, so triangles crossing w = 0 need no clipping.
//! Traversal walks scan tiles in row order and splits them into quadrants
//! down to 2x2 stamps, dropping a tile as soon as its most favourable corner
//! is outside one of the edges.

use cg1_common::settings::RasterConfig;
use cg1_common::{Vec4, COLOR_ATTRIBUTE, MAX_FRAGMENT_ATTRIBUTES, MAX_MSAA_SAMPLES, POSITION_ATTRIBUTE, STAMP_FRAGMENTS};

use crate::fixed_point::snap_to_subpixel;
use crate::state::{CullingMode, FaceMode, GpuState};

/// Shaded vertex outputs or interpolated fragment inputs.
pub type Attributes = [Vec4; MAX_FRAGMENT_ATTRIBUTES];

pub const SECONDARY_COLOR_ATTRIBUTE: usize = 2;
/// Colors used for back-facing triangles under two-sided lighting.
pub const BACK_COLOR_ATTRIBUTE: usize = 3;
pub const BACK_SECONDARY_COLOR_ATTRIBUTE: usize = 4;

const STAMP_WIDTH: i32 = 2;
const STAMP_HEIGHT: i32 = 2;

/// Largest window coordinate the subpixel snap can represent.
const SNAP_LIMIT: f64 = 32768.0;

// ── MSAA sample patterns, in 1/128 pixel ────────────────────────────────────

const MSAA_PATTERN_2: [(u8, u8); 2] = [(8, 120), (120, 8)];
const MSAA_PATTERN_4: [(u8, u8); 4] = [(12, 44), (44, 108), (76, 12), (108, 76)];
const MSAA_PATTERN_6: [(u8, u8); 6] = [(12, 12), (32, 52), (52, 96), (76, 32), (96, 116), (116, 76)];
const MSAA_PATTERN_8: [(u8, u8); 8] = [
    (8, 56),
    (24, 104),
    (40, 24),
    (56, 88),
    (72, 40),
    (88, 120),
    (104, 72),
    (120, 8),
];

/// Sample positions for a multisampling mode.
pub fn sample_pattern(samples: u32) -> Option<&'static [(u8, u8)]> {
    match samples {
        2 => Some(&MSAA_PATTERN_2),
        4 => Some(&MSAA_PATTERN_4),
        6 => Some(&MSAA_PATTERN_6),
        8 => Some(&MSAA_PATTERN_8),
        _ => None,
    }
}

// ── Equations and boxes ─────────────────────────────────────────────────────

/// `a·x + b·y + c` over window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EdgeEquation {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl EdgeEquation {
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }

    fn negate(&mut self) {
        self.a = -self.a;
        self.b = -self.b;
        self.c = -self.c;
    }

    fn scale(&self, k: f64) -> Self {
        Self {
            a: self.a * k,
            b: self.b * k,
            c: self.c * k,
        }
    }

    /// Re-express an equation over normalized device coordinates in window
    /// coordinates for the viewport `(x0, y0, width, height)`.
    fn to_window(&self, x0: f64, y0: f64, width: f64, height: f64) -> Self {
        Self {
            a: 2.0 * self.a / width,
            b: 2.0 * self.b / height,
            c: self.c - self.a * (2.0 * x0 / width + 1.0) - self.b * (2.0 * y0 / height + 1.0),
        }
    }

    /// Largest value over the rectangle `[x0, x1] x [y0, y1]`.
    fn max_over(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
        let x = if self.a > 0.0 { x1 } else { x0 };
        let y = if self.b > 0.0 { y1 } else { y0 };
        self.evaluate(x, y)
    }

    /// Inside test. A point exactly on the edge belongs to it only when the
    /// edge faces right (or up, for horizontal edges), so shared edges are
    /// rasterized once.
    fn covers(&self, value: f64) -> bool {
        value > 0.0 || (value == 0.0 && (self.a > 0.0 || (self.a == 0.0 && self.b > 0.0)))
    }
}

/// Half-open pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl PixelBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x.saturating_add(width as i32),
            y1: y.saturating_add(height as i32),
        }
    }

    pub fn intersect(&self, other: &PixelBox) -> PixelBox {
        PixelBox {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    fn overlaps(&self, tile: &Tile) -> bool {
        tile.x < self.x1 && tile.x + tile.width > self.x0 && tile.y < self.y1 && tile.y + tile.height > self.y0
    }
}

// ── Setup triangle ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SetupTriangle {
    pub vertices: [Attributes; 3],
    edges: [EdgeEquation; 3],
    /// Normalized device z over window coordinates.
    z: EdgeEquation,
    /// Determinant of the vertex matrix, sign-adjusted with the edges.
    det: f64,
    signed_area: f64,
    front_facing: bool,
    inverted: bool,
    /// Pixels the traversal may produce.
    bounds: PixelBox,
    depth_offset: f64,
}

impl SetupTriangle {
    /// Window-space area in pixels with y pointing down.
    pub fn signed_area(&self) -> f64 {
        self.signed_area
    }

    pub fn front_facing(&self) -> bool {
        self.front_facing
    }

    /// Whether the edge equations were flipped to cover this triangle.
    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn bounds(&self) -> PixelBox {
        self.bounds
    }

    pub fn edges(&self) -> &[EdgeEquation; 3] {
        &self.edges
    }

    pub fn edge_values(&self, x: f64, y: f64) -> [f64; 3] {
        [
            self.edges[0].evaluate(x, y),
            self.edges[1].evaluate(x, y),
            self.edges[2].evaluate(x, y),
        ]
    }

    fn covers(&self, values: &[f64; 3]) -> bool {
        self.edges.iter().zip(values).all(|(e, &v)| e.covers(v))
    }

    fn invert_facing(&mut self) {
        self.edges.iter_mut().for_each(EdgeEquation::negate);
        self.det = -self.det;
        self.inverted = !self.inverted;
    }
}

// ── Stamps ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub x: i32,
    pub y: i32,
    pub inside: bool,
    /// Normalized device z at the pixel center.
    pub z_ndc: f64,
    /// Window depth after range mapping and polygon offset, unclamped.
    pub depth: f64,
    pub z: u32,
    /// Per-sample coverage; only the first entry is used without MSAA.
    pub coverage: [bool; MAX_MSAA_SAMPLES],
    pub sample_z: [u32; MAX_MSAA_SAMPLES],
    /// Edge equation values at the pixel center.
    pub edges: [f64; 3],
}

/// 2x2 fragments in lane order: (x, y), (x+1, y), (x, y+1), (x+1, y+1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamp {
    pub x: i32,
    pub y: i32,
    pub fragments: [Fragment; STAMP_FRAGMENTS],
}

impl Stamp {
    pub fn any_inside(&self) -> bool {
        self.fragments.iter().any(|f| f.inside)
    }
}

#[derive(Debug, Clone, Copy)]
struct Tile {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

// ── Rasterizer ──────────────────────────────────────────────────────────────

/// Register state the rasterizer depends on, latched by `configure`.
#[derive(Debug, Clone)]
struct RasterState {
    viewport: (f64, f64, f64, f64),
    clip_box: PixelBox,
    face_mode: FaceMode,
    culling: CullingMode,
    d3d9_pixel_coordinates: bool,
    d3d9_depth_range: bool,
    /// Pixel centers at integer coordinates instead of half-integers.
    d3d9_rasterization_rules: bool,
    two_sided_lighting: bool,
    depth_near: f64,
    depth_far: f64,
    depth_slope_factor: f64,
    depth_unit_offset: f64,
    z_bits: u32,
    msaa_samples: u32,
    interpolation: [bool; MAX_FRAGMENT_ATTRIBUTES],
}

impl RasterState {
    fn from_state(state: &GpuState) -> Self {
        let window = PixelBox::new(0, 0, state.display_x_res, state.display_y_res);
        let viewport = PixelBox::new(
            state.viewport_ini_x,
            state.viewport_ini_y,
            state.viewport_width,
            state.viewport_height,
        );
        let mut clip_box = window.intersect(&viewport);
        if state.scissor_test {
            let scissor = PixelBox::new(
                state.scissor_ini_x,
                state.scissor_ini_y,
                state.scissor_width,
                state.scissor_height,
            );
            clip_box = clip_box.intersect(&scissor);
        }
        Self {
            viewport: (
                state.viewport_ini_x as f64,
                state.viewport_ini_y as f64,
                state.viewport_width as f64,
                state.viewport_height as f64,
            ),
            clip_box,
            face_mode: state.face_mode,
            culling: state.culling,
            d3d9_pixel_coordinates: state.d3d9_pixel_coordinates,
            d3d9_depth_range: state.d3d9_depth_range,
            d3d9_rasterization_rules: state.d3d9_rasterization_rules,
            two_sided_lighting: state.two_sided_lighting,
            depth_near: state.depth_range_near as f64,
            depth_far: state.depth_range_far as f64,
            depth_slope_factor: state.depth_slope_factor as f64,
            depth_unit_offset: state.depth_unit_offset as f64,
            z_bits: state.z_buffer_bit_precission,
            msaa_samples: if state.multisampling { state.msaa_samples } else { 0 },
            interpolation: state.interpolation,
        }
    }
}

/// Homogeneous triangle setup and recursive stamp traversal.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    scan_tile_width: i32,
    scan_tile_height: i32,
    subpixel_bits: u32,
    bounding_box_opt: bool,
    state: RasterState,
}

impl Rasterizer {
    pub fn new(config: &RasterConfig) -> Self {
        if config.stamp_width != STAMP_WIDTH as u32 || config.stamp_height != STAMP_HEIGHT as u32 {
            log::warn!(
                "Rasterizer: {}x{} stamps not supported, using 2x2",
                config.stamp_width,
                config.stamp_height
            );
        }
        let tile_dim = |v: u32, min: i32| (v.max(min as u32).next_power_of_two()) as i32;
        Self {
            scan_tile_width: tile_dim(config.scan_tile_width, STAMP_WIDTH),
            scan_tile_height: tile_dim(config.scan_tile_height, STAMP_HEIGHT),
            subpixel_bits: config.subpixel_bits,
            bounding_box_opt: config.bounding_box_opt,
            state: RasterState::from_state(&GpuState::new()),
        }
    }

    /// Latch the rasterization registers for the next batch.
    pub fn configure(&mut self, state: &GpuState) {
        self.state = RasterState::from_state(state);
        log::trace!(
            "Rasterizer: viewport {:?} clip {:?} cull {:?} face {:?} msaa {}",
            self.state.viewport,
            self.state.clip_box,
            self.state.culling,
            self.state.face_mode,
            self.state.msaa_samples
        );
    }

    pub fn clip_box(&self) -> PixelBox {
        self.state.clip_box
    }

    fn pixel_center(&self) -> f64 {
        if self.state.d3d9_rasterization_rules {
            0.0
        } else {
            0.5
        }
    }

    /// Snap a clip-space position so its window projection sits on the
    /// subpixel grid.
    fn snap(&self, pos: &mut [f64; 4]) {
        let (x0, y0, width, height) = self.state.viewport;
        let w = pos[3];
        if w <= 0.0 || width <= 0.0 || height <= 0.0 {
            return;
        }
        let wx = x0 + (pos[0] / w + 1.0) * width / 2.0;
        let wy = y0 + (pos[1] / w + 1.0) * height / 2.0;
        if wx.abs() >= SNAP_LIMIT || wy.abs() >= SNAP_LIMIT {
            return;
        }
        let sx = snap_to_subpixel(wx as f32, self.subpixel_bits) as f64;
        let sy = snap_to_subpixel(wy as f32, self.subpixel_bits) as f64;
        pos[0] = ((sx - x0) * 2.0 / width - 1.0) * w;
        pos[1] = ((sy - y0) * 2.0 / height - 1.0) * w;
    }

    /// Build edge and depth equations for three shaded vertices.
    pub fn setup(&self, vertices: [Attributes; 3]) -> SetupTriangle {
        let s = &self.state;
        let mut pos = [[0.0f64; 4]; 3];
        for (p, v) in pos.iter_mut().zip(vertices.iter()) {
            let [x, y, z, w] = v[POSITION_ATTRIBUTE];
            let y = if s.d3d9_pixel_coordinates { -y } else { y };
            *p = [x as f64, y as f64, z as f64, w as f64];
            self.snap(p);
        }

        let [x0, y0, z0, w0] = pos[0];
        let [x1, y1, z1, w1] = pos[1];
        let [x2, y2, z2, w2] = pos[2];
        let ndc_edges = [
            EdgeEquation {
                a: y1 * w2 - y2 * w1,
                b: x2 * w1 - x1 * w2,
                c: x1 * y2 - x2 * y1,
            },
            EdgeEquation {
                a: y2 * w0 - y0 * w2,
                b: x0 * w2 - x2 * w0,
                c: x2 * y0 - x0 * y2,
            },
            EdgeEquation {
                a: y0 * w1 - y1 * w0,
                b: x1 * w0 - x0 * w1,
                c: x0 * y1 - x1 * y0,
            },
        ];
        let mut det = ndc_edges[0].c * w0 + ndc_edges[1].c * w1 + ndc_edges[2].c * w2;

        let (vx, vy, vw, vh) = s.viewport;
        let mut edges = ndc_edges.map(|e| e.to_window(vx, vy, vw, vh));

        let z = if det != 0.0 {
            let zs = [z0, z1, z2];
            let sum = ndc_edges.iter().zip(zs).fold(EdgeEquation::default(), |acc, (e, z)| EdgeEquation {
                a: acc.a + e.a * z,
                b: acc.b + e.b * z,
                c: acc.c + e.c * z,
            });
            sum.scale(1.0 / det).to_window(vx, vy, vw, vh)
        } else {
            EdgeEquation::default()
        };

        // Negated y flips the winding; restore it so positive det always
        // means negative window area.
        if s.d3d9_pixel_coordinates {
            edges.iter_mut().for_each(EdgeEquation::negate);
            det = -det;
        }

        let w_product = w0 * w1 * w2;
        let signed_area = if w_product != 0.0 {
            -det * vw * vh / (8.0 * w_product)
        } else {
            0.0
        };
        let front_facing = match s.face_mode {
            FaceMode::Ccw => det > 0.0,
            FaceMode::Cw => det < 0.0,
        };

        let depth_scale = self.depth_scale();
        let max_slope = (z.a * depth_scale).abs().max((z.b * depth_scale).abs());
        let depth_offset = s.depth_slope_factor * max_slope + s.depth_unit_offset / (1u64 << s.z_bits) as f64;

        SetupTriangle {
            vertices,
            edges,
            z,
            det,
            signed_area,
            front_facing,
            inverted: false,
            bounds: self.triangle_bounds(&pos),
            depth_offset,
        }
    }

    fn triangle_bounds(&self, pos: &[[f64; 4]; 3]) -> PixelBox {
        let clip = self.state.clip_box;
        if !self.bounding_box_opt || pos.iter().any(|p| p[3] <= 0.0) {
            return clip;
        }
        let (vx, vy, vw, vh) = self.state.viewport;
        let mut min = [f64::MAX; 2];
        let mut max = [f64::MIN; 2];
        for p in pos {
            let wx = vx + (p[0] / p[3] + 1.0) * vw / 2.0;
            let wy = vy + (p[1] / p[3] + 1.0) * vh / 2.0;
            min = [min[0].min(wx), min[1].min(wy)];
            max = [max[0].max(wx), max[1].max(wy)];
        }
        let to_i32 = |v: f64| v.clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        let bbox = PixelBox {
            x0: to_i32(min[0].floor() - 1.0),
            y0: to_i32(min[1].floor() - 1.0),
            x1: to_i32(max[0].floor() + 1.0),
            y1: to_i32(max[1].floor() + 1.0),
        };
        bbox.intersect(&clip)
    }

    /// Face and area culling. Returns true when the triangle is dropped.
    /// Kept triangles get their edges flipped when needed so inside points
    /// evaluate non-negative, and back faces take the back colors under
    /// two-sided lighting.
    pub fn cull(&self, triangle: &mut SetupTriangle) -> bool {
        if triangle.det == 0.0 || !triangle.det.is_finite() {
            log::trace!("Rasterizer: dropping zero area triangle");
            return true;
        }
        let front = triangle.front_facing;
        let drop = match self.state.culling {
            CullingMode::None => false,
            CullingMode::Front => front,
            CullingMode::Back => !front,
            CullingMode::FrontAndBack => true,
        };
        if drop {
            return true;
        }
        if triangle.det < 0.0 {
            triangle.invert_facing();
        }
        if self.state.two_sided_lighting && !front {
            for v in triangle.vertices.iter_mut() {
                v[COLOR_ATTRIBUTE] = v[BACK_COLOR_ATTRIBUTE];
                v[SECONDARY_COLOR_ATTRIBUTE] = v[BACK_SECONDARY_COLOR_ATTRIBUTE];
            }
        }
        false
    }

    /// Lazily walk the stamps of a culled and setup triangle.
    pub fn stamps<'a>(&'a self, triangle: &'a SetupTriangle) -> StampWalk<'a> {
        let bounds = triangle.bounds;
        let mut tiles = Vec::new();
        if !bounds.is_empty() {
            let (tw, th) = (self.scan_tile_width, self.scan_tile_height);
            let start_x = bounds.x0.div_euclid(tw) * tw;
            let start_y = bounds.y0.div_euclid(th) * th;
            let mut y = start_y;
            while y < bounds.y1 {
                let mut x = start_x;
                while x < bounds.x1 {
                    tiles.push(Tile {
                        x,
                        y,
                        width: tw,
                        height: th,
                    });
                    x += tw;
                }
                y += th;
            }
            tiles.reverse();
        }
        StampWalk {
            raster: self,
            triangle,
            tiles,
        }
    }

    fn depth_scale(&self) -> f64 {
        let s = &self.state;
        if s.d3d9_depth_range {
            s.depth_far - s.depth_near
        } else {
            (s.depth_far - s.depth_near) / 2.0
        }
    }

    /// Map normalized device z into the depth range.
    pub fn window_depth(&self, z_ndc: f64) -> f64 {
        let s = &self.state;
        if s.d3d9_depth_range {
            (s.depth_far - s.depth_near) * z_ndc + s.depth_near
        } else {
            (s.depth_far - s.depth_near) / 2.0 * z_ndc + (s.depth_near + s.depth_far) / 2.0
        }
    }

    /// Window depth to a depth buffer value of the configured precision.
    pub fn convert_z(&self, depth: f64) -> u32 {
        let max = ((1u64 << self.state.z_bits) - 1) as f64;
        (depth.clamp(0.0, 1.0) * max) as u32
    }

    /// Fragment lies in front of the near plane or behind the far plane.
    pub fn outside_depth_range(&self, fragment: &Fragment) -> bool {
        let near = if self.state.d3d9_depth_range { 0.0 } else { -1.0 };
        fragment.z_ndc < near || fragment.z_ndc > 1.0
    }

    fn tile_rejected(&self, triangle: &SetupTriangle, tile: &Tile) -> bool {
        let shift = self.pixel_center() - 0.5;
        let x0 = tile.x as f64 + shift;
        let y0 = tile.y as f64 + shift;
        let x1 = x0 + tile.width as f64;
        let y1 = y0 + tile.height as f64;
        triangle.edges.iter().any(|e| e.max_over(x0, y0, x1, y1) < 0.0)
    }

    fn fragment(&self, triangle: &SetupTriangle, x: i32, y: i32) -> Fragment {
        let center = self.pixel_center();
        let in_box = triangle.bounds.contains(x, y);
        let (cx, cy) = (x as f64 + center, y as f64 + center);
        let edges = triangle.edge_values(cx, cy);
        let z_ndc = triangle.z.evaluate(cx, cy);
        let depth = self.window_depth(z_ndc) + triangle.depth_offset;
        let z = self.convert_z(depth);

        let mut coverage = [false; MAX_MSAA_SAMPLES];
        let mut sample_z = [0u32; MAX_MSAA_SAMPLES];
        let inside = match sample_pattern(self.state.msaa_samples) {
            None => {
                coverage[0] = in_box && triangle.covers(&edges);
                sample_z[0] = z;
                coverage[0]
            }
            Some(pattern) => {
                let shift = center - 0.5;
                for (i, &(sx, sy)) in pattern.iter().enumerate() {
                    let px = x as f64 + sx as f64 / 128.0 + shift;
                    let py = y as f64 + sy as f64 / 128.0 + shift;
                    coverage[i] = in_box && triangle.covers(&triangle.edge_values(px, py));
                    let sample_depth = self.window_depth(triangle.z.evaluate(px, py)) + triangle.depth_offset;
                    sample_z[i] = self.convert_z(sample_depth);
                }
                coverage.iter().any(|&c| c)
            }
        };

        Fragment {
            x,
            y,
            inside,
            z_ndc,
            depth,
            z,
            coverage,
            sample_z,
            edges,
        }
    }

    fn stamp(&self, triangle: &SetupTriangle, x: i32, y: i32) -> Stamp {
        Stamp {
            x,
            y,
            fragments: std::array::from_fn(|i| {
                self.fragment(triangle, x + (i as i32 % STAMP_WIDTH), y + (i as i32 / STAMP_WIDTH))
            }),
        }
    }

    /// Fragment shader inputs: input 0 is the window position
    /// `(x, y, z, 1/w)`, the rest interpolate perspective-correct or copy
    /// the first vertex when interpolation is off.
    pub fn interpolate(&self, triangle: &SetupTriangle, fragment: &Fragment) -> Attributes {
        let sum: f64 = fragment.edges.iter().sum();
        let weights = if sum != 0.0 && sum.is_finite() {
            fragment.edges.map(|e| e / sum)
        } else {
            [1.0, 0.0, 0.0]
        };

        let mut out = [[0.0f32; 4]; MAX_FRAGMENT_ATTRIBUTES];
        for (attr, value) in out.iter_mut().enumerate().skip(1) {
            *value = if self.state.interpolation[attr] {
                std::array::from_fn(|c| {
                    (0..3)
                        .map(|v| weights[v] * triangle.vertices[v][attr][c] as f64)
                        .sum::<f64>() as f32
                })
            } else {
                triangle.vertices[0][attr]
            };
        }

        let center = self.pixel_center();
        out[POSITION_ATTRIBUTE] = [
            (fragment.x as f64 + center) as f32,
            (fragment.y as f64 + center) as f32,
            fragment.depth.clamp(0.0, 1.0) as f32,
            (sum / triangle.det) as f32,
        ];
        out
    }
}

/// Pull-based recursive traversal over the scan tiles of one triangle.
pub struct StampWalk<'a> {
    raster: &'a Rasterizer,
    triangle: &'a SetupTriangle,
    /// Pending tiles, next one on top.
    tiles: Vec<Tile>,
}

impl Iterator for StampWalk<'_> {
    type Item = Stamp;

    fn next(&mut self) -> Option<Stamp> {
        while let Some(tile) = self.tiles.pop() {
            if !self.triangle.bounds.overlaps(&tile) || self.raster.tile_rejected(self.triangle, &tile) {
                continue;
            }
            if tile.width <= STAMP_WIDTH && tile.height <= STAMP_HEIGHT {
                let stamp = self.raster.stamp(self.triangle, tile.x, tile.y);
                if stamp.any_inside() {
                    return Some(stamp);
                }
                continue;
            }

            let w = if tile.width > STAMP_WIDTH { tile.width / 2 } else { tile.width };
            let h = if tile.height > STAMP_HEIGHT { tile.height / 2 } else { tile.height };
            let mut children = Vec::with_capacity(4);
            let mut y = tile.y;
            while y < tile.y + tile.height {
                let mut x = tile.x;
                while x < tile.x + tile.width {
                    children.push(Tile {
                        x,
                        y,
                        width: w,
                        height: h,
                    });
                    x += w;
                }
                y += h;
            }
            self.tiles.extend(children.into_iter().rev());
        }
        None
    }
}
