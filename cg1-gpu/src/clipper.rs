// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trivial rejection against the clip volume and user clip planes.
//!
//! Clipping proper is not done: the homogeneous rasterizer handles
//! triangles crossing the w = 0 plane, so only whole-triangle rejects are
//! needed here.

use bitflags::bitflags;

use cg1_common::Vec4;

bitflags! {
    /// Sutherland-Cohen outcode: one bit per clip plane the vertex is outside.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Outcode: u32 {
        const LEFT = 0x01;
        const RIGHT = 0x02;
        const BOTTOM = 0x04;
        const TOP = 0x08;
        const NEAR = 0x10;
        const FAR = 0x20;
    }
}

/// Outcode of a clip-space vertex. Under the D3D9 depth range the near
/// plane is z = 0 instead of z = -w.
pub fn outcode(v: Vec4, d3d9_depth_range: bool) -> Outcode {
    let [x, y, z, w] = v;
    let mut code = Outcode::empty();
    code.set(Outcode::LEFT, w + x < 0.0);
    code.set(Outcode::RIGHT, w - x < 0.0);
    code.set(Outcode::BOTTOM, w + y < 0.0);
    code.set(Outcode::TOP, w - y < 0.0);
    let near_outside = if d3d9_depth_range { z < 0.0 } else { w + z < 0.0 };
    code.set(Outcode::NEAR, near_outside);
    code.set(Outcode::FAR, w - z < 0.0);
    code
}

/// True when all three vertices are outside the same clip plane.
pub fn trivial_reject(v1: Vec4, v2: Vec4, v3: Vec4, d3d9_depth_range: bool) -> bool {
    let common = outcode(v1, d3d9_depth_range) & outcode(v2, d3d9_depth_range) & outcode(v3, d3d9_depth_range);
    !common.is_empty()
}

fn plane_distance(plane: Vec4, v: Vec4) -> f32 {
    plane[0] * v[0] + plane[1] * v[1] + plane[2] * v[2] + plane[3] * v[3]
}

/// True when all three vertices are on the negative side of one plane.
pub fn user_clip_reject(v1: Vec4, v2: Vec4, v3: Vec4, planes: &[Vec4]) -> bool {
    planes
        .iter()
        .any(|&p| plane_distance(p, v1) < 0.0 && plane_distance(p, v2) < 0.0 && plane_distance(p, v3) < 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_triangle_is_kept() {
        let v1 = [0.0, 0.0, 0.0, 1.0];
        let v2 = [0.5, -0.25, 0.1, 1.0];
        let v3 = [-0.5, 0.75, -0.9, 1.0];
        assert!(!trivial_reject(v1, v2, v3, false));
        assert_eq!(outcode(v3, false), Outcode::empty());
    }

    #[test]
    fn test_common_plane_rejects() {
        // All to the right of x = w.
        assert!(trivial_reject(
            [2.0, 0.0, 0.0, 1.0],
            [3.0, 1.0, 0.0, 1.0],
            [1.5, -1.0, 0.0, 1.0],
            false
        ));
        // Straddling left and right: no common bit.
        assert!(!trivial_reject(
            [2.0, 0.0, 0.0, 1.0],
            [-2.0, 0.0, 0.0, 1.0],
            [0.0, 3.0, 0.0, 1.0],
            false
        ));
    }

    #[test]
    fn test_near_plane_depends_on_depth_range() {
        let v = [0.0, 0.0, -0.5, 1.0];
        assert_eq!(outcode(v, false), Outcode::empty());
        assert_eq!(outcode(v, true), Outcode::NEAR);
        assert!(trivial_reject(v, v, v, true));
        assert!(!trivial_reject(v, v, v, false));
        assert_eq!(outcode([0.0, 0.0, 2.0, 1.0], false), Outcode::FAR);
    }

    #[test]
    fn test_outcode_bits() {
        assert_eq!(outcode([-2.0, 0.0, 0.0, 1.0], false).bits(), 0x01);
        assert_eq!(outcode([0.0, -2.0, 0.0, 1.0], false).bits(), 0x04);
        assert_eq!(outcode([0.0, 2.0, 0.0, 1.0], false).bits(), 0x08);
    }

    #[test]
    fn test_user_plane_reject() {
        // Keep x >= 0.
        let planes = [[1.0, 0.0, 0.0, 0.0]];
        let left = [[-1.0, 0.0, 0.0, 1.0], [-0.5, 1.0, 0.0, 1.0], [-0.2, -1.0, 0.0, 1.0]];
        assert!(user_clip_reject(left[0], left[1], left[2], &planes));
        assert!(!user_clip_reject(left[0], [0.5, 0.0, 0.0, 1.0], left[2], &planes));
        assert!(!user_clip_reject(left[0], left[1], left[2], &[]));
    }
}
