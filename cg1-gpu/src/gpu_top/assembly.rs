// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Primitive assembly: positions in the index list grouped into triangles.

use cg1_common::{FatalError, GpuResult};

use crate::state::PrimitiveMode;

/// Triangles for `count` vertices of the given topology, as positions in
/// the draw's index list. Trailing vertices that do not complete a
/// primitive are dropped.
pub fn assemble(mode: PrimitiveMode, count: usize) -> GpuResult<Vec<[usize; 3]>> {
    let mut tris = Vec::new();
    match mode {
        PrimitiveMode::Triangle => {
            for i in 0..count / 3 {
                tris.push([i * 3, i * 3 + 1, i * 3 + 2]);
            }
        }
        PrimitiveMode::TriangleStrip => {
            for i in 0..count.saturating_sub(2) {
                if i % 2 == 0 {
                    tris.push([i, i + 1, i + 2]);
                } else {
                    tris.push([i, i + 2, i + 1]);
                }
            }
        }
        PrimitiveMode::TriangleFan => {
            for i in 1..count.saturating_sub(1) {
                tris.push([0, i, i + 1]);
            }
        }
        PrimitiveMode::Quad => {
            //  B--C       B--C  C
            //  |  |   ==> | /  /|
            //  A--D       A  A--D  (A B D, B C D)
            for q in 0..count / 4 {
                let b = q * 4;
                tris.push([b, b + 1, b + 3]);
                tris.push([b + 1, b + 2, b + 3]);
            }
        }
        PrimitiveMode::QuadStrip => {
            //  A---C---E
            //  |\  |\  |
            //  B---D---F
            for q in 0..count.saturating_sub(2) / 2 {
                let b = q * 2;
                tris.push([b, b + 1, b + 3]);
                tris.push([b + 2, b, b + 3]);
            }
        }
        PrimitiveMode::Point => return Err(FatalError::NotImplemented("point primitives")),
        PrimitiveMode::Line => return Err(FatalError::NotImplemented("line primitives")),
        PrimitiveMode::LineStrip => return Err(FatalError::NotImplemented("line strip primitives")),
        PrimitiveMode::LineFan => return Err(FatalError::NotImplemented("line fan primitives")),
    }
    Ok(tris)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_list() {
        let tris = assemble(PrimitiveMode::Triangle, 7).unwrap();
        assert_eq!(tris, vec![[0, 1, 2], [3, 4, 5]]);
    }

    #[test]
    fn test_triangle_strip_alternates_winding() {
        let tris = assemble(PrimitiveMode::TriangleStrip, 5).unwrap();
        assert_eq!(tris, vec![[0, 1, 2], [1, 3, 2], [2, 3, 4]]);
        assert!(assemble(PrimitiveMode::TriangleStrip, 2).unwrap().is_empty());
    }

    #[test]
    fn test_triangle_fan() {
        let tris = assemble(PrimitiveMode::TriangleFan, 5).unwrap();
        assert_eq!(tris, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
        assert!(assemble(PrimitiveMode::TriangleFan, 0).unwrap().is_empty());
    }

    #[test]
    fn test_quads() {
        let tris = assemble(PrimitiveMode::Quad, 8).unwrap();
        assert_eq!(tris, vec![[0, 1, 3], [1, 2, 3], [4, 5, 7], [5, 6, 7]]);
    }

    #[test]
    fn test_quad_strip() {
        let tris = assemble(PrimitiveMode::QuadStrip, 6).unwrap();
        assert_eq!(tris, vec![[0, 1, 3], [2, 0, 3], [2, 3, 5], [4, 2, 5]]);
        assert!(assemble(PrimitiveMode::QuadStrip, 3).unwrap().is_empty());
    }

    #[test]
    fn test_lines_and_points_not_implemented() {
        for mode in [
            PrimitiveMode::Point,
            PrimitiveMode::Line,
            PrimitiveMode::LineStrip,
            PrimitiveMode::LineFan,
        ] {
            assert!(matches!(assemble(mode, 6), Err(FatalError::NotImplemented(_))));
        }
    }
}
