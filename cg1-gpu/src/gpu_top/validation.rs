// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Validation logs and instruction trace controls.
//!
//! The logs record what a draw read and wrote so an independent model can
//! be cross-checked. They are cleared at the start of every draw.

use std::collections::BTreeMap;

use cg1_common::{Vec4, MAX_RENDER_TARGETS, MAX_SHADER_OUTPUTS, MAX_VERTEX_ATTRIBUTES, STAMP_FRAGMENTS};

/// Vertex key: `(index, instance)`.
pub type VertexKey = (u32, u32);

pub type VertexInputMap = BTreeMap<VertexKey, [Vec4; MAX_VERTEX_ATTRIBUTES]>;
pub type ShadedVertexMap = BTreeMap<VertexKey, [Vec4; MAX_SHADER_OUTPUTS]>;

/// Quad key: `(triangle, x, y)` of the stamp origin.
pub type QuadKey = (u32, i32, i32);

/// Memory traffic of one stamp against one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentQuadMemoryUpdate {
    /// Values produced by the pipeline, in the buffer format.
    pub input_data: Vec<u8>,
    /// Buffer contents before the write.
    pub read_data: Vec<u8>,
    /// Buffer contents after the write.
    pub write_data: Vec<u8>,
    /// Per byte of `write_data`: whether it was written.
    pub write_mask: Vec<bool>,
    pub cull_mask: [bool; STAMP_FRAGMENTS],
}

pub type FragmentQuadMemoryUpdateMap = BTreeMap<QuadKey, FragmentQuadMemoryUpdate>;

#[derive(Debug, Clone, Default)]
pub struct ValidationLog {
    pub vertex_inputs: VertexInputMap,
    pub shaded_vertices: ShadedVertexMap,
    pub color_updates: [FragmentQuadMemoryUpdateMap; MAX_RENDER_TARGETS],
    pub z_stencil_updates: FragmentQuadMemoryUpdateMap,
}

impl ValidationLog {
    pub fn clear(&mut self) {
        self.vertex_inputs.clear();
        self.shaded_vertices.clear();
        self.color_updates.iter_mut().for_each(BTreeMap::clear);
        self.z_stencil_updates.clear();
    }
}

/// Which shader invocations log every executed instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceControls {
    pub full: bool,
    pub batch: Option<u32>,
    pub vertex: Option<u32>,
    pub pixel: Option<(i32, i32)>,
}

impl TraceControls {
    fn batch_traced(&self, batch: u32) -> bool {
        self.full || self.batch == Some(batch)
    }

    pub fn vertex_traced(&self, batch: u32, index: u32) -> bool {
        self.batch_traced(batch) || self.vertex == Some(index)
    }

    /// Whether the 2x2 stamp at `(x, y)` is traced.
    pub fn stamp_traced(&self, batch: u32, x: i32, y: i32) -> bool {
        self.batch_traced(batch)
            || self
                .pixel
                .is_some_and(|(px, py)| (x..x + 2).contains(&px) && (y..y + 2).contains(&py))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_controls_default_off() {
        let t = TraceControls::default();
        assert!(!t.vertex_traced(0, 0));
        assert!(!t.stamp_traced(0, 0, 0));
    }

    #[test]
    fn test_trace_controls_watch_keys() {
        let t = TraceControls {
            batch: Some(3),
            vertex: Some(7),
            pixel: Some((5, 4)),
            ..Default::default()
        };
        assert!(t.vertex_traced(3, 0));
        assert!(t.vertex_traced(0, 7));
        assert!(!t.vertex_traced(0, 6));
        assert!(t.stamp_traced(0, 4, 4));
        assert!(!t.stamp_traced(0, 6, 4));
        assert!(t.stamp_traced(3, 100, 100));

        let full = TraceControls {
            full: true,
            ..Default::default()
        };
        assert!(full.stamp_traced(9, 0, 0));
    }

    #[test]
    fn test_clear_empties_every_map() {
        let mut log = ValidationLog::default();
        log.vertex_inputs.insert((0, 0), [[0.0; 4]; MAX_VERTEX_ATTRIBUTES]);
        log.color_updates[2].insert((1, 0, 0), FragmentQuadMemoryUpdate::default());
        log.z_stencil_updates.insert((1, 0, 0), FragmentQuadMemoryUpdate::default());
        log.clear();
        assert!(log.vertex_inputs.is_empty());
        assert!(log.color_updates[2].is_empty());
        assert!(log.z_stencil_updates.is_empty());
    }
}
