// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-stamp fragment operations: stencil and depth test, blending and
//! logical operations.
//!
//! Z/stencil words use the S8D24 layout: stencil in the high byte, depth in
//! the low 24 bits. All operations work on a whole stamp (one entry per
//! fragment, or per fragment sample under MSAA).

use cg1_common::{Vec4, MAX_RENDER_TARGETS};

use crate::state::{BlendEquation, BlendFactor, CompareMode, GpuState, LogicOpMode, StencilUpdate};

/// Depth bits of an S8D24 word.
pub const DEPTH_MASK_24: u32 = 0x00FF_FFFF;
pub const STENCIL_SHIFT: u32 = 24;

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Evaluate `a OP b` for a compare function.
pub fn compare<T: PartialOrd>(func: CompareMode, a: T, b: T) -> bool {
    match func {
        CompareMode::Never => false,
        CompareMode::Less => a < b,
        CompareMode::Equal => a == b,
        CompareMode::LEqual => a <= b,
        CompareMode::Greater => a > b,
        CompareMode::NotEqual => a != b,
        CompareMode::GEqual => a >= b,
        CompareMode::Always => true,
    }
}

/// New stencil value produced by `op`. The update mask is applied by the
/// caller.
pub fn update_stencil(op: StencilUpdate, value: u8, reference: u8) -> u8 {
    match op {
        StencilUpdate::Keep => value,
        StencilUpdate::Zero => 0,
        StencilUpdate::Replace => reference,
        StencilUpdate::Incr => value.saturating_add(1),
        StencilUpdate::Decr => value.saturating_sub(1),
        StencilUpdate::Invert => !value,
        StencilUpdate::IncrWrap => value.wrapping_add(1),
        StencilUpdate::DecrWrap => value.wrapping_sub(1),
    }
}

/// RGB blend weight. The alpha slot of the result is unused.
pub fn factor_rgb(factor: BlendFactor, constant: Vec4, source: Vec4, dest: Vec4) -> Vec4 {
    let splat = |v: f32| [v, v, v, v];
    let inv = |c: Vec4| [1.0 - c[0], 1.0 - c[1], 1.0 - c[2], 1.0 - c[3]];
    match factor {
        BlendFactor::Zero => splat(0.0),
        BlendFactor::One => splat(1.0),
        BlendFactor::SrcColor => source,
        BlendFactor::OneMinusSrcColor => inv(source),
        BlendFactor::DstColor => dest,
        BlendFactor::OneMinusDstColor => inv(dest),
        BlendFactor::SrcAlpha => splat(source[3]),
        BlendFactor::OneMinusSrcAlpha => splat(1.0 - source[3]),
        BlendFactor::DstAlpha => splat(dest[3]),
        BlendFactor::OneMinusDstAlpha => splat(1.0 - dest[3]),
        BlendFactor::ConstantColor => constant,
        BlendFactor::OneMinusConstantColor => inv(constant),
        BlendFactor::ConstantAlpha => splat(constant[3]),
        BlendFactor::OneMinusConstantAlpha => splat(1.0 - constant[3]),
        BlendFactor::SrcAlphaSaturate => splat(source[3].min(1.0 - dest[3])),
    }
}

/// Alpha blend weight.
pub fn factor_alpha(factor: BlendFactor, constant: Vec4, source: Vec4, dest: Vec4) -> f32 {
    match factor {
        BlendFactor::Zero => 0.0,
        BlendFactor::One | BlendFactor::SrcAlphaSaturate => 1.0,
        BlendFactor::SrcColor | BlendFactor::SrcAlpha => source[3],
        BlendFactor::OneMinusSrcColor | BlendFactor::OneMinusSrcAlpha => 1.0 - source[3],
        BlendFactor::DstColor | BlendFactor::DstAlpha => dest[3],
        BlendFactor::OneMinusDstColor | BlendFactor::OneMinusDstAlpha => 1.0 - dest[3],
        BlendFactor::ConstantColor | BlendFactor::ConstantAlpha => constant[3],
        BlendFactor::OneMinusConstantColor | BlendFactor::OneMinusConstantAlpha => 1.0 - constant[3],
    }
}

fn apply_equation(eq: BlendEquation, s: f32, sf: f32, d: f32, df: f32) -> f32 {
    match eq {
        BlendEquation::Add => s * sf + d * df,
        BlendEquation::Subtract => s * sf - d * df,
        BlendEquation::ReverseSubtract => d * df - s * sf,
        BlendEquation::Min => s.min(d),
        BlendEquation::Max => s.max(d),
    }
}

fn logic_byte(mode: LogicOpMode, s: u8, d: u8) -> u8 {
    match mode {
        LogicOpMode::Clear => 0,
        LogicOpMode::And => s & d,
        LogicOpMode::AndReverse => s & !d,
        LogicOpMode::Copy => s,
        LogicOpMode::AndInverted => !s & d,
        LogicOpMode::Noop => d,
        LogicOpMode::Xor => s ^ d,
        LogicOpMode::Or => s | d,
        LogicOpMode::Nor => !(s | d),
        LogicOpMode::Equiv => !(s ^ d),
        LogicOpMode::Invert => !d,
        LogicOpMode::OrReverse => s | !d,
        LogicOpMode::CopyInverted => !s,
        LogicOpMode::OrInverted => !s | d,
        LogicOpMode::Nand => !(s & d),
        LogicOpMode::Set => 0xFF,
    }
}

// ── Fragment operator ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendSetup {
    pub equation: BlendEquation,
    pub src_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub constant: Vec4,
}

impl Default for BlendSetup {
    fn default() -> Self {
        Self {
            equation: BlendEquation::Add,
            src_rgb: BlendFactor::One,
            src_alpha: BlendFactor::One,
            dst_rgb: BlendFactor::Zero,
            dst_alpha: BlendFactor::Zero,
            constant: [0.0; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StencilSetup {
    function: CompareMode,
    reference: u8,
    test_mask: u8,
    update_mask: u8,
    fail: StencilUpdate,
    depth_fail: StencilUpdate,
    depth_pass: StencilUpdate,
}

/// Configured Z, stencil, blend and logic-op state.
#[derive(Debug, Clone)]
pub struct FragmentOperator {
    z_test: bool,
    z_function: CompareMode,
    z_mask: bool,
    stencil_test: bool,
    stencil: StencilSetup,
    blend: [BlendSetup; MAX_RENDER_TARGETS],
    logic_op: LogicOpMode,
}

impl Default for FragmentOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentOperator {
    pub fn new() -> Self {
        Self {
            z_test: false,
            z_function: CompareMode::Less,
            z_mask: true,
            stencil_test: false,
            stencil: StencilSetup {
                function: CompareMode::Always,
                reference: 0,
                test_mask: 0xFF,
                update_mask: 0xFF,
                fail: StencilUpdate::Keep,
                depth_fail: StencilUpdate::Keep,
                depth_pass: StencilUpdate::Keep,
            },
            blend: [BlendSetup::default(); MAX_RENDER_TARGETS],
            logic_op: LogicOpMode::Copy,
        }
    }

    /// Load every test and blend parameter from the register state.
    pub fn configure(&mut self, state: &GpuState) {
        self.set_z_test(state.depth_test);
        self.configure_z_test(state.depth_function, state.depth_mask);
        self.set_stencil_test(state.stencil_test);
        self.configure_stencil_test(
            state.stencil_function,
            state.stencil_reference as u8,
            state.stencil_compare_mask as u8,
            state.stencil_update_mask as u8,
            state.stencil_fail_update,
            state.depth_fail_update,
            state.depth_pass_update,
        );
        for (rt, target) in state.render_targets.iter().enumerate() {
            self.set_blending(
                rt,
                BlendSetup {
                    equation: target.equation,
                    src_rgb: target.src_rgb,
                    src_alpha: target.src_alpha,
                    dst_rgb: target.dst_rgb,
                    dst_alpha: target.dst_alpha,
                    constant: state.blend_color,
                },
            );
        }
        self.set_logic_op_mode(state.logic_op_function);
    }

    pub fn set_z_test(&mut self, enable: bool) {
        self.z_test = enable;
    }

    pub fn configure_z_test(&mut self, function: CompareMode, z_mask: bool) {
        self.z_function = function;
        self.z_mask = z_mask;
    }

    pub fn set_stencil_test(&mut self, enable: bool) {
        self.stencil_test = enable;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn configure_stencil_test(
        &mut self,
        function: CompareMode,
        reference: u8,
        test_mask: u8,
        update_mask: u8,
        fail: StencilUpdate,
        depth_fail: StencilUpdate,
        depth_pass: StencilUpdate,
    ) {
        self.stencil = StencilSetup {
            function,
            reference,
            test_mask,
            update_mask,
            fail,
            depth_fail,
            depth_pass,
        };
    }

    pub fn set_blending(&mut self, rt: usize, setup: BlendSetup) {
        self.blend[rt] = setup;
    }

    pub fn set_logic_op_mode(&mut self, mode: LogicOpMode) {
        self.logic_op = mode;
    }

    /// Whether the Z/stencil stage can change the buffer or cull anything.
    pub fn z_stencil_active(&self) -> bool {
        self.z_test || self.stencil_test
    }

    fn masked_stencil(&self, op: StencilUpdate, current: u8) -> u8 {
        let updated = update_stencil(op, current, self.stencil.reference);
        (current & !self.stencil.update_mask) | (updated & self.stencil.update_mask)
    }

    /// Stencil and depth test a stamp against the buffer contents.
    ///
    /// Returns the updated S8D24 words and the updated cull flags. Already
    /// culled entries pass through untouched.
    pub fn stencil_z_test(&self, stamp_z: &[u32], buffer_zs: &[u32], cull: &[bool]) -> (Vec<u32>, Vec<bool>) {
        let mut out_zs = buffer_zs.to_vec();
        let mut out_cull = cull.to_vec();

        for i in 0..stamp_z.len() {
            if cull[i] {
                continue;
            }
            let mut stencil = (buffer_zs[i] >> STENCIL_SHIFT) as u8;
            let mut depth = buffer_zs[i] & DEPTH_MASK_24;

            let stencil_pass = !self.stencil_test
                || compare(
                    self.stencil.function,
                    self.stencil.reference & self.stencil.test_mask,
                    stencil & self.stencil.test_mask,
                );

            if !stencil_pass {
                stencil = self.masked_stencil(self.stencil.fail, stencil);
                out_cull[i] = true;
            } else {
                let z = stamp_z[i] & DEPTH_MASK_24;
                let z_pass = !self.z_test || compare(self.z_function, z, depth);
                if z_pass {
                    if self.stencil_test {
                        stencil = self.masked_stencil(self.stencil.depth_pass, stencil);
                    }
                    if self.z_test && self.z_mask {
                        depth = z;
                    }
                } else {
                    if self.stencil_test {
                        stencil = self.masked_stencil(self.stencil.depth_fail, stencil);
                    }
                    out_cull[i] = true;
                }
            }

            out_zs[i] = ((stencil as u32) << STENCIL_SHIFT) | depth;
        }

        (out_zs, out_cull)
    }

    /// Blend one fragment color with the render target color.
    pub fn blend(&self, rt: usize, source: Vec4, dest: Vec4) -> Vec4 {
        let setup = &self.blend[rt];
        let sf = factor_rgb(setup.src_rgb, setup.constant, source, dest);
        let df = factor_rgb(setup.dst_rgb, setup.constant, source, dest);
        let sa = factor_alpha(setup.src_alpha, setup.constant, source, dest);
        let da = factor_alpha(setup.dst_alpha, setup.constant, source, dest);

        let mut out = [0.0f32; 4];
        for c in 0..3 {
            out[c] = apply_equation(setup.equation, source[c], sf[c], dest[c], df[c]);
        }
        out[3] = apply_equation(setup.equation, source[3], sa, dest[3], da);
        out
    }

    /// Combine RGBA8 source and destination with the logical operation.
    pub fn logic_op(&self, source: [u8; 4], dest: [u8; 4]) -> [u8; 4] {
        let mut out = [0u8; 4];
        for c in 0..4 {
            out[c] = logic_byte(self.logic_op, source[c], dest[c]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_UPDATES: [StencilUpdate; 8] = [
        StencilUpdate::Keep,
        StencilUpdate::Zero,
        StencilUpdate::Replace,
        StencilUpdate::Incr,
        StencilUpdate::Decr,
        StencilUpdate::Invert,
        StencilUpdate::IncrWrap,
        StencilUpdate::DecrWrap,
    ];

    fn zs(stencil: u8, depth: u32) -> u32 {
        ((stencil as u32) << 24) | depth
    }

    fn expected(op: StencilUpdate, value: u8, reference: u8) -> u8 {
        match op {
            StencilUpdate::Keep => value,
            StencilUpdate::Zero => 0,
            StencilUpdate::Replace => reference,
            StencilUpdate::Incr => {
                if value == 255 {
                    255
                } else {
                    value + 1
                }
            }
            StencilUpdate::Decr => {
                if value == 0 {
                    0
                } else {
                    value - 1
                }
            }
            StencilUpdate::Invert => 255 - value,
            StencilUpdate::IncrWrap => ((value as u32 + 1) % 256) as u8,
            StencilUpdate::DecrWrap => ((value as u32 + 255) % 256) as u8,
        }
    }

    #[test]
    fn test_compare_table() {
        let rows = [
            (CompareMode::Never, [false, false, false]),
            (CompareMode::Less, [true, false, false]),
            (CompareMode::Equal, [false, true, false]),
            (CompareMode::LEqual, [true, true, false]),
            (CompareMode::Greater, [false, false, true]),
            (CompareMode::NotEqual, [true, false, true]),
            (CompareMode::GEqual, [false, true, true]),
            (CompareMode::Always, [true, true, true]),
        ];
        for (func, want) in rows {
            assert_eq!([compare(func, 1, 2), compare(func, 2, 2), compare(func, 3, 2)], want, "{:?}", func);
        }
    }

    #[test]
    fn test_update_stencil_edges() {
        assert_eq!(update_stencil(StencilUpdate::Incr, 255, 0), 255);
        assert_eq!(update_stencil(StencilUpdate::IncrWrap, 255, 0), 0);
        assert_eq!(update_stencil(StencilUpdate::Decr, 0, 0), 0);
        assert_eq!(update_stencil(StencilUpdate::DecrWrap, 0, 0), 255);
        assert_eq!(update_stencil(StencilUpdate::Invert, 0x0F, 0), 0xF0);
        assert_eq!(update_stencil(StencilUpdate::Replace, 3, 9), 9);
    }

    /// Every update function under each of the three triggers, with a
    /// partial update mask.
    #[test]
    fn test_stencil_update_triggers() {
        let value = 0x81u8;
        let reference = 0x3Cu8;
        let update_mask = 0x0Fu8;
        for op in ALL_UPDATES {
            let want = (value & !update_mask) | (expected(op, value, reference) & update_mask);
            for trigger in 0..3 {
                let mut fop = FragmentOperator::new();
                fop.set_stencil_test(true);
                fop.set_z_test(true);
                fop.configure_z_test(CompareMode::Less, true);
                let (func, fail, zfail, zpass) = match trigger {
                    0 => (CompareMode::Never, op, StencilUpdate::Keep, StencilUpdate::Keep),
                    1 => (CompareMode::Always, StencilUpdate::Keep, op, StencilUpdate::Keep),
                    _ => (CompareMode::Always, StencilUpdate::Keep, StencilUpdate::Keep, op),
                };
                fop.configure_stencil_test(func, reference, 0xFF, update_mask, fail, zfail, zpass);

                // Depth fail: incoming z equal to the buffer under LESS.
                let stamp_z = if trigger == 1 { 0x1000 } else { 0x0800 };
                let (out, cull) = fop.stencil_z_test(&[stamp_z], &[zs(value, 0x1000)], &[false]);
                assert_eq!((out[0] >> 24) as u8, want, "{:?} trigger {}", op, trigger);
                assert_eq!(cull[0], trigger != 2);
                let depth = out[0] & DEPTH_MASK_24;
                assert_eq!(depth, if trigger == 2 { 0x0800 } else { 0x1000 });
            }
        }
    }

    #[test]
    fn test_z_test_respects_mask_and_cull() {
        let mut fop = FragmentOperator::new();
        fop.set_z_test(true);
        fop.configure_z_test(CompareMode::Less, false);
        let (out, cull) = fop.stencil_z_test(
            &[0x10, 0x30, 0x10, 0x10],
            &[zs(7, 0x20), zs(7, 0x20), zs(7, 0x20), zs(7, 0x20)],
            &[false, false, false, true],
        );
        assert_eq!(cull, vec![false, true, false, true]);
        // Depth writes disabled: buffer untouched.
        assert!(out.iter().all(|&w| w == zs(7, 0x20)));

        fop.configure_z_test(CompareMode::Less, true);
        let (out, _) = fop.stencil_z_test(&[0x10], &[zs(7, 0x20)], &[false]);
        assert_eq!(out[0], zs(7, 0x10));
    }

    #[test]
    fn test_stencil_compare_uses_test_mask() {
        let mut fop = FragmentOperator::new();
        fop.set_stencil_test(true);
        fop.configure_stencil_test(
            CompareMode::Equal,
            0x12,
            0x0F,
            0xFF,
            StencilUpdate::Zero,
            StencilUpdate::Keep,
            StencilUpdate::Keep,
        );
        let (_, cull) = fop.stencil_z_test(&[0, 0], &[zs(0xF2, 0), zs(0x13, 0)], &[false, false]);
        assert_eq!(cull, vec![false, true]);
    }

    #[test]
    fn test_blend_alpha_over() {
        let mut fop = FragmentOperator::new();
        fop.set_blending(
            1,
            BlendSetup {
                src_rgb: BlendFactor::SrcAlpha,
                dst_rgb: BlendFactor::OneMinusSrcAlpha,
                src_alpha: BlendFactor::One,
                dst_alpha: BlendFactor::Zero,
                ..BlendSetup::default()
            },
        );
        let out = fop.blend(1, [1.0, 0.0, 0.0, 0.25], [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(out, [0.25, 0.0, 0.75, 0.25]);
        // Render target 0 still replaces.
        assert_eq!(fop.blend(0, [0.5; 4], [1.0; 4]), [0.5; 4]);
    }

    #[test]
    fn test_blend_equations_and_constants() {
        let mut fop = FragmentOperator::new();
        let mut setup = BlendSetup {
            equation: BlendEquation::ReverseSubtract,
            src_rgb: BlendFactor::ConstantColor,
            src_alpha: BlendFactor::ConstantAlpha,
            dst_rgb: BlendFactor::One,
            dst_alpha: BlendFactor::One,
            constant: [0.5, 0.5, 0.5, 0.25],
        };
        fop.set_blending(0, setup);
        assert_eq!(fop.blend(0, [1.0; 4], [1.0; 4]), [0.5, 0.5, 0.5, 0.75]);

        setup.equation = BlendEquation::Max;
        fop.set_blending(0, setup);
        assert_eq!(fop.blend(0, [0.2, 0.9, 0.0, 0.0], [0.5, 0.1, 0.0, 1.0]), [0.5, 0.9, 0.0, 1.0]);
    }

    #[test]
    fn test_src_alpha_saturate() {
        let f = factor_rgb(BlendFactor::SrcAlphaSaturate, [0.0; 4], [0.0, 0.0, 0.0, 0.75], [0.0, 0.0, 0.0, 0.5]);
        assert_eq!(f, [0.5; 4]);
        assert_eq!(factor_alpha(BlendFactor::SrcAlphaSaturate, [0.0; 4], [0.0; 4], [0.0; 4]), 1.0);
    }

    #[test]
    fn test_logic_ops() {
        let mut fop = FragmentOperator::new();
        let s = [0b1100, 0xFF, 0x00, 0xF0];
        let d = [0b1010, 0x0F, 0xFF, 0x0F];
        let cases = [
            (LogicOpMode::Clear, [0, 0, 0, 0]),
            (LogicOpMode::And, [0b1000, 0x0F, 0x00, 0x00]),
            (LogicOpMode::Xor, [0b0110, 0xF0, 0xFF, 0xFF]),
            (LogicOpMode::Noop, d),
            (LogicOpMode::Copy, s),
            (LogicOpMode::CopyInverted, [!0b1100u8, 0x00, 0xFF, 0x0F]),
            (LogicOpMode::Set, [0xFF; 4]),
        ];
        for (mode, want) in cases {
            fop.set_logic_op_mode(mode);
            assert_eq!(fop.logic_op(s, d), want, "{:?}", mode);
        }
    }

    #[test]
    fn test_configure_from_state() {
        let mut state = GpuState::new();
        state.depth_test = true;
        state.depth_function = CompareMode::Greater;
        state.render_targets[2].equation = BlendEquation::Min;
        state.logic_op_function = LogicOpMode::Invert;
        let mut fop = FragmentOperator::new();
        fop.configure(&state);
        assert!(fop.z_stencil_active());
        let (_, cull) = fop.stencil_z_test(&[5], &[zs(0, 10)], &[false]);
        assert_eq!(cull, vec![true]);
        assert_eq!(fop.blend(2, [0.3; 4], [0.6; 4]), [0.3; 4]);
        assert_eq!(fop.logic_op([0; 4], [0x0F; 4]), [0xF0; 4]);
    }
}
