// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Color-format conversions between RGBA32F and the storage formats used by
//! render targets, plus sRGB transfer functions.

use cg1_common::Vec4;
use half::f16;

// ── To RGBA32F ───────────────────────────────────────────────────────────────

/// RGBA8 unorm to float.
pub fn color_rgba8_to_rgba32f(bytes: &[u8]) -> Vec4 {
    [
        bytes[0] as f32 / 255.0,
        bytes[1] as f32 / 255.0,
        bytes[2] as f32 / 255.0,
        bytes[3] as f32 / 255.0,
    ]
}

/// RGBA16 unorm to float.
pub fn color_rgba16_to_rgba32f(bytes: &[u8]) -> Vec4 {
    let mut out = [0.0f32; 4];
    for (c, v) in out.iter_mut().enumerate() {
        let raw = u16::from_le_bytes([bytes[c * 2], bytes[c * 2 + 1]]);
        *v = raw as f32 / 65535.0;
    }
    out
}

/// RG16F to float. Blue is 0, alpha is 1.
pub fn color_rg16f_to_rgba32f(bytes: &[u8]) -> Vec4 {
    let r = f16::from_le_bytes([bytes[0], bytes[1]]).to_f32();
    let g = f16::from_le_bytes([bytes[2], bytes[3]]).to_f32();
    [r, g, 0.0, 1.0]
}

/// RGBA16F to float.
pub fn color_rgba16f_to_rgba32f(bytes: &[u8]) -> Vec4 {
    let mut out = [0.0f32; 4];
    for (c, v) in out.iter_mut().enumerate() {
        *v = f16::from_le_bytes([bytes[c * 2], bytes[c * 2 + 1]]).to_f32();
    }
    out
}

/// R32F to float. Green and blue are 0, alpha is 1.
pub fn color_r32f_to_rgba32f(bytes: &[u8]) -> Vec4 {
    let r = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    [r, 0.0, 0.0, 1.0]
}

// ── From RGBA32F ─────────────────────────────────────────────────────────────

#[inline]
fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
fn unorm16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

pub fn color_rgba32f_to_rgba8(color: Vec4, out: &mut [u8]) {
    for c in 0..4 {
        out[c] = unorm8(color[c]);
    }
}

pub fn color_rgba32f_to_rgba16(color: Vec4, out: &mut [u8]) {
    for c in 0..4 {
        out[c * 2..c * 2 + 2].copy_from_slice(&unorm16(color[c]).to_le_bytes());
    }
}

pub fn color_rgba32f_to_rg16f(color: Vec4, out: &mut [u8]) {
    out[0..2].copy_from_slice(&f16::from_f32(color[0]).to_le_bytes());
    out[2..4].copy_from_slice(&f16::from_f32(color[1]).to_le_bytes());
}

pub fn color_rgba32f_to_rgba16f(color: Vec4, out: &mut [u8]) {
    for c in 0..4 {
        out[c * 2..c * 2 + 2].copy_from_slice(&f16::from_f32(color[c]).to_le_bytes());
    }
}

pub fn color_rgba32f_to_r32f(color: Vec4, out: &mut [u8]) {
    out[0..4].copy_from_slice(&color[0].to_le_bytes());
}

// ── sRGB ─────────────────────────────────────────────────────────────────────

/// Linear to sRGB on RGB. Alpha is left untouched.
pub fn color_linear_to_srgb(color: Vec4) -> Vec4 {
    let encode = |c: f32| {
        if c <= 0.003_130_8 {
            c * 12.92
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        }
    };
    [encode(color[0]), encode(color[1]), encode(color[2]), color[3]]
}

/// sRGB to linear on RGB. Alpha is left untouched.
pub fn color_srgb_to_linear(color: Vec4) -> Vec4 {
    let decode = |c: f32| {
        if c <= 0.040_45 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    [decode(color[0]), decode(color[1]), decode(color[2]), color[3]]
}

/// Round a float to the nearest value representable in FP16.
pub fn quantize_f16(v: f32) -> f32 {
    f16::from_f32(v).to_f32()
}
