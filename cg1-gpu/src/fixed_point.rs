// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sign-magnitude fixed-point numbers with configurable integer and
//! fractional widths.
//!
//! Used by the shader fixed-point accumulator (FXMUL/FXMAD/FXMAD2) and by
//! the rasterizer for subpixel vertex snapping. Conversions truncate toward
//! zero and saturate on overflow; arithmetic wraps the magnitude to the
//! integer width of the result.

use std::ops::{Add, Mul};

const MAX_INTEGER_BITS: u32 = 64;
const MAX_FRACTIONAL_BITS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint {
    /// Signed raw value, scaled by 2^frac_bits.
    raw: i128,
    int_bits: u32,
    frac_bits: u32,
}

impl FixedPoint {
    /// Convert a float, truncating toward zero.
    pub fn from_f32(value: f32, int_bits: u32, frac_bits: u32) -> Self {
        let int_bits = int_bits.min(MAX_INTEGER_BITS);
        let frac_bits = frac_bits.min(MAX_FRACTIONAL_BITS);
        let limit = Self::magnitude_mask(int_bits, frac_bits);
        let raw = if value.is_nan() {
            0
        } else if value.is_infinite() {
            limit * value.signum() as i128
        } else {
            let scaled = (value as f64) * 2f64.powi(frac_bits as i32);
            let truncated = scaled.trunc();
            if truncated.abs() >= limit as f64 {
                limit * truncated.signum() as i128
            } else {
                truncated as i128
            }
        };
        Self {
            raw,
            int_bits,
            frac_bits,
        }
    }

    pub fn zero(int_bits: u32, frac_bits: u32) -> Self {
        Self {
            raw: 0,
            int_bits,
            frac_bits,
        }
    }

    pub fn to_f32(self) -> f32 {
        (self.raw as f64 / 2f64.powi(self.frac_bits as i32)) as f32
    }

    pub fn int_bits(&self) -> u32 {
        self.int_bits
    }

    pub fn frac_bits(&self) -> u32 {
        self.frac_bits
    }

    /// Raw scaled value.
    pub fn raw(&self) -> i128 {
        self.raw
    }

    /// Reinterpret at a different fractional width (truncating toward zero).
    pub fn rescale(self, frac_bits: u32) -> Self {
        let raw = if frac_bits >= self.frac_bits {
            self.raw << (frac_bits - self.frac_bits)
        } else {
            let shift = self.frac_bits - frac_bits;
            self.raw.signum() * (self.raw.abs() >> shift)
        };
        Self {
            raw,
            int_bits: self.int_bits,
            frac_bits,
        }
        .wrapped()
    }

    fn magnitude_mask(int_bits: u32, frac_bits: u32) -> i128 {
        let bits = (int_bits + frac_bits).min(126);
        (1i128 << bits) - 1
    }

    fn wrapped(self) -> Self {
        let mask = Self::magnitude_mask(self.int_bits, self.frac_bits);
        Self {
            raw: self.raw.signum() * (self.raw.abs() & mask),
            ..self
        }
    }
}

impl Add for FixedPoint {
    type Output = FixedPoint;

    fn add(self, rhs: FixedPoint) -> FixedPoint {
        let frac_bits = self.frac_bits.max(rhs.frac_bits);
        let int_bits = self.int_bits.max(rhs.int_bits);
        let a = self.raw << (frac_bits - self.frac_bits);
        let b = rhs.raw << (frac_bits - rhs.frac_bits);
        FixedPoint {
            raw: a + b,
            int_bits,
            frac_bits,
        }
        .wrapped()
    }
}

impl Mul for FixedPoint {
    type Output = FixedPoint;

    fn mul(self, rhs: FixedPoint) -> FixedPoint {
        let frac_bits = self.frac_bits.max(rhs.frac_bits);
        let int_bits = self.int_bits.max(rhs.int_bits);
        // Exact product carries frac_a + frac_b fractional bits.
        let product = FixedPoint {
            raw: self.raw * rhs.raw,
            int_bits,
            frac_bits: self.frac_bits + rhs.frac_bits,
        };
        product.rescale(frac_bits)
    }
}

/// Snap a coordinate to `subpixel_bits` of fractional precision.
pub fn snap_to_subpixel(value: f32, subpixel_bits: u32) -> f32 {
    FixedPoint::from_f32(value, 16, subpixel_bits).to_f32()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_truncates_toward_zero() {
        let a = FixedPoint::from_f32(1.3, 16, 2);
        assert_eq!(a.to_f32(), 1.25);
        let b = FixedPoint::from_f32(-1.3, 16, 2);
        assert_eq!(b.to_f32(), -1.25);
    }

    #[test]
    fn test_saturation_on_overflow() {
        let a = FixedPoint::from_f32(1000.0, 4, 0);
        assert_eq!(a.to_f32(), 15.0);
        let n = FixedPoint::from_f32(f32::NAN, 8, 8);
        assert_eq!(n.to_f32(), 0.0);
    }

    #[test]
    fn test_multiply_accumulate() {
        let fxp = 16;
        let one = FixedPoint::from_f32(1.0, 32, 2 * fxp);
        let a = FixedPoint::from_f32(1.5, 16, fxp);
        let b = FixedPoint::from_f32(-2.25, 16, fxp);
        let acc = FixedPoint::from_f32(0.125, 32, 2 * fxp);
        let r = one * a * b + acc;
        assert_eq!(r.frac_bits(), 2 * fxp);
        assert_eq!(r.to_f32(), -3.25);
    }

    #[test]
    fn test_add_wraps_integer_width() {
        let a = FixedPoint::from_f32(15.0, 4, 0);
        let b = FixedPoint::from_f32(1.0, 4, 0);
        assert_eq!((a + b).to_f32(), 0.0);
    }

    #[test]
    fn test_snap_to_subpixel() {
        assert_eq!(snap_to_subpixel(10.3, 2), 10.25);
        assert_eq!(snap_to_subpixel(0.5, 8), 0.5);
    }
}
