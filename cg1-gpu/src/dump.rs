// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Resolved frames and buffer dumps.
//!
//! A [`FrameImage`] is a plain RGBA8 image, top row first. Depth and
//! stencil dumps recolor the S8D24 words for inspection only.

use std::path::Path;

use image::{ImageFormat, RgbaImage};

use cg1_common::{FatalError, GpuResult};

use crate::fragment_ops::{DEPTH_MASK_24, STENCIL_SHIFT};

/// RGBA8 image of a resolved buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameImage {
    /// Wrap `width * height * 4` bytes of RGBA8 data.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> GpuResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(FatalError::Invariant(format!(
                "frame image {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at column `x` of row `y`, counted from the top.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn save_png(&self, path: &Path) -> GpuResult<()> {
        let img = RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| FatalError::Image("invalid image data".into()))?;
        img.save_with_format(path, ImageFormat::Png)
            .map_err(|e| FatalError::Image(format!("{}: {}", path.display(), e)))?;
        log::debug!("Dump: wrote {}", path.display());
        Ok(())
    }
}

/// Buffer selected by a dump command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    Color(usize),
    Depth,
    Stencil,
}

/// `frameF-batchB-rtN.png`, or `-depth` / `-stencil` in place of the target.
pub fn dump_file_name(frame: u32, batch: u32, kind: DumpKind) -> String {
    match kind {
        DumpKind::Color(rt) => format!("frame{}-batch{}-rt{}.png", frame, batch, rt),
        DumpKind::Depth => format!("frame{}-batch{}-depth.png", frame, batch),
        DumpKind::Stencil => format!("frame{}-batch{}-stencil.png", frame, batch),
    }
}

/// Spread the 24 depth bits over R, G and B.
pub fn depth_to_rgba(word: u32) -> [u8; 4] {
    let d = word & DEPTH_MASK_24;
    [(d >> 16) as u8, (d >> 8) as u8, d as u8, 255]
}

/// Stencil value as gray.
pub fn stencil_to_rgba(word: u32) -> [u8; 4] {
    let s = (word >> STENCIL_SHIFT) as u8;
    [s, s, s, 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_image_size_checked() {
        assert!(FrameImage::new(2, 2, vec![0; 16]).is_ok());
        assert!(FrameImage::new(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_pixel_lookup() {
        let mut data = vec![0u8; 2 * 2 * 4];
        data[12..16].copy_from_slice(&[1, 2, 3, 4]);
        let img = FrameImage::new(2, 2, data).unwrap();
        assert_eq!(img.pixel(1, 1), [1, 2, 3, 4]);
        assert_eq!(img.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_dump_names() {
        assert_eq!(dump_file_name(3, 7, DumpKind::Color(1)), "frame3-batch7-rt1.png");
        assert_eq!(dump_file_name(0, 0, DumpKind::Depth), "frame0-batch0-depth.png");
        assert_eq!(dump_file_name(1, 2, DumpKind::Stencil), "frame1-batch2-stencil.png");
    }

    #[test]
    fn test_depth_and_stencil_colors() {
        assert_eq!(depth_to_rgba(0xAB12_3456), [0x12, 0x34, 0x56, 255]);
        assert_eq!(stencil_to_rgba(0xAB12_3456), [0xAB, 0xAB, 0xAB, 255]);
    }

    #[test]
    fn test_save_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let img = FrameImage::new(1, 2, vec![255, 0, 0, 255, 0, 255, 0, 255]).unwrap();
        img.save_png(&path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (1, 2));
        assert_eq!(loaded.get_pixel(0, 1).0, [0, 255, 0, 255]);
    }
}
