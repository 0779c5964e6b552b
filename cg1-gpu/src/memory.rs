// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Emulated memory spaces.
//!
//! Two flat byte arrays: GPU-local memory and system (mapped) memory. A bus
//! address selects its space with bits [31:30] and indexes it with the low
//! 30 bits. Accesses past the configured size of a space are fatal.

use cg1_common::error::MemorySpaceKind;
use cg1_common::settings::MemoryConfig;
use cg1_common::{
    FatalError, GpuAddr, GpuResult, ADDRESS_SPACE_MASK, GPU_ADDRESS_SPACE, SPACE_OFFSET_MASK,
    SYSTEM_ADDRESS_SPACE,
};

/// Backing storage for both memory spaces.
pub struct MemorySpace {
    gpu: Vec<u8>,
    system: Vec<u8>,
}

impl MemorySpace {
    pub fn new(config: &MemoryConfig) -> Self {
        Self::with_sizes(config.gpu_memory_bytes(), config.mapped_memory_bytes())
    }

    /// Allocate spaces with explicit byte sizes.
    pub fn with_sizes(gpu_bytes: usize, system_bytes: usize) -> Self {
        log::debug!(
            "Memory: gpu {} KiB, system {} KiB",
            gpu_bytes / 1024,
            system_bytes / 1024
        );
        Self {
            gpu: vec![0u8; gpu_bytes],
            system: vec![0u8; system_bytes],
        }
    }

    /// Decode the space tag of a bus address.
    pub fn space_of(address: GpuAddr) -> MemorySpaceKind {
        match address & ADDRESS_SPACE_MASK {
            GPU_ADDRESS_SPACE => MemorySpaceKind::Gpu,
            SYSTEM_ADDRESS_SPACE => MemorySpaceKind::System,
            _ => MemorySpaceKind::Unknown,
        }
    }

    /// Borrow `size` bytes starting at `address`.
    pub fn slice(&self, address: GpuAddr, size: usize) -> GpuResult<&[u8]> {
        let (space, offset) = self.locate(address, size)?;
        let backing = match space {
            MemorySpaceKind::Gpu => &self.gpu,
            _ => &self.system,
        };
        Ok(&backing[offset..offset + size])
    }

    /// Mutably borrow `size` bytes starting at `address`.
    pub fn slice_mut(&mut self, address: GpuAddr, size: usize) -> GpuResult<&mut [u8]> {
        let (space, offset) = self.locate(address, size)?;
        let backing = match space {
            MemorySpaceKind::Gpu => &mut self.gpu,
            _ => &mut self.system,
        };
        Ok(&mut backing[offset..offset + size])
    }

    /// Copy bytes out of emulated memory.
    pub fn read(&self, address: GpuAddr, dst: &mut [u8]) -> GpuResult<()> {
        dst.copy_from_slice(self.slice(address, dst.len())?);
        Ok(())
    }

    /// Copy bytes into emulated memory.
    pub fn write(&mut self, address: GpuAddr, src: &[u8]) -> GpuResult<()> {
        self.slice_mut(address, src.len())?.copy_from_slice(src);
        log::trace!("Memory: write 0x{:08X} ({} bytes)", address, src.len());
        Ok(())
    }

    pub fn read_u32(&self, address: GpuAddr) -> GpuResult<u32> {
        let b = self.slice(address, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn write_u32(&mut self, address: GpuAddr, value: u32) -> GpuResult<()> {
        self.write(address, &value.to_le_bytes())
    }

    /// Fill `size` bytes with a repeating pattern.
    pub fn fill(&mut self, address: GpuAddr, size: usize, pattern: &[u8]) -> GpuResult<()> {
        let dst = self.slice_mut(address, size)?;
        for chunk in dst.chunks_mut(pattern.len()) {
            chunk.copy_from_slice(&pattern[..chunk.len()]);
        }
        Ok(())
    }

    pub fn gpu_memory(&self) -> &[u8] {
        &self.gpu
    }

    pub fn gpu_memory_mut(&mut self) -> &mut [u8] {
        &mut self.gpu
    }

    pub fn system_memory(&self) -> &[u8] {
        &self.system
    }

    pub fn system_memory_mut(&mut self) -> &mut [u8] {
        &mut self.system
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn locate(&self, address: GpuAddr, size: usize) -> GpuResult<(MemorySpaceKind, usize)> {
        let space = Self::space_of(address);
        let limit = match space {
            MemorySpaceKind::Gpu => self.gpu.len(),
            MemorySpaceKind::System => self.system.len(),
            MemorySpaceKind::Unknown => 0,
        };
        let offset = (address & SPACE_OFFSET_MASK) as usize;
        if space == MemorySpaceKind::Unknown || offset + size > limit {
            return Err(FatalError::AddressOverflow {
                address: address as u64,
                size,
                space,
            });
        }
        Ok((space, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> MemorySpace {
        MemorySpace::with_sizes(0x1000, 0x800)
    }

    #[test]
    fn test_write_read_gpu() {
        let mut mem = small();
        mem.write(0x10, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        mem.read(0x10, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(mem.gpu_memory()[0x10], 1);
    }

    #[test]
    fn test_system_space_is_separate() {
        let mut mem = small();
        mem.write_u32(SYSTEM_ADDRESS_SPACE | 0x20, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_u32(SYSTEM_ADDRESS_SPACE | 0x20).unwrap(), 0xDEAD_BEEF);
        assert_eq!(mem.read_u32(0x20).unwrap(), 0);
        assert_eq!(mem.system_memory()[0x20], 0xEF);
    }

    #[test]
    fn test_overflow_is_fatal() {
        let mut mem = small();
        assert!(mem.write(0xFFE, &[0; 4]).is_err());
        assert!(mem.read_u32(SYSTEM_ADDRESS_SPACE | 0x7FE).is_err());
        // Exactly at the end is fine.
        assert!(mem.write(0xFFC, &[0; 4]).is_ok());
    }

    #[test]
    fn test_unknown_space_is_fatal() {
        let mem = small();
        assert!(matches!(
            mem.read_u32(0x4000_0000),
            Err(FatalError::AddressOverflow {
                space: MemorySpaceKind::Unknown,
                ..
            })
        ));
    }

    #[test]
    fn test_fill_pattern() {
        let mut mem = small();
        mem.fill(0x100, 10, &[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();
        assert_eq!(
            mem.slice(0x100, 10).unwrap(),
            &[0xAA, 0xBB, 0xCC, 0xDD, 0xAA, 0xBB, 0xCC, 0xDD, 0xAA, 0xBB]
        );
    }
}
