// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cache of decompressed texture blocks.
//!
//! Texel addresses in a compressed space address the *decompressed* data:
//! the memory address of the compressed block is the offset shifted right
//! by the compression ratio. There is no replacement policy; a miss with
//! the cache full flushes every block.

use std::collections::HashMap;

use cg1_common::{FatalError, GpuAddr, GpuResult, TexelAddr, TEXTURE_ADDRESS_SPACE_MASK};

use crate::decompress::{Decompressor, ALL_DECOMPRESSORS, BLOCK_TEXELS};
use crate::memory::MemorySpace;

pub struct CompressedTextureCache {
    decompressor: Decompressor,
    decompressed_block_size: usize,
    max_blocks: usize,
    block_mask: u64,
    ratio_shift: u32,
    data: Vec<u8>,
    /// Block base address to slot in `data`.
    blocks: HashMap<TexelAddr, usize>,
    hits: u64,
    misses: u64,
}

impl CompressedTextureCache {
    pub fn new(
        blocks: u32,
        decompressed_block_size: u32,
        block_mask: u64,
        ratio_shift: u32,
        decompressor: Decompressor,
    ) -> Self {
        let blocks = blocks.max(1) as usize;
        Self {
            decompressor,
            decompressed_block_size: decompressed_block_size as usize,
            max_blocks: blocks,
            block_mask,
            ratio_shift,
            data: vec![0u8; blocks * decompressed_block_size as usize],
            blocks: HashMap::with_capacity(blocks),
            hits: 0,
            misses: 0,
        }
    }

    /// Cache sized for one 4x4 block per entry of `decompressor`'s format.
    pub fn for_format(decompressor: Decompressor, blocks: u32) -> Self {
        let size = (BLOCK_TEXELS * decompressor.texel_bytes()) as u32;
        Self::new(blocks, size, !(size as u64 - 1), decompressor.ratio_shift(), decompressor)
    }

    pub fn decompressor(&self) -> Decompressor {
        self.decompressor
    }

    /// Copy `out.len()` decompressed bytes at `address`, decompressing the
    /// enclosing block from memory on a miss.
    pub fn read_data(&mut self, memory: &MemorySpace, address: TexelAddr, out: &mut [u8]) -> GpuResult<()> {
        let base = address & self.block_mask;
        let offset = (address & !self.block_mask) as usize;
        if offset + out.len() > self.decompressed_block_size {
            return Err(FatalError::Invariant(format!(
                "texel read of {} bytes at {:#018x} crosses a decompressed block",
                out.len(),
                address
            )));
        }

        let slot = match self.blocks.get(&base) {
            Some(&slot) => {
                self.hits += 1;
                slot
            }
            None => {
                self.misses += 1;
                if self.blocks.len() >= self.max_blocks {
                    log::trace!("TexelCache: {:?} full, flushing {} blocks", self.decompressor, self.blocks.len());
                    self.blocks.clear();
                }
                let slot = self.blocks.len();
                let compressed = self.decompressed_block_size >> self.ratio_shift;
                let mem_address = ((base & !TEXTURE_ADDRESS_SPACE_MASK) >> self.ratio_shift) as GpuAddr;
                let src = memory.slice(mem_address, compressed)?;
                let start = slot * self.decompressed_block_size;
                self.decompressor
                    .decode(src, &mut self.data[start..start + self.decompressed_block_size], compressed)?;
                self.blocks.insert(base, slot);
                slot
            }
        };

        let start = slot * self.decompressed_block_size + offset;
        out.copy_from_slice(&self.data[start..start + out.len()]);
        Ok(())
    }

    /// Drop every cached block.
    pub fn clear(&mut self) {
        if !self.blocks.is_empty() {
            log::trace!(
                "TexelCache: clearing {:?} ({} hits, {} misses)",
                self.decompressor,
                self.hits,
                self.misses
            );
        }
        self.blocks.clear();
    }

    pub fn cached_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// (hits, misses) since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

/// One cache per compressed texel address space.
pub struct CompressedCaches {
    caches: Vec<CompressedTextureCache>,
}

impl CompressedCaches {
    pub fn new(blocks: u32) -> Self {
        Self {
            caches: ALL_DECOMPRESSORS
                .iter()
                .map(|&d| CompressedTextureCache::for_format(d, blocks))
                .collect(),
        }
    }

    pub fn for_space(&mut self, space: u64) -> Option<&mut CompressedTextureCache> {
        self.caches.iter_mut().find(|c| c.decompressor().space() == space)
    }

    /// Read decompressed texel data from whichever cache serves `address`.
    pub fn read_data(&mut self, memory: &MemorySpace, address: TexelAddr, out: &mut [u8]) -> GpuResult<()> {
        let space = address & TEXTURE_ADDRESS_SPACE_MASK;
        match self.for_space(space) {
            Some(cache) => cache.read_data(memory, address, out),
            None => Err(FatalError::Invariant(format!("no texel cache for address {:#018x}", address))),
        }
    }

    pub fn clear(&mut self) {
        self.caches.iter_mut().for_each(CompressedTextureCache::clear);
    }
}
