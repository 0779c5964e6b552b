// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Snapshot save and restore.
//!
//! Three files in one directory:
//! - `bm.registers.snapshot`: every `(register, sub)` slot in declaration
//!   order, 16 little-endian bytes each;
//! - `bm.gpumem.snapshot`: the GPU memory image;
//! - `bm.sysmem.snapshot`: the mapped memory image.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use cg1_common::{FatalError, GpuResult};

use crate::gpu_top::GpuTop;
use crate::regs::{all_register_slots, RegData};

pub const REGISTERS_FILE: &str = "bm.registers.snapshot";
pub const GPU_MEMORY_FILE: &str = "bm.gpumem.snapshot";
pub const SYSTEM_MEMORY_FILE: &str = "bm.sysmem.snapshot";

fn write_file(path: &Path, data: &[u8]) -> GpuResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(data)?;
    out.flush()?;
    log::debug!("Snapshot: wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}

/// Read a file that must hold exactly `dst.len()` bytes.
fn read_exact_file(path: &Path, dst: &mut [u8]) -> GpuResult<()> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size != dst.len() as u64 {
        return Err(FatalError::Invariant(format!(
            "{} holds {} bytes, expected {}",
            path.display(),
            size,
            dst.len()
        )));
    }
    file.read_exact(dst)?;
    Ok(())
}

impl GpuTop {
    pub fn save_snapshot(&self, dir: &Path) -> GpuResult<()> {
        let mut registers = Vec::new();
        for (reg, sub) in all_register_slots() {
            let data = self.state().read_register(reg, sub as u32)?;
            registers.extend_from_slice(&data.to_bytes());
        }
        write_file(&dir.join(REGISTERS_FILE), &registers)?;
        write_file(&dir.join(GPU_MEMORY_FILE), self.memory().gpu_memory())?;
        write_file(&dir.join(SYSTEM_MEMORY_FILE), self.memory().system_memory())?;
        log::info!("Snapshot: saved to {}", dir.display());
        Ok(())
    }

    /// Reset the register state, then restore registers and both memory
    /// images from `dir`.
    pub fn load_snapshot(&mut self, dir: &Path) -> GpuResult<()> {
        let slots: Vec<_> = all_register_slots().collect();
        let mut registers = vec![0u8; slots.len() * RegData::SIZE];
        read_exact_file(&dir.join(REGISTERS_FILE), &mut registers)?;

        self.state_mut().reset();
        for ((reg, sub), chunk) in slots.iter().zip(registers.chunks_exact(RegData::SIZE)) {
            let mut bytes = [0u8; RegData::SIZE];
            bytes.copy_from_slice(chunk);
            self.state_mut()
                .restore_register(*reg, *sub as u32, RegData::from_bytes(&bytes))?;
        }

        read_exact_file(&dir.join(GPU_MEMORY_FILE), self.memory_mut().gpu_memory_mut())?;
        read_exact_file(&dir.join(SYSTEM_MEMORY_FILE), self.memory_mut().system_memory_mut())?;
        log::info!("Snapshot: loaded from {}", dir.display());
        Ok(())
    }
}
