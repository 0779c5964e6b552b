// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use cg1_common::settings::{AnisoAlgorithm, SimConfig};
use ini::{Ini, Properties};
use log::{debug, info, warn};
use std::path::Path;
use std::str::FromStr;

/// Load the simulator configuration from an INI file.
///
/// A missing or unreadable file leaves every parameter at its default.
pub fn load_config(path: Option<&Path>) -> SimConfig {
    let mut config = SimConfig::default();

    let Some(path) = path else {
        info!("No config file given, using defaults");
        return config;
    };
    if !path.exists() {
        warn!("Config file not found: {}", path.display());
        return config;
    }

    info!("Loading config from: {}", path.display());
    match Ini::load_from_file(path) {
        Ok(conf) => apply_ini(&conf, &mut config),
        Err(e) => warn!("Failed to parse config: {}", e),
    }
    config
}

/// Overwrite `config` with every key present in `conf`.
pub fn apply_ini(conf: &Ini, config: &mut SimConfig) {
    // [Memory]
    if let Some(section) = conf.section(Some("Memory")) {
        read_key(section, "Memory", "GPUMemorySize", &mut config.memory.gpu_memory_mb);
        read_key(section, "Memory", "MappedMemorySize", &mut config.memory.mapped_memory_mb);
    }

    // [Rasterizer]
    if let Some(section) = conf.section(Some("Rasterizer")) {
        let r = &mut config.raster;
        read_key(section, "Rasterizer", "StampWidth", &mut r.stamp_width);
        read_key(section, "Rasterizer", "StampHeight", &mut r.stamp_height);
        read_key(section, "Rasterizer", "GenTileWidth", &mut r.gen_tile_width);
        read_key(section, "Rasterizer", "GenTileHeight", &mut r.gen_tile_height);
        read_key(section, "Rasterizer", "ScanTileWidth", &mut r.scan_tile_width);
        read_key(section, "Rasterizer", "ScanTileHeight", &mut r.scan_tile_height);
        read_key(section, "Rasterizer", "OverScanWidth", &mut r.over_tile_width);
        read_key(section, "Rasterizer", "OverScanHeight", &mut r.over_tile_height);
        read_key(section, "Rasterizer", "SubPixelPrecision", &mut r.subpixel_bits);
        read_flag(section, "Rasterizer", "UseBBOptimization", &mut r.bounding_box_opt);
    }

    // [Texture]
    if let Some(section) = conf.section(Some("Texture")) {
        let t = &mut config.texture;
        read_key(section, "Texture", "TextureBlockDimension", &mut t.block_dim_log2);
        read_key(section, "Texture", "TextureSuperBlockDimension", &mut t.superblock_dim_log2);
        if let Some(algo) = section.get("AnisoAlgorithm") {
            t.aniso_algorithm = AnisoAlgorithm::from_str_or_default(algo);
            debug!("Aniso algorithm: {:?}", t.aniso_algorithm);
        }
        read_flag(section, "Texture", "ForceMaxAnisotropy", &mut t.force_max_anisotropy);
        read_key(section, "Texture", "MaxAnisotropy", &mut t.max_anisotropy);
        read_key(section, "Texture", "TrilinearPrecision", &mut t.trilinear_precision);
        read_key(section, "Texture", "BrilinearThreshold", &mut t.brilinear_threshold);
        read_key(section, "Texture", "AnisoRoundPrecision", &mut t.aniso_rounding_precision);
        read_key(section, "Texture", "AnisoRoundThreshold", &mut t.aniso_rounding_threshold);
        read_key(section, "Texture", "CompressedCacheBlocks", &mut t.compressed_cache_blocks);
    }

    // [Shader]
    if let Some(section) = conf.section(Some("Shader")) {
        let s = &mut config.shader;
        read_key(section, "Shader", "InstructionMemorySize", &mut s.instruction_memory_size);
        read_key(section, "Shader", "FXPDecBits", &mut s.fxp_dec_bits);
        read_key(section, "Shader", "VertexThreads", &mut s.vertex_threads);
        read_key(section, "Shader", "FragmentStamps", &mut s.fragment_stamps);
    }

    // [Simulation]
    if let Some(section) = conf.section(Some("Simulation")) {
        let s = &mut config.sim;
        read_key(section, "Simulation", "StartFrame", &mut s.start_frame);
        read_key(section, "Simulation", "SimFrames", &mut s.simulated_frames);
        read_flag(section, "Simulation", "SkipBatches", &mut s.skip_batches);
        read_flag(section, "Simulation", "Validation", &mut s.validation);
    }
}

fn read_key<T: FromStr + std::fmt::Debug>(section: &Properties, name: &str, key: &str, dst: &mut T) {
    let Some(value) = section.get(key) else {
        return;
    };
    match value.trim().parse() {
        Ok(v) => {
            *dst = v;
            debug!("[{}] {} = {:?}", name, key, dst);
        }
        Err(_) => warn!("[{}] {}: bad value {:?}, keeping {:?}", name, key, value, dst),
    }
}

fn read_flag(section: &Properties, name: &str, key: &str, dst: &mut bool) {
    let Some(value) = section.get(key) else {
        return;
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => *dst = true,
        "0" | "false" | "no" | "off" => *dst = false,
        _ => warn!("[{}] {}: bad flag {:?}, keeping {}", name, key, value, dst),
    }
}
