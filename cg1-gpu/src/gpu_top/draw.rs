// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Draw calls: vertex fetch and shading, triangle traversal and the
//! per-stamp shade, test and write path.

use cg1_common::{
    saturate, FatalError, GpuAddr, GpuResult, Vec4, COLOR_ATTRIBUTE, MAX_FRAGMENT_ATTRIBUTES, MAX_MSAA_SAMPLES,
    MAX_SHADER_OUTPUTS, MAX_VERTEX_ATTRIBUTES, POSITION_ATTRIBUTE, STAMP_FRAGMENTS, ST_INACTIVE_ATTRIBUTE,
};

use super::assembly::assemble;
use super::buffers::{byte_write_mask, decode_color, encode_color};
use super::streamer::{fetch_indices, read_attribute, stream_element};
use super::validation::FragmentQuadMemoryUpdate;
use super::GpuTop;
use crate::clipper::{trivial_reject, user_clip_reject};
use crate::math::{color_linear_to_srgb, color_srgb_to_linear};
use crate::rasterizer::{Attributes, Rasterizer, SetupTriangle, Stamp};
use crate::shader::ThreadState;
use crate::state::ColorFormat;
use crate::texture::TextureContext;

type Coverage = [[bool; MAX_MSAA_SAMPLES]; STAMP_FRAGMENTS];
type SampleDepths = [[u32; MAX_MSAA_SAMPLES]; STAMP_FRAGMENTS];

/// Depth written for a shader-exported z.
fn exported_depth(raster: &Rasterizer, z: f32) -> u32 {
    raster.convert_z((z as f64).clamp(0.0, 1.0))
}

/// Formats whose stored range is [0, 1].
fn is_unorm(format: ColorFormat) -> bool {
    matches!(format, ColorFormat::Rgba8888 | ColorFormat::Rgba16)
}

fn add_offset(base: GpuAddr, offset: u32) -> GpuResult<GpuAddr> {
    base.checked_add(offset)
        .ok_or_else(|| FatalError::Invariant(format!("pixel offset 0x{:X} from 0x{:08X} overflows", offset, base)))
}

impl GpuTop {
    // ── Draw ────────────────────────────────────────────────────────────────

    pub(super) fn draw(&mut self) -> GpuResult<()> {
        if self.skip_batch {
            log::debug!("GpuTop: skipping batch {}", self.batch);
            self.batch += 1;
            return Ok(());
        }
        if self.validation_mode {
            self.validation.clear();
        }

        self.update_mappers()?;
        let mut raster = self.rasterizer.clone();
        raster.configure(&self.state);
        self.fragment_ops.configure(&self.state);

        let indices = fetch_indices(&self.state, &self.memory)?;
        let triangles = assemble(self.state.primitive, indices.len())?;
        let instances = self.state.stream_instances.max(1);
        log::debug!(
            "GpuTop: draw {:?} with {} indices, {} triangles, {} instances",
            self.state.primitive,
            indices.len(),
            triangles.len(),
            instances
        );

        let early_z = if triangles.is_empty() {
            false
        } else {
            self.state.early_z
                && !self.state.modify_fragment_depth
                && !self.shader.program_kills(self.state.fragment_program_pc)?
        };

        for instance in 0..instances {
            self.vertex_cache.clear();
            for corners in &triangles {
                let vertices = [
                    self.get_vertex(indices[corners[0]], instance)?,
                    self.get_vertex(indices[corners[1]], instance)?,
                    self.get_vertex(indices[corners[2]], instance)?,
                ];
                self.rasterize_triangle(&raster, vertices, early_z)?;
            }
        }
        self.vertex_cache.clear();
        self.batch += 1;
        Ok(())
    }

    // ── Vertices ────────────────────────────────────────────────────────────

    /// Shaded outputs of vertex `index`, shading it only on first use within
    /// the current draw and instance.
    pub fn get_vertex(&mut self, index: u32, instance: u32) -> GpuResult<Attributes> {
        if let Some(cached) = self.vertex_cache.get(&index) {
            return Ok(*cached);
        }

        let mut thread = self.shader.new_thread();
        for attr in 0..MAX_VERTEX_ATTRIBUTES {
            let stream = self.state.vertex_attribute_map[attr];
            thread.input[attr] = if stream == ST_INACTIVE_ATTRIBUTE {
                self.state.vertex_attribute_default[attr]
            } else {
                let s = self
                    .state
                    .streams
                    .get(stream as usize)
                    .ok_or_else(|| FatalError::domain("VERTEX_ATTRIBUTE_MAP", stream))?;
                read_attribute(&self.memory, s, stream_element(s, index, instance))?
            };
        }
        if self.validation_mode {
            self.validation.vertex_inputs.insert((index, instance), thread.input);
        }

        let trace = self.trace.vertex_traced(self.batch, index);
        if trace {
            log::debug!("GpuTop: tracing vertex {} instance {}", index, instance);
        }
        let mut sampler = TextureContext {
            unit: &mut self.texture,
            state: &self.state,
            memory: &self.memory,
            caches: &mut self.caches,
            trace,
        };
        let run = self.shader.execute(
            self.state.vertex_program_pc,
            &self.state.vertex_constants,
            std::slice::from_mut(&mut thread),
            &mut sampler,
            trace,
        )?;
        self.stats.shader_instructions += run.instructions;
        self.stats.texture_requests += run.texture_requests;
        self.stats.vertices_shaded += 1;

        let mut outputs: Attributes = [[0.0; 4]; MAX_FRAGMENT_ATTRIBUTES];
        for (attr, out) in outputs.iter_mut().enumerate().take(MAX_SHADER_OUTPUTS) {
            if self.state.vertex_output_attribute[attr] {
                *out = thread.output[attr];
            }
        }
        if self.validation_mode {
            self.validation.shaded_vertices.insert((index, instance), outputs);
        }
        self.vertex_cache.insert(index, outputs);
        Ok(outputs)
    }

    // ── Triangles ───────────────────────────────────────────────────────────

    fn rasterize_triangle(&mut self, raster: &Rasterizer, vertices: [Attributes; 3], early_z: bool) -> GpuResult<()> {
        let id = self.triangles as u32;
        self.triangles += 1;

        let [p0, p1, p2] = [0, 1, 2].map(|v| vertices[v][POSITION_ATTRIBUTE]);
        if self.state.frustum_clipping && trivial_reject(p0, p1, p2, self.state.d3d9_depth_range) {
            log::trace!("GpuTop: triangle {} outside the frustum", id);
            self.stats.triangles_culled += 1;
            return Ok(());
        }
        if self.state.user_clip_planes && user_clip_reject(p0, p1, p2, &self.state.user_clip) {
            log::trace!("GpuTop: triangle {} outside a user clip plane", id);
            self.stats.triangles_culled += 1;
            return Ok(());
        }

        let mut triangle = raster.setup(vertices);
        if raster.cull(&mut triangle) {
            self.stats.triangles_culled += 1;
            return Ok(());
        }
        for stamp in raster.stamps(&triangle) {
            self.process_stamp(raster, &triangle, &stamp, id, early_z)?;
        }
        Ok(())
    }

    // ── Stamps ──────────────────────────────────────────────────────────────

    fn process_stamp(
        &mut self,
        raster: &Rasterizer,
        triangle: &SetupTriangle,
        stamp: &Stamp,
        id: u32,
        early_z: bool,
    ) -> GpuResult<()> {
        self.stats.stamps += 1;
        let mut cull = [false; STAMP_FRAGMENTS];
        let mut coverage: Coverage = [[false; MAX_MSAA_SAMPLES]; STAMP_FRAGMENTS];
        for (i, f) in stamp.fragments.iter().enumerate() {
            cull[i] = !f.inside || raster.outside_depth_range(f);
            coverage[i] = f.coverage;
        }
        if cull.iter().all(|&c| c) {
            return Ok(());
        }

        if early_z {
            let depths: SampleDepths = std::array::from_fn(|i| stamp.fragments[i].sample_z);
            self.z_stencil_stage(stamp, &depths, &mut cull, &mut coverage, id)?;
            if cull.iter().all(|&c| c) {
                return Ok(());
            }
        }

        let threads = self.shade_stamp(raster, triangle, stamp, &mut cull, &mut coverage)?;

        if !early_z {
            let depths: SampleDepths = std::array::from_fn(|i| {
                if self.state.modify_fragment_depth {
                    threads[i].z_export.map(|z| exported_depth(raster, z))
                } else {
                    stamp.fragments[i].sample_z
                }
            });
            self.z_stencil_stage(stamp, &depths, &mut cull, &mut coverage, id)?;
        }
        if cull.iter().all(|&c| c) {
            return Ok(());
        }

        for rt in 0..self.state.render_targets.len() {
            if self.state.render_targets[rt].enable {
                self.write_color(rt, stamp, &threads, &cull, &coverage, id)?;
            }
        }
        Ok(())
    }

    fn shade_stamp(
        &mut self,
        raster: &Rasterizer,
        triangle: &SetupTriangle,
        stamp: &Stamp,
        cull: &mut [bool; STAMP_FRAGMENTS],
        coverage: &mut Coverage,
    ) -> GpuResult<Vec<ThreadState>> {
        let mut threads: Vec<ThreadState> = (0..STAMP_FRAGMENTS).map(|_| self.shader.new_thread()).collect();
        for (thread, fragment) in threads.iter_mut().zip(stamp.fragments.iter()) {
            let inputs = raster.interpolate(triangle, fragment);
            for (attr, value) in inputs.iter().enumerate() {
                if attr == POSITION_ATTRIBUTE || self.state.fragment_input_attributes[attr] {
                    thread.input[attr] = *value;
                }
            }
        }

        let trace = self.trace.stamp_traced(self.batch, stamp.x, stamp.y);
        if trace {
            log::debug!("GpuTop: tracing stamp at ({}, {})", stamp.x, stamp.y);
        }
        let mut sampler = TextureContext {
            unit: &mut self.texture,
            state: &self.state,
            memory: &self.memory,
            caches: &mut self.caches,
            trace,
        };
        let run = self.shader.execute(
            self.state.fragment_program_pc,
            &self.state.fragment_constants,
            &mut threads,
            &mut sampler,
            trace,
        )?;
        self.stats.shader_instructions += run.instructions;
        self.stats.texture_requests += run.texture_requests;
        self.stats.fragments_shaded += cull.iter().filter(|&&c| !c).count() as u64;

        let samples = self.state.samples() as usize;
        for (i, thread) in threads.iter().enumerate() {
            if cull[i] {
                continue;
            }
            if thread.killed() {
                cull[i] = true;
            } else if self.state.multisampling {
                for s in 0..samples {
                    coverage[i][s] &= !thread.kill[s];
                }
                cull[i] = !coverage[i][..samples].iter().any(|&c| c);
            }
        }
        Ok(threads)
    }

    fn z_address(&self, x: i32, y: i32, sample: usize) -> GpuResult<GpuAddr> {
        let offset = self.mapper4.compute_address(x as u32, y as u32) + sample as u32 * 4;
        add_offset(self.state.zstencil_buffer_addr, offset)
    }

    /// Stencil and depth test every covered sample of the stamp, writing
    /// back the updated words and dropping failed samples.
    fn z_stencil_stage(
        &mut self,
        stamp: &Stamp,
        depths: &SampleDepths,
        cull: &mut [bool; STAMP_FRAGMENTS],
        coverage: &mut Coverage,
        id: u32,
    ) -> GpuResult<()> {
        if !self.fragment_ops.z_stencil_active() {
            return Ok(());
        }
        let samples = self.state.samples() as usize;
        let entries = STAMP_FRAGMENTS * samples;
        let mut addresses = Vec::with_capacity(entries);
        let mut stamp_z = Vec::with_capacity(entries);
        let mut buffer_zs = Vec::with_capacity(entries);
        let mut culled = Vec::with_capacity(entries);

        for (i, fragment) in stamp.fragments.iter().enumerate() {
            for s in 0..samples {
                let skip = cull[i] || !coverage[i][s];
                let (address, word) = if skip {
                    (None, 0)
                } else {
                    let address = self.z_address(fragment.x, fragment.y, s)?;
                    (Some(address), self.memory.read_u32(address)?)
                };
                addresses.push(address);
                stamp_z.push(depths[i][s]);
                buffer_zs.push(word);
                culled.push(skip);
            }
        }

        let (out_zs, out_cull) = self.fragment_ops.stencil_z_test(&stamp_z, &buffer_zs, &culled);
        for (address, &word) in addresses.iter().zip(out_zs.iter()) {
            if let Some(address) = address {
                self.memory.write_u32(*address, word)?;
            }
        }

        for i in 0..STAMP_FRAGMENTS {
            if cull[i] {
                continue;
            }
            for s in 0..samples {
                coverage[i][s] = !out_cull[i * samples + s];
            }
            cull[i] = !coverage[i][..samples].iter().any(|&c| c);
        }

        if self.validation_mode {
            let bytes = |words: &[u32]| words.iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<u8>>();
            let update = FragmentQuadMemoryUpdate {
                input_data: bytes(&stamp_z),
                read_data: bytes(&buffer_zs),
                write_data: bytes(&out_zs),
                write_mask: culled.iter().flat_map(|&c| [!c; 4]).collect(),
                cull_mask: *cull,
            };
            self.validation.z_stencil_updates.insert((id, stamp.x, stamp.y), update);
        }
        Ok(())
    }

    /// Blend and write the shader color of every surviving sample to one
    /// render target.
    fn write_color(
        &mut self,
        rt: usize,
        stamp: &Stamp,
        threads: &[ThreadState],
        cull: &[bool; STAMP_FRAGMENTS],
        coverage: &Coverage,
        id: u32,
    ) -> GpuResult<()> {
        let target = self.state.render_targets[rt];
        let format = target.format;
        let bytes = format.bytes_per_pixel() as usize;
        let samples = self.state.samples() as usize;
        let srgb = self.state.color_srgb_write && format == ColorFormat::Rgba8888;
        let logic_op = self.state.logical_operation && format == ColorFormat::Rgba8888;
        let mask = byte_write_mask(format, target.color_mask);
        let output = COLOR_ATTRIBUTE + rt;

        let mut update = FragmentQuadMemoryUpdate {
            cull_mask: *cull,
            ..Default::default()
        };
        let mut old = vec![0u8; bytes];
        let mut new = vec![0u8; bytes];
        let mut input = vec![0u8; bytes];

        for (i, fragment) in stamp.fragments.iter().enumerate() {
            let mut source: Vec4 = threads[i].output[output];
            if is_unorm(format) {
                source = saturate(source);
            }
            let base = if cull[i] {
                None
            } else {
                let offset = self.mapper(bytes as u32).compute_address(fragment.x as u32, fragment.y as u32);
                Some(add_offset(target.address, offset)?)
            };

            for s in 0..samples {
                let Some(base) = base.filter(|_| coverage[i][s]) else {
                    if self.validation_mode {
                        let zeros = vec![0u8; bytes];
                        update.input_data.extend_from_slice(&zeros);
                        update.read_data.extend_from_slice(&zeros);
                        update.write_data.extend_from_slice(&zeros);
                        update.write_mask.extend(std::iter::repeat(false).take(bytes));
                    }
                    continue;
                };
                let address = add_offset(base, (s * bytes) as u32)?;
                old.copy_from_slice(self.memory.slice(address, bytes)?);

                let mut dest = decode_color(format, &old);
                if srgb {
                    dest = color_srgb_to_linear(dest);
                }
                let mut color = if target.blend {
                    self.fragment_ops.blend(rt, source, dest)
                } else {
                    source
                };
                if srgb {
                    color = color_linear_to_srgb(color);
                }
                encode_color(format, color, &mut new);
                encode_color(format, if srgb { color_linear_to_srgb(source) } else { source }, &mut input);
                if logic_op {
                    let combined = self
                        .fragment_ops
                        .logic_op([new[0], new[1], new[2], new[3]], [old[0], old[1], old[2], old[3]]);
                    new.copy_from_slice(&combined);
                }
                for (k, byte) in new.iter_mut().enumerate() {
                    if !mask[k] {
                        *byte = old[k];
                    }
                }
                self.memory.write(address, &new)?;

                if self.validation_mode {
                    update.input_data.extend_from_slice(&input);
                    update.read_data.extend_from_slice(&old);
                    update.write_data.extend_from_slice(&new);
                    update.write_mask.extend_from_slice(&mask);
                }
            }
        }

        if self.validation_mode {
            self.validation.color_updates[rt].insert((id, stamp.x, stamp.y), update);
        }
        Ok(())
    }
}
