// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end draws through the command processor.

use cg1_common::settings::{MemoryConfig, SimConfig};
use cg1_common::{GpuAddr, Vec4};
use cg1_gpu::math::{color_linear_to_srgb, color_rgba32f_to_rgba8};
use cg1_gpu::metastream::{GpuCommand, QueueSource, Transaction};
use cg1_gpu::pixel_mapper::{texel2morton_address, PixelMapper};
use cg1_gpu::regs::{GpuRegister, RegData};
use cg1_gpu::shader::isa::assemble;
use cg1_gpu::shader::{Bank, InstructionBuilder, Opcode};
use cg1_gpu::state::{
    ColorFormat, CompareMode, CullingMode, LogicOpMode, PrimitiveMode, StreamData, TextureBlocking,
};
use cg1_gpu::{Cg1BehaviorModel, GpuBehaviorModel, GpuTop};

const COLOR_BUFFER: GpuAddr = 0x0000_0000;
const Z_BUFFER: GpuAddr = 0x0004_0000;
const VERTICES: GpuAddr = 0x0008_0000;
const INDICES: GpuAddr = 0x0008_8000;
const VERTEX_PROGRAM: GpuAddr = 0x0009_0000;
const FRAGMENT_PROGRAM: GpuAddr = 0x0009_1000;
const FRAGMENT_PC: u32 = 16;
const TEXTURE: GpuAddr = 0x000A_0000;

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];

fn config() -> SimConfig {
    SimConfig {
        memory: MemoryConfig {
            gpu_memory_mb: 1,
            mapped_memory_mb: 1,
        },
        ..Default::default()
    }
}

fn reg(reg: GpuRegister, sub: u32, data: RegData) -> Transaction {
    Transaction::reg(reg, sub, data)
}

fn command(command: GpuCommand) -> Transaction {
    Transaction::Command(command)
}

/// Counter-clockwise in normalized device coordinates, covers the window.
fn fullscreen() -> [Vec4; 3] {
    [[-1.0, -1.0, 0.0, 1.0], [3.0, -1.0, 0.0, 1.0], [-1.0, 3.0, 0.0, 1.0]]
}

fn vertex_bytes(vertices: &[Vec4]) -> Vec<u8> {
    vertices.iter().flatten().flat_map(|f| f.to_le_bytes()).collect()
}

/// 4x4 window, RGBA8888 back buffer, position-only stream, pass-through
/// vertex program and a fragment program writing constant 0.
fn setup(vertices: &[Vec4], fragment_color: Vec4) -> Vec<Transaction> {
    let fragment_program = assemble(&[InstructionBuilder::new(Opcode::MOV)
        .op(1, Bank::Param, 0)
        .result(Bank::Output, 1)
        .end()
        .build()]);
    setup_program(vertices, &fragment_program, &[fragment_color])
}

/// Like `setup`, with an arbitrary fragment program and constant bank.
fn setup_program(
    vertices: &[Vec4],
    fragment_program: &[u8],
    constants: &[Vec4],
) -> Vec<Transaction> {
    let vertex_program = assemble(&[InstructionBuilder::new(Opcode::MOV)
        .op(1, Bank::Input, 0)
        .result(Bank::Output, 0)
        .end()
        .build()]);

    let mut transactions = vec![
        command(GpuCommand::Reset),
        reg(GpuRegister::DisplayXRes, 0, RegData::from_u32(4)),
        reg(GpuRegister::DisplayYRes, 0, RegData::from_u32(4)),
        reg(GpuRegister::ViewportWidth, 0, RegData::from_u32(4)),
        reg(GpuRegister::ViewportHeight, 0, RegData::from_u32(4)),
        reg(GpuRegister::BackBufferAddr, 0, RegData::from_u32(COLOR_BUFFER)),
        reg(GpuRegister::ZStencilBufferAddr, 0, RegData::from_u32(Z_BUFFER)),
        reg(GpuRegister::ColorBufferClear, 0, RegData::from_vec4([1.0, 0.0, 0.0, 1.0])),
        Transaction::write(VERTICES, vertex_bytes(vertices)),
        reg(GpuRegister::VertexAttributeMap, 0, RegData::from_u32(0)),
        reg(GpuRegister::StreamAddress, 0, RegData::from_u32(VERTICES)),
        reg(GpuRegister::StreamStride, 0, RegData::from_u32(16)),
        reg(GpuRegister::StreamData, 0, RegData::from_u32(StreamData::Float32.raw())),
        reg(GpuRegister::StreamElements, 0, RegData::from_u32(4)),
        reg(GpuRegister::StreamStart, 0, RegData::from_u32(0)),
        reg(GpuRegister::StreamCount, 0, RegData::from_u32(vertices.len() as u32)),
        reg(GpuRegister::Primitive, 0, RegData::from_u32(PrimitiveMode::Triangle.raw())),
        Transaction::write(VERTEX_PROGRAM, vertex_program.clone()),
        reg(GpuRegister::VertexProgram, 0, RegData::from_u32(VERTEX_PROGRAM)),
        reg(GpuRegister::VertexProgramPc, 0, RegData::from_u32(0)),
        reg(GpuRegister::VertexProgramSize, 0, RegData::from_u32(vertex_program.len() as u32)),
        command(GpuCommand::LoadVertexProgram),
        Transaction::write(FRAGMENT_PROGRAM, fragment_program.to_vec()),
        reg(GpuRegister::FragmentProgram, 0, RegData::from_u32(FRAGMENT_PROGRAM)),
        reg(GpuRegister::FragmentProgramPc, 0, RegData::from_u32(FRAGMENT_PC)),
        reg(GpuRegister::FragmentProgramSize, 0, RegData::from_u32(fragment_program.len() as u32)),
        command(GpuCommand::LoadFragmentProgram),
    ];
    for (i, c) in constants.iter().enumerate() {
        transactions.push(reg(GpuRegister::FragmentConstant, i as u32, RegData::from_vec4(*c)));
    }
    transactions
}

fn multisampling(samples: u32) -> Vec<Transaction> {
    vec![
        reg(GpuRegister::Multisampling, 0, RegData::from_bool(true)),
        reg(GpuRegister::MsaaSamples, 0, RegData::from_u32(samples)),
    ]
}

/// Blit the whole 4x4 window into an RGBA8888 texture 4 texels wide.
fn blit_window(blocking: TextureBlocking) -> Vec<Transaction> {
    vec![
        reg(GpuRegister::BlitIniX, 0, RegData::from_u32(0)),
        reg(GpuRegister::BlitIniY, 0, RegData::from_u32(0)),
        reg(GpuRegister::BlitXOffset, 0, RegData::from_u32(0)),
        reg(GpuRegister::BlitYOffset, 0, RegData::from_u32(0)),
        reg(GpuRegister::BlitWidth, 0, RegData::from_u32(4)),
        reg(GpuRegister::BlitHeight, 0, RegData::from_u32(4)),
        reg(GpuRegister::BlitDstAddress, 0, RegData::from_u32(TEXTURE)),
        reg(GpuRegister::BlitDstTxWidth2, 0, RegData::from_u32(2)),
        reg(GpuRegister::BlitDstTxBlock, 0, RegData::from_u32(blocking.raw())),
        command(GpuCommand::Blit),
    ]
}

fn mapper(samples: u32, bytes: u32) -> PixelMapper {
    let mut m = PixelMapper::new(&config().raster);
    m.setup_display(4, 4, samples, bytes).unwrap();
    m
}

fn run(gpu: &mut GpuTop, transactions: Vec<Transaction>) {
    for t in transactions {
        gpu.emulate_command_processor(t).unwrap();
    }
}

fn draw_and_swap() -> Vec<Transaction> {
    vec![
        command(GpuCommand::ClearColorBuffer),
        command(GpuCommand::Draw),
        command(GpuCommand::SwapBuffers),
    ]
}

#[test]
fn test_fullscreen_triangle_over_clear_color() {
    let mut transactions = setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]);
    transactions.extend(draw_and_swap());

    let mut model = Cg1BehaviorModel::new(&config(), Vec::new());
    let summary = model.run_loop(&mut transactions.into_iter().collect::<QueueSource>()).unwrap();
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.triangles, 1);

    let (frame, image) = &model.sink()[0];
    assert_eq!(*frame, 0);
    assert_eq!((image.width(), image.height()), (4, 4));
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(image.pixel(x, y), GREEN, "pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn test_partial_triangle_leaves_clear_color() {
    let vertices = [[-1.0, -1.0, 0.0, 1.0], [1.0, -1.0, 0.0, 1.0], [-1.0, 0.9, 0.0, 1.0]];
    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, setup(&vertices, [0.0, 1.0, 0.0, 1.0]));
    run(&mut gpu, draw_and_swap());

    let image = gpu.take_frame().unwrap();
    let covered = [(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (2, 0)];
    for y in 0..4u32 {
        for x in 0..4u32 {
            // Window y grows upwards, image rows downwards.
            let expected = if covered.contains(&(x, y)) { GREEN } else { RED };
            assert_eq!(image.pixel(x, 3 - y), expected, "pixel ({}, {})", x, y);
        }
    }
    assert_eq!(gpu.stats().fragments_shaded, 6);
}

#[test]
fn test_back_face_culled_and_none_keeps_it() {
    let mut clockwise = fullscreen();
    clockwise.swap(1, 2);

    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, setup(&clockwise, [0.0, 1.0, 0.0, 1.0]));
    run(&mut gpu, draw_and_swap());
    assert_eq!(gpu.stats().fragments_shaded, 0);
    assert_eq!(gpu.stats().triangles_culled, 1);
    assert_eq!(gpu.take_frame().unwrap().pixel(1, 1), RED);

    run(
        &mut gpu,
        vec![reg(GpuRegister::Culling, 0, RegData::from_u32(CullingMode::None.raw()))],
    );
    run(&mut gpu, draw_and_swap());
    assert_eq!(gpu.stats().fragments_shaded, 16);
    assert_eq!(gpu.take_frame().unwrap().pixel(1, 1), GREEN);
    assert_eq!(gpu.get_counters(), (2, 0, 2));
}

#[test]
fn test_vertex_shaded_once_per_draw() {
    // Two triangles sharing every vertex through an index buffer.
    let indices: Vec<u8> = [0u16, 1, 2, 0, 1, 2].iter().flat_map(|i| i.to_le_bytes()).collect();
    let mut transactions = setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]);
    transactions.extend([
        Transaction::write(INDICES, indices),
        reg(GpuRegister::IndexMode, 0, RegData::from_bool(true)),
        reg(GpuRegister::IndexStream, 0, RegData::from_u32(1)),
        reg(GpuRegister::StreamAddress, 1, RegData::from_u32(INDICES)),
        reg(GpuRegister::StreamData, 1, RegData::from_u32(StreamData::Uint16.raw())),
        reg(GpuRegister::StreamCount, 0, RegData::from_u32(6)),
        command(GpuCommand::Draw),
    ]);

    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, transactions);
    assert_eq!(gpu.stats().vertices_shaded, 3);
    assert_eq!(gpu.get_counters().2, 2);

    let first = gpu.get_vertex(1, 0).unwrap();
    let again = gpu.get_vertex(1, 0).unwrap();
    assert_eq!(first, again);
    assert_eq!(first[0], [3.0, -1.0, 0.0, 1.0]);
    assert_eq!(gpu.stats().vertices_shaded, 4);
}

#[test]
fn test_depth_test_rejects_and_writes() {
    let mut transactions = setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]);
    transactions.extend([
        reg(GpuRegister::DepthTest, 0, RegData::from_bool(true)),
        reg(GpuRegister::DepthFunction, 0, RegData::from_u32(CompareMode::Less.raw())),
        reg(GpuRegister::ZBufferClear, 0, RegData::from_u32(0)),
        command(GpuCommand::ClearZStencilBuffer),
    ]);
    transactions.extend(draw_and_swap());

    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, transactions);
    assert_eq!(gpu.take_frame().unwrap().pixel(0, 0), RED);

    // z = 0 maps to the middle of the default depth range.
    run(
        &mut gpu,
        vec![
            reg(GpuRegister::ZBufferClear, 0, RegData::from_u32(0x00FF_FFFF)),
            command(GpuCommand::ClearZStencilBuffer),
        ],
    );
    run(&mut gpu, draw_and_swap());
    assert_eq!(gpu.take_frame().unwrap().pixel(0, 0), GREEN);
    assert_eq!(gpu.memory().read_u32(Z_BUFFER).unwrap(), 0x007F_FFFF);
}

#[test]
fn test_validation_log_records_draw() {
    let mut gpu = GpuTop::new(&config());
    gpu.set_validation_mode(true);
    run(&mut gpu, setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]));
    run(&mut gpu, draw_and_swap());

    let log = gpu.validation();
    assert_eq!(log.vertex_inputs.len(), 3);
    assert_eq!(log.shaded_vertices[&(2, 0)][0], [-1.0, 3.0, 0.0, 1.0]);
    assert_eq!(log.color_updates[0].len(), 4);
    for update in log.color_updates[0].values() {
        assert_eq!(update.cull_mask, [false; 4]);
        assert_eq!(update.read_data, RED.repeat(4));
        assert_eq!(update.write_data, GREEN.repeat(4));
        assert!(update.write_mask.iter().all(|&m| m));
    }
    assert!(log.z_stencil_updates.is_empty());
}

#[test]
fn test_skip_batch_counts_without_rendering() {
    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]));
    gpu.set_skip_batch(true);
    run(&mut gpu, vec![command(GpuCommand::ClearColorBuffer), command(GpuCommand::Draw)]);
    assert_eq!(gpu.get_counters(), (0, 1, 0));
    assert_eq!(gpu.stats().vertices_shaded, 0);
    assert_eq!(gpu.memory().slice(COLOR_BUFFER, 4).unwrap(), &RED);
}

#[test]
fn test_msaa_fullscreen_resolves_to_shader_color() {
    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]));
    run(&mut gpu, multisampling(4));
    run(&mut gpu, draw_and_swap());

    let image = gpu.take_frame().unwrap();
    let m = mapper(4, 4);
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(image.pixel(x, y), GREEN, "pixel ({}, {})", x, y);
            let address = COLOR_BUFFER + m.compute_address(x, y);
            assert_eq!(gpu.memory().slice(address, 16).unwrap(), GREEN.repeat(4).as_slice());
        }
    }
}

#[test]
fn test_kill_sample_clears_coverage_and_resolve_averages() {
    // Samples 1 and 3 are killed; 0 and 2 keep the shader color.
    let kill_sample = |sample| {
        InstructionBuilder::new(Opcode::KLS)
            .op(1, Bank::Param, 1)
            .op(2, Bank::Param, sample)
            .build()
    };
    let program = assemble(&[
        kill_sample(1),
        kill_sample(3),
        InstructionBuilder::new(Opcode::MOV)
            .op(1, Bank::Param, 0)
            .result(Bank::Output, 1)
            .end()
            .build(),
    ]);
    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, setup_program(&fullscreen(), &program, &[[0.0, 1.0, 0.0, 1.0], [-1.0; 4]]));
    run(&mut gpu, multisampling(4));
    run(&mut gpu, vec![command(GpuCommand::ClearColorBuffer), command(GpuCommand::Draw)]);

    let m = mapper(4, 4);
    let mut samples = Vec::new();
    for color in [GREEN, RED, GREEN, RED] {
        samples.extend_from_slice(&color);
    }
    for (x, y) in [(0, 0), (3, 1), (2, 3)] {
        let address = COLOR_BUFFER + m.compute_address(x, y);
        let stored = gpu.memory().slice(address, 16).unwrap();
        assert_eq!(stored, samples.as_slice(), "pixel ({}, {})", x, y);
    }
    assert_eq!(gpu.stats().fragments_shaded, 16);

    let mut averaged = [0u8; 4];
    color_rgba32f_to_rgba8([0.5, 0.5, 0.0, 1.0], &mut averaged);

    // Blit averages the samples into one texel.
    run(&mut gpu, blit_window(TextureBlocking::Framebuffer));
    let texture = mapper(1, 4);
    assert_eq!(gpu.memory().slice(TEXTURE + texture.compute_address(1, 2), 4).unwrap(), &averaged);

    run(&mut gpu, vec![command(GpuCommand::SwapBuffers)]);
    let image = gpu.take_frame().unwrap();
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(image.pixel(x, y), averaged, "pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn test_logic_op_xor_over_clear_color() {
    let mut transactions = setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]);
    transactions.extend([
        reg(GpuRegister::LogicalOperation, 0, RegData::from_bool(true)),
        reg(GpuRegister::LogicOpFunction, 0, RegData::from_u32(LogicOpMode::Xor.raw())),
    ]);
    transactions.extend(draw_and_swap());

    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, transactions);
    assert_eq!(gpu.memory().slice(COLOR_BUFFER, 4).unwrap(), &[255u8, 255, 0, 0]);
    assert_eq!(gpu.take_frame().unwrap().pixel(2, 2), [255, 255, 0, 0]);
}

#[test]
fn test_logic_op_ignored_for_rgba16_target() {
    let mut transactions = setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]);
    transactions.extend([
        reg(GpuRegister::RenderTargetFormat, 0, RegData::from_u32(ColorFormat::Rgba16.raw())),
        reg(GpuRegister::LogicalOperation, 0, RegData::from_bool(true)),
        reg(GpuRegister::LogicOpFunction, 0, RegData::from_u32(LogicOpMode::Xor.raw())),
    ]);
    transactions.extend(draw_and_swap());

    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, transactions);
    let stored = gpu.memory().slice(COLOR_BUFFER, 8).unwrap();
    assert_eq!(stored, &[0u8, 0, 0xFF, 0xFF, 0, 0, 0xFF, 0xFF]);
    assert_eq!(gpu.take_frame().unwrap().pixel(2, 2), GREEN);
}

#[test]
fn test_color_mask_keeps_masked_channel() {
    let mut transactions = setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]);
    transactions.push(reg(GpuRegister::ColorMaskR, 0, RegData::from_bool(false)));
    transactions.extend(draw_and_swap());

    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, transactions);
    assert_eq!(gpu.take_frame().unwrap().pixel(1, 3), [255, 255, 0, 255]);
}

#[test]
fn test_srgb_write_encodes_shader_color() {
    let color = [0.5, 0.25, 0.0, 1.0];
    let mut transactions = setup(&fullscreen(), color);
    transactions.push(reg(GpuRegister::ColorSrgbWrite, 0, RegData::from_bool(true)));
    transactions.extend(draw_and_swap());

    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, transactions);

    let mut expected = [0u8; 4];
    color_rgba32f_to_rgba8(color_linear_to_srgb(color), &mut expected);
    assert!(expected[0] > 128);
    assert_eq!(gpu.memory().slice(COLOR_BUFFER, 4).unwrap(), &expected);
    assert_eq!(gpu.take_frame().unwrap().pixel(0, 0), expected);
}

#[test]
fn test_exported_depth_replaces_interpolated_depth() {
    let program = assemble(&[
        InstructionBuilder::new(Opcode::ZXP).op(1, Bank::Param, 1).build(),
        InstructionBuilder::new(Opcode::MOV)
            .op(1, Bank::Param, 0)
            .result(Bank::Output, 1)
            .end()
            .build(),
    ]);
    let constants = [[0.0, 1.0, 0.0, 1.0], [0.25; 4]];
    let mut transactions = setup_program(&fullscreen(), &program, &constants);
    transactions.extend([
        reg(GpuRegister::ModifyFragmentDepth, 0, RegData::from_bool(true)),
        reg(GpuRegister::DepthTest, 0, RegData::from_bool(true)),
        reg(GpuRegister::DepthFunction, 0, RegData::from_u32(CompareMode::Always.raw())),
        reg(GpuRegister::ZBufferClear, 0, RegData::from_u32(0)),
        command(GpuCommand::ClearZStencilBuffer),
    ]);
    transactions.extend(draw_and_swap());

    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, transactions);
    assert_eq!(gpu.take_frame().unwrap().pixel(0, 0), GREEN);

    // Interpolated z would store 0x7FFFFF; the export stores a quarter.
    let m = mapper(1, 4);
    for y in 0..4 {
        for x in 0..4 {
            let z = gpu.memory().read_u32(Z_BUFFER + m.compute_address(x, y)).unwrap();
            assert_eq!(z, 0x003F_FFFF, "pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn test_blit_to_morton_texture() {
    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]));

    // A distinct color per pixel, written straight into the back buffer.
    let m = mapper(1, 4);
    for y in 0..4u32 {
        for x in 0..4u32 {
            let texel = [x as u8 * 16, y as u8 * 16, 7, 255];
            gpu.memory_mut().write(COLOR_BUFFER + m.compute_address(x, y), &texel).unwrap();
        }
    }
    run(&mut gpu, blit_window(TextureBlocking::Texture));

    let texture = config().texture;
    let morton = |i, j| {
        texel2morton_address(i, j, texture.block_dim_log2, texture.superblock_dim_log2, 2)
    };
    assert_eq!(morton(1, 0), 1);
    assert_eq!(morton(0, 1), 2);
    assert_eq!(morton(2, 0), 4);
    for j in 0..4u32 {
        for i in 0..4u32 {
            let offset = morton(i, j);
            let address = TEXTURE + offset as u32 * 4;
            let expected = [i as u8 * 16, j as u8 * 16, 7, 255];
            assert_eq!(gpu.memory().slice(address, 4).unwrap(), &expected, "texel ({}, {})", i, j);
        }
    }
}

#[test]
fn test_blit_to_framebuffer_layout() {
    let mut gpu = GpuTop::new(&config());
    run(&mut gpu, setup(&fullscreen(), [0.0, 1.0, 0.0, 1.0]));
    run(&mut gpu, vec![command(GpuCommand::ClearColorBuffer), command(GpuCommand::Draw)]);
    run(&mut gpu, blit_window(TextureBlocking::Framebuffer));

    let texture = mapper(1, 4);
    for j in 0..4 {
        for i in 0..4 {
            let address = TEXTURE + texture.compute_address(i, j);
            assert_eq!(gpu.memory().slice(address, 4).unwrap(), &GREEN, "texel ({}, {})", i, j);
        }
    }
}
