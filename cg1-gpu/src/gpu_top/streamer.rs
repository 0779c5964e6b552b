// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Vertex stream and index fetch.
//!
//! Streams are read straight from the memory space. Missing components
//! default to `(0, 0, 0, 1)`; normalized formats divide by the largest
//! magnitude of their type.

use half::f16;

use cg1_common::{FatalError, GpuAddr, GpuResult, Vec4};

use crate::memory::MemorySpace;
use crate::state::{GpuState, StreamData, StreamState};

const DEFAULT_ATTRIBUTE: Vec4 = [0.0, 0.0, 0.0, 1.0];

fn element_address(stream: &StreamState, element: u32) -> GpuResult<GpuAddr> {
    let offset = element as u64 * stream.stride as u64;
    let address = stream.address as u64 + offset;
    u32::try_from(address).map_err(|_| {
        FatalError::Invariant(format!(
            "stream element {} at 0x{:08X} + {} overflows the bus",
            element, stream.address, offset
        ))
    })
}

/// Convert one stream component to float.
fn convert_component(data: StreamData, bytes: &[u8]) -> f32 {
    let u16_at = || u16::from_le_bytes([bytes[0], bytes[1]]);
    let u32_at = || u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    match data {
        StreamData::Unorm8 => bytes[0] as f32 / u8::MAX as f32,
        StreamData::Snorm8 => (bytes[0] as i8 as f32 / i8::MAX as f32).max(-1.0),
        StreamData::Unorm16 => u16_at() as f32 / u16::MAX as f32,
        StreamData::Snorm16 => (u16_at() as i16 as f32 / i16::MAX as f32).max(-1.0),
        StreamData::Unorm32 => (u32_at() as f64 / u32::MAX as f64) as f32,
        StreamData::Snorm32 => ((u32_at() as i32 as f64 / i32::MAX as f64) as f32).max(-1.0),
        StreamData::Float16 => f16::from_bits(u16_at()).to_f32(),
        StreamData::Float32 => f32::from_bits(u32_at()),
        StreamData::Uint8 => bytes[0] as f32,
        StreamData::Sint8 => bytes[0] as i8 as f32,
        StreamData::Uint16 => u16_at() as f32,
        StreamData::Sint16 => u16_at() as i16 as f32,
        StreamData::Uint32 => u32_at() as f32,
        StreamData::Sint32 => u32_at() as i32 as f32,
    }
}

/// Read and convert element `element` of a vertex stream.
pub fn read_attribute(memory: &MemorySpace, stream: &StreamState, element: u32) -> GpuResult<Vec4> {
    let mut value = DEFAULT_ATTRIBUTE;
    if stream.elements == 0 {
        return Ok(value);
    }

    let size = stream.data.size() as usize;
    let count = stream.elements.min(4) as usize;
    let address = element_address(stream, element)?;
    let bytes = memory.slice(address, size * count)?;
    for (c, chunk) in bytes.chunks_exact(size).enumerate() {
        value[c] = convert_component(stream.data, chunk);
    }

    if stream.d3d9_color {
        value.swap(0, 2);
    }
    Ok(value)
}

/// Element of a stream read for `index` within `instance`.
pub fn stream_element(stream: &StreamState, index: u32, instance: u32) -> u32 {
    if stream.frequency > 0 {
        instance / stream.frequency
    } else {
        index
    }
}

/// Resolve the vertex indices of the current draw.
///
/// Without index mode the indices are `start..start + count`. With it they
/// are read from the index stream, which must hold unsigned 8, 16 or 32 bit
/// values.
pub fn fetch_indices(state: &GpuState, memory: &MemorySpace) -> GpuResult<Vec<u32>> {
    let start = state.stream_start;
    let count = state.stream_count;
    if !state.index_mode {
        return Ok((start..start.saturating_add(count)).collect());
    }

    let stream = &state.streams[state.index_stream as usize];
    let size = match stream.data {
        StreamData::Uint8 => 1,
        StreamData::Uint16 => 2,
        StreamData::Uint32 => 4,
        other => return Err(FatalError::unsupported("index stream data", other.raw())),
    };
    if count == 0 {
        return Ok(Vec::new());
    }

    let address = stream
        .address
        .checked_add(start.saturating_mul(size))
        .ok_or_else(|| FatalError::Invariant(format!("index stream start {} overflows the bus", start)))?;
    let bytes = memory.slice(address, (count as usize) * (size as usize))?;
    let indices = parse_indices(bytes, size);
    log::trace!("Streamer: {} indices from 0x{:08X} ({} bytes each)", indices.len(), address, size);
    Ok(indices)
}

/// Parse raw little-endian index data.
fn parse_indices(data: &[u8], size: u32) -> Vec<u32> {
    match size {
        1 => data.iter().map(|&b| b as u32).collect(),
        2 => data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
            .collect(),
        _ => data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> MemorySpace {
        MemorySpace::with_sizes(0x10000, 0x1000)
    }

    fn stream(data: StreamData, elements: u32, stride: u32) -> StreamState {
        StreamState {
            address: 0x100,
            stride,
            data,
            elements,
            ..Default::default()
        }
    }

    #[test]
    fn test_float_stream_fills_missing_components() {
        let mut mem = memory();
        let floats: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        mem.write(0x100, &floats).unwrap();
        let s = stream(StreamData::Float32, 3, 12);
        assert_eq!(read_attribute(&mem, &s, 0).unwrap(), [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(read_attribute(&mem, &s, 1).unwrap(), [4.0, 5.0, 6.0, 1.0]);

        let two = stream(StreamData::Float32, 2, 8);
        assert_eq!(read_attribute(&mem, &two, 0).unwrap(), [1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_disabled_stream_reads_default() {
        let mem = memory();
        let s = stream(StreamData::Float32, 0, 16);
        assert_eq!(read_attribute(&mem, &s, 1000).unwrap(), DEFAULT_ATTRIBUTE);
    }

    #[test]
    fn test_normalized_formats() {
        let mut mem = memory();
        mem.write(0x100, &[255, 0, 128, 51]).unwrap();
        let c = read_attribute(&mem, &stream(StreamData::Unorm8, 4, 4), 0).unwrap();
        assert_eq!(c[0], 1.0);
        assert_eq!(c[1], 0.0);
        assert!((c[2] - 128.0 / 255.0).abs() < 1e-6);
        assert!((c[3] - 0.2).abs() < 1e-6);

        // -128 clamps to -1.
        mem.write(0x100, &[0x80, 0x7F]).unwrap();
        let s = read_attribute(&mem, &stream(StreamData::Snorm8, 2, 2), 0).unwrap();
        assert_eq!(s, [-1.0, 1.0, 0.0, 1.0]);

        mem.write(0x100, &0xFFFFu16.to_le_bytes()).unwrap();
        let u = read_attribute(&mem, &stream(StreamData::Unorm16, 1, 2), 0).unwrap();
        assert_eq!(u[0], 1.0);
    }

    #[test]
    fn test_integer_and_half_formats() {
        let mut mem = memory();
        mem.write(0x100, &(-3i16).to_le_bytes()).unwrap();
        assert_eq!(read_attribute(&mem, &stream(StreamData::Sint16, 1, 2), 0).unwrap()[0], -3.0);

        mem.write(0x100, &f16::from_f32(0.5).to_bits().to_le_bytes()).unwrap();
        assert_eq!(read_attribute(&mem, &stream(StreamData::Float16, 1, 2), 0).unwrap()[0], 0.5);

        mem.write(0x100, &70000u32.to_le_bytes()).unwrap();
        assert_eq!(read_attribute(&mem, &stream(StreamData::Uint32, 1, 4), 0).unwrap()[0], 70000.0);
    }

    #[test]
    fn test_d3d9_color_swaps_red_and_blue() {
        let mut mem = memory();
        mem.write(0x100, &[0, 0, 255, 255]).unwrap();
        let mut s = stream(StreamData::Unorm8, 4, 4);
        s.d3d9_color = true;
        assert_eq!(read_attribute(&mem, &s, 0).unwrap(), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_out_of_memory_read_is_fatal() {
        let mem = memory();
        let mut s = stream(StreamData::Float32, 4, 16);
        s.address = 0xFFF0;
        assert!(matches!(
            read_attribute(&mem, &s, 1),
            Err(FatalError::AddressOverflow { .. })
        ));
    }

    #[test]
    fn test_instance_frequency() {
        let mut s = stream(StreamData::Float32, 4, 16);
        assert_eq!(stream_element(&s, 7, 5), 7);
        s.frequency = 2;
        assert_eq!(stream_element(&s, 7, 5), 2);
    }

    #[test]
    fn test_direct_and_indexed_fetch() {
        let mut mem = memory();
        let mut state = GpuState::new();
        state.stream_start = 4;
        state.stream_count = 3;
        assert_eq!(fetch_indices(&state, &mem).unwrap(), vec![4, 5, 6]);

        state.index_mode = true;
        state.index_stream = 2;
        state.streams[2] = StreamState {
            address: 0x200,
            data: StreamData::Uint16,
            ..Default::default()
        };
        state.stream_start = 1;
        let words: Vec<u8> = [9u16, 8, 7, 6].iter().flat_map(|v| v.to_le_bytes()).collect();
        mem.write(0x200, &words).unwrap();
        assert_eq!(fetch_indices(&state, &mem).unwrap(), vec![8, 7, 6]);

        state.streams[2].data = StreamData::Uint8;
        assert_eq!(fetch_indices(&state, &mem).unwrap(), vec![0, 8, 0]);

        state.streams[2].data = StreamData::Float32;
        assert!(matches!(
            fetch_indices(&state, &mem),
            Err(FatalError::UnsupportedEnum { .. })
        ));
    }
}
