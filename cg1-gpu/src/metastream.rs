// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! MetaStream transactions and trace sources.
//!
//! A trace file is a flat sequence of little-endian records. Each record
//! starts with a `u32` transaction type followed by a type-specific payload:
//!
//! | type | payload |
//! |------|---------|
//! | WRITE / PRELOAD | address, md, locked (u8), size, data |
//! | READ | address, size |
//! | REG_WRITE | register, sub, RegData (16 bytes), md |
//! | REG_READ | register, sub |
//! | COMMAND | command |
//! | INIT_END | (none) |
//! | EVENT | event, length, message |

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use cg1_common::{FatalError, GpuAddr, GpuResult};

use crate::regs::{GpuRegister, RegData};

// ── Transaction types ───────────────────────────────────────────────────────

const MT_WRITE: u32 = 0;
const MT_READ: u32 = 1;
const MT_PRELOAD: u32 = 2;
const MT_REG_WRITE: u32 = 3;
const MT_REG_READ: u32 = 4;
const MT_COMMAND: u32 = 5;
const MT_INIT_END: u32 = 6;
const MT_EVENT: u32 = 7;

/// Control commands for the command processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GpuCommand {
    Reset = 0,
    Draw = 1,
    SwapBuffers = 2,
    DumpColor = 3,
    DumpDepth = 4,
    DumpStencil = 5,
    Blit = 6,
    ClearBuffers = 7,
    ClearZBuffer = 8,
    ClearZStencilBuffer = 9,
    ClearColorBuffer = 10,
    LoadVertexProgram = 11,
    LoadFragmentProgram = 12,
    LoadShaderProgram = 13,
    FlushZStencil = 14,
    FlushColor = 15,
    SaveColorState = 16,
    RestoreColorState = 17,
    SaveZStencilState = 18,
    RestoreZStencilState = 19,
    ResetColorState = 20,
    ResetZStencilState = 21,
}

impl GpuCommand {
    pub fn from_raw(value: u32) -> GpuResult<Self> {
        Ok(match value {
            0 => Self::Reset,
            1 => Self::Draw,
            2 => Self::SwapBuffers,
            3 => Self::DumpColor,
            4 => Self::DumpDepth,
            5 => Self::DumpStencil,
            6 => Self::Blit,
            7 => Self::ClearBuffers,
            8 => Self::ClearZBuffer,
            9 => Self::ClearZStencilBuffer,
            10 => Self::ClearColorBuffer,
            11 => Self::LoadVertexProgram,
            12 => Self::LoadFragmentProgram,
            13 => Self::LoadShaderProgram,
            14 => Self::FlushZStencil,
            15 => Self::FlushColor,
            16 => Self::SaveColorState,
            17 => Self::RestoreColorState,
            18 => Self::SaveZStencilState,
            19 => Self::RestoreZStencilState,
            20 => Self::ResetColorState,
            21 => Self::ResetZStencilState,
            _ => return Err(FatalError::MalformedTrace(format!("unknown command {value}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GpuEvent {
    Unnamed = 0,
    EndOfFrame = 1,
}

impl GpuEvent {
    pub fn from_raw(value: u32) -> GpuResult<Self> {
        match value {
            0 => Ok(Self::Unnamed),
            1 => Ok(Self::EndOfFrame),
            _ => Err(FatalError::MalformedTrace(format!("unknown event {value}"))),
        }
    }
}

/// One unit of driver-to-GPU communication.
#[derive(Debug, Clone, PartialEq)]
pub enum Transaction {
    /// Memory write (`preload` marks data loaded outside the timed region).
    Write {
        address: GpuAddr,
        data: Vec<u8>,
        md: u32,
        locked: bool,
        preload: bool,
    },
    /// Copy of GPU memory back to the driver.
    Read { address: GpuAddr, size: u32 },
    RegWrite {
        reg: GpuRegister,
        sub: u32,
        data: RegData,
        md: u32,
    },
    RegRead { reg: GpuRegister, sub: u32 },
    Command(GpuCommand),
    InitEnd,
    Event { event: GpuEvent, message: String },
}

impl Transaction {
    /// Shorthand for a register write with no memory descriptor.
    pub fn reg(reg: GpuRegister, sub: u32, data: RegData) -> Self {
        Self::RegWrite { reg, sub, data, md: 0 }
    }

    /// Shorthand for a plain memory write.
    pub fn write(address: GpuAddr, data: Vec<u8>) -> Self {
        Self::Write {
            address,
            data,
            md: 0,
            locked: false,
            preload: false,
        }
    }
}

// ── Sources ─────────────────────────────────────────────────────────────────

/// Producer of transactions. `None` marks the end of the trace.
pub trait TraceSource {
    fn next_transaction(&mut self) -> GpuResult<Option<Transaction>>;
}

/// In-memory queue of transactions.
#[derive(Debug, Default)]
pub struct QueueSource {
    queue: VecDeque<Transaction>,
}

impl QueueSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transaction: Transaction) {
        self.queue.push_back(transaction);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl FromIterator<Transaction> for QueueSource {
    fn from_iter<I: IntoIterator<Item = Transaction>>(iter: I) -> Self {
        Self {
            queue: iter.into_iter().collect(),
        }
    }
}

impl TraceSource for QueueSource {
    fn next_transaction(&mut self) -> GpuResult<Option<Transaction>> {
        Ok(self.queue.pop_front())
    }
}

/// Reads transactions from a MetaStream trace.
pub struct TraceReader<R: Read> {
    reader: R,
    records: u64,
}

impl TraceReader<BufReader<File>> {
    pub fn open(path: &Path) -> GpuResult<Self> {
        let file = File::open(path)?;
        log::info!("MetaStream: reading trace {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, records: 0 }
    }

    /// Records decoded so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    fn truncated(&self, err: io::Error) -> FatalError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FatalError::MalformedTrace(format!("record {} is truncated", self.records))
        } else {
            FatalError::Io(err)
        }
    }

    fn read_record(&mut self, kind: u32) -> io::Result<GpuResult<Transaction>> {
        let r = &mut self.reader;
        let transaction = match kind {
            MT_WRITE | MT_PRELOAD => {
                let address = r.read_u32::<LittleEndian>()?;
                let md = r.read_u32::<LittleEndian>()?;
                let locked = r.read_u8()? != 0;
                let size = r.read_u32::<LittleEndian>()?;
                let mut data = vec![0u8; size as usize];
                r.read_exact(&mut data)?;
                Transaction::Write {
                    address,
                    data,
                    md,
                    locked,
                    preload: kind == MT_PRELOAD,
                }
            }
            MT_READ => {
                let address = r.read_u32::<LittleEndian>()?;
                let size = r.read_u32::<LittleEndian>()?;
                Transaction::Read { address, size }
            }
            MT_REG_WRITE => {
                let reg = r.read_u32::<LittleEndian>()?;
                let sub = r.read_u32::<LittleEndian>()?;
                let mut words = [0u32; 4];
                r.read_u32_into::<LittleEndian>(&mut words)?;
                let md = r.read_u32::<LittleEndian>()?;
                let reg = match GpuRegister::from_raw(reg) {
                    Ok(reg) => reg,
                    Err(e) => return Ok(Err(e)),
                };
                Transaction::RegWrite {
                    reg,
                    sub,
                    data: RegData(words),
                    md,
                }
            }
            MT_REG_READ => {
                let reg = r.read_u32::<LittleEndian>()?;
                let sub = r.read_u32::<LittleEndian>()?;
                match GpuRegister::from_raw(reg) {
                    Ok(reg) => Transaction::RegRead { reg, sub },
                    Err(e) => return Ok(Err(e)),
                }
            }
            MT_COMMAND => match GpuCommand::from_raw(r.read_u32::<LittleEndian>()?) {
                Ok(cmd) => Transaction::Command(cmd),
                Err(e) => return Ok(Err(e)),
            },
            MT_INIT_END => Transaction::InitEnd,
            MT_EVENT => {
                let event = r.read_u32::<LittleEndian>()?;
                let len = r.read_u32::<LittleEndian>()?;
                let mut msg = vec![0u8; len as usize];
                r.read_exact(&mut msg)?;
                match GpuEvent::from_raw(event) {
                    Ok(event) => Transaction::Event {
                        event,
                        message: String::from_utf8_lossy(&msg).into_owned(),
                    },
                    Err(e) => return Ok(Err(e)),
                }
            }
            _ => {
                return Ok(Err(FatalError::MalformedTrace(format!(
                    "unknown transaction type {} at record {}",
                    kind, self.records
                ))))
            }
        };
        Ok(Ok(transaction))
    }
}

impl<R: Read> TraceSource for TraceReader<R> {
    fn next_transaction(&mut self) -> GpuResult<Option<Transaction>> {
        let kind = match self.reader.read_u32::<LittleEndian>() {
            Ok(kind) => kind,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let transaction = self.read_record(kind).map_err(|e| self.truncated(e))??;
        self.records += 1;
        log::trace!("MetaStream: record {} {:?}", self.records, kind);
        Ok(Some(transaction))
    }
}

// ── Writer ──────────────────────────────────────────────────────────────────

/// Serializes transactions in the trace file format.
pub struct TraceWriter<W: Write> {
    writer: W,
}

impl TraceWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> GpuResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write(&mut self, transaction: &Transaction) -> GpuResult<()> {
        let w = &mut self.writer;
        match transaction {
            Transaction::Write {
                address,
                data,
                md,
                locked,
                preload,
            } => {
                w.write_u32::<LittleEndian>(if *preload { MT_PRELOAD } else { MT_WRITE })?;
                w.write_u32::<LittleEndian>(*address)?;
                w.write_u32::<LittleEndian>(*md)?;
                w.write_u8(*locked as u8)?;
                w.write_u32::<LittleEndian>(data.len() as u32)?;
                w.write_all(data)?;
            }
            Transaction::Read { address, size } => {
                w.write_u32::<LittleEndian>(MT_READ)?;
                w.write_u32::<LittleEndian>(*address)?;
                w.write_u32::<LittleEndian>(*size)?;
            }
            Transaction::RegWrite { reg, sub, data, md } => {
                w.write_u32::<LittleEndian>(MT_REG_WRITE)?;
                w.write_u32::<LittleEndian>(*reg as u32)?;
                w.write_u32::<LittleEndian>(*sub)?;
                w.write_all(&data.to_bytes())?;
                w.write_u32::<LittleEndian>(*md)?;
            }
            Transaction::RegRead { reg, sub } => {
                w.write_u32::<LittleEndian>(MT_REG_READ)?;
                w.write_u32::<LittleEndian>(*reg as u32)?;
                w.write_u32::<LittleEndian>(*sub)?;
            }
            Transaction::Command(cmd) => {
                w.write_u32::<LittleEndian>(MT_COMMAND)?;
                w.write_u32::<LittleEndian>(*cmd as u32)?;
            }
            Transaction::InitEnd => w.write_u32::<LittleEndian>(MT_INIT_END)?,
            Transaction::Event { event, message } => {
                w.write_u32::<LittleEndian>(MT_EVENT)?;
                w.write_u32::<LittleEndian>(*event as u32)?;
                w.write_u32::<LittleEndian>(message.len() as u32)?;
                w.write_all(message.as_bytes())?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> GpuResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_trace() -> Vec<Transaction> {
        vec![
            Transaction::Command(GpuCommand::Reset),
            Transaction::reg(GpuRegister::DisplayXRes, 0, RegData::from_u32(4)),
            Transaction::Write {
                address: 0x8000_0010,
                data: vec![1, 2, 3],
                md: 7,
                locked: true,
                preload: true,
            },
            Transaction::InitEnd,
            Transaction::Event {
                event: GpuEvent::EndOfFrame,
                message: "frame 0".into(),
            },
            Transaction::Command(GpuCommand::SwapBuffers),
        ]
    }

    #[test]
    fn test_file_format_round_trip() {
        let mut writer = TraceWriter::new(Vec::new());
        for t in sample_trace() {
            writer.write(&t).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let mut reader = TraceReader::new(Cursor::new(bytes));
        let mut decoded = Vec::new();
        while let Some(t) = reader.next_transaction().unwrap() {
            decoded.push(t);
        }
        assert_eq!(decoded, sample_trace());
        assert_eq!(reader.records(), 6);
    }

    #[test]
    fn test_command_record_layout() {
        let mut writer = TraceWriter::new(Vec::new());
        writer.write(&Transaction::Command(GpuCommand::Draw)).unwrap();
        assert_eq!(writer.finish().unwrap(), vec![5, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let mut reader = TraceReader::new(Cursor::new(vec![99, 0, 0, 0]));
        assert!(matches!(reader.next_transaction(), Err(FatalError::MalformedTrace(_))));
    }

    #[test]
    fn test_unknown_command_is_fatal() {
        let mut reader = TraceReader::new(Cursor::new(vec![5, 0, 0, 0, 200, 0, 0, 0]));
        assert!(reader.next_transaction().is_err());
    }

    #[test]
    fn test_truncated_record_is_fatal() {
        // REG_WRITE with only the register id.
        let mut reader = TraceReader::new(Cursor::new(vec![3, 0, 0, 0, 1, 0, 0, 0]));
        assert!(matches!(reader.next_transaction(), Err(FatalError::MalformedTrace(_))));
    }

    #[test]
    fn test_queue_source_drains_in_order() {
        let mut q: QueueSource = sample_trace().into_iter().collect();
        assert_eq!(q.len(), 6);
        assert_eq!(q.next_transaction().unwrap(), Some(Transaction::Command(GpuCommand::Reset)));
        while q.next_transaction().unwrap().is_some() {}
        assert!(q.is_empty());
        assert_eq!(q.next_transaction().unwrap(), None);
    }
}
