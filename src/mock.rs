//! Register-space mock used by the unit tests
//!
//! Models every register file as a flat byte array, decodes transaction
//! headers with the crate's own codec, applies AND/OR writes atomically and
//! records every transaction for later inspection.

use std::collections::VecDeque;

use embedded_hal::{delay::DelayNs, digital};

use crate::ll::{crc8, Access, Decoded, FastCommand, Header, Transport};

const FILE_LEN: usize = 0x800;

/// One recorded bus transaction
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Transaction {
    Read { file_id: u8, sub_index: u16, len: usize },
    Write { file_id: u8, sub_index: u16, data: Vec<u8> },
    AndOr { file_id: u8, sub_index: u16, and: Vec<u8>, or: Vec<u8> },
    Fast(FastCommand),
}

impl Transaction {
    pub fn is_write(&self) -> bool {
        !matches!(self, Transaction::Read { .. })
    }
}

/// Byte ranges that clear on write-1
const WRITE_ONE_TO_CLEAR: [(u8, u16, u16); 3] = [
    // SYS_STATUS, low and high words
    (0x00, 0x44, 0x4C),
    // RDB_STATUS
    (0x01, 0x24, 0x25),
    // AES_STS
    (0x01, 0x50, 0x54),
];

pub struct MockBus {
    files: Vec<Vec<u8>>,
    log: Vec<Transaction>,
    scripts: Vec<(u8, u16, VecDeque<Vec<u8>>)>,
    last_crc: Option<u8>,
    last_read_crc: u8,
    corrupt_read_crc: bool,
    on_fast: Option<fn(&mut MockBus, FastCommand)>,
}

impl MockBus {
    pub fn new() -> Self {
        MockBus {
            files: vec![vec![0; FILE_LEN]; 32],
            log: Vec::new(),
            scripts: Vec::new(),
            last_crc: None,
            last_read_crc: 0,
            corrupt_read_crc: false,
            on_fast: None,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn write_count(&self) -> usize {
        self.log.iter().filter(|t| t.is_write()).count()
    }

    pub fn fast_commands(&self) -> Vec<FastCommand> {
        self.log
            .iter()
            .filter_map(|t| match t {
                Transaction::Fast(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn last_crc(&self) -> Option<u8> {
        self.last_crc
    }

    pub fn corrupt_read_crc(&mut self, corrupt: bool) {
        self.corrupt_read_crc = corrupt;
    }

    /// Runs `hook` whenever a fast command arrives
    pub fn on_fast_command(&mut self, hook: fn(&mut MockBus, FastCommand)) {
        self.on_fast = Some(hook);
    }

    pub fn peek(&self, file_id: u8, offset: u16, len: usize) -> &[u8] {
        let start = offset as usize;
        &self.files[file_id as usize][start..start + len]
    }

    pub fn peek32(&self, file_id: u8, offset: u16) -> u32 {
        let mut b = [0; 4];
        b.copy_from_slice(self.peek(file_id, offset, 4));
        u32::from_le_bytes(b)
    }

    pub fn poke(&mut self, file_id: u8, offset: u16, data: &[u8]) {
        let start = offset as usize;
        self.files[file_id as usize][start..start + data.len()].copy_from_slice(data);
    }

    pub fn poke32(&mut self, file_id: u8, offset: u16, value: u32) {
        self.poke(file_id, offset, &value.to_le_bytes());
    }

    /// Sets bits in a 32-bit register, the way hardware raises events
    pub fn raise32(&mut self, file_id: u8, offset: u16, bits: u32) {
        let value = self.peek32(file_id, offset) | bits;
        self.poke32(file_id, offset, value);
    }

    /// Queues the values successive reads of one register return
    ///
    /// Once the queue runs dry, reads see the register contents again.
    pub fn script(&mut self, file_id: u8, sub_index: u16, values: &[&[u8]]) {
        let queue = values.iter().map(|v| v.to_vec()).collect();
        self.scripts.push((file_id, sub_index, queue));
    }

    fn resolve(&self, file_id: u8, sub_index: u16) -> (u8, u16) {
        if file_id == 0x1D {
            let file = self.files[0x1F][0x04] & 0x1F;
            let offset = u16::from_le_bytes([self.files[0x1F][0x08], self.files[0x1F][0x09]]);
            (file, offset + sub_index)
        } else {
            (file_id, sub_index)
        }
    }

    fn store(&mut self, file_id: u8, offset: u16, i: usize, byte: u8) {
        let at = offset as usize + i;
        let w1c = WRITE_ONE_TO_CLEAR
            .iter()
            .any(|&(f, start, end)| f == file_id && (start as usize..end as usize).contains(&at));
        let cell = &mut self.files[file_id as usize][at];
        if w1c {
            *cell &= !byte;
        } else {
            *cell = byte;
        }
    }
}

impl Transport for MockBus {
    type Error = core::convert::Infallible;

    fn read(&mut self, header: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        let (file_id, sub_index) = match Header::decode(header) {
            Ok(Decoded::Register { file_id, sub_index, access: Access::Read }) => {
                (file_id, sub_index)
            }
            other => panic!("unexpected read header {:?}", other),
        };
        self.log.push(Transaction::Read {
            file_id,
            sub_index,
            len: buffer.len(),
        });

        if file_id == 0x00 && sub_index == 0x18 {
            buffer[0] = if self.corrupt_read_crc {
                !self.last_read_crc
            } else {
                self.last_read_crc
            };
            return Ok(());
        }

        let scripted = self
            .scripts
            .iter_mut()
            .find(|(f, s, q)| *f == file_id && *s == sub_index && !q.is_empty())
            .and_then(|(_, _, q)| q.pop_front());

        match scripted {
            Some(value) => {
                let n = value.len().min(buffer.len());
                buffer[..n].copy_from_slice(&value[..n]);
            }
            None => {
                let (file, offset) = self.resolve(file_id, sub_index);
                buffer.copy_from_slice(self.peek(file, offset, buffer.len()));
            }
        }

        self.last_read_crc = crc8(crc8(0, header), buffer);
        Ok(())
    }

    fn write(&mut self, header: &[u8], data: &[u8]) -> Result<(), Self::Error> {
        match Header::decode(header) {
            Ok(Decoded::FastCommand(command)) => {
                self.log.push(Transaction::Fast(command));
                if let Some(hook) = self.on_fast {
                    hook(self, command);
                }
            }
            Ok(Decoded::Register {
                file_id,
                sub_index,
                access: Access::Write,
            }) => {
                self.log.push(Transaction::Write {
                    file_id,
                    sub_index,
                    data: data.to_vec(),
                });
                let (file, offset) = self.resolve(file_id, sub_index);
                for (i, &byte) in data.iter().enumerate() {
                    self.store(file, offset, i, byte);
                }
            }
            Ok(Decoded::Register {
                file_id,
                sub_index,
                access,
            }) => {
                let width = access.mask_width().unwrap_or(0);
                assert_eq!(data.len(), 2 * width, "AND/OR payload width");
                let (and, or) = data.split_at(width);
                self.log.push(Transaction::AndOr {
                    file_id,
                    sub_index,
                    and: and.to_vec(),
                    or: or.to_vec(),
                });
                let (file, offset) = self.resolve(file_id, sub_index);
                for i in 0..width {
                    let at = offset as usize + i;
                    let cell = &mut self.files[file as usize][at];
                    *cell = (*cell & and[i]) | or[i];
                }
            }
            Err(e) => panic!("undecodable header {:?}", e),
        }
        Ok(())
    }

    fn write_with_crc(&mut self, header: &[u8], data: &[u8], crc: u8) -> Result<(), Self::Error> {
        self.last_crc = Some(crc);
        self.write(header, data)
    }
}

pub struct MockDelay;

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Wake pin that counts its rising edges
#[derive(Default)]
pub struct MockPin {
    pub high: bool,
    pub pulses: usize,
}

impl digital::ErrorType for MockPin {
    type Error = core::convert::Infallible;
}

impl digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.high {
            self.pulses += 1;
        }
        self.high = true;
        Ok(())
    }
}
