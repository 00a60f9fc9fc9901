//! Low-level interface to the DW3xxx
//!
//! This module implements the SPI transaction protocol of the DW3000 family
//! and a register-level interface on top of it. Users of this library should
//! typically not need to use this. Please consider using the
//! [high-level interface] instead.
//!
//! Every transaction starts with a header that addresses a register file and
//! a byte offset (the sub-index) within it. Three header encodings exist:
//!
//! - A 1-byte fast command, which triggers an action and carries no payload.
//! - A 1-byte short address, for accesses at sub-index 0.
//! - A 2-byte full address, for any other sub-index and for the atomic
//!   AND/OR (read-modify-write) accesses.
//!
//! When SPI CRC is enabled, writes carry a trailing CRC-8 and reads are
//! checked against the CRC the chip computed.
//!
//! **NOTE**: Many field access methods accept types that have a larger number
//! of bits than the field actually consists of. If you use such a method to
//! pass a value that is too large to be written to the field, it will be
//! silently truncated.
//!
//! [high-level interface]: ../hl/index.html

use core::{fmt, marker::PhantomData};

use embedded_hal::spi::{Operation, SpiDevice};

/// The highest register file id that can be addressed
pub const MAX_FILE_ID: u8 = 0x1F;

/// The highest sub-index a full address header can carry
///
/// Offsets beyond this are reached through the indirect pointers, see
/// [`DW3xxx::read_at`].
pub const MAX_SUB_INDEX: u16 = 0x7F;

/// Transactions must be shorter than this
pub const MAX_TRANSFER_LEN: usize = 0x3100;

/// The file id of the indirect pointer A window
const INDIRECT_PTR_A: u8 = 0x1D;

/// Receive buffer 0
pub const RX_BUFFER_0: u8 = 0x12;

/// Receive buffer 1, used with double buffering
pub const RX_BUFFER_1: u8 = 0x13;

/// Transmit buffer
pub const TX_BUFFER: u8 = 0x14;

/// Scratch RAM, used by the AES block
pub const SCRATCH_RAM: u8 = 0x16;

/// Double buffer diagnostics: frame info and timestamps of both buffers
pub const DB_DIAG: u8 = 0x18;

/// Offset of the second diagnostics set within [`DB_DIAG`]
pub const DB_DIAG_SET_1: u16 = 0xE8;

/// Fast commands
///
/// Fast commands are 1-byte transactions that make the chip act immediately.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FastCommand {
    /// Turn off the transceiver
    TxRxOff = 0x00,
    /// Start transmission
    Tx = 0x01,
    /// Enable the receiver
    Rx = 0x02,
    /// Delayed transmission at `DX_TIME`
    DelayedTx = 0x03,
    /// Delayed receive at `DX_TIME`
    DelayedRx = 0x04,
    /// Delayed transmission relative to the last TX timestamp
    DelayedTxTs = 0x05,
    /// Delayed receive relative to the last TX timestamp
    DelayedRxTs = 0x06,
    /// Delayed transmission relative to the last RX timestamp
    DelayedTxRs = 0x07,
    /// Delayed receive relative to the last RX timestamp
    DelayedRxRs = 0x08,
    /// Delayed transmission relative to `DREF_TIME`
    DelayedTxRef = 0x09,
    /// Delayed receive relative to `DREF_TIME`
    DelayedRxRef = 0x0A,
    /// Transmit if the channel is clear
    CcaTx = 0x0B,
    /// Transmit, then turn on the receiver
    TxW4r = 0x0C,
    /// Delayed transmission, then turn on the receiver
    DelayedTxW4r = 0x0D,
    /// Delayed transmission relative to TX timestamp, then receive
    DelayedTxTsW4r = 0x0E,
    /// Delayed transmission relative to RX timestamp, then receive
    DelayedTxRsW4r = 0x0F,
    /// Delayed transmission relative to `DREF_TIME`, then receive
    DelayedTxRefW4r = 0x10,
    /// Transmit if the channel is clear, then receive
    CcaTxW4r = 0x11,
    /// Clear all interrupt events
    ClearIrqs = 0x12,
    /// Release the host-owned receive buffer and toggle to the other one
    DbToggle = 0x13,
    /// Request the dual SPI semaphore
    SemaRequest = 0x14,
    /// Release the dual SPI semaphore
    SemaRelease = 0x15,
    /// Take the dual SPI semaphore even if the other host holds it
    SemaForce = 0x16,
}

impl FastCommand {
    /// Returns the fast command for a raw 5-bit command code
    pub fn from_code(code: u8) -> Option<Self> {
        use FastCommand::*;

        const ALL: [FastCommand; 23] = [
            TxRxOff,
            Tx,
            Rx,
            DelayedTx,
            DelayedRx,
            DelayedTxTs,
            DelayedRxTs,
            DelayedTxRs,
            DelayedRxRs,
            DelayedTxRef,
            DelayedRxRef,
            CcaTx,
            TxW4r,
            DelayedTxW4r,
            DelayedTxTsW4r,
            DelayedTxRsW4r,
            DelayedTxRefW4r,
            CcaTxW4r,
            ClearIrqs,
            DbToggle,
            SemaRequest,
            SemaRelease,
            SemaForce,
        ];

        ALL.get(code as usize).copied()
    }
}

/// The kind of register access a header announces
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    /// Plain read
    Read,
    /// Plain write
    Write,
    /// Atomic AND/OR of one byte
    AndOr8,
    /// Atomic AND/OR of two bytes
    AndOr16,
    /// Atomic AND/OR of four bytes
    AndOr32,
}

impl Access {
    /// The 2-bit mode field of a full address header
    fn mode_bits(self) -> u8 {
        match self {
            Access::Read | Access::Write => 0b00,
            Access::AndOr8 => 0b01,
            Access::AndOr16 => 0b10,
            Access::AndOr32 => 0b11,
        }
    }

    fn is_write(self) -> bool {
        !matches!(self, Access::Read)
    }

    /// Width of the AND/OR masks, if this is an AND/OR access
    pub fn mask_width(self) -> Option<usize> {
        match self {
            Access::AndOr8 => Some(1),
            Access::AndOr16 => Some(2),
            Access::AndOr32 => Some(4),
            _ => None,
        }
    }

    fn for_mask_width(width: usize) -> Option<Self> {
        match width {
            1 => Some(Access::AndOr8),
            2 => Some(Access::AndOr16),
            4 => Some(Access::AndOr32),
            _ => None,
        }
    }
}

/// Malformed transaction request
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// File id above [`MAX_FILE_ID`] or sub-index above [`MAX_SUB_INDEX`]
    InvalidAddress {
        /// The requested register file
        file_id: u8,
        /// The requested offset
        sub_index: u16,
    },
    /// The transfer length is [`MAX_TRANSFER_LEN`] or more
    InvalidLength(usize),
    /// The header bytes or the AND/OR mask widths don't form a valid access
    InvalidMode,
}

/// An encoded transaction header
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Header {
    bytes: [u8; 2],
    len: u8,
}

/// A decoded transaction header
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decoded {
    /// A fast command
    FastCommand(FastCommand),
    /// A register access
    Register {
        /// The register file
        file_id: u8,
        /// The byte offset within the file
        sub_index: u16,
        /// How the register is accessed
        access: Access,
    },
}

impl Header {
    /// Encodes a fast command header
    pub fn fast_command(command: FastCommand) -> Self {
        Header {
            bytes: [0x81 | ((command as u8) << 1), 0],
            len: 1,
        }
    }

    /// Encodes a register access header
    ///
    /// Uses the 1-byte short encoding for plain accesses at sub-index 0 and
    /// the 2-byte full encoding otherwise.
    pub fn new(file_id: u8, sub_index: u16, access: Access) -> Result<Self, CodecError> {
        if file_id > MAX_FILE_ID || sub_index > MAX_SUB_INDEX {
            return Err(CodecError::InvalidAddress { file_id, sub_index });
        }

        let write = (access.is_write() as u8) << 7;

        if sub_index == 0 && access.mask_width().is_none() {
            return Ok(Header {
                bytes: [write | (file_id << 1), 0],
                len: 1,
            });
        }

        let sub_index = sub_index as u8;
        Ok(Header {
            bytes: [
                write | 0x40 | (file_id << 1) | ((sub_index >> 6) & 0x01),
                ((sub_index & 0x3F) << 2) | access.mode_bits(),
            ],
            len: 2,
        })
    }

    /// The header bytes as they go on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Decodes the header at the start of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Decoded, CodecError> {
        let first = *bytes.first().ok_or(CodecError::InvalidMode)?;
        let write = first & 0x80 != 0;

        if first & 0x40 == 0 {
            if first & 0x01 != 0 {
                let command = FastCommand::from_code((first >> 1) & 0x1F)
                    .ok_or(CodecError::InvalidMode)?;
                return Ok(Decoded::FastCommand(command));
            }

            return Ok(Decoded::Register {
                file_id: (first >> 1) & 0x1F,
                sub_index: 0,
                access: if write { Access::Write } else { Access::Read },
            });
        }

        let second = *bytes.get(1).ok_or(CodecError::InvalidMode)?;
        let access = match (write, second & 0x03) {
            (false, 0b00) => Access::Read,
            (true, 0b00) => Access::Write,
            (true, 0b01) => Access::AndOr8,
            (true, 0b10) => Access::AndOr16,
            (true, 0b11) => Access::AndOr32,
            _ => return Err(CodecError::InvalidMode),
        };

        Ok(Decoded::Register {
            file_id: (first >> 1) & 0x1F,
            sub_index: (((first & 0x01) as u16) << 6) | ((second >> 2) as u16),
            access,
        })
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Header(")?;
        for b in self.as_bytes() {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

const CRC8_TABLE: [u8; 256] = crc8_table();

/// Builds the lookup table for the polynomial x^8 + x^2 + x + 1
const fn crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Continues a CRC-8 computation over `data`
///
/// Start with `crc = 0`. The SPI CRC covers the header followed by the
/// payload.
pub fn crc8(crc: u8, data: &[u8]) -> u8 {
    data.iter()
        .fold(crc, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// SPI CRC mode
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiCrcMode {
    /// No CRC
    Off,
    /// CRC on writes only
    Write,
    /// CRC on writes, and reads are checked against the chip's CRC
    WriteRead,
}

impl Default for SpiCrcMode {
    fn default() -> Self {
        SpiCrcMode::Off
    }
}

/// The serial bus the chip hangs off
///
/// Implemented for any [`SpiDevice`] through [`SpiTransport`]. Implement it
/// directly if the platform can switch the SPI clock between the slow rate
/// needed before the PLL is locked and the fast rate after.
pub trait Transport {
    /// The transport's error type
    type Error;

    /// Sends `header`, then reads `buffer.len()` bytes
    fn read(&mut self, header: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Sends `header`, then `data`
    fn write(&mut self, header: &[u8], data: &[u8]) -> Result<(), Self::Error>;

    /// Sends `header`, then `data`, then the CRC byte
    fn write_with_crc(&mut self, header: &[u8], data: &[u8], crc: u8) -> Result<(), Self::Error>;

    /// Switches to the bus rate that is safe while the chip runs on its RC clock
    fn set_slow_rate(&mut self) {}

    /// Switches to the full bus rate
    fn set_fast_rate(&mut self) {}
}

/// [`Transport`] over an embedded-hal [`SpiDevice`]
///
/// The device asserts chip select around each transaction.
pub struct SpiTransport<SPI>(pub SPI);

impl<SPI: SpiDevice> Transport for SpiTransport<SPI> {
    type Error = SPI::Error;

    fn read(&mut self, header: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.0
            .transaction(&mut [Operation::Write(header), Operation::Read(buffer)])
    }

    fn write(&mut self, header: &[u8], data: &[u8]) -> Result<(), Self::Error> {
        self.0
            .transaction(&mut [Operation::Write(header), Operation::Write(data)])
    }

    fn write_with_crc(&mut self, header: &[u8], data: &[u8], crc: u8) -> Result<(), Self::Error> {
        self.0.transaction(&mut [
            Operation::Write(header),
            Operation::Write(data),
            Operation::Write(&[crc]),
        ])
    }
}

/// Entry point to the DW3xxx driver's low-level API
///
/// Please consider using [hl::DW3xxx] instead.
///
/// [hl::DW3xxx]: ../hl/struct.DW3xxx.html
pub struct DW3xxx<B> {
    bus: B,
    crc_mode: SpiCrcMode,
    read_crc_error: bool,
}

impl<B> DW3xxx<B> {
    /// Create a new instance of `DW3xxx`
    pub fn new(bus: B) -> Self {
        DW3xxx {
            bus,
            crc_mode: SpiCrcMode::Off,
            read_crc_error: false,
        }
    }

    /// Returns the current SPI CRC mode
    pub fn crc_mode(&self) -> SpiCrcMode {
        self.crc_mode
    }

    /// Selects the SPI CRC mode used by following transactions
    ///
    /// The chip side has to be switched on separately, through
    /// `SYS_CFG.SPI_CRCEN`.
    pub(crate) fn set_crc_mode(&mut self, mode: SpiCrcMode) {
        self.crc_mode = mode;
    }

    /// Returns whether a read CRC mismatch happened since the last call, and
    /// resets the flag
    pub fn take_read_crc_error(&mut self) -> bool {
        core::mem::replace(&mut self.read_crc_error, false)
    }

    /// Gives access to the bus
    pub fn bus(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Releases the bus
    pub fn free(self) -> B {
        self.bus
    }
}

impl<B: Transport> DW3xxx<B> {
    /// Reads `buffer.len()` bytes from a register file
    pub fn read(&mut self, file_id: u8, sub_index: u16, buffer: &mut [u8]) -> Result<(), Error<B>> {
        check_len(buffer.len())?;
        let header = Header::new(file_id, sub_index, Access::Read)?;

        self.bus
            .read(header.as_bytes(), buffer)
            .map_err(Error::Transport)?;

        if self.crc_mode == SpiCrcMode::WriteRead {
            self.check_read_crc(&header, buffer)?;
        }

        Ok(())
    }

    /// Writes `data` into a register file
    pub fn write(&mut self, file_id: u8, sub_index: u16, data: &[u8]) -> Result<(), Error<B>> {
        check_len(data.len())?;
        let header = Header::new(file_id, sub_index, Access::Write)?;
        self.transmit(&header, data)
    }

    /// Atomically applies `(value & and) | or` to a register
    ///
    /// The masks must both be 1, 2 or 4 bytes wide.
    pub fn and_or(
        &mut self,
        file_id: u8,
        sub_index: u16,
        and: &[u8],
        or: &[u8],
    ) -> Result<(), Error<B>> {
        if and.len() != or.len() {
            return Err(CodecError::InvalidMode.into());
        }
        let access = Access::for_mask_width(and.len()).ok_or(CodecError::InvalidMode)?;
        let header = Header::new(file_id, sub_index, access)?;

        let mut payload = [0; 8];
        payload[..and.len()].copy_from_slice(and);
        payload[and.len()..2 * and.len()].copy_from_slice(or);

        self.transmit(&header, &payload[..2 * and.len()])
    }

    /// Sends a fast command
    pub fn fast_command(&mut self, command: FastCommand) -> Result<(), Error<B>> {
        trace!("fast command {:?}", command);
        self.transmit(&Header::fast_command(command), &[])
    }

    fn transmit(&mut self, header: &Header, data: &[u8]) -> Result<(), Error<B>> {
        let result = match self.crc_mode {
            SpiCrcMode::Off => self.bus.write(header.as_bytes(), data),
            SpiCrcMode::Write | SpiCrcMode::WriteRead => {
                let crc = crc8(crc8(0, header.as_bytes()), data);
                self.bus.write_with_crc(header.as_bytes(), data, crc)
            }
        };
        result.map_err(Error::Transport)
    }

    fn check_read_crc(&mut self, header: &Header, data: &[u8]) -> Result<(), Error<B>> {
        let expected = crc8(crc8(0, header.as_bytes()), data);

        let crc_header = Header::new(SPI_RD_CRC::FILE_ID, SPI_RD_CRC::SUB_INDEX, Access::Read)?;
        let mut actual = [0];
        self.bus
            .read(crc_header.as_bytes(), &mut actual)
            .map_err(Error::Transport)?;

        if actual[0] != expected {
            warn!(
                "SPI read CRC mismatch: expected {:#04x}, got {:#04x}",
                expected, actual[0]
            );
            self.read_crc_error = true;
        }

        Ok(())
    }

    /// Reads a register file at any offset
    ///
    /// Offsets beyond [`MAX_SUB_INDEX`] go through indirect pointer A.
    pub fn read_at(&mut self, file_id: u8, offset: u16, buffer: &mut [u8]) -> Result<(), Error<B>> {
        if offset <= MAX_SUB_INDEX {
            return self.read(file_id, offset, buffer);
        }
        self.point_indirect_a(file_id, offset)?;
        self.read(INDIRECT_PTR_A, 0, buffer)
    }

    /// Writes a register file at any offset
    ///
    /// Offsets beyond [`MAX_SUB_INDEX`] go through indirect pointer A.
    pub fn write_at(&mut self, file_id: u8, offset: u16, data: &[u8]) -> Result<(), Error<B>> {
        if offset <= MAX_SUB_INDEX {
            return self.write(file_id, offset, data);
        }
        self.point_indirect_a(file_id, offset)?;
        self.write(INDIRECT_PTR_A, 0, data)
    }

    fn point_indirect_a(&mut self, file_id: u8, offset: u16) -> Result<(), Error<B>> {
        self.ptr_addr_a().write(|w| w.file_id(file_id))?;
        self.ptr_offset_a().write(|w| w.value(offset))
    }

    /// Reads one byte
    pub fn read8(&mut self, file_id: u8, sub_index: u16) -> Result<u8, Error<B>> {
        let mut b = [0; 1];
        self.read(file_id, sub_index, &mut b)?;
        Ok(b[0])
    }

    /// Reads a little-endian 16-bit value
    pub fn read16(&mut self, file_id: u8, sub_index: u16) -> Result<u16, Error<B>> {
        let mut b = [0; 2];
        self.read(file_id, sub_index, &mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    /// Reads a little-endian 32-bit value
    pub fn read32(&mut self, file_id: u8, sub_index: u16) -> Result<u32, Error<B>> {
        let mut b = [0; 4];
        self.read(file_id, sub_index, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    /// Writes one byte
    pub fn write8(&mut self, file_id: u8, sub_index: u16, value: u8) -> Result<(), Error<B>> {
        self.write(file_id, sub_index, &[value])
    }

    /// Writes a little-endian 16-bit value
    pub fn write16(&mut self, file_id: u8, sub_index: u16, value: u16) -> Result<(), Error<B>> {
        self.write(file_id, sub_index, &value.to_le_bytes())
    }

    /// Writes a little-endian 32-bit value
    pub fn write32(&mut self, file_id: u8, sub_index: u16, value: u32) -> Result<(), Error<B>> {
        self.write(file_id, sub_index, &value.to_le_bytes())
    }

    /// Atomic AND/OR on one byte
    pub fn and_or8(&mut self, file_id: u8, sub_index: u16, and: u8, or: u8) -> Result<(), Error<B>> {
        self.and_or(file_id, sub_index, &[and], &[or])
    }

    /// Atomic AND/OR on a 16-bit value
    pub fn and_or16(
        &mut self,
        file_id: u8,
        sub_index: u16,
        and: u16,
        or: u16,
    ) -> Result<(), Error<B>> {
        self.and_or(file_id, sub_index, &and.to_le_bytes(), &or.to_le_bytes())
    }

    /// Atomic AND/OR on a 32-bit value
    pub fn and_or32(
        &mut self,
        file_id: u8,
        sub_index: u16,
        and: u32,
        or: u32,
    ) -> Result<(), Error<B>> {
        self.and_or(file_id, sub_index, &and.to_le_bytes(), &or.to_le_bytes())
    }

    /// Sets bits in a 32-bit register without touching the others
    pub fn set_bits32(&mut self, file_id: u8, sub_index: u16, bits: u32) -> Result<(), Error<B>> {
        self.and_or32(file_id, sub_index, !0, bits)
    }

    /// Clears bits in a 32-bit register without touching the others
    pub fn clear_bits32(&mut self, file_id: u8, sub_index: u16, bits: u32) -> Result<(), Error<B>> {
        self.and_or32(file_id, sub_index, !bits, 0)
    }
}

fn check_len(len: usize) -> Result<(), CodecError> {
    if len >= MAX_TRANSFER_LEN {
        return Err(CodecError::InvalidLength(len));
    }
    Ok(())
}

/// Provides access to a register
///
/// You can get an instance for a given register using one of the methods on
/// [`DW3xxx`].
pub struct RegAccessor<'s, R, B>(&'s mut DW3xxx<B>, PhantomData<R>);

impl<'s, R, B> RegAccessor<'s, R, B>
where
    B: Transport,
{
    /// Read from the register
    pub fn read(&mut self) -> Result<R::Read, Error<B>>
    where
        R: Register + Readable,
    {
        let mut r = R::read();
        self.0.read(R::FILE_ID, R::SUB_INDEX, R::buffer(&mut r))?;
        Ok(r)
    }

    /// Write to the register
    ///
    /// Fields that the closure doesn't set are written as zero.
    pub fn write<F>(&mut self, f: F) -> Result<(), Error<B>>
    where
        R: Register + Writable,
        F: FnOnce(&mut R::Write) -> &mut R::Write,
    {
        let mut w = R::write();
        f(&mut w);
        self.0.write(R::FILE_ID, R::SUB_INDEX, R::buffer(&mut w))
    }

    /// Modify the register
    ///
    /// Registers of 1, 2 or 4 bytes are updated with an atomic AND/OR
    /// transaction that only touches the bits the closure changed. Other
    /// registers are written back in full.
    pub fn modify<F>(&mut self, f: F) -> Result<(), Error<B>>
    where
        R: Register + Readable + Writable,
        F: for<'r> FnOnce(&mut R::Read, &'r mut R::Write) -> &'r mut R::Write,
    {
        let mut r = self.read()?;
        let mut w = R::write();

        <R as Writable>::buffer(&mut w).copy_from_slice(<R as Readable>::buffer(&mut r));

        f(&mut r, &mut w);

        let old = <R as Readable>::buffer(&mut r);
        let new = <R as Writable>::buffer(&mut w);

        if Access::for_mask_width(R::LEN).is_none() {
            return self.0.write(R::FILE_ID, R::SUB_INDEX, new);
        }

        let mut and = [0; 4];
        let mut or = [0; 4];
        for i in 0..R::LEN {
            let changed = old[i] ^ new[i];
            and[i] = !changed;
            or[i] = new[i] & changed;
        }

        self.0
            .and_or(R::FILE_ID, R::SUB_INDEX, &and[..R::LEN], &or[..R::LEN])
    }
}

/// An error that can occur when communicating with the DW3xxx
pub enum Error<B: Transport> {
    /// The transport failed
    Transport(B::Error),

    /// The transaction couldn't be encoded
    Codec(CodecError),
}

impl<B: Transport> From<CodecError> for Error<B> {
    fn from(error: CodecError) -> Self {
        Error::Codec(error)
    }
}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<B> fmt::Debug for Error<B>
where
    B: Transport,
    B::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Transport(error) => write!(f, "Transport({:?})", error),
            Error::Codec(error) => write!(f, "Codec({:?})", error),
        }
    }
}

/// Implemented for all registers
///
/// This is a mostly internal trait that should not be implemented or used
/// directly by users of this crate. It is exposed through the public API
/// though, so it can't be made private.
pub trait Register {
    /// The register file
    const FILE_ID: u8;

    /// The byte offset within the file
    const SUB_INDEX: u16;

    /// The length of the register
    const LEN: usize;
}

/// Marker trait for registers that can be read from
///
/// This is a mostly internal trait that should not be implemented or used
/// directly by users of this crate.
pub trait Readable {
    /// The type that is used to read from the register
    type Read;

    /// Return the read type for this register
    fn read() -> Self::Read;

    /// Return the read type's internal buffer
    fn buffer(r: &mut Self::Read) -> &mut [u8];
}

/// Marker trait for registers that can be written to
///
/// This is a mostly internal trait that should not be implemented or used
/// directly by users of this crate.
pub trait Writable {
    /// The type that is used to write to the register
    type Write;

    /// Return the write type for this register
    fn write() -> Self::Write;

    /// Return the write type's internal buffer
    fn buffer(w: &mut Self::Write) -> &mut [u8];
}

/// Extracts bits `first..=last` of a little-endian byte string
pub(crate) fn get_field(bytes: &[u8], first: usize, last: usize) -> u64 {
    let mut value = 0;
    for (i, bit) in (first..=last).enumerate() {
        if bytes[bit / 8] & (1 << (bit % 8)) != 0 {
            value |= 1 << i;
        }
    }
    value
}

/// Stores `value` into bits `first..=last` of a little-endian byte string
pub(crate) fn set_field(bytes: &mut [u8], first: usize, last: usize, value: u64) {
    for (i, bit) in (first..=last).enumerate() {
        let mask = 1 << (bit % 8);
        if value & (1 << i) != 0 {
            bytes[bit / 8] |= mask;
        } else {
            bytes[bit / 8] &= !mask;
        }
    }
}

/// Generates register implementations
macro_rules! impl_register {
    (
        $(
            $file_id:expr,
            $sub_index:expr,
            $len:expr,
            $rw:tt,
            $name:ident($name_lower:ident) {
            #[$doc:meta]
            $(
                $field:ident,
                $first_bit:expr,
                $last_bit:expr,
                $ty:ty;
                #[$field_doc:meta]
            )*
            }
        )*
    ) => {
        $(
            #[$doc]
            #[allow(non_camel_case_types)]
            pub struct $name;

            impl Register for $name {
                const FILE_ID:   u8    = $file_id;
                const SUB_INDEX: u16   = $sub_index;
                const LEN:       usize = $len;
            }

            #[$doc]
            pub mod $name_lower {
                use core::fmt;

                /// Used to read from the register
                pub struct R(pub(crate) [u8; $len]);

                impl R {
                    $(
                        #[$field_doc]
                        pub fn $field(&self) -> $ty {
                            crate::ll::get_field(&self.0, $first_bit, $last_bit) as $ty
                        }
                    )*
                }

                impl fmt::Debug for R {
                    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        write!(f, "0x")?;
                        for i in (0 .. $len).rev() {
                            write!(f, "{:02x}", self.0[i])?;
                        }

                        Ok(())
                    }
                }

                /// Used to write to the register
                pub struct W(pub(crate) [u8; $len]);

                impl W {
                    $(
                        #[$field_doc]
                        pub fn $field(&mut self, value: $ty) -> &mut Self {
                            crate::ll::set_field(&mut self.0, $first_bit, $last_bit, value as u64);
                            self
                        }
                    )*
                }
            }

            impl_rw!($rw, $name, $name_lower, $len);
        )*


        impl<B> DW3xxx<B> {
            $(
                #[$doc]
                pub fn $name_lower(&mut self) -> RegAccessor<'_, $name, B> {
                    RegAccessor(self, PhantomData)
                }
            )*
        }
    }
}

// Helper macro, used internally by `impl_register!`
macro_rules! impl_rw {
    (RO, $name:ident, $name_lower:ident, $len:expr) => {
        impl_rw!(@R, $name, $name_lower, $len);
    };
    (RW, $name:ident, $name_lower:ident, $len:expr) => {
        impl_rw!(@R, $name, $name_lower, $len);
        impl_rw!(@W, $name, $name_lower, $len);
    };

    (@R, $name:ident, $name_lower:ident, $len:expr) => {
        impl Readable for $name {
            type Read = $name_lower::R;

            fn read() -> Self::Read {
                $name_lower::R([0; $len])
            }

            fn buffer(r: &mut Self::Read) -> &mut [u8] {
                &mut r.0
            }
        }
    };
    (@W, $name:ident, $name_lower:ident, $len:expr) => {
        impl Writable for $name {
            type Write = $name_lower::W;

            fn write() -> Self::Write {
                $name_lower::W([0; $len])
            }

            fn buffer(w: &mut Self::Write) -> &mut [u8] {
                &mut w.0
            }
        }
    };
}

// All register are implemented in this macro invocation. It follows the
// following syntax:
// <file id>, <sub-index>, <size-bytes>, <RO/RW>, <name-upper>(name-lower) { /// <doc>
//     <field 1>
//     <field 2>
//     ...
// }
//
// Each field follows the following syntax:
// <Id>, <first-bit-index>, <last-bit-index>, <type>; /// <doc>
impl_register! {
    0x00, 0x00, 4, RO, DEV_ID(dev_id) { /// Device identifier
        rev,     0,  3, u8;  /// Revision
        ver,     4,  7, u8;  /// Version
        model,   8, 15, u8;  /// Model
        ridtag, 16, 31, u16; /// Register Identification Tag
    }
    0x00, 0x04, 8, RW, EUI(eui) { /// Extended Unique Identifier
        value, 0, 63, u64; /// Extended Unique Identifier
    }
    0x00, 0x0C, 4, RW, PANADR(panadr) { /// PAN Identifier and Short Address
        short_addr,  0, 15, u16; /// Short Address
        pan_id,     16, 31, u16; /// PAN Identifier
    }
    0x00, 0x10, 4, RW, SYS_CFG(sys_cfg) { /// System Configuration
        ffen,        0,  0, u8; /// Frame Filtering Enable
        dis_fcs_tx,  1,  1, u8; /// Disable FCS transmission
        dis_fce,     2,  2, u8; /// Disable frame check error handling
        dis_drxb,    3,  3, u8; /// Disable Double RX Buffer
        phr_mode,    4,  4, u8; /// PHR Mode (extended frame length)
        phr_6m8,     5,  5, u8; /// Send PHR at 6.8 Mbps
        spi_crcen,   6,  6, u8; /// Enable SPI CRC functionality
        cia_ipatov,  7,  7, u8; /// Select CIA processing of the Ipatov sequence
        cia_sts,     8,  8, u8; /// Select CIA processing of the STS
        rxwtoe,      9,  9, u8; /// Receive Wait Timeout Enable
        rxautr,     10, 10, u8; /// Receiver Auto-Re-enable
        auto_ack,   11, 11, u8; /// Automatic Acknowledge Enable
        cp_spc,     12, 13, u8; /// STS packet configuration
        cp_sdc,     15, 15, u8; /// Use the super deterministic STS code
        pdoa_mode,  16, 17, u8; /// PDoA mode
        fast_aat,   18, 18, u8; /// Fast auto-ACK turnaround
    }
    0x00, 0x18, 1, RO, SPI_RD_CRC(spi_rd_crc) { /// CRC the chip computed over the last read
        value, 0, 7, u8; /// CRC value
    }
    0x00, 0x1C, 4, RO, SYS_TIME(sys_time) { /// System Time Counter
        value, 0, 31, u32; /// Upper 32 bits of the system time
    }
    0x00, 0x24, 6, RW, TX_FCTRL(tx_fctrl) { /// TX Frame Control
        txflen,      0,  9, u16; /// TX Frame Length, including the FCS
        txbr,       10, 10, u8;  /// Transmit Bit Rate
        tr,         11, 11, u8;  /// Transmit Ranging enable
        txpsr,      12, 15, u8;  /// Transmit Preamble Symbol Repetitions
        txb_offset, 16, 25, u16; /// Transmit buffer index offset
        fine_plen,  40, 47, u8;  /// Fine preamble length control
    }
    0x00, 0x2C, 4, RW, DX_TIME(dx_time) { /// Delayed Send or Receive Time
        value, 0, 31, u32; /// Upper 32 bits of the 40-bit time
    }
    0x00, 0x30, 4, RW, DREF_TIME(dref_time) { /// Delayed reference time
        value, 0, 31, u32; /// Upper 32 bits of the 40-bit time
    }
    0x00, 0x34, 3, RW, RX_FWTO(rx_fwto) { /// Receive frame wait timeout period
        value, 0, 23, u32; /// Timeout in units of ~1 us
    }
    0x00, 0x3C, 4, RW, SYS_ENABLE(sys_enable) { /// System event mask, low word
        value, 0, 31, u32; /// Event mask
    }
    0x00, 0x40, 2, RW, SYS_ENABLE_HI(sys_enable_hi) { /// System event mask, high word
        value, 0, 15, u16; /// Event mask
    }
    0x00, 0x44, 4, RW, SYS_STATUS(sys_status) { /// System event status, low word
        value, 0, 31, u32; /// Event status, write 1 to clear
    }
    0x00, 0x48, 2, RW, SYS_STATUS_HI(sys_status_hi) { /// System event status, high word
        value, 0, 15, u16; /// Event status, write 1 to clear
    }
    0x00, 0x4C, 4, RO, RX_FINFO(rx_finfo) { /// RX Frame Information
        rxflen,   0,  9, u16; /// Receive Frame Length
        rxnspl,  11, 12, u8;  /// Receive non-standard preamble length
        rxbr,    13, 13, u8;  /// Receive Bit Rate report
        rng,     15, 15, u8;  /// Receiver Ranging
        rxprf,   16, 17, u8;  /// RX Pulse Repetition Rate report
        rxpsr,   18, 19, u8;  /// RX Preamble Repetition
        rxpacc,  20, 31, u16; /// Preamble Accumulation Count
    }
    0x00, 0x64, 5, RO, RX_TIME(rx_time) { /// Receive Time Stamp
        rx_stamp, 0, 39, u64; /// Fully adjusted time stamp
    }
    0x00, 0x74, 5, RO, TX_TIME(tx_time) { /// Transmit Time Stamp
        tx_stamp, 0, 39, u64; /// Fully adjusted time stamp
    }
    0x01, 0x04, 2, RW, TX_ANTD(tx_antd) { /// Transmitter antenna delay
        value, 0, 15, u16; /// TX antenna delay
    }
    0x01, 0x0C, 4, RW, TX_POWER(tx_power) { /// TX Power Control
        data, 0,  7, u8; /// Power of the payload
        phr,  8, 15, u8; /// Power of the PHY header
        shr, 16, 23, u8; /// Power of the preamble and SFD
        sts, 24, 31, u8; /// Power of the STS
    }
    0x01, 0x14, 2, RW, CHAN_CTRL(chan_ctrl) { /// Channel Control Register
        rf_chan,   0,  0, u8; /// Channel: 0 for channel 5, 1 for channel 9
        sfd_type,  1,  2, u8; /// SFD type
        tx_pcode,  3,  7, u8; /// Preamble code used in the transmitter
        rx_pcode,  8, 12, u8; /// Preamble code used in the receiver
    }
    0x01, 0x24, 1, RW, RDB_STATUS(rdb_status) { /// RX double buffer status
        value, 0, 7, u8; /// Status bits of both buffers
    }
    0x01, 0x30, 2, RW, AES_CFG(aes_cfg) { /// AES configuration
        mode,      0,  0, u8; /// 0 to encrypt, 1 to decrypt
        key_size,  1,  2, u8; /// 128, 192 or 256 bit key
        key_addr,  3,  5, u8; /// Key index in key RAM
        key_load,  6,  6, u8; /// Load the key into the core
        key_src,   7,  7, u8; /// Key source: 0 register, 1 RAM
        tag_size,  8, 10, u8; /// MIC size code
        core_sel, 11, 11, u8; /// Core type: 0 GCM, 1 CCM*
        key_otp,  12, 12, u8; /// Take the key from OTP
    }
    0x01, 0x34, 16, RW, AES_IV(aes_iv) { /// AES initialisation vector
        low,   0,  63, u64; /// IV bits 0..63
        high, 64, 127, u64; /// IV bits 64..127
    }
    0x01, 0x44, 8, RW, DMA_CFG(dma_cfg) { /// AES DMA configuration
        src_port,   0,  2, u8;  /// Source port
        src_addr,   3, 12, u16; /// Source offset
        dst_port,  13, 15, u8;  /// Destination port
        dst_addr,  16, 25, u16; /// Destination offset
        cp_end_sel, 26, 26, u8; /// Byte order of the CCM counter
        hdr_size,  32, 38, u8;  /// Header length
        pyld_size, 39, 48, u16; /// Payload length
    }
    0x01, 0x4C, 1, RW, AES_START(aes_start) { /// Start the AES job
        value, 0, 0, u8; /// Write 1 to start
    }
    0x01, 0x50, 4, RW, AES_STS(aes_sts) { /// AES status, write 1 to clear
        aes_done,  0, 0, u8; /// Job done
        auth_err,  1, 1, u8; /// Authentication failure
        trans_err, 2, 2, u8; /// Transfer error
        mem_conf,  3, 3, u8; /// Memory conflict
        ram_empty, 4, 4, u8; /// Key RAM empty
        ram_full,  5, 5, u8; /// Key RAM full
        value,     0, 7, u8; /// All status bits
    }
    0x01, 0x54, 32, RW, AES_KEY(aes_key) { /// AES key
        word0,   0,  31, u32; /// Key bits 0..31
        word1,  32,  63, u32; /// Key bits 32..63
        word2,  64,  95, u32; /// Key bits 64..95
        word3,  96, 127, u32; /// Key bits 96..127
        word4, 128, 159, u32; /// Key bits 128..159, 192 and 256 bit keys
        word5, 160, 191, u32; /// Key bits 160..191, 192 and 256 bit keys
        word6, 192, 223, u32; /// Key bits 192..223, 256 bit keys
        word7, 224, 255, u32; /// Key bits 224..255, 256 bit keys
    }
    0x02, 0x00, 2, RW, STS_CFG(sts_cfg) { /// STS configuration
        cps_len, 0, 7, u8; /// STS length in blocks of 8 symbols, minus one
    }
    0x04, 0x0C, 4, RW, RX_CAL(rx_cal) { /// Receiver calibration configuration
        cal_mode,  0,  1, u8; /// 0 normal, 1 calibration mode
        cal_en,    4,  7, u8; /// Start calibration
        comp_dly, 16, 19, u8; /// Comparator delay
    }
    0x04, 0x14, 4, RO, RX_CAL_RESI(rx_cal_resi) { /// I channel calibration result
        value, 0, 28, u32; /// Result
    }
    0x04, 0x1C, 4, RO, RX_CAL_RESQ(rx_cal_resq) { /// Q channel calibration result
        value, 0, 28, u32; /// Result
    }
    0x04, 0x20, 1, RW, RX_CAL_STS(rx_cal_sts) { /// Receiver calibration status
        done, 0, 0, u8; /// Calibration finished
    }
    0x06, 0x00, 2, RW, DTUNE0(dtune0) { /// Digital receiver tuning 0
        pac,   0, 1, u8; /// Preamble acquisition chunk size
        dt0b4, 4, 4, u8; /// Tuning bit 4
    }
    0x06, 0x02, 2, RW, RX_SFD_TOC(rx_sfd_toc) { /// SFD detection timeout
        value, 0, 15, u16; /// Timeout in symbols
    }
    0x06, 0x04, 2, RW, PRE_TOC(pre_toc) { /// Preamble detection timeout
        value, 0, 15, u16; /// Timeout in PACs
    }
    0x07, 0x1C, 4, RW, RF_TX_CTRL_2(rf_tx_ctrl_2) { /// Analog TX control
        value, 0, 31, u32; /// Channel-specific tuning
    }
    0x07, 0x48, 4, RW, LDO_CTRL(ldo_ctrl) { /// LDO control
        value, 0, 31, u32; /// LDO enable bits
    }
    0x07, 0x51, 1, RW, LDO_RLOAD(ldo_rload) { /// LDO load and bias tuning
        value, 0, 7, u8; /// Tuning
    }
    0x08, 0x00, 1, RW, SAR_CTRL(sar_ctrl) { /// SAR control
        start, 0, 0, u8; /// Start a measurement
    }
    0x08, 0x04, 1, RO, SAR_STATUS(sar_status) { /// SAR status
        done, 0, 0, u8; /// Measurement done
    }
    0x08, 0x08, 2, RO, SAR_READING(sar_reading) { /// SAR readings
        vbat, 0,  7, u8; /// Battery voltage
        temp, 8, 15, u8; /// Temperature
    }
    0x09, 0x00, 2, RW, PLL_CFG(pll_cfg) { /// PLL configuration
        value, 0, 15, u16; /// Channel-specific configuration word
    }
    0x09, 0x04, 4, RW, PLL_CC(pll_cc) { /// PLL coarse code
        ch9_code, 0,  7, u8;  /// Coarse code for channel 9
        ch5_code, 8, 21, u16; /// Coarse code for channel 5
    }
    0x09, 0x08, 2, RW, PLL_CAL(pll_cal) { /// PLL calibration configuration
        use_old,    1, 1, u8; /// Start from the previous coarse code
        cal_params, 4, 7, u8; /// Calibration parameter set
        cal_en,     8, 8, u8; /// Run the calibration
    }
    0x09, 0x10, 1, RO, PLL_STATUS(pll_status) { /// PLL status
        lock_det, 0, 0, u8; /// Counter-based lock detect
        lock_thr, 1, 1, u8; /// Threshold-based lock detect
        too_high, 2, 2, u8; /// VCO above the target band
        too_low,  3, 3, u8; /// VCO below the target band
    }
    0x09, 0x18, 2, RW, PLL_COMMON(pll_common) { /// PLL common configuration
        bias_trim, 13, 15, u8; /// PLL bias trim
    }
    0x09, 0x14, 1, RW, XTAL(xtal) { /// Crystal trim
        xtal_trim, 0, 6, u8; /// Trim code
    }
    0x0A, 0x00, 3, RW, AON_DIG_CFG(aon_dig_cfg) { /// Actions performed on wake up
        onw_aon_dld, 0,  0, u8; /// Download AON array on wake
        onw_run_sar, 1,  1, u8; /// Run the SAR on wake
        onw_ldo_dld, 4,  4, u8; /// Load LDO tune on wake
        onw_dgc_dld, 3,  3, u8; /// Load DGC tables on wake
        onw_bias_dld, 2, 2, u8; /// Load bias trim on wake
        onw_go2idle, 8,  8, u8; /// Go to IDLE_PLL on wake
        onw_go2rx,   9,  9, u8; /// Enable the receiver on wake
        onw_pgfcal, 11, 11, u8; /// Run PGF calibration on wake
    }
    0x0A, 0x04, 1, RW, AON_CTRL(aon_ctrl) { /// AON control
        restore,    0, 0, u8; /// Restore configuration from AON
        save,       1, 1, u8; /// Save configuration to AON
        cfg_upload, 2, 2, u8; /// Upload the AON configuration
        dca_read,   3, 3, u8; /// Direct AON memory read
        dca_enab,   7, 7, u8; /// Direct AON memory access enable
    }
    0x0A, 0x14, 1, RW, AON_CFG(aon_cfg) { /// AON wake configuration
        value, 0, 7, u8; /// Wake flags
    }
    0x0B, 0x00, 4, RW, OTP_WDATA(otp_wdata) { /// OTP data to program
        value, 0, 31, u32; /// Data
    }
    0x0B, 0x04, 2, RW, OTP_ADDR(otp_addr) { /// OTP address
        value, 0, 10, u16; /// Address
    }
    0x0B, 0x08, 2, RW, OTP_CFG(otp_cfg) { /// OTP configuration
        otp_man,   0,  0, u8; /// Manual control
        otp_read,  1,  1, u8; /// Read from OTP_ADDR
        otp_write, 2,  2, u8; /// Program OTP_WDATA into OTP_ADDR
        dgc_kick,  6,  6, u8; /// Load DGC configuration from OTP
        ldo_kick,  7,  7, u8; /// Load LDO tune from OTP
        bias_kick, 8,  8, u8; /// Load bias trim from OTP
    }
    0x0B, 0x0C, 1, RO, OTP_STAT(otp_stat) { /// OTP status
        prog_done, 0, 0, u8; /// Programming done
    }
    0x0B, 0x10, 4, RO, OTP_RDATA(otp_rdata) { /// OTP read data
        value, 0, 31, u32; /// Data
    }
    0x0E, 0x00, 4, RW, CIA_CONF(cia_conf) { /// CIA configuration
        rxantd,      0, 15, u16; /// RX antenna delay
        mindiag,    20, 20, u8;  /// Minimal diagnostics
    }
    0x11, 0x00, 1, RW, SOFT_RST(soft_rst) { /// Soft reset of the device blocks
        value, 0, 7, u8; /// 0 resets, 0xFF releases
    }
    0x11, 0x04, 4, RW, CLK_CTRL(clk_ctrl) { /// PMSC clock control
        sys_clk,     0,  1, u8; /// System clock: auto, FOSC, RC
        rx_clk,      2,  3, u8; /// Receiver clock
        tx_clk,      4,  5, u8; /// Transmitter clock
        acc_clk_en,  6,  6, u8; /// Accumulator clock enable
        cia_clk_en,  8,  8, u8; /// CIA clock enable
        sar_clk_en, 10, 10, u8; /// SAR clock enable
        otp_clk_en, 21, 21, u8; /// OTP clock enable
        lp_clk_en,  23, 23, u8; /// Low power clock enable
    }
    0x11, 0x08, 4, RW, SEQ_CTRL(seq_ctrl) { /// PMSC sequencing control
        ainit2idle,  8,  8, u8; /// Go to IDLE_PLL automatically once the PLL locks
        force2init, 23, 23, u8; /// Force the chip into INIT
    }
    0x11, 0x1F, 2, RW, BIAS_CTRL(bias_ctrl) { /// Analog blocks' bias trim
        value, 0, 13, u16; /// Bias trim
    }
    0x1A, 0x00, 2, RO, SPI_SEM(spi_sem) { /// Dual SPI semaphore
        status,      0,  7, u8; /// Semaphore status
        spi2mavail,  9,  9, u8; /// SPI2 may take the semaphore
        spi1mavail, 10, 10, u8; /// SPI1 may take the semaphore
        status_hi,   8, 15, u8; /// Semaphore status, high byte
    }
    0x1F, 0x00, 1, RO, FINT_STAT(fint_stat) { /// Fast system event status
        txok,        0, 0, u8; /// TX done
        cca_fail,    1, 1, u8; /// Clear channel check failed
        rxtserr,     2, 2, u8; /// RX timestamp error
        rxok,        3, 3, u8; /// RX done
        rxerr,       4, 4, u8; /// RX error
        rxto,        5, 5, u8; /// RX timeout
        sys_event,   6, 6, u8; /// System event
        sys_panic,   7, 7, u8; /// System panic
        value,       0, 7, u8; /// All bits
    }
    0x1F, 0x04, 1, RW, PTR_ADDR_A(ptr_addr_a) { /// File addressed through indirect pointer A
        file_id, 0, 4, u8; /// Register file
    }
    0x1F, 0x08, 2, RW, PTR_OFFSET_A(ptr_offset_a) { /// Offset addressed through indirect pointer A
        value, 0, 14, u16; /// Offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBus;

    #[test]
    fn short_header_for_sub_index_zero() {
        let header = Header::new(0x00, 0, Access::Read).unwrap();
        assert_eq!(header.as_bytes(), &[0x00]);

        let header = Header::new(0x14, 0, Access::Write).unwrap();
        assert_eq!(header.as_bytes(), &[0x80 | (0x14 << 1)]);
    }

    #[test]
    fn full_header_layout() {
        // SYS_STATUS, file 0 offset 0x44, 32-bit AND/OR
        let header = Header::new(0x00, 0x44, Access::AndOr32).unwrap();
        let bytes = header.as_bytes();
        assert_eq!(bytes, &[0xC1, 0x13]);

        // The address the register mock decodes from the header
        let addr = (((bytes[0] & 0x3F) as u16) << 8) | (bytes[1] & 0xFC) as u16;
        assert_eq!(addr, 0x44 << 2);
        assert_eq!(bytes[1] & 0x03, 0x03);
    }

    #[test]
    fn fast_command_header() {
        assert_eq!(Header::fast_command(FastCommand::TxRxOff).as_bytes(), &[0x81]);
        assert_eq!(Header::fast_command(FastCommand::DbToggle).as_bytes(), &[0xA7]);
        assert_eq!(
            Header::decode(&[0xA7]),
            Ok(Decoded::FastCommand(FastCommand::DbToggle))
        );
    }

    #[test]
    fn header_decode_recovers_address() {
        let accesses = [
            Access::Read,
            Access::Write,
            Access::AndOr8,
            Access::AndOr16,
            Access::AndOr32,
        ];
        for file_id in 0..=MAX_FILE_ID {
            for sub_index in (0..=MAX_SUB_INDEX).step_by(3) {
                for &access in &accesses {
                    let header = Header::new(file_id, sub_index, access).unwrap();
                    assert_eq!(
                        Header::decode(header.as_bytes()),
                        Ok(Decoded::Register {
                            file_id,
                            sub_index,
                            access
                        })
                    );
                }
            }
        }
    }

    #[test]
    fn rejects_out_of_range_addresses() {
        assert_eq!(
            Header::new(0x20, 0, Access::Read),
            Err(CodecError::InvalidAddress {
                file_id: 0x20,
                sub_index: 0
            })
        );
        assert!(Header::new(0x00, 0x80, Access::Write).is_err());
        // A read with an AND/OR mode field
        assert_eq!(Header::decode(&[0x40, 0x01]), Err(CodecError::InvalidMode));
    }

    #[test]
    fn crc8_matches_table_algorithm() {
        assert_eq!(&CRC8_TABLE[..8], &[0x00, 0x07, 0x0E, 0x09, 0x1C, 0x1B, 0x12, 0x15]);
        assert_eq!(CRC8_TABLE[0xFF], 0xF3);
        // CRC-8/SMBUS check value
        assert_eq!(crc8(0, b"123456789"), 0xF4);
        // Chaining over header then payload equals one pass over both
        assert_eq!(crc8(crc8(0, &[0xC1, 0x13]), &[1, 2]), crc8(0, &[0xC1, 0x13, 1, 2]));
    }

    #[test]
    fn write_then_read_back() {
        let mut dw = DW3xxx::new(MockBus::new());

        dw.write32(0x00, 0x10, 0xDEAD_BEEF).unwrap();
        assert_eq!(dw.read32(0x00, 0x10).unwrap(), 0xDEAD_BEEF);

        // SYS_STATUS is write-1-to-clear
        dw.bus().raise32(0x00, 0x44, 0x0000_0081);
        dw.write32(0x00, 0x44, 0x0000_0001).unwrap();
        assert_eq!(dw.read32(0x00, 0x44).unwrap(), 0x0000_0080);
    }

    #[test]
    fn and_or_identity_is_noop() {
        let mut dw = DW3xxx::new(MockBus::new());
        dw.write32(0x00, 0x10, 0x1234_5678).unwrap();

        dw.and_or8(0x00, 0x10, 0xFF, 0).unwrap();
        dw.and_or16(0x00, 0x10, 0xFFFF, 0).unwrap();
        dw.and_or32(0x00, 0x10, 0xFFFF_FFFF, 0).unwrap();

        assert_eq!(dw.read32(0x00, 0x10).unwrap(), 0x1234_5678);
    }

    #[test]
    fn and_or_with_zero_mask_sets_value() {
        let mut dw = DW3xxx::new(MockBus::new());
        dw.write32(0x00, 0x10, 0xFFFF_FFFF).unwrap();

        dw.and_or8(0x00, 0x10, 0, 0x5A).unwrap();
        assert_eq!(dw.read8(0x00, 0x10).unwrap(), 0x5A);

        dw.and_or16(0x00, 0x10, 0, 0xA55A).unwrap();
        assert_eq!(dw.read16(0x00, 0x10).unwrap(), 0xA55A);

        dw.and_or32(0x00, 0x10, 0, 0x0102_0304).unwrap();
        assert_eq!(dw.read32(0x00, 0x10).unwrap(), 0x0102_0304);
    }

    #[test]
    fn and_or_rejects_odd_widths() {
        let mut dw = DW3xxx::new(MockBus::new());
        assert!(matches!(
            dw.and_or(0x00, 0x10, &[0, 0, 0], &[0, 0, 0]),
            Err(Error::Codec(CodecError::InvalidMode))
        ));
        assert!(dw.bus().transactions().is_empty());
    }

    #[test]
    fn modify_touches_only_changed_bits() {
        let mut dw = DW3xxx::new(MockBus::new());
        dw.write32(0x00, 0x10, 0x0000_0004).unwrap();

        dw.sys_cfg().modify(|_, w| w.spi_crcen(1)).unwrap();

        let cfg = dw.sys_cfg().read().unwrap();
        assert_eq!(cfg.spi_crcen(), 1);
        assert_eq!(cfg.dis_fce(), 1);
    }

    #[test]
    fn register_fields() {
        let mut dw = DW3xxx::new(MockBus::new());
        dw.tx_fctrl()
            .write(|w| w.txflen(22).txbr(1).txpsr(0x5).txb_offset(0x123))
            .unwrap();

        let r = dw.tx_fctrl().read().unwrap();
        assert_eq!(r.txflen(), 22);
        assert_eq!(r.txbr(), 1);
        assert_eq!(r.txpsr(), 0x5);
        assert_eq!(r.txb_offset(), 0x123);
        assert_eq!(r.tr(), 0);
    }

    #[test]
    fn crc_on_writes_and_checked_reads() {
        let mut dw = DW3xxx::new(MockBus::new());
        dw.set_crc_mode(SpiCrcMode::WriteRead);

        dw.write16(0x01, 0x04, 0x4015).unwrap();
        assert_eq!(dw.bus().last_crc(), Some(crc8(0, &[0xC2, 0x10, 0x15, 0x40])));

        // The mock reports the CRC of the last read correctly
        assert_eq!(dw.read16(0x01, 0x04).unwrap(), 0x4015);
        assert!(!dw.take_read_crc_error());

        dw.bus().corrupt_read_crc(true);
        dw.read16(0x01, 0x04).unwrap();
        assert!(dw.take_read_crc_error());
        assert!(!dw.take_read_crc_error());
    }

    #[test]
    fn high_offsets_go_through_indirect_pointer() {
        let mut dw = DW3xxx::new(MockBus::new());

        dw.write_at(0x14, 0x200, &[1, 2, 3]).unwrap();
        let mut buf = [0; 3];
        dw.read_at(0x14, 0x200, &mut buf).unwrap();

        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(dw.bus().peek(0x14, 0x200, 3), &[1, 2, 3]);
    }

    #[test]
    fn rejects_oversized_transfer() {
        let mut dw = DW3xxx::new(MockBus::new());
        let data = [0u8; MAX_TRANSFER_LEN];
        assert!(matches!(
            dw.write(0x14, 0, &data),
            Err(Error::Codec(CodecError::InvalidLength(MAX_TRANSFER_LEN)))
        ));
        assert!(dw.bus().transactions().is_empty());
    }
}
