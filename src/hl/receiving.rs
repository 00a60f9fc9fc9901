use super::{DeviceState, RxBuffer, DW3xxx};
use crate::{
    configs::DoubleBuffer,
    ll::{self, CodecError, FastCommand, Transport, DB_DIAG},
    time::Instant,
    Error,
};

use super::{events::SysStatus, sending::Delay};

/// Size of each receive buffer
pub const RX_BUFFER_LEN: u16 = 1024;

/// Offset of the RX timestamp within a diagnostics set
const DIAG_RX_TIME: u16 = 0x04;

/// How the receiver is enabled
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxMode {
    /// Right away
    Immediate,
    /// At a later time
    Delayed {
        /// When to start
        delay: Delay,
        /// If the start time has already passed, stay idle instead of
        /// enabling the receiver right away
        idle_on_late: bool,
    },
}

impl RxMode {
    fn command(&self) -> FastCommand {
        match self {
            RxMode::Immediate => FastCommand::Rx,
            RxMode::Delayed { delay, .. } => match delay {
                Delay::At(_) => FastCommand::DelayedRx,
                Delay::AfterReference(_) => FastCommand::DelayedRxRef,
                Delay::AfterRx(_) => FastCommand::DelayedRxRs,
                Delay::AfterTx(_) => FastCommand::DelayedRxTs,
            },
        }
    }
}

/// Frame information of a received frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxFrameInfo {
    /// Frame length, including the FCS
    pub len: u16,
    /// The ranging bit was set
    pub ranging: bool,
    /// Data rate report, 1 for 6.8 Mbps
    pub data_rate: u8,
    /// Number of preamble symbols accumulated
    pub preamble_count: u16,
}

impl From<ll::rx_finfo::R> for RxFrameInfo {
    fn from(r: ll::rx_finfo::R) -> Self {
        RxFrameInfo {
            len: r.rxflen(),
            ranging: r.rng() != 0,
            data_rate: r.rxbr(),
            preamble_count: r.rxpacc(),
        }
    }
}

impl<B: Transport> DW3xxx<B> {
    /// Enables the receiver
    ///
    /// The PLL bias trim is set back to its default first. A delayed start
    /// whose time has passed either falls back to an immediate start or, with
    /// `idle_on_late`, turns the radio off and returns
    /// [`Error::DelayedTooLate`].
    pub fn rx_enable(&mut self, mode: RxMode) -> Result<(), Error<B>> {
        if self.state != DeviceState::IdlePll && self.state != DeviceState::Rx {
            return Err(Error::WrongState);
        }

        self.reset_pll_bias_trim()?;

        if let RxMode::Delayed { delay, .. } = mode {
            self.ll.dx_time().write(|w| w.value(delay.dx_time()))?;
        }

        self.ll.fast_command(mode.command())?;

        if let RxMode::Delayed { idle_on_late, .. } = mode {
            let status = SysStatus::from_bits_retain(self.ll.sys_status().read()?.value());
            if status.contains(SysStatus::HPDWARN) {
                self.force_trx_off()?;
                if idle_on_late {
                    return Err(Error::DelayedTooLate);
                }
                warn!("delayed receive too late, starting now");
                self.ll.fast_command(FastCommand::Rx)?;
            }
        }

        self.state = DeviceState::Rx;
        Ok(())
    }

    /// Sets the frame wait timeout in units of 512/499.2 MHz (~1.026 µs)
    ///
    /// `None` disables the timeout.
    pub fn set_rx_timeout(&mut self, timeout: Option<u32>) -> Result<(), Error<B>> {
        match timeout {
            Some(value) => {
                self.ll.rx_fwto().write(|w| w.value(value))?;
                self.ll.sys_cfg().modify(|_, w| w.rxwtoe(1))?;
            }
            None => {
                self.ll.sys_cfg().modify(|_, w| w.rxwtoe(0))?;
            }
        }
        Ok(())
    }

    /// Sets the preamble detection timeout in PACs, 0 disables it
    pub fn set_preamble_timeout(&mut self, pacs: u16) -> Result<(), Error<B>> {
        self.ll.pre_toc().write(|w| w.value(pacs))?;
        Ok(())
    }

    /// Re-enable the receiver automatically after a failed reception
    pub fn set_rx_auto_reenable(&mut self, enable: bool) -> Result<(), Error<B>> {
        self.ll.sys_cfg().modify(|_, w| w.rxautr(enable as u8))?;
        self.radio.rx_auto_reenable = enable;
        Ok(())
    }

    /// Reads frame information from the owned buffer's bank
    pub fn read_rx_finfo(&mut self) -> Result<RxFrameInfo, Error<B>> {
        if self.radio.double_buffer == DoubleBuffer::Disabled {
            return Ok(self.ll.rx_finfo().read()?.into());
        }

        let mut bytes = [0; 4];
        let offset = self.radio.owned_buffer.diag_offset();
        self.ll.read_at(DB_DIAG, offset, &mut bytes)?;
        Ok(ll::rx_finfo::R(bytes).into())
    }

    /// Reads the timestamp of the last received frame
    pub fn read_rx_timestamp(&mut self) -> Result<Instant, Error<B>> {
        if self.radio.double_buffer == DoubleBuffer::Disabled {
            let stamp = self.ll.rx_time().read()?.rx_stamp();
            return Ok(Instant::from_register(stamp));
        }

        let mut bytes = [0; 8];
        let offset = self.radio.owned_buffer.diag_offset() + DIAG_RX_TIME;
        self.ll.read_at(DB_DIAG, offset, &mut bytes[..5])?;
        Ok(Instant::from_register(u64::from_le_bytes(bytes)))
    }

    /// Reads `buffer.len()` bytes of the received frame, starting at `offset`
    pub fn read_rx_data(&mut self, buffer: &mut [u8], offset: u16) -> Result<(), Error<B>> {
        let end = offset as usize + buffer.len();
        if end > RX_BUFFER_LEN as usize {
            return Err(CodecError::InvalidLength(end).into());
        }

        let file_id = self.radio.owned_buffer.file_id();
        self.ll.read_at(file_id, offset, buffer)?;
        Ok(())
    }

    /// Copies the received frame, without the FCS, into `buffer`
    ///
    /// Returns the filled part of `buffer`.
    pub fn read_frame<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b mut [u8], Error<B>> {
        let info = self.read_rx_finfo()?;
        let len = if self.radio.fcs_rx_disabled {
            info.len
        } else {
            info.len.saturating_sub(super::sending::FCS_LEN)
        } as usize;

        if buffer.len() < len {
            return Err(Error::BufferTooSmall { required_len: len });
        }

        self.read_rx_data(&mut buffer[..len], 0)?;
        Ok(&mut buffer[..len])
    }

    /// The buffer that frame data and diagnostics are read from
    pub fn rx_buffer(&self) -> RxBuffer {
        self.radio.owned_buffer
    }
}
