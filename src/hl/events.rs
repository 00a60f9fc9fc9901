//! Interrupt decoding and event dispatch
//!
//! [`DW3xxx::isr`] is called once per assertion of the IRQ line. It reads the
//! status registers, clears what it consumed and calls the matching methods
//! of an [`EventHandler`].

use bitflags::bitflags;

use super::{DeviceState, IrqGuard, RxBuffer, DW3xxx};
use crate::{
    configs::{DoubleBuffer, InterruptOption, StsMode},
    ll::{FastCommand, Transport},
    Error,
};

bitflags! {
    /// Low word of `SYS_STATUS` and `SYS_ENABLE`
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct SysStatus: u32 {
        /// Interrupt request
        const IRQS = 0x1;
        /// Clock PLL lock
        const CP_LOCK = 0x2;
        /// SPI CRC error
        const SPICRCE = 0x4;
        /// Automatic acknowledge triggered
        const AAT = 0x8;
        /// Transmit frame begins
        const TXFRB = 0x10;
        /// Transmit preamble sent
        const TXPRS = 0x20;
        /// Transmit PHY header sent
        const TXPHS = 0x40;
        /// Transmit frame sent
        const TXFRS = 0x80;
        /// Preamble detected
        const RXPRD = 0x100;
        /// SFD detected
        const RXSFDD = 0x200;
        /// CIA processing done
        const CIADONE = 0x400;
        /// PHY header detected
        const RXPHD = 0x800;
        /// PHY header error
        const RXPHE = 0x1000;
        /// Data frame ready
        const RXFR = 0x2000;
        /// FCS good
        const RXFCG = 0x4000;
        /// FCS error
        const RXFCE = 0x8000;
        /// Reed-Solomon error
        const RXFSL = 0x1_0000;
        /// Frame wait timeout
        const RXFTO = 0x2_0000;
        /// CIA error
        const CIAERR = 0x4_0000;
        /// Low voltage warning
        const VWARN = 0x8_0000;
        /// Receiver overrun
        const RXOVRR = 0x10_0000;
        /// Preamble detection timeout
        const RXPTO = 0x20_0000;
        /// SPI ready, after power up or wake up
        const SPIRDY = 0x80_0000;
        /// RC oscillator initialised, the chip is in IDLE_RC
        const RCINIT = 0x100_0000;
        /// PLL lost lock
        const PLL_HILO = 0x200_0000;
        /// SFD timeout
        const RXSTO = 0x400_0000;
        /// Half period warning: a delayed TX or RX started late
        const HPDWARN = 0x800_0000;
        /// STS error
        const CPERR = 0x1000_0000;
        /// Frame rejected by the frame filter
        const ARFE = 0x2000_0000;
        /// Timer 0 expired
        const TIMER0 = 0x4000_0000;
        /// Timer 1 expired
        const TIMER1 = 0x8000_0000;

        /// All transmit events
        const ALL_TX = Self::AAT.bits() | Self::TXFRB.bits() | Self::TXPRS.bits()
            | Self::TXPHS.bits() | Self::TXFRS.bits();
        /// All receive timeouts
        const ALL_RX_TO = Self::RXFTO.bits() | Self::RXPTO.bits() | Self::CPERR.bits();
        /// All receive errors
        const ALL_RX_ERR = Self::RXPHE.bits() | Self::RXFCE.bits() | Self::RXFSL.bits()
            | Self::RXSTO.bits() | Self::ARFE.bits() | Self::CIAERR.bits() | Self::CPERR.bits();
        /// All events of a good reception
        const ALL_RX_GOOD = Self::RXFR.bits() | Self::RXFCG.bits() | Self::RXPRD.bits()
            | Self::RXSFDD.bits() | Self::RXPHD.bits() | Self::CIADONE.bits();
    }
}

bitflags! {
    /// High word of `SYS_STATUS` and `SYS_ENABLE`
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct SysStatusHi: u16 {
        /// Preamble rejected
        const RXPREJ = 0x2;
        /// Voltage or temperature threshold crossed
        const VT_DET = 0x10;
        /// GPIO interrupt
        const GPIOIRQ = 0x20;
        /// AES job done
        const AES_DONE = 0x40;
        /// AES job failed
        const AES_ERR = 0x80;
        /// Command rejected
        const CMD_ERR = 0x100;
        /// SPI overflow
        const SPI_OVF = 0x200;
        /// SPI underflow
        const SPI_UNF = 0x400;
        /// SPI error
        const SPIERR = 0x800;
        /// Clear channel assessment failed
        const CCA_FAIL = 0x1000;
        /// SPI1 got the semaphore
        const SPI1_AVAIL = 0x2000;
        /// SPI2 got the semaphore
        const SPI2_AVAIL = 0x4000;

        /// Events that end up at [`EventHandler::spi_error`]
        const PANIC = Self::CMD_ERR.bits() | Self::SPI_OVF.bits() | Self::SPI_UNF.bits()
            | Self::SPIERR.bits();
        /// Dual SPI semaphore events
        const DUAL_SPI = Self::SPI1_AVAIL.bits() | Self::SPI2_AVAIL.bits();
        /// System events
        const SYS_EVENT = Self::VT_DET.bits() | Self::GPIOIRQ.bits();
    }
}

bitflags! {
    /// Bits of `FINT_STAT`, the condensed status byte
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct FastStatus: u8 {
        /// TX done
        const TXOK = 0x1;
        /// CCA failed
        const CCA_FAIL = 0x2;
        /// RX timestamp error
        const RXTSERR = 0x4;
        /// RX done
        const RXOK = 0x8;
        /// RX error
        const RXERR = 0x10;
        /// RX timeout
        const RXTO = 0x20;
        /// System event
        const SYS_EVENT = 0x40;
        /// System panic
        const SYS_PANIC = 0x80;
    }
}

bitflags! {
    /// Per-buffer bits of `RDB_STATUS`
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct RdbStatus: u8 {
        /// Buffer 0: FCS good
        const RXFCG0 = 0x1;
        /// Buffer 0: frame ready
        const RXFR0 = 0x2;
        /// Buffer 0: CIA done
        const CIADONE0 = 0x4;
        /// Buffer 0: STS error
        const CP_ERR0 = 0x8;
        /// Buffer 1: FCS good
        const RXFCG1 = 0x10;
        /// Buffer 1: frame ready
        const RXFR1 = 0x20;
        /// Buffer 1: CIA done
        const CIADONE1 = 0x40;
        /// Buffer 1: STS error
        const CP_ERR1 = 0x80;
    }
}

bitflags! {
    /// Flags of a received frame
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct RxFlags: u8 {
        /// Ranging bit set in the PHY header
        const RNG = 0x1;
        /// No data, STS mode 3
        const ND = 0x2;
        /// CIA done
        const CIA = 0x4;
        /// CIA error
        const CER = 0x8;
        /// STS error
        const CPER = 0x10;
    }
}

bitflags! {
    /// Options of the event dispatcher
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct IsrFlags: u8 {
        /// Report zero-length frames as good
        const LEN0_RXGOOD = 0x1;
    }
}

/// The data an [`EventHandler`] gets with each event
///
/// Only valid for the duration of the call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CallbackData {
    /// Low status word, after reclassification
    pub status: u32,
    /// High status word
    pub status_hi: u16,
    /// Length of the received frame, including the FCS
    pub datalength: u16,
    /// Flags of the received frame
    pub rx_flags: RxFlags,
    /// Dual SPI semaphore bits
    pub dss_stat: u8,
    /// Low status word as read from the chip
    pub raw_status: u32,
}

/// Reacts to radio events
///
/// All methods do nothing by default. Each gets the handle that raised the
/// event, so it may start the next operation right away.
#[allow(unused_variables)]
pub trait EventHandler<B: Transport> {
    /// A frame was sent
    fn tx_done(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// A frame was received
    fn rx_ok(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// The receiver timed out
    fn rx_timeout(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// A reception failed
    fn rx_error(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// The chip reported an SPI or command error
    fn spi_error(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// The CRC of a read didn't match
    fn spi_read_error(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// The chip is ready for SPI, after power up or wake up
    fn spi_ready(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// A dual SPI semaphore event
    fn dual_spi_event(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// A frame is ready, but its FCS hasn't been checked
    fn frame_ready(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// The CIA finished
    fn cia_done(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// The supply voltage dropped
    fn device_error(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
    /// A system event, like GPIO or a voltage/temperature threshold
    fn sys_event(&mut self, dw: &mut DW3xxx<B>, data: &CallbackData) {}
}

/// How one interrupt was classified
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RxEvent {
    Good,
    Error,
    Timeout,
    FrameReady,
}

impl<B: Transport> DW3xxx<B> {
    /// Enables or disables interrupt events
    ///
    /// `lo` and `hi` are masks of [`SysStatus`] and [`SysStatusHi`] bits.
    /// Status bits of events that get enabled are cleared, so stale events
    /// don't fire right away.
    pub fn set_interrupt(
        &mut self,
        lo: SysStatus,
        hi: SysStatusHi,
        option: InterruptOption,
    ) -> Result<(), Error<B>> {
        let _guard = IrqGuard::new(self.irq);

        let current_lo = self.ll.sys_enable().read()?.value();
        let current_hi = self.ll.sys_enable_hi().read()?.value();

        let dual_spi = match option {
            InterruptOption::EnableDualSpi | InterruptOption::EnableOnlyDualSpi => {
                SysStatusHi::DUAL_SPI.bits()
            }
            _ => 0,
        };

        let (new_lo, new_hi) = match option {
            InterruptOption::Disable => (current_lo & !lo.bits(), current_hi & !hi.bits()),
            InterruptOption::Enable | InterruptOption::EnableDualSpi => (
                current_lo | lo.bits(),
                current_hi | hi.bits() | dual_spi,
            ),
            InterruptOption::EnableOnly | InterruptOption::EnableOnlyDualSpi => {
                (lo.bits(), hi.bits() | dual_spi)
            }
        };

        self.ll.sys_enable().write(|w| w.value(new_lo))?;
        self.ll.sys_enable_hi().write(|w| w.value(new_hi))?;

        let raised_lo = new_lo & !current_lo;
        let raised_hi = new_hi & !current_hi;
        if raised_lo != 0 {
            self.ll.sys_status().write(|w| w.value(raised_lo))?;
        }
        if raised_hi != 0 {
            self.ll.sys_status_hi().write(|w| w.value(raised_hi))?;
        }

        Ok(())
    }

    /// Options of the event dispatcher
    pub fn set_isr_flags(&mut self, flags: IsrFlags) {
        self.radio.isr_flags = flags;
    }

    /// Turns receive double buffering on or off
    ///
    /// The host starts out owning buffer 0.
    pub fn configure_double_buffer(&mut self, mode: DoubleBuffer) -> Result<(), Error<B>> {
        let (disabled, auto) = match mode {
            DoubleBuffer::Disabled => (1, 0),
            DoubleBuffer::Auto => (0, 1),
            DoubleBuffer::Manual => (0, 0),
        };
        self.ll
            .sys_cfg()
            .modify(|_, w| w.dis_drxb(disabled).rxautr(auto))?;

        self.radio.double_buffer = mode;
        self.radio.owned_buffer = RxBuffer::Buffer0;
        Ok(())
    }

    /// Hands the owned receive buffer back to the chip
    ///
    /// The host owns the other buffer afterwards.
    pub fn signal_rx_buff_free(&mut self) -> Result<(), Error<B>> {
        self.ll.fast_command(FastCommand::DbToggle)?;
        self.radio.owned_buffer = self.radio.owned_buffer.toggled();
        Ok(())
    }

    /// Asks for the dual SPI semaphore
    ///
    /// The chip hands it over only if the other host doesn't hold it. Check
    /// the outcome with [`spi_semaphore_status`](Self::spi_semaphore_status).
    pub fn request_spi_semaphore(&mut self) -> Result<(), Error<B>> {
        self.ll.fast_command(FastCommand::SemaRequest)?;
        Ok(())
    }

    /// Gives back the dual SPI semaphore this host holds
    pub fn release_spi_semaphore(&mut self) -> Result<(), Error<B>> {
        self.ll.fast_command(FastCommand::SemaRelease)?;
        Ok(())
    }

    /// Takes the dual SPI semaphore even if the other host holds it
    ///
    /// Only the host on SPI2 can do this. The chip ignores it from SPI1.
    pub fn force_spi_semaphore(&mut self) -> Result<(), Error<B>> {
        self.ll.fast_command(FastCommand::SemaForce)?;
        Ok(())
    }

    /// Low byte of the dual SPI semaphore status
    pub fn spi_semaphore_status(&mut self) -> Result<u8, Error<B>> {
        Ok(self.ll.spi_sem().read()?.status())
    }

    /// High byte of the dual SPI semaphore status
    ///
    /// Bit 1 is set while SPI2 may take the semaphore, bit 2 while SPI1 may.
    pub fn spi_semaphore_status_hi(&mut self) -> Result<u8, Error<B>> {
        Ok(self.ll.spi_sem().read()?.status_hi())
    }

    /// Reads the status words
    pub fn read_status(&mut self) -> Result<(SysStatus, SysStatusHi), Error<B>> {
        let lo = self.ll.sys_status().read()?.value();
        let hi = self.ll.sys_status_hi().read()?.value();
        Ok((
            SysStatus::from_bits_retain(lo),
            SysStatusHi::from_bits_retain(hi),
        ))
    }

    /// Decodes pending events and calls `handler` for each
    ///
    /// Call this from the interrupt handler of the IRQ line, or poll it.
    pub fn isr<H>(&mut self, handler: &mut H) -> Result<(), Error<B>>
    where
        H: EventHandler<B>,
    {
        let fint = FastStatus::from_bits_retain(self.ll.fint_stat().read()?.value());
        let raw = self.ll.sys_status().read()?.value();
        let wide = FastStatus::SYS_PANIC | FastStatus::SYS_EVENT | FastStatus::CCA_FAIL;
        let hi = if fint.intersects(wide) {
            SysStatusHi::from_bits_retain(self.ll.sys_status_hi().read()?.value())
        } else {
            SysStatusHi::empty()
        };
        let mut status = SysStatus::from_bits_retain(raw);

        let double_buffered = self.radio.double_buffer != DoubleBuffer::Disabled;
        if double_buffered {
            status |= self.fold_rdb_status()?;
        }

        trace!("isr: fint {:#04x}, status {:#010x}, hi {:#06x}", fint.bits(), raw, hi.bits());

        let mut data = CallbackData {
            status: status.bits(),
            status_hi: hi.bits(),
            raw_status: raw,
            dss_stat: (hi & SysStatusHi::DUAL_SPI).bits().to_le_bytes()[1],
            ..CallbackData::default()
        };

        if status.contains(SysStatus::SPICRCE) || hi.intersects(SysStatusHi::PANIC) {
            self.ll.sys_status().write(|w| w.value(SysStatus::SPICRCE.bits()))?;
            self.ll
                .sys_status_hi()
                .write(|w| w.value((hi & SysStatusHi::PANIC).bits()))?;
            handler.spi_error(self, &data);
        }

        if status.contains(SysStatus::SPIRDY) {
            self.ll
                .sys_status()
                .write(|w| w.value((SysStatus::SPIRDY | SysStatus::RCINIT).bits()))?;
            handler.spi_ready(self, &data);
        }

        if status.contains(SysStatus::VWARN) {
            self.ll.sys_status().write(|w| w.value(SysStatus::VWARN.bits()))?;
            handler.device_error(self, &data);
        }

        if hi.intersects(SysStatusHi::DUAL_SPI) {
            self.ll
                .sys_status_hi()
                .write(|w| w.value((hi & SysStatusHi::DUAL_SPI).bits()))?;
            handler.dual_spi_event(self, &data);
        }

        if hi.intersects(SysStatusHi::SYS_EVENT) {
            self.ll
                .sys_status_hi()
                .write(|w| w.value((hi & SysStatusHi::SYS_EVENT).bits()))?;
            handler.sys_event(self, &data);
        }

        if status.contains(SysStatus::TXFRS) {
            self.ll.sys_status().write(|w| w.value(SysStatus::ALL_TX.bits()))?;
            self.reset_pll_bias_trim()?;
            if self.state == DeviceState::Tx {
                self.state = if self.radio.wait_for_response {
                    DeviceState::Rx
                } else {
                    DeviceState::IdlePll
                };
            }
            handler.tx_done(self, &data);
        }

        if hi.contains(SysStatusHi::CCA_FAIL) {
            self.ll
                .sys_status_hi()
                .write(|w| w.value(SysStatusHi::CCA_FAIL.bits()))?;
            if self.state == DeviceState::Tx {
                self.state = DeviceState::IdlePll;
            }
        }

        let event = match self.classify_rx(status) {
            Some(event) => event,
            None => {
                self.report_read_error(handler, &data);
                return Ok(());
            }
        };

        if event == RxEvent::Good || event == RxEvent::FrameReady {
            let finfo = self.read_rx_finfo()?;
            data.datalength = finfo.len;
            if finfo.ranging {
                data.rx_flags |= RxFlags::RNG;
            }
        }
        if status.contains(SysStatus::CIADONE) {
            data.rx_flags |= RxFlags::CIA;
        }
        if status.contains(SysStatus::CIAERR) {
            data.rx_flags |= RxFlags::CER;
        }
        if status.contains(SysStatus::CPERR) {
            data.rx_flags |= RxFlags::CPER;
        }
        if self.radio.sts_mode == StsMode::NoData {
            data.rx_flags |= RxFlags::ND;
        }

        let event = if event == RxEvent::Good && data.datalength == 0 {
            self.classify_zero_length(&mut data)
        } else {
            event
        };

        match event {
            RxEvent::Good => {
                self.ll
                    .sys_status()
                    .write(|w| w.value((SysStatus::ALL_RX_GOOD | SysStatus::CIAERR).bits()))?;
                self.end_reception();
                handler.rx_ok(self, &data);
                if double_buffered {
                    self.signal_rx_buff_free()?;
                }
            }
            RxEvent::FrameReady => {
                self.ll
                    .sys_status()
                    .write(|w| w.value(SysStatus::RXFR.bits()))?;
                handler.frame_ready(self, &data);
            }
            RxEvent::Timeout => {
                self.ll.sys_status().write(|w| {
                    w.value((SysStatus::ALL_RX_TO | SysStatus::ALL_RX_GOOD).bits())
                })?;
                self.end_reception();
                handler.rx_timeout(self, &data);
            }
            RxEvent::Error => {
                self.ll.sys_status().write(|w| {
                    w.value((SysStatus::ALL_RX_ERR | SysStatus::ALL_RX_GOOD).bits())
                })?;
                self.end_reception();
                handler.rx_error(self, &data);
            }
        }

        let cia_only = status.contains(SysStatus::CIADONE) && !status.intersects(SysStatus::ALL_RX_ERR);
        if event == RxEvent::FrameReady && cia_only {
            handler.cia_done(self, &data);
        }

        self.report_read_error(handler, &data);
        Ok(())
    }

    /// Moves the owned buffer's `RDB_STATUS` bits into the main status word
    fn fold_rdb_status(&mut self) -> Result<SysStatus, Error<B>> {
        let rdb = RdbStatus::from_bits_retain(self.ll.rdb_status().read()?.value());
        let own = match self.radio.owned_buffer {
            RxBuffer::Buffer0 => rdb.bits() & 0x0F,
            RxBuffer::Buffer1 => rdb.bits() >> 4,
        };
        if own == 0 {
            return Ok(SysStatus::empty());
        }

        let mut folded = SysStatus::empty();
        if own & RdbStatus::RXFCG0.bits() != 0 {
            folded |= SysStatus::RXFCG;
        }
        if own & RdbStatus::RXFR0.bits() != 0 {
            folded |= SysStatus::RXFR;
        }
        if own & RdbStatus::CIADONE0.bits() != 0 {
            folded |= SysStatus::CIADONE;
        }
        if own & RdbStatus::CP_ERR0.bits() != 0 {
            folded |= SysStatus::CPERR;
        }

        let shift = match self.radio.owned_buffer {
            RxBuffer::Buffer0 => 0,
            RxBuffer::Buffer1 => 4,
        };
        self.ll.rdb_status().write(|w| w.value(own << shift))?;
        Ok(folded)
    }

    fn classify_rx(&self, status: SysStatus) -> Option<RxEvent> {
        if status.intersects(SysStatus::ALL_RX_ERR & !SysStatus::CPERR) {
            return Some(RxEvent::Error);
        }
        if status.intersects(SysStatus::RXFTO | SysStatus::RXPTO) {
            return Some(RxEvent::Timeout);
        }
        if status.contains(SysStatus::RXFCG) {
            return Some(RxEvent::Good);
        }
        if status.contains(SysStatus::RXFR) {
            if self.radio.fcs_rx_disabled {
                return Some(RxEvent::Good);
            }
            return Some(RxEvent::FrameReady);
        }
        if status.contains(SysStatus::CPERR) {
            return Some(RxEvent::Error);
        }
        if self.radio.sts_mode == StsMode::NoData && status.contains(SysStatus::CIADONE) {
            return Some(RxEvent::Good);
        }
        None
    }

    /// Zero-length receptions without a checksum are reported as PHY header
    /// errors, unless [`IsrFlags::LEN0_RXGOOD`] is set
    fn classify_zero_length(&self, data: &mut CallbackData) -> RxEvent {
        if self.radio.isr_flags.contains(IsrFlags::LEN0_RXGOOD) {
            return RxEvent::Good;
        }
        if self.radio.fcs_rx_disabled || self.radio.sts_mode == StsMode::NoData {
            debug!("zero-length frame reported as header error");
            data.status = (SysStatus::from_bits_retain(data.status) & !SysStatus::RXFCG
                | SysStatus::RXPHE)
                .bits();
            return RxEvent::Error;
        }
        RxEvent::Good
    }

    fn end_reception(&mut self) {
        let stays_on = self.radio.rx_auto_reenable || self.radio.double_buffer == DoubleBuffer::Auto;
        if self.state == DeviceState::Rx && !stays_on {
            self.state = DeviceState::IdlePll;
        }
        self.radio.wait_for_response = false;
    }

    fn report_read_error<H>(&mut self, handler: &mut H, data: &CallbackData)
    where
        H: EventHandler<B>,
    {
        if self.ll.take_read_crc_error() {
            handler.spi_read_error(self, data);
        }
    }
}
