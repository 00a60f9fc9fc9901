//! High-level interface to the DW3xxx
//!
//! The entry point to this API is the [DW3xxx] struct. Please refer to the
//! documentation there for more details.
//!
//! This module implements a high-level interface to the DW3xxx. This is the
//! recommended way to access the DW3xxx using this crate, unless you need the
//! greater flexibility provided by the [register-level interface].
//!
//! [register-level interface]: ../ll/index.html

use core::fmt;

use crate::{
    configs::{AesConfig, Channel, DoubleBuffer, PdoaMode, SleepConfig, StsLength, StsMode},
    family::{ChipFamily, PllStrategy},
    ll,
};

pub use aes::*;
pub use calibration::*;
pub use error::*;
pub use events::*;
pub use receiving::*;
pub use sending::*;

mod aes;
mod calibration;
mod error;
mod events;
mod init;
mod receiving;
mod sending;
mod sleeping;
mod state;

/// Entry point to the DW3xxx driver API
///
/// A handle is created by [`probe`](crate::family::probe), which binds it to
/// the matching [`ChipFamily`]. It starts out in [`DeviceState::Init`].
pub struct DW3xxx<B> {
    ll: ll::DW3xxx<B>,
    family: &'static dyn ChipFamily,
    dev_id: u32,
    state: DeviceState,
    cal: CalibrationRecord,
    otp: OtpData,
    radio: RadioState,
    irq: &'static dyn IrqControl,
}

/// The operating state of the chip, as far as the driver knows
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// Right after power-up or reset, before the RC clock is stable
    Init,
    /// Idle, running on the RC oscillator
    IdleRc,
    /// Idle, running on the locked PLL
    IdlePll,
    /// Transmitting
    Tx,
    /// Receiving
    Rx,
    /// Asleep, configuration kept in AON memory
    Sleeping,
}

/// Which receive buffer the host currently owns
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxBuffer {
    /// `RX_BUFFER_0`
    Buffer0,
    /// `RX_BUFFER_1`
    Buffer1,
}

impl RxBuffer {
    /// The other buffer
    pub fn toggled(self) -> Self {
        match self {
            RxBuffer::Buffer0 => RxBuffer::Buffer1,
            RxBuffer::Buffer1 => RxBuffer::Buffer0,
        }
    }

    pub(crate) fn file_id(self) -> u8 {
        match self {
            RxBuffer::Buffer0 => ll::RX_BUFFER_0,
            RxBuffer::Buffer1 => ll::RX_BUFFER_1,
        }
    }

    pub(crate) fn diag_offset(self) -> u16 {
        match self {
            RxBuffer::Buffer0 => 0,
            RxBuffer::Buffer1 => ll::DB_DIAG_SET_1,
        }
    }
}

/// Factory data read from OTP by [`DW3xxx::initialise`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OtpData {
    /// Part identifier
    pub part_id: u32,
    /// Lot identifier
    pub lot_id: u32,
    /// SAR battery reading at 3.0 V
    pub vbat_ref: u8,
    /// SAR temperature reading at 22 °C
    pub temp_ref: u8,
    /// Bias tune
    pub bias_tune: u8,
    /// Crystal trim
    pub xtal_trim: u8,
    /// OTP layout revision
    pub otp_rev: u8,
    /// LDO tune, low word
    pub ldo_tune: u32,
}

/// Interrupt line control
///
/// Critical sections of the driver disable the radio's interrupt through
/// this. The default does nothing, which is fine when the event dispatcher
/// isn't called from an interrupt handler.
pub trait IrqControl: Sync {
    /// Disables the radio interrupt, returns whether it was enabled
    fn disable(&self) -> bool;

    /// Re-enables the radio interrupt if `was_enabled`
    fn restore(&self, was_enabled: bool);
}

/// [`IrqControl`] that doesn't control anything
pub struct NoIrqControl;

impl IrqControl for NoIrqControl {
    fn disable(&self) -> bool {
        false
    }

    fn restore(&self, _: bool) {}
}

static NO_IRQ_CONTROL: NoIrqControl = NoIrqControl;

/// Keeps the radio interrupt disabled while alive
pub(crate) struct IrqGuard {
    control: &'static dyn IrqControl,
    was_enabled: bool,
}

impl IrqGuard {
    pub(crate) fn new(control: &'static dyn IrqControl) -> Self {
        let was_enabled = control.disable();
        IrqGuard {
            control,
            was_enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        self.control.restore(self.was_enabled);
    }
}

/// Settings the driver keeps so it can interpret events and readings
#[derive(Clone, Copy, Debug)]
pub(crate) struct RadioState {
    channel: Channel,
    sts_mode: StsMode,
    sts_length: StsLength,
    pdoa_mode: PdoaMode,
    fcs_rx_disabled: bool,
    double_buffer: DoubleBuffer,
    owned_buffer: RxBuffer,
    rx_auto_reenable: bool,
    wait_for_response: bool,
    sleep: SleepConfig,
    tx_antenna_delay: u16,
    isr_flags: IsrFlags,
    aes: Option<AesConfig>,
}

impl Default for RadioState {
    fn default() -> Self {
        RadioState {
            channel: Channel::default(),
            sts_mode: StsMode::Off,
            sts_length: StsLength::default(),
            pdoa_mode: PdoaMode::Off,
            fcs_rx_disabled: false,
            double_buffer: DoubleBuffer::Disabled,
            owned_buffer: RxBuffer::Buffer0,
            rx_auto_reenable: false,
            wait_for_response: false,
            sleep: SleepConfig::default(),
            tx_antenna_delay: 0,
            isr_flags: IsrFlags::empty(),
            aes: None,
        }
    }
}

impl<B> DW3xxx<B> {
    pub(crate) fn new(ll: ll::DW3xxx<B>, family: &'static dyn ChipFamily, dev_id: u32) -> Self {
        DW3xxx {
            ll,
            family,
            dev_id,
            state: DeviceState::Init,
            cal: CalibrationRecord::new(family.pll_strategy()),
            otp: OtpData::default(),
            radio: RadioState::default(),
            irq: &NO_IRQ_CONTROL,
        }
    }

    /// Provides direct access to the register-level API
    ///
    /// Be aware that by using the register-level API, you can invalidate
    /// various assumptions that the high-level API makes about the operation of
    /// the DW3xxx. Don't use the register-level and high-level APIs in tandem,
    /// unless you know what you're doing.
    pub fn ll(&mut self) -> &mut ll::DW3xxx<B> {
        &mut self.ll
    }

    /// The chip family the handle was bound to at probe time
    pub fn family(&self) -> &'static dyn ChipFamily {
        self.family
    }

    /// The device identifier read at probe time
    pub fn dev_id(&self) -> u32 {
        self.dev_id
    }

    /// The state the driver believes the chip is in
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The calibration record
    pub fn calibration(&self) -> &CalibrationRecord {
        &self.cal
    }

    /// The factory data read at initialisation
    pub fn otp(&self) -> &OtpData {
        &self.otp
    }

    /// The receive buffer the host owns
    ///
    /// Frame data, frame info and timestamps are read from this buffer.
    pub fn owned_buffer(&self) -> RxBuffer {
        self.radio.owned_buffer
    }

    /// Installs the interrupt line control used by critical sections
    pub fn set_irq_control(&mut self, control: &'static dyn IrqControl) {
        self.irq = control;
    }

    /// Selects the PLL calibration strategy tried first
    ///
    /// The other strategy is still used as a fallback.
    pub fn set_pll_calibration_strategy(&mut self, strategy: PllStrategy) {
        self.cal.strategy = strategy;
    }

    /// Releases the bus
    pub fn free(self) -> B {
        self.ll.free()
    }
}

// Can't be derived without putting requirements on `B`.
impl<B> fmt::Debug for DW3xxx<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "DW3xxx {{ family: {}, state: {:?}, .. }}",
            self.family.name(),
            self.state
        )
    }
}
