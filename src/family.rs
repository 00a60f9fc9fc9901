//! Chip family dispatch
//!
//! All members of the DW3000 family share the register map this crate
//! drives, but differ in PLL calibration, power tables and a handful of
//! analog trims. A [`ChipFamily`] implementation captures those differences.
//! [`probe`] reads the device identifier and picks the implementation.

use embedded_hal::{delay::DelayNs, digital::OutputPin};
use num_enum::TryFromPrimitive;

use crate::{
    configs::Channel,
    hl::{Error, DW3xxx},
    ll::{self, Transport},
    power::{PowerLut, CH5_TABLES, CH9_TABLES},
};

/// How the PLL is calibrated
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PllStrategy {
    /// The chip's calibration engine searches the coarse code
    Hardware = 0,
    /// The driver searches the coarse code itself
    Software = 1,
}

impl PllStrategy {
    /// The other strategy
    pub fn fallback(self) -> Self {
        match self {
            PllStrategy::Hardware => PllStrategy::Software,
            PllStrategy::Software => PllStrategy::Hardware,
        }
    }
}

/// LDO tuning applied when the chip runs hot on one channel
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LdoCompensation {
    /// The channel that needs it
    pub channel: Channel,
    /// Applied above this temperature, in °C
    pub threshold: i8,
    /// Value for `LDO_RLOAD`
    pub rload: u8,
}

/// The differences between members of the DW3000 family
pub trait ChipFamily: Sync {
    /// Human readable name
    fn name(&self) -> &'static str;

    /// The device identifier of the family
    fn dev_id(&self) -> u32;

    /// Bits of the device identifier that select the family
    ///
    /// The revision nibble and the PDoA bit don't.
    fn dev_mask(&self) -> u32 {
        0xFFFF_FF0F
    }

    /// Whether `dev_id` belongs to this family
    fn matches(&self, dev_id: u32) -> bool {
        dev_id & self.dev_mask() == self.dev_id() & self.dev_mask()
    }

    /// Whether the chip with this identifier has the second antenna port
    fn supports_pdoa(&self, dev_id: u32) -> bool {
        dev_id & 0x10 != 0
    }

    /// The PLL calibration strategy to try first
    fn pll_strategy(&self) -> PllStrategy;

    /// Value for `PLL_CFG`
    fn pll_cfg(&self, channel: Channel) -> u16 {
        channel.get_recommended_pll_cfg()
    }

    /// `PLL_CAL.CAL_PARAMS` for the first hardware calibration attempt and
    /// for the retry
    fn pll_cal_params(&self) -> [u8; 2];

    /// Coarse code the software search starts from without a cached one
    fn default_coarse_code(&self, channel: Channel) -> u16;

    /// Transmit power tables
    fn power_tables(&self, channel: Channel) -> &'static [PowerLut] {
        match channel {
            Channel::Channel5 => &CH5_TABLES,
            Channel::Channel9 => &CH9_TABLES,
        }
    }

    /// The largest power boost, in 0.1 dB
    fn max_boost(&self, channel: Channel) -> u16 {
        match channel {
            Channel::Channel5 => 354,
            Channel::Channel9 => 305,
        }
    }

    /// Temperature compensation of the LDOs, if the family needs it
    fn ldo_compensation(&self) -> Option<LdoCompensation>;
}

/// DW3000 (DW3110 and DW3120)
pub struct Dw3000;

impl ChipFamily for Dw3000 {
    fn name(&self) -> &'static str {
        "DW3000"
    }

    fn dev_id(&self) -> u32 {
        0xDECA_0302
    }

    fn pll_strategy(&self) -> PllStrategy {
        PllStrategy::Hardware
    }

    fn pll_cal_params(&self) -> [u8; 2] {
        [0x8, 0x3]
    }

    fn default_coarse_code(&self, channel: Channel) -> u16 {
        match channel {
            Channel::Channel5 => 0x1F,
            Channel::Channel9 => 0x0F,
        }
    }

    fn ldo_compensation(&self) -> Option<LdoCompensation> {
        None
    }
}

/// QM33 (QM33110 and QM33120)
pub struct Qm33;

impl ChipFamily for Qm33 {
    fn name(&self) -> &'static str {
        "QM33"
    }

    fn dev_id(&self) -> u32 {
        0xDECA_0304
    }

    fn pll_strategy(&self) -> PllStrategy {
        PllStrategy::Hardware
    }

    fn pll_cal_params(&self) -> [u8; 2] {
        [0x8, 0x4]
    }

    fn default_coarse_code(&self, _: Channel) -> u16 {
        10
    }

    fn ldo_compensation(&self) -> Option<LdoCompensation> {
        Some(LdoCompensation {
            channel: Channel::Channel9,
            threshold: 70,
            rload: 0x35,
        })
    }
}

/// The DW3000 family
pub static DW3000: Dw3000 = Dw3000;

/// The QM33 family
pub static QM33: Qm33 = Qm33;

/// All families this crate knows
pub static FAMILIES: [&'static dyn ChipFamily; 2] = [&DW3000, &QM33];

/// Time the wake pin is held high
pub(crate) const WAKE_PULSE_US: u32 = 500;

/// Opens the chip on `bus`
///
/// Asserts the wake pin, reads the device identifier and binds the handle to
/// the first of `families` that matches. The handle starts in
/// [`DeviceState::Init`](crate::hl::DeviceState::Init); call
/// [`DW3xxx::wait_idle_rc`] before anything else.
pub fn probe<B, P, D>(
    bus: B,
    wake: &mut P,
    delay: &mut D,
    families: &[&'static dyn ChipFamily],
) -> Result<DW3xxx<B>, Error<B>>
where
    B: Transport,
    P: OutputPin,
    D: DelayNs,
{
    wake.set_high().map_err(|_| Error::WakeIo)?;
    delay.delay_us(WAKE_PULSE_US);
    wake.set_low().map_err(|_| Error::WakeIo)?;

    let mut ll = ll::DW3xxx::new(bus);
    let dev_id = ll.read32(0x00, 0x00)?;

    let family = families
        .iter()
        .copied()
        .find(|family| family.matches(dev_id))
        .ok_or(Error::UnknownDevice(dev_id))?;

    debug!("probed {} ({:#010x})", family.name(), dev_id);
    Ok(DW3xxx::new(ll, family, dev_id))
}

/// Holds the handle an outer layer currently drives
///
/// Replaces process-wide "current device" state: the context is passed to
/// whoever needs the handle, and a higher layer can swap in its own handle
/// and later put the previous one back.
pub struct DriverContext<B> {
    current: Option<DW3xxx<B>>,
}

impl<B> DriverContext<B> {
    /// Creates a context around `handle`
    pub fn new(handle: DW3xxx<B>) -> Self {
        DriverContext {
            current: Some(handle),
        }
    }

    /// Installs `handle` and returns the previous one
    pub fn replace(&mut self, handle: DW3xxx<B>) -> Option<DW3xxx<B>> {
        self.current.replace(handle)
    }

    /// The current handle
    pub fn current(&mut self) -> Option<&mut DW3xxx<B>> {
        self.current.as_mut()
    }

    /// Removes the current handle
    pub fn take(&mut self) -> Option<DW3xxx<B>> {
        self.current.take()
    }
}
