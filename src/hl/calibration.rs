//! PLL and receiver calibration
//!
//! The PLL is calibrated whenever the chip moves to IDLE_PLL or changes
//! channel. Two strategies exist: the chip's own calibration engine, and a
//! search driven by the driver that nudges the coarse code using the PLL's
//! too-high/too-low comparators. Whichever is tried first, the other one is
//! the fallback.

use embedded_hal::delay::DelayNs;

use super::{DeviceState, DW3xxx};
use crate::{
    configs::Channel,
    family::PllStrategy,
    ll::Transport,
    Error,
};

/// Default PLL bias trim, restored before each reception
pub const DEFAULT_PLL_BIAS_TRIM: u8 = 7;

/// Temperature reported before the first SAR reading
pub const TEMPERATURE_UNKNOWN: i8 = -127;

/// Polls per hardware calibration attempt
const PLL_LOCK_POLLS: usize = 50;

/// Steps the software search may take
pub const MAX_COARSE_STEPS: u8 = 16;

/// Time the PLL needs to settle on a code
const PLL_SETTLE_US: u32 = 20;

/// Polls of the PGF calibration status
const PGF_CAL_POLLS: usize = 3;

/// I/Q calibration result of a saturated channel
const PGF_CAL_SATURATED: u32 = 0x1FFF_FFFF;

/// What the driver knows about the calibration state of the chip
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationRecord {
    /// The channel the PLL was last calibrated for
    pub channel: Option<Channel>,
    /// Coarse code per channel, indexed by `Channel::rf_chan`, 0 if unknown
    pub coarse_codes: [u16; 2],
    /// Current PLL bias trim
    pub pll_bias_trim: u8,
    /// Whether the last calibration locked
    pub locked: bool,
    /// Steps the last software search took
    pub steps_to_lock: u8,
    /// Strategy tried first
    pub strategy: PllStrategy,
    /// Last SAR temperature in °C, [`TEMPERATURE_UNKNOWN`] if there is none
    pub temperature: i8,
}

impl CalibrationRecord {
    pub(crate) fn new(strategy: PllStrategy) -> Self {
        CalibrationRecord {
            channel: None,
            coarse_codes: [0; 2],
            pll_bias_trim: DEFAULT_PLL_BIAS_TRIM,
            locked: false,
            steps_to_lock: 0,
            strategy,
            temperature: TEMPERATURE_UNKNOWN,
        }
    }
}

/// What the PLL comparators report for a code
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PllReading {
    Locked,
    TooHigh,
    TooLow,
    Unsettled,
}

impl<B: Transport> DW3xxx<B> {
    /// Calibrates the PLL for `channel`
    ///
    /// Tries the preferred strategy, then the other one. The calibration
    /// record only names `channel` once the PLL locked, and the radio moves
    /// to `channel` along with it. Only allowed in IDLE_RC or IDLE_PLL.
    pub fn calibrate_pll(&mut self, channel: Channel, delay: &mut impl DelayNs) -> Result<(), Error<B>> {
        if self.state != DeviceState::IdleRc && self.state != DeviceState::IdlePll {
            return Err(Error::WrongState);
        }

        self.ll.chan_ctrl().modify(|_, w| w.rf_chan(channel.rf_chan()))?;
        self.ll
            .rf_tx_ctrl_2()
            .write(|w| w.value(channel.get_recommended_rf_tx_ctrl_2()))?;
        self.ll
            .pll_cfg()
            .write(|w| w.value(self.family.pll_cfg(channel)))?;
        self.apply_ldo_compensation(channel)?;
        self.reset_pll_bias_trim()?;

        self.cal.locked = false;
        let first = self.cal.strategy;
        for strategy in [first, first.fallback()] {
            let locked = match strategy {
                PllStrategy::Hardware => self.calibrate_pll_hardware(channel, delay)?,
                PllStrategy::Software => self.calibrate_pll_software(channel, delay)?,
            };
            if locked {
                self.cal.locked = true;
                self.cal.channel = Some(channel);
                self.radio.channel = channel;
                return Ok(());
            }
            warn!("{:?} PLL calibration failed on {:?}", strategy, channel);
        }

        Err(Error::PllLock)
    }

    fn calibrate_pll_hardware(&mut self, channel: Channel, delay: &mut impl DelayNs) -> Result<bool, Error<B>> {
        for params in self.family.pll_cal_params() {
            self.ll
                .pll_cal()
                .write(|w| w.cal_params(params).cal_en(1))?;

            for _ in 0..PLL_LOCK_POLLS {
                delay.delay_us(PLL_SETTLE_US);
                if self.ll.pll_status().read()?.lock_det() == 1 {
                    let cc = self.ll.pll_cc().read()?;
                    let code = match channel {
                        Channel::Channel5 => cc.ch5_code(),
                        Channel::Channel9 => cc.ch9_code() as u16,
                    };
                    self.cal.coarse_codes[channel.rf_chan() as usize] = code;
                    return Ok(true);
                }
            }
            debug!("no lock with calibration parameters {:#x}", params);
        }
        Ok(false)
    }

    fn calibrate_pll_software(&mut self, channel: Channel, delay: &mut impl DelayNs) -> Result<bool, Error<B>> {
        let mask = channel.coarse_code_mask() as u16;
        let cached = self.cal.coarse_codes[channel.rf_chan() as usize];
        let mut code = if cached != 0 {
            cached
        } else {
            self.family.default_coarse_code(channel)
        };

        for step in 0..MAX_COARSE_STEPS {
            match channel {
                Channel::Channel5 => self.ll.pll_cc().write(|w| w.ch5_code(code))?,
                Channel::Channel9 => self.ll.pll_cc().write(|w| w.ch9_code(code as u8))?,
            }
            delay.delay_us(PLL_SETTLE_US);

            // Thermometer coded: one more or one less set bit per step
            match self.read_pll()? {
                PllReading::Locked => {
                    self.cal.coarse_codes[channel.rf_chan() as usize] = code;
                    self.cal.steps_to_lock = step;
                    return Ok(true);
                }
                PllReading::TooLow => code = ((code << 1) | 1).min(mask),
                PllReading::TooHigh => code >>= 1,
                PllReading::Unsettled => {}
            }
        }
        Ok(false)
    }

    fn read_pll(&mut self) -> Result<PllReading, Error<B>> {
        let status = self.ll.pll_status().read()?;
        Ok(if status.lock_det() == 1 && status.lock_thr() == 1 {
            PllReading::Locked
        } else if status.too_low() == 1 {
            PllReading::TooLow
        } else if status.too_high() == 1 {
            PllReading::TooHigh
        } else {
            PllReading::Unsettled
        })
    }

    fn apply_ldo_compensation(&mut self, channel: Channel) -> Result<(), Error<B>> {
        let compensation = match self.family.ldo_compensation() {
            Some(compensation) => compensation,
            None => return Ok(()),
        };
        let temperature = self.cal.temperature;
        if compensation.channel == channel
            && temperature != TEMPERATURE_UNKNOWN
            && temperature > compensation.threshold
        {
            debug!("LDO compensation at {} °C", temperature);
            self.ll.ldo_rload().write(|w| w.value(compensation.rload))?;
        }
        Ok(())
    }

    /// Sets the PLL bias trim
    pub fn set_pll_bias_trim(&mut self, trim: u8) -> Result<(), Error<B>> {
        if trim != self.cal.pll_bias_trim {
            self.ll.pll_common().modify(|_, w| w.bias_trim(trim))?;
            self.cal.pll_bias_trim = trim;
        }
        Ok(())
    }

    /// Restores the default PLL bias trim
    pub fn reset_pll_bias_trim(&mut self) -> Result<(), Error<B>> {
        self.set_pll_bias_trim(DEFAULT_PLL_BIAS_TRIM)
    }

    /// Runs the receiver PGF calibration
    pub fn run_pgf_cal(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<B>> {
        self.ll.rx_cal().modify(|_, w| w.cal_mode(1).comp_dly(2))?;
        self.ll.rx_cal().modify(|_, w| w.cal_en(1))?;

        let mut done = false;
        for _ in 0..PGF_CAL_POLLS {
            delay.delay_us(PLL_SETTLE_US);
            if self.ll.rx_cal_sts().read()?.done() == 1 {
                done = true;
                break;
            }
        }

        self.ll.rx_cal().modify(|_, w| w.cal_mode(0).cal_en(0))?;
        if !done {
            return Err(Error::RxCalPgf);
        }
        self.ll.rx_cal_sts().write(|w| w.done(1))?;

        if self.ll.rx_cal_resi().read()?.value() == PGF_CAL_SATURATED {
            return Err(Error::RxCalResI);
        }
        if self.ll.rx_cal_resq().read()?.value() == PGF_CAL_SATURATED {
            return Err(Error::RxCalResQ);
        }
        Ok(())
    }

    fn read_sar(&mut self, delay: &mut impl DelayNs) -> Result<(u8, u8), Error<B>> {
        self.ll.sar_ctrl().write(|w| w.start(1))?;

        let mut done = false;
        for _ in 0..PGF_CAL_POLLS {
            delay.delay_us(PLL_SETTLE_US);
            if self.ll.sar_status().read()?.done() == 1 {
                done = true;
                break;
            }
        }
        let reading = self.ll.sar_reading().read()?;
        self.ll.sar_ctrl().write(|w| w.start(0))?;

        if !done {
            warn!("SAR reading timed out");
        }
        Ok((reading.vbat(), reading.temp()))
    }

    /// Measures the chip temperature in °C
    ///
    /// The result is kept for the LDO compensation of the next PLL
    /// calibration.
    pub fn read_temperature(&mut self, delay: &mut impl DelayNs) -> Result<f32, Error<B>> {
        #[allow(unused_imports)]
        use micromath::F32Ext;

        let (_, raw) = self.read_sar(delay)?;
        let celsius = (raw as f32 - self.otp.temp_ref as f32) * 1.05 + 22.0;
        self.cal.temperature = celsius.round().clamp(-126.0, 127.0) as i8;
        Ok(celsius)
    }

    /// Measures the supply voltage in volts
    pub fn read_vbat(&mut self, delay: &mut impl DelayNs) -> Result<f32, Error<B>> {
        let (raw, _) = self.read_sar(delay)?;
        Ok((raw as f32 - self.otp.vbat_ref as f32) / 173.0 + 3.0)
    }
}
