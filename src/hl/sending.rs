use super::{DeviceState, DW3xxx};
use crate::{
    configs::TxConfig,
    ll::{CodecError, FastCommand, Transport, TX_BUFFER},
    power::{self, PowerIndexes, TxAdjustment, TxBoost},
    time::{Duration, Instant},
    Error,
};

use super::events::SysStatus;

/// Size of the transmit buffer
pub const TX_BUFFER_LEN: u16 = 1024;

/// Length of the frame check sequence the chip appends
pub const FCS_LEN: u16 = 2;

/// When a delayed transmission or reception starts
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Delay {
    /// At an absolute system time
    At(Instant),
    /// After the time in `DREF_TIME`, see [`DW3xxx::set_reference_time`]
    AfterReference(Duration),
    /// After the timestamp of the last received frame
    AfterRx(Duration),
    /// After the timestamp of the last sent frame
    AfterTx(Duration),
}

impl Delay {
    pub(crate) fn dx_time(&self) -> u32 {
        match self {
            Delay::At(instant) => instant.high_word(),
            Delay::AfterReference(delay) | Delay::AfterRx(delay) | Delay::AfterTx(delay) => {
                delay.high_word()
            }
        }
    }
}

/// How a transmission is started
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxMode {
    /// Right away
    Immediate,
    /// At a later time
    Delayed(Delay),
    /// Right away, if the channel is clear
    Cca,
}

impl TxMode {
    fn command(&self, wait_for_response: bool) -> FastCommand {
        use FastCommand::*;

        match (self, wait_for_response) {
            (TxMode::Immediate, false) => Tx,
            (TxMode::Immediate, true) => TxW4r,
            (TxMode::Cca, false) => CcaTx,
            (TxMode::Cca, true) => CcaTxW4r,
            (TxMode::Delayed(Delay::At(_)), false) => DelayedTx,
            (TxMode::Delayed(Delay::At(_)), true) => DelayedTxW4r,
            (TxMode::Delayed(Delay::AfterReference(_)), false) => DelayedTxRef,
            (TxMode::Delayed(Delay::AfterReference(_)), true) => DelayedTxRefW4r,
            (TxMode::Delayed(Delay::AfterRx(_)), false) => DelayedTxRs,
            (TxMode::Delayed(Delay::AfterRx(_)), true) => DelayedTxRsW4r,
            (TxMode::Delayed(Delay::AfterTx(_)), false) => DelayedTxTs,
            (TxMode::Delayed(Delay::AfterTx(_)), true) => DelayedTxTsW4r,
        }
    }
}

impl<B: Transport> DW3xxx<B> {
    /// Writes frame data into the transmit buffer
    ///
    /// `data` excludes the FCS, which the chip appends.
    pub fn write_tx_data(&mut self, data: &[u8], offset: u16) -> Result<(), Error<B>> {
        let end = offset as usize + data.len() + FCS_LEN as usize;
        if end > TX_BUFFER_LEN as usize {
            return Err(CodecError::InvalidLength(end).into());
        }

        self.ll.write_at(TX_BUFFER, offset, data)?;
        Ok(())
    }

    /// Sets length, offset and ranging bit of the next frame
    pub fn write_tx_fctrl(&mut self, config: &TxConfig) -> Result<(), Error<B>> {
        let end = config.buffer_offset as usize + config.frame_len as usize;
        if end > TX_BUFFER_LEN as usize {
            return Err(CodecError::InvalidLength(end).into());
        }

        self.ll.tx_fctrl().modify(|_, w| {
            w.txflen(config.frame_len)
                .tr(config.ranging as u8)
                .txb_offset(config.buffer_offset)
        })?;
        Ok(())
    }

    /// Sets the reference time of [`Delay::AfterReference`]
    pub fn set_reference_time(&mut self, time: Instant) -> Result<(), Error<B>> {
        self.ll.dref_time().write(|w| w.value(time.high_word()))?;
        Ok(())
    }

    /// Starts the transmission of the frame in the transmit buffer
    pub fn start_tx(&mut self, mode: TxMode) -> Result<(), Error<B>> {
        self.start_tx_inner(mode, false)
    }

    /// Starts a transmission and turns the receiver on once it's done
    pub fn start_tx_expect_response(&mut self, mode: TxMode) -> Result<(), Error<B>> {
        self.start_tx_inner(mode, true)
    }

    fn start_tx_inner(&mut self, mode: TxMode, wait_for_response: bool) -> Result<(), Error<B>> {
        if self.state != DeviceState::IdlePll {
            return Err(Error::WrongState);
        }

        if let TxMode::Delayed(delay) = mode {
            self.ll.dx_time().write(|w| w.value(delay.dx_time()))?;
        }

        self.ll.fast_command(mode.command(wait_for_response))?;

        if let TxMode::Delayed(_) = mode {
            let status = SysStatus::from_bits_retain(self.ll.sys_status().read()?.value());
            if status.contains(SysStatus::HPDWARN) {
                warn!("delayed transmission started too late");
                self.force_trx_off()?;
                return Err(Error::DelayedTooLate);
            }
        }

        self.state = DeviceState::Tx;
        self.radio.wait_for_response = wait_for_response;
        Ok(())
    }

    /// Wait for the transmission to finish
    ///
    /// This method returns an `nb::Result` to indicate whether the transmission
    /// has finished, or whether it is still ongoing. You can use this to busily
    /// wait for the transmission to finish, for example using `nb`'s `block!`
    /// macro, or use [`DW3xxx::isr`] instead.
    pub fn wait_transmit(&mut self) -> nb::Result<Instant, Error<B>> {
        let status = self
            .ll
            .sys_status()
            .read()
            .map_err(|error| nb::Error::Other(Error::Bus(error)))?;

        // Has the frame been sent?
        if !SysStatus::from_bits_retain(status.value()).contains(SysStatus::TXFRS) {
            return Err(nb::Error::WouldBlock);
        }

        self.ll
            .sys_status()
            .write(|w| w.value(SysStatus::ALL_TX.bits()))
            .map_err(|error| nb::Error::Other(Error::Bus(error)))?;
        self.reset_pll_bias_trim().map_err(nb::Error::Other)?;

        if self.state == DeviceState::Tx {
            self.state = if self.radio.wait_for_response {
                DeviceState::Rx
            } else {
                DeviceState::IdlePll
            };
        }

        self.read_tx_timestamp().map_err(nb::Error::Other)
    }

    /// Returns the timestamp of the last sent frame
    pub fn read_tx_timestamp(&mut self) -> Result<Instant, Error<B>> {
        let stamp = self.ll.tx_time().read()?.tx_stamp();
        Ok(Instant::from_register(stamp))
    }

    /// Programs the transmit power
    ///
    /// Also applies the PLL bias trim that goes with the setting. It stays in
    /// effect until the next transmission ends or the receiver is enabled.
    pub fn set_tx_power(&mut self, adjustment: &TxAdjustment) -> Result<(), Error<B>> {
        let setting = adjustment.tx_power_setting.to_le_bytes();
        self.ll
            .tx_power()
            .write(|w| w.data(setting[0]).phr(setting[1]).shr(setting[2]).sts(setting[3]))?;
        self.set_pll_bias_trim(adjustment.pll_bias)
    }

    /// Turns per-section power indexes into a setting for the current channel
    pub fn calculate_tx_power(&self, indexes: &mut PowerIndexes) -> Result<TxAdjustment, Error<B>> {
        let tables = self.family.power_tables(self.radio.channel);
        Ok(power::calculate_linear_tx_power(tables, indexes)?)
    }

    /// Finds the power index of a `TX_POWER` byte on the current channel
    pub fn tx_power_to_index(&self, tx_power: u8) -> Result<u8, Error<B>> {
        let tables = self.family.power_tables(self.radio.channel);
        Ok(power::convert_tx_power_to_index(tables, tx_power)?)
    }

    /// Raises a reference power by `boost` (in 0.1 dB) on the current channel
    pub fn adjust_tx_power(&self, boost: u16, reference: u32) -> Result<TxBoost, Error<B>> {
        let channel = self.radio.channel;
        let tables = self.family.power_tables(channel);
        let max_boost = self.family.max_boost(channel);
        Ok(power::adjust_tx_power(tables, max_boost, boost, reference)?)
    }
}
