use embedded_hal::delay::DelayNs;

use super::{CalibrationRecord, DeviceState, RadioState, DW3xxx};
use crate::{
    configs::{Config, FcsMode, OtpReadFlags, PdoaMode, SpiCrcMode, StsMode},
    ll::Transport,
    Error,
};

use super::events::SysStatus;

// OTP memory map
const OTP_LDOTUNE_LO: u16 = 0x04;
const OTP_PARTID: u16 = 0x06;
const OTP_LOTID: u16 = 0x07;
const OTP_VBAT: u16 = 0x08;
const OTP_VTEMP: u16 = 0x09;
const OTP_BIAS_TUNE: u16 = 0x0A;
const OTP_XTRIM: u16 = 0x1E;
const OTP_REV: u16 = 0x1F;
const OTP_COARSE_CODES: u16 = 0x35;

// Crystal trim used when OTP holds none
const DEFAULT_XTAL_TRIM: u8 = 0x2E;

const XTAL_TRIM_MASK: u8 = 0x3F;

const BIAS_TUNE_MASK: u32 = 0x1F;

/// Polls of `OTP_STAT` while a word is programmed
const OTP_PROG_POLLS: usize = 100;

const OTP_PROG_DELAY_US: u32 = 10;

/// How long the blocks are held in reset
const SOFT_RESET_US: u32 = 1000;

impl<B: Transport> DW3xxx<B> {
    /// Whether the chip reached IDLE_RC
    pub fn check_idle_rc(&mut self) -> Result<bool, Error<B>> {
        let status = SysStatus::from_bits_retain(self.ll.sys_status().read()?.value());
        Ok(status.contains(SysStatus::RCINIT))
    }

    /// Wait for the chip to leave INIT
    ///
    /// The bus must run at the slow rate until this returns `Ok`.
    pub fn wait_idle_rc(&mut self) -> nb::Result<(), Error<B>> {
        match self.state {
            DeviceState::IdleRc => return Ok(()),
            DeviceState::Init => {}
            _ => return Err(nb::Error::Other(Error::WrongState)),
        }

        if !self.check_idle_rc().map_err(nb::Error::Other)? {
            return Err(nb::Error::WouldBlock);
        }

        self.ll
            .sys_status()
            .write(|w| w.value(SysStatus::RCINIT.bits()))
            .map_err(|error| nb::Error::Other(Error::Bus(error)))?;
        self.state = DeviceState::IdleRc;
        debug!("IDLE_RC reached");
        Ok(())
    }

    /// Loads the factory data from OTP and applies it
    ///
    /// `flags` selects the optional reads. The crystal trim, the OTP
    /// revision and the PLL coarse codes are always read. The calibration
    /// record starts over, seeded with the coarse codes from OTP.
    pub fn initialise(&mut self, flags: OtpReadFlags, delay: &mut impl DelayNs) -> Result<(), Error<B>> {
        if self.state != DeviceState::IdleRc {
            return Err(Error::WrongState);
        }

        if !flags.contains(OtpReadFlags::PLID_DIS) {
            self.otp.ldo_tune = self.read_otp(OTP_LDOTUNE_LO)?;
            self.otp.bias_tune = (self.read_otp(OTP_BIAS_TUNE)? & BIAS_TUNE_MASK) as u8;

            let ldo = self.otp.ldo_tune != 0;
            let bias = self.otp.bias_tune != 0;
            if ldo || bias {
                self.ll
                    .otp_cfg()
                    .modify(|_, w| w.ldo_kick(ldo as u8).bias_kick(bias as u8))?;
                delay.delay_us(OTP_PROG_DELAY_US);
                self.ll
                    .otp_cfg()
                    .modify(|_, w| w.ldo_kick(0).bias_kick(0))?;
            }
        }

        if flags.contains(OtpReadFlags::PID) {
            self.otp.part_id = self.read_otp(OTP_PARTID)?;
        }
        if flags.contains(OtpReadFlags::LID) {
            self.otp.lot_id = self.read_otp(OTP_LOTID)?;
        }

        let references = !flags.contains(OtpReadFlags::VTBAT_DIS);
        if references && flags.contains(OtpReadFlags::BAT) {
            self.otp.vbat_ref = self.read_otp(OTP_VBAT)? as u8;
        }
        if references && flags.contains(OtpReadFlags::TMP) && !flags.contains(OtpReadFlags::TMP_DIS) {
            self.otp.temp_ref = self.read_otp(OTP_VTEMP)? as u8;
        }

        let trim = self.read_otp(OTP_XTRIM)? as u8 & XTAL_TRIM_MASK;
        self.otp.xtal_trim = if trim == 0 { DEFAULT_XTAL_TRIM } else { trim };
        self.set_xtal_trim(self.otp.xtal_trim)?;

        self.otp.otp_rev = self.read_otp(OTP_REV)? as u8;

        let codes = self.read_otp(OTP_COARSE_CODES)?;
        self.cal = CalibrationRecord::new(self.cal.strategy);
        self.cal.coarse_codes = [((codes >> 8) & 0x3FFF) as u16, (codes & 0xFF) as u16];

        debug!(
            "initialised {}, part {:#x}, lot {:#x}, OTP rev {}",
            self.family.name(),
            self.otp.part_id,
            self.otp.lot_id,
            self.otp.otp_rev
        );
        Ok(())
    }

    /// Reads one 32-bit word from OTP
    pub fn read_otp(&mut self, address: u16) -> Result<u32, Error<B>> {
        self.ll.otp_cfg().write(|w| w.otp_man(1))?;
        self.ll.otp_addr().write(|w| w.value(address))?;
        self.ll.otp_cfg().write(|w| w.otp_man(1).otp_read(1))?;
        let value = self.ll.otp_rdata().read()?.value();
        self.ll.otp_cfg().write(|w| w)?;
        Ok(value)
    }

    /// Programs one 32-bit word into OTP and reads it back
    ///
    /// OTP bits can only be set. Meant for field programming, not for
    /// normal operation.
    pub fn write_otp(&mut self, value: u32, address: u16, delay: &mut impl DelayNs) -> Result<(), Error<B>> {
        self.ll.otp_cfg().write(|w| w.otp_man(1))?;
        self.ll.otp_wdata().write(|w| w.value(value))?;
        self.ll.otp_addr().write(|w| w.value(address))?;
        self.ll.otp_cfg().write(|w| w.otp_man(1).otp_write(1))?;

        let mut done = false;
        for _ in 0..OTP_PROG_POLLS {
            delay.delay_us(OTP_PROG_DELAY_US);
            if self.ll.otp_stat().read()?.prog_done() == 1 {
                done = true;
                break;
            }
        }
        self.ll.otp_cfg().write(|w| w)?;

        if !done || self.read_otp(address)? != value {
            warn!("OTP word {:#x} didn't verify", address);
            return Err(Error::OtpVerify);
        }
        Ok(())
    }

    /// Resets the chip's digital blocks
    ///
    /// The handle goes back to INIT with a fresh calibration record and the
    /// radio settings at their defaults. Call
    /// [`wait_idle_rc`](Self::wait_idle_rc) before anything else.
    pub fn soft_reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<B>> {
        self.use_rc_clock()?;
        self.ll.aon_dig_cfg().write(|w| w)?;
        self.ll.aon_ctrl().write(|w| w.cfg_upload(1))?;

        self.ll.soft_rst().write(|w| w.value(0))?;
        delay.delay_us(SOFT_RESET_US);
        self.ll.soft_rst().write(|w| w.value(0xFF))?;

        self.ll.set_crc_mode(SpiCrcMode::Off);
        self.cal = CalibrationRecord::new(self.cal.strategy);
        self.radio = RadioState::default();
        self.state = DeviceState::Init;
        debug!("soft reset");
        Ok(())
    }

    /// Switches SPI CRC protection on or off
    pub fn set_spi_crc(&mut self, mode: SpiCrcMode) -> Result<(), Error<B>> {
        let enable = mode != SpiCrcMode::Off;
        self.ll.sys_cfg().modify(|_, w| w.spi_crcen(enable as u8))?;
        self.ll.set_crc_mode(mode);
        Ok(())
    }

    /// Configures the radio
    ///
    /// The PLL is recalibrated right away if the chip runs on it and the
    /// channel changed. If that calibration fails, the chip is left in
    /// IDLE_RC.
    pub fn configure(&mut self, config: &Config, delay: &mut impl DelayNs) -> Result<(), Error<B>> {
        if self.state != DeviceState::IdleRc && self.state != DeviceState::IdlePll {
            return Err(Error::WrongState);
        }
        if let Err(error) = config.validate() {
            warn!("rejected configuration: {:?}", error);
            return Err(Error::InvalidConfiguration);
        }
        if config.pdoa_mode != PdoaMode::Off && !self.family.supports_pdoa(self.dev_id) {
            return Err(Error::InvalidConfiguration);
        }

        let sts = config.sts_mode != StsMode::Off;
        self.ll.sys_cfg().modify(|_, w| {
            w.phr_mode(config.phr_mode as u8)
                .phr_6m8(config.phr_rate as u8)
                .cp_spc(config.sts_mode.cp_spc())
                .cp_sdc(config.sts_sdc as u8)
                .cia_sts(sts as u8)
                .pdoa_mode(config.pdoa_mode as u8)
        })?;
        self.ll
            .sts_cfg()
            .write(|w| w.cps_len(config.sts_length as u8))?;

        self.ll.chan_ctrl().write(|w| {
            w.rf_chan(config.channel.rf_chan())
                .sfd_type(config.sfd_type as u8)
                .tx_pcode(config.tx_code)
                .rx_pcode(config.rx_code)
        })?;

        // FINE_PLEN takes precedence when it's non-zero
        let preamble = config.tx_preamble_length;
        self.ll.tx_fctrl().modify(|_, w| {
            w.txbr(config.data_rate as u8)
                .txpsr(preamble.txpsr().unwrap_or(0x01))
                .fine_plen(preamble.fine_plen())
        })?;

        self.ll.dtune0().modify(|_, w| w.pac(config.rx_pac as u8))?;
        self.ll
            .rx_sfd_toc()
            .write(|w| w.value(config.sfd_timeout))?;
        self.ll
            .rf_tx_ctrl_2()
            .write(|w| w.value(config.channel.get_recommended_rf_tx_ctrl_2()))?;
        self.ll
            .pll_cfg()
            .write(|w| w.value(self.family.pll_cfg(config.channel)))?;

        self.radio.channel = config.channel;
        self.radio.sts_mode = config.sts_mode;
        self.radio.sts_length = config.sts_length;
        self.radio.pdoa_mode = config.pdoa_mode;

        if self.state == DeviceState::IdlePll && self.cal.channel != Some(config.channel) {
            if let Err(error) = self.calibrate_pll(config.channel, delay) {
                self.use_rc_clock()?;
                self.state = DeviceState::IdleRc;
                return Err(error);
            }
        }
        Ok(())
    }

    /// Selects which checksum checks are done
    pub fn set_fcs_mode(&mut self, mode: FcsMode) -> Result<(), Error<B>> {
        let tx_off = mode == FcsMode::TxOff;
        let rx_off = mode == FcsMode::RxOff;
        self.ll
            .sys_cfg()
            .modify(|_, w| w.dis_fcs_tx(tx_off as u8).dis_fce(rx_off as u8))?;
        self.radio.fcs_rx_disabled = rx_off;
        Ok(())
    }

    /// Sets the receive antenna delay
    pub fn set_rx_antenna_delay(&mut self, delay: u16) -> Result<(), Error<B>> {
        self.ll.cia_conf().modify(|_, w| w.rxantd(delay))?;
        Ok(())
    }

    /// Sets the transmit antenna delay
    ///
    /// The handle keeps the value and restores it after sleep.
    pub fn set_tx_antenna_delay(&mut self, delay: u16) -> Result<(), Error<B>> {
        self.ll.tx_antd().write(|w| w.value(delay))?;
        self.radio.tx_antenna_delay = delay;
        Ok(())
    }

    /// Trims the crystal, only the low 6 bits are used
    pub fn set_xtal_trim(&mut self, trim: u8) -> Result<(), Error<B>> {
        self.ll
            .xtal()
            .write(|w| w.xtal_trim(trim & XTAL_TRIM_MASK))?;
        Ok(())
    }

    /// Selects the PDoA mode
    ///
    /// Only chips with the second antenna port support PDoA. Mode 3 needs
    /// an STS.
    pub fn set_pdoa_mode(&mut self, mode: PdoaMode) -> Result<(), Error<B>> {
        if mode != PdoaMode::Off && !self.family.supports_pdoa(self.dev_id) {
            return Err(Error::InvalidConfiguration);
        }
        if mode == PdoaMode::Mode3 && self.radio.sts_mode == StsMode::Off {
            return Err(Error::InvalidConfiguration);
        }
        self.ll.sys_cfg().modify(|_, w| w.pdoa_mode(mode as u8))?;
        self.radio.pdoa_mode = mode;
        Ok(())
    }

    /// Selects the STS mode
    ///
    /// `sdc` selects the super deterministic code instead of a keyed one.
    pub fn configure_sts_mode(&mut self, mode: StsMode, sdc: bool) -> Result<(), Error<B>> {
        if mode == StsMode::Off && self.radio.pdoa_mode == PdoaMode::Mode3 {
            return Err(Error::InvalidConfiguration);
        }
        let sts = mode != StsMode::Off;
        self.ll.sys_cfg().modify(|_, w| {
            w.cp_spc(mode.cp_spc())
                .cp_sdc((sts && sdc) as u8)
                .cia_sts(sts as u8)
        })?;
        self.radio.sts_mode = mode;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configs::{Channel, DataRate, PreambleLength},
        family::{ChipFamily, PllStrategy, QM33},
        hl::{test_support, TxMode},
        mock::{MockBus, MockDelay, Transaction},
    };

    fn otp_addresses(dw: &mut DW3xxx<MockBus>) -> Vec<u16> {
        dw.ll()
            .bus()
            .transactions()
            .iter()
            .filter_map(|t| match t {
                Transaction::Write {
                    file_id: 0x0B,
                    sub_index: 0x04,
                    data,
                } => Some(u16::from_le_bytes([data[0], data[1]])),
                _ => None,
            })
            .collect()
    }

    fn words(values: &[u32]) -> Vec<[u8; 4]> {
        values.iter().map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn waits_for_idle_rc() {
        let mut dw = test_support::idle_rc();
        dw.state = DeviceState::Init;
        assert!(matches!(dw.wait_idle_rc(), Err(nb::Error::WouldBlock)));

        dw.ll().bus().raise32(0x00, 0x44, SysStatus::RCINIT.bits());
        assert!(dw.check_idle_rc().unwrap());
        dw.wait_idle_rc().unwrap();
        assert_eq!(dw.state(), DeviceState::IdleRc);
        assert_eq!(dw.ll().bus().peek32(0x00, 0x44), 0);

        // Already there
        dw.wait_idle_rc().unwrap();
    }

    #[test]
    fn initialise_reads_selected_otp_words() {
        let mut dw = test_support::idle_rc();
        let responses = words(&[
            0x1234,
            0x33,
            0xAABB,
            0xCCDD,
            0x9A,
            0x80,
            0,
            2,
            (0x20 << 8) | 0x0F,
        ]);
        let responses: Vec<&[u8]> = responses.iter().map(|w| &w[..]).collect();
        dw.ll().bus().script(0x0B, 0x10, &responses);

        let flags = OtpReadFlags::PID | OtpReadFlags::LID | OtpReadFlags::BAT | OtpReadFlags::TMP;
        dw.initialise(flags, &mut MockDelay).unwrap();

        assert_eq!(
            otp_addresses(&mut dw),
            [0x04, 0x0A, 0x06, 0x07, 0x08, 0x09, 0x1E, 0x1F, 0x35]
        );
        let otp = *dw.otp();
        assert_eq!(otp.ldo_tune, 0x1234);
        assert_eq!(otp.bias_tune, 0x13);
        assert_eq!(otp.part_id, 0xAABB);
        assert_eq!(otp.lot_id, 0xCCDD);
        assert_eq!(otp.vbat_ref, 0x9A);
        assert_eq!(otp.temp_ref, 0x80);
        assert_eq!(otp.xtal_trim, DEFAULT_XTAL_TRIM);
        assert_eq!(otp.otp_rev, 2);
        assert_eq!(dw.ll().xtal().read().unwrap().xtal_trim(), DEFAULT_XTAL_TRIM);
        assert_eq!(dw.calibration().coarse_codes, [0x20, 0x0F]);
        assert_eq!(dw.ll().otp_cfg().read().unwrap().ldo_kick(), 0);
    }

    #[test]
    fn initialise_honours_disable_flags() {
        let mut dw = test_support::idle_rc();
        dw.set_pll_calibration_strategy(PllStrategy::Software);
        dw.ll().bus().poke32(0x0B, 0x10, 0x7F);

        let flags = OtpReadFlags::BAT | OtpReadFlags::TMP | OtpReadFlags::VTBAT_DIS | OtpReadFlags::PLID_DIS;
        dw.initialise(flags, &mut MockDelay).unwrap();

        assert_eq!(otp_addresses(&mut dw), [0x1E, 0x1F, 0x35]);
        assert_eq!(dw.otp().vbat_ref, 0);
        assert_eq!(dw.otp().xtal_trim, 0x3F);
        assert_eq!(dw.calibration().strategy, PllStrategy::Software);
    }

    #[test]
    fn initialise_needs_idle_rc() {
        let mut dw = test_support::idle_pll();
        assert!(matches!(
            dw.initialise(OtpReadFlags::empty(), &mut MockDelay),
            Err(Error::WrongState)
        ));
        assert_eq!(dw.ll().bus().write_count(), 0);
    }

    #[test]
    fn otp_write_verifies() {
        let mut dw = test_support::idle_rc();
        dw.ll().bus().poke(0x0B, 0x0C, &[1]);
        dw.ll().bus().poke32(0x0B, 0x10, 0xDEAD_BEEF);
        dw.write_otp(0xDEAD_BEEF, 0x50, &mut MockDelay).unwrap();
        assert_eq!(dw.ll().otp_wdata().read().unwrap().value(), 0xDEAD_BEEF);

        assert!(matches!(
            dw.write_otp(0x1, 0x50, &mut MockDelay),
            Err(Error::OtpVerify)
        ));

        dw.ll().bus().poke(0x0B, 0x0C, &[0]);
        assert!(matches!(
            dw.write_otp(0xDEAD_BEEF, 0x50, &mut MockDelay),
            Err(Error::OtpVerify)
        ));
    }

    #[test]
    fn soft_reset_returns_to_init() {
        let mut dw = test_support::idle_pll();
        dw.configure_double_buffer(crate::configs::DoubleBuffer::Auto).unwrap();
        dw.signal_rx_buff_free().unwrap();

        dw.soft_reset(&mut MockDelay).unwrap();

        assert_eq!(dw.state(), DeviceState::Init);
        assert_eq!(dw.owned_buffer(), crate::hl::RxBuffer::Buffer0);
        assert_eq!(*dw.calibration(), CalibrationRecord::new(QM33.pll_strategy()));
        assert_eq!(dw.ll().soft_rst().read().unwrap().value(), 0xFF);
        assert_eq!(dw.ll().clk_ctrl().read().unwrap().sys_clk(), 1);
    }

    #[test]
    fn spi_crc_switch() {
        let mut dw = test_support::idle_rc();
        dw.set_spi_crc(SpiCrcMode::Write).unwrap();
        assert_eq!(dw.ll().crc_mode(), SpiCrcMode::Write);
        assert_eq!(dw.ll().sys_cfg().read().unwrap().spi_crcen(), 1);

        dw.set_tx_antenna_delay(0x4000).unwrap();
        assert!(dw.ll().bus().last_crc().is_some());

        dw.set_spi_crc(SpiCrcMode::Off).unwrap();
        assert_eq!(dw.ll().crc_mode(), SpiCrcMode::Off);
        assert_eq!(dw.ll().sys_cfg().read().unwrap().spi_crcen(), 0);
    }

    #[test]
    fn configure_programs_radio() {
        let mut dw = test_support::idle_rc();
        let config = Config {
            tx_preamble_length: PreambleLength::new(96).unwrap(),
            tx_code: 10,
            rx_code: 11,
            sfd_timeout: 200,
            data_rate: DataRate::Kbps850,
            ..Default::default()
        };
        dw.configure(&config, &mut MockDelay).unwrap();

        let chan = dw.ll().chan_ctrl().read().unwrap();
        assert_eq!(chan.rf_chan(), 0);
        assert_eq!(chan.sfd_type(), 3);
        assert_eq!(chan.tx_pcode(), 10);
        assert_eq!(chan.rx_pcode(), 11);

        let fctrl = dw.ll().tx_fctrl().read().unwrap();
        assert_eq!(fctrl.txbr(), 0);
        assert_eq!(fctrl.fine_plen(), 11);

        assert_eq!(dw.ll().rx_sfd_toc().read().unwrap().value(), 200);
        assert_eq!(dw.ll().sts_cfg().read().unwrap().cps_len(), 7);
        assert_eq!(dw.ll().pll_cfg().read().unwrap().value(), 0x1F3C);

        // Not on the PLL yet, so no calibration
        assert_eq!(dw.calibration().channel, None);
    }

    #[test]
    fn configure_recalibrates_on_channel_change() {
        let mut dw = test_support::idle_pll();
        assert_eq!(dw.calibration().channel, Some(Channel::Channel5));

        let config = Config {
            channel: Channel::Channel9,
            ..Default::default()
        };
        dw.configure(&config, &mut MockDelay).unwrap();
        assert_eq!(dw.calibration().channel, Some(Channel::Channel9));
        assert_eq!(dw.ll().chan_ctrl().read().unwrap().rf_chan(), 1);

        // Same channel again, no calibration
        dw.ll().bus().clear_log();
        dw.configure(&config, &mut MockDelay).unwrap();
        assert!(!dw
            .ll()
            .bus()
            .transactions()
            .iter()
            .any(|t| matches!(t, Transaction::Write { file_id: 0x09, sub_index: 0x08, .. })));
    }

    #[test]
    fn failed_recalibration_leaves_idle_rc() {
        let mut dw = test_support::idle_pll();
        dw.ll().bus().poke(0x09, 0x10, &[0]);

        let config = Config {
            channel: Channel::Channel9,
            ..Default::default()
        };
        assert!(matches!(dw.configure(&config, &mut MockDelay), Err(Error::PllLock)));
        assert_eq!(dw.state(), DeviceState::IdleRc);
        assert_eq!(dw.calibration().channel, Some(Channel::Channel5));
        assert!(!dw.calibration().locked);
    }

    #[test]
    fn configure_rejects_bad_input() {
        let mut dw = test_support::idle_rc();
        let config = Config {
            rx_code: 40,
            ..Default::default()
        };
        assert!(matches!(
            dw.configure(&config, &mut MockDelay),
            Err(Error::InvalidConfiguration)
        ));

        // No second antenna port on this part
        let config = Config {
            pdoa_mode: PdoaMode::Mode1,
            ..Default::default()
        };
        assert!(matches!(
            dw.configure(&config, &mut MockDelay),
            Err(Error::InvalidConfiguration)
        ));
        assert_eq!(dw.ll().bus().write_count(), 0);

        let mut dw = test_support::idle_pll();
        dw.start_tx(TxMode::Immediate).unwrap();
        assert!(matches!(
            dw.configure(&Config::default(), &mut MockDelay),
            Err(Error::WrongState)
        ));
    }

    #[test]
    fn fcs_mode_bits() {
        let mut dw = test_support::idle_rc();
        dw.set_fcs_mode(FcsMode::RxOff).unwrap();
        let cfg = dw.ll().sys_cfg().read().unwrap();
        assert_eq!((cfg.dis_fcs_tx(), cfg.dis_fce()), (0, 1));
        assert!(dw.radio.fcs_rx_disabled);

        dw.set_fcs_mode(FcsMode::TxOff).unwrap();
        let cfg = dw.ll().sys_cfg().read().unwrap();
        assert_eq!((cfg.dis_fcs_tx(), cfg.dis_fce()), (1, 0));
        assert!(!dw.radio.fcs_rx_disabled);
    }

    #[test]
    fn trims_and_delays() {
        let mut dw = test_support::idle_rc();
        dw.set_xtal_trim(0xFF).unwrap();
        assert_eq!(dw.ll().xtal().read().unwrap().xtal_trim(), 0x3F);

        dw.ll().bus().poke32(0x0E, 0x00, 1 << 20);
        dw.set_rx_antenna_delay(16450).unwrap();
        let cia = dw.ll().cia_conf().read().unwrap();
        assert_eq!(cia.rxantd(), 16450);
        assert_eq!(cia.mindiag(), 1);

        dw.set_tx_antenna_delay(16400).unwrap();
        assert_eq!(dw.ll().tx_antd().read().unwrap().value(), 16400);
        assert_eq!(dw.radio.tx_antenna_delay, 16400);
    }

    #[test]
    fn sts_and_pdoa() {
        let mut dw = test_support::idle_rc();
        dw.dev_id |= 0x10;

        assert!(matches!(
            dw.set_pdoa_mode(PdoaMode::Mode3),
            Err(Error::InvalidConfiguration)
        ));

        dw.configure_sts_mode(StsMode::Mode1, true).unwrap();
        dw.set_pdoa_mode(PdoaMode::Mode3).unwrap();
        let cfg = dw.ll().sys_cfg().read().unwrap();
        assert_eq!(cfg.cp_spc(), 1);
        assert_eq!(cfg.cp_sdc(), 1);
        assert_eq!(cfg.cia_sts(), 1);
        assert_eq!(cfg.pdoa_mode(), 3);

        assert!(matches!(
            dw.configure_sts_mode(StsMode::Off, false),
            Err(Error::InvalidConfiguration)
        ));
    }
}
