//! Configuration structs for the radio
//!
//! This module houses the datastructures that control how frames are
//! transmitted and received, how the chip sleeps and wakes, and how the AES
//! block is set up. The configs are passed to the corresponding methods of
//! [`DW3xxx`](crate::hl::DW3xxx).

use bitflags::bitflags;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

pub use crate::ll::SpiCrcMode;

/// Radio configuration
///
/// Transmitter and receiver need to agree on everything but the PAC size and
/// the SFD timeout for frames to be received.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// The channel to operate on
    pub channel: Channel,
    /// The length of the transmitted preamble
    pub tx_preamble_length: PreambleLength,
    /// The preamble acquisition chunk size of the receiver
    pub rx_pac: PacSize,
    /// The preamble code used by the transmitter
    pub tx_code: u8,
    /// The preamble code the receiver looks for
    pub rx_code: u8,
    /// The start-of-frame delimiter
    pub sfd_type: SfdType,
    /// The data rate of the payload
    pub data_rate: DataRate,
    /// Standard (127 byte) or extended (1023 byte) frames
    pub phr_mode: PhrMode,
    /// The rate the PHY header is sent at
    pub phr_rate: PhrRate,
    /// SFD timeout in symbols
    ///
    /// Preamble length + 1 + SFD length - PAC size is a good starting point.
    pub sfd_timeout: u16,
    /// Scrambled timestamp sequence mode
    pub sts_mode: StsMode,
    /// Use the super deterministic STS code instead of a keyed one
    pub sts_sdc: bool,
    /// The length of the STS
    pub sts_length: StsLength,
    /// Phase difference of arrival mode
    pub pdoa_mode: PdoaMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            channel: Channel::default(),
            tx_preamble_length: PreambleLength::default(),
            rx_pac: PacSize::default(),
            tx_code: 9,
            rx_code: 9,
            sfd_type: SfdType::default(),
            data_rate: DataRate::default(),
            phr_mode: PhrMode::Standard,
            phr_rate: PhrRate::Standard,
            sfd_timeout: DEFAULT_SFD_TIMEOUT,
            sts_mode: StsMode::Off,
            sts_sdc: false,
            sts_length: StsLength::default(),
            pdoa_mode: PdoaMode::Off,
        }
    }
}

/// The SFD timeout the chip comes out of reset with
pub const DEFAULT_SFD_TIMEOUT: u16 = 129;

impl Config {
    /// Checks the configuration for combinations the chip can't do
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=32).contains(&self.tx_code) || !(1..=32).contains(&self.rx_code) {
            return Err(ConfigError::PreambleCode);
        }
        if self.sfd_timeout == 0 {
            return Err(ConfigError::SfdTimeout);
        }
        if self.data_rate == DataRate::Kbps850 && self.sts_mode == StsMode::NoData {
            return Err(ConfigError::RateWithoutData);
        }
        if self.pdoa_mode == PdoaMode::Mode3 && self.sts_mode == StsMode::Off {
            return Err(ConfigError::PdoaNeedsSts);
        }
        Ok(())
    }

    /// Whether the preamble codes select the 64 MHz PRF
    pub fn prf_64mhz(&self) -> bool {
        self.rx_code >= 9
    }
}

/// Why a [`Config`] was rejected
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Preamble codes must be within 1..=32
    PreambleCode,
    /// The SFD timeout must not be zero
    SfdTimeout,
    /// The no-data STS mode doesn't go with the 850 kbps rate
    RateWithoutData,
    /// PDoA mode 3 needs an STS
    PdoaNeedsSts,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// The UWB channels the DW3000 family supports
pub enum Channel {
    /// Channel 5
    /// - Center frequency: 6489.6 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel5 = 5,
    /// Channel 9
    /// - Center frequency: 7987.2 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel9 = 9,
}

impl Default for Channel {
    fn default() -> Self {
        Channel::Channel5
    }
}

impl Channel {
    /// The value of the `CHAN_CTRL.RF_CHAN` bit
    pub fn rf_chan(&self) -> u8 {
        match self {
            Channel::Channel5 => 0,
            Channel::Channel9 => 1,
        }
    }

    /// Gets the recommended value for the rf_tx_ctrl_2 register
    pub fn get_recommended_rf_tx_ctrl_2(&self) -> u32 {
        match self {
            Channel::Channel5 => 0x1C07_1134,
            Channel::Channel9 => 0x1C01_0034,
        }
    }

    /// Gets the recommended value for the pll_cfg register
    pub fn get_recommended_pll_cfg(&self) -> u16 {
        match self {
            Channel::Channel5 => 0x1F3C,
            Channel::Channel9 => 0x0F3C,
        }
    }

    /// The widest coarse code the PLL accepts on this channel
    pub fn coarse_code_mask(&self) -> u32 {
        match self {
            Channel::Channel5 => 0x3FFF,
            Channel::Channel9 => 0xFF,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Length of the preamble in symbols
///
/// Longer preambles improve the reception quality and thus range. This comes
/// at the cost of longer transmission times and thus power consumption and
/// bandwidth use.
pub struct PreambleLength(u16);

impl PreambleLength {
    /// Creates a preamble length
    ///
    /// Valid lengths are 16 to 2048 in steps of 8, and 4096.
    pub fn new(symbols: u16) -> Option<Self> {
        let valid = symbols == 4096 || ((16..=2048).contains(&symbols) && symbols % 8 == 0);
        if valid {
            Some(PreambleLength(symbols))
        } else {
            None
        }
    }

    /// The length in symbols
    pub fn symbols(&self) -> u16 {
        self.0
    }

    /// The `TX_FCTRL.TXPSR` code for the standard lengths
    ///
    /// Returns `None` for lengths that need `TX_FCTRL.FINE_PLEN`.
    pub fn txpsr(&self) -> Option<u8> {
        match self.0 {
            32 => Some(0x04),
            64 => Some(0x01),
            72 => Some(0x07),
            128 => Some(0x05),
            256 => Some(0x09),
            512 => Some(0x0D),
            1024 => Some(0x02),
            1536 => Some(0x06),
            2048 => Some(0x0A),
            4096 => Some(0x03),
            _ => None,
        }
    }

    /// The `TX_FCTRL.FINE_PLEN` value, for non-standard lengths
    pub fn fine_plen(&self) -> u8 {
        match self.txpsr() {
            Some(_) => 0,
            None => (self.0 / 8 - 1) as u8,
        }
    }

    /// Gets the recommended PAC size based on the preamble length
    pub fn get_recommended_pac_size(&self) -> PacSize {
        match self.0 {
            0..=127 => PacSize::Pac4,
            128..=255 => PacSize::Pac8,
            256..=1023 => PacSize::Pac16,
            _ => PacSize::Pac32,
        }
    }
}

impl Default for PreambleLength {
    fn default() -> Self {
        PreambleLength(128)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Preamble acquisition chunk size
pub enum PacSize {
    /// 8 symbols, for preambles of 128 symbols or less
    Pac8 = 0,
    /// 16 symbols, for 256 or 512 symbol preambles
    Pac16 = 1,
    /// 32 symbols, for 1024 symbols and up
    Pac32 = 2,
    /// 4 symbols, for very short preambles
    Pac4 = 3,
}

impl Default for PacSize {
    fn default() -> Self {
        PacSize::Pac8
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Start-of-frame delimiter sequence
pub enum SfdType {
    /// IEEE 802.15.4a 8 symbol SFD
    Ieee4a = 0,
    /// Decawave 8 symbol SFD
    Dw8 = 1,
    /// Decawave 16 symbol SFD
    Dw16 = 2,
    /// IEEE 802.15.4z 8 symbol SFD
    Ieee4z = 3,
}

impl Default for SfdType {
    fn default() -> Self {
        SfdType::Ieee4z
    }
}

impl SfdType {
    /// The length of the SFD in symbols
    pub fn symbols(&self) -> u16 {
        match self {
            SfdType::Dw16 => 16,
            _ => 8,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The bitrate at which the payload is transmitted
pub enum DataRate {
    /// 850 kilobits per second
    Kbps850 = 0,
    /// 6.8 megabits per second
    Mbps6_8 = 1,
}

impl Default for DataRate {
    fn default() -> Self {
        DataRate::Mbps6_8
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// PHY header mode
pub enum PhrMode {
    /// IEEE standard frames of up to 127 bytes
    Standard = 0,
    /// Decawave proprietary frames of up to 1023 bytes
    Extended = 1,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// PHY header rate
pub enum PhrRate {
    /// 850 kbps
    Standard = 0,
    /// The data rate
    DataRate = 1,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Scrambled timestamp sequence mode
pub enum StsMode {
    /// No STS
    Off = 0,
    /// STS after the SFD, before the PHR
    Mode1 = 1,
    /// STS after the payload
    Mode2 = 2,
    /// STS only, no PHR or payload
    NoData = 3,
}

impl StsMode {
    /// Value of the `SYS_CFG.CP_SPC` field
    pub fn cp_spc(&self) -> u8 {
        *self as u8
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Length of the STS in symbols
pub enum StsLength {
    /// 16 symbols
    Symbols16 = 1,
    /// 32 symbols
    Symbols32 = 3,
    /// 64 symbols
    Symbols64 = 7,
    /// 128 symbols
    Symbols128 = 15,
    /// 256 symbols
    Symbols256 = 31,
    /// 512 symbols
    Symbols512 = 63,
    /// 1024 symbols
    Symbols1024 = 127,
    /// 2048 symbols
    Symbols2048 = 255,
}

impl Default for StsLength {
    fn default() -> Self {
        StsLength::Symbols64
    }
}

impl StsLength {
    /// The length in symbols
    pub fn symbols(&self) -> u16 {
        (*self as u16 + 1) * 8
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Phase difference of arrival mode
pub enum PdoaMode {
    /// No PDoA
    Off = 0,
    /// PDoA on the preamble
    Mode1 = 1,
    /// PDoA on the STS, split in two halves
    Mode3 = 3,
}

/// Transmit frame control
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxConfig {
    /// Frame length including the 2-byte FCS
    pub frame_len: u16,
    /// Offset into the TX buffer the frame starts at
    pub buffer_offset: u16,
    /// Set the ranging bit in the PHY header
    pub ranging: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Which checksum checks are on
pub enum FcsMode {
    /// FCS generated on TX and checked on RX
    Enabled = 0,
    /// No FCS appended on TX
    TxOff = 1,
    /// Received frames are not checked
    RxOff = 2,
}

bitflags! {
    /// Actions the chip performs when it wakes up
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct OnWake: u16 {
        /// Run the PGF calibration
        const PGFCAL = 0x800;
        /// Enable the receiver
        const GOTORX = 0x200;
        /// Go to IDLE_PLL
        const GOTOIDLE = 0x100;
        /// Load the LDO tune from OTP
        const LOADLDO = 0x10;
        /// Load the DGC tables from OTP
        const LOADDGC = 0x8;
        /// Load the bias trim from OTP
        const LOADBIAS = 0x4;
        /// Run the SAR (temperature and voltage)
        const RUNSAR = 0x2;
        /// Restore the configuration from AON
        const CONFIG = 0x1;
    }
}

bitflags! {
    /// How the chip goes to sleep and what wakes it up
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct WakeFlags: u8 {
        /// Keep the sleep enable across wake ups
        const PRES_SLEEP = 0x20;
        /// Wake up on the WAKEUP pin
        const WAKE_WUP = 0x10;
        /// Wake up on chip select
        const WAKE_CSN = 0x8;
        /// Keep the brownout detector on
        const BROUT_EN = 0x4;
        /// Sleep (as opposed to deep sleep)
        const SLEEP = 0x2;
        /// Enable sleep or deep sleep
        const SLP_EN = 0x1;
    }
}

bitflags! {
    /// What [`initialise`](crate::hl::DW3xxx::initialise) reads from OTP
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct OtpReadFlags: u8 {
        /// Don't load the LDO tune and bias trim
        const PLID_DIS = 0x10;
        /// Don't read the SAR battery and temperature references
        const VTBAT_DIS = 0x40;
        /// Don't read the temperature reference
        const TMP_DIS = 0x80;
        /// Read the part identifier
        const PID = 0x01;
        /// Read the lot identifier
        const LID = 0x02;
        /// Read the battery reference
        const BAT = 0x04;
        /// Read the temperature reference
        const TMP = 0x08;
    }
}

/// Sleep configuration
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SleepConfig {
    /// What happens on wake up
    pub on_wake: OnWake,
    /// Wake sources and sleep mode
    pub wake: WakeFlags,
}

impl Default for SleepConfig {
    fn default() -> Self {
        SleepConfig {
            on_wake: OnWake::CONFIG | OnWake::GOTOIDLE | OnWake::LOADLDO | OnWake::LOADBIAS,
            wake: WakeFlags::WAKE_WUP | WakeFlags::WAKE_CSN | WakeFlags::SLP_EN,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// How [`set_interrupt`](crate::hl::DW3xxx::set_interrupt) treats the mask
pub enum InterruptOption {
    /// Disable the given events, leave the others
    Disable,
    /// Enable the given events, leave the others
    Enable,
    /// Enable only the given events
    EnableOnly,
    /// Enable the given events and the dual SPI events
    EnableDualSpi,
    /// Enable only the given events and the dual SPI events
    EnableOnlyDualSpi,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Receive double buffering
pub enum DoubleBuffer {
    /// One receive buffer
    Disabled,
    /// Two buffers, receiver re-enabled automatically
    Auto,
    /// Two buffers, host re-enables the receiver
    Manual,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Size of the AES message integrity code
pub enum MicSize {
    /// No MIC
    Mic0 = 0,
    /// 4 bytes
    Mic4 = 1,
    /// 6 bytes
    Mic6 = 2,
    /// 8 bytes
    Mic8 = 3,
    /// 10 bytes
    Mic10 = 4,
    /// 12 bytes
    Mic12 = 5,
    /// 14 bytes
    Mic14 = 6,
    /// 16 bytes
    Mic16 = 7,
}

impl MicSize {
    /// The MIC length in bytes
    pub fn bytes(&self) -> usize {
        match self {
            MicSize::Mic0 => 0,
            m => 2 + 2 * (*m as usize),
        }
    }

    /// Returns the MIC size for a length in bytes
    pub fn from_bytes(len: usize) -> Option<Self> {
        match len {
            0 => Some(MicSize::Mic0),
            4..=16 if len % 2 == 0 => MicSize::try_from_primitive(((len - 2) / 2) as u8).ok(),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// AES key size
pub enum AesKeySize {
    /// 128 bit
    Bits128 = 0,
    /// 192 bit
    Bits192 = 1,
    /// 256 bit
    Bits256 = 2,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Where the AES key comes from
pub enum AesKeySource {
    /// The `AES_KEY` registers
    Register = 0,
    /// The key RAM, at `key_addr`
    Ram = 1,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// AES direction
pub enum AesMode {
    /// Encrypt
    Encrypt = 0,
    /// Decrypt
    Decrypt = 1,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// AES core
pub enum AesCoreType {
    /// Galois/counter mode
    Gcm = 0,
    /// CCM* mode
    Ccm = 1,
}

/// Persistent AES configuration
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AesConfig {
    /// Key size
    pub key_size: AesKeySize,
    /// Key source
    pub key_src: AesKeySource,
    /// Load the key into the core before the next job
    pub key_load: bool,
    /// Key index in the key RAM
    pub key_addr: u8,
    /// Take the key from OTP
    pub key_otp: bool,
    /// MIC size
    pub mic: MicSize,
    /// Direction
    pub mode: AesMode,
    /// Core type
    pub core_type: AesCoreType,
}

impl Default for AesConfig {
    fn default() -> Self {
        AesConfig {
            key_size: AesKeySize::Bits128,
            key_src: AesKeySource::Register,
            key_load: true,
            key_addr: 0,
            key_otp: false,
            mic: MicSize::Mic16,
            mode: AesMode::Encrypt,
            core_type: AesCoreType::Ccm,
        }
    }
}
