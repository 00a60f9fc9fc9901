use core::fmt;

use crate::{configs::ConfigError, ll, power::PowerError};

/// An error that can occur when operating the radio
pub enum Error<B>
where
    B: ll::Transport,
{
    /// Error occured while using the bus
    Bus(ll::Error<B>),

    /// The operation isn't allowed in the current state
    WrongState,

    /// The PLL didn't lock
    PllLock,

    /// The receiver PGF calibration timed out
    RxCalPgf,

    /// The I channel PGF calibration result is out of range
    RxCalResI,

    /// The Q channel PGF calibration result is out of range
    RxCalResQ,

    /// Reading back a programmed OTP word didn't return what was written
    OtpVerify,

    /// The device identifier doesn't match any known chip family
    UnknownDevice(u32),

    /// The configuration was not valid. Some combinations of settings are not allowed.
    InvalidConfiguration,

    /// Buffer too small
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },

    /// A delayed transmission or reception was started after its time had
    /// passed
    ///
    /// The radio has been turned off.
    DelayedTooLate,

    /// The AES job failed
    Aes(AesError),

    /// The power calculation failed
    Power(PowerError),

    /// It was expected that the radio would have woken up, but it hasn't.
    StillAsleep,

    /// The wake pin couldn't be driven
    WakeIo,
}

/// Why an AES job failed
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AesError {
    /// Header plus payload don't fit the destination
    DataSize,
    /// The job's mode doesn't match the core configuration
    WrongMode,
    /// The MIC size isn't one of the supported sizes
    WrongMicSize,
    /// The nonce length doesn't suit the core type
    NonceSize,
    /// The payload is too long for the DMA length field
    PayloadSize,
    /// The DMA transfer failed
    Transfer,
    /// Authentication of the decrypted data failed
    Auth,
    /// The source and destination memories conflict
    MemConflict,
}

impl<B: ll::Transport> Error<B> {
    /// The numeric code the vendor API reports for this error
    pub fn code(&self) -> i32 {
        match self {
            Error::PllLock => -2,
            Error::RxCalPgf => -3,
            Error::RxCalResI => -4,
            Error::RxCalResQ => -5,
            Error::WrongState => -9,
            _ => -1,
        }
    }
}

impl<B: ll::Transport> From<ll::Error<B>> for Error<B> {
    fn from(error: ll::Error<B>) -> Self {
        Error::Bus(error)
    }
}

impl<B: ll::Transport> From<ll::CodecError> for Error<B> {
    fn from(error: ll::CodecError) -> Self {
        Error::Bus(ll::Error::Codec(error))
    }
}

impl<B: ll::Transport> From<AesError> for Error<B> {
    fn from(error: AesError) -> Self {
        Error::Aes(error)
    }
}

impl<B: ll::Transport> From<PowerError> for Error<B> {
    fn from(error: PowerError) -> Self {
        Error::Power(error)
    }
}

impl<B: ll::Transport> From<ConfigError> for Error<B> {
    fn from(_: ConfigError) -> Self {
        Error::InvalidConfiguration
    }
}

// We can't derive this implementation, as `Debug` is only implemented
// conditionally for `ll::Error`.
impl<B> fmt::Debug for Error<B>
where
    B: ll::Transport,
    B::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Bus(error) => write!(f, "Bus({:?})", error),
            Error::WrongState => write!(f, "WrongState"),
            Error::PllLock => write!(f, "PllLock"),
            Error::RxCalPgf => write!(f, "RxCalPgf"),
            Error::RxCalResI => write!(f, "RxCalResI"),
            Error::RxCalResQ => write!(f, "RxCalResQ"),
            Error::OtpVerify => write!(f, "OtpVerify"),
            Error::UnknownDevice(id) => write!(f, "UnknownDevice({:#010x})", id),
            Error::InvalidConfiguration => write!(f, "InvalidConfiguration"),
            Error::BufferTooSmall { required_len } => {
                write!(f, "BufferTooSmall {{ required_len: {:?} }}", required_len)
            }
            Error::DelayedTooLate => write!(f, "DelayedTooLate"),
            Error::Aes(error) => write!(f, "Aes({:?})", error),
            Error::Power(error) => write!(f, "Power({:?})", error),
            Error::StillAsleep => write!(f, "StillAsleep"),
            Error::WakeIo => write!(f, "WakeIo"),
        }
    }
}
