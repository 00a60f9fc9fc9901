//! Driver core for the Decawave/Qorvo DW3000 and QM33xxx UWB transceivers
//!
//! The DW3000 family are ultra-wideband radios used for precise ranging and
//! short frame exchange. This crate turns the chip's byte-level register
//! protocol into a typed API.
//!
//! The driver is split in two layers:
//!
//! - The [register-level interface] builds the SPI transaction headers,
//!   frames them with the optional CRC-8, and offers typed register access.
//! - The [high-level interface] owns one chip handle and sequences the
//!   operating states, PLL calibration, interrupt dispatch, sleep/wake and
//!   the AES block.
//!
//! A chip is opened with [`probe`], which reads the device identifier and
//! selects the matching [`ChipFamily`] implementation.
//!
//! [register-level interface]: ll/index.html
//! [high-level interface]: hl/index.html

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]

#[macro_use]
mod log;

pub mod configs;
pub mod family;
pub mod hl;
pub mod ll;
pub mod power;
pub mod time;

#[cfg(test)]
mod mock;

#[doc(no_inline)]
pub use crate::{
    configs::{Config, TxConfig},
    family::{probe, ChipFamily, DriverContext},
    hl::{DeviceState, Error, DW3xxx},
};
