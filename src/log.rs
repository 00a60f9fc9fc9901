//! Internal logging macros
//!
//! With the `log` feature these forward to the `log` crate under the
//! `dw3xxx` target. Without it the arguments are still type-checked, but
//! nothing is emitted.

#![allow(unused_macros)]

#[cfg(feature = "log")]
macro_rules! error {
    ($($arg:tt)+) => {{ ::log::error!(target: "dw3xxx", $($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($arg:tt)+) => {{ ::log::warn!(target: "dw3xxx", $($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! info {
    ($($arg:tt)+) => {{ ::log::info!(target: "dw3xxx", $($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:tt)+) => {{ ::log::debug!(target: "dw3xxx", $($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! trace {
    ($($arg:tt)+) => {{ ::log::trace!(target: "dw3xxx", $($arg)+); }};
}

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)+) => {{ format_args!($($arg)+); }};
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)+) => {{ format_args!($($arg)+); }};
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)+) => {{ format_args!($($arg)+); }};
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)+) => {{ format_args!($($arg)+); }};
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)+) => {{ format_args!($($arg)+); }};
}
