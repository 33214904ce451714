//! Time units
//!
//! Frequencies and durations are the [`fugit`] types. The [`RateExtU32`] and
//! [`ExtU32`] traits add methods like `.Hz()`, `.kHz()` or `.millis()` to
//! `u32`.
//!
//! ```rust
//! use stm32f4xx_drivers::time::{Hertz, RateExtU32};
//!
//! let freq: Hertz = 2.MHz();
//! assert_eq!(freq, 2_000.kHz::<1, 1>());
//! ```

pub use fugit::{
    ExtU32, HertzU32 as Hertz, KilohertzU32 as KiloHertz, MegahertzU32 as MegaHertz,
    MicrosDurationU32 as MicroSeconds, MicrosDurationU64 as MicroSecondsU64,
    MillisDurationU32 as MilliSeconds, RateExtU32,
};
