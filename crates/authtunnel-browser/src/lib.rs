//! Browser automation capability.
//!
//! The gateway, command router, session capturer, and verifier only ever
//! talk to the [`driver::Driver`] trait family, so they can be exercised
//! against [`fake::FakeDriver`] without a browser process. The real
//! implementation drives Chromium over CDP and requires the `cdp` feature
//! (on by default) plus an installed Chrome/Chromium.

pub mod driver;
pub mod fake;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use driver::{Driver, Instance, LaunchOptions, Page};
