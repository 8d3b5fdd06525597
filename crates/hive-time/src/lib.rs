//! Hive Time - clocks and periodic scheduling
//!
//! - `Clock`: source of wall-clock timestamps (real or manual)
//! - `DoAtInterval`: independent "next due" deadline per periodic task

pub mod clock;
pub mod interval;

pub use clock::*;
pub use interval::*;
