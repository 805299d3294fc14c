//! # Reporting Loop
//!
//! Periodically reads the counters, prints the non-zero ones, and zeroes them.
//!
//! - `runner`: [`Reporter`] and its [`LoopState`] machine
//! - `render`: the `FUNC` / `COUNT` table
//! - `interrupt`: [`InterruptToken`] fed by the Ctrl-C listener

pub mod interrupt;
pub mod render;
pub mod runner;

pub use interrupt::InterruptToken;
pub use render::render_report;
pub use runner::{LoopState, ReportOptions, Reporter, Wake};
