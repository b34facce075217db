//! Core engine — the scan → detect → dedup → notify loop.

pub mod scanner;

pub use scanner::{Intervals, Phase, Scanner};
