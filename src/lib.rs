//! Runnel - cold, hot and stateful event streams on tokio
//!
//! Everything funnels into one subscription stream type,
//! [`emissions::Emissions`]: `source` produces it from replayable scripts,
//! `broadcast` from live fan-out queues, `cell` from watched state. The
//! operators on it cover transformation, flattening and delivery policy,
//! and `coordinator` owns the demo wiring the binary renders.

pub mod broadcast;
pub mod cancel;
pub mod cell;
pub mod coordinator;
pub mod dispatch;
pub mod emissions;
pub mod error;
pub mod sequences;
pub mod source;
pub mod ui;
