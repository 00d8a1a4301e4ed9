//! TradeLab Core: domain types, strategies, risk sizing, and the event engine.
//!
//! This crate contains everything a single deterministic run needs:
//! - Domain types (bars, signals, orders, fills, positions, trades)
//! - Indicators and the three reference strategies behind a static registry
//! - Risk managers (fixed percent, ATR) and the entry sizing funnel
//! - Simulated execution with volume-driven slippage and commission
//! - The four-phase bar loop
//! - Sequential data providers and the CSV bar store
//! - Strategy configuration with BLAKE3 content identity

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod params;
pub mod risk;
pub mod rng;
pub mod strategy;
