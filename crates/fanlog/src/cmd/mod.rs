//! Command implementations for the fanlog CLI

pub mod check;
pub mod ship;
