//! Terminal rendering and command runners

pub mod market;
pub mod portfolio;
pub mod setup;
pub mod ui;
pub mod watchlist;
