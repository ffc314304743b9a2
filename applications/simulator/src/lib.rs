//! Encore Simulator
//!
//! Headless host for the playback engine. Simulated decks stand in for
//! platform media elements, a simulated resolver stands in for the signed
//! URL service, and a ticker turns deck clocks into media events. Faults
//! (outages, broken tracks, flaky resolution) can be injected to watch the
//! recovery paths end to end.

pub mod catalog;
pub mod config;
pub mod deck;
pub mod report;
pub mod resolver;
pub mod services;
pub mod ticker;

pub use catalog::Catalog;
pub use config::{Overrides, SimConfig, SimSettings};
pub use deck::{DeckState, SharedDeck, SimulatedDeck};
pub use report::Summary;
pub use resolver::SimResolver;
pub use ticker::Ticker;
