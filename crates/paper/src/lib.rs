//! Simulated collaborators for paper hedging and tests.
//!
//! Everything here is deterministic and in-memory; no network calls are
//! possible through these types.

pub mod feed;
pub mod options_venue;
pub mod perp_venue;

pub use feed::PaperPriceFeed;
pub use options_venue::PaperOptionsVenue;
pub use perp_venue::PaperPerpVenue;
