//! Written-put overlay: sell out-of-the-money put premium when implied
//! volatility is rich, track the book's Greeks, and hedge the delta each
//! sale adds through the perpetual manager.

pub mod greeks;
pub mod manager;
pub mod model;
pub mod types;

pub use greeks::PortfolioGreeks;
pub use manager::OptionsOverlayManager;
pub use model::put_writer_greeks;
pub use types::{ExpiryResolution, OptionCloseReason, OptionGreeks, OptionPosition};
