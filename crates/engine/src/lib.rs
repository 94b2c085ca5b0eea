//! Delta-neutral hedging engine.
//!
//! Ties the perpetual short book, the written-put overlay, and the risk
//! controller together behind one facade. Embed [`HedgeEngine`] directly
//! for single-writer access, or run it behind [`spawn_engine`] for an
//! actor with a cloneable [`EngineHandle`] and keeper-driven scheduling.

pub mod actor;
pub mod commands;
pub mod engine;
pub mod handle;
pub mod keeper;

pub use actor::{spawn_engine, EngineActor};
pub use commands::EngineCommand;
pub use engine::HedgeEngine;
pub use handle::EngineHandle;
pub use keeper::Keeper;
