pub mod config;
pub mod config_loader;
pub mod emergency;
pub mod error;
pub mod events;
pub mod feed;
pub mod numeric;
pub mod traits;
pub mod types;

pub use config::{EngineConfig, FeedConfig, KeeperConfig, OptionsConfig, PerpConfig, RiskConfig};
pub use config_loader::ConfigLoader;
pub use emergency::EmergencySwitch;
pub use error::{EngineError, Result};
pub use events::{EngineEvent, EventBus};
pub use feed::fresh_mark;
pub use traits::{OptionsVenue, PerpVenue, PriceFeed};
pub use types::{OptionId, PositionId, PriceSample, VenueFill, VenueId};
