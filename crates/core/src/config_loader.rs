use crate::config::EngineConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads engine configuration by layering TOML and environment variables
    /// over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<EngineConfig> {
        let config: EngineConfig = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("config/Hedge.toml"))
            .merge(Env::prefixed("HEDGE_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Loads engine configuration with a profile overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(profile: &str) -> Result<EngineConfig> {
        let config: EngineConfig = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("config/Hedge.toml"))
            .merge(Toml::file(format!("config/Hedge.{profile}.toml")))
            .merge(Env::prefixed("HEDGE_").split("__"))
            .extract()?;

        Ok(config)
    }
}
