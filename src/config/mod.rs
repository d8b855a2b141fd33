mod settings;

use config::{Config, Environment, File};

pub use settings::{
    BackoffSettings, BrokerSettings, ClientSettings, LogSettings, PartialSettings, ServerSettings,
    Settings,
};

use crate::utils::Result;

/// Loads the configuration from `config/default.*` and `TETHER_*` environment
/// variables, merged over the built-in defaults.
///
/// Nested keys use a double underscore: `TETHER_SERVER__PORT=9000`,
/// `TETHER_BROKER__PEERS=10.0.0.2:8081,10.0.0.3:8081`.
pub fn load_config() -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("TETHER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("broker.peers"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge())
}

#[cfg(test)]
mod tests;
