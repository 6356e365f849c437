pub mod config;
pub mod parser;

pub use config::{HubConfig, HubConfigFile, ServerConfig};
pub use parser::{parse_config_from_file, parse_config_from_str};
