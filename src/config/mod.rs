//! Configuration management

mod defaults;
mod settings;

pub use defaults::default_topics;
pub use settings::{AppConfig, PollSettings, CONFIG_VERSION};
