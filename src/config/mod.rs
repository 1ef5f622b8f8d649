//! Configuration for redstring
//!
//! User-level settings (`~/.config/redstring/config.toml` plus environment
//! overrides) for the bridge, the AI endpoints and local storage paths.

mod user_config;

pub use user_config::{
    AiConfig, BridgeConfig, StorageConfig, UserConfig, DEFAULT_AI_URL, DEFAULT_BRIDGE_URL,
};
