//! Configuration loading and management

mod loader;

pub use loader::{
    generate_default_config, IdentityConfig, PolicyConfig, PushkeyConfig, PushkeyConfigFile,
    SecretsConfig, ACCESS_KEY_ID_PARAMETER, CONFIG_FILE_NAMES, SECRET_ACCESS_KEY_PARAMETER,
};
