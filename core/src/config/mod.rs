pub mod load;
pub mod types;

pub use load::{
    apply_env_overrides, get_autoprobe_data_dir, load_default, load_explicit, load_from_path,
};
pub use types::{
    AppConfig, DriverConfig, EngineConfig, InferenceConfig, LoggingConfig, RegistryConfig,
    StorageConfig,
};
