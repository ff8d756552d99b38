mod env_vars;
mod loader;
mod settings;

// Re-export settings
pub use settings::{ArtifactConfig, Configuration, Platform};

// Re-export the loader
pub use loader::{default_search_paths, load_config, ConfigLoader};

// Re-export environment variable helpers
pub use env_vars::{env_var_name, expand_env_vars, expand_unix_vars, expand_windows_vars};
