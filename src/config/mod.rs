// Configuration module entry point
// Loads the settings file and builds the immutable runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{Config, ForwardConfig, ProfileConfig, ProfilesConfig, Transport};

/// Settings file looked up in the working directory (extension optional)
pub const DEFAULT_CONFIG_PATH: &str = "serve-locally";

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified file path (without extension)
    ///
    /// Missing files are fine; `SERVE_`-prefixed environment variables
    /// override file values, e.g. `SERVE_SERVER__PORT=9000`.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SERVE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("files.build_dir", "target")?
            .set_default("files.index_files", vec!["index.html", "index.htm"])?
            .set_default("forward.prefix", "/api")?
            .set_default("profiles.staging.host", "firecloud-ci.broadinstitute.org")?
            .set_default("profiles.staging.secure", true)?
            .set_default("profiles.staging.forward_path", "/api")?
            .set_default("profiles.local.host", "local.broadinstitute.org")?
            .set_default("profiles.local.port", 8080)?
            .set_default("profiles.local.secure", false)?
            .set_default("profiles.local.forward_path", "")?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let cfg = Config::load_from("does-not-exist/serve-locally").expect("defaults load");
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.files.build_dir, "target");
        assert_eq!(cfg.forward.prefix, "/api");
        assert_eq!(cfg.profiles.local.port, Some(8080));
        assert!(!cfg.profiles.local.secure);
        assert_eq!(cfg.profiles.local.forward_path, "");
        assert_eq!(cfg.profiles.staging.port, None);
        assert!(cfg.profiles.staging.secure);
        assert_eq!(cfg.profiles.staging.forward_path, "/api");
        assert_eq!(
            cfg.get_socket_addr().expect("valid address"),
            "0.0.0.0:8000".parse().expect("literal")
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("serve-locally-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let file = dir.join("custom.toml");
        std::fs::write(
            &file,
            "[server]\nport = 9001\n\n[profiles.local]\nhost = \"127.0.0.1\"\nport = 3000\n",
        )
        .expect("write config");

        let cfg = Config::load_from(dir.join("custom").to_str().expect("utf-8 path"))
            .expect("config loads");
        assert_eq!(cfg.server.port, 9001);
        assert_eq!(cfg.profiles.local.host, "127.0.0.1");
        assert_eq!(cfg.profiles.local.port, Some(3000));
        // untouched keys keep their defaults
        assert_eq!(cfg.profiles.local.forward_path, "");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
