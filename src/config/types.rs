// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FilesConfig,
    pub forward: ForwardRuleConfig,
    pub profiles: ProfilesConfig,
    pub logging: LoggingConfig,
}

/// Listening socket configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Static file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FilesConfig {
    /// Build output directory, relative to the working directory
    pub build_dir: String,
    pub index_files: Vec<String>,
}

/// Which request paths are forwarded
#[derive(Debug, Deserialize, Clone)]
pub struct ForwardRuleConfig {
    pub prefix: String,
}

/// Upstream backends selectable from the command line
#[derive(Debug, Deserialize, Clone)]
pub struct ProfilesConfig {
    pub staging: ProfileConfig,
    pub local: ProfileConfig,
}

/// A single upstream backend
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub host: String,
    /// Falls back to the transport's default port when unset
    #[serde(default)]
    pub port: Option<u16>,
    pub secure: bool,
    #[serde(default)]
    pub forward_path: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "common".to_string()
}

impl LoggingConfig {
    pub fn is_debug(&self) -> bool {
        self.level.eq_ignore_ascii_case("debug") || self.level.eq_ignore_ascii_case("trace")
    }
}

/// Upstream transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Secure,
}

impl Transport {
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Plain => 80,
            Self::Secure => 443,
        }
    }

    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Secure => "https",
        }
    }
}

/// Immutable forwarding configuration for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardConfig {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    /// Stripped from the incoming path
    pub prefix: String,
    /// Prepended to what remains after stripping `prefix`
    pub forward_path: String,
}

impl ForwardConfig {
    pub fn from_profile(profile: &ProfileConfig, prefix: &str) -> Self {
        let transport = if profile.secure {
            Transport::Secure
        } else {
            Transport::Plain
        };
        Self {
            host: profile.host.clone(),
            port: profile.port.unwrap_or_else(|| transport.default_port()),
            transport,
            prefix: prefix.to_string(),
            forward_path: profile.forward_path.clone(),
        }
    }

    /// Value for the outgoing `host` header. The port is only included
    /// when it differs from the transport's default.
    pub fn host_header(&self) -> String {
        if self.port == self.transport.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `host:port` pair used to open the TCP connection
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}
