//! Command line handling
//!
//! One optional positional argument picks the backend profile.

use clap::Parser;

use crate::config::{ProfileConfig, ProfilesConfig};

#[derive(Parser, Debug)]
#[command(
    name = "serve-locally",
    about = "Serve the build directory and forward /api to a backend",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Args {
    /// `local` for the local backend, nothing for staging
    #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
    pub backend: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Usage: {program} [local]")]
pub struct UsageError {
    pub program: String,
}

/// Backend picked on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Staging,
    Local,
}

impl Backend {
    pub const fn profile(self, profiles: &ProfilesConfig) -> &ProfileConfig {
        match self {
            Self::Staging => &profiles.staging,
            Self::Local => &profiles.local,
        }
    }
}

/// Resolve the positional arguments to a backend. Runs before any
/// configuration is loaded.
pub fn parse_backend(program: &str, args: &[String]) -> Result<Backend, UsageError> {
    match args {
        [] => Ok(Backend::Staging),
        [only] if only == "local" => Ok(Backend::Local),
        _ => Err(UsageError {
            program: program.to_string(),
        }),
    }
}

/// Program name as invoked, for the usage line
pub fn program_name() -> String {
    std::env::args()
        .next()
        .unwrap_or_else(|| "serve-locally".to_string())
}
