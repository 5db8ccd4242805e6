use crate::csp::mux::CspMux;
use crate::csp::policy::{default_policy, Csp};
use crate::error::{Error, Result};
use log::*;
use serde::Deserialize;
use service::config::Config;
use std::fs;
use std::path::Path;

/// Content Security Policy configuration read from a JSON file.
///
/// ```json
/// {
///   "default": { "default-src": ["'self'"], "block-all-mixed-content": true },
///   "routes": [
///     { "pattern": "/api/", "policy": { "default-src": ["'none'"] } }
///   ]
/// }
/// ```
///
/// Routes are a list rather than a map so that a repeated pattern is reported
/// instead of silently replacing the earlier entry.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    #[serde(default)]
    pub default: Option<Csp>,
    #[serde(default)]
    pub routes: Vec<RoutePolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutePolicy {
    pub pattern: String,
    pub policy: Csp,
}

impl PolicyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(Error::policy_file)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(Error::policy_file)
    }

    /// Builds a multiplexer with every route registered. A file without a
    /// `default` policy keeps the built-in default.
    pub fn into_mux(self) -> Result<CspMux> {
        let default = self
            .default
            .map(Csp::finalize)
            .unwrap_or_else(default_policy);
        let mux = CspMux::new(default);

        for route in self.routes {
            mux.try_handle(&route.pattern, route.policy)?;
        }

        Ok(mux)
    }
}

/// Builds the multiplexer described by `config`: the policy file if one is
/// configured, otherwise the default policy for every route.
pub fn load_csp_mux(config: &Config) -> Result<CspMux> {
    match config.csp_policy_file() {
        Some(path) => {
            info!("Loading Content-Security-Policy from {}", path.display());
            let mux = PolicyFile::load(path)?.into_mux()?;
            info!("Registered {} route-specific policies", mux.len());
            Ok(mux)
        }
        None => Ok(CspMux::new(default_policy())),
    }
}
