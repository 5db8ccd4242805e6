use crate::csp::pattern::{Pattern, PatternTable, RequestTarget};
use crate::csp::policy::Policy;
use crate::error::{Error, Result};
use axum::http::{header, Method, Request};
use log::*;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Registry {
    patterns: PatternTable,
    policies: HashMap<String, Policy>,
}

/// Maps request patterns to Content Security Policies.
///
/// Each request is matched against the registered patterns and gets the
/// policy of the most specific one. Requests that match nothing get the
/// multiplexer's default policy.
pub struct CspMux {
    registry: RwLock<Registry>,
    default: Policy,
}

impl CspMux {
    pub fn new(default: Policy) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            default,
        }
    }

    /// Registers `policy` for `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed or a policy is already registered for
    /// an equivalent pattern. Both are programming errors in the server's
    /// route setup.
    pub fn handle(&self, pattern: &str, policy: impl Into<Policy>) {
        if let Err(e) = self.try_handle(pattern, policy) {
            panic!("{e}");
        }
    }

    /// Registers `policy` for `pattern`, reporting malformed and duplicate
    /// patterns as configuration errors. Callers are expected to treat these
    /// as fatal at startup.
    pub fn try_handle(&self, pattern: &str, policy: impl Into<Policy>) -> Result<()> {
        let parsed = Pattern::parse(pattern).map_err(Error::invalid_pattern)?;
        let policy = policy.into();

        let mut registry = self.registry.write();
        if let Some(existing) = registry.patterns.conflict(&parsed) {
            return Err(Error::duplicate_pattern(pattern, existing.as_str()));
        }

        debug!("Registered Content-Security-Policy for {pattern}: {policy}");
        registry.patterns.insert(parsed);
        registry.policies.insert(pattern.to_owned(), policy);
        Ok(())
    }

    /// The policy registered for the pattern that best matches `request`, or
    /// `None` if no pattern matches.
    pub fn resolve<B>(&self, request: &Request<B>) -> Option<Policy> {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| request.uri().host());
        self.lookup(request.method(), host, request.uri().path())
    }

    pub fn lookup(&self, method: &Method, host: Option<&str>, path: &str) -> Option<Policy> {
        let target = RequestTarget::new(method.as_str(), host, path);
        let registry = self.registry.read();
        let pattern = registry.patterns.best_match(&target)?;
        registry.policies.get(pattern.as_str()).cloned()
    }

    /// Like [`CspMux::resolve`], falling back to the default policy.
    pub fn policy_for<B>(&self, request: &Request<B>) -> Policy {
        self.resolve(request)
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn default_policy(&self) -> &Policy {
        &self.default
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.registry.read().patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CspMux {
    fn default() -> Self {
        Self::new(crate::csp::default_policy())
    }
}
