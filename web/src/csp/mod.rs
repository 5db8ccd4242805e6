//! Content Security Policy support.
//!
//! - `policy`: the [`Csp`] directive set and its finalized form, [`Policy`]
//! - `pattern`: the request pattern matcher used for policy lookup
//! - `mux`: [`CspMux`], per-route policy selection with a default fallback
//! - `file`: loading a multiplexer from a JSON policy file

pub mod file;
pub mod mux;
pub mod pattern;
pub mod policy;

pub use file::{load_csp_mux, PolicyFile};
pub use mux::CspMux;
pub use policy::{
    default_csp, default_policy, Csp, Directive, DirectiveValue, Policy, NONE, SELF, UNSAFE_EVAL,
    UNSAFE_INLINE,
};
