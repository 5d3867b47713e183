//! # depotcore
//!
//! Installation directory manager for a sandboxed application distribution
//! system: a hierarchical on-disk store of application and runtime
//! deployments backed by a content-addressed object repository.
//!
//! This crate is the deployment lifecycle engine only. The command-line
//! surface, the sandbox launcher, user-facing progress rendering, and the
//! HTTP stack beyond the URI-to-bytes contract used for direct object
//! fetches are external collaborators.

#![forbid(unused_must_use)]
#![deny(unsafe_code)]

pub mod cancel;
pub mod deploy;
pub mod error;
pub mod exports;
pub mod fetch;
pub mod inspect;
pub mod installation;
mod keyfileext;
pub mod lock;
pub mod metaprefetch;
mod objgv;
pub mod overrides;
pub mod progress;
pub mod refs;
pub mod repo;

pub use error::{Error, ErrorKind, Result};
pub use overrides::Scope;
pub use refs::{Kind, Ref};
