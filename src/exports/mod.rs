//! Export rewriting and publishing: keeping a deployment's `export/`
//! subtree sandbox-safe, and keeping the installation-wide `exports/` tree
//! pointed at the current app's active deployment.

pub mod publish;
pub mod rewrite;
