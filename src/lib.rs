//! `swesmith` turns a pinned source repository into a corpus of reproducible,
//! container-backed software-engineering task instances: synthetic bugs,
//! differentially-validated test splits, generated issue text, and (optionally)
//! distilled agent trajectories ready for SFT.
//!
//! The pipeline is staged C1-C10; each stage is its own module below and
//! stages communicate only through the plain data types re-exported here,
//! never through shared mutable state.

pub mod collector;
pub mod config;
pub mod dataset;
pub mod distill;
pub mod entity;
pub mod env;
pub mod errors;
pub mod gatherer;
pub mod generators;
pub mod hash;
pub mod issue;
pub mod llm;
pub mod profile;
pub mod validator;

use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global `tracing` subscriber (§2a A2, §4.11). Safe to call more
/// than once per process (tests, repeated invocations under `cfg(test)`) —
/// `try_init` silently no-ops past the first call.
pub fn init_tracing(verbose: bool) {
    let max_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::fmt::Subscriber::builder()
        .with_target(false)
        .with_max_level(max_level)
        .finish()
        .try_init();
}
