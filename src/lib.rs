#![warn(clippy::pedantic)]
// Binary crate with internal library; all callers are us.
// These doc lints are for public API documentation, not applicable here.
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod build;
pub mod classify;
pub mod comments;
pub mod deps;
pub mod error;
pub mod index;
pub mod label;
pub mod lang;
pub mod query;
pub mod resolver;
pub mod session;
pub mod source;
pub mod updater;
pub mod walker;
pub mod workspace;
