//! Error types, re-exported from the shared `idf-error` crate

pub use idf_error::{IdracfanError, Result};
