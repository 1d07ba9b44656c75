//! Errors raised by the binding itself.
//!
//! Native severities are returned as [`crate::Fmi2Status`] values, never as
//! errors; `FmuError` covers only faults the binding can detect before or
//! during its own work (loading, symbol resolution, instantiation, string
//! marshalling).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FmuError {
    /// The wrapper shared library could not be loaded.
    #[error("failed to load fmi2 wrapper library `{}`: {}", path.display(), source)]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The wrapper library is missing one of the required entry points.
    #[error("fmi2 wrapper library is missing the `{0}` entry point")]
    MissingSymbol(&'static str),

    /// The native `instantiate` call returned a null handle.
    #[error("failed to instantiate fmu instance `{0}`")]
    Instantiation(String),

    /// A string argument cannot cross the boundary as a C string.
    #[error("string argument contains an interior nul byte")]
    InvalidString(#[from] std::ffi::NulError),
}
