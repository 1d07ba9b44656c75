//! fmi2-import - Safe bindings to the simplified FMI2 wrapper C ABI
//!
//! This library exposes an FMI2-compliant model binary through a
//! lifecycle-managed interface:
//! - Dynamic loading of the wrapper library and eager symbol resolution
//! - Exclusive ownership of the opaque native instance handle
//! - Typed bulk variable access (real/integer/boolean/string)
//! - Bridging of the asynchronous log and step-finished callbacks
//!
//! Model-description parsing and archive extraction are out of scope; the
//! caller supplies the binary path, GUID and value references from its own
//! metadata source.
//!
//! ```no_run
//! use fmi2_import::{Fmi2Library, Fmi2Status, Fmi2Type, FmuInstance};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), fmi2_import::FmuError> {
//! let library = Arc::new(Fmi2Library::load("libFmiWrapper.so")?);
//! let mut fmu = FmuInstance::new(library, "bouncing_ball/binaries/linux64/bouncing_ball.so");
//! fmu.on_log(|name, status, category, message| {
//!     eprintln!("[{status}] {name}/{category}: {message}");
//! });
//! fmu.instantiate(
//!     "ball",
//!     Fmi2Type::CoSimulation,
//!     "{8c4e810f-3df3-4a00-8276-176fa3c9f9e0}",
//!     "file:///tmp/bouncing_ball/resources",
//!     false,
//!     true,
//! )?;
//! fmu.setup_experiment(false, 0.0, 0.0, false, 0.0);
//! fmu.enter_initialization_mode();
//! fmu.exit_initialization_mode();
//! let mut time = 0.0;
//! while time < 1.0 {
//!     if fmu.do_step(time, 0.125, true) != Fmi2Status::Ok {
//!         break;
//!     }
//!     time += 0.125;
//! }
//! fmu.terminate();
//! # Ok(())
//! # }
//! ```

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod error;
pub mod instance;
pub mod types;

mod bridge;
mod marshal;

#[cfg(test)]
mod mock;

pub use api::Fmi2Library;
pub use error::FmuError;
pub use instance::FmuInstance;
pub use types::{
    EventInfo, Fmi2Boolean, Fmi2Integer, Fmi2Real, Fmi2Status, Fmi2StatusKind, Fmi2Type,
    Fmi2ValueReference, FmuState,
};
