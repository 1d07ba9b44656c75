//! Status and mode vocabulary plus the raw C-side aliases shared by the
//! native call surface.
//!
//! Type mapping across the boundary:
//! - `Fmi2Real` → `f64`
//! - `Fmi2Integer` → `c_int`
//! - `Fmi2Boolean` → `c_int` (the standard's fixed-width boolean)
//! - `Fmi2ValueReference` → `c_uint`
//! - status/type/kind enums → `c_int` on the wire, converted at the facade

use serde::{Deserialize, Serialize};
use std::os::raw::{c_char, c_int, c_uint, c_void};

/// Floating point model variable, `fmi2Real`.
pub type Fmi2Real = f64;
/// Integer model variable, `fmi2Integer`.
pub type Fmi2Integer = c_int;
/// Fixed-width native boolean, `fmi2Boolean`. Zero is false, non-zero true.
pub type Fmi2Boolean = c_int;
/// Byte of a serialized FMU state, `fmi2Byte`.
pub type Fmi2Byte = c_char;
/// Key identifying one model variable within its type class.
pub type Fmi2ValueReference = c_uint;
/// Status code as transported across the C ABI.
pub type Fmi2StatusRaw = c_int;
/// Opaque FMU-state pointer as transported across the C ABI.
pub type Fmi2FmuStateRaw = *mut c_void;

pub const FMI2_TRUE: Fmi2Boolean = 1;
pub const FMI2_FALSE: Fmi2Boolean = 0;

/// Result code returned by nearly every lifecycle and data operation.
///
/// Ordered by increasing severity up to `Fatal`; `Pending` marks an
/// outstanding asynchronous step rather than a severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fmi2Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
    Pending,
}

impl Fmi2Status {
    /// Convert a raw status int coming out of the native library.
    ///
    /// Returns `None` for values outside the standard's enumeration.
    pub fn from_raw(raw: Fmi2StatusRaw) -> Option<Self> {
        match raw {
            0 => Some(Fmi2Status::Ok),
            1 => Some(Fmi2Status::Warning),
            2 => Some(Fmi2Status::Discard),
            3 => Some(Fmi2Status::Error),
            4 => Some(Fmi2Status::Fatal),
            5 => Some(Fmi2Status::Pending),
            _ => None,
        }
    }

    /// The wire representation of this status.
    pub fn as_raw(self) -> Fmi2StatusRaw {
        match self {
            Fmi2Status::Ok => 0,
            Fmi2Status::Warning => 1,
            Fmi2Status::Discard => 2,
            Fmi2Status::Error => 3,
            Fmi2Status::Fatal => 4,
            Fmi2Status::Pending => 5,
        }
    }
}

impl std::fmt::Display for Fmi2Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Fmi2Status::Ok => "ok",
            Fmi2Status::Warning => "warning",
            Fmi2Status::Discard => "discard",
            Fmi2Status::Error => "error",
            Fmi2Status::Fatal => "fatal",
            Fmi2Status::Pending => "pending",
        };
        f.write_str(name)
    }
}

/// Which of the two FMI2 interaction styles an instance is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fmi2Type {
    ModelExchange,
    CoSimulation,
}

impl Fmi2Type {
    pub fn as_raw(self) -> c_int {
        match self {
            Fmi2Type::ModelExchange => 0,
            Fmi2Type::CoSimulation => 1,
        }
    }
}

/// Selector for the co-simulation status inquiry calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fmi2StatusKind {
    DoStepStatus,
    PendingStatus,
    LastSuccessfulTime,
    Terminated,
}

impl Fmi2StatusKind {
    pub fn as_raw(self) -> c_int {
        match self {
            Fmi2StatusKind::DoStepStatus => 0,
            Fmi2StatusKind::PendingStatus => 1,
            Fmi2StatusKind::LastSuccessfulTime => 2,
            Fmi2StatusKind::Terminated => 3,
        }
    }
}

/// Wire form of `fmi2EventInfo`, filled by `new_discrete_states`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEventInfo {
    pub new_discrete_states_needed: Fmi2Boolean,
    pub terminate_simulation: Fmi2Boolean,
    pub nominals_of_continuous_states_changed: Fmi2Boolean,
    pub values_of_continuous_states_changed: Fmi2Boolean,
    pub next_event_time_defined: Fmi2Boolean,
    pub next_event_time: Fmi2Real,
}

/// Outcome of a discrete-state update request.
///
/// Produced by the native library on each `new_discrete_states` call and
/// handed straight to the caller; the binding does not retain it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub new_discrete_states_needed: bool,
    pub terminate_simulation: bool,
    pub nominals_of_continuous_states_changed: bool,
    pub values_of_continuous_states_changed: bool,
    pub next_event_time_defined: bool,
    pub next_event_time: f64,
}

impl From<RawEventInfo> for EventInfo {
    fn from(raw: RawEventInfo) -> Self {
        EventInfo {
            new_discrete_states_needed: raw.new_discrete_states_needed != FMI2_FALSE,
            terminate_simulation: raw.terminate_simulation != FMI2_FALSE,
            nominals_of_continuous_states_changed: raw.nominals_of_continuous_states_changed
                != FMI2_FALSE,
            values_of_continuous_states_changed: raw.values_of_continuous_states_changed
                != FMI2_FALSE,
            next_event_time_defined: raw.next_event_time_defined != FMI2_FALSE,
            next_event_time: raw.next_event_time,
        }
    }
}

/// Opaque snapshot of an FMU's internal state.
///
/// Move-only: the pointer is owned by whoever holds the `FmuState` and is
/// released by passing it back through [`crate::FmuInstance::free_fmu_state`].
#[derive(Debug)]
pub struct FmuState(Fmi2FmuStateRaw);

impl FmuState {
    pub(crate) fn from_raw(raw: Fmi2FmuStateRaw) -> Self {
        FmuState(raw)
    }

    pub(crate) fn as_raw(&self) -> Fmi2FmuStateRaw {
        self.0
    }

    pub(crate) fn into_raw(self) -> Fmi2FmuStateRaw {
        self.0
    }

    /// True when the native library produced no state snapshot.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}
