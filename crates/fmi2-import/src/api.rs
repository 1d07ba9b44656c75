//! Native call surface of the FMI2 wrapper library.
//!
//! One binding per entry point, with the calling convention and parameter
//! layout fixed to match the wrapper's published header. Every binding is a
//! pure pass-through: no validation, no conversion, no side effects beyond
//! invoking the native function. Status-returning entries yield the raw
//! `c_int`; conversion to [`crate::Fmi2Status`] happens in the facade.
//!
//! String-producing entries (`get_types_platform`, `get_version`,
//! `get_string`, `get_string_status`) return transient pointers into
//! native-owned memory. Callers must copy them out before the next call into
//! the same instance; a later call may invalidate the previous string.

use std::os::raw::{c_char, c_int, c_void};
use std::path::Path;

use libloading::{Library, Symbol};

use crate::error::FmuError;
use crate::types::{
    Fmi2Boolean, Fmi2Byte, Fmi2FmuStateRaw, Fmi2Integer, Fmi2Real, Fmi2StatusRaw,
    Fmi2ValueReference, RawEventInfo,
};

/// Simplified log callback retained by the native library.
///
/// Invoked zero or more times per native call, possibly from a thread the
/// binding does not control.
pub type LogCallbackFn = extern "C" fn(
    instance_name: *const c_char,
    status: Fmi2StatusRaw,
    category: *const c_char,
    message: *const c_char,
);

/// Step-finished callback retained by the native library.
///
/// Invoked exactly once per asynchronous step request, from a thread the
/// binding does not control.
pub type StepFinishedCallbackFn = extern "C" fn(status: Fmi2StatusRaw);

// Creation and destruction of FMU instances and setting debug status.

pub type InstantiateFn = unsafe extern "C" fn(
    file_name: *const c_char,
    log: LogCallbackFn,
    step_finished: StepFinishedCallbackFn,
    instance_name: *const c_char,
    fmu_type: c_int,
    guid: *const c_char,
    resource_location: *const c_char,
    visible: Fmi2Boolean,
    logging_on: Fmi2Boolean,
) -> *mut c_void;

pub type FreeInstanceFn = unsafe extern "C" fn(handle: *mut c_void);

pub type SetDebugLoggingFn = unsafe extern "C" fn(
    handle: *mut c_void,
    logging_on: Fmi2Boolean,
    n_categories: usize,
    categories: *const *const c_char,
) -> Fmi2StatusRaw;

// Inquire version numbers of header files.

pub type GetStringAttributeFn = unsafe extern "C" fn(handle: *mut c_void) -> *const c_char;

// Enter and exit initialization mode, terminate and reset.

pub type SetupExperimentFn = unsafe extern "C" fn(
    handle: *mut c_void,
    tolerance_defined: Fmi2Boolean,
    tolerance: Fmi2Real,
    start_time: Fmi2Real,
    stop_time_defined: Fmi2Boolean,
    stop_time: Fmi2Real,
) -> Fmi2StatusRaw;

/// Shared shape of the handle-only lifecycle entries
/// (`enter_initialization_mode`, `terminate`, `reset`, `cancel_step`, ...).
pub type LifecycleFn = unsafe extern "C" fn(handle: *mut c_void) -> Fmi2StatusRaw;

// Getting and setting variable values.

pub type GetRealFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *mut Fmi2Real,
) -> Fmi2StatusRaw;

pub type GetIntegerFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *mut Fmi2Integer,
) -> Fmi2StatusRaw;

pub type GetBooleanFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *mut Fmi2Boolean,
) -> Fmi2StatusRaw;

pub type GetStringFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *mut *const c_char,
) -> Fmi2StatusRaw;

pub type SetRealFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *const Fmi2Real,
) -> Fmi2StatusRaw;

pub type SetIntegerFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *const Fmi2Integer,
) -> Fmi2StatusRaw;

pub type SetBooleanFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *const Fmi2Boolean,
) -> Fmi2StatusRaw;

pub type SetStringFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *const *const c_char,
) -> Fmi2StatusRaw;

// Getting and setting the internal FMU state.

pub type GetFmuStateFn =
    unsafe extern "C" fn(handle: *mut c_void, state: *mut Fmi2FmuStateRaw) -> Fmi2StatusRaw;

pub type SetFmuStateFn =
    unsafe extern "C" fn(handle: *mut c_void, state: Fmi2FmuStateRaw) -> Fmi2StatusRaw;

pub type FreeFmuStateFn =
    unsafe extern "C" fn(handle: *mut c_void, state: *mut Fmi2FmuStateRaw) -> Fmi2StatusRaw;

pub type SerializedFmuStateSizeFn = unsafe extern "C" fn(
    handle: *mut c_void,
    state: Fmi2FmuStateRaw,
    size: *mut usize,
) -> Fmi2StatusRaw;

pub type SerializeFmuStateFn = unsafe extern "C" fn(
    handle: *mut c_void,
    state: Fmi2FmuStateRaw,
    serialized: *mut Fmi2Byte,
    size: usize,
) -> Fmi2StatusRaw;

pub type DeserializeFmuStateFn = unsafe extern "C" fn(
    handle: *mut c_void,
    serialized: *const Fmi2Byte,
    size: usize,
    state: *mut Fmi2FmuStateRaw,
) -> Fmi2StatusRaw;

// Getting partial derivatives.

pub type GetDirectionalDerivativeFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr_unknown: *const Fmi2ValueReference,
    n_unknown: usize,
    vr_known: *const Fmi2ValueReference,
    n_known: usize,
    dv_known: *const Fmi2Real,
    dv_unknown: *mut Fmi2Real,
) -> Fmi2StatusRaw;

// Model exchange.

pub type NewDiscreteStatesFn =
    unsafe extern "C" fn(handle: *mut c_void, event_info: *mut RawEventInfo) -> Fmi2StatusRaw;

pub type CompletedIntegratorStepFn = unsafe extern "C" fn(
    handle: *mut c_void,
    no_set_fmu_state_prior_to_current_point: Fmi2Boolean,
    enter_event_mode: *mut Fmi2Boolean,
    terminate_simulation: *mut Fmi2Boolean,
) -> Fmi2StatusRaw;

pub type SetTimeFn = unsafe extern "C" fn(handle: *mut c_void, time: Fmi2Real) -> Fmi2StatusRaw;

pub type SetContinuousStatesFn = unsafe extern "C" fn(
    handle: *mut c_void,
    states: *const Fmi2Real,
    nx: usize,
) -> Fmi2StatusRaw;

/// Shared shape of the model-equation buffer fills (`get_derivatives`,
/// `get_event_indicators`, `get_continuous_states`,
/// `get_nominals_of_continuous_states`).
pub type GetRealBufferFn = unsafe extern "C" fn(
    handle: *mut c_void,
    buffer: *mut Fmi2Real,
    count: usize,
) -> Fmi2StatusRaw;

// Co-simulation.

pub type SetRealInputDerivativesFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    order: *const Fmi2Integer,
    values: *const Fmi2Real,
) -> Fmi2StatusRaw;

pub type GetRealOutputDerivativesFn = unsafe extern "C" fn(
    handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    order: *const Fmi2Integer,
    values: *mut Fmi2Real,
) -> Fmi2StatusRaw;

pub type DoStepFn = unsafe extern "C" fn(
    handle: *mut c_void,
    current_communication_point: Fmi2Real,
    communication_step_size: Fmi2Real,
    no_set_fmu_state_prior_to_current_point: Fmi2Boolean,
) -> Fmi2StatusRaw;

pub type GetStatusFn = unsafe extern "C" fn(
    handle: *mut c_void,
    kind: c_int,
    value: *mut Fmi2StatusRaw,
) -> Fmi2StatusRaw;

pub type GetRealStatusFn =
    unsafe extern "C" fn(handle: *mut c_void, kind: c_int, value: *mut Fmi2Real) -> Fmi2StatusRaw;

pub type GetIntegerStatusFn = unsafe extern "C" fn(
    handle: *mut c_void,
    kind: c_int,
    value: *mut Fmi2Integer,
) -> Fmi2StatusRaw;

pub type GetBooleanStatusFn = unsafe extern "C" fn(
    handle: *mut c_void,
    kind: c_int,
    value: *mut Fmi2Boolean,
) -> Fmi2StatusRaw;

pub type GetStringStatusFn = unsafe extern "C" fn(
    handle: *mut c_void,
    kind: c_int,
    value: *mut *const c_char,
) -> Fmi2StatusRaw;

/// The resolved entry points of one wrapper library.
///
/// Plain function pointers, copied out of the loader so the table itself is
/// `Copy`; the owning [`Fmi2Library`] keeps the shared library mapped for as
/// long as the table is reachable.
#[derive(Clone, Copy, Debug)]
pub struct Fmi2Api {
    pub instantiate: InstantiateFn,
    pub free_instance: FreeInstanceFn,
    pub set_debug_logging: SetDebugLoggingFn,
    pub get_types_platform: GetStringAttributeFn,
    pub get_version: GetStringAttributeFn,
    pub setup_experiment: SetupExperimentFn,
    pub enter_initialization_mode: LifecycleFn,
    pub exit_initialization_mode: LifecycleFn,
    pub terminate: LifecycleFn,
    pub reset: LifecycleFn,
    pub get_real: GetRealFn,
    pub get_integer: GetIntegerFn,
    pub get_boolean: GetBooleanFn,
    pub get_string: GetStringFn,
    pub set_real: SetRealFn,
    pub set_integer: SetIntegerFn,
    pub set_boolean: SetBooleanFn,
    pub set_string: SetStringFn,
    pub get_fmu_state: GetFmuStateFn,
    pub set_fmu_state: SetFmuStateFn,
    pub free_fmu_state: FreeFmuStateFn,
    pub serialized_fmu_state_size: SerializedFmuStateSizeFn,
    pub serialize_fmu_state: SerializeFmuStateFn,
    pub deserialize_fmu_state: DeserializeFmuStateFn,
    pub get_directional_derivative: GetDirectionalDerivativeFn,
    pub enter_event_mode: LifecycleFn,
    pub new_discrete_states: NewDiscreteStatesFn,
    pub enter_continuous_time_mode: LifecycleFn,
    pub completed_integrator_step: CompletedIntegratorStepFn,
    pub set_time: SetTimeFn,
    pub set_continuous_states: SetContinuousStatesFn,
    pub get_derivatives: GetRealBufferFn,
    pub get_event_indicators: GetRealBufferFn,
    pub get_continuous_states: GetRealBufferFn,
    pub get_nominals_of_continuous_states: GetRealBufferFn,
    pub set_real_input_derivatives: SetRealInputDerivativesFn,
    pub get_real_output_derivatives: GetRealOutputDerivativesFn,
    pub do_step: DoStepFn,
    pub cancel_step: LifecycleFn,
    pub get_status: GetStatusFn,
    pub get_real_status: GetRealStatusFn,
    pub get_integer_status: GetIntegerStatusFn,
    pub get_boolean_status: GetBooleanStatusFn,
    pub get_string_status: GetStringStatusFn,
}

impl Fmi2Api {
    /// Resolve every entry point from a loaded wrapper library.
    ///
    /// # Safety
    ///
    /// The caller must ensure the library actually implements the wrapper
    /// ABI; a symbol with a matching name but a different signature leads to
    /// undefined behavior when the pointer is eventually called.
    unsafe fn resolve(library: &Library) -> Result<Self, FmuError> {
        macro_rules! sym {
            ($name:literal, $ty:ty) => {{
                let symbol: Symbol<'_, $ty> = library
                    .get(concat!($name, "\0").as_bytes())
                    .map_err(|_| FmuError::MissingSymbol($name))?;
                *symbol
            }};
        }

        Ok(Fmi2Api {
            instantiate: sym!("instantiate", InstantiateFn),
            free_instance: sym!("free_instance", FreeInstanceFn),
            set_debug_logging: sym!("set_debug_logging", SetDebugLoggingFn),
            get_types_platform: sym!("get_types_platform", GetStringAttributeFn),
            get_version: sym!("get_version", GetStringAttributeFn),
            setup_experiment: sym!("setup_experiment", SetupExperimentFn),
            enter_initialization_mode: sym!("enter_initialization_mode", LifecycleFn),
            exit_initialization_mode: sym!("exit_initialization_mode", LifecycleFn),
            terminate: sym!("terminate", LifecycleFn),
            reset: sym!("reset", LifecycleFn),
            get_real: sym!("get_real", GetRealFn),
            get_integer: sym!("get_integer", GetIntegerFn),
            get_boolean: sym!("get_boolean", GetBooleanFn),
            get_string: sym!("get_string", GetStringFn),
            set_real: sym!("set_real", SetRealFn),
            set_integer: sym!("set_integer", SetIntegerFn),
            set_boolean: sym!("set_boolean", SetBooleanFn),
            set_string: sym!("set_string", SetStringFn),
            get_fmu_state: sym!("get_fmu_state", GetFmuStateFn),
            set_fmu_state: sym!("set_fmu_state", SetFmuStateFn),
            free_fmu_state: sym!("free_fmu_state", FreeFmuStateFn),
            serialized_fmu_state_size: sym!("serialized_fmu_state_size", SerializedFmuStateSizeFn),
            serialize_fmu_state: sym!("serialize_fmu_state", SerializeFmuStateFn),
            deserialize_fmu_state: sym!("deserialize_fmu_state", DeserializeFmuStateFn),
            get_directional_derivative: sym!(
                "get_directional_derivative",
                GetDirectionalDerivativeFn
            ),
            enter_event_mode: sym!("enter_event_mode", LifecycleFn),
            new_discrete_states: sym!("new_discrete_states", NewDiscreteStatesFn),
            enter_continuous_time_mode: sym!("enter_continuous_time_mode", LifecycleFn),
            completed_integrator_step: sym!("completed_integrator_step", CompletedIntegratorStepFn),
            set_time: sym!("set_time", SetTimeFn),
            set_continuous_states: sym!("set_continuous_states", SetContinuousStatesFn),
            get_derivatives: sym!("get_derivatives", GetRealBufferFn),
            get_event_indicators: sym!("get_event_indicators", GetRealBufferFn),
            get_continuous_states: sym!("get_continuous_states", GetRealBufferFn),
            get_nominals_of_continuous_states: sym!(
                "get_nominals_of_continuous_states",
                GetRealBufferFn
            ),
            set_real_input_derivatives: sym!(
                "set_real_input_derivatives",
                SetRealInputDerivativesFn
            ),
            get_real_output_derivatives: sym!(
                "get_real_output_derivatives",
                GetRealOutputDerivativesFn
            ),
            do_step: sym!("do_step", DoStepFn),
            cancel_step: sym!("cancel_step", LifecycleFn),
            get_status: sym!("get_status", GetStatusFn),
            get_real_status: sym!("get_real_status", GetRealStatusFn),
            get_integer_status: sym!("get_integer_status", GetIntegerStatusFn),
            get_boolean_status: sym!("get_boolean_status", GetBooleanStatusFn),
            get_string_status: sym!("get_string_status", GetStringStatusFn),
        })
    }
}

/// A loaded FMI2 wrapper library with its resolved entry points.
///
/// Loading executes the library's initialization code; symbols are resolved
/// eagerly so that a broken wrapper fails at load time, not mid-simulation.
/// The `Library` is kept mapped for the lifetime of this value, which is what
/// keeps the copied fn pointers in [`Fmi2Api`] valid.
#[derive(Debug)]
pub struct Fmi2Library {
    api: Fmi2Api,
    _library: Option<Library>,
}

impl Fmi2Library {
    /// Load the wrapper shared library at `path` and resolve every entry
    /// point.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FmuError> {
        let path = path.as_ref();
        // SAFETY: loading a shared library runs arbitrary initialization
        // code; the caller vouches for the file it points us at.
        let library = unsafe { Library::new(path) }.map_err(|source| FmuError::LibraryLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let api = unsafe { Fmi2Api::resolve(&library)? };
        log::debug!("loaded fmi2 wrapper library from {}", path.display());
        Ok(Fmi2Library {
            api,
            _library: Some(library),
        })
    }

    /// Build a library around an already-resolved entry-point table.
    ///
    /// Test seam for substituting a mock native surface.
    #[cfg(test)]
    pub(crate) fn from_api(api: Fmi2Api) -> Self {
        Fmi2Library {
            api,
            _library: None,
        }
    }

    pub(crate) fn api(&self) -> &Fmi2Api {
        &self.api
    }
}
