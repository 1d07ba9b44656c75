//! The FMU instance facade: one opaque native handle, its two callback
//! trampolines, and the typed operation surface.
//!
//! Lifecycle: an instance is constructed unbound (no native interaction),
//! bound by [`FmuInstance::instantiate`], driven through `setup_experiment` /
//! `enter_initialization_mode` / `exit_initialization_mode`, stepped or
//! integrated, terminated, and released by [`FmuInstance::free`] or `Drop`.
//!
//! Every operation checks the handle before touching the native surface;
//! with no live handle it returns [`Fmi2Status::Fatal`] without making any
//! native call. Beyond that the binding does not police the FMI2 transition
//! graph; illegal orderings are reported by the native library through its
//! own status returns.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::api::Fmi2Library;
use crate::bridge::{CallbackBridge, EventHub};
use crate::error::FmuError;
use crate::marshal;
use crate::types::{
    EventInfo, Fmi2FmuStateRaw, Fmi2Status, Fmi2StatusKind, Fmi2StatusRaw, Fmi2Type,
    Fmi2ValueReference, FmuState, RawEventInfo, FMI2_FALSE,
};

/// Totalize a raw native status. Out-of-contract values are reported as
/// fatal rather than trusted.
fn checked_status(raw: Fmi2StatusRaw) -> Fmi2Status {
    Fmi2Status::from_raw(raw).unwrap_or_else(|| {
        log::warn!("native call returned unknown status code {raw}; treating as fatal");
        Fmi2Status::Fatal
    })
}

/// One FMU model instance behind the wrapper library.
///
/// Owns the native handle exclusively and guarantees it is released exactly
/// once, before the callback trampolines the native library may still hold
/// pointers to. Dropping the instance frees the handle if [`free`] was not
/// called explicitly.
///
/// Callbacks may be delivered from a native-owned thread, so subscribers
/// must be `Send + Sync`; the instance itself is single-owner and not meant
/// to be shared across threads.
///
/// [`free`]: FmuInstance::free
pub struct FmuInstance {
    library: Arc<Fmi2Library>,
    binary_path: PathBuf,
    events: Arc<EventHub>,
    bridge: Option<CallbackBridge>,
    handle: Option<NonNull<c_void>>,
}

impl FmuInstance {
    /// Bind a future instance to the model binary at `binary_path`.
    ///
    /// Pure value capture: no native call is made until
    /// [`instantiate`](FmuInstance::instantiate). Subscribers can be
    /// registered on the unbound instance.
    pub fn new(library: Arc<Fmi2Library>, binary_path: impl Into<PathBuf>) -> Self {
        FmuInstance {
            library,
            binary_path: binary_path.into(),
            events: Arc::new(EventHub::new()),
            bridge: None,
            handle: None,
        }
    }

    /// Path to the model binary this instance is bound to.
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Whether a live native handle exists.
    pub fn is_instantiated(&self) -> bool {
        self.handle.is_some()
    }

    /// Subscribe to native log messages
    /// (`instance_name, status, category, message`).
    pub fn on_log(
        &self,
        subscriber: impl Fn(&str, Fmi2Status, &str, &str) + Send + Sync + 'static,
    ) {
        self.events.subscribe_log(Arc::new(subscriber));
    }

    /// Subscribe to step-finished notifications of asynchronous steps.
    pub fn on_step_finished(&self, subscriber: impl Fn(Fmi2Status) + Send + Sync + 'static) {
        self.events.subscribe_step_finished(Arc::new(subscriber));
    }

    /// Create the native instance if none is live yet.
    ///
    /// A second call with a live handle is a no-op; for reinstantiation call
    /// [`reset`](FmuInstance::reset), or [`free`](FmuInstance::free) followed
    /// by `instantiate`. The trampolines are created before the native call
    /// and kept for as long as the handle lives.
    pub fn instantiate(
        &mut self,
        instance_name: &str,
        fmu_type: Fmi2Type,
        guid: &str,
        resource_location: &str,
        visible: bool,
        logging_on: bool,
    ) -> Result<(), FmuError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let file_name = marshal::to_cstring(&self.binary_path.to_string_lossy())?;
        let name = marshal::to_cstring(instance_name)?;
        let guid = marshal::to_cstring(guid)?;
        let resource_location = marshal::to_cstring(resource_location)?;

        let bridge = CallbackBridge::new(Arc::clone(&self.events));
        let handle = unsafe {
            (self.library.api().instantiate)(
                file_name.as_ptr(),
                bridge.log_ptr(),
                bridge.step_finished_ptr(),
                name.as_ptr(),
                fmu_type.as_raw(),
                guid.as_ptr(),
                resource_location.as_ptr(),
                marshal::bool_to_native(visible),
                marshal::bool_to_native(logging_on),
            )
        };

        match NonNull::new(handle) {
            Some(handle) => {
                self.bridge = Some(bridge);
                self.handle = Some(handle);
                Ok(())
            }
            None => {
                log::warn!("native instantiate returned null for instance `{instance_name}`");
                Err(FmuError::Instantiation(instance_name.to_owned()))
            }
        }
    }

    /// Release the native handle.
    ///
    /// Idempotent: the first call invokes the native `free_instance`, every
    /// later call is a no-op. The native free has no return value, so
    /// release is best-effort; the handle is cleared unconditionally.
    pub fn free(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe { (self.library.api().free_instance)(handle.as_ptr()) };
        }
    }

    /// Run `op` against the live handle, or synthesize `Fatal` without any
    /// native call when the handle is null.
    fn with_handle(&self, op: impl FnOnce(*mut c_void) -> Fmi2StatusRaw) -> Fmi2Status {
        match self.handle {
            Some(handle) => checked_status(op(handle.as_ptr())),
            None => Fmi2Status::Fatal,
        }
    }

    /// Toggle debug logging for the given categories.
    pub fn set_debug_logging<S: AsRef<str>>(
        &self,
        logging_on: bool,
        categories: &[S],
    ) -> Result<Fmi2Status, FmuError> {
        let (_storage, pointers) = marshal::to_cstring_array(categories)?;
        Ok(self.with_handle(|handle| unsafe {
            (self.library.api().set_debug_logging)(
                handle,
                marshal::bool_to_native(logging_on),
                pointers.len(),
                pointers.as_ptr(),
            )
        }))
    }

    /// The platform identifier compiled into the model binary.
    ///
    /// Empty when no instance is live. The native string is copied out
    /// immediately; the next call into the instance may invalidate it.
    pub fn get_types_platform(&self) -> String {
        match self.handle {
            Some(handle) => unsafe {
                let ptr = (self.library.api().get_types_platform)(handle.as_ptr());
                marshal::copy_native_string(ptr)
            },
            None => String::new(),
        }
    }

    /// The FMI version reported by the model binary. Empty when no instance
    /// is live.
    pub fn get_version(&self) -> String {
        match self.handle {
            Some(handle) => unsafe {
                let ptr = (self.library.api().get_version)(handle.as_ptr());
                marshal::copy_native_string(ptr)
            },
            None => String::new(),
        }
    }

    pub fn setup_experiment(
        &self,
        tolerance_defined: bool,
        tolerance: f64,
        start_time: f64,
        stop_time_defined: bool,
        stop_time: f64,
    ) -> Fmi2Status {
        self.with_handle(|handle| unsafe {
            (self.library.api().setup_experiment)(
                handle,
                marshal::bool_to_native(tolerance_defined),
                tolerance,
                start_time,
                marshal::bool_to_native(stop_time_defined),
                stop_time,
            )
        })
    }

    pub fn enter_initialization_mode(&self) -> Fmi2Status {
        self.with_handle(|handle| unsafe {
            (self.library.api().enter_initialization_mode)(handle)
        })
    }

    pub fn exit_initialization_mode(&self) -> Fmi2Status {
        self.with_handle(|handle| unsafe {
            (self.library.api().exit_initialization_mode)(handle)
        })
    }

    pub fn terminate(&self) -> Fmi2Status {
        self.with_handle(|handle| unsafe { (self.library.api().terminate)(handle) })
    }

    /// Return the instance to its state right after instantiation.
    pub fn reset(&self) -> Fmi2Status {
        self.with_handle(|handle| unsafe { (self.library.api().reset)(handle) })
    }

    // Variable access. Value references are opaque keys from the model
    // description; the binding never validates their range.

    pub fn get_real(&self, vr: &[Fmi2ValueReference]) -> (Fmi2Status, Vec<f64>) {
        let mut values = vec![0.0; vr.len()];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_real)(handle, vr.as_ptr(), vr.len(), values.as_mut_ptr())
        });
        (status, values)
    }

    pub fn get_integer(&self, vr: &[Fmi2ValueReference]) -> (Fmi2Status, Vec<i32>) {
        let mut values = vec![0; vr.len()];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_integer)(handle, vr.as_ptr(), vr.len(), values.as_mut_ptr())
        });
        (status, values)
    }

    pub fn get_boolean(&self, vr: &[Fmi2ValueReference]) -> (Fmi2Status, Vec<bool>) {
        let mut values = vec![FMI2_FALSE; vr.len()];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_boolean)(handle, vr.as_ptr(), vr.len(), values.as_mut_ptr())
        });
        (status, marshal::native_to_bools(&values))
    }

    /// Read string variables. Each native string is copied out before this
    /// returns; the transient pointers never escape.
    pub fn get_string(&self, vr: &[Fmi2ValueReference]) -> (Fmi2Status, Vec<String>) {
        let mut pointers = vec![ptr::null(); vr.len()];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_string)(handle, vr.as_ptr(), vr.len(), pointers.as_mut_ptr())
        });
        let values = pointers
            .into_iter()
            .map(|ptr| unsafe { marshal::copy_native_string(ptr) })
            .collect();
        (status, values)
    }

    /// Write real variables.
    ///
    /// # Panics
    ///
    /// Panics if `vr` and `values` differ in length; the mismatch is
    /// detected before any native call.
    pub fn set_real(&self, vr: &[Fmi2ValueReference], values: &[f64]) -> Fmi2Status {
        marshal::check_paired_lengths(vr.len(), values.len());
        self.with_handle(|handle| unsafe {
            (self.library.api().set_real)(handle, vr.as_ptr(), vr.len(), values.as_ptr())
        })
    }

    /// Write integer variables.
    ///
    /// # Panics
    ///
    /// Panics if `vr` and `values` differ in length.
    pub fn set_integer(&self, vr: &[Fmi2ValueReference], values: &[i32]) -> Fmi2Status {
        marshal::check_paired_lengths(vr.len(), values.len());
        self.with_handle(|handle| unsafe {
            (self.library.api().set_integer)(handle, vr.as_ptr(), vr.len(), values.as_ptr())
        })
    }

    /// Write boolean variables.
    ///
    /// # Panics
    ///
    /// Panics if `vr` and `values` differ in length.
    pub fn set_boolean(&self, vr: &[Fmi2ValueReference], values: &[bool]) -> Fmi2Status {
        marshal::check_paired_lengths(vr.len(), values.len());
        let native = marshal::bools_to_native(values);
        self.with_handle(|handle| unsafe {
            (self.library.api().set_boolean)(handle, vr.as_ptr(), vr.len(), native.as_ptr())
        })
    }

    /// Write string variables. The C buffers live only for the duration of
    /// the native call.
    ///
    /// # Panics
    ///
    /// Panics if `vr` and `values` differ in length.
    pub fn set_string<S: AsRef<str>>(
        &self,
        vr: &[Fmi2ValueReference],
        values: &[S],
    ) -> Result<Fmi2Status, FmuError> {
        marshal::check_paired_lengths(vr.len(), values.len());
        let (_storage, pointers) = marshal::to_cstring_array(values)?;
        Ok(self.with_handle(|handle| unsafe {
            (self.library.api().set_string)(handle, vr.as_ptr(), vr.len(), pointers.as_ptr())
        }))
    }

    // FMU state snapshots.

    /// Ask the model for a snapshot of its complete internal state.
    pub fn get_fmu_state(&self) -> (Fmi2Status, FmuState) {
        let mut raw: Fmi2FmuStateRaw = ptr::null_mut();
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_fmu_state)(handle, &mut raw)
        });
        (status, FmuState::from_raw(raw))
    }

    /// Restore a previously captured state snapshot.
    pub fn set_fmu_state(&self, state: &FmuState) -> Fmi2Status {
        self.with_handle(|handle| unsafe {
            (self.library.api().set_fmu_state)(handle, state.as_raw())
        })
    }

    /// Release a state snapshot. Consumes the snapshot; the native pointer
    /// must not be used again.
    pub fn free_fmu_state(&self, state: FmuState) -> Fmi2Status {
        let mut raw = state.into_raw();
        self.with_handle(|handle| unsafe {
            (self.library.api().free_fmu_state)(handle, &mut raw)
        })
    }

    pub fn serialized_fmu_state_size(&self, state: &FmuState) -> (Fmi2Status, usize) {
        let mut size = 0usize;
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().serialized_fmu_state_size)(handle, state.as_raw(), &mut size)
        });
        (status, size)
    }

    /// Serialize a state snapshot into a byte buffer of the given size
    /// (obtained from [`serialized_fmu_state_size`]).
    ///
    /// [`serialized_fmu_state_size`]: FmuInstance::serialized_fmu_state_size
    pub fn serialize_fmu_state(&self, state: &FmuState, size: usize) -> (Fmi2Status, Vec<u8>) {
        let mut buffer = vec![0u8; size];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().serialize_fmu_state)(
                handle,
                state.as_raw(),
                buffer.as_mut_ptr().cast(),
                buffer.len(),
            )
        });
        (status, buffer)
    }

    pub fn deserialize_fmu_state(&self, serialized: &[u8]) -> (Fmi2Status, FmuState) {
        let mut raw: Fmi2FmuStateRaw = ptr::null_mut();
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().deserialize_fmu_state)(
                handle,
                serialized.as_ptr().cast(),
                serialized.len(),
                &mut raw,
            )
        });
        (status, FmuState::from_raw(raw))
    }

    /// Directional derivatives of the unknowns with respect to the knowns,
    /// seeded with `dv_known`.
    ///
    /// # Panics
    ///
    /// Panics if `vr_known` and `dv_known` differ in length.
    pub fn get_directional_derivative(
        &self,
        vr_unknown: &[Fmi2ValueReference],
        vr_known: &[Fmi2ValueReference],
        dv_known: &[f64],
    ) -> (Fmi2Status, Vec<f64>) {
        marshal::check_paired_lengths(vr_known.len(), dv_known.len());
        let mut dv_unknown = vec![0.0; vr_unknown.len()];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_directional_derivative)(
                handle,
                vr_unknown.as_ptr(),
                vr_unknown.len(),
                vr_known.as_ptr(),
                vr_known.len(),
                dv_known.as_ptr(),
                dv_unknown.as_mut_ptr(),
            )
        });
        (status, dv_unknown)
    }

    // Model exchange.

    pub fn enter_event_mode(&self) -> Fmi2Status {
        self.with_handle(|handle| unsafe { (self.library.api().enter_event_mode)(handle) })
    }

    /// Request a discrete-state update. The returned record is produced by
    /// the native library and not retained by the binding.
    pub fn new_discrete_states(&self) -> (Fmi2Status, EventInfo) {
        let mut raw = RawEventInfo::default();
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().new_discrete_states)(handle, &mut raw)
        });
        (status, EventInfo::from(raw))
    }

    pub fn enter_continuous_time_mode(&self) -> Fmi2Status {
        self.with_handle(|handle| unsafe {
            (self.library.api().enter_continuous_time_mode)(handle)
        })
    }

    /// Notify the model that an integrator step completed. Returns
    /// `(status, enter_event_mode, terminate_simulation)`.
    pub fn completed_integrator_step(
        &self,
        no_set_fmu_state_prior_to_current_point: bool,
    ) -> (Fmi2Status, bool, bool) {
        let mut enter_event_mode = FMI2_FALSE;
        let mut terminate_simulation = FMI2_FALSE;
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().completed_integrator_step)(
                handle,
                marshal::bool_to_native(no_set_fmu_state_prior_to_current_point),
                &mut enter_event_mode,
                &mut terminate_simulation,
            )
        });
        (
            status,
            marshal::native_to_bool(enter_event_mode),
            marshal::native_to_bool(terminate_simulation),
        )
    }

    pub fn set_time(&self, time: f64) -> Fmi2Status {
        self.with_handle(|handle| unsafe { (self.library.api().set_time)(handle, time) })
    }

    pub fn set_continuous_states(&self, states: &[f64]) -> Fmi2Status {
        self.with_handle(|handle| unsafe {
            (self.library.api().set_continuous_states)(handle, states.as_ptr(), states.len())
        })
    }

    /// Read the state derivatives; `nx` is the model's continuous-state
    /// count, supplied by the caller from the model description.
    pub fn get_derivatives(&self, nx: usize) -> (Fmi2Status, Vec<f64>) {
        let mut derivatives = vec![0.0; nx];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_derivatives)(handle, derivatives.as_mut_ptr(), nx)
        });
        (status, derivatives)
    }

    pub fn get_event_indicators(&self, ni: usize) -> (Fmi2Status, Vec<f64>) {
        let mut indicators = vec![0.0; ni];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_event_indicators)(handle, indicators.as_mut_ptr(), ni)
        });
        (status, indicators)
    }

    pub fn get_continuous_states(&self, nx: usize) -> (Fmi2Status, Vec<f64>) {
        let mut states = vec![0.0; nx];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_continuous_states)(handle, states.as_mut_ptr(), nx)
        });
        (status, states)
    }

    pub fn get_nominals_of_continuous_states(&self, nx: usize) -> (Fmi2Status, Vec<f64>) {
        let mut nominals = vec![0.0; nx];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_nominals_of_continuous_states)(
                handle,
                nominals.as_mut_ptr(),
                nx,
            )
        });
        (status, nominals)
    }

    // Co-simulation.

    /// Provide input derivatives for the next communication step.
    ///
    /// # Panics
    ///
    /// Panics if `vr`, `order` and `values` do not all have the same length.
    pub fn set_real_input_derivatives(
        &self,
        vr: &[Fmi2ValueReference],
        order: &[i32],
        values: &[f64],
    ) -> Fmi2Status {
        marshal::check_paired_lengths(vr.len(), order.len());
        marshal::check_paired_lengths(vr.len(), values.len());
        self.with_handle(|handle| unsafe {
            (self.library.api().set_real_input_derivatives)(
                handle,
                vr.as_ptr(),
                vr.len(),
                order.as_ptr(),
                values.as_ptr(),
            )
        })
    }

    /// Read output derivatives of the last communication step.
    ///
    /// # Panics
    ///
    /// Panics if `vr` and `order` differ in length.
    pub fn get_real_output_derivatives(
        &self,
        vr: &[Fmi2ValueReference],
        order: &[i32],
    ) -> (Fmi2Status, Vec<f64>) {
        marshal::check_paired_lengths(vr.len(), order.len());
        let mut values = vec![0.0; vr.len()];
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_real_output_derivatives)(
                handle,
                vr.as_ptr(),
                vr.len(),
                order.as_ptr(),
                values.as_mut_ptr(),
            )
        });
        (status, values)
    }

    /// Advance the slave by one communication step.
    ///
    /// The call may be asynchronous on the native side: a `Pending` return
    /// means completion will be signaled later through the step-finished
    /// callback, and the binding does not block waiting for it.
    pub fn do_step(
        &self,
        current_communication_point: f64,
        communication_step_size: f64,
        no_set_fmu_state_prior_to_current_point: bool,
    ) -> Fmi2Status {
        self.with_handle(|handle| unsafe {
            (self.library.api().do_step)(
                handle,
                current_communication_point,
                communication_step_size,
                marshal::bool_to_native(no_set_fmu_state_prior_to_current_point),
            )
        })
    }

    /// Cancel a pending asynchronous step. Only meaningful while a prior
    /// [`do_step`](FmuInstance::do_step) is outstanding.
    pub fn cancel_step(&self) -> Fmi2Status {
        self.with_handle(|handle| unsafe { (self.library.api().cancel_step)(handle) })
    }

    // Slave status inquiry.

    /// Query a status of the given kind; returns `(call_status, value)`.
    pub fn get_status(&self, kind: Fmi2StatusKind) -> (Fmi2Status, Fmi2Status) {
        let mut value: Fmi2StatusRaw = 0;
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_status)(handle, kind.as_raw(), &mut value)
        });
        (status, checked_status(value))
    }

    pub fn get_real_status(&self, kind: Fmi2StatusKind) -> (Fmi2Status, f64) {
        let mut value = 0.0;
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_real_status)(handle, kind.as_raw(), &mut value)
        });
        (status, value)
    }

    pub fn get_integer_status(&self, kind: Fmi2StatusKind) -> (Fmi2Status, i32) {
        let mut value = 0;
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_integer_status)(handle, kind.as_raw(), &mut value)
        });
        (status, value)
    }

    pub fn get_boolean_status(&self, kind: Fmi2StatusKind) -> (Fmi2Status, bool) {
        let mut value = FMI2_FALSE;
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_boolean_status)(handle, kind.as_raw(), &mut value)
        });
        (status, marshal::native_to_bool(value))
    }

    pub fn get_string_status(&self, kind: Fmi2StatusKind) -> (Fmi2Status, String) {
        let mut value = ptr::null();
        let status = self.with_handle(|handle| unsafe {
            (self.library.api().get_string_status)(handle, kind.as_raw(), &mut value)
        });
        (status, unsafe { marshal::copy_native_string(value) })
    }
}

impl Drop for FmuInstance {
    fn drop(&mut self) {
        // Release the handle first; the trampolines (bridge) drop after this
        // returns, once the native library can no longer call them.
        self.free();
    }
}
