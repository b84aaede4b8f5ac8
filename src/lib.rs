//! # abrt-java-agent
//!
//! A JVMTI agent that reports Java problems to ABRT, plus the offline
//! analyzer for the backtraces it produces.
//!
//! The agent watches uncaught exceptions (and caught ones of selected types)
//! and garbage-collection pauses. Every newly seen exception gets its stack
//! trace rendered, annotated with the location each frame's class was loaded
//! from, and sent as a problem report to the enabled destinations (journald,
//! abrtd, syslog, the terminal). Each thread remembers the last few exceptions
//! it reported, so an exception propagating through several frames is
//! reported once.
//!
//! ```bash
//! java -agentpath:/usr/lib64/libabrt_java_agent.so=abrt=on,caught=java.io.IOException MyApp
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │   Agent_OnLoad / trampolines  (this file, agent)        │
//! ├─────────────────────────────────────────────────────────┤
//! │   jvm: JNI implementations of the core traits           │
//! ├─────────────────────────────────────────────────────────┤
//! │   processor: decisions over decoded events              │
//! │   exception_cache, thread_registry, stack_trace         │
//! │   report, transport, config                             │
//! ├─────────────────────────────────────────────────────────┤
//! │   env: Jvmti / JniEnv wrappers                          │
//! │   sys: raw JNI and JVMTI tables                         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `jvm` and `agent` talk to the VM. The layers below the processor are
//! plain Rust and are tested without a JVM.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | agent options and the plugin configuration file |
//! | [`processor`] | which exceptions get reported, GC pause monitoring |
//! | [`stack_trace`] | bounded stack trace rendering |
//! | [`report`] | problem reports, destinations, event log |
//! | [`analyzer`] | backtrace parsing and duplicate hashing for ABRT |

pub mod sys;
pub mod env;

// Implementation modules (use `env` module for the public API)
#[doc(hidden)]
pub mod jvmti_wrapper;
#[doc(hidden)]
pub mod jni_wrapper;

pub mod agent;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod events;
pub mod exception_cache;
pub mod jvm;
pub mod logging;
pub mod prelude;
pub mod process;
pub mod processor;
pub mod report;
pub mod stack_trace;
pub mod thread_registry;
pub mod transport;

use std::sync::OnceLock;
pub use crate::sys::jni as jni;
use crate::sys::jvmti as jvmti;

/// Receiver of the JVMTI events this crate subscribes to.
///
/// Implement it and use [`export_agent!`] to create a loadable agent library.
/// Event methods default to no-ops.
///
/// Events fire concurrently on VM threads, hence `Sync + Send`.
pub trait Agent: Sync + Send {
    /// Called when the agent is loaded into the JVM.
    ///
    /// Return `JNI_OK` (0) on success, or `JNI_ERR` (-1) to abort VM startup.
    fn on_load(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint;

    /// Called when the agent is unloaded (JVM shutdown).
    fn on_unload(&self) {}

    /// VM initialization is complete; JNI is fully functional.
    /// `thread` is the initial thread.
    fn vm_init(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread) {}

    /// Last event with a working JNI.
    fn vm_death(&self, _jni: *mut jni::JNIEnv) {}

    fn thread_start(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread) {}

    fn thread_end(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread) {}

    /// An exception was thrown. `catch_method` is null when nothing catches it.
    fn exception(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _method: jni::jmethodID,
                 _location: jvmti::jlocation, _exception: jni::jobject,
                 _catch_method: jni::jmethodID, _catch_location: jvmti::jlocation) {}

    fn exception_catch(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _method: jni::jmethodID,
                       _location: jvmti::jlocation, _exception: jni::jobject) {}

    /// A method was compiled. No `JNIEnv` is available.
    fn compiled_method_load(&self, _method: jni::jmethodID, _code_size: jni::jint) {}

    /// **No JNI calls allowed** during this callback.
    fn garbage_collection_start(&self) {}

    /// **No JNI calls allowed** during this callback.
    fn garbage_collection_finish(&self) {}

    fn object_free(&self, _tag: jni::jlong) {}

    fn vm_object_alloc(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _object: jni::jobject, _klass: jni::jclass, _size: jni::jlong) {}
}

// This holds the Agent instance so the static C functions can find it.
pub static GLOBAL_AGENT: OnceLock<Box<dyn Agent>> = OnceLock::new();

/// Registers the process-wide agent; fails if one is already registered.
pub fn set_global_agent(agent: Box<dyn Agent>) -> Result<(), ()> {
    GLOBAL_AGENT.set(agent).map_err(|_| ())
}

// --- Lifecycle ---
unsafe extern "system" fn trampoline_vm_init(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.vm_init(jni, thread); }
}
unsafe extern "system" fn trampoline_vm_death(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.vm_death(jni); }
}

// --- Threads ---
unsafe extern "system" fn trampoline_thread_start(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.thread_start(jni, thread); }
}
unsafe extern "system" fn trampoline_thread_end(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.thread_end(jni, thread); }
}

// --- Exceptions ---
unsafe extern "system" fn trampoline_exception(
    _env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread, method: jni::jmethodID,
    location: jvmti::jlocation, exception: jni::jobject, catch_method: jni::jmethodID, catch_location: jvmti::jlocation
) {
    if let Some(agent) = GLOBAL_AGENT.get() {
        agent.exception(jni, thread, method, location, exception, catch_method, catch_location);
    }
}
unsafe extern "system" fn trampoline_exception_catch(
    _env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread, method: jni::jmethodID,
    location: jvmti::jlocation, exception: jni::jobject
) {
    if let Some(agent) = GLOBAL_AGENT.get() {
        agent.exception_catch(jni, thread, method, location, exception);
    }
}

// --- Compilation ---
unsafe extern "system" fn trampoline_compiled_method_load(
    _env: *mut jvmti::jvmtiEnv, method: jni::jmethodID, code_size: jni::jint, _code_addr: *const std::os::raw::c_void,
    _map_length: jni::jint, _map: *const std::os::raw::c_void, _compile_info: *const std::os::raw::c_void
) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.compiled_method_load(method, code_size); }
}

// --- GC ---
unsafe extern "system" fn trampoline_garbage_collection_start(_env: *mut jvmti::jvmtiEnv) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.garbage_collection_start(); }
}
unsafe extern "system" fn trampoline_garbage_collection_finish(_env: *mut jvmti::jvmtiEnv) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.garbage_collection_finish(); }
}

// --- Objects ---
unsafe extern "system" fn trampoline_object_free(_env: *mut jvmti::jvmtiEnv, tag: jni::jlong) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.object_free(tag); }
}
unsafe extern "system" fn trampoline_vm_object_alloc(
    _env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread,
    object: jni::jobject, klass: jni::jclass, size: jni::jlong
) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.vm_object_alloc(jni, thread, object, klass, size); }
}

/// Returns a `jvmtiEventCallbacks` struct routing every handled event to the
/// global [`Agent`].
///
/// Events still have to be enabled one by one with
/// `Jvmti::set_event_notification_mode`; see [`events::EventKind`].
pub fn get_default_callbacks() -> jvmti::jvmtiEventCallbacks {
    let mut callbacks = jvmti::jvmtiEventCallbacks::default();

    callbacks.VMInit = Some(trampoline_vm_init);
    callbacks.VMDeath = Some(trampoline_vm_death);

    callbacks.ThreadStart = Some(trampoline_thread_start);
    callbacks.ThreadEnd = Some(trampoline_thread_end);

    callbacks.Exception = Some(trampoline_exception);
    callbacks.ExceptionCatch = Some(trampoline_exception_catch);

    callbacks.CompiledMethodLoad = Some(trampoline_compiled_method_load);

    callbacks.GarbageCollectionStart = Some(trampoline_garbage_collection_start);
    callbacks.GarbageCollectionFinish = Some(trampoline_garbage_collection_finish);

    callbacks.ObjectFree = Some(trampoline_object_free);
    callbacks.VMObjectAlloc = Some(trampoline_vm_object_alloc);

    callbacks
}

/// Exports an agent type as a loadable JVMTI agent library.
///
/// Generates the `Agent_OnLoad` and `Agent_OnUnload` entry points the JVM
/// looks up for `-agentpath`/`-agentlib`. The type must implement [`Agent`]
/// and [`Default`]; one instance is created per JVM and stored in
/// [`GLOBAL_AGENT`].
///
/// The options string (everything after `=` in `-agentpath`) is passed to
/// [`Agent::on_load`].
#[macro_export]
macro_rules! export_agent {
    ($agent_type:ty) => {
        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnLoad(
            vm: *mut $crate::sys::jni::JavaVM,
            options: *mut std::ffi::c_char,
            _reserved: *mut std::ffi::c_void,
        ) -> $crate::sys::jni::jint {
            let agent = Box::new(<$agent_type>::default());
            if $crate::set_global_agent(agent).is_err() {
                return $crate::sys::jni::JNI_ERR;
            }

            let options = if options.is_null() {
                String::new()
            } else {
                std::ffi::CStr::from_ptr(options).to_string_lossy().into_owned()
            };

            match $crate::GLOBAL_AGENT.get() {
                Some(agent) => agent.on_load(vm, &options),
                None => $crate::sys::jni::JNI_ERR,
            }
        }

        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnUnload(_vm: *mut $crate::sys::jni::JavaVM) {
            if let Some(agent) = $crate::GLOBAL_AGENT.get() {
                agent.on_unload();
            }
        }
    };
}
