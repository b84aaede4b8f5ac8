//! The loadable agent: JVMTI setup and event decoding.
//!
//! [`AbrtAgent`] turns raw callback arguments into [`events`](crate::events)
//! records and hands them to its [`EventProcessor`]. Every Java-side failure
//! is logged and the event dropped; nothing propagates back into the VM.

use std::sync::OnceLock;

use tracing::{debug, error};

use crate::config::{ConfSearchPath, Configuration};
use crate::events::{CompiledMethodEvent, ExceptionCatchEvent, ExceptionEvent, ObjectAllocEvent};
use crate::jvm::{self, RaisedJavaException, RetainedThrowable};
use crate::logging;
use crate::prelude::*;
use crate::process::ProcessProperties;
use crate::processor::{EventProcessor, LARGE_ALLOCATION_THRESHOLD};
use crate::report::{Dispatcher, EventLog};

/// Java VM pointer shared by all callbacks.
struct VmPtr(*mut jni::JavaVM);

// The invocation interface may be used from any thread.
unsafe impl Send for VmPtr {}
unsafe impl Sync for VmPtr {}

/// Capabilities the agent cannot work without.
pub fn required_capabilities() -> jvmti::jvmtiCapabilities {
    let mut caps = jvmti::jvmtiCapabilities::default();
    caps.set_can_tag_objects(true);
    caps.set_can_get_source_file_name(true);
    caps.set_can_get_line_numbers(true);
    caps.set_can_generate_exception_events(true);
    caps.set_can_generate_compiled_method_load_events(true);
    caps.set_can_generate_vm_object_alloc_events(true);
    caps.set_can_generate_garbage_collection_events(true);
    caps.set_can_generate_object_free_events(true);
    caps
}

/// Wraps a failed JVMTI call, logging the VM's name for the error.
fn jvmti_failure(jvmti: &Jvmti, operation: &'static str, code: jvmti::jvmtiError) -> AgentError {
    if let Ok(name) = jvmti.get_error_name(code) {
        error!("{operation} failed: {name}");
    }
    AgentError::jvmti(operation, code)
}

struct AgentContext {
    vm: VmPtr,
    jvmti: Jvmti,
    processor: EventProcessor<RetainedThrowable, Dispatcher>,
}

impl AgentContext {
    fn initialize(vm: *mut jni::JavaVM, options: &str) -> Result<Self> {
        let config = Configuration::load(options, &ConfSearchPath::default());
        debug!("configuration: {config:?}");

        let jvmti = Jvmti::new(vm).map_err(AgentError::NoJvmtiEnv)?;
        match jvmti.get_version_number() {
            Ok((major, minor, micro)) => debug!("JVMTI version {major}.{minor}.{micro}"),
            Err(code) => debug!("cannot read the JVMTI version: error {}", code.0),
        }

        jvmti
            .add_capabilities(&required_capabilities())
            .map_err(|code| jvmti_failure(&jvmti, "AddCapabilities", code))?;
        jvmti
            .set_event_callbacks(get_default_callbacks())
            .map_err(|code| jvmti_failure(&jvmti, "SetEventCallbacks", code))?;
        for kind in EventKind::ALL {
            jvmti
                .set_event_notification_mode(true, kind.jvmti_event(), std::ptr::null_mut())
                .map_err(|code| jvmti_failure(&jvmti, kind.name(), code))?;
        }

        let log = EventLog::open(&config.output)?;
        let sink = Dispatcher::from_config(&config);
        debug!("report destinations: {:?}", sink.names());

        Ok(AgentContext {
            vm: VmPtr(vm),
            jvmti,
            processor: EventProcessor::new(config, sink, log),
        })
    }
}

/// Reports uncaught exceptions and slow garbage collection to ABRT.
#[derive(Default)]
pub struct AbrtAgent {
    context: OnceLock<AgentContext>,
}

impl AbrtAgent {
    /// The event processor, once the agent is loaded.
    pub fn processor(&self) -> Option<&EventProcessor<RetainedThrowable, Dispatcher>> {
        self.context.get().map(|context| &context.processor)
    }
}

/// Wraps the callback's environment, skipping events that carry none.
fn jni_env(jni: *mut jni::JNIEnv) -> Option<JniEnv> {
    if jni.is_null() {
        return None;
    }
    // SAFETY: the VM hands each callback the env of the calling thread.
    Some(unsafe { JniEnv::from_raw(jni) })
}

impl Agent for AbrtAgent {
    fn on_load(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint {
        logging::init();
        debug!("agent loaded with options '{options}'");

        let context = match AgentContext::initialize(vm, options) {
            Ok(context) => context,
            Err(err) => {
                error!("cannot initialize the agent: {err}");
                return jni::JNI_ERR;
            }
        };
        if self.context.set(context).is_err() {
            error!("agent is already loaded");
            return jni::JNI_ERR;
        }
        jni::JNI_OK
    }

    fn on_unload(&self) {
        if let Some(context) = self.context.get() {
            context.processor.shutdown();
        }
        debug!("agent unloaded");
    }

    fn vm_init(&self, jni: *mut jni::JNIEnv, thread: jni::jthread) {
        let (Some(context), Some(env)) = (self.context.get(), jni_env(jni)) else {
            return;
        };
        debug!("VM init");
        let jvmti = &context.jvmti;
        let properties = ProcessProperties::current(
            jvm::main_class_location(jvmti, &env),
            jvm::jvm_environment(jvmti),
        );
        context.processor.set_process_properties(properties);

        // The initial thread gets no ThreadStart.
        if let Some(tid) = jvm::thread_id(&env, thread) {
            context.processor.thread_started(tid);
        }
    }

    fn vm_death(&self, _jni: *mut jni::JNIEnv) {
        if let Some(context) = self.context.get() {
            debug!("VM death");
            context.processor.shutdown();
        }
    }

    fn thread_start(&self, jni: *mut jni::JNIEnv, thread: jni::jthread) {
        let (Some(context), Some(env)) = (self.context.get(), jni_env(jni)) else {
            return;
        };
        match jvm::thread_id(&env, thread) {
            Some(tid) => context.processor.thread_started(tid),
            None => debug!("cannot read the id of a started thread"),
        }
    }

    fn thread_end(&self, jni: *mut jni::JNIEnv, thread: jni::jthread) {
        let (Some(context), Some(env)) = (self.context.get(), jni_env(jni)) else {
            return;
        };
        match jvm::thread_id(&env, thread) {
            // Released here, after the registry lock is gone.
            Some(tid) => drop(context.processor.thread_ended(tid)),
            None => debug!("cannot read the id of a finished thread"),
        }
    }

    fn exception(&self, jni: *mut jni::JNIEnv, thread: jni::jthread, method: jni::jmethodID,
                 _location: jvmti::jlocation, exception: jni::jobject,
                 catch_method: jni::jmethodID, _catch_location: jvmti::jlocation) {
        let (Some(context), Some(env)) = (self.context.get(), jni_env(jni)) else {
            return;
        };
        if exception.is_null() {
            return;
        }
        let jvmti = &context.jvmti;
        let Some(exception_type) = jvm::object_class_name(jvmti, &env, exception) else {
            debug!("cannot get the class of a thrown exception");
            return;
        };
        let event = ExceptionEvent {
            thread_id: jvm::thread_id(&env, thread),
            thread_name: jvm::thread_name(jvmti, &env, thread),
            exception_type,
            method: jvm::method_ref(jvmti, Some(&env), method),
            caught: !catch_method.is_null(),
        };

        let raised = RaisedJavaException::new(&env, jvmti, context.vm.0, exception);
        let decision = context.processor.exception_raised(&event, &raised);
        debug!("{} {}: {decision:?}", event.kind_label(), event.exception_type);
    }

    fn exception_catch(&self, jni: *mut jni::JNIEnv, thread: jni::jthread, method: jni::jmethodID,
                       _location: jvmti::jlocation, exception: jni::jobject) {
        let (Some(context), Some(env)) = (self.context.get(), jni_env(jni)) else {
            return;
        };
        let jvmti = &context.jvmti;
        let exception_type = if exception.is_null() {
            String::new()
        } else {
            jvm::object_class_name(jvmti, &env, exception).unwrap_or_default()
        };
        context.processor.exception_caught(&ExceptionCatchEvent {
            thread_name: jvm::thread_name(jvmti, &env, thread),
            exception_type,
            method: jvm::method_ref(jvmti, Some(&env), method),
        });
    }

    fn compiled_method_load(&self, method: jni::jmethodID, code_size: jni::jint) {
        let Some(context) = self.context.get() else {
            return;
        };
        context.processor.compiled_method_loaded(&CompiledMethodEvent {
            method: jvm::method_ref(&context.jvmti, None, method),
            code_size,
        });
    }

    fn garbage_collection_start(&self) {
        if let Some(context) = self.context.get() {
            context.processor.gc_started();
        }
    }

    fn garbage_collection_finish(&self) {
        if let Some(context) = self.context.get() {
            context.processor.gc_finished();
        }
    }

    fn object_free(&self, _tag: jni::jlong) {
        if let Some(context) = self.context.get() {
            context.processor.object_freed();
        }
    }

    fn vm_object_alloc(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _object: jni::jobject,
                       klass: jni::jclass, size: jni::jlong) {
        let Some(context) = self.context.get() else {
            return;
        };
        if size < LARGE_ALLOCATION_THRESHOLD {
            return;
        }
        let class_name = jvm::class_name(&context.jvmti, klass).unwrap_or_default();
        context.processor.object_allocated(&ObjectAllocEvent { class_name, size });
    }
}

crate::export_agent!(AbrtAgent);
