//! JNI/JVMTI implementations of the VM-facing traits.
//!
//! Everything here runs inside an event callback on a VM thread, using that
//! thread's `JNIEnv`. Java exceptions raised by the calls made here are
//! cleared on the spot; a failed lookup degrades the result instead of
//! failing the event.

use tracing::debug;

use crate::env::{GlobalRef, JniEnv, Jvmti, LocalRef};
use crate::error::{AgentError, Result};
use crate::events::{class_name_from_signature, MethodRef, ThreadId};
use crate::exception_cache::SameThrowable;
use crate::process::{self, UNKNOWN_CLASS_NAME};
use crate::processor::RaisedException;
use crate::stack_trace::{render_stack_trace, ExceptionInspector, FrameText};
use crate::sys::jni;

/// Longest thread name kept, in characters.
pub const MAX_THREAD_NAME_LENGTH: usize = 40;

/// Name used when a thread's name cannot be read.
pub const DEFAULT_THREAD_NAME: &str = "DefaultThread";

const STRING_RETURNING: &str = "()Ljava/lang/String;";
const GET_RESOURCE_SIGNATURE: &str = "(Ljava/lang/String;)Ljava/net/URL;";

/// A Java object reachable from the current callback.
pub enum JavaObject<'a> {
    /// A reference owned by the VM, such as a callback argument.
    Borrowed(jni::jobject),
    /// A local reference created by the agent.
    Local(LocalRef<'a>),
}

impl JavaObject<'_> {
    pub fn raw(&self) -> jni::jobject {
        match self {
            JavaObject::Borrowed(obj) => *obj,
            JavaObject::Local(local) => local.get(),
        }
    }
}

/// An exception kept alive in a thread's exception cache.
pub struct RetainedThrowable {
    global: GlobalRef,
}

impl RetainedThrowable {
    pub fn raw(&self) -> jni::jobject {
        self.global.get()
    }
}

impl<'a> SameThrowable<RaisedJavaException<'a>> for RetainedThrowable {
    /// Identity first, then `Object.equals`.
    fn same_throwable(&self, probe: &RaisedJavaException<'a>) -> Result<bool> {
        let env = probe.env;
        if env.is_same_object(self.raw(), probe.exception) {
            return Ok(true);
        }

        let class = LocalRef::non_null(env, env.get_object_class(self.raw())).ok_or(AgentError::Jni("GetObjectClass"))?;
        let Some(equals) = env.get_method_id(class.get(), "equals", "(Ljava/lang/Object;)Z") else {
            env.clear_exception();
            return Err(AgentError::Jni("GetMethodID(equals)"));
        };
        let same = env.call_boolean_method(self.raw(), equals, &[jni::jvalue { l: probe.exception }]);
        if env.clear_exception() {
            return Err(AgentError::EqualityCheck);
        }
        Ok(same)
    }
}

/// Reads exceptions and stack frames through JNI.
pub struct JniInspector<'a> {
    env: &'a JniEnv,
    jvmti: &'a Jvmti,
}

impl<'a> JniInspector<'a> {
    pub fn new(env: &'a JniEnv, jvmti: &'a Jvmti) -> Self {
        JniInspector { env, jvmti }
    }

    /// Calls a no-argument method returning `String` on `obj`.
    fn call_string_method(&self, obj: jni::jobject, name: &str) -> Option<String> {
        let env = self.env;
        let class = LocalRef::non_null(env, env.get_object_class(obj))?;
        let Some(method) = env.get_method_id(class.get(), name, STRING_RETURNING) else {
            env.clear_exception();
            return None;
        };
        let value = LocalRef::new(env, env.call_object_method(obj, method, &[]));
        if env.clear_exception() {
            return None;
        }
        env.get_string_utf(value.get())
    }

    /// Calls a no-argument method returning an object on `obj`.
    fn call_object_getter(&self, obj: jni::jobject, name: &str, signature: &str) -> Option<LocalRef<'a>> {
        let env = self.env;
        let class = LocalRef::non_null(env, env.get_object_class(obj))?;
        let Some(method) = env.get_method_id(class.get(), name, signature) else {
            env.clear_exception();
            return None;
        };
        let value = env.call_object_method(obj, method, &[]);
        if env.clear_exception() {
            if !value.is_null() {
                env.delete_local_ref(value);
            }
            return None;
        }
        LocalRef::non_null(env, value)
    }

    /// URL of the class file `class_name` was loaded from, stringified by
    /// calling `stringify` (`toExternalForm` or `getPath`) on it.
    ///
    /// Classes of the bootstrap loader are looked up through the system
    /// class loader.
    pub fn class_location(&self, class_name: &str, stringify: &str) -> Option<String> {
        let location = self.lookup_class_location(class_name, stringify);
        self.env.clear_exception();
        location
    }

    fn lookup_class_location(&self, class_name: &str, stringify: &str) -> Option<String> {
        let env = self.env;
        let internal_name = class_name.replace('.', "/");
        let class = LocalRef::new(env, env.find_class(&internal_name)?);
        let loader = match self.jvmti.get_class_loader(class.get()) {
            Ok(loader) => LocalRef::new(env, loader),
            Err(code) => {
                debug!("cannot get the class loader of {class_name}: error {}", code.0);
                return None;
            }
        };
        let loader_class = LocalRef::new(env, env.find_class("java/lang/ClassLoader")?);
        let resource = LocalRef::new(env, env.new_string_utf(&format!("{internal_name}.class"))?);
        let args = [jni::jvalue { l: resource.get() }];

        let url = if loader.is_null() {
            let method = env.get_static_method_id(loader_class.get(), "getSystemResource", GET_RESOURCE_SIGNATURE)?;
            env.call_static_object_method(loader_class.get(), method, &args)
        } else {
            let method = env.get_method_id(loader_class.get(), "getResource", GET_RESOURCE_SIGNATURE)?;
            env.call_object_method(loader.get(), method, &args)
        };
        let url = LocalRef::new(env, url);
        if env.exception_check() || url.is_null() {
            return None;
        }
        self.call_string_method(url.get(), stringify)
    }

    fn class_name_of_frame(&self, frame: jni::jobject) -> Option<String> {
        self.call_string_method(frame, "getClassName")
    }
}

impl<'a> ExceptionInspector for JniInspector<'a> {
    type Throwable = JavaObject<'a>;
    type Trace = LocalRef<'a>;

    fn describe(&self, throwable: &JavaObject<'a>) -> Option<String> {
        self.call_string_method(throwable.raw(), "toString")
    }

    fn stack_trace(&self, throwable: &JavaObject<'a>) -> Option<LocalRef<'a>> {
        self.call_object_getter(throwable.raw(), "getStackTrace", "()[Ljava/lang/StackTraceElement;")
    }

    fn frame_count(&self, trace: &LocalRef<'a>) -> usize {
        usize::try_from(self.env.get_array_length(trace.get())).unwrap_or(0)
    }

    fn frame(&self, trace: &LocalRef<'a>, index: usize) -> Option<FrameText> {
        let env = self.env;
        let index = jni::jsize::try_from(index).ok()?;
        let element = env.get_object_array_element(trace.get(), index);
        if env.clear_exception() {
            return None;
        }
        let element = LocalRef::non_null(env, element)?;
        let description = self.call_string_method(element.get(), "toString")?;
        let location = self
            .class_name_of_frame(element.get())
            .and_then(|class_name| self.class_location(&class_name, "toExternalForm"));
        Some(FrameText { description, location })
    }

    fn cause(&self, throwable: &JavaObject<'a>) -> Option<JavaObject<'a>> {
        self.call_object_getter(throwable.raw(), "getCause", "()Ljava/lang/Throwable;")
            .map(JavaObject::Local)
    }
}

/// The exception of an `Exception` event.
pub struct RaisedJavaException<'a> {
    env: &'a JniEnv,
    jvmti: &'a Jvmti,
    vm: *mut jni::JavaVM,
    exception: jni::jobject,
}

impl<'a> RaisedJavaException<'a> {
    pub fn new(env: &'a JniEnv, jvmti: &'a Jvmti, vm: *mut jni::JavaVM, exception: jni::jobject) -> Self {
        RaisedJavaException { env, jvmti, vm, exception }
    }

    fn inspector(&self) -> JniInspector<'a> {
        JniInspector::new(self.env, self.jvmti)
    }
}

impl<'a> RaisedException for RaisedJavaException<'a> {
    type Handle = RetainedThrowable;

    fn retain(&self) -> Option<RetainedThrowable> {
        GlobalRef::new(self.env, self.vm, self.exception).map(|global| RetainedThrowable { global })
    }

    fn render(&self, thread_name: &str, max_len: usize) -> Option<String> {
        let throwable = JavaObject::Borrowed(self.exception);
        render_stack_trace(&self.inspector(), thread_name, &throwable, max_len)
    }

    fn entry_class_location(&self) -> Option<String> {
        let inspector = self.inspector();
        let trace = inspector.stack_trace(&JavaObject::Borrowed(self.exception))?;
        let last = inspector.frame_count(&trace).checked_sub(1)?;
        let element = self.env.get_object_array_element(trace.get(), jni::jsize::try_from(last).ok()?);
        if self.env.clear_exception() {
            return None;
        }
        let element = LocalRef::non_null(self.env, element)?;
        let class_name = inspector.class_name_of_frame(element.get())?;
        inspector.class_location(&class_name, "getPath")
    }
}

/// `Thread.getId()` of `thread`.
pub fn thread_id(env: &JniEnv, thread: jni::jthread) -> Option<ThreadId> {
    if thread.is_null() {
        return None;
    }
    let class = LocalRef::non_null(env, env.get_object_class(thread))?;
    let Some(get_id) = env.get_method_id(class.get(), "getId", "()J") else {
        env.clear_exception();
        return None;
    };
    let tid = env.call_long_method(thread, get_id, &[]);
    if env.clear_exception() {
        return None;
    }
    Some(tid)
}

/// Name of `thread`, shortened to [`MAX_THREAD_NAME_LENGTH`] characters.
pub fn thread_name(jvmti: &Jvmti, env: &JniEnv, thread: jni::jthread) -> String {
    match jvmti.get_thread_info(thread) {
        Ok(info) => {
            for reference in [info.thread_group, info.context_class_loader] {
                if !reference.is_null() {
                    env.delete_local_ref(reference);
                }
            }
            info.name
                .filter(|name| !name.is_empty())
                .map_or_else(|| DEFAULT_THREAD_NAME.to_owned(), |name| truncate_thread_name(&name))
        }
        Err(code) => {
            debug!("cannot get thread info: error {}", code.0);
            DEFAULT_THREAD_NAME.to_owned()
        }
    }
}

pub fn truncate_thread_name(name: &str) -> String {
    name.chars().take(MAX_THREAD_NAME_LENGTH).collect()
}

/// Dotted name of the class of `obj`.
pub fn object_class_name(jvmti: &Jvmti, env: &JniEnv, obj: jni::jobject) -> Option<String> {
    let class = LocalRef::non_null(env, env.get_object_class(obj))?;
    class_name(jvmti, class.get())
}

/// Dotted name of `class`.
pub fn class_name(jvmti: &Jvmti, class: jni::jclass) -> Option<String> {
    match jvmti.get_class_signature(class) {
        Ok(signature) => Some(class_name_from_signature(&signature)),
        Err(code) => {
            debug!("cannot get class signature: error {}", code.0);
            None
        }
    }
}

/// Declaring class, name and signature of `method`.
///
/// Events without a `JNIEnv` pass `None`; the declaring class reference is
/// then left to the VM.
pub fn method_ref(jvmti: &Jvmti, env: Option<&JniEnv>, method: jni::jmethodID) -> MethodRef {
    let mut result = MethodRef::default();
    match jvmti.get_method_name(method) {
        Ok(name) => {
            result.name = name.name;
            result.signature = name.signature;
        }
        Err(code) => debug!("cannot get method name: error {}", code.0),
    }
    match jvmti.get_method_declaring_class(method) {
        Ok(class) => {
            result.class_name = class_name(jvmti, class).unwrap_or_default();
            if let Some(env) = env {
                if !class.is_null() {
                    env.delete_local_ref(class);
                }
            }
        }
        Err(code) => debug!("cannot get declaring class: error {}", code.0),
    }
    result
}

/// Location of the application's main class, or [`UNKNOWN_CLASS_NAME`].
pub fn main_class_location(jvmti: &Jvmti, env: &JniEnv) -> String {
    let command = match jvmti.get_system_property("sun.java.command") {
        Ok(command) => command,
        Err(code) => {
            debug!("cannot read sun.java.command: error {}", code.0);
            return UNKNOWN_CLASS_NAME.to_owned();
        }
    };
    process::main_class_internal_name(&command)
        .and_then(|name| JniInspector::new(env, jvmti).class_location(&name, "getPath"))
        .map_or_else(
            || UNKNOWN_CLASS_NAME.to_owned(),
            |path| process::strip_main_class_path(&path).to_owned(),
        )
}

/// Reads the system properties reported as `jvm_environment`.
pub fn jvm_environment(jvmti: &Jvmti) -> String {
    let cwd = std::env::current_dir().ok().map(|dir| dir.display().to_string());
    let properties = process::JVM_ENVIRONMENT_PROPERTIES
        .iter()
        .map(|name| (*name, jvmti.get_system_property(name).ok()))
        .chain(std::iter::once(("cwd", cwd)));
    process::format_jvm_environment(properties)
}
