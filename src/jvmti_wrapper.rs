// abrt-java-agent/src/jvmti_wrapper.rs
use crate::sys::jvmti;
use crate::sys::jni;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

/// Looks up a function slot, failing with `NOT_AVAILABLE` when the VM left it empty.
macro_rules! jvmti_fn {
    ($env:expr, $name:ident) => {
        (*(*$env).functions).$name.ok_or(jvmti::jvmtiError::NOT_AVAILABLE)?
    };
}

/// Name and JVM signature of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodName {
    pub name: String,
    pub signature: String,
}

/// Thread information with the two local references the VM hands back.
///
/// The caller owns `thread_group` and `context_class_loader` and must delete them.
#[derive(Debug)]
pub struct ThreadInfo {
    pub name: Option<String>,
    pub thread_group: jni::jobject,
    pub context_class_loader: jni::jobject,
}

/// A thin wrapper around the raw JVMTI Environment pointer.
///
/// Unlike a `JNIEnv`, the JVMTI environment is not tied to a thread.
pub struct Jvmti {
    env: *mut jvmti::jvmtiEnv,
}

// The JVMTI environment may be used from any thread.
unsafe impl Send for Jvmti {}
unsafe impl Sync for Jvmti {}

impl Jvmti {
    /// Connects to the JVM and retrieves the JVMTI environment.
    pub fn new(vm: *mut jni::JavaVM) -> Result<Self, jni::jint> {
        let mut env_ptr: *mut std::ffi::c_void = ptr::null_mut();

        unsafe {
            // vm: *mut JavaVM = *mut *const JNIInvokeInterface_
            let get_env_fn = (**vm).GetEnv;

            let res = get_env_fn(vm, &mut env_ptr, jvmti::JVMTI_VERSION_1_0);

            if res != jni::JNI_OK {
                return Err(res);
            }
        }

        if env_ptr.is_null() {
            return Err(jni::JNI_ERR);
        }

        Ok(Jvmti {
            env: env_ptr as *mut jvmti::jvmtiEnv,
        })
    }

    /// Returns `(major, minor, micro)` of the JVMTI implementation.
    pub fn get_version_number(&self) -> Result<(jni::jint, jni::jint, jni::jint), jvmti::jvmtiError> {
        let mut version: jni::jint = 0;
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetVersionNumber);
            let err = get_fn(self.env, &mut version);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        let major = (version & jvmti::JVMTI_VERSION_MASK_MAJOR) >> jvmti::JVMTI_VERSION_SHIFT_MAJOR;
        let minor = (version & jvmti::JVMTI_VERSION_MASK_MINOR) >> jvmti::JVMTI_VERSION_SHIFT_MINOR;
        let micro = version & jvmti::JVMTI_VERSION_MASK_MICRO;
        Ok((major, minor, micro))
    }

    pub fn add_capabilities(&self, new_caps: &jvmti::jvmtiCapabilities) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let add_caps_fn = jvmti_fn!(self.env, AddCapabilities);
            let err = add_caps_fn(self.env, new_caps);
            if err != jvmti::jvmtiError::NONE {
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn set_event_callbacks(&self, callbacks: jvmti::jvmtiEventCallbacks) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let set_callbacks_fn = jvmti_fn!(self.env, SetEventCallbacks);
            let size = std::mem::size_of::<jvmti::jvmtiEventCallbacks>() as jni::jint;

            let err = set_callbacks_fn(self.env, &callbacks, size);
            if err != jvmti::jvmtiError::NONE {
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn set_event_notification_mode(&self, enable: bool, event_type: u32, thread: jni::jthread) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let set_mode_fn = jvmti_fn!(self.env, SetEventNotificationMode);
            let mode = if enable { jvmti::JVMTI_ENABLE } else { jvmti::JVMTI_DISABLE };

            // thread can be null (all threads)
            let err = set_mode_fn(self.env, mode, event_type, thread);
            if err != jvmti::jvmtiError::NONE {
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn get_thread_info(&self, thread: jni::jthread) -> Result<ThreadInfo, jvmti::jvmtiError> {
        let mut info = jvmti::jvmtiThreadInfo::default();

        unsafe {
            let get_thread_info_fn = jvmti_fn!(self.env, GetThreadInfo);
            let err = get_thread_info_fn(self.env, thread, &mut info);
            if err != jvmti::jvmtiError::NONE {
                return Err(err);
            }

            let name = self.take_string(info.name)?;
            Ok(ThreadInfo {
                name,
                thread_group: info.thread_group,
                context_class_loader: info.context_class_loader,
            })
        }
    }

    pub fn deallocate(&self, mem: *mut u8) -> Result<(), jvmti::jvmtiError> {
        if mem.is_null() {
            return Ok(());
        }
        unsafe {
            let deallocate_fn = jvmti_fn!(self.env, Deallocate);
            let err = deallocate_fn(self.env, mem);
            if err != jvmti::jvmtiError::NONE {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Copies a VM-allocated string and gives the buffer back to the VM.
    unsafe fn take_string(&self, raw: *mut c_char) -> Result<Option<String>, jvmti::jvmtiError> {
        if raw.is_null() {
            return Ok(None);
        }
        let value = CStr::from_ptr(raw).to_string_lossy().into_owned();
        self.deallocate(raw as *mut u8)?;
        Ok(Some(value))
    }

    /// Returns the JVM type signature of a class, e.g. `Ljava/lang/String;`.
    pub fn get_class_signature(&self, klass: jni::jclass) -> Result<String, jvmti::jvmtiError> {
        let mut sig_ptr: *mut c_char = ptr::null_mut();

        unsafe {
            let get_class_sig_fn = jvmti_fn!(self.env, GetClassSignature);
            let err = get_class_sig_fn(self.env, klass, &mut sig_ptr, ptr::null_mut());
            if err != jvmti::jvmtiError::NONE {
                return Err(err);
            }

            Ok(self.take_string(sig_ptr)?.unwrap_or_default())
        }
    }

    pub fn get_method_name(&self, method: jni::jmethodID) -> Result<MethodName, jvmti::jvmtiError> {
        let mut name_ptr: *mut c_char = ptr::null_mut();
        let mut sig_ptr: *mut c_char = ptr::null_mut();

        unsafe {
            let get_method_name_fn = jvmti_fn!(self.env, GetMethodName);
            let err = get_method_name_fn(self.env, method, &mut name_ptr, &mut sig_ptr, ptr::null_mut());
            if err != jvmti::jvmtiError::NONE {
                return Err(err);
            }

            let name = self.take_string(name_ptr)?.unwrap_or_default();
            let signature = self.take_string(sig_ptr)?.unwrap_or_default();
            Ok(MethodName { name, signature })
        }
    }

    pub fn get_method_declaring_class(&self, method: jni::jmethodID) -> Result<jni::jclass, jvmti::jvmtiError> {
        let mut klass: jni::jclass = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetMethodDeclaringClass);
            let err = get_fn(self.env, method, &mut klass);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(klass)
    }

    /// Returns the defining loader of `klass`; null for the bootstrap loader.
    pub fn get_class_loader(&self, klass: jni::jclass) -> Result<jni::jobject, jvmti::jvmtiError> {
        let mut loader: jni::jobject = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetClassLoader);
            let err = get_fn(self.env, klass, &mut loader);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(loader)
    }

    pub fn get_error_name(&self, error: jvmti::jvmtiError) -> Result<String, jvmti::jvmtiError> {
        let mut name_ptr: *mut c_char = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetErrorName);
            let err = get_fn(self.env, error, &mut name_ptr);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
            Ok(self.take_string(name_ptr)?.unwrap_or_default())
        }
    }

    pub fn get_system_property(&self, property: &str) -> Result<String, jvmti::jvmtiError> {
        let c_property = CString::new(property).map_err(|_| jvmti::jvmtiError::NULL_POINTER)?;
        let mut value_ptr: *mut c_char = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetSystemProperty);
            let err = get_fn(self.env, c_property.as_ptr(), &mut value_ptr);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
            Ok(self.take_string(value_ptr)?.unwrap_or_default())
        }
    }
}
