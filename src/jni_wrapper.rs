//! Thin wrapper around the JNI environment.
//!
//! Covers the calls the agent needs to inspect exception objects: class and
//! method lookup, virtual and static calls, strings, object arrays and
//! reference management. Every call that can leave a Java exception pending
//! is paired with [`JniEnv::clear_exception`] at the call site.
//!
//! ```rust,ignore
//! let env = unsafe { JniEnv::from_raw(jni) };
//! let cls = LocalRef::new(&env, env.get_object_class(throwable));
//! let to_string = env.get_method_id(cls.get(), "toString", "()Ljava/lang/String;")?;
//! let text = LocalRef::new(&env, env.call_object_method(throwable, to_string, &[]));
//! if env.clear_exception() { return None; }
//! env.get_string_utf(text.get())
//! ```

use crate::sys::jni;
use std::ffi::{CStr, CString};
use std::ptr;

/// Wrapper around a JNI environment pointer.
///
/// # Thread Safety
///
/// A `JniEnv` is tied to a specific thread and cannot be sent across threads.
/// Each JVM thread has its own JNI environment.
pub struct JniEnv {
    env: *mut jni::JNIEnv,
}

impl JniEnv {
    /// Creates a JniEnv wrapper from a raw pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure the pointer is valid and comes from the current thread.
    pub unsafe fn from_raw(env: *mut jni::JNIEnv) -> Self {
        JniEnv { env }
    }

    /// Returns the environment of the calling thread, if it is attached to `vm`.
    ///
    /// # Safety
    ///
    /// `vm` must point to a live Java VM.
    pub unsafe fn from_vm(vm: *mut jni::JavaVM) -> Option<Self> {
        if vm.is_null() {
            return None;
        }
        let mut env_ptr: *mut std::ffi::c_void = ptr::null_mut();
        let res = ((**vm).GetEnv)(vm, &mut env_ptr, jni::JNI_VERSION_1_6);
        if res != jni::JNI_OK || env_ptr.is_null() {
            return None;
        }
        Some(JniEnv { env: env_ptr as *mut jni::JNIEnv })
    }

    // =========================================================================
    // Classes
    // =========================================================================

    /// Finds a class by its internal name (e.g. "java/lang/String").
    ///
    /// A failed lookup leaves `NoClassDefFoundError` pending; callers clear it.
    pub fn find_class(&self, name: &str) -> Option<jni::jclass> {
        let c_name = CString::new(name).ok()?;
        unsafe {
            let vtable = *self.env;
            let cls = ((*vtable).FindClass)(self.env, c_name.as_ptr());
            if cls.is_null() { None } else { Some(cls) }
        }
    }

    /// Gets the class of an object.
    pub fn get_object_class(&self, obj: jni::jobject) -> jni::jclass {
        unsafe {
            let vtable = *self.env;
            ((*vtable).GetObjectClass)(self.env, obj)
        }
    }

    // =========================================================================
    // Exception Handling
    // =========================================================================

    /// Checks if an exception is pending.
    pub fn exception_check(&self) -> bool {
        unsafe {
            let vtable = *self.env;
            ((*vtable).ExceptionCheck)(self.env) != 0
        }
    }

    /// Clears any pending exception.
    pub fn exception_clear(&self) {
        unsafe {
            let vtable = *self.env;
            ((*vtable).ExceptionClear)(self.env);
        }
    }

    /// Clears a pending exception, returning whether there was one.
    pub fn clear_exception(&self) -> bool {
        if self.exception_check() {
            self.exception_clear();
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Creates a new Java string from a Rust string.
    pub fn new_string_utf(&self, s: &str) -> Option<jni::jstring> {
        let c_str = CString::new(s).ok()?;
        unsafe {
            let vtable = *self.env;
            let jstr = ((*vtable).NewStringUTF)(self.env, c_str.as_ptr());
            if jstr.is_null() { None } else { Some(jstr) }
        }
    }

    /// Copies a Java string into a Rust string.
    ///
    /// Returns `None` for a null reference. Modified UTF-8 that is not valid
    /// UTF-8 (surrogate pairs, embedded NUL) is converted lossily.
    pub fn get_string_utf(&self, s: jni::jstring) -> Option<String> {
        if s.is_null() {
            return None;
        }
        unsafe {
            let vtable = *self.env;
            let chars = ((*vtable).GetStringUTFChars)(self.env, s, ptr::null_mut());
            if chars.is_null() {
                return None;
            }
            let result = CStr::from_ptr(chars).to_string_lossy().into_owned();
            ((*vtable).ReleaseStringUTFChars)(self.env, s, chars);
            Some(result)
        }
    }

    // =========================================================================
    // Method IDs
    // =========================================================================

    /// Gets the method ID for an instance method.
    pub fn get_method_id(&self, cls: jni::jclass, name: &str, sig: &str) -> Option<jni::jmethodID> {
        let c_name = CString::new(name).ok()?;
        let c_sig = CString::new(sig).ok()?;
        unsafe {
            let vtable = *self.env;
            let mid = ((*vtable).GetMethodID)(self.env, cls, c_name.as_ptr(), c_sig.as_ptr());
            if mid.is_null() { None } else { Some(mid) }
        }
    }

    /// Gets the method ID for a static method.
    pub fn get_static_method_id(&self, cls: jni::jclass, name: &str, sig: &str) -> Option<jni::jmethodID> {
        let c_name = CString::new(name).ok()?;
        let c_sig = CString::new(sig).ok()?;
        unsafe {
            let vtable = *self.env;
            let mid = ((*vtable).GetStaticMethodID)(self.env, cls, c_name.as_ptr(), c_sig.as_ptr());
            if mid.is_null() { None } else { Some(mid) }
        }
    }

    // =========================================================================
    // Objects and References
    // =========================================================================

    /// Tests whether two references point at the same object.
    pub fn is_same_object(&self, ref1: jni::jobject, ref2: jni::jobject) -> bool {
        unsafe {
            let vtable = *self.env;
            ((*vtable).IsSameObject)(self.env, ref1, ref2) != 0
        }
    }

    /// Creates a new global reference to an object.
    pub fn new_global_ref(&self, obj: jni::jobject) -> jni::jobject {
        unsafe {
            let vtable = *self.env;
            ((*vtable).NewGlobalRef)(self.env, obj)
        }
    }

    /// Deletes a global reference.
    pub fn delete_global_ref(&self, obj: jni::jobject) {
        unsafe {
            let vtable = *self.env;
            ((*vtable).DeleteGlobalRef)(self.env, obj);
        }
    }

    /// Deletes a local reference.
    pub fn delete_local_ref(&self, obj: jni::jobject) {
        unsafe {
            let vtable = *self.env;
            ((*vtable).DeleteLocalRef)(self.env, obj);
        }
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    /// Gets the length of an array.
    pub fn get_array_length(&self, array: jni::jarray) -> jni::jsize {
        unsafe {
            let vtable = *self.env;
            ((*vtable).GetArrayLength)(self.env, array)
        }
    }

    /// Gets an element from an object array.
    pub fn get_object_array_element(&self, array: jni::jobjectArray, index: jni::jsize) -> jni::jobject {
        unsafe {
            let vtable = *self.env;
            ((*vtable).GetObjectArrayElement)(self.env, array, index)
        }
    }

    // =========================================================================
    // Method Calls
    // =========================================================================

    /// Calls a long instance method.
    pub fn call_long_method(&self, obj: jni::jobject, method_id: jni::jmethodID, args: &[jni::jvalue]) -> jni::jlong {
        unsafe {
            let vtable = *self.env;
            ((*vtable).CallLongMethodA)(self.env, obj, method_id, args.as_ptr())
        }
    }

    /// Calls a boolean instance method.
    pub fn call_boolean_method(&self, obj: jni::jobject, method_id: jni::jmethodID, args: &[jni::jvalue]) -> bool {
        unsafe {
            let vtable = *self.env;
            ((*vtable).CallBooleanMethodA)(self.env, obj, method_id, args.as_ptr()) != 0
        }
    }

    /// Calls an object instance method.
    pub fn call_object_method(&self, obj: jni::jobject, method_id: jni::jmethodID, args: &[jni::jvalue]) -> jni::jobject {
        unsafe {
            let vtable = *self.env;
            ((*vtable).CallObjectMethodA)(self.env, obj, method_id, args.as_ptr())
        }
    }

    /// Calls an object static method.
    pub fn call_static_object_method(&self, cls: jni::jclass, method_id: jni::jmethodID, args: &[jni::jvalue]) -> jni::jobject {
        unsafe {
            let vtable = *self.env;
            ((*vtable).CallStaticObjectMethodA)(self.env, cls, method_id, args.as_ptr())
        }
    }
}

// =========================================================================
// RAII Guards
// =========================================================================

/// A guard that automatically deletes a local reference when dropped.
pub struct LocalRef<'a> {
    env: &'a JniEnv,
    obj: jni::jobject,
}

impl<'a> LocalRef<'a> {
    /// Creates a new LocalRef guard.
    pub fn new(env: &'a JniEnv, obj: jni::jobject) -> Self {
        LocalRef { env, obj }
    }

    /// Returns the underlying jobject.
    pub fn get(&self) -> jni::jobject {
        self.obj
    }

    pub fn is_null(&self) -> bool {
        self.obj.is_null()
    }

    /// Wraps a non-null reference, dropping nothing for null.
    pub fn non_null(env: &'a JniEnv, obj: jni::jobject) -> Option<Self> {
        if obj.is_null() { None } else { Some(LocalRef { env, obj }) }
    }
}

impl<'a> Drop for LocalRef<'a> {
    fn drop(&mut self) {
        if !self.obj.is_null() {
            self.env.delete_local_ref(self.obj);
        }
    }
}

/// An owned global reference, deleted exactly once on drop.
///
/// Holds the `JavaVM` rather than a `JNIEnv`: the reference may be released on
/// a different thread than the one that created it, so the environment of the
/// dropping thread is looked up at that point. If that thread is not attached
/// (VM already gone) the reference is abandoned with the VM.
pub struct GlobalRef {
    vm: *mut jni::JavaVM,
    obj: jni::jobject,
}

// Global references are valid on every thread.
unsafe impl Send for GlobalRef {}

impl GlobalRef {
    /// Creates a global reference from a local one; `None` if the VM refused.
    pub fn new(env: &JniEnv, vm: *mut jni::JavaVM, local_obj: jni::jobject) -> Option<Self> {
        if local_obj.is_null() {
            return None;
        }
        let global = env.new_global_ref(local_obj);
        if global.is_null() {
            return None;
        }
        Some(GlobalRef { vm, obj: global })
    }

    /// Returns the underlying global reference.
    pub fn get(&self) -> jni::jobject {
        self.obj
    }
}

impl Drop for GlobalRef {
    fn drop(&mut self) {
        if self.obj.is_null() {
            return;
        }
        if let Some(env) = unsafe { JniEnv::from_vm(self.vm) } {
            env.delete_global_ref(self.obj);
        }
    }
}
