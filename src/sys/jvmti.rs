// abrt-java-agent/src/sys/jvmti.rs
//
// JVMTI (JVM Tool Interface) types used by the agent.
//
// As with the JNI table, `jvmtiInterface_1_` is declared as a prefix of the
// real function table (functions 1-142). Functions are numbered from 1 in the
// JVMTI specification and slot 0 of the table is `reserved1`, so function N
// lives at struct index N - 1.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::os::raw::{c_char, c_uchar, c_void};
use crate::sys::jni::{jboolean, jclass, jint, jlong, jmethodID, jobject, jthread, JNIEnv};

// --- Constants ---
pub const JVMTI_VERSION_1_0: jint = 0x30010000;
pub const JVMTI_VERSION_1_2: jint = 0x30010200;

pub const JVMTI_VERSION_MASK_MAJOR: jint = 0x0FFF0000;
pub const JVMTI_VERSION_SHIFT_MAJOR: jint = 16;
pub const JVMTI_VERSION_MASK_MINOR: jint = 0x0000FF00;
pub const JVMTI_VERSION_SHIFT_MINOR: jint = 8;
pub const JVMTI_VERSION_MASK_MICRO: jint = 0x000000FF;

pub const JVMTI_EVENT_VM_INIT: u32 = 50;
pub const JVMTI_EVENT_VM_DEATH: u32 = 51;
pub const JVMTI_EVENT_THREAD_START: u32 = 52;
pub const JVMTI_EVENT_THREAD_END: u32 = 53;
pub const JVMTI_EVENT_EXCEPTION: u32 = 58;
pub const JVMTI_EVENT_EXCEPTION_CATCH: u32 = 59;
pub const JVMTI_EVENT_COMPILED_METHOD_LOAD: u32 = 69;
pub const JVMTI_EVENT_GARBAGE_COLLECTION_START: u32 = 78;
pub const JVMTI_EVENT_GARBAGE_COLLECTION_FINISH: u32 = 79;
pub const JVMTI_EVENT_OBJECT_FREE: u32 = 80;
pub const JVMTI_EVENT_VM_OBJECT_ALLOC: u32 = 81;

pub const JVMTI_ENABLE: jint = 1;
pub const JVMTI_DISABLE: jint = 0;

// --- Error Codes ---

/// A `jvmtiError` as returned by the VM.
///
/// Kept as a transparent integer so codes this crate does not name are still
/// representable.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct jvmtiError(pub u32);

impl jvmtiError {
    pub const NONE: jvmtiError = jvmtiError(0);
    pub const INVALID_THREAD: jvmtiError = jvmtiError(10);
    pub const INVALID_CLASS: jvmtiError = jvmtiError(21);
    pub const INVALID_METHODID: jvmtiError = jvmtiError(23);
    pub const NOT_AVAILABLE: jvmtiError = jvmtiError(98);
    pub const MUST_POSSESS_CAPABILITY: jvmtiError = jvmtiError(99);
    pub const NULL_POINTER: jvmtiError = jvmtiError(100);
    pub const ABSENT_INFORMATION: jvmtiError = jvmtiError(101);
    pub const INVALID_EVENT_TYPE: jvmtiError = jvmtiError(102);
    pub const OUT_OF_MEMORY: jvmtiError = jvmtiError(110);
    pub const WRONG_PHASE: jvmtiError = jvmtiError(112);
    pub const INTERNAL: jvmtiError = jvmtiError(113);
    pub const UNATTACHED_THREAD: jvmtiError = jvmtiError(115);
    pub const INVALID_ENVIRONMENT: jvmtiError = jvmtiError(116);
}

pub type jlocation = jlong;

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct jvmtiThreadInfo {
    pub name: *mut c_char,
    pub priority: jint,
    pub is_daemon: jboolean,
    pub thread_group: jobject,
    pub context_class_loader: jobject,
}

impl Default for jvmtiThreadInfo {
    fn default() -> Self {
        Self {
            name: std::ptr::null_mut(),
            priority: 0,
            is_daemon: 0,
            thread_group: std::ptr::null_mut(),
            context_class_loader: std::ptr::null_mut(),
        }
    }
}

// --- Capabilities ---
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct jvmtiCapabilities {
    bits: [u32; 4],
}

impl Default for jvmtiCapabilities {
    fn default() -> Self { Self { bits: [0; 4] } }
}

impl jvmtiCapabilities {
    fn set_bit(&mut self, bit_offset: usize, value: bool) {
        let word_index = bit_offset / 32;
        let bit_index = bit_offset % 32;
        if value {
            self.bits[word_index] |= 1 << bit_index;
        } else {
            self.bits[word_index] &= !(1 << bit_index);
        }
    }

    fn get_bit(&self, bit_offset: usize) -> bool {
        let word_index = bit_offset / 32;
        let bit_index = bit_offset % 32;
        (self.bits[word_index] & (1 << bit_index)) != 0
    }

    // [0]
    pub fn set_can_tag_objects(&mut self, v: bool) { self.set_bit(0, v); }
    pub fn can_tag_objects(&self) -> bool { self.get_bit(0) }

    // [11]
    pub fn set_can_get_source_file_name(&mut self, v: bool) { self.set_bit(11, v); }
    pub fn can_get_source_file_name(&self) -> bool { self.get_bit(11) }

    // [12]
    pub fn set_can_get_line_numbers(&mut self, v: bool) { self.set_bit(12, v); }
    pub fn can_get_line_numbers(&self) -> bool { self.get_bit(12) }

    // [17]
    pub fn set_can_generate_exception_events(&mut self, v: bool) { self.set_bit(17, v); }
    pub fn can_generate_exception_events(&self) -> bool { self.get_bit(17) }

    // [27]
    pub fn set_can_generate_compiled_method_load_events(&mut self, v: bool) { self.set_bit(27, v); }
    pub fn can_generate_compiled_method_load_events(&self) -> bool { self.get_bit(27) }

    // [29]
    pub fn set_can_generate_vm_object_alloc_events(&mut self, v: bool) { self.set_bit(29, v); }
    pub fn can_generate_vm_object_alloc_events(&self) -> bool { self.get_bit(29) }

    // [31]
    pub fn set_can_generate_garbage_collection_events(&mut self, v: bool) { self.set_bit(31, v); }
    pub fn can_generate_garbage_collection_events(&self) -> bool { self.get_bit(31) }

    // [32]
    pub fn set_can_generate_object_free_events(&mut self, v: bool) { self.set_bit(32, v); }
    pub fn can_generate_object_free_events(&self) -> bool { self.get_bit(32) }
}

// =========================================================================
// FUNCTION TYPEDEFS: JVMTI FUNCTIONS
// =========================================================================

pub type JvmtiSetEventNotificationModeFn = unsafe extern "C" fn(env: *mut jvmtiEnv, mode: jint, event_type: u32, event_thread: jthread, ...) -> jvmtiError;
pub type JvmtiGetThreadInfoFn = unsafe extern "system" fn(env: *mut jvmtiEnv, thread: jthread, info_ptr: *mut jvmtiThreadInfo) -> jvmtiError;
pub type JvmtiDeallocateFn = unsafe extern "system" fn(env: *mut jvmtiEnv, mem: *mut c_uchar) -> jvmtiError;
pub type JvmtiGetClassSignatureFn = unsafe extern "system" fn(env: *mut jvmtiEnv, klass: jclass, signature_ptr: *mut *mut c_char, generic_ptr: *mut *mut c_char) -> jvmtiError;
pub type JvmtiGetClassLoaderFn = unsafe extern "system" fn(env: *mut jvmtiEnv, klass: jclass, classloader_ptr: *mut jobject) -> jvmtiError;
pub type JvmtiGetMethodNameFn = unsafe extern "system" fn(env: *mut jvmtiEnv, method: jmethodID, name_ptr: *mut *mut c_char, signature_ptr: *mut *mut c_char, generic_ptr: *mut *mut c_char) -> jvmtiError;
pub type JvmtiGetMethodDeclaringClassFn = unsafe extern "system" fn(env: *mut jvmtiEnv, method: jmethodID, declaring_class_ptr: *mut jclass) -> jvmtiError;
pub type JvmtiGetVersionNumberFn = unsafe extern "system" fn(env: *mut jvmtiEnv, version_ptr: *mut jint) -> jvmtiError;
pub type JvmtiSetEventCallbacksFn = unsafe extern "system" fn(env: *mut jvmtiEnv, callbacks: *const jvmtiEventCallbacks, size_of_callbacks: jint) -> jvmtiError;
pub type JvmtiGetErrorNameFn = unsafe extern "system" fn(env: *mut jvmtiEnv, error: jvmtiError, name_ptr: *mut *mut c_char) -> jvmtiError;
pub type JvmtiGetSystemPropertyFn = unsafe extern "system" fn(env: *mut jvmtiEnv, property: *const c_char, value_ptr: *mut *mut c_char) -> jvmtiError;
pub type JvmtiAddCapabilitiesFn = unsafe extern "system" fn(env: *mut jvmtiEnv, capabilities_ptr: *const jvmtiCapabilities) -> jvmtiError;

// =========================================================================
// FUNCTION TYPEDEFS: EVENT CALLBACKS
// =========================================================================

pub type JvmtiVMInitFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread
);

pub type JvmtiVMDeathFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv
);

pub type JvmtiThreadStartFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread
);

pub type JvmtiThreadEndFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread
);

pub type JvmtiExceptionFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread,
    method: jmethodID,
    location: jlocation,
    exception: jobject,
    catch_method: jmethodID,
    catch_location: jlocation
);

pub type JvmtiExceptionCatchFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread,
    method: jmethodID,
    location: jlocation,
    exception: jobject
);

pub type JvmtiCompiledMethodLoadFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    method: jmethodID,
    code_size: jint,
    code_addr: *const c_void,
    map_length: jint,
    map: *const c_void, // jvmtiAddrLocationMap
    compile_info: *const c_void
);

pub type JvmtiGarbageCollectionStartFn = unsafe extern "system" fn(jvmti_env: *mut jvmtiEnv);
pub type JvmtiGarbageCollectionFinishFn = unsafe extern "system" fn(jvmti_env: *mut jvmtiEnv);

pub type JvmtiObjectFreeFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    tag: jlong
);

pub type JvmtiVMObjectAllocFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread,
    object: jobject,
    object_klass: jclass,
    size: jlong
);

/// Placeholder for callback slots the agent leaves empty.
pub type JvmtiUnusedEventFn = unsafe extern "system" fn();

// =========================================================================
// jvmtiInterface_1_ (prefix, functions 1-142)
// =========================================================================

type Reserved = *mut c_void;

#[repr(C)]
pub struct jvmtiInterface_1_ {
    /*   1 : RESERVED */
    pub reserved1: Reserved,
    /*   2 : Set Event Notification Mode */
    pub SetEventNotificationMode: Option<JvmtiSetEventNotificationModeFn>,
    /*   3-8 : modules, threads */
    _reserved3_8: [Reserved; 6],
    /*   9 : Get Thread Info */
    pub GetThreadInfo: Option<JvmtiGetThreadInfoFn>,
    /*  10-46 */
    _reserved10_46: [Reserved; 37],
    /*  47 : Deallocate */
    pub Deallocate: Option<JvmtiDeallocateFn>,
    /*  48 : Get Class Signature */
    pub GetClassSignature: Option<JvmtiGetClassSignatureFn>,
    /*  49-56 */
    _reserved49_56: [Reserved; 8],
    /*  57 : Get Class Loader */
    pub GetClassLoader: Option<JvmtiGetClassLoaderFn>,
    /*  58-63 */
    _reserved58_63: [Reserved; 6],
    /*  64 : Get Method Name */
    pub GetMethodName: Option<JvmtiGetMethodNameFn>,
    /*  65 : Get Method Declaring Class */
    pub GetMethodDeclaringClass: Option<JvmtiGetMethodDeclaringClassFn>,
    /*  66-87 */
    _reserved66_87: [Reserved; 22],
    /*  88 : Get Version Number */
    pub GetVersionNumber: Option<JvmtiGetVersionNumberFn>,
    /*  89-121 */
    _reserved89_121: [Reserved; 33],
    /* 122 : Set Event Callbacks */
    pub SetEventCallbacks: Option<JvmtiSetEventCallbacksFn>,
    /* 123-127 */
    _reserved123_127: [Reserved; 5],
    /* 128 : Get Error Name */
    pub GetErrorName: Option<JvmtiGetErrorNameFn>,
    /* 129-130 */
    _reserved129_130: [Reserved; 2],
    /* 131 : Get System Property */
    pub GetSystemProperty: Option<JvmtiGetSystemPropertyFn>,
    /* 132-141 */
    _reserved132_141: [Reserved; 10],
    /* 142 : Add Capabilities */
    pub AddCapabilities: Option<JvmtiAddCapabilitiesFn>,
}

#[repr(C)]
pub struct jvmtiEnv {
    pub functions: *const jvmtiInterface_1_,
}

/// Event callback table, up to and including `VMObjectAlloc`.
///
/// The VM accepts a table shorter than its own as long as the size passed to
/// `SetEventCallbacks` matches.
#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct jvmtiEventCallbacks {
    pub VMInit: Option<JvmtiVMInitFn>,
    pub VMDeath: Option<JvmtiVMDeathFn>,
    pub ThreadStart: Option<JvmtiThreadStartFn>,
    pub ThreadEnd: Option<JvmtiThreadEndFn>,
    // ClassFileLoadHook, ClassLoad, ClassPrepare, VMStart
    _unused4_7: [Option<JvmtiUnusedEventFn>; 4],
    pub Exception: Option<JvmtiExceptionFn>,
    pub ExceptionCatch: Option<JvmtiExceptionCatchFn>,
    // SingleStep .. NativeMethodBind
    _unused10_17: [Option<JvmtiUnusedEventFn>; 8],
    pub CompiledMethodLoad: Option<JvmtiCompiledMethodLoadFn>,
    // CompiledMethodUnload .. ResourceExhausted
    _unused19_26: [Option<JvmtiUnusedEventFn>; 8],
    pub GarbageCollectionStart: Option<JvmtiGarbageCollectionStartFn>,
    pub GarbageCollectionFinish: Option<JvmtiGarbageCollectionFinishFn>,
    pub ObjectFree: Option<JvmtiObjectFreeFn>,
    pub VMObjectAlloc: Option<JvmtiVMObjectAllocFn>,
}
