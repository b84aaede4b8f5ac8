//! Environment wrappers for JVMTI and JNI.
//!
//! [`Jvmti`] wraps the (thread-independent) JVMTI environment; [`JniEnv`] wraps
//! the per-thread JNI environment handed to every event callback. Both return
//! owned Rust strings and release VM-allocated memory before returning.
//!
//! Reference guards:
//!
//! - [`LocalRef`] deletes a local reference when it goes out of scope.
//! - [`GlobalRef`] deletes a global reference on drop, on whichever thread drops it.

pub use crate::jni_wrapper::{GlobalRef, JniEnv, LocalRef};
pub use crate::jvmti_wrapper::{Jvmti, MethodName, ThreadInfo};
