//! Decoded JVMTI events.
//!
//! The agent turns the raw callback arguments into these plain records before
//! handing them to the [`EventProcessor`](crate::processor::EventProcessor),
//! which never touches the VM directly.

use crate::sys::jvmti;

/// `java.lang.Thread.getId()` of a Java thread.
pub type ThreadId = i64;

/// Events the agent subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    VmInit,
    VmDeath,
    ThreadStart,
    ThreadEnd,
    Exception,
    ExceptionCatch,
    VmObjectAlloc,
    ObjectFree,
    GarbageCollectionStart,
    GarbageCollectionFinish,
    CompiledMethodLoad,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::VmInit,
        EventKind::VmDeath,
        EventKind::ThreadStart,
        EventKind::ThreadEnd,
        EventKind::Exception,
        EventKind::ExceptionCatch,
        EventKind::VmObjectAlloc,
        EventKind::ObjectFree,
        EventKind::GarbageCollectionStart,
        EventKind::GarbageCollectionFinish,
        EventKind::CompiledMethodLoad,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::VmInit => "VMInit",
            EventKind::VmDeath => "VMDeath",
            EventKind::ThreadStart => "ThreadStart",
            EventKind::ThreadEnd => "ThreadEnd",
            EventKind::Exception => "Exception",
            EventKind::ExceptionCatch => "ExceptionCatch",
            EventKind::VmObjectAlloc => "VMObjectAlloc",
            EventKind::ObjectFree => "ObjectFree",
            EventKind::GarbageCollectionStart => "GarbageCollectionStart",
            EventKind::GarbageCollectionFinish => "GarbageCollectionFinish",
            EventKind::CompiledMethodLoad => "CompiledMethodLoad",
        }
    }

    /// JVMTI event number passed to `SetEventNotificationMode`.
    pub fn jvmti_event(self) -> u32 {
        match self {
            EventKind::VmInit => jvmti::JVMTI_EVENT_VM_INIT,
            EventKind::VmDeath => jvmti::JVMTI_EVENT_VM_DEATH,
            EventKind::ThreadStart => jvmti::JVMTI_EVENT_THREAD_START,
            EventKind::ThreadEnd => jvmti::JVMTI_EVENT_THREAD_END,
            EventKind::Exception => jvmti::JVMTI_EVENT_EXCEPTION,
            EventKind::ExceptionCatch => jvmti::JVMTI_EVENT_EXCEPTION_CATCH,
            EventKind::VmObjectAlloc => jvmti::JVMTI_EVENT_VM_OBJECT_ALLOC,
            EventKind::ObjectFree => jvmti::JVMTI_EVENT_OBJECT_FREE,
            EventKind::GarbageCollectionStart => jvmti::JVMTI_EVENT_GARBAGE_COLLECTION_START,
            EventKind::GarbageCollectionFinish => jvmti::JVMTI_EVENT_GARBAGE_COLLECTION_FINISH,
            EventKind::CompiledMethodLoad => jvmti::JVMTI_EVENT_COMPILED_METHOD_LOAD,
        }
    }
}

/// A method named by its declaring class, name and JVM signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodRef {
    /// Dotted class name, e.g. `java.lang.String`.
    pub class_name: String,
    pub name: String,
    pub signature: String,
}

impl MethodRef {
    pub fn new(class_name: impl Into<String>, name: impl Into<String>, signature: impl Into<String>) -> Self {
        MethodRef {
            class_name: class_name.into(),
            name: name.into(),
            signature: signature.into(),
        }
    }

    /// `class.method`, the form used by the `debugmethod` option and report reasons.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class_name, self.name)
    }
}

/// An exception was thrown.
#[derive(Debug, Clone)]
pub struct ExceptionEvent {
    /// `None` when the thread id could not be read.
    pub thread_id: Option<ThreadId>,
    pub thread_name: String,
    /// Dotted class name of the thrown object.
    pub exception_type: String,
    /// The method that threw.
    pub method: MethodRef,
    /// Whether the VM found a handler for it.
    pub caught: bool,
}

impl ExceptionEvent {
    pub fn kind_label(&self) -> &'static str {
        if self.caught { "Caught" } else { "Uncaught" }
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionCatchEvent {
    pub thread_name: String,
    pub exception_type: String,
    pub method: MethodRef,
}

#[derive(Debug, Clone)]
pub struct ObjectAllocEvent {
    pub class_name: String,
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct CompiledMethodEvent {
    pub method: MethodRef,
    pub code_size: i32,
}

/// Converts a JVM class signature to a dotted class name.
///
/// `Ljava/lang/String;` becomes `java.lang.String`. Array and primitive
/// signatures keep their leading descriptor character.
pub fn class_name_from_signature(signature: &str) -> String {
    let name = signature
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(signature);
    name.replace('/', ".")
}
