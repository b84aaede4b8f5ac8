//! Common imports for the agent's VM-facing code.

pub use crate::env::{GlobalRef, JniEnv, Jvmti, LocalRef};
pub use crate::error::{AgentError, Result};
pub use crate::events::{EventKind, MethodRef, ThreadId};
pub use crate::export_agent;
pub use crate::get_default_callbacks;
pub use crate::sys::{jni, jvmti};
pub use crate::Agent;
