//! Event contexts and the user callback slots they are delivered to.

pub mod callbacks;
pub mod context;

pub use callbacks::CallbackRegistry;
pub use context::{EventContext, EventTarget, MessagePayload, RequestMeta, StartContext};
