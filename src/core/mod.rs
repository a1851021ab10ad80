//! Core plumbing - event dispatch, argument matching, change notifications
//!
//! Independent of any transport: the viewer and its bindings sit on top.

pub mod dispatcher;
pub mod matcher;
pub mod state_bus;

// Re-exports for convenience
pub use dispatcher::{EventsDispatcher, SubscriptionHandle};
pub use matcher::{
    DispatchError, FnHandler, Handler, Param, Signature, Subscriber, call_matching_params, handler,
    match_params,
};
pub use state_bus::{BoxedEvent, StateBus, StateEvent, downcast_event};
