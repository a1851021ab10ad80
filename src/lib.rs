//! protoview - image viewer widget backend
//!
//! Encodes array images into data-URL payloads for a browser view, routes the
//! view's events to signature-matched subscribers and tracks synchronized
//! viewer state.

// Core plumbing (dispatch, matching, change bus)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod encode;
pub mod entities;
pub mod frontend;
pub mod viewer;

// Re-export commonly used types from core
pub use core::{DispatchError, EventsDispatcher, Signature, StateBus, SubscriptionHandle};

// Re-export entities
pub use entities::{AttrValue, Attrs, Tensor};

pub use encode::{EncodeError, EncodeOptions, EncodedPayload, encode};
pub use viewer::{ImageSize, ImageViewer, Transform, ViewerError, ViewerState};
