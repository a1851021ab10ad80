//! Viewer change events, emitted on the viewer's `StateBus`.
//!
//! One event per synchronized field. A sync layer either subscribes to them
//! (push on change) or polls the bus once per tick and pushes the batch.
//! Every event carries `instance_id` so several viewers can share one bus.

use super::{ImageSize, Transform};
use crate::encode::EncodedPayload;

/// Emitted after `set_image` stored a new payload (`_data`).
#[derive(Clone, Debug, PartialEq)]
pub struct DataChanged {
    pub instance_id: u64,
    pub data: EncodedPayload,
}

/// Emitted after `set_image` stored a new spatial size (`_size`).
#[derive(Clone, Debug, PartialEq)]
pub struct SizeChanged {
    pub instance_id: u64,
    pub size: ImageSize,
}

/// Emitted when the pan/zoom transform changes (`_transform`).
#[derive(Clone, Debug, PartialEq)]
pub struct TransformChanged {
    pub instance_id: u64,
    pub old: Transform,
    pub new: Transform,
}

/// Emitted when transform linking is toggled (`linkedTransform`).
#[derive(Clone, Debug, PartialEq)]
pub struct LinkedTransformChanged {
    pub instance_id: u64,
    pub linked: bool,
}
