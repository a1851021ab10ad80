//! Image viewer widget backend.
//!
//! Holds the state the browser view renders and keeps it in one place:
//!
//! | Field             | Frontend key      | Changed by                               |
//! |-------------------|-------------------|------------------------------------------|
//! | payload           | `_data`           | `set_image*`                             |
//! | spatial size      | `_size`           | `set_image*`                             |
//! | (x, y, scale)     | `_transform`      | `goto`, `set_transform`, frontend update |
//! | link flag         | `linkedTransform` | `set_linked_transform`, frontend update  |
//!
//! Every change is announced on the viewer's [`StateBus`] (see [`events`]);
//! [`ImageViewer::state`] gives a full serializable snapshot.
//!
//! Inbound custom messages (`{"event": ..., "data": {...}}`) are routed into the
//! viewer's [`EventsDispatcher`] by [`ImageViewer::handle_custom_msg`].

pub mod events;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{DispatchError, EventsDispatcher, StateBus};
use crate::encode::{self, EncodeError, EncodeOptions, EncodedPayload};
use crate::entities::{Attrs, Tensor};
use crate::frontend::WidgetMeta;
use events::{DataChanged, LinkedTransformChanged, SizeChanged, TransformChanged};

/// Initial zoom: effectively "not set yet", the view fits the image on first render
pub const DEFAULT_SCALE: f64 = 1e-8;

/// Pan/zoom transform; serialized as `[x, y, scale]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: DEFAULT_SCALE,
        }
    }
}

impl From<[f64; 3]> for Transform {
    fn from([x, y, scale]: [f64; 3]) -> Self {
        Self { x, y, scale }
    }
}

impl From<Transform> for [f64; 3] {
    fn from(t: Transform) -> Self {
        [t.x, t.y, t.scale]
    }
}

/// Spatial size (trailing two image axes); serialized as `[height, width]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self { height: 1, width: 1 }
    }
}

impl From<[u32; 2]> for ImageSize {
    fn from([height, width]: [u32; 2]) -> Self {
        Self { height, width }
    }
}

impl From<ImageSize> for [u32; 2] {
    fn from(s: ImageSize) -> Self {
        [s.height, s.width]
    }
}

/// Viewer errors
#[derive(Debug)]
pub enum ViewerError {
    Encode(EncodeError),
    Dispatch(DispatchError),
    /// Frontend state update with a malformed value
    InvalidUpdate { key: String, reason: String },
}

impl std::fmt::Display for ViewerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewerError::Encode(e) => write!(f, "Encode error: {}", e),
            ViewerError::Dispatch(e) => write!(f, "Dispatch error: {}", e),
            ViewerError::InvalidUpdate { key, reason } => {
                write!(f, "Invalid frontend update for {}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ViewerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ViewerError::Encode(e) => Some(e),
            ViewerError::Dispatch(e) => Some(e),
            ViewerError::InvalidUpdate { .. } => None,
        }
    }
}

impl From<EncodeError> for ViewerError {
    fn from(e: EncodeError) -> Self {
        ViewerError::Encode(e)
    }
}

impl From<DispatchError> for ViewerError {
    fn from(e: DispatchError) -> Self {
        ViewerError::Dispatch(e)
    }
}

/// Full synchronized state, keyed like the browser model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerState {
    #[serde(flatten)]
    pub meta: WidgetMeta,
    #[serde(rename = "_data")]
    pub data: EncodedPayload,
    #[serde(rename = "_size")]
    pub size: ImageSize,
    #[serde(rename = "_transform")]
    pub transform: Transform,
    #[serde(rename = "linkedTransform")]
    pub linked_transform: bool,
}

/// Image viewer backend
#[derive(Debug)]
pub struct ImageViewer {
    meta: WidgetMeta,
    data: EncodedPayload,
    size: ImageSize,
    transform: Transform,
    linked_transform: bool,
    options: EncodeOptions,
    events: EventsDispatcher,
    bus: StateBus,
}

impl Default for ImageViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageViewer {
    pub const VIEW_NAME: &'static str = "ImageViewer";

    pub fn new() -> Self {
        Self::with_options(EncodeOptions::default())
    }

    /// Viewer encoding every image with `options`.
    pub fn with_options(options: EncodeOptions) -> Self {
        Self {
            meta: WidgetMeta::for_view(Self::VIEW_NAME),
            data: EncodedPayload::placeholder(),
            size: ImageSize::default(),
            transform: Transform::default(),
            linked_transform: false,
            options,
            events: EventsDispatcher::new(),
            bus: StateBus::new(),
        }
    }

    /// Announce changes on a shared bus instead of a private one.
    pub fn with_state_bus(mut self, bus: StateBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn instance_id(&self) -> u64 {
        self.meta.instance_id
    }

    pub fn meta(&self) -> &WidgetMeta {
        &self.meta
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Options apply from the next `set_image*` call.
    pub fn set_options(&mut self, options: EncodeOptions) {
        self.options = options;
    }

    // ========== Image ==========

    /// Encode and display `image`.
    ///
    /// On error the previous image stays.
    pub fn set_image(&mut self, image: &Tensor) -> Result<(), EncodeError> {
        self.store_image(image, None)
    }

    /// Encode `image` using the value range of `reference`.
    pub fn set_image_with_reference(
        &mut self,
        image: &Tensor,
        reference: &Tensor,
    ) -> Result<(), EncodeError> {
        self.store_image(image, Some(reference))
    }

    fn store_image(&mut self, image: &Tensor, reference: Option<&Tensor>) -> Result<(), EncodeError> {
        let unsupported = || EncodeError::UnsupportedShape(image.shape().to_vec());
        let (h, w) = image.spatial_size().ok_or_else(unsupported)?;
        let size = ImageSize {
            height: u32::try_from(h).map_err(|_| unsupported())?,
            width: u32::try_from(w).map_err(|_| unsupported())?,
        };

        let data = encode::encode(image, reference, &self.options)?;
        debug!(
            "Viewer {}: new image {}x{} ({} payload bytes)",
            self.meta.instance_id,
            size.width,
            size.height,
            data.len()
        );

        self.data = data.clone();
        self.size = size;
        self.bus.emit(DataChanged {
            instance_id: self.meta.instance_id,
            data,
        });
        self.bus.emit(SizeChanged {
            instance_id: self.meta.instance_id,
            size,
        });
        Ok(())
    }

    pub fn data(&self) -> &EncodedPayload {
        &self.data
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    // ========== Transform ==========

    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Center the view on `pos`; `None` keeps the current scale.
    pub fn goto(&mut self, pos: (f64, f64), scale: Option<f64>) {
        let scale = scale.unwrap_or(self.transform.scale);
        self.set_transform(Transform {
            x: pos.0,
            y: pos.1,
            scale,
        });
    }

    /// Returns true if the transform changed (and a change event was emitted).
    pub fn set_transform(&mut self, transform: Transform) -> bool {
        if transform == self.transform {
            return false;
        }
        let old = std::mem::replace(&mut self.transform, transform);
        self.bus.emit(TransformChanged {
            instance_id: self.meta.instance_id,
            old,
            new: transform,
        });
        true
    }

    pub fn linked_transform(&self) -> bool {
        self.linked_transform
    }

    pub fn set_linked_transform(&mut self, linked: bool) -> bool {
        if linked == self.linked_transform {
            return false;
        }
        self.linked_transform = linked;
        self.bus.emit(LinkedTransformChanged {
            instance_id: self.meta.instance_id,
            linked,
        });
        true
    }

    // ========== Channels ==========

    /// Subscribers for browser events.
    pub fn events(&self) -> &EventsDispatcher {
        &self.events
    }

    /// Change notifications for the sync layer.
    pub fn state_bus(&self) -> &StateBus {
        &self.bus
    }

    /// Route a custom browser message into the event dispatcher.
    ///
    /// Only `{"event": <non-empty string>, "data": <object>}` is dispatched;
    /// returns false for anything else.
    pub fn handle_custom_msg(&self, content: &Value) -> Result<bool, DispatchError> {
        let event = content.get("event").and_then(Value::as_str).filter(|e| !e.is_empty());
        let data = content.get("data").and_then(Value::as_object);
        match (event, data) {
            (Some(event), Some(data)) => {
                self.events.dispatch_event(event, &Attrs::from_json_object(data))?;
                Ok(true)
            }
            _ => {
                trace!("Viewer {}: ignoring custom message {}", self.meta.instance_id, content);
                Ok(false)
            }
        }
    }

    /// Apply state written back by the browser (`_transform`, `linkedTransform`).
    ///
    /// Unknown and backend-owned keys are ignored. The patch is validated
    /// completely before anything is applied.
    pub fn apply_frontend_update(&mut self, patch: &Value) -> Result<(), ViewerError> {
        let object = patch.as_object().ok_or_else(|| ViewerError::InvalidUpdate {
            key: "<patch>".to_string(),
            reason: format!("expected an object, got {}", patch),
        })?;

        let transform = match object.get("_transform") {
            Some(v) => Some(serde_json::from_value::<Transform>(v.clone()).map_err(|e| {
                ViewerError::InvalidUpdate {
                    key: "_transform".to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };
        let linked = match object.get("linkedTransform") {
            Some(v) => Some(v.as_bool().ok_or_else(|| ViewerError::InvalidUpdate {
                key: "linkedTransform".to_string(),
                reason: format!("expected a bool, got {}", v),
            })?),
            None => None,
        };

        for key in object.keys() {
            if key != "_transform" && key != "linkedTransform" {
                trace!("Viewer {}: ignoring frontend key {}", self.meta.instance_id, key);
            }
        }

        if let Some(t) = transform {
            self.set_transform(t);
        }
        if let Some(l) = linked {
            self.set_linked_transform(l);
        }
        Ok(())
    }

    /// Serializable snapshot of everything the view renders.
    pub fn state(&self) -> ViewerState {
        ViewerState {
            meta: self.meta.clone(),
            data: self.data.clone(),
            size: self.size,
            transform: self.transform,
            linked_transform: self.linked_transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Signature;
    use crate::core::state_bus::downcast_event;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_defaults() {
        let viewer = ImageViewer::new();
        assert_eq!(viewer.transform(), Transform { x: 0.0, y: 0.0, scale: 1e-8 });
        assert!(!viewer.linked_transform());
        assert_eq!(viewer.size(), ImageSize { height: 1, width: 1 });
        assert_eq!(viewer.data(), &EncodedPayload::placeholder());
        assert_eq!(viewer.meta().view_name, "ImageViewer");
    }

    #[test]
    fn test_set_image_updates_and_emits() {
        let mut viewer = ImageViewer::new();
        let img = Tensor::from_f32(vec![3, 4, 6], vec![0.5; 72]).unwrap();
        viewer.set_image(&img).unwrap();

        assert_eq!(viewer.size(), ImageSize { height: 4, width: 6 });
        assert!(viewer.data().as_str().starts_with("data:image/png;base64,"));
        let decoded = viewer.data().decode_image().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (6, 4));

        let changes = viewer.state_bus().poll();
        assert_eq!(changes.len(), 2);
        let data = downcast_event::<DataChanged>(&changes[0]).unwrap();
        assert_eq!(&data.data, viewer.data());
        assert_eq!(data.instance_id, viewer.instance_id());
        let size = downcast_event::<SizeChanged>(&changes[1]).unwrap();
        assert_eq!(size.size, viewer.size());
    }

    #[test]
    fn test_size_is_source_size_even_with_thumbnail() {
        let opts = EncodeOptions { thumbnail: Some((10, 10)), ..Default::default() };
        let mut viewer = ImageViewer::with_options(opts);
        viewer.set_image(&Tensor::from_u8(vec![40, 20], vec![100; 800]).unwrap()).unwrap();
        assert_eq!(viewer.size(), ImageSize { height: 40, width: 20 });
        let decoded = viewer.data().decode_image().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 10));
    }

    #[test]
    fn test_failed_set_image_keeps_previous_state() {
        let mut viewer = ImageViewer::new();
        let before = viewer.state();
        let constant = Tensor::from_f32(vec![2, 2], vec![3.0; 4]).unwrap();
        assert!(matches!(viewer.set_image(&constant), Err(EncodeError::DegenerateRange { .. })));
        assert_eq!(viewer.state(), before);
        assert_eq!(viewer.state_bus().queue_len(), 0);
    }

    #[test]
    fn test_set_image_with_reference() {
        let mut viewer = ImageViewer::new();
        let img = Tensor::from_f32(vec![1, 2], vec![0.0, 25.0]).unwrap();
        let reference = Tensor::from_f32(vec![1, 2], vec![0.0, 100.0]).unwrap();
        viewer.set_options(EncodeOptions { normalize: true, ..Default::default() });
        viewer.set_image_with_reference(&img, &reference).unwrap();
        let px = viewer.data().decode_image().unwrap().to_luma8().into_raw();
        assert_eq!(px, vec![0, 64]);
    }

    #[test]
    fn test_goto_keeps_scale_when_omitted() {
        let mut viewer = ImageViewer::new();
        viewer.goto((10.0, 20.0), Some(2.0));
        assert_eq!(viewer.transform(), Transform { x: 10.0, y: 20.0, scale: 2.0 });
        viewer.goto((5.0, 6.0), None);
        assert_eq!(viewer.transform(), Transform { x: 5.0, y: 6.0, scale: 2.0 });

        let changes = viewer.state_bus().poll();
        assert_eq!(changes.len(), 2);
        let last = downcast_event::<TransformChanged>(&changes[1]).unwrap();
        assert_eq!(last.old.x, 10.0);
        assert_eq!(last.new.x, 5.0);

        // No-op goto emits nothing
        viewer.goto((5.0, 6.0), None);
        assert_eq!(viewer.state_bus().queue_len(), 0);
    }

    #[test]
    fn test_custom_msg_dispatch() {
        let viewer = ImageViewer::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        viewer.events().on(
            Signature::new("on_click").required("event").required("x").optional("y"),
            move |args| {
                s.lock().unwrap().push((
                    args.get_str("event").unwrap_or_default().to_string(),
                    args.get_i64("x"),
                    args.get_i64("y"),
                ));
                Ok(())
            },
        );

        let handled = viewer
            .handle_custom_msg(&json!({"event": "click", "data": {"x": 4, "other": true}}))
            .unwrap();
        assert!(handled);
        assert_eq!(*seen.lock().unwrap(), vec![("click".to_string(), Some(4), None)]);

        // Malformed messages are ignored
        for msg in [
            json!({"event": "click"}),
            json!({"event": "", "data": {}}),
            json!({"event": 3, "data": {}}),
            json!({"event": "click", "data": [1, 2]}),
            json!("click"),
        ] {
            assert!(!viewer.handle_custom_msg(&msg).unwrap());
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_custom_msg_missing_param_errors() {
        let viewer = ImageViewer::new();
        viewer.events().on(Signature::new("needs_pos").required("event").required("pos"), |_| Ok(()));
        let err = viewer
            .handle_custom_msg(&json!({"event": "click", "data": {}}))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unsatisfied { ref param, .. } if param == "pos"));
    }

    #[test]
    fn test_frontend_update() {
        let mut viewer = ImageViewer::new();
        viewer
            .apply_frontend_update(&json!({"_transform": [1.5, -2.0, 3.0], "linkedTransform": true, "_data": "x"}))
            .unwrap();
        assert_eq!(viewer.transform(), Transform { x: 1.5, y: -2.0, scale: 3.0 });
        assert!(viewer.linked_transform());

        // Invalid patch leaves state untouched
        let err = viewer
            .apply_frontend_update(&json!({"_transform": [0.0, 0.0, 1.0], "linkedTransform": "yes"}))
            .unwrap_err();
        assert!(matches!(err, ViewerError::InvalidUpdate { ref key, .. } if key == "linkedTransform"));
        assert_eq!(viewer.transform().scale, 3.0);

        assert!(viewer.apply_frontend_update(&json!({"_transform": [1, 2]})).is_err());
        assert!(viewer.apply_frontend_update(&json!(null)).is_err());
    }

    #[test]
    fn test_state_snapshot_keys() {
        let mut viewer = ImageViewer::new();
        viewer.goto((1.0, 2.0), Some(4.0));
        let json = serde_json::to_value(viewer.state()).unwrap();
        assert_eq!(json["_transform"], json!([1.0, 2.0, 4.0]));
        assert_eq!(json["_size"], json!([1, 1]));
        assert_eq!(json["linkedTransform"], json!(false));
        assert_eq!(json["_view_name"], json!("ImageViewer"));
        assert!(json["_data"].as_str().unwrap().starts_with("data:image/png;base64,"));

        let back: ViewerState = serde_json::from_value(json).unwrap();
        assert_eq!(back, viewer.state());
    }

    #[test]
    fn test_shared_bus_sees_all_viewers() {
        let bus = StateBus::new();
        let mut a = ImageViewer::new().with_state_bus(bus.clone());
        let mut b = ImageViewer::new().with_state_bus(bus.clone());
        let ids = Arc::new(Mutex::new(Vec::new()));
        let i = Arc::clone(&ids);
        bus.subscribe::<TransformChanged, _>(move |e| i.lock().unwrap().push(e.instance_id));

        a.goto((1.0, 1.0), None);
        b.goto((2.0, 2.0), None);
        assert_eq!(*ids.lock().unwrap(), vec![a.instance_id(), b.instance_id()]);
    }
}
