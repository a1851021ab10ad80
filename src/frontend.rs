//! Frontend package metadata shared by every widget backend.
//!
//! The browser side looks widgets up by model/view name inside its module;
//! the backend only has to report them. Instance ids are unique per process.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of the browser-side package
pub const MODULE_NAME: &str = "protoview";

/// Semver range of the browser-side package this backend talks to
pub const MODULE_VERSION: &str = "^0.1.0";

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(0);

/// Model/view identification sent with a widget's initial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetMeta {
    #[serde(rename = "_model_module")]
    pub model_module: String,
    #[serde(rename = "_model_module_version")]
    pub model_module_version: String,
    #[serde(rename = "_model_name")]
    pub model_name: String,
    #[serde(rename = "_view_module")]
    pub view_module: String,
    #[serde(rename = "_view_module_version")]
    pub view_module_version: String,
    #[serde(rename = "_view_name")]
    pub view_name: String,
    #[serde(rename = "_instance_id")]
    pub instance_id: u64,
}

impl WidgetMeta {
    /// Metadata for a view called `view_name` (model is `<view_name>Model`),
    /// with a fresh instance id.
    pub fn for_view(view_name: &str) -> Self {
        Self {
            model_module: MODULE_NAME.to_string(),
            model_module_version: MODULE_VERSION.to_string(),
            model_name: format!("{}Model", view_name),
            view_module: MODULE_NAME.to_string(),
            view_module_version: MODULE_VERSION.to_string(),
            view_name: view_name.to_string(),
            instance_id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}
