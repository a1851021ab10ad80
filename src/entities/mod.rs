//! Entities module - data types shared by the encoder, the dispatcher and the viewer
//!
//! - `Attrs` / `AttrValue`: named values carried by browser events
//! - `Tensor`: image arrays with shape and element type

pub mod attrs;
pub mod tensor;

pub use attrs::{AttrValue, Attrs};
pub use tensor::{DType, Tensor, TensorData, TensorError};
