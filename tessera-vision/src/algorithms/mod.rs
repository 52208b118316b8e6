//! Built-in segmentation algorithms

mod common;
mod felzenszwalb;
mod quickshift;
mod slic;
mod watershed;

pub use felzenszwalb::Felzenszwalb;
pub use quickshift::Quickshift;
pub use slic::Slic;
pub use watershed::Watershed;
