//! Storage collaborators for the segmentation service: the advisory result
//! cache and the image store.

pub mod cache;
pub mod error;
pub mod image_store;

pub use cache::{
    segmentation_key, segmentation_key_with_image_hash, short_hash, CacheBackend,
    MemoryCacheBackend, ResultCache, SEGMENTATION_KEY_PREFIX,
};
pub use error::StorageError;
pub use image_store::{resize_to_fit, FsImageStore, ImageInfo, ImageStore, MemoryImageStore};
