// Image store: uploaded sources and derived result images

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extensions probed, in order, when resolving an image id on disk.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp", ".tiff"];

const DEFAULT_EXTENSION: &str = ".jpg";
const DERIVED_SUFFIX: &str = "_result.png";

/// Metadata recorded for an ingested image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    pub filename: String,
    pub original_filename: String,
    pub url: String,
    pub content_type: String,
    pub size: u64,
    /// (width, height) after any ingest resize.
    pub dimensions: (u32, u32),
    pub created_at: DateTime<Utc>,
}

/// Storage for source images and rendered results.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Decoded pixels, always converted to RGB8.
    async fn load(&self, image_id: &str) -> Result<RgbImage, StorageError>;

    async fn url_for(&self, image_id: &str) -> Result<String, StorageError>;

    /// Persist a rendered artifact as PNG and return its URL.
    async fn save_derived(&self, image: &RgbImage, derived_id: &str) -> Result<String, StorageError>;
}

/// Downsample so the longer side is at most `max_dimension`, preserving
/// aspect ratio. Images already within bounds are returned untouched.
pub fn resize_to_fit(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let longer = width.max(height);
    if longer <= max_dimension || max_dimension == 0 {
        return image;
    }
    let scale = max_dimension as f64 / longer as f64;
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    debug!(
        from = ?(width, height),
        to = ?(new_width, new_height),
        "Downsampling image on ingest"
    );
    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// Ids become file names, so anything that could escape the upload
/// directory is refused.
fn validate_id(id: &str) -> Result<(), StorageError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidId(id.to_string()))
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .filter(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, StorageError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Filesystem-backed store rooted at the upload directory.
pub struct FsImageStore {
    root: PathBuf,
    url_prefix: String,
    max_dimension: u32,
}

impl FsImageStore {
    pub async fn new(
        root: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        max_dimension: u32,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            max_dimension,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn url_for_file(&self, filename: &str) -> String {
        format!("{}/{}", self.url_prefix, filename)
    }

    async fn locate(&self, image_id: &str) -> Result<PathBuf, StorageError> {
        validate_id(image_id)?;
        for ext in SUPPORTED_EXTENSIONS {
            let path = self.root.join(format!("{}{}", image_id, ext));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(path);
            }
        }
        Err(StorageError::NotFound(image_id.to_string()))
    }

    /// Decode, normalize to RGB, downsample if oversized and store under a
    /// fresh id.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        original_filename: &str,
        content_type: &str,
    ) -> Result<ImageInfo, StorageError> {
        let image_id = uuid::Uuid::new_v4().to_string();
        let filename = format!("{}{}", image_id, extension_of(original_filename));
        let path = self.root.join(&filename);
        let max_dimension = self.max_dimension;

        let save_path = path.clone();
        let dimensions = tokio::task::spawn_blocking(move || -> Result<(u32, u32), StorageError> {
            let decoded = image::load_from_memory(&bytes)
                .map_err(|e| StorageError::InvalidImage(e.to_string()))?;
            let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
            let resized = resize_to_fit(rgb, max_dimension);
            resized.save(&save_path)?;
            Ok((resized.width(), resized.height()))
        })
        .await??;

        let size = tokio::fs::metadata(&path).await?.len();
        let info = ImageInfo {
            id: image_id,
            url: self.url_for_file(&filename),
            filename,
            original_filename: original_filename.to_string(),
            content_type: content_type.to_string(),
            size,
            dimensions,
            created_at: Utc::now(),
        };

        info!(
            image_id = %info.id,
            filename = %original_filename,
            size = info.size,
            dimensions = ?info.dimensions,
            "Image uploaded successfully"
        );
        Ok(info)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn load(&self, image_id: &str) -> Result<RgbImage, StorageError> {
        let path = self.locate(image_id).await?;
        let bytes = tokio::fs::read(&path).await?;
        let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await?
            .map_err(|e| {
                warn!(image_id = %image_id, error = %e, "Failed to decode stored image");
                StorageError::from(e)
            })?;
        Ok(image.to_rgb8())
    }

    async fn url_for(&self, image_id: &str) -> Result<String, StorageError> {
        let path = self.locate(image_id).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::NotFound(image_id.to_string()))?;
        Ok(self.url_for_file(filename))
    }

    async fn save_derived(&self, image: &RgbImage, derived_id: &str) -> Result<String, StorageError> {
        validate_id(derived_id)?;
        let filename = format!("{}{}", derived_id, DERIVED_SUFFIX);
        let owned = image.clone();
        let png = tokio::task::spawn_blocking(move || encode_png(&owned)).await??;
        tokio::fs::write(self.root.join(&filename), png).await?;
        Ok(self.url_for_file(&filename))
    }
}

/// In-memory store, used when no upload directory is wanted.
#[derive(Default, Clone)]
pub struct MemoryImageStore {
    images: Arc<DashMap<String, RgbImage>>,
    derived: Arc<DashMap<String, RgbImage>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, image_id: impl Into<String>, image: RgbImage) {
        self.images.insert(image_id.into(), image);
    }

    pub fn derived(&self, derived_id: &str) -> Option<RgbImage> {
        self.derived.get(derived_id).map(|img| img.clone())
    }

    pub fn derived_count(&self) -> usize {
        self.derived.len()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn load(&self, image_id: &str) -> Result<RgbImage, StorageError> {
        self.images
            .get(image_id)
            .map(|img| img.clone())
            .ok_or_else(|| StorageError::NotFound(image_id.to_string()))
    }

    async fn url_for(&self, image_id: &str) -> Result<String, StorageError> {
        if self.images.contains_key(image_id) {
            Ok(format!("memory://{}", image_id))
        } else {
            Err(StorageError::NotFound(image_id.to_string()))
        }
    }

    async fn save_derived(&self, image: &RgbImage, derived_id: &str) -> Result<String, StorageError> {
        self.derived.insert(derived_id.to_string(), image.clone());
        Ok(format!("memory://{}{}", derived_id, DERIVED_SUFFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
        encode_png(&img).unwrap()
    }

    #[test]
    fn test_resize_to_fit_preserves_aspect_ratio() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(400, 100));
        let resized = resize_to_fit(img, 200);
        assert_eq!((resized.width(), resized.height()), (200, 50));

        let small = DynamicImage::ImageRgb8(RgbImage::new(30, 20));
        let same = resize_to_fit(small, 200);
        assert_eq!((same.width(), same.height()), (30, 20));
    }

    #[test]
    fn test_resize_floors_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(300, 199));
        let resized = resize_to_fit(img, 100);
        assert_eq!((resized.width(), resized.height()), (100, 66));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.PNG"), ".png");
        assert_eq!(extension_of("scan.tiff"), ".tiff");
        assert_eq!(extension_of("noext"), ".jpg");
        assert_eq!(extension_of("archive.gif"), ".jpg");
    }

    #[test]
    fn test_validate_id_rejects_traversal() {
        assert!(validate_id("abc-123_x").is_ok());
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("").is_err());
        assert!(validate_id("a/b").is_err());
    }

    #[tokio::test]
    async fn test_ingest_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path(), "/uploads", 2048).await.unwrap();

        let info = store.ingest(png_bytes(16, 8), "pic.png", "image/png").await.unwrap();
        assert_eq!(info.dimensions, (16, 8));
        assert!(info.filename.ends_with(".png"));
        assert_eq!(info.url, format!("/uploads/{}", info.filename));

        let loaded = store.load(&info.id).await.unwrap();
        assert_eq!(loaded.dimensions(), (16, 8));
        assert_eq!(loaded.get_pixel(3, 2), &Rgb([3, 2, 128]));
        assert_eq!(store.url_for(&info.id).await.unwrap(), info.url);
    }

    #[tokio::test]
    async fn test_ingest_downsamples_large_images() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path(), "/uploads/", 32).await.unwrap();
        let info = store.ingest(png_bytes(64, 16), "wide.png", "image/png").await.unwrap();
        assert_eq!(info.dimensions, (32, 8));
        assert!(info.url.starts_with("/uploads/"));
        assert_eq!(store.load(&info.id).await.unwrap().dimensions(), (32, 8));
    }

    #[tokio::test]
    async fn test_ingest_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path(), "/uploads", 2048).await.unwrap();
        let err = store
            .ingest(b"not an image".to_vec(), "x.png", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_missing_image_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path(), "/uploads", 2048).await.unwrap();
        assert!(matches!(store.load("nope").await, Err(StorageError::NotFound(_))));
        assert!(matches!(store.url_for("nope").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_derived_writes_png_and_keeps_buffer() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path(), "/uploads", 2048).await.unwrap();
        let img = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let url = store.save_derived(&img, "req1_slic").await.unwrap();
        assert_eq!(url, "/uploads/req1_slic_result.png");
        assert!(dir.path().join("req1_slic_result.png").exists());
        assert_eq!(img.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryImageStore::new();
        store.insert("img", RgbImage::new(2, 2));
        assert_eq!(store.load("img").await.unwrap().dimensions(), (2, 2));
        assert!(store.load("other").await.is_err());
        store.save_derived(&RgbImage::new(2, 2), "r_slic").await.unwrap();
        assert_eq!(store.derived_count(), 1);
        assert!(store.derived("r_slic").is_some());
    }
}
