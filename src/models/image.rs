use bytes::Bytes;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// MIME type produced by camera snapshots
pub const CAPTURE_MIME_TYPE: &str = "image/jpeg";

/// Where an [`ImageSource`] came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Picked from disk or dropped onto the upload area
    Upload { file_name: String },
    /// Still frame grabbed from the live camera stream
    Camera,
}

#[derive(Debug)]
struct ImageData {
    bytes: Bytes,
    mime_type: String,
    origin: ImageOrigin,
    created_at: DateTime<Utc>,
}

/// Immutable, normalized handle to one image's bytes.
///
/// Uploads and camera captures produce the same shape so the analysis and feedback
/// services never need to know which producer created the image. Cloning is cheap:
/// clones share the underlying buffer and compare equal under [`ImageSource::same_as`].
#[derive(Debug, Clone)]
pub struct ImageSource {
    inner: Arc<ImageData>,
}

impl ImageSource {
    /// Build an image from an uploaded file.
    ///
    /// Returns `None` when the declared type is not an `image/*` type. The file is
    /// ignored silently, matching the upload widget's permissive filter.
    pub fn from_upload(
        file_name: impl Into<String>,
        declared_type: &str,
        bytes: impl Into<Bytes>,
    ) -> Option<Self> {
        let file_name = file_name.into();

        if !declared_type.starts_with("image/") {
            tracing::debug!(
                "Ignoring upload {} with non-image type {:?}",
                file_name,
                declared_type
            );
            return None;
        }

        Some(Self::new(
            bytes.into(),
            declared_type.to_string(),
            ImageOrigin::Upload { file_name },
        ))
    }

    /// Read an upload from disk, deriving its declared type from the extension.
    ///
    /// Files whose extension does not map to an image type yield `Ok(None)`.
    pub async fn from_path(path: &Utf8Path) -> crate::Result<Option<Self>> {
        let declared_type = declared_type_for(path);
        if !declared_type.starts_with("image/") {
            tracing::debug!("Skipping read of non-image upload: {}", path);
            return Ok(None);
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path.file_name().unwrap_or(path.as_str());

        Ok(Self::from_upload(file_name, declared_type, bytes))
    }

    /// Wrap an encoded camera snapshot
    pub fn from_capture(jpeg_bytes: impl Into<Bytes>) -> Self {
        Self::new(
            jpeg_bytes.into(),
            CAPTURE_MIME_TYPE.to_string(),
            ImageOrigin::Camera,
        )
    }

    fn new(bytes: Bytes, mime_type: String, origin: ImageOrigin) -> Self {
        Self {
            inner: Arc::new(ImageData {
                bytes,
                mime_type,
                origin,
                created_at: Utc::now(),
            }),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.inner.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.inner.mime_type
    }

    pub fn origin(&self) -> &ImageOrigin {
        &self.inner.origin
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// True when both handles refer to the same created image
    pub fn same_as(&self, other: &ImageSource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Declared content type for a file, as a browser file picker would report it.
///
/// Unknown extensions map to an empty string.
pub fn declared_type_for(path: &Utf8Path) -> &'static str {
    let ext = path
        .extension()
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        "heic" | "heif" => "image/heic",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_accepts_image_types() {
        let image = ImageSource::from_upload("cat.png", "image/png", vec![1u8, 2, 3]).unwrap();

        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(&image.bytes()[..], &[1, 2, 3]);
        assert_eq!(
            image.origin(),
            &ImageOrigin::Upload {
                file_name: "cat.png".to_string()
            }
        );
    }

    #[test]
    fn test_upload_silently_rejects_non_image_types() {
        assert!(ImageSource::from_upload("notes.txt", "text/plain", vec![1u8]).is_none());
        assert!(ImageSource::from_upload("blank", "", vec![1u8]).is_none());
        assert!(ImageSource::from_upload("clip.mp4", "video/mp4", vec![1u8]).is_none());
    }

    #[test]
    fn test_capture_is_jpeg() {
        let image = ImageSource::from_capture(vec![0xFFu8, 0xD8]);

        assert_eq!(image.mime_type(), CAPTURE_MIME_TYPE);
        assert_eq!(image.origin(), &ImageOrigin::Camera);
        assert_eq!(image.len(), 2);
    }

    #[test]
    fn test_same_as_tracks_identity_not_content() {
        let a = ImageSource::from_capture(vec![1u8, 2, 3]);
        let b = ImageSource::from_capture(vec![1u8, 2, 3]);
        let a_clone = a.clone();

        assert!(a.same_as(&a_clone));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_declared_type_for_extensions() {
        assert_eq!(declared_type_for(Utf8Path::new("a/b/Photo.JPG")), "image/jpeg");
        assert_eq!(declared_type_for(Utf8Path::new("shot.webp")), "image/webp");
        assert_eq!(declared_type_for(Utf8Path::new("readme.txt")), "text/plain");
        assert_eq!(declared_type_for(Utf8Path::new("no_extension")), "");
    }

    #[tokio::test]
    async fn test_from_path_reads_image_and_skips_others() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let image_path = root.join("dog.jpg");
        std::fs::write(&image_path, [9u8, 8, 7]).unwrap();
        let text_path = root.join("dog.txt");
        std::fs::write(&text_path, b"not an image").unwrap();

        let image = ImageSource::from_path(&image_path).await.unwrap().unwrap();
        assert_eq!(image.mime_type(), "image/jpeg");
        assert_eq!(&image.bytes()[..], &[9, 8, 7]);

        assert!(ImageSource::from_path(&text_path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_path_missing_file_is_io_error() {
        let result = ImageSource::from_path(Utf8Path::new("/definitely/missing/cat.png")).await;
        assert!(matches!(result, Err(crate::VisionError::Io(_))));
    }
}
