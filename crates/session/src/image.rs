use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

/// Image formats accepted by vision-capable backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMediaType {
    Png,
    Jpeg,
    Gif,
    Webp,
    Heic,
    Heif,
}

impl ImageMediaType {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim().to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "heic" => Some(Self::Heic),
            "heif" => Some(Self::Heif),
            _ => None,
        }
    }

    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Heic => "image/heic",
            Self::Heif => "image/heif",
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ImageError {
    #[snafu(display("'{file_name}' is not a supported image type"))]
    UnsupportedMediaType {
        stage: &'static str,
        file_name: String,
    },
    #[snafu(display("failed to read image '{file_name}' on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        file_name: String,
        source: std::io::Error,
    },
    #[snafu(display("image '{file_name}' holds invalid base64 data: {source}"))]
    DecodeData {
        stage: &'static str,
        file_name: String,
        source: base64::DecodeError,
    },
    #[snafu(display("image '{file_name}' is empty"))]
    EmptyFile {
        stage: &'static str,
        file_name: String,
    },
}

pub type ImageResult<T> = Result<T, ImageError>;

/// User-selected image, already base64-encoded for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub media_type: ImageMediaType,
    /// Standard padded base64 of the file bytes.
    pub data: String,
}

impl ImageAttachment {
    pub fn from_bytes(
        file_name: impl Into<String>,
        media_type: ImageMediaType,
        bytes: &[u8],
    ) -> ImageResult<Self> {
        let file_name = file_name.into();
        ensure!(
            !bytes.is_empty(),
            EmptyFileSnafu {
                stage: "encode-image",
                file_name: file_name.clone(),
            }
        );

        Ok(Self {
            file_name,
            media_type,
            data: BASE64_STANDARD.encode(bytes),
        })
    }

    /// Reads and encodes an image file, inferring its type from the extension.
    pub fn from_path(path: &Path) -> ImageResult<Self> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let media_type = path
            .extension()
            .and_then(|extension| extension.to_str())
            .and_then(ImageMediaType::from_extension)
            .context(UnsupportedMediaTypeSnafu {
                stage: "detect-media-type",
                file_name: file_name.clone(),
            })?;

        let bytes = std::fs::read(path).context(ReadFileSnafu {
            stage: "read-image-file",
            file_name: file_name.clone(),
        })?;

        Self::from_bytes(file_name, media_type, &bytes)
    }

    /// Raw file bytes, for rendering the attachment back to the user.
    pub fn decode(&self) -> ImageResult<Vec<u8>> {
        BASE64_STANDARD
            .decode(self.data.as_bytes())
            .context(DecodeDataSnafu {
                stage: "decode-image",
                file_name: self.file_name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("abram-image-tests-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn encodes_bytes_as_padded_standard_base64() {
        let image = ImageAttachment::from_bytes("a.png", ImageMediaType::Png, b"hello").unwrap();
        assert_eq!(image.data, "aGVsbG8=");
        assert_eq!(image.decode().unwrap(), b"hello");
    }

    #[test]
    fn reads_file_and_detects_media_type_case_insensitively() {
        let path = temp_file("task.JPG", &[0xff, 0xd8, 0xff]);
        let image = ImageAttachment::from_path(&path).unwrap();

        assert_eq!(image.file_name, "task.JPG");
        assert_eq!(image.media_type, ImageMediaType::Jpeg);
        assert_eq!(image.data, "/9j/");
    }

    #[test]
    fn decode_reports_corrupted_data() {
        let mut image = ImageAttachment::from_bytes("a.png", ImageMediaType::Png, b"hi").unwrap();
        image.data = "not base64!".to_string();

        assert!(matches!(
            image.decode(),
            Err(ImageError::DecodeData { .. })
        ));
    }

    #[test]
    fn rejects_unknown_extension() {
        let path = temp_file("notes.txt", b"not an image");
        let error = ImageAttachment::from_path(&path).unwrap_err();
        assert!(matches!(error, ImageError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn rejects_empty_and_missing_files() {
        let path = temp_file("empty.png", b"");
        assert!(matches!(
            ImageAttachment::from_path(&path),
            Err(ImageError::EmptyFile { .. })
        ));

        let missing = std::env::temp_dir().join("abram-definitely-missing.png");
        assert!(matches!(
            ImageAttachment::from_path(&missing),
            Err(ImageError::ReadFile { .. })
        ));
    }
}
