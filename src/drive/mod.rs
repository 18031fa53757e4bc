//! Object storage for user uploads (avatars).

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::{AppConfig, DriveBackend};

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Drive I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object storage error: {0}")]
    Remote(String),
    #[error("Drive backend not available: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), DriveError>;

    fn public_url(&self, key: &str) -> String;
}

/// Maps an accepted avatar content type to its file extension.
pub fn avatar_extension(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

pub fn avatar_key(user_id: Uuid, extension: &str) -> String {
    format!("avatars/{user_id}/{}.{extension}", Uuid::new_v4())
}

fn validate_key(key: &str) -> Result<(), DriveError> {
    let path = Path::new(key);
    let clean = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if clean {
        Ok(())
    } else {
        Err(DriveError::InvalidKey(key.to_string()))
    }
}

/// Files under a root directory, served by the HTTP layer at `/storage`.
pub struct LocalDrive {
    root: PathBuf,
    public_base_url: String,
}

impl LocalDrive {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStore for LocalDrive {
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), DriveError> {
        validate_key(key)?;
        let target = self.root.join(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &data).await?;
        debug!(
            "Stored {} bytes ({content_type}) at {}",
            data.len(),
            target.display()
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}

#[cfg(feature = "drive")]
pub use s3::S3Drive;

#[cfg(feature = "drive")]
mod s3 {
    use super::*;
    use aws_config::BehaviorVersion;
    use aws_sdk_s3::{config::Builder as S3ConfigBuilder, primitives::ByteStream, Client as S3Client};

    use crate::core::config::DriveConfig;

    pub struct S3Drive {
        client: S3Client,
        bucket: String,
        public_base_url: String,
    }

    impl S3Drive {
        pub async fn connect(config: &DriveConfig, public_base_url: String) -> Self {
            let mut loader = aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(config.region.clone()))
                .credentials_provider(aws_sdk_s3::config::Credentials::new(
                    config.access_key.clone(),
                    config.secret_key.clone(),
                    None,
                    None,
                    "static",
                ));
            if let Some(endpoint) = &config.endpoint {
                loader = loader.endpoint_url(endpoint.trim_end_matches('/'));
            }
            let base_config = loader.load().await;

            let s3_config = S3ConfigBuilder::from(&base_config)
                .force_path_style(true)
                .build();

            Self {
                client: S3Client::from_conf(s3_config),
                bucket: config.bucket.clone(),
                public_base_url,
            }
        }
    }

    #[async_trait]
    impl ObjectStore for S3Drive {
        async fn upload(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
        ) -> Result<(), DriveError> {
            validate_key(key)?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| DriveError::Remote(e.to_string()))?;
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("{}/{key}", self.public_base_url)
        }
    }
}

/// Builds the configured drive backend.
pub async fn init_drive(config: &AppConfig) -> Result<Arc<dyn ObjectStore>, DriveError> {
    let public_base_url = config.drive_public_base_url();
    match config.drive.backend {
        DriveBackend::Local => {
            info!(
                "Using local drive at {} ({public_base_url})",
                config.drive.local_root
            );
            Ok(Arc::new(LocalDrive::new(
                &config.drive.local_root,
                public_base_url,
            )))
        }
        #[cfg(feature = "drive")]
        DriveBackend::S3 => {
            info!("Using S3 drive bucket {} ({public_base_url})", config.drive.bucket);
            Ok(Arc::new(S3Drive::connect(&config.drive, public_base_url).await))
        }
        #[cfg(not(feature = "drive"))]
        DriveBackend::S3 => Err(DriveError::Unavailable(
            "built without the `drive` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_extension() {
        assert_eq!(avatar_extension("image/png"), Some("png"));
        assert_eq!(avatar_extension("IMAGE/JPEG; charset=binary"), Some("jpg"));
        assert_eq!(avatar_extension("image/svg+xml"), None);
        assert_eq!(avatar_extension(""), None);
    }

    #[test]
    fn test_avatar_key_layout() {
        let user_id = Uuid::new_v4();
        let key = avatar_key(user_id, "webp");
        assert!(key.starts_with(&format!("avatars/{user_id}/")));
        assert!(key.ends_with(".webp"));
    }

    #[tokio::test]
    async fn test_local_drive_upload() {
        let dir = tempfile::tempdir().unwrap();
        let drive = LocalDrive::new(dir.path(), "http://localhost:8080/storage/");

        drive
            .upload("avatars/u/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        let stored = tokio::fs::read(dir.path().join("avatars/u/a.png")).await.unwrap();
        assert_eq!(stored, b"png");
        assert_eq!(
            drive.public_url("avatars/u/a.png"),
            "http://localhost:8080/storage/avatars/u/a.png"
        );

        assert!(matches!(
            drive
                .upload("../escape.png", Bytes::new(), "image/png")
                .await,
            Err(DriveError::InvalidKey(_))
        ));
    }
}
