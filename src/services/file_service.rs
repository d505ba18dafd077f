use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Stockage des photos et documents. Les fichiers d'une demande sont
/// adressés par la clé `{work_request_id}/{timestamp_ms}-{nom_fichier}`.
pub struct FileService {
    client: Client,
    bucket: String,
    public_url: Option<String>,
}

impl FileService {
    pub async fn new(config: &Config) -> AppResult<Self> {
        let credentials = Credentials::new(
            &config.storage_access_key,
            &config.storage_secret_key,
            None,
            None,
            "mrbrico",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("us-east-1"))
            .endpoint_url(&config.storage_endpoint)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.storage_bucket.clone(),
            public_url: config.storage_public_url.clone(),
        })
    }

    pub fn build_key(work_request_id: Uuid, file_name: &str) -> String {
        format!(
            "{}/{}-{}",
            work_request_id,
            chrono::Utc::now().timestamp_millis(),
            file_name
        )
    }

    pub async fn upload(&self, key: &str, content_type: &str, data: Vec<u8>) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::File(e.to_string()))?;

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::File(e.to_string()))?;

        Ok(())
    }

    /// URL publique: {base}/storage/v1/object/public/{bucket}/{clé}
    pub fn public_url(&self, key: &str) -> Option<String> {
        self.public_url.as_ref().map(|base| {
            format!("{}/storage/v1/object/public/{}/{}", base, self.bucket, key)
        })
    }
}

pub fn validate_image_content_type(content_type: &str) -> bool {
    matches!(
        content_type,
        "image/jpeg" | "image/png" | "image/gif" | "image/webp"
    )
}

pub fn validate_document_content_type(content_type: &str) -> bool {
    matches!(
        content_type,
        "application/pdf"
            | "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "image/jpeg"
            | "image/png"
    )
}

pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const MAX_PHOTOS_PER_REQUEST: i64 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key_shape() {
        let id = Uuid::new_v4();
        let key = FileService::build_key(id, "fuite.jpg");
        let (prefix, rest) = key.split_once('/').unwrap();
        assert_eq!(prefix, id.to_string());
        assert!(rest.ends_with("-fuite.jpg"));
    }

    #[test]
    fn test_image_content_types() {
        assert!(validate_image_content_type("image/jpeg"));
        assert!(validate_image_content_type("image/webp"));
        assert!(!validate_image_content_type("application/pdf"));
    }
}
