//! Upload handling
//!
//! Reads the image part of a multipart request under a hard size cap, runs
//! preprocessing on the blocking pool and hands the tensor to the engine.

use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, HeaderMap, StatusCode};
use bytes::{Bytes, BytesMut};

use crate::inference::{InferenceEngine, PredictionResult};
use crate::preprocess::{Preprocessor, UploadFormat};
use crate::storage::UploadArchive;
use crate::utils::error::{Result, ServeError};

/// Allowance for multipart boundaries and part headers on top of the image limit
pub const MULTIPART_OVERHEAD_BYTES: usize = 16 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";

/// The image part of a request
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl Upload {
    /// Content type from the part header, else from the file name extension
    pub fn declared_content_type(&self) -> Option<String> {
        let from_header = self
            .content_type
            .as_deref()
            .filter(|ct| !ct.trim().is_empty() && !ct.trim().eq_ignore_ascii_case(OCTET_STREAM));

        match from_header {
            Some(ct) => Some(ct.to_string()),
            None => self
                .file_name
                .as_deref()
                .and_then(UploadFormat::from_file_name)
                .map(|format| format.content_type().to_string()),
        }
    }
}

/// Turns prediction requests into prediction results
#[derive(Debug)]
pub struct UploadHandler {
    preprocessor: Arc<Preprocessor>,
    engine: Arc<InferenceEngine>,
    archive: Option<UploadArchive>,
    max_upload_bytes: usize,
    field_name: String,
}

impl UploadHandler {
    pub fn new(
        preprocessor: Preprocessor,
        engine: Arc<InferenceEngine>,
        max_upload_bytes: usize,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            preprocessor: Arc::new(preprocessor),
            engine,
            archive: None,
            max_upload_bytes,
            field_name: field_name.into(),
        }
    }

    pub fn with_archive(mut self, archive: UploadArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Largest request body accepted, image limit plus multipart framing
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES)
    }

    /// Full pipeline for one request: size checks, multipart, preprocess, predict
    pub async fn handle_upload(&self, request: Request) -> Result<PredictionResult> {
        self.check_content_length(request.headers())?;

        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|rejection| ServeError::Validation(rejection.body_text()))?;
        let upload = self.read_upload(&mut multipart).await?;

        self.process(upload).await
    }

    /// Reject before reading when the declared body size is already too large
    pub fn check_content_length(&self, headers: &HeaderMap) -> Result<()> {
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        match declared {
            Some(len) if len > self.body_limit() as u64 => Err(ServeError::PayloadTooLarge {
                limit: self.max_upload_bytes,
            }),
            _ => Ok(()),
        }
    }

    /// Find the image part: the configured field, else the first file part
    pub async fn read_upload(&self, multipart: &mut Multipart) -> Result<Upload> {
        let limit = self.max_upload_bytes;
        let mut fallback: Option<Upload> = None;

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            let named = field.name() == Some(self.field_name.as_str());
            if !named && (fallback.is_some() || field.file_name().is_none()) {
                continue;
            }

            let content_type = field.content_type().map(str::to_string);
            let file_name = field.file_name().map(str::to_string);
            let bytes = read_field(&mut field, limit).await?;
            let upload = Upload {
                bytes,
                content_type,
                file_name,
            };

            if named {
                return non_empty(upload);
            }
            fallback = Some(upload);
        }

        match fallback {
            Some(upload) => non_empty(upload),
            None => Err(ServeError::Validation(format!(
                "Missing image file field '{}'",
                self.field_name
            ))),
        }
    }

    /// Preprocess off the async executor, archive if enabled, then predict
    pub async fn process(&self, upload: Upload) -> Result<PredictionResult> {
        let declared = upload.declared_content_type();
        let preprocessor = Arc::clone(&self.preprocessor);
        let bytes = upload.bytes.clone();
        let content_type = declared.clone();

        let tensor = tokio::task::spawn_blocking(move || {
            preprocessor.preprocess(&bytes, content_type.as_deref())
        })
        .await
        .map_err(|e| ServeError::Inference(format!("Preprocessing task failed: {}", e)))??;

        let format = declared.as_deref().and_then(UploadFormat::from_content_type);
        if let (Some(archive), Some(format)) = (&self.archive, format) {
            archive.store_detached(upload.bytes, format);
        }

        self.engine.predict(tensor).await
    }
}

async fn read_field(field: &mut Field<'_>, limit: usize) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
        if buf.len() + chunk.len() > limit {
            return Err(ServeError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

fn non_empty(upload: Upload) -> Result<Upload> {
    if upload.bytes.is_empty() {
        return Err(ServeError::Validation("Uploaded file is empty".to_string()));
    }
    Ok(upload)
}

fn multipart_error(err: MultipartError, limit: usize) -> ServeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServeError::PayloadTooLarge { limit }
    } else {
        ServeError::Validation(format!("Malformed multipart body: {}", err.body_text()))
    }
}
