//! Transfer engine
//!
//! Direct multipart upload to the object store endpoint named by the
//! credential. The body is streamed in chunks so progress can be reported as
//! hyper pulls bytes off the stream. Each attempt is bounded by its own
//! timeout and races the item's cancellation token.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use shutter_core::{
    Credential, ObjectUploader, ProgressFn, RemoteObject, TransferError, TransferRequest,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{classify_reqwest_error, error_for_status, read_json, send};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Accepts both the generic and the provider-specific response field names.
#[derive(Deserialize)]
struct UploadResponse {
    #[serde(alias = "secure_url")]
    url: Option<String>,
    #[serde(alias = "public_id", alias = "objectId")]
    object_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HttpTransferEngine {
    client: Client,
    timeout: Duration,
    chunk_size: usize,
}

impl HttpTransferEngine {
    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        let client = Client::builder()
            .build()
            .map_err(|e| classify_reqwest_error(&e))?;
        Ok(Self {
            client,
            timeout,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn build_form(
        &self,
        request: TransferRequest,
        credential: &Credential,
        progress: ProgressFn,
    ) -> Result<Form, TransferError> {
        let total = request.data.len() as u64;
        let chunks = split_chunks(&request.data, self.chunk_size);

        let mut sent = 0u64;
        let body_stream = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            progress(sent, total);
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let file = Part::stream_with_length(Body::wrap_stream(body_stream), total)
            .file_name(request.file_name)
            .mime_str(&request.content_type)
            .map_err(|e| TransferError::Client {
                status: 0,
                message: format!("Invalid content type: {}", e),
            })?;

        Ok(Form::new()
            .text("api_key", credential.account_id.clone())
            .text("timestamp", credential.timestamp.to_string())
            .text("folder", credential.folder.clone())
            .text("public_id", credential.object_id.clone())
            .text("signature", credential.signature.clone())
            .part("file", file))
    }

    async fn attempt(
        &self,
        request: TransferRequest,
        credential: &Credential,
        progress: ProgressFn,
    ) -> Result<RemoteObject, TransferError> {
        let form = self.build_form(request, credential, progress)?;
        let response = send(
            self.client
                .post(&credential.upload_endpoint)
                .multipart(form),
        )
        .await?;
        let response = error_for_status(response).await?;
        let status = response.status().as_u16();
        let body: UploadResponse = read_json(response).await?;

        match (body.url, body.object_id) {
            (Some(url), Some(object_id)) if !url.is_empty() && !object_id.is_empty() => {
                Ok(RemoteObject { url, object_id })
            }
            _ => Err(TransferError::Server {
                status,
                message: "Upload response is missing url or object id".to_string(),
            }),
        }
    }
}

fn split_chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(data.len() / chunk_size.max(1) + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + chunk_size).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    chunks
}

#[async_trait]
impl ObjectUploader for HttpTransferEngine {
    async fn upload(
        &self,
        request: TransferRequest,
        credential: &Credential,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<RemoteObject, TransferError> {
        let size = request.data.len();
        let start = std::time::Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Aborted),
            outcome = tokio::time::timeout(self.timeout, self.attempt(request, credential, progress)) => {
                outcome.unwrap_or(Err(TransferError::Timeout))
            }
        };

        match &result {
            Ok(remote) => tracing::debug!(
                object_id = %remote.object_id,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Transfer completed"
            ),
            Err(e) => tracing::debug!(
                object_id = %credential.object_id,
                error = %e,
                "Transfer attempt failed"
            ),
        }

        result
    }
}
