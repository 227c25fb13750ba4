//! Credential endpoint client
//!
//! `POST {prefix}/uploads/signatures` issues credentials for a chunk of object
//! ids; `POST {prefix}/uploads/signature` issues one. Both are scoped to the
//! caller's upload session and reject with 401/403 when the caller may not
//! write into it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shutter_core::{Credential, CredentialError, CredentialSource, TransferError};

use crate::{error_for_status, read_json, send, ApiClient};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSignatureRequest<'a> {
    session_id: &'a str,
    object_ids: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignatureRequest<'a> {
    session_id: &'a str,
    object_id: &'a str,
}

#[derive(Deserialize)]
struct BatchSignatureResponse {
    credentials: Vec<Credential>,
}

#[derive(Clone, Debug)]
pub struct HttpCredentialSource {
    client: ApiClient,
}

impl HttpCredentialSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn map_error(session_id: &str, err: TransferError) -> CredentialError {
        match err {
            TransferError::Client { status, .. } if status == 401 || status == 403 => {
                CredentialError::Unauthorized(session_id.to_string())
            }
            other => CredentialError::Transport(other),
        }
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch_batch(
        &self,
        session_id: &str,
        object_ids: &[String],
    ) -> Result<Vec<Credential>, CredentialError> {
        let request = self.client.post("/uploads/signatures").json(&BatchSignatureRequest {
            session_id,
            object_ids,
        });

        let response = send(request)
            .await
            .map_err(|e| Self::map_error(session_id, e))?;
        let response = error_for_status(response)
            .await
            .map_err(|e| Self::map_error(session_id, e))?;
        let body: BatchSignatureResponse = read_json(response)
            .await
            .map_err(|e| Self::map_error(session_id, e))?;

        // Only keep what was asked for.
        let credentials: Vec<Credential> = body
            .credentials
            .into_iter()
            .filter(|c| object_ids.contains(&c.object_id))
            .collect();

        tracing::debug!(
            requested = object_ids.len(),
            issued = credentials.len(),
            "Credential chunk issued"
        );

        Ok(credentials)
    }

    async fn fetch_one(
        &self,
        session_id: &str,
        object_id: &str,
    ) -> Result<Credential, CredentialError> {
        let request = self.client.post("/uploads/signature").json(&SignatureRequest {
            session_id,
            object_id,
        });

        let response = send(request)
            .await
            .map_err(|e| Self::map_error(session_id, e))?;
        let response = error_for_status(response)
            .await
            .map_err(|e| Self::map_error(session_id, e))?;
        let credential: Credential = read_json(response)
            .await
            .map_err(|e| Self::map_error(session_id, e))?;

        if credential.object_id != object_id {
            return Err(CredentialError::Missing(object_id.to_string()));
        }
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Auth;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn credential_json(object_id: &str) -> serde_json::Value {
        json!({
            "accountId": "acct",
            "timestamp": 1_700_000_000,
            "folder": "listings",
            "objectId": object_id,
            "signature": "sig",
            "uploadEndpoint": "https://store.test/upload"
        })
    }

    fn source(url: &str) -> HttpCredentialSource {
        let client = ApiClient::new(
            url,
            "v0",
            Auth::Bearer("token".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        HttpCredentialSource::new(client)
    }

    #[tokio::test]
    async fn test_fetch_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v0/uploads/signatures")
            .match_header("authorization", "Bearer token")
            .match_body(Matcher::PartialJson(json!({
                "sessionId": "s1",
                "objectIds": ["a", "b"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "credentials": [credential_json("a"), credential_json("b"), credential_json("zzz")] })
                    .to_string(),
            )
            .create_async()
            .await;

        let credentials = source(&server.url())
            .fetch_batch("s1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials[0].object_id, "a");
        assert_eq!(credentials[1].upload_endpoint, "https://store.test/upload");
    }

    #[tokio::test]
    async fn test_unauthorized_is_typed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v0/uploads/signatures")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let err = source(&server.url())
            .fetch_batch("s1", &["a".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err, CredentialError::Unauthorized("s1".into()));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v0/uploads/signature")
            .with_status(502)
            .create_async()
            .await;

        let err = source(&server.url()).fetch_one("s1", "a").await.unwrap_err();
        assert!(matches!(
            err,
            CredentialError::Transport(TransferError::Server { status: 502, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_one_rejects_mismatched_object() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v0/uploads/signature")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(credential_json("other").to_string())
            .create_async()
            .await;

        let err = source(&server.url()).fetch_one("s1", "a").await.unwrap_err();
        assert_eq!(err, CredentialError::Missing("a".into()));
    }
}
