use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Short-lived, per-object signed authorization to write directly to the
/// remote object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub account_id: String,
    /// Unix seconds at which the signature was issued.
    pub timestamp: i64,
    pub folder: String,
    pub object_id: String,
    pub signature: String,
    pub upload_endpoint: String,
}

impl Credential {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }

    /// A credential may be reused across retries of the same object while it
    /// is younger than `validity`.
    pub fn is_fresh(&self, validity: Duration, now: DateTime<Utc>) -> bool {
        let Some(issued_at) = self.issued_at() else {
            return false;
        };
        match chrono::Duration::from_std(validity) {
            Ok(validity) => now - issued_at < validity,
            Err(_) => true,
        }
    }
}

/// Durable reference returned by the object store for a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteObject {
    pub url: String,
    pub object_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(timestamp: i64) -> Credential {
        Credential {
            account_id: "acct".to_string(),
            timestamp,
            folder: "listings".to_string(),
            object_id: "obj".to_string(),
            signature: "sig".to_string(),
            upload_endpoint: "https://upload.example.com".to_string(),
        }
    }

    #[test]
    fn test_credential_freshness() {
        let now = Utc::now();
        let fresh = credential(now.timestamp() - 60);
        let stale = credential(now.timestamp() - 3600);

        assert!(fresh.is_fresh(Duration::from_secs(600), now));
        assert!(!stale.is_fresh(Duration::from_secs(600), now));
    }

    #[test]
    fn test_credential_deserializes_camel_case() {
        let json = r#"{
            "accountId": "acct",
            "timestamp": 1700000000,
            "folder": "f",
            "objectId": "o",
            "signature": "s",
            "uploadEndpoint": "https://u"
        }"#;
        let credential: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(credential.object_id, "o");
        assert_eq!(credential.upload_endpoint, "https://u");
    }
}
