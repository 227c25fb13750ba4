//! Domain models for the upload pipeline.

pub mod credential;
pub mod item;
pub mod network;
pub mod session;

pub use credential::{Credential, RemoteObject};
pub use item::{ItemPatch, UploadItem, UploadStatus};
pub use network::{ConnectionClass, NetworkHints, NetworkProfile};
pub use session::{SessionKey, SessionRecord};
