use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{domain::Source, protocol::ClientCommand};

pub mod controller;
pub mod delivery;
pub mod devices;
pub mod epoch;
pub mod error;
pub mod projection;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod upload;

pub use controller::{
    DetectionSessionController, InboundOutcome, Outcome, ProtocolAnomaly, Rejection,
    SessionIntent, SessionSnapshot, VideoInput,
};
pub use delivery::DiskFileDelivery;
pub use devices::ConfiguredDevices;
pub use epoch::EpochGuard;
pub use error::{ChannelError, SessionError};
pub use projection::{project, PreviewImage, PriorityClasses, SessionView};
pub use runtime::{RuntimeEvent, RuntimeOptions, SessionHandle, SessionRequest};
pub use session::{Session, SessionMode, SessionStatus, SourceRef};
pub use transport::WsEventChannel;
pub use upload::HttpUploadTransport;

/// Outbound half of the connection to the detection service.
///
/// Sends never block: implementations queue the command and report at once
/// whether it could be queued.
pub trait EventChannel: Send + Sync {
    fn send(&self, command: ClientCommand) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Uploads a local video and returns the path the service can read it from.
    async fn upload(&self, local_path: &Path) -> Result<String>;
}

pub struct MissingUploadTransport;

#[async_trait]
impl UploadTransport for MissingUploadTransport {
    async fn upload(&self, local_path: &Path) -> Result<String> {
        Err(anyhow!(
            "upload transport is unavailable for {}",
            local_path.display()
        ))
    }
}

#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<Source>>;
}

#[async_trait]
pub trait FileDelivery: Send + Sync {
    /// Saves a rendered artifact and returns where it ended up.
    async fn deliver(&self, filename: &str, payload: &[u8]) -> Result<PathBuf>;
}
