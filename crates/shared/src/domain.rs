use serde::{Deserialize, Serialize};

/// Generation tag for one session attempt. Strictly increasing for the
/// lifetime of a controller.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    RemoteStream,
}

/// Where the service should read frames from: a device index for local
/// cameras, a stream URI for RTSP cameras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceLocator {
    DeviceIndex(u32),
    StreamUri(String),
}

impl SourceLocator {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::DeviceIndex(_) => SourceKind::Local,
            Self::StreamUri(_) => SourceKind::RemoteStream,
        }
    }
}

impl std::fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceIndex(index) => write!(f, "device:{index}"),
            Self::StreamUri(uri) => f.write_str(uri),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub display_label: String,
    pub locator: SourceLocator,
}

impl Source {
    pub fn local(id: impl Into<String>, display_label: impl Into<String>, index: u32) -> Self {
        Self {
            id: SourceId::new(id),
            display_label: display_label.into(),
            locator: SourceLocator::DeviceIndex(index),
        }
    }

    pub fn remote_stream(
        id: impl Into<String>,
        display_label: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            id: SourceId::new(id),
            display_label: display_label.into(),
            locator: SourceLocator::StreamUri(uri.into()),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.locator.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    /// Percentage in `[0, 100]`.
    pub confidence: f64,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f64) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
        }
    }

    pub fn has_valid_confidence(&self) -> bool {
        (0.0..=100.0).contains(&self.confidence)
    }
}
