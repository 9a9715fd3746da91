use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MIRROR_ROOT: &str = "temp";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Settings for opening a point cloud.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Directory under which remote clouds are mirrored, one subdirectory per cloud.
    pub mirror_root: PathBuf,
    /// Timeout for a single remote request; 0 waits forever.
    pub request_timeout_secs: u64,
    /// Translate the cloud so the center of its bounding box is the origin.
    pub move_to_origin: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            mirror_root: PathBuf::from(DEFAULT_MIRROR_ROOT),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            move_to_origin: false,
        }
    }
}

impl LoaderConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_mirror_root(mut self, mirror_root: impl AsRef<Path>) -> Self {
        self.mirror_root = mirror_root.as_ref().to_path_buf();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_move_to_origin(mut self, move_to_origin: bool) -> Self {
        self.move_to_origin = move_to_origin;
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Local directory mirroring the remote cloud `cloud_name`.
    pub fn mirror_path(&self, cloud_name: &str) -> PathBuf {
        self.mirror_root.join(cloud_name)
    }
}
