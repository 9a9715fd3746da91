use super::file::FileClient;
use super::{ResourceClient, ResourceError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument, warn};

static PARTIAL_FILES: AtomicU64 = AtomicU64::new(0);

/// Where a cloud's files live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageContext {
    Local {
        base_path: PathBuf,
    },
    /// Files are downloaded from `base_url` and mirrored below `mirror_path`.
    Remote {
        base_url: String,
        mirror_path: PathBuf,
    },
}

impl StorageContext {
    pub fn is_remote(&self) -> bool {
        matches!(self, StorageContext::Remote { .. })
    }

    /// Directory checked first for every file of the cloud.
    pub fn local_root(&self) -> &Path {
        match self {
            StorageContext::Local { base_path } => base_path,
            StorageContext::Remote { mirror_path, .. } => mirror_path,
        }
    }

    pub fn local_path(&self, relative: &str) -> PathBuf {
        self.local_root().join(relative)
    }

    pub fn remote_url(&self, relative: &str) -> Option<String> {
        match self {
            StorageContext::Local { .. } => None,
            StorageContext::Remote { base_url, .. } => {
                Some(format!("{}/{}", base_url.trim_end_matches('/'), relative))
            }
        }
    }
}

/// Relative path of a Potree 1.x chunk file.
///
/// The address is cut into `step`-long segments, each one a directory, e.g.
/// with a step of 3 node `0123456` lives at `data/r/012/345/r0123456.bin`.
pub fn chunk_path(octree_dir: &str, address: &str, step: usize, extension: &str) -> String {
    let mut path = String::new();
    let octree_dir = octree_dir.trim_end_matches('/');
    if !octree_dir.is_empty() {
        path.push_str(octree_dir);
        path.push('/');
    }
    path.push_str("r/");

    if step > 0 {
        for level in 0..address.len() / step {
            path.push_str(&address[level * step..(level + 1) * step]);
            path.push('/');
        }
    }

    path.push('r');
    path.push_str(address);
    path.push_str(extension);
    path
}

/// Writes `bytes` next to `path` under a unique name, then renames it into
/// place. Readers of the mirror see either no file or the complete one.
async fn write_mirror_file(path: &Path, bytes: &[u8]) -> Result<(), ResourceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = path.with_file_name(format!(
        "{}.{}-{}.part",
        file_name,
        std::process::id(),
        PARTIAL_FILES.fetch_add(1, Ordering::Relaxed)
    ));

    let written = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(error) => Err(error),
    };
    if let Err(error) = written {
        warn!(path = %path.display(), %error, "could not mirror file");
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(error.into());
    }
    Ok(())
}

/// Byte access to the files of one cloud, local first and remote second.
pub struct DataFetcher<C: ResourceClient> {
    storage: StorageContext,
    local: FileClient,
    remote: C,
}

impl<C: ResourceClient> DataFetcher<C> {
    pub fn new(storage: StorageContext, remote: C) -> Self {
        Self {
            storage,
            local: FileClient,
            remote,
        }
    }

    pub fn storage(&self) -> &StorageContext {
        &self.storage
    }

    /// Reads a whole file. Remote files are downloaded once into the mirror
    /// and served from there afterwards.
    #[instrument(skip(self))]
    pub async fn fetch(&self, relative: &str) -> Result<Vec<u8>, ResourceError> {
        let path = self.storage.local_path(relative);
        if tokio::fs::try_exists(&path).await? {
            return self.local.read_file(&path).await;
        }

        let Some(url) = self.storage.remote_url(relative) else {
            return Err(ResourceError::NotFound(path.display().to_string()));
        };

        debug!(%url, "downloading into mirror");
        let bytes = self.remote.get(&url, None).await?;
        write_mirror_file(&path, &bytes).await?;

        Ok(bytes)
    }

    /// Loads the chunk file of a Potree 1.x node, `.hrc` or `.bin`.
    pub async fn find_and_load_chunk(
        &self,
        octree_dir: &str,
        address: &str,
        step: usize,
        extension: &str,
    ) -> Result<Vec<u8>, ResourceError> {
        self.fetch(&chunk_path(octree_dir, address, step, extension))
            .await
    }

    /// Reads `size` bytes at `offset` of a shared file such as `octree.bin`.
    ///
    /// An empty range returns immediately. A remote read returns fewer bytes
    /// when the response ends early; callers compare the length.
    #[instrument(skip(self))]
    pub async fn read_range(
        &self,
        resource: &str,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, ResourceError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let size = usize::try_from(size)
            .map_err(|_| ResourceError::Other(format!("Range of {} bytes is too large", size)))?;

        let path = self.storage.local_path(resource);
        match self.storage.remote_url(resource) {
            None => self.local.read_file_range(&path, offset, size).await,
            Some(url) => {
                if tokio::fs::try_exists(&path).await? {
                    return self.local.read_file_range(&path, offset, size).await;
                }
                self.remote.get_range(&url, offset, size, None).await
            }
        }
    }
}
