use super::{ResourceClient, ResourceError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Reads local files, addressed either as plain paths or `file://` urls.
#[derive(Clone, Debug, Default)]
pub struct FileClient;

fn local_path(url: &str) -> Result<&Path, ResourceError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Err(ResourceError::Unsupported(
            "This client supports only local paths and file:// urls.".to_string(),
        ));
    }
    Ok(Path::new(url.strip_prefix("file://").unwrap_or(url)))
}

fn map_io_error(path: &Path, error: std::io::Error) -> ResourceError {
    if error.kind() == ErrorKind::NotFound {
        ResourceError::NotFound(path.display().to_string())
    } else {
        ResourceError::File(error)
    }
}

impl FileClient {
    pub async fn read_file(&self, path: &Path) -> Result<Vec<u8>, ResourceError> {
        tokio::fs::read(path)
            .await
            .map_err(|error| map_io_error(path, error))
    }

    /// Reads at most `length` bytes; the result is shorter when the file ends first.
    pub async fn read_file_range(
        &self,
        path: &Path,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, ResourceError> {
        if length == 0 {
            return Ok(Vec::new());
        }

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|error| map_io_error(path, error))?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut bytes = Vec::with_capacity(length);
        file.take(length as u64).read_to_end(&mut bytes).await?;
        Ok(bytes)
    }
}

#[async_trait]
impl ResourceClient for FileClient {
    async fn get(
        &self,
        url: &str,
        _headers: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<u8>, ResourceError> {
        self.read_file(local_path(url)?).await
    }

    async fn get_range(
        &self,
        url: &str,
        offset: u64,
        length: usize,
        _headers: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<u8>, ResourceError> {
        self.read_file_range(local_path(url)?, offset, length).await
    }
}
