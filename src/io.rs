use std::path::{Component, Path, PathBuf};

use anyhow::bail;
use async_trait::async_trait;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use tokio::fs::{create_dir_all, remove_file, try_exists, File};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Storage namespace an uploaded image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Portofolio,
    Certifikat,
}

impl Purpose {
    pub const ALL: [Purpose; 2] = [Purpose::Portofolio, Purpose::Certifikat];

    pub fn namespace(self) -> &'static str {
        match self {
            Purpose::Portofolio => "portofolios",
            Purpose::Certifikat => "certifikats",
        }
    }
}

/// Where uploaded images live. Paths handed out by `store` are relative to the store
/// and are what gets persisted on the student row.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn store(&self, purpose: Purpose, bytes: &[u8], extension: &str)
        -> anyhow::Result<String>;

    async fn exists(&self, path: &str) -> anyhow::Result<bool>;

    async fn delete(&self, path: &str) -> anyhow::Result<()>;

    /// Absolute public URL for a stored path; `None` for an absent or empty path.
    fn url_for(&self, path: Option<&str>) -> Option<String>;
}

pub struct LocalFileStore {
    root: PathBuf,
    public_url: String,
}

impl LocalFileStore {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(root: P, public_url: S) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            bail!("Refusing to touch path outside of the storage root: `{}`", path)
        }
        Ok(self.root.join(relative))
    }
}

pub async fn prepare_io(store: &LocalFileStore) -> anyhow::Result<()> {
    for purpose in Purpose::ALL {
        create_dir_all(store.root.join(purpose.namespace())).await?;
    }
    Ok(())
}

pub async fn create_io_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }
    if try_exists(path).await? {
        bail!("File already exists!")
    }
    File::create(path).await.map_err(anyhow::Error::from)
}

/// Opaque 64 character hex name, never derived from anything the client sent.
fn generate_name() -> String {
    let name_bytes: [u8; 32] = thread_rng().gen();

    let mut hasher: Sha256 = Digest::new();
    hasher.update(name_bytes);
    hex::encode(hasher.finalize())
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(
        &self,
        purpose: Purpose,
        bytes: &[u8],
        extension: &str,
    ) -> anyhow::Result<String> {
        let relative = format!("{}/{}.{}", purpose.namespace(), generate_name(), extension);
        let file = create_io_file(&self.resolve(&relative)?).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).await?;
        writer.flush().await?;
        log::debug!("stored {} bytes at {}", bytes.len(), relative);
        Ok(relative)
    }

    async fn exists(&self, path: &str) -> anyhow::Result<bool> {
        Ok(try_exists(self.resolve(path)?).await?)
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        remove_file(self.resolve(path)?).await?;
        log::debug!("deleted {}", path);
        Ok(())
    }

    fn url_for(&self, path: Option<&str>) -> Option<String> {
        match path {
            Some(path) if !path.is_empty() => {
                Some(format!("{}/storage/{}", self.public_url, path))
            }
            _ => None,
        }
    }
}
