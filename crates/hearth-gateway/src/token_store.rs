use std::path::{Path, PathBuf};

use anyhow::Result;
use dashmap::DashSet;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Capability over the token issuance log.
///
/// Contract: `append` must be durable before it returns, and a `contains`
/// issued strictly after an `append` returned must see that token
/// (read-after-write within the process). Presence is the sole authority:
/// a token absent from the store is invalid no matter what it decodes to.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    async fn append(&self, token: &str) -> Result<()>;
    async fn contains(&self, token: &str) -> Result<bool>;
}

/// Append-only plaintext log, one token per line.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes concurrent appends so lines never interleave.
    append_lock: Mutex<()>,
}

impl FileTokenStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            path,
            append_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn append(&self, token: &str) -> Result<()> {
        let _guard = self.append_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{token}\n").as_bytes()).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(content.lines().any(|line| line == token))
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    set: DashSet<String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a token from the store. Removal revokes: the token keeps
    /// decoding but stops validating.
    pub fn revoke(&self, token: &str) -> bool {
        self.set.remove(token).is_some()
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn append(&self, token: &str) -> Result<()> {
        self.set.insert(token.to_string());
        Ok(())
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        Ok(self.set.contains(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_read_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(dir.path().join("tokens.log"))
            .await
            .unwrap();

        assert!(!store.contains("ht1.s.1.0.a").await.unwrap());
        store.append("ht1.s.1.0.a").await.unwrap();
        assert!(store.contains("ht1.s.1.0.a").await.unwrap());
        assert!(!store.contains("ht1.s.1.0.b").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_is_one_token_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.log");
        let store = FileTokenStore::open(&path).await.unwrap();

        store.append("first").await.unwrap();
        store.append("second").await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "first\nsecond\n");
        // A line is only a hit on exact match.
        assert!(!store.contains("fir").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_appends_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.log");
        let store = std::sync::Arc::new(FileTokenStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(&format!("token-{i:04}")).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines.len(), 32);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(*line, format!("token-{i:04}"));
        }
    }

    #[tokio::test]
    async fn memory_store_revocation() {
        let store = MemoryTokenStore::new();
        store.append("t").await.unwrap();
        assert!(store.contains("t").await.unwrap());
        assert!(store.revoke("t"));
        assert!(!store.contains("t").await.unwrap());
    }
}
