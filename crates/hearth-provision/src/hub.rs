use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use hearth_common::{DownloadError, ModelEntry, ModelFootprint};

/// Client against a Hugging Face style model hub.
#[derive(Debug, Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<RepoFile>,
}

#[derive(Debug, Deserialize)]
struct RepoFile {
    rfilename: String,
}

impl HubClient {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// List repository files and keep the ones belonging to the requested
    /// quantization variant.
    pub async fn list_matching_files(
        &self,
        entry: &ModelEntry,
    ) -> Result<Vec<String>, DownloadError> {
        let url = format!("{}/api/models/{}", self.base_url, entry.repo_id);
        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| DownloadError::ListFailed {
                repo_id: entry.repo_id.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(DownloadError::ListFailed {
                repo_id: entry.repo_id.clone(),
                reason: format!("hub returned status {}", resp.status()),
            });
        }

        let info: RepoInfo = resp.json().await.map_err(|e| DownloadError::ListFailed {
            repo_id: entry.repo_id.clone(),
            reason: e.to_string(),
        })?;

        let names: Vec<String> = info.siblings.into_iter().map(|f| f.rfilename).collect();
        let matched = filter_quantized(&names, &entry.quantization);
        tracing::info!(
            repo=%entry.repo_id,
            quantization=%entry.quantization,
            matched = matched.len(),
            "listed repository files"
        );

        if matched.is_empty() {
            return Err(DownloadError::NoMatchingFiles {
                repo_id: entry.repo_id.clone(),
                quantization: entry.quantization.clone(),
            });
        }
        Ok(matched)
    }

    /// Download every artifact of the entry into `target_dir`, skipping
    /// files already present. Returns the local paths. Any failure aborts
    /// the run: a partially provisioned model is worse than none.
    pub async fn download_model(
        &self,
        entry: &ModelEntry,
        target_dir: &Path,
    ) -> Result<Vec<PathBuf>, DownloadError> {
        let files = self.list_matching_files(entry).await?;

        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|e| DownloadError::Io {
                path: target_dir.display().to_string(),
                source: e,
            })?;

        let mut paths = Vec::with_capacity(files.len());
        for filename in &files {
            paths.push(self.download_file(entry, filename, target_dir).await?);
        }
        Ok(paths)
    }

    async fn download_file(
        &self,
        entry: &ModelEntry,
        filename: &str,
        target_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        // Repo paths may contain directories; artifacts land flat.
        let basename = filename.rsplit('/').next().unwrap_or(filename);
        let target = target_dir.join(basename);

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tracing::info!(path=%target.display(), "artifact already present, skipping");
            return Ok(target);
        }

        tracing::info!(repo=%entry.repo_id, file=%filename, "downloading artifact");
        let url = format!(
            "{}/{}/resolve/main/{}",
            self.base_url, entry.repo_id, filename
        );
        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| DownloadError::FetchFailed {
                repo_id: entry.repo_id.clone(),
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(DownloadError::FetchFailed {
                repo_id: entry.repo_id.clone(),
                filename: filename.to_string(),
                reason: format!("hub returned status {}", resp.status()),
            });
        }

        // Stream to a partial file, rename only when complete.
        let partial = target_dir.join(format!("{basename}.part"));
        let io_err = |e: std::io::Error| DownloadError::Io {
            path: partial.display().to_string(),
            source: e,
        };

        let mut file = tokio::fs::File::create(&partial).await.map_err(io_err)?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::FetchFailed {
                repo_id: entry.repo_id.clone(),
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;
            file.write_all(&chunk).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| DownloadError::Io {
                path: target.display().to_string(),
                source: e,
            })?;

        tracing::info!(path=%target.display(), "artifact saved");
        Ok(target)
    }
}

/// Files belonging to a quantization variant: tag appears in the name and
/// the artifact is a GGUF shard.
pub fn filter_quantized(names: &[String], quantization: &str) -> Vec<String> {
    names
        .iter()
        .filter(|n| n.contains(quantization) && n.ends_with(".gguf"))
        .cloned()
        .collect()
}

/// Footprint for the planner: the size hint wins, otherwise the summed
/// on-disk size of the downloaded artifacts, rounded up to whole MB.
pub async fn resolve_footprint(entry: &ModelEntry, artifacts: &[PathBuf]) -> ModelFootprint {
    let footprint_mb = match entry.size_hint_mb {
        Some(mb) => mb,
        None => {
            let mut bytes: u64 = 0;
            for path in artifacts {
                match tokio::fs::metadata(path).await {
                    Ok(meta) => bytes += meta.len(),
                    Err(e) => {
                        tracing::warn!(path=%path.display(), error=%e, "missing artifact during footprint scan");
                    }
                }
            }
            bytes.div_ceil(1024 * 1024)
        }
    };

    ModelFootprint {
        repo_id: entry.repo_id.clone(),
        footprint_mb,
    }
}
