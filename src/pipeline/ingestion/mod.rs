// Pipeline ingestion: fetch or read one raw artifact and archive it verbatim

pub mod http_fetch;

use std::fs;
use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::domain::{RawArtifact, SourceKind};
use crate::error::{PipelineError, Result};
use crate::metrics;
use crate::pipeline::storage::RawStore;

pub use http_fetch::{Fetcher, HttpFetcher};

/// Where the bytes of an artifact come from
#[derive(Debug, Clone)]
pub enum Payload {
    Url(String),
    File(PathBuf),
    Inline { file_name: String, data: Vec<u8> },
}

/// One ingest call as received from the trigger boundary
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub kind: SourceKind,
    pub payload: Payload,
    pub api_key: Option<String>,
}

impl IngestRequest {
    pub fn remote(kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            payload: Payload::Url(url.into()),
            api_key: None,
        }
    }

    pub fn upload(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            payload: Payload::File(path.into()),
            api_key: None,
        }
    }

    pub fn inline(kind: SourceKind, file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind,
            payload: Payload::Inline {
                file_name: file_name.into(),
                data,
            },
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Network kinds need a URL; every upload kind needs a file
    pub fn validate(&self) -> Result<()> {
        match (&self.payload, self.kind.is_remote()) {
            (Payload::Url(url), true) if !url.trim().is_empty() => Ok(()),
            (Payload::Url(_), true) => Err(PipelineError::InvalidInput(format!(
                "{} source requires a non-empty URL",
                self.kind
            ))),
            (Payload::Url(_), false) => Err(PipelineError::InvalidInput(format!(
                "{} source requires an uploaded file, not a URL",
                self.kind
            ))),
            (_, true) => Err(PipelineError::InvalidInput(format!(
                "{} source requires a URL",
                self.kind
            ))),
            (_, false) => Ok(()),
        }
    }
}

/// Turns ingest requests into archived raw artifacts
pub struct Ingestor<'a> {
    fetcher: &'a dyn Fetcher,
    store: &'a RawStore,
}

impl<'a> Ingestor<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, store: &'a RawStore) -> Self {
        Self { fetcher, store }
    }

    /// Fetch or read the payload and archive it. An unreachable URL or an
    /// unreadable upload is logged and yields `None`; only a failure to write
    /// the raw store is an error.
    #[instrument(skip_all, fields(kind = %request.kind))]
    pub async fn ingest(&self, request: &IngestRequest) -> Result<Option<RawArtifact>> {
        request.validate()?;

        let artifact = match &request.payload {
            Payload::Url(url) => match self.fetcher.get(url, request.api_key.as_deref()).await {
                Ok(body) => RawArtifact::new(request.kind, body, None),
                Err(e) => {
                    warn!(url = %url, error = %e, "Fetch failed; source yields no records");
                    metrics::ingest::fetch_error(request.kind.tag());
                    return Ok(None);
                }
            },
            Payload::File(path) => match fs::read(path) {
                Ok(data) => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned());
                    RawArtifact::new(request.kind, data, file_name)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Upload could not be read");
                    metrics::ingest::fetch_error(request.kind.tag());
                    return Ok(None);
                }
            },
            Payload::Inline { file_name, data } => {
                RawArtifact::new(request.kind, data.clone(), Some(file_name.clone()))
            }
        };

        let path = self.store.save(&artifact)?;
        metrics::ingest::artifact_stored(request.kind.tag());
        info!(
            path = %path.display(),
            bytes = artifact.payload.len(),
            "Artifact ingested"
        );
        Ok(Some(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct CannedFetcher(Option<&'static str>);

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn get(&self, _url: &str, _api_key: Option<&str>) -> Result<Vec<u8>> {
            self.0
                .map(|body| body.as_bytes().to_vec())
                .ok_or_else(|| PipelineError::InvalidInput("offline".to_string()))
        }
    }

    #[test]
    fn validates_payload_against_kind() {
        assert!(IngestRequest::remote(SourceKind::LiveApi, "https://x").validate().is_ok());
        assert!(IngestRequest::remote(SourceKind::LiveApi, " ").validate().is_err());
        assert!(IngestRequest::remote(SourceKind::Pdf, "https://x").validate().is_err());
        assert!(IngestRequest::upload(SourceKind::Scrape, "a.html").validate().is_err());
        assert!(IngestRequest::upload(SourceKind::Json, "a.json").validate().is_ok());
    }

    #[test]
    fn blank_api_key_is_dropped() {
        let request = IngestRequest::remote(SourceKind::LiveApi, "https://x")
            .with_api_key(Some("  ".to_string()));
        assert!(request.api_key.is_none());
    }

    #[tokio::test]
    async fn fetched_body_is_archived() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let fetcher = CannedFetcher(Some(r#"[{"a": 1}]"#));
        let ingestor = Ingestor::new(&fetcher, &store);

        let artifact = ingestor
            .ingest(&IngestRequest::remote(SourceKind::LiveApi, "https://x"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(artifact.payload, br#"[{"a": 1}]"#);
        assert!(store.latest(SourceKind::LiveApi).unwrap().is_some());
    }

    #[tokio::test]
    async fn fetch_failure_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let fetcher = CannedFetcher(None);
        let ingestor = Ingestor::new(&fetcher, &store);

        let artifact = ingestor
            .ingest(&IngestRequest::remote(SourceKind::Scrape, "https://x"))
            .await
            .unwrap();
        assert!(artifact.is_none());
        assert!(store.latest(SourceKind::Scrape).unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_upload_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path().join("raw"));
        let fetcher = CannedFetcher(None);
        let ingestor = Ingestor::new(&fetcher, &store);

        let request = IngestRequest::upload(SourceKind::UserTableUpload, dir.path().join("missing.csv"));
        assert!(ingestor.ingest(&request).await.unwrap().is_none());
    }
}
