//! Per-connection server state.
//!
//! A [`Session`] is built on `initialize` from the client's options and owns
//! everything that outlives a single request: the source-root registry, the
//! parse cache and the diagnostics publisher.

use crate::cache::{ParseCache, ParseHandle};
use crate::config::JmlConfig;
use crate::publisher::{DiagnosticSink, DiagnosticsPublisher};
use dashmap::DashMap;
use jml_core::{FileIdentity, ParserAdapter, Result, SourceParser, SourceRootRegistry};
use std::sync::Arc;
use tower_lsp_server::ls_types::{DocumentDiagnosticReportResult, Uri};

pub struct Session {
    config: JmlConfig,
    roots: Arc<SourceRootRegistry>,
    publisher: Arc<DiagnosticsPublisher>,
    cache: ParseCache,
    /// Resolved identities of URIs seen so far, so the filesystem lookup
    /// behind [`FileIdentity::from_uri`] runs once per URI rather than on
    /// every notification.
    identities: DashMap<Uri, FileIdentity>,
}

impl Session {
    pub fn new(
        config: JmlConfig,
        sink: Arc<dyn DiagnosticSink>,
        parser: Arc<dyn SourceParser>,
    ) -> Self {
        let roots = Arc::new(SourceRootRegistry::new());
        let adapter = Arc::new(ParserAdapter::new(parser, Arc::clone(&roots)));
        let publisher = Arc::new(DiagnosticsPublisher::new(
            sink,
            config.diagnostic_source.clone(),
            config.log_parses,
        ));
        let cache = ParseCache::new(adapter, Arc::clone(&publisher), &config);

        Self {
            config,
            roots,
            publisher,
            cache,
            identities: DashMap::new(),
        }
    }

    fn identity(&self, uri: &Uri) -> Result<FileIdentity> {
        if let Some(id) = self.identities.get(uri) {
            return Ok(id.clone());
        }
        let id = FileIdentity::from_uri(uri)?;
        self.identities.insert(uri.clone(), id.clone());
        Ok(id)
    }

    pub fn config(&self) -> &JmlConfig {
        &self.config
    }

    pub fn cache(&self) -> &ParseCache {
        &self.cache
    }

    pub fn source_roots(&self) -> &Arc<SourceRootRegistry> {
        &self.roots
    }

    /// Starts tracking a document opened in the editor.
    ///
    /// Returns `Ok(None)` when the language id is not handled.
    pub fn open(&self, uri: &Uri, language_id: &str, text: String) -> Result<Option<ParseHandle>> {
        if !self.config.accepts_language(language_id) {
            tracing::debug!("ignoring {:?} with language id {}", uri, language_id);
            return Ok(None);
        }

        let id = self.identity(uri)?;
        tracing::info!("document opened: {}", id);
        self.cache.update_document(id, uri.clone(), text).map(Some)
    }

    /// Replaces the text of an open document. Unknown documents are ignored.
    pub fn change(&self, uri: &Uri, text: String) -> Result<Option<ParseHandle>> {
        let id = self.identity(uri)?;
        if !self.cache.is_open(&id) {
            return Ok(None);
        }
        self.cache.update_document(id, uri.clone(), text).map(Some)
    }

    /// Reparses an open document after a save, with the saved text if the
    /// client sent it.
    pub fn save(&self, uri: &Uri, text: Option<String>) -> Result<Option<ParseHandle>> {
        let id = self.identity(uri)?;
        if !self.cache.is_open(&id) {
            return Ok(None);
        }

        match text {
            Some(text) => self.cache.update_document(id, uri.clone(), text).map(Some),
            None => self.cache.request_parse(&id).map(Some),
        }
    }

    pub fn close(&self, uri: &Uri) -> Result<()> {
        let id = self.identity(uri)?;
        tracing::info!("document closed: {}", id);
        self.cache.close_document(&id);
        self.identities.remove(uri);
        Ok(())
    }

    /// Pull diagnostics for `uri`, parsing it first if needed.
    pub async fn diagnostic_report(
        &self,
        uri: &Uri,
        previous_result_id: Option<&str>,
    ) -> Result<DocumentDiagnosticReportResult> {
        let id = self.identity(uri)?;
        let snapshot = self.cache.snapshot(&id).await?;
        Ok(self
            .publisher
            .to_diagnostic_report(&snapshot, previous_result_id))
    }

    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}
