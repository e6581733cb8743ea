//! Diagnostics publishing.
//!
//! Converts parse problems into LSP diagnostics. The same conversion backs
//! both the push path (`textDocument/publishDiagnostics` after a background
//! parse) and the pull path (`textDocument/diagnostic`), so the two can never
//! disagree.

use crate::cache::ParseSnapshot;
use async_trait::async_trait;
use jml_core::{FileIdentity, ParseOutcome, Problem, Result};
use std::sync::Arc;
use tower_lsp_server::Client;
use tower_lsp_server::ls_types::{
    Diagnostic, DiagnosticSeverity, DocumentDiagnosticReport, DocumentDiagnosticReportResult,
    FullDocumentDiagnosticReport, MessageType, RelatedFullDocumentDiagnosticReport,
    RelatedUnchangedDocumentDiagnosticReport, UnchangedDocumentDiagnosticReport, Uri,
};

/// Outbound channel to the editor.
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    async fn publish_diagnostics(&self, uri: Uri, diagnostics: Vec<Diagnostic>) -> Result<()>;

    async fn log_message(&self, message: String);
}

#[async_trait]
impl DiagnosticSink for Client {
    async fn publish_diagnostics(&self, uri: Uri, diagnostics: Vec<Diagnostic>) -> Result<()> {
        Client::publish_diagnostics(self, uri, diagnostics, None).await;
        Ok(())
    }

    async fn log_message(&self, message: String) {
        Client::log_message(self, MessageType::LOG, message).await;
    }
}

pub struct DiagnosticsPublisher {
    sink: Arc<dyn DiagnosticSink>,
    source: String,
    log_parses: bool,
}

impl DiagnosticsPublisher {
    pub fn new(sink: Arc<dyn DiagnosticSink>, source: impl Into<String>, log_parses: bool) -> Self {
        Self {
            sink,
            source: source.into(),
            log_parses,
        }
    }

    pub fn to_diagnostic(&self, problem: &Problem) -> Diagnostic {
        Diagnostic {
            range: problem.lsp_range(),
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some(self.source.clone()),
            message: problem.message.clone(),
            ..Default::default()
        }
    }

    /// One diagnostic per problem, in order.
    pub fn to_diagnostics(&self, problems: &[Problem]) -> Vec<Diagnostic> {
        problems.iter().map(|p| self.to_diagnostic(p)).collect()
    }

    /// Pushes the diagnostics of a freshly stored outcome.
    ///
    /// Diagnostics go to `uri`, the URI the client opened the document under,
    /// or to the URI of `id` for documents the client never opened.
    /// Successful parses push an empty list so earlier errors disappear from
    /// the editor. Delivery failures are logged and otherwise ignored.
    pub async fn publish(&self, id: &FileIdentity, uri: Option<Uri>, outcome: &ParseOutcome) {
        let Some(uri) = uri.or_else(|| id.to_uri()) else {
            tracing::warn!("cannot build a URI for {}, not publishing", id);
            return;
        };

        let diagnostics = self.to_diagnostics(outcome.problems());
        tracing::debug!("publishing {} diagnostic(s) for {}", diagnostics.len(), id);

        if let Err(e) = self.sink.publish_diagnostics(uri, diagnostics).await {
            tracing::warn!("{}", e);
        }

        if outcome.is_success() && self.log_parses {
            self.sink.log_message(format!("{} parsed", id)).await;
        }
    }

    /// Pull-diagnostics report for `snapshot`.
    ///
    /// The revision doubles as the report's `resultId`; if the client already
    /// holds that revision an unchanged report is returned.
    pub fn to_diagnostic_report(
        &self,
        snapshot: &ParseSnapshot,
        previous_result_id: Option<&str>,
    ) -> DocumentDiagnosticReportResult {
        let result_id = snapshot.revision.to_string();

        let report = if previous_result_id == Some(result_id.as_str()) {
            DocumentDiagnosticReport::Unchanged(RelatedUnchangedDocumentDiagnosticReport {
                related_documents: None,
                unchanged_document_diagnostic_report: UnchangedDocumentDiagnosticReport {
                    result_id,
                },
            })
        } else {
            DocumentDiagnosticReport::Full(RelatedFullDocumentDiagnosticReport {
                related_documents: None,
                full_document_diagnostic_report: FullDocumentDiagnosticReport {
                    result_id: Some(result_id),
                    items: self.to_diagnostics(snapshot.outcome.problems()),
                },
            })
        };

        DocumentDiagnosticReportResult::Report(report)
    }
}
