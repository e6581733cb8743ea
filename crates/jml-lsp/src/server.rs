use crate::config::JmlConfig;
use crate::session::Session;
use jml_core::JmlError;
use jml_java::JavaParser;
use std::sync::{Arc, OnceLock};
use tower_lsp_server::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp_server::ls_types::{
    DiagnosticOptions, DiagnosticServerCapabilities, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DidSaveTextDocumentParams,
    DocumentDiagnosticParams, DocumentDiagnosticReportResult, InitializeParams, InitializeResult,
    InitializedParams, MessageType, SaveOptions, ServerCapabilities, ServerInfo,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    TextDocumentSyncSaveOptions,
};
use tower_lsp_server::{Client, LanguageServer};

pub struct Backend {
    client: Client,
    session: OnceLock<Session>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            session: OnceLock::new(),
        }
    }

    fn server_capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::FULL),
                    save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                        include_text: Some(true),
                    })),
                    ..Default::default()
                },
            )),
            diagnostic_provider: Some(DiagnosticServerCapabilities::Options(DiagnosticOptions {
                identifier: Some("jml".into()),
                inter_file_dependencies: true,
                workspace_diagnostics: false,
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    fn session(&self) -> Option<&Session> {
        let session = self.session.get();
        if session.is_none() {
            tracing::warn!("request received before initialize");
        }
        session
    }
}

/// Maps a request failure to its JSON-RPC error.
fn to_rpc_error(err: JmlError) -> Error {
    match err {
        JmlError::InvalidUri(_) => Error::invalid_params(err.to_string()),
        other => Error {
            code: ErrorCode::InternalError,
            message: other.to_string().into(),
            data: None,
        },
    }
}

impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        tracing::info!("initializing jml-lsp server");

        let config = JmlConfig::from_initialization_options(params.initialization_options);
        let session = Session::new(
            config,
            Arc::new(self.client.clone()),
            Arc::new(JavaParser::new()),
        );
        if self.session.set(session).is_err() {
            tracing::warn!("initialize received twice, keeping the first session");
        }

        Ok(InitializeResult {
            capabilities: Self::server_capabilities(),
            server_info: Some(ServerInfo {
                name: "jml-lsp".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            }),
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::info!("jml-lsp server initialized");
        self.client
            .log_message(MessageType::INFO, "jml-lsp ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("shutting down jml-lsp server");
        if let Some(session) = self.session.get() {
            session.shutdown();
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some(session) = self.session() else {
            return;
        };

        let document = params.text_document;
        if let Err(e) = session.open(&document.uri, &document.language_id, document.text) {
            tracing::warn!("cannot open {:?}: {}", document.uri, e);
        }
    }

    async fn did_change(&self, mut params: DidChangeTextDocumentParams) {
        let Some(session) = self.session() else {
            return;
        };

        // full sync: the last change holds the whole document
        let Some(change) = params.content_changes.pop() else {
            return;
        };

        let uri = params.text_document.uri;
        if let Err(e) = session.change(&uri, change.text) {
            tracing::warn!("cannot update {:?}: {}", uri, e);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Some(session) = self.session() else {
            return;
        };

        let uri = params.text_document.uri;
        if let Err(e) = session.save(&uri, params.text) {
            tracing::warn!("cannot reparse {:?} after save: {}", uri, e);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some(session) = self.session() else {
            return;
        };

        let uri = params.text_document.uri;
        if let Err(e) = session.close(&uri) {
            tracing::warn!("cannot close {:?}: {}", uri, e);
        }
    }

    async fn diagnostic(
        &self,
        params: DocumentDiagnosticParams,
    ) -> Result<DocumentDiagnosticReportResult> {
        let Some(session) = self.session() else {
            return Err(Error::invalid_request());
        };

        let uri = params.text_document.uri;
        tracing::debug!("diagnostics requested for {:?}", uri);

        session
            .diagnostic_report(&uri, params.previous_result_id.as_deref())
            .await
            .map_err(to_rpc_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_capabilities() {
        let caps = Backend::server_capabilities();

        match caps.text_document_sync {
            Some(TextDocumentSyncCapability::Options(options)) => {
                assert_eq!(options.open_close, Some(true));
                assert_eq!(options.change, Some(TextDocumentSyncKind::FULL));
                assert!(options.save.is_some());
            }
            other => panic!("unexpected text sync capability: {:?}", other),
        }

        match caps.diagnostic_provider {
            Some(DiagnosticServerCapabilities::Options(options)) => {
                assert_eq!(options.identifier.as_deref(), Some("jml"));
                assert!(options.inter_file_dependencies);
                assert!(!options.workspace_diagnostics);
            }
            other => panic!("unexpected diagnostic capability: {:?}", other),
        }

        assert!(caps.hover_provider.is_none());
        assert!(caps.completion_provider.is_none());
    }

    #[test]
    fn test_invalid_uri_is_invalid_params() {
        let error = to_rpc_error(JmlError::InvalidUri("untitled:Untitled-1".into()));
        assert_eq!(error.code, ErrorCode::InvalidParams);
        assert!(error.message.contains("untitled:Untitled-1"));
    }

    #[test]
    fn test_scheduler_errors_are_internal() {
        let error = to_rpc_error(JmlError::SchedulerShutdown);
        assert_eq!(error.code, ErrorCode::InternalError);

        let error = to_rpc_error(JmlError::TaskAbandoned {
            path: "/src/A.java".into(),
        });
        assert_eq!(error.code, ErrorCode::InternalError);
        assert!(error.message.contains("/src/A.java"));
    }

    #[tokio::test]
    async fn test_backend_creation() {
        let (_service, _socket) = tower_lsp_server::LspService::build(Backend::new).finish();
    }
}
