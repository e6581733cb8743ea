//! Fakes shared by unit tests.

use crate::publisher::DiagnosticSink;
use async_trait::async_trait;
use jml_core::{
    JmlError, ParsedSource, Problem, Result, SourceParser, SourceRange, SourceRoots, SyntaxTree,
};
use std::any::Any;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use tower_lsp_server::ls_types::{Diagnostic, Uri};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Polls `condition` until it holds, failing the test after [`WAIT_LIMIT`].
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pushes: Mutex<Vec<(Uri, Vec<Diagnostic>)>>,
    logs: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub(crate) fn pushes(&self) -> Vec<(Uri, Vec<Diagnostic>)> {
        self.pushes.lock().unwrap().clone()
    }

    pub(crate) fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub(crate) async fn wait_for_pushes(&self, count: usize) -> Vec<(Uri, Vec<Diagnostic>)> {
        eventually(|| self.pushes.lock().unwrap().len() >= count).await;
        self.pushes()
    }
}

#[async_trait]
impl DiagnosticSink for RecordingSink {
    async fn publish_diagnostics(&self, uri: Uri, diagnostics: Vec<Diagnostic>) -> Result<()> {
        self.pushes.lock().unwrap().push((uri, diagnostics));
        Ok(())
    }

    async fn log_message(&self, message: String) {
        self.logs.lock().unwrap().push(message);
    }
}

pub(crate) struct FailingSink;

#[async_trait]
impl DiagnosticSink for FailingSink {
    async fn publish_diagnostics(&self, uri: Uri, _diagnostics: Vec<Diagnostic>) -> Result<()> {
        Err(JmlError::Delivery {
            uri: format!("{:?}", uri),
            message: "connection closed".into(),
        })
    }

    async fn log_message(&self, _message: String) {}
}

/// Blocks parses until opened.
#[derive(Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub(crate) fn closed() -> Self {
        Self::default()
    }

    pub(crate) fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.changed.wait(open).unwrap();
        }
    }
}

#[derive(Debug)]
pub(crate) struct FakeTree;

impl SyntaxTree for FakeTree {
    fn language(&self) -> &'static str {
        "fake"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Parser that fails on the first `!` in the text and counts invocations.
///
/// Lines and columns of the reported problem are those of the `!`.
#[derive(Default)]
pub(crate) struct ScriptedParser {
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    gate: Option<Gate>,
}

impl ScriptedParser {
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Gate::closed()),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.open();
        }
    }
}

impl SourceParser for ScriptedParser {
    fn parse(
        &self,
        _path: &Path,
        text: &str,
        _roots: &SourceRoots,
    ) -> std::result::Result<ParsedSource, Vec<Problem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        if let Some(gate) = &self.gate {
            gate.wait();
        }

        for (line, content) in text.lines().enumerate() {
            if let Some(offset) = content.find('!') {
                let line = line as u32 + 1;
                let column = offset as u32 + 1;
                return Err(vec![Problem::new(
                    SourceRange::new(line, column, line, column + 1),
                    "unexpected '!'",
                )]);
            }
        }

        Ok(ParsedSource {
            tree: Box::new(FakeTree),
            source_roots: vec![],
        })
    }
}
