//! Parser adapter.
//!
//! Wraps an external [`SourceParser`] so that every way a parse can go wrong
//! (unreadable file, syntax errors, a panicking parser) comes back as a
//! [`ParseOutcome`] instead of an error. Successful parses feed their source
//! root hints into the shared [`SourceRootRegistry`].

use crate::identity::FileIdentity;
use crate::loader::load_source;
use crate::problem::Problem;
use crate::source_roots::{SourceRootRegistry, SourceRoots};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle to a parsed syntax tree.
///
/// The pipeline never inspects trees; consumers downcast through
/// [`SyntaxTree::as_any`] to the parser's concrete type.
pub trait SyntaxTree: Send + Sync + fmt::Debug {
    /// Language tag of the parser that produced the tree.
    fn language(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

/// Successful result of an external parser.
#[derive(Debug)]
pub struct ParsedSource {
    pub tree: Box<dyn SyntaxTree>,
    /// Project roots the parsed file declares (e.g. derived from its package).
    pub source_roots: Vec<PathBuf>,
}

/// External parser interface.
///
/// Implementors parse one document and either return a tree or the ordered
/// list of problems found. `roots` is a snapshot of the source roots known
/// when the parse started and can be used for cross-file checks.
///
/// Implementations may panic on inputs they cannot handle; the adapter
/// contains the panic.
pub trait SourceParser: Send + Sync {
    fn parse(
        &self,
        path: &Path,
        text: &str,
        roots: &SourceRoots,
    ) -> std::result::Result<ParsedSource, Vec<Problem>>;
}

/// Result of attempting to parse one document. Immutable once stored.
#[derive(Debug)]
pub enum ParseOutcome {
    Success {
        tree: Arc<dyn SyntaxTree>,
        source_roots: Vec<PathBuf>,
    },
    /// Always carries at least one problem.
    Failure { problems: Vec<Problem> },
}

impl ParseOutcome {
    pub fn failure(problem: Problem) -> Self {
        Self::Failure {
            problems: vec![problem],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Problems to report; empty for a successful parse.
    pub fn problems(&self) -> &[Problem] {
        match self {
            Self::Success { .. } => &[],
            Self::Failure { problems } => problems,
        }
    }

    pub fn tree(&self) -> Option<&dyn SyntaxTree> {
        match self {
            Self::Success { tree, .. } => Some(tree.as_ref()),
            Self::Failure { .. } => None,
        }
    }
}

/// Runs an external parser for one document at a time.
///
/// Cheap to share between workers (`Arc` it); holds no per-document state.
pub struct ParserAdapter {
    parser: Arc<dyn SourceParser>,
    roots: Arc<SourceRootRegistry>,
}

impl ParserAdapter {
    pub fn new(parser: Arc<dyn SourceParser>, roots: Arc<SourceRootRegistry>) -> Self {
        Self { parser, roots }
    }

    pub fn source_roots(&self) -> &Arc<SourceRootRegistry> {
        &self.roots
    }

    /// Parses `id`, using `text` when the document is open in the editor and
    /// reading the file from disk otherwise.
    ///
    /// Blocking: call from a worker thread.
    pub fn parse(&self, id: &FileIdentity, text: Option<&str>) -> ParseOutcome {
        let loaded;
        let text = match text {
            Some(text) => text,
            None => match load_source(id.path()) {
                Ok(content) => {
                    loaded = content;
                    loaded.as_str()
                }
                Err(e) => {
                    tracing::warn!("cannot load {}: {}", id, e);
                    return ParseOutcome::failure(Problem::unlocated(format!(
                        "cannot read {}: {}",
                        id, e
                    )));
                }
            },
        };

        let snapshot = self.roots.snapshot();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.parser.parse(id.path(), text, &snapshot)
        }));

        match result {
            Ok(Ok(parsed)) => {
                for root in &parsed.source_roots {
                    self.roots.register(root.clone());
                }
                ParseOutcome::Success {
                    tree: Arc::from(parsed.tree),
                    source_roots: parsed.source_roots,
                }
            }
            Ok(Err(problems)) if problems.is_empty() => {
                ParseOutcome::failure(Problem::unlocated(format!("{} could not be parsed", id)))
            }
            Ok(Err(problems)) => {
                tracing::debug!("{} has {} problem(s)", id, problems.len());
                ParseOutcome::Failure { problems }
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                tracing::error!("parser crashed on {}: {}", id, message);
                ParseOutcome::failure(Problem::unlocated(format!("parser crashed: {message}")))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
