//! Core abstractions for jml-lsp.
//!
//! Everything here is independent of the concrete parser and of the LSP
//! transport: document identities, located problems, parse outcomes, the
//! shared source-root registry, and the adapter that runs a parser safely.

pub mod error;
pub mod identity;
pub mod loader;
pub mod parser;
pub mod problem;
pub mod source_roots;

pub use error::{JmlError, Result};
pub use identity::FileIdentity;
pub use parser::{ParseOutcome, ParsedSource, ParserAdapter, SourceParser, SyntaxTree};
pub use problem::{Problem, SourcePosition, SourceRange};
pub use source_roots::{SourceRootRegistry, SourceRoots};
