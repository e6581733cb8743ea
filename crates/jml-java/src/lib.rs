//! Java/JML parser for jml-lsp.
//!
//! Implements [`jml_core::SourceParser`] on top of tree-sitter-java and
//! derives source roots from package declarations.

pub mod package;
pub mod parser;

pub use parser::{JavaParser, JavaSyntaxTree};
