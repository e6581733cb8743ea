//! Java parser with problem reporting.
//!
//! Parses a compilation unit with tree-sitter-java and reports every `ERROR`
//! and `MISSING` node as a [`Problem`]. JML specifications live in `//@` and
//! `/*@ ... @*/` comments, so JML-annotated sources parse as Java.

use crate::package::{package_mismatch, source_root_for};
use jml_core::{ParsedSource, Problem, SourceParser, SourceRange, SourceRoots, SyntaxTree};
use std::any::Any;
use std::fmt;
use std::path::Path;
use tree_sitter::{Node, Parser, Point, Tree};

/// Longest excerpt of unexpected source quoted in a problem message.
const MAX_EXCERPT_CHARS: usize = 40;

/// Parsed Java compilation unit.
pub struct JavaSyntaxTree {
    tree: Tree,
    package: Option<String>,
}

impl JavaSyntaxTree {
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Declared package, `None` for the default package.
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }
}

impl fmt::Debug for JavaSyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JavaSyntaxTree")
            .field("root", &self.tree.root_node().kind())
            .field("package", &self.package)
            .finish()
    }
}

impl SyntaxTree for JavaSyntaxTree {
    fn language(&self) -> &'static str {
        "java"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// [`SourceParser`] for Java and JML-annotated Java.
///
/// A fresh tree-sitter parser is created per parse, so one `JavaParser` can
/// serve any number of workers.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaParser;

impl JavaParser {
    pub fn new() -> Self {
        Self
    }
}

impl SourceParser for JavaParser {
    fn parse(
        &self,
        path: &Path,
        text: &str,
        roots: &SourceRoots,
    ) -> std::result::Result<ParsedSource, Vec<Problem>> {
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&tree_sitter_java::LANGUAGE.into()) {
            tracing::error!("tree-sitter-java grammar rejected: {}", e);
            return Err(vec![Problem::unlocated(format!(
                "Java grammar unavailable: {e}"
            ))]);
        }

        let Some(tree) = parser.parse(text, None) else {
            return Err(vec![Problem::unlocated("parser produced no syntax tree")]);
        };

        let index = LineIndex::new(text);
        let root = tree.root_node();
        if root.has_error() {
            return Err(collect_problems(root, text, &index));
        }

        let package = package_declaration(root, text);
        let mut source_roots = Vec::new();
        match &package {
            Some((name, node)) => {
                if let Some(expected) = package_mismatch(roots, path, name) {
                    return Err(vec![Problem::new(
                        index.range(node.start_position(), node.end_position()),
                        format!(
                            "The declared package \"{name}\" does not match the expected package \"{expected}\""
                        ),
                    )]);
                }
                match source_root_for(path, name) {
                    Some(root) => source_roots.push(root),
                    None => tracing::debug!(
                        "{} declares package {} outside a matching directory",
                        path.display(),
                        name
                    ),
                }
            }
            None => {
                if let Some(expected) = package_mismatch(roots, path, "") {
                    return Err(vec![Problem::new(
                        SourceRange::new(1, 1, 1, 1),
                        format!("Missing package declaration, expected package \"{expected}\""),
                    )]);
                }
            }
        }

        let package = package.map(|(name, _)| name);
        Ok(ParsedSource {
            tree: Box::new(JavaSyntaxTree { tree, package }),
            source_roots,
        })
    }
}

/// Declared package name and the node spelling it.
fn package_declaration<'t>(root: Node<'t>, text: &str) -> Option<(String, Node<'t>)> {
    let mut cursor = root.walk();
    let declaration = root
        .named_children(&mut cursor)
        .find(|n| n.kind() == "package_declaration")?;

    let mut cursor = declaration.walk();
    let name = declaration
        .named_children(&mut cursor)
        .find(|n| matches!(n.kind(), "identifier" | "scoped_identifier"))?;
    let spelled = name.utf8_text(text.as_bytes()).ok()?;
    let normalized: String = spelled.chars().filter(|c| !c.is_whitespace()).collect();
    Some((normalized, name))
}

/// Reports `ERROR` and `MISSING` nodes in document order.
///
/// Subtrees without errors are skipped; an `ERROR` node is reported once,
/// not per descendant.
fn collect_problems(root: Node<'_>, text: &str, index: &LineIndex<'_>) -> Vec<Problem> {
    let mut problems = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.is_missing() {
            problems.push(Problem::new(
                index.range(node.start_position(), node.end_position()),
                format!("syntax error: missing `{}`", node.kind()),
            ));
            continue;
        }
        if node.is_error() {
            problems.push(Problem::new(
                index.range(node.start_position(), node.end_position()),
                unexpected_message(node, text),
            ));
            continue;
        }
        if !node.has_error() {
            continue;
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    if problems.is_empty() {
        problems.push(Problem::unlocated("syntax error"));
    }
    problems
}

fn unexpected_message(node: Node<'_>, text: &str) -> String {
    let excerpt = node
        .utf8_text(text.as_bytes())
        .ok()
        .and_then(|s| s.lines().map(str::trim).find(|l| !l.is_empty()))
        .map(|line| line.chars().take(MAX_EXCERPT_CHARS).collect::<String>());

    match excerpt {
        Some(excerpt) => format!("syntax error: unexpected `{excerpt}`"),
        None => "syntax error".to_string(),
    }
}

/// Converts tree-sitter points (0-based row, byte column) to 1-based
/// line/UTF-16 column positions.
struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in text.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { text, line_starts }
    }

    fn column(&self, point: Point) -> u32 {
        let Some(&start) = self.line_starts.get(point.row) else {
            return point.column as u32 + 1;
        };
        let utf16 = self
            .text
            .get(start..start + point.column)
            .map(|prefix| prefix.chars().map(char::len_utf16).sum::<usize>())
            .unwrap_or(point.column);
        utf16 as u32 + 1
    }

    fn range(&self, start: Point, end: Point) -> SourceRange {
        SourceRange::new(
            start.row as u32 + 1,
            self.column(start),
            end.row as u32 + 1,
            self.column(end),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse_at(path: &str, text: &str) -> std::result::Result<ParsedSource, Vec<Problem>> {
        JavaParser::new().parse(Path::new(path), text, &SourceRoots::default())
    }

    #[test]
    fn test_valid_class_parses() {
        let text = r#"package org.example;

public class App {
    public static void main(String[] args) {
        System.out.println("hello");
    }
}
"#;
        let parsed = parse_at("/project/src/org/example/App.java", text).unwrap();
        assert_eq!(parsed.tree.language(), "java");
        assert_eq!(
            parsed.source_roots,
            vec![PathBuf::from("/project/src")]
        );

        let tree = parsed
            .tree
            .as_any()
            .downcast_ref::<JavaSyntaxTree>()
            .unwrap();
        assert_eq!(tree.package(), Some("org.example"));
        assert_eq!(tree.tree().root_node().kind(), "program");
    }

    #[test]
    fn test_jml_comments_are_accepted() {
        let text = r#"public class Counter {
    //@ public invariant count >= 0;
    private /*@ spec_public @*/ int count;

    /*@ requires true;
      @ ensures count == \old(count) + 1;
      @*/
    public void increment() {
        count++;
    }
}
"#;
        let parsed = parse_at("/scratch/Counter.java", text).unwrap();
        assert!(parsed.source_roots.is_empty());
    }

    #[test]
    fn test_default_package_has_no_source_root_hint() {
        let parsed = parse_at("/scratch/A.java", "class A {}").unwrap();
        assert!(parsed.source_roots.is_empty());
    }

    #[test]
    fn test_package_outside_matching_directory_has_no_hint() {
        let parsed = parse_at("/scratch/A.java", "package org.example;\nclass A {}").unwrap();
        assert!(parsed.source_roots.is_empty());
    }

    #[test]
    fn test_syntax_error_is_located_on_its_line() {
        let text = "package demo;\n\npublic class A {\n    int x = ;\n}\n";
        let problems = parse_at("/p/demo/A.java", text).unwrap_err();

        assert!(!problems.is_empty());
        assert!(
            problems
                .iter()
                .any(|p| p.location.is_some_and(|l| l.start.line == 4)),
            "expected a problem on line 4: {problems:?}"
        );
        assert!(problems.iter().all(|p| p.message.starts_with("syntax error")));
    }

    #[test]
    fn test_problems_are_in_document_order() {
        let text = "class A {\n    int x = ;\n    void f( { }\n    int y = ;\n}\n";
        let problems = parse_at("/p/A.java", text).unwrap_err();

        let lines: Vec<u32> = problems
            .iter()
            .filter_map(|p| p.location.map(|l| l.start.line))
            .collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn test_package_mismatch_with_known_root() {
        let roots = SourceRoots::from(vec![PathBuf::from("/project/src")]);
        let problems = JavaParser::new()
            .parse(
                Path::new("/project/src/org/example/App.java"),
                "package org.other;\n\nclass App {}\n",
                &roots,
            )
            .unwrap_err();

        assert_eq!(problems.len(), 1);
        assert_eq!(
            problems[0].message,
            "The declared package \"org.other\" does not match the expected package \"org.example\""
        );
        assert_eq!(problems[0].location, Some(SourceRange::new(1, 9, 1, 18)));
    }

    #[test]
    fn test_missing_package_with_known_root() {
        let roots = SourceRoots::from(vec![PathBuf::from("/project/src")]);
        let problems = JavaParser::new()
            .parse(
                Path::new("/project/src/org/App.java"),
                "class App {}\n",
                &roots,
            )
            .unwrap_err();

        assert_eq!(problems.len(), 1);
        assert!(problems[0].message.contains("expected package \"org\""));
    }

    #[test]
    fn test_line_index_counts_utf16_columns() {
        let text = "// é\nclass A {}\n";
        let index = LineIndex::new(text);
        // 'é' is two bytes but one UTF-16 unit
        assert_eq!(index.column(Point { row: 0, column: 5 }), 5);
        assert_eq!(index.column(Point { row: 1, column: 6 }), 7);
    }
}
