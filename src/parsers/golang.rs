//! Function and statement extents of a Go source file.
//!
//! Parsing uses the tree-sitter Go grammar. Extraction is a pure fold over the
//! syntax tree: every helper returns the extents it found instead of pushing
//! into a shared list.
//!
//! Control constructs (`if`, `for`, `switch`, `select`, labels, nested blocks)
//! are walked through but never registered themselves; only the leaf
//! statements inside their blocks are. Positions are 1-based lines and 1-based
//! byte columns with exclusive ends, the same convention the coverage profile
//! uses.

use tree_sitter::{Node, Parser, Point};

use crate::error::{GocovError, Result};
use crate::model::{Position, SourceFunction, SourceStatement};

const CASE_KINDS: &[&str] = &[
    "expression_case",
    "type_case",
    "communication_case",
    "default_case",
];

/// Statement kinds registered as leaves when they are not control constructs.
const LEAF_STATEMENT_KINDS: &[&str] = &[
    "expression_statement",
    "send_statement",
    "inc_statement",
    "dec_statement",
    "assignment_statement",
    "short_var_declaration",
    "return_statement",
    "go_statement",
    "defer_statement",
    "fallthrough_statement",
    "break_statement",
    "continue_statement",
    "goto_statement",
    "const_declaration",
    "type_declaration",
    "var_declaration",
];

/// Parse `content` and return its functions in source order.
///
/// Any syntax error fails the whole file; nothing partial is returned.
pub fn extract_functions(file: &str, content: &str) -> Result<Vec<SourceFunction>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| GocovError::Parse(format!("failed to load Go grammar: {e}")))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| GocovError::Parse(format!("failed to parse {file}")))?;

    let root = tree.root_node();
    if root.has_error() {
        let at = first_error(root).unwrap_or(root).start_position();
        return Err(GocovError::Syntax {
            path: file.to_string(),
            line: at.row + 1,
            column: at.column + 1,
        });
    }

    let extractor = Extractor {
        source: content,
        file,
    };
    Ok(extractor.functions_in(root))
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

fn position(point: Point) -> Position {
    Position::new(point.row as u32 + 1, point.column as u32 + 1)
}

fn statement_between(start: Node<'_>, end: Node<'_>) -> SourceStatement {
    SourceStatement::new(
        start.end_byte(),
        end.start_byte(),
        position(start.end_position()),
        position(end.start_position()),
    )
}

fn leaf(node: Node<'_>) -> SourceStatement {
    SourceStatement::new(
        node.start_byte(),
        node.end_byte(),
        position(node.start_position()),
        position(node.end_position()),
    )
}

/// Named children, looking through `statement_list` wrappers and skipping
/// comments.
fn statement_nodes(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .flat_map(|child| match child.kind() {
            "statement_list" => statement_nodes(child),
            "comment" => Vec::new(),
            _ => vec![child],
        })
        .collect()
}

struct Extractor<'a> {
    source: &'a str,
    file: &'a str,
}

impl<'a> Extractor<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        &self.source[node.byte_range()]
    }

    fn functions_in(&self, node: Node<'_>) -> Vec<SourceFunction> {
        let own = match node.kind() {
            "function_declaration" | "method_declaration" | "func_literal" => {
                self.function_extent(node)
            }
            _ => None,
        };
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        own.into_iter()
            .chain(children.into_iter().flat_map(|child| self.functions_in(child)))
            .collect()
    }

    fn function_extent(&self, node: Node<'_>) -> Option<SourceFunction> {
        // Declarations without a body are implemented elsewhere (assembly).
        let body = node.child_by_field_name("body")?;
        let start = position(node.start_position());
        let end = position(node.end_position());

        let mut statements = self.block_statements(body);
        statements.sort_by_key(|s| s.start);

        Some(SourceFunction {
            name: self.function_name(node, start),
            file: self.file.to_string(),
            start_offset: node.start_byte(),
            end_offset: node.end_byte(),
            start_line: start.line,
            end_line: end.line,
            statements,
        })
    }

    fn function_name(&self, node: Node<'_>, start: Position) -> String {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string());
        match (node.kind(), name) {
            ("method_declaration", Some(name)) => match self.receiver_type(node) {
                Some(recv) => format!("{recv}.{name}"),
                None => name,
            },
            (_, Some(name)) => name,
            // Literals have no name; their position keeps them unique.
            _ => format!("@{}:{}", start.line, start.column),
        }
    }

    /// `(s *Server[T])` gives `Server`.
    fn receiver_type(&self, method: Node<'_>) -> Option<&'a str> {
        let receiver = method.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        let param = receiver
            .named_children(&mut cursor)
            .find(|n| n.kind() == "parameter_declaration")?;
        let ty = self.text(param.child_by_field_name("type")?);
        let ty = ty.trim_start_matches(['*', '(', ' ']).trim_end_matches(')');
        let ty = ty.split('[').next().unwrap_or(ty).trim();
        (!ty.is_empty()).then_some(ty)
    }

    fn block_statements(&self, block: Node<'_>) -> Vec<SourceStatement> {
        statement_nodes(block)
            .into_iter()
            .flat_map(|stmt| self.statement_extents(stmt))
            .collect()
    }

    fn statement_extents(&self, node: Node<'_>) -> Vec<SourceStatement> {
        match node.kind() {
            "block" => self.block_statements(node),
            "if_statement" => self.if_statements(node),
            "for_statement" => node
                .child_by_field_name("body")
                .map(|body| self.block_statements(body))
                .unwrap_or_default(),
            "expression_switch_statement" | "type_switch_statement" | "select_statement" => {
                self.case_statements(node)
            }
            "labeled_statement" => {
                let mut cursor = node.walk();
                let inner: Vec<Node<'_>> = node
                    .named_children(&mut cursor)
                    .filter(|n| n.kind() != "label_name" && n.kind() != "comment")
                    .collect();
                inner
                    .into_iter()
                    .flat_map(|stmt| self.statement_extents(stmt))
                    .collect()
            }
            kind if LEAF_STATEMENT_KINDS.contains(&kind) => vec![leaf(node)],
            _ => Vec::new(),
        }
    }

    fn if_statements(&self, node: Node<'_>) -> Vec<SourceStatement> {
        let mut statements = node
            .child_by_field_name("consequence")
            .map(|body| self.block_statements(body))
            .unwrap_or_default();

        let Some(alternative) = node.child_by_field_name("alternative") else {
            return statements;
        };

        if alternative.kind() == "if_statement" {
            // `else if` has no block of its own. Synthesize one starting right
            // after the `else` keyword and running to the nested body, so the
            // coverage of the else branch lands on it and not on the nested if.
            let mut cursor = node.walk();
            let else_kw = node.children(&mut cursor).find(|n| n.kind() == "else");
            if let (Some(else_kw), Some(body)) =
                (else_kw, alternative.child_by_field_name("consequence"))
            {
                statements.push(statement_between(else_kw, body));
            }
        }
        statements.extend(self.statement_extents(alternative));
        statements
    }

    fn case_statements(&self, node: Node<'_>) -> Vec<SourceStatement> {
        let mut cursor = node.walk();
        let cases: Vec<Node<'_>> = node
            .named_children(&mut cursor)
            .filter(|n| CASE_KINDS.contains(&n.kind()))
            .collect();

        cases
            .into_iter()
            .flat_map(|case| {
                // The send or receive of a select case is part of the header.
                let header = case.child_by_field_name("communication").map(|n| n.id());
                statement_nodes(case)
                    .into_iter()
                    .filter(move |n| Some(n.id()) != header)
                    .flat_map(|stmt| self.statement_extents(stmt))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
