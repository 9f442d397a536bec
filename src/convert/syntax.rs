use crate::types::errors::Error;
use tree_sitter::{Language, Node, Parser, Tree};

pub mod nodes {
    pub const BINARY_EXPRESSION: &str = "binary_expression";
    pub const DO_STATEMENT: &str = "do_statement";
    pub const EXPRESSION_STATEMENT: &str = "expression_statement";
    pub const FOR_IN_STATEMENT: &str = "for_in_statement";
    pub const FOR_STATEMENT: &str = "for_statement";
    pub const IF_STATEMENT: &str = "if_statement";
    pub const LEXICAL_DECLARATION: &str = "lexical_declaration";
    pub const RETURN_STATEMENT: &str = "return_statement";
    pub const SWITCH_STATEMENT: &str = "switch_statement";
    pub const TERNARY_EXPRESSION: &str = "ternary_expression";
    pub const THROW_STATEMENT: &str = "throw_statement";
    pub const VARIABLE_DECLARATION: &str = "variable_declaration";
    pub const WHILE_STATEMENT: &str = "while_statement";
}

pub mod fields {
    pub const ALTERNATIVE: &str = "alternative";
    pub const CONSEQUENCE: &str = "consequence";
    pub const LEFT: &str = "left";
    pub const OPERATOR: &str = "operator";
    pub const RIGHT: &str = "right";
}

/// Grammar used for a given file path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// JavaScript with JSX
    JavaScript,
    TypeScript,
    Tsx,
}

impl Dialect {
    pub fn for_path(path: &str) -> Self {
        match path.rsplit('.').next() {
            Some("ts" | "mts" | "cts") => Dialect::TypeScript,
            Some("tsx") => Dialect::Tsx,
            _ => Dialect::JavaScript,
        }
    }

    fn language(self) -> Language {
        match self {
            Dialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// Parse source into a syntax tree, failing on any syntax error
pub fn parse_source(source: &str, dialect: Dialect) -> Result<Tree, Error> {
    let mut parser = Parser::new();
    parser
        .set_language(&dialect.language())
        .map_err(|e| Error::Parse(format!("parser setup failed: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| Error::Parse("parser produced no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        let position = first_error(root)
            .map(|node| node.start_position())
            .unwrap_or_else(|| root.start_position());
        return Err(Error::Parse(format!(
            "syntax error at line {}, column {}",
            position.row + 1,
            position.column
        )));
    }

    Ok(tree)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| child.has_error())
        .find_map(first_error)
}

/// Get text content of a node from source
pub fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

/// Visit all nodes depth-first; returning `false` from the callback prunes the subtree
pub fn visit_nodes<F>(node: Node, callback: &mut F)
where
    F: FnMut(Node) -> bool,
{
    if !callback(node) {
        return;
    }
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            visit_nodes(cursor.node(), callback);
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
}
