//! Backtracking matcher over a linked grammar.
//!
//! Matching either succeeds and advances the cursor or fails without
//! consuming input. Terminal failures record the offset and the expected
//! token; the matcher keeps the deepest failure seen across all attempted
//! alternatives so the reported syntax error names the most specific
//! expectation rather than "failed at offset 0".

use std::collections::BTreeSet;
use std::ops::Range;

use crate::error::SyntaxError;

use super::{Grammar, LinkedKind, ProdId, TerminalKind};

/// Nesting budget for recursive productions. Criteria depth is separately
/// budgeted at compile time; this guard only protects the parser stack.
const MAX_PARSE_DEPTH: usize = 200;

/// Node of the externally visible parse tree. Only productions whose
/// visibility flag is set contribute nodes; invisible productions splice
/// their children into the parent.
#[derive(Clone, Debug)]
pub struct SyntaxNode {
    /// Production name.
    pub name: &'static str,
    /// Byte range of the matched input.
    pub span: Range<usize>,
    /// Matched text. For quoted-string terminals this is the unescaped
    /// content without the surrounding quotes.
    pub text: String,
    /// Visible child nodes in match order.
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    /// First child with the given production name.
    pub fn child(&self, name: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given production name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SyntaxNode> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

#[derive(Debug, Default)]
struct Failure {
    offset: usize,
    expected: BTreeSet<String>,
}

impl Failure {
    fn record(&mut self, offset: usize, expected: String) {
        if offset > self.offset {
            self.offset = offset;
            self.expected.clear();
        }
        if offset == self.offset {
            self.expected.insert(expected);
        }
    }

    fn into_error(self) -> SyntaxError {
        SyntaxError {
            offset: self.offset,
            expected: self.expected.into_iter().collect(),
        }
    }
}

struct Matcher<'g, 'i> {
    grammar: &'g Grammar,
    input: &'i str,
    failure: Failure,
    depth: usize,
}

/// Parses `input` against the grammar, producing the visible parse tree or
/// the deepest syntax failure. Trailing non-whitespace input is an error.
pub fn parse(grammar: &Grammar, input: &str) -> Result<SyntaxNode, SyntaxError> {
    let mut matcher = Matcher {
        grammar,
        input,
        failure: Failure::default(),
        depth: 0,
    };
    let matched = matcher.match_prod(grammar.root(), 0);
    match matched {
        Some((end, nodes)) => {
            let rest = skip_ws(input, end);
            if rest < input.len() {
                matcher.failure.record(rest, "end of input".to_owned());
                return Err(matcher.failure.into_error());
            }
            Ok(wrap_root(grammar, nodes, input, end))
        }
        None => Err(matcher.failure.into_error()),
    }
}

fn wrap_root(grammar: &Grammar, mut nodes: Vec<SyntaxNode>, input: &str, end: usize) -> SyntaxNode {
    let root_name = grammar.production(grammar.root()).name;
    if nodes.len() == 1 && root_name == Some(nodes[0].name) {
        return nodes.remove(0);
    }
    SyntaxNode {
        name: "root",
        span: 0..end,
        text: input[..end].trim().to_owned(),
        children: nodes,
    }
}

fn skip_ws(input: &str, mut pos: usize) -> usize {
    let bytes = input.as_bytes();
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl<'g, 'i> Matcher<'g, 'i> {
    fn match_prod(&mut self, id: ProdId, pos: usize) -> Option<(usize, Vec<SyntaxNode>)> {
        if self.depth >= MAX_PARSE_DEPTH {
            self.failure
                .record(pos, format!("nesting no deeper than {MAX_PARSE_DEPTH}"));
            return None;
        }
        self.depth += 1;
        let result = self.match_prod_inner(id, pos);
        self.depth -= 1;
        result
    }

    fn match_prod_inner(&mut self, id: ProdId, pos: usize) -> Option<(usize, Vec<SyntaxNode>)> {
        let grammar = self.grammar;
        let prod = grammar.production(id);
        match &prod.kind {
            LinkedKind::Terminal(kind) => self.match_terminal(prod.name, prod.visible, kind, pos),
            LinkedKind::Forward(children) => {
                let mut nodes = Vec::new();
                let mut cursor = pos;
                for child in children {
                    let (next, child_nodes) = self.match_prod(*child, cursor)?;
                    cursor = next;
                    nodes.extend(child_nodes);
                }
                Some((cursor, self.emit(prod.name, prod.visible, pos, cursor, nodes)))
            }
            LinkedKind::Fork(alternatives) => {
                for alt in alternatives.iter().copied() {
                    if let Some((next, nodes)) = self.match_prod(alt, pos) {
                        return Some((next, self.emit(prod.name, prod.visible, pos, next, nodes)));
                    }
                }
                None
            }
        }
    }

    /// Wraps matched children into a named node when the production is
    /// visible; otherwise splices them upward.
    fn emit(
        &self,
        name: Option<&'static str>,
        visible: bool,
        start: usize,
        end: usize,
        children: Vec<SyntaxNode>,
    ) -> Vec<SyntaxNode> {
        if !visible {
            return children;
        }
        let name = name.unwrap_or("node");
        vec![SyntaxNode {
            name,
            span: start..end,
            text: self.input[start..end].trim().to_owned(),
            children,
        }]
    }

    fn match_terminal(
        &mut self,
        name: Option<&'static str>,
        visible: bool,
        kind: &TerminalKind,
        pos: usize,
    ) -> Option<(usize, Vec<SyntaxNode>)> {
        if matches!(kind, TerminalKind::Empty) {
            return Some((pos, Vec::new()));
        }
        let start = skip_ws(self.input, pos);
        let matched = match kind {
            TerminalKind::Literal(text) => self.match_literal(start, text),
            TerminalKind::QuotedString => self.match_quoted(start),
            TerminalKind::Number => self.match_number(start),
            TerminalKind::Empty => unreachable!("handled above"),
        };
        match matched {
            Some((end, text)) => {
                let nodes = if visible {
                    vec![SyntaxNode {
                        name: name.unwrap_or("token"),
                        span: start..end,
                        text,
                        children: Vec::new(),
                    }]
                } else {
                    Vec::new()
                };
                Some((end, nodes))
            }
            None => {
                self.failure.record(start, kind.expected());
                None
            }
        }
    }

    fn match_literal(&self, start: usize, literal: &str) -> Option<(usize, String)> {
        let rest = &self.input[start..];
        if !rest.starts_with(literal) {
            return None;
        }
        let end = start + literal.len();
        // Keyword literals must not match a prefix of a longer word.
        if literal
            .as_bytes()
            .last()
            .is_some_and(|b| is_word_byte(*b))
            && self.input.as_bytes().get(end).is_some_and(|b| is_word_byte(*b))
        {
            return None;
        }
        Some((end, literal.to_owned()))
    }

    fn match_quoted(&self, start: usize) -> Option<(usize, String)> {
        let bytes = self.input.as_bytes();
        if bytes.get(start) != Some(&b'"') {
            return None;
        }
        let mut text = String::new();
        let mut chars = self.input[start + 1..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return Some((start + 1 + i + 1, text)),
                '\\' => {
                    let (_, escaped) = chars.next()?;
                    text.push(escaped);
                }
                _ => text.push(c),
            }
        }
        // Unterminated string.
        None
    }

    fn match_number(&self, start: usize) -> Option<(usize, String)> {
        let bytes = self.input.as_bytes();
        let mut end = start;
        if bytes.get(end) == Some(&b'-') {
            end += 1;
        }
        let digits_start = end;
        while bytes.get(end).is_some_and(|b| b.is_ascii_digit()) {
            end += 1;
        }
        if end == digits_start {
            return None;
        }
        Some((end, self.input[start..end].to_owned()))
    }
}
