#![forbid(unsafe_code)]

//! The parsed query artifact.
//!
//! A [`Query`] is constructed once per parse by walking the visible parse
//! tree, consumed once by the planner, then discarded. It carries the raw
//! (uninterpreted) criteria tree; domain and field binding happen at compile
//! time so that every catalog problem surfaces as a `CompileError`, not a
//! parse failure.

use serde::Serialize;

use crate::criteria::{canonical_criteria, RawNode, RawValue};
use crate::domain::{Domain, DomainRegistry};
use crate::error::SyntaxError;
use crate::grammar::{parse as parse_tree, Grammar, SyntaxNode};

/// Query action. `update` compiles and executes exactly like `find`; the
/// mutation contract belongs to the storage collaborator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Find,
    Update,
}

impl Action {
    /// Keyword as written in query text.
    pub fn keyword(self) -> &'static str {
        match self {
            Action::Find => "find",
            Action::Update => "update",
        }
    }
}

/// Root artifact produced by parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// The action requested.
    pub action: Action,
    /// Root domain followed by the traversal path, in query order.
    pub path: Vec<Domain>,
    /// Raw criteria pairs, present when the action call had an argument.
    pub criteria: Option<Vec<(String, RawNode)>>,
    /// Field names requested via `include(...)`, possibly qualified.
    pub include: Vec<String>,
    /// Row cap, when given.
    pub limit: Option<u64>,
    /// Row offset; defaults to zero.
    pub offset: u64,
    /// Count-only execution.
    pub dry_run: bool,
}

impl Query {
    /// Parses AQL text into a query.
    pub fn parse(
        text: &str,
        grammar: &Grammar,
        registry: &DomainRegistry,
    ) -> Result<Query, SyntaxError> {
        let tree = parse_tree(grammar, text)?;
        Query::from_tree(&tree, registry)
    }

    /// The root domain (first path segment).
    pub fn root(&self) -> Domain {
        self.path[0]
    }

    /// The leaf domain (last path segment) — the domain unqualified criteria
    /// keys and the default projection bind to.
    pub fn leaf(&self) -> Domain {
        *self.path.last().expect("path has at least one segment")
    }

    fn from_tree(tree: &SyntaxNode, registry: &DomainRegistry) -> Result<Query, SyntaxError> {
        let mut path = Vec::new();
        for node in tree.children_named("domain") {
            let domain = registry
                .domain(&node.text)
                .expect("grammar only matches registered domain keywords");
            path.push(domain);
        }

        let action = match tree.child("action").map(|n| n.text.as_str()) {
            Some("update") => Action::Update,
            _ => Action::Find,
        };

        let criteria = tree.child("object").map(object_pairs).transpose()?;

        let mut include = Vec::new();
        if let Some(node) = tree.child("include") {
            for s in node.children_named("string") {
                include.push(s.text.clone());
            }
        }

        let limit = tree
            .child("limit")
            .map(|n| number_arg::<u64>(n))
            .transpose()?;
        let offset = tree
            .child("offset")
            .map(|n| number_arg::<u64>(n))
            .transpose()?
            .unwrap_or(0);

        let dry_run = match tree.child("dryRun") {
            None => false,
            Some(node) => {
                let arg = node.child("string").expect("grammar requires an argument");
                match arg.text.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(SyntaxError {
                            offset: arg.span.start,
                            expected: vec!["\"true\"".to_owned(), "\"false\"".to_owned()],
                        })
                    }
                }
            }
        };

        Ok(Query {
            action,
            path,
            criteria,
            include,
            limit,
            offset,
            dry_run,
        })
    }

    /// Re-serializes the query into a canonical string whose re-parse yields
    /// an equal query. Trailer order is normalized; pair order inside
    /// criteria is preserved.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        for (i, domain) in self.path.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(domain.keyword());
        }
        out.push('.');
        out.push_str(self.action.keyword());
        out.push('(');
        if let Some(pairs) = &self.criteria {
            out.push_str(&canonical_criteria(pairs));
        }
        out.push(')');
        if !self.include.is_empty() {
            out.push_str(".include(");
            for (i, field) in self.include.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(field);
                out.push('"');
            }
            out.push(')');
        }
        if let Some(limit) = self.limit {
            out.push_str(&format!(".limit({limit})"));
        }
        if self.offset > 0 {
            out.push_str(&format!(".offset({})", self.offset));
        }
        if self.dry_run {
            out.push_str(".dryRun(\"true\")");
        }
        out
    }
}

fn object_pairs(node: &SyntaxNode) -> Result<Vec<(String, RawNode)>, SyntaxError> {
    let mut pairs = Vec::new();
    for pair in node.children_named("pair") {
        let key = pair.children[0].text.clone();
        let value = raw_node(&pair.children[1])?;
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn raw_node(node: &SyntaxNode) -> Result<RawNode, SyntaxError> {
    match node.name {
        "object" => Ok(RawNode::Object(object_pairs(node)?)),
        "array" => {
            let mut items = Vec::new();
            for child in node.children_named("object") {
                items.push(RawNode::Object(object_pairs(child)?));
            }
            Ok(RawNode::Array(items))
        }
        "string" => Ok(RawNode::Scalar(RawValue::Str(node.text.clone()))),
        "number" => {
            let value = node.text.parse::<i64>().map_err(|_| SyntaxError {
                offset: node.span.start,
                expected: vec!["64-bit integer".to_owned()],
            })?;
            Ok(RawNode::Scalar(RawValue::Num(value)))
        }
        "null" => Ok(RawNode::Scalar(RawValue::Null)),
        other => unreachable!("unexpected parse node '{other}' in criteria"),
    }
}

fn number_arg<T: std::str::FromStr>(node: &SyntaxNode) -> Result<T, SyntaxError> {
    let arg = node.child("number").expect("grammar requires an argument");
    arg.text.parse::<T>().map_err(|_| SyntaxError {
        offset: arg.span.start,
        expected: vec!["non-negative 64-bit integer".to_owned()],
    })
}
