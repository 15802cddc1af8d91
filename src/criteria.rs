#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Criteria trees: the raw JSON-subset representation produced by the parser
//! and the typed, domain-bound criterion tree consumed by the planner.
//!
//! Binding validates that every operator is legal for its field's kind and
//! that literal values can be interpreted for that kind. Nested
//! same-operator groups are flattened while building; flattening never
//! changes evaluation semantics because the output is a predicate tree, not
//! an inline evaluation.

use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{Domain, DomainRegistry, FieldDef, FieldKind};
use crate::error::CompileError;

/// Scalar literal as written in the query text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RawValue {
    /// Quoted string literal.
    Str(String),
    /// Integer literal.
    Num(i64),
    /// The `null` literal.
    Null,
}

/// Criteria value tree mirroring the JSON subset one-to-one. Produced by
/// parse-tree extraction, interpreted only at compile time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RawNode {
    /// Scalar leaf.
    Scalar(RawValue),
    /// Object as an ordered pair list (order is preserved for canonical
    /// re-serialization).
    Object(Vec<(String, RawNode)>),
    /// Array of objects (only legal under `$and`/`$or`).
    Array(Vec<RawNode>),
}

/// Comparison operators accepted in criteria.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Match,
    NotMatch,
}

impl CompareOp {
    /// Parses a `$`-prefixed operator token.
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "$eq" => CompareOp::Eq,
            "$ne" => CompareOp::Ne,
            "$gt" => CompareOp::Gt,
            "$gte" => CompareOp::Gte,
            "$lt" => CompareOp::Lt,
            "$lte" => CompareOp::Lte,
            "$match" => CompareOp::Match,
            "$nmatch" => CompareOp::NotMatch,
            _ => return None,
        })
    }

    /// Canonical token form.
    pub fn token(self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Gt => "$gt",
            CompareOp::Gte => "$gte",
            CompareOp::Lt => "$lt",
            CompareOp::Lte => "$lte",
            CompareOp::Match => "$match",
            CompareOp::NotMatch => "$nmatch",
        }
    }

    fn legal_for(self, kind: FieldKind) -> bool {
        match kind {
            FieldKind::String => matches!(
                self,
                CompareOp::Eq | CompareOp::Ne | CompareOp::Match | CompareOp::NotMatch
            ),
            FieldKind::Integer | FieldKind::LongInt | FieldKind::Date => matches!(
                self,
                CompareOp::Eq
                    | CompareOp::Ne
                    | CompareOp::Gt
                    | CompareOp::Gte
                    | CompareOp::Lt
                    | CompareOp::Lte
            ),
            FieldKind::ItemType => matches!(self, CompareOp::Eq | CompareOp::Ne),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Item type literal accepted for `type` comparisons. `Any` compiles to an
/// always-true predicate; only folder and file ordinals are stored.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemTypeValue {
    Folder,
    File,
    Any,
}

impl ItemTypeValue {
    /// Stored ordinal, `None` for `Any`.
    pub fn ordinal(self) -> Option<i64> {
        match self {
            ItemTypeValue::Folder => Some(0),
            ItemTypeValue::File => Some(1),
            ItemTypeValue::Any => None,
        }
    }

    /// Decodes a stored ordinal.
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            0 => Some(ItemTypeValue::Folder),
            1 => Some(ItemTypeValue::File),
            _ => None,
        }
    }

    /// Name as written in criteria and result rows.
    pub fn name(self) -> &'static str {
        match self {
            ItemTypeValue::Folder => "folder",
            ItemTypeValue::File => "file",
            ItemTypeValue::Any => "any",
        }
    }
}

/// Literal value bound to a field's kind.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum CriterionValue {
    /// String comparison value.
    Str(String),
    /// Numeric comparison value.
    Int(i64),
    /// Date comparison value as epoch milliseconds.
    Millis(i64),
    /// Item type comparison value.
    ItemType(ItemTypeValue),
    /// Null: compiles to IS NULL / IS NOT NULL, never `= NULL`.
    Null,
}

/// Leaf comparison bound to a domain and field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comparison {
    /// Domain the comparison binds to.
    pub domain: Domain,
    /// Resolved field definition.
    pub field: FieldDef,
    /// Operator.
    pub op: CompareOp,
    /// Interpreted literal.
    pub value: CriterionValue,
}

/// Immutable boolean criteria tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Criterion {
    /// Conjunction; children of nested `And`s are merged in.
    And(Vec<Criterion>),
    /// Disjunction; children of nested `Or`s are merged in.
    Or(Vec<Criterion>),
    /// Leaf comparison.
    Compare(Comparison),
}

impl Criterion {
    /// Every domain referenced by comparisons in the tree.
    pub fn domains(&self, out: &mut Vec<Domain>) {
        match self {
            Criterion::And(children) | Criterion::Or(children) => {
                for child in children {
                    child.domains(out);
                }
            }
            Criterion::Compare(cmp) => {
                if !out.contains(&cmp.domain) {
                    out.push(cmp.domain);
                }
            }
        }
    }
}

fn and(mut children: Vec<Criterion>) -> Criterion {
    if children.len() == 1 {
        children.remove(0)
    } else {
        Criterion::And(flatten(children, true))
    }
}

fn or(mut children: Vec<Criterion>) -> Criterion {
    if children.len() == 1 {
        children.remove(0)
    } else {
        Criterion::Or(flatten(children, false))
    }
}

fn flatten(children: Vec<Criterion>, conjunction: bool) -> Vec<Criterion> {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Criterion::And(grand) if conjunction => flat.extend(grand),
            Criterion::Or(grand) if !conjunction => flat.extend(grand),
            other => flat.push(other),
        }
    }
    flat
}

/// Builds the typed criterion tree from the raw pair list of a criteria
/// object. Unqualified keys bind to `leaf`; dotted keys resolve their prefix
/// through the registry.
pub struct CriteriaBuilder<'r> {
    registry: &'r DomainRegistry,
    leaf: Domain,
    max_depth: usize,
}

impl<'r> CriteriaBuilder<'r> {
    /// Creates a builder binding unqualified fields to `leaf`.
    pub fn new(registry: &'r DomainRegistry, leaf: Domain, max_depth: usize) -> Self {
        Self {
            registry,
            leaf,
            max_depth,
        }
    }

    /// Builds the tree for a criteria object's pairs.
    pub fn build(&self, pairs: &[(String, RawNode)]) -> Result<Criterion, CompileError> {
        self.object(pairs, 0)
    }

    fn object(&self, pairs: &[(String, RawNode)], depth: usize) -> Result<Criterion, CompileError> {
        if depth >= self.max_depth {
            return Err(CompileError::CriteriaTooDeep {
                depth,
                max: self.max_depth,
            });
        }
        let mut children = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            children.push(self.pair(key, value, depth)?);
        }
        Ok(and(children))
    }

    fn pair(&self, key: &str, value: &RawNode, depth: usize) -> Result<Criterion, CompileError> {
        match key {
            "$and" => Ok(and(self.group(key, value, depth)?)),
            "$or" => Ok(or(self.group(key, value, depth)?)),
            _ => self.field_pair(key, value, depth),
        }
    }

    fn group(
        &self,
        key: &str,
        value: &RawNode,
        depth: usize,
    ) -> Result<Vec<Criterion>, CompileError> {
        let RawNode::Array(items) = value else {
            return Err(CompileError::IllegalValue {
                field: key.to_owned(),
                detail: "expects an array of criteria objects".to_owned(),
            });
        };
        let mut children = Vec::with_capacity(items.len());
        for item in items {
            let RawNode::Object(pairs) = item else {
                return Err(CompileError::IllegalValue {
                    field: key.to_owned(),
                    detail: "array elements must be criteria objects".to_owned(),
                });
            };
            children.push(self.object(pairs, depth + 1)?);
        }
        Ok(children)
    }

    fn field_pair(
        &self,
        key: &str,
        value: &RawNode,
        depth: usize,
    ) -> Result<Criterion, CompileError> {
        let (domain, field) = self.resolve_field(key)?;
        match value {
            // Bare scalar is shorthand for $eq.
            RawNode::Scalar(scalar) => {
                Ok(Criterion::Compare(self.comparison(
                    domain,
                    field,
                    CompareOp::Eq,
                    scalar,
                )?))
            }
            RawNode::Object(op_pairs) => {
                if depth + 1 >= self.max_depth {
                    return Err(CompileError::CriteriaTooDeep {
                        depth: depth + 1,
                        max: self.max_depth,
                    });
                }
                let mut children = Vec::with_capacity(op_pairs.len());
                for (op_token, op_value) in op_pairs {
                    let Some(op) = CompareOp::from_token(op_token) else {
                        return Err(CompileError::IllegalOperator {
                            op: op_token.clone(),
                            field: field.name.to_owned(),
                            kind: field.kind.name().to_owned(),
                        });
                    };
                    let RawNode::Scalar(scalar) = op_value else {
                        return Err(CompileError::IllegalValue {
                            field: field.name.to_owned(),
                            detail: format!("operator {op} expects a scalar value"),
                        });
                    };
                    children.push(Criterion::Compare(
                        self.comparison(domain, field, op, scalar)?,
                    ));
                }
                if children.is_empty() {
                    return Err(CompileError::IllegalValue {
                        field: field.name.to_owned(),
                        detail: "empty operator object".to_owned(),
                    });
                }
                Ok(and(children))
            }
            RawNode::Array(_) => Err(CompileError::IllegalValue {
                field: field.name.to_owned(),
                detail: "arrays are only legal under $and/$or".to_owned(),
            }),
        }
    }

    fn resolve_field(&self, key: &str) -> Result<(Domain, &'r FieldDef), CompileError> {
        resolve_key(self.registry, self.leaf, key)
    }

    fn comparison(
        &self,
        domain: Domain,
        field: &FieldDef,
        op: CompareOp,
        scalar: &RawValue,
    ) -> Result<Comparison, CompileError> {
        if !op.legal_for(field.kind) {
            return Err(CompileError::IllegalOperator {
                op: op.token().to_owned(),
                field: field.name.to_owned(),
                kind: field.kind.name().to_owned(),
            });
        }
        let value = self.interpret(field, op, scalar)?;
        Ok(Comparison {
            domain,
            field: field.clone(),
            op,
            value,
        })
    }

    fn interpret(
        &self,
        field: &FieldDef,
        op: CompareOp,
        scalar: &RawValue,
    ) -> Result<CriterionValue, CompileError> {
        let illegal = |detail: String| CompileError::IllegalValue {
            field: field.name.to_owned(),
            detail,
        };
        if matches!(scalar, RawValue::Null) {
            // equals(null) compiles to IS NULL, never `= NULL`.
            if matches!(op, CompareOp::Eq | CompareOp::Ne) {
                return Ok(CriterionValue::Null);
            }
            return Err(illegal(format!("null is only legal with $eq/$ne, not {op}")));
        }
        match field.kind {
            FieldKind::String => match scalar {
                RawValue::Str(text) => Ok(CriterionValue::Str(text.clone())),
                RawValue::Num(n) => Ok(CriterionValue::Str(n.to_string())),
                RawValue::Null => unreachable!("null handled above"),
            },
            FieldKind::Integer | FieldKind::LongInt => match scalar {
                RawValue::Num(n) => Ok(CriterionValue::Int(*n)),
                RawValue::Str(text) => text
                    .parse::<i64>()
                    .map(CriterionValue::Int)
                    .map_err(|_| illegal(format!("'{text}' is not an integer"))),
                RawValue::Null => unreachable!("null handled above"),
            },
            FieldKind::Date => match scalar {
                RawValue::Num(millis) => Ok(CriterionValue::Millis(*millis)),
                RawValue::Str(text) => OffsetDateTime::parse(text, &Rfc3339)
                    .map(|dt| CriterionValue::Millis((dt.unix_timestamp_nanos() / 1_000_000) as i64))
                    .map_err(|_| illegal(format!("'{text}' is not an RFC 3339 timestamp"))),
                RawValue::Null => unreachable!("null handled above"),
            },
            FieldKind::ItemType => match scalar {
                RawValue::Str(text) => match text.as_str() {
                    "folder" => Ok(CriterionValue::ItemType(ItemTypeValue::Folder)),
                    "file" => Ok(CriterionValue::ItemType(ItemTypeValue::File)),
                    "any" => Ok(CriterionValue::ItemType(ItemTypeValue::Any)),
                    other => Err(illegal(format!(
                        "'{other}' is not an item type (folder, file, any)"
                    ))),
                },
                _ => Err(illegal("item type expects a string value".to_owned())),
            },
        }
    }
}

/// Resolves a possibly dotted field key. The last segment is the field;
/// every prefix segment must name a registered domain and the last prefix
/// segment is the binding domain. Unqualified keys bind to `leaf`.
pub fn resolve_key<'r>(
    registry: &'r DomainRegistry,
    leaf: Domain,
    key: &str,
) -> Result<(Domain, &'r FieldDef), CompileError> {
    let mut segments: Vec<&str> = key.split('.').collect();
    let field_name = segments.pop().unwrap_or(key);
    let mut domain = leaf;
    for segment in &segments {
        domain = registry
            .domain(segment)
            .ok_or_else(|| CompileError::UnknownDomain {
                name: (*segment).to_owned(),
            })?;
    }
    let field =
        registry
            .field(domain, field_name)
            .ok_or_else(|| CompileError::UnknownField {
                domain: domain.keyword().to_owned(),
                field: field_name.to_owned(),
            })?;
    Ok((domain, field))
}

/// Serializes a raw criteria pair list back to its canonical text form.
/// Pair order is preserved, strings are escaped, and the result re-parses to
/// an equal raw tree.
pub fn canonical_criteria(pairs: &[(String, RawNode)]) -> String {
    let mut out = String::new();
    write_object(&mut out, pairs);
    out
}

fn write_object(out: &mut String, pairs: &[(String, RawNode)]) {
    out.push('{');
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        write_node(out, value);
    }
    out.push('}');
}

fn write_node(out: &mut String, node: &RawNode) {
    match node {
        RawNode::Scalar(RawValue::Str(text)) => write_string(out, text),
        RawNode::Scalar(RawValue::Num(n)) => {
            let _ = write!(out, "{n}");
        }
        RawNode::Scalar(RawValue::Null) => out.push_str("null"),
        RawNode::Object(pairs) => write_object(out, pairs),
        RawNode::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_node(out, item);
            }
            out.push(']');
        }
    }
}

fn write_string(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(reg: &DomainRegistry) -> CriteriaBuilder<'_> {
        CriteriaBuilder::new(reg, Domain::Items, 32)
    }

    fn pairs(key: &str, node: RawNode) -> Vec<(String, RawNode)> {
        vec![(key.to_owned(), node)]
    }

    fn op(token: &str, value: RawValue) -> RawNode {
        RawNode::Object(vec![(token.to_owned(), RawNode::Scalar(value))])
    }

    #[test]
    fn bare_scalar_is_eq_shorthand() {
        let reg = DomainRegistry::new();
        let tree = builder(&reg)
            .build(&pairs("repo", RawNode::Scalar(RawValue::Str("libs".into()))))
            .unwrap();
        let Criterion::Compare(cmp) = tree else {
            panic!("expected a single comparison");
        };
        assert_eq!(cmp.op, CompareOp::Eq);
        assert_eq!(cmp.value, CriterionValue::Str("libs".into()));
        assert_eq!(cmp.domain, Domain::Items);
    }

    #[test]
    fn ordering_operator_is_illegal_on_item_type() {
        let reg = DomainRegistry::new();
        let err = builder(&reg)
            .build(&pairs("type", op("$lt", RawValue::Str("file".into()))))
            .unwrap_err();
        assert_eq!(err.code(), "IllegalOperator");
    }

    #[test]
    fn null_compiles_only_with_eq_ne() {
        let reg = DomainRegistry::new();
        let ok = builder(&reg)
            .build(&pairs("path", op("$eq", RawValue::Null)))
            .unwrap();
        let Criterion::Compare(cmp) = ok else {
            panic!("expected comparison");
        };
        assert_eq!(cmp.value, CriterionValue::Null);

        let err = builder(&reg)
            .build(&pairs("size", op("$gt", RawValue::Null)))
            .unwrap_err();
        assert_eq!(err.code(), "IllegalValue");
    }

    #[test]
    fn nested_same_operator_groups_flatten() {
        let reg = DomainRegistry::new();
        let inner = RawNode::Object(vec![
            ("repo".to_owned(), RawNode::Scalar(RawValue::Str("a".into()))),
            ("name".to_owned(), RawNode::Scalar(RawValue::Str("b".into()))),
        ]);
        let outer = pairs(
            "$and",
            RawNode::Array(vec![
                inner,
                RawNode::Object(pairs("path", RawNode::Scalar(RawValue::Str("c".into())))),
            ]),
        );
        let tree = builder(&reg).build(&outer).unwrap();
        let Criterion::And(children) = tree else {
            panic!("expected conjunction");
        };
        // Inner implicit And merged into the outer one.
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| matches!(c, Criterion::Compare(_))));
    }

    #[test]
    fn qualified_key_binds_to_its_domain() {
        let reg = DomainRegistry::new();
        let tree = builder(&reg)
            .build(&pairs("stats.downloads", op("$gt", RawValue::Num(100))))
            .unwrap();
        let Criterion::Compare(cmp) = tree else {
            panic!("expected comparison");
        };
        assert_eq!(cmp.domain, Domain::Stats);
        assert_eq!(cmp.field.name, "downloads");
    }

    #[test]
    fn unknown_field_names_domain_and_field() {
        let reg = DomainRegistry::new();
        let err = builder(&reg)
            .build(&pairs("bogusField", RawNode::Scalar(RawValue::Str("x".into()))))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownField {
                domain: "items".into(),
                field: "bogusField".into(),
            }
        );
    }

    #[test]
    fn rfc3339_date_literals_convert_to_millis() {
        let reg = DomainRegistry::new();
        let tree = builder(&reg)
            .build(&pairs(
                "created",
                op("$gte", RawValue::Str("2024-01-01T00:00:00Z".into())),
            ))
            .unwrap();
        let Criterion::Compare(cmp) = tree else {
            panic!("expected comparison");
        };
        assert_eq!(cmp.value, CriterionValue::Millis(1_704_067_200_000));
    }

    #[test]
    fn depth_budget_is_enforced() {
        let reg = DomainRegistry::new();
        let mut node = RawNode::Object(pairs("repo", RawNode::Scalar(RawValue::Str("x".into()))));
        for _ in 0..40 {
            node = RawNode::Object(pairs("$and", RawNode::Array(vec![node])));
        }
        let RawNode::Object(top) = node else {
            unreachable!()
        };
        let err = builder(&reg).build(&top).unwrap_err();
        assert_eq!(err.code(), "CriteriaTooDeep");
    }

    #[test]
    fn canonical_text_round_trips_escapes() {
        let raw = vec![(
            "name".to_owned(),
            RawNode::Scalar(RawValue::Str("we\"ird\\name".into())),
        )];
        let text = canonical_criteria(&raw);
        assert_eq!(text, r#"{"name":"we\"ird\\name"}"#);
    }
}
