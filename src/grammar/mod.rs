#![forbid(unsafe_code)]

//! Composable grammar primitives for the AQL surface syntax.
//!
//! Productions are declared into an arena and reference each other either by
//! id or by name. Named references are the lazy indirection that makes
//! self-referential productions (dot paths, nested criteria objects)
//! expressible without initialization-order problems: a single link pass
//! resolves every name after all productions are declared and rejects
//! dangling references.
//!
//! Four primitives compose the whole grammar: terminals, forward sequences,
//! ordered forks, and the named (lazy) reference. Every production carries a
//! visibility flag; invisible productions (punctuation, plumbing) are
//! suppressed from the parse tree and their children are spliced upward.

mod aql;
mod parser;

pub use aql::aql_grammar;
pub use parser::{parse, SyntaxNode};

/// Index of a production inside the arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ProdId(u32);

impl ProdId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reference to another production, either already declared or by name.
#[derive(Clone, Debug)]
pub enum ProdRef {
    /// Direct arena index.
    Id(ProdId),
    /// Lazy reference resolved during the link pass.
    Named(&'static str),
}

impl From<ProdId> for ProdRef {
    fn from(id: ProdId) -> Self {
        ProdRef::Id(id)
    }
}

/// Terminal matcher kinds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TerminalKind {
    /// Exact literal. Literals ending in a word character only match on a
    /// word boundary, so `find` does not match a prefix of `finder`.
    Literal(&'static str),
    /// Double-quoted string with backslash escapes.
    QuotedString,
    /// Optionally signed decimal integer.
    Number,
    /// Matches nothing and always succeeds. Used as the empty alternative in
    /// forks ("standalone domain", "no criteria").
    Empty,
}

impl TerminalKind {
    /// Token description reported in syntax errors.
    pub fn expected(&self) -> String {
        match self {
            TerminalKind::Literal(text) => format!("'{text}'"),
            TerminalKind::QuotedString => "quoted string".to_owned(),
            TerminalKind::Number => "number".to_owned(),
            TerminalKind::Empty => "nothing".to_owned(),
        }
    }
}

/// Structure of a production before linking.
#[derive(Clone, Debug)]
enum ProdKind {
    Terminal(TerminalKind),
    Forward(Vec<ProdRef>),
    Fork(Vec<ProdRef>),
}

#[derive(Clone, Debug)]
struct Production {
    /// Node name contributed to the parse tree when visible.
    name: Option<&'static str>,
    visible: bool,
    kind: ProdKind,
}

/// Structure of a production after the link pass.
#[derive(Clone, Debug)]
pub(crate) enum LinkedKind {
    Terminal(TerminalKind),
    Forward(Vec<ProdId>),
    Fork(Vec<ProdId>),
}

#[derive(Clone, Debug)]
pub(crate) struct LinkedProduction {
    pub(crate) name: Option<&'static str>,
    pub(crate) visible: bool,
    pub(crate) kind: LinkedKind,
}

/// A fully linked grammar ready for parsing.
#[derive(Clone, Debug)]
pub struct Grammar {
    prods: Vec<LinkedProduction>,
    root: ProdId,
}

impl Grammar {
    pub(crate) fn production(&self, id: ProdId) -> &LinkedProduction {
        &self.prods[id.index()]
    }

    pub(crate) fn root(&self) -> ProdId {
        self.root
    }
}

/// Arena-based builder. Declaration order is free; forward references use
/// [`ProdRef::Named`] and are resolved by [`GrammarBuilder::link`].
pub struct GrammarBuilder {
    prods: Vec<Production>,
    names: std::collections::HashMap<&'static str, ProdId>,
}

impl GrammarBuilder {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            prods: Vec::new(),
            names: std::collections::HashMap::new(),
        }
    }

    fn push(&mut self, prod: Production) -> ProdId {
        let id = ProdId(self.prods.len() as u32);
        self.prods.push(prod);
        id
    }

    /// Declares an invisible terminal (punctuation, structural keywords).
    pub fn terminal(&mut self, kind: TerminalKind) -> ProdId {
        self.push(Production {
            name: None,
            visible: false,
            kind: ProdKind::Terminal(kind),
        })
    }

    /// Declares a visible terminal contributing a named node with the
    /// matched text.
    pub fn token(&mut self, name: &'static str, kind: TerminalKind) -> ProdId {
        self.push(Production {
            name: Some(name),
            visible: true,
            kind: ProdKind::Terminal(kind),
        })
    }

    /// Declares an invisible sequence; children splice into the parent.
    pub fn forward(&mut self, children: Vec<ProdRef>) -> ProdId {
        self.push(Production {
            name: None,
            visible: false,
            kind: ProdKind::Forward(children),
        })
    }

    /// Declares a visible sequence contributing a named node.
    pub fn forward_node(&mut self, name: &'static str, children: Vec<ProdRef>) -> ProdId {
        self.push(Production {
            name: Some(name),
            visible: true,
            kind: ProdKind::Forward(children),
        })
    }

    /// Declares an invisible ordered alternation. Alternatives are tried in
    /// declaration order and the first success wins, so the more specific
    /// (longer) alternative must come first.
    pub fn fork(&mut self, alternatives: Vec<ProdRef>) -> ProdId {
        self.push(Production {
            name: None,
            visible: false,
            kind: ProdKind::Fork(alternatives),
        })
    }

    /// Declares a visible ordered alternation contributing a named node.
    pub fn fork_node(&mut self, name: &'static str, alternatives: Vec<ProdRef>) -> ProdId {
        self.push(Production {
            name: Some(name),
            visible: true,
            kind: ProdKind::Fork(alternatives),
        })
    }

    /// Registers a name other productions may reference lazily.
    pub fn define(&mut self, name: &'static str, id: ProdId) {
        let previous = self.names.insert(name, id);
        debug_assert!(previous.is_none(), "duplicate production name '{name}'");
    }

    /// Resolves every named reference and returns the linked grammar.
    ///
    /// Fails when a reference names a production that was never defined.
    pub fn link(self, root: ProdRef) -> Result<Grammar, LinkError> {
        let resolve = |r: &ProdRef| -> Result<ProdId, LinkError> {
            match r {
                ProdRef::Id(id) => Ok(*id),
                ProdRef::Named(name) => self
                    .names
                    .get(name)
                    .copied()
                    .ok_or(LinkError::Dangling { name }),
            }
        };

        let mut prods = Vec::with_capacity(self.prods.len());
        for prod in &self.prods {
            let kind = match &prod.kind {
                ProdKind::Terminal(kind) => LinkedKind::Terminal(kind.clone()),
                ProdKind::Forward(children) => LinkedKind::Forward(
                    children.iter().map(resolve).collect::<Result<_, _>>()?,
                ),
                ProdKind::Fork(alternatives) => LinkedKind::Fork(
                    alternatives.iter().map(resolve).collect::<Result<_, _>>()?,
                ),
            };
            prods.push(LinkedProduction {
                name: prod.name,
                visible: prod.visible,
                kind,
            });
        }
        let root = resolve(&root)?;
        Ok(Grammar { prods, root })
    }
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Grammar construction failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// A lazy reference named a production that was never defined.
    #[error("grammar references undefined production '{name}'")]
    Dangling { name: &'static str },
}
