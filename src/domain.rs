//! Immutable catalog of queryable domains, their typed fields, and the legal
//! domain-to-domain traversal edges.
//!
//! The registry is a plain value constructed once at process start and passed
//! by reference into the parser and planner. Lookups are pure functions; an
//! unknown domain or field is reported by the planner as a [`CompileError`],
//! never a panic.
//!
//! [`CompileError`]: crate::error::CompileError

use std::collections::HashMap;

use serde::Serialize;

/// A queryable entity kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Stored artifacts and folders.
    Items,
    /// Download statistics attached to items.
    Stats,
    /// Key/value properties attached to items.
    Properties,
    /// Archive payloads attached to items.
    Archives,
    /// Entries inside an archive payload.
    Entries,
    /// Build records.
    Builds,
}

impl Domain {
    /// Canonical keyword as written in query text.
    pub fn keyword(self) -> &'static str {
        match self {
            Domain::Items => "items",
            Domain::Stats => "stats",
            Domain::Properties => "properties",
            Domain::Archives => "archives",
            Domain::Entries => "entries",
            Domain::Builds => "builds",
        }
    }

    /// Backing table in the relational store.
    pub fn table(self) -> &'static str {
        match self {
            Domain::Items => "items",
            Domain::Stats => "stats",
            Domain::Properties => "properties",
            Domain::Archives => "archives",
            Domain::Entries => "archive_entries",
            Domain::Builds => "builds",
        }
    }
}

/// Storage kind of a field. The populator matches exhaustively on this enum,
/// so adding a kind is a compile-time exhaustiveness check rather than a
/// runtime "unexpected field" path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    /// UTF-8 text column.
    String,
    /// 32-bit-ranged integer column (stored as i64).
    Integer,
    /// 64-bit integer column.
    LongInt,
    /// Epoch-milliseconds column; zero means "absent".
    Date,
    /// Ordinal-encoded item type (folder/file).
    ItemType,
}

impl FieldKind {
    /// Human-readable kind name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::LongInt => "longInt",
            FieldKind::Date => "date",
            FieldKind::ItemType => "itemType",
        }
    }
}

/// A typed, named attribute of a domain, mapped 1:1 to a storage column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    /// Name as written in query text.
    pub name: &'static str,
    /// Physical column on the domain's table.
    pub column: &'static str,
    /// Declared kind.
    pub kind: FieldKind,
    /// Identity fields are always projected.
    pub identity: bool,
    /// Member of the domain's default projection.
    pub default_projection: bool,
}

/// A directed, legal sub-domain traversal. Each edge used by a query
/// contributes exactly one join step to the plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeDef {
    /// Left side of the dotted path.
    pub from: Domain,
    /// Right side of the dotted path.
    pub to: Domain,
    /// Join column on `from`'s table.
    pub from_column: &'static str,
    /// Join column on `to`'s table.
    pub to_column: &'static str,
}

#[derive(Clone, Debug)]
struct DomainDef {
    domain: Domain,
    fields: Vec<FieldDef>,
}

/// The immutable domain catalog.
#[derive(Clone, Debug)]
pub struct DomainRegistry {
    domains: Vec<DomainDef>,
    edges: Vec<EdgeDef>,
    keywords: HashMap<&'static str, Domain>,
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn field(
    name: &'static str,
    column: &'static str,
    kind: FieldKind,
    default_projection: bool,
) -> FieldDef {
    FieldDef {
        name,
        column,
        kind,
        identity: false,
        default_projection,
    }
}

fn identity(name: &'static str, column: &'static str) -> FieldDef {
    FieldDef {
        name,
        column,
        kind: FieldKind::LongInt,
        identity: true,
        default_projection: true,
    }
}

impl DomainRegistry {
    /// Builds the full catalog. The field sets and edge table are fixed for
    /// the lifetime of the value.
    pub fn new() -> Self {
        use FieldKind::*;

        let domains = vec![
            DomainDef {
                domain: Domain::Items,
                fields: vec![
                    identity("id", "id"),
                    field("repo", "repo", String, true),
                    field("path", "path", String, true),
                    field("name", "name", String, true),
                    field("type", "type", ItemType, true),
                    field("depth", "depth", Integer, false),
                    field("size", "size", LongInt, true),
                    field("created", "created", Date, true),
                    field("created_by", "created_by", String, false),
                    field("modified", "modified", Date, true),
                    field("modified_by", "modified_by", String, false),
                    field("updated", "updated", Date, false),
                    field("sha1", "sha1", String, false),
                    field("md5", "md5", String, false),
                    field("sha256", "sha256", String, false),
                ],
            },
            DomainDef {
                domain: Domain::Stats,
                fields: vec![
                    identity("id", "id"),
                    field("downloads", "downloads", Integer, true),
                    field("downloaded", "downloaded", Date, true),
                    field("downloaded_by", "downloaded_by", String, true),
                ],
            },
            DomainDef {
                domain: Domain::Properties,
                fields: vec![
                    identity("id", "id"),
                    field("key", "prop_key", String, true),
                    field("value", "prop_value", String, true),
                ],
            },
            DomainDef {
                domain: Domain::Archives,
                fields: vec![identity("id", "id")],
            },
            DomainDef {
                domain: Domain::Entries,
                fields: vec![
                    identity("id", "id"),
                    field("name", "name", String, true),
                    field("path", "path", String, true),
                ],
            },
            DomainDef {
                domain: Domain::Builds,
                fields: vec![
                    identity("id", "id"),
                    field("name", "build_name", String, true),
                    field("number", "build_number", String, true),
                    field("url", "build_url", String, false),
                    field("created", "created", Date, true),
                    field("created_by", "created_by", String, false),
                ],
            },
        ];

        // Edges form a DAG per root domain; cycles would make join
        // compilation ambiguous.
        let edges = vec![
            EdgeDef {
                from: Domain::Items,
                to: Domain::Stats,
                from_column: "id",
                to_column: "item_id",
            },
            EdgeDef {
                from: Domain::Items,
                to: Domain::Properties,
                from_column: "id",
                to_column: "item_id",
            },
            EdgeDef {
                from: Domain::Items,
                to: Domain::Archives,
                from_column: "id",
                to_column: "item_id",
            },
            EdgeDef {
                from: Domain::Archives,
                to: Domain::Entries,
                from_column: "id",
                to_column: "archive_id",
            },
        ];

        let mut keywords = HashMap::new();
        // Canonical plural names plus the singular spellings used by
        // qualified criteria keys ("archives.entry.name").
        for (kw, domain) in [
            ("items", Domain::Items),
            ("item", Domain::Items),
            ("stats", Domain::Stats),
            ("stat", Domain::Stats),
            ("statistics", Domain::Stats),
            ("properties", Domain::Properties),
            ("property", Domain::Properties),
            ("archives", Domain::Archives),
            ("archive", Domain::Archives),
            ("entries", Domain::Entries),
            ("entry", Domain::Entries),
            ("builds", Domain::Builds),
            ("build", Domain::Builds),
        ] {
            keywords.insert(kw, domain);
        }

        Self {
            domains,
            edges,
            keywords,
        }
    }

    /// Resolves a domain keyword, accepting singular aliases.
    pub fn domain(&self, keyword: &str) -> Option<Domain> {
        self.keywords.get(keyword).copied()
    }

    /// All registered fields of a domain, in declaration order.
    pub fn fields(&self, domain: Domain) -> &[FieldDef] {
        &self
            .domains
            .iter()
            .find(|d| d.domain == domain)
            .expect("every domain variant is registered")
            .fields
    }

    /// Looks up a single field by name.
    pub fn field(&self, domain: Domain, name: &str) -> Option<&FieldDef> {
        self.fields(domain).iter().find(|f| f.name == name)
    }

    /// The identity field of a domain.
    pub fn identity_field(&self, domain: Domain) -> &FieldDef {
        self.fields(domain)
            .iter()
            .find(|f| f.identity)
            .expect("every domain declares an identity field")
    }

    /// The registered edge between two domains, if any.
    pub fn edge(&self, from: Domain, to: Domain) -> Option<&EdgeDef> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    /// All edges leaving a domain.
    pub fn edges_from(&self, from: Domain) -> impl Iterator<Item = &EdgeDef> {
        self.edges.iter().filter(move |e| e.from == from)
    }

    /// Canonical domain keywords, used to build grammar terminals.
    pub fn domain_keywords(&self) -> Vec<&'static str> {
        let mut keywords: Vec<&'static str> = self.keywords.keys().copied().collect();
        // Longest first so "items" wins over "item" in ordered alternation.
        keywords.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        keywords
    }
}
