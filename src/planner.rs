#![forbid(unsafe_code)]

//! Query compilation: resolves a parsed [`Query`] against the domain
//! registry and emits a relational [`Plan`].
//!
//! Compilation fails fast: an unknown domain or field, an illegal operator,
//! or a traversal path with no registered edge sequence is a
//! [`CompileError`] naming the offending entry. No best-effort joins are
//! attempted.

use smallvec::SmallVec;
use tracing::debug;

use crate::criteria::{
    resolve_key, CompareOp, Criterion, CriterionValue, CriteriaBuilder,
};
use crate::domain::{Domain, DomainRegistry};
use crate::error::CompileError;
use crate::plan::{
    JoinStep, Plan, Predicate, ProjectedField, QualifiedColumn, SqlOp, SqlParam,
};
use crate::query::Query;

/// Compiles a parsed query into an execution plan.
pub fn compile(
    query: &Query,
    registry: &DomainRegistry,
    max_criteria_depth: usize,
) -> Result<Plan, CompileError> {
    let mut joins: SmallVec<[JoinStep; 4]> = SmallVec::new();

    // Traversal path segments join in the order they appear in the query.
    for window in query.path.windows(2) {
        let (from, to) = (window[0], window[1]);
        let edge = registry
            .edge(from, to)
            .ok_or_else(|| CompileError::NoTraversal {
                from: from.keyword().to_owned(),
                to: to.keyword().to_owned(),
            })?;
        joins.push(JoinStep { edge: edge.clone() });
    }

    // Bind criteria to domains and fields.
    let criterion = query
        .criteria
        .as_deref()
        .map(|pairs| CriteriaBuilder::new(registry, query.leaf(), max_criteria_depth).build(pairs))
        .transpose()?;

    // Criteria bound to domains outside the declared path pull in their
    // registry edges.
    if let Some(criterion) = &criterion {
        let mut referenced = Vec::new();
        criterion.domains(&mut referenced);
        for domain in referenced {
            join_domain(registry, query.root(), &mut joins, domain)?;
        }
    }

    let projection = build_projection(query, registry, &mut joins)?;
    let predicate = criterion.as_ref().map(lower_criterion);

    let mut order_by = vec![QualifiedColumn {
        table: query.root().table(),
        column: registry.identity_field(query.root()).column,
    }];
    for join in &joins {
        order_by.push(QualifiedColumn {
            table: join.target().table(),
            column: registry.identity_field(join.target()).column,
        });
    }

    let plan = Plan {
        action: query.action,
        root: query.root(),
        joins,
        predicate,
        projection,
        order_by,
        limit: query.limit,
        offset: query.offset,
        dry_run: query.dry_run,
    };
    debug!(
        root = plan.root.keyword(),
        joins = plan.joins.len(),
        dry_run = plan.dry_run,
        "compiled plan"
    );
    Ok(plan)
}

/// Ensures `target` is reachable from the join chain, adding intermediate
/// join steps along the shortest registered edge path. Deterministic: edges
/// are explored in registry declaration order starting from the root.
fn join_domain(
    registry: &DomainRegistry,
    root: Domain,
    joins: &mut SmallVec<[JoinStep; 4]>,
    target: Domain,
) -> Result<(), CompileError> {
    let joined = |joins: &SmallVec<[JoinStep; 4]>, domain: Domain| {
        domain == root || joins.iter().any(|j| j.target() == domain)
    };
    if joined(joins, target) {
        return Ok(());
    }

    // Breadth-first over the edge DAG from the already-joined set. Each
    // frontier entry remembers its seed (an already-joined domain) and the
    // hop list from that seed.
    let mut frontier: Vec<(Domain, Domain, Vec<Domain>)> = vec![(root, root, Vec::new())];
    for join in joins.iter() {
        frontier.push((join.target(), join.target(), Vec::new()));
    }
    let mut visited: Vec<Domain> = frontier.iter().map(|(d, _, _)| *d).collect();
    let mut index = 0;
    while index < frontier.len() {
        let (domain, seed, hops) = frontier[index].clone();
        index += 1;
        for edge in registry.edges_from(domain) {
            if visited.contains(&edge.to) {
                continue;
            }
            let mut hops = hops.clone();
            hops.push(edge.to);
            if edge.to == target {
                // Materialize every hop from the seed as a join step.
                let mut from = seed;
                for hop in hops {
                    let edge = registry
                        .edge(from, hop)
                        .expect("path hops follow registered edges");
                    if !joined(joins, hop) {
                        joins.push(JoinStep { edge: edge.clone() });
                    }
                    from = hop;
                }
                return Ok(());
            }
            visited.push(edge.to);
            frontier.push((edge.to, seed, hops));
        }
    }
    Err(CompileError::NoTraversal {
        from: root.keyword().to_owned(),
        to: target.keyword().to_owned(),
    })
}

fn build_projection(
    query: &Query,
    registry: &DomainRegistry,
    joins: &mut SmallVec<[JoinStep; 4]>,
) -> Result<Vec<ProjectedField>, CompileError> {
    let leaf = query.leaf();
    let mut projection: Vec<ProjectedField> = Vec::new();
    let mut push = |projection: &mut Vec<ProjectedField>, domain: Domain, field: &crate::domain::FieldDef| {
        if projection
            .iter()
            .any(|p| p.domain == domain && p.field.name == field.name)
        {
            return;
        }
        let alias = if domain == leaf {
            field.name.to_owned()
        } else {
            format!("{}.{}", domain.keyword(), field.name)
        };
        projection.push(ProjectedField {
            domain,
            field: field.clone(),
            alias,
        });
    };

    // Identity fields are always projected.
    push(&mut projection, leaf, registry.identity_field(leaf));
    if query.include.is_empty() {
        for field in registry.fields(leaf) {
            if field.default_projection {
                push(&mut projection, leaf, field);
            }
        }
    } else {
        for key in &query.include {
            let (domain, field) = resolve_key(registry, leaf, key)?;
            join_domain(registry, query.root(), joins, domain)?;
            push(&mut projection, domain, field);
        }
    }
    Ok(projection)
}

fn lower_criterion(criterion: &Criterion) -> Predicate {
    match criterion {
        Criterion::And(children) => Predicate::And(children.iter().map(lower_criterion).collect()),
        Criterion::Or(children) => Predicate::Or(children.iter().map(lower_criterion).collect()),
        Criterion::Compare(cmp) => {
            let column = QualifiedColumn {
                table: cmp.domain.table(),
                column: cmp.field.column,
            };
            match (&cmp.value, cmp.op) {
                (CriterionValue::Null, CompareOp::Eq) => Predicate::IsNull { column },
                (CriterionValue::Null, _) => Predicate::IsNotNull { column },
                (CriterionValue::ItemType(item_type), op) => match item_type.ordinal() {
                    Some(ordinal) => Predicate::Cmp {
                        column,
                        op: lower_op(op),
                        param: SqlParam::Int(ordinal),
                        escaped_like: false,
                    },
                    // "any" matches every stored ordinal.
                    None => Predicate::True,
                },
                (CriterionValue::Str(text), CompareOp::Match | CompareOp::NotMatch) => {
                    Predicate::Cmp {
                        column,
                        op: lower_op(cmp.op),
                        param: SqlParam::Text(wildcard_to_like(text)),
                        escaped_like: true,
                    }
                }
                (CriterionValue::Str(text), op) => Predicate::Cmp {
                    column,
                    op: lower_op(op),
                    param: SqlParam::Text(text.clone()),
                    escaped_like: false,
                },
                (CriterionValue::Int(n) | CriterionValue::Millis(n), op) => Predicate::Cmp {
                    column,
                    op: lower_op(op),
                    param: SqlParam::Int(*n),
                    escaped_like: false,
                },
            }
        }
    }
}

fn lower_op(op: CompareOp) -> SqlOp {
    match op {
        CompareOp::Eq => SqlOp::Eq,
        CompareOp::Ne => SqlOp::Ne,
        CompareOp::Gt => SqlOp::Gt,
        CompareOp::Gte => SqlOp::Gte,
        CompareOp::Lt => SqlOp::Lt,
        CompareOp::Lte => SqlOp::Lte,
        CompareOp::Match => SqlOp::Like,
        CompareOp::NotMatch => SqlOp::NotLike,
    }
}

/// Translates AQL wildcards to LIKE syntax: `*` matches any run, `?` a
/// single character. Literal `%`, `_`, and `\` are escaped; the renderer
/// attaches `ESCAPE '\'`.
fn wildcard_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}
