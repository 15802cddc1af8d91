//! The concrete AQL grammar.
//!
//! Surface syntax:
//!
//! ```text
//! <domain>(.<domain>)* . (find|update) ( <criteria>? )
//!     [. include("f", ...)] [. limit(n)] [. offset(n)] [. dryRun("true")]
//! ```
//!
//! Criteria mirror a JSON object subset: `{"field": {"$op": value}}`, with
//! `$and`/`$or` taking arrays of nested objects and a bare scalar standing
//! for `$eq`. The dot path tries the longer sub-domain alternative before
//! falling back to the standalone domain, so the most specific traversal
//! wins.

use crate::domain::DomainRegistry;

use super::{Grammar, GrammarBuilder, ProdRef, TerminalKind};

/// Builds and links the AQL grammar for the given registry's domain
/// keywords. The arena is immutable afterwards; one grammar serves any
/// number of concurrent parses.
pub fn aql_grammar(registry: &DomainRegistry) -> Grammar {
    use TerminalKind::{Empty, Literal, Number, QuotedString};

    let mut g = GrammarBuilder::new();

    let dot = g.terminal(Literal("."));
    let lparen = g.terminal(Literal("("));
    let rparen = g.terminal(Literal(")"));
    let lbrace = g.terminal(Literal("{"));
    let rbrace = g.terminal(Literal("}"));
    let lbracket = g.terminal(Literal("["));
    let rbracket = g.terminal(Literal("]"));
    let comma = g.terminal(Literal(","));
    let colon = g.terminal(Literal(":"));
    let empty = g.terminal(Empty);

    let string = g.token("string", QuotedString);
    let number = g.token("number", Number);
    let null = g.token("null", Literal("null"));

    // Domain keyword terminal per registry entry, longest first so plural
    // names win over their singular aliases.
    let mut keywords: Vec<ProdRef> = Vec::new();
    for keyword in registry.domain_keywords() {
        let id = g.terminal(Literal(keyword));
        keywords.push(id.into());
    }
    let domain = g.fork_node("domain", keywords);

    // path := domain '.' path | domain   (sub-domain alternative first)
    let path_longer = g.forward(vec![domain.into(), dot.into(), ProdRef::Named("path")]);
    let path = g.fork(vec![path_longer.into(), domain.into()]);
    g.define("path", path);

    // Criteria object, a JSON subset.
    let pair_value = g.fork(vec![
        ProdRef::Named("object"),
        ProdRef::Named("array"),
        string.into(),
        number.into(),
        null.into(),
    ]);
    let pair = g.forward_node("pair", vec![string.into(), colon.into(), pair_value.into()]);
    let pairs_longer = g.forward(vec![pair.into(), comma.into(), ProdRef::Named("pairs")]);
    let pairs = g.fork(vec![pairs_longer.into(), pair.into()]);
    g.define("pairs", pairs);
    let pairs_opt = g.fork(vec![pairs.into(), empty.into()]);
    let object = g.forward_node("object", vec![lbrace.into(), pairs_opt.into(), rbrace.into()]);
    g.define("object", object);

    let objects_longer = g.forward(vec![
        object.into(),
        comma.into(),
        ProdRef::Named("objects"),
    ]);
    let objects = g.fork(vec![objects_longer.into(), object.into()]);
    g.define("objects", objects);
    let array = g.forward_node("array", vec![lbracket.into(), objects.into(), rbracket.into()]);
    g.define("array", array);

    // .find(criteria?) / .update(criteria?)
    let find = g.terminal(Literal("find"));
    let update = g.terminal(Literal("update"));
    let action = g.fork_node("action", vec![find.into(), update.into()]);
    let criteria_opt = g.fork(vec![object.into(), empty.into()]);
    let call = g.forward(vec![
        dot.into(),
        action.into(),
        lparen.into(),
        criteria_opt.into(),
        rparen.into(),
    ]);

    // Trailers.
    let strings_longer = g.forward(vec![
        string.into(),
        comma.into(),
        ProdRef::Named("strings"),
    ]);
    let strings = g.fork(vec![strings_longer.into(), string.into()]);
    g.define("strings", strings);

    let include_kw = g.terminal(Literal("include"));
    let include = g.forward_node(
        "include",
        vec![include_kw.into(), lparen.into(), strings.into(), rparen.into()],
    );
    let limit_kw = g.terminal(Literal("limit"));
    let limit = g.forward_node(
        "limit",
        vec![limit_kw.into(), lparen.into(), number.into(), rparen.into()],
    );
    let offset_kw = g.terminal(Literal("offset"));
    let offset = g.forward_node(
        "offset",
        vec![offset_kw.into(), lparen.into(), number.into(), rparen.into()],
    );
    let dry_run_kw = g.terminal(Literal("dryRun"));
    let dry_run = g.forward_node(
        "dryRun",
        vec![dry_run_kw.into(), lparen.into(), string.into(), rparen.into()],
    );

    let trailer_body = g.fork(vec![
        include.into(),
        limit.into(),
        offset.into(),
        dry_run.into(),
    ]);
    let trailer = g.forward(vec![dot.into(), trailer_body.into()]);
    let trailers_longer = g.forward(vec![trailer.into(), ProdRef::Named("trailers")]);
    let trailers = g.fork(vec![trailers_longer.into(), empty.into()]);
    g.define("trailers", trailers);

    let query = g.forward_node(
        "query",
        vec![path.into(), call.into(), ProdRef::Named("trailers")],
    );

    g.link(query.into())
        .expect("AQL grammar declares every named production")
}
