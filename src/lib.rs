#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! An engine for a dotted-path artifact query language.
//!
//! Query text names a domain path, an action, a criteria tree, and optional
//! trailers:
//!
//! ```text
//! items.find({"repo":{"$eq":"libs-release"}}).include("name").limit(10)
//! ```
//!
//! The pipeline is staged: [`Engine::parse`] turns text into a [`Query`]
//! (syntax only, criteria kept raw), [`Engine::compile`] binds it against
//! the [`DomainRegistry`] and emits a relational [`Plan`], and the executor
//! runs the plan over SQLite, either materializing every row
//! ([`EagerResult`]) or streaming them ([`LazyResult`]). Each stage fails
//! with its own error kind; [`AqlError`] is the sum the facade returns.
//!
//! ```no_run
//! use aql::{Engine, SqliteStore};
//!
//! # fn main() -> aql::Result<()> {
//! let store = SqliteStore::open_in_memory()?;
//! let engine = Engine::new(store);
//! let result = engine.run_eager(r#"items.find({"repo":"libs-release"})"#)?;
//! for row in result.rows() {
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod criteria;
pub mod domain;
pub mod error;
pub mod executor;
pub mod grammar;
pub mod plan;
pub mod planner;
pub mod populate;
pub mod query;
pub mod result;
pub mod store;

pub use config::EngineOptions;
pub use criteria::{CompareOp, Criterion, ItemTypeValue};
pub use domain::{Domain, DomainRegistry, FieldDef, FieldKind};
pub use error::{AqlError, CompileError, ExecutionError, PopulationError, Result, SyntaxError};
pub use executor::Executor;
pub use grammar::{aql_grammar, Grammar};
pub use plan::Plan;
pub use populate::DateFormat;
pub use query::{Action, Query};
pub use result::{EagerResult, LazyResult, Row, Value};
pub use store::{BuildRecord, ItemRecord, SqliteStore};

/// The staged query pipeline behind one handle.
///
/// Construction builds the domain registry and links the grammar once; both
/// are immutable afterwards, so a single engine serves any number of queries.
pub struct Engine {
    store: SqliteStore,
    registry: DomainRegistry,
    grammar: Grammar,
    options: EngineOptions,
}

impl Engine {
    /// Creates an engine over the store with default options.
    pub fn new(store: SqliteStore) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    /// Creates an engine with explicit tuning options.
    pub fn with_options(store: SqliteStore, options: EngineOptions) -> Self {
        let registry = DomainRegistry::new();
        let grammar = aql_grammar(&registry);
        Self {
            store,
            registry,
            grammar,
            options,
        }
    }

    /// The domain catalog the engine compiles against.
    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    /// Parses query text. Criteria stay raw; catalog binding happens in
    /// [`compile`](Engine::compile).
    pub fn parse(&self, text: &str) -> std::result::Result<Query, SyntaxError> {
        Query::parse(text, &self.grammar, &self.registry)
    }

    /// Compiles a parsed query into an execution plan.
    pub fn compile(&self, query: &Query) -> std::result::Result<Plan, CompileError> {
        planner::compile(query, &self.registry, self.options.max_criteria_depth)
    }

    /// Executes a plan, materializing every row.
    pub fn execute_eager(&self, plan: &Plan) -> Result<EagerResult> {
        Executor::new(self.store.clone(), self.options).execute_eager(plan)
    }

    /// Executes a plan as a streaming result.
    pub fn execute_lazy(&self, plan: &Plan) -> Result<LazyResult> {
        Executor::new(self.store.clone(), self.options).execute_lazy(plan)
    }

    /// Parses, compiles, and executes in one call, materializing every row.
    pub fn run_eager(&self, text: &str) -> Result<EagerResult> {
        let query = self.parse(text)?;
        let plan = self.compile(&query)?;
        self.execute_eager(&plan)
    }

    /// Parses, compiles, and executes in one call, streaming rows.
    pub fn run_lazy(&self, text: &str) -> Result<LazyResult> {
        let query = self.parse(text)?;
        let plan = self.compile(&query)?;
        self.execute_lazy(&plan)
    }
}
