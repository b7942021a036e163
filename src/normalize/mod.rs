//! Document normalization - reshape nested share events into relational tables
//!
//! Documents are flattened into one wide table, split into entity tables
//! through a declarative [`EntitySchema`], enriched with resolved country
//! codes, cleaned by an ordered [`RuleSet`] and deduplicated on natural keys.

pub mod table;
pub mod flatten;
pub mod schema;
pub mod split;
pub mod clean;
pub mod dedup;
pub mod country;
pub mod batch;

pub use table::{Row, Table};
pub use flatten::{FlattenConfig, Flattener};
pub use schema::{CountryMapping, EntitySchema, GroupMapping, OrganizationMapping};
pub use split::{EntitySplitter, SplitTables};
pub use clean::{Matcher, Rule, RuleSet};
pub use dedup::{deduplicate, drop_missing_keys};
pub use country::{CountryResolver, NOT_FOUND};
pub use batch::{Batch, Normalizer};
