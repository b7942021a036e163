use crate::normalize::clean::RuleSet;
use crate::normalize::country::CountryResolver;
use crate::normalize::dedup::deduplicate;
use crate::normalize::flatten::{FlattenConfig, Flattener};
use crate::normalize::schema::EntitySchema;
use crate::normalize::split::EntitySplitter;
use crate::normalize::table::Table;
use serde_json::Value;
use tracing::info;

/// The cleaned, deduplicated tables of one run
#[derive(Debug, Clone)]
pub struct Batch {
    pub events: Table,
    pub users: Table,
    pub organizations: Table,
    pub countries: Table,
    pub event_properties: Option<Table>,
}

impl Batch {
    /// Tables in the order they are written
    pub fn tables(&self) -> Vec<&Table> {
        let mut tables = vec![&self.events, &self.users, &self.organizations, &self.countries];
        if let Some(props) = &self.event_properties {
            tables.push(props);
        }
        tables
    }
}

/// Flatten, split, resolve, clean and deduplicate a batch of documents
pub struct Normalizer {
    flattener: Flattener,
    schema: EntitySchema,
    rules: RuleSet,
}

impl Normalizer {
    pub fn new(flatten: FlattenConfig, schema: EntitySchema) -> Self {
        Normalizer {
            flattener: Flattener::new(flatten),
            schema,
            rules: RuleSet::share_events(),
        }
    }

    /// Replace the event-table cleaning rules
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn normalize(&self, documents: Vec<Value>) -> Batch {
        let schema = &self.schema;
        let flat = self
            .flattener
            .flatten_all(&schema.events_entity, documents);

        let splitter = EntitySplitter::new(schema, self.flattener.separator());
        let split = splitter.split(flat);
        let mut events = split.events;
        let mut users = split.users;
        let mut event_properties = split.event_properties;

        deduplicate(&mut users, &[schema.users.join_key.as_str()]);
        deduplicate(&mut events, &[schema.event_key.as_str()]);
        if let (Some(props), Some(group)) = (event_properties.as_mut(), &schema.event_properties) {
            deduplicate(props, &[group.join_key.as_str()]);
        }

        let organizations = splitter.extract_organizations(&mut users);
        let countries = CountryResolver::new().extract(&mut events, &schema.countries);
        self.rules.apply(&mut events);

        info!(
            events = events.len(),
            users = users.len(),
            organizations = organizations.len(),
            countries = countries.len(),
            event_properties = event_properties.as_ref().map_or(0, Table::len),
            "Normalized batch"
        );

        Batch {
            events,
            users,
            organizations,
            countries,
            event_properties,
        }
    }
}
