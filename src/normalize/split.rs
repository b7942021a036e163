use crate::normalize::dedup::{deduplicate, drop_missing_keys};
use crate::normalize::schema::{EntitySchema, GroupMapping, OrganizationMapping};
use crate::normalize::table::Table;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Tables produced by splitting one flattened batch
#[derive(Debug, Clone)]
pub struct SplitTables {
    pub events: Table,
    pub users: Table,
    pub event_properties: Option<Table>,
}

/// Routes flattened columns into entity tables according to an [`EntitySchema`]
pub struct EntitySplitter<'a> {
    schema: &'a EntitySchema,
    separator: String,
}

impl<'a> EntitySplitter<'a> {
    pub fn new(schema: &'a EntitySchema, separator: impl Into<String>) -> Self {
        EntitySplitter {
            schema,
            separator: separator.into(),
        }
    }

    /// Split the flattened rows into events, users and (optionally) event properties
    ///
    /// Group tables are copied out before anything is dropped from the event
    /// table, so every row keeps its `user_id` and `insert_id`.
    pub fn split(&self, mut flat: Table) -> SplitTables {
        let users = self.extract_group(&flat, &self.schema.users, &self.schema.user_renames);
        let mut drop = flat.columns_matching(|c| self.schema.users.owns(c, &self.separator));

        let event_properties = self.schema.event_properties.as_ref().map(|group| {
            drop.extend(flat.columns_matching(|c| group.owns(c, &self.separator)));
            self.extract_group(&flat, group, &Default::default())
        });

        drop.extend(self.schema.internal_columns.iter().cloned());
        flat.drop_columns(&drop);
        flat.name = self.schema.events_entity.clone();

        debug!(
            events = flat.columns().len(),
            users = users.columns().len(),
            "Split columns into entity tables"
        );

        SplitTables {
            events: flat,
            users,
            event_properties,
        }
    }

    /// Copy one property group into its own table, keyed by the group's join key
    ///
    /// A batch in which no document has the group still yields one row per
    /// document holding only the join key.
    pub fn extract_group(
        &self,
        flat: &Table,
        group: &GroupMapping,
        renames: &BTreeMap<String, String>,
    ) -> Table {
        let prefix = group.prefix(&self.separator);
        let columns = flat.columns_matching(|c| c.starts_with(&prefix) && c.len() > prefix.len());

        let mut table = flat.select(group.entity.clone(), &columns);
        table.strip_prefix(&prefix);
        table.rename_columns(|c| renames.get(c).cloned());

        let keys: Vec<Value> = match flat.column_values(&group.join_key) {
            Some(values) => values.into_iter().cloned().collect(),
            None => vec![Value::Null; flat.len()],
        };
        table.push_column(group.join_key.clone(), keys);
        table
    }

    /// Carve organizations out of the user table
    ///
    /// Rows without an organization key are not kept. The key stays on the
    /// user table as its foreign reference; the other organization columns
    /// are removed from it.
    pub fn extract_organizations(&self, users: &mut Table) -> Table {
        let mapping: &OrganizationMapping = &self.schema.organizations;

        let mut organizations = users.select(mapping.entity.clone(), &mapping.columns);
        let missing = drop_missing_keys(&mut organizations, &mapping.key);
        let duplicates = deduplicate(&mut organizations, &[mapping.key.as_str()]);
        debug!(
            kept = organizations.len(),
            missing,
            duplicates,
            "Extracted organizations"
        );

        users.drop_columns(&mapping.drop_from_users);
        organizations
    }
}
