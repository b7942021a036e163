//! Declarative mapping from flattened columns to entity tables
//!
//! Every routing decision the splitter makes is read from an
//! [`EntitySchema`], so the column lists can be changed from configuration
//! without touching the transform itself.

use serde::Deserialize;
use std::collections::BTreeMap;

/// A nested property group that becomes its own table
#[derive(Debug, Clone, Deserialize)]
pub struct GroupMapping {
    /// Destination entity name (e.g., "users")
    pub entity: String,

    /// Top-level group name in the source documents (e.g., "user_properties")
    pub group: String,

    /// Top-level column copied into the group table as its join key
    pub join_key: String,
}

impl GroupMapping {
    pub fn new(
        entity: impl Into<String>,
        group: impl Into<String>,
        join_key: impl Into<String>,
    ) -> Self {
        GroupMapping {
            entity: entity.into(),
            group: group.into(),
            join_key: join_key.into(),
        }
    }

    /// Column prefix for this group under the given separator
    pub fn prefix(&self, separator: &str) -> String {
        format!("{}{}", self.group, separator)
    }

    /// Whether a flattened column belongs to this group
    pub fn owns(&self, column: &str, separator: &str) -> bool {
        column == self.group || column.starts_with(&self.prefix(separator))
    }
}

/// Organization columns carved out of the user table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrganizationMapping {
    pub entity: String,

    /// Natural key, also kept on users as the foreign key
    pub key: String,

    /// Columns copied into the organization table (key included)
    pub columns: Vec<String>,

    /// Columns removed from users once organizations are extracted
    pub drop_from_users: Vec<String>,
}

impl Default for OrganizationMapping {
    fn default() -> Self {
        OrganizationMapping {
            entity: String::from("organizations"),
            key: String::from("organization_id"),
            columns: strings(&["organization_id", "organization_name", "organization_type"]),
            drop_from_users: strings(&[
                "organization_name",
                "organization_type",
                "organization___v",
                "organization_status",
                "organization_logo_url_url",
                "organization_owner_id",
                "organization_updated_at",
                "organization_code",
                "organization_created_at",
            ]),
        }
    }
}

/// Country name column resolved into a code and its own table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CountryMapping {
    pub entity: String,
    pub name_column: String,
    pub code_column: String,
}

impl Default for CountryMapping {
    fn default() -> Self {
        CountryMapping {
            entity: String::from("countries"),
            name_column: String::from("country"),
            code_column: String::from("country_code"),
        }
    }
}

/// Full routing schema for one batch of share events
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntitySchema {
    /// Entity name of the event table
    pub events_entity: String,

    /// Natural key of the event table
    pub event_key: String,

    /// Source-internal columns that never reach any table
    pub internal_columns: Vec<String>,

    pub users: GroupMapping,

    /// Renames applied to user columns after prefix stripping
    pub user_renames: BTreeMap<String, String>,

    /// Event-properties group; `None` leaves those columns on the event table
    pub event_properties: Option<GroupMapping>,

    pub organizations: OrganizationMapping,

    pub countries: CountryMapping,
}

impl Default for EntitySchema {
    fn default() -> Self {
        let mut user_renames = BTreeMap::new();
        user_renames.insert(
            String::from("organization__id"),
            String::from("organization_id"),
        );

        EntitySchema {
            events_entity: String::from("share_events"),
            event_key: String::from("insert_id"),
            internal_columns: strings(&["_id"]),
            users: GroupMapping::new("users", "user_properties", "user_id"),
            user_renames,
            event_properties: None,
            organizations: OrganizationMapping::default(),
            countries: CountryMapping::default(),
        }
    }
}

impl EntitySchema {
    /// Same schema with the event-properties table switched on
    pub fn with_event_properties(mut self) -> Self {
        self.event_properties = Some(GroupMapping::new(
            "event_properties",
            "event_properties",
            "insert_id",
        ));
        self
    }

    /// Declared natural key for an entity, if any
    pub fn natural_key(&self, entity: &str) -> Option<&str> {
        if entity == self.events_entity {
            Some(&self.event_key)
        } else if entity == self.users.entity {
            Some(&self.users.join_key)
        } else if entity == self.organizations.entity {
            Some(&self.organizations.key)
        } else if entity == self.countries.entity {
            Some(&self.countries.code_column)
        } else {
            self.event_properties
                .as_ref()
                .filter(|g| g.entity == entity)
                .map(|g| g.join_key.as_str())
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
