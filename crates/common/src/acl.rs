// Role-based capability checks shared by the query and view layers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The set of role identifiers a caller holds for one request.
pub type RoleSet = BTreeSet<String>;

/// One grant attached to a case type, field, state or event definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessControlList {
    pub role: String,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
}

impl AccessControlList {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into(), create: false, read: false, update: false, delete: false }
    }

    pub fn with_create(mut self) -> Self {
        self.create = true;
        self
    }

    pub fn with_read(mut self) -> Self {
        self.read = true;
        self
    }

    pub fn with_update(mut self) -> Self {
        self.update = true;
        self
    }

    pub fn with_delete(mut self) -> Self {
        self.delete = true;
        self
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Create => self.create,
            Capability::Read => self.read,
            Capability::Update => self.update,
            Capability::Delete => self.delete,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Create,
    Read,
    Update,
    Delete,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Effective capability: true iff some entry names a held role and sets the
/// requested flag. No matching entry means no access.
pub fn has_capability(acls: &[AccessControlList], roles: &RoleSet, capability: Capability) -> bool {
    acls.iter().any(|acl| acl.allows(capability) && roles.contains(&acl.role))
}

/// Build a role set from anything iterable over role names.
pub fn role_set<I, S>(roles: I) -> RoleSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    roles.into_iter().map(Into::into).collect()
}
