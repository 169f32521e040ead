//! Domain types for application role-assignment reconciliation.
//!
//! Identifiers are opaque strings issued by the directory. Only
//! [`PrincipalKey`] is ever compared across applications; role and
//! assignment ids are local to the application that issued them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Object id of a service principal (the application instance holding roles).
    ApplicationId
);
string_newtype!(
    /// Object id of a user or group in the directory.
    PrincipalId
);
string_newtype!(
    /// App-role id, meaningful only on the application that defines it.
    RoleId
);
string_newtype!(
    /// Id of a single assignment record; needed only to delete it.
    AssignmentId
);

/// Role id the directory uses for "default access" when an application
/// declares no app roles.
pub const DEFAULT_ACCESS_ROLE: &str = "00000000-0000-0000-0000-000000000000";

impl RoleId {
    pub fn default_access() -> Self {
        Self::from(DEFAULT_ACCESS_ROLE)
    }
}

// ---------------------------------------------------------------------------
// Principal identity
// ---------------------------------------------------------------------------

/// Kind of principal an assignment grants a role to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrincipalType {
    User,
    Group,
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalType::User => write!(f, "User"),
            PrincipalType::Group => write!(f, "Group"),
        }
    }
}

impl FromStr for PrincipalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            other => Err(format!(
                "unsupported principal type '{other}'; expected: User, Group"
            )),
        }
    }
}

/// Identity of a principal, independent of any application.
///
/// Two assignments on different applications are the same grant iff their
/// keys are equal. Ordering is by id, then type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalKey {
    pub id: PrincipalId,
    pub kind: PrincipalType,
}

impl PrincipalKey {
    pub fn new(id: impl Into<PrincipalId>, kind: PrincipalType) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn user(id: impl Into<PrincipalId>) -> Self {
        Self::new(id, PrincipalType::User)
    }

    pub fn group(id: impl Into<PrincipalId>) -> Self {
        Self::new(id, PrincipalType::Group)
    }
}

impl fmt::Display for PrincipalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.kind)
    }
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

/// One principal granted a role on one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalAssignment {
    pub principal_id: PrincipalId,
    pub principal_type: PrincipalType,
    pub role_id: RoleId,
    pub assignment_id: AssignmentId,
}

impl PrincipalAssignment {
    pub fn key(&self) -> PrincipalKey {
        PrincipalKey::new(self.principal_id.clone(), self.principal_type)
    }
}

/// All assignments of a single application, one per principal.
///
/// Iteration is ordered by principal id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentSet {
    entries: BTreeMap<PrincipalId, PrincipalAssignment>,
}

impl AssignmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an assignment, replacing any earlier record for the same
    /// principal. Returns the replaced record.
    pub fn insert(&mut self, assignment: PrincipalAssignment) -> Option<PrincipalAssignment> {
        self.entries
            .insert(assignment.principal_id.clone(), assignment)
    }

    pub fn get(&self, id: &PrincipalId) -> Option<&PrincipalAssignment> {
        self.entries.get(id)
    }

    /// Membership by identity key: id and type must both match.
    pub fn contains(&self, key: &PrincipalKey) -> bool {
        self.entries
            .get(&key.id)
            .is_some_and(|a| a.principal_type == key.kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrincipalAssignment> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = PrincipalKey> + '_ {
        self.entries.values().map(PrincipalAssignment::key)
    }
}

impl FromIterator<PrincipalAssignment> for AssignmentSet {
    fn from_iter<I: IntoIterator<Item = PrincipalAssignment>>(iter: I) -> Self {
        let mut set = Self::new();
        for assignment in iter {
            set.insert(assignment);
        }
        set
    }
}

impl<'a> IntoIterator for &'a AssignmentSet {
    type Item = &'a PrincipalAssignment;
    type IntoIter = std::collections::btree_map::Values<'a, PrincipalId, PrincipalAssignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// An app role declared by an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRole {
    pub id: RoleId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Grant `principal` the target application's `role_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEntry {
    pub principal: PrincipalKey,
    pub role_id: RoleId,
}

/// Delete the target application's assignment `assignment_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveEntry {
    pub principal: PrincipalKey,
    pub assignment_id: AssignmentId,
}

/// The user-facing intent of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Grant principals the target is missing; never remove.
    Add,
    /// Revoke principals the origin does not have; never add.
    Remove,
    /// Both halves.
    Sync,
}

impl Command {
    pub fn includes_additions(self) -> bool {
        matches!(self, Command::Add | Command::Sync)
    }

    pub fn includes_removals(self) -> bool {
        matches!(self, Command::Remove | Command::Sync)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Add => write!(f, "add"),
            Command::Remove => write!(f, "remove"),
            Command::Sync => write!(f, "sync"),
        }
    }
}

/// Additions and removals that converge a target toward an origin.
///
/// Both halves are kept sorted by principal key. A plan is read-only once
/// built; [`ReconciliationPlan::select`] produces a new plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    to_add: Vec<AddEntry>,
    to_remove: Vec<RemoveEntry>,
}

impl ReconciliationPlan {
    pub fn new(mut to_add: Vec<AddEntry>, mut to_remove: Vec<RemoveEntry>) -> Self {
        to_add.sort_by(|a, b| a.principal.cmp(&b.principal));
        to_remove.sort_by(|a, b| a.principal.cmp(&b.principal));
        Self { to_add, to_remove }
    }

    pub fn to_add(&self) -> &[AddEntry] {
        &self.to_add
    }

    pub fn to_remove(&self) -> &[RemoveEntry] {
        &self.to_remove
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    /// Keep only the half (or halves) `command` acts on.
    pub fn select(self, command: Command) -> Self {
        Self {
            to_add: if command.includes_additions() {
                self.to_add
            } else {
                Vec::new()
            },
            to_remove: if command.includes_removals() {
                self.to_remove
            } else {
                Vec::new()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(id: &str, kind: PrincipalType, role: &str, asg: &str) -> PrincipalAssignment {
        PrincipalAssignment {
            principal_id: PrincipalId::from(id),
            principal_type: kind,
            role_id: RoleId::from(role),
            assignment_id: AssignmentId::from(asg),
        }
    }

    #[test]
    fn newtype_display() {
        assert_eq!(ApplicationId::from("sp-1").to_string(), "sp-1");
        assert_eq!(PrincipalId::from("alice").to_string(), "alice");
        assert_eq!(RoleId::default_access().as_str(), DEFAULT_ACCESS_ROLE);
    }

    #[test]
    fn principal_type_parses_case_insensitively() {
        assert_eq!("User".parse::<PrincipalType>(), Ok(PrincipalType::User));
        assert_eq!("group".parse::<PrincipalType>(), Ok(PrincipalType::Group));
        assert!("ServicePrincipal".parse::<PrincipalType>().is_err());
    }

    #[test]
    fn later_insert_replaces_earlier_record() {
        let mut set = AssignmentSet::new();
        assert!(set
            .insert(assignment("alice", PrincipalType::User, "r1", "a1"))
            .is_none());
        let replaced = set.insert(assignment("alice", PrincipalType::User, "r1", "a2"));
        assert_eq!(replaced.map(|a| a.assignment_id.0), Some("a1".to_string()));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(&PrincipalId::from("alice")).unwrap().assignment_id,
            AssignmentId::from("a2")
        );
    }

    #[test]
    fn contains_requires_matching_type() {
        let set: AssignmentSet = [assignment("x", PrincipalType::Group, "r", "a")]
            .into_iter()
            .collect();
        assert!(set.contains(&PrincipalKey::group("x")));
        assert!(!set.contains(&PrincipalKey::user("x")));
    }

    #[test]
    fn iteration_is_ordered_by_principal_id() {
        let set: AssignmentSet = ["zed", "amy", "mo"]
            .into_iter()
            .map(|id| assignment(id, PrincipalType::User, "r", id))
            .collect();
        let ids: Vec<_> = set.iter().map(|a| a.principal_id.0.as_str()).collect();
        assert_eq!(ids, vec!["amy", "mo", "zed"]);
    }

    #[test]
    fn select_restricts_plan_halves() {
        let plan = ReconciliationPlan::new(
            vec![AddEntry {
                principal: PrincipalKey::user("alice"),
                role_id: RoleId::from("r"),
            }],
            vec![RemoveEntry {
                principal: PrincipalKey::user("bob"),
                assignment_id: AssignmentId::from("a"),
            }],
        );

        let add = plan.clone().select(Command::Add);
        assert_eq!(add.to_add().len(), 1);
        assert!(add.to_remove().is_empty());

        let remove = plan.clone().select(Command::Remove);
        assert!(remove.to_add().is_empty());
        assert_eq!(remove.to_remove().len(), 1);

        assert_eq!(plan.clone().select(Command::Sync), plan);
    }

    #[test]
    fn command_serializes_lowercase() {
        let yaml = serde_yaml::to_string(&Command::Sync).expect("serialize");
        assert_eq!(yaml.trim(), "sync");
    }
}
