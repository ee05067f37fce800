//! Per-organization task ACL.
//!
//! Each organization (identified by its ticket signer id) may dispatch a fixed
//! set of analysis names. The name [`WILDCARD`] allows everything and is
//! checked before any per-name lookup.

use crate::domain::error::GatewayError;
use shared_types::TaskMap;
use std::collections::{HashMap, HashSet};

/// Sentinel task name meaning "all task names allowed".
pub const WILDCARD: &str = "*";

/// Allowed task names of one organization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrgPolicy {
    allow_all: bool,
    allowed: HashSet<String>,
}

impl OrgPolicy {
    /// Build from the configured name list.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: HashSet<String> = names.into_iter().map(Into::into).collect();
        Self {
            allow_all: allowed.contains(WILDCARD),
            allowed,
        }
    }

    /// Whether a single task name may be dispatched.
    pub fn allows(&self, name: &str) -> bool {
        self.allow_all || self.allowed.contains(name)
    }

    /// Split `requested` into allowed and disallowed analyses.
    pub fn partition(&self, requested: &TaskMap) -> Partition {
        if self.allow_all {
            return Partition {
                accepted: requested.clone(),
                rejected: TaskMap::new(),
            };
        }

        let (accepted, rejected) = requested
            .iter()
            .map(|(name, args)| (name.clone(), args.clone()))
            .partition(|(name, _)| self.allowed.contains(name));
        Partition { accepted, rejected }
    }
}

/// Result of applying an [`OrgPolicy`]: two disjoint maps whose union is the
/// requested map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    /// Analyses that may be dispatched.
    pub accepted: TaskMap,
    /// Analyses the organization may not request.
    pub rejected: TaskMap,
}

/// ACL for all known organizations.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    organizations: HashMap<String, OrgPolicy>,
}

impl AccessPolicy {
    /// Build from the configured organization -> task-names map.
    pub fn from_allowed_tasks(allowed: &HashMap<String, Vec<String>>) -> Self {
        let organizations = allowed
            .iter()
            .map(|(org, names)| (org.clone(), OrgPolicy::new(names.iter().cloned())))
            .collect();
        Self { organizations }
    }

    /// Policy of one organization.
    ///
    /// # Errors
    ///
    /// `GatewayError::OrganizationNotAllowed` if the organization has no entry.
    pub fn policy_for(&self, signer_id: &str) -> Result<&OrgPolicy, GatewayError> {
        self.organizations
            .get(signer_id)
            .ok_or_else(|| GatewayError::OrganizationNotAllowed(signer_id.to_string()))
    }

    /// Look up the organization and partition its requested analyses.
    pub fn partition(&self, signer_id: &str, requested: &TaskMap) -> Result<Partition, GatewayError> {
        Ok(self.policy_for(signer_id)?.partition(requested))
    }

    /// Number of organizations with an ACL entry.
    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::{btree_map, hash_set, vec};
    use proptest::prelude::*;

    fn requested(names: &[&str]) -> TaskMap {
        names
            .iter()
            .map(|name| (name.to_string(), vec![format!("--{name}")]))
            .collect()
    }

    fn policy(entries: &[(&str, &[&str])]) -> AccessPolicy {
        let allowed = entries
            .iter()
            .map(|(org, names)| {
                (
                    org.to_string(),
                    names.iter().map(|n| n.to_string()).collect(),
                )
            })
            .collect();
        AccessPolicy::from_allowed_tasks(&allowed)
    }

    #[test]
    fn test_unknown_organization_rejected() {
        let acl = policy(&[("acme", &["YARA"])]);
        let result = acl.partition("initech", &requested(&["YARA"]));
        assert_eq!(
            result,
            Err(GatewayError::OrganizationNotAllowed("initech".to_string()))
        );
    }

    #[test]
    fn test_wildcard_accepts_everything() {
        let acl = policy(&[("acme", &["*"])]);
        let tasks = requested(&["YARA", "PEID", "CUCKOO"]);

        let partition = acl.partition("acme", &tasks).unwrap();
        assert_eq!(partition.accepted, tasks);
        assert!(partition.rejected.is_empty());
    }

    #[test]
    fn test_wildcard_mixed_with_names() {
        let org = OrgPolicy::new(["YARA", "*"]);
        assert!(org.allows("ANYTHING"));
    }

    #[test]
    fn test_split_keeps_arguments() {
        let acl = policy(&[("acme", &["YARA"])]);
        let partition = acl
            .partition("acme", &requested(&["YARA", "PEID"]))
            .unwrap();

        assert_eq!(partition.accepted, requested(&["YARA"]));
        assert_eq!(partition.rejected, requested(&["PEID"]));
        assert_eq!(partition.rejected["PEID"], vec!["--PEID".to_string()]);
    }

    #[test]
    fn test_empty_allowed_set_rejects_all() {
        let org = OrgPolicy::new(Vec::<String>::new());
        let partition = org.partition(&requested(&["YARA"]));
        assert!(partition.accepted.is_empty());
        assert_eq!(partition.rejected.len(), 1);
    }

    fn task_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("YARA".to_string()),
            Just("PEID".to_string()),
            Just("CUCKOO".to_string()),
            Just("ZIPMETA".to_string()),
            "[A-Z]{1,8}",
        ]
    }

    proptest! {
        #[test]
        fn prop_wildcard_accepts_full_mapping(
            tasks in btree_map(task_name(), vec("[a-z-]{0,6}", 0..3), 0..8),
        ) {
            let org = OrgPolicy::new([WILDCARD]);
            let partition = org.partition(&tasks);
            prop_assert_eq!(partition.accepted, tasks);
            prop_assert!(partition.rejected.is_empty());
        }

        #[test]
        fn prop_partition_is_exact_split(
            allowed in hash_set(task_name(), 0..5),
            tasks in btree_map(task_name(), vec("[a-z-]{0,6}", 0..3), 0..8),
        ) {
            prop_assume!(!allowed.contains(WILDCARD));
            let org = OrgPolicy::new(allowed.iter().cloned());
            let partition = org.partition(&tasks);

            for name in partition.accepted.keys() {
                prop_assert!(allowed.contains(name));
                prop_assert!(!partition.rejected.contains_key(name));
            }
            for name in partition.rejected.keys() {
                prop_assert!(!allowed.contains(name));
            }

            let mut union = partition.accepted.clone();
            union.extend(partition.rejected.clone());
            prop_assert_eq!(union, tasks);
        }
    }
}
