//! Policy model: retain rules, no-strip roles and derived protected fields
//!
//! Built once from the key/value configuration surface and read-only
//! afterwards. Any field mentioned in a `<role>_retain_keys` option becomes
//! protected for its datatype: it is stripped unless the caller holds a role
//! that explicitly retains it.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{Datatype, QualifiedField, Role};

/// Option holding the comma-separated list of roles that are never redacted
pub const NOSTRIP_ROLES_KEY: &str = "nostrip_roles";

/// Suffix of per-role retain options, e.g. `swiftro_retain_keys`
pub const RETAIN_KEYS_SUFFIX: &str = "_retain_keys";

/// Role that always receives unredacted data
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone)]
pub struct PolicyModel {
    nostrip: HashSet<Role>,
    retain: HashMap<Role, HashMap<Datatype, BTreeSet<String>>>,
    protected: HashMap<Datatype, BTreeSet<String>>,
}

impl PolicyModel {
    /// Build the model from raw configuration options.
    ///
    /// Keys other than `nostrip_roles` and `*_retain_keys` are ignored so the
    /// same option table can carry unrelated settings.
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut nostrip: HashSet<Role> = HashSet::new();
        let mut retain: HashMap<Role, HashMap<Datatype, BTreeSet<String>>> = HashMap::new();

        for (key, value) in options {
            let key = key.as_ref().trim();
            let value = value.as_ref();

            if key == NOSTRIP_ROLES_KEY {
                nostrip.extend(split_csv(value).map(Role::from));
                continue;
            }

            let Some(role) = key.strip_suffix(RETAIN_KEYS_SUFFIX) else {
                continue;
            };
            let role = Role::from(role);

            if retain.contains_key(&role) {
                warn!(
                    "role '{}' appears multiple times in retain configuration, keeping the first",
                    role
                );
                continue;
            }

            let mut by_datatype: HashMap<Datatype, BTreeSet<String>> = HashMap::new();
            for token in split_csv(value) {
                let QualifiedField { datatype, field } = token.parse()?;
                by_datatype.entry(datatype).or_default().insert(field);
            }
            retain.insert(role, by_datatype);
        }

        nostrip.insert(Role::from(ADMIN_ROLE));

        Ok(Self::from_parts(nostrip, retain))
    }

    fn from_parts(
        nostrip: HashSet<Role>,
        retain: HashMap<Role, HashMap<Datatype, BTreeSet<String>>>,
    ) -> Self {
        let mut protected: HashMap<Datatype, BTreeSet<String>> = HashMap::new();
        for by_datatype in retain.values() {
            for (datatype, fields) in by_datatype {
                protected
                    .entry(datatype.clone())
                    .or_default()
                    .extend(fields.iter().cloned());
            }
        }

        debug!(
            roles = retain.len(),
            datatypes = protected.len(),
            nostrip = nostrip.len(),
            "policy model loaded"
        );

        Self {
            nostrip,
            retain,
            protected,
        }
    }

    /// Fields of `datatype` that `role` may see even though they are protected
    pub fn retained_fields(&self, role: &str, datatype: &str) -> Option<&BTreeSet<String>> {
        self.retain.get(role).and_then(|by_dt| by_dt.get(datatype))
    }

    /// Whether `role` bypasses redaction entirely
    pub fn is_no_strip(&self, role: &str) -> bool {
        role == ADMIN_ROLE || self.nostrip.contains(role)
    }

    /// Union of every role's retained fields for `datatype`
    pub fn protected_fields(&self, datatype: &str) -> Option<&BTreeSet<String>> {
        self.protected.get(datatype)
    }

    /// Whether any retain rule mentions `datatype`
    pub fn has_datatype(&self, datatype: &str) -> bool {
        self.protected.contains_key(datatype)
    }

    pub fn datatypes(&self) -> impl Iterator<Item = &Datatype> {
        self.protected.keys()
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.retain.keys()
    }

    pub fn nostrip_roles(&self) -> impl Iterator<Item = &Role> {
        self.nostrip.iter()
    }
}

impl Default for PolicyModel {
    fn default() -> Self {
        Self::from_parts(HashSet::from([Role::from(ADMIN_ROLE)]), HashMap::new())
    }
}

fn split_csv(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample() -> PolicyModel {
        PolicyModel::from_options([
            (
                "role1_retain_keys",
                "flowtuple:netacq_continent, flowtuple:netacq_country",
            ),
            ("role2_retain_keys", "flowtuple:dest_ip, dos:src_ip"),
            ("nostrip_roles", "ops, archive"),
            ("log_level", "debug"),
        ])
        .unwrap()
    }

    #[test]
    fn test_protected_fields_union() {
        let policy = sample();
        let protected = policy.protected_fields("flowtuple").unwrap();
        let expected: BTreeSet<String> = ["netacq_continent", "netacq_country", "dest_ip"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(protected, &expected);
        assert_eq!(policy.protected_fields("dos").unwrap().len(), 1);
        assert!(policy.protected_fields("unknown").is_none());
    }

    #[test]
    fn test_retained_fields() {
        let policy = sample();
        let retained = policy.retained_fields("role1", "flowtuple").unwrap();
        assert!(retained.contains("netacq_country"));
        assert!(policy.retained_fields("role1", "dos").is_none());
        assert!(policy.retained_fields("nobody", "flowtuple").is_none());
    }

    #[test]
    fn test_admin_always_no_strip() {
        let policy = PolicyModel::from_options(Vec::<(&str, &str)>::new()).unwrap();
        assert!(policy.is_no_strip("admin"));
        assert!(!policy.is_no_strip("role1"));

        let policy = sample();
        assert!(policy.is_no_strip("admin"));
        assert!(policy.is_no_strip("ops"));
        assert!(policy.is_no_strip("archive"));
        assert!(!policy.is_no_strip("role1"));
    }

    #[test]
    fn test_empty_tokens_skipped() {
        let policy =
            PolicyModel::from_options([("r_retain_keys", " , flowtuple:a,, ")]).unwrap();
        assert_eq!(policy.retained_fields("r", "flowtuple").unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_token_fails() {
        let err = PolicyModel::from_options([("r_retain_keys", "flowtuple:a, flowtuple")])
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = PolicyModel::from_options([("r_retain_keys", "flowtuple:")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_duplicate_role_keeps_first() {
        let policy = PolicyModel::from_options([
            ("r_retain_keys", "flowtuple:a"),
            (" r_retain_keys", "flowtuple:b"),
        ])
        .unwrap();
        let retained = policy.retained_fields("r", "flowtuple").unwrap();
        assert!(retained.contains("a"));
        assert!(!retained.contains("b"));
        assert!(!policy.protected_fields("flowtuple").unwrap().contains("b"));
    }

    #[test]
    fn test_has_datatype() {
        let policy = sample();
        assert!(policy.has_datatype("flowtuple"));
        assert!(policy.has_datatype("dos"));
        assert!(!policy.has_datatype("rsdos"));
        assert_eq!(policy.datatypes().count(), 2);
    }
}
