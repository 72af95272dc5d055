//! Access resolver: caller roles + datatype -> forbidden fields

use std::collections::BTreeSet;

use crate::policy::PolicyModel;
use crate::types::{Datatype, ForbiddenSet};

/// Compute the fields to strip for a caller holding `roles`.
///
/// Retained fields are additive across roles. A no-strip role empties the
/// result regardless of any other role held. Callers with no matching role
/// lose every protected field of the datatype.
pub fn resolve<'a, I>(policy: &PolicyModel, roles: I, datatype: &Datatype) -> ForbiddenSet
where
    I: IntoIterator<Item = &'a str>,
{
    let roles: Vec<&str> = roles.into_iter().collect();

    if roles.iter().any(|role| policy.is_no_strip(role)) {
        return ForbiddenSet::empty(datatype.clone());
    }

    let Some(protected) = policy.protected_fields(datatype.as_str()) else {
        return ForbiddenSet::empty(datatype.clone());
    };

    let mut forbidden: BTreeSet<String> = protected.clone();
    for role in roles {
        if let Some(retained) = policy.retained_fields(role, datatype.as_str()) {
            forbidden.retain(|field| !retained.contains(field));
        }
    }

    ForbiddenSet::new(datatype.clone(), forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenario_policy() -> PolicyModel {
        PolicyModel::from_options([
            (
                "role1_retain_keys",
                "flowtuple:netacq_continent, flowtuple:netacq_country",
            ),
            ("role2_retain_keys", "flowtuple:dest_ip"),
            ("nostrip_roles", ""),
        ])
        .unwrap()
    }

    fn fields(set: &ForbiddenSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn test_single_role_scenario() {
        let policy = scenario_policy();
        let forbidden = resolve(&policy, ["role1"], &"flowtuple".into());
        assert_eq!(fields(&forbidden), vec!["dest_ip"]);
        assert_eq!(forbidden.datatype().as_str(), "flowtuple");
    }

    #[test]
    fn test_admin_gets_everything() {
        let policy = scenario_policy();
        let forbidden = resolve(&policy, ["admin"], &"flowtuple".into());
        assert!(forbidden.is_empty());

        let forbidden = resolve(&policy, ["role1", "admin", "guest"], &"flowtuple".into());
        assert!(forbidden.is_empty());
    }

    #[test]
    fn test_roles_are_additive() {
        let policy = scenario_policy();
        let forbidden = resolve(&policy, ["role1", "role2"], &"flowtuple".into());
        assert!(forbidden.is_empty());
    }

    #[test]
    fn test_unknown_role_gets_conservative_default() {
        let policy = scenario_policy();
        let forbidden = resolve(&policy, ["guest"], &"flowtuple".into());
        assert_eq!(
            fields(&forbidden),
            vec!["dest_ip", "netacq_continent", "netacq_country"]
        );

        let forbidden = resolve(&policy, std::iter::empty(), &"flowtuple".into());
        assert_eq!(forbidden.len(), 3);
    }

    #[test]
    fn test_unconfigured_datatype_is_empty() {
        let policy = scenario_policy();
        assert!(resolve(&policy, ["guest"], &"dos".into()).is_empty());
    }

    const ROLES: [&str; 5] = ["r0", "r1", "r2", "r3", "ops"];
    const FIELDS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

    fn arb_policy() -> impl Strategy<Value = (PolicyModel, Vec<(String, String)>)> {
        prop::collection::vec(
            (0..4usize, prop::collection::vec((0..2usize, 0..6usize), 0..5)),
            0..6,
        )
        .prop_map(|rules| {
            let mut options: Vec<(String, String)> = rules
                .into_iter()
                .map(|(role, tokens)| {
                    let value = tokens
                        .into_iter()
                        .map(|(dt, f)| format!("dt{}:{}", dt, FIELDS[f]))
                        .collect::<Vec<_>>()
                        .join(",");
                    (format!("{}_retain_keys", ROLES[role]), value)
                })
                .collect();
            options.push(("nostrip_roles".to_string(), "ops".to_string()));
            let policy = PolicyModel::from_options(options.clone()).unwrap();
            (policy, options)
        })
    }

    fn arb_roles() -> impl Strategy<Value = Vec<&'static str>> {
        prop::collection::vec(prop::sample::select(ROLES.to_vec()), 0..4)
    }

    proptest! {
        /// Property: adding roles never increases redaction
        #[test]
        fn prop_more_roles_never_widen(
            (policy, _) in arb_policy(),
            small in arb_roles(),
            extra in arb_roles(),
            dt in 0..2usize,
        ) {
            let datatype = Datatype::new(format!("dt{}", dt));
            let mut large = small.clone();
            large.extend(extra);

            let f_small = resolve(&policy, small.iter().copied(), &datatype);
            let f_large = resolve(&policy, large.iter().copied(), &datatype);
            prop_assert!(f_large.is_subset(&f_small));
        }

        /// Property: a no-strip role empties the forbidden set
        #[test]
        fn prop_no_strip_dominates(
            (policy, _) in arb_policy(),
            mut roles in arb_roles(),
            dt in 0..2usize,
            admin in any::<bool>(),
        ) {
            roles.push(if admin { "admin" } else { "ops" });
            let forbidden = resolve(&policy, roles.iter().copied(), &Datatype::new(format!("dt{}", dt)));
            prop_assert!(forbidden.is_empty());
        }

        /// Property: every configured retain field is protected
        #[test]
        fn prop_protected_closure((policy, options) in arb_policy()) {
            for (key, value) in &options {
                if key == "nostrip_roles" {
                    continue;
                }
                let role = key.trim_end_matches("_retain_keys");
                for token in value.split(',').filter(|t| !t.is_empty()) {
                    let (dt, field) = token.split_once(':').unwrap();
                    // only the first occurrence of a role is kept
                    if let Some(retained) = policy.retained_fields(role, dt) {
                        if retained.contains(field) {
                            prop_assert!(policy.protected_fields(dt).unwrap().contains(field));
                        }
                    }
                }
            }
        }
    }
}
