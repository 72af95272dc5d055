use anyhow::Result;
use avrofilter_config::Config;
use avrofilter_core::PolicyModel;

pub fn handle(config: &Config) -> Result<()> {
    let policy = config.filter.policy()?;
    print!("{}", describe(&policy));
    Ok(())
}

fn describe(policy: &PolicyModel) -> String {
    let mut out = String::new();

    let mut nostrip: Vec<&str> = policy.nostrip_roles().map(|r| r.as_str()).collect();
    nostrip.sort_unstable();
    out.push_str(&format!("✓ Policy OK\n  No-strip roles: {}\n", nostrip.join(", ")));

    let mut datatypes: Vec<&str> = policy.datatypes().map(|d| d.as_str()).collect();
    datatypes.sort_unstable();

    if datatypes.is_empty() {
        out.push_str("  No protected datatypes.\n");
        return out;
    }

    for datatype in datatypes {
        out.push_str(&format!("  {}\n", datatype));
        let mut roles: Vec<&str> = policy.roles().map(|r| r.as_str()).collect();
        roles.sort_unstable();
        for field in policy.protected_fields(datatype).into_iter().flatten() {
            let readers: Vec<&str> = roles
                .iter()
                .copied()
                .filter(|role| {
                    policy
                        .retained_fields(role, datatype)
                        .is_some_and(|fields| fields.contains(field))
                })
                .collect();
            out.push_str(&format!("    {:<24} {}\n", field, readers.join(", ")));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_lists_readers() {
        let policy = PolicyModel::from_options([
            ("nostrip_roles", "ops"),
            ("role1_retain_keys", "flowtuple:netacq_country"),
            ("role2_retain_keys", "flowtuple:netacq_country, flowtuple:dest_ip"),
        ])
        .unwrap();

        let text = describe(&policy);
        assert!(text.contains("No-strip roles: admin, ops"));
        assert!(text.contains("  flowtuple\n"));
        let country = text
            .lines()
            .find(|l| l.trim_start().starts_with("netacq_country"))
            .unwrap();
        assert!(country.ends_with("role1, role2"));
        let dest = text
            .lines()
            .find(|l| l.trim_start().starts_with("dest_ip"))
            .unwrap();
        assert!(dest.ends_with("role2"));
    }

    #[test]
    fn test_describe_empty_policy() {
        let text = describe(&PolicyModel::default());
        assert!(text.contains("No protected datatypes."));
    }
}
