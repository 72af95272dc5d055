use anyhow::Result;
use avrofilter_config::Config;
use avrofilter_core::{Datatype, resolve};

pub fn handle(config: &Config, datatype: &str, roles: &[String]) -> Result<()> {
    let policy = config.filter.policy()?;
    let forbidden = resolve(&policy, roles.iter().map(String::as_str), &Datatype::from(datatype));

    if forbidden.is_empty() {
        println!("Nothing hidden from [{}] in {}", roles.join(", "), datatype);
        return Ok(());
    }

    println!("Hidden from [{}] in {}:", roles.join(", "), datatype);
    for field in forbidden.iter() {
        println!("  {}", field);
    }

    Ok(())
}
