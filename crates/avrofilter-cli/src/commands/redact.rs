use anyhow::{Context, Result};
use avrofilter_config::Config;
use avrofilter_core::{Datatype, resolve};
use avrofilter_redact::{RedactionStats, redact_io};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

pub fn handle(
    config: &Config,
    input: &Path,
    output: &Path,
    datatype: &str,
    roles: &[String],
) -> Result<()> {
    let stats = redact_file(config, input, output, datatype, roles)?;

    println!("✓ Wrote {}", output.display());
    println!(
        "  Blocks: {}  Records: {}  Bytes: {} -> {}",
        stats.blocks, stats.records, stats.bytes_in, stats.bytes_out
    );

    Ok(())
}

/// Redact `input` into `output`. A failed run leaves no output file behind.
fn redact_file(
    config: &Config,
    input: &Path,
    output: &Path,
    datatype: &str,
    roles: &[String],
) -> Result<RedactionStats> {
    let policy = config.filter.policy()?;
    let forbidden = resolve(&policy, roles.iter().map(String::as_str), &Datatype::from(datatype));
    info!(fields = ?forbidden.fields(), "redacting {}", input.display());

    let reader = BufReader::new(
        File::open(input).with_context(|| format!("opening {}", input.display()))?,
    );

    // same directory as the output so the final rename stays on one filesystem
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let partial = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;

    // dropping `partial` on error removes it
    let stats = redact_io(
        reader,
        BufWriter::new(partial.as_file()),
        &forbidden,
        config.filter.missing_field_policy(),
    )
    .with_context(|| format!("redacting {}", input.display()))?;

    partial
        .persist(output)
        .map_err(|e| e.error)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(stats)
}
