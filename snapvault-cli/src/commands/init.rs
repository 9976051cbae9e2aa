use anyhow::{bail, Result};
use snapvault::Config;
use std::path::Path;

/// Write the default configuration to `path`.
pub fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
