use std::path::PathBuf;

/// Root fex directory (~/.fex, or $FEX_HOME when set)
pub fn fex_root() -> PathBuf {
    if let Ok(home) = std::env::var("FEX_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".fex")
}

/// Directory holding one progress record file per in-progress visit/transfer
pub fn progress_dir() -> PathBuf {
    fex_root().join("progress")
}

/// Config file path
pub fn config_path() -> PathBuf {
    fex_root().join("config.toml")
}

/// Ensure the base fex directory structure exists
pub fn ensure_base_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(progress_dir())?;
    Ok(())
}
