use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix appended to the newest backup copy of a chapter file.
pub const BACKUP_SUFFIX: &str = ".neurodraft_backup";

/// Generations kept per file, the unsuffixed newest copy included.
pub const MAX_BACKUPS: usize = 5;

/// Backup path for a generation: 0 is the bare suffix (newest), older
/// generations carry a numeric tail.
pub fn backup_path(path: &Path, generation: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    if generation > 0 {
        name.push(format!(".{generation}"));
    }
    PathBuf::from(name)
}

/// Takes a byte-identical backup of `path` before a rewrite or rename.
///
/// The previous backup rotates to `.1`, `.1` to `.2` and so on; anything
/// past [`MAX_BACKUPS`] generations is pruned here, lazily, rather than by
/// a sweep.
pub fn create_backup(path: &Path) -> io::Result<PathBuf> {
    let oldest = backup_path(path, MAX_BACKUPS - 1);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for generation in (0..MAX_BACKUPS - 1).rev() {
        let from = backup_path(path, generation);
        if from.exists() {
            fs::rename(&from, backup_path(path, generation + 1))?;
        }
    }
    let newest = backup_path(path, 0);
    fs::copy(path, &newest)?;
    tracing::debug!(path = %path.display(), "took chapter backup");
    Ok(newest)
}

/// The newest backup of `path`, if one exists.
pub fn latest_backup(path: &Path) -> Option<PathBuf> {
    let newest = backup_path(path, 0);
    newest.exists().then_some(newest)
}
