use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 以臨時檔案搭配 rename 實現原子寫入；寫入失敗不會破壞既有檔案。 / Writes data atomically: temporary sibling file, then rename over the target.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_sibling(path);
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_tmp() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("nested/dir/project.json");
        write_atomic(&target, b"{}").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"{}");
        assert!(!target.with_file_name("project.json.tmp").exists());
    }
}
