use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

/// Create `path`, wiping any previous contents when `overwrite` is set.
/// Returns whether the directory was (re)created.
pub fn makedir(path: &Path, overwrite: bool) -> Result<bool> {
    if path.is_dir() {
        if overwrite {
            info!("overwriting existing directory {}", path.display());
            let _ = fs::remove_dir_all(path);
            fs::create_dir_all(path)?;
            Ok(true)
        } else {
            debug!("{} already exists", path.display());
            Ok(false)
        }
    } else {
        fs::create_dir_all(path)?;
        Ok(true)
    }
}

pub fn is_fits_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            ext_lower == "fits" || ext_lower == "fit" || ext_lower == "fts"
        })
        .unwrap_or(false)
}

/// Recursively collect FITS files under `dir`, sorted by path.
pub fn find_fits_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_fits_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_fits_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_fits_files(&path, files)?;
        } else if is_fits_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// The master index page inside `dir`, if one exists from a previous run.
pub fn existing_index(dir: &Path) -> Option<PathBuf> {
    let page = dir.join("index.html");
    page.is_file().then_some(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_fits_file() {
        assert!(is_fits_file(Path::new("a/r1002345.fit")));
        assert!(is_fits_file(Path::new("cube.FITS")));
        assert!(is_fits_file(Path::new("x.fts")));
        assert!(!is_fits_file(Path::new("report.html")));
        assert!(!is_fits_file(Path::new("noext")));
    }

    #[test]
    fn test_find_fits_files_recursive_and_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.fit"), b"").unwrap();
        fs::write(dir.path().join("a.fits"), b"").unwrap();
        fs::write(dir.path().join("sub/c.fit"), b"").unwrap();
        fs::write(dir.path().join("skip.txt"), b"").unwrap();

        let files = find_fits_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.fits", "b.fit", "sub/c.fit"]);
    }

    #[test]
    fn test_makedir_creates_and_respects_overwrite() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out");
        assert!(makedir(&target, false).unwrap());
        fs::write(target.join("stale.txt"), b"old").unwrap();

        // without overwrite the contents are kept
        assert!(!makedir(&target, false).unwrap());
        assert!(target.join("stale.txt").is_file());

        // with overwrite the directory is recreated empty
        assert!(makedir(&target, true).unwrap());
        assert!(!target.join("stale.txt").exists());
    }

    #[test]
    fn test_existing_index() {
        let dir = tempdir().unwrap();
        assert_eq!(existing_index(dir.path()), None);
        fs::write(dir.path().join("index.html"), b"<html></html>").unwrap();
        assert_eq!(
            existing_index(dir.path()),
            Some(dir.path().join("index.html"))
        );
    }
}
