use anyhow::Result;
use path_absolutize::Absolutize;
use std::fs;
use std::path::{Path, PathBuf};

/// Normalize a host path to an absolute path without resolving symlinks.
pub fn normalize_abs_path(p: &Path) -> Result<PathBuf> {
    Ok(p.absolutize()?.to_path_buf())
}

/// True when `candidate` lies inside `root` once both are absolutized.
/// The deepest existing ancestor of the candidate (the candidate itself when it
/// exists) is canonicalized, so a symlink at any depth must land inside the root.
pub fn is_within_root(candidate: &Path, root: &Path) -> Result<bool> {
    let cand_abs = normalize_abs_path(candidate)?;
    let root_abs = normalize_abs_path(root)?;
    if !is_prefix_path(&cand_abs, &root_abs) {
        return Ok(false);
    }
    let root_real = fs::canonicalize(&root_abs).unwrap_or_else(|_| root_abs.clone());
    for p in cand_abs.ancestors().take_while(|p| is_prefix_path(p, &root_abs)) {
        if fs::symlink_metadata(p).is_err() {
            continue;
        }
        return match fs::canonicalize(p) {
            Ok(real) => Ok(is_prefix_path(&real, &root_real)),
            // dangling link
            Err(_) => Ok(false),
        };
    }
    Ok(true)
}

pub(crate) fn is_prefix_path(path: &Path, prefix: &Path) -> bool {
    // Compare component-wise to avoid false positives like /data/x vs /data2
    if cfg!(windows) {
        let pr = path.components().next();
        let rr = prefix.components().next();
        if pr != rr { return false; }
    }
    path.starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_prefix_not_string_prefix() {
        assert!(is_prefix_path(Path::new("/data/1/a.txt"), Path::new("/data")));
        assert!(!is_prefix_path(Path::new("/data2/1/a.txt"), Path::new("/data")));
    }

    #[test]
    fn relative_candidates_are_absolutized() {
        let tmp = tempfile::tempdir().unwrap();
        let inside = tmp.path().join("1").join("x.txt");
        assert!(is_within_root(&inside, tmp.path()).unwrap());
        let outside = tmp.path().join("..").join("elsewhere");
        assert!(!is_within_root(&outside, tmp.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_denied() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::fs::write(other.path().join("secret.txt"), b"s").unwrap();
        let link = root.path().join("link.txt");
        std::os::unix::fs::symlink(other.path().join("secret.txt"), &link).unwrap();
        assert!(!is_within_root(&link, root.path()).unwrap());

        std::fs::write(root.path().join("real.txt"), b"r").unwrap();
        let inner = root.path().join("inner.txt");
        std::os::unix::fs::symlink(root.path().join("real.txt"), &inner).unwrap();
        assert!(is_within_root(&inner, root.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_escaping_root_is_denied() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::fs::write(other.path().join("secret.txt"), b"s").unwrap();
        std::fs::create_dir_all(root.path().join("1")).unwrap();
        std::os::unix::fs::symlink(other.path(), root.path().join("1").join("link")).unwrap();
        assert!(!is_within_root(&root.path().join("1/link/secret.txt"), root.path()).unwrap());
        assert!(!is_within_root(&root.path().join("1/link/missing.txt"), root.path()).unwrap());
        assert!(!is_within_root(&root.path().join("1/link"), root.path()).unwrap());

        std::fs::create_dir_all(root.path().join("2/real")).unwrap();
        std::os::unix::fs::symlink(root.path().join("2/real"), root.path().join("2/alias")).unwrap();
        assert!(is_within_root(&root.path().join("2/alias/a.txt"), root.path()).unwrap());
        assert!(is_within_root(&root.path().join("3/not/yet/there.txt"), root.path()).unwrap());
    }
}
