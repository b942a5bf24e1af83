//! Resolves the `Rscript` executable used to run the Shiny launcher.

use std::path::{Path, PathBuf};

/// Resolved through `PATH` at spawn time when nothing else is found.
pub const FALLBACK_COMMAND: &str = "Rscript";

#[cfg(target_os = "windows")]
const PORTABLE_RSCRIPT: &[&str] = &["R-Portable", "bin", "Rscript.exe"];
#[cfg(not(target_os = "windows"))]
const PORTABLE_RSCRIPT: &[&str] = &["R-Portable", "bin", "Rscript"];

/// Newest first.
#[cfg(target_os = "windows")]
const KNOWN_R_VERSIONS: &[&str] = &[
    "4.5.2", "4.4.2", "4.4.1", "4.4.0", "4.3.3", "4.3.2", "4.3.1", "4.3.0",
];
#[cfg(target_os = "windows")]
const KNOWN_X64_R_VERSIONS: &[&str] = &["4.5.2", "4.4.2", "4.4.1", "4.4.0"];

#[cfg(target_os = "windows")]
fn known_install_paths() -> Vec<PathBuf> {
    let root = Path::new(r"C:\Program Files\R");
    let plain = KNOWN_R_VERSIONS
        .iter()
        .map(|version| root.join(format!("R-{version}")).join("bin").join("Rscript.exe"));
    let x64 = KNOWN_X64_R_VERSIONS.iter().map(|version| {
        root.join(format!("R-{version}"))
            .join("bin")
            .join("x64")
            .join("Rscript.exe")
    });
    plain.chain(x64).collect()
}

#[cfg(not(target_os = "windows"))]
fn known_install_paths() -> Vec<PathBuf> {
    [
        "/opt/homebrew/bin/Rscript",
        "/usr/local/bin/Rscript",
        "/Library/Frameworks/R.framework/Resources/bin/Rscript",
        "/usr/bin/Rscript",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

fn portable_path(root: &Path) -> PathBuf {
    PORTABLE_RSCRIPT
        .iter()
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Every location checked, in priority order.
pub fn candidates(portable_roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = known_install_paths();
    paths.extend(portable_roots.iter().map(|root| portable_path(root)));
    paths
}

pub fn locate(explicit: Option<&Path>, portable_roots: &[PathBuf]) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    locate_among(&candidates(portable_roots))
}

pub fn locate_among(candidates: &[PathBuf]) -> PathBuf {
    match candidates.iter().find(|path| path.is_file()) {
        Some(found) => {
            log::info!("Found R at: {}", found.display());
            found.clone()
        }
        None => {
            log::warn!("No R installation found in known locations, falling back to PATH lookup");
            PathBuf::from(FALLBACK_COMMAND)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn falls_back_to_bare_command_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let missing = vec![dir.path().join("a").join("Rscript"), dir.path().join("b")];
        assert_eq!(locate_among(&missing), PathBuf::from(FALLBACK_COMMAND));
        assert_eq!(locate_among(&[]), PathBuf::from(FALLBACK_COMMAND));
    }

    #[test]
    fn first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("R-4.3.0");
        let newer = dir.path().join("R-4.5.2");
        fs::write(&older, "").unwrap();
        fs::write(&newer, "").unwrap();

        let found = locate_among(&[dir.path().join("R-9.9.9"), newer.clone(), older]);
        assert_eq!(found, newer);
    }

    #[test]
    fn directories_are_not_interpreters() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            locate_among(&[dir.path().to_path_buf()]),
            PathBuf::from(FALLBACK_COMMAND)
        );
    }

    #[test]
    fn explicit_override_is_returned_as_is() {
        let explicit = Path::new("/custom/R/bin/Rscript");
        assert_eq!(locate(Some(explicit), &[]), explicit.to_path_buf());
    }

    #[test]
    fn portable_copies_are_checked_after_installs() {
        let dir = tempfile::tempdir().unwrap();
        let all = candidates(&[dir.path().to_path_buf()]);
        let portable = portable_path(dir.path());
        assert_eq!(all.last(), Some(&portable));
        assert!(portable.starts_with(dir.path().join("R-Portable").join("bin")));

        fs::create_dir_all(portable.parent().unwrap()).unwrap();
        fs::write(&portable, "").unwrap();
        let found = locate(None, &[dir.path().to_path_buf()]);
        // A system-wide install outranks the portable copy when present.
        assert!(found == portable || known_install_paths().contains(&found));
    }
}
