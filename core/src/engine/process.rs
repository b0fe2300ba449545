// Helpers for locating backend executables
use std::path::PathBuf;

/// `env_key` if it names an existing file, else `default_bin` on PATH.
pub fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

pub fn get_from_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }
    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            for name in candidates(bin) {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

#[cfg(windows)]
fn candidates(bin: &str) -> Vec<String> {
    vec![bin.to_string(), format!("{}.exe", bin)]
}

#[cfg(not(windows))]
fn candidates(bin: &str) -> Vec<String> {
    vec![bin.to_string()]
}
