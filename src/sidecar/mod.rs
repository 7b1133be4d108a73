//! Companion files that travel with an image.
//!
//! A sidecar is named after the full file name of its image plus a suffix:
//! `photo.nef` has `photo.nef.xmp`. Local sidecars are only listed when they
//! exist; remote ones are listed speculatively.

use std::ffi::OsString;
use std::path::Path;
use url::Url;

use crate::config::SidecarConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidecarFinder {
    /// Existing local sidecars followed by their image, per input file.
    pub local_files: Vec<Url>,
    /// Parallel to `local_files`: `.xmp` style suffix, empty for the image itself.
    pub local_file_suffixes: Vec<String>,
    pub remote_files: Vec<Url>,
    pub remote_file_suffixes: Vec<String>,
    /// Candidate sidecars of remote files; existence unknown.
    pub possible_remote_sidecars: Vec<Url>,
    pub possible_remote_sidecar_suffixes: Vec<String>,
}

impl SidecarFinder {
    pub fn new(files: &[Url], config: &SidecarConfig) -> Self {
        let mut finder = Self::default();
        let suffixes = configured_suffixes(config);

        for url in files {
            match url.to_file_path() {
                Ok(path) if url.scheme() == "file" => {
                    for suffix in &suffixes {
                        let candidate = append_suffix(&path, suffix);
                        if !candidate.exists() {
                            continue;
                        }
                        let Ok(sidecar) = Url::from_file_path(&candidate) else {
                            continue;
                        };
                        if !finder.local_files.contains(&sidecar) {
                            tracing::debug!("Detected a sidecar {}", sidecar);
                            finder.local_files.push(sidecar);
                            finder.local_file_suffixes.push(suffix.clone());
                        }
                    }
                    finder.local_files.push(url.clone());
                    finder.local_file_suffixes.push(String::new());
                }
                _ => {
                    for suffix in &suffixes {
                        let Some(sidecar) = remote_sidecar(url, suffix) else {
                            continue;
                        };
                        if !finder.possible_remote_sidecars.contains(&sidecar) {
                            finder.possible_remote_sidecars.push(sidecar);
                            finder.possible_remote_sidecar_suffixes.push(suffix.clone());
                        }
                    }
                    finder.remote_files.push(url.clone());
                    finder.remote_file_suffixes.push(String::new());
                }
            }
        }

        finder
    }

    /// Local sidecars only, with their suffixes.
    pub fn local_sidecars(&self) -> impl Iterator<Item = (&Url, &str)> {
        self.local_files
            .iter()
            .zip(self.local_file_suffixes.iter())
            .filter(|(_, suffix)| !suffix.is_empty())
            .map(|(url, suffix)| (url, suffix.as_str()))
    }
}

/// Primary suffix first, then the extra extensions, each with a leading dot.
fn configured_suffixes(config: &SidecarConfig) -> Vec<String> {
    std::iter::once(&config.primary_suffix)
        .chain(config.extensions.iter())
        .map(|ext| ext.trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .collect()
}

fn append_suffix(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    name.into()
}

fn remote_sidecar(url: &Url, suffix: &str) -> Option<Url> {
    if url.cannot_be_a_base() {
        return None;
    }
    let mut sidecar = url.clone();
    sidecar.set_path(&format!("{}{}", url.path(), suffix));
    Some(sidecar)
}
