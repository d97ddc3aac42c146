//! Image reference resolution over extracted bundle trees.
//!
//! Airgap bundles lay images out as
//! `<root>/<format>/<registry>/<namespace>/<repo...>/<tag-or-digest>`.
//! The functions here turn those paths back into canonical image references.
//! They are pure: no network access, and all parsing operates on canonical
//! path segments rather than a platform separator character.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// The registry implied when a reference carries none.
const DEFAULT_REGISTRY: &str = "docker.io";

/// The namespace implied for bare official images on the default registry.
const DEFAULT_NAMESPACE: &str = "library";

/// Marker segment that flags the final path segment as a content digest.
const DIGEST_MARKER: &str = "sha256";

/// Tag or content digest identifying one version of an image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageTag {
    /// A mutable tag, joined with `:`.
    Tag(String),
    /// A sha256 content digest (hex value only), joined with `@`.
    Digest(String),
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(t) => write!(f, ":{t}"),
            Self::Digest(d) => write!(f, "@sha256:{d}"),
        }
    }
}

/// A container image reference derived from an extracted bundle path.
///
/// `repository` holds the path segments left after registry/namespace
/// elision; the invariant that the separator is `@` iff a digest is present
/// is enforced by [`ImageTag`]'s `Display`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Repository path segments (registry host first, when not elided).
    pub repository: Vec<String>,
    /// Tag or digest.
    pub tag: ImageTag,
}

impl ImageReference {
    /// Derive a reference from a file path under an extracted format root.
    ///
    /// The first segment below `root` names the archive format and is
    /// dropped. A leading `docker.io` registry segment is elided, as is a
    /// `library` namespace segment directly following it. Paths that leave
    /// no repository or no tag after elision fail with
    /// [`crate::Error::MalformedImagePath`].
    pub fn from_path(root: &Path, file: &Path) -> crate::Result<Self> {
        let mut segments = path_segments(root, file)?;

        // Drop the format directory.
        if segments.len() < 2 {
            return Err(malformed(file));
        }
        segments.remove(0);

        if segments.first().is_some_and(|s| s == DEFAULT_REGISTRY) {
            segments.remove(0);
            if segments.first().is_some_and(|s| s == DEFAULT_NAMESPACE) {
                segments.remove(0);
            }
        }

        let tag = pop_tag(&mut segments).ok_or_else(|| malformed(file))?;
        if segments.is_empty() {
            return Err(malformed(file));
        }

        Ok(Self {
            repository: segments,
            tag,
        })
    }

    /// Derive the compact form: same tag/digest, repository reduced to the
    /// last path segment. Used where a short display name suffices.
    pub fn short_from_path(root: &Path, file: &Path) -> crate::Result<Self> {
        let mut segments = path_segments(root, file)?;

        if segments.len() < 2 {
            return Err(malformed(file));
        }
        segments.remove(0);

        let tag = pop_tag(&mut segments).ok_or_else(|| malformed(file))?;
        let repo = segments.pop().ok_or_else(|| malformed(file))?;

        Ok(Self {
            repository: vec![repo],
            tag,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.repository.join("/"), self.tag)
    }
}

/// Split `file` relative to `root` into owned UTF-8 segments.
fn path_segments(root: &Path, file: &Path) -> crate::Result<Vec<String>> {
    let rel = file
        .strip_prefix(root)
        .map_err(|_| crate::Error::OutsideRoot(file.display().to_string()))?;

    rel.components()
        .map(|c| match c {
            Component::Normal(s) => s
                .to_str()
                .map(str::to_string)
                .ok_or_else(|| malformed(file)),
            _ => Err(malformed(file)),
        })
        .collect()
}

/// Pop the trailing tag segment, folding a preceding `sha256` marker into a
/// digest.
fn pop_tag(segments: &mut Vec<String>) -> Option<ImageTag> {
    let value = segments.pop()?;
    if segments.last().is_some_and(|s| s == DIGEST_MARKER) {
        segments.pop();
        Some(ImageTag::Digest(value))
    } else {
        Some(ImageTag::Tag(value))
    }
}

fn malformed(file: &Path) -> crate::Error {
    crate::Error::MalformedImagePath(file.display().to_string())
}

/// List the image-archive formats present under `root`: the sorted names of
/// its immediate subdirectories. Non-recursive.
pub fn list_formats(root: &Path) -> io::Result<Vec<String>> {
    let mut formats = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                formats.push(name.to_string());
            }
        }
    }
    formats.sort();
    Ok(formats)
}

/// Lazily enumerate every regular file under `root`, recursively.
///
/// The iterator is finite but not restartable; call again to re-enumerate.
/// Unreadable entries are skipped.
pub fn list_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
}

/// Resolve a bundle file path to its canonical image reference string.
pub fn image_name(root: &Path, file: &Path) -> crate::Result<String> {
    Ok(ImageReference::from_path(root, file)?.to_string())
}

/// Resolve a bundle file path to its compact image reference string.
pub fn short_image_name(root: &Path, file: &Path) -> crate::Result<String> {
    Ok(ImageReference::short_from_path(root, file)?.to_string())
}
