//! Synthetic gzip+tar bundle fixtures.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

/// One entry of a synthetic archive.
#[allow(dead_code)]
pub enum Entry<'a> {
    /// Regular file with content.
    File(&'a str, &'a [u8]),
    /// Directory entry (should never be materialized by extraction).
    Dir(&'a str),
    /// Symlink entry (should never be materialized by extraction).
    Symlink(&'a str, &'a str),
}

/// Build a gzip-compressed tar archive from the given entries.
#[allow(dead_code)]
pub fn build_bundle(entries: &[Entry<'_>]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        match entry {
            Entry::File(path, data) => {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_entry_type(tar::EntryType::Regular);
                // `append_data` validates the path argument and refuses to write
                // traversal sequences like `..`. To let fixtures build the
                // malicious archives the extractor is meant to reject, write the
                // name directly into the header when the normal path is refused.
                if path.contains("..") {
                    let name = &mut header.as_gnu_mut().unwrap().name;
                    let bytes = path.as_bytes();
                    name[..bytes.len()].copy_from_slice(bytes);
                    header.set_cksum();
                    builder.append(&header, *data).unwrap();
                } else {
                    header.set_cksum();
                    builder.append_data(&mut header, path, *data).unwrap();
                }
            }
            Entry::Dir(path) => {
                let mut header = tar::Header::new_gnu();
                header.set_size(0);
                header.set_mode(0o755);
                header.set_entry_type(tar::EntryType::Directory);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, std::io::empty())
                    .unwrap();
            }
            Entry::Symlink(path, target) => {
                let mut header = tar::Header::new_gnu();
                header.set_size(0);
                header.set_mode(0o777);
                header.set_entry_type(tar::EntryType::Symlink);
                builder
                    .append_link(&mut header, path, target)
                    .unwrap();
            }
        }
    }

    let encoder = builder.into_inner().unwrap();
    encoder.finish().unwrap()
}

/// A small bundle laid out like a real airgap image tree.
#[allow(dead_code)]
pub fn image_tree_bundle() -> Vec<u8> {
    build_bundle(&[
        Entry::File("docker-archive/docker.io/library/redis/2.0", b"redis-blob"),
        Entry::File(
            "docker-archive/quay.io/couches/redis/sha256/abcd1234",
            b"digest-blob",
        ),
    ])
}

/// Split a byte buffer into `n` nearly equal chunks.
#[allow(dead_code)]
pub fn split_chunks(data: &[u8], n: usize) -> Vec<Vec<u8>> {
    let chunk_size = data.len().div_ceil(n);
    data.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

/// Hex-encoded SHA-256 of a byte buffer.
#[allow(dead_code)]
pub fn sha256_hex(data: &[u8]) -> String {
    airlock_core::ContentHash::compute(data).to_hex()
}
