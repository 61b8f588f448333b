//! Zip upload expansion.
//!
//! Members come back in archive order with nested paths flattened
//! (`dir/sub/a.pdf` → `dir_sub_a.pdf`). Two members that flatten to the same
//! name do not overwrite each other: the later one gets a ` (n)` suffix.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use super::format::get_suffix;

/// How extracted members are handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRepr {
    /// Owned bytes.
    Bytes,
    /// An in-memory reader positioned at the start.
    Reader,
}

/// One extracted archive member.
#[derive(Debug)]
pub enum ArchiveMember {
    Bytes(Vec<u8>),
    Reader(Cursor<Vec<u8>>),
}

impl ArchiveMember {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Bytes(b) => b,
            Self::Reader(c) => c.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(b) => b.len(),
            Self::Reader(c) => c.get_ref().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Expand a zip upload into `(flattened name, member)` pairs in archive order.
///
/// Returns `None` when `data` is not a readable zip archive.
pub fn unzip_members(data: &[u8], repr: MemberRepr) -> Option<Vec<(String, ArchiveMember)>> {
    let mut archive = match zip::ZipArchive::new(Cursor::new(data)) {
        Ok(a) => a,
        Err(e) => {
            tracing::debug!(error = %e, "Upload is not a zip file");
            return None;
        }
    };

    let mut taken = HashSet::new();
    let mut members = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(index, error = %e, "Unreadable zip entry");
                return None;
            }
        };
        if file.is_dir() {
            continue;
        }

        let flattened = flatten_member_name(file.name());
        let name = disambiguate(&flattened, &mut taken);
        if name != flattened {
            tracing::warn!(
                original = file.name(),
                renamed = %name,
                "Flattened zip member name collides with an earlier member"
            );
        }

        let mut buf = Vec::with_capacity(initial_capacity(file.size(), data.len()));
        if let Err(e) = file.read_to_end(&mut buf) {
            tracing::warn!(member = %name, error = %e, "Failed to read zip member");
            return None;
        }

        let member = match repr {
            MemberRepr::Bytes => ArchiveMember::Bytes(buf),
            MemberRepr::Reader => ArchiveMember::Reader(Cursor::new(buf)),
        };
        members.push((name, member));
    }

    Some(members)
}

/// Upper bound on how much a member buffer is preallocated per archive byte.
const MAX_PREALLOC_RATIO: usize = 64;

/// Preallocation for a member. The size in the zip header is not trusted
/// beyond a fixed multiple of the archive size.
fn initial_capacity(declared: u64, archive_len: usize) -> usize {
    usize::try_from(declared)
        .unwrap_or(usize::MAX)
        .min(archive_len.saturating_mul(MAX_PREALLOC_RATIO))
}

/// Replace path separators in a member path with `_`.
pub fn flatten_member_name(path: &str) -> String {
    path.replace(['/', '\\'], "_")
}

fn disambiguate(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let ext_len = get_suffix(name).len();
    let (stem, ext) = name.split_at(name.len() - ext_len);
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}


#[cfg(test)]
mod tests {
    use super::test_zip::build_zip;
    use super::*;

    #[test]
    fn declared_size_does_not_drive_allocation() {
        assert_eq!(initial_capacity(500, 100), 500);
        assert_eq!(initial_capacity(u64::MAX, 100), 6_400);
        assert_eq!(initial_capacity(4 << 30, 1_024), 65_536);
        assert_eq!(initial_capacity(10, 0), 0);
    }

    #[test]
    fn non_zip_returns_none() {
        assert!(unzip_members(b"definitely not a zip", MemberRepr::Bytes).is_none());
        assert!(unzip_members(&[], MemberRepr::Bytes).is_none());
    }

    #[test]
    fn directories_skipped_and_paths_flattened() {
        let data = build_zip(&[
            ("class1/", b""),
            ("class1/kim.pdf", b"pdf bytes"),
            ("class1/team/lee.hwp", b"hwp bytes"),
            ("park.docx", b"docx bytes"),
        ]);
        let members = unzip_members(&data, MemberRepr::Bytes).unwrap();
        let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["class1_kim.pdf", "class1_team_lee.hwp", "park.docx"]);
    }

    #[test]
    fn member_bytes_round_trip() {
        let data = build_zip(&[("a.pdf", b"hello")]);
        let mut members = unzip_members(&data, MemberRepr::Reader).unwrap();
        let (_, member) = members.remove(0);
        assert!(matches!(member, ArchiveMember::Reader(_)));
        assert_eq!(member.len(), 5);
        assert_eq!(member.into_bytes(), b"hello");
    }

    #[test]
    fn flattened_collisions_get_suffix() {
        let data = build_zip(&[
            ("a/b.pdf", b"first"),
            ("a_b.pdf", b"second"),
            ("a/b.pdf.d/", b""),
            ("a\\b.pdf", b"third"),
        ]);
        let members = unzip_members(&data, MemberRepr::Bytes).unwrap();
        let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a_b.pdf", "a_b (2).pdf", "a_b (3).pdf"]);
        let (_, second) = members.into_iter().nth(1).unwrap();
        assert_eq!(second.into_bytes(), b"second");
    }

    #[test]
    fn collision_without_extension() {
        let mut taken = HashSet::new();
        assert_eq!(disambiguate("README", &mut taken), "README");
        assert_eq!(disambiguate("README", &mut taken), "README (2)");
    }
}
