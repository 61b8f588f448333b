//! Turns raw uploads into the ordered file list handed to extraction.

use std::collections::HashSet;

use crate::config::ScoringConfig;

use super::archive::{unzip_members, MemberRepr};
use super::format::get_suffix;
use super::ImportError;

/// A named upload, either submitted directly or taken out of a zip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn extension(&self) -> String {
        get_suffix(&self.name)
    }
}

/// Expand zips, check every file against the allow-list and reject duplicate
/// names. Nothing is extracted until this succeeds for the whole upload.
pub fn collect_uploads(
    uploads: Vec<UploadedFile>,
    config: &ScoringConfig,
) -> Result<Vec<UploadedFile>, ImportError> {
    let mut files = Vec::with_capacity(uploads.len());

    for upload in uploads {
        let name = upload.name.trim().to_string();
        if name.is_empty() {
            return Err(ImportError::EmptyName);
        }
        let extension = get_suffix(&name);

        if extension == ".zip" {
            let members = unzip_members(&upload.bytes, MemberRepr::Bytes)
                .ok_or_else(|| ImportError::InvalidArchive(name.clone()))?;
            tracing::info!(archive = %name, members = members.len(), "Unpacked zip upload");

            for (member, data) in members {
                let member_ext = get_suffix(&member);
                if !config.is_allowed_extension(&member_ext) {
                    tracing::warn!(archive = %name, member = %member, "Rejected zip member");
                    return Err(ImportError::UnsupportedFormat {
                        member,
                        extension: member_ext,
                    });
                }
                files.push(UploadedFile::new(member, data.into_bytes()));
            }
        } else {
            if !config.is_allowed_extension(&extension) {
                tracing::warn!(file = %name, "Rejected upload");
                return Err(ImportError::UnsupportedFormat {
                    member: name,
                    extension,
                });
            }
            files.push(UploadedFile::new(name, upload.bytes));
        }
    }

    if files.is_empty() {
        return Err(ImportError::EmptyBatch);
    }

    let mut seen = HashSet::new();
    for file in &files {
        if !seen.insert(file.name.as_str()) {
            return Err(ImportError::DuplicateName(file.name.clone()));
        }
    }

    tracing::debug!(count = files.len(), "Collected uploads");
    Ok(files)
}
