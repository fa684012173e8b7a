use serde::{Deserialize, Serialize};

use crate::shell::{FileInfo, FileType};

/// One backed-up file, as recorded at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentsEntry {
    /// Path relative to the backup root, artifact directory included
    /// (e.g. `data/databases`). Escaped spaces preserved verbatim.
    pub path: String,
    pub file_type: FileType,
    pub size: u64,
    /// 9-bit permission mask.
    pub mode: u16,
    pub owner: String,
    pub group: String,
    pub mod_time_millis: i64,
}

impl ContentsEntry {
    pub fn from_file_info(artifact_dir: &str, info: &FileInfo) -> Self {
        Self {
            path: format!("{artifact_dir}/{}", info.file_path),
            file_type: info.file_type,
            size: info.file_size,
            mode: info.file_mode,
            owner: info.owner.clone(),
            group: info.group.clone(),
            mod_time_millis: info.mod_time_millis(),
        }
    }

    /// Permission mask rendered for `chmod`.
    pub fn mode_octal(&self) -> String {
        format!("{:03o}", self.mode)
    }

    /// Path relative to the artifact directory, if the entry belongs to it.
    pub fn path_in(&self, artifact_dir: &str) -> Option<&str> {
        self.path.strip_prefix(artifact_dir).and_then(|rest| rest.strip_prefix('/'))
    }
}

/// Everything a backup revision contains, written alongside the artifacts and
/// used by the restore verification stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentsManifest {
    pub entries: Vec<ContentsEntry>,
}

impl ContentsManifest {
    pub const FILE_NAME: &'static str = "contents.json";
    pub const MIME_TYPE: &'static str = "application/json";

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Entries belonging to one artifact directory.
    pub fn entries_in<'a>(
        &'a self,
        artifact_dir: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a ContentsEntry)> {
        self.entries
            .iter()
            .filter_map(move |entry| entry.path_in(artifact_dir).map(|path| (path, entry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::FileInfo;

    const LINE: &str =
        "-rw------- 1 u0_a247 u0_a247 1024 2021-01-19 01:03:29.000000000 +0100 prefs.xml";

    #[test]
    fn entry_captures_all_file_info_fields() {
        let info = FileInfo::from_ls_output(LINE, "/data/data/org.example").unwrap();
        let entry = ContentsEntry::from_file_info("data", &info);
        assert_eq!(entry.path, "data/prefs.xml");
        assert_eq!(entry.size, 1024);
        assert_eq!(entry.mode_octal(), "600");
        assert_eq!(entry.owner, "u0_a247");
        assert_eq!(entry.mod_time_millis, 1611014609000);
    }

    #[test]
    fn manifest_round_trips_and_filters_by_artifact() {
        let info = FileInfo::from_ls_output(LINE, "/data/data/org.example").unwrap();
        let manifest = ContentsManifest {
            entries: vec![
                ContentsEntry::from_file_info("data", &info),
                ContentsEntry::from_file_info("external_files", &info),
            ],
        };
        let restored = ContentsManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(restored, manifest);

        let data_entries: Vec<_> = restored.entries_in("data").collect();
        assert_eq!(data_entries.len(), 1);
        assert_eq!(data_entries[0].0, "prefs.xml");
    }
}
