//! Paths of the files a capture job writes under the increment prefix.
//!
//! ```text
//! <schema>/meta/schema_<version>_<checksum>.json              schema-level DDL
//! <schema>/<table>/meta/schema_<version>_<checksum>.json      table definitions
//! <schema>/<table>/<version>[/<date>]/CDC<index>.csv          change files
//! ```

use std::collections::BTreeMap;

use crate::types::TableName;

/// A file written by the capture service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFile {
    Schema { version: u64 },
    Data { version: u64, date: String, index: u64 },
}

/// Classifies `relative`, a path below the increment prefix. Paths of other tables and
/// bookkeeping files yield `None`.
pub fn parse_change_path(relative: &str, table: &TableName) -> Option<ChangeFile> {
    let segments: Vec<&str> = relative.split('/').collect();

    match segments.as_slice() {
        [schema, "meta", file] if *schema == table.schema => parse_schema_file(file),
        [schema, name, "meta", file] if *schema == table.schema && *name == table.name => {
            parse_schema_file(file)
        }
        [schema, name, version, rest @ ..] if *schema == table.schema && *name == table.name => {
            let version = version.parse().ok()?;
            let (date, file) = match rest {
                [file] => ("", *file),
                [date, file] => (*date, *file),
                _ => return None,
            };
            let index = file.strip_prefix("CDC")?.strip_suffix(".csv")?.parse().ok()?;

            Some(ChangeFile::Data {
                version,
                date: date.to_owned(),
                index,
            })
        }
        _ => None,
    }
}

fn parse_schema_file(file: &str) -> Option<ChangeFile> {
    let (version, _checksum) = file
        .strip_prefix("schema_")?
        .strip_suffix(".json")?
        .split_once('_')?;

    Some(ChangeFile::Schema {
        version: version.parse().ok()?,
    })
}

/// Schema versions and change files of one table at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLayout {
    /// Schema file path of every version.
    pub schemas: BTreeMap<u64, String>,
    /// Change file paths of every version, in write order.
    pub data: BTreeMap<u64, Vec<String>>,
}

impl ChangeLayout {
    /// Builds the layout from a listing. `prefix` is stripped from each path before parsing and
    /// kept in the stored paths.
    pub fn from_paths<I, S>(paths: I, prefix: &str, table: &TableName) -> ChangeLayout
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut layout = ChangeLayout::default();
        let mut data: BTreeMap<u64, Vec<(String, u64, String)>> = BTreeMap::new();

        for path in paths {
            let path = path.as_ref();
            let relative = match prefix {
                "" => path,
                prefix => match path.strip_prefix(prefix).and_then(|p| p.strip_prefix('/')) {
                    Some(relative) => relative,
                    None => continue,
                },
            };

            match parse_change_path(relative, table) {
                Some(ChangeFile::Schema { version }) => {
                    layout.schemas.insert(version, path.to_owned());
                }
                Some(ChangeFile::Data {
                    version,
                    date,
                    index,
                }) => {
                    data.entry(version)
                        .or_default()
                        .push((date, index, path.to_owned()));
                }
                None => {}
            }
        }

        for (version, mut files) in data {
            files.sort();
            layout
                .data
                .insert(version, files.into_iter().map(|(_, _, path)| path).collect());
        }

        layout
    }

    pub fn oldest_version(&self) -> Option<u64> {
        self.schemas.keys().next().copied()
    }

    /// Versions newer than `version`, in order.
    pub fn versions_after(&self, version: u64) -> impl Iterator<Item = u64> + '_ {
        self.schemas
            .range(version.saturating_add(1)..)
            .map(|(version, _)| *version)
    }

    pub fn files_of(&self, version: u64) -> &[String] {
        self.data.get(&version).map(Vec::as_slice).unwrap_or_default()
    }
}
