use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dca_crawler::FilterSelection;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Countries,
    Languages,
    Tags,
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [Self::Countries, Self::Languages, Self::Tags];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Countries => "countryregion_codes.json",
            Self::Languages => "language_codes.json",
            Self::Tags => "tag_codes.json",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Countries => "countries / regions discussed",
            Self::Languages => "article languages",
            Self::Tags => "tags",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Countries => "countries",
            Self::Languages => "languages",
            Self::Tags => "tags",
        };
        f.write_str(s)
    }
}

impl FromStr for FilterKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "countries" | "country" | "regions" => Ok(Self::Countries),
            "languages" | "language" => Ok(Self::Languages),
            "tags" | "tag" => Ok(Self::Tags),
            _ => Err(anyhow::anyhow!("Unknown filter kind: {s}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Failed to load {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON decode error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Code {
    Text(String),
    Number(serde_json::Number),
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        match code {
            Code::Text(s) => s,
            Code::Number(n) => n.to_string(),
        }
    }
}

/// Label to query-code mapping of one filter category, ordered by label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterTable {
    codes: BTreeMap<String, String>,
}

impl FilterTable {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, Code> = serde_json::from_str(json)?;
        let codes = raw
            .into_iter()
            .map(|(label, code)| (label, code.into()))
            .collect();
        Ok(Self { codes })
    }

    pub fn from_path(path: &Path) -> Result<Self, FilterError> {
        let json = fs_err::read_to_string(path).map_err(|source| FilterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json).map_err(|source| FilterError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(String::as_str)
    }

    pub fn code(&self, label: &str) -> Option<&str> {
        self.codes.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// The three filter categories. A category whose file couldn't be loaded is
/// disabled and resolves to no codes.
#[derive(Debug, Clone, Default)]
pub struct FilterCatalog {
    countries: Option<FilterTable>,
    languages: Option<FilterTable>,
    tags: Option<FilterTable>,
}

impl FilterCatalog {
    pub fn load(dir: &Path) -> Self {
        let load = |kind: FilterKind| match FilterTable::from_path(&dir.join(kind.file_name())) {
            Ok(table) => {
                log::debug!("Loaded {} {kind} filters", table.len());
                Some(table)
            }
            Err(e) => {
                log::warn!("{e}, disabling {} filter", kind.label());
                None
            }
        };

        Self {
            countries: load(FilterKind::Countries),
            languages: load(FilterKind::Languages),
            tags: load(FilterKind::Tags),
        }
    }

    pub fn with_table(mut self, kind: FilterKind, table: FilterTable) -> Self {
        *self.slot(kind) = Some(table);
        self
    }

    fn slot(&mut self, kind: FilterKind) -> &mut Option<FilterTable> {
        match kind {
            FilterKind::Countries => &mut self.countries,
            FilterKind::Languages => &mut self.languages,
            FilterKind::Tags => &mut self.tags,
        }
    }

    pub fn table(&self, kind: FilterKind) -> Option<&FilterTable> {
        match kind {
            FilterKind::Countries => self.countries.as_ref(),
            FilterKind::Languages => self.languages.as_ref(),
            FilterKind::Tags => self.tags.as_ref(),
        }
    }

    /// Maps labels to codes in the given order. Unknown labels are skipped.
    pub fn resolve<S: AsRef<str>>(&self, kind: FilterKind, labels: &[S]) -> Vec<String> {
        let table = match self.table(kind) {
            Some(table) => table,
            None => {
                if !labels.is_empty() {
                    log::warn!("The {} filter is disabled, ignoring it", kind.label());
                }
                return vec![];
            }
        };

        labels
            .iter()
            .filter_map(|label| {
                let label = label.as_ref();
                let code = table.code(label);
                if code.is_none() {
                    log::warn!("Unknown {kind} filter: {label:?}");
                }
                code.map(String::from)
            })
            .collect()
    }

    pub fn selection<S: AsRef<str>>(
        &self,
        countries: &[S],
        languages: &[S],
        tags: &[S],
    ) -> FilterSelection {
        FilterSelection {
            countries: self.resolve(FilterKind::Countries, countries),
            languages: self.resolve(FilterKind::Languages, languages),
            tags: self.resolve(FilterKind::Tags, tags),
        }
    }
}
