use serde::{Deserialize, Serialize};

/// One extracted disinformation case.
///
/// Field order is the column order of written CSV files. A field is `None`
/// when the case page has no such section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseRecord {
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Outlet")]
    pub outlet: Option<String>,
    #[serde(rename = "Date of publication")]
    pub date_of_publication: Option<String>,
    #[serde(rename = "Article language(s)")]
    pub article_languages: Option<String>,
    #[serde(rename = "Countries / regions discussed")]
    pub countries_discussed: Option<String>,
    #[serde(rename = "Summary")]
    pub summary: Option<String>,
    #[serde(rename = "Response")]
    pub response: Option<String>,
}

pub const CASE_HEADERS: [&str; 7] = [
    "Title",
    "Outlet",
    "Date of publication",
    "Article language(s)",
    "Countries / regions discussed",
    "Summary",
    "Response",
];
