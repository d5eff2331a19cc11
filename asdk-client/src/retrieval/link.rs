//! Export files as downloadable links

use crate::error::{AsdkError, AsdkResult};
use crate::jobs::{ExportFile, ExportJob};
use reqwest::Url;
use std::collections::BTreeMap;

/// Identity of the file holding the avatar model itself
pub const AVATAR_IDENTITY: &str = "avatar";

/// Category given to files that carry none
pub const DEFAULT_CATEGORY: &str = "avatar";

/// Where to fetch a file and what to call it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub href: Url,
    pub filename: String,
}

/// Export files grouped as category → identity → file
pub type ExportFileGroups<'a> = BTreeMap<String, BTreeMap<String, &'a ExportFile>>;

/// Last path segment of a URL, query and fragment excluded
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Direct link carrying the access token as a query parameter
///
/// Nothing is fetched; whoever follows the link performs the transfer.
pub fn direct_link(
    url: &str,
    token: &str,
    filename: impl Into<String>,
) -> AsdkResult<DownloadLink> {
    let mut href =
        Url::parse(url).map_err(|e| AsdkError::Parse(format!("Invalid URL {}: {}", url, e)))?;
    href.query_pairs_mut().append_pair("access_token", token);

    Ok(DownloadLink {
        href,
        filename: filename.into(),
    })
}

pub fn group_export_files(files: &[ExportFile]) -> ExportFileGroups<'_> {
    let mut groups = ExportFileGroups::new();
    for file in files {
        let category = file
            .category
            .clone()
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        groups
            .entry(category)
            .or_default()
            .insert(file.identity.clone(), file);
    }
    groups
}

/// The export file holding the avatar model
pub fn avatar_file(export: &ExportJob) -> AsdkResult<&ExportFile> {
    export
        .files
        .iter()
        .find(|f| f.identity == AVATAR_IDENTITY)
        .ok_or_else(|| AsdkError::NotFound("No avatar preview export file found".to_string()))
}

/// Links for every file of an export
///
/// Each archive is offered as `<identity>.zip`, each static file under its
/// own name.
pub fn export_links(export: &ExportJob, token: &str) -> AsdkResult<Vec<DownloadLink>> {
    let mut links = Vec::new();
    for file in &export.files {
        links.push(direct_link(
            &file.file,
            token,
            format!("{}.zip", file.identity),
        )?);
        for url in &file.static_files {
            links.push(direct_link(url, token, file_name_from_url(url))?);
        }
    }
    Ok(links)
}
