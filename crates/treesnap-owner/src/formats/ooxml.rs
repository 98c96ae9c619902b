//! Creator of an Open XML package (`docProps/core.xml`).

use std::io::{Read, Seek};
use std::sync::LazyLock;

use regex::Regex;
use zip::ZipArchive;
use zip::result::ZipError;

use super::clean_author;
use crate::error::StrategyError;

const CORE_PROPERTIES: &str = "docProps/core.xml";
const MAX_CORE_XML: u64 = 1024 * 1024;

static CREATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<dc:creator(?:\s[^>]*)?>([^<]*)</dc:creator>").expect("valid creator pattern")
});

pub(super) fn read_creator<R: Read + Seek>(reader: R) -> Result<String, StrategyError> {
    let mut archive = ZipArchive::new(reader).map_err(zip_error)?;
    let entry = archive.by_name(CORE_PROPERTIES).map_err(|e| match e {
        ZipError::FileNotFound => StrategyError::NoData,
        other => zip_error(other),
    })?;

    let mut xml = String::new();
    entry.take(MAX_CORE_XML).read_to_string(&mut xml)?;
    creator_from_xml(&xml).ok_or(StrategyError::NoData)
}

fn creator_from_xml(xml: &str) -> Option<String> {
    let raw = CREATOR.captures(xml)?.get(1)?.as_str();
    clean_author(&unescape(raw))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn zip_error(error: ZipError) -> StrategyError {
    match error {
        ZipError::Io(e) => StrategyError::from_io(e),
        other => StrategyError::format("ooxml", other.to_string()),
    }
}
