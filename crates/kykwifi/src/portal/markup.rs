//! Extraction of the view-state token and the quota figure from portal
//! markup.

use crate::outcome::{Quota, ViewState};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

pub const VIEW_STATE_FIELD: &str = "javax.faces.ViewState";
/// Partial-response update carrying the refreshed view state.
pub const VIEW_STATE_UPDATE_ID: &str = "j_id1:javax.faces.ViewState:0";
/// Partial-response update carrying the quota panel.
pub const QUOTA_UPDATE_ID: &str = "mainPanel:kota";
pub const QUOTA_LABEL: &str = "Toplam Kalan Kota (MB):";

static UPDATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<update\s+id\s*=\s*"([^"]*)"\s*>(.*?)</update>"#)
        .expect("update pattern is valid")
});

static CDATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("CDATA pattern is valid"));

/// Reads the hidden `javax.faces.ViewState` input of a full page.
pub fn extract_view_state(html: &str) -> Option<ViewState> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"input[name="javax.faces.ViewState"]"#).ok()?;
    document
        .select(&selector)
        .find_map(|input| input.value().attr("value"))
        .and_then(ViewState::new)
}

/// The `<update>` sections of a JSF partial-response document.
#[derive(Debug, Default)]
pub struct PartialResponse {
    updates: Vec<(String, String)>,
}

impl PartialResponse {
    /// Returns `None` if `xml` is not a partial-response document at all.
    pub fn parse(xml: &str) -> Option<Self> {
        if !xml.contains("<partial-response") {
            return None;
        }
        let updates = UPDATE_RE
            .captures_iter(xml)
            .map(|caps| (caps[1].to_string(), unwrap_character_data(&caps[2])))
            .collect();
        Some(Self { updates })
    }

    pub fn update(&self, id: &str) -> Option<&str> {
        self.updates
            .iter()
            .find(|(update_id, _)| update_id == id)
            .map(|(_, content)| content.as_str())
            .filter(|content| !content.trim().is_empty())
    }

    pub fn view_state(&self) -> Option<ViewState> {
        self.update(VIEW_STATE_UPDATE_ID).and_then(ViewState::new)
    }

    pub fn quota_markup(&self) -> Option<&str> {
        self.update(QUOTA_UPDATE_ID)
    }
}

/// Joins CDATA sections (JSF splits content containing `]]>` across
/// several), or unescapes plain character data.
fn unwrap_character_data(raw: &str) -> String {
    if raw.contains("<![CDATA[") {
        CDATA_RE
            .captures_iter(raw)
            .map(|caps| caps[1].to_string())
            .collect()
    } else {
        raw.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }
}

/// Finds the quota label, climbs to its table cell, and reads the label in
/// the next cell of the same row.
pub fn extract_quota(markup: &str) -> Option<Quota> {
    let fragment = Html::parse_fragment(markup);
    let label_selector = Selector::parse("label").ok()?;

    let Some(label) = fragment
        .select(&label_selector)
        .find(|label| label.text().collect::<String>().trim().contains(QUOTA_LABEL))
    else {
        log::warn!("Quota label '{}' not found in quota markup.", QUOTA_LABEL);
        log::debug!("Quota markup:\n{}", markup);
        return None;
    };

    let Some(cell) = label
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")
    else {
        log::warn!("Quota label is not inside a table cell.");
        return None;
    };

    let Some(value_cell) = cell
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")
    else {
        log::warn!("Quota value cell not found.");
        return None;
    };

    let Some(value_label) = value_cell.select(&label_selector).next() else {
        log::warn!("Quota value label not found.");
        return None;
    };

    let remaining_mb = value_label.text().collect::<String>().trim().to_string();
    if remaining_mb.is_empty() {
        log::warn!("Quota value label is empty.");
        return None;
    }
    Some(Quota { remaining_mb })
}
