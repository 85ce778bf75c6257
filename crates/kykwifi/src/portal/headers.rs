//! Browser-like header profile sent with every portal request.

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, ORIGIN, REFERER,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36 Edg/135.0.0.0";

const SEC_CH_UA: &str = r#""Microsoft Edge";v="135", "Not-A.Brand";v="8", "Chromium";v="135""#;

const ACCEPT_DOCUMENT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
     image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

const ACCEPT_PARTIAL: &str = "application/xml, text/xml, */*; q=0.01";

/// Headers shared by every request; installed as client defaults.
pub fn base() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("tr,en;q=0.9,en-GB;q=0.8,en-US;q=0.7"),
    );
    headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static(SEC_CH_UA),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?0"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_static("\"Windows\""),
    );
    headers
}

/// Top-level page navigation. `same_origin` is false for the very first
/// request of a session.
pub fn navigate(referer: Option<&str>, same_origin: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_DOCUMENT));
    fetch_metadata(
        &mut headers,
        "document",
        "navigate",
        if same_origin { "same-origin" } else { "none" },
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-user"),
        HeaderValue::from_static("?1"),
    );
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    insert_url(&mut headers, REFERER, referer);
    headers
}

/// Credential form submission.
pub fn form_post(origin: &str, referer: &str) -> HeaderMap {
    let mut headers = navigate(Some(referer), true);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    insert_url(&mut headers, ORIGIN, Some(origin));
    headers
}

/// JSF partial/ajax request.
pub fn partial_ajax(origin: &str, referer: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_PARTIAL));
    headers.insert(
        HeaderName::from_static("faces-request"),
        HeaderValue::from_static("partial/ajax"),
    );
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    fetch_metadata(&mut headers, "empty", "cors", "same-origin");
    insert_url(&mut headers, ORIGIN, Some(origin));
    insert_url(&mut headers, REFERER, Some(referer));
    headers
}

fn fetch_metadata(headers: &mut HeaderMap, dest: &'static str, mode: &'static str, site: &'static str) {
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static(dest),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static(mode),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static(site),
    );
}

fn insert_url(headers: &mut HeaderMap, name: HeaderName, value: Option<&str>) {
    if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(name, value);
    }
}
