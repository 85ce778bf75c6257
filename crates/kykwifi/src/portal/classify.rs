//! Text-driven outcome classification.
//!
//! The portal has no structured error protocol, so credential failures and
//! logout confirmation are recognised by fixed phrases of this one
//! deployment. Keep them verbatim.

use super::Endpoints;
use reqwest::Url;

/// Lower-case, ASCII-folded fragments the login page shows for bad
/// credentials.
pub const CREDENTIAL_ERROR_PHRASES: [&str; 3] = [
    "hatali kullanici adi veya sifre",
    "gecersiz kullanici adi veya parola",
    "kimlik bilgileri dogrulanamadi",
];

pub const LOGOUT_CONFIRMATION: &str = "Basari ile cikis yaptiniz";

/// Lower-cases `text` and maps Turkish letters to their ASCII base, so
/// "Hatalı kullanıcı adı veya şifre" matches the folded phrase list.
pub fn fold_turkish(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ı' | 'İ' | 'I' => 'i',
            'ğ' | 'Ğ' => 'g',
            'ü' | 'Ü' => 'u',
            'ş' | 'Ş' => 's',
            'ö' | 'Ö' => 'o',
            'ç' | 'Ç' => 'c',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

pub fn has_credential_error_phrase(body: &str) -> bool {
    let folded = fold_turkish(body);
    CREDENTIAL_ERROR_PHRASES
        .iter()
        .any(|phrase| folded.contains(phrase))
}

pub fn is_logout_confirmed(body: &str) -> bool {
    fold_turkish(body).contains(&fold_turkish(LOGOUT_CONFIRMATION))
}

/// A quota poll answered with an HTML page instead of a partial-response
/// document means the portal dropped the session.
pub fn is_expired_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

/// Where the credential POST sent us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginRedirect {
    /// Redirect to exactly the post-login landing URL.
    Landing,
    /// Redirect back to the login page; the target may carry an error message.
    BackToLogin(Url),
    /// Redirect somewhere unexpected.
    Elsewhere(String),
    /// No redirect at all; the response body itself is the answer.
    NotRedirected,
}

/// Success is a 302 whose raw `Location` equals the landing URL. Other
/// targets are resolved against the credential-check URL only to spot a
/// bounce back to the login page.
pub fn classify_login_redirect(
    status: u16,
    location: Option<&str>,
    endpoints: &Endpoints,
) -> LoginRedirect {
    if !(300..400).contains(&status) {
        return LoginRedirect::NotRedirected;
    }
    let Some(location) = location else {
        return LoginRedirect::Elsewhere(String::new());
    };
    if status == 302 && location == endpoints.landing {
        return LoginRedirect::Landing;
    }
    let resolved = Url::parse(&endpoints.check)
        .and_then(|base| base.join(location))
        .ok();

    match resolved {
        Some(url) if url.as_str().starts_with(&endpoints.login) => LoginRedirect::BackToLogin(url),
        _ => LoginRedirect::Elsewhere(location.to_string()),
    }
}
