//! Login form extraction.
//!
//! Scrapes the session login page for the values a form post must echo back:
//! every hidden input, plus an anti-forgery token that may live in a hidden
//! input, a `<meta>` tag or inline script state. Pattern matching is enough
//! here; the page is not otherwise interpreted.

use std::sync::LazyLock;

use regex::Regex;

static HIDDEN_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<input\b[^>]*\btype\s*=\s*["']hidden["'][^>]*>"#)
        .expect("hidden input pattern is valid")
});

static NAME_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)name\s*=\s*["']([^"']+)["']"#).expect("name pattern is valid")
});

static VALUE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)value\s*=\s*["']([^"']*)["']"#).expect("value pattern is valid")
});

static META_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\b[^>]*name\s*=\s*["'](?:_csrf|csrf-token|csrf_token)["'][^>]*content\s*=\s*["']([^"']+)["']"#)
        .expect("meta token pattern is valid")
});

static SCRIPT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)["']?(?:csrf[_-]?token|_csrf|anti[_-]?forgery[_-]?token|owasp_csrftoken)["']?\s*[:=]\s*["']([^"']+)["']"#,
    )
    .expect("script token pattern is valid")
});

/// Values scraped from the login page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    /// Hidden inputs in document order. Inputs without a `value` attribute
    /// are kept with an empty value.
    pub hidden_fields: Vec<(String, String)>,

    pub anti_forgery_token: Option<String>,
}

impl LoginForm {
    /// Builds the form body: hidden fields first, then the credential fields,
    /// which replace any hidden field of the same name.
    pub fn submission(&self, username: &str, password: &str) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = self
            .hidden_fields
            .iter()
            .filter(|(name, _)| name != "user" && name != "password")
            .cloned()
            .collect();
        fields.push(("user".to_string(), username.to_string()));
        fields.push(("password".to_string(), password.to_string()));
        fields
    }
}

/// Extracts hidden fields and the anti-forgery token from login page HTML.
pub fn extract_login_form(html: &str) -> LoginForm {
    let hidden_fields: Vec<(String, String)> = HIDDEN_INPUT
        .find_iter(html)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let name = NAME_ATTR.captures(tag)?.get(1)?.as_str().to_string();
            let value = VALUE_ATTR
                .captures(tag)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((name, value))
        })
        .collect();

    let from_hidden = hidden_fields
        .iter()
        .find(|(name, value)| is_token_name(name) && !value.is_empty())
        .map(|(_, value)| value.clone());

    let anti_forgery_token = from_hidden
        .or_else(|| capture(&META_TOKEN, html))
        .or_else(|| capture(&SCRIPT_TOKEN, html));

    LoginForm {
        hidden_fields,
        anti_forgery_token,
    }
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn is_token_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("csrf") || lower.contains("forgery") || lower.contains("xsrf")
}

/// Returns true if the page contains a password input (i.e. it is still a
/// login form).
pub fn has_password_input(html: &str) -> bool {
    static PASSWORD_INPUT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?is)<input\b[^>]*\btype\s*=\s*["']password["']"#)
            .expect("password input pattern is valid")
    });
    PASSWORD_INPUT.is_match(html)
}
