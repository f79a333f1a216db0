//! Minimal HTML pages.
//!
//! Only fixed messages and numbers are interpolated, never request data.

use super::state::UacKind;

fn page(lang: &str, title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

fn error_summary(error: Option<&str>) -> String {
    error.map_or_else(String::new, |message| {
        format!("<div class=\"error-summary\" role=\"alert\"><p>{message}</p></div>\n")
    })
}

fn lang(welsh: bool) -> &'static str {
    if welsh { "cy" } else { "en" }
}

#[must_use]
pub fn login_page(kind: UacKind, welsh: bool, error: Option<&str>) -> String {
    let length = kind.code_length();
    let hint = match kind {
        UacKind::Uac => format!("Enter your {length}-digit access code"),
        UacKind::Uac16 => format!("Enter your {length}-character access code"),
    };
    let body = format!(
        "<h1>Access study</h1>\n{}<form method=\"post\" action=\"/auth/login\" data-uac-kind=\"{kind}\">\n<label for=\"uac\">{hint}</label>\n<input id=\"uac\" name=\"uac\" type=\"text\" autocomplete=\"off\" maxlength=\"{}\">\n<button type=\"submit\">Access study</button>\n</form>",
        error_summary(error),
        length + 4,
    );
    page(lang(welsh), "Access study", &body)
}

#[must_use]
pub fn postcode_page(welsh: bool, error: Option<&str>) -> String {
    let body = format!(
        "<h1>Confirm your postcode</h1>\n{}<form method=\"post\" action=\"/auth/login/postcode\">\n<label for=\"postcode\">Postcode</label>\n<input id=\"postcode\" name=\"postcode\" type=\"text\" autocomplete=\"postal-code\">\n<button type=\"submit\">Continue</button>\n</form>",
        error_summary(error),
    );
    page(lang(welsh), "Confirm your postcode", &body)
}

#[must_use]
pub fn logout_page(welsh: bool) -> String {
    page(
        lang(welsh),
        "Signed out",
        "<h1>You have signed out</h1>\n<p><a href=\"/auth/login\">Access study</a></p>",
    )
}

#[must_use]
pub fn timed_out_page(welsh: bool, timeout_minutes: i64) -> String {
    let body = format!(
        "<h1>Your session has timed out</h1>\n<p>You have been inactive for {timeout_minutes} minutes.</p>\n<p><a href=\"/auth/login\">Access study</a></p>"
    );
    page(lang(welsh), "Session timed out", &body)
}

#[must_use]
pub fn access_denied_page() -> String {
    page(
        "en",
        "Access denied",
        "<h1>Access denied</h1>\n<p>You do not have access to this study.</p>",
    )
}

#[must_use]
pub fn unavailable_page() -> String {
    page(
        "en",
        "Study unavailable",
        "<h1>Sorry, this study is unavailable</h1>\n<p>Please try again later.</p>",
    )
}

#[must_use]
pub fn server_error_page() -> String {
    page(
        "en",
        "Sorry, there is a problem",
        "<h1>Sorry, there is a problem with the service</h1>\n<p>Please try again later.</p>",
    )
}

#[must_use]
pub fn not_found_page() -> String {
    page("en", "Page not found", "<h1>Page not found</h1>")
}
