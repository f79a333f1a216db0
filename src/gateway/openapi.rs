use super::handlers::auth::{login, postcode, session};
use utoipa::{
    OpenApi,
    openapi::{Contact, InfoBuilder, License},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        login::login_page,
        login::submit_login,
        postcode::postcode_page,
        postcode::submit_postcode_form,
        session::logout,
        session::logged_in,
        session::timed_out,
    ),
    components(schemas(login::LoginForm, postcode::PostcodeForm)),
    tags(
        (name = "auth", description = "Access code login, postcode confirmation and session endpoints"),
    )
)]
struct ApiDoc;

/// The `/auth` surface. Instrument routes are proxied and not described.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info = cargo_info();
    doc
}

fn cargo_info() -> utoipa::openapi::Info {
    // Cargo.toml metadata, not utoipa's defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    let non_empty = |value: &str| !value.is_empty();
    match author.find('<') {
        Some(start) => {
            let name = author[..start].trim();
            let email = author[start + 1..].trim_end_matches('>').trim();
            (
                Some(name).filter(|v| non_empty(v)),
                Some(email).filter(|v| non_empty(v)),
            )
        }
        None => (Some(author.trim()).filter(|v| non_empty(v)), None),
    }
}
