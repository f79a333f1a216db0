use super::{Error, SessionClaim};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Header {
    alg: String,
    typ: String,
}

impl Header {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn mac(secret: &SecretString, signing_input: &str) -> Result<HmacSha256, Error> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| Error::Key)?;
    mac.update(signing_input.as_bytes());
    Ok(mac)
}

/// Sign a session claim as an HS256 JWT.
///
/// # Errors
///
/// Returns an error if the header or claim cannot be encoded, or the secret is
/// rejected as an HMAC key.
pub fn sign_hs256(secret: &SecretString, claim: &SessionClaim) -> Result<String, Error> {
    let header_b64 = b64e_json(&Header::hs256())?;
    let claim_b64 = b64e_json(claim)?;
    let signing_input = format!("{header_b64}.{claim_b64}");

    let signature = mac(secret, &signing_input)?.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify an HS256 JWT and return its claim.
///
/// # Errors
///
/// Returns an error if:
/// - the token is malformed or contains invalid base64/json,
/// - the header names an algorithm other than HS256,
/// - the signature does not match,
/// - the issuer differs or the claim has expired.
pub fn verify_hs256(
    token: &str,
    secret: &SecretString,
    expected_issuer: &str,
    now_unix_seconds: i64,
) -> Result<SessionClaim, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claim_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: Header = b64d_json(header_b64)?;
    if header.alg != ALGORITHM {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
    let signing_input = format!("{header_b64}.{claim_b64}");
    mac(secret, &signing_input)?
        .verify_slice(&signature)
        .map_err(|_| Error::InvalidSignature)?;

    let claim: SessionClaim = b64d_json(claim_b64)?;
    if claim.iss != expected_issuer {
        return Err(Error::InvalidIssuer);
    }
    if now_unix_seconds >= claim.exp {
        return Err(Error::Expired);
    }

    Ok(claim)
}
