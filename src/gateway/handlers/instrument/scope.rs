//! Which instruments and cases a claim may reach.

use crate::claims::SessionClaim;
use regex::Regex;
use std::sync::OnceLock;

/// Instruments issued in pairs: `dia` + four digits + `a` or `b`.
const PAIRED_INSTRUMENT_PATTERN: &str = r"(?i)^dia(\d{4})([ab])$";

fn paired_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PAIRED_INSTRUMENT_PATTERN).ok())
        .as_ref()
}

/// True when `a` and `b` are the two halves of one paired instrument, for
/// example `dia2101a` and `dia2101b`. Symmetric.
#[must_use]
pub fn paired_instruments(a: &str, b: &str) -> bool {
    let Some(pattern) = paired_pattern() else {
        return false;
    };
    let (Some(left), Some(right)) = (pattern.captures(a), pattern.captures(b)) else {
        return false;
    };
    left[1] == right[1] && !left[2].eq_ignore_ascii_case(&right[2])
}

#[must_use]
pub fn authorized_for_instrument(claim: &SessionClaim, requested: &str) -> bool {
    claim.instrument.eq_ignore_ascii_case(requested)
        || paired_instruments(&claim.instrument, requested)
}

#[must_use]
pub fn authorized_for_case(claim: &SessionClaim, case_id: &str) -> bool {
    !case_id.is_empty() && claim.case_id.eq_ignore_ascii_case(case_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(instrument: &str, case_id: &str) -> SessionClaim {
        SessionClaim {
            uac: "123456789012".to_string(),
            instrument: instrument.to_string(),
            case_id: case_id.to_string(),
            postcode_validated: true,
            auth_timeout: 15,
            iss: "surveygate".to_string(),
            iat: 0,
            exp: 0,
            jti: "jti".to_string(),
        }
    }

    #[test]
    fn instrument_match_ignores_case() {
        let claim = claim("foo", "bar");
        assert!(authorized_for_instrument(&claim, "foo"));
        assert!(authorized_for_instrument(&claim, "FOO"));
        assert!(!authorized_for_instrument(&claim, "bar"));
        assert!(!authorized_for_instrument(&claim, "foo2"));
    }

    #[test]
    fn paired_rule_is_symmetric() {
        assert!(paired_instruments("dia2101a", "dia2101b"));
        assert!(paired_instruments("dia2101b", "dia2101a"));
        assert!(paired_instruments("DIA2101A", "dia2101b"));
        assert!(authorized_for_instrument(&claim("dia2101a", "1"), "dia2101b"));
        assert!(authorized_for_instrument(&claim("dia2101b", "1"), "dia2101a"));
    }

    #[test]
    fn paired_rule_needs_same_digits_and_other_letter() {
        assert!(!paired_instruments("dia2101a", "dia2102b"));
        assert!(!paired_instruments("dia2101a", "dia2101a"));
        assert!(!paired_instruments("dia2101a", "dia2101c"));
        assert!(!paired_instruments("dst2101a", "dst2101b"));
        assert!(!paired_instruments("dia21010a", "dia21010b"));
    }

    #[test]
    fn case_match_ignores_case_and_rejects_empty() {
        let claim = claim("foo", "Bar");
        assert!(authorized_for_case(&claim, "bar"));
        assert!(!authorized_for_case(&claim, "baz"));
        assert!(!authorized_for_case(&claim, ""));
    }
}
