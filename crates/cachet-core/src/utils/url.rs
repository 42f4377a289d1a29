//! Signed URL redaction for log output.

use url::Url;

/// Query parameters of signed blob URLs that grant access
const SECRET_PARAMS: &[&str] = &["sig", "signature", "se", "sv", "sp", "skoid", "sktid", "token"];

/// Replace credential-bearing query values with `***`
///
/// Unparseable input is masked entirely.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "***".to_string();
    };

    if url.query().is_none() {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str()) {
                (k.into_owned(), "***".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();

    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}
