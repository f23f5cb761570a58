//! AWS Signature Version 4 signing, as a pure function (§4.1, §9): given
//! credentials, region, service and a request, it returns the header set to
//! attach. No network access, no wall-clock reads — the caller supplies the
//! timestamp — so it's exercised directly in tests against fixed vectors.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// The header set a signed request must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub x_amz_date: String,
    pub host: String,
}

/// Sign a `x-www-form-urlencoded` POST request to `service` in `region`.
///
/// `amz_date` is a `%Y%m%dT%H%M%SZ` timestamp, supplied by the caller so
/// this function stays deterministic and network-free.
pub fn sign(
    access_key: &str,
    secret_key: &str,
    region: &str,
    service: &str,
    host: &str,
    path: &str,
    body: &str,
    amz_date: &str,
) -> SignedHeaders {
    let date_stamp = &amz_date[0..8];

    let payload_hash = hex_digest(body.as_bytes());

    let canonical_headers = format!("host:{host}\nx-amz-date:{amz_date}\n");
    let signed_headers = "host;x-amz-date";

    let canonical_request = format!(
        "POST\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
    );

    let credential_scope = format!("{date_stamp}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        hex_digest(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(secret_key, date_stamp, region, service);
    let signature = hex_hmac(&signing_key, string_to_sign.as_bytes());

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={access_key}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
    );

    SignedHeaders {
        authorization,
        x_amz_date: amz_date.to_string(),
        host: host.to_string(),
    }
}

fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_raw(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_raw(&k_date, region.as_bytes());
    let k_service = hmac_raw(&k_region, service.as_bytes());
    hmac_raw(&k_service, b"aws4_request")
}

fn hmac_raw(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac(key: &[u8], data: &[u8]) -> String {
    hex_encode(&hmac_raw(key, data))
}

fn hex_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_deterministically_for_fixed_inputs() {
        let a = sign(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
            "us-east-1",
            "ses",
            "email.us-east-1.amazonaws.com",
            "/",
            "Action=SendEmail&Source=a%40example.com",
            "20260101T120000Z",
        );
        let b = sign(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
            "us-east-1",
            "ses",
            "email.us-east-1.amazonaws.com",
            "/",
            "Action=SendEmail&Source=a%40example.com",
            "20260101T120000Z",
        );
        assert_eq!(a, b);
        assert!(a.authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20260101/us-east-1/ses/aws4_request"));
        assert_eq!(a.x_amz_date, "20260101T120000Z");
    }

    #[test]
    fn different_bodies_sign_differently() {
        let a = sign(
            "AKIDEXAMPLE",
            "secret",
            "us-east-1",
            "ses",
            "email.us-east-1.amazonaws.com",
            "/",
            "Action=SendEmail&Source=a",
            "20260101T120000Z",
        );
        let b = sign(
            "AKIDEXAMPLE",
            "secret",
            "us-east-1",
            "ses",
            "email.us-east-1.amazonaws.com",
            "/",
            "Action=SendEmail&Source=b",
            "20260101T120000Z",
        );
        assert_ne!(a.authorization, b.authorization);
    }
}
