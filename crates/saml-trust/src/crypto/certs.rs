//! PEM normalization for certificates and private keys.
//!
//! Certificate and key material reaches the toolkit in every imaginable
//! shape: single-line base64 pasted into config files, PEM with CRLF line
//! endings, payloads with stray spaces. These helpers normalize all of them
//! to canonical 64-column PEM (or to the bare payload).

use crate::constants::{
    BEGIN_CERTIFICATE, BEGIN_PRIVATE_KEY, BEGIN_RSA_PRIVATE_KEY, END_CERTIFICATE,
    END_PRIVATE_KEY, END_RSA_PRIVATE_KEY,
};

/// Normalizes an X.509 certificate, re-adding the header and footer when
/// `heads` is set. Empty input yields an empty string; this never fails.
pub fn format_cert(cert: &str, heads: bool) -> String {
    let mut x509 = cert.replace(['\r', '\n'], "");
    if x509.is_empty() {
        return x509;
    }
    x509 = x509
        .replace(BEGIN_CERTIFICATE, "")
        .replace(END_CERTIFICATE, "")
        .replace(' ', "");

    if heads {
        format!(
            "{BEGIN_CERTIFICATE}\n{}{END_CERTIFICATE}\n",
            chunk_split(&x509, 64)
        )
    } else {
        x509
    }
}

/// Normalizes a private key, re-adding the header and footer when `heads`
/// is set. Detects PKCS#8 (`PRIVATE KEY`) and PKCS#1 (`RSA PRIVATE KEY`)
/// framing and keeps it; headerless payloads get the PKCS#1 pair. Only the
/// payload strictly between the detected markers is kept, so junk before or
/// after the block is dropped.
pub fn format_private_key(key: &str, heads: bool) -> String {
    let key = key.replace(['\r', '\n'], "");
    if key.is_empty() {
        return key;
    }

    if key.contains(BEGIN_PRIVATE_KEY) {
        let payload = string_between(&key, BEGIN_PRIVATE_KEY, END_PRIVATE_KEY).replace(' ', "");
        wrap(payload, BEGIN_PRIVATE_KEY, END_PRIVATE_KEY, heads)
    } else if key.contains(BEGIN_RSA_PRIVATE_KEY) {
        let payload =
            string_between(&key, BEGIN_RSA_PRIVATE_KEY, END_RSA_PRIVATE_KEY).replace(' ', "");
        wrap(payload, BEGIN_RSA_PRIVATE_KEY, END_RSA_PRIVATE_KEY, heads)
    } else {
        let payload = key.replace(' ', "");
        wrap(payload, BEGIN_RSA_PRIVATE_KEY, END_RSA_PRIVATE_KEY, heads)
    }
}

fn wrap(payload: String, begin: &str, end: &str, heads: bool) -> String {
    if heads {
        format!("{begin}\n{}{end}\n", chunk_split(&payload, 64))
    } else {
        payload
    }
}

/// The substring strictly between `start` and `end`, or an empty string
/// when either mark is missing.
fn string_between(text: &str, start: &str, end: &str) -> String {
    let Some(from) = text.find(start) else {
        return String::new();
    };
    let from = from + start.len();
    match text[from..].find(end) {
        Some(length) => text[from..from + length].to_string(),
        None => String::new(),
    }
}

/// Splits into `width`-character lines, each terminated with a newline.
fn chunk_split(data: &str, width: usize) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / width + 2);
    for (i, c) in data.chars().enumerate() {
        if i > 0 && i % width == 0 {
            out.push('\n');
        }
        out.push(c);
    }
    if !data.is_empty() {
        out.push('\n');
    }
    out
}
