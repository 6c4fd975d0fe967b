//! Signature material: the ordered covered components of one request and the
//! canonical byte string fed to the signing primitive.
//!
//! The base layout is fixed: one `name ": " value "\n"` line per covered
//! component, in append order, followed by the `@signature-params` line with
//! no trailing newline. The `Signature-Input` header repeats the same names
//! in the same order, so verifiers can rebuild the exact bytes.

mod inner_list;
mod list;
mod map;
mod parser;

pub use parser::normalise;

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use rand::Rng;
use sha2::{Digest, Sha512};

use crate::error::{Result, SigningError};
use crate::headers;

const METHOD_COMPONENT: &str = "@method";
const PATH_COMPONENT: &str = "@path";
const QUERY_COMPONENT: &str = "@query";
const SIGNATURE_PARAMS_COMPONENT: &str = "@signature-params";

/// Signature lifetime: `expires - created`, in seconds
const SIGNATURE_TTL_SECS: i64 = 60;

/// Length of the decimal nonce
const NONCE_DIGITS: usize = 10;

/// Header prefixes that never enter the signature base. These are proxy/CDN
/// artefacts that the upstream would not see byte-identically.
const IGNORED_PREFIXES: [&str; 4] = ["cf-", "cdn-", "cookie", "x-"];

/// One request's covered components, in order, plus signature parameters.
#[derive(Debug)]
pub struct Material {
    names: Vec<String>,
    data: HashMap<String, String>,
    created: i64,
    expires: i64,
    nonce: String,
}

impl Material {
    fn new() -> Self {
        let created = chrono::Utc::now().timestamp();
        Self::with_parameters(created, numeric_nonce(NONCE_DIGITS))
    }

    fn with_parameters(created: i64, nonce: String) -> Self {
        Self {
            names: Vec::new(),
            data: HashMap::new(),
            created,
            expires: created + SIGNATURE_TTL_SECS,
            nonce,
        }
    }

    /// Build the material for an outgoing request.
    ///
    /// `headers` must already be the outbound header set (filtered, with
    /// `Accept` injected); this function adds the `Content-Digest` header
    /// when a body is present, because the digest is both a header on the
    /// wire and a covered component.
    pub fn from_request(
        method: &Method,
        path: &str,
        raw_query: Option<&str>,
        headers: &mut HeaderMap,
        body: &[u8],
    ) -> Result<Self> {
        let mut material = Self::new();
        material.append_components(method, path, raw_query, headers, body)
    }

    fn append_components(
        mut self,
        method: &Method,
        path: &str,
        raw_query: Option<&str>,
        headers: &mut HeaderMap,
        body: &[u8],
    ) -> Result<Self> {
        self.append_headers(headers)?;

        self.append(METHOD_COMPONENT, method.as_str());
        if !path.is_empty() {
            self.append(PATH_COMPONENT, path);
        }
        if !body.is_empty() {
            let digest = content_digest(body);
            headers.insert(
                HeaderName::from_static(headers::CONTENT_DIGEST),
                HeaderValue::from_str(&digest)?,
            );
            self.append(headers::CONTENT_DIGEST, &digest);
        }
        if let Some(query) = raw_query {
            if !query.is_empty() {
                self.append(QUERY_COMPONENT, &format!("?{query}"));
            }
        }
        Ok(self)
    }

    fn append_headers(&mut self, headers: &HeaderMap) -> Result<()> {
        for name in headers.keys() {
            if excluded_from_base(name.as_str()) {
                continue;
            }
            let mut values = Vec::new();
            for value in headers.get_all(name) {
                let text = value
                    .to_str()
                    .map_err(|_| SigningError::WrongValueSymbol(name.as_str().to_string()))?;
                values.push(text.to_string());
            }
            for (component, value) in normalise(name.as_str(), &values)? {
                self.append(&component, &value);
            }
        }
        Ok(())
    }

    fn append(&mut self, name: &str, value: &str) {
        self.data.insert(name.to_string(), value.to_string());
        self.names.push(name.to_string());
    }

    /// Serialize the signature base and the signature-params string.
    ///
    /// The params string goes verbatim into `Signature-Input` (after the
    /// `sig1=` label) and, prefixed with the `@signature-params` name, forms
    /// the final line of the base.
    pub fn signature_base(&self, key_id: &str) -> (Vec<u8>, String) {
        let quoted: Vec<String> = self.names.iter().map(|n| format!("\"{n}\"")).collect();
        let params = format!(
            "({});keyid=\"{}\";created={};nonce=\"{}\";expires={}",
            quoted.join(" "),
            key_id,
            self.created,
            self.nonce,
            self.expires
        );

        let mut base = Vec::new();
        for name in &self.names {
            base.extend_from_slice(format_component(name, &self.data[name]).as_bytes());
            base.push(b'\n');
        }
        base.extend_from_slice(format_component(SIGNATURE_PARAMS_COMPONENT, &params).as_bytes());
        (base, params)
    }

    /// Covered component names, in base order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

fn format_component(name: &str, value: &str) -> String {
    format!("{name}: {value}")
}

/// `sha-512=:<base64(SHA-512(body))>:`
pub fn content_digest(body: &[u8]) -> String {
    let digest = Sha512::digest(body);
    format!("sha-512=:{}:", BASE64.encode(digest))
}

/// True for headers that never become covered components
fn excluded_from_base(name: &str) -> bool {
    if name == headers::SIGNATURE || name == headers::SIGNATURE_INPUT {
        return true;
    }
    IGNORED_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn numeric_nonce(digits: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..digits)
        .map(|_| char::from(rng.gen_range(b'0'..=b'9')))
        .collect()
}
