//! Header names shared between the signing core and the proxy.
//!
//! All names are lowercase, matching the `http` crate's canonical form.

/// Carries the base64 signature: `sig1=:<base64>:`
pub const SIGNATURE: &str = "signature";

/// Carries the ordered covered-component list and signature parameters
pub const SIGNATURE_INPUT: &str = "signature-input";

/// SHA-512 digest of the request body: `sha-512=:<base64>:`
pub const CONTENT_DIGEST: &str = "content-digest";

/// Version marker added to every signed request
pub const SIGNING_VERSION: &str = "upvest-signature-version";

/// Value of [`SIGNING_VERSION`]
pub const SIGNING_VERSION_VALUE: &str = "15";

/// Selects the signing key for a request
pub const CLIENT_ID: &str = "upvest-client-id";

/// Marks a request as exempt from console logging. The signing API client
/// sets this on its own calls so tunnel traffic does not echo back into the
/// console.
pub const NO_LOGGING: &str = "x-http-proxy-no-logging";
