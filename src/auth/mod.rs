//! Credential sources.
//!
//! A run authenticates with storefront cookies. They come either from a
//! user-supplied cookies file (JSON or Netscape format) or from the cookie
//! stores of the local Firefox profiles.

mod cookies;
mod credentials;
pub mod firefox;

pub use cookies::{
    CookieError, CookieLine, ParseResult, load_credentials_from_file, parse_json_cookies,
    parse_netscape_cookies,
};
pub use credentials::CredentialSet;
pub use firefox::discover_firefox_credentials;
