//! Remote sandbox client.

pub mod http;

pub use http::HttpSandboxClient;
