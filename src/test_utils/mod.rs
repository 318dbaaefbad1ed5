//! Shared test components: fake HTTP servers and data fixtures.
mod fake_http;
mod fixtures;

pub(crate) use fake_http::*;
pub(crate) use fixtures::*;
