use std::fmt;

use anyhow::Result;
use serde::Deserialize;

/// A protocol revision tag, e.g. "5.0.0". The proxy never interprets the
/// version string itself; it only hands it to the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Protocol(pub String);

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Protocol {
    fn from(s: &str) -> Self {
        Protocol(s.to_string())
    }
}

/// Structural translation of a packet body between two protocol revisions.
/// The mapping tables live outside this crate; the proxy only requires that
/// fields it does not touch survive translation unchanged.
pub trait Mapper: Send + Sync {
    fn translate(&self, name: &str, from: &Protocol, to: &Protocol, body: &[u8]) -> Result<Vec<u8>>;
}

/// Identity mapping, used when both peers speak the same revision or when no
/// mapping table has been loaded.
pub struct PassthroughMapper;

impl Mapper for PassthroughMapper {
    fn translate(
        &self,
        _name: &str,
        _from: &Protocol,
        _to: &Protocol,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }
}
