//! Control-plane route message grammar.
//!
//! A route message is six `@`-separated fields:
//! `virtualhost@host@port@status@uri@properties` where `status` is `0`/`1`
//! and `properties` is a JSON object. The first path segment of `uri`
//! (the uri base) names the action target.

use serde_json::Value;
use thiserror::Error;

/// Field separator of the wire format.
pub const SEPARATOR: char = '@';

/// Fields a route message must carry.
pub const NUM_FIELDS: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("expected {NUM_FIELDS} fields, got {0}")]
    FieldCount(usize),
}

/// A parsed control-plane route message.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMessage {
    pub virtualhost: String,
    pub host: String,
    pub port: String,
    pub status: bool,
    pub uri: String,
    pub properties: Value,
}

impl RouteMessage {
    /// Parse the wire form. The properties field is the remainder after
    /// the fifth separator, so JSON containing `@` survives. A malformed
    /// properties object degrades to `{}` rather than failing the message.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let fields: Vec<&str> = raw.splitn(NUM_FIELDS, SEPARATOR).collect();
        if fields.len() != NUM_FIELDS {
            return Err(MessageError::FieldCount(fields.len()));
        }
        let properties =
            serde_json::from_str(fields[5]).unwrap_or_else(|_| Value::Object(Default::default()));
        Ok(Self {
            virtualhost: fields[0].to_string(),
            host: fields[1].to_string(),
            port: fields[2].to_string(),
            status: fields[3] != "0",
            uri: fields[4].to_string(),
            properties,
        })
    }

    /// Compose the wire form.
    pub fn build(
        virtualhost: &str,
        host: &str,
        port: &str,
        status: bool,
        uri: &str,
        properties: &Value,
    ) -> String {
        format!(
            "{virtualhost}{sep}{host}{sep}{port}{sep}{status}{sep}{uri}{sep}{properties}",
            sep = SEPARATOR,
            status = if status { "1" } else { "0" },
        )
    }

    /// First path segment of the uri, selecting the action target.
    pub fn uri_base(&self) -> &str {
        self.uri
            .split('/')
            .nth(1)
            .unwrap_or("")
    }

    /// Backend endpoint `host:port`, present only when both parts are.
    pub fn endpoint(&self) -> Option<String> {
        if self.host.is_empty() || self.port.is_empty() {
            None
        } else {
            Some(format!("{}:{}", self.host, self.port))
        }
    }
}
