//! Query filters and administrative commands as sent on the helper command line.
//!
//! The helper reads both from its `--query` flag as a single JSON object, so
//! every value here ends up as a JSON string.

use serde::Serialize;
use serde_json::json;

use crate::error::Result;

/// A query filter handed to the helper.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Already-serialized filter text, passed through verbatim.
    Raw(String),
    /// A structured filter serialized as JSON.
    Json(serde_json::Value),
}

impl Query {
    /// Build a query from any serializable value.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Query::Json(serde_json::to_value(value)?))
    }

    /// The payload text for `--query`. An empty payload means "no filter".
    pub fn payload(&self) -> Result<String> {
        match self {
            Query::Raw(text) => Ok(text.clone()),
            Query::Json(value) => Ok(serde_json::to_string(value)?),
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Raw(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::Raw(text)
    }
}

impl From<serde_json::Value> for Query {
    fn from(value: serde_json::Value) -> Self {
        Query::Json(value)
    }
}

/// An administrative command issued against the `$cmd` pseudo-collection.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    /// A bare command name, sent as `{"<name>": 1}`.
    Name(String),
    /// A full command document.
    Document(serde_json::Value),
}

impl AdminCommand {
    /// Serialize the command into the helper's query payload.
    pub fn payload(&self) -> Result<String> {
        let document = match self {
            AdminCommand::Name(name) => {
                let mut body = serde_json::Map::new();
                body.insert(name.clone(), json!(1));
                serde_json::Value::Object(body)
            }
            AdminCommand::Document(value) => value.clone(),
        };
        Ok(serde_json::to_string(&document)?)
    }
}

impl From<&str> for AdminCommand {
    fn from(name: &str) -> Self {
        AdminCommand::Name(name.to_string())
    }
}

impl From<String> for AdminCommand {
    fn from(name: String) -> Self {
        AdminCommand::Name(name)
    }
}

impl From<serde_json::Value> for AdminCommand {
    fn from(value: serde_json::Value) -> Self {
        AdminCommand::Document(value)
    }
}
