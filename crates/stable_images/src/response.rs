use std::fmt::Display;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{DiffusionError, Result};

/// The seed a generation ran with. The API sends it as either a number or a
/// string, so it is kept in its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Seed(String);

impl Seed {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Seed {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawSeed {
            Number(serde_json::Number),
            Text(String),
        }

        Ok(match RawSeed::deserialize(deserializer)? {
            RawSeed::Number(n) => Self(n.to_string()),
            RawSeed::Text(s) => Self(s),
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Meta {
    pub seed: Seed,
}

/// A finished generation
#[derive(Deserialize, Debug, Clone)]
pub struct Completed {
    #[serde(default)]
    pub output: Vec<String>,
    pub meta: Meta,
}

/// A generation still running on the provider side
#[derive(Deserialize, Debug, Clone)]
pub struct Pending {
    /// Suggested number of seconds until the image is ready
    pub eta: Option<f64>,
    /// Where the finished image can be retrieved from
    pub fetch_result: Option<String>,
    pub meta: Option<Meta>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Failed {
    #[serde(default)]
    pub message: Option<Value>,
}

/// A response from the generation endpoint, keyed by its `status` field
#[derive(Debug, Clone)]
pub enum GenerationResponse {
    Success(Completed),
    Processing(Pending),
    Error(Failed),
    Unrecognized(String),
}

impl GenerationResponse {
    /// Parse and validate a raw response body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| DiffusionError::MalformedResponse("missing status field".into()))?
            .to_owned();

        let shape = |e: serde_json::Error| {
            DiffusionError::MalformedResponse(format!("{status} response: {e}"))
        };

        match status.as_str() {
            "success" => Ok(Self::Success(
                serde_json::from_value(value).map_err(shape)?,
            )),
            "processing" => Ok(Self::Processing(
                serde_json::from_value(value).map_err(shape)?,
            )),
            "error" => Ok(Self::Error(serde_json::from_value(value).map_err(shape)?)),
            _ => Ok(Self::Unrecognized(status.clone())),
        }
    }

    pub fn status(&self) -> &str {
        match self {
            Self::Success(_) => "success",
            Self::Processing(_) => "processing",
            Self::Error(_) => "error",
            Self::Unrecognized(status) => status,
        }
    }
}

impl Failed {
    /// The provider message as readable text
    pub fn describe(&self) -> String {
        match &self.message {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "no message".into(),
        }
    }
}
