// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Mutation records and the request payloads they carry.
//!
//! A [`MutationRecord`] is the persisted form of a queued write. It keeps the
//! serialized request body so the mutation can be replayed after a restart
//! without the caller's original typed operation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A GraphQL operation and its variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(
        default,
        rename = "operationName",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        GraphQLRequest {
            query: query.into(),
            variables: Map::new(),
            operation_name: None,
        }
    }

    /// Attach variables. Non-object values are ignored.
    pub fn with_variables(mut self, variables: Value) -> Self {
        if let Value::Object(map) = variables {
            self.variables = map;
        }
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Serialize to the JSON request body sent over HTTP.
    pub fn to_body(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_body(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// The binary object referenced by this request's variables, if any.
    pub fn binary_object(&self) -> Option<BinaryObject> {
        binary_object_from_variables(&self.variables)
    }
}

/// Reference to a local file destined for an external object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryObject {
    pub bucket: String,
    pub key: String,
    pub region: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "localUri")]
    pub local_uri: String,
}

impl BinaryObject {
    /// Read a binary object from an input object carrying all five fields.
    pub fn from_input(input: &Map<String, Value>) -> Option<Self> {
        let field = |name: &str| input.get(name).and_then(Value::as_str).map(str::to_string);
        Some(BinaryObject {
            bucket: field("bucket")?,
            key: field("key")?,
            region: field("region")?,
            mime_type: field("mimeType")?,
            local_uri: field("localUri")?,
        })
    }
}

/// Find a binary object in mutation variables.
///
/// Top-level input objects are checked first, then the input objects nested
/// directly inside them. Deeper nesting is not searched. When several objects
/// match, which one is returned is unspecified.
pub fn binary_object_from_variables(variables: &Map<String, Value>) -> Option<BinaryObject> {
    let top_level: Vec<&Map<String, Value>> =
        variables.values().filter_map(Value::as_object).collect();

    if let Some(found) = top_level.iter().copied().find_map(BinaryObject::from_input) {
        return Some(found);
    }

    top_level
        .into_iter()
        .flat_map(|input| input.values().filter_map(Value::as_object))
        .find_map(BinaryObject::from_input)
}

/// Lifecycle of a persisted mutation.
///
/// The queue only ever writes `InQueue` and deletes records once they finish.
/// `Sent` and `Discarded` exist for stores shared with other tools, which may
/// mark records through [`crate::store::MutationStore::update`]; such records
/// are no longer listed as queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    InQueue,
    Sent,
    Discarded,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::InQueue => write!(f, "in_queue"),
            RecordState::Sent => write!(f, "sent"),
            RecordState::Discarded => write!(f, "discarded"),
        }
    }
}

impl FromStr for RecordState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_queue" => Ok(RecordState::InQueue),
            "sent" => Ok(RecordState::Sent),
            "discarded" => Ok(RecordState::Discarded),
            _ => Err(Error::CorruptedData(format!("invalid record state: '{s}'"))),
        }
    }
}

/// A queued mutation as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: String,
    /// Serialized [`GraphQLRequest`] body.
    pub data: Vec<u8>,
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub binary_object: Option<BinaryObject>,
    pub operation: String,
}

impl MutationRecord {
    /// Build a new in-queue record for `request` with a fresh identifier.
    pub fn new(request: &GraphQLRequest) -> Result<Self> {
        Ok(MutationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            data: request.to_body()?,
            state: RecordState::InQueue,
            created_at: Utc::now(),
            binary_object: request.binary_object(),
            operation: request.query.clone(),
        })
    }

    /// Decode the stored request body.
    pub fn request(&self) -> Result<GraphQLRequest> {
        GraphQLRequest::from_body(&self.data)
    }
}

#[cfg(test)]
#[path = "mutation_tests.rs"]
mod tests;
