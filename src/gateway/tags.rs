//! Transaction tag lookup through the gateway's GraphQL index

use crate::gateway::client::GatewayClient;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TRANSACTION_TAGS_QUERY: &str = r#"
query GetTransactionTags($id: ID!) {
  transaction(id: $id) {
    tags {
      name
      value
    }
  }
}
"#;

/// Tag name carrying the media type of a transaction
pub const CONTENT_TYPE_TAG: &str = "Content-Type";

/// Tag name -> value; a repeated name keeps its last value
pub type TransactionTags = HashMap<String, String>;

/// Outcome of a tag lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLookup {
    Resolved {
        tags: TransactionTags,
        content_type: Option<String>,
    },
    NotFound,
    Error(String),
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: TransactionVariables<'a>,
}

#[derive(Serialize)]
struct TransactionVariables<'a> {
    id: &'a str,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ResponseData {
    #[serde(default)]
    transaction: Option<TransactionNode>,
}

#[derive(Deserialize)]
struct TransactionNode {
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// Restores `+` in a Content-Type tag value
///
/// The tag transport turns `+` into a space (`application/x.arweave-manifest json`).
/// Applied to the Content-Type tag only.
pub fn normalize_content_type_tag(value: &str) -> String {
    value.replace(' ', "+")
}

/// Builds the tag map, normalizing the Content-Type value
pub fn collect_tags(tags: Vec<Tag>) -> TransactionTags {
    let mut map = TransactionTags::new();
    for tag in tags {
        let value = if tag.name == CONTENT_TYPE_TAG {
            normalize_content_type_tag(&tag.value)
        } else {
            tag.value
        };
        map.insert(tag.name, value);
    }
    map
}

impl GatewayClient {
    /// Looks up the tags of a transaction
    ///
    /// A 404 or an empty transaction result is `NotFound`; any other non-success
    /// status, transport failure or undecodable body is `Error`.
    pub async fn query_transaction_tags(&self, transaction_id: &str) -> TagLookup {
        let url = self.graphql_url();
        let request = GraphQlRequest {
            query: TRANSACTION_TAGS_QUERY,
            variables: TransactionVariables { id: transaction_id },
        };

        let response = match self.http().post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => return TagLookup::Error(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return TagLookup::NotFound;
        }
        if !status.is_success() {
            return TagLookup::Error(format!("HTTP {}", status));
        }

        let body: GraphQlResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return TagLookup::Error(format!("Invalid GraphQL response: {}", e)),
        };

        if let Some(errors) = &body.errors {
            tracing::warn!("GraphQL errors for {}: {}", transaction_id, errors);
        }

        let Some(transaction) = body.data.and_then(|data| data.transaction) else {
            return TagLookup::NotFound;
        };

        let tags = collect_tags(transaction.tags);
        let content_type = tags
            .get(CONTENT_TYPE_TAG)
            .filter(|value| !value.is_empty())
            .cloned();

        TagLookup::Resolved { tags, content_type }
    }
}
