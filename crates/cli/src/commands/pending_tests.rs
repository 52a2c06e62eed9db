// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use gqlsync_core::{Database, GraphQLRequest};
use serde_json::{json, Value};

fn render(db: &Database, output: OutputFormat) -> String {
    let mut out = Vec::new();
    run_impl(db, output, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn queued(db: &Database, request: GraphQLRequest) -> MutationRecord {
    let record = MutationRecord::new(&request).unwrap();
    db.save(&record).unwrap();
    record
}

#[test]
fn empty_queue_says_so() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(render(&db, OutputFormat::Text), "No pending mutations\n");
}

#[test]
fn text_lists_one_line_per_record() {
    let db = Database::open_in_memory().unwrap();
    let record = queued(&db, GraphQLRequest::new("mutation AddPost {\n  addPost { id }\n}"));

    let text = render(&db, OutputFormat::Text);

    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with(&record.id));
    assert!(text.contains("in_queue"));
    assert!(text.contains("mutation AddPost { addPost { id } }"));
}

#[test]
fn text_marks_uploads() {
    let db = Database::open_in_memory().unwrap();
    queued(
        &db,
        GraphQLRequest::new("mutation { addPhoto }").with_variables(json!({
            "input": {
                "bucket": "photos", "key": "cat.png", "region": "us-west-2",
                "mimeType": "image/png", "localUri": "/tmp/cat.png"
            }
        })),
    );

    assert!(render(&db, OutputFormat::Text).contains("[upload photos/cat.png]"));
}

#[test]
fn json_omits_request_body() {
    let db = Database::open_in_memory().unwrap();
    let record = queued(&db, GraphQLRequest::new("mutation { a }"));

    let parsed: Value = serde_json::from_str(&render(&db, OutputFormat::Json)).unwrap();

    assert_eq!(parsed[0]["id"], record.id.as_str());
    assert_eq!(parsed[0]["state"], "in_queue");
    assert_eq!(parsed[0]["operation"], "mutation { a }");
    assert!(parsed[0].get("data").is_none());
    assert!(parsed[0].get("binary_object").is_none());
}
