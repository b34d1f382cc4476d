use std::path::PathBuf;

use benchrun::error::{exit_codes, Error, JsonError};
use serde_json::Value;

#[test]
fn exit_code_user_error() {
    let err = Error::InvalidArgument("bad input".to_string());
    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    let err = Error::Precondition("agent program not configured".to_string());
    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
}

#[test]
fn exit_code_conflict() {
    let err = Error::RecordExists("django__django-11099".to_string());
    assert_eq!(err.exit_code(), exit_codes::CONFLICT);
}

#[test]
fn exit_code_operation_failed() {
    let err = Error::OperationFailed("boom".to_string());
    assert_eq!(err.exit_code(), exit_codes::OPERATION_FAILED);
    let err = Error::Io(std::io::Error::other("disk full"));
    assert_eq!(err.exit_code(), exit_codes::OPERATION_FAILED);
}

#[test]
fn details_include_task_id_fields() {
    let err = Error::InvalidTaskId {
        id: "../x".to_string(),
        reason: "must not contain path separators".to_string(),
    };
    let details = err.details().expect("details");
    assert_eq!(details["task_id"], Value::String("../x".to_string()));
    assert_eq!(
        details["reason"],
        Value::String("must not contain path separators".to_string())
    );

    let err = Error::DirectoryNotFound(PathBuf::from("runs"));
    let details = err.details().expect("details");
    assert_eq!(details["path"], Value::String("runs".to_string()));
}

#[test]
fn json_error_includes_details() {
    let err = Error::InvalidConfig("bad config".to_string());
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    let details = json.details.expect("details");
    assert_eq!(details["message"], Value::String("bad config".to_string()));
}
