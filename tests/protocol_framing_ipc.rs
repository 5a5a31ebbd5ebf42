
use serde_json::json;
use test_support::{request_err, request_ok, send_raw, spawn_sidecar, temp_dir};

#[test]
fn unparseable_lines_get_a_well_formed_error_reply() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // A bare string makes serde quote the offending value inside its error
    // message; the reply line must still be valid JSON.
    let reply = send_raw(&mut stdin, &mut reader, "\"boom\"");
    assert_eq!(reply.get("ok").and_then(|v| v.as_bool()), Some(false));
    let error = reply.get("error").expect("error payload");
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_json"));
    assert!(
        error
            .get("message")
            .and_then(|v| v.as_str())
            .is_some_and(|m| m.contains("boom")),
        "{reply}"
    );

    // The stream keeps working afterwards.
    let result = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(result.get("version").and_then(|v| v.as_str()).is_some());
}

#[test]
fn wrong_type_params_are_reported_as_malformed_not_missing() {
    let workspace = temp_dir("timetabled-protocol-params");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.resolveLesson",
        json!({ "teacherId": 1, "lessonNumber": "three", "date": "2024-10-14" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("lessonNumber must be a non-negative integer")
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.resolveLesson",
        json!({ "teacherId": 1, "lessonNumber": -2, "date": "2024-10-14" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("lessonNumber must be a non-negative integer")
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.resolveLesson",
        json!({ "teacherId": 1, "date": "2024-10-14" }),
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("missing lessonNumber")
    );
}
