
use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn resolve_lesson_honors_effective_window_and_class_filter() {
    let workspace = temp_dir("timetabled-resolution");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_a = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "9A" }))
        .get("classId")
        .and_then(|v| v.as_i64())
        .expect("classId");
    let class_b = request_ok(&mut stdin, &mut reader, "3", "classes.create", json!({ "name": "9B" }))
        .get("classId")
        .and_then(|v| v.as_i64())
        .expect("classId");
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "name": "History" }),
    )
    .get("subjectId")
    .and_then(|v| v.as_i64())
    .expect("subjectId");
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        json!({ "lastName": "Morozova", "firstName": "Elena" }),
    )
    .get("teacherId")
    .and_then(|v| v.as_i64())
    .expect("teacherId");

    // Tuesdays, lesson 3, only during the autumn term.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.create",
        json!({
            "entry": {
                "classId": class_a,
                "subjectId": subject,
                "teacherId": teacher,
                "dayOfWeek": 2,
                "lessonNumber": 3,
                "startTime": "10:00",
                "endTime": "10:45",
                "academicYear": "2024-2025",
                "effectiveFrom": "2024-09-01",
                "effectiveTo": "2024-12-31"
            }
        }),
    );
    let entry_id = created.get("entryId").and_then(|v| v.as_i64()).expect("entryId");

    // 2024-10-15 is a Tuesday inside the window.
    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 3, "date": "2024-10-15" }),
    );
    assert_eq!(resolved.get("scheduleEntryId").and_then(|v| v.as_i64()), Some(entry_id));
    assert_eq!(resolved.get("classId").and_then(|v| v.as_i64()), Some(class_a));
    assert_eq!(resolved.get("subjectId").and_then(|v| v.as_i64()), Some(subject));
    assert_eq!(resolved.get("dayOfWeek").and_then(|v| v.as_u64()), Some(2));

    // 2025-01-14 is also a Tuesday, but past effectiveTo.
    let error = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 3, "date": "2025-01-14" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("not_found"));

    // Explicit class filter must match the scheduled class.
    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 3, "date": "2024-10-15", "classId": class_a }),
    );
    assert_eq!(resolved.get("classId").and_then(|v| v.as_i64()), Some(class_a));
    let error = request_err(
        &mut stdin,
        &mut reader,
        "10",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 3, "date": "2024-10-15", "classId": class_b }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("not_found"));

    // Unknown teacher and malformed date short-circuit early.
    let error = request_err(
        &mut stdin,
        &mut reader,
        "11",
        "schedule.resolveLesson",
        json!({ "teacherId": 999, "lessonNumber": 3, "date": "2024-10-15" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("not_found"));
    let error = request_err(
        &mut stdin,
        &mut reader,
        "12",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 3, "date": "15.10.2024" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));
}

#[test]
fn deactivated_entries_stop_resolving() {
    let workspace = temp_dir("timetabled-resolution-deactivate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "7A" }))
        .get("classId")
        .and_then(|v| v.as_i64())
        .expect("classId");
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Biology" }),
    )
    .get("subjectId")
    .and_then(|v| v.as_i64())
    .expect("subjectId");
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({ "lastName": "Volkov", "firstName": "Dmitri" }),
    )
    .get("teacherId")
    .and_then(|v| v.as_i64())
    .expect("teacherId");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.create",
        json!({
            "entry": {
                "classId": class_id,
                "subjectId": subject,
                "teacherId": teacher,
                "dayOfWeek": 1,
                "lessonNumber": 1,
                "startTime": "08:00",
                "endTime": "08:45",
                "academicYear": "2024-2025"
            }
        }),
    );
    let entry_id = created.get("entryId").and_then(|v| v.as_i64()).expect("entryId");

    // 2024-10-14 is a Monday.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 1, "date": "2024-10-14" }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.deactivate",
        json!({ "entryId": entry_id }),
    );
    let error = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 1, "date": "2024-10-14" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("not_found"));

    // The slot is free again for a replacement entry.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "schedule.create",
        json!({
            "entry": {
                "classId": class_id,
                "subjectId": subject,
                "teacherId": teacher,
                "dayOfWeek": 1,
                "lessonNumber": 1,
                "startTime": "08:00",
                "endTime": "08:45",
                "academicYear": "2024-2025"
            }
        }),
    );
}

#[test]
fn next_year_planning_leaves_current_year_resolution_intact() {
    let workspace = temp_dir("timetabled-resolution-planning");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_now = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "6A" }))
        .get("classId")
        .and_then(|v| v.as_i64())
        .expect("classId");
    let class_next = request_ok(&mut stdin, &mut reader, "3", "classes.create", json!({ "name": "7A" }))
        .get("classId")
        .and_then(|v| v.as_i64())
        .expect("classId");
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "name": "Geography" }),
    )
    .get("subjectId")
    .and_then(|v| v.as_i64())
    .expect("subjectId");
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        json!({ "lastName": "Sokolov", "firstName": "Ivan" }),
    )
    .get("teacherId")
    .and_then(|v| v.as_i64())
    .expect("teacherId");

    let entry = |class_id: i64, year: &str| {
        json!({
            "entry": {
                "classId": class_id,
                "subjectId": subject,
                "teacherId": teacher,
                "dayOfWeek": 1,
                "lessonNumber": 1,
                "startTime": "08:00",
                "endTime": "08:45",
                "academicYear": year
            }
        })
    };
    let live = request_ok(&mut stdin, &mut reader, "6", "schedule.create", entry(class_now, "2024-2025"))
        .get("entryId")
        .and_then(|v| v.as_i64())
        .expect("entryId");
    // Drafting the same slot for next year, no effective bounds yet.
    let planned = request_ok(&mut stdin, &mut reader, "7", "schedule.create", entry(class_next, "2025-2026"))
        .get("entryId")
        .and_then(|v| v.as_i64())
        .expect("entryId");

    // Mondays in each school year resolve to their own year's entry.
    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 1, "date": "2024-10-14" }),
    );
    assert_eq!(resolved.get("scheduleEntryId").and_then(|v| v.as_i64()), Some(live));
    assert_eq!(resolved.get("classId").and_then(|v| v.as_i64()), Some(class_now));

    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "schedule.resolveLesson",
        json!({ "teacherId": teacher, "lessonNumber": 1, "date": "2025-10-13" }),
    );
    assert_eq!(resolved.get("scheduleEntryId").and_then(|v| v.as_i64()), Some(planned));
    assert_eq!(resolved.get("classId").and_then(|v| v.as_i64()), Some(class_next));
}
