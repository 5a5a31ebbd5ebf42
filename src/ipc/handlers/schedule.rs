use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_conn, ensure_class_exists, ensure_subject_exists, ensure_teacher_exists, opt_i64, opt_str,
    required_date, required_i64, required_str, required_u32, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, CandidateEntry, ScheduleEntry, ScheduleError};
use rusqlite::{params_from_iter, types::Value, Connection};
use serde_json::json;

fn parse_candidate(params: &serde_json::Value) -> Result<CandidateEntry, HandlerErr> {
    let entry = params
        .get("entry")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing entry"))?;
    Ok(CandidateEntry {
        school_class_id: Some(required_i64(entry, "classId")?),
        subject_id: Some(required_i64(entry, "subjectId")?),
        teacher_id: Some(required_i64(entry, "teacherId")?),
        day_of_week: required_u32(entry, "dayOfWeek")?,
        lesson_number: required_u32(entry, "lessonNumber")?,
        start_time: required_str(entry, "startTime")?,
        end_time: required_str(entry, "endTime")?,
        classroom: opt_str(entry, "classroom")?,
        academic_year: required_str(entry, "academicYear")?,
        effective_from: opt_str(entry, "effectiveFrom")?,
        effective_to: opt_str(entry, "effectiveTo")?,
    })
}

fn ensure_references_exist(conn: &Connection, cand: &CandidateEntry) -> Result<(), HandlerErr> {
    if let Some(cid) = cand.school_class_id {
        ensure_class_exists(conn, cid)?;
    }
    if let Some(sid) = cand.subject_id {
        ensure_subject_exists(conn, sid)?;
    }
    if let Some(tid) = cand.teacher_id {
        ensure_teacher_exists(conn, tid)?;
    }
    Ok(())
}

fn entry_json(e: &ScheduleEntry) -> serde_json::Value {
    json!({
        "id": e.id,
        "classId": e.school_class_id,
        "subjectId": e.subject_id,
        "teacherId": e.teacher_id,
        "dayOfWeek": e.day_of_week,
        "lessonNumber": e.lesson_number,
        "startTime": e.start_time,
        "endTime": e.end_time,
        "classroom": e.classroom,
        "academicYear": e.academic_year,
        "isActive": e.is_active,
        "effectiveFrom": e.effective_from,
        "effectiveTo": e.effective_to
    })
}

fn schedule_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let cand = parse_candidate(params)?;
    schedule::validate_candidate(&cand)?;
    ensure_references_exist(conn, &cand)?;

    // Check and insert inside one transaction; the partial unique indexes
    // catch whatever races past the check.
    let tx = conn.unchecked_transaction().map_err(HandlerErr::db)?;
    let reasons = schedule::check_conflicts(&tx, &cand, None)?;
    if !reasons.is_empty() {
        return Err(ScheduleError::Conflict(reasons).into());
    }
    tx.execute(
        "INSERT INTO schedule_entries(
            school_class_id, subject_id, teacher_id, day_of_week, lesson_number,
            start_time, end_time, classroom, academic_year, is_active,
            effective_from, effective_to
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        rusqlite::params![
            cand.school_class_id,
            cand.subject_id,
            cand.teacher_id,
            cand.day_of_week as i64,
            cand.lesson_number as i64,
            cand.start_time,
            cand.end_time,
            cand.classroom,
            cand.academic_year,
            cand.effective_from,
            cand.effective_to
        ],
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "schedule_entries" })),
    })?;
    let entry_id = tx.last_insert_rowid();
    tx.commit().map_err(HandlerErr::db)?;
    Ok(json!({ "entryId": entry_id }))
}

fn schedule_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let entry_id = required_i64(params, "entryId")?;
    let cand = parse_candidate(params)?;
    schedule::validate_candidate(&cand)?;
    ensure_references_exist(conn, &cand)?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db)?;
    let exists: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM schedule_entries WHERE id = ?",
            [entry_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;
    if exists == 0 {
        return Err(HandlerErr::not_found(format!(
            "schedule entry {} not found",
            entry_id
        )));
    }
    let reasons = schedule::check_conflicts(&tx, &cand, Some(entry_id))?;
    if !reasons.is_empty() {
        return Err(ScheduleError::Conflict(reasons).into());
    }
    tx.execute(
        "UPDATE schedule_entries SET
            school_class_id = ?, subject_id = ?, teacher_id = ?, day_of_week = ?,
            lesson_number = ?, start_time = ?, end_time = ?, classroom = ?,
            academic_year = ?, effective_from = ?, effective_to = ?
         WHERE id = ?",
        rusqlite::params![
            cand.school_class_id,
            cand.subject_id,
            cand.teacher_id,
            cand.day_of_week as i64,
            cand.lesson_number as i64,
            cand.start_time,
            cand.end_time,
            cand.classroom,
            cand.academic_year,
            cand.effective_from,
            cand.effective_to,
            entry_id
        ],
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "schedule_entries" })),
    })?;
    tx.commit().map_err(HandlerErr::db)?;
    Ok(json!({ "entryId": entry_id }))
}

fn schedule_deactivate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let entry_id = required_i64(params, "entryId")?;
    let changed = conn
        .execute(
            "UPDATE schedule_entries SET is_active = 0 WHERE id = ?",
            [entry_id],
        )
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found(format!(
            "schedule entry {} not found",
            entry_id
        )));
    }
    Ok(json!({ "ok": true }))
}

fn schedule_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let academic_year = required_str(params, "academicYear")?;
    let teacher_id = opt_i64(params, "teacherId")?;
    let class_id = opt_i64(params, "classId")?;
    let day_of_week = opt_i64(params, "dayOfWeek")?;

    let mut sql = format!(
        "SELECT {} FROM schedule_entries WHERE academic_year = ?",
        schedule::ENTRY_COLUMNS
    );
    let mut values: Vec<Value> = vec![Value::Text(academic_year)];
    if let Some(tid) = teacher_id {
        sql.push_str(" AND teacher_id = ?");
        values.push(Value::Integer(tid));
    }
    if let Some(cid) = class_id {
        sql.push_str(" AND school_class_id = ?");
        values.push(Value::Integer(cid));
    }
    if let Some(dow) = day_of_week {
        sql.push_str(" AND day_of_week = ?");
        values.push(Value::Integer(dow));
    }
    sql.push_str(" ORDER BY day_of_week, lesson_number, id");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db)?;
    let entries = stmt
        .query_map(params_from_iter(values), schedule::entry_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    let entries: Vec<serde_json::Value> = entries.iter().map(entry_json).collect();
    Ok(json!({ "entries": entries }))
}

fn schedule_resolve_lesson(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_i64(params, "teacherId")?;
    let lesson_number = required_u32(params, "lessonNumber")?;
    let date = required_date(params, "date")?;
    let class_id = opt_i64(params, "classId")?;
    ensure_teacher_exists(conn, teacher_id)?;
    if let Some(cid) = class_id {
        ensure_class_exists(conn, cid)?;
    }

    let resolved = schedule::resolve_lesson(conn, teacher_id, class_id, lesson_number, date)?;
    Ok(json!({
        "scheduleEntryId": resolved.schedule_entry_id,
        "classId": resolved.school_class_id,
        "subjectId": resolved.subject_id,
        "teacherId": resolved.teacher_id,
        "date": resolved.date.format("%Y-%m-%d").to_string(),
        "dayOfWeek": resolved.day_of_week,
        "lessonNumber": resolved.lesson_number
    }))
}

fn handle(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.create" => Some(handle(state, req, schedule_create)),
        "schedule.update" => Some(handle(state, req, schedule_update)),
        "schedule.deactivate" => Some(handle(state, req, schedule_deactivate)),
        "schedule.list" => Some(handle(state, req, schedule_list)),
        "schedule.resolveLesson" => Some(handle(state, req, schedule_resolve_lesson)),
        _ => None,
    }
}
