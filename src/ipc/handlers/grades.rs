use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_conn, ensure_class_exists, ensure_teacher_exists, opt_i64, required_date, required_i64,
    required_u32, row_exists, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const GRADE_MIN: i64 = 1;
const GRADE_MAX: i64 = 5;

/// Bulk grade entry; same partial-success contract as attendance.bulkSave.
fn grades_bulk_save(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_i64(params, "teacherId")?;
    let lesson_number = required_u32(params, "lessonNumber")?;
    let date = required_date(params, "date")?;
    let class_id = opt_i64(params, "classId")?;
    let Some(items) = params.get("items").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing items[]"));
    };

    ensure_teacher_exists(conn, teacher_id)?;
    if let Some(cid) = class_id {
        ensure_class_exists(conn, cid)?;
    }

    let resolved = schedule::resolve_lesson(conn, teacher_id, class_id, lesson_number, date)?;
    let date_str = resolved.date.format("%Y-%m-%d").to_string();

    let mut created: Vec<serde_json::Value> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            errors.push(format!("item {}: must be an object", i));
            continue;
        };
        let Some(student_id) = obj.get("studentId").and_then(|v| v.as_i64()) else {
            errors.push(format!("item {}: missing studentId", i));
            continue;
        };
        let value = match obj.get("value").and_then(|v| v.as_i64()) {
            Some(v) if (GRADE_MIN..=GRADE_MAX).contains(&v) => v,
            Some(v) => {
                errors.push(format!(
                    "student {}: grade value {} out of range {}..={}",
                    student_id, v, GRADE_MIN, GRADE_MAX
                ));
                continue;
            }
            None => {
                errors.push(format!("student {}: missing value", student_id));
                continue;
            }
        };
        let comment = obj
            .get("comment")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let member = match row_exists(
            conn,
            "SELECT 1 FROM students WHERE id = ? AND class_id = ? AND active = 1",
            (student_id, resolved.school_class_id),
        ) {
            Ok(v) => v,
            Err(e) => {
                errors.push(format!("student {}: {}", student_id, e.message));
                continue;
            }
        };
        if !member {
            errors.push(format!(
                "student {} is not a member of class {}",
                student_id, resolved.school_class_id
            ));
            continue;
        }

        let duplicate = match row_exists(
            conn,
            "SELECT 1 FROM grade_records
             WHERE student_id = ? AND subject_id = ? AND date = ? AND lesson_number = ?",
            (
                student_id,
                resolved.subject_id,
                &date_str,
                lesson_number as i64,
            ),
        ) {
            Ok(v) => v,
            Err(e) => {
                errors.push(format!("student {}: {}", student_id, e.message));
                continue;
            }
        };
        if duplicate {
            errors.push(format!(
                "student {}: grade already recorded for {} lesson {}",
                student_id, date_str, lesson_number
            ));
            continue;
        }

        let record_id = Uuid::new_v4().to_string();
        let inserted = conn.execute(
            "INSERT INTO grade_records(
                id, student_id, school_class_id, subject_id, teacher_id,
                date, lesson_number, value, comment
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                record_id,
                student_id,
                resolved.school_class_id,
                resolved.subject_id,
                resolved.teacher_id,
                date_str,
                lesson_number as i64,
                value,
                comment
            ],
        );
        match inserted {
            Ok(_) => created.push(json!({
                "id": record_id,
                "studentId": student_id,
                "classId": resolved.school_class_id,
                "subjectId": resolved.subject_id,
                "teacherId": resolved.teacher_id,
                "date": date_str,
                "lessonNumber": lesson_number,
                "value": value,
                "comment": comment
            })),
            Err(e) => errors.push(format!("student {}: {}", student_id, e)),
        }
    }

    Ok(json!({
        "created": created,
        "errors": errors,
        "created_count": created.len(),
        "errors_count": errors.len(),
        "class_id": resolved.school_class_id,
        "subject_id": resolved.subject_id
    }))
}

fn handle_bulk_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match grades_bulk_save(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.bulkSave" => Some(handle_bulk_save(state, req)),
        _ => None,
    }
}
