use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, ensure_class_exists, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    conn.execute("INSERT INTO school_classes(name) VALUES(?)", [&name])
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "school_classes" })),
        })?;
    Ok(json!({ "classId": conn.last_insert_rowid(), "name": name }))
}

fn classes_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    // Include the student count so callers get a usable dashboard row.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.active = 1)
             FROM school_classes c
             ORDER BY c.name",
        )
        .map_err(HandlerErr::db)?;
    let classes = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "name": row.get::<_, String>(1)?,
                "studentCount": row.get::<_, i64>(2)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "classes": classes }))
}

fn subjects_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    conn.execute("INSERT INTO subjects(name) VALUES(?)", [&name])
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "subjects" })),
        })?;
    Ok(json!({ "subjectId": conn.last_insert_rowid(), "name": name }))
}

fn subjects_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM subjects ORDER BY name")
        .map_err(HandlerErr::db)?;
    let subjects = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "name": row.get::<_, String>(1)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "subjects": subjects }))
}

fn teachers_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let last_name = required_str(params, "lastName")?;
    let first_name = required_str(params, "firstName")?;
    conn.execute(
        "INSERT INTO teachers(last_name, first_name) VALUES(?, ?)",
        (&last_name, &first_name),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "teachers" })),
    })?;
    Ok(json!({ "teacherId": conn.last_insert_rowid() }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(params, "classId")?;
    let last_name = required_str(params, "lastName")?;
    let first_name = required_str(params, "firstName")?;
    ensure_class_exists(conn, class_id)?;

    let sort_order: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students WHERE class_id = ?",
            [class_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;
    conn.execute(
        "INSERT INTO students(class_id, last_name, first_name, active, sort_order)
         VALUES(?, ?, ?, 1, ?)",
        (class_id, &last_name, &first_name, sort_order),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;
    Ok(json!({ "studentId": conn.last_insert_rowid(), "classId": class_id }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(params, "classId")?;
    ensure_class_exists(conn, class_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, active, sort_order
             FROM students
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(HandlerErr::db)?;
    let students = stmt
        .query_map([class_id], |row| {
            let last: String = row.get(1)?;
            let first: String = row.get(2)?;
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "displayName": format!("{}, {}", last, first),
                "active": row.get::<_, i64>(3)? != 0,
                "sortOrder": row.get::<_, i64>(4)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "students": students }))
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
        "classes.create" => Some(handle(state, req, classes_create)),
        "classes.list" => Some(handle(state, req, |conn, _| classes_list(conn))),
        "subjects.create" => Some(handle(state, req, subjects_create)),
        "subjects.list" => Some(handle(state, req, |conn, _| subjects_list(conn))),
        "teachers.create" => Some(handle(state, req, teachers_create)),
        "students.create" => Some(handle(state, req, students_create)),
        "students.list" => Some(handle(state, req, students_list)),
        _ => None,
    }
}
