use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("timetable.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates tables and indexes idempotently. Split out of `open_db` so tests
/// can run against an in-memory connection.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_classes(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            class_id INTEGER NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES school_classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_entries(
            id INTEGER PRIMARY KEY,
            school_class_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            teacher_id INTEGER NOT NULL,
            day_of_week INTEGER NOT NULL CHECK(day_of_week BETWEEN 1 AND 7),
            lesson_number INTEGER NOT NULL CHECK(lesson_number BETWEEN 1 AND 8),
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            classroom TEXT,
            academic_year TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            effective_from TEXT,
            effective_to TEXT,
            FOREIGN KEY(school_class_id) REFERENCES school_classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_slot
         ON schedule_entries(academic_year, day_of_week, lesson_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_teacher ON schedule_entries(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_class ON schedule_entries(school_class_id)",
        [],
    )?;

    // Storage-level backstop for slot uniqueness: even if two writers race
    // past the application-level conflict check, the second insert fails on
    // the constraint. Only active rows participate, matching the conflict
    // check's scope.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_schedule_teacher_slot
         ON schedule_entries(teacher_id, day_of_week, lesson_number, academic_year)
         WHERE is_active = 1",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_schedule_class_slot
         ON schedule_entries(school_class_id, day_of_week, lesson_number, academic_year)
         WHERE is_active = 1",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_schedule_room_slot
         ON schedule_entries(classroom, day_of_week, lesson_number, academic_year)
         WHERE is_active = 1 AND classroom IS NOT NULL",
        [],
    )?;

    // class/subject/teacher ids on record rows are copies frozen from the
    // resolved lesson at write time, not live joins.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id INTEGER NOT NULL,
            school_class_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            teacher_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            lesson_number INTEGER NOT NULL,
            status TEXT NOT NULL,
            reason TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, date, lesson_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_date
         ON attendance_records(school_class_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance_records(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_records(
            id TEXT PRIMARY KEY,
            student_id INTEGER NOT NULL,
            school_class_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            teacher_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            lesson_number INTEGER NOT NULL,
            value INTEGER NOT NULL,
            comment TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, subject_id, date, lesson_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_class_date
         ON grade_records(school_class_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grade_records(student_id)",
        [],
    )?;

    Ok(())
}
