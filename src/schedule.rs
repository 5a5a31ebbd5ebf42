use chrono::{Datelike, NaiveDate, NaiveTime};
use rusqlite::{params_from_iter, types::Value, Connection};
use thiserror::Error;
use tracing::warn;

pub const LESSON_NUMBER_MIN: u32 = 1;
pub const LESSON_NUMBER_MAX: u32 = 8;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("schedule conflict: {}", .0.join("; "))]
    Conflict(Vec<String>),
    #[error("{0}")]
    DataIntegrity(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

/// One recurring lesson slot as stored. Times and dates stay ISO strings in
/// storage; validation parses them once on the way in.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub id: i64,
    pub school_class_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub day_of_week: u32,
    pub lesson_number: u32,
    pub start_time: String,
    pub end_time: String,
    pub classroom: Option<String>,
    pub academic_year: String,
    pub is_active: bool,
    pub effective_from: Option<String>,
    pub effective_to: Option<String>,
}

/// A prospective entry, before it has an id. Teacher/class/classroom are
/// optional so the conflict check can run on partially filled candidates.
#[derive(Debug, Clone)]
pub struct CandidateEntry {
    pub school_class_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub day_of_week: u32,
    pub lesson_number: u32,
    pub start_time: String,
    pub end_time: String,
    pub classroom: Option<String>,
    pub academic_year: String,
    pub effective_from: Option<String>,
    pub effective_to: Option<String>,
}

/// Output of lesson resolution. Ephemeral; recomputed per request. The class
/// and subject ids here get frozen into attendance/grade rows at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLesson {
    pub schedule_entry_id: i64,
    pub school_class_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub date: NaiveDate,
    pub day_of_week: u32,
    pub lesson_number: u32,
}

#[derive(Debug, Clone)]
pub struct SlotFilter<'a> {
    pub teacher_id: Option<i64>,
    pub school_class_id: Option<i64>,
    pub day_of_week: u32,
    pub lesson_number: u32,
    pub academic_year: &'a str,
    pub active_only: bool,
}

/// ISO day numbering: Monday=1 .. Sunday=7.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

/// School year covering `date`, September through August, formatted the way
/// entries store it ("2024-2025").
pub fn academic_year_for(date: NaiveDate) -> String {
    let start = if date.month() >= 9 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{}", start, start + 1)
}

pub(crate) const ENTRY_COLUMNS: &str = "id, school_class_id, subject_id, teacher_id, day_of_week, \
     lesson_number, start_time, end_time, classroom, academic_year, is_active, \
     effective_from, effective_to";

pub(crate) fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleEntry> {
    Ok(ScheduleEntry {
        id: row.get(0)?,
        school_class_id: row.get(1)?,
        subject_id: row.get(2)?,
        teacher_id: row.get(3)?,
        day_of_week: row.get::<_, i64>(4)? as u32,
        lesson_number: row.get::<_, i64>(5)? as u32,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        classroom: row.get(8)?,
        academic_year: row.get(9)?,
        is_active: row.get::<_, i64>(10)? != 0,
        effective_from: row.get(11)?,
        effective_to: row.get(12)?,
    })
}

/// All entries matching the slot coordinate plus whichever optional filters
/// are set. Broad form (no teacher/class) feeds conflict detection; narrow
/// form feeds listing.
pub fn find_slot(conn: &Connection, filter: &SlotFilter) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    let mut sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM schedule_entries
         WHERE day_of_week = ? AND lesson_number = ? AND academic_year = ?"
    );
    let mut params: Vec<Value> = vec![
        Value::Integer(filter.day_of_week as i64),
        Value::Integer(filter.lesson_number as i64),
        Value::Text(filter.academic_year.to_string()),
    ];
    if let Some(tid) = filter.teacher_id {
        sql.push_str(" AND teacher_id = ?");
        params.push(Value::Integer(tid));
    }
    if let Some(cid) = filter.school_class_id {
        sql.push_str(" AND school_class_id = ?");
        params.push(Value::Integer(cid));
    }
    if filter.active_only {
        sql.push_str(" AND is_active = 1");
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The single active entry for this teacher (and optionally class) whose
/// effective window covers `date`. Scoped to the academic year covering the
/// date, so next year's planning rows never shadow the live schedule.
///
/// Two covering entries for one slot within the year is an administrative
/// data error; the original system silently took the first, we fail loudly
/// instead.
pub fn find_effective_on(
    conn: &Connection,
    teacher_id: i64,
    school_class_id: Option<i64>,
    lesson_number: u32,
    day_of_week: u32,
    date: NaiveDate,
) -> Result<Option<ScheduleEntry>, ScheduleError> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let mut sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM schedule_entries
         WHERE teacher_id = ? AND lesson_number = ? AND day_of_week = ?
           AND academic_year = ? AND is_active = 1
           AND (effective_from IS NULL OR effective_from <= ?)
           AND (effective_to IS NULL OR effective_to >= ?)"
    );
    let mut params: Vec<Value> = vec![
        Value::Integer(teacher_id),
        Value::Integer(lesson_number as i64),
        Value::Integer(day_of_week as i64),
        Value::Text(academic_year_for(date)),
        Value::Text(date_str.clone()),
        Value::Text(date_str),
    ];
    if let Some(cid) = school_class_id {
        sql.push_str(" AND school_class_id = ?");
        params.push(Value::Integer(cid));
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let mut matches = stmt
        .query_map(params_from_iter(params), entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    if matches.len() > 1 {
        let ids: Vec<String> = matches.iter().map(|e| e.id.to_string()).collect();
        warn!(
            teacher_id,
            lesson_number,
            day_of_week,
            entry_ids = %ids.join(","),
            "multiple schedule entries effective for one slot"
        );
        return Err(ScheduleError::DataIntegrity(format!(
            "multiple schedule entries ({}) effective for teacher {} lesson {} on {}",
            ids.join(", "),
            teacher_id,
            lesson_number,
            date
        )));
    }
    Ok(matches.pop())
}

fn parse_time(label: &str, raw: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| ScheduleError::Validation(format!("{} must be HH:MM, got {:?}", label, raw)))
}

pub fn parse_date(label: &str, raw: &str) -> Result<NaiveDate, ScheduleError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ScheduleError::Validation(format!("{} must be YYYY-MM-DD, got {:?}", label, raw)))
}

/// Shape checks only; conflict detection is separate.
pub fn validate_candidate(cand: &CandidateEntry) -> Result<(), ScheduleError> {
    if !(1..=7).contains(&cand.day_of_week) {
        return Err(ScheduleError::Validation(format!(
            "dayOfWeek must be 1..=7 (Monday=1), got {}",
            cand.day_of_week
        )));
    }
    if !(LESSON_NUMBER_MIN..=LESSON_NUMBER_MAX).contains(&cand.lesson_number) {
        return Err(ScheduleError::Validation(format!(
            "lessonNumber must be {}..={}, got {}",
            LESSON_NUMBER_MIN, LESSON_NUMBER_MAX, cand.lesson_number
        )));
    }
    let start = parse_time("startTime", &cand.start_time)?;
    let end = parse_time("endTime", &cand.end_time)?;
    if end <= start {
        return Err(ScheduleError::Validation(format!(
            "endTime {} must be after startTime {}",
            cand.end_time, cand.start_time
        )));
    }
    let from = cand
        .effective_from
        .as_deref()
        .map(|s| parse_date("effectiveFrom", s))
        .transpose()?;
    let to = cand
        .effective_to
        .as_deref()
        .map(|s| parse_date("effectiveTo", s))
        .transpose()?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(ScheduleError::Validation(format!(
                "effectiveFrom {} must not be after effectiveTo {}",
                f, t
            )));
        }
    }
    if cand.academic_year.trim().is_empty() {
        return Err(ScheduleError::Validation(
            "academicYear must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Every reason the candidate collides with an active entry in the same
/// (dayOfWeek, lessonNumber, academicYear) slot, ordered teacher, class,
/// room. Empty means no conflict.
///
/// Effective ranges are deliberately not consulted: two entries with
/// disjoint windows in the same slot still conflict. The unique indexes in
/// db.rs enforce the same coarse rule, so the check and the storage
/// constraint cannot disagree.
pub fn check_conflicts(
    conn: &Connection,
    cand: &CandidateEntry,
    exclude_id: Option<i64>,
) -> Result<Vec<String>, ScheduleError> {
    let existing = find_slot(
        conn,
        &SlotFilter {
            teacher_id: None,
            school_class_id: None,
            day_of_week: cand.day_of_week,
            lesson_number: cand.lesson_number,
            academic_year: &cand.academic_year,
            active_only: true,
        },
    )?;

    let mut reasons = Vec::new();
    let others: Vec<&ScheduleEntry> = existing
        .iter()
        .filter(|e| Some(e.id) != exclude_id)
        .collect();

    if let Some(tid) = cand.teacher_id {
        if let Some(hit) = others.iter().find(|e| e.teacher_id == tid) {
            reasons.push(format!(
                "teacher already booked (entry {}, class {})",
                hit.id, hit.school_class_id
            ));
        }
    }
    if let Some(cid) = cand.school_class_id {
        if let Some(hit) = others.iter().find(|e| e.school_class_id == cid) {
            reasons.push(format!(
                "class already booked (entry {}, teacher {})",
                hit.id, hit.teacher_id
            ));
        }
    }
    if let Some(room) = cand.classroom.as_deref().filter(|r| !r.trim().is_empty()) {
        if let Some(hit) = others
            .iter()
            .find(|e| e.classroom.as_deref() == Some(room))
        {
            reasons.push(format!(
                "room already booked (entry {}, teacher {})",
                hit.id, hit.teacher_id
            ));
        }
    }
    Ok(reasons)
}

/// Maps (teacher, lesson number, date) to the concrete lesson happening
/// then, so attendance/grade entry can auto-derive class and subject. The
/// caller supplies the date; nothing here reads a clock.
pub fn resolve_lesson(
    conn: &Connection,
    teacher_id: i64,
    school_class_id: Option<i64>,
    lesson_number: u32,
    date: NaiveDate,
) -> Result<ResolvedLesson, ScheduleError> {
    if !(LESSON_NUMBER_MIN..=LESSON_NUMBER_MAX).contains(&lesson_number) {
        return Err(ScheduleError::Validation(format!(
            "lessonNumber must be {}..={}, got {}",
            LESSON_NUMBER_MIN, LESSON_NUMBER_MAX, lesson_number
        )));
    }
    let dow = day_of_week(date);
    let entry = find_effective_on(conn, teacher_id, school_class_id, lesson_number, dow, date)?
        .ok_or_else(|| {
            ScheduleError::NotFound(format!(
                "no lesson scheduled for teacher {} at lesson {} on {}",
                teacher_id, lesson_number, date
            ))
        })?;
    Ok(ResolvedLesson {
        schedule_entry_id: entry.id,
        school_class_id: entry.school_class_id,
        subject_id: entry.subject_id,
        teacher_id: entry.teacher_id,
        date,
        day_of_week: dow,
        lesson_number,
    })
}
