use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::assemble::{DocumentStatus, Payload, PayloadKind, PayloadStudent};
use crate::catalog::{CourseRelation, IdName, SessionPlan, YearPlan};
use crate::fee::{Locality, RateKind};
use crate::pool::Student;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("bursar.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_relations(
            id TEXT PRIMARY KEY,
            term_id TEXT NOT NULL,
            term_name TEXT NOT NULL,
            institute_id TEXT NOT NULL,
            institute_name TEXT NOT NULL,
            course_id TEXT NOT NULL,
            course_name TEXT NOT NULL,
            local_amount REAL NOT NULL,
            international_amount REAL NOT NULL,
            UNIQUE(term_id, institute_id, course_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS year_plans(
            id TEXT PRIMARY KEY,
            course_relation_id TEXT NOT NULL,
            label TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE(course_relation_id, label),
            FOREIGN KEY(course_relation_id) REFERENCES course_relations(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_year_plans_relation ON year_plans(course_relation_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_plans(
            id TEXT PRIMARY KEY,
            year_plan_id TEXT NOT NULL,
            name TEXT NOT NULL,
            rate_type TEXT NOT NULL,
            rate REAL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(year_plan_id) REFERENCES year_plans(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_plans_year ON session_plans(year_plan_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            ref_id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            college_roll TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS applications(
            id TEXT PRIMARY KEY,
            student_ref TEXT NOT NULL,
            course_relation_id TEXT NOT NULL,
            choice TEXT,
            UNIQUE(student_ref, course_relation_id),
            FOREIGN KEY(student_ref) REFERENCES students(ref_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_applications_relation ON applications(course_relation_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            recipient TEXT NOT NULL,
            course_relation_id TEXT NOT NULL,
            institute TEXT NOT NULL,
            course TEXT NOT NULL,
            year_label TEXT NOT NULL,
            session_name TEXT NOT NULL,
            semester TEXT,
            no_of_students INTEGER NOT NULL,
            total_amount REAL NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS document_students(
            document_id TEXT NOT NULL,
            student_ref TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            college_roll TEXT,
            course TEXT NOT NULL,
            amount REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(document_id, student_ref),
            FOREIGN KEY(document_id) REFERENCES documents(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_document_students_doc ON document_students(document_id)",
        [],
    )?;

    Ok(conn)
}

/// Replace the persisted catalog with a freshly loaded tree. Full swap in
/// one transaction; there is no incremental merge.
pub fn replace_catalog(conn: &Connection, relations: &[CourseRelation]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM session_plans", [])?;
    tx.execute("DELETE FROM year_plans", [])?;
    tx.execute("DELETE FROM course_relations", [])?;

    for rel in relations {
        tx.execute(
            "INSERT INTO course_relations(
                id, term_id, term_name, institute_id, institute_name,
                course_id, course_name, local_amount, international_amount
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &rel.id,
                &rel.term.id,
                &rel.term.name,
                &rel.institute.id,
                &rel.institute.name,
                &rel.course.id,
                &rel.course.name,
                rel.local_amount,
                rel.international_amount,
            ),
        )
        .context("insert course relation")?;

        for (yi, year) in rel.years.iter().enumerate() {
            let year_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO year_plans(id, course_relation_id, label, sort_order)
                 VALUES(?, ?, ?, ?)",
                (&year_id, &rel.id, &year.label, yi as i64),
            )?;
            for (si, session) in year.sessions.iter().enumerate() {
                tx.execute(
                    "INSERT INTO session_plans(id, year_plan_id, name, rate_type, rate, sort_order)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        &year_id,
                        &session.name,
                        session.rate_kind.as_str(),
                        session.rate,
                        si as i64,
                    ),
                )?;
            }
        }
    }

    tx.commit()?;
    Ok(())
}

/// Rebuild the relation tree from rows, in insertion order, so the catalog
/// snapshot survives a daemon restart.
pub fn load_catalog(conn: &Connection) -> anyhow::Result<Vec<CourseRelation>> {
    let mut stmt = conn.prepare(
        "SELECT id, term_id, term_name, institute_id, institute_name,
                course_id, course_name, local_amount, international_amount
         FROM course_relations ORDER BY rowid",
    )?;
    let mut relations: Vec<CourseRelation> = stmt
        .query_map([], |row| {
            Ok(CourseRelation {
                id: row.get(0)?,
                term: IdName {
                    id: row.get(1)?,
                    name: row.get(2)?,
                },
                institute: IdName {
                    id: row.get(3)?,
                    name: row.get(4)?,
                },
                course: IdName {
                    id: row.get(5)?,
                    name: row.get(6)?,
                },
                local_amount: row.get(7)?,
                international_amount: row.get(8)?,
                years: Vec::new(),
            })
        })?
        .collect::<Result<_, _>>()?;

    for rel in &mut relations {
        let mut year_stmt = conn.prepare(
            "SELECT id, label FROM year_plans
             WHERE course_relation_id = ? ORDER BY sort_order",
        )?;
        let years: Vec<(String, String)> = year_stmt
            .query_map([&rel.id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        for (year_id, label) in years {
            let mut session_stmt = conn.prepare(
                "SELECT name, rate_type, rate FROM session_plans
                 WHERE year_plan_id = ? ORDER BY sort_order",
            )?;
            let sessions: Vec<SessionPlan> = session_stmt
                .query_map([&year_id], |row| {
                    let rate_type: String = row.get(1)?;
                    Ok(SessionPlan {
                        name: row.get(0)?,
                        rate_kind: RateKind::parse(&rate_type),
                        rate: row.get(2)?,
                    })
                })?
                .collect::<Result<_, _>>()?;
            rel.years.push(YearPlan { label, sessions });
        }
    }

    Ok(relations)
}

#[derive(Debug, Clone)]
pub struct StudentImport {
    pub ref_id: String,
    pub first_name: String,
    pub last_name: String,
    pub college_roll: Option<String>,
    pub applications: Vec<ApplicationImport>,
}

#[derive(Debug, Clone)]
pub struct ApplicationImport {
    pub course_relation_id: String,
    pub choice: Option<String>,
}

pub fn upsert_students(
    conn: &Connection,
    rows: &[StudentImport],
    now: &str,
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    for row in rows {
        tx.execute(
            "INSERT INTO students(ref_id, first_name, last_name, college_roll, updated_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(ref_id) DO UPDATE SET
               first_name = excluded.first_name,
               last_name = excluded.last_name,
               college_roll = excluded.college_roll,
               updated_at = excluded.updated_at",
            (
                &row.ref_id,
                &row.first_name,
                &row.last_name,
                &row.college_roll,
                now,
            ),
        )
        .context("upsert student")?;

        for app in &row.applications {
            tx.execute(
                "INSERT INTO applications(id, student_ref, course_relation_id, choice)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(student_ref, course_relation_id) DO UPDATE SET
                   choice = excluded.choice",
                (
                    Uuid::new_v4().to_string(),
                    &row.ref_id,
                    &app.course_relation_id,
                    &app.choice,
                ),
            )
            .context("upsert application")?;
        }
    }
    tx.commit()?;
    Ok(rows.len())
}

/// Students holding an application for the given relation, locality drawn
/// from that application's choice. This is the candidate pool for a draft.
pub fn candidates_for_relation(
    conn: &Connection,
    relation_id: &str,
) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT s.ref_id, s.first_name, s.last_name, s.college_roll, a.choice
         FROM students s
         JOIN applications a ON a.student_ref = s.ref_id
         WHERE a.course_relation_id = ?
         ORDER BY s.last_name, s.first_name",
    )?;
    let students = stmt
        .query_map([relation_id], |row| {
            let choice: Option<String> = row.get(4)?;
            Ok(Student {
                ref_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                college_roll: row.get(3)?,
                locality: choice.as_deref().and_then(Locality::parse),
            })
        })?
        .collect::<Result<_, _>>()?;
    Ok(students)
}

#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub payload: Payload,
    pub created_at: String,
    pub updated_at: Option<String>,
}

pub fn insert_document(
    conn: &Connection,
    id: &str,
    payload: &Payload,
    now: &str,
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO documents(
            id, kind, status, recipient, course_relation_id, institute, course,
            year_label, session_name, semester, no_of_students, total_amount,
            created_by, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            id,
            payload.kind.as_str(),
            payload.status.as_str(),
            &payload.recipient,
            &payload.course_relation_id,
            &payload.institute,
            &payload.course,
            &payload.year_label,
            &payload.session_name,
            &payload.semester,
            payload.no_of_students as i64,
            payload.total_amount,
            &payload.created_by,
            now,
        ),
    )
    .context("insert document")?;
    insert_document_students(&tx, id, payload)?;
    tx.commit()?;
    Ok(())
}

/// Rewrite a persisted document in place (remit edit flow). Student rows are
/// replaced wholesale so the stored set always mirrors the submitted payload.
pub fn update_document(
    conn: &Connection,
    id: &str,
    payload: &Payload,
    now: &str,
) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(
        "UPDATE documents SET
            status = ?, recipient = ?, year_label = ?, session_name = ?,
            semester = ?, no_of_students = ?, total_amount = ?, updated_at = ?
         WHERE id = ?",
        (
            payload.status.as_str(),
            &payload.recipient,
            &payload.year_label,
            &payload.session_name,
            &payload.semester,
            payload.no_of_students as i64,
            payload.total_amount,
            now,
            id,
        ),
    )?;
    if changed == 0 {
        tx.rollback()?;
        return Ok(false);
    }
    tx.execute("DELETE FROM document_students WHERE document_id = ?", [id])?;
    insert_document_students(&tx, id, payload)?;
    tx.commit()?;
    Ok(true)
}

fn insert_document_students(
    tx: &rusqlite::Transaction<'_>,
    id: &str,
    payload: &Payload,
) -> anyhow::Result<()> {
    for (i, s) in payload.students.iter().enumerate() {
        tx.execute(
            "INSERT INTO document_students(
                document_id, student_ref, first_name, last_name,
                college_roll, course, amount, sort_order
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id,
                &s.ref_id,
                &s.first_name,
                &s.last_name,
                &s.college_roll,
                &s.course,
                s.amount,
                i as i64,
            ),
        )
        .context("insert document student")?;
    }
    Ok(())
}

pub fn load_document(conn: &Connection, id: &str) -> anyhow::Result<Option<DocumentRow>> {
    let header = conn
        .query_row(
            "SELECT kind, status, recipient, course_relation_id, institute, course,
                    year_label, session_name, semester, no_of_students, total_amount,
                    created_by, created_at, updated_at
             FROM documents WHERE id = ?",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, i64>(9)?,
                    row.get::<_, f64>(10)?,
                    row.get::<_, Option<String>>(11)?,
                    row.get::<_, String>(12)?,
                    row.get::<_, Option<String>>(13)?,
                ))
            },
        )
        .optional()?;

    let Some((
        kind,
        status,
        recipient,
        course_relation_id,
        institute,
        course,
        year_label,
        session_name,
        semester,
        no_of_students,
        total_amount,
        created_by,
        created_at,
        updated_at,
    )) = header
    else {
        return Ok(None);
    };

    let kind = PayloadKind::parse(&kind)
        .with_context(|| format!("document {} has unknown kind {}", id, kind))?;
    let status = DocumentStatus::parse(kind, &status)
        .with_context(|| format!("document {} has unknown status {}", id, status))?;

    let mut stmt = conn.prepare(
        "SELECT student_ref, first_name, last_name, college_roll, course, amount
         FROM document_students WHERE document_id = ? ORDER BY sort_order",
    )?;
    let students: Vec<PayloadStudent> = stmt
        .query_map([id], |row| {
            Ok(PayloadStudent {
                ref_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                college_roll: row.get(3)?,
                course: row.get(4)?,
                amount: row.get(5)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    Ok(Some(DocumentRow {
        id: id.to_string(),
        payload: Payload {
            kind,
            status,
            recipient,
            course_relation_id,
            institute,
            course,
            year_label,
            session_name,
            semester,
            no_of_students: no_of_students as usize,
            total_amount,
            students,
            created_by,
        },
        created_at,
        updated_at,
    }))
}

/// Document headers, newest first, for list views.
pub fn list_documents(conn: &Connection) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, status, recipient, course, year_label, session_name,
                no_of_students, total_amount, created_at
         FROM documents ORDER BY created_at DESC, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "documentId": row.get::<_, String>(0)?,
                "kind": row.get::<_, String>(1)?,
                "status": row.get::<_, String>(2)?,
                "recipient": row.get::<_, String>(3)?,
                "course": row.get::<_, String>(4)?,
                "yearLabel": row.get::<_, String>(5)?,
                "sessionName": row.get::<_, String>(6)?,
                "noOfStudents": row.get::<_, i64>(7)?,
                "totalAmount": row.get::<_, f64>(8)?,
                "createdAt": row.get::<_, String>(9)?,
            }))
        })?
        .collect::<Result<_, _>>()?;
    Ok(rows)
}
