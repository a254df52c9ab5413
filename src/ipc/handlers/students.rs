use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.first_name, s.last_name, s.preferred_name, s.date_of_birth,
                s.gender, s.enrollment_status, s.class_id, c.name, s.import_job_id
         FROM students s
         LEFT JOIN classes c ON c.id = s.class_id
         ORDER BY s.last_name COLLATE NOCASE, s.first_name COLLATE NOCASE, s.rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "firstName": row.get::<_, String>(1)?,
                "lastName": row.get::<_, String>(2)?,
                "preferredName": row.get::<_, Option<String>>(3)?,
                "dateOfBirth": row.get::<_, Option<String>>(4)?,
                "gender": row.get::<_, Option<String>>(5)?,
                "enrollmentStatus": row.get::<_, String>(6)?,
                "classId": row.get::<_, Option<String>>(7)?,
                "className": row.get::<_, Option<String>>(8)?,
                "importJobId": row.get::<_, Option<String>>(9)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
