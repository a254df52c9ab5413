use rusqlite::Connection;
use serde_json::json;

mod test_support;

use test_support::{open_import_workspace, request_ok, spawn_sidecar};

#[test]
fn child_records_attach_to_existing_students() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_import_workspace(&mut stdin, &mut reader, "wattled-related");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "import.parse",
        json!({ "importType": "students", "fileName": "kids.csv", "text": "First Name,Last Name\nOlivia,Nguyen\nNoah,Smith\n" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "s2", "import.validate", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "s3", "import.execute", json!({}));

    let medical = "Student First Name,Student Last Name,Condition Type,Condition,Severity,Requires Medication\n\
                   olivia,NGUYEN,allergic,Peanut allergy,high,yes\n\
                   Noah,Smith,asthma,Asthma,mild,no\n\
                   Zoe,Quinn,asthma,Asthma,mild,no\n";
    let parsed = request_ok(
        &mut stdin,
        &mut reader,
        "m1",
        "import.parse",
        json!({ "importType": "medical_conditions", "fileName": "medical.csv", "text": medical }),
    );
    assert_eq!(parsed["mapping"]["Condition"], "condition_name");
    let validated = request_ok(&mut stdin, &mut reader, "m2", "import.validate", json!({}));
    assert_eq!(validated["summary"]["validRows"], 2);
    assert_eq!(validated["summary"]["errorRows"], 1);
    assert_eq!(validated["rows"][0]["mappedData"]["condition_type"], "allergy");
    assert_eq!(validated["rows"][0]["mappedData"]["severity"], "severe");
    assert_eq!(
        validated.pointer("/rows/0/warnings/0/field").and_then(|v| v.as_str()),
        Some("medication_name")
    );
    assert_eq!(
        validated.pointer("/rows/2/errors/0/message").and_then(|v| v.as_str()),
        Some("no student named Zoe Quinn")
    );
    let executed = request_ok(&mut stdin, &mut reader, "m3", "import.execute", json!({}));
    assert_eq!(executed["job"]["status"], "completed");
    assert_eq!(executed["job"]["importedCount"], 2);
    assert_eq!(executed["job"]["skippedCount"], 1);

    let attendance = "Student First Name,Student Last Name,Date,Status,Check In,Check Out\n\
                      Olivia,Nguyen,06/05/2024,P,8:45 am,15:10\n\
                      Noah,Smith,2024-05-06,late,10:00,09:00\n\
                      Olivia,Nguyen,2024-05-06,absent,,\n";
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "import.parse",
        json!({ "importType": "attendance", "fileName": "attendance.csv", "text": attendance }),
    );
    let validated = request_ok(&mut stdin, &mut reader, "a2", "import.validate", json!({}));
    assert_eq!(validated["rows"][0]["mappedData"]["date"], "2024-05-06");
    assert_eq!(validated["rows"][0]["mappedData"]["check_in_time"], "08:45");
    assert_eq!(validated["rows"][0]["mappedData"]["status"], "present");
    assert_eq!(validated["rows"][1]["isValid"], false);
    assert_eq!(validated["rows"][2]["isDuplicate"], true);
    assert_eq!(
        validated.pointer("/rows/2/warnings/0/message").and_then(|v| v.as_str()),
        Some("duplicate of row 1 in this file")
    );
    assert_eq!(
        validated["summary"],
        json!({ "totalRows": 3, "validRows": 2, "errorRows": 1, "duplicateRows": 1 })
    );

    // Keeping the duplicate hits the one-record-per-day constraint on write.
    let executed = request_ok(
        &mut stdin,
        &mut reader,
        "a3",
        "import.execute",
        json!({ "skipDuplicates": false }),
    );
    let job = &executed["job"];
    assert_eq!(job["status"], "completed_with_errors");
    assert_eq!(job["importedCount"], 1);
    assert_eq!(job["skippedCount"], 1);
    assert_eq!(job["errorCount"], 1);
    assert_eq!(job["errors"][0]["rowNumber"], 3);
    assert_eq!(job["metadata"]["skipDuplicates"], false);
    assert_eq!(job["canRollback"], true);

    let conn = Connection::open(workspace.join("wattle.sqlite3")).expect("open db");
    let tagged: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM attendance_records WHERE import_job_id = ?",
            [job["id"].as_str().expect("job id")],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(tagged, 1);
}

#[test]
fn staff_email_taken_after_validation_fails_that_row_only() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_import_workspace(&mut stdin, &mut reader, "wattled-related-staff");

    let staff = "First Name,Last Name,Work Email,Position\n\
                 Sam,Patel,sam@example.edu.au,Lead Teacher\n\
                 Jo,Lim,jo@example.edu.au,aide\n";
    let parsed = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "import.parse",
        json!({ "importType": "staff", "fileName": "staff.csv", "text": staff }),
    );
    assert_eq!(parsed["mapping"]["Work Email"], "email");
    assert_eq!(parsed["mapping"]["Position"], "role");
    let validated = request_ok(&mut stdin, &mut reader, "2", "import.validate", json!({}));
    assert_eq!(validated["summary"]["validRows"], 2);
    assert_eq!(validated["rows"][0]["mappedData"]["role"], "lead_guide");

    // Someone else adds Jo before the import runs.
    let conn = Connection::open(workspace.join("wattle.sqlite3")).expect("open db");
    conn.execute(
        "INSERT INTO staff(id, first_name, last_name, email, role, created_at)
         VALUES('manual-1', 'Jo', 'Lim', 'JO@example.edu.au', 'assistant', '2024-01-01T00:00:00.000Z')",
        [],
    )
    .expect("insert staff");

    let executed = request_ok(&mut stdin, &mut reader, "3", "import.execute", json!({}));
    let job = &executed["job"];
    assert_eq!(job["status"], "completed_with_errors");
    assert_eq!(job["importedCount"], 1);
    assert_eq!(job["errorCount"], 1);
    assert_eq!(job["errors"][0]["rowNumber"], 2);

    let audited: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM audit_log WHERE action = 'import.execute' AND actor = 'admin-1'",
            [],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(audited, 1);
}

#[test]
fn emergency_contacts_check_priority_and_repeat_imports() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_import_workspace(&mut stdin, &mut reader, "wattled-related-contacts");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "import.parse",
        json!({ "importType": "students", "fileName": "kids.csv", "text": "First Name,Last Name\nOlivia,Nguyen\nNoah,Smith\n" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "s2", "import.validate", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "s3", "import.execute", json!({}));

    let contacts = "Student First Name,Student Last Name,Contact Name,Relationship,Primary Phone,Secondary Phone,Priority\n\
                    Olivia,Nguyen,Grace Tan,aunt,0400 111 222,0400-111-222,1\n\
                    Noah,Smith,Ben Smith,uncle,0400 333 444,,11\n\
                    Noah,Smith,Ava Smith,grandmother,0411 222 333,,2\n";
    let params = json!({ "importType": "emergency_contacts", "fileName": "contacts.csv", "text": contacts });
    let parsed = request_ok(&mut stdin, &mut reader, "c1", "import.parse", params.clone());
    assert_eq!(parsed["mapping"]["Priority"], "priority_order");
    assert_eq!(parsed["mapping"]["Secondary Phone"], "phone_secondary");
    assert_eq!(parsed["missingRequired"], json!([]));

    let validated = request_ok(&mut stdin, &mut reader, "c2", "import.validate", json!({}));
    assert_eq!(
        validated["summary"],
        json!({ "totalRows": 3, "validRows": 2, "errorRows": 1, "duplicateRows": 0 })
    );
    assert_eq!(validated["rows"][0]["mappedData"]["phone_primary"], "0400111222");
    assert_eq!(
        validated.pointer("/rows/0/warnings/0/field").and_then(|v| v.as_str()),
        Some("phone_secondary")
    );
    assert_eq!(
        validated.pointer("/rows/1/errors/0/field").and_then(|v| v.as_str()),
        Some("priority_order")
    );
    assert_eq!(
        validated.pointer("/rows/1/errors/0/message").and_then(|v| v.as_str()),
        Some("Priority must be between 1 and 10")
    );
    assert_eq!(validated["rows"][2]["mappedData"]["priority_order"], 2);

    let executed = request_ok(&mut stdin, &mut reader, "c3", "import.execute", json!({}));
    let job = &executed["job"];
    assert_eq!(job["status"], "completed");
    assert_eq!(job["importedCount"], 2);
    assert_eq!(job["skippedCount"], 1);

    let conn = Connection::open(workspace.join("wattle.sqlite3")).expect("open db");
    let (secondary, priority): (Option<String>, i64) = conn
        .query_row(
            "SELECT phone_secondary, priority_order FROM emergency_contacts
             WHERE name = 'Grace Tan' AND import_job_id = ?",
            [job["id"].as_str().expect("job id")],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("contact row");
    assert_eq!(secondary.as_deref(), Some("0400111222"));
    assert_eq!(priority, 1);

    // The same contacts a second time are already on file.
    let _ = request_ok(&mut stdin, &mut reader, "c4", "import.parse", params);
    let again = request_ok(&mut stdin, &mut reader, "c5", "import.validate", json!({}));
    assert_eq!(again["summary"]["duplicateRows"], 2);
    assert_eq!(again["rows"][0]["isDuplicate"], true);
    assert_eq!(again["rows"][0]["isValid"], true);
    let warnings = again["rows"][0]["warnings"].as_array().expect("warnings");
    assert!(warnings
        .iter()
        .any(|w| w["message"] == "a matching emergency_contacts record already exists"));
    assert_eq!(again["rows"][2]["isDuplicate"], true);
}
