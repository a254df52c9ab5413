use serde_json::json;

mod test_support;

use test_support::{open_import_workspace, request_ok, spawn_sidecar};

const ROSTER: &str = "First Name,Last Name,DOB\n\
                      Olivia,Nguyen,2019-03-14\n\
                      Noah,Smith,14/07/2018\n\
                      Ava,Brown,2020-01-02\n";

#[test]
fn students_csv_imports_end_to_end() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _workspace = open_import_workspace(&mut stdin, &mut reader, "wattled-students-happy");

    let parsed = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "import.parse",
        json!({ "importType": "students", "fileName": "roster.csv", "text": ROSTER }),
    );
    assert_eq!(parsed["headers"], json!(["First Name", "Last Name", "DOB"]));
    assert_eq!(parsed["rowCount"], 3);
    assert_eq!(parsed["delimiter"], "comma");
    assert_eq!(parsed["preview"].as_array().map(|a| a.len()), Some(3));
    assert_eq!(parsed["preview"][1]["Last Name"], "Smith");
    assert_eq!(
        parsed["mapping"],
        json!({
            "DOB": "date_of_birth",
            "First Name": "first_name",
            "Last Name": "last_name"
        })
    );
    assert_eq!(parsed["missingRequired"], json!([]));
    assert_eq!(parsed["previousJobs"], json!([]));
    let suggestions = parsed["suggestions"].as_array().expect("suggestions");
    assert_eq!(suggestions.len(), 3);
    for s in suggestions {
        assert_eq!(s["confidence"].as_f64(), Some(1.0), "{}", s);
        assert_eq!(s["autoApplied"], true);
    }

    let validated = request_ok(&mut stdin, &mut reader, "2", "import.validate", json!({}));
    assert_eq!(
        validated["summary"],
        json!({ "totalRows": 3, "validRows": 3, "errorRows": 0, "duplicateRows": 0 })
    );
    assert_eq!(
        validated.pointer("/rows/1/mappedData/date_of_birth").and_then(|v| v.as_str()),
        Some("2018-07-14")
    );

    let executed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "import.execute",
        json!({ "metadata": { "source": "spring intake" } }),
    );
    let job = &executed["job"];
    assert_eq!(job["status"], "completed");
    assert_eq!(job["importType"], "students");
    assert_eq!(job["totalRows"], 3);
    assert_eq!(job["importedCount"], 3);
    assert_eq!(job["skippedCount"], 0);
    assert_eq!(job["errorCount"], 0);
    assert_eq!(job["canRollback"], true);
    assert_eq!(job["createdBy"], "admin-1");
    assert_eq!(job.pointer("/metadata/source").and_then(|v| v.as_str()), Some("spring intake"));
    assert!(job["completedAt"].is_string());
    let job_id = job["id"].as_str().expect("job id").to_string();

    let students = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let students = students["students"].as_array().expect("students");
    assert_eq!(students.len(), 3);
    assert!(students
        .iter()
        .all(|s| s["importJobId"].as_str() == Some(job_id.as_str())));
    assert_eq!(students[0]["lastName"], "Brown");
    assert_eq!(students[0]["enrollmentStatus"], "active");

    let history = request_ok(&mut stdin, &mut reader, "5", "import.jobs.list", json!({}));
    assert_eq!(history["jobs"][0]["id"].as_str(), Some(job_id.as_str()));

    // Same bytes again: the earlier job is reported and every row is now a duplicate.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "import.parse",
        json!({ "importType": "students", "fileName": "roster.csv", "text": ROSTER }),
    );
    assert_eq!(again["previousJobs"][0]["id"].as_str(), Some(job_id.as_str()));
    let revalidated = request_ok(&mut stdin, &mut reader, "7", "import.validate", json!({}));
    assert_eq!(revalidated["summary"]["validRows"], 3);
    assert_eq!(revalidated["summary"]["duplicateRows"], 3);
    assert_eq!(
        revalidated.pointer("/rows/0/warnings/0/message").and_then(|v| v.as_str()),
        Some("a matching students record already exists")
    );

    let skipped = request_ok(&mut stdin, &mut reader, "8", "import.execute", json!({}));
    assert_eq!(skipped["job"]["importedCount"], 0);
    assert_eq!(skipped["job"]["skippedCount"], 3);
    assert_eq!(skipped["job"]["status"], "completed");
}

#[test]
fn class_names_resolve_case_insensitively() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _workspace = open_import_workspace(&mut stdin, &mut reader, "wattled-students-class");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "name": "Banksia Room" }),
    );
    let class_id = created["classId"].as_str().expect("class id").to_string();

    let text = "first_name;surname;classroom;Gender\n\
                Mia;Lee;banksia room;F\n\
                Leo;Park;Waratah Room;boy\n";
    let parsed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "import.parse",
        json!({ "importType": "students", "fileName": "classes.txt", "text": text }),
    );
    assert_eq!(parsed["delimiter"], "semicolon");
    assert_eq!(parsed["mapping"]["classroom"], "class_name");
    assert_eq!(parsed["mapping"]["surname"], "last_name");

    let validated = request_ok(&mut stdin, &mut reader, "3", "import.validate", json!({}));
    assert_eq!(validated["summary"]["validRows"], 1);
    assert_eq!(validated["summary"]["errorRows"], 1);
    assert_eq!(validated["rows"][0]["mappedData"]["gender"], "female");
    assert_eq!(validated["rows"][1]["isValid"], false);
    assert_eq!(
        validated.pointer("/rows/1/errors/0/message").and_then(|v| v.as_str()),
        Some("class 'Waratah Room' does not exist")
    );

    let executed = request_ok(&mut stdin, &mut reader, "4", "import.execute", json!({}));
    assert_eq!(executed["job"]["importedCount"], 1);
    assert_eq!(executed["job"]["skippedCount"], 1);

    let classes = request_ok(&mut stdin, &mut reader, "5", "classes.list", json!({}));
    assert_eq!(classes["classes"][0]["studentCount"], 1);
    let students = request_ok(&mut stdin, &mut reader, "6", "students.list", json!({}));
    assert_eq!(students["students"][0]["classId"].as_str(), Some(class_id.as_str()));
    assert_eq!(students["students"][0]["className"], "Banksia Room");
}
