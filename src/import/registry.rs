//! Static field registry: which target fields each import type accepts.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportType {
    Students,
    Guardians,
    EmergencyContacts,
    MedicalConditions,
    Staff,
    Attendance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumOption {
    pub value: &'static str,
    pub aliases: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Date,
    Time,
    Email,
    Phone,
    Boolean,
    Integer { min: i64, max: i64 },
    Enum(&'static [EnumOption]),
    /// Name of an existing class in the workspace.
    ClassRef,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Boolean => "boolean",
            FieldType::Integer { .. } => "integer",
            FieldType::Enum(_) => "enum",
            FieldType::ClassRef => "reference",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub example: &'static str,
    pub field_type: FieldType,
    pub synonyms: &'static [&'static str],
}

const fn field(
    key: &'static str,
    label: &'static str,
    required: bool,
    example: &'static str,
    field_type: FieldType,
    synonyms: &'static [&'static str],
) -> FieldDescriptor {
    FieldDescriptor {
        key,
        label,
        required,
        example,
        field_type,
        synonyms,
    }
}

const fn opt(value: &'static str, aliases: &'static [&'static str]) -> EnumOption {
    EnumOption { value, aliases }
}

const GENDERS: &[EnumOption] = &[
    opt("female", &["f", "girl"]),
    opt("male", &["m", "boy"]),
    opt("non_binary", &["nb", "nonbinary", "non-binary"]),
    opt("prefer_not_to_say", &["undisclosed", "unspecified"]),
];

const ENROLLMENT_STATUSES: &[EnumOption] = &[
    opt("active", &["enrolled", "current"]),
    opt("inquiry", &["enquiry"]),
    opt("applicant", &["applied", "waitlist"]),
    opt("withdrawn", &["left", "inactive"]),
    opt("graduated", &["alumni"]),
];

const GUARDIAN_RELATIONSHIPS: &[EnumOption] = &[
    opt("mother", &["mum", "mom"]),
    opt("father", &["dad"]),
    opt("parent", &[]),
    opt("guardian", &["legal guardian"]),
    opt("grandparent", &["grandmother", "grandfather", "nan", "pop"]),
    opt("step_parent", &["stepmother", "stepfather", "step parent"]),
    opt("other", &[]),
];

const CONDITION_TYPES: &[EnumOption] = &[
    opt("allergy", &["allergic"]),
    opt("anaphylaxis", &["anaphylactic"]),
    opt("asthma", &[]),
    opt("diabetes", &["diabetic"]),
    opt("epilepsy", &["seizures"]),
    opt("other", &[]),
];

const SEVERITIES: &[EnumOption] = &[
    opt("mild", &["low"]),
    opt("moderate", &["medium"]),
    opt("severe", &["high"]),
    opt("life_threatening", &["critical", "life threatening"]),
];

const STAFF_ROLES: &[EnumOption] = &[
    opt("owner", &[]),
    opt("admin", &["administrator", "office"]),
    opt("head_of_school", &["principal", "head"]),
    opt("lead_guide", &["lead teacher", "lead educator"]),
    opt("guide", &["teacher", "educator"]),
    opt("assistant", &["assistant guide", "aide"]),
    opt("staff", &[]),
];

const ATTENDANCE_STATUSES: &[EnumOption] = &[
    opt("present", &["p", "here"]),
    opt("absent", &["a", "away"]),
    opt("late", &["l", "tardy"]),
    opt("excused", &["e", "sick"]),
    opt("half_day", &["half", "h"]),
];

const STUDENT_FIELDS: &[FieldDescriptor] = &[
    field("first_name", "First Name", true, "Olivia", FieldType::Text, &["given name", "firstname", "forename", "first"]),
    field("last_name", "Last Name", true, "Nguyen", FieldType::Text, &["surname", "family name", "lastname", "last"]),
    field("preferred_name", "Preferred Name", false, "Liv", FieldType::Text, &["nickname", "known as"]),
    field("date_of_birth", "Date of Birth", false, "2019-03-14", FieldType::Date, &["dob", "birth date", "birthday", "birthdate"]),
    field("gender", "Gender", false, "female", FieldType::Enum(GENDERS), &["sex"]),
    field("enrollment_status", "Enrollment Status", false, "active", FieldType::Enum(ENROLLMENT_STATUSES), &["status", "enrolment status"]),
    field("class_name", "Class", false, "Banksia Room", FieldType::ClassRef, &["classroom", "room", "class name", "environment"]),
    field("enrollment_date", "Enrollment Date", false, "2024-01-29", FieldType::Date, &["start date", "enrolment date", "enrolled on"]),
    field("notes", "Notes", false, "", FieldType::Text, &["comments"]),
];

const GUARDIAN_FIELDS: &[FieldDescriptor] = &[
    field("student_first_name", "Student First Name", true, "Olivia", FieldType::Text, &["child first name", "child given name"]),
    field("student_last_name", "Student Last Name", true, "Nguyen", FieldType::Text, &["child last name", "child surname"]),
    field("first_name", "Guardian First Name", true, "Mai", FieldType::Text, &["parent first name", "first name"]),
    field("last_name", "Guardian Last Name", true, "Nguyen", FieldType::Text, &["parent last name", "last name", "surname"]),
    field("relationship", "Relationship", true, "mother", FieldType::Enum(GUARDIAN_RELATIONSHIPS), &["relation", "relationship to child"]),
    field("email", "Email", false, "mai.nguyen@example.com", FieldType::Email, &["email address", "e-mail"]),
    field("phone", "Phone", false, "0412 345 678", FieldType::Phone, &["mobile", "phone number", "contact number"]),
    field("is_primary", "Primary Contact", false, "yes", FieldType::Boolean, &["primary", "is primary"]),
    field("pickup_authorized", "Pickup Authorized", false, "yes", FieldType::Boolean, &["can pick up", "pickup", "authorised pickup"]),
];

const EMERGENCY_CONTACT_FIELDS: &[FieldDescriptor] = &[
    field("student_first_name", "Student First Name", true, "Olivia", FieldType::Text, &["child first name"]),
    field("student_last_name", "Student Last Name", true, "Nguyen", FieldType::Text, &["child last name", "child surname"]),
    field("name", "Contact Name", true, "Grace Tan", FieldType::Text, &["name", "emergency contact"]),
    field("relationship", "Relationship", true, "aunt", FieldType::Text, &["relation"]),
    field("phone_primary", "Primary Phone", true, "0400 111 222", FieldType::Phone, &["phone", "mobile", "phone 1"]),
    field("phone_secondary", "Secondary Phone", false, "(02) 9876 5432", FieldType::Phone, &["phone 2", "alternate phone", "work phone"]),
    field("priority_order", "Priority", false, "1", FieldType::Integer { min: 1, max: 10 }, &["order", "priority order"]),
];

const MEDICAL_FIELDS: &[FieldDescriptor] = &[
    field("student_first_name", "Student First Name", true, "Olivia", FieldType::Text, &["child first name"]),
    field("student_last_name", "Student Last Name", true, "Nguyen", FieldType::Text, &["child last name", "child surname"]),
    field("condition_type", "Condition Type", true, "allergy", FieldType::Enum(CONDITION_TYPES), &["type", "category"]),
    field("condition_name", "Condition Name", true, "Peanut allergy", FieldType::Text, &["condition", "diagnosis"]),
    field("severity", "Severity", true, "severe", FieldType::Enum(SEVERITIES), &["risk level"]),
    field("description", "Description", false, "", FieldType::Text, &["details"]),
    field("action_plan", "Action Plan", false, "EpiPen in office", FieldType::Text, &["plan", "management plan"]),
    field("requires_medication", "Requires Medication", false, "yes", FieldType::Boolean, &["medication required"]),
    field("medication_name", "Medication Name", false, "EpiPen Jr", FieldType::Text, &["medication", "medicine"]),
];

const STAFF_FIELDS: &[FieldDescriptor] = &[
    field("first_name", "First Name", true, "Sam", FieldType::Text, &["given name", "firstname"]),
    field("last_name", "Last Name", true, "Patel", FieldType::Text, &["surname", "family name", "lastname"]),
    field("email", "Email", true, "sam.patel@example.edu.au", FieldType::Email, &["email address", "work email"]),
    field("phone", "Phone", false, "0413 555 010", FieldType::Phone, &["mobile", "phone number"]),
    field("role", "Role", true, "guide", FieldType::Enum(STAFF_ROLES), &["position", "job title"]),
    field("start_date", "Start Date", false, "2023-07-10", FieldType::Date, &["commenced", "hire date"]),
];

const ATTENDANCE_FIELDS: &[FieldDescriptor] = &[
    field("student_first_name", "Student First Name", true, "Olivia", FieldType::Text, &["first name", "child first name"]),
    field("student_last_name", "Student Last Name", true, "Nguyen", FieldType::Text, &["last name", "surname"]),
    field("date", "Date", true, "2024-05-06", FieldType::Date, &["attendance date", "day"]),
    field("status", "Status", true, "present", FieldType::Enum(ATTENDANCE_STATUSES), &["attendance", "mark"]),
    field("check_in_time", "Check In Time", false, "08:45", FieldType::Time, &["check in", "arrival", "sign in"]),
    field("check_out_time", "Check Out Time", false, "15:10", FieldType::Time, &["check out", "departure", "sign out"]),
    field("notes", "Notes", false, "", FieldType::Text, &["comments", "reason"]),
];

pub const ALL_IMPORT_TYPES: [ImportType; 6] = [
    ImportType::Students,
    ImportType::Guardians,
    ImportType::EmergencyContacts,
    ImportType::MedicalConditions,
    ImportType::Staff,
    ImportType::Attendance,
];

impl ImportType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "students" => Some(Self::Students),
            "guardians" => Some(Self::Guardians),
            "emergency_contacts" => Some(Self::EmergencyContacts),
            "medical_conditions" => Some(Self::MedicalConditions),
            "staff" => Some(Self::Staff),
            "attendance" => Some(Self::Attendance),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Guardians => "guardians",
            Self::EmergencyContacts => "emergency_contacts",
            Self::MedicalConditions => "medical_conditions",
            Self::Staff => "staff",
            Self::Attendance => "attendance",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Students => "Students",
            Self::Guardians => "Guardians",
            Self::EmergencyContacts => "Emergency Contacts",
            Self::MedicalConditions => "Medical Conditions",
            Self::Staff => "Staff",
            Self::Attendance => "Attendance",
        }
    }

    pub fn fields(self) -> &'static [FieldDescriptor] {
        match self {
            Self::Students => STUDENT_FIELDS,
            Self::Guardians => GUARDIAN_FIELDS,
            Self::EmergencyContacts => EMERGENCY_CONTACT_FIELDS,
            Self::MedicalConditions => MEDICAL_FIELDS,
            Self::Staff => STAFF_FIELDS,
            Self::Attendance => ATTENDANCE_FIELDS,
        }
    }

    pub fn field(self, key: &str) -> Option<&'static FieldDescriptor> {
        self.fields().iter().find(|f| f.key == key)
    }

    /// Table the executor writes to and rollback deletes from.
    pub fn table(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Guardians => "guardians",
            Self::EmergencyContacts => "emergency_contacts",
            Self::MedicalConditions => "medical_conditions",
            Self::Staff => "staff",
            Self::Attendance => "attendance_records",
        }
    }

    /// Rows of this type attach to an existing student named by
    /// `student_first_name` + `student_last_name`.
    pub fn references_student(self) -> bool {
        !matches!(self, Self::Students | Self::Staff)
    }

    /// Fields whose normalized values form the duplicate-detection key.
    pub fn natural_key_fields(self) -> &'static [&'static str] {
        match self {
            Self::Students => &["first_name", "last_name", "date_of_birth"],
            Self::Guardians => &[
                "student_first_name",
                "student_last_name",
                "first_name",
                "last_name",
            ],
            Self::EmergencyContacts => &["student_first_name", "student_last_name", "name"],
            Self::MedicalConditions => &[
                "student_first_name",
                "student_last_name",
                "condition_name",
            ],
            Self::Staff => &["email"],
            Self::Attendance => &["student_first_name", "student_last_name", "date"],
        }
    }
}

/// Resolve free text to an enum option (value or alias), ignoring case,
/// spaces, dashes and underscores.
pub fn match_enum_option(options: &[EnumOption], raw: &str) -> Option<&'static str> {
    let wanted = squash(raw);
    if wanted.is_empty() {
        return None;
    }
    for o in options {
        if squash(o.value) == wanted || o.aliases.iter().any(|a| squash(a) == wanted) {
            return Some(o.value);
        }
    }
    None
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Template CSV: a header row of field labels, then one row of examples.
pub fn template_csv(import_type: ImportType) -> String {
    let fields = import_type.fields();
    let header = fields
        .iter()
        .map(|f| csv_quote(f.label))
        .collect::<Vec<_>>()
        .join(",");
    let example = fields
        .iter()
        .map(|f| csv_quote(f.example))
        .collect::<Vec<_>>()
        .join(",");
    format!("{header}\n{example}\n")
}

pub fn template_file_name(import_type: ImportType) -> String {
    format!("{}_import_template.csv", import_type.as_str())
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
