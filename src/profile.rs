//! Profile record and in-memory profile store
//!
//! A profile is the accumulating answer set of the wizard. Every answer is keyed by a
//! [`FieldName`] whose [`FieldKind`] decides how the value is parsed, validated and
//! (de)serialized. Values are serialized as plain JSON scalars so the same map can be sent
//! to the remote scoring service and written to durable storage.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Date format used for date answers on the wire and on disk
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Allowed answers for the gender question
pub const GENDER_OPTIONS: &[&str] = &["male", "female"];

/// Allowed answers for the education level question
pub const EDUCATION_LEVEL_OPTIONS: &[&str] =
    &["high_school", "diploma", "bachelor", "master", "doctorate"];

/// Every question the wizard can ask
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Name,
    Email,
    Phone,
    City,
    BirthDate,
    Gender,
    Address,
    EducationLevel,
    Institution,
    Semester,
    FacultyId,
    MajorId,
    Gpa,
    LowIncome,
    Orphan,
    HasDisability,
    HasAchievement,
    OrganizationExperience,
}

/// Shape of an answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Free text, must not be blank
    Text,
    /// One of a fixed set of options
    Choice(&'static [&'static str]),
    /// Numeric answer within an inclusive range
    Number { min: f64, max: f64, integer: bool },
    /// Yes/no answer
    Flag,
    /// Calendar date
    Date,
}

impl FieldName {
    pub fn all() -> &'static [FieldName] {
        &[
            FieldName::Name,
            FieldName::Email,
            FieldName::Phone,
            FieldName::City,
            FieldName::BirthDate,
            FieldName::Gender,
            FieldName::Address,
            FieldName::EducationLevel,
            FieldName::Institution,
            FieldName::Semester,
            FieldName::FacultyId,
            FieldName::MajorId,
            FieldName::Gpa,
            FieldName::LowIncome,
            FieldName::Orphan,
            FieldName::HasDisability,
            FieldName::HasAchievement,
            FieldName::OrganizationExperience,
        ]
    }

    /// Wire/storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Name => "name",
            FieldName::Email => "email",
            FieldName::Phone => "phone",
            FieldName::City => "city",
            FieldName::BirthDate => "birth_date",
            FieldName::Gender => "gender",
            FieldName::Address => "address",
            FieldName::EducationLevel => "education_level",
            FieldName::Institution => "institution",
            FieldName::Semester => "semester",
            FieldName::FacultyId => "faculty_id",
            FieldName::MajorId => "major_id",
            FieldName::Gpa => "gpa",
            FieldName::LowIncome => "low_income",
            FieldName::Orphan => "orphan",
            FieldName::HasDisability => "has_disability",
            FieldName::HasAchievement => "has_achievement",
            FieldName::OrganizationExperience => "organization_experience",
        }
    }

    /// Question text shown to the user
    pub fn prompt(&self) -> &'static str {
        match self {
            FieldName::Name => "Full name",
            FieldName::Email => "E-mail address",
            FieldName::Phone => "Phone number",
            FieldName::City => "City of residence",
            FieldName::BirthDate => "Date of birth (YYYY-MM-DD)",
            FieldName::Gender => "Gender",
            FieldName::Address => "Home address",
            FieldName::EducationLevel => "Current education level",
            FieldName::Institution => "School or university",
            FieldName::Semester => "Current semester",
            FieldName::FacultyId => "Faculty",
            FieldName::MajorId => "Major",
            FieldName::Gpa => "GPA (0.00 - 4.00)",
            FieldName::LowIncome => "Is your family income below the regional minimum wage?",
            FieldName::Orphan => "Have you lost one or both parents?",
            FieldName::HasDisability => "Do you have a disability?",
            FieldName::HasAchievement => "Do you hold an academic or non-academic award?",
            FieldName::OrganizationExperience => "Have you been active in a student organization?",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldName::BirthDate => FieldKind::Date,
            FieldName::Gender => FieldKind::Choice(GENDER_OPTIONS),
            FieldName::EducationLevel => FieldKind::Choice(EDUCATION_LEVEL_OPTIONS),
            FieldName::Semester => FieldKind::Number {
                min: 1.0,
                max: 14.0,
                integer: true,
            },
            FieldName::Gpa => FieldKind::Number {
                min: 0.0,
                max: 4.0,
                integer: false,
            },
            FieldName::LowIncome
            | FieldName::Orphan
            | FieldName::HasDisability
            | FieldName::HasAchievement
            | FieldName::OrganizationExperience => FieldKind::Flag,
            _ => FieldKind::Text,
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed answer
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Choice(String),
    Number(f64),
    Flag(bool),
    Date(NaiveDate),
}

impl FieldValue {
    /// Build a value from its JSON form, using the field kind to disambiguate strings
    pub fn from_json(kind: FieldKind, value: &serde_json::Value) -> Option<Self> {
        match kind {
            FieldKind::Text => value.as_str().map(|s| FieldValue::Text(s.to_string())),
            FieldKind::Choice(_) => value.as_str().map(|s| FieldValue::Choice(s.to_string())),
            FieldKind::Number { .. } => value.as_f64().map(FieldValue::Number),
            FieldKind::Flag => value.as_bool().map(FieldValue::Flag),
            FieldKind::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
                .map(FieldValue::Date),
        }
    }

    /// Parse raw user input for a field.
    ///
    /// Only checks that the input has the right shape; range and option checks live in
    /// step validation so that they can be reported per step.
    pub fn parse_input(field: FieldName, raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        match field.kind() {
            FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldKind::Choice(_) => Ok(FieldValue::Choice(raw.to_lowercase())),
            FieldKind::Number { .. } => raw
                .replace(',', ".")
                .parse::<f64>()
                .map(FieldValue::Number)
                .map_err(|_| format!("'{}' is not a number", raw)),
            FieldKind::Flag => match raw.to_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Ok(FieldValue::Flag(true)),
                "n" | "no" | "false" | "0" => Ok(FieldValue::Flag(false)),
                _ => Err(format!("'{}' is not a yes/no answer", raw)),
            },
            FieldKind::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map(FieldValue::Date)
                .map_err(|_| format!("'{}' is not a date in YYYY-MM-DD form", raw)),
        }
    }

    /// Whether the value has the shape the field kind expects
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Text(_), FieldKind::Text)
                | (FieldValue::Choice(_), FieldKind::Choice(_))
                | (FieldValue::Number(_), FieldKind::Number { .. })
                | (FieldValue::Flag(_), FieldKind::Flag)
                | (FieldValue::Date(_), FieldKind::Date)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Flag(true) => f.write_str("yes"),
            FieldValue::Flag(false) => f.write_str("no"),
            FieldValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => serializer.serialize_str(s),
            FieldValue::Number(n) => serializer.serialize_f64(*n),
            FieldValue::Flag(b) => serializer.serialize_bool(*b),
            FieldValue::Date(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
        }
    }
}

/// A set of answers keyed by field
pub type FieldMap = BTreeMap<FieldName, FieldValue>;

/// Deserialize a [`FieldMap`], typing each value by its field kind.
///
/// A value whose JSON shape does not match its field is an error.
pub fn deserialize_field_map<'de, D>(deserializer: D) -> Result<FieldMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<FieldName, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(name, value)| {
            FieldValue::from_json(name.kind(), &value)
                .map(|v| (name, v))
                .ok_or_else(|| D::Error::custom(format!("invalid value for field '{}'", name)))
        })
        .collect()
}

/// The accumulating answer set plus the remote session it belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_field_map")]
    pub fields: FieldMap,
}

impl ProfileRecord {
    pub fn get(&self, field: FieldName) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Values currently held for the given fields; absent fields are left out
    pub fn values_for(&self, fields: &[FieldName]) -> FieldMap {
        fields
            .iter()
            .filter_map(|f| self.fields.get(f).map(|v| (*f, v.clone())))
            .collect()
    }
}

/// In-memory profile state of one wizard run.
///
/// Holds two copies: the working copy the user edits, and the committed copy holding what
/// the remote service last accepted. The committed copy is the one persisted and the only
/// source of the session id.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    working: ProfileRecord,
    committed: ProfileRecord,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a persisted record; both copies start out equal
    pub fn rehydrate(record: ProfileRecord) -> Self {
        Self {
            working: record.clone(),
            committed: record,
        }
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldValue> {
        self.working.get(field)
    }

    /// Set a working value. Does not sync or persist anything.
    pub fn set(&mut self, field: FieldName, value: FieldValue) {
        self.working.fields.insert(field, value);
    }

    /// Merge answers into the working copy, incoming values win on conflict
    pub fn merge(&mut self, partial: FieldMap) {
        self.working.fields.extend(partial);
    }

    pub fn snapshot(&self) -> ProfileRecord {
        self.working.clone()
    }

    pub fn committed(&self) -> &ProfileRecord {
        &self.committed
    }

    pub fn session_id(&self) -> Option<&str> {
        self.committed.session_id.as_deref()
    }

    /// Working values for the given fields
    pub fn values_for(&self, fields: &[FieldName]) -> FieldMap {
        self.working.values_for(fields)
    }

    /// True when a session exists and every given field is answered with exactly the value
    /// the remote service last accepted
    pub fn is_synced(&self, fields: &[FieldName]) -> bool {
        self.committed.session_id.is_some()
            && fields.iter().all(|f| match self.working.get(*f) {
                Some(value) => self.committed.get(*f) == Some(value),
                None => false,
            })
    }

    /// Record a successful submit: the remote session id and the values it accepted.
    ///
    /// Only the committed copy takes the submitted values so that unsynced edits in the
    /// working copy survive a backward recompute.
    pub fn commit(&mut self, session_id: String, submitted: FieldMap) {
        self.working.session_id = Some(session_id.clone());
        self.committed.session_id = Some(session_id);
        self.committed.fields.extend(submitted);
    }

    /// Drop every answer and the session
    pub fn clear(&mut self) {
        self.working = ProfileRecord::default();
        self.committed = ProfileRecord::default();
    }
}
