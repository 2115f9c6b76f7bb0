//! Annotation data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::urls::UrlId;

/// Attribute an annotation describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Relevant,
    RecordType,
    Agency,
    MiscMetadata,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Relevant => "relevant",
            AnnotationKind::RecordType => "record_type",
            AnnotationKind::Agency => "agency",
            AnnotationKind::MiscMetadata => "misc_metadata",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevant" => Ok(AnnotationKind::Relevant),
            "record_type" => Ok(AnnotationKind::RecordType),
            "agency" => Ok(AnnotationKind::Agency),
            "misc_metadata" => Ok(AnnotationKind::MiscMetadata),
            other => Err(format!("unknown annotation kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationStatus {
    #[serde(rename = "Pending Validation")]
    PendingValidation,
    #[serde(rename = "Validated")]
    Validated,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::PendingValidation => "Pending Validation",
            ValidationStatus::Validated => "Validated",
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending Validation" => Ok(ValidationStatus::PendingValidation),
            "Validated" => Ok(ValidationStatus::Validated),
            other => Err(format!("unknown validation status: {}", other)),
        }
    }
}

/// Who produced an annotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationSource {
    #[serde(rename = "Machine Learning")]
    MachineLearning,
    #[serde(rename = "Human")]
    Human,
    #[serde(rename = "Manual")]
    Manual,
}

impl ValidationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationSource::MachineLearning => "Machine Learning",
            ValidationSource::Human => "Human",
            ValidationSource::Manual => "Manual",
        }
    }

    /// Uniqueness class: one automated and one human annotation per kind.
    pub fn origin(&self) -> AnnotationOrigin {
        match self {
            ValidationSource::MachineLearning => AnnotationOrigin::Auto,
            ValidationSource::Human | ValidationSource::Manual => AnnotationOrigin::Human,
        }
    }
}

impl FromStr for ValidationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Machine Learning" => Ok(ValidationSource::MachineLearning),
            "Human" => Ok(ValidationSource::Human),
            "Manual" => Ok(ValidationSource::Manual),
            other => Err(format!("unknown validation source: {}", other)),
        }
    }
}

/// Uniqueness class of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnnotationOrigin {
    Auto,
    Human,
}

impl AnnotationOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationOrigin::Auto => "auto",
            AnnotationOrigin::Human => "human",
        }
    }
}

// ============================================================================
// Values
// ============================================================================

macro_rules! record_types {
    ($($variant:ident => $label:literal,)+) => {
        /// Kind of public record a data source publishes.
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        pub enum RecordType {
            $(#[serde(rename = $label)] $variant,)+
        }

        impl RecordType {
            pub const ALL: &'static [RecordType] = &[$(RecordType::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(RecordType::$variant => $label,)+
                }
            }
        }
    };
}

record_types! {
    AccidentReports => "Accident Reports",
    ArrestRecords => "Arrest Records",
    CallsForService => "Calls for Service",
    CarGps => "Car GPS",
    Citations => "Citations",
    DispatchLogs => "Dispatch Logs",
    DispatchRecordings => "Dispatch Recordings",
    FieldContacts => "Field Contacts",
    IncidentReports => "Incident Reports",
    MiscPoliceActivity => "Misc Police Activity",
    OfficerInvolvedShootings => "Officer Involved Shootings",
    Stops => "Stops",
    Surveys => "Surveys",
    UseOfForceReports => "Use of Force Reports",
    VehiclePursuits => "Vehicle Pursuits",
    ComplaintsAndMisconduct => "Complaints & Misconduct",
    DailyActivityLogs => "Daily Activity Logs",
    TrainingAndHiringInfo => "Training & Hiring Info",
    PersonnelRecords => "Personnel Records",
    AnnualAndMonthlyReports => "Annual & Monthly Reports",
    BudgetsAndFinances => "Budgets & Finances",
    ContactInfoAndAgencyMeta => "Contact Info & Agency Meta",
    Geographic => "Geographic",
    ListOfDataSources => "List of Data Sources",
    PoliciesAndContracts => "Policies & Contracts",
    CrimeMapsAndReports => "Crime Maps & Reports",
    CrimeStatistics => "Crime Statistics",
    MediaBulletins => "Media Bulletins",
    RecordsRequestInfo => "Records Request Info",
    Resources => "Resources",
    SexOffenderRegistry => "Sex Offender Registry",
    WantedPersons => "Wanted Persons",
    BookingReports => "Booking Reports",
    CourtCases => "Court Cases",
    IncarcerationRecords => "Incarceration Records",
    Other => "Other",
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .iter()
            .copied()
            .find(|rt| rt.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown record type: {}", s))
    }
}

/// How an agency suggestion was arrived at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    AutoSuggestion,
    Unknown,
    NewAgency,
    Confirmed,
}

/// Miscellaneous descriptive metadata for a URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MiscMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub record_formats: Vec<String>,
    pub data_portal_type: Option<String>,
    pub supplying_entity: Option<String>,
}

impl MiscMetadata {
    /// Fill a missing name/description from the page's title and meta
    /// description.
    pub fn with_html_defaults(mut self, title: Option<&str>, description: Option<&str>) -> Self {
        if self.name.is_none() {
            self.name = title.map(str::to_string).filter(|s| !s.trim().is_empty());
        }
        if self.description.is_none() {
            self.description = description
                .map(str::to_string)
                .filter(|s| !s.trim().is_empty());
        }
        self
    }
}

/// Value carried by an annotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationValue {
    Relevant {
        is_relevant: bool,
    },
    RecordType {
        record_type: RecordType,
    },
    Agency {
        agency_id: Option<i64>,
        suggestion_type: SuggestionType,
    },
    MiscMetadata(MiscMetadata),
}

impl AnnotationValue {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationValue::Relevant { .. } => AnnotationKind::Relevant,
            AnnotationValue::RecordType { .. } => AnnotationKind::RecordType,
            AnnotationValue::Agency { .. } => AnnotationKind::Agency,
            AnnotationValue::MiscMetadata(_) => AnnotationKind::MiscMetadata,
        }
    }
}

// ============================================================================
// Annotation
// ============================================================================

/// Write request for an annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnnotation {
    pub url_id: UrlId,
    pub value: AnnotationValue,
    pub validation_status: ValidationStatus,
    pub validation_source: ValidationSource,
    pub confidence: Option<f32>,
    pub model_name: Option<String>,
    /// Set for human/manual annotations.
    pub user_id: Option<i64>,
}

impl NewAnnotation {
    /// Annotation produced by a model; pending human validation.
    pub fn automated(
        url_id: UrlId,
        value: AnnotationValue,
        confidence: Option<f32>,
        model_name: Option<String>,
    ) -> Self {
        Self {
            url_id,
            value,
            validation_status: ValidationStatus::PendingValidation,
            validation_source: ValidationSource::MachineLearning,
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
            model_name,
            user_id: None,
        }
    }

    /// Annotation entered by a reviewer.
    pub fn human(url_id: UrlId, value: AnnotationValue, user_id: i64) -> Self {
        Self {
            url_id,
            value,
            validation_status: ValidationStatus::Validated,
            validation_source: ValidationSource::Human,
            confidence: None,
            model_name: None,
            user_id: Some(user_id),
        }
    }
}

/// A stored annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: i64,
    pub url_id: UrlId,
    pub value: AnnotationValue,
    pub validation_status: ValidationStatus,
    pub validation_source: ValidationSource,
    pub confidence: Option<f32>,
    pub model_name: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        self.value.kind()
    }

    pub fn origin(&self) -> AnnotationOrigin {
        self.validation_source.origin()
    }
}
