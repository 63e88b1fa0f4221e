//! Declarative step registry for the recommendation wizard

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::FieldName;

/// What a step does when it is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Landing screen, advances on confirmation
    Entry,
    /// Asks for the fields the step owns and submits them
    Collect,
    /// Shows the narrowing result of the preceding collect step
    Result,
}

/// Immutable description of one wizard step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    pub index: usize,
    pub kind: StepKind,
    pub title: String,
    /// Fields this step asks for (empty for entry and result steps)
    pub owned_fields: Vec<FieldName>,
    pub next: Option<usize>,
    pub previous: Option<usize>,
}

impl StepDescriptor {
    /// The last collect step, whose confirmation finishes the wizard
    pub fn is_final(&self) -> bool {
        self.kind == StepKind::Collect && self.next.is_none()
    }

    pub fn owns(&self, field: FieldName) -> bool {
        self.owned_fields.contains(&field)
    }
}

/// Lookup of a step index outside the registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("step index {index} is out of range (last step is {last})")]
pub struct OutOfRangeError {
    pub index: usize,
    pub last: usize,
}

/// Errors building a custom registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a wizard needs at least one collect step")]
    Empty,

    #[error("collect step '{0}' owns no fields")]
    NoFields(String),

    #[error("field '{0}' is owned by more than one step")]
    DuplicateField(FieldName),
}

/// Definition of a collect step, used to build a registry
#[derive(Debug, Clone)]
pub struct CollectStep {
    pub title: String,
    pub fields: Vec<FieldName>,
}

impl CollectStep {
    pub fn new(title: impl Into<String>, fields: &[FieldName]) -> Self {
        Self {
            title: title.into(),
            fields: fields.to_vec(),
        }
    }
}

static STANDARD: Lazy<Arc<StepRegistry>> = Lazy::new(|| Arc::new(StepRegistry::build(standard_plan())));

/// The questionnaire used in production: eleven collect/result pairs and a final collect step
fn standard_plan() -> Vec<CollectStep> {
    use FieldName::*;

    vec![
        CollectStep::new("Identity", &[Name, Email]),
        CollectStep::new("Contact", &[Phone, City]),
        CollectStep::new("Personal details", &[BirthDate, Gender]),
        CollectStep::new("Address", &[Address]),
        CollectStep::new("Education level", &[EducationLevel]),
        CollectStep::new("Institution", &[Institution, Semester]),
        CollectStep::new("Faculty", &[FacultyId]),
        CollectStep::new("Major", &[MajorId]),
        CollectStep::new("Grades", &[Gpa]),
        CollectStep::new("Family situation", &[LowIncome, Orphan]),
        CollectStep::new("Accessibility", &[HasDisability]),
        CollectStep::new("Track record", &[HasAchievement, OrganizationExperience]),
    ]
}

/// Ordered, immutable list of wizard steps.
///
/// Layout: index 0 is the entry step; every collect step except the last is followed by
/// exactly one result step; the last step is the final collect step.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<StepDescriptor>,
}

impl StepRegistry {
    /// Shared instance of the production questionnaire
    pub fn standard() -> Arc<StepRegistry> {
        Arc::clone(&STANDARD)
    }

    /// Build a registry from collect step definitions
    pub fn from_collect_steps(plan: Vec<CollectStep>) -> Result<Self, RegistryError> {
        if plan.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = Vec::new();
        for step in &plan {
            if step.fields.is_empty() {
                return Err(RegistryError::NoFields(step.title.clone()));
            }
            for field in &step.fields {
                if seen.contains(field) {
                    return Err(RegistryError::DuplicateField(*field));
                }
                seen.push(*field);
            }
        }

        Ok(Self::build(plan))
    }

    fn build(plan: Vec<CollectStep>) -> Self {
        let mut steps = Vec::with_capacity(plan.len() * 2);
        steps.push((StepKind::Entry, "Welcome".to_string(), Vec::new()));

        let last = plan.len() - 1;
        for (i, collect) in plan.into_iter().enumerate() {
            let result_title = format!("Matches so far: {}", collect.title);
            steps.push((StepKind::Collect, collect.title, collect.fields));
            if i < last {
                steps.push((StepKind::Result, result_title, Vec::new()));
            }
        }

        let count = steps.len();
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(index, (kind, title, owned_fields))| StepDescriptor {
                index,
                kind,
                title,
                owned_fields,
                next: (index + 1 < count).then_some(index + 1),
                previous: index.checked_sub(1),
            })
            .collect();

        Self { steps }
    }

    pub fn describe(&self, index: usize) -> Result<&StepDescriptor, OutOfRangeError> {
        self.steps.get(index).ok_or(OutOfRangeError {
            index,
            last: self.last_index(),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.steps.len()
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// The collect step asking for `field`
    pub fn step_owning(&self, field: FieldName) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.owns(field))
    }

    /// The collect step whose fields determine what is shown at `index`.
    ///
    /// A collect step maps to itself, a result step to the collect step right before it,
    /// the entry step to nothing.
    pub fn collect_step_for(&self, index: usize) -> Option<&StepDescriptor> {
        let step = self.steps.get(index)?;
        match step.kind {
            StepKind::Entry => None,
            StepKind::Collect => Some(step),
            StepKind::Result => step
                .previous
                .and_then(|i| self.steps.get(i))
                .filter(|s| s.kind == StepKind::Collect),
        }
    }

    /// Format collect-step progress like "Identity > [Contact] > Personal details"
    pub fn format_progress(&self, current: usize) -> String {
        let active = self.collect_step_for(current).map(|s| s.index);
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Collect)
            .map(|s| {
                if Some(s.index) == active {
                    format!("[{}]", s.title)
                } else {
                    s.title.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" > ")
    }

    pub fn percentage_complete(&self, current: usize) -> u8 {
        if self.steps.len() <= 1 {
            100
        } else {
            ((current.min(self.last_index()) as f32 / self.last_index() as f32) * 100.0) as u8
        }
    }
}
