//! Built-in scholarship catalog of the stub service and its scoring

use chrono::NaiveDate;

use crate::api::{Recommendation, ResultSet};
use crate::profile::{FieldMap, FieldName, FieldValue};

/// One scholarship programme with its eligibility rules
#[derive(Debug, Clone)]
pub struct Scholarship {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: &'static str,
    pub deadline: Option<(i32, u32, u32)>,
    /// Accepted education levels; empty accepts every level
    pub education_levels: &'static [&'static str],
    pub min_gpa: Option<f64>,
    pub requires_low_income: bool,
    pub for_orphans: bool,
    pub for_disability: bool,
    pub requires_achievement: bool,
    /// Cities the programme is limited to; empty means nationwide
    pub cities: &'static [&'static str],
}

const UNDERGRADUATE: &[&str] = &["diploma", "bachelor"];
const POSTGRADUATE: &[&str] = &["master", "doctorate"];

static CATALOG: &[Scholarship] = &[
    Scholarship {
        id: "kip-kuliah",
        name: "KIP Kuliah",
        provider: "Ministry of Education",
        deadline: Some((2026, 12, 31)),
        education_levels: &["high_school", "diploma", "bachelor"],
        min_gpa: None,
        requires_low_income: true,
        for_orphans: false,
        for_disability: false,
        requires_achievement: false,
        cities: &[],
    },
    Scholarship {
        id: "lpdp-regular",
        name: "LPDP Regular",
        provider: "LPDP",
        deadline: Some((2026, 11, 30)),
        education_levels: POSTGRADUATE,
        min_gpa: Some(3.0),
        requires_low_income: false,
        for_orphans: false,
        for_disability: false,
        requires_achievement: false,
        cities: &[],
    },
    Scholarship {
        id: "lpdp-disability",
        name: "LPDP Affirmation for Persons with Disabilities",
        provider: "LPDP",
        deadline: Some((2026, 11, 30)),
        education_levels: POSTGRADUATE,
        min_gpa: Some(2.75),
        requires_low_income: false,
        for_orphans: false,
        for_disability: true,
        requires_achievement: false,
        cities: &[],
    },
    Scholarship {
        id: "djarum-plus",
        name: "Djarum Beasiswa Plus",
        provider: "Djarum Foundation",
        deadline: Some((2026, 5, 15)),
        education_levels: UNDERGRADUATE,
        min_gpa: Some(3.0),
        requires_low_income: false,
        for_orphans: false,
        for_disability: false,
        requires_achievement: true,
        cities: &[],
    },
    Scholarship {
        id: "baznas-yatim",
        name: "BAZNAS Orphan Scholarship",
        provider: "BAZNAS",
        deadline: None,
        education_levels: &[],
        min_gpa: None,
        requires_low_income: false,
        for_orphans: true,
        for_disability: false,
        requires_achievement: false,
        cities: &[],
    },
    Scholarship {
        id: "bandung-juara",
        name: "Bandung Juara Scholarship",
        provider: "City of Bandung",
        deadline: Some((2026, 8, 1)),
        education_levels: UNDERGRADUATE,
        min_gpa: Some(2.5),
        requires_low_income: false,
        for_orphans: false,
        for_disability: false,
        requires_achievement: false,
        cities: &["bandung"],
    },
    Scholarship {
        id: "jakarta-unggul",
        name: "Jakarta Unggul Scholarship",
        provider: "Province of DKI Jakarta",
        deadline: Some((2026, 7, 10)),
        education_levels: UNDERGRADUATE,
        min_gpa: Some(3.0),
        requires_low_income: false,
        for_orphans: false,
        for_disability: false,
        requires_achievement: false,
        cities: &["jakarta"],
    },
    Scholarship {
        id: "tanoto-teladan",
        name: "Tanoto TELADAN",
        provider: "Tanoto Foundation",
        deadline: Some((2026, 4, 30)),
        education_levels: &["bachelor"],
        min_gpa: Some(3.0),
        requires_low_income: false,
        for_orphans: false,
        for_disability: false,
        requires_achievement: false,
        cities: &[],
    },
];

/// The scholarships the stub service scores against
pub fn builtin() -> &'static [Scholarship] {
    CATALOG
}

impl Scholarship {
    /// Score against the known part of a profile.
    ///
    /// Returns `None` when a known answer rules the programme out. Unanswered criteria
    /// neither exclude nor add to the score, so the set narrows as answers accumulate.
    pub fn score(&self, profile: &FieldMap) -> Option<f64> {
        let mut score = 1.0;

        if !self.education_levels.is_empty() {
            if let Some(level) = text(profile, FieldName::EducationLevel) {
                if !self.education_levels.contains(&level) {
                    return None;
                }
                score += 1.0;
            }
        }

        if let Some(min_gpa) = self.min_gpa {
            if let Some(gpa) = profile.get(&FieldName::Gpa).and_then(FieldValue::as_f64) {
                if gpa < min_gpa {
                    return None;
                }
                score += 1.0 + (gpa - min_gpa);
            }
        }

        let rules = [
            (self.requires_low_income, FieldName::LowIncome),
            (self.for_orphans, FieldName::Orphan),
            (self.for_disability, FieldName::HasDisability),
            (self.requires_achievement, FieldName::HasAchievement),
        ];
        for (required, field) in rules {
            if !required {
                continue;
            }
            match profile.get(&field).and_then(FieldValue::as_bool) {
                Some(false) => return None,
                Some(true) => score += 2.0,
                None => {}
            }
        }

        if !self.cities.is_empty() {
            if let Some(city) = text(profile, FieldName::City) {
                let city = city.trim().to_lowercase();
                if !self.cities.iter().any(|c| city.contains(c)) {
                    return None;
                }
                score += 1.5;
            }
        }

        if profile.get(&FieldName::OrganizationExperience).and_then(FieldValue::as_bool) == Some(true) {
            score += 0.5;
        }

        Some(score)
    }

    fn recommendation(&self, score: f64) -> Recommendation {
        Recommendation {
            scholarship_id: self.id.to_string(),
            name: self.name.to_string(),
            provider: self.provider.to_string(),
            score: (score * 100.0).round() / 100.0,
            deadline: self
                .deadline
                .and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        }
    }
}

fn text(profile: &FieldMap, field: FieldName) -> Option<&str> {
    profile.get(&field).and_then(FieldValue::as_str)
}

/// Rank the catalog for a profile, best match first
pub fn rank(catalog: &[Scholarship], profile: &FieldMap) -> ResultSet {
    let mut ranked: Vec<Recommendation> = catalog
        .iter()
        .filter_map(|s| s.score(profile).map(|score| s.recommendation(score)))
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked
}
