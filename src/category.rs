//! Categorical breakdown dimensions derived from raw survey codes.
//!
//! Each dimension has one exhaustive `from_code` that returns
//! [`Label::Unmapped`] for anything outside its code table. Records with an
//! unmapped label drop out of that dimension's breakdown only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result of classifying a raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label<T> {
    Known(T),
    Unmapped,
}

impl<T: Copy> Label<T> {
    pub fn known(&self) -> Option<T> {
        match self {
            Label::Known(v) => Some(*v),
            Label::Unmapped => None,
        }
    }

    pub fn is_unmapped(&self) -> bool {
        matches!(self, Label::Unmapped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn from_code(code: Option<i32>) -> Label<Self> {
        match code {
            Some(1) => Label::Known(Sex::Male),
            Some(2) => Label::Known(Sex::Female),
            _ => Label::Unmapped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sex::Male => "Varón",
            Sex::Female => "Mujer",
        }
    }
}

/// Highest education level reached, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Education {
    PrimaryIncomplete,
    PrimaryComplete,
    SecondaryIncomplete,
    SecondaryComplete,
    TertiaryIncomplete,
    TertiaryComplete,
}

impl Education {
    pub fn from_code(code: Option<i32>) -> Label<Self> {
        match code {
            Some(1) => Label::Known(Education::PrimaryIncomplete),
            Some(2) => Label::Known(Education::PrimaryComplete),
            Some(3) => Label::Known(Education::SecondaryIncomplete),
            Some(4) => Label::Known(Education::SecondaryComplete),
            Some(5) => Label::Known(Education::TertiaryIncomplete),
            Some(6) => Label::Known(Education::TertiaryComplete),
            _ => Label::Unmapped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Education::PrimaryIncomplete => "Primaria incompleta",
            Education::PrimaryComplete => "Primaria completa",
            Education::SecondaryIncomplete => "Secundaria incompleta",
            Education::SecondaryComplete => "Secundaria completa",
            Education::TertiaryIncomplete => "Sup/Univ incompleto",
            Education::TertiaryComplete => "Sup/Univ completo",
        }
    }
}

/// Disjoint age bands covering `[14, ∞)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgeBand {
    From14To24,
    From25To44,
    From45To64,
    From65,
}

impl AgeBand {
    pub fn from_age(age: Option<i32>) -> Label<Self> {
        match age {
            Some(14..=24) => Label::Known(AgeBand::From14To24),
            Some(25..=44) => Label::Known(AgeBand::From25To44),
            Some(45..=64) => Label::Known(AgeBand::From45To64),
            Some(a) if a >= 65 => Label::Known(AgeBand::From65),
            _ => Label::Unmapped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgeBand::From14To24 => "14-24",
            AgeBand::From25To44 => "25-44",
            AgeBand::From45To64 => "45-64",
            AgeBand::From65 => "65+",
        }
    }
}

/// Position in the main occupation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Occupation {
    Employer,
    SelfEmployed,
    Employee,
    FamilyWorker,
}

impl Occupation {
    pub fn from_code(code: Option<i32>) -> Label<Self> {
        match code {
            Some(1) => Label::Known(Occupation::Employer),
            Some(2) => Label::Known(Occupation::SelfEmployed),
            Some(3) => Label::Known(Occupation::Employee),
            Some(4) => Label::Known(Occupation::FamilyWorker),
            _ => Label::Unmapped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Occupation::Employer => "Patrón/empleador",
            Occupation::SelfEmployed => "Cuenta propia",
            Occupation::Employee => "Obrero/empleado",
            Occupation::FamilyWorker => "Trabajador familiar",
        }
    }
}

/// Labor-force status. Codes 0 (no answer) and 4 (under 10) are unmapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActivityStatus {
    Employed,
    Unemployed,
    Inactive,
}

impl ActivityStatus {
    pub fn from_code(code: Option<i32>) -> Label<Self> {
        match code {
            Some(1) => Label::Known(ActivityStatus::Employed),
            Some(2) => Label::Known(ActivityStatus::Unemployed),
            Some(3) => Label::Known(ActivityStatus::Inactive),
            _ => Label::Unmapped,
        }
    }
}

/// A breakdown dimension selectable at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Sex,
    Education,
    AgeBand,
    Occupation,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Sex,
        Dimension::Education,
        Dimension::AgeBand,
        Dimension::Occupation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Sex => "sex",
            Dimension::Education => "education",
            Dimension::AgeBand => "age_band",
            Dimension::Occupation => "occupation",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sex" => Ok(Dimension::Sex),
            "education" => Ok(Dimension::Education),
            "age_band" | "age" => Ok(Dimension::AgeBand),
            "occupation" => Ok(Dimension::Occupation),
            other => Err(format!(
                "unknown dimension '{other}' (expected sex, education, age_band, occupation)"
            )),
        }
    }
}

/// A known label in some dimension, usable as a grouping key.
///
/// Ordering follows the declared order within each dimension, so education
/// tiers and age bands sort naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CategoryValue {
    Sex(Sex),
    Education(Education),
    AgeBand(AgeBand),
    Occupation(Occupation),
}

impl CategoryValue {
    pub fn dimension(&self) -> Dimension {
        match self {
            CategoryValue::Sex(_) => Dimension::Sex,
            CategoryValue::Education(_) => Dimension::Education,
            CategoryValue::AgeBand(_) => Dimension::AgeBand,
            CategoryValue::Occupation(_) => Dimension::Occupation,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CategoryValue::Sex(v) => v.name(),
            CategoryValue::Education(v) => v.name(),
            CategoryValue::AgeBand(v) => v.name(),
            CategoryValue::Occupation(v) => v.name(),
        }
    }
}

impl fmt::Display for CategoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for CategoryValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// All dimension labels derived for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryLabels {
    pub sex: Label<Sex>,
    pub education: Label<Education>,
    pub age_band: Label<AgeBand>,
    pub occupation: Label<Occupation>,
    pub activity: Label<ActivityStatus>,
}

impl CategoryLabels {
    pub fn derive(
        age: Option<i32>,
        sex: Option<i32>,
        education: Option<i32>,
        occupation: Option<i32>,
        activity: Option<i32>,
    ) -> Self {
        Self {
            sex: Sex::from_code(sex),
            education: Education::from_code(education),
            age_band: AgeBand::from_age(age),
            occupation: Occupation::from_code(occupation),
            activity: ActivityStatus::from_code(activity),
        }
    }

    /// The record's value in `dimension`, or `None` if its code was unmapped.
    pub fn value(&self, dimension: Dimension) -> Option<CategoryValue> {
        match dimension {
            Dimension::Sex => self.sex.known().map(CategoryValue::Sex),
            Dimension::Education => self.education.known().map(CategoryValue::Education),
            Dimension::AgeBand => self.age_band.known().map(CategoryValue::AgeBand),
            Dimension::Occupation => self.occupation.known().map(CategoryValue::Occupation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_codes() {
        assert_eq!(Sex::from_code(Some(1)), Label::Known(Sex::Male));
        assert_eq!(Sex::from_code(Some(2)), Label::Known(Sex::Female));
        assert!(Sex::from_code(Some(9)).is_unmapped());
        assert!(Sex::from_code(None).is_unmapped());
    }

    #[test]
    fn test_education_tiers_are_ordered() {
        let tiers: Vec<_> = (1..=6)
            .filter_map(|c| Education::from_code(Some(c)).known())
            .collect();
        assert_eq!(tiers.len(), 6);
        assert!(tiers.windows(2).all(|w| w[0] < w[1]));
        assert!(Education::from_code(Some(7)).is_unmapped());
    }

    #[test]
    fn test_age_band_boundaries() {
        assert!(AgeBand::from_age(Some(13)).is_unmapped());
        assert_eq!(AgeBand::from_age(Some(14)), Label::Known(AgeBand::From14To24));
        assert_eq!(AgeBand::from_age(Some(24)), Label::Known(AgeBand::From14To24));
        assert_eq!(AgeBand::from_age(Some(25)), Label::Known(AgeBand::From25To44));
        assert_eq!(AgeBand::from_age(Some(64)), Label::Known(AgeBand::From45To64));
        assert_eq!(AgeBand::from_age(Some(65)), Label::Known(AgeBand::From65));
        assert_eq!(AgeBand::from_age(Some(99)), Label::Known(AgeBand::From65));
        assert!(AgeBand::from_age(None).is_unmapped());
    }

    #[test]
    fn test_occupation_unmapped_zero() {
        assert!(Occupation::from_code(Some(0)).is_unmapped());
        assert_eq!(
            Occupation::from_code(Some(3)),
            Label::Known(Occupation::Employee)
        );
    }

    #[test]
    fn test_activity_status_codes() {
        assert_eq!(
            ActivityStatus::from_code(Some(2)),
            Label::Known(ActivityStatus::Unemployed)
        );
        assert!(ActivityStatus::from_code(Some(0)).is_unmapped());
        assert!(ActivityStatus::from_code(Some(4)).is_unmapped());
    }

    #[test]
    fn test_labels_value_per_dimension() {
        let labels = CategoryLabels::derive(Some(30), Some(2), Some(9), Some(1), Some(1));
        assert_eq!(
            labels.value(Dimension::Sex),
            Some(CategoryValue::Sex(Sex::Female))
        );
        assert_eq!(labels.value(Dimension::Education), None);
        assert_eq!(
            labels.value(Dimension::AgeBand),
            Some(CategoryValue::AgeBand(AgeBand::From25To44))
        );
        assert_eq!(
            labels.value(Dimension::Occupation).map(|v| v.name()),
            Some("Patrón/empleador")
        );
    }

    #[test]
    fn test_dimension_from_str() {
        assert_eq!("sex".parse::<Dimension>(), Ok(Dimension::Sex));
        assert_eq!("age".parse::<Dimension>(), Ok(Dimension::AgeBand));
        assert!("region".parse::<Dimension>().is_err());
    }
}
