use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "0-6")]
    UpTo6,
    #[serde(rename = "7-12")]
    From7To12,
    #[serde(rename = "13-18")]
    From13To18,
    #[serde(rename = "19-24")]
    From19To24,
    #[serde(rename = "25-34")]
    From25To34,
    #[serde(rename = "35-49")]
    From35To49,
    #[serde(rename = "50-59")]
    From50To59,
    #[serde(rename = ">60")]
    Over60,
}

impl AgeGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            AgeGroup::UpTo6 => "0-6",
            AgeGroup::From7To12 => "7-12",
            AgeGroup::From13To18 => "13-18",
            AgeGroup::From19To24 => "19-24",
            AgeGroup::From25To34 => "25-34",
            AgeGroup::From35To49 => "35-49",
            AgeGroup::From50To59 => "50-59",
            AgeGroup::Over60 => ">60",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DietaryRestriction {
    #[serde(rename = "Dairy-free")]
    DairyFree,
    #[serde(rename = "Gluten-free")]
    GlutenFree,
    #[serde(rename = "Nut-free")]
    NutFree,
    Vegetarian,
    Vegan,
    Halal,
    Kosher,
    Others,
}

const MEAT: &[&str] = &[
    "chicken", "beef", "pork", "fish", "salmon", "tuna", "turkey", "lamb", "bacon", "ham",
    "sausage", "shrimp", "seafood", "meat", "duck", "veal", "venison", "anchovy",
];
const ANIMAL_PRODUCTS: &[&str] = &[
    "milk", "cheese", "butter", "yogurt", "cream", "egg", "eggs", "honey",
];
const DAIRY: &[&str] = &["milk", "cheese", "butter", "yogurt", "cream", "ice cream"];
const GLUTEN: &[&str] = &[
    "bread", "wheat", "pasta", "flour", "beer", "barley", "rye", "seitan", "breadcrumbs",
    "croutons",
];
const NUTS: &[&str] = &[
    "almond", "peanut", "peanuts", "cashew", "walnut", "pecan", "hazelnut", "brazil nut",
    "macadamia", "nut",
];
const HALAL: &[&str] = &["pork", "alcohol", "wine", "beer"];
const KOSHER: &[&str] = &["pork", "shrimp", "crab", "lobster", "shellfish"];

impl DietaryRestriction {
    pub fn label(self) -> &'static str {
        match self {
            DietaryRestriction::DairyFree => "Dairy-free",
            DietaryRestriction::GlutenFree => "Gluten-free",
            DietaryRestriction::NutFree => "Nut-free",
            DietaryRestriction::Vegetarian => "Vegetarian",
            DietaryRestriction::Vegan => "Vegan",
            DietaryRestriction::Halal => "Halal",
            DietaryRestriction::Kosher => "Kosher",
            DietaryRestriction::Others => "Others",
        }
    }

    /// Lowercase food names that break this restriction. `Others` has none.
    pub fn keywords(self) -> impl Iterator<Item = &'static str> {
        let groups: &'static [&'static [&'static str]] = match self {
            DietaryRestriction::Vegetarian => &[MEAT],
            DietaryRestriction::Vegan => &[MEAT, ANIMAL_PRODUCTS],
            DietaryRestriction::DairyFree => &[DAIRY],
            DietaryRestriction::GlutenFree => &[GLUTEN],
            DietaryRestriction::NutFree => &[NUTS],
            DietaryRestriction::Halal => &[HALAL],
            DietaryRestriction::Kosher => &[KOSHER],
            DietaryRestriction::Others => &[],
        };
        groups.iter().flat_map(|group| group.iter().copied())
    }
}

impl fmt::Display for DietaryRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub restrictions: Vec<DietaryRestriction>,
}
