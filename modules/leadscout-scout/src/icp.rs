//! Target profile (ideal customer profile) detection from a free-text intent.

use serde::Serialize;

use crate::lexicon::{Industry, Lexicon};

/// Broad kind of professional the user is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProfileType {
    /// BTL, activation, trade and experiential marketing.
    Activation,
    Brand,
    Leadership,
    General,
}

impl ProfileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileType::Activation => "activation",
            ProfileType::Brand => "brand",
            ProfileType::Leadership => "leadership",
            ProfileType::General => "general",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetProfile {
    pub profile_type: ProfileType,
    /// Name of the detected industry, if the intent names one.
    pub industry: Option<String>,
    pub cities: Vec<String>,
}

impl TargetProfile {
    /// Detect profile type, industry and cities by keyword matching.
    pub fn detect(intent: &str, lexicon: &Lexicon) -> Self {
        let profile_type = if lexicon.activation.is_match(intent) {
            ProfileType::Activation
        } else if lexicon.brand.is_match(intent) {
            ProfileType::Brand
        } else if lexicon.leadership.is_match(intent) {
            ProfileType::Leadership
        } else {
            ProfileType::General
        };

        let industry = lexicon
            .industries
            .iter()
            .find(|i| i.named_in(intent))
            .map(|i| i.name.clone());

        Self {
            profile_type,
            industry,
            cities: lexicon.cities.find_all(intent),
        }
    }

    /// The compiled industry entry for the detected industry.
    pub fn industry_entry<'a>(&self, lexicon: &'a Lexicon) -> Option<&'a Industry> {
        let name = self.industry.as_deref()?;
        lexicon.industries.iter().find(|i| i.name == name)
    }
}
