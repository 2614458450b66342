//! Author directory records and their expansion into template variables.

use crate::variables::ResolvedVariables;
use serde::{Deserialize, Serialize};

/// Variable carrying the author directory ID chosen by the user.
pub const AUTHOR_ID_VAR: &str = "author_id";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    /// Single-line form, skipping empty parts: `street, city, state postal, country`.
    pub fn one_line(&self) -> String {
        let region = [self.state.as_deref(), self.postal_code.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        [
            self.street.as_deref(),
            self.city.as_deref(),
            Some(region.as_str()),
            self.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affiliation {
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    pub internal_id: String,
    #[serde(default)]
    pub ror: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub internal_id: String,
    pub family_name: String,
    #[serde(default)]
    pub given_name: Option<String>,
    /// ORCID URL, when the author has one.
    #[serde(default)]
    pub orcid: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub affiliations: Vec<Affiliation>,
}

impl Author {
    pub fn display_name(&self) -> String {
        match &self.given_name {
            Some(given) if !given.is_empty() => format!("{given} {}", self.family_name),
            _ => self.family_name.clone(),
        }
    }
}

/// Write the author's name, ORCID and primary affiliation into `vars`.
///
/// Fields the author does not have are written as empty strings so the
/// template never falls back to placeholder defaults for a real author.
pub fn expand_into(author: &Author, vars: &mut ResolvedVariables) {
    vars.insert(
        "first_author_given",
        author.given_name.clone().unwrap_or_default(),
    );
    vars.insert("first_author_family", author.family_name.clone());
    vars.insert("first_author_orcid", author.orcid.clone().unwrap_or_default());

    let affiliation = author.affiliations.first();
    vars.insert(
        "first_author_affil_name",
        affiliation.map(|a| a.name.clone()).unwrap_or_default(),
    );
    vars.insert(
        "first_author_affil_internal_id",
        affiliation.map(|a| a.internal_id.clone()).unwrap_or_default(),
    );
    vars.insert(
        "first_author_affil_address",
        affiliation
            .and_then(|a| a.address.as_ref())
            .map(Address::one_line)
            .unwrap_or_default(),
    );
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_author() -> Author {
        serde_json::from_str(
            r#"{
                "internal_id": "sickj",
                "family_name": "Sick",
                "given_name": "Jonathan",
                "orcid": "https://orcid.org/0000-0003-3001-676X",
                "affiliations": [
                    {
                        "name": "Rubin Observatory Project Office",
                        "internal_id": "RubinObsC",
                        "address": {
                            "street": "950 N. Cherry Ave.",
                            "city": "Tucson",
                            "state": "AZ",
                            "postal_code": "85719",
                            "country": "USA"
                        }
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn expands_primary_affiliation() {
        let mut vars = ResolvedVariables::new();
        expand_into(&sample_author(), &mut vars);
        assert_eq!(vars.get("first_author_given"), Some("Jonathan"));
        assert_eq!(vars.get("first_author_family"), Some("Sick"));
        assert_eq!(
            vars.get("first_author_orcid"),
            Some("https://orcid.org/0000-0003-3001-676X")
        );
        assert_eq!(vars.get("first_author_affil_internal_id"), Some("RubinObsC"));
        assert_eq!(
            vars.get("first_author_affil_address"),
            Some("950 N. Cherry Ave., Tucson, AZ 85719, USA")
        );
    }

    #[test]
    fn missing_fields_become_empty() {
        let author = Author {
            internal_id: "x".into(),
            family_name: "Solo".into(),
            given_name: None,
            orcid: None,
            notes: vec![],
            affiliations: vec![],
        };
        let mut vars = ResolvedVariables::new();
        expand_into(&author, &mut vars);
        assert_eq!(vars.get("first_author_given"), Some(""));
        assert_eq!(vars.get("first_author_affil_name"), Some(""));
        assert_eq!(author.display_name(), "Solo");
    }

    #[test]
    fn address_skips_blank_parts() {
        let addr = Address {
            city: Some("Tucson".into()),
            country: Some("USA".into()),
            ..Default::default()
        };
        assert_eq!(addr.one_line(), "Tucson, USA");
    }
}
