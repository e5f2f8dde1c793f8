use crate::error::DealflowError;
use crate::ids::{ContactId, DealId, OwnerId};
use crate::stage::DealStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle label of a contact in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    Lead,
    Prospect,
    Customer,
    Inactive,
}

/// Addressable party owned by one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub owner: OwnerId,
    pub first_name: String,
    pub last_name: String,
    /// Unique per owner, stored lowercased.
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    #[serde(default)]
    pub status: ContactStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(
        owner: OwnerId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: ContactId::generate(),
            owner,
            first_name: first_name.into().trim().to_string(),
            last_name: last_name.into().trim().to_string(),
            email: email.into().trim().to_ascii_lowercase(),
            phone: None,
            company: None,
            position: None,
            status: ContactStatus::Lead,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Kind of touchpoint recorded against a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Call,
    Email,
    Meeting,
    Note,
}

impl ActivityKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Email => "email",
            Self::Meeting => "meeting",
            Self::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DealflowError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Err(DealflowError::invalid("activity type is required")),
            "call" => Ok(Self::Call),
            "email" => Ok(Self::Email),
            "meeting" => Ok(Self::Meeting),
            "note" => Ok(Self::Note),
            other => Err(DealflowError::InvalidInput(format!(
                "invalid activity type '{other}'; expected one of: call, email, meeting, note"
            ))),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivityKind {
    type Err = DealflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Append-only touchpoint owned by its parent deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub date: DateTime<Utc>,
}

/// A sales opportunity moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub owner: OwnerId,
    pub contact: ContactId,
    pub title: String,
    pub value: f64,
    pub stage: DealStage,
    /// Normally derived from `stage`, but a direct override is allowed.
    pub probability: u8,
    pub expected_close_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        &self.owner == owner
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Caller-supplied fields for a new deal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeal {
    pub title: String,
    pub value: f64,
    pub contact: ContactId,
    pub stage: Option<DealStage>,
    pub probability: Option<u8>,
    pub expected_close_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl NewDeal {
    pub fn new(title: impl Into<String>, value: f64, contact: ContactId) -> Self {
        Self {
            title: title.into(),
            value,
            contact,
            stage: None,
            probability: None,
            expected_close_date: None,
            notes: None,
        }
    }

    pub fn with_stage(mut self, stage: DealStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn validate(&self) -> Result<(), DealflowError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DealflowError::invalid("deal title is required"));
        }
        if title.chars().count() > 200 {
            return Err(DealflowError::invalid(
                "deal title must not exceed 200 characters",
            ));
        }
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(DealflowError::invalid(
                "deal value must be a non-negative number",
            ));
        }
        if matches!(self.probability, Some(p) if p > 100) {
            return Err(DealflowError::invalid(
                "probability must be between 0 and 100",
            ));
        }
        Ok(())
    }

    pub fn into_deal(self, owner: OwnerId) -> Deal {
        let now = Utc::now();
        Deal {
            id: DealId::generate(),
            owner,
            contact: self.contact,
            title: self.title.trim().to_string(),
            value: self.value,
            stage: self.stage.unwrap_or_default(),
            probability: self.probability.unwrap_or(0),
            expected_close_date: self.expected_close_date,
            notes: self.notes,
            activities: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_email_is_normalised() {
        let contact = Contact::new(OwnerId::generate(), " Ada ", "Lovelace", " Ada@Example.COM ");
        assert_eq!(contact.email, "ada@example.com");
        assert_eq!(contact.display_name(), "Ada Lovelace");
    }

    #[test]
    fn activity_kind_parsing() {
        assert_eq!(ActivityKind::parse("Meeting").unwrap(), ActivityKind::Meeting);
        assert!(ActivityKind::parse("").is_err());
        assert!(ActivityKind::parse("lunch").is_err());
    }

    #[test]
    fn new_deal_defaults_to_prospecting_with_zero_probability() {
        let deal = NewDeal::new("Acme renewal", 1200.0, ContactId::generate())
            .into_deal(OwnerId::generate());
        assert_eq!(deal.stage, DealStage::Prospecting);
        assert_eq!(deal.probability, 0);
        assert!(deal.activities.is_empty());
    }

    #[test]
    fn new_deal_validation() {
        let contact = ContactId::generate();
        assert!(NewDeal::new("  ", 1.0, contact).validate().is_err());
        assert!(NewDeal::new("ok", -1.0, contact).validate().is_err());
        assert!(NewDeal::new("ok", f64::NAN, contact).validate().is_err());
        let mut over = NewDeal::new("ok", 1.0, contact);
        over.probability = Some(101);
        assert!(over.validate().is_err());
        assert!(NewDeal::new("ok", 0.0, contact).validate().is_ok());
    }
}
