use crate::error::DealflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Built-in message templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTemplate {
    Welcome,
    ContactAdded,
    DealWon,
}

/// Subject and body ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html: String,
}

impl MessageTemplate {
    pub fn name(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::ContactAdded => "contact_added",
            Self::DealWon => "deal_won",
        }
    }

    fn required_vars(self) -> &'static [&'static str] {
        match self {
            Self::Welcome => &["name"],
            Self::ContactAdded => &["contact_name", "email"],
            Self::DealWon => &["deal_title", "value"],
        }
    }

    /// Render with `vars`; every placeholder the template uses must be present.
    pub fn render(self, vars: &BTreeMap<String, String>) -> Result<RenderedMessage, DealflowError> {
        let missing: Vec<&str> = self
            .required_vars()
            .iter()
            .copied()
            .filter(|key| vars.get(*key).map_or(true, |v| v.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(DealflowError::InvalidInput(format!(
                "template '{}' is missing: {}",
                self.name(),
                missing.join(", ")
            )));
        }

        let var = |key: &str| escape_html(vars.get(key).map(String::as_str).unwrap_or_default());

        let rendered = match self {
            Self::Welcome => RenderedMessage {
                subject: "Welcome to CRM MVP!".to_string(),
                html: format!(
                    concat!(
                        "<h1>Welcome {}!</h1>\n",
                        "<p>Thank you for joining our CRM platform.</p>\n",
                        "<p>We're excited to help you manage your customer relationships.</p>",
                    ),
                    var("name")
                ),
            },
            Self::ContactAdded => RenderedMessage {
                subject: "New Contact Added".to_string(),
                html: format!(
                    "<h2>New Contact Added</h2>\n<p>Contact: {}</p>\n<p>Email: {}</p>",
                    var("contact_name"),
                    var("email")
                ),
            },
            Self::DealWon => RenderedMessage {
                subject: "Deal Closed - Congratulations! 🎉".to_string(),
                html: format!(
                    "<h2>Congratulations!</h2>\n<p>You've closed a deal: {}</p>\n<p>Value: ${}</p>",
                    var("deal_title"),
                    var("value")
                ),
            },
        };
        Ok(rendered)
    }
}

impl FromStr for MessageTemplate {
    type Err = DealflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "welcome" => Ok(Self::Welcome),
            "contact_added" | "contactAdded" => Ok(Self::ContactAdded),
            "deal_won" | "dealWon" => Ok(Self::DealWon),
            other => Err(DealflowError::InvalidInput(format!(
                "template '{other}' not found"
            ))),
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
