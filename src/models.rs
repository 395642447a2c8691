use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub company: String,
    pub title: String,
    pub url: Option<String>,
    pub source: Option<String>, // "greenhouse", "lever", "linkedin", "email", "portal"
    pub contact_email: Option<String>,
    pub fingerprint: String,
    pub discovered_at: String,
}

/// A job as it arrives from a source feed, before anything is persisted.
/// Optional fields tolerate sparse feeds; an absent company degrades to the
/// "unknown company" path in the router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

impl Job {
    pub fn as_candidate(&self) -> Candidate {
        Candidate {
            company: self.company.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            source: self.source.clone(),
            contact_email: self.contact_email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub job_id: Option<i64>,
    pub company: String,
    pub normalized_title: String,
    pub method: String, // "email", "linkedin", "portal", "ats", "manual"
    pub applied_at: String,
    pub response_type: Option<String>, // "rejection", "interview", "offer"
    pub response_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub penalty_score: f64,
    pub blacklisted: bool,
    pub total_applications: i64,
    pub total_responses: i64,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Rejection,
    Interview,
    Offer,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Rejection => "rejection",
            ResponseType::Interview => "interview",
            ResponseType::Offer => "offer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rejection" | "rejected" => Some(ResponseType::Rejection),
            "interview" => Some(ResponseType::Interview),
            "offer" => Some(ResponseType::Offer),
            _ => None,
        }
    }
}
