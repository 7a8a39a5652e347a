use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validated tag name (trimmed, non-empty), typically a cloud service name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    /// Create a validated tag name.
    ///
    /// # Errors
    ///
    /// Returns `TagError::EmptyName` if the name is empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, TagError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TagError::EmptyName);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TagName {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TagName> for String {
    fn from(value: TagName) -> Self {
        value.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TagError {
    #[error("tag name cannot be empty")]
    EmptyName,
}

/// Exam categories used as generation focus when a learner has no history.
pub const CERTIFICATION_CATEGORIES: &[&str] = &[
    // Compute
    "EC2", "Lambda", "ECS", "EKS", "Fargate", "Batch", "Lightsail",
    // Storage
    "S3", "EBS", "EFS", "FSx", "Storage Gateway", "Snow Family",
    // Database
    "RDS", "DynamoDB", "Aurora", "ElastiCache", "Redshift", "DocumentDB", "Neptune",
    // Networking
    "VPC", "Route53", "CloudFront", "API Gateway", "ELB", "Direct Connect", "VPN",
    "Transit Gateway",
    // Security
    "IAM", "KMS", "Secrets Manager", "WAF", "Shield", "Cognito", "GuardDuty", "Inspector",
    "Macie",
    // Management
    "CloudWatch", "CloudTrail", "Config", "Organizations", "Systems Manager",
    "Trusted Advisor",
    // Application integration
    "SQS", "SNS", "Step Functions", "EventBridge", "AppSync",
    // Cost
    "Cost Explorer", "Budgets", "Savings Plans", "Reserved Instances",
];

/// Parse a comma-separated list of tags, skipping blanks.
#[must_use]
pub fn parse_tag_list(raw: &str) -> Vec<TagName> {
    raw.split(',').filter_map(|t| TagName::new(t).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_names() {
        assert_eq!(TagName::new("   "), Err(TagError::EmptyName));
        assert_eq!(TagName::new(" S3 ").unwrap().as_str(), "S3");
    }

    #[test]
    fn deserialization_validates() {
        let ok: TagName = serde_json::from_str("\"VPC\"").unwrap();
        assert_eq!(ok.as_str(), "VPC");
        assert!(serde_json::from_str::<TagName>("\"  \"").is_err());
    }

    #[test]
    fn parses_comma_lists() {
        let tags = parse_tag_list("S3, ,IAM,");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1].as_str(), "IAM");
    }

    #[test]
    fn categories_are_valid_tags() {
        assert!(CERTIFICATION_CATEGORIES.iter().all(|c| TagName::new(*c).is_ok()));
    }
}
