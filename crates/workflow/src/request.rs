//! Payloads exchanged with the process-management layer.

use serde::{Deserialize, Serialize};

use onboardflow_core::{BusinessKey, Variables};

use crate::vars;

/// Document type assumed when a start request leaves it out.
pub const DEFAULT_DOCUMENT_TYPE: &str = "ID";

/// Start request for a new onboarding instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    pub customer_name: Option<String>,
    pub email: Option<String>,
    pub document_type: Option<String>,
}

impl OnboardingRequest {
    pub fn new(
        customer_name: impl Into<String>,
        email: impl Into<String>,
        document_type: impl Into<String>,
    ) -> Self {
        Self {
            customer_name: Some(customer_name.into()),
            email: Some(email.into()),
            document_type: Some(document_type.into()),
        }
    }

    /// Initial process variables; the business key is stored alongside.
    pub fn into_variables(self, business_key: &BusinessKey) -> Variables {
        let mut out = Variables::new();
        out.insert(vars::CUSTOMER_NAME, self.customer_name);
        out.insert(vars::EMAIL, self.email);
        out.insert(
            vars::DOCUMENT_TYPE,
            self.document_type
                .unwrap_or_else(|| DEFAULT_DOCUMENT_TYPE.to_string()),
        );
        out.insert(vars::BUSINESS_KEY, business_key.as_str());
        out
    }
}

/// Outcome of the human document review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    pub approved: bool,
    pub comments: Option<String>,
}

impl ReviewDecision {
    pub fn approve(comments: impl Into<String>) -> Self {
        Self {
            approved: true,
            comments: Some(comments.into()),
        }
    }

    pub fn reject(comments: impl Into<String>) -> Self {
        Self {
            approved: false,
            comments: Some(comments.into()),
        }
    }

    pub fn into_variables(self) -> Variables {
        let mut out = Variables::new();
        out.insert(vars::DOCUMENTS_APPROVED, self.approved);
        out.insert(vars::REVIEWER_COMMENTS, self.comments);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_type_defaults_to_id() {
        let request: OnboardingRequest =
            serde_json::from_value(json!({"customerName": "Amit Sharma", "email": "amit@example.com"}))
                .unwrap();
        let key = BusinessKey::new("CUST-1234ABCD");
        let v = request.into_variables(&key);

        assert_eq!(v.get(vars::DOCUMENT_TYPE), Some(&json!("ID")));
        assert_eq!(v.get(vars::BUSINESS_KEY), Some(&json!("CUST-1234ABCD")));
        assert_eq!(v.get(vars::CUSTOMER_NAME), Some(&json!("Amit Sharma")));
    }

    #[test]
    fn review_decision_variables() {
        let v = ReviewDecision::reject("Blurry scan").into_variables();
        assert_eq!(v.get(vars::DOCUMENTS_APPROVED), Some(&json!(false)));
        assert_eq!(v.get(vars::REVIEWER_COMMENTS), Some(&json!("Blurry scan")));
    }
}
