//! Process variable names shared by the handlers and the runtime.

pub const CUSTOMER_NAME: &str = "customerName";
pub const EMAIL: &str = "email";
pub const DOCUMENT_TYPE: &str = "documentType";
pub const BUSINESS_KEY: &str = "businessKey";

pub const IS_VALID: &str = "isValid";
pub const VALIDATION_MESSAGE: &str = "validationMessage";
pub const VALIDATED_AT: &str = "validatedAt";
pub const ERROR_CODE: &str = onboardflow_core::outcome::ERROR_CODE;

pub const DOCUMENTS_APPROVED: &str = "documentsApproved";
pub const REVIEWER_COMMENTS: &str = "reviewerComments";

pub const ACCOUNT_ID: &str = "accountId";
pub const ACCOUNT_STATUS: &str = "accountStatus";
pub const ACCOUNT_CREATED_AT: &str = "accountCreatedAt";
pub const ACCOUNT_EMAIL: &str = "accountEmail";
pub const ACCOUNT_HOLDER: &str = "accountHolder";
pub const ONBOARDING_COMPLETED: &str = "onboardingCompleted";

pub const ERROR_OCCURRED: &str = "errorOccurred";
pub const ERROR_MESSAGE: &str = "errorMessage";
pub const ERROR_HANDLED_AT: &str = "errorHandledAt";
pub const ERROR_HANDLED_BY: &str = "errorHandledBy";
pub const ONBOARDING_STATUS: &str = "onboardingStatus";
