use serde::{Deserialize, Serialize};

/// A billed user/account. Identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub plan_id: String,
    pub status: UserStatus,
    /// External-billing-customer-id (e.g. Stripe customer id). Opaque to the core.
    pub billing_customer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspended_user_is_not_active() {
        let user = User {
            id: "u1".into(),
            email: "a@example.com".into(),
            plan_id: "free".into(),
            status: UserStatus::Suspended,
            billing_customer_id: None,
        };
        assert!(!user.is_active());
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&UserStatus::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
    }
}
