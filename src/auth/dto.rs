use serde::{Deserialize, Serialize};

/// Form body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
}

/// Form body for login.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Form body requesting a password-reset token.
#[derive(Debug, Deserialize)]
pub struct ResetRequestForm {
    pub email: String,
}

/// Form body consuming a password-reset token.
#[derive(Debug, Deserialize)]
pub struct UpdatePasswordForm {
    pub email: String,
    pub reset_token: Option<String>,
    pub new_password: Option<String>,
}

/// Generic `{"message": ...}` payload.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `{"email": ..., "message": ...}` payload returned by registration, login
/// and password update.
#[derive(Debug, Serialize)]
pub struct EmailMessage {
    pub email: String,
    pub message: String,
}

/// Response for a profile lookup.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub email: String,
}

/// Response carrying a freshly issued reset token.
#[derive(Debug, Serialize)]
pub struct ResetTokenResponse {
    pub email: String,
    pub reset_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_token_response_serialization() {
        let response = ResetTokenResponse {
            email: "test@example.com".to_string(),
            reset_token: "token-value".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("reset_token"));
    }
}
