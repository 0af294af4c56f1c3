use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Actor, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub upstream_timeout_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            upstream_timeout_secs: 2,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            upstream_timeout_secs: self.upstream_timeout_secs,
            default_appointment_duration_minutes: 30,
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn staff(email: &str) -> Self {
        Self::new(email, "staff")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn to_actor(&self) -> Actor {
        self.to_user()
            .actor()
            .unwrap_or_else(|| panic!("test user has unknown role {}", self.role))
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Encode `header` and `claims` and sign them with HS256 under `secret`.
    pub fn sign(header: &serde_json::Value, claims: &serde_json::Value, secret: &str) -> String {
        let segment = |value: &serde_json::Value| general_purpose::URL_SAFE_NO_PAD.encode(value.to_string());
        let signing_input = format!("{}.{}", segment(header), segment(claims));

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());

        format!(
            "{}.{}",
            signing_input,
            general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
        )
    }

    pub fn claims_for(user: &TestUser, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> serde_json::Value {
        json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": issued_at.timestamp(),
            "exp": expires_at.timestamp()
        })
    }

    /// A valid token expiring after `exp_hours` (24 when `None`).
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let issued_at = Utc::now();
        let claims = Self::claims_for(user, issued_at, issued_at + Duration::hours(exp_hours.unwrap_or(24)));
        Self::sign(&json!({"alg": "HS256", "typ": "JWT"}), &claims, secret)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    /// Correctly signed, but declaring an algorithm the validator refuses.
    pub fn create_wrong_algorithm_token(user: &TestUser, secret: &str) -> String {
        let issued_at = Utc::now();
        let claims = Self::claims_for(user, issued_at, issued_at + Duration::hours(1));
        Self::sign(&json!({"alg": "none", "typ": "JWT"}), &claims, secret)
    }

    pub fn create_malformed_token() -> String {
        "invalid.token".to_string()
    }
}

/// PostgREST row shapes for the tables the cells read and write.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_row(doctor_id: &str, first_name: &str, last_name: &str, specialty: &str) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "first_name": first_name,
            "last_name": last_name,
            "specialty": specialty,
            "is_available": true,
            "is_verified": true,
            "timezone": "UTC"
        })
    }

    pub fn working_hours_row(doctor_id: &str, day_of_week: i32, start: &str, end: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "start_time": start,
            "end_time": end,
            "buffer_minutes": 0,
            "is_available": true
        })
    }

    pub fn appointment_row(
        appointment_id: &str,
        patient_id: &str,
        doctor_id: &str,
        scheduled_at: DateTime<Utc>,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "scheduled_at": scheduled_at.to_rfc3339(),
            "duration_minutes": 30,
            "status": status,
            "reason_for_visit": null,
            "cancellation_reason": null,
            "completion_notes": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
