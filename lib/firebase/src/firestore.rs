//! Firestore REST profile store.
//!
//! Profiles live at `users/{uid}` in the project's default database. Field
//! values use Firestore's typed encoding (`stringValue`, `timestampValue`,
//! `arrayValue`, `nullValue`).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use school_manager_access::{PasswordDigest, ProfileError, ProfileStore, RoleSet, UserProfile};
use school_manager_core::UserId;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::config::FirebaseConfig;

const USERS_COLLECTION: &str = "users";

const FIELD_EMAIL: &str = "email";
const FIELD_DISPLAY_NAME: &str = "displayName";
const FIELD_ROLES: &str = "roles";
const FIELD_PASSWORD_HASH: &str = "hashedPassword";
const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_UPDATED_AT: &str = "updatedAt";

/// Profile mirror backed by Cloud Firestore.
#[derive(Debug, Clone)]
pub struct FirestoreProfileStore {
    http: reqwest::Client,
    config: FirebaseConfig,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreProfileStore {
    /// Creates a store using a shared HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, config: FirebaseConfig) -> Self {
        Self { http, config }
    }

    fn document_url(&self, user_id: &UserId) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{USERS_COLLECTION}/{user_id}",
            self.config.firestore_url(),
            self.config.project_id(),
        )
    }
}

fn transport(e: reqwest::Error) -> ProfileError {
    ProfileError::Transport {
        details: e.to_string(),
    }
}

async fn rejected(response: reqwest::Response) -> ProfileError {
    let status = response.status().as_u16();
    let details = response.text().await.unwrap_or_default();
    ProfileError::Rejected { status, details }
}

fn string_value(value: Option<&str>) -> Value {
    match value {
        Some(s) => json!({ "stringValue": s }),
        None => json!({ "nullValue": null }),
    }
}

fn timestamp_value(at: DateTime<Utc>) -> Value {
    json!({ "timestampValue": at.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

fn encode(profile: &UserProfile) -> Value {
    let roles: Vec<Value> = profile
        .roles
        .iter()
        .map(|role| json!({ "stringValue": role.as_str() }))
        .collect();
    json!({
        "fields": {
            FIELD_EMAIL: string_value(profile.email.as_deref()),
            FIELD_DISPLAY_NAME: string_value(profile.display_name.as_deref()),
            FIELD_ROLES: { "arrayValue": { "values": roles } },
            FIELD_PASSWORD_HASH: string_value(profile.password_hash.as_ref().map(PasswordDigest::as_phc)),
            FIELD_CREATED_AT: timestamp_value(profile.created_at),
            FIELD_UPDATED_AT: timestamp_value(profile.updated_at),
        }
    })
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn timestamp_field(
    fields: &Map<String, Value>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, ProfileError> {
    let Some(raw) = fields
        .get(name)
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(|e| ProfileError::InvalidDocument {
            details: format!("{name} '{raw}': {e}"),
        })
}

fn decode(user_id: &UserId, document: Document) -> Result<UserProfile, ProfileError> {
    let fields = document.fields;
    let created_at =
        timestamp_field(&fields, FIELD_CREATED_AT)?.ok_or_else(|| ProfileError::InvalidDocument {
            details: format!("missing {FIELD_CREATED_AT}"),
        })?;
    let updated_at = timestamp_field(&fields, FIELD_UPDATED_AT)?.unwrap_or(created_at);
    let role_names: Vec<&str> = fields
        .get(FIELD_ROLES)
        .and_then(|v| v.pointer("/arrayValue/values"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.get("stringValue").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    Ok(UserProfile {
        user_id: user_id.clone(),
        email: string_field(&fields, FIELD_EMAIL),
        display_name: string_field(&fields, FIELD_DISPLAY_NAME),
        roles: RoleSet::from_claim_values(role_names.as_slice()),
        password_hash: string_field(&fields, FIELD_PASSWORD_HASH).map(PasswordDigest::from_phc),
        created_at,
        updated_at,
    })
}

#[async_trait]
impl ProfileStore for FirestoreProfileStore {
    #[instrument(skip(self, id_token, profile), fields(user_id = %profile.user_id))]
    async fn save_profile(
        &self,
        id_token: &str,
        profile: &UserProfile,
    ) -> Result<(), ProfileError> {
        let response = self
            .http
            .patch(self.document_url(&profile.user_id))
            .bearer_auth(id_token)
            .json(&encode(profile))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        debug!("profile saved");
        Ok(())
    }

    #[instrument(skip(self, id_token))]
    async fn get_profile(
        &self,
        id_token: &str,
        user_id: &UserId,
    ) -> Result<Option<UserProfile>, ProfileError> {
        let response = self
            .http
            .get(self.document_url(user_id))
            .bearer_auth(id_token)
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        let document: Document =
            response
                .json()
                .await
                .map_err(|e| ProfileError::InvalidDocument {
                    details: e.to_string(),
                })?;
        decode(user_id, document).map(Some)
    }

    #[instrument(skip(self, id_token, digest))]
    async fn update_password(
        &self,
        id_token: &str,
        user_id: &UserId,
        digest: &PasswordDigest,
    ) -> Result<(), ProfileError> {
        let body = json!({
            "fields": {
                FIELD_PASSWORD_HASH: string_value(Some(digest.as_phc())),
                FIELD_UPDATED_AT: timestamp_value(Utc::now()),
            }
        });
        let response = self
            .http
            .patch(self.document_url(user_id))
            .query(&[
                ("updateMask.fieldPaths", FIELD_PASSWORD_HASH),
                ("updateMask.fieldPaths", FIELD_UPDATED_AT),
                ("currentDocument.exists", "true"),
            ])
            .bearer_auth(id_token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        debug!("profile password updated");
        Ok(())
    }
}
