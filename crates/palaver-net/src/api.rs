//! Remote channel/message API client.
//!
//! A thin wrapper over JSON-over-HTTPS request/response pairs. Every call is
//! authenticated with a bearer token attached as a header, and every response
//! arrives inside a `{status, message, data}` envelope. Non-2xx responses
//! and schema mismatches surface as typed [`ApiError`] values; the client
//! performs no retries of its own.

use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use palaver_shared::constants::MAX_ATTACHMENT_SIZE;

use crate::error::ApiError;

/// Envelope wrapped around every API response body.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: String,
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Structured error body the server may attach to a non-2xx response.
#[derive(Debug, Deserialize)]
struct ServerErrorBody {
    reason: String,
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChannel {
    pub channel_arn: String,
    pub name: String,
    pub privacy: Option<String>,
    pub mode: Option<String>,
    pub metadata: Option<String>,
    pub is_member: Option<bool>,
    pub is_moderator: Option<bool>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessage {
    pub message_id: String,
    pub channel_arn: String,
    pub content: Option<String>,
    /// Client correlation token, echoed back verbatim.
    pub metadata: Option<String>,
    /// `standard` or `system`.
    pub kind: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    /// Epoch milliseconds.
    pub created_timestamp: i64,
    /// Epoch milliseconds; absent when never edited.
    pub last_edited_timestamp: Option<i64>,
    pub redacted: Option<bool>,
    pub attachment: Option<RemoteAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttachment {
    pub url: String,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub duration_secs: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMember {
    pub user_id: String,
    pub display_name: String,
    pub presence: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProfile {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeeting {
    /// Joinable meeting link, suitable for sending as a message.
    pub join_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub token: String,
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayUrlResponse {
    /// One-shot signed WebSocket URL.
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChannelRequest<'a> {
    name: &'a str,
    privacy: &'a str,
    mode: &'a str,
    metadata: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    content: &'a str,
    metadata: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditMessageRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddMemberRequest<'a> {
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest<'a> {
    display_name: &'a str,
}

/// An attachment upload: payload bytes plus the descriptor fields the server
/// round-trips back through the message metadata.
#[derive(Debug, Clone)]
pub struct SendAttachment {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub file_type: String,
    /// Recording length, for audio clips.
    pub duration_secs: Option<u32>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Remote API client. Constructed once and shared; the bearer token is set
/// after sign-in and attached to every subsequent request.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ApiError::BadRequest("not signed in".into()))
    }

    // ------------------------------------------------------------------
    // Auth & profile
    // ------------------------------------------------------------------

    /// Exchange credentials for a bearer token. On success the token is
    /// retained for all subsequent calls.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<SignInResponse, ApiError> {
        let resp = self
            .http
            .post(self.url("/auth/sign-in"))
            .json(&SignInRequest { username, password })
            .send()
            .await?;

        let signed: SignInResponse = decode_response(resp).await?;
        self.set_token(signed.token.clone());
        Ok(signed)
    }

    pub async fn get_profile(&self) -> Result<RemoteProfile, ApiError> {
        self.get("/profile").await
    }

    pub async fn update_profile(&self, display_name: &str) -> Result<RemoteProfile, ApiError> {
        self.post("/profile", &UpdateProfileRequest { display_name })
            .await
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    pub async fn list_channels(&self) -> Result<Vec<RemoteChannel>, ApiError> {
        self.get("/channels").await
    }

    pub async fn create_channel(
        &self,
        name: &str,
        privacy: &str,
        mode: &str,
        metadata: Option<&str>,
    ) -> Result<RemoteChannel, ApiError> {
        self.post(
            "/channels",
            &CreateChannelRequest {
                name,
                privacy,
                mode,
                metadata,
            },
        )
        .await
    }

    /// Search public channels by name.
    pub async fn find_channels(&self, name: &str) -> Result<Vec<RemoteChannel>, ApiError> {
        let path = format!("/channels/search?name={}", urlencode(name));
        self.get(&path).await
    }

    pub async fn leave_channel(&self, channel_arn: &str) -> Result<(), ApiError> {
        self.delete(&format!("/channels/{}", urlencode(channel_arn)))
            .await
    }

    // ------------------------------------------------------------------
    // Members & presence
    // ------------------------------------------------------------------

    pub async fn list_members(&self, channel_arn: &str) -> Result<Vec<RemoteMember>, ApiError> {
        self.get(&format!("/channels/{}/members", urlencode(channel_arn)))
            .await
    }

    pub async fn add_member(&self, channel_arn: &str, user_id: &str) -> Result<(), ApiError> {
        self.post_empty(
            &format!("/channels/{}/members", urlencode(channel_arn)),
            &AddMemberRequest { user_id },
        )
        .await
    }

    /// Current presence for a single user.
    pub async fn get_presence(&self, user_id: &str) -> Result<RemoteMember, ApiError> {
        self.get(&format!("/presence/{}", urlencode(user_id))).await
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn list_messages(&self, channel_arn: &str) -> Result<Vec<RemoteMessage>, ApiError> {
        self.get(&format!("/channels/{}/messages", urlencode(channel_arn)))
            .await
    }

    /// Send a text message. `metadata` is the client correlation token.
    pub async fn send_message(
        &self,
        channel_arn: &str,
        content: &str,
        metadata: &str,
    ) -> Result<RemoteMessage, ApiError> {
        self.post(
            &format!("/channels/{}/messages", urlencode(channel_arn)),
            &SendMessageRequest { content, metadata },
        )
        .await
    }

    /// Send an attachment as a multipart upload.
    pub async fn send_attachment(
        &self,
        channel_arn: &str,
        metadata: &str,
        attachment: SendAttachment,
    ) -> Result<RemoteMessage, ApiError> {
        if attachment.bytes.len() > MAX_ATTACHMENT_SIZE {
            return Err(ApiError::BadRequest(format!(
                "attachment too large: {} bytes",
                attachment.bytes.len()
            )));
        }

        let part = reqwest::multipart::Part::bytes(attachment.bytes)
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.file_type)
            .map_err(|e| ApiError::BadRequest(format!("invalid attachment type: {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .text("metadata", metadata.to_string())
            .text("fileName", attachment.file_name)
            .text("fileType", attachment.file_type)
            .part("file", part);
        if let Some(duration) = attachment.duration_secs {
            form = form.text("durationSecs", duration.to_string());
        }

        let resp = self
            .http
            .post(self.url(&format!(
                "/channels/{}/attachments",
                urlencode(channel_arn)
            )))
            .bearer_auth(self.bearer()?)
            .multipart(form)
            .send()
            .await?;

        decode_response(resp).await
    }

    pub async fn edit_message(
        &self,
        channel_arn: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        self.post_empty(
            &format!(
                "/channels/{}/messages/{}",
                urlencode(channel_arn),
                urlencode(message_id)
            ),
            &EditMessageRequest { content },
        )
        .await
    }

    pub async fn delete_message(
        &self,
        channel_arn: &str,
        message_id: &str,
    ) -> Result<(), ApiError> {
        self.delete(&format!(
            "/channels/{}/messages/{}",
            urlencode(channel_arn),
            urlencode(message_id)
        ))
        .await
    }

    // ------------------------------------------------------------------
    // Meetings & relay
    // ------------------------------------------------------------------

    /// Create a video meeting and return its joinable link.
    pub async fn create_meeting(&self) -> Result<RemoteMeeting, ApiError> {
        self.post("/meetings", &serde_json::json!({})).await
    }

    /// Fetch the one-shot signed URL for the live-update WebSocket.
    pub async fn relay_url(&self) -> Result<String, ApiError> {
        let resp: RelayUrlResponse = self.get("/relay/url").await?;
        Ok(resp.url)
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        decode_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!(path, "POST");
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(self.bearer()?)
            .json(body)
            .send()
            .await?;
        decode_response(resp).await
    }

    /// POST whose response carries no meaningful `data`.
    async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        debug!(path, "POST");
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(self.bearer()?)
            .json(body)
            .send()
            .await?;
        decode_empty_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        debug!(path, "DELETE");
        let resp = self
            .http
            .delete(self.url(path))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        decode_empty_response(resp).await
    }
}

/// Consume a response: map non-2xx statuses to errors, then unwrap the
/// `{status, message, data}` envelope.
async fn decode_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status().as_u16();
    let body = resp.text().await?;
    parse_envelope(status, &body)
}

async fn decode_empty_response(resp: reqwest::Response) -> Result<(), ApiError> {
    let status = resp.status().as_u16();
    let body = resp.text().await?;
    parse_empty_envelope(status, &body)
}

/// Map a non-2xx response to an error, preferring the structured server
/// error when the body carries one.
fn check_http_status(status: u16, body: &str) -> Result<(), ApiError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    if let Ok(err) = serde_json::from_str::<ServerErrorBody>(body) {
        return Err(ApiError::Server {
            reason: err.reason,
            message: err.message.unwrap_or_default(),
        });
    }
    Err(ApiError::Status(status))
}

/// The synchronous half of [`decode_response`], split out for testing.
pub(crate) fn parse_envelope<T: DeserializeOwned>(
    status: u16,
    body: &str,
) -> Result<T, ApiError> {
    check_http_status(status, body)?;

    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;

    if envelope.status != "success" {
        return Err(ApiError::Server {
            reason: envelope.status,
            message: envelope.message.unwrap_or_default(),
        });
    }

    envelope
        .data
        .ok_or_else(|| ApiError::Decode("envelope missing data".into()))
}

/// Envelope check for operations whose success carries no `data`.
pub(crate) fn parse_empty_envelope(status: u16, body: &str) -> Result<(), ApiError> {
    check_http_status(status, body)?;

    let envelope: Envelope<serde_json::Value> =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;

    if envelope.status != "success" {
        return Err(ApiError::Server {
            reason: envelope.status,
            message: envelope.message.unwrap_or_default(),
        });
    }
    Ok(())
}

fn urlencode(s: &str) -> String {
    // Percent-encode everything outside the unreserved set.
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_success_envelope() {
        let body = r#"{"status":"success","message":null,"data":{"channelArn":"arn:1","name":"Test"}}"#;
        let channel: RemoteChannel = parse_envelope(200, body).unwrap();
        assert_eq!(channel.channel_arn, "arn:1");
        assert_eq!(channel.name, "Test");
        assert_eq!(channel.is_member, None);
    }

    #[test]
    fn non_2xx_maps_to_status_error() {
        let err = parse_envelope::<RemoteChannel>(503, "gateway busy").unwrap_err();
        assert!(matches!(err, ApiError::Status(503)));
    }

    #[test]
    fn structured_server_error_wins_over_status() {
        let body = r#"{"reason":"channel_full","message":"Channel is at capacity"}"#;
        let err = parse_envelope::<RemoteChannel>(409, body).unwrap_err();
        match err {
            ApiError::Server { reason, message } => {
                assert_eq!(reason, "channel_full");
                assert_eq!(message, "Channel is at capacity");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn envelope_failure_status_maps_to_server_error() {
        let body = r#"{"status":"throttled","message":"slow down","data":null}"#;
        let err = parse_envelope::<Vec<RemoteChannel>>(200, body).unwrap_err();
        assert!(matches!(err, ApiError::Server { .. }));
    }

    #[test]
    fn empty_envelope_accepts_null_data() {
        assert!(parse_empty_envelope(200, r#"{"status":"success","message":null,"data":null}"#)
            .is_ok());
        assert!(parse_empty_envelope(200, r#"{"status":"success"}"#).is_ok());

        let err =
            parse_empty_envelope(200, r#"{"status":"denied","message":"no"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Server { .. }));
    }

    #[test]
    fn schema_mismatch_maps_to_decode_error() {
        let err = parse_envelope::<RemoteChannel>(200, "[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));

        let missing = parse_envelope::<RemoteChannel>(200, r#"{"status":"success"}"#).unwrap_err();
        assert!(matches!(missing, ApiError::Decode(_)));
    }

    #[test]
    fn remote_message_decodes_epoch_millis() {
        let body = r#"{
            "status": "success",
            "message": null,
            "data": [{
                "messageId": "srv-1",
                "channelArn": "arn:1",
                "content": "hi",
                "metadata": "tok-1",
                "kind": "standard",
                "senderId": "user-7",
                "senderName": "Nadia",
                "createdTimestamp": 1700000000123
            }]
        }"#;
        let messages: Vec<RemoteMessage> = parse_envelope(200, body).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].created_timestamp, 1_700_000_000_123);
        assert_eq!(messages[0].last_edited_timestamp, None);
    }

    #[test]
    fn urlencode_escapes_arn_separators() {
        assert_eq!(urlencode("arn:chat/c1"), "arn%3Achat%2Fc1");
        assert_eq!(urlencode("plain-name_1.2~x"), "plain-name_1.2~x");
    }
}
