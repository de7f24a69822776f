use std::{path::Path, time::Duration};

use inbox_core::{
    BotInfo, ClientError, ClientErrorCategory, ConversationId, ConversationSummary,
    EditHistoryEntry, ForwardResult, GroupInfo, MediaBlob, MessageId, MessagePage,
    OutgoingAttachment, decode_api_response,
};
use reqwest::{Client, RequestBuilder, multipart};
use serde::{Deserialize, de::DeserializeOwned, de::IgnoredAny};
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Deserialize)]
struct ForwardResponse {
    #[serde(default)]
    results: Vec<ForwardResult>,
}

#[derive(Debug, Deserialize)]
struct EditHistoryResponse {
    #[serde(default)]
    edit_history: Vec<EditHistoryEntry>,
}

/// REST client for the inbox backend.
#[derive(Debug, Clone)]
pub struct InboxApi {
    http: Client,
    base: Url,
}

impl InboxApi {
    /// `base` may carry a path prefix (`https://host/inbox`); every endpoint
    /// is resolved below it.
    pub fn new(mut base: Url, request_timeout: Duration) -> Result<Self, ClientError> {
        if !base.path().ends_with('/') {
            let prefix = format!("{}/", base.path());
            base.set_path(&prefix);
        }
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| {
                ClientError::new(
                    ClientErrorCategory::Config,
                    "http_client_build_failed",
                    err.to_string(),
                )
            })?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// WebSocket URL of the push channel (`ws(s)://<host>/<prefix>/ws`).
    pub fn push_url(&self) -> Result<Url, ClientError> {
        let mut url = self.endpoint("/ws")?;
        let scheme = if self.base.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme).map_err(|()| {
            ClientError::new(
                ClientErrorCategory::Config,
                "invalid_base_url",
                format!("cannot derive push url from {}", self.base),
            )
        })?;
        Ok(url)
    }

    /// Directory snapshot.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        self.execute(self.http.get(self.endpoint("/api/users")?))
            .await
    }

    /// One page of history, `offset` counted from the newest message.
    pub async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        offset: usize,
        limit: u16,
    ) -> Result<MessagePage, ClientError> {
        let url = self.endpoint(&format!("/api/messages/{conversation_id}"))?;
        let request = self
            .http
            .get(url)
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string())]);
        let page: MessagePage = self.execute(request).await?;
        debug!(
            conversation_id,
            offset,
            received = page.messages.len(),
            has_more = page.has_more,
            "fetched history page"
        );
        Ok(page)
    }

    pub async fn send_text(
        &self,
        conversation_id: ConversationId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), ClientError> {
        self.post_ack(
            "/api/send",
            json!({ "user_id": conversation_id, "text": text, "reply_to": reply_to }),
        )
        .await
    }

    pub async fn upload(&self, attachment: &OutgoingAttachment) -> Result<(), ClientError> {
        let bytes = tokio::fs::read(&attachment.path).await.map_err(|err| {
            ClientError::new(
                ClientErrorCategory::Config,
                "attachment_unreadable",
                format!("{}: {err}", attachment.path.display()),
            )
        })?;
        let part = multipart::Part::bytes(bytes).file_name(upload_file_name(&attachment.path));
        let form = multipart::Form::new()
            .text("user_id", attachment.conversation_id.to_string())
            .text(
                "reply_to",
                attachment
                    .reply_to
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            )
            .text("caption", attachment.caption.clone())
            .part("file", part);

        let request = self.http.post(self.endpoint("/api/upload")?).multipart(form);
        self.execute::<IgnoredAny>(request).await.map(|_| ())
    }

    pub async fn delete_messages(
        &self,
        conversation_id: ConversationId,
        msg_ids: &[MessageId],
        for_everyone: bool,
    ) -> Result<(), ClientError> {
        let request = self.http.delete(self.endpoint("/api/messages")?).json(&json!({
            "user_id": conversation_id,
            "msg_ids": msg_ids,
            "for_everyone": for_everyone,
        }));
        self.execute::<IgnoredAny>(request).await.map(|_| ())
    }

    pub async fn forward(
        &self,
        from: ConversationId,
        to: &[ConversationId],
        msg_ids: &[MessageId],
    ) -> Result<Vec<ForwardResult>, ClientError> {
        let request = self.http.post(self.endpoint("/api/forward")?).json(&json!({
            "from_user_id": from,
            "to_user_ids": to,
            "msg_ids": msg_ids,
        }));
        let response: ForwardResponse = self.execute(request).await?;
        Ok(response.results)
    }

    pub async fn clear_unread(&self, conversation_id: ConversationId) -> Result<(), ClientError> {
        self.post_ack("/api/clear-unread", json!({ "user_id": conversation_id }))
            .await
    }

    /// Set the operator's reaction; the backend removes it when `emoji` is already set.
    pub async fn react(
        &self,
        conversation_id: ConversationId,
        msg_id: MessageId,
        emoji: &str,
    ) -> Result<(), ClientError> {
        self.post_ack(
            "/api/react",
            json!({ "user_id": conversation_id, "msg_id": msg_id, "emoji": emoji }),
        )
        .await
    }

    pub async fn unreact(
        &self,
        conversation_id: ConversationId,
        msg_id: MessageId,
    ) -> Result<(), ClientError> {
        self.post_ack(
            "/api/unreact",
            json!({ "user_id": conversation_id, "msg_id": msg_id }),
        )
        .await
    }

    pub async fn edit_message(
        &self,
        conversation_id: ConversationId,
        msg_id: MessageId,
        text: &str,
    ) -> Result<(), ClientError> {
        self.post_ack(
            "/api/edit-message",
            json!({ "user_id": conversation_id, "msg_id": msg_id, "text": text }),
        )
        .await
    }

    pub async fn edit_history(
        &self,
        conversation_id: ConversationId,
        msg_id: MessageId,
    ) -> Result<Vec<EditHistoryEntry>, ClientError> {
        let url = self.endpoint(&format!("/api/edit-history/{conversation_id}/{msg_id}"))?;
        let response: EditHistoryResponse = self.execute(self.http.get(url)).await?;
        Ok(response.edit_history)
    }

    pub async fn pin(&self, chat_id: ConversationId, msg_id: MessageId) -> Result<(), ClientError> {
        self.post_ack("/api/pin", json!({ "chat_id": chat_id, "msg_id": msg_id }))
            .await
    }

    pub async fn unpin(
        &self,
        chat_id: ConversationId,
        msg_id: MessageId,
    ) -> Result<(), ClientError> {
        self.post_ack("/api/unpin", json!({ "chat_id": chat_id, "msg_id": msg_id }))
            .await
    }

    pub async fn ban(&self, chat_id: ConversationId, user_id: i64) -> Result<(), ClientError> {
        self.post_ack("/api/ban", json!({ "chat_id": chat_id, "user_id": user_id }))
            .await
    }

    pub async fn unban(&self, chat_id: ConversationId, user_id: i64) -> Result<(), ClientError> {
        self.post_ack("/api/unban", json!({ "chat_id": chat_id, "user_id": user_id }))
            .await
    }

    pub async fn block(&self, user_id: ConversationId) -> Result<(), ClientError> {
        self.post_ack("/api/block", json!({ "user_id": user_id }))
            .await
    }

    pub async fn unblock(&self, user_id: ConversationId) -> Result<(), ClientError> {
        self.post_ack("/api/unblock", json!({ "user_id": user_id }))
            .await
    }

    pub async fn leave(&self, chat_id: ConversationId) -> Result<(), ClientError> {
        self.post_ack("/api/leave", json!({ "chat_id": chat_id }))
            .await
    }

    pub async fn group_info(&self, chat_id: ConversationId) -> Result<GroupInfo, ClientError> {
        let url = self.endpoint(&format!("/api/group-info/{chat_id}"))?;
        self.execute(self.http.get(url)).await
    }

    pub async fn bot_info(&self) -> Result<BotInfo, ClientError> {
        self.execute(self.http.get(self.endpoint("/api/bot-info")?))
            .await
    }

    /// Download an attachment by conversation and opaque file token.
    pub async fn media(
        &self,
        conversation_id: ConversationId,
        file_token: &str,
    ) -> Result<MediaBlob, ClientError> {
        let mut url = self.endpoint("/api/media")?;
        url.path_segments_mut()
            .map_err(|()| invalid_base(&self.base))?
            .push(&conversation_id.to_string())
            .push(file_token);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        if !(200..300).contains(&status) {
            return Err(decode_api_response::<IgnoredAny>(status, &bytes)
                .err()
                .unwrap_or_else(|| ClientError::http_status(status, "media request failed")));
        }

        trace!(conversation_id, file_token, size = bytes.len(), "downloaded media");
        Ok(MediaBlob {
            conversation_id,
            file_token: file_token.to_owned(),
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    async fn post_ack(&self, path: &str, body: serde_json::Value) -> Result<(), ClientError> {
        let request = self.http.post(self.endpoint(path)?).json(&body);
        self.execute::<IgnoredAny>(request).await.map(|_| ())
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        decode_api_response(status, &body)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|_| invalid_base(&self.base))
    }
}

fn upload_file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_owned()
}

fn invalid_base(base: &Url) -> ClientError {
    ClientError::new(
        ClientErrorCategory::Config,
        "invalid_base_url",
        format!("{base} cannot be used as a base url"),
    )
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if let Some(status) = err.status() {
        return ClientError::http_status(status.as_u16(), err.to_string());
    }
    if err.is_decode() {
        return ClientError::serialization(err.to_string());
    }
    if err.is_builder() {
        return ClientError::new(
            ClientErrorCategory::Config,
            "invalid_request",
            err.to_string(),
        );
    }
    ClientError::transport(err.to_string())
}
