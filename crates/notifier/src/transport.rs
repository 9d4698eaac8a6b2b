//! Push-delivery transport.
//!
//! The transport only moves bytes: it encrypts and signs a message for one
//! subscription, sends it, and reports the push service's HTTP status. Deciding
//! what that status means is left to [`crate::delivery::DeliveryClient`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessage,
    WebPushMessageBuilder, request_builder,
};

use chexmix_common::types::Subscription;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The message could not be built for this subscription (bad keys or endpoint).
    #[error("cannot build push message: {0}")]
    Encryption(String),

    /// The push service could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// No response within the delivery timeout.
    #[error("no response within {0}ms")]
    Timeout(u128),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Send `payload` to the subscription's endpoint and return the push service's status.
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &[u8],
        ttl_seconds: u32,
    ) -> Result<StatusCode, TransportError>;
}

/// Web Push (RFC 8030) transport with aes128gcm payload encryption and VAPID auth.
pub struct WebPushTransport {
    http: reqwest::Client,
    timeout: Duration,
    vapid_private_key: String,
    vapid_subject: String,
}

impl WebPushTransport {
    pub fn new(
        vapid_private_key: impl Into<String>,
        vapid_subject: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            timeout,
            vapid_private_key: vapid_private_key.into(),
            vapid_subject: vapid_subject.into(),
        })
    }

    fn build_message(
        &self,
        subscription: &Subscription,
        payload: &[u8],
        ttl_seconds: u32,
    ) -> Result<WebPushMessage, web_push::WebPushError> {
        let info = SubscriptionInfo::new(
            &subscription.endpoint,
            &subscription.keys.p256dh,
            &subscription.keys.auth,
        );

        let mut signature = VapidSignatureBuilder::from_base64(
            &self.vapid_private_key,
            web_push::URL_SAFE_NO_PAD,
            &info,
        )?;
        signature.add_claim("sub", self.vapid_subject.as_str());
        let signature = signature.build()?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_ttl(ttl_seconds);
        builder.set_vapid_signature(signature);
        builder.build()
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &[u8],
        ttl_seconds: u32,
    ) -> Result<StatusCode, TransportError> {
        let message = self
            .build_message(subscription, payload, ttl_seconds)
            .map_err(|e| TransportError::Encryption(e.to_string()))?;

        let (parts, body) = request_builder::build_request::<Vec<u8>>(message).into_parts();

        let mut request = self.http.post(parts.uri.to_string()).body(body);
        for (name, value) in parts.headers.iter() {
            request = request.header(name.as_str(), value.as_bytes());
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout.as_millis())
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        Ok(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Key material from the RFC 8291 worked example
    const VAPID_PRIVATE_KEY: &str = "yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw";
    const P256DH: &str =
        "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4";
    const AUTH: &str = "BTBZMqHH6r4Tts7J_aSIgg";

    /// Accept one request, answer `410 Gone`, and hand back the lowercased
    /// request head plus the body length.
    async fn serve_once_gone(listener: TcpListener) -> (String, usize) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];

        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            request.extend_from_slice(&chunk[..n]);
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
        let content_length: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map(|v| v.trim().parse().unwrap())
            .unwrap_or(0);

        while request.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body");
            request.extend_from_slice(&chunk[..n]);
        }

        socket
            .write_all(b"HTTP/1.1 410 Gone\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        (head, content_length)
    }

    #[tokio::test]
    async fn test_encrypted_message_reaches_push_service() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = tokio::spawn(serve_once_gone(listener));

        let transport = WebPushTransport::new(
            VAPID_PRIVATE_KEY,
            "mailto:test@example.com",
            Duration::from_secs(5),
        )
        .unwrap();
        let sub = Subscription::new(format!("http://{addr}/push/abc123"), P256DH, AUTH);

        let status = transport
            .send(&sub, br#"{"title":"Hello"}"#, 60)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::GONE);

        let (head, body_len) = service.await.unwrap();
        assert!(head.starts_with("post /push/abc123 "), "{head}");
        assert!(head.contains("content-encoding: aes128gcm"), "{head}");
        assert!(head.contains("ttl: 60"), "{head}");
        assert!(head.contains("authorization: vapid t="), "{head}");
        // aes128gcm header alone is 86 bytes
        assert!(body_len > 86, "body was {body_len} bytes");
    }

    #[tokio::test]
    async fn test_unusable_keys_fail_before_network() {
        let transport =
            WebPushTransport::new("not-a-key", "mailto:test@example.com", Duration::from_secs(1))
                .unwrap();
        let sub = Subscription::new("https://push.example/abc123", "bad", "bad");

        let err = transport.send(&sub, b"{}", 60).await.unwrap_err();
        assert!(matches!(err, TransportError::Encryption(_)));
    }
}
