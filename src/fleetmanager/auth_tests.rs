// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `auth.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken::new("abc");
        assert_eq!(source.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_ocm_refresh_token_exchange_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=cloud-services"))
            .and(body_string_contains("refresh_token=offline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-1",
                "expires_in": 900
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = ExchangedToken::ocm(
            reqwest::Client::new(),
            &format!("{}/token", server.uri()),
            "offline",
        );

        assert_eq!(source.token().await.unwrap(), "access-1");
        assert_eq!(source.token().await.unwrap(), "access-1");
    }

    #[tokio::test]
    async fn test_token_expiring_within_leeway_is_exchanged_again() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "short-lived",
                "expires_in": TOKEN_EXPIRY_LEEWAY_SECS / 2
            })))
            .expect(2)
            .mount(&server)
            .await;

        let source = ExchangedToken::ocm(
            reqwest::Client::new(),
            &format!("{}/token", server.uri()),
            "offline",
        );

        assert_eq!(source.token().await.unwrap(), "short-lived");
        assert_eq!(source.token().await.unwrap(), "short-lived");
    }

    #[tokio::test]
    async fn test_client_credentials_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=fleetshard"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "sa-token",
                "expires_in": 300
            })))
            .mount(&server)
            .await;

        let source = ExchangedToken::client_credentials(
            reqwest::Client::new(),
            &format!("{}/token", server.uri()),
            "fleetshard",
            "s3cr3t",
        );
        assert_eq!(source.token().await.unwrap(), "sa-token");
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let source = ExchangedToken::ocm(reqwest::Client::new(), &server.uri(), "bad");
        let err = source.token().await.unwrap_err();

        assert!(err.to_string().contains("invalid_grant"));
        assert_eq!(err.kind(), crate::errors::ErrorKind::FatalToTenant);
    }

    #[tokio::test]
    async fn test_unavailable_token_endpoint_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = ExchangedToken::ocm(reqwest::Client::new(), &server.uri(), "offline");
        let err = source.token().await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Retryable);
    }
}
