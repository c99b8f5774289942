//! Loading signing keys from a JWKS endpoint.

use jotter_api::auth::fetch_jwks;
use jotter_api::config::{AuthSettings, KeySource};
use jotter_api::TokenVerifier;
use jotter_core::Error;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// RSA public key from RFC 7517 appendix A.1
fn rfc_rsa_jwks() -> serde_json::Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": "2011-04-29",
            "alg": "RS256",
            "use": "sig",
            "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
            "e": "AQAB"
        }]
    })
}

#[tokio::test]
async fn test_fetch_jwks_loads_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rfc_rsa_jwks()))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/.well-known/jwks.json", server.uri());
    let set = fetch_jwks(&reqwest::Client::new(), &url).await.unwrap();

    assert_eq!(set.keys.len(), 1);
    assert!(set.find("2011-04-29").is_some());
}

#[tokio::test]
async fn test_unknown_key_id_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rfc_rsa_jwks()))
        .mount(&server)
        .await;

    let settings = AuthSettings {
        keys: KeySource::Jwks(format!("{}/jwks", server.uri())),
        issuer: None,
        audience: None,
        display_name_claim: "cognito:username".to_string(),
    };
    let verifier = TokenVerifier::from_settings(&settings, &reqwest::Client::new())
        .await
        .unwrap();

    // RS256 header with a kid that is not in the set; signature never checked
    let token = "eyJhbGciOiJSUzI1NiIsImtpZCI6Im1pc3NpbmcifQ.eyJzdWIiOiJ1In0.c2ln";
    let err = verifier.verify(token).unwrap_err();
    assert!(matches!(err, Error::Unauthorized(ref m) if m.contains("missing")));
}

#[tokio::test]
async fn test_jwks_endpoint_failure_is_a_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = fetch_jwks(&reqwest::Client::new(), &server.uri())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_invalid_jwks_document_is_a_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let err = fetch_jwks(&reqwest::Client::new(), &server.uri())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
