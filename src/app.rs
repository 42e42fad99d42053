use std::net::SocketAddr;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{auth, resources, state::AppState, tags, users};

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(tags::router())
        .merge(resources::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

/// `*` allows any origin; otherwise only the listed origins, with
/// credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Serves until SIGINT/SIGTERM, then closes the store.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;
    let store = state.store.clone();
    let app = build_app(state);

    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod api_tests {
    use super::*;
    use crate::auth::{claims::Claims, jwt::JwtKeys};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn signup(app: &Router, email: &str) -> (String, String) {
        let (status, body) = send(
            app,
            Method::POST,
            "/users",
            None,
            Some(json!({
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": email,
                "password": "hunter22"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::in_memory());
        let (status, _) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_then_login_issues_token_for_the_user() {
        let state = AppState::in_memory();
        let keys = JwtKeys::from_config(&state.config.jwt);
        let app = build_app(state);

        let (user_id, token) = signup(&app, "a@x.com").await;
        assert_eq!(keys.verify(&token).unwrap().sub, user_id);

        let (status, body) = send(
            &app,
            Method::POST,
            "/users/login",
            None,
            Some(json!({"email": "a@x.com", "password": "hunter22"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], user_id.as_str());
        assert!(body["user"].get("password").is_none());
        let login_token = body["token"].as_str().unwrap();
        assert_eq!(keys.verify(login_token).unwrap().sub, user_id);

        let (status, body) = send(
            &app,
            Method::POST,
            "/users/login",
            None,
            Some(json!({"email": "a@x.com", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");

        let (status, body) = send(
            &app,
            Method::POST,
            "/users/login",
            None,
            Some(json!({"email": "bad", "password": "hunter22"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let app = build_app(AppState::in_memory());
        signup(&app, "a@x.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/users",
            None,
            Some(json!({
                "first_name": "Other",
                "last_name": "Person",
                "email": "a@x.com",
                "password": "pw"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Email already registered");
    }

    #[tokio::test]
    async fn user_endpoints() {
        let app = build_app(AppState::in_memory());
        let (user_id, token) = signup(&app, "a@x.com").await;

        let (status, body) = send(&app, Method::GET, "/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@x.com");

        let (status, _) = send(&app, Method::GET, "/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = send(&app, Method::GET, "/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"].as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/users/{user_id}"),
            Some(&token),
            Some(json!({"first_name": "Augusta"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["first_name"], "Augusta");
        assert_eq!(body["last_name"], "Lovelace");

        let (status, body) = send(&app, Method::GET, "/users/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/users/{user_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // the token outlives its subject
        let (status, _) = send(&app, Method::GET, "/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn article_scenario_and_ownership() {
        let app = build_app(AppState::in_memory());
        let (a_id, a_token) = signup(&app, "a@x.com").await;
        let (_, b_token) = signup(&app, "b@x.com").await;

        let (status, tag) = send(
            &app,
            Method::POST,
            "/tags",
            Some(&a_token),
            Some(json!({"name": "rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let t1 = tag["id"].as_str().unwrap().to_string();

        let (status, res) = send(
            &app,
            Method::POST,
            "/resources",
            Some(&a_token),
            Some(json!({
                "title": "X",
                "description": "Y",
                "type": "article",
                "url": "http://x",
                "tag_ids": [t1]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{res}");
        assert_eq!(res["type"], "article");
        assert_eq!(res["url"], "http://x");
        assert_eq!(res["tags"], json!([{"id": t1, "name": "rust"}]));
        assert_eq!(res["user"]["email"], "a@x.com");
        assert_eq!(res["user"]["id"], a_id.as_str());
        let resource_uri = format!("/resources/{}", res["id"].as_str().unwrap());

        let update = json!({
            "title": "X2",
            "description": "Y",
            "type": "course",
            "author": "Knuth"
        });
        let (status, body) = send(
            &app,
            Method::PUT,
            &resource_uri,
            Some(&b_token),
            Some(update.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
        let (status, _) = send(&app, Method::DELETE, &resource_uri, Some(&b_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, Method::PUT, &resource_uri, Some(&a_token), Some(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "course");
        assert_eq!(body["author"], "Knuth");
        assert_eq!(body["title"], "X2");
        assert!(body.get("url").is_none());
        assert_eq!(body["tags"], json!([]));

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/resources/user/{a_id}"),
            Some(&b_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resources"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::DELETE, &resource_uri, Some(&a_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, &resource_uri, Some(&a_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, tags) = send(&app, Method::GET, "/tags", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tags["tags"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tag_rejects_whole_create() {
        let app = build_app(AppState::in_memory());
        let (_, token) = signup(&app, "a@x.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/resources",
            Some(&token),
            Some(json!({
                "title": "X",
                "description": "Y",
                "type": "book",
                "tag_ids": ["T_missing"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_TAGS");
        assert_eq!(body["detail"], r#"Tags ["T_missing"] do not exist"#);

        let (_, body) = send(&app, Method::GET, "/resources", Some(&token), None).await;
        assert_eq!(body["resources"], json!([]));
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let app = build_app(AppState::in_memory());
        let (_, token) = signup(&app, "a@x.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/resources",
            Some(&token),
            Some(json!({"title": "X", "description": "Y", "type": "video"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            &app,
            Method::POST,
            "/users",
            None,
            Some(json!({"first_name": "A"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expired_and_missing_tokens_are_unauthorized() {
        let state = AppState::in_memory();
        let keys = JwtKeys::from_config(&state.config.jwt);
        let app = build_app(state);
        let (user_id, _) = signup(&app, "a@x.com").await;

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let expired = keys
            .encode_claims(&Claims {
                sub: user_id,
                exp: now - 60,
                iat: now + 365 * 24 * 3600,
            })
            .unwrap();

        let (status, body) = send(&app, Method::GET, "/resources", Some(&expired), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_EXPIRED");

        let (status, body) = send(&app, Method::GET, "/resources", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");

        let (status, _) = send(&app, Method::GET, "/resources", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
