//! Route-level tests driving the full router, with local axum servers
//! standing in for Apple's validation endpoint and PayPal's REST API.

use axum::{
    body::{Body, Bytes},
    extract::Form,
    http::{header, HeaderMap, Request, StatusCode},
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use applepay_gateway::{
    amount::NoFormulas,
    app,
    config::{
        ButtonConfig, CheckoutConfig, Config, MerchantConfig, PayPalConfig, PayPalEnvironment,
        Processor, SiteConfig,
    },
    tables::{TableDefinition, TableStore},
    AppState, DOMAIN_ASSOCIATION_PATH,
};

// ═══════════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

fn test_config(processor: Processor) -> Config {
    Config {
        site: SiteConfig {
            port: 0,
            base_url: String::new(),
            processor,
            domain_association: "7B227073704964223A2239373943394538".into(),
            tables_path: None,
            upstream_timeout: Some(Duration::from_secs(5)),
            button: ButtonConfig::default(),
        },
        merchant: MerchantConfig {
            merchant_id: "merchant.com.example".into(),
            display_name: "Shop".into(),
            domain_name: "shop.example.com".into(),
            supported_networks: vec!["visa".into(), "masterCard".into()],
            identity_path: PathBuf::from("/nonexistent/merchant_id.p12"),
            identity_password: String::new(),
            validation_hosts: vec![],
            locale: "en-US".into(),
            country_code: "US".into(),
        },
        paypal: PayPalConfig {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            environment: PayPalEnvironment::Sandbox,
            api_base: None,
        },
        checkout: CheckoutConfig {
            table: "orders".into(),
            amount_field: "amount".into(),
            amount_formula: None,
            paid_field: "paid".into(),
            currency: "USD".parse().unwrap(),
            button_view_path: "/view/applepay-button".into(),
            success_url: "/view/thankyou".into(),
            cancel_url: None,
        },
    }
}

fn test_tables() -> TableStore {
    let definitions: Vec<TableDefinition> = serde_json::from_value(json!([{
        "name": "orders",
        "fields": [
            { "name": "amount", "type": "Float" },
            { "name": "paid", "type": "Bool" }
        ],
        "rows": [
            { "id": 7, "amount": 19.99, "paid": false },
            { "id": 8, "amount": null, "paid": false }
        ]
    }]))
    .unwrap();
    TableStore::new(definitions).unwrap()
}

fn build(config: Config) -> (Router, TableStore) {
    let tables = test_tables();
    let state = AppState::from_config(config, tables.clone(), Arc::new(NoFormulas)).unwrap();
    (app(state), tables)
}

/// Serves `router` on an ephemeral local port and returns its base URL.
async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Self-signed PKCS#12 merchant identity written to a temp file.
fn write_identity(password: &str) -> PathBuf {
    use openssl::{
        asn1::Asn1Time,
        bn::BigNum,
        hash::MessageDigest,
        pkcs12::Pkcs12,
        pkey::PKey,
        rsa::Rsa,
        x509::{X509Builder, X509NameBuilder},
    };

    let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "merchant.com.example").unwrap();
    let name = name.build();

    let mut cert = X509Builder::new().unwrap();
    cert.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    cert.set_serial_number(&serial).unwrap();
    cert.set_subject_name(&name).unwrap();
    cert.set_issuer_name(&name).unwrap();
    cert.set_pubkey(&pkey).unwrap();
    let not_before = Asn1Time::days_from_now(0).unwrap();
    let not_after = Asn1Time::days_from_now(1).unwrap();
    cert.set_not_before(&not_before).unwrap();
    cert.set_not_after(&not_after).unwrap();
    cert.sign(&pkey, MessageDigest::sha256()).unwrap();
    let cert = cert.build();

    let mut bundle = Pkcs12::builder();
    bundle.name("merchant");
    bundle.pkey(&pkey);
    bundle.cert(&cert);
    let der = bundle.build2(password).unwrap().to_der().unwrap();

    let path = std::env::temp_dir().join(format!("merchant-{}.p12", Uuid::new_v4()));
    std::fs::write(&path, der).unwrap();
    path
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

fn as_json(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn merchant_session() -> Value {
    json!({
        "epochTimestamp": 1700000000000u64,
        "expiresAt": 1700003600000u64,
        "merchantSessionIdentifier": "SSH2F0A5A2B",
        "nonce": "a1b2c3d4",
        "merchantIdentifier": "8F2C0E0D",
        "domainName": "shop.example.com",
        "displayName": "Shop",
        "signature": "308006092a864886f70d010702a0803080020101"
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN ASSOCIATION
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn domain_association_returns_configured_file() {
    let (app, _) = build(test_config(Processor::Direct));
    let (status, headers, body) = send(&app, get(DOMAIN_ASSOCIATION_PATH)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(&body[..], b"7B227073704964223A2239373943394538");
}

#[tokio::test]
async fn domain_association_is_empty_when_unset() {
    let mut config = test_config(Processor::PayPal);
    config.site.domain_association = String::new();
    let (app, _) = build(config);
    let (status, headers, body) = send(&app, get(DOMAIN_ASSOCIATION_PATH)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert!(body.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERCHANT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

fn apple_upstream(status: StatusCode) -> Router {
    Router::new().route(
        "/paymentservices/startSession",
        post(move |Json(body): Json<Value>| async move {
            let expected = body["merchantIdentifier"] == "merchant.com.example"
                && body["domainName"] == "shop.example.com"
                && body["displayName"] == "Shop";
            if !expected {
                return (StatusCode::BAD_REQUEST, Json(json!({ "unexpected": body })));
            }
            if status == StatusCode::OK {
                (StatusCode::OK, Json(merchant_session()))
            } else {
                (status, Json(json!({ "statusMessage": "upstream secret detail" })))
            }
        }),
    )
}

#[tokio::test]
async fn validation_forwards_merchant_session_unchanged() {
    let upstream = spawn_upstream(apple_upstream(StatusCode::OK)).await;
    let password = "hunter2";
    let mut config = test_config(Processor::Direct);
    config.merchant.identity_path = write_identity(password);
    config.merchant.identity_password = password.into();
    let (app, _) = build(config);

    let request = post_json(
        "/applepay/validate",
        json!({ "validationURL": format!("{}/paymentservices/startSession", upstream) }),
    );
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), merchant_session());
}

#[tokio::test]
async fn validation_failure_does_not_leak_upstream_body() {
    let upstream = spawn_upstream(apple_upstream(StatusCode::FORBIDDEN)).await;
    let mut config = test_config(Processor::Direct);
    config.merchant.identity_path = write_identity("");
    let (app, _) = build(config);

    let request = post_json(
        "/applepay/validate",
        json!({ "validationURL": format!("{}/paymentservices/startSession", upstream) }),
    );
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body), json!({ "error": "Merchant validation failed" }));
}

#[tokio::test]
async fn validation_without_identity_file_fails() {
    let upstream = spawn_upstream(apple_upstream(StatusCode::OK)).await;
    let (app, _) = build(test_config(Processor::Direct));

    let request = post_json(
        "/applepay/validate",
        json!({ "validationURL": format!("{}/paymentservices/startSession", upstream) }),
    );
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body)["error"], "Merchant validation failed");
}

#[tokio::test]
async fn validation_with_wrong_identity_password_fails() {
    let upstream = spawn_upstream(apple_upstream(StatusCode::OK)).await;
    let mut config = test_config(Processor::Direct);
    config.merchant.identity_path = write_identity("right");
    config.merchant.identity_password = "wrong".into();
    let (app, _) = build(config);

    let request = post_json(
        "/applepay/validate",
        json!({ "validationURL": format!("{}/paymentservices/startSession", upstream) }),
    );
    let (status, _, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn validation_rejects_foreign_hosts() {
    let mut config = test_config(Processor::Direct);
    config.merchant.validation_hosts = vec!["apple.com".into()];
    let (app, _) = build(config);

    let request = post_json(
        "/applepay/validate",
        json!({ "validationURL": "https://attacker.example/paymentservices/startSession" }),
    );
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(as_json(&body)["error"]
        .as_str()
        .unwrap()
        .contains("attacker.example"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYPAL ORDERS
// ═══════════════════════════════════════════════════════════════════════════════

fn paypal_upstream(token_status: StatusCode, orders_status: StatusCode) -> Router {
    let expected_basic = format!("Basic {}", STANDARD.encode("client-123:secret"));

    Router::new()
        .route(
            "/v1/oauth2/token",
            post(
                move |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                    let authorized = headers[header::AUTHORIZATION] == expected_basic.as_str();
                    let grant = form.get("grant_type").map(String::as_str);
                    if token_status != StatusCode::OK
                        || !authorized
                        || grant != Some("client_credentials")
                    {
                        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" })));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({ "access_token": "A21AAtoken", "expires_in": 32400 })),
                    )
                },
            ),
        )
        .route(
            "/v2/checkout/orders",
            post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
                if headers[header::AUTHORIZATION] != "Bearer A21AAtoken"
                    || !headers.contains_key("paypal-request-id")
                {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "name": "AUTHENTICATION_FAILURE" })));
                }
                if orders_status != StatusCode::CREATED {
                    return (orders_status, Json(json!({ "name": "UNPROCESSABLE_ENTITY" })));
                }
                let unit = &body["purchase_units"][0]["amount"];
                (
                    StatusCode::CREATED,
                    Json(json!({
                        "id": "5O190127TN364715T",
                        "status": "CREATED",
                        "intent": body["intent"],
                        "echo": { "currency_code": unit["currency_code"], "value": unit["value"] }
                    })),
                )
            }),
        )
}

async fn paypal_app(token_status: StatusCode, orders_status: StatusCode) -> Router {
    let upstream = spawn_upstream(paypal_upstream(token_status, orders_status)).await;
    let mut config = test_config(Processor::PayPal);
    config.paypal.api_base = Some(upstream);
    build(config).0
}

#[tokio::test]
async fn create_order_returns_paypal_order() {
    let app = paypal_app(StatusCode::OK, StatusCode::CREATED).await;

    let request = post_json(
        "/applepay/create_order",
        json!({ "currency": "usd", "amount": "19.99" }),
    );
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    let order = as_json(&body);
    assert_eq!(order["id"], "5O190127TN364715T");
    assert_eq!(order["intent"], "CAPTURE");
    assert_eq!(order["echo"], json!({ "currency_code": "USD", "value": "19.99" }));
}

#[tokio::test]
async fn create_order_token_failure_is_500() {
    let app = paypal_app(StatusCode::UNAUTHORIZED, StatusCode::CREATED).await;

    let request = post_json(
        "/applepay/create_order",
        json!({ "currency": "USD", "amount": 10 }),
    );
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body), json!({ "error": "Order creation failed" }));
}

#[tokio::test]
async fn create_order_upstream_failure_is_500() {
    let app = paypal_app(StatusCode::OK, StatusCode::UNPROCESSABLE_ENTITY).await;

    let request = post_json(
        "/applepay/create_order",
        json!({ "currency": "USD", "amount": "10.00" }),
    );
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body), json!({ "error": "Order creation failed" }));
}

#[tokio::test]
async fn create_order_rejects_invalid_currency() {
    let app = paypal_app(StatusCode::OK, StatusCode::CREATED).await;

    let request = post_json(
        "/applepay/create_order",
        json!({ "currency": "DOLLARS", "amount": "10.00" }),
    );
    let (status, _, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn diagnostics_echo_configuration() {
    let (app, _) = build(test_config(Processor::PayPal));
    let expected = json!({
        "message": "Test request successful",
        "client_id": "client-123",
        "environment": "sandbox"
    });

    let (status, _, body) = send(
        &app,
        post_json("/applepay/test_req", json!({ "client_id": "client-123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), expected);

    let (status, _, body) = send(&app, get("/test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), expected);
}

#[tokio::test]
async fn variants_only_mount_their_own_routes() {
    let (direct, _) = build(test_config(Processor::Direct));
    let (status, _, _) = send(
        &direct,
        post_json("/applepay/create_order", json!({ "currency": "USD", "amount": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (paypal, _) = build(test_config(Processor::PayPal));
    let (status, _, _) = send(
        &paypal,
        post_json("/applepay/validate", json!({ "validationURL": "https://apple.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKOUT FLOW
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn checkout_marks_row_paid_and_redirects() {
    let (app, tables) = build(test_config(Processor::Direct));

    let (status, _, body) = send(&app, post_json("/applepay/initiate", json!({ "row_id": 7 }))).await;
    assert_eq!(status, StatusCode::OK);
    let initiated = as_json(&body);
    assert_eq!(
        initiated["goto"],
        "/view/applepay-button?amount=19.99&currency=USD&row_id=7"
    );
    assert_eq!(initiated["amount"], "19.99");

    let (status, _, body) = send(
        &app,
        post_json(
            "/applepay/process",
            json!({
                "token": { "paymentData": { "version": "EC_v1" } },
                "row_id": "7",
                "amount": "19.99",
                "currency": "USD"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "status": "success", "row_id": "7" }));

    let (status, headers, _) = send(&app, get("/applepay/callback?status=success&row_id=7")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/view/thankyou?row_id=7");
    assert_eq!(tables.get("orders", "7").await.unwrap()["paid"], json!(true));
}

#[tokio::test]
async fn failed_callback_leaves_row_unpaid() {
    let (app, tables) = build(test_config(Processor::Direct));

    let (status, _, _) = send(&app, get("/applepay/callback?status=failure&row_id=7")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(tables.get("orders", "7").await.unwrap()["paid"], json!(false));
}

#[tokio::test]
async fn failed_callback_redirects_to_cancel_url() {
    let mut config = test_config(Processor::Direct);
    config.checkout.cancel_url = Some("/view/cart".into());
    let (app, _) = build(config);

    let (status, headers, _) = send(&app, get("/applepay/callback?status=failure&row_id=7")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/view/cart?row_id=7");
}

#[tokio::test]
async fn initiate_reports_missing_rows_and_amounts() {
    let (app, _) = build(test_config(Processor::Direct));

    let (status, _, _) = send(&app, post_json("/applepay/initiate", json!({ "row_id": 99 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, post_json("/applepay/initiate", json!({ "row_id": 8 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn initiate_without_formula_evaluator_fails() {
    let mut config = test_config(Processor::Direct);
    config.checkout.amount_field = "Formula".into();
    config.checkout.amount_formula = Some("amount".into());
    let (app, tables) = build(config);

    let (status, _, body) = send(&app, post_json("/applepay/initiate", json!({ "row_id": 7 }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body), json!({ "error": "Checkout failed" }));
    assert_eq!(tables.get("orders", "7").await.unwrap()["paid"], json!(false));
}

#[tokio::test]
async fn process_rejects_negative_amounts() {
    let (app, _) = build(test_config(Processor::Direct));

    let (status, _, _) = send(
        &app,
        post_json(
            "/applepay/process",
            json!({ "token": {}, "row_id": 7, "amount": -5, "currency": "USD" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUTTON VIEW
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn button_view_renders_direct_page() {
    let (app, _) = build(test_config(Processor::Direct));

    let (status, headers, body) = send(&app, get("/view/applepay-button?amount=19.99&row_id=7")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let page = String::from_utf8(body.to_vec()).unwrap();
    assert!(page.contains("id=\"applepay-config\""));
    assert!(page.contains("\"merchant_id\":\"merchant.com.example\""));
    assert!(page.contains("\"amount\":\"19.99\""));
    assert!(page.contains("/applepay/applepay.js"));

    let (status, _, _) = send(&app, get("/view/applepay-button")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn button_view_requires_row_id() {
    let (app, _) = build(test_config(Processor::Direct));

    let (status, _, body) = send(&app, get("/view/applepay-button?amount=19.99")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(as_json(&body), json!({ "error": "row_id is required" }));
}

#[tokio::test]
async fn button_view_escapes_row_id_attribute() {
    let (app, _) = build(test_config(Processor::Direct));

    let (status, _, body) = send(
        &app,
        get("/view/applepay-button?amount=19.99&row_id=%22%3E%3Cscript%3E"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(body.to_vec()).unwrap();
    assert!(page.contains("data-row-id=\"&quot;&gt;&lt;script&gt;\""));
    assert!(!page.contains("\"><script>"));
}

#[tokio::test]
async fn client_scripts_are_served() {
    let (app, _) = build(test_config(Processor::Direct));

    let (status, headers, body) = send(&app, get("/applepay/applepay.js")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");
    assert!(String::from_utf8_lossy(&body).contains("/applepay/validate"));
}
