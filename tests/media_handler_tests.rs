
use std::{collections::HashMap, net::TcpListener};

use actix_web::{http::StatusCode, test, web, App, HttpRequest, HttpResponse, HttpServer};
use family_album::{
    date_grouping::DateGroupingEngine,
    errors::MediaError,
    media::{
        CloudinaryAdmin, CloudinaryUploader, MediaFile, MediaKind, MediaProxyClient, MediaRemover,
        MediaUploader, StorageUsage,
    },
    routes::configure_routes,
    settings::CloudinaryConfig,
    AppState,
};
use serde_json::{json, Value};
use test_utils::*;

async fn fake_destroy(
    path: web::Path<(String, String)>,
    query: web::Query<HashMap<String, String>>,
    req: HttpRequest,
) -> HttpResponse {
    let (_, kind) = path.into_inner();
    if req.headers().get("authorization").is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let public_id = query.get("public_ids[]").cloned().unwrap_or_default();
    if public_id == "forbidden" {
        return HttpResponse::Unauthorized().json(json!({ "error": { "message": "Invalid credentials" } }));
    }
    let mut deleted = serde_json::Map::new();
    deleted.insert(public_id, Value::from("deleted"));
    HttpResponse::Ok().json(json!({
        "deleted": deleted,
        "resourceType": kind,
        "invalidate": query.get("invalidate"),
    }))
}

async fn fake_usage() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "plan": "Free", "storage": { "usage": 123, "limit": 1000 } }))
}

async fn fake_upload(path: web::Path<(String, String)>, _body: web::Bytes) -> HttpResponse {
    let (cloud, kind) = path.into_inner();
    if cloud == "broken" {
        return HttpResponse::BadRequest().json(json!({ "error": { "message": "Upload preset not found" } }));
    }
    HttpResponse::Ok().json(json!({
        "secure_url": format!("https://res.cloudinary.com/{cloud}/{kind}/upload/v1/2024/03/15/cake.jpg"),
    }))
}

/// Stands in for the CDN's upload and Admin APIs.
fn spawn_fake_cdn() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let server = HttpServer::new(|| {
        App::new()
            .route("/{cloud}/resources/{kind}/upload", web::delete().to(fake_destroy))
            .route("/{cloud}/usage", web::get().to(fake_usage))
            .route("/{cloud}/{kind}/upload", web::post().to(fake_upload))
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to listen")
    .run();
    actix_rt::spawn(server);
    format!("http://127.0.0.1:{}", port)
}

fn cdn_config(endpoint: &str) -> CloudinaryConfig {
    CloudinaryConfig {
        cloud_name: "demo".to_string(),
        api_key: Some("key".to_string()),
        api_secret: Some("secret".to_string()),
        upload_endpoint: endpoint.to_string(),
        admin_endpoint: endpoint.to_string(),
        ..Default::default()
    }
}

fn app_state(media_admin: Option<CloudinaryAdmin>) -> web::Data<AppState> {
    let engine = DateGroupingEngine::new(key("2023-06-26"));
    web::Data::new(AppState::new(local_gateway(), engine, media_admin))
}

/// Runs the media endpoints on a real port, for clients that speak HTTP.
fn spawn_app(state: web::Data<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure_routes))
        .workers(1)
        .listen(listener)
        .expect("Failed to listen")
        .run();
    actix_rt::spawn(server);
    format!("http://127.0.0.1:{}", port)
}

#[actix_rt::test]
async fn health_reports_local_backend() {
    let app = test::init_service(App::new().app_data(app_state(None)).configure(configure_routes)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["epoch"], "2023-06-26");
    assert_eq!(body["storage"]["backend"], "local");
    assert_eq!(body["storage"]["state"], "local_only");
    assert_eq!(body["media_admin"], "not configured");
}

#[actix_rt::test]
async fn delete_without_credentials_is_a_no_op() {
    let app = test::init_service(App::new().app_data(app_state(None)).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/delete-cloudinary")
        .set_json(json!({ "publicId": "2024/03/15/cake" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({ "ok": true }));

    let req = test::TestRequest::post().uri("/delete-cloudinary").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({ "ok": true }));
}

#[actix_rt::test]
async fn usage_without_credentials_is_zero() {
    let app = test::init_service(App::new().app_data(app_state(None)).configure(configure_routes)).await;

    let req = test::TestRequest::get().uri("/cloudinary-usage").to_request();
    let usage: StorageUsage = test::call_and_read_body_json(&app, req).await;
    assert_eq!(usage, StorageUsage { usage: 0, limit: 0 });
}

#[actix_rt::test]
async fn delete_requires_public_id() {
    let admin = CloudinaryAdmin::from_config(&cdn_config("http://127.0.0.1:1"));
    let app = test::init_service(App::new().app_data(app_state(admin)).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/delete-cloudinary")
        .set_json(json!({ "resourceType": "video" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test::read_body(resp).await, "publicId required");
}

#[actix_rt::test]
async fn malformed_delete_body_is_a_server_error() {
    let admin = CloudinaryAdmin::from_config(&cdn_config("http://127.0.0.1:1"));
    let app = test::init_service(App::new().app_data(app_state(admin)).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/delete-cloudinary")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_rt::test]
async fn delete_destroys_through_admin_api() {
    let cdn = spawn_fake_cdn();
    let admin = CloudinaryAdmin::from_config(&cdn_config(&cdn));
    let app = test::init_service(App::new().app_data(app_state(admin)).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/delete-cloudinary")
        .set_json(json!({ "publicId": "2024/03/15/clip", "resourceType": "video" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["deleted"]["2024/03/15/clip"], "deleted");
    assert_eq!(body["resourceType"], "video");
    assert_eq!(body["invalidate"], "true");
}

#[actix_rt::test]
async fn delete_defaults_to_image_resources() {
    let cdn = spawn_fake_cdn();
    let admin = CloudinaryAdmin::from_config(&cdn_config(&cdn));
    let app = test::init_service(App::new().app_data(app_state(admin)).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/delete-cloudinary")
        .set_json(json!({ "publicId": "cake" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["resourceType"], "image");
}

#[actix_rt::test]
async fn rejected_destroy_surfaces_error() {
    let cdn = spawn_fake_cdn();
    let admin = CloudinaryAdmin::from_config(&cdn_config(&cdn));
    let app = test::init_service(App::new().app_data(app_state(admin)).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/delete-cloudinary")
        .set_json(json!({ "publicId": "forbidden" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid credentials"));
}

#[actix_rt::test]
async fn usage_reads_storage_from_admin_api() {
    let cdn = spawn_fake_cdn();
    let admin = CloudinaryAdmin::from_config(&cdn_config(&cdn));
    let app = test::init_service(App::new().app_data(app_state(admin)).configure(configure_routes)).await;

    let req = test::TestRequest::get().uri("/cloudinary-usage").to_request();
    let usage: StorageUsage = test::call_and_read_body_json(&app, req).await;
    assert_eq!(usage, StorageUsage { usage: 123, limit: 1000 });
}

#[actix_rt::test]
async fn proxy_client_talks_to_media_endpoints() {
    let cdn = spawn_fake_cdn();
    let base = spawn_app(app_state(CloudinaryAdmin::from_config(&cdn_config(&cdn))));
    let proxy = MediaProxyClient::new(format!("{}/", base));

    assert_eq!(proxy.usage().await.unwrap(), StorageUsage { usage: 123, limit: 1000 });
    proxy.delete("2024/03/15/cake", MediaKind::Image).await.unwrap();

    let err = proxy.delete("forbidden", MediaKind::Image).await.unwrap_err();
    assert!(matches!(err, MediaError::Rejected(_)));
}

#[actix_rt::test]
async fn uploader_returns_secure_url() {
    let cdn = spawn_fake_cdn();
    let uploader = CloudinaryUploader::new(&cdn_config(&cdn));
    let file = MediaFile {
        file_name: "cake.jpg".to_string(),
        mime_type: Some("image/jpeg".to_string()),
        bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
        modified_at: None,
    };

    assert_eq!(uploader.upload_url(MediaKind::Video), format!("{}/demo/video/upload", cdn));
    let url = uploader.upload(&file, MediaKind::Image, "2024/03/15").await.unwrap();
    assert_eq!(url, "https://res.cloudinary.com/demo/image/upload/v1/2024/03/15/cake.jpg");
}

#[actix_rt::test]
async fn uploader_reports_cdn_rejection() {
    let cdn = spawn_fake_cdn();
    let config = CloudinaryConfig { cloud_name: "broken".to_string(), ..cdn_config(&cdn) };
    let uploader = CloudinaryUploader::new(&config);
    let file = MediaFile {
        file_name: "cake.jpg".to_string(),
        mime_type: None,
        bytes: vec![1, 2, 3],
        modified_at: None,
    };

    match uploader.upload(&file, MediaKind::Image, "2024/03/15").await {
        Err(MediaError::Rejected(reason)) => assert_eq!(reason, "Upload preset not found"),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[actix_rt::test]
async fn uploader_without_cloud_name_is_unconfigured() {
    let uploader = CloudinaryUploader::new(&CloudinaryConfig::default());
    let file = MediaFile {
        file_name: "a.png".to_string(),
        mime_type: None,
        bytes: vec![1],
        modified_at: None,
    };
    let err = uploader.upload(&file, MediaKind::Image, "x").await.unwrap_err();
    assert!(matches!(err, MediaError::MissingCredentials));
}
