use actix_web::{get, post, web, HttpResponse, Responder};
use serde_json::json;

use crate::{
    infrastructure::media::{proxy::DeleteMediaRequest, MediaKind, StorageUsage},
    AppState,
};

/// Destroys a CDN asset. Without admin credentials this is a successful
/// no-op so clients in local setups can still delete records.
#[post("/delete-cloudinary")]
#[tracing::instrument(skip(state, body))]
pub async fn delete_media(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let Some(admin) = &state.media_admin else {
        return HttpResponse::Ok().json(json!({ "ok": true }));
    };

    let raw: &[u8] = if body.is_empty() { b"{}" } else { &body };
    let request: DeleteMediaRequest = match serde_json::from_slice(raw) {
        Ok(request) => request,
        Err(e) => return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    };

    let Some(public_id) = request.public_id.filter(|id| !id.is_empty()) else {
        return HttpResponse::BadRequest().body("publicId required");
    };
    let kind = request.resource_type.unwrap_or(MediaKind::Image);

    match admin.destroy(&public_id, kind).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            tracing::error!("CDN delete of {} failed: {}", public_id, e);
            HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    }
}

#[get("/cloudinary-usage")]
pub async fn media_usage(state: web::Data<AppState>) -> impl Responder {
    let Some(admin) = &state.media_admin else {
        return HttpResponse::Ok().json(StorageUsage::default());
    };

    match admin.usage().await {
        Ok(usage) => HttpResponse::Ok().json(usage),
        Err(e) => {
            tracing::error!("CDN usage lookup failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    }
}
