use actix_web::{error::JsonPayloadError, web, HttpRequest};

use crate::{
    errors::AppError,
    handlers::{
        media::{delete_media, media_usage},
        system::{health_check, home},
    },
};

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::InvalidInput(format!("JSON payload error: {}", err)).into()
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler));

    cfg.service(home)
        .service(health_check)
        .service(delete_media)
        .service(media_usage);
}
