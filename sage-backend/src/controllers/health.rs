use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(root)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn root() -> impl Responder {
    HttpResponse::Ok().json(json!({"service": "sage-backend", "message": "running"}))
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}
