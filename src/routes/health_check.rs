use actix_web::HttpResponse;

/// Liveness probe. Touches neither store, so it answers while Postgres is down.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}
