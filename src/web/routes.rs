use actix_web::web;

use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(handlers::health))
        .service(
            web::scope("/api/arona")
                .route("/health", web::get().to(handlers::arona_health))
                .route("/chat", web::post().to(handlers::chat)),
        );
}
