use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::info;

use crate::handlers::{self, AppState};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/")
            .route(web::get().to(handlers::index))
            .route(web::post().to(handlers::compare)),
    )
    .service(web::resource("/uploads/{filename}").route(web::get().to(handlers::uploaded_file)))
    .service(web::resource("/api/compare").route(web::post().to(handlers::api_compare)))
    .service(web::resource("/health").route(web::get().to(handlers::health)));
}

pub async fn run(state: web::Data<AppState>) -> std::io::Result<()> {
    let bind = state.config.bind.clone();
    info!("Server running at http://{bind}");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes)
    })
    .bind(bind)?
    .run()
    .await
}
