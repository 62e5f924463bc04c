use crate::{
    api::{attendance, teaching},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;
use std::sync::Arc;

pub type Limiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-peer limiter allowing `requests_per_min` with an equal burst.
pub fn build_limiter(requests_per_min: u32) -> anyhow::Result<Arc<Limiter>> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiter: Arc<Limiter>) {
    // Public routes
    cfg.service(
        web::scope("/auth").service(
            web::resource("/logout")
                .wrap(limiter.clone())
                .route(web::post().to(handlers::logout)),
        ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    .service(web::resource("/records").route(web::get().to(attendance::records)))
                    .service(
                        web::resource("/create-record")
                            .route(web::post().to(attendance::create_record)),
                    )
                    .service(
                        web::resource("/delete-items")
                            .route(web::put().to(attendance::delete_items)),
                    )
                    .service(
                        web::resource("/reset-attendance")
                            .route(web::put().to(attendance::reset_attendance)),
                    )
                    .service(
                        web::resource("/undo-action")
                            .route(web::post().to(attendance::undo_action)),
                    )
                    .service(web::resource("/mark").route(web::post().to(attendance::mark))),
            )
            .service(
                web::scope("/user").service(
                    web::resource("/teaching-details")
                        .route(web::get().to(teaching::teaching_details)),
                ),
            ),
    );
}

// SESSION
//  ├─ POST {prefix}/attendance/create-record  opens the scan window
//  ├─ POST {prefix}/attendance/mark           students scan until expiresAt
//  └─ POST /auth/logout                       revokes the access token
