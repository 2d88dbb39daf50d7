mod flash;
mod handler;
mod registry;
mod route;
mod view;

use std::{error::Error, net::SocketAddr};

use axum_server::tls_rustls::RustlsConfig;
use roombook::{
    domain::booking::{BookingPolicy, BookingService},
    infrastructure::reservation::EventLogReservationRepository,
    RoombookConfig,
};
use tracing::{error, info, Level};

use crate::registry::AppRegistry;

#[tokio::main]
async fn main() {
    match RoombookConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = serve(&config).await {
                error!("アプリケーションエラー: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("アプリケーションエラー: {}", error)
        }
    }
}

async fn serve(config: &RoombookConfig) -> Result<(), Box<dyn Error>> {
    let repository = EventLogReservationRepository::open(&config.storage.path).await?;
    let policy = BookingPolicy::from_config(&config.booking)?;
    let registry = AppRegistry::new(BookingService::new(policy, Box::new(repository)));
    let app = route::build_routers(registry);

    let addr = format!("{}:{}", config.server.host, config.server.port).parse::<SocketAddr>()?;
    match &config.server.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            info!("https://{} で待ち受けます", addr);
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("http://{} で待ち受けます", addr);
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}
