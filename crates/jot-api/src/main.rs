use jot_api::{app_router, ApiConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jot_api=info".parse()?)
                .add_directive("jot_core=info".parse()?),
        )
        .init();

    let config = ApiConfig::from_env()?;
    tracing::info!("Starting jot-api with config: {:?}", config);

    let state = AppState::from_config(&config);
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("jot-api listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
