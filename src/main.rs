use anyhow::Result;
use tracing_subscriber::prelude::*;

use podcast_service::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::new()?;
    sqlx::migrate!().run(&app_state.pool).await?;

    podcast_service::serve(app_state).await?;
    Ok(())
}
