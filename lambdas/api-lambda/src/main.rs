use haul_atoms::store::DynamoStore;
use haul_shared::config::AppConfig;
use haul_shared::identity::CognitoIdentityProvider;
use haul_shared::AppState;
use lambda_http::{run, service_fn, Error};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();

    let config = AppConfig::from_env()?;
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let store = DynamoStore::new(
        aws_sdk_dynamodb::Client::new(&aws),
        config.table_name.clone(),
    );
    let identity = CognitoIdentityProvider::new(
        aws_sdk_cognitoidentityprovider::Client::new(&aws),
        config.cognito_client_id.clone(),
        config.cognito_client_secret.clone(),
        config.cognito_user_pool_id.clone(),
    );
    tracing::info!("Starting admin API on table {}", config.table_name);

    let state = Arc::new(AppState::new(Arc::new(store), Arc::new(identity), config));

    run(service_fn(move |event| {
        let state = state.clone();
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
