use clap::Parser;
use dotenvy::dotenv;
use std::time::Duration;

use taskboard::core::credentials::TokenSource;
use taskboard::directory::{ServiceAccountClient, DEFAULT_IAM_ENDPOINT};

#[derive(Debug, Parser)]
#[command(name = "create-service-account")]
#[command(about = "Create a Google Cloud service account")]
struct Args {
    /// Project that will own the account
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
    project: String,

    /// Account id, the part before `@` in the account email
    #[arg(long, env = "SERVICE_ACCOUNT_NAME")]
    name: String,

    #[arg(long, env = "SERVICE_ACCOUNT_DISPLAY_NAME", default_value = "")]
    display_name: String,

    #[arg(long, env = "IAM_ENDPOINT", default_value = DEFAULT_IAM_ENDPOINT)]
    endpoint: String,

    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let tokens = TokenSource::from_access_token(http.clone(), args.access_token);
    let client = ServiceAccountClient::new(http, args.endpoint, tokens);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    client
        .create_service_account(&mut out, &args.project, &args.name, &args.display_name)
        .await?;
    Ok(())
}
