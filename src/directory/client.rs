use log::{error, info};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::core::credentials::{CredentialsError, TokenSource};

pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum IamError {
    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IAM API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub unique_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub oauth2_client_id: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateServiceAccountRequest<'a> {
    account_id: &'a str,
    service_account: ServiceAccountFields<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceAccountFields<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct ServiceAccountClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: TokenSource,
}

impl ServiceAccountClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Creates `name` in `project_id` and reports the result on `w`.
    ///
    /// An account that already exists comes back as `IamError::Api` with
    /// status 409.
    pub async fn create_service_account<W: Write>(
        &self,
        w: &mut W,
        project_id: &str,
        name: &str,
        display_name: &str,
    ) -> Result<ServiceAccount, IamError> {
        let url = format!(
            "{}/v1/projects/{}/serviceAccounts",
            self.endpoint, project_id
        );
        let body = CreateServiceAccountRequest {
            account_id: name,
            service_account: ServiceAccountFields { display_name },
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(token) = self.tokens.token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            error!(
                "Creating service account {} in {} failed: {} {}",
                name, project_id, status, message
            );
            return Err(IamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let account: ServiceAccount = response.json().await?;
        info!("Created service account {}", account.email);
        writeln!(w, "Created service account: {:?}", account)?;
        Ok(account)
    }
}
