use crate::core::activity::{
    InvestmentTransaction, ItemStatus, ProviderApiError, Security, Stream, Transaction,
    null_as_default,
};
use crate::core::config::{EnvironmentConfig, ItemConfig};
use crate::core::provider::{
    ActivityProvider, InvestmentsPage, PageQuery, ProviderError, TransactionsPage,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

const ITEM_GET_ENDPOINT: &str = "item/get";
const TRANSACTIONS_ENDPOINT: &str = "transactions/get";
const INVESTMENTS_ENDPOINT: &str = "investments/transactions/get";

pub struct PlaidClient {
    base_url: String,
    client_id: String,
    secret: String,
    http: reqwest::Client,
}

impl PlaidClient {
    /// Client for `https://{environment}.plaid.com`, or the environment's
    /// `base_url` override.
    pub fn new(environment: &str, config: &EnvironmentConfig) -> anyhow::Result<Self> {
        let base_url = match &config.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{environment}.plaid.com"),
        };
        let http = reqwest::Client::builder()
            .user_agent(concat!("plaid2csv/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(PlaidClient {
            base_url,
            client_id: config.client_id.clone(),
            secret: config.secret.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn credentials<'a>(&'a self, item: &'a ItemConfig) -> BasicRequest<'a> {
        BasicRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            access_token: &item.token,
        }
    }

    async fn post<Req, Res>(&self, endpoint: &str, request: &Req) -> Result<Res, ProviderError>
    where
        Req: Serialize + ?Sized + Sync,
        Res: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("Requesting {}", url);

        let transport = |source| ProviderError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            if status == StatusCode::BAD_REQUEST {
                let body = response.text().await.map_err(transport)?;
                error!(endpoint, body = %body, "API error");
            }
            return Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: status.to_string(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|source| ProviderError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

fn check_item_error(endpoint: &str, item: ItemEnvelope) -> Result<String, ProviderError> {
    if item.error.is_populated() {
        return Err(ProviderError::Api {
            endpoint: endpoint.to_string(),
            error: item.error,
        });
    }
    Ok(item.item_id)
}

#[derive(Debug, Serialize)]
struct BasicRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
}

#[derive(Debug, Serialize)]
struct TransactionsRequest<'a> {
    #[serde(flatten)]
    credentials: BasicRequest<'a>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    options: TransactionsOptions<'a>,
}

#[derive(Debug, Serialize)]
struct TransactionsOptions<'a> {
    count: usize,
    offset: usize,
    account_ids: &'a [String],
    include_original_description: bool,
}

#[derive(Debug, Serialize)]
struct InvestmentsRequest<'a> {
    #[serde(flatten)]
    credentials: BasicRequest<'a>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    options: InvestmentsOptions<'a>,
}

#[derive(Debug, Serialize)]
struct InvestmentsOptions<'a> {
    count: usize,
    offset: usize,
    account_ids: &'a [String],
    async_update: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ItemEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    item_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    error: ProviderApiError,
}

#[derive(Debug, Deserialize)]
struct ItemGetResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    item: ItemEnvelope,
    #[serde(default, deserialize_with = "null_as_default")]
    status: ItemStatus,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    item: ItemEnvelope,
    #[serde(default, deserialize_with = "null_as_default")]
    transactions: Vec<Transaction>,
    #[serde(default)]
    total_transactions: usize,
}

#[derive(Debug, Deserialize)]
struct InvestmentsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    item: ItemEnvelope,
    #[serde(default, deserialize_with = "null_as_default")]
    investment_transactions: Vec<InvestmentTransaction>,
    #[serde(default, deserialize_with = "null_as_default")]
    securities: Vec<Security>,
    #[serde(default)]
    total_investment_transactions: usize,
}

#[async_trait]
impl ActivityProvider for PlaidClient {
    #[instrument(skip_all, fields(item = %item.name))]
    async fn item_status(&self, item: &ItemConfig) -> Result<ItemStatus, ProviderError> {
        let response: ItemGetResponse = self
            .post(ITEM_GET_ENDPOINT, &self.credentials(item))
            .await?;
        check_item_error(ITEM_GET_ENDPOINT, response.item)?;
        Ok(response.status)
    }

    #[instrument(skip_all, fields(item = %item.name, %stream))]
    async fn refresh(&self, item: &ItemConfig, stream: Stream) -> Result<(), ProviderError> {
        let response: RefreshResponse = self
            .post(stream.refresh_endpoint(), &self.credentials(item))
            .await?;
        debug!(request_id = %response.request_id, "Refresh requested");
        Ok(())
    }

    #[instrument(skip_all, fields(item = %item.name, offset = query.offset))]
    async fn transactions_page(
        &self,
        item: &ItemConfig,
        query: &PageQuery,
    ) -> Result<TransactionsPage, ProviderError> {
        let request = TransactionsRequest {
            credentials: self.credentials(item),
            start_date: query.start,
            end_date: query.end,
            options: TransactionsOptions {
                count: query.count,
                offset: query.offset,
                account_ids: &query.account_ids,
                include_original_description: true,
            },
        };
        let response: TransactionsResponse = self.post(TRANSACTIONS_ENDPOINT, &request).await?;
        Ok(TransactionsPage {
            item_id: check_item_error(TRANSACTIONS_ENDPOINT, response.item)?,
            transactions: response.transactions,
            total: response.total_transactions,
        })
    }

    #[instrument(skip_all, fields(item = %item.name, offset = query.offset))]
    async fn investments_page(
        &self,
        item: &ItemConfig,
        query: &PageQuery,
    ) -> Result<InvestmentsPage, ProviderError> {
        let request = InvestmentsRequest {
            credentials: self.credentials(item),
            start_date: query.start,
            end_date: query.end,
            options: InvestmentsOptions {
                count: query.count,
                offset: query.offset,
                account_ids: &query.account_ids,
                async_update: false,
            },
        };
        let response: InvestmentsResponse = self.post(INVESTMENTS_ENDPOINT, &request).await?;
        Ok(InvestmentsPage {
            item_id: check_item_error(INVESTMENTS_ENDPOINT, response.item)?,
            investment_transactions: response.investment_transactions,
            securities: response.securities,
            total: response.total_investment_transactions,
        })
    }
}
