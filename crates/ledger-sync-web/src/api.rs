use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::Stream;
use ledger_sync::autorun::{AutoRunProgress, AutoRunState, AutoRunStore};
use ledger_sync::ledger::{LedgerError, RemoteLedger, StoreOutcome, StoreRequest, TransactionQuery};
use ledger_sync::{DateTime, RemoteAccount, RemoteTransaction, ScrapedAccount, date_format};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::{AppState, StateChange};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl From<anyhow::Error> for ErrorResponse {
    fn from(error: anyhow::Error) -> Self {
        let status = match error.downcast_ref::<LedgerError>() {
            Some(LedgerError::UnknownTransaction(_) | LedgerError::UnknownAccount(_)) => {
                StatusCode::NOT_FOUND
            }
            None => StatusCode::BAD_REQUEST,
        };
        ErrorResponse {
            status,
            error: format!("{error:#}"),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ErrorResponse>;

pub async fn list_accounts(State(state): State<AppState>) -> ApiResult<Vec<RemoteAccount>> {
    let accounts = state.ledger.list_accounts().await?;
    Ok(Json(accounts))
}

pub async fn store_accounts(
    State(state): State<AppState>,
    Json(accounts): Json<Vec<ScrapedAccount>>,
) -> ApiResult<Vec<RemoteAccount>> {
    tracing::info!("Storing {} account(s)", accounts.len());
    let _guard = state.write_lock().await;
    state.ledger.store_accounts(accounts).await?;
    state.save()?;
    Ok(Json(state.ledger.list_accounts().await?))
}

#[derive(Debug, Deserialize)]
pub struct ListTransactionsParams {
    #[serde(deserialize_with = "date_format::deserialize")]
    pub end_date: DateTime,
    pub page_size: Option<usize>,
}

const DEFAULT_PAGE_SIZE: usize = 50;

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(params): Query<ListTransactionsParams>,
) -> ApiResult<Vec<RemoteTransaction>> {
    let query = TransactionQuery {
        account_id,
        end_date: params.end_date,
        page_size: params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let transactions = state.ledger.list_transactions(&query).await?;
    tracing::debug!(
        "Listing {} transaction(s) of account {} up to {}",
        transactions.len(),
        query.account_id,
        query.end_date
    );
    Ok(Json(transactions))
}

pub async fn store_transactions(
    State(state): State<AppState>,
    Json(request): Json<StoreRequest>,
) -> ApiResult<StoreOutcome> {
    let _guard = state.write_lock().await;
    let outcome = state.ledger.store_transactions(request).await?;
    if !outcome.created.is_empty() {
        state.save()?;
    }
    Ok(Json(outcome))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ErrorResponse> {
    let _guard = state.write_lock().await;
    state.ledger.delete_transaction(&id).await.inspect_err(|e| {
        tracing::error!("Failed to delete transaction {id}: {e:#}");
    })?;
    state.save()?;
    tracing::info!("Deleted transaction {id}");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_auto_run(State(state): State<AppState>) -> ApiResult<AutoRunProgress> {
    Ok(Json(state.auto_run.progress().await?))
}

fn auto_run_changed(state: &AppState, progress: AutoRunProgress) -> ApiResult<AutoRunProgress> {
    tracing::info!("Auto run is now {:?}", progress.state);
    state.notify(StateChange::AutoRun(progress.clone()));
    Ok(Json(progress))
}

pub async fn start_auto_run(State(state): State<AppState>) -> ApiResult<AutoRunProgress> {
    let progress = state.auto_run.start(state.auto_run_config.single_account_bank);
    auto_run_changed(&state, progress)
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub state: AutoRunState,
}

pub async fn complete_auto_run(
    State(state): State<AppState>,
    Json(request): Json<CompleteRequest>,
) -> ApiResult<AutoRunProgress> {
    let progress = state.auto_run.complete(request.state).await?;
    auto_run_changed(&state, progress)
}

#[derive(Debug, Deserialize)]
pub struct IncrementRequest {
    pub last_account_completed: String,
}

pub async fn increment_auto_run(
    State(state): State<AppState>,
    Json(request): Json<IncrementRequest>,
) -> ApiResult<AutoRunProgress> {
    let progress = state
        .auto_run
        .increment_tx_account(request.last_account_completed)
        .await?;
    auto_run_changed(&state, progress)
}

pub async fn finish_auto_run(State(state): State<AppState>) -> ApiResult<AutoRunProgress> {
    let progress = state.auto_run.finish().await?;
    auto_run_changed(&state, progress)
}

pub async fn state_changes_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscriber_count = state.state_change_tx.receiver_count();
    tracing::info!("New SSE connection. Total subscribers: {subscriber_count}");

    let rx = state.state_change_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|change| {
        let event = match change.ok()? {
            StateChange::Ledger => Event::default().event("ledger").data("reload"),
            StateChange::AutoRun(progress) => Event::default()
                .event("auto_run")
                .json_data(progress)
                .ok()?,
        };
        Some(Ok(event))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
