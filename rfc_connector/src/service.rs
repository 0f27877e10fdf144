//! Async entry points.
//!
//! Each call validates its input, then runs the blocking pipeline on the
//! blocking thread pool with one connection of its own.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    client::{RfcClient, RfcConnection},
    common::ensure_active,
    config::{ConnectionParams, ConnectorConfig, QueryOptions},
    error::{RfcError, RfcResult},
    invoker::{CallResult, FunctionInvoker},
    parameters::ExecuteFunctionInput,
    query::{TableQuery, TableQueryEngine, TableQueryRecord},
    repository::RepositoryRequest,
};

#[derive(Clone)]
pub struct RfcConnector {
    client: Arc<dyn RfcClient>,
    config: ConnectorConfig,
    active_calls: Arc<AtomicUsize>,
}

impl RfcConnector {
    pub fn new(client: Arc<dyn RfcClient>) -> Self {
        Self {
            client,
            config: ConnectorConfig::default(),
            active_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_config(client: Arc<dyn RfcClient>, config: ConnectorConfig) -> RfcResult<Self> {
        config.validate().map_err(RfcError::InvalidInput)?;
        Ok(Self {
            config,
            ..Self::new(client)
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Calls currently running on the blocking pool.
    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }

    /// Run a batch of function modules in one session. Returns function name
    /// -> tables and exports of that function.
    pub async fn execute_function(
        &self,
        input: &ExecuteFunctionInput,
        cancel: CancellationToken,
    ) -> RfcResult<CallResult> {
        let params = ConnectionParams::parse(&input.connection_string)?;
        let batch = input.function_input()?;

        let invoker = FunctionInvoker::new(cancel.clone());
        self.run_blocking(params, cancel, move |connection| {
            invoker.execute(connection, &batch)
        })
        .await
    }

    /// Read rows of a table through the configured table reader.
    pub async fn execute_query(
        &self,
        query: &TableQuery,
        options: &QueryOptions,
        cancel: CancellationToken,
    ) -> RfcResult<Vec<TableQueryRecord>> {
        let reader = options
            .read_table_function
            .as_ref()
            .unwrap_or(&self.config.default_reader);
        let prepared = query.prepare(reader, self.config.filter_max_len)?;
        let params = ConnectionParams::parse(&query.connection_string)?;

        let engine = TableQueryEngine::new(cancel.clone());
        self.run_blocking(params, cancel, move |connection| {
            engine.execute(connection, &prepared)
        })
        .await
    }

    /// Apply one metadata repository operation.
    pub async fn modify_repository(
        &self,
        request: &RepositoryRequest,
        cancel: CancellationToken,
    ) -> RfcResult<Option<Value>> {
        request.operation.validate()?;
        let params = ConnectionParams::parse(&request.connection_string)?;

        let operation = request.operation.clone();
        let token = cancel.clone();
        self.run_blocking(params, cancel, move |connection| {
            operation.execute(connection, &token)
        })
        .await
    }

    async fn run_blocking<F, T>(
        &self,
        params: ConnectionParams,
        cancel: CancellationToken,
        work: F,
    ) -> RfcResult<T>
    where
        F: FnOnce(Box<dyn RfcConnection>) -> RfcResult<T> + Send + 'static,
        T: Send + 'static,
    {
        ensure_active(&cancel)?;

        self.active_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = scopeguard::guard(Arc::clone(&self.active_calls), |count| {
            count.fetch_sub(1, Ordering::SeqCst);
        });

        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            debug!(
                "Opening RFC connection to '{}'",
                params.host().unwrap_or("<unknown host>")
            );
            let connection = client.open(&params).map_err(RfcError::Connection)?;
            work(connection)
        })
        .await
        .map_err(|e| RfcError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for RfcConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RfcConnector")
            .field("config", &self.config)
            .field("active_calls", &self.active_calls())
            .finish()
    }
}
