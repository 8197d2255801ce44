use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    jobs::{mark_job_failed, mark_job_succeeded, reserve_job, retry_job_after, JobQueueError},
    models::Job,
    state::AppState,
    status::GoldLayer,
};

pub mod distribute;
pub mod sink;

pub use distribute::DistributeGoldLayerJob;
pub use sink::{GoldSink, HttpSink};

#[derive(Debug, PartialEq, Eq)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
            poll_interval,
        }
    }

    pub fn job_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub async fn run(&self) {
        info!(job_types = ?self.job_types(), "dispatch worker started");
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Runs at most one job. Returns whether a job was reserved.
    pub async fn tick(&self) -> Result<bool, JobQueueError> {
        let job_types = self.job_types();
        if job_types.is_empty() {
            return Ok(false);
        }

        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                error!(?err, "failed to obtain database connection in worker");
                return Ok(false);
            }
        };

        let Some(job) = reserve_job(&mut conn, &job_types)? else {
            return Ok(false);
        };
        drop(conn);

        let Some(handler) = self.handlers.get(job.job_type.as_str()) else {
            error!(job_type = %job.job_type, "no handler registered for job type");
            self.settle(&job, JobExecution::Failed {
                error: "no handler registered".into(),
            })?;
            return Ok(true);
        };

        let execution = handler.handle(self.state.clone(), job.clone()).await;
        self.settle(&job, execution)?;
        Ok(true)
    }

    fn settle(&self, job: &Job, execution: JobExecution) -> Result<(), JobQueueError> {
        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                error!(job_id = %job.id, ?err, "failed to settle job due to pool error");
                return Ok(());
            }
        };

        match execution {
            JobExecution::Success => {
                mark_job_succeeded(&mut conn, job.id)?;
                info!(job_id = %job.id, job_type = %job.job_type, "job completed successfully");
            }
            JobExecution::Retry { delay, error } => {
                warn!(job_id = %job.id, job_type = %job.job_type, %error, "job will retry");
                retry_job_after(&mut conn, job.id, delay, &error)?;
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                mark_job_failed(&mut conn, job.id, &error)?;
            }
        }
        Ok(())
    }
}

pub fn default_handlers(config: &AppConfig) -> Vec<Arc<dyn JobHandler>> {
    GoldLayer::ALL
        .into_iter()
        .filter_map(|layer| {
            let Some(endpoint) = config.sink_url(layer) else {
                warn!(%layer, "no sink endpoint configured; layer will not be dispatched");
                return None;
            };
            let sink: Arc<dyn GoldSink> = Arc::new(HttpSink::new(layer, endpoint.clone()));
            Some(Arc::new(DistributeGoldLayerJob::new(layer, sink)) as Arc<dyn JobHandler>)
        })
        .collect()
}
