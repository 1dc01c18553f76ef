use std::future::Future;
use std::sync::Arc;

use intranet_common::error::IntranetResult;
use intranet_db::advbox::models::{AdvboxCustomer, AdvboxLawsuit};
use intranet_db::advbox::repositories::EntityStore;
use intranet_db::sync::models::SyncStatus;
use intranet_db::sync::repositories::SyncJobRepository;

use crate::advbox::client::{AdvboxClient, AdvboxClientConfig};
use crate::advbox::sources::{CustomerSource, LawsuitSource};
use crate::clock::Clock;
use crate::driver::{SyncDriver, SyncSummary};
use crate::error::SyncError;
use crate::job::JobType;
use crate::settings::SyncSettings;

/// Everything a sync invocation needs besides the upstream credentials.
#[derive(Clone)]
pub struct SyncContext {
    pub jobs: Arc<dyn SyncJobRepository>,
    pub customers: Arc<dyn EntityStore<AdvboxCustomer>>,
    pub lawsuits: Arc<dyn EntityStore<AdvboxLawsuit>>,
    pub clock: Arc<dyn Clock>,
    pub settings: SyncSettings,
}

/// Run one invocation of `job_type`.
///
/// A configuration error is reported as an `error` summary before any job
/// row is written. That includes a stale window that a live invocation could
/// outlast, since another trigger would then reclaim its slot mid-run.
pub async fn run_job(
    job_type: JobType,
    advbox: &IntranetResult<AdvboxClientConfig>,
    ctx: &SyncContext,
) -> SyncSummary {
    let config = match advbox {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(job_type = %job_type, error = %e, "advbox is not configured");
            return SyncSummary::not_started(
                job_type.as_str(),
                &SyncError::Configuration(e.to_string()),
            );
        }
    };
    if let Err(e) = ctx.settings.check_stale_window(config.worst_case_fetch()) {
        tracing::error!(job_type = %job_type, error = %e, "stale window too short");
        return SyncSummary::not_started(
            job_type.as_str(),
            &SyncError::Configuration(e.to_string()),
        );
    }
    let client = match AdvboxClient::new(config.clone(), Arc::clone(&ctx.clock)) {
        Ok(c) => c,
        Err(e) => {
            return SyncSummary::not_started(
                job_type.as_str(),
                &SyncError::Configuration(e.to_string()),
            );
        }
    };

    tracing::info!(job_type = %job_type, "starting sync invocation");

    match job_type {
        JobType::Customers => {
            SyncDriver::new(
                job_type.as_str(),
                CustomerSource::new(client),
                Arc::clone(&ctx.customers),
                Arc::clone(&ctx.jobs),
                Arc::clone(&ctx.clock),
                ctx.settings.clone(),
            )
            .run()
            .await
        }
        JobType::Lawsuits => {
            SyncDriver::new(
                job_type.as_str(),
                LawsuitSource::new(client),
                Arc::clone(&ctx.lawsuits),
                Arc::clone(&ctx.jobs),
                Arc::clone(&ctx.clock),
                ctx.settings.clone(),
            )
            .run()
            .await
        }
    }
}

/// Re-invoke while the previous invocation stopped `partial`, the way a
/// scheduler would, up to `max_runs` invocations. Returns every summary.
pub async fn run_until_settled<F, Fut>(max_runs: u32, mut invoke: F) -> Vec<SyncSummary>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncSummary>,
{
    let mut summaries = Vec::new();
    for run in 1..=max_runs.max(1) {
        let summary = invoke().await;
        let status = summary.status;
        tracing::info!(run, status = %status, offset = summary.last_offset, "invocation finished");
        summaries.push(summary);
        if status != SyncStatus::Partial {
            break;
        }
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use intranet_common::error::IntranetError;
    use intranet_db::advbox::memory::MemoryEntityStore;
    use intranet_db::sync::memory::MemorySyncJobRepository;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::clock::ManualClock;

    struct Fixture {
        ctx: SyncContext,
        jobs: MemorySyncJobRepository,
        customers: MemoryEntityStore<AdvboxCustomer>,
        lawsuits: MemoryEntityStore<AdvboxLawsuit>,
    }

    fn fixture(settings: SyncSettings) -> Fixture {
        let jobs = MemorySyncJobRepository::new();
        let customers = MemoryEntityStore::new();
        let lawsuits = MemoryEntityStore::new();
        let ctx = SyncContext {
            jobs: Arc::new(jobs.clone()),
            customers: Arc::new(customers.clone()),
            lawsuits: Arc::new(lawsuits.clone()),
            clock: Arc::new(ManualClock::new()),
            settings,
        };
        Fixture {
            ctx,
            jobs,
            customers,
            lawsuits,
        }
    }

    fn advbox(server: &MockServer) -> IntranetResult<AdvboxClientConfig> {
        Ok(AdvboxClientConfig {
            base_url: server.uri(),
            api_token: "t".to_string(),
            max_retries: 5,
            base_delay_ms: 2000,
            timeout_secs: 5,
        })
    }

    async fn mount_customers(server: &MockServer, total: usize, page_size: usize) {
        for offset in (0..total).step_by(page_size) {
            let data: Vec<serde_json::Value> = (offset..total.min(offset + page_size))
                .map(|i| serde_json::json!({ "id": i + 1, "name": format!("Customer {}", i + 1) }))
                .collect();
            Mock::given(method("GET"))
                .and(path("/customers"))
                .and(query_param("offset", offset.to_string()))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({ "data": data, "totalCount": total })),
                )
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn configuration_error_writes_no_row() {
        let f = fixture(SyncSettings::default());
        let missing = Err(IntranetError::Config(
            "ADVBOX_API_TOKEN is required but not set".to_string(),
        ));

        let summary = run_job(JobType::Customers, &missing, &f.ctx).await;

        assert_eq!(summary.status, SyncStatus::Error);
        assert!(summary.message.contains("ADVBOX_API_TOKEN"));
        assert!(summary.job_id.is_none());
        assert!(f.jobs.snapshot().is_empty());
    }

    #[tokio::test]
    async fn stale_window_shorter_than_a_slow_run_writes_no_row() {
        let server = MockServer::start().await;
        mount_customers(&server, 250, 100).await;
        // valid on its own, but a final page can run 92s past the budget
        let f = fixture(SyncSettings {
            time_budget: Duration::from_secs(3600),
            stale_after: Duration::from_secs(3660),
            ..SyncSettings::default()
        });
        assert!(f.ctx.settings.validate().is_ok());

        let summary = run_job(JobType::Customers, &advbox(&server), &f.ctx).await;

        assert_eq!(summary.status, SyncStatus::Error);
        assert!(summary.message.contains("SYNC_STALE_AFTER_SECS"));
        assert!(summary.job_id.is_none());
        assert!(f.jobs.snapshot().is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn customers_job_mirrors_upstream() {
        let server = MockServer::start().await;
        mount_customers(&server, 250, 100).await;
        let f = fixture(SyncSettings {
            time_budget: Duration::from_secs(3600),
            stale_after: Duration::from_secs(7200),
            ..SyncSettings::default()
        });

        let summary = run_job(JobType::Customers, &advbox(&server), &f.ctx).await;

        assert_eq!(summary.status, SyncStatus::Completed);
        assert_eq!(summary.total_processed, 250);
        assert_eq!(summary.pages_fetched, 3);
        assert_eq!(f.customers.count().await.unwrap(), 250);
        assert_eq!(f.lawsuits.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lawsuits_job_uses_its_own_collection_and_lineage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lawsuits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "id": 1, "customers": [{ "customer_id": 5 }] }],
                "totalCount": 1
            })))
            .mount(&server)
            .await;
        let f = fixture(SyncSettings::default());

        let summary = run_job(JobType::Lawsuits, &advbox(&server), &f.ctx).await;

        assert_eq!(summary.status, SyncStatus::Completed);
        assert_eq!(summary.job_type, "lawsuits");
        assert_eq!(f.lawsuits.get(1).unwrap().customer_ids, vec![5]);
        assert_eq!(f.jobs.snapshot()[0].job_type, "lawsuits");
    }

    #[tokio::test]
    async fn until_settled_reinvokes_partial_runs() {
        let server = MockServer::start().await;
        mount_customers(&server, 1000, 100).await;
        let f = fixture(SyncSettings {
            time_budget: Duration::from_millis(1200),
            ..SyncSettings::default()
        });
        let config = advbox(&server);

        let summaries =
            run_until_settled(10, || run_job(JobType::Customers, &config, &f.ctx)).await;

        let statuses: Vec<SyncStatus> = summaries.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                SyncStatus::Partial,
                SyncStatus::Partial,
                SyncStatus::Partial,
                SyncStatus::Completed
            ]
        );
        assert_eq!(summaries.last().unwrap().total_processed, 1000);
        assert_eq!(f.customers.count().await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn until_settled_respects_max_runs() {
        let server = MockServer::start().await;
        mount_customers(&server, 1000, 100).await;
        let f = fixture(SyncSettings {
            time_budget: Duration::from_millis(1200),
            ..SyncSettings::default()
        });
        let config = advbox(&server);

        let summaries =
            run_until_settled(2, || run_job(JobType::Customers, &config, &f.ctx)).await;

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].status, SyncStatus::Partial);
        assert_eq!(summaries[1].last_offset, 600);
    }
}
