use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::applications::Application;
use super::jobs::Job;
use super::talents::Talent;
use super::{ServiceResult, Services};

/// An application joined with its job. `job` is `None` when the job record is gone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationWithJob {
    #[serde(flatten)]
    pub application: Application,
    pub status_label: String,
    pub job: Option<Job>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrefetchBundle {
    pub talent: Option<Talent>,
    pub applications: Vec<ApplicationWithJob>,
}

/// Cross-service reads that join records in memory.
pub struct Aggregator<'a> {
    services: &'a Services,
}

impl<'a> Aggregator<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }

    pub async fn applications_with_jobs(
        &self,
        auth_user_id: Uuid,
    ) -> ServiceResult<Vec<ApplicationWithJob>> {
        let applications = self
            .services
            .applications
            .list_by_owner(auth_user_id)
            .await?;
        self.join_jobs(applications).await
    }

    /// Warms the talent and application caches in one round trip.
    pub async fn prefetch(&self, auth_user_id: Uuid) -> ServiceResult<PrefetchBundle> {
        let (talent, applications) = tokio::try_join!(
            self.services.talents.get_by_auth_user(auth_user_id),
            self.applications_with_jobs(auth_user_id),
        )?;
        debug!(%auth_user_id, applications = applications.len(), "prefetch complete");
        Ok(PrefetchBundle {
            talent,
            applications,
        })
    }

    async fn join_jobs(
        &self,
        applications: Vec<Application>,
    ) -> ServiceResult<Vec<ApplicationWithJob>> {
        if applications.is_empty() {
            return Ok(Vec::new());
        }

        let job_ids: Vec<u64> = applications.iter().map(|app| app.job_id).collect();
        let jobs = self.services.jobs.get_by_ids(&job_ids).await?;

        Ok(applications
            .into_iter()
            .map(|application| {
                let job = jobs.get(&application.job_id).cloned();
                ApplicationWithJob {
                    status_label: application.status_label().to_string(),
                    application,
                    job,
                }
            })
            .collect())
    }
}
