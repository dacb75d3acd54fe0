use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::{CheckMatrixResult, TestMatrixArtifact};
use crate::errors::{ProctorError, ProctorResult};
use crate::model::{Environment, TestDefinition};
use crate::specification::{
    AppVersion, ClientVerifier, LoadResult, SpecificationSource, TestSpecification,
};

/// Fans a candidate definition out to every registered client.
pub struct MatrixVerificationEngine {
    specifications: Arc<dyn SpecificationSource>,
    verifier: Arc<dyn ClientVerifier>,
    permits: Arc<Semaphore>,
}

impl MatrixVerificationEngine {
    /// `worker_threads` bounds how many client checks run at once.
    pub fn new(
        specifications: Arc<dyn SpecificationSource>,
        verifier: Arc<dyn ClientVerifier>,
        worker_threads: usize,
    ) -> Self {
        Self {
            specifications,
            verifier,
            permits: Arc::new(Semaphore::new(worker_threads.max(1))),
        }
    }

    pub fn specifications(&self) -> &Arc<dyn SpecificationSource> {
        &self.specifications
    }

    /// Verify `candidate` against every client registered in `environment`.
    ///
    /// Each client contributes at most one error. A `None` candidate asks
    /// whether any client still requires the test.
    pub async fn check_matrix(
        &self,
        environment: Environment,
        test_name: &str,
        candidate: Option<&TestDefinition>,
    ) -> ProctorResult<CheckMatrixResult> {
        let artifact = Arc::new(TestMatrixArtifact::for_candidate(test_name, candidate));
        let clients = self.specifications.specifications_for(environment)?;

        let mut pending: BTreeSet<AppVersion> = BTreeSet::new();
        let mut join_set = JoinSet::new();

        for (app_version, specification) in clients {
            let required: BTreeMap<String, TestSpecification> = specification
                .tests
                .get(test_name)
                .map(|spec| BTreeMap::from([(test_name.to_string(), spec.clone())]))
                .unwrap_or_default();

            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ProctorError::wrap("Verification pool closed", e))?;
            let verifier = self.verifier.clone();
            let artifact = artifact.clone();
            pending.insert(app_version.clone());

            join_set.spawn_blocking(move || {
                let _permit = permit;
                info!(client = %app_version, "verifying artifact against client");
                let source = app_version.to_string();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    verifier.verify(&artifact, &source, &required)
                }))
                .map_err(|payload| panic_message(payload.as_ref()));
                (app_version, outcome)
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((app_version, outcome)) => {
                    pending.remove(&app_version);
                    match outcome {
                        Ok(Ok(result)) if result.has_invalid_tests() => {
                            errors.push(error_message(&app_version, &result));
                        }
                        Ok(Ok(_)) => {
                            debug!(client = %app_version, test = %test_name, "client compatible");
                        }
                        Ok(Err(e)) => {
                            error!(client = %app_version, error = %e, "unable to verify");
                            errors.push(format!("{} failed. {}", app_version, root_cause(&e)));
                        }
                        Err(panicked) => {
                            error!(client = %app_version, panic = %panicked, "verifier panicked");
                            errors.push(format!("{} failed. {}", app_version, panicked));
                        }
                    }
                }
                Err(e) => {
                    if e.is_panic() {
                        error!("Verification task panicked: {}", e);
                    } else {
                        error!("Verification task cancelled: {}", e);
                    }
                }
            }
        }

        // clients whose task never reported back
        for app_version in pending {
            errors.push(format!("{} failed. verification task did not complete", app_version));
        }

        Ok(CheckMatrixResult::from_errors(errors))
    }
}

/// First problem reported for a client; at most one test is checked.
fn error_message(app_version: &AppVersion, result: &LoadResult) -> String {
    if let Some(message) = result.invalid.values().next() {
        message.clone()
    } else if let Some(test_name) = result.missing.iter().next() {
        format!("{} requires test '{}'", app_version, test_name)
    } else {
        String::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "verifier panicked".to_string()
    }
}

fn root_cause(err: &ProctorError) -> String {
    let mut current: &(dyn Error + 'static) = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
