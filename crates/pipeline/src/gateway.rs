//! The generation gateway: one canonical request in, one settled
//! generation out.
//!
//! Order of operations for a dispatch:
//!
//! 1. resolve the model and validate the request (no ledger movement);
//! 2. coerce parameters and price them;
//! 3. check the per-user rate limit;
//! 4. reserve credits, insert the generation record, link the two;
//! 5. build the provider job and drive it to a terminal state;
//! 6. record the outcome, then keep the charge or refund it.
//!
//! Every error raised after step 4 refunds the reservation before it is
//! returned.

use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use kiara_core::coercion::{prepare_params, CoercedParams, COUNT_PARAMS};
use kiara_core::job::GenerationStatus;
use kiara_core::pricing::compute_cost;
use kiara_core::registry::{ModelConfig, ModelRegistry, ProviderKind};
use kiara_core::request::{GenerationRequest, LoraOverride};
use kiara_core::template::{
    apply_prompt_template, build_assignments, dimension_overrides, lora_overrides,
    seed_assignment,
};
use kiara_core::types::DbId;
use kiara_db::models::generation::{CreateGenerationRecord, FinishGenerationRecord};
use kiara_providers::direct::request_body;
use kiara_providers::{build_adapter, execute, JobRequest, ProviderError, ProviderSettings};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;
use crate::ledger::{check_rate_limit, CreditReservation, RateLimit};
use crate::store::GenerationStore;

/// Workflow runs when a node-graph model declares no `max_images`.
const DEFAULT_MAX_RUNS: u32 = 4;

/// A settled, successful generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub generation_id: DbId,
    /// Provider task id; comma-joined when a workflow ran several times.
    pub task_id: Option<String>,
    pub output_urls: Vec<String>,
    pub credits_used: i64,
}

/// Provider-side result before it is recorded.
struct RunOutcome {
    task_id: Option<String>,
    output_urls: Vec<String>,
}

/// Resolved inputs for one provider dispatch.
struct Dispatch<'a> {
    model: &'a ModelConfig,
    endpoint: Option<String>,
    prompt: &'a str,
    negative_prompt: Option<&'a str>,
    reference_images: &'a [String],
    params: &'a CoercedParams,
    lora: Option<&'a LoraOverride>,
}

/// Shared, read-only dispatch context. Cheap to clone.
#[derive(Clone)]
pub struct GenerationGateway {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn GenerationStore>,
    settings: Arc<ProviderSettings>,
    client: reqwest::Client,
    rate_limit: RateLimit,
}

impl GenerationGateway {
    pub fn new(
        registry: Arc<ModelRegistry>,
        store: Arc<dyn GenerationStore>,
        settings: ProviderSettings,
        client: reqwest::Client,
        rate_limit: RateLimit,
    ) -> Self {
        Self {
            registry,
            store,
            settings: Arc::new(settings),
            client,
            rate_limit,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Run one generation for `user_id`.
    ///
    /// `cancel` aborts provider work; the reservation is still refunded and
    /// the record marked `canceled`.
    pub async fn dispatch(
        &self,
        user_id: DbId,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationResult, DispatchError> {
        let model = self.registry.resolve(&request.model_id)?;
        request.validate_for(model)?;

        let params = prepare_params(model, &request.raw_params);
        let endpoint = match model.provider {
            ProviderKind::NodeGraph => None,
            _ => Some(model.resolve_endpoint(&params)?),
        };
        let cost = compute_cost(&model.cost, &params);

        check_rate_limit(self.store.as_ref(), user_id, &self.rate_limit).await?;

        let mut held = CreditReservation::reserve(
            self.store.clone(),
            user_id,
            cost,
            &format!("Generation with {}", model.model_id),
        )
        .await?;

        let prompt = apply_prompt_template(&request.prompt, model.prompt_template.as_deref());
        let negative_prompt = request.effective_negative_prompt(model);
        let reference_images = request.reference_images_for(model);

        let insert = CreateGenerationRecord {
            user_id,
            model_id: model.model_id.clone(),
            prompt: request.prompt.clone(),
            enhanced_prompt: (prompt != request.prompt).then(|| prompt.clone()),
            negative_prompt: negative_prompt.map(str::to_string),
            reference_images: reference_images.to_vec(),
            params: Value::Object(params.clone()),
            credits_cost: cost,
        };
        let record = match self.store.insert_record(&insert).await {
            Ok(record) => record,
            Err(e) => {
                held.refund("generation record could not be created").await;
                return Err(e.into());
            }
        };
        held.link(record.id).await;

        tracing::info!(
            user_id,
            generation_id = record.id,
            model_id = %model.model_id,
            provider = model.provider.as_str(),
            cost,
            "Dispatching generation",
        );

        let started = Instant::now();
        let dispatch = Dispatch {
            model,
            endpoint,
            prompt: &prompt,
            negative_prompt,
            reference_images,
            params: &params,
            lora: request.lora.as_ref(),
        };
        let outcome = match self.run(&dispatch, &cancel).await {
            Ok(run) if run.output_urls.is_empty() => Err(DispatchError::NormalizationMiss {
                task_id: run.task_id,
            }),
            Ok(run) => Ok(run),
            Err(e) => Err(e.into()),
        };
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match outcome {
            Ok(run) => {
                let finish = FinishGenerationRecord {
                    status: GenerationStatus::Completed,
                    provider_task_id: run.task_id.clone(),
                    output_urls: run.output_urls.clone(),
                    error_message: None,
                    duration_ms,
                };
                self.finish(record.id, &finish).await;
                held.finalize_success();

                tracing::info!(
                    generation_id = record.id,
                    outputs = run.output_urls.len(),
                    duration_ms,
                    "Generation completed",
                );
                Ok(GenerationResult {
                    generation_id: record.id,
                    task_id: run.task_id,
                    output_urls: run.output_urls,
                    credits_used: cost,
                })
            }
            Err(err) => {
                let status = failure_status(&err);
                let finish = FinishGenerationRecord {
                    status,
                    provider_task_id: err.task_id().map(str::to_string),
                    output_urls: Vec::new(),
                    error_message: Some(err.to_string()),
                    duration_ms,
                };
                self.finish(record.id, &finish).await;
                held.refund(&err.to_string()).await;

                tracing::warn!(
                    generation_id = record.id,
                    status = %status,
                    error = %err,
                    duration_ms,
                    "Generation did not complete",
                );
                Err(err)
            }
        }
    }

    /// Build the provider job(s) and drive them to a terminal state.
    async fn run(
        &self,
        dispatch: &Dispatch<'_>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ProviderError> {
        let adapter = build_adapter(&self.client, &self.settings, dispatch.model)?;

        let jobs = match &dispatch.endpoint {
            Some(endpoint) => vec![JobRequest::Http {
                endpoint: endpoint.clone(),
                body: request_body(
                    dispatch.model,
                    dispatch.prompt,
                    dispatch.negative_prompt,
                    dispatch.reference_images,
                    dispatch.params,
                ),
            }],
            None => workflow_jobs(dispatch)?,
        };

        let outcomes = try_join_all(
            jobs.iter()
                .map(|job| execute(adapter.as_ref(), job, &self.settings.poll, cancel)),
        )
        .await?;

        let task_ids: Vec<String> = outcomes.iter().filter_map(|o| o.task_id.clone()).collect();
        Ok(RunOutcome {
            task_id: (!task_ids.is_empty()).then(|| task_ids.join(",")),
            output_urls: outcomes.into_iter().flat_map(|o| o.output_urls).collect(),
        })
    }

    async fn finish(&self, generation_id: DbId, finish: &FinishGenerationRecord) {
        match self.store.finish_record(generation_id, finish).await {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(generation_id, "Generation record was already finished"),
            Err(e) => tracing::error!(
                error = %e,
                generation_id,
                status = %finish.status,
                "Failed to record generation outcome",
            ),
        }
    }
}

/// One workflow job per run, each with its own seed.
fn workflow_jobs(dispatch: &Dispatch<'_>) -> Result<Vec<JobRequest>, ProviderError> {
    let graph = dispatch.model.node_graph.as_ref().ok_or_else(|| {
        ProviderError::Configuration(format!(
            "model '{}' has no workflow configuration",
            dispatch.model.model_id
        ))
    })?;

    let mut assignments = build_assignments(
        graph,
        dispatch.prompt,
        dispatch.negative_prompt,
        dispatch.reference_images,
    );
    if assignments.is_empty() {
        return Err(ProviderError::Configuration(format!(
            "model '{}' produces no node assignments",
            dispatch.model.model_id
        )));
    }
    assignments.extend(dimension_overrides(graph, dispatch.params));
    assignments.extend(lora_overrides(graph, dispatch.lora));

    let runs = run_count(dispatch.model, dispatch.params);
    Ok((0..runs)
        .map(|run| {
            let mut run_assignments = assignments.clone();
            run_assignments.extend(seed_assignment(graph, dispatch.params, run));
            JobRequest::Workflow {
                workflow_id: graph.workflow_id.clone(),
                assignments: run_assignments,
            }
        })
        .collect())
}

/// Requested output count, clamped to `[1, max_images]`.
fn run_count(model: &ModelConfig, params: &CoercedParams) -> u32 {
    let max = model.max_images.unwrap_or(DEFAULT_MAX_RUNS).max(1);
    COUNT_PARAMS
        .iter()
        .find_map(|key| params.get(*key).and_then(Value::as_f64))
        .map_or(1, |n| n.clamp(1.0, f64::from(max)) as u32)
}

/// Record status for a failed dispatch.
fn failure_status(err: &DispatchError) -> GenerationStatus {
    match err {
        DispatchError::Provider(ProviderError::TimedOut { .. }) => GenerationStatus::TimedOut,
        DispatchError::Provider(ProviderError::Canceled { .. } | ProviderError::JobCanceled { .. }) => {
            GenerationStatus::Canceled
        }
        _ => GenerationStatus::Failed,
    }
}
