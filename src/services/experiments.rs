use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{
        EventKind, Experiment, ExperimentEvent, Variant, VariantAssignment, VariantCounts,
        VariantStats,
    },
};

/// Deterministic weighted bucket for a client.
///
/// The same test name and client always land in the same variant, so a lost
/// assignment row is re-derived identically.
pub fn bucket_variant(experiment: &Experiment, client_id: Uuid) -> Option<&Variant> {
    let total = experiment.total_weight();
    if total == 0 {
        return None;
    }

    let seed = format!("{}:{}", experiment.name, client_id);
    let (high, _) = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).as_u64_pair();
    let mut point = high % total;

    for variant in &experiment.variants {
        let weight = u64::from(variant.weight);
        if point < weight {
            return Some(variant);
        }
        point -= weight;
    }

    experiment.variants.last()
}

fn validate_name(name: &str) -> AppResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "experiment name must be 1-64 characters of [A-Za-z0-9_-]: {:?}",
            name
        )))
    }
}

fn validate_variants(variants: &[Variant]) -> AppResult<()> {
    if variants.len() < 2 {
        return Err(AppError::InvalidInput(
            "an experiment needs at least two variants".to_string(),
        ));
    }
    let mut names = HashSet::new();
    for variant in variants {
        if variant.name.trim().is_empty() {
            return Err(AppError::InvalidInput("variant names must not be empty".to_string()));
        }
        if variant.weight == 0 {
            return Err(AppError::InvalidInput(format!(
                "variant {} must have a positive weight",
                variant.name
            )));
        }
        if !names.insert(variant.name.as_str()) {
            return Err(AppError::InvalidInput(format!(
                "duplicate variant name: {}",
                variant.name
            )));
        }
    }
    Ok(())
}

/// Sticky A/B assignment and event tracking
#[derive(Clone)]
pub struct ExperimentService {
    store: Arc<dyn Store>,
}

impl ExperimentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_experiment(
        &self,
        name: &str,
        variants: Vec<Variant>,
    ) -> AppResult<Experiment> {
        let name = name.trim();
        validate_name(name)?;
        let variants: Vec<Variant> = variants
            .into_iter()
            .map(|v| Variant {
                name: v.name.trim().to_string(),
                weight: v.weight,
            })
            .collect();
        validate_variants(&variants)?;

        let experiment = Experiment {
            name: name.to_string(),
            variants,
            active: true,
            created_at: Utc::now(),
        };

        if !self.store.insert_experiment(&experiment).await? {
            return Err(AppError::Conflict(format!(
                "experiment {} already exists",
                name
            )));
        }

        tracing::info!(
            experiment = %experiment.name,
            variants = experiment.variants.len(),
            "Created experiment"
        );
        Ok(experiment)
    }

    async fn experiment(&self, name: &str) -> AppResult<Experiment> {
        self.store
            .get_experiment(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("experiment {}", name)))
    }

    /// Returns the client's variant, assigning and persisting one on first sight
    /// while the test is active; an inactive test serves its control variant
    pub async fn assign(&self, test_name: &str, client_id: Uuid) -> AppResult<VariantAssignment> {
        let experiment = self.experiment(test_name).await?;

        if experiment.active {
            if let Some(existing) = self.store.get_assignment(test_name, client_id).await? {
                return Ok(existing);
            }
        } else {
            let control = experiment.control().ok_or_else(|| {
                AppError::Internal(format!("experiment {} has no variants", test_name))
            })?;
            return Ok(VariantAssignment {
                test_name: experiment.name.clone(),
                client_id,
                variant: control.name.clone(),
                assigned_at: Utc::now(),
            });
        }

        let variant = bucket_variant(&experiment, client_id).ok_or_else(|| {
            AppError::Internal(format!("experiment {} has no weighted variants", test_name))
        })?;

        let candidate = VariantAssignment {
            test_name: experiment.name.clone(),
            client_id,
            variant: variant.name.clone(),
            assigned_at: Utc::now(),
        };
        let stored = self.store.insert_assignment_if_absent(&candidate).await?;

        tracing::debug!(
            experiment = %stored.test_name,
            client_id = %client_id,
            variant = %stored.variant,
            "Assigned variant"
        );
        Ok(stored)
    }

    /// Records an event against the client's (possibly new) variant
    pub async fn record_event(
        &self,
        test_name: &str,
        client_id: Uuid,
        kind: EventKind,
    ) -> AppResult<ExperimentEvent> {
        let assignment = self.assign(test_name, client_id).await?;
        let event = ExperimentEvent {
            test_name: assignment.test_name,
            client_id,
            variant: assignment.variant,
            kind,
            occurred_at: Utc::now(),
        };
        self.store.insert_event(&event).await?;
        Ok(event)
    }

    /// Per-variant counters and rates; every declared variant is listed
    pub async fn stats(&self, test_name: &str) -> AppResult<Vec<VariantStats>> {
        let experiment = self.experiment(test_name).await?;
        let mut counts = self.store.variant_counts(test_name).await?;

        let mut stats = Vec::with_capacity(experiment.variants.len());
        for variant in &experiment.variants {
            let position = counts.iter().position(|c| c.variant == variant.name);
            let count = match position {
                Some(idx) => counts.swap_remove(idx),
                None => VariantCounts {
                    variant: variant.name.clone(),
                    ..Default::default()
                },
            };
            stats.push(VariantStats::from(count));
        }
        Ok(stats)
    }

    pub async fn set_active(&self, test_name: &str, active: bool) -> AppResult<()> {
        if !self.store.set_experiment_active(test_name, active).await? {
            return Err(AppError::NotFound(format!("experiment {}", test_name)));
        }
        tracing::info!(experiment = %test_name, active, "Experiment toggled");
        Ok(())
    }
}
