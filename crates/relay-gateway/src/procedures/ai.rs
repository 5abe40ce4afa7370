//! The `ai` namespace.

use std::sync::Arc;

use relay_core::{GatewayError, GatewayResult, RequestContext, SecretString};
use relay_llm::TextProvider;
use serde::{Deserialize, Serialize};

use super::{Empty, Procedure, ProcedureRegistry, RateClass, wrap};
use crate::error::from_registry;
use crate::pipeline::{self, GenerateTextInput, GenerateTextOutput};
use crate::state::Gateway;

pub(super) fn register(registry: &mut ProcedureRegistry) {
    registry.add(Procedure {
        name: "ai.generateText",
        description: "Generate text with a configured AI provider",
        auth_required: true,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Expensive,
        handler: wrap(generate_text),
    });
    registry.add(Procedure {
        name: "ai.listProviders",
        description: "List configured providers",
        auth_required: false,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(list_providers),
    });
    registry.add(Procedure {
        name: "ai.listProvidersBYOK",
        description: "List providers accepting bring-your-own-key credentials",
        auth_required: false,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(list_byok_providers),
    });
    registry.add(Procedure {
        name: "ai.listAllowedModels",
        description: "List models permitted for a provider",
        auth_required: false,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(list_allowed_models),
    });
    registry.add(Procedure {
        name: "ai.getRegistryHealth",
        description: "Catalog registry health",
        auth_required: false,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(registry_health),
    });
    registry.add(Procedure {
        name: "ai.validateProvider",
        description: "Validate an API key against a provider",
        auth_required: false,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Expensive,
        handler: wrap(validate_provider),
    });
}

async fn generate_text(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: GenerateTextInput,
) -> GatewayResult<GenerateTextOutput> {
    pipeline::generate_text(&gateway, &ctx, input).await
}

/// One provider as listed to callers. Model lists are fetched separately;
/// this stays small.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderSummary {
    id: String,
    display_name: String,
    kind: String,
    available: bool,
    server_key: bool,
    byok_eligible: bool,
    default_model: Option<String>,
    model_count: usize,
}

impl From<relay_registry::ProviderEntry> for ProviderSummary {
    fn from(entry: relay_registry::ProviderEntry) -> Self {
        Self {
            id: entry.id,
            display_name: entry.display_name,
            kind: entry.kind,
            available: entry.available,
            server_key: entry.server_key,
            byok_eligible: entry.byok_eligible,
            default_model: entry.default_model,
            model_count: entry.models.len(),
        }
    }
}

async fn list_providers(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<Vec<ProviderSummary>> {
    Ok(gateway
        .registry
        .list_providers()
        .into_iter()
        .map(ProviderSummary::from)
        .collect())
}

async fn list_byok_providers(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<Vec<ProviderSummary>> {
    Ok(gateway
        .registry
        .list_byok_providers()
        .into_iter()
        .map(ProviderSummary::from)
        .collect())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListAllowedModelsInput {
    provider: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllowedModels {
    provider: String,
    models: Vec<relay_registry::ModelInfo>,
}

async fn list_allowed_models(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: ListAllowedModelsInput,
) -> GatewayResult<AllowedModels> {
    let provider = input
        .provider
        .or_else(|| gateway.single_provider())
        .ok_or_else(|| GatewayError::InvalidArgument("provider is required".into()))?;

    let models = gateway
        .registry
        .list_models(&provider)
        .map_err(from_registry)?;
    let ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();
    let permitted: std::collections::HashSet<&String> = gateway
        .policy
        .filter_models(&provider, &ids)
        .into_iter()
        .collect();

    Ok(AllowedModels {
        models: models
            .into_iter()
            .filter(|m| permitted.contains(&m.id))
            .collect(),
        provider,
    })
}

async fn registry_health(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<relay_registry::RegistryHealth> {
    Ok(gateway.registry.health())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateProviderInput {
    provider: String,
    api_key: SecretString,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateOutcome {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn validate_provider(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: ValidateProviderInput,
) -> GatewayResult<ValidateOutcome> {
    let adapter = gateway.adapter(&input.provider).ok_or_else(|| {
        GatewayError::InvalidArgument(format!("unknown provider: {}", input.provider))
    })?;
    let model = match input.model {
        Some(model) => model,
        None => gateway
            .registry
            .resolve_model(&input.provider, None)
            .map_err(from_registry)?
            .id,
    };

    Ok(match adapter.validate_key(&input.api_key, &model).await {
        Ok(()) => ValidateOutcome {
            valid: true,
            error: None,
        },
        Err(e) => ValidateOutcome {
            valid: false,
            error: Some(e.to_string()),
        },
    })
}
