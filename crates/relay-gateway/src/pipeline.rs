//! The `generateText` pipeline.
//!
//! Received → Validated → Admitted → Resolved → Reserved → Executing →
//! Settling → Done, with `Rejected` and `Failed` terminals:
//!
//! - validation failures reject with `InvalidArgument`
//! - admission failures reject with `Forbidden`
//! - resolution failures reject with `NoCredential` / `DecryptAuthFailed`
//! - reservation failures reject with `InsufficientBalance`
//! - execution failures fail with `Upstream{kind}` and refund the hold;
//!   a failed refund records a `lost` compensating event
//! - settlement runs to completion even if the caller has gone away; a
//!   settlement rejected for expiry records a `lost` event without
//!   failing the response

use relay_core::{GatewayError, GatewayResult, RequestContext, SecretString, UserId};
use relay_ledger::{ReserveOutcome, SettleInput};
use relay_llm::{
    ChatMessage, GenerateRequest, Generated, TextProvider, WebSearchOptions, WebSearchPreference,
    estimate_tokens,
};
use relay_policy::{AdmissionRequest, CallerKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{cancelled, from_admission, from_ledger, from_provider, from_registry, from_vault};
use crate::resolver::{CredentialSource, resolve_credential};
use crate::state::Gateway;

/// `ai.generateText` input.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTextInput {
    /// The user content to complete.
    pub content: String,
    /// System prompt; falls back to the provider's configured default.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Target provider; resolution falls back to the caller's preference,
    /// then the single configured provider.
    #[serde(default)]
    pub provider: Option<String>,
    /// Inline API key (tooling that already holds one). Never persisted.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// BYOK unlock secret; overrides the transport-level header.
    #[serde(default)]
    pub unlock_secret: Option<SecretString>,
    /// Pass-through request metadata.
    #[serde(default)]
    pub metadata: Option<RequestMetadata>,
    /// Generation options.
    #[serde(default)]
    pub options: Option<GenerateOptions>,
}

/// Pass-through metadata; the pipeline hands this to the adapter opaquely.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestMetadata {
    /// Whether search should augment the prompt.
    pub use_web_search: bool,
    /// Search mechanism.
    pub web_search_preference: WebSearchPreference,
    /// Domains results may come from.
    pub allowed_domains: Vec<String>,
    /// Domains filtered out.
    pub blocked_domains: Vec<String>,
}

/// Generation options.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateOptions {
    /// Model override.
    pub model: Option<String>,
    /// Output token cap; server default applies when absent.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
}

/// Token accounting surfaced to the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Pre-flight estimate the reservation was made with.
    pub estimated_tokens: u64,
    /// Actual input tokens.
    pub input_tokens: u64,
    /// Actual output tokens.
    pub output_tokens: u64,
    /// Tokens charged against the balance (0 for BYOK traffic).
    pub tokens_charged: u64,
    /// Balance after settlement; `null` for unmetered traffic.
    pub remaining_balance: Option<u64>,
    /// True when token counts were estimated locally.
    pub counts_estimated: bool,
}

/// Request provenance surfaced to the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
    /// Provider that served the request.
    pub provider: String,
    /// Model that served the request.
    pub model: String,
    /// Where the credential came from.
    pub credential_source: CredentialSource,
    /// Provider-side request id.
    pub provider_request_id: Option<String>,
    /// Wall time spent in the pipeline, milliseconds.
    pub duration_ms: u64,
}

/// `ai.generateText` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTextOutput {
    /// Always true on this path; failures surface as errors.
    pub success: bool,
    /// The generated text.
    pub data: String,
    /// Token accounting.
    pub token_usage: TokenUsage,
    /// Request provenance.
    pub usage_info: UsageInfo,
}

/// Run the pipeline for one request.
///
/// # Errors
///
/// Maps each stage's failure to its `GatewayError` kind; see the module
/// docs for the full table.
pub async fn generate_text(
    gateway: &Gateway,
    ctx: &RequestContext,
    input: GenerateTextInput,
) -> GatewayResult<GenerateTextOutput> {
    let started = std::time::Instant::now();

    // Received → Validated
    let user = ctx.require_user()?.clone();
    let profile = gateway.ensure_user(&user).await?;
    let options = input.options.unwrap_or_default();
    let limits = &gateway.config.limits;

    if input.content.is_empty() {
        return Err(GatewayError::InvalidArgument("content must not be empty".into()));
    }
    if input.content.len() > limits.content_max_length {
        return Err(GatewayError::InvalidArgument(format!(
            "content exceeds {} characters",
            limits.content_max_length
        )));
    }
    if let Some(system) = &input.system_prompt
        && system.len() > limits.system_prompt_max_length
    {
        return Err(GatewayError::InvalidArgument(format!(
            "systemPrompt exceeds {} characters",
            limits.system_prompt_max_length
        )));
    }
    let max_tokens = options.max_tokens.unwrap_or(limits.default_max_tokens);
    if max_tokens > limits.max_max_tokens {
        return Err(GatewayError::InvalidArgument(format!(
            "maxTokens {} exceeds ceiling {}",
            max_tokens, limits.max_max_tokens
        )));
    }

    let provider = input
        .provider
        .or_else(|| profile.preferences.default_provider.clone())
        .or_else(|| gateway.single_provider())
        .ok_or_else(|| {
            GatewayError::InvalidArgument("no provider specified and none configured".into())
        })?;

    // Validated → Admitted
    let byok_present = gateway
        .vault
        .status(&user, &provider)
        .await
        .map_err(from_vault)?
        .present;
    let provider_entry = gateway.registry.provider(&provider).ok();
    let default_model = provider_entry.as_ref().and_then(|e| e.default_model.clone());
    let effective_model = gateway
        .policy
        .admit(AdmissionRequest {
            provider: &provider,
            model: options.model.as_deref(),
            default_model: default_model.as_deref(),
            caller: CallerKind::Authenticated,
            byok_present,
        })
        .map_err(from_admission)?;

    let model = gateway
        .registry
        .resolve_model(&provider, effective_model.as_deref())
        .map_err(from_registry)?;

    // Admitted → Resolved
    let resolve_ctx = match input.unlock_secret {
        Some(unlock) => {
            let mut ctx = ctx.clone();
            ctx.byok_unlock = Some(unlock);
            ctx
        },
        None => ctx.clone(),
    };
    let credential = resolve_credential(gateway, &resolve_ctx, &provider, input.api_key).await?;

    // Resolved → Reserved
    let system = input
        .system_prompt
        .or_else(|| gateway.system_prompt(&provider).map(str::to_string))
        .unwrap_or_default();
    let estimated_tokens = estimate_tokens(&system)
        .saturating_add(estimate_tokens(&input.content))
        .saturating_add(u64::from(max_tokens));
    let reservation = gateway
        .ledger
        .reserve(
            &user,
            estimated_tokens,
            model.reserve_price_per_token(),
            credential.has_own_key(),
        )
        .await
        .map_err(from_ledger)?;

    // Reserved → Executing
    let request = GenerateRequest {
        model: model.id.clone(),
        system,
        messages: vec![ChatMessage::user(input.content)],
        max_tokens,
        temperature: options.temperature,
        web_search: input.metadata.and_then(search_options),
        timeout: Some(gateway.request_deadline()),
    };
    let adapter = gateway.adapter(&provider).ok_or_else(|| {
        GatewayError::Internal(format!("no adapter for provider {provider}"))
    })?;

    let generated = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => {
            release_hold(gateway, &user, &provider, &model.id, &reservation).await;
            return Err(cancelled());
        }
        result = adapter.generate(&credential.key, &request) => match result {
            Ok(generated) => generated,
            Err(e) => {
                release_hold(gateway, &user, &provider, &model.id, &reservation).await;
                return Err(from_provider(e));
            }
        },
    };

    // Executing → Settling → Done. Cancellation is deliberately ignored
    // from here on; settlement is cheap and idempotent.
    let token_usage = settle(gateway, &user, &provider, &model, &reservation, &generated).await;

    info!(
        user = %user,
        provider = %provider,
        model = %model.id,
        input_tokens = generated.input_tokens,
        output_tokens = generated.output_tokens,
        charged = token_usage.tokens_charged,
        "Request complete"
    );

    Ok(GenerateTextOutput {
        success: true,
        data: generated.text,
        token_usage: TokenUsage {
            estimated_tokens,
            ..token_usage
        },
        usage_info: UsageInfo {
            provider,
            model: model.id,
            credential_source: credential.source,
            provider_request_id: generated.provider_request_id,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        },
    })
}

fn search_options(metadata: RequestMetadata) -> Option<WebSearchOptions> {
    if !metadata.use_web_search {
        return None;
    }
    Some(WebSearchOptions {
        preference: metadata.web_search_preference,
        allowed_domains: metadata.allowed_domains,
        blocked_domains: metadata.blocked_domains,
    })
}

/// Refund a held reservation after a failed or cancelled execution. A
/// refund that itself fails becomes a `lost` event; the caller still gets
/// the original failure.
async fn release_hold(
    gateway: &Gateway,
    user: &UserId,
    provider: &str,
    model: &str,
    reservation: &ReserveOutcome,
) {
    let Some(reservation_id) = reservation.reservation_id() else {
        return;
    };
    if let Err(e) = gateway.ledger.refund(reservation_id).await {
        warn!(reservation = %reservation_id, error = %e, "Refund failed");
        if let Err(e) = gateway
            .ledger
            .record_lost(user, provider, model, 0, 0, 0.0, Some(reservation_id))
            .await
        {
            warn!(reservation = %reservation_id, error = %e, "Lost-usage record also failed");
        }
    }
}

/// Settle the reservation against actual counts. Never fails the caller:
/// a rejected settlement (expiry, races) records a `lost` event and
/// reports zero charge.
async fn settle(
    gateway: &Gateway,
    user: &UserId,
    provider: &str,
    model: &relay_registry::ModelInfo,
    reservation: &ReserveOutcome,
    generated: &Generated,
) -> TokenUsage {
    let unmetered_usage = || TokenUsage {
        estimated_tokens: 0,
        input_tokens: generated.input_tokens,
        output_tokens: generated.output_tokens,
        tokens_charged: 0,
        remaining_balance: None,
        counts_estimated: generated.counts_estimated,
    };

    match reservation {
        ReserveOutcome::Unmetered => {
            if let Err(e) = gateway
                .ledger
                .record_unmetered(
                    user,
                    provider,
                    &model.id,
                    generated.input_tokens,
                    generated.output_tokens,
                )
                .await
            {
                warn!(user = %user, error = %e, "Failed to record unmetered usage");
            }
            unmetered_usage()
        },
        ReserveOutcome::Held { reservation_id, .. } => {
            let cost_usd = model.cost_usd(generated.input_tokens, generated.output_tokens);
            let fee_rate = gateway.ledger.settings().platform_fee_rate;
            let settle_input = SettleInput {
                reservation_id: *reservation_id,
                provider: provider.to_string(),
                model: model.id.clone(),
                input_tokens: generated.input_tokens,
                output_tokens: generated.output_tokens,
                cost_usd,
                platform_fee_usd: Some(cost_usd * fee_rate),
                consumption_order: None,
            };
            match gateway.ledger.settle(settle_input).await {
                Ok(settlement) => TokenUsage {
                    estimated_tokens: 0,
                    input_tokens: generated.input_tokens,
                    output_tokens: generated.output_tokens,
                    tokens_charged: settlement.tokens_charged,
                    remaining_balance: Some(settlement.remaining_balance),
                    counts_estimated: generated.counts_estimated,
                },
                Err(e) => {
                    warn!(reservation = %reservation_id, error = %e, "Settlement rejected");
                    if let Err(e) = gateway
                        .ledger
                        .record_lost(
                            user,
                            provider,
                            &model.id,
                            generated.input_tokens,
                            generated.output_tokens,
                            cost_usd,
                            Some(*reservation_id),
                        )
                        .await
                    {
                        warn!(reservation = %reservation_id, error = %e, "Lost-usage record failed");
                    }
                    unmetered_usage()
                },
            }
        },
    }
}
