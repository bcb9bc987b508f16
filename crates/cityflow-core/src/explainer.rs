//! Plain-language explanations of forecasts.
//!
//! An LLM rewrites the prediction for non-technical readers. The prediction
//! itself is fixed: the LLM is told not to change it, and any failure
//! falls back to a fixed template that restates it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cityflow_abstraction::{ChatMessage, Model, ModelError, ModelParameters};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Category value meaning "every category".
pub const ALL_CATEGORIES: &str = "ALL";

const DISCLAIMER: &str = "An additional LLM explanation could not be generated, so this summary is \
based on the thesis context: zeros are generally easier to predict, while non-zero demand, \
especially under cross-city transfer, tends to be more uncertain. Please treat this forecast \
as indicative rather than exact.";

/// What the explanation is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplanationContext {
    /// City of the forecast.
    pub city: String,
    /// Category, if the caller chose one.
    pub category: Option<String>,
    /// Display label of the forecaster.
    pub model_label: String,
    /// The forecaster output.
    pub prediction: String,
    /// The user's question.
    pub query: String,
}

impl ExplanationContext {
    fn specific_category(&self) -> Option<&str> {
        self.category.as_deref().filter(|c| {
            let trimmed = c.trim();
            !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(ALL_CATEGORIES)
        })
    }

    /// `"{city} – {category}"`, or `"{city} (all categories)"`.
    #[must_use]
    pub fn location(&self) -> String {
        match self.specific_category() {
            Some(category) => format!("{} – {category}", self.city),
            None => format!("{} (all categories)", self.city),
        }
    }
}

/// Why the LLM explanation was not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationFailure {
    /// The call exceeded its deadline.
    Timeout,
    /// The key was rejected.
    Authentication,
    /// Quota or rate limit.
    RateLimit,
    /// The provider answered with no text.
    EmptyResponse,
    /// The provider returned an error.
    Provider,
    /// Anything else.
    Other,
}

impl ExplanationFailure {
    /// Buckets a client error.
    #[must_use]
    pub fn classify(error: &ModelError) -> Self {
        match error {
            ModelError::Timeout(_) => Self::Timeout,
            ModelError::AuthenticationFailed(_) => Self::Authentication,
            ModelError::QuotaExceeded { .. } => Self::RateLimit,
            ModelError::EmptyResponse(_) => Self::EmptyResponse,
            ModelError::ModelResponseError(_) | ModelError::RequestError(_) => Self::Provider,
            _ => Self::Other,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::EmptyResponse => "empty_response",
            Self::Provider => "provider",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ExplanationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces explanations, with or without an LLM.
pub struct Explainer {
    llm: Option<Arc<dyn Model>>,
    primary_city: String,
    timeout: Duration,
}

impl fmt::Debug for Explainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Explainer")
            .field("llm", &self.llm.as_ref().map(|m| m.model_id().to_string()))
            .field("primary_city", &self.primary_city)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Explainer {
    /// Creates an explainer. `None` means every explanation uses the fallback.
    pub fn new(llm: Option<Arc<dyn Model>>, primary_city: impl Into<String>, timeout: Duration) -> Self {
        Self { llm, primary_city: primary_city.into(), timeout }
    }

    /// Whether an LLM is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.llm.is_some()
    }

    /// Instruction sent as the system message.
    #[must_use]
    pub fn system_instruction(&self) -> String {
        let home = &self.primary_city;
        format!(
            "You are an assistant that explains city-level POI demand forecasts to non-technical \
business owners (e.g., shop or venue managers).\n\
- The forecast value itself has already been computed by a T5 model; you MUST NOT change or \
re-estimate this number.\n\
- Your job is only to interpret what this demand level means, using the context of mobility \
predictability (Πmax, sparsity q, weekly regularity R).\n\
Avoid jargon and mathematical notation. Do not mention Πmax, q, or R by name; instead talk about \
regular or irregular customer patterns, typical vs unusual days, and uncertainty.\n\
- Be concise (around 2–4 sentences) and avoid making up any new numeric metrics that were not provided.\n\
When the city is \u{201c}{home}\u{201d}, explain that the model was trained on similar {home} data (in-domain).\n\
When the city is any other city, explain that the model was trained on {home} and transferred to \
this city (out-of-domain), so forecasts are more uncertain.\n\
Never invent new numeric metrics or probabilities. Do NOT change the forecast value; always treat \
the given prediction as fixed.\n"
        )
    }

    /// Prompt sent as the user message.
    #[must_use]
    pub fn user_prompt(&self, ctx: &ExplanationContext) -> String {
        let category_clause = if ctx.specific_category().is_some() {
            "The forecast is for a specific category at the city level \
(for example, bars, coffee shops, or metro stations)."
        } else {
            "The forecast is aggregated over all POI categories at the city level."
        };
        let home = &self.primary_city;

        format!(
            "City & category: {location}\n\
{category_clause}\n\n\
User query (natural language): {query}\n\n\
T5 model used: {label}\n\
T5 predicted demand level (as a discrete bucket or score): {prediction}\n\n\
Please explain this forecast in plain English for a non-technical audience.\n\
Start by restating the demand level in simple terms (e.g., very quiet, normal, busier than usual).\n\
If the forecast is for zero or very low demand, you can say that this is usually easier to predict \
and often matches past patterns of quiet hours.\n\
If the forecast suggests higher or non-zero demand, emphasise that such spikes are harder to predict \
and should be treated with more caution.\n\
If the city is not {home}, briefly mention that the model was trained on {home} data and is being \
transferred to this city, so the forecast is approximate.\n\
You may mention, in general terms, that:\n\
- demand forecasting is easier when behaviour is regular and sparse zeros dominate, and harder for \
non-zero spikes or cross-city transfer;\n\
- predictions far from zero should be interpreted with more caution.\n\
Do NOT invent any different demand number. Only explain the meaning and uncertainty around the \
given prediction value.",
            location = ctx.location(),
            query = ctx.query,
            label = ctx.model_label,
            prediction = ctx.prediction,
        )
    }

    /// The text used whenever the LLM is unavailable.
    #[must_use]
    pub fn fallback(ctx: &ExplanationContext) -> String {
        format!(
            "For {}, the model **{}** predicted demand level **{}** based on the input:\n\n> {}\n\n{DISCLAIMER}",
            ctx.location(),
            ctx.model_label,
            ctx.prediction,
            ctx.query
        )
    }

    /// Asks the LLM, returning why it could not be used on failure.
    ///
    /// # Errors
    /// Returns the failure bucket; callers normally use [`Explainer::explain`].
    pub async fn try_explain(&self, ctx: &ExplanationContext) -> Result<String, ExplanationFailure> {
        let Some(llm) = &self.llm else {
            return Err(ExplanationFailure::Other);
        };

        let messages = [ChatMessage::system(self.system_instruction()), ChatMessage::user(self.user_prompt(ctx))];
        let parameters =
            ModelParameters { temperature: Some(0.4), max_tokens: Some(512), ..ModelParameters::default() };

        let completion = llm.generate_chat_completion(&messages, Some(parameters));
        let result = match tokio::time::timeout(self.timeout, completion).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(format!("no answer within {}s", self.timeout.as_secs()))),
        };

        match result {
            Ok(response) => {
                let text = response.content.trim();
                if text.is_empty() {
                    warn!(
                        model_id = %llm.model_id(),
                        failure = %ExplanationFailure::EmptyResponse,
                        "Explanation fell back"
                    );
                    return Err(ExplanationFailure::EmptyResponse);
                }
                Ok(text.to_string())
            }
            Err(error) => {
                let failure = ExplanationFailure::classify(&error);
                warn!(model_id = %llm.model_id(), failure = %failure, error = %error, "Explanation fell back");
                Err(failure)
            }
        }
    }

    /// Explains the forecast. Never fails: any problem yields [`Explainer::fallback`].
    pub async fn explain(&self, ctx: &ExplanationContext) -> String {
        if self.llm.is_none() {
            debug!(city = %ctx.city, "No LLM configured, using fallback explanation");
            return Self::fallback(ctx);
        }

        match self.try_explain(ctx).await {
            Ok(text) => {
                info!(city = %ctx.city, chars = text.len(), "LLM explanation generated");
                text
            }
            Err(_) => Self::fallback(ctx),
        }
    }
}
