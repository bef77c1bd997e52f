//! Relay pipeline: one user message in, one personality reply delivered.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use super::templates::ErrorTemplates;
use crate::core::{ModelClient, ModelError, Personality, RequestContext};
use crate::features::dedup::{
    classify_model_error, classify_response, subject_key, BlackoutPolicy, BlackoutRegistry,
    DedupManager, FailureTier, ResponseClass,
};
use crate::features::delivery::{
    DeliveryError, DeliveryOptions, DeliveryOrchestrator, DeliveryResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Generated,
    SoftError { reference: String },
    HardError { reference: String },
}

impl ReplyKind {
    pub fn is_error(&self) -> bool {
        !matches!(self, ReplyKind::Generated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    pub kind: ReplyKind,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub personality: Personality,
    pub content: String,
    pub context: RequestContext,
}

#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub request_id: Uuid,
    pub reply: GeneratedReply,
    pub delivery: Result<DeliveryResult, DeliveryError>,
}

#[derive(Clone)]
pub struct Relay {
    dedup: DedupManager<GeneratedReply>,
    model: Arc<dyn ModelClient>,
    orchestrator: DeliveryOrchestrator,
    policy: BlackoutPolicy,
    templates: ErrorTemplates,
    model_timeout: Duration,
}

impl Relay {
    pub fn new(
        dedup: DedupManager<GeneratedReply>,
        model: Arc<dyn ModelClient>,
        orchestrator: DeliveryOrchestrator,
        policy: BlackoutPolicy,
        templates: ErrorTemplates,
        model_timeout: Duration,
    ) -> Self {
        Self {
            dedup,
            model,
            orchestrator,
            policy,
            templates,
            model_timeout,
        }
    }

    pub fn dedup(&self) -> &DedupManager<GeneratedReply> {
        &self.dedup
    }

    pub fn orchestrator(&self) -> &DeliveryOrchestrator {
        &self.orchestrator
    }

    /// Generate a reply and deliver it to the request's channel
    pub async fn handle(&self, request: RelayRequest) -> RelayOutcome {
        let request_id = Uuid::new_v4();
        let reply = self.generate(&request, request_id).await;

        let options = DeliveryOptions {
            request_id: Some(request_id),
            ..DeliveryOptions::default()
        };
        let delivery = self
            .orchestrator
            .deliver(
                &request.context.channel_id,
                &request.personality,
                &reply.text,
                &options,
            )
            .await;

        if let Err(ref e) = delivery {
            error!("[{request_id}] Reply from {} was not delivered: {e}", request.personality.id);
        }

        RelayOutcome {
            request_id,
            reply,
            delivery,
        }
    }

    /// Model reply for a request, or a placeholder when the model failed.
    /// Callers coalesced onto one in-flight call share the same reply,
    /// placeholder reference included.
    pub async fn generate(&self, request: &RelayRequest, request_id: Uuid) -> GeneratedReply {
        let personality = &request.personality;
        let context = &request.context;
        let subject = subject_key(&personality.id, &context.user_id, &context.channel_id);

        // Advisory only
        if let Some(remaining) = self.dedup.blackouts().remaining(&subject) {
            info!(
                "[{request_id}] {subject} is in blackout for another {:?}, calling model anyway",
                remaining
            );
        }

        let fingerprint = self
            .dedup
            .compute_fingerprint(&personality.id, &request.content, context);
        debug!("[{request_id}] Fingerprint {fingerprint}");

        let model = Arc::clone(&self.model);
        let settle = self.settle(subject, personality, request_id);
        let fallback = settle.clone();
        let work_content = request.content.clone();
        let work_context = context.clone();
        let limit = self.model_timeout;

        let settled = self
            .dedup
            .submit(fingerprint, move || async move {
                let outcome = match timeout(
                    limit,
                    model.invoke(&settle.personality, &work_content, &work_context),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ModelError::Timeout(limit)),
                };
                settle.reply(outcome)
            })
            .await;

        match settled {
            Ok(reply) => reply,
            Err(e) => fallback.reply(Err(ModelError::Api(e.to_string()))),
        }
    }

    fn settle(&self, subject: String, personality: &Personality, request_id: Uuid) -> Settle {
        Settle {
            subject,
            personality: personality.clone(),
            templates: self.templates.clone(),
            policy: self.policy,
            blackouts: self.dedup.blackouts().clone(),
            request_id,
        }
    }
}

/// Turns one model outcome into the reply every coalesced caller delivers
#[derive(Clone)]
struct Settle {
    subject: String,
    personality: Personality,
    templates: ErrorTemplates,
    policy: BlackoutPolicy,
    blackouts: BlackoutRegistry,
    request_id: Uuid,
}

impl Settle {
    fn reply(&self, outcome: Result<String, ModelError>) -> GeneratedReply {
        let request_id = self.request_id;
        let subject = &self.subject;

        let tier = match outcome {
            Ok(text) => match classify_response(&text) {
                ResponseClass::Valid => {
                    return GeneratedReply {
                        kind: ReplyKind::Generated,
                        text,
                    };
                }
                ResponseClass::Empty => {
                    warn!("[{request_id}] Model returned an empty reply for {subject}");
                    FailureTier::Soft
                }
                ResponseClass::Technical => {
                    warn!(
                        "[{request_id}] Model reply for {subject} looks like an error: {:.120}",
                        text
                    );
                    FailureTier::Hard
                }
            },
            Err(e) => {
                error!("[{request_id}] Model call failed for {subject}: {e}");
                classify_model_error(&e)
            }
        };

        let duration = self.policy.duration_for(tier);
        self.blackouts.record_failure(subject, duration);

        let rendered = self.templates.render(tier, Some(&self.personality));
        error!(
            "[{request_id}] ❌ Sending {:?} placeholder for {subject} (Reference: {}), blackout {:?}",
            tier, rendered.reference, duration
        );

        let kind = match tier {
            FailureTier::Soft => ReplyKind::SoftError {
                reference: rendered.reference,
            },
            FailureTier::Hard => ReplyKind::HardError {
                reference: rendered.reference,
            },
        };

        GeneratedReply {
            kind,
            text: rendered.text,
        }
    }
}
