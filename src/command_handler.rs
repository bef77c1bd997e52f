//! Prefix commands: `!<personality> <text>` relays `<text>` to that
//! personality and posts the reply under its name.

use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::RequestContext;
use crate::features::personas::PersonaManager;
use crate::features::relay::{Relay, RelayOutcome, RelayRequest};

/// A chat message as seen by the command layer
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub author_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub content: String,
    /// Content of the message this one replies to
    pub referenced_content: Option<String>,
    pub in_guild: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub personality_id: String,
    pub text: &'a str,
}

/// Split `!obi hello there` into `("obi", "hello there")`
pub fn parse_invocation<'a>(prefix: &str, content: &'a str) -> Option<Invocation<'a>> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let (command, text) = match rest.find(char::is_whitespace) {
        Some(at) => (&rest[..at], rest[at..].trim()),
        None => (rest, ""),
    };
    if command.is_empty() {
        return None;
    }
    Some(Invocation {
        personality_id: command.to_lowercase(),
        text,
    })
}

#[derive(Clone)]
pub struct CommandHandler {
    relay: Relay,
    personas: Arc<PersonaManager>,
    prefix: String,
}

impl CommandHandler {
    pub fn new(relay: Relay, personas: Arc<PersonaManager>, prefix: impl Into<String>) -> Self {
        Self {
            relay,
            personas,
            prefix: prefix.into(),
        }
    }

    /// Relay the message if it invokes a known personality. Returns `None`
    /// for messages that are not ours to handle.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Option<RelayOutcome> {
        if !msg.in_guild {
            return None;
        }

        let invocation = parse_invocation(&self.prefix, &msg.content)?;
        let personality = match self.personas.get_personality(&invocation.personality_id) {
            Some(p) => p.clone(),
            None => {
                debug!("Ignoring unknown command {}{}", self.prefix, invocation.personality_id);
                return None;
            }
        };

        if invocation.text.is_empty() {
            warn!(
                "{}{} from {} has no text, ignoring",
                self.prefix, personality.id, msg.author_id
            );
            return None;
        }

        let mut context = RequestContext::new(msg.author_id.clone(), msg.channel_id.clone())
            .with_message_id(msg.message_id.clone());
        if let Some(ref referenced) = msg.referenced_content {
            context = context.with_reference(referenced.clone());
        }

        let request = RelayRequest {
            personality,
            content: invocation.text.to_string(),
            context,
        };

        let outcome = self.relay.handle(request).await;
        log_outcome(&outcome);
        Some(outcome)
    }
}

fn log_outcome(outcome: &RelayOutcome) {
    let request_id: Uuid = outcome.request_id;
    match &outcome.delivery {
        Ok(result) if result.is_complete() => info!(
            "[{request_id}] Relay finished: {:?}, {} chunk(s) delivered",
            outcome.reply.kind, result.delivered
        ),
        Ok(result) => warn!(
            "[{request_id}] Relay finished with partial delivery ({}/{})",
            result.delivered, result.total_chunks
        ),
        Err(e) => warn!("[{request_id}] Relay finished without delivery: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DeliverySettings;
    use crate::core::{
        AvatarProbe, ManualClock, ModelClient, ModelError, Personality, PlatformClient,
        PlatformError, SendAck, SendPayload, SenderIdentity,
    };
    use crate::features::dedup::{BlackoutPolicy, DedupManager};
    use crate::features::delivery::DeliveryOrchestrator;
    use crate::features::identity::SenderIdentityCache;
    use crate::features::profiles::AvatarValidator;
    use crate::features::relay::{ErrorTemplates, ReplyKind};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_parse_invocation() {
        assert_eq!(
            parse_invocation("!", "!obi hello there"),
            Some(Invocation { personality_id: "obi".into(), text: "hello there" })
        );
        assert_eq!(
            parse_invocation("!", "  !OBI   spaced out  "),
            Some(Invocation { personality_id: "obi".into(), text: "spaced out" })
        );
        assert_eq!(
            parse_invocation("!", "!obi"),
            Some(Invocation { personality_id: "obi".into(), text: "" })
        );
        assert_eq!(parse_invocation("!", "hello !obi"), None);
        assert_eq!(parse_invocation("!", "! obi"), None);
        assert_eq!(
            parse_invocation("p/", "p/chef\nmulti\nline"),
            Some(Invocation { personality_id: "chef".into(), text: "multi\nline" })
        );
    }

    /// Echoes what it was asked, with the referenced message when present
    struct EchoModel {
        seen: Mutex<Vec<RequestContext>>,
    }

    #[async_trait]
    impl ModelClient for EchoModel {
        async fn invoke(
            &self,
            personality: &Personality,
            content: &str,
            context: &RequestContext,
        ) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(context.clone());
            Ok(format!("{} says: {content}", personality.display_name))
        }
    }

    #[derive(Default)]
    struct RecordingPlatform {
        sent: Mutex<Vec<SendPayload>>,
    }

    #[async_trait]
    impl PlatformClient for RecordingPlatform {
        async fn create_identity(&self, channel_id: &str) -> Result<SenderIdentity, PlatformError> {
            Ok(SenderIdentity {
                channel_id: channel_id.to_string(),
                external_id: "hook".into(),
                secret_token: "secret".into(),
                endpoint_url: "https://example.test/webhooks/hook/secret".into(),
                created_at: Utc::now(),
            })
        }

        async fn send(&self, _identity: &SenderIdentity, payload: &SendPayload) -> Result<SendAck, PlatformError> {
            self.sent.lock().unwrap().push(payload.clone());
            Ok(SendAck::default())
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl AvatarProbe for AcceptAll {
        async fn probe(&self, _url: &str) -> bool {
            true
        }
    }

    fn handler(model: Arc<EchoModel>, platform: Arc<RecordingPlatform>) -> CommandHandler {
        let clock = Arc::new(ManualClock::new());
        let orchestrator = DeliveryOrchestrator::new(
            platform.clone(),
            SenderIdentityCache::new(platform),
            AvatarValidator::new(Arc::new(AcceptAll), None, Duration::from_secs(1)),
            clock.clone(),
            DeliverySettings::default(),
        );
        let relay = Relay::new(
            DedupManager::new(clock),
            model,
            orchestrator,
            BlackoutPolicy::default(),
            ErrorTemplates::default(),
            Duration::from_secs(5),
        );
        let personas = PersonaManager::from_yaml(
            "personalities: [{ id: obi, display_name: Obi-Wan, system_prompt: You are Obi-Wan. }]",
        )
        .unwrap();
        CommandHandler::new(relay, Arc::new(personas), "!")
    }

    fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            author_id: "user-1".into(),
            channel_id: "chan-1".into(),
            message_id: "m1".into(),
            content: content.into(),
            referenced_content: None,
            in_guild: true,
        }
    }

    #[tokio::test]
    async fn test_known_personality_relayed() {
        let model = Arc::new(EchoModel { seen: Mutex::new(vec![]) });
        let platform = Arc::new(RecordingPlatform::default());
        let handler = handler(model, platform.clone());

        let outcome = handler.handle_message(&message("!obi Hello there")).await.unwrap();

        assert_eq!(outcome.reply.kind, ReplyKind::Generated);
        let sent = platform.sent.lock().unwrap();
        assert_eq!(sent[0].content, "Obi-Wan says: Hello there");
        assert_eq!(sent[0].username, "Obi-Wan");
    }

    #[tokio::test]
    async fn test_reference_passed_to_model() {
        let model = Arc::new(EchoModel { seen: Mutex::new(vec![]) });
        let platform = Arc::new(RecordingPlatform::default());
        let handler = handler(model.clone(), platform);

        let mut msg = message("!obi what do you make of this?");
        msg.referenced_content = Some("I have a bad feeling about this".into());
        handler.handle_message(&msg).await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].message_id.as_deref(), Some("m1"));
        assert_eq!(
            seen[0].reference_content.as_deref(),
            Some("I have a bad feeling about this")
        );
    }

    #[tokio::test]
    async fn test_ignored_messages() {
        let model = Arc::new(EchoModel { seen: Mutex::new(vec![]) });
        let platform = Arc::new(RecordingPlatform::default());
        let handler = handler(model.clone(), platform.clone());

        assert!(handler.handle_message(&message("hello")).await.is_none());
        assert!(handler.handle_message(&message("!yoda hello")).await.is_none());
        assert!(handler.handle_message(&message("!obi")).await.is_none());

        let mut dm = message("!obi hello");
        dm.in_guild = false;
        assert!(handler.handle_message(&dm).await.is_none());

        assert!(model.seen.lock().unwrap().is_empty());
        assert!(platform.sent.lock().unwrap().is_empty());
    }
}
