use anyhow::Result;
use dotenvy::dotenv;
use log::{debug, error, info, warn};
use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use persona_relay::adapters::{DiscordWebhooks, HttpProfileFetcher, OpenAiModel, ReqwestAvatarProbe};
use persona_relay::command_handler::{CommandHandler, IncomingMessage};
use persona_relay::core::{Clock, Config, PipelineConfig, TokioClock};
use persona_relay::features::dedup::{BlackoutPolicy, BlackoutRegistry, DedupManager};
use persona_relay::features::delivery::{DeliveryOrchestrator, RecentSends};
use persona_relay::features::identity::SenderIdentityCache;
use persona_relay::features::personas::PersonaManager;
use persona_relay::features::profiles::{AvatarValidator, ProfileInfoCache};
use persona_relay::features::relay::{ErrorTemplates, GeneratedReply, Relay};

struct Handler {
    command_handler: CommandHandler,
    personality_count: usize,
}

impl Handler {
    fn to_incoming(msg: &Message) -> IncomingMessage {
        IncomingMessage {
            author_id: msg.author.id.0.to_string(),
            channel_id: msg.channel_id.0.to_string(),
            message_id: msg.id.0.to_string(),
            content: msg.content.clone(),
            referenced_content: msg
                .referenced_message
                .as_ref()
                .map(|m| m.content.clone())
                .filter(|c| !c.trim().is_empty()),
            in_guild: msg.guild_id.is_some(),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, msg: Message) {
        // Our own webhook posts arrive as bot messages too
        if msg.author.bot || msg.webhook_id.is_some() {
            return;
        }

        let incoming = Self::to_incoming(&msg);
        let handler = self.command_handler.clone();
        tokio::spawn(async move {
            if handler.handle_message(&incoming).await.is_none() {
                debug!("Message {} not handled", incoming.message_id);
            }
        });
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        info!("🎭 {} personalities available", self.personality_count);
    }
}

fn load_pipeline_config(path: Option<&str>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::load(path)?;
            info!("📄 Loaded pipeline config from {path}");
            Ok(config)
        }
        None => {
            info!("📄 No PIPELINE_CONFIG_PATH set - using default pipeline settings");
            Ok(PipelineConfig::default())
        }
    }
}

/// Periodically drop expired blackouts and sent-chunk hashes
fn spawn_prune_task(blackouts: BlackoutRegistry, recent: RecentSends, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let pruned = blackouts.prune();
            let sends = recent.prune();
            if pruned + sends > 0 {
                debug!("Pruned {pruned} blackout(s) and {sends} sent-chunk hash(es)");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    // The openai crate reads its key from the environment
    std::env::set_var("OPENAI_API_KEY", &config.openai_api_key);
    std::env::set_var("OPENAI_KEY", &config.openai_api_key);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Persona Relay...");

    let pipeline = load_pipeline_config(config.pipeline_config_path.as_deref())?;
    pipeline.validate()?;

    let personas = Arc::new(PersonaManager::load(&config.personalities_path)?);
    if personas.is_empty() {
        warn!("No personalities configured in {}", config.personalities_path);
    }

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);

    let platform = Arc::new(DiscordWebhooks::new(
        config.discord_token.clone(),
        config.webhook_name.clone(),
    ));
    let identities = SenderIdentityCache::new(platform.clone())
        .with_max_age(pipeline.identity.max_age_secs.map(Duration::from_secs));

    let avatars = AvatarValidator::new(
        Arc::new(ReqwestAvatarProbe::new(pipeline.delivery.avatar_timeout())),
        pipeline.delivery.default_avatar_url.clone(),
        pipeline.delivery.avatar_timeout(),
    );

    let mut orchestrator = DeliveryOrchestrator::new(
        platform,
        identities,
        avatars,
        Arc::clone(&clock),
        pipeline.delivery.clone(),
    );
    if let Some(ref base_url) = config.profile_api_base_url {
        info!("👤 Profile lookups enabled via {base_url}");
        let fetcher = HttpProfileFetcher::new(base_url.clone(), pipeline.profiles.fetch_timeout());
        orchestrator = orchestrator.with_profiles(ProfileInfoCache::new(
            Arc::new(fetcher),
            Arc::clone(&clock),
            pipeline.profiles.clone(),
        ));
    }

    let dedup = DedupManager::<GeneratedReply>::new(Arc::clone(&clock));
    spawn_prune_task(
        dedup.blackouts().clone(),
        orchestrator.recent_sends().clone(),
        Duration::from_secs(pipeline.blackout.prune_interval_secs.max(1)),
    );

    let relay = Relay::new(
        dedup,
        Arc::new(OpenAiModel::new(config.openai_model.clone())),
        orchestrator,
        BlackoutPolicy::from(&pipeline.blackout),
        ErrorTemplates::from(&pipeline.messages),
        Duration::from_secs(pipeline.model.timeout_secs),
    );

    let handler = Handler {
        command_handler: CommandHandler::new(relay, Arc::clone(&personas), config.command_prefix.clone()),
        personality_count: personas.len(),
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Establishing WebSocket connection to Discord gateway...");
    info!("Gateway intents: {intents:?}");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
