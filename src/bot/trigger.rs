use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    all::{ComponentInteraction, Context, Message, Reaction, ReactionType},
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponseFollowup, CreateMessage,
    },
    model::id::{ChannelId, GuildId, UserId},
};
use std::time::Duration;
use tracing::debug;

use crate::ui::embeds;

const CONFIRM: &str = "✅";
const CANCEL: &str = "❌";

/// ✅ y ❌ están reservados para las confirmaciones
pub fn is_confirmation_emoji(emoji: &str) -> bool {
    emoji == CONFIRM || emoji == CANCEL
}

/// Respuesta que un handler envía al canal de origen
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Embed(CreateEmbed),
    Panel {
        embed: CreateEmbed,
        components: Vec<CreateActionRow>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Cancelled,
    TimedOut,
}

/// Archivo adjunto ya descargado
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Lo que dispara un comando: un mensaje, un botón o una reacción.
///
/// Los handlers sólo dependen de esta interfaz, así que la misma lógica sirve
/// para las tres fuentes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Trigger: Send + Sync {
    fn guild_id(&self) -> Option<GuildId>;

    fn author_id(&self) -> UserId;

    fn channel_id(&self) -> ChannelId;

    /// Canal de voz en el que está el autor, según la caché
    fn author_voice_channel(&self) -> Option<ChannelId>;

    async fn send(&self, reply: Reply) -> Result<()>;

    /// Pregunta sí/no al autor con reacciones ✅ / ❌
    async fn confirm(&self, prompt: String, timeout: Duration) -> Result<Confirmation>;

    /// Primer adjunto del mensaje, si lo hay
    async fn attachment(&self) -> Result<Option<UploadedFile>>;
}

fn voice_channel_of(ctx: &Context, guild_id: Option<GuildId>, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id?)?;
    guild.voice_states.get(&user_id).and_then(|state| state.channel_id)
}

fn message_from(reply: Reply) -> CreateMessage {
    match reply {
        Reply::Text(text) => CreateMessage::new().content(text),
        Reply::Embed(embed) => CreateMessage::new().embed(embed),
        Reply::Panel { embed, components } => CreateMessage::new().embed(embed).components(components),
    }
}

/// Agrega ✅ y ❌ al mensaje y espera la reacción del autor
async fn await_confirmation(
    ctx: &Context,
    prompt: &Message,
    author_id: UserId,
    timeout: Duration,
) -> Result<Confirmation> {
    prompt.react(&ctx.http, ReactionType::Unicode(CONFIRM.to_string())).await?;
    prompt.react(&ctx.http, ReactionType::Unicode(CANCEL.to_string())).await?;

    let reaction = prompt
        .await_reaction(ctx)
        .author_id(author_id)
        .timeout(timeout)
        .filter(|r| matches!(&r.emoji, ReactionType::Unicode(e) if e == CONFIRM || e == CANCEL))
        .await;

    let answer = match reaction {
        Some(r) if matches!(&r.emoji, ReactionType::Unicode(e) if e == CONFIRM) => Confirmation::Confirmed,
        Some(_) => Confirmation::Cancelled,
        None => Confirmation::TimedOut,
    };
    debug!("Confirmación de {}: {:?}", author_id, answer);
    Ok(answer)
}

/// Comando escrito en un canal de texto
pub struct MessageTrigger {
    ctx: Context,
    msg: Message,
    voice_channel: Option<ChannelId>,
}

impl MessageTrigger {
    pub fn new(ctx: Context, msg: Message) -> Self {
        let voice_channel = voice_channel_of(&ctx, msg.guild_id, msg.author.id);
        Self { ctx, msg, voice_channel }
    }
}

#[async_trait]
impl Trigger for MessageTrigger {
    fn guild_id(&self) -> Option<GuildId> {
        self.msg.guild_id
    }

    fn author_id(&self) -> UserId {
        self.msg.author.id
    }

    fn channel_id(&self) -> ChannelId {
        self.msg.channel_id
    }

    fn author_voice_channel(&self) -> Option<ChannelId> {
        self.voice_channel
    }

    async fn send(&self, reply: Reply) -> Result<()> {
        self.msg.channel_id.send_message(&self.ctx.http, message_from(reply)).await?;
        Ok(())
    }

    async fn confirm(&self, prompt: String, timeout: Duration) -> Result<Confirmation> {
        let embed = embeds::create_warning_embed("Confirmación", &prompt);
        let sent = self
            .msg
            .channel_id
            .send_message(&self.ctx.http, CreateMessage::new().embed(embed))
            .await?;
        await_confirmation(&self.ctx, &sent, self.msg.author.id, timeout).await
    }

    async fn attachment(&self) -> Result<Option<UploadedFile>> {
        let Some(attachment) = self.msg.attachments.first() else {
            return Ok(None);
        };
        let data = attachment.download().await?;
        Ok(Some(UploadedFile {
            filename: attachment.filename.clone(),
            data,
        }))
    }
}

/// Botón pulsado. La interacción se difiere al crearlo y las respuestas se
/// envían como followups.
pub struct ComponentTrigger {
    ctx: Context,
    interaction: ComponentInteraction,
    voice_channel: Option<ChannelId>,
}

impl ComponentTrigger {
    pub async fn new(ctx: Context, interaction: ComponentInteraction) -> Result<Self> {
        interaction.defer(&ctx.http).await?;
        let voice_channel = voice_channel_of(&ctx, interaction.guild_id, interaction.user.id);
        Ok(Self {
            ctx,
            interaction,
            voice_channel,
        })
    }
}

#[async_trait]
impl Trigger for ComponentTrigger {
    fn guild_id(&self) -> Option<GuildId> {
        self.interaction.guild_id
    }

    fn author_id(&self) -> UserId {
        self.interaction.user.id
    }

    fn channel_id(&self) -> ChannelId {
        self.interaction.channel_id
    }

    fn author_voice_channel(&self) -> Option<ChannelId> {
        self.voice_channel
    }

    async fn send(&self, reply: Reply) -> Result<()> {
        let followup = match reply {
            Reply::Text(text) => CreateInteractionResponseFollowup::new().content(text),
            Reply::Embed(embed) => CreateInteractionResponseFollowup::new().embed(embed),
            Reply::Panel { embed, components } => CreateInteractionResponseFollowup::new()
                .embed(embed)
                .components(components),
        };
        self.interaction.create_followup(&self.ctx.http, followup).await?;
        Ok(())
    }

    async fn confirm(&self, prompt: String, timeout: Duration) -> Result<Confirmation> {
        let embed = embeds::create_warning_embed("Confirmación", &prompt);
        let sent = self
            .interaction
            .create_followup(&self.ctx.http, CreateInteractionResponseFollowup::new().embed(embed))
            .await?;
        await_confirmation(&self.ctx, &sent, self.interaction.user.id, timeout).await
    }

    async fn attachment(&self) -> Result<Option<UploadedFile>> {
        Ok(None)
    }
}

/// Reacción con un emoji asociado a un audio
pub struct ReactionTrigger {
    ctx: Context,
    reaction: Reaction,
    user_id: UserId,
    voice_channel: Option<ChannelId>,
}

impl ReactionTrigger {
    /// `None` si la reacción no trae autor
    pub fn new(ctx: Context, reaction: Reaction) -> Option<Self> {
        let user_id = reaction.user_id?;
        let voice_channel = voice_channel_of(&ctx, reaction.guild_id, user_id);
        Some(Self {
            ctx,
            reaction,
            user_id,
            voice_channel,
        })
    }
}

#[async_trait]
impl Trigger for ReactionTrigger {
    fn guild_id(&self) -> Option<GuildId> {
        self.reaction.guild_id
    }

    fn author_id(&self) -> UserId {
        self.user_id
    }

    fn channel_id(&self) -> ChannelId {
        self.reaction.channel_id
    }

    fn author_voice_channel(&self) -> Option<ChannelId> {
        self.voice_channel
    }

    async fn send(&self, reply: Reply) -> Result<()> {
        self.reaction.channel_id.send_message(&self.ctx.http, message_from(reply)).await?;
        Ok(())
    }

    async fn confirm(&self, prompt: String, timeout: Duration) -> Result<Confirmation> {
        let embed = embeds::create_warning_embed("Confirmación", &prompt);
        let sent = self
            .reaction
            .channel_id
            .send_message(&self.ctx.http, CreateMessage::new().embed(embed))
            .await?;
        await_confirmation(&self.ctx, &sent, self.user_id, timeout).await
    }

    async fn attachment(&self) -> Result<Option<UploadedFile>> {
        Ok(None)
    }
}
