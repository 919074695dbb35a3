//! Per-conversation WebSocket handler
//!
//! `GET /v1/talk/:source/:assistant_id` upgrades the carrier connection,
//! assembles the provider set for the assistant, and runs the session until
//! the carrier hangs up or the runtime ends the conversation.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use voxflow_audio::{AudioConverter, CallRecorder};
use voxflow_core::comm::PacketSender;
use voxflow_core::{AudioConfig, Communication, Conversation, Direction, InputMode, Source};
use voxflow_llm::{AssistantExecutor, CompletionExecutor, GrpcExecutor, WebsocketExecutor};
use voxflow_pipeline::eos::{EndOfSpeech, SilenceEndOfSpeech};
use voxflow_pipeline::stt::{SpeechToText, StreamingStt};
use voxflow_pipeline::tts::{StreamingTts, TextToSpeech};
use voxflow_runtime::{
    eos_callback, packet_channel, stt_callback, tts_callbacks, ConversationContext,
    ConversationRuntime, RuntimeDeps,
};
use voxflow_tools::ToolExecutor;
use voxflow_transport::{
    BrowserProtocol, MediaStreamProtocol, TransportSession, WireMessage, WireProtocol,
};

use crate::state::AppState;

/// Upgrade one carrier connection into a conversation
pub async fn talk(
    ws: WebSocketUpgrade,
    Path((source, assistant_id)): Path<(String, u64)>,
    Query(args): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Response, StatusCode> {
    let source: Source = source.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let assistant = state
        .assistants
        .get(assistant_id)
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(ws.on_upgrade(move |socket| async move {
        let conversation_id = state.next_conversation_id();
        if let Err(e) = run_session(socket, state, source, conversation_id, assistant, args).await {
            error!(conversation_id, error = %e, "conversation aborted");
        }
    }))
}

/// Audio shapes for one session: what the carrier speaks and what the
/// providers expect
struct AudioPlan {
    carrier: AudioConfig,
    stt: AudioConfig,
    tts: AudioConfig,
}

impl AudioPlan {
    fn for_source(source: Source) -> Self {
        match source {
            // Telephony delivers mu-law at 8 kHz; providers run on linear PCM
            Source::Phone => Self {
                carrier: AudioConfig::mulaw_8khz_mono(),
                stt: AudioConfig::linear_16khz_mono(),
                tts: AudioConfig::linear_24khz_mono(),
            },
            _ => Self {
                carrier: AudioConfig::linear_16khz_mono(),
                stt: AudioConfig::linear_16khz_mono(),
                tts: AudioConfig::linear_16khz_mono(),
            },
        }
    }

    fn input_converter(&self) -> voxflow_core::Result<Option<AudioConverter>> {
        if self.carrier == self.stt {
            return Ok(None);
        }
        Ok(Some(AudioConverter::new(self.carrier, self.stt)?))
    }

    fn output_converter(&self) -> voxflow_core::Result<Option<AudioConverter>> {
        if self.tts == self.carrier {
            return Ok(None);
        }
        Ok(Some(AudioConverter::new(self.tts, self.carrier)?))
    }
}

async fn run_session(
    socket: WebSocket,
    state: AppState,
    source: Source,
    conversation_id: u64,
    assistant: voxflow_core::Assistant,
    args: HashMap<String, String>,
) -> voxflow_core::Result<()> {
    let input_mode = match source {
        Source::Phone => InputMode::Audio,
        Source::Whatsapp => InputMode::Text,
        _ => InputMode::Both,
    };
    let conversation = Conversation::new(
        conversation_id,
        assistant.id,
        assistant.version.clone(),
        Direction::Inbound,
        source,
        input_mode,
    );
    info!(
        conversation_id,
        assistant = assistant.id,
        source = source.as_str(),
        "conversation accepted"
    );

    let comm = Arc::new(ConversationContext::new(conversation, assistant, args));
    let token = CancellationToken::new();
    let (packet_tx, packet_rx) = packet_channel();

    let plan = AudioPlan::for_source(source);
    let (stt, tts, recorder) = if input_mode.audio() {
        build_speech_providers(&state, &comm, &plan, &packet_tx, &token)?
    } else {
        (None, None, None)
    };

    let eos: Option<Arc<dyn EndOfSpeech>> = Some(Arc::new(SilenceEndOfSpeech::new(
        eos_callback(packet_tx.clone()),
        &comm.assistant().options,
        token.clone(),
    )));

    let executor = build_executor(&state, &comm, &token).await?;

    let protocol: Arc<dyn WireProtocol> = match source {
        Source::Phone => Arc::new(MediaStreamProtocol::new()),
        _ => Arc::new(BrowserProtocol),
    };
    let (session, mut outbound_rx) = TransportSession::new(
        protocol,
        plan.input_converter()?,
        plan.output_converter()?,
    );
    let session = Arc::new(session);

    let (runtime, _) = ConversationRuntime::start_with_channel(
        RuntimeDeps {
            comm,
            output: Arc::clone(&session) as _,
            executor,
            stt,
            tts,
            eos,
            recorder,
            token: token.clone(),
        },
        packet_tx,
        packet_rx,
    );

    runtime.begin().await?;

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Single writer per transport
    let writer_token = token.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_token.cancelled() => break,
                message = outbound_rx.recv() => {
                    let Some(message) = message else { break };
                    let frame = match message {
                        WireMessage::Text(text) => Message::Text(text),
                        WireMessage::Binary(bytes) => Message::Binary(bytes),
                    };
                    if ws_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader loop; a carrier-level close is final
    while let Some(frame) = ws_rx.next().await {
        let message = match frame {
            Ok(Message::Text(text)) => WireMessage::Text(text),
            Ok(Message::Binary(bytes)) => WireMessage::Binary(bytes),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "carrier read failed");
                break;
            }
        };
        if !session.input(&runtime, message).await {
            break;
        }
    }

    runtime.close("transport closed").await;
    token.cancel();
    let _ = writer.await;
    info!(conversation_id, "conversation finished");
    Ok(())
}

type SpeechProviders = (
    Option<Arc<dyn SpeechToText>>,
    Option<Arc<dyn TextToSpeech>>,
    Option<Arc<CallRecorder>>,
);

fn build_speech_providers(
    state: &AppState,
    comm: &Arc<ConversationContext>,
    plan: &AudioPlan,
    packet_tx: &PacketSender,
    token: &CancellationToken,
) -> voxflow_core::Result<SpeechProviders> {
    let options = &comm.assistant().options;

    let stt = match &state.settings.providers.stt {
        Some(cfg) => Some(Arc::new(StreamingStt::new(
            cfg.endpoint.clone(),
            cfg.api_key.clone(),
            plan.stt,
            options,
            stt_callback(packet_tx.clone()),
            token.clone(),
        )) as Arc<dyn SpeechToText>),
        None => {
            warn!("audio conversation without stt provider configured");
            None
        }
    };

    let tts = match &state.settings.providers.tts {
        Some(cfg) => Some(Arc::new(StreamingTts::new(
            cfg.endpoint.clone(),
            cfg.api_key.clone(),
            plan.tts,
            options,
            tts_callbacks(packet_tx.clone()),
            token.clone(),
        )) as Arc<dyn TextToSpeech>),
        None => {
            warn!("audio conversation without tts provider configured");
            None
        }
    };

    let recorder = Some(Arc::new(CallRecorder::new(plan.carrier)));
    Ok((stt, tts, recorder))
}

async fn build_executor(
    state: &AppState,
    comm: &Arc<ConversationContext>,
    token: &CancellationToken,
) -> voxflow_core::Result<Arc<dyn AssistantExecutor>> {
    match comm.assistant().executor.as_str() {
        "websocket" => Ok(Arc::new(WebsocketExecutor::new(
            Arc::clone(comm) as Arc<dyn Communication>,
            token.clone(),
        )?)),
        "grpc" => Ok(Arc::new(GrpcExecutor::new(
            Arc::clone(comm) as Arc<dyn Communication>,
            token.clone(),
        )?)),
        "completion" => {
            let cfg = state.settings.providers.completion.clone().ok_or_else(|| {
                voxflow_core::Error::config("completion executor selected but not configured")
            })?;
            let mut tools = ToolExecutor::new();
            tools
                .initialize(&**comm as &dyn Communication)
                .await?;
            Ok(Arc::new(CompletionExecutor::new(
                Arc::clone(comm) as Arc<dyn Communication>,
                Arc::new(tools),
                cfg.endpoint,
                cfg.api_key,
                cfg.model,
            )?))
        }
        other => Err(voxflow_core::Error::config(format!(
            "unknown executor: {other}"
        ))),
    }
}
