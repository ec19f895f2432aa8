//! WebSocket Handler - job 状态推送

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::GetJob;
use crate::infrastructure::events::WsEvent;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 订阅单个 job 的状态变更
///
/// 先订阅再读取当前状态，避免读取与订阅之间的事件丢失。
/// 连接建立后立即推送当前快照，终态事件之后服务端关闭连接。
pub async fn job_events(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let event_rx = state.event_publisher.subscribe(&job_id);

    let job = match state
        .get_job_handler
        .handle(GetJob {
            job_id: job_id.clone(),
        })
        .await
    {
        Ok(job) => job,
        Err(e) => {
            drop(event_rx);
            state.event_publisher.unsubscribe(&job_id);
            return Err(e.into());
        }
    };

    let snapshot = WsEvent::from_job(&job);
    Ok(ws
        .on_upgrade(move |socket| handle_job_socket(socket, job_id, snapshot, event_rx, state))
        .into_response())
}

async fn handle_job_socket(
    socket: WebSocket,
    job_id: String,
    snapshot: WsEvent,
    mut event_rx: broadcast::Receiver<WsEvent>,
    state: Arc<AppState>,
) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(job_id = %job_id, "WebSocket connected");

    let job_id_for_forward = job_id.clone();
    let job_id_for_receive = job_id.clone();

    let mut forward_task = tokio::spawn(async move {
        let mut next = Some(snapshot);
        loop {
            let event = match next.take() {
                Some(event) => event,
                None => match event_rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(job_id = %job_id_for_forward, skipped, "WebSocket receiver lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let terminal = event.is_terminal();
            let msg = match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };

            if let Err(e) = sender.send(msg).await {
                tracing::debug!(
                    job_id = %job_id_for_forward,
                    error = %e,
                    "Failed to send WebSocket message"
                );
                return;
            }

            if terminal {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // 客户端消息只用于探测断开
    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    tracing::info!(job_id = %job_id_for_receive, "WebSocket closed by client");
                    break;
                }
                Err(e) => {
                    tracing::debug!(job_id = %job_id_for_receive, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // 另一侧任务结束后再退订，保证接收端已释放
    tokio::select! {
        _ = &mut forward_task => {
            receive_task.abort();
            let _ = receive_task.await;
        }
        _ = &mut receive_task => {
            forward_task.abort();
            let _ = forward_task.await;
        }
    }

    state.event_publisher.unsubscribe(&job_id);
    tracing::info!(job_id = %job_id, "WebSocket disconnected");
}
