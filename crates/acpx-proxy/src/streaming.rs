//! SSE assembly for streaming completions.
//!
//! Turn items become `data: {json}\n\n` frames in arrival order: a role
//! preamble chunk first, then content deltas, then a terminal chunk with
//! the finish reason and an empty delta, then the `[DONE]` marker. Every
//! chunk of one response shares the same `id`/`created`/`model`.

use actix_web::web::Bytes;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::turn::TurnItem;
use crate::types::{ChatCompletionChunk, ToolLoopMeta};

/// Render a turn-item stream as an SSE byte stream.
pub fn sse_stream<S>(
    meta: ToolLoopMeta,
    items: S,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>>
where
    S: Stream<Item = TurnItem>,
{
    try_stream! {
        futures::pin_mut!(items);

        yield frame(&ChatCompletionChunk::role_preamble(&meta))?;

        while let Some(item) = items.next().await {
            match item {
                TurnItem::TextDelta(text) => {
                    yield frame(&ChatCompletionChunk::text_delta(&meta, text))?;
                }
                TurnItem::ToolCall(call) => {
                    yield frame(&ChatCompletionChunk::tool_call_delta(&meta, call))?;
                    yield frame(&ChatCompletionChunk::terminal(&meta, "tool_calls"))?;
                    yield done_frame();
                    return;
                }
                TurnItem::Done => {
                    yield frame(&ChatCompletionChunk::terminal(&meta, "stop"))?;
                    yield done_frame();
                    return;
                }
                TurnItem::Failed(err) => {
                    // The error body rides the stream; the HTTP status is
                    // already committed at this point.
                    yield frame(&err.http_body())?;
                    yield done_frame();
                    return;
                }
            }
        }

        // Item stream ended without a terminal item; close out cleanly.
        yield frame(&ChatCompletionChunk::terminal(&meta, "stop"))?;
        yield done_frame();
    }
}

fn frame<T: Serialize>(payload: &T) -> Result<Bytes, actix_web::Error> {
    let json =
        serde_json::to_string(payload).map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}
