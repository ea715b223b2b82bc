//! Pull-style consumption of a stream read as a sequence of tagged events,
//! for callers that prefer a stream over implementing [`ReadDelegate`].

use anyhow::Result;
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::reader::ChatStreamReader;
use crate::{Dialect, ReadDelegate, ReadError, ReadResult};

/// One step of a stream read, in frame-arrival order.
#[derive(Debug, Clone)]
pub enum ReadEvent {
    /// Incremental assistant text while no tool call is active.
    Content(String),
    /// A tool call was identified; carries the tool name.
    ToolDetected(String),
    /// The read failed irrecoverably. A `Done` event still follows.
    Error(ReadError),
    /// Terminal event carrying the assembled result.
    Done(ReadResult),
}

struct ChannelDelegate {
    tx: mpsc::UnboundedSender<ReadEvent>,
}

impl ReadDelegate for ChannelDelegate {
    fn on_progress(&mut self, content: &str) {
        let _ = self.tx.send(ReadEvent::Content(content.to_string()));
    }

    fn on_tool_call(&mut self, name: &str) {
        let _ = self.tx.send(ReadEvent::ToolDetected(name.to_string()));
    }

    fn on_error(&mut self, error: &ReadError) {
        let _ = self.tx.send(ReadEvent::Error(error.clone()));
    }
}

/// Drive a read on a background task, yielding events as they occur.
///
/// The sequence always terminates with [`ReadEvent::Done`], on failure paths
/// included.
pub fn read_events<S>(dialect: Dialect, source: S) -> UnboundedReceiverStream<ReadEvent>
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut delegate = ChannelDelegate { tx: tx.clone() };
        let result = ChatStreamReader::new(dialect).read(source, &mut delegate).await;
        let _ = tx.send(ReadEvent::Done(result));
    });
    UnboundedReceiverStream::new(rx)
}
