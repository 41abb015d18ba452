use orbit_protocol::ServerMessage;

use crate::pty::{ProcessObserver, Utf8Decoder};
use crate::ws::OutboundSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Shell,
    Assistant,
}

impl StreamKind {
    fn output(self, data: String) -> ServerMessage {
        match self {
            Self::Shell => ServerMessage::TerminalOutput { data },
            Self::Assistant => ServerMessage::AssistantOutput { data },
        }
    }

    fn exit(self, code: i32) -> ServerMessage {
        match self {
            Self::Shell => ServerMessage::TerminalExit { code },
            Self::Assistant => ServerMessage::AssistantExit { code },
        }
    }
}

/// Turns process events into `terminal:*` or `assistant:*` messages.
pub(crate) struct StreamForwarder {
    kind: StreamKind,
    sink: OutboundSink,
    decoder: Utf8Decoder,
}

impl StreamForwarder {
    pub(crate) fn new(kind: StreamKind, sink: OutboundSink) -> Self {
        Self {
            kind,
            sink,
            decoder: Utf8Decoder::new(),
        }
    }
}

impl ProcessObserver for StreamForwarder {
    fn on_output(&mut self, chunk: Vec<u8>) {
        let data = self.decoder.decode(&chunk);
        if !data.is_empty() {
            self.sink.send(self.kind.output(data));
        }
    }

    fn on_exit(&mut self, code: i32) {
        let rest = self.decoder.finish();
        if !rest.is_empty() {
            self.sink.send(self.kind.output(rest));
        }
        self.sink.send(self.kind.exit(code));
    }
}
