//! Chunk-to-message reduction.
//!
//! The upstream service streams a response as many small chunks; clients want
//! whole messages. [`ResponseAggregator`] accumulates text and audio per
//! response and flushes complete [`ClientEvent`]s at turn boundaries.

use livebridge_core::{ChunkEvent, ChunkPart, ClientEvent};

/// Stateful reducer over one session's chunk stream.
///
/// Text and audio accumulate independently under one shared response id, so
/// a mixed-modality turn flushes both a text and an audio event carrying the
/// same id.
#[derive(Debug, Default)]
pub struct ResponseAggregator {
    current_id: Option<String>,
    text: String,
    audio: Vec<u8>,
    audio_mime: Option<String>,
}

impl ResponseAggregator {
    /// An empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the accumulated state and return any events that
    /// became complete.
    ///
    /// Error chunks pass through without disturbing accumulation. An
    /// interruption emits its signal independently of accumulation: parts
    /// and a turn-complete carried by the same chunk are still processed.
    /// A chunk whose response id differs from the accumulating one flushes
    /// the previous response first, so a missing turn-complete can never
    /// merge two responses.
    pub fn feed(&mut self, chunk: ChunkEvent) -> Vec<ClientEvent> {
        let mut events = Vec::new();

        if let Some(error) = chunk.error {
            events.push(ClientEvent::UpstreamError(error));
            return events;
        }
        if chunk.interrupted {
            events.push(ClientEvent::Interrupted);
        }

        if let Some(id) = chunk.response_id {
            if self.current_id.as_deref() != Some(id.as_str()) {
                if self.current_id.is_some() {
                    self.flush_into(&mut events);
                }
                self.current_id = Some(id);
            }
        }

        for part in chunk.parts {
            match part {
                ChunkPart::Text(fragment) => self.text.push_str(&fragment),
                ChunkPart::Audio { mime_type, data } => {
                    if self.audio_mime.is_none() {
                        self.audio_mime = Some(mime_type);
                    }
                    self.audio.extend_from_slice(&data);
                }
            }
        }

        if chunk.turn_complete {
            self.flush_into(&mut events);
            self.current_id = None;
        }
        events
    }

    /// Drop all accumulated state. Used when the underlying session is
    /// replaced, where partial output is stale.
    pub fn reset(&mut self) {
        self.text.clear();
        self.audio.clear();
        self.audio_mime = None;
        self.current_id = None;
    }

    /// Whether anything is currently buffered.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.audio.is_empty()
    }

    fn flush_into(&mut self, events: &mut Vec<ClientEvent>) {
        if !self.text.is_empty() {
            events.push(ClientEvent::Text {
                id: self.current_id.clone(),
                text: std::mem::take(&mut self.text),
            });
        }
        if !self.audio.is_empty() {
            events.push(ClientEvent::Audio {
                id: self.current_id.clone(),
                audio: std::mem::take(&mut self.audio),
                mime_type: self.audio_mime.take(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_chunk(id: &str, text: &str) -> ChunkEvent {
        ChunkEvent {
            response_id: Some(id.into()),
            parts: vec![ChunkPart::Text(text.into())],
            ..ChunkEvent::default()
        }
    }

    fn audio_chunk(id: &str, data: &[u8]) -> ChunkEvent {
        ChunkEvent {
            response_id: Some(id.into()),
            parts: vec![ChunkPart::Audio { mime_type: "audio/pcm".into(), data: data.to_vec() }],
            ..ChunkEvent::default()
        }
    }

    fn turn_complete() -> ChunkEvent {
        ChunkEvent { turn_complete: true, ..ChunkEvent::default() }
    }

    #[test]
    fn accumulates_text_until_turn_complete() {
        let mut agg = ResponseAggregator::new();
        assert!(agg.feed(text_chunk("r1", "He")).is_empty());
        assert!(agg.feed(text_chunk("r1", "llo")).is_empty());

        let events = agg.feed(turn_complete());
        assert_eq!(events, vec![ClientEvent::Text { id: Some("r1".into()), text: "Hello".into() }]);
        assert!(agg.is_empty());
    }

    #[test]
    fn accumulates_audio_bytes() {
        let mut agg = ResponseAggregator::new();
        assert!(agg.feed(audio_chunk("r1", &[1, 2])).is_empty());
        assert!(agg.feed(audio_chunk("r1", &[3])).is_empty());

        let events = agg.feed(turn_complete());
        assert_eq!(
            events,
            vec![ClientEvent::Audio {
                id: Some("r1".into()),
                audio: vec![1, 2, 3],
                mime_type: Some("audio/pcm".into()),
            }]
        );
    }

    #[test]
    fn mixed_turn_flushes_text_then_audio_under_one_id() {
        let mut agg = ResponseAggregator::new();
        let _ = agg.feed(text_chunk("r1", "narrating"));
        let _ = agg.feed(audio_chunk("r1", &[9, 9]));

        let events = agg.feed(turn_complete());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ClientEvent::Text { id: Some("r1".into()), text: "narrating".into() });
        assert_eq!(
            events[1],
            ClientEvent::Audio {
                id: Some("r1".into()),
                audio: vec![9, 9],
                mime_type: Some("audio/pcm".into()),
            }
        );
    }

    #[test]
    fn id_change_flushes_previous_response() {
        let mut agg = ResponseAggregator::new();
        let _ = agg.feed(text_chunk("r1", "first"));

        let events = agg.feed(text_chunk("r2", "second"));
        assert_eq!(events, vec![ClientEvent::Text { id: Some("r1".into()), text: "first".into() }]);

        let events = agg.feed(turn_complete());
        assert_eq!(events, vec![ClientEvent::Text { id: Some("r2".into()), text: "second".into() }]);
    }

    #[test]
    fn interruption_signal_leaves_accumulation_untouched() {
        let mut agg = ResponseAggregator::new();
        let _ = agg.feed(text_chunk("r1", "half a thou"));

        let events = agg.feed(ChunkEvent { interrupted: true, ..ChunkEvent::default() });
        assert_eq!(events, vec![ClientEvent::Interrupted]);
        assert!(!agg.is_empty());

        let events = agg.feed(turn_complete());
        assert_eq!(
            events,
            vec![ClientEvent::Text { id: Some("r1".into()), text: "half a thou".into() }]
        );
    }

    #[test]
    fn interrupted_chunk_with_turn_complete_still_flushes() {
        let mut agg = ResponseAggregator::new();
        let _ = agg.feed(text_chunk("r1", "Hel"));

        let events = agg.feed(ChunkEvent {
            interrupted: true,
            turn_complete: true,
            ..ChunkEvent::default()
        });
        assert_eq!(
            events,
            vec![
                ClientEvent::Interrupted,
                ClientEvent::Text { id: Some("r1".into()), text: "Hel".into() },
            ]
        );
        assert!(agg.is_empty());
    }

    #[test]
    fn interrupted_chunk_still_accumulates_its_parts() {
        let mut agg = ResponseAggregator::new();
        let events = agg.feed(ChunkEvent {
            response_id: Some("r1".into()),
            interrupted: true,
            parts: vec![ChunkPart::Text("tail".into())],
            ..ChunkEvent::default()
        });
        assert_eq!(events, vec![ClientEvent::Interrupted]);

        let events = agg.feed(turn_complete());
        assert_eq!(events, vec![ClientEvent::Text { id: Some("r1".into()), text: "tail".into() }]);
    }

    #[test]
    fn error_chunk_passes_through_without_disturbing_state() {
        let mut agg = ResponseAggregator::new();
        let _ = agg.feed(text_chunk("r1", "keep me"));

        let frame = json!({"error": {"message": "transient"}});
        let events = agg.feed(ChunkEvent { error: Some(frame.clone()), ..ChunkEvent::default() });
        assert_eq!(events, vec![ClientEvent::UpstreamError(frame)]);

        let events = agg.feed(turn_complete());
        assert_eq!(events, vec![ClientEvent::Text { id: Some("r1".into()), text: "keep me".into() }]);
    }

    #[test]
    fn empty_turn_complete_emits_nothing() {
        let mut agg = ResponseAggregator::new();
        assert!(agg.feed(turn_complete()).is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut agg = ResponseAggregator::new();
        let _ = agg.feed(text_chunk("r1", "stale"));
        let _ = agg.feed(audio_chunk("r1", &[7]));
        agg.reset();
        assert!(agg.is_empty());
        assert!(agg.feed(turn_complete()).is_empty());
    }

    #[test]
    fn chunks_without_ids_still_flush_on_turn_complete() {
        let mut agg = ResponseAggregator::new();
        let _ = agg.feed(ChunkEvent {
            parts: vec![ChunkPart::Text("anonymous".into())],
            ..ChunkEvent::default()
        });
        let events = agg.feed(turn_complete());
        assert_eq!(events, vec![ClientEvent::Text { id: None, text: "anonymous".into() }]);
    }
}
