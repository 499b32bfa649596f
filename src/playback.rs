//! Assistant audio playback bookkeeping.
//!
//! The queue tracks which response item is audible and how many milliseconds
//! of it have actually reached the speaker, so an interruption can truncate
//! the remote item at the exact point the user stopped hearing it. Chunks
//! play strictly one at a time; a chunk's duration is derived from its
//! sample count and the service rate. Time is passed in by the caller, which
//! keeps the arithmetic deterministic under test.

use std::collections::VecDeque;
use std::time::Instant;

struct PlayingChunk {
    duration_ms: f64,
    started_at: Instant,
}

struct PlaybackItem {
    item_id: String,
    chunks: VecDeque<Vec<f32>>,
    played_ms: f64,
    playing: Option<PlayingChunk>,
}

/// A chunk handed to the audio output, with the deadline bookkeeping needed
/// to know when it has finished playing.
pub struct StartedChunk {
    pub samples: Vec<f32>,
    pub duration: std::time::Duration,
}

/// The position at which a cancelled item must be truncated remotely.
#[derive(Debug, PartialEq)]
pub struct Truncation {
    pub item_id: String,
    pub played_ms: u64,
}

pub struct PlaybackQueue {
    current: Option<PlaybackItem>,
    superseded: Option<String>,
    sample_rate: f64,
}

impl PlaybackQueue {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            current: None,
            superseded: None,
            sample_rate: sample_rate as f64,
        }
    }

    /// Queues decoded samples for an item. Chunks for an item that was
    /// already interrupted are discarded, whatever order they arrive in.
    pub fn enqueue(&mut self, item_id: &str, samples: Vec<f32>) {
        if self.superseded.as_deref() == Some(item_id) {
            tracing::debug!("dropping audio for cancelled item {}", item_id);
            return;
        }
        match &mut self.current {
            Some(item) if item.item_id == item_id => {
                item.chunks.push_back(samples);
            }
            Some(item) => {
                tracing::warn!(
                    "new item {} while {} still queued, replacing",
                    item_id,
                    item.item_id
                );
                *item = PlaybackItem {
                    item_id: item_id.to_string(),
                    chunks: VecDeque::from([samples]),
                    played_ms: 0.0,
                    playing: None,
                };
            }
            None => {
                self.current = Some(PlaybackItem {
                    item_id: item_id.to_string(),
                    chunks: VecDeque::from([samples]),
                    played_ms: 0.0,
                    playing: None,
                });
            }
        }
    }

    /// Dequeues the next chunk if nothing is currently audible.
    pub fn start_next(&mut self, now: Instant) -> Option<StartedChunk> {
        let item = self.current.as_mut()?;
        if item.playing.is_some() {
            return None;
        }
        let samples = item.chunks.pop_front()?;
        let duration_ms = samples.len() as f64 / self.sample_rate * 1000.0;
        item.playing = Some(PlayingChunk {
            duration_ms,
            started_at: now,
        });
        Some(StartedChunk {
            samples,
            duration: std::time::Duration::from_secs_f64(duration_ms / 1000.0),
        })
    }

    /// Marks the in-flight chunk as fully played. The whole chunk duration
    /// counts toward the played position regardless of wall-clock jitter.
    pub fn finish_current(&mut self) {
        if let Some(item) = &mut self.current {
            if let Some(chunk) = item.playing.take() {
                item.played_ms += chunk.duration_ms;
            }
            if item.chunks.is_empty() && item.playing.is_none() {
                // Keep the item so a late chunk of the same id continues it.
                tracing::trace!("item {} drained at {:.1} ms", item.item_id, item.played_ms);
            }
        }
    }

    /// Cancels the current item. For a chunk cut off mid-play only the
    /// elapsed portion counts, capped at the chunk duration. Returns the
    /// truncation point, or `None` when nothing had reached the speaker.
    pub fn interrupt(&mut self, now: Instant) -> Option<Truncation> {
        let item = self.current.take()?;
        self.superseded = Some(item.item_id.clone());

        let mut played_ms = item.played_ms;
        if let Some(chunk) = item.playing {
            let elapsed_ms = now.duration_since(chunk.started_at).as_secs_f64() * 1000.0;
            played_ms += elapsed_ms.min(chunk.duration_ms);
        }

        if played_ms <= 0.0 {
            return None;
        }
        Some(Truncation {
            item_id: item.item_id,
            played_ms: played_ms.round() as u64,
        })
    }

    /// True when no chunk is audible and none is waiting.
    pub fn is_idle(&self) -> bool {
        match &self.current {
            None => true,
            Some(item) => item.playing.is_none() && item.chunks.is_empty(),
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.superseded = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // 24 samples per millisecond at the service rate.
    const RATE: u32 = 24_000;

    fn chunk(ms: u64) -> Vec<f32> {
        vec![0.0; (ms * RATE as u64 / 1000) as usize]
    }

    #[test]
    fn completed_chunks_accumulate_their_full_duration() {
        let mut queue = PlaybackQueue::new(RATE);
        let start = Instant::now();
        queue.enqueue("item_1", chunk(100));
        queue.enqueue("item_1", chunk(250));

        let first = queue.start_next(start).unwrap();
        assert_eq!(first.duration, Duration::from_millis(100));
        queue.finish_current();

        queue.start_next(start + Duration::from_millis(100)).unwrap();
        queue.finish_current();

        let cut = queue.interrupt(start + Duration::from_millis(400)).unwrap();
        assert_eq!(cut.played_ms, 350);
    }

    #[test]
    fn interrupt_mid_chunk_counts_only_elapsed_time() {
        let mut queue = PlaybackQueue::new(RATE);
        let start = Instant::now();
        queue.enqueue("item_1", chunk(200));
        queue.enqueue("item_1", chunk(500));

        queue.start_next(start).unwrap();
        queue.finish_current();
        queue.start_next(start + Duration::from_millis(200)).unwrap();

        // 130 ms into the second chunk.
        let cut = queue.interrupt(start + Duration::from_millis(330)).unwrap();
        assert_eq!(cut.item_id, "item_1");
        assert_eq!(cut.played_ms, 330);
    }

    #[test]
    fn elapsed_time_is_capped_at_the_chunk_duration() {
        let mut queue = PlaybackQueue::new(RATE);
        let start = Instant::now();
        queue.enqueue("item_1", chunk(100));
        queue.start_next(start).unwrap();

        // Wall clock ran past the chunk end before the interrupt landed.
        let cut = queue.interrupt(start + Duration::from_millis(5000)).unwrap();
        assert_eq!(cut.played_ms, 100);
    }

    #[test]
    fn interrupt_before_audio_starts_yields_no_truncation() {
        let mut queue = PlaybackQueue::new(RATE);
        queue.enqueue("item_1", chunk(100));
        assert!(queue.interrupt(Instant::now()).is_none());
        assert!(queue.is_idle());
    }

    #[test]
    fn chunks_of_a_cancelled_item_never_play() {
        let mut queue = PlaybackQueue::new(RATE);
        let start = Instant::now();
        queue.enqueue("item_1", chunk(100));
        queue.start_next(start).unwrap();
        queue.interrupt(start + Duration::from_millis(50)).unwrap();

        // Late deltas for the cancelled item arrive after the interrupt.
        queue.enqueue("item_1", chunk(100));
        assert!(queue.start_next(start + Duration::from_millis(60)).is_none());
        assert!(queue.is_idle());

        // A fresh item plays normally.
        queue.enqueue("item_2", chunk(100));
        assert!(queue.start_next(start + Duration::from_millis(70)).is_some());
    }

    #[test]
    fn only_one_chunk_is_audible_at_a_time() {
        let mut queue = PlaybackQueue::new(RATE);
        let start = Instant::now();
        queue.enqueue("item_1", chunk(100));
        queue.enqueue("item_1", chunk(100));
        assert!(queue.start_next(start).is_some());
        assert!(queue.start_next(start).is_none());
        queue.finish_current();
        assert!(queue.start_next(start + Duration::from_millis(100)).is_some());
    }

    #[test]
    fn reset_clears_the_superseded_marker() {
        let mut queue = PlaybackQueue::new(RATE);
        let start = Instant::now();
        queue.enqueue("item_1", chunk(100));
        queue.start_next(start).unwrap();
        queue.interrupt(start + Duration::from_millis(10)).unwrap();
        queue.reset();

        queue.enqueue("item_1", chunk(100));
        assert!(queue.start_next(start).is_some());
    }
}
