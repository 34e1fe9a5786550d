//! Freshness disambiguation.
//!
//! Before a send, the engine snapshots what is already on screen; after
//! the send, any candidate capture that still looks like that snapshot
//! is the previous turn's leftover and must not be returned.

const PREFIX_LEN: usize = 200;

/// Short comparable snapshot of the currently visible answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFingerprint {
	/// First [`PREFIX_LEN`] chars of the visible answer text.
	prefix: String,
	/// Number of visible answer blocks, where the provider supports
	/// counting them.
	block_count: Option<usize>,
}

impl ResponseFingerprint {
	/// Snapshots the visible answer before a send. `text` may be empty
	/// (fresh conversation); `block_count` is `None` for providers
	/// without block counting.
	pub fn take(text: &str, block_count: Option<usize>) -> Self {
		Self {
			prefix: truncate_chars(text, PREFIX_LEN),
			block_count,
		}
	}

	/// Whether a candidate capture is the previous turn's leftover.
	///
	/// Stale when the candidate equals the stored prefix, extends it, is
	/// a prefix of it, or (where counted) the block count has not grown.
	pub fn is_stale(&self, candidate: &str, candidate_blocks: Option<usize>) -> bool {
		if let (Some(before), Some(now)) = (self.block_count, candidate_blocks) {
			if now > before {
				return false;
			}
			// Count unchanged: same number of blocks means the last one
			// was on screen before the send.
			return true;
		}

		if self.prefix.is_empty() {
			// Nothing was visible pre-send; anything non-empty is fresh.
			return candidate.is_empty();
		}

		let candidate_prefix = truncate_chars(candidate, PREFIX_LEN);
		candidate_prefix == self.prefix
			|| candidate_prefix.starts_with(self.prefix.as_str())
			|| self.prefix.starts_with(candidate_prefix.as_str())
	}
}

fn truncate_chars(text: &str, limit: usize) -> String {
	text.chars().take(limit).collect()
}
