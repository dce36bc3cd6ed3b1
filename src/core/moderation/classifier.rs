// Violation classifier - turns one inbound message into at most one verdict.
//
// Rules run in a fixed order: mass mentions, then links, then the lexicon,
// then the spam window. A message tripping several rules reports only the
// first match; the order is part of the engine's contract because it
// decides which counter a simultaneous violation lands on. The spam check
// runs last and only when nothing else matched, so messages punished for
// other reasons never feed the rate window.

use chrono::{DateTime, Utc};

use super::lexicon::Lexicon;
use super::links::LinkExtractor;
use super::moderation_models::{ModerationConfig, Verdict, ViolationCategory};
use super::spam::SpamTracker;

pub struct ViolationClassifier {
    lexicon: Lexicon,
    links: LinkExtractor,
    spam: SpamTracker,
    mention_limit: u32,
    spam_window_ms: u64,
}

impl ViolationClassifier {
    pub fn new(config: &ModerationConfig, lexicon: Lexicon) -> Self {
        Self {
            links: LinkExtractor::new(config.allowed_domains.iter()),
            spam: SpamTracker::new(config.spam_threshold, config.spam_window_ms),
            mention_limit: config.mention_limit,
            spam_window_ms: config.spam_window_ms,
            lexicon,
        }
    }

    /// Classify one message. `distinct_mentions` counts distinct mentioned
    /// users; mentioning the same user twice counts once.
    pub fn classify(
        &self,
        user_id: u64,
        content: &str,
        distinct_mentions: u32,
        now: DateTime<Utc>,
    ) -> Option<Verdict> {
        if distinct_mentions > self.mention_limit {
            return Some(Verdict {
                category: ViolationCategory::MassMention,
                detail: format!(
                    "mentioned {distinct_mentions} users (max {} allowed)",
                    self.mention_limit
                ),
                explicit_count: None,
            });
        }

        let links = self.links.extract_disallowed(content);
        if !links.is_empty() {
            return Some(Verdict {
                category: ViolationCategory::DisallowedLink,
                detail: format!("sent {} link(s): {}", links.len(), links.join(", ")),
                explicit_count: None,
            });
        }

        if let Some(term) = self.lexicon.find_term(content) {
            return Some(Verdict {
                category: ViolationCategory::AbusiveLanguage,
                detail: format!("matched disallowed term \"{term}\""),
                explicit_count: None,
            });
        }

        let check = self.spam.record_and_check(user_id, now);
        if check.tripped {
            return Some(Verdict {
                category: ViolationCategory::Spam,
                detail: format!(
                    "{} messages in {}s",
                    check.count_in_window,
                    self.spam_window_ms / 1_000
                ),
                explicit_count: Some(check.trip_count),
            });
        }

        None
    }

    /// Username rule for joining members.
    pub fn username_matches(&self, name: &str) -> bool {
        self.lexicon.matches_username(name)
    }

    /// Drop the user's ephemeral spam state (ban/unban path).
    pub fn clear_user(&self, user_id: u64) {
        self.spam.clear_user(user_id);
    }

    /// Evict spam windows idle for longer than the window length.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        self.spam.evict_idle(now)
    }
}
