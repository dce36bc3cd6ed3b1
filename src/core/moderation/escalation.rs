// Escalation engine - durable counters and the punishment ladder.
//
// The store is a port: core defines the contract, infra provides the
// SQLite implementation. `ModerationService` is what the Discord layer
// talks to: it classifies a message, commits the counter bump, and hands
// back a concrete punishment plan for the shell to execute.
//
// NO Discord dependencies here - just pure domain logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::classifier::ViolationClassifier;
use super::lexicon::Lexicon;
use super::moderation_models::{
    render_template, ModerationConfig, PunishmentKind, PunishmentLadders, ViolationCategory,
    ViolationMeta, ViolationRecord,
};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    /// Malformed word list or punishment configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The durable store is unavailable or a write failed.
    #[error("storage error: {0}")]
    Storage(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Port for the durable violation counters.
///
/// Implementations must make `increment_and_get` atomic per
/// (user, category): concurrent bumps may interleave freely across
/// categories but must never lose an update within one. Repeated calls
/// for the same logical event increment repeatedly - deduplication is the
/// caller's job, not the store's.
#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Bump one category's counter and return the updated value.
    ///
    /// `explicit_count` overwrites instead of incrementing (the spam path
    /// computes its own trip count). Metadata merges into the existing
    /// record without touching other categories' counters; a user with no
    /// record starts from zero.
    async fn increment_and_get(
        &self,
        user_id: u64,
        category: ViolationCategory,
        meta: ViolationMeta,
        explicit_count: Option<u32>,
    ) -> Result<u32, ModerationError>;

    /// Current record for a user, if any.
    async fn get(&self, user_id: u64) -> Result<Option<ViolationRecord>, ModerationError>;

    /// Zero one category's counter, or every category when `category` is
    /// `None`. The all-variant leaves a fresh zero record behind.
    async fn reset(
        &self,
        user_id: u64,
        category: Option<ViolationCategory>,
    ) -> Result<(), ModerationError>;
}

// ============================================================================
// PUNISHMENT PLAN
// ============================================================================

/// Fully-resolved punishment plan for one violation.
#[derive(Debug, Clone)]
pub struct Enforcement {
    pub category: ViolationCategory,
    pub detail: String,
    /// Updated violation count, as committed to the store.
    pub count: u32,
    /// 1-based tier the count landed on, clamped to 3.
    pub tier: u8,
    pub kind: PunishmentKind,
    /// Rendered DM text for the offender.
    pub dm_text: String,
    /// Rendered public log line.
    pub channel_text: String,
}

impl Enforcement {
    /// Bans wipe every category's history plus the ephemeral spam state,
    /// not just the category that triggered them.
    pub fn clears_history(&self) -> bool {
        matches!(self.kind, PunishmentKind::Ban)
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationService<S: ViolationStore> {
    classifier: ViolationClassifier,
    ladders: PunishmentLadders,
    config: ModerationConfig,
    store: S,
}

impl<S: ViolationStore> ModerationService<S> {
    /// Ladders are validated up front; a bad ladder aborts startup.
    pub fn new(
        config: ModerationConfig,
        lexicon: Lexicon,
        ladders: PunishmentLadders,
        store: S,
    ) -> Result<Self, ModerationError> {
        ladders.validate().map_err(ModerationError::Configuration)?;
        Ok(Self {
            classifier: ViolationClassifier::new(&config, lexicon),
            ladders,
            config,
            store,
        })
    }

    /// Run one message through classification and, when a rule trips,
    /// commit the counter bump and produce the punishment plan.
    ///
    /// The counter commit lands before any platform action runs; a failed
    /// mute or ban later does not roll it back.
    pub async fn process_message(
        &self,
        user_id: u64,
        display_name: &str,
        content: &str,
        distinct_mentions: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Enforcement>, ModerationError> {
        let Some(verdict) = self
            .classifier
            .classify(user_id, content, distinct_mentions, now)
        else {
            return Ok(None);
        };

        let meta = ViolationMeta {
            display_name: display_name.to_string(),
            detail: verdict.detail.clone(),
            content: content.to_string(),
        };
        let count = self
            .store
            .increment_and_get(user_id, verdict.category, meta, verdict.explicit_count)
            .await?;

        Ok(Some(self.plan(
            verdict.category,
            verdict.detail,
            count,
            display_name,
        )))
    }

    /// Map a committed count onto its category's ladder.
    pub fn plan(
        &self,
        category: ViolationCategory,
        detail: String,
        count: u32,
        display_name: &str,
    ) -> Enforcement {
        let (tier, rung) = self.ladders.ladder(category).tier_for(count);
        let params = [
            ("user", display_name.to_string()),
            ("limit", self.config.mention_limit.to_string()),
        ];
        Enforcement {
            category,
            detail,
            count,
            tier,
            kind: rung.kind.clone(),
            dm_text: render_template(&rung.dm_template, &params),
            channel_text: render_template(&rung.channel_template, &params),
        }
    }

    /// Username rule for joining members.
    pub fn username_violates(&self, name: &str) -> bool {
        self.config.username_check_enabled && self.classifier.username_matches(name)
    }

    pub async fn record(&self, user_id: u64) -> Result<Option<ViolationRecord>, ModerationError> {
        self.store.get(user_id).await
    }

    /// Full reset for a user: durable counters zeroed across every
    /// category and ephemeral spam state dropped. Runs after a successful
    /// ban and on administrative unban.
    pub async fn clear_user(&self, user_id: u64) -> Result<(), ModerationError> {
        self.store.reset(user_id, None).await?;
        self.classifier.clear_user(user_id);
        Ok(())
    }

    /// Evict spam windows idle for longer than the window length.
    pub fn evict_idle_windows(&self, now: DateTime<Utc>) -> usize {
        self.classifier.evict_idle(now)
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    /// In-memory store for testing.
    struct MockViolationStore {
        records: DashMap<u64, ViolationRecord>,
    }

    impl MockViolationStore {
        fn new() -> Self {
            Self {
                records: DashMap::new(),
            }
        }

        fn blank(user_id: u64, display_name: &str) -> ViolationRecord {
            ViolationRecord {
                user_id,
                display_name: display_name.to_string(),
                abusive_count: 0,
                link_count: 0,
                mention_count: 0,
                spam_count: 0,
                last_category: None,
                last_detail: None,
                last_content: None,
                last_at: None,
            }
        }
    }

    #[async_trait]
    impl ViolationStore for MockViolationStore {
        async fn increment_and_get(
            &self,
            user_id: u64,
            category: ViolationCategory,
            meta: ViolationMeta,
            explicit_count: Option<u32>,
        ) -> Result<u32, ModerationError> {
            let mut record = self
                .records
                .entry(user_id)
                .or_insert_with(|| Self::blank(user_id, &meta.display_name));
            let slot = match category {
                ViolationCategory::AbusiveLanguage => &mut record.abusive_count,
                ViolationCategory::DisallowedLink => &mut record.link_count,
                ViolationCategory::MassMention => &mut record.mention_count,
                ViolationCategory::Spam => &mut record.spam_count,
            };
            *slot = explicit_count.unwrap_or(*slot + 1);
            let count = *slot;
            record.display_name = meta.display_name;
            record.last_category = Some(category);
            record.last_detail = Some(meta.detail);
            record.last_content = Some(meta.content);
            record.last_at = Some(Utc::now());
            Ok(count)
        }

        async fn get(&self, user_id: u64) -> Result<Option<ViolationRecord>, ModerationError> {
            Ok(self.records.get(&user_id).map(|r| r.clone()))
        }

        async fn reset(
            &self,
            user_id: u64,
            category: Option<ViolationCategory>,
        ) -> Result<(), ModerationError> {
            let mut record = self
                .records
                .entry(user_id)
                .or_insert_with(|| Self::blank(user_id, ""));
            match category {
                Some(ViolationCategory::AbusiveLanguage) => record.abusive_count = 0,
                Some(ViolationCategory::DisallowedLink) => record.link_count = 0,
                Some(ViolationCategory::MassMention) => record.mention_count = 0,
                Some(ViolationCategory::Spam) => record.spam_count = 0,
                None => {
                    record.abusive_count = 0;
                    record.link_count = 0;
                    record.mention_count = 0;
                    record.spam_count = 0;
                }
            }
            Ok(())
        }
    }

    const USER: u64 = 123;

    fn service() -> ModerationService<MockViolationStore> {
        ModerationService::new(
            ModerationConfig::default(),
            Lexicon::new(["scum"]),
            PunishmentLadders::default(),
            MockViolationStore::new(),
        )
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn clean_message_produces_no_enforcement() {
        let service = service();
        let result = service
            .process_message(USER, "alice", "hello there", 0, now())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn first_violation_warns() {
        let service = service();
        let enforcement = service
            .process_message(USER, "alice", "you scum", 0, now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(enforcement.category, ViolationCategory::AbusiveLanguage);
        assert_eq!(enforcement.count, 1);
        assert_eq!(enforcement.tier, 1);
        assert_eq!(enforcement.kind, PunishmentKind::Warn);
        assert!(enforcement.channel_text.contains("alice"));
        assert!(!enforcement.clears_history());
    }

    #[tokio::test]
    async fn escalation_runs_warn_mute_ban() {
        let service = service();
        let mut kinds = Vec::new();
        for _ in 0..3 {
            let enforcement = service
                .process_message(USER, "alice", "scum again", 0, now())
                .await
                .unwrap()
                .unwrap();
            kinds.push(enforcement.kind);
        }

        assert_eq!(kinds[0], PunishmentKind::Warn);
        assert!(matches!(kinds[1], PunishmentKind::Mute { duration } if !duration.is_zero()));
        assert_eq!(kinds[2], PunishmentKind::Ban);
    }

    #[tokio::test]
    async fn counts_past_the_ladder_keep_banning() {
        let service = service();
        let enforcement = service.plan(
            ViolationCategory::DisallowedLink,
            "detail".to_string(),
            7,
            "alice",
        );
        assert_eq!(enforcement.tier, 3);
        assert_eq!(enforcement.kind, PunishmentKind::Ban);
    }

    #[tokio::test]
    async fn categories_escalate_independently() {
        let service = service();

        // Two abusive-language violations...
        for _ in 0..2 {
            service
                .process_message(USER, "alice", "scum", 0, now())
                .await
                .unwrap();
        }

        // ...but the first link violation still starts at tier 1.
        let enforcement = service
            .process_message(USER, "alice", "http://evil.example", 0, now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enforcement.category, ViolationCategory::DisallowedLink);
        assert_eq!(enforcement.count, 1);
        assert_eq!(enforcement.kind, PunishmentKind::Warn);

        let record = service.record(USER).await.unwrap().unwrap();
        assert_eq!(record.abusive_count, 2);
        assert_eq!(record.link_count, 1);
    }

    #[tokio::test]
    async fn mention_warning_renders_the_limit() {
        let service = service();
        let enforcement = service
            .process_message(USER, "alice", "hi everyone", 3, now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(enforcement.category, ViolationCategory::MassMention);
        // The default DM template carries a {limit} placeholder.
        assert!(enforcement.dm_text.contains("max 2 allowed"));
        assert!(!enforcement.dm_text.contains("{limit}"));
    }

    /// Drive messages through the service until the spam rule trips once.
    async fn trip_spam(
        service: &ModerationService<MockViolationStore>,
        base: DateTime<Utc>,
    ) -> Enforcement {
        for i in 0..100 {
            let at = base + chrono::Duration::milliseconds(i * 300);
            if let Some(enforcement) = service
                .process_message(USER, "alice", "spam spam", 0, at)
                .await
                .unwrap()
            {
                return enforcement;
            }
        }
        panic!("spam rule never tripped");
    }

    #[tokio::test]
    async fn spam_trip_commits_the_tracker_count() {
        let service = service();
        let enforcement = trip_spam(&service, now()).await;

        assert_eq!(enforcement.category, ViolationCategory::Spam);
        assert_eq!(enforcement.count, 1);
        assert_eq!(enforcement.kind, PunishmentKind::Warn);

        let record = service.record(USER).await.unwrap().unwrap();
        assert_eq!(record.spam_count, 1);
    }

    #[tokio::test]
    async fn third_spam_trip_is_a_ban() {
        let service = service();
        let base = now();
        let mut last = None;
        for round in 0..3 {
            let offset = chrono::Duration::seconds(round * 120);
            last = Some(trip_spam(&service, base + offset).await);
        }

        let enforcement = last.unwrap();
        assert_eq!(enforcement.count, 3);
        assert_eq!(enforcement.kind, PunishmentKind::Ban);
        assert!(enforcement.clears_history());
    }

    #[tokio::test]
    async fn clear_user_resets_every_category_and_the_spam_state() {
        let service = service();
        let base = now();

        service
            .process_message(USER, "alice", "scum", 0, base)
            .await
            .unwrap();
        trip_spam(&service, base).await;
        trip_spam(&service, base + chrono::Duration::seconds(120)).await;

        service.clear_user(USER).await.unwrap();

        let record = service.record(USER).await.unwrap().unwrap();
        for category in ViolationCategory::ALL {
            assert_eq!(record.count(category), 0);
        }

        // Spam trip counting starts over too.
        let enforcement = trip_spam(&service, base + chrono::Duration::seconds(600)).await;
        assert_eq!(enforcement.count, 1);
        assert_eq!(enforcement.kind, PunishmentKind::Warn);
    }

    #[tokio::test]
    async fn metadata_reaches_the_store() {
        let service = service();
        service
            .process_message(USER, "alice", "http://evil.example/z", 0, now())
            .await
            .unwrap();

        let record = service.record(USER).await.unwrap().unwrap();
        assert_eq!(record.display_name, "alice");
        assert_eq!(record.last_category, Some(ViolationCategory::DisallowedLink));
        assert_eq!(record.last_content.as_deref(), Some("http://evil.example/z"));
        assert!(record.last_detail.unwrap().contains("http://evil.example/z"));
    }

    #[tokio::test]
    async fn username_check_honors_the_config_flag() {
        let service = service();
        assert!(service.username_violates("scumlord99"));
        assert!(!service.username_violates("wholesome_gamer"));

        let disabled = ModerationService::new(
            ModerationConfig {
                username_check_enabled: false,
                ..ModerationConfig::default()
            },
            Lexicon::new(["scum"]),
            PunishmentLadders::default(),
            MockViolationStore::new(),
        )
        .unwrap();
        assert!(!disabled.username_violates("scumlord99"));
    }
}
