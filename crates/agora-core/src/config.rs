//! Repository policy resolution
//!
//! Reads the per-repository YAML document (`.github/agora.yml`) into an
//! [`EffectiveConfig`]. Resolution never fails: a missing or malformed
//! document yields the default policy, bad entries are dropped one by one,
//! and out-of-range numbers are clamped. Every degradation is logged with the
//! path of the offending field.
//!
//! ```yaml
//! version: 1
//! governance:
//!   proposals:
//!     discussion:
//!       exits:
//!         - type: auto
//!           afterMinutes: 1440
//!           minReady: 2
//!     voting:
//!       exits:
//!         - type: auto
//!           afterMinutes: 60
//!           requires: unanimous
//!           minVoters: 5
//!         - type: auto
//!           afterMinutes: 1440
//!           requiredVoters: { minCount: 1, voters: [alice, bob] }
//!   pr:
//!     trustedReviewers: [alice]
//!     intake:
//!       - method: approval
//!         minApprovals: 1
//! standup:
//!   enabled: true
//!   category: Standups
//! ```

use serde_yaml::{Mapping, Value};
use tracing::{info, warn};

use crate::policy::{
    default_discussion, default_voting, AutoDiscussionExit, AutoVotingExit, Bounds,
    EffectiveConfig, ExitPolicy, IntakeMethod, MergeReadyPolicy, PrPolicy, RequiredParticipants,
    StandupPolicy, TimedExit, VoteRequirement, AFTER_MINUTES_BOUNDS, DEFAULT_MAX_PRS_PER_ISSUE,
    DEFAULT_MIN_APPROVALS, DEFAULT_MIN_READY, DEFAULT_MIN_VOTERS, DEFAULT_STALE_DAYS,
    DEFAULT_STANDUP_CATEGORY, MAX_EXITS_PER_PHASE, MAX_PRS_PER_ISSUE_BOUNDS,
    MAX_REQUIRED_USERS, MAX_TRUSTED_REVIEWERS, MIN_APPROVALS_BOUNDS, MIN_PARTICIPANTS_BOUNDS,
    STALE_DAYS_BOUNDS,
};

/// Default location of the policy document inside a repository
pub const DEFAULT_CONFIG_PATH: &str = ".github/agora.yml";

/// A single degradation applied while resolving a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Resolve a repository's policy document
///
/// `None` means the document does not exist.
pub fn resolve_config(document: Option<&str>) -> EffectiveConfig {
    resolve_config_with_warnings(document).0
}

/// Like [`resolve_config`], also returning every degradation applied
pub fn resolve_config_with_warnings(
    document: Option<&str>,
) -> (EffectiveConfig, Vec<ConfigWarning>) {
    let mut resolver = Resolver::default();
    let config = resolver.resolve(document);
    (config, resolver.warnings)
}

type AutoParser<E> = fn(&mut Resolver, &Mapping, &str) -> Option<E>;

#[derive(Default)]
struct Resolver {
    warnings: Vec<ConfigWarning>,
}

impl Resolver {
    fn warn(&mut self, path: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(path = %path, "Config: {}", message);
        self.warnings.push(ConfigWarning {
            path: path.to_string(),
            message,
        });
    }

    fn resolve(&mut self, document: Option<&str>) -> EffectiveConfig {
        let Some(text) = document else {
            info!("No governance config file; using default policy");
            return EffectiveConfig::default();
        };

        let root = match serde_yaml::from_str::<Value>(text) {
            Ok(Value::Null) => {
                info!("Governance config file is empty; using default policy");
                return EffectiveConfig::default();
            }
            Ok(Value::Mapping(map)) => map,
            Ok(_) => {
                self.warn("<root>", "document is not a mapping; using default policy");
                return EffectiveConfig::default();
            }
            Err(e) => {
                self.warn("<root>", format!("invalid YAML ({}); using default policy", e));
                return EffectiveConfig::default();
            }
        };

        let version = match root.get("version") {
            None => 1,
            Some(v) => match v.as_u64() {
                Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
                None => {
                    self.warn("version", "expected an integer; assuming 1");
                    1
                }
            },
        };

        let governance = self.mapping(root.get("governance"), "governance");
        let proposals = governance
            .and_then(|g| g.get("proposals"))
            .and_then(|p| self.mapping(Some(p), "governance.proposals"));

        let phase_block = |name: &str| proposals.and_then(|p| p.get(name));

        let discussion = self.phase_exits(
            phase_block("discussion"),
            "governance.proposals.discussion",
            Resolver::discussion_exit,
            default_discussion(),
        );
        let voting = self.phase_exits(
            phase_block("voting"),
            "governance.proposals.voting",
            Resolver::voting_exit,
            default_voting(),
        );
        let extended_voting = self.phase_exits(
            phase_block("extendedVoting"),
            "governance.proposals.extendedVoting",
            Resolver::voting_exit,
            default_voting(),
        );

        let pr = governance.and_then(|g| g.get("pr")).and_then(|v| self.pr_policy(v));
        let standup = root.get("standup").and_then(|v| self.standup_policy(v));

        EffectiveConfig {
            version,
            discussion,
            voting,
            extended_voting,
            pr,
            standup,
        }
    }

    /// Optional mapping; any other type is ignored with a warning
    fn mapping<'a>(&mut self, value: Option<&'a Value>, path: &str) -> Option<&'a Mapping> {
        match value {
            None | Some(Value::Null) => None,
            Some(Value::Mapping(map)) => Some(map),
            Some(_) => {
                self.warn(path, "expected a mapping; ignoring");
                None
            }
        }
    }

    fn phase_exits<E: TimedExit>(
        &mut self,
        block: Option<&Value>,
        path: &str,
        parse_auto: AutoParser<E>,
        default: ExitPolicy<E>,
    ) -> ExitPolicy<E> {
        let Some(block) = self.mapping(block, path) else {
            return default;
        };

        let exits_path = format!("{}.exits", path);
        let entries = match block.get("exits") {
            None | Some(Value::Null) => return default,
            Some(Value::Sequence(entries)) => entries,
            Some(_) => {
                self.warn(&exits_path, "expected a list; using default exits");
                return default;
            }
        };

        if entries.len() > MAX_EXITS_PER_PHASE {
            self.warn(
                &exits_path,
                format!(
                    "{} exits configured, only the first {} are used",
                    entries.len(),
                    MAX_EXITS_PER_PHASE
                ),
            );
        }

        let mut manual = false;
        let mut autos = Vec::new();

        for (idx, entry) in entries.iter().take(MAX_EXITS_PER_PHASE).enumerate() {
            let entry_path = format!("{}[{}]", exits_path, idx);
            let Some(map) = entry.as_mapping() else {
                self.warn(&entry_path, "exit must be a mapping; dropped");
                continue;
            };

            match map.get("type").and_then(Value::as_str) {
                Some("manual") => manual = true,
                Some("auto") => {
                    if let Some(exit) = parse_auto(self, map, &entry_path) {
                        autos.push(exit);
                    }
                }
                Some(other) => {
                    self.warn(&entry_path, format!("unknown exit type '{}'; dropped", other));
                }
                None => self.warn(&entry_path, "missing exit type; dropped"),
            }
        }

        if manual && !autos.is_empty() {
            self.warn(&exits_path, "mixes manual and auto exits; treating phase as manual");
            return ExitPolicy::Manual;
        }
        if manual {
            return ExitPolicy::Manual;
        }
        if autos.is_empty() {
            self.warn(&exits_path, "no valid exits; using default exits");
            return default;
        }

        ExitPolicy::auto(autos)
    }

    fn voting_exit(&mut self, map: &Mapping, path: &str) -> Option<AutoVotingExit> {
        let after_ms = self.after_ms(map, path)?;

        let requires_path = format!("{}.requires", path);
        let requires = match map.get("requires") {
            None | Some(Value::Null) => VoteRequirement::Majority,
            Some(v) => match v.as_str().map(str::to_lowercase).as_deref() {
                Some("majority") => VoteRequirement::Majority,
                Some("unanimous") => VoteRequirement::Unanimous,
                _ => {
                    self.warn(&requires_path, "expected 'majority' or 'unanimous'; using majority");
                    VoteRequirement::Majority
                }
            },
        };

        let min_voters = self.bounded_count(
            map.get("minVoters"),
            &format!("{}.minVoters", path),
            DEFAULT_MIN_VOTERS,
            MIN_PARTICIPANTS_BOUNDS,
        );
        let required_voters = self.required_participants(
            map.get("requiredVoters"),
            &format!("{}.requiredVoters", path),
            "voters",
        );

        Some(AutoVotingExit {
            after_ms,
            requires,
            min_voters,
            required_voters,
        })
    }

    fn discussion_exit(&mut self, map: &Mapping, path: &str) -> Option<AutoDiscussionExit> {
        let after_ms = self.after_ms(map, path)?;
        let min_ready = self.bounded_count(
            map.get("minReady"),
            &format!("{}.minReady", path),
            DEFAULT_MIN_READY,
            MIN_PARTICIPANTS_BOUNDS,
        );
        let required_ready = self.required_participants(
            map.get("requiredReady"),
            &format!("{}.requiredReady", path),
            "users",
        );

        Some(AutoDiscussionExit {
            after_ms,
            min_ready,
            required_ready,
        })
    }

    /// `afterMinutes` in milliseconds; `None` drops the exit
    fn after_ms(&mut self, map: &Mapping, path: &str) -> Option<u64> {
        let field = format!("{}.afterMinutes", path);
        let minutes = match map.get("afterMinutes").and_then(Value::as_f64) {
            Some(m) if m.is_finite() => m,
            _ => {
                self.warn(&field, "auto exit needs a numeric time window; dropped");
                return None;
            }
        };

        let min = AFTER_MINUTES_BOUNDS.min as f64;
        let max = AFTER_MINUTES_BOUNDS.max as f64;
        let clamped = minutes.clamp(min, max);
        if clamped != minutes {
            self.warn(
                &field,
                format!("{} out of range [{}, {}]; clamped to {}", minutes, min, max, clamped),
            );
        }

        Some((clamped * 60_000.0).round() as u64)
    }

    fn bounded_count(
        &mut self,
        value: Option<&Value>,
        path: &str,
        default: u32,
        bounds: Bounds,
    ) -> u32 {
        let raw = match value {
            None | Some(Value::Null) => return default,
            Some(v) => match (v.as_i64(), v.as_f64()) {
                (Some(n), _) => n,
                (None, Some(f)) if f.is_finite() => f.floor() as i64,
                _ => {
                    self.warn(path, format!("expected a number; using default {}", default));
                    return default;
                }
            },
        };

        let clamped = bounds.clamp(raw.max(0) as u64);
        if raw < 0 || clamped != raw as u64 {
            self.warn(
                path,
                format!(
                    "{} out of range [{}, {}]; clamped to {}",
                    raw, bounds.min, bounds.max, clamped
                ),
            );
        }
        u32::try_from(clamped).unwrap_or(u32::MAX)
    }

    /// Lowercased, deduplicated login list capped at `max`
    fn user_list(&mut self, items: &[Value], path: &str, max: usize) -> Vec<String> {
        let mut users: Vec<String> = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            match item.as_str().map(str::trim) {
                Some(login) if !login.is_empty() => {
                    let login = login.to_lowercase();
                    if !users.contains(&login) {
                        users.push(login);
                    }
                }
                _ => self.warn(&format!("{}[{}]", path, idx), "expected a login; dropped"),
            }
        }
        if users.len() > max {
            self.warn(path, format!("{} entries, only the first {} are used", users.len(), max));
            users.truncate(max);
        }
        users
    }

    /// Array shorthand (all required) or `{minCount, <list_key>}` object form
    fn required_participants(
        &mut self,
        value: Option<&Value>,
        path: &str,
        list_key: &str,
    ) -> RequiredParticipants {
        match value {
            None | Some(Value::Null) => RequiredParticipants::none(),
            Some(Value::Sequence(items)) => {
                RequiredParticipants::all(self.user_list(items, path, MAX_REQUIRED_USERS))
            }
            Some(Value::Mapping(map)) => {
                let list_path = format!("{}.{}", path, list_key);
                let users = match map.get(list_key) {
                    Some(Value::Sequence(items)) => {
                        self.user_list(items, &list_path, MAX_REQUIRED_USERS)
                    }
                    None | Some(Value::Null) => Vec::new(),
                    Some(_) => {
                        self.warn(&list_path, "expected a list of logins; ignoring");
                        Vec::new()
                    }
                };

                let len = users.len() as u64;
                let min_count = self.bounded_count(
                    map.get("minCount"),
                    &format!("{}.minCount", path),
                    users.len() as u32,
                    Bounds::new(0, len),
                );

                RequiredParticipants {
                    min_count: min_count as usize,
                    users,
                }
            }
            Some(_) => {
                self.warn(path, "expected a list or {minCount, list}; ignoring");
                RequiredParticipants::none()
            }
        }
    }

    fn pr_policy(&mut self, value: &Value) -> Option<PrPolicy> {
        let path = "governance.pr";
        let map = match value {
            Value::Null => return None,
            Value::Mapping(map) => map,
            _ => {
                self.warn(path, "expected a mapping; PR workflow disabled");
                return None;
            }
        };

        let stale_days = self.bounded_count(
            map.get("staleDays"),
            "governance.pr.staleDays",
            DEFAULT_STALE_DAYS,
            STALE_DAYS_BOUNDS,
        );
        let max_prs_per_issue = self.bounded_count(
            map.get("maxPRsPerIssue"),
            "governance.pr.maxPRsPerIssue",
            DEFAULT_MAX_PRS_PER_ISSUE,
            MAX_PRS_PER_ISSUE_BOUNDS,
        );

        let trusted_reviewers = match map.get("trustedReviewers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => {
                self.user_list(items, "governance.pr.trustedReviewers", MAX_TRUSTED_REVIEWERS)
            }
            Some(_) => {
                self.warn("governance.pr.trustedReviewers", "expected a list of logins; ignoring");
                Vec::new()
            }
        };

        let intake = self.intake_methods(map.get("intake"), !trusted_reviewers.is_empty());
        let merge_ready = self.merge_ready(map.get("mergeReady"));

        Some(PrPolicy {
            stale_days,
            max_prs_per_issue,
            trusted_reviewers,
            intake,
            merge_ready,
        })
    }

    fn intake_methods(
        &mut self,
        value: Option<&Value>,
        has_trusted_reviewers: bool,
    ) -> Vec<IntakeMethod> {
        let path = "governance.pr.intake";
        let entries = match value {
            None | Some(Value::Null) => return vec![IntakeMethod::Update],
            Some(Value::Sequence(entries)) => entries,
            Some(_) => {
                self.warn(path, "expected a list; using 'update'");
                return vec![IntakeMethod::Update];
            }
        };

        let mut methods = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            let entry_path = format!("{}[{}]", path, idx);
            let (method, map) = match entry {
                Value::String(s) => (Some(s.as_str()), None),
                Value::Mapping(map) => (map.get("method").and_then(Value::as_str), Some(map)),
                _ => (None, None),
            };

            match method {
                Some("update") => methods.push(IntakeMethod::Update),
                Some("approval") => {
                    if !has_trusted_reviewers {
                        self.warn(
                            &entry_path,
                            "approval intake needs trustedReviewers and can never match; dropped",
                        );
                        continue;
                    }
                    let min_approvals = self.bounded_count(
                        map.and_then(|m| m.get("minApprovals")),
                        &format!("{}.minApprovals", entry_path),
                        DEFAULT_MIN_APPROVALS,
                        MIN_APPROVALS_BOUNDS,
                    );
                    methods.push(IntakeMethod::Approval { min_approvals });
                }
                Some(other) => {
                    self.warn(&entry_path, format!("unknown intake method '{}'; dropped", other))
                }
                None => self.warn(&entry_path, "missing intake method; dropped"),
            }
        }

        if methods.is_empty() {
            self.warn(path, "no valid intake methods; linked PRs will not be activated");
        }
        methods
    }

    fn merge_ready(&mut self, value: Option<&Value>) -> Option<MergeReadyPolicy> {
        let path = "governance.pr.mergeReady";
        match value {
            None | Some(Value::Null) => None,
            Some(Value::Mapping(map)) => {
                let min_approvals = self.bounded_count(
                    map.get("minApprovals"),
                    "governance.pr.mergeReady.minApprovals",
                    DEFAULT_MIN_APPROVALS,
                    MIN_APPROVALS_BOUNDS,
                );
                Some(MergeReadyPolicy { min_approvals })
            }
            Some(_) => {
                self.warn(path, "expected a mapping; merge-ready disabled");
                None
            }
        }
    }

    fn standup_policy(&mut self, value: &Value) -> Option<StandupPolicy> {
        let map = match value {
            Value::Null => return None,
            Value::Mapping(map) => map,
            _ => {
                self.warn("standup", "expected a mapping; standup disabled");
                return None;
            }
        };

        match map.get("enabled") {
            Some(Value::Bool(true)) => {}
            Some(Value::Bool(false)) | None | Some(Value::Null) => return None,
            Some(_) => {
                self.warn("standup.enabled", "expected true or false; standup disabled");
                return None;
            }
        }

        let category = match map.get("category") {
            None | Some(Value::Null) => DEFAULT_STANDUP_CATEGORY.to_string(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(_) => {
                self.warn("standup.category", "expected a category name; standup disabled");
                return None;
            }
        };

        Some(StandupPolicy { category })
    }
}
