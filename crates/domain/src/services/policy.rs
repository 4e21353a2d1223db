//! The policy engine.
//!
//! A pure evaluator: it takes one snapshot of active sessions plus
//! point-in-time reads of devices, user preferences, time rules, settings and
//! session start times, and produces a decision per session. It performs no
//! I/O and never mutates anything, so every rule interaction is unit-testable
//! with plain data.
//!
//! Evaluation order per session (first decisive outcome wins):
//! 1. Plexamp product bypass
//! 2. Temporary access with `bypass_policies`
//! 3. Network-location policy, then IP allow-list
//! 4. Time rules (device-specific rules suppress user-wide rules that share
//!    their `day_of_week`)
//! 5. Device approval state
//!
//! The concurrent-stream cap is computed per user over the whole snapshot
//! before the per-session pass; sessions selected by the cap keep their
//! `CONCURRENT_LIMIT` decision and skip steps 1-5.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, Utc};

use shared::net::{address_allowed, classify_address, SessionLocation};
use shared::timeclock::{next_day, wall_clock, WallClock};

use crate::models::{
    Decision, Device, IpAccessPolicy, NetworkPolicy, Session, SessionDecision, StopCode, TimeRule,
    UserPreference,
};

/// Administrator-configurable termination reason texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonMessages {
    pub device_pending: String,
    pub device_rejected: String,
    pub time_restricted: String,
    pub concurrent_limit: String,
    pub lan_only: String,
    pub wan_only: String,
    pub ip_not_allowed: String,
}

impl Default for ReasonMessages {
    fn default() -> Self {
        Self {
            device_pending: "This device has not been approved yet. Please contact your server \
                             administrator."
                .to_string(),
            device_rejected: "This device has been blocked by the server administrator."
                .to_string(),
            time_restricted: "Streaming is not allowed at this time.".to_string(),
            concurrent_limit: "You have reached the maximum number of simultaneous streams."
                .to_string(),
            lan_only: "This account can only stream from the home network.".to_string(),
            wan_only: "This account cannot stream from the home network.".to_string(),
            ip_not_allowed: "Streaming from this network address is not allowed.".to_string(),
        }
    }
}

/// Point-in-time snapshot of the global settings the engine consumes.
#[derive(Debug, Clone)]
pub struct PolicySettings {
    /// Global fallback for pending devices without a per-user override.
    pub default_block: bool,
    /// Global concurrent-stream cap; 0 means unlimited.
    pub concurrent_limit: i64,
    /// Whether sessions on devices with an active temp grant count toward
    /// the cap.
    pub include_temp_access_in_limit: bool,
    /// Fixed UTC offset the time rules are written against.
    pub utc_offset: FixedOffset,
    pub messages: ReasonMessages,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            default_block: false,
            concurrent_limit: 0,
            include_temp_access_in_limit: true,
            utc_offset: FixedOffset::east_opt(0).expect("zero offset"),
            messages: ReasonMessages::default(),
        }
    }
}

/// Everything the engine reads for one evaluation.
#[derive(Debug, Clone)]
pub struct PolicyInput {
    pub sessions: Vec<Session>,
    /// Devices keyed by `(user_id, device_identifier)`.
    pub devices: HashMap<(String, String), Device>,
    /// Preferences keyed by user id.
    pub preferences: HashMap<String, UserPreference>,
    pub rules: Vec<TimeRule>,
    /// `started_at` per session key, from the session history log. Keys
    /// missing here are treated as having just started.
    pub session_started_at: HashMap<String, DateTime<Utc>>,
    pub settings: PolicySettings,
    pub now: DateTime<Utc>,
}

impl Default for PolicyInput {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            devices: HashMap::new(),
            preferences: HashMap::new(),
            rules: Vec::new(),
            session_started_at: HashMap::new(),
            settings: PolicySettings::default(),
            now: Utc::now(),
        }
    }
}

/// Evaluate every session in the snapshot.
///
/// Decisions come back in snapshot order. For fixed inputs the result is
/// deterministic.
pub fn evaluate(input: &PolicyInput) -> Vec<SessionDecision> {
    let over_cap = select_over_cap(input);

    input
        .sessions
        .iter()
        .map(|session| {
            let decision = if over_cap.contains(session.session_id.as_str()) {
                Decision::block(
                    input.settings.messages.concurrent_limit.clone(),
                    StopCode::ConcurrentLimit,
                )
            } else {
                evaluate_session(input, session)
            };
            SessionDecision {
                session_key: session.session_key.clone(),
                session_id: session.session_id.clone(),
                user_id: session.user.id.clone(),
                device_identifier: session.player.machine_id.clone(),
                address: session.player.address.clone(),
                decision,
            }
        })
        .collect()
}

/// Concurrent-cap pass: per user, pick the sessions over the limit.
///
/// Countable sessions exclude Plexamp players, devices flagged out of the
/// cap, and (when configured) devices with an active temp grant. The newest
/// `N - L` countable sessions are selected; "newer" means a later
/// `started_at`, ties broken toward the lexicographically greater
/// `session_key`.
fn select_over_cap<'a>(input: &'a PolicyInput) -> HashSet<&'a str> {
    let mut by_user: HashMap<&str, Vec<&Session>> = HashMap::new();
    for session in &input.sessions {
        by_user.entry(session.user.id.as_str()).or_default().push(session);
    }

    let mut selected = HashSet::new();

    for (user_id, sessions) in by_user {
        let limit = input
            .preferences
            .get(user_id)
            .and_then(|p| p.concurrent_stream_limit)
            .map(i64::from)
            .unwrap_or(input.settings.concurrent_limit);
        if limit == 0 {
            continue;
        }

        let mut countable: Vec<&Session> = sessions
            .into_iter()
            .filter(|s| is_countable(input, s))
            .collect();
        let excess = countable.len() as i64 - limit;
        if excess <= 0 {
            continue;
        }

        countable.sort_by(|a, b| {
            let a_started = started_at(input, a);
            let b_started = started_at(input, b);
            b_started
                .cmp(&a_started)
                .then_with(|| b.session_key.cmp(&a.session_key))
        });

        for session in countable.into_iter().take(excess as usize) {
            selected.insert(session.session_id.as_str());
        }
    }

    selected
}

fn is_countable(input: &PolicyInput, session: &Session) -> bool {
    if session.is_plexamp() {
        return false;
    }
    let Some(device) = input.devices.get(&session.device_key()) else {
        return true;
    };
    if device.exclude_from_concurrent_limit {
        return false;
    }
    if !input.settings.include_temp_access_in_limit && device.has_active_temp_access(input.now) {
        return false;
    }
    true
}

fn started_at(input: &PolicyInput, session: &Session) -> DateTime<Utc> {
    input
        .session_started_at
        .get(&session.session_key)
        .copied()
        .unwrap_or(input.now)
}

/// Steps 1-5 for a single session.
fn evaluate_session(input: &PolicyInput, session: &Session) -> Decision {
    let messages = &input.settings.messages;

    // 1. Product bypass.
    if session.is_plexamp() {
        return Decision::Allow;
    }

    let device = input.devices.get(&session.device_key());
    let temp_active = device
        .map(|d| d.has_active_temp_access(input.now))
        .unwrap_or(false);

    // 2. Temporary access with bypass short-circuits everything else.
    if temp_active && device.map(|d| d.temp_access.bypass_policies).unwrap_or(false) {
        return Decision::Allow;
    }

    let preference = input.preferences.get(session.user.id.as_str());

    // 3. IP policy: network location first, then the allow-list.
    let location = classify_address(&session.player.address);
    match preference.map(|p| p.network_policy).unwrap_or(NetworkPolicy::Both) {
        NetworkPolicy::Lan if location == SessionLocation::Wan => {
            return Decision::block(messages.lan_only.clone(), StopCode::LanOnly);
        }
        NetworkPolicy::Wan if location == SessionLocation::Lan => {
            return Decision::block(messages.wan_only.clone(), StopCode::WanOnly);
        }
        _ => {}
    }

    if let Some(pref) = preference {
        if pref.ip_access_policy == IpAccessPolicy::Restricted
            && !address_allowed(&session.player.address, &pref.allowed_ips)
        {
            return Decision::block(messages.ip_not_allowed.clone(), StopCode::IpNotAllowed);
        }
    }

    // 4. Time rules.
    let wall = wall_clock(input.now, input.settings.utc_offset);
    if time_blocked(
        &input.rules,
        &session.user.id,
        &session.player.machine_id,
        &wall,
    ) {
        return Decision::block(messages.time_restricted.clone(), StopCode::TimeRestricted);
    }

    // 5. Device approval.
    match device.map(|d| d.status) {
        Some(crate::models::DeviceStatus::Rejected) => {
            if temp_active {
                Decision::Allow
            } else {
                Decision::block(messages.device_rejected.clone(), StopCode::DeviceRejected)
            }
        }
        Some(crate::models::DeviceStatus::Approved) => Decision::Allow,
        // Pending, or never materialized at all.
        _ => {
            if temp_active {
                return Decision::Allow;
            }
            let effective_block = preference
                .and_then(|p| p.default_block)
                .unwrap_or(input.settings.default_block);
            if effective_block {
                Decision::block(messages.device_pending.clone(), StopCode::DevicePending)
            } else {
                Decision::Allow
            }
        }
    }
}

/// Whether any applicable enabled rule blocks the given wall-clock instant.
///
/// Device-specific rules take precedence: an enabled device-specific rule
/// suppresses the user-wide rules sharing its `day_of_week`; other days are
/// unaffected.
fn time_blocked(rules: &[TimeRule], user_id: &str, machine_id: &str, wall: &WallClock) -> bool {
    let user_rules: Vec<&TimeRule> = rules
        .iter()
        .filter(|r| r.enabled && r.user_id == user_id)
        .collect();

    let suppressed_days: HashSet<i16> = user_rules
        .iter()
        .filter(|r| r.device_identifier.as_deref() == Some(machine_id))
        .map(|r| r.day_of_week)
        .collect();

    user_rules.iter().any(|rule| {
        let applicable = if rule.is_device_specific() {
            rule.device_identifier.as_deref() == Some(machine_id)
        } else {
            !suppressed_days.contains(&rule.day_of_week)
        };
        applicable && rule_covers(rule, wall)
    })
}

/// Window containment for one rule, including the cross-midnight split.
fn rule_covers(rule: &TimeRule, wall: &WallClock) -> bool {
    let day = rule.day_of_week as u8;
    let start = rule.start_time.as_str();
    let end = rule.end_time.as_str();
    let time = wall.time.as_str();

    if start < end {
        wall.day_of_week == day && start <= time && time < end
    } else if start > end {
        (wall.day_of_week == day && time >= start)
            || (wall.day_of_week == next_day(day) && time < end)
    } else {
        // Zero-length window.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ContentInfo, DeviceNote, DeviceStatus, MediaInfo, PlayerInfo, SessionUser, TempAccess,
    };
    use chrono::{Duration, TimeZone};

    fn session(session_id: &str, user_id: &str, machine_id: &str, address: &str) -> Session {
        Session {
            session_key: session_id.to_string(),
            session_id: session_id.to_string(),
            user: SessionUser {
                id: user_id.to_string(),
                name: Some("alice".to_string()),
                thumb: None,
            },
            player: PlayerInfo {
                machine_id: machine_id.to_string(),
                platform: Some("Chrome".to_string()),
                product: Some("Plex Web".to_string()),
                version: None,
                address: address.to_string(),
                state: Some("playing".to_string()),
                title: None,
            },
            media: MediaInfo::default(),
            content: ContentInfo::default(),
        }
    }

    fn device(user_id: &str, machine_id: &str, status: DeviceStatus) -> Device {
        let now = Utc::now();
        Device {
            id: 1,
            user_id: user_id.to_string(),
            device_identifier: machine_id.to_string(),
            display_name: machine_id.to_string(),
            platform: None,
            product: None,
            version: None,
            status,
            exclude_from_concurrent_limit: false,
            first_seen: now,
            last_seen: now,
            last_ip: None,
            session_count: 1,
            temp_access: TempAccess::default(),
            note: DeviceNote::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn preference(user_id: &str) -> UserPreference {
        UserPreference::observed(user_id.to_string(), None, None)
    }

    fn rule(user_id: &str, day: i16, start: &str, end: &str) -> TimeRule {
        let now = Utc::now();
        TimeRule {
            id: 1,
            user_id: user_id.to_string(),
            device_identifier: None,
            day_of_week: day,
            start_time: start.to_string(),
            end_time: end.to_string(),
            enabled: true,
            rule_name: "test".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn input_with(sessions: Vec<Session>) -> PolicyInput {
        PolicyInput {
            sessions,
            now: Utc::now(),
            ..PolicyInput::default()
        }
    }

    fn insert_device(input: &mut PolicyInput, device: Device) {
        input.devices.insert(
            (device.user_id.clone(), device.device_identifier.clone()),
            device,
        );
    }

    fn decision_of<'a>(decisions: &'a [SessionDecision], session_id: &str) -> &'a Decision {
        &decisions
            .iter()
            .find(|d| d.session_id == session_id)
            .expect("session decision present")
            .decision
    }

    fn stop_code(decision: &Decision) -> Option<StopCode> {
        match decision {
            Decision::Allow => None,
            Decision::Block { stop_code, .. } => Some(*stop_code),
        }
    }

    // Scenario: pending device blocked by the global default.
    #[test]
    fn test_pending_device_blocked_by_global_default() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "203.0.113.5")]);
        input.settings.default_block = true;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Pending));

        let decisions = evaluate(&input);
        let decision = decision_of(&decisions, "s1");
        assert_eq!(stop_code(decision), Some(StopCode::DevicePending));
        match decision {
            Decision::Block { reason, .. } => {
                assert_eq!(reason, &input.settings.messages.device_pending);
            }
            Decision::Allow => panic!("expected block"),
        }
    }

    // Scenario: a device the registry never materialized follows the same path.
    #[test]
    fn test_unknown_device_treated_as_pending() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "203.0.113.5")]);
        input.settings.default_block = true;

        let decisions = evaluate(&input);
        assert_eq!(
            stop_code(decision_of(&decisions, "s1")),
            Some(StopCode::DevicePending)
        );
    }

    #[test]
    fn test_pending_device_allowed_when_default_allow() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "203.0.113.5")]);
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Pending));

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s1"), &Decision::Allow);
    }

    #[test]
    fn test_user_default_block_overrides_global() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "203.0.113.5")]);
        input.settings.default_block = true;
        let mut pref = preference("42");
        pref.default_block = Some(false);
        input.preferences.insert("42".to_string(), pref);

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s1"), &Decision::Allow);
    }

    // Scenario: approved device passes untouched.
    #[test]
    fn test_approved_device_allowed() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "203.0.113.5")]);
        input.settings.default_block = true;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s1"), &Decision::Allow);
    }

    #[test]
    fn test_rejected_device_blocked() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.9")]);
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Rejected));

        let decisions = evaluate(&input);
        assert_eq!(
            stop_code(decision_of(&decisions, "s1")),
            Some(StopCode::DeviceRejected)
        );
    }

    #[test]
    fn test_rejected_device_with_plain_temp_access_allowed() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.9")]);
        let mut dev = device("42", "AAA", DeviceStatus::Rejected);
        dev.temp_access.until = Some(input.now + Duration::hours(1));
        insert_device(&mut input, dev);

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s1"), &Decision::Allow);
    }

    // Scenario: LAN-only preference violated from a WAN address.
    #[test]
    fn test_lan_only_violation() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "198.51.100.7")]);
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        let mut pref = preference("42");
        pref.network_policy = NetworkPolicy::Lan;
        input.preferences.insert("42".to_string(), pref);

        let decisions = evaluate(&input);
        let decision = decision_of(&decisions, "s1");
        assert_eq!(stop_code(decision), Some(StopCode::LanOnly));
        match decision {
            Decision::Block { reason, .. } => {
                assert_eq!(reason, &input.settings.messages.lan_only)
            }
            Decision::Allow => panic!("expected block"),
        }
    }

    #[test]
    fn test_wan_only_violation() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.20")]);
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        let mut pref = preference("42");
        pref.network_policy = NetworkPolicy::Wan;
        input.preferences.insert("42".to_string(), pref);

        let decisions = evaluate(&input);
        assert_eq!(
            stop_code(decision_of(&decisions, "s1")),
            Some(StopCode::WanOnly)
        );
    }

    #[test]
    fn test_restricted_ip_list_blocks_unlisted_address() {
        let mut input = input_with(vec![
            session("s1", "42", "AAA", "198.51.100.7"),
            session("s2", "42", "BBB", "10.1.2.3"),
        ]);
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        insert_device(&mut input, device("42", "BBB", DeviceStatus::Approved));
        let mut pref = preference("42");
        pref.ip_access_policy = IpAccessPolicy::Restricted;
        pref.allowed_ips = vec!["10.0.0.0/8".to_string()];
        input.preferences.insert("42".to_string(), pref);

        let decisions = evaluate(&input);
        assert_eq!(
            stop_code(decision_of(&decisions, "s1")),
            Some(StopCode::IpNotAllowed)
        );
        assert_eq!(decision_of(&decisions, "s2"), &Decision::Allow);
    }

    #[test]
    fn test_network_policy_checked_before_allow_list() {
        // LAN-only and a WAN-only allow-list entry: the location mismatch is
        // reported, not the list miss.
        let mut input = input_with(vec![session("s1", "42", "AAA", "198.51.100.7")]);
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        let mut pref = preference("42");
        pref.network_policy = NetworkPolicy::Lan;
        pref.ip_access_policy = IpAccessPolicy::Restricted;
        pref.allowed_ips = vec!["203.0.113.0/24".to_string()];
        input.preferences.insert("42".to_string(), pref);

        let decisions = evaluate(&input);
        assert_eq!(
            stop_code(decision_of(&decisions, "s1")),
            Some(StopCode::LanOnly)
        );
    }

    // Scenario: time rule active at 21:00 on the current weekday.
    #[test]
    fn test_time_rule_blocks_inside_window() {
        // Wednesday 2024-06-05 21:00 UTC.
        let now = Utc.with_ymd_and_hms(2024, 6, 5, 21, 0, 0).unwrap();
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        input.now = now;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        input.rules.push(rule("42", 3, "20:00", "22:00"));

        let decisions = evaluate(&input);
        let decision = decision_of(&decisions, "s1");
        assert_eq!(stop_code(decision), Some(StopCode::TimeRestricted));
        match decision {
            Decision::Block { reason, .. } => {
                assert_eq!(reason, &input.settings.messages.time_restricted)
            }
            Decision::Allow => panic!("expected block"),
        }
    }

    #[test]
    fn test_time_rule_boundaries_are_half_open() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        input.rules.push(rule("42", 3, "20:00", "22:00"));

        // Exactly at start: blocked.
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 20, 0, 0).unwrap();
        assert!(decision_of(&evaluate(&input), "s1").is_block());

        // Exactly at end: allowed.
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 22, 0, 0).unwrap();
        assert_eq!(decision_of(&evaluate(&input), "s1"), &Decision::Allow);
    }

    #[test]
    fn test_time_rule_respects_configured_offset() {
        // 19:00 UTC is 21:00 at +02:00, inside the window.
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 19, 0, 0).unwrap();
        input.settings.utc_offset = FixedOffset::east_opt(2 * 3600).unwrap();
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        input.rules.push(rule("42", 3, "20:00", "22:00"));

        assert!(decision_of(&evaluate(&input), "s1").is_block());
    }

    #[test]
    fn test_disabled_time_rule_ignored() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 21, 0, 0).unwrap();
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        let mut blocked = rule("42", 3, "20:00", "22:00");
        blocked.enabled = false;
        input.rules.push(blocked);

        assert_eq!(decision_of(&evaluate(&input), "s1"), &Decision::Allow);
    }

    #[test]
    fn test_cross_midnight_rule_covers_both_segments() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        // Wednesday 22:00 through Thursday 02:00.
        input.rules.push(rule("42", 3, "22:00", "02:00"));

        // Wednesday 23:00: inside the first segment.
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 23, 0, 0).unwrap();
        assert!(decision_of(&evaluate(&input), "s1").is_block());

        // Thursday 01:30: inside the spillover segment.
        input.now = Utc.with_ymd_and_hms(2024, 6, 6, 1, 30, 0).unwrap();
        assert!(decision_of(&evaluate(&input), "s1").is_block());

        // Thursday 02:00: past the window.
        input.now = Utc.with_ymd_and_hms(2024, 6, 6, 2, 0, 0).unwrap();
        assert_eq!(decision_of(&evaluate(&input), "s1"), &Decision::Allow);

        // Wednesday 12:00: before the window.
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        assert_eq!(decision_of(&evaluate(&input), "s1"), &Decision::Allow);
    }

    #[test]
    fn test_device_specific_rule_suppresses_user_wide_same_day() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 21, 0, 0).unwrap();
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));

        // User-wide rule would block 20:00-22:00; the device-specific rule
        // for the same day only blocks 08:00-09:00, so 21:00 passes.
        input.rules.push(rule("42", 3, "20:00", "22:00"));
        let mut device_rule = rule("42", 3, "08:00", "09:00");
        device_rule.device_identifier = Some("AAA".to_string());
        input.rules.push(device_rule);

        assert_eq!(decision_of(&evaluate(&input), "s1"), &Decision::Allow);
    }

    #[test]
    fn test_device_specific_rule_leaves_other_days_alone() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 21, 0, 0).unwrap();
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));

        input.rules.push(rule("42", 3, "20:00", "22:00"));
        // Device-specific rule on Friday; Wednesday's user-wide rule stands.
        let mut device_rule = rule("42", 5, "08:00", "09:00");
        device_rule.device_identifier = Some("AAA".to_string());
        input.rules.push(device_rule);

        assert!(decision_of(&evaluate(&input), "s1").is_block());
    }

    #[test]
    fn test_rule_for_other_device_does_not_apply() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 21, 0, 0).unwrap();
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));

        let mut other_device_rule = rule("42", 3, "20:00", "22:00");
        other_device_rule.device_identifier = Some("BBB".to_string());
        input.rules.push(other_device_rule);

        assert_eq!(decision_of(&evaluate(&input), "s1"), &Decision::Allow);
    }

    #[test]
    fn test_rule_for_other_user_does_not_apply() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 21, 0, 0).unwrap();
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        input.rules.push(rule("77", 3, "20:00", "22:00"));

        assert_eq!(decision_of(&evaluate(&input), "s1"), &Decision::Allow);
    }

    // Scenario: concurrent cap terminates only the newest sessions.
    #[test]
    fn test_concurrent_cap_selects_newest() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut input = input_with(vec![
            session("s_a", "42", "AAA", "192.168.1.4"),
            session("s_b", "42", "BBB", "192.168.1.5"),
            session("s_c", "42", "CCC", "192.168.1.6"),
        ]);
        input.now = base + Duration::minutes(15);
        input.settings.concurrent_limit = 2;
        for machine in ["AAA", "BBB", "CCC"] {
            insert_device(&mut input, device("42", machine, DeviceStatus::Approved));
        }
        input.session_started_at.insert("s_a".to_string(), base);
        input
            .session_started_at
            .insert("s_b".to_string(), base + Duration::minutes(5));
        input
            .session_started_at
            .insert("s_c".to_string(), base + Duration::minutes(10));

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s_a"), &Decision::Allow);
        assert_eq!(decision_of(&decisions, "s_b"), &Decision::Allow);
        let decision = decision_of(&decisions, "s_c");
        assert_eq!(stop_code(decision), Some(StopCode::ConcurrentLimit));
        match decision {
            Decision::Block { reason, .. } => {
                assert_eq!(reason, &input.settings.messages.concurrent_limit)
            }
            Decision::Allow => panic!("expected block"),
        }
    }

    #[test]
    fn test_concurrent_cap_tie_break_on_session_key() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut input = input_with(vec![
            session("s_a", "42", "AAA", "192.168.1.4"),
            session("s_b", "42", "BBB", "192.168.1.5"),
        ]);
        input.now = base;
        input.settings.concurrent_limit = 1;
        for machine in ["AAA", "BBB"] {
            insert_device(&mut input, device("42", machine, DeviceStatus::Approved));
        }
        // Identical start times: the lexicographically greater key counts as
        // newer and is the one cut.
        input.session_started_at.insert("s_a".to_string(), base);
        input.session_started_at.insert("s_b".to_string(), base);

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s_a"), &Decision::Allow);
        assert!(decision_of(&decisions, "s_b").is_block());
    }

    #[test]
    fn test_concurrent_cap_unknown_start_counts_as_newest() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut input = input_with(vec![
            session("s_old", "42", "AAA", "192.168.1.4"),
            session("s_new", "42", "BBB", "192.168.1.5"),
        ]);
        input.now = base + Duration::minutes(30);
        input.settings.concurrent_limit = 1;
        for machine in ["AAA", "BBB"] {
            insert_device(&mut input, device("42", machine, DeviceStatus::Approved));
        }
        input.session_started_at.insert("s_old".to_string(), base);
        // s_new has no history row yet.

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s_old"), &Decision::Allow);
        assert!(decision_of(&decisions, "s_new").is_block());
    }

    #[test]
    fn test_concurrent_cap_zero_means_unlimited() {
        let mut input = input_with(vec![
            session("s1", "42", "AAA", "192.168.1.4"),
            session("s2", "42", "BBB", "192.168.1.5"),
            session("s3", "42", "CCC", "192.168.1.6"),
        ]);
        input.settings.concurrent_limit = 0;
        for machine in ["AAA", "BBB", "CCC"] {
            insert_device(&mut input, device("42", machine, DeviceStatus::Approved));
        }

        assert!(evaluate(&input).iter().all(|d| !d.decision.is_block()));
    }

    #[test]
    fn test_concurrent_cap_per_user_override() {
        let mut input = input_with(vec![
            session("s1", "42", "AAA", "192.168.1.4"),
            session("s2", "42", "BBB", "192.168.1.5"),
        ]);
        input.settings.concurrent_limit = 1;
        for machine in ["AAA", "BBB"] {
            insert_device(&mut input, device("42", machine, DeviceStatus::Approved));
        }
        // Per-user 0 overrides the global cap of 1.
        let mut pref = preference("42");
        pref.concurrent_stream_limit = Some(0);
        input.preferences.insert("42".to_string(), pref);

        assert!(evaluate(&input).iter().all(|d| !d.decision.is_block()));
    }

    #[test]
    fn test_concurrent_cap_skips_excluded_devices() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut input = input_with(vec![
            session("s1", "42", "AAA", "192.168.1.4"),
            session("s2", "42", "BBB", "192.168.1.5"),
        ]);
        input.now = base;
        input.settings.concurrent_limit = 1;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        let mut excluded = device("42", "BBB", DeviceStatus::Approved);
        excluded.exclude_from_concurrent_limit = true;
        insert_device(&mut input, excluded);

        assert!(evaluate(&input).iter().all(|d| !d.decision.is_block()));
    }

    #[test]
    fn test_concurrent_cap_temp_access_exclusion_flag() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut sessions = vec![
            session("s1", "42", "AAA", "192.168.1.4"),
            session("s2", "42", "BBB", "192.168.1.5"),
        ];
        sessions[1].session_key = "s2".to_string();

        let mut input = input_with(sessions);
        input.now = base;
        input.settings.concurrent_limit = 1;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        let mut granted = device("42", "BBB", DeviceStatus::Approved);
        granted.temp_access.until = Some(base + Duration::hours(1));
        insert_device(&mut input, granted);

        // Counted by default.
        input.settings.include_temp_access_in_limit = true;
        assert!(evaluate(&input).iter().any(|d| d.decision.is_block()));

        // Dropped from the countable set when configured off.
        input.settings.include_temp_access_in_limit = false;
        assert!(evaluate(&input).iter().all(|d| !d.decision.is_block()));
    }

    #[test]
    fn test_concurrent_cap_users_evaluated_independently() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut input = input_with(vec![
            session("s1", "42", "AAA", "192.168.1.4"),
            session("s2", "42", "BBB", "192.168.1.5"),
            session("s3", "77", "CCC", "192.168.1.6"),
        ]);
        input.now = base;
        input.settings.concurrent_limit = 2;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        insert_device(&mut input, device("42", "BBB", DeviceStatus::Approved));
        insert_device(&mut input, device("77", "CCC", DeviceStatus::Approved));

        assert!(evaluate(&input).iter().all(|d| !d.decision.is_block()));
    }

    // Scenario: temp access with bypass wins over rejected + LAN violation.
    #[test]
    fn test_temp_access_with_bypass_overrides_everything() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "198.51.100.7")]);
        let mut dev = device("42", "AAA", DeviceStatus::Rejected);
        dev.temp_access.until = Some(input.now + Duration::hours(1));
        dev.temp_access.bypass_policies = true;
        insert_device(&mut input, dev);
        let mut pref = preference("42");
        pref.network_policy = NetworkPolicy::Lan;
        input.preferences.insert("42".to_string(), pref);

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s1"), &Decision::Allow);
    }

    #[test]
    fn test_temp_access_without_bypass_does_not_override_ip_policy() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "198.51.100.7")]);
        let mut dev = device("42", "AAA", DeviceStatus::Rejected);
        dev.temp_access.until = Some(input.now + Duration::hours(1));
        insert_device(&mut input, dev);
        let mut pref = preference("42");
        pref.network_policy = NetworkPolicy::Lan;
        input.preferences.insert("42".to_string(), pref);

        let decisions = evaluate(&input);
        assert_eq!(
            stop_code(decision_of(&decisions, "s1")),
            Some(StopCode::LanOnly)
        );
    }

    #[test]
    fn test_expired_temp_access_confers_nothing() {
        let mut input = input_with(vec![session("s1", "42", "AAA", "192.168.1.4")]);
        let mut dev = device("42", "AAA", DeviceStatus::Rejected);
        dev.temp_access.until = Some(input.now - Duration::seconds(1));
        dev.temp_access.bypass_policies = true;
        insert_device(&mut input, dev);

        let decisions = evaluate(&input);
        assert_eq!(
            stop_code(decision_of(&decisions, "s1")),
            Some(StopCode::DeviceRejected)
        );
    }

    // Plexamp invariance: always allowed, whatever else is configured.
    #[test]
    fn test_plexamp_always_allowed() {
        let mut plexamp = session("s1", "42", "AAA", "198.51.100.7");
        plexamp.player.product = Some("Plexamp".to_string());

        let mut input = input_with(vec![plexamp]);
        input.now = Utc.with_ymd_and_hms(2024, 6, 5, 21, 0, 0).unwrap();
        input.settings.default_block = true;
        input.settings.concurrent_limit = 1;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Rejected));
        let mut pref = preference("42");
        pref.network_policy = NetworkPolicy::Lan;
        pref.ip_access_policy = IpAccessPolicy::Restricted;
        input.preferences.insert("42".to_string(), pref);
        input.rules.push(rule("42", 3, "00:00", "23:59"));

        let decisions = evaluate(&input);
        assert_eq!(decision_of(&decisions, "s1"), &Decision::Allow);
    }

    #[test]
    fn test_plexamp_never_counted_toward_cap() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut plexamp = session("s3", "42", "CCC", "192.168.1.6");
        plexamp.player.product = Some("Plexamp".to_string());
        let mut input = input_with(vec![
            session("s1", "42", "AAA", "192.168.1.4"),
            session("s2", "42", "BBB", "192.168.1.5"),
            plexamp,
        ]);
        input.now = base;
        input.settings.concurrent_limit = 2;
        for machine in ["AAA", "BBB", "CCC"] {
            insert_device(&mut input, device("42", machine, DeviceStatus::Approved));
        }

        assert!(evaluate(&input).iter().all(|d| !d.decision.is_block()));
    }

    // Precedence: the cap decision sticks even where steps 1-5 would block
    // for a different reason.
    #[test]
    fn test_cap_marked_session_skips_per_session_steps() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut input = input_with(vec![
            session("s_a", "42", "AAA", "192.168.1.4"),
            session("s_b", "42", "BBB", "192.168.1.5"),
        ]);
        input.now = base + Duration::minutes(10);
        input.settings.concurrent_limit = 1;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        // The newest session's device is rejected; the cap still claims it.
        insert_device(&mut input, device("42", "BBB", DeviceStatus::Rejected));
        input.session_started_at.insert("s_a".to_string(), base);
        input
            .session_started_at
            .insert("s_b".to_string(), base + Duration::minutes(5));

        let decisions = evaluate(&input);
        assert_eq!(
            stop_code(decision_of(&decisions, "s_b")),
            Some(StopCode::ConcurrentLimit)
        );
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let base = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut input = input_with(vec![
            session("s1", "42", "AAA", "192.168.1.4"),
            session("s2", "42", "BBB", "198.51.100.7"),
            session("s3", "77", "CCC", "10.0.0.9"),
        ]);
        input.now = base;
        input.settings.default_block = true;
        input.settings.concurrent_limit = 1;
        insert_device(&mut input, device("42", "AAA", DeviceStatus::Approved));
        insert_device(&mut input, device("77", "CCC", DeviceStatus::Rejected));

        let first = evaluate(&input);
        let second = evaluate(&input);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.session_id, b.session_id);
            assert_eq!(a.decision, b.decision);
        }
    }

    #[test]
    fn test_empty_snapshot_yields_no_decisions() {
        let input = PolicyInput::default();
        assert!(evaluate(&input).is_empty());
    }
}
