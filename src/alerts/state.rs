use crate::alerts::types::AlertType;
use crate::config::AlertConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lazily derived per-type status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Idle,
    /// Within this type's cooldown, outside the suppression window
    Cooling,
    /// Within the suppression window of the last send
    Active,
}

/// Why a send was refused
#[derive(Debug, Clone, PartialEq)]
pub enum SuppressionReason {
    /// Confidence or run length below the camera's thresholds
    Confidence,
    /// A higher-priority type is inside its suppression window
    Hierarchy { blocking: AlertType },
    /// Same type sent too recently
    Cooldown { remaining: Duration },
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionReason::Confidence => f.write_str("confidence below camera threshold"),
            SuppressionReason::Hierarchy { blocking } => {
                write!(f, "higher-priority '{}' alert active", blocking)
            }
            SuppressionReason::Cooldown { remaining } => {
                write!(f, "cooldown ({}s remaining)", remaining.num_seconds())
            }
        }
    }
}

/// Process-wide state for one alert type
#[derive(Debug, Clone, PartialEq)]
pub struct AlertState {
    pub last_sent_at: Option<DateTime<Utc>>,
    /// Start of the current reporting session, if one is open
    pub active_since: Option<DateTime<Utc>>,
    /// Latest presence observed while the session was open
    pub last_seen_at: Option<DateTime<Utc>>,
    pub total_count: u64,
    /// Outcome of the most recent evaluation
    pub suppressed: bool,
    pub suppressed_count: u64,
    /// Finalized session time
    pub accumulated: Duration,
    pub delivered_recipients: u64,
}

impl Default for AlertState {
    fn default() -> Self {
        Self {
            last_sent_at: None,
            active_since: None,
            last_seen_at: None,
            total_count: 0,
            suppressed: false,
            suppressed_count: 0,
            accumulated: Duration::zero(),
            delivered_recipients: 0,
        }
    }
}

impl AlertState {
    fn within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_sent_at
            .map_or(false, |sent| now.signed_duration_since(sent) < window)
    }

    pub fn status(&self, now: DateTime<Utc>, suppression: Duration, cooldown: Duration) -> AlertStatus {
        if self.within(now, suppression) {
            AlertStatus::Active
        } else if self.within(now, cooldown) {
            AlertStatus::Cooling
        } else {
            AlertStatus::Idle
        }
    }

    /// Length of the open session so far
    fn open_session(&self) -> Duration {
        match (self.active_since, self.last_seen_at) {
            (Some(since), Some(seen)) if seen > since => seen.signed_duration_since(since),
            _ => Duration::zero(),
        }
    }
}

/// Per-type numbers for after-action reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTypeStatistics {
    pub alert_type: AlertType,
    pub count: u64,
    pub duration_seconds: i64,
    pub suppressed_count: u64,
    pub delivered_recipients: u64,
    pub active: bool,
}

/// Reporting snapshot over every alert type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub session_start: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub alerts: Vec<AlertTypeStatistics>,
}

impl AlertStatistics {
    pub fn get(&self, alert_type: AlertType) -> Option<&AlertTypeStatistics> {
        self.alerts.iter().find(|stats| stats.alert_type == alert_type)
    }

    pub fn total_count(&self) -> u64 {
        self.alerts.iter().map(|stats| stats.count).sum()
    }

    pub fn total_duration_seconds(&self) -> i64 {
        self.alerts.iter().map(|stats| stats.duration_seconds).sum()
    }
}

/// The whole alert state map plus the knobs that shape decisions.
///
/// Always accessed under the coordinator's single lock, so the hierarchy
/// scan and the state update see one consistent snapshot.
#[derive(Debug, Clone)]
pub struct AlertBook {
    states: BTreeMap<AlertType, AlertState>,
    session_start: DateTime<Utc>,
    alert_delay_minutes: u32,
    suppression_window: Duration,
    inactivity_window: Duration,
}

impl AlertBook {
    pub fn new(config: &AlertConfig, now: DateTime<Utc>) -> Self {
        Self {
            states: AlertType::ALL
                .into_iter()
                .map(|alert_type| (alert_type, AlertState::default()))
                .collect(),
            session_start: now,
            alert_delay_minutes: config.alert_delay_minutes,
            suppression_window: Duration::minutes(config.suppression_window_minutes as i64),
            inactivity_window: Duration::minutes(config.inactivity_window_minutes as i64),
        }
    }

    pub fn state(&self, alert_type: AlertType) -> &AlertState {
        // Every type is inserted at construction
        &self.states[&alert_type]
    }

    fn state_mut(&mut self, alert_type: AlertType) -> &mut AlertState {
        self.states.entry(alert_type).or_default()
    }

    pub fn alert_delay_minutes(&self) -> u32 {
        self.alert_delay_minutes
    }

    /// Replace the global delay, returning the previous value
    pub fn set_alert_delay(&mut self, minutes: u32) -> u32 {
        std::mem::replace(&mut self.alert_delay_minutes, minutes)
    }

    pub fn cooldown(&self, alert_type: AlertType) -> Duration {
        Duration::minutes(self.alert_delay_minutes as i64 * alert_type.cooldown_multiplier() as i64)
    }

    pub fn suppression_window(&self) -> Duration {
        self.suppression_window
    }

    pub fn status(&self, alert_type: AlertType, now: DateTime<Utc>) -> AlertStatus {
        self.state(alert_type)
            .status(now, self.suppression_window, self.cooldown(alert_type))
    }

    /// Highest-priority type currently active above `alert_type`
    pub fn blocking_type(&self, alert_type: AlertType, now: DateTime<Utc>) -> Option<AlertType> {
        alert_type
            .higher_priority()
            .filter(|other| self.status(*other, now) == AlertStatus::Active)
            .max_by_key(AlertType::priority)
    }

    /// Run the hierarchy and cooldown gates for a non-test alert and apply
    /// the outcome to this type's state.
    pub fn try_send(&mut self, alert_type: AlertType, now: DateTime<Utc>) -> Result<(), SuppressionReason> {
        self.finalize_if_idle(alert_type, now);

        let verdict = if let Some(blocking) = self.blocking_type(alert_type, now) {
            Err(SuppressionReason::Hierarchy { blocking })
        } else {
            let cooldown = self.cooldown(alert_type);
            match self.state(alert_type).last_sent_at {
                Some(sent) if now.signed_duration_since(sent) < cooldown => {
                    Err(SuppressionReason::Cooldown {
                        remaining: cooldown - now.signed_duration_since(sent),
                    })
                }
                _ => Ok(()),
            }
        };

        match &verdict {
            Ok(()) => self.record_send(alert_type, now, false),
            Err(_) => self.record_suppressed(alert_type, now),
        }

        verdict
    }

    /// Mark a send. Test sends move the clocks but not the reporting numbers.
    pub fn record_send(&mut self, alert_type: AlertType, now: DateTime<Utc>, is_test: bool) {
        let state = self.state_mut(alert_type);
        state.last_sent_at = Some(now);
        state.suppressed = false;

        if !is_test {
            state.total_count += 1;
            if state.active_since.is_none() {
                state.active_since = Some(now);
            }
            state.last_seen_at = Some(now);
        }
    }

    /// Mark a refused send; presence still extends an open session
    pub fn record_suppressed(&mut self, alert_type: AlertType, now: DateTime<Utc>) {
        let state = self.state_mut(alert_type);
        state.suppressed = true;
        state.suppressed_count += 1;
        if state.active_since.is_some() {
            state.last_seen_at = Some(now);
        }
    }

    /// Mark a request that failed the confidence re-check. Not presence, so
    /// the session clock is left alone.
    pub fn record_rejected(&mut self, alert_type: AlertType) {
        let state = self.state_mut(alert_type);
        state.suppressed = true;
        state.suppressed_count += 1;
    }

    /// Credit delivered recipients to a send made in `session`. Deliveries
    /// finishing after a reset are dropped so they stay out of the new
    /// session's numbers.
    pub fn record_delivery(
        &mut self,
        alert_type: AlertType,
        recipients: u64,
        session: DateTime<Utc>,
    ) -> bool {
        if session != self.session_start {
            return false;
        }
        self.state_mut(alert_type).delivered_recipients += recipients;
        true
    }

    fn finalize_if_idle(&mut self, alert_type: AlertType, now: DateTime<Utc>) -> bool {
        let inactivity = self.inactivity_window;
        let state = self.state_mut(alert_type);

        let Some(seen) = state.last_seen_at.or(state.active_since) else {
            return false;
        };
        if state.active_since.is_none() || now.signed_duration_since(seen) < inactivity {
            return false;
        }

        let session = state.open_session();
        state.accumulated = state.accumulated + session;
        state.active_since = None;
        state.last_seen_at = None;
        true
    }

    /// Close every session idle for longer than the inactivity window
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<AlertType> {
        AlertType::ALL
            .into_iter()
            .filter(|alert_type| self.finalize_if_idle(*alert_type, now))
            .collect()
    }

    pub fn statistics(&self, now: DateTime<Utc>) -> AlertStatistics {
        let alerts = self
            .states
            .iter()
            .map(|(alert_type, state)| AlertTypeStatistics {
                alert_type: *alert_type,
                count: state.total_count,
                duration_seconds: (state.accumulated + state.open_session()).num_seconds(),
                suppressed_count: state.suppressed_count,
                delivered_recipients: state.delivered_recipients,
                active: self.status(*alert_type, now) == AlertStatus::Active,
            })
            .collect();

        AlertStatistics {
            session_start: self.session_start,
            generated_at: now,
            alerts,
        }
    }

    /// Zero reporting numbers and start a new reporting session. Send clocks
    /// are kept so cooldowns survive a reset.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        for state in self.states.values_mut() {
            *state = AlertState {
                last_sent_at: state.last_sent_at,
                ..AlertState::default()
            };
        }
        self.session_start = now;
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }
}
