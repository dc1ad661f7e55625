//! Condition model for Star status.
//!
//! A [`ConditionSet`] names one umbrella condition (`Ready`) and a fixed list of dependents.
//! Every mutation of a dependent recomputes the umbrella from the dependents alone:
//! all `True` makes it `True`, the first `False` dependent (in declaration order) makes it
//! `False` with that dependent's reason/message, otherwise it is `Unknown`.
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition types this controller manages. Other actors may add their own types to a status;
/// those are kept as plain strings on [`Condition::type_`] and never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Ready,
    DeploymentsAvailable,
    CreationSucceeded,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Ready => "Ready", Self::DeploymentsAvailable => "DeploymentsAvailable", Self::CreationSucceeded => "CreationSucceeded" }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// RFC3339 timestamp of the last status/reason/message change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn unknown(type_: ConditionType) -> Self {
        Self { type_: type_.to_string(), status: ConditionStatus::Unknown, reason: String::new(), message: String::new(), last_transition_time: None }
    }
    pub fn is(&self, type_: ConditionType) -> bool { self.type_ == type_.as_str() }
    pub fn is_true(&self) -> bool { self.status == ConditionStatus::True }
    pub fn is_false(&self) -> bool { self.status == ConditionStatus::False }

    /// Equal in everything but `last_transition_time`.
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_ && self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Compares two condition lists by state alone; order and transition times are ignored.
pub fn same_conditions(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| y.same_state(x)))
}

/// Copies the transition time from `live` onto every condition in `desired` whose state matches.
/// A status computed from a stale copy then carries the times the live object already has.
pub fn carry_transition_times(desired: &mut [Condition], live: &[Condition]) {
    for c in desired.iter_mut() {
        if let Some(prev) = live.iter().find(|p| p.same_state(c)) {
            c.last_transition_time = prev.last_transition_time.clone();
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConditionSet {
    happy: ConditionType,
    dependents: &'static [ConditionType],
}

impl ConditionSet {
    pub const fn new(happy: ConditionType, dependents: &'static [ConditionType]) -> Self {
        Self { happy, dependents }
    }

    pub fn happy(&self) -> ConditionType { self.happy }
    pub fn dependents(&self) -> &'static [ConditionType] { self.dependents }

    pub fn manage<'a>(&self, conditions: &'a mut Vec<Condition>) -> ConditionManager<'a> {
        ConditionManager { set: *self, conditions }
    }

    /// Umbrella condition derived from `conditions` without mutating anything.
    pub fn aggregate(&self, conditions: &[Condition]) -> Condition {
        let lookup = |t: ConditionType| conditions.iter().find(|c| c.is(t)).cloned().unwrap_or_else(|| Condition::unknown(t));
        let deps: Vec<Condition> = self.dependents.iter().map(|t| lookup(*t)).collect();
        let mut out = Condition::unknown(self.happy);
        if let Some(failed) = deps.iter().find(|c| c.is_false()) {
            out.status = ConditionStatus::False;
            out.reason = failed.reason.clone();
            out.message = failed.message.clone();
        } else if let Some(pending) = deps.iter().find(|c| !c.is_true()) {
            out.reason = pending.reason.clone();
            out.message = pending.message.clone();
        } else {
            out.status = ConditionStatus::True;
        }
        out
    }
}

/// Mutable view over a status' condition list, bound to one [`ConditionSet`].
pub struct ConditionManager<'a> {
    set: ConditionSet,
    conditions: &'a mut Vec<Condition>,
}

impl ConditionManager<'_> {
    pub fn initialize_conditions(&mut self) {
        for t in self.set.dependents {
            if !self.conditions.iter().any(|c| c.is(*t)) {
                self.set_condition(Condition::unknown(*t));
            }
        }
        self.recompute_happy();
    }

    pub fn get_condition(&self, type_: ConditionType) -> Condition {
        self.conditions.iter().find(|c| c.is(type_)).cloned().unwrap_or_else(|| Condition::unknown(type_))
    }

    pub fn mark_true(&mut self, type_: ConditionType) {
        self.mark(type_, ConditionStatus::True, String::new(), String::new());
    }

    pub fn mark_false(&mut self, type_: ConditionType, reason: &str, message: impl Into<String>) {
        self.mark(type_, ConditionStatus::False, reason.to_string(), message.into());
    }

    pub fn mark_unknown(&mut self, type_: ConditionType, reason: &str, message: impl Into<String>) {
        self.mark(type_, ConditionStatus::Unknown, reason.to_string(), message.into());
    }

    fn mark(&mut self, type_: ConditionType, status: ConditionStatus, reason: String, message: String) {
        self.set_condition(Condition { type_: type_.to_string(), status, reason, message, last_transition_time: None });
        if type_ != self.set.happy { self.recompute_happy(); }
    }

    fn recompute_happy(&mut self) {
        let happy = self.set.aggregate(self.conditions.as_slice());
        self.set_condition(happy);
    }

    // Replaces the stored condition of the same type; keeps the old transition time when nothing changed.
    fn set_condition(&mut self, mut cond: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == cond.type_) {
            Some(existing) if existing.same_state(&cond) => {}
            Some(existing) => {
                cond.last_transition_time = Some(now());
                *existing = cond;
            }
            None => {
                cond.last_transition_time = Some(now());
                self.conditions.push(cond);
            }
        }
        let happy = self.set.happy;
        self.conditions.sort_by_key(|c| !c.is(happy));
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
