use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::TagEvent;
use crate::telemetry::{names, TelemetryWrite};

/// Which derived-timestamp rule set the engine applies.
///
/// The two variants come from different generations of the upstream event
/// handler and are never merged: `PerFlag` marks strange-in-line and
/// in-poste occurrences with separate timestamps, `InLine` collapses them
/// into a single in-line marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivedTimestampPolicy {
    #[default]
    PerFlag,
    InLine,
}

/// The writes one event reconciles into: the four plain attributes, always,
/// plus the derived timestamps the event's flags qualify for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub attributes: Vec<TelemetryWrite>,
    pub derived: Vec<TelemetryWrite>,
}

/// Computes the reconciliation plan for one event.
///
/// Pure function of the event: the derived rules fire on every qualifying
/// event, not only on flag transitions, and always stamp the processing
/// time `now` rather than anything carried by the event.
pub fn reconcile(
    event: &TagEvent,
    policy: DerivedTimestampPolicy,
    now: DateTime<Utc>,
) -> ReconcilePlan {
    let attributes = vec![
        TelemetryWrite::text(names::ANCHOR, event.anchor.clone()),
        TelemetryWrite::flag(names::IN_LINE, event.in_line),
        TelemetryWrite::flag(names::IN_POSTE, event.in_poste),
        TelemetryWrite::flag(names::IS_STRANGE, event.is_strange),
    ];

    let mut derived = Vec::new();
    match policy {
        DerivedTimestampPolicy::PerFlag => {
            if event.is_strange && event.in_line {
                derived.push(TelemetryWrite::timestamp(names::LAST_IS_STRANGE, now));
            }
            if event.in_poste {
                derived.push(TelemetryWrite::timestamp(names::LAST_IN_POSTE, now));
            }
        }
        DerivedTimestampPolicy::InLine => {
            if event.in_line {
                derived.push(TelemetryWrite::timestamp(names::LAST_IN_LINE, now));
            }
        }
    }
    if event.in_poste || event.in_line {
        derived.push(TelemetryWrite::timestamp(names::LAST_SEEN, now));
    }

    ReconcilePlan { attributes, derived }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryValue;
    use chrono::TimeZone;

    fn event(anchor: &str, in_line: bool, in_poste: bool, is_strange: bool) -> TagEvent {
        TagEvent {
            tag_id: "T1".to_string(),
            anchor: anchor.to_string(),
            in_line,
            in_poste,
            is_strange,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn derived_names(plan: &ReconcilePlan) -> Vec<&'static str> {
        plan.derived.iter().map(|w| w.name).collect()
    }

    #[test]
    fn always_plans_all_four_plain_attributes() {
        let plan = reconcile(
            &event("A1", false, false, false),
            DerivedTimestampPolicy::PerFlag,
            now(),
        );

        assert_eq!(
            plan.attributes,
            vec![
                TelemetryWrite::text(names::ANCHOR, "A1"),
                TelemetryWrite::flag(names::IN_LINE, false),
                TelemetryWrite::flag(names::IN_POSTE, false),
                TelemetryWrite::flag(names::IS_STRANGE, false),
            ]
        );
    }

    #[test]
    fn no_positional_flag_means_no_derived_write() {
        let plan = reconcile(
            &event("A1", false, false, true),
            DerivedTimestampPolicy::PerFlag,
            now(),
        );
        assert!(plan.derived.is_empty());
    }

    #[test]
    fn in_poste_advances_last_in_poste_and_last_seen() {
        let plan = reconcile(
            &event("A1", false, true, false),
            DerivedTimestampPolicy::PerFlag,
            now(),
        );
        assert_eq!(derived_names(&plan), vec![names::LAST_IN_POSTE, names::LAST_SEEN]);
        for write in &plan.derived {
            assert_eq!(write.value, TelemetryValue::Timestamp(now()));
        }
    }

    #[test]
    fn strange_in_line_advances_last_is_strange_but_not_last_in_poste() {
        let plan = reconcile(
            &event("A1", true, false, true),
            DerivedTimestampPolicy::PerFlag,
            now(),
        );
        assert_eq!(derived_names(&plan), vec![names::LAST_IS_STRANGE, names::LAST_SEEN]);
    }

    #[test]
    fn strange_without_line_does_not_advance_last_is_strange() {
        let plan = reconcile(
            &event("A1", false, true, true),
            DerivedTimestampPolicy::PerFlag,
            now(),
        );
        assert_eq!(derived_names(&plan), vec![names::LAST_IN_POSTE, names::LAST_SEEN]);
    }

    #[test]
    fn all_flags_set_advances_every_per_flag_timestamp() {
        let plan = reconcile(
            &event("A1", true, true, true),
            DerivedTimestampPolicy::PerFlag,
            now(),
        );
        assert_eq!(
            derived_names(&plan),
            vec![names::LAST_IS_STRANGE, names::LAST_IN_POSTE, names::LAST_SEEN]
        );
    }

    #[test]
    fn in_line_only_advances_last_seen_under_per_flag() {
        let plan = reconcile(
            &event("A1", true, false, false),
            DerivedTimestampPolicy::PerFlag,
            now(),
        );
        assert_eq!(derived_names(&plan), vec![names::LAST_SEEN]);
    }

    #[test]
    fn in_line_policy_writes_last_in_line_instead_of_the_per_flag_pair() {
        let plan = reconcile(
            &event("A1", true, false, true),
            DerivedTimestampPolicy::InLine,
            now(),
        );
        assert_eq!(derived_names(&plan), vec![names::LAST_IN_LINE, names::LAST_SEEN]);
    }

    #[test]
    fn in_line_policy_still_tracks_last_seen_for_in_poste() {
        let plan = reconcile(
            &event("A1", false, true, false),
            DerivedTimestampPolicy::InLine,
            now(),
        );
        assert_eq!(derived_names(&plan), vec![names::LAST_SEEN]);
    }

    #[test]
    fn replaying_an_event_yields_the_same_plain_plan() {
        let e = event("A7", true, true, false);
        let first = reconcile(&e, DerivedTimestampPolicy::PerFlag, now());
        let later = now() + chrono::Duration::seconds(30);
        let second = reconcile(&e, DerivedTimestampPolicy::PerFlag, later);

        assert_eq!(first.attributes, second.attributes);
        assert_eq!(derived_names(&first), derived_names(&second));
        for write in &second.derived {
            assert_eq!(write.value, TelemetryValue::Timestamp(later));
        }
    }

    #[test]
    fn policy_deserializes_from_kebab_case() {
        let per_flag: DerivedTimestampPolicy = serde_json::from_str("\"per-flag\"").unwrap();
        let in_line: DerivedTimestampPolicy = serde_json::from_str("\"in-line\"").unwrap();
        assert_eq!(per_flag, DerivedTimestampPolicy::PerFlag);
        assert_eq!(in_line, DerivedTimestampPolicy::InLine);
    }
}
